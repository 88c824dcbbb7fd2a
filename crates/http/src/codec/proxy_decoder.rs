//! HAProxy PROXY protocol preamble, text (v1) and binary (v2).
//!
//! The decoder runs once at the start of a connection. It yields a single [`ProxyHeader`]
//! and the connection then switches to the HTTP decoder on the same buffer.

use crate::protocol::ParseError;
use bytes::{Buf, BytesMut};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio_util::codec::Decoder;
use tracing::trace;

const V1_PREFIX: &[u8] = b"PROXY ";
const V1_MAX_LINE: usize = 107;
const V2_SIGNATURE: &[u8] = b"\r\n\r\n\0\r\nQUIT\n";
const V2_HEADER_LEN: usize = 16;

/// Whether a listener expects a PROXY protocol preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// never look for a preamble
    #[default]
    Disabled,
    /// every connection must start with a preamble
    Required,
    /// accept connections with and without a preamble
    Detect,
}

/// Addresses announced by the proxy; both `None` for `LOCAL`/`UNKNOWN` preambles and for
/// connections without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProxyHeader {
    source: Option<SocketAddr>,
    destination: Option<SocketAddr>,
}

impl ProxyHeader {
    pub fn new(source: SocketAddr, destination: SocketAddr) -> Self {
        Self { source: Some(source), destination: Some(destination) }
    }

    pub fn absent() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<SocketAddr> {
        self.source
    }

    pub fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }
}

#[derive(Debug, Clone)]
pub struct ProxyDecoder {
    mode: ProxyMode,
}

impl ProxyDecoder {
    pub fn new(mode: ProxyMode) -> Self {
        Self { mode }
    }
}

impl Decoder for ProxyDecoder {
    type Item = ProxyHeader;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.mode == ProxyMode::Disabled {
            return Ok(Some(ProxyHeader::absent()));
        }
        if src.is_empty() {
            return Ok(None);
        }

        if agrees_with(src, V1_PREFIX) {
            return decode_v1(src);
        }
        if agrees_with(src, V2_SIGNATURE) {
            return decode_v2(src);
        }

        match self.mode {
            ProxyMode::Detect => {
                trace!("no proxy protocol preamble, continue with plain http");
                Ok(Some(ProxyHeader::absent()))
            }
            _ => Err(ParseError::invalid_proxy_header("missing proxy protocol preamble")),
        }
    }
}

/// The buffered bytes are a prefix of `signature` or start with it.
fn agrees_with(src: &[u8], signature: &[u8]) -> bool {
    let n = src.len().min(signature.len());
    src[..n] == signature[..n]
}

fn decode_v1(src: &mut BytesMut) -> Result<Option<ProxyHeader>, ParseError> {
    let Some(end) = src.windows(2).take(V1_MAX_LINE - 1).position(|w| w == b"\r\n") else {
        if src.len() >= V1_MAX_LINE {
            return Err(ParseError::invalid_proxy_header("v1 line too long"));
        }
        return Ok(None);
    };

    let line = src.split_to(end + 2);
    let line = std::str::from_utf8(&line[..end]).map_err(ParseError::invalid_proxy_header)?;
    let mut parts = line.split(' ').skip(1);

    let header = match parts.next() {
        Some("TCP4" | "TCP6") => {
            let mut next = || parts.next().ok_or_else(|| ParseError::invalid_proxy_header("truncated v1 line"));
            let source_ip: IpAddr = next()?.parse().map_err(ParseError::invalid_proxy_header)?;
            let destination_ip: IpAddr = next()?.parse().map_err(ParseError::invalid_proxy_header)?;
            let source_port: u16 = next()?.parse().map_err(ParseError::invalid_proxy_header)?;
            let destination_port: u16 = next()?.parse().map_err(ParseError::invalid_proxy_header)?;
            ProxyHeader::new(SocketAddr::new(source_ip, source_port), SocketAddr::new(destination_ip, destination_port))
        }
        Some("UNKNOWN") => ProxyHeader::absent(),
        other => return Err(ParseError::invalid_proxy_header(format!("unsupported v1 protocol {other:?}"))),
    };

    trace!(source = ?header.source, "decoded proxy protocol v1 preamble");
    Ok(Some(header))
}

fn decode_v2(src: &mut BytesMut) -> Result<Option<ProxyHeader>, ParseError> {
    if src.len() < V2_HEADER_LEN {
        return Ok(None);
    }

    let version_command = src[12];
    let family = src[13];
    let length = usize::from(u16::from_be_bytes([src[14], src[15]]));

    if version_command >> 4 != 2 {
        return Err(ParseError::invalid_proxy_header(format!("unsupported v2 version {}", version_command >> 4)));
    }
    if src.len() < V2_HEADER_LEN + length {
        return Ok(None);
    }

    src.advance(V2_HEADER_LEN);
    let mut payload = src.split_to(length);

    // LOCAL connections are health checks of the proxy itself
    if version_command & 0x0F == 0 {
        return Ok(Some(ProxyHeader::absent()));
    }

    let header = match family >> 4 {
        0x1 if payload.len() >= 12 => {
            let source = Ipv4Addr::from(payload.get_u32());
            let destination = Ipv4Addr::from(payload.get_u32());
            let (source_port, destination_port) = (payload.get_u16(), payload.get_u16());
            ProxyHeader::new(SocketAddr::new(source.into(), source_port), SocketAddr::new(destination.into(), destination_port))
        }
        0x2 if payload.len() >= 36 => {
            let source = Ipv6Addr::from(payload.get_u128());
            let destination = Ipv6Addr::from(payload.get_u128());
            let (source_port, destination_port) = (payload.get_u16(), payload.get_u16());
            ProxyHeader::new(SocketAddr::new(source.into(), source_port), SocketAddr::new(destination.into(), destination_port))
        }
        0x1 | 0x2 => return Err(ParseError::invalid_proxy_header("truncated v2 address block")),
        _ => ProxyHeader::absent(),
    };

    trace!(source = ?header.source, "decoded proxy protocol v2 preamble");
    Ok(Some(header))
}
