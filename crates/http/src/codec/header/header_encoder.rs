//! Serializes response heads: status line, framing headers, then every header verbatim.

use crate::protocol::{PayloadSize, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, StatusCode, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        let version = match header.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };

        dst.reserve(INIT_HEADER_SIZE);
        let status = header.status();
        write!(FastWrite(dst), "{version} {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;

        if carries_framing(status) {
            let headers = header.headers_mut();
            match payload_size {
                PayloadSize::Length(n) => {
                    headers.remove(header::TRANSFER_ENCODING);
                    headers.insert(header::CONTENT_LENGTH, n.into());
                }
                PayloadSize::Chunked => {
                    headers.remove(header::CONTENT_LENGTH);
                    headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
                }
                // HEAD answers keep the length the handler announced
                PayloadSize::Empty => {
                    if !headers.contains_key(header::CONTENT_LENGTH) {
                        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
                    }
                }
            }
        }

        for (header_name, header_value) in header.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// 1xx and 204 responses must not carry `Content-Length` or `Transfer-Encoding`.
fn carries_framing(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT)
}

struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Response;

    fn encode(head: ResponseHead, size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn writes_content_length() {
        let head = Response::builder().status(StatusCode::OK).header("x-node", "node-1").body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Length(5)), "HTTP/1.1 200 OK\r\nx-node: node-1\r\ncontent-length: 5\r\n\r\n");
    }

    #[test]
    fn chunked_replaces_content_length() {
        let head = Response::builder().status(StatusCode::OK).header(header::CONTENT_LENGTH, "10").body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Chunked), "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n");
    }

    #[test]
    fn switching_protocols_has_no_framing() {
        let head = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .body(())
            .unwrap();
        assert_eq!(
            encode(head, PayloadSize::Empty),
            "HTTP/1.1 101 Switching Protocols\r\nconnection: upgrade\r\nupgrade: websocket\r\n\r\n"
        );
    }

    #[test]
    fn empty_keeps_announced_length() {
        let head = Response::builder().status(StatusCode::OK).header(header::CONTENT_LENGTH, "42").body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Empty), "HTTP/1.1 200 OK\r\ncontent-length: 42\r\n\r\n");

        let head = Response::builder().version(Version::HTTP_10).status(StatusCode::NOT_FOUND).body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Empty), "HTTP/1.0 404 Not Found\r\ncontent-length: 0\r\n\r\n");
    }
}
