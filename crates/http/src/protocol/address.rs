//! Addresses as seen by the transport and by the resolver chain.

use http::HeaderMap;
use http::header::HOST;
use std::fmt;
use std::net::SocketAddr;

/// A host (name, IPv4 or IPv6 literal) with an optional port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAndPort {
    host: String,
    port: Option<u16>,
}

impl HostAndPort {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self { host: host.into(), port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Parses `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 literal.
    ///
    /// `default_port` is used when the value carries no port. Returns `None` for empty hosts
    /// and unparsable ports.
    pub fn parse(value: &str, default_port: Option<u16>) -> Option<Self> {
        let value = value.trim();

        if let Some(rest) = value.strip_prefix('[') {
            let (host, tail) = rest.split_once(']')?;
            if host.is_empty() {
                return None;
            }
            let port = match tail {
                "" => default_port,
                tail => Some(tail.strip_prefix(':')?.parse().ok()?),
            };
            return Some(Self::new(host, port));
        }

        let (host, port) = match value.matches(':').count() {
            1 => {
                let (host, port) = value.split_once(':')?;
                (host, Some(port.parse().ok()?))
            }
            _ => (value, default_port),
        };

        if host.is_empty() {
            return None;
        }
        Some(Self::new(host, port))
    }
}

impl From<SocketAddr> for HostAndPort {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), Some(addr.port()))
    }
}

impl fmt::Display for HostAndPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.host.contains(':'), self.port) {
            (true, Some(port)) => write!(f, "[{}]:{port}", self.host),
            (false, Some(port)) => write!(f, "{}:{port}", self.host),
            (_, None) => f.write_str(&self.host),
        }
    }
}

/// The well-known port of a scheme, `None` for schemes without one.
pub fn default_port_for_scheme(scheme: &str) -> Option<u16> {
    match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

/// Immutable `(scheme, host, client)` triple describing who connected to what.
///
/// Resolver stages derive new snapshots with the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    scheme: String,
    host_address: HostAndPort,
    client_address: HostAndPort,
}

impl ConnectionInfo {
    pub fn new(scheme: impl Into<String>, host_address: HostAndPort, client_address: HostAndPort) -> Self {
        Self { scheme: scheme.into(), host_address, client_address }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host_address(&self) -> &HostAndPort {
        &self.host_address
    }

    pub fn client_address(&self) -> &HostAndPort {
        &self.client_address
    }

    #[must_use]
    pub fn with_scheme(&self, scheme: impl Into<String>) -> Self {
        Self { scheme: scheme.into(), ..self.clone() }
    }

    #[must_use]
    pub fn with_host_address(&self, host_address: HostAndPort) -> Self {
        Self { host_address, ..self.clone() }
    }

    #[must_use]
    pub fn with_client_address(&self, client_address: HostAndPort) -> Self {
        Self { client_address, ..self.clone() }
    }
}

/// Per-connection facts recorded by the transport and attached to every request of the
/// connection as an extension.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMeta {
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    proxied_source: Option<SocketAddr>,
    secure: bool,
}

impl ConnectionMeta {
    pub fn new(local_addr: Option<SocketAddr>, peer_addr: Option<SocketAddr>) -> Self {
        Self { local_addr, peer_addr, proxied_source: None, secure: false }
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_proxied_source(mut self, source: Option<SocketAddr>) -> Self {
        self.proxied_source = source;
        self
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// The client address announced by a proxy-protocol preamble.
    pub fn proxied_source(&self) -> Option<SocketAddr> {
        self.proxied_source
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }

    /// The connection info before any resolver stage ran: socket-level client address, host
    /// from the `Host` header falling back to the local address.
    pub fn base_info(&self, headers: &HeaderMap) -> ConnectionInfo {
        let scheme = self.scheme();
        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| HostAndPort::parse(value, default_port_for_scheme(scheme)))
            .or_else(|| self.local_addr.map(HostAndPort::from))
            .unwrap_or_else(|| HostAndPort::new("unknown", None));
        let client = self.peer_addr.map_or_else(|| HostAndPort::new("unknown", None), HostAndPort::from);

        ConnectionInfo::new(scheme, host, client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn parse_host_forms() {
        assert_eq!(HostAndPort::parse("example.org", Some(80)), Some(HostAndPort::new("example.org", Some(80))));
        assert_eq!(HostAndPort::parse("example.org:8080", Some(80)), Some(HostAndPort::new("example.org", Some(8080))));
        assert_eq!(HostAndPort::parse("192.0.2.60", None), Some(HostAndPort::new("192.0.2.60", None)));
        assert_eq!(HostAndPort::parse("[2001:db8::1]:4711", None), Some(HostAndPort::new("2001:db8::1", Some(4711))));
        assert_eq!(HostAndPort::parse("[2001:db8::1]", Some(443)), Some(HostAndPort::new("2001:db8::1", Some(443))));
        assert_eq!(HostAndPort::parse("2001:db8::1", None), Some(HostAndPort::new("2001:db8::1", None)));

        assert_eq!(HostAndPort::parse("", None), None);
        assert_eq!(HostAndPort::parse("host:port", None), None);
        assert_eq!(HostAndPort::parse("[::1", None), None);
        assert_eq!(HostAndPort::parse("host:70000", None), None);
    }

    #[test]
    fn display_brackets_ipv6() {
        assert_eq!(HostAndPort::new("::1", Some(80)).to_string(), "[::1]:80");
        assert_eq!(HostAndPort::new("::1", None).to_string(), "::1");
        assert_eq!(HostAndPort::new("localhost", Some(2812)).to_string(), "localhost:2812");
    }

    #[test]
    fn scheme_ports() {
        assert_eq!(default_port_for_scheme("http"), Some(80));
        assert_eq!(default_port_for_scheme("WS"), Some(80));
        assert_eq!(default_port_for_scheme("https"), Some(443));
        assert_eq!(default_port_for_scheme("wss"), Some(443));
        assert_eq!(default_port_for_scheme("gopher"), None);
    }

    #[test]
    fn base_info_prefers_host_header() {
        let meta = ConnectionMeta::new(Some("127.0.0.1:2812".parse().unwrap()), Some("10.0.0.7:51000".parse().unwrap()));

        let mut headers = HeaderMap::new();
        let info = meta.base_info(&headers);
        assert_eq!(info.scheme(), "http");
        assert_eq!(info.host_address(), &HostAndPort::new("127.0.0.1", Some(2812)));
        assert_eq!(info.client_address(), &HostAndPort::new("10.0.0.7", Some(51000)));

        headers.insert(HOST, HeaderValue::from_static("api.example.org"));
        let info = meta.with_secure(true).base_info(&headers);
        assert_eq!(info.scheme(), "https");
        assert_eq!(info.host_address(), &HostAndPort::new("api.example.org", Some(443)));
    }
}
