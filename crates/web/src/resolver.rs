//! Stages that refine the scheme, host and client address a request was made with, as
//! announced by proxies in front of the server.
//!
//! Every stage leaves the info untouched when its trigger is absent. Only the first hop of
//! a forwarding header is used.

use crate::context::HttpContext;
use http::header::HeaderName;
use nimbus_http::protocol::{ConnectionInfo, HostAndPort, default_port_for_scheme};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

pub trait ConnectionInfoResolver: Send + Sync {
    fn resolve(&self, ctx: &HttpContext, base: ConnectionInfo) -> ConnectionInfo;

    /// Runs `next` on the result of this stage.
    fn then<R>(self, next: R) -> Chain<Self, R>
    where
        Self: Sized,
        R: ConnectionInfoResolver,
    {
        Chain { first: self, second: next }
    }
}

/// Two stages run one after the other.
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A: ConnectionInfoResolver, B: ConnectionInfoResolver> ConnectionInfoResolver for Chain<A, B> {
    fn resolve(&self, ctx: &HttpContext, base: ConnectionInfo) -> ConnectionInfo {
        let intermediate = self.first.resolve(ctx, base);
        self.second.resolve(ctx, intermediate)
    }
}

/// Leaves the socket level info as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

impl ConnectionInfoResolver for NoopResolver {
    fn resolve(&self, _ctx: &HttpContext, base: ConnectionInfo) -> ConnectionInfo {
        base
    }
}

/// Applies the client address of the PROXY protocol preamble, if the connection had one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyProtocolResolver;

impl ConnectionInfoResolver for ProxyProtocolResolver {
    fn resolve(&self, ctx: &HttpContext, base: ConnectionInfo) -> ConnectionInfo {
        match ctx.connection_meta().and_then(|meta| meta.proxied_source()) {
            Some(source) => base.with_client_address(HostAndPort::from(source)),
            None => base,
        }
    }
}

static FOR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)for="?([^;,"]+)"?"#).expect("valid forwarded for pattern"));
static HOST_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)host="?([^;,"]+)"?"#).expect("valid forwarded host pattern"));
static PROTO_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)proto="?([^;,"]+)"?"#).expect("valid forwarded proto pattern"));

/// RFC 7239 `Forwarded: for=...;proto=...;host=...`.
#[derive(Clone)]
pub struct ForwardedSyntaxResolver {
    header: HeaderName,
}

impl fmt::Debug for ForwardedSyntaxResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardedSyntaxResolver").field("header", &self.header).finish()
    }
}

impl Default for ForwardedSyntaxResolver {
    fn default() -> Self {
        Self::new(http::header::FORWARDED)
    }
}

impl ForwardedSyntaxResolver {
    /// Reads the forwarded syntax from `header` instead of `Forwarded`.
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

fn capture<'a>(pattern: &Regex, entry: &'a str) -> Option<&'a str> {
    pattern.captures(entry).and_then(|captures| captures.get(1)).map(|value| value.as_str().trim())
}

impl ConnectionInfoResolver for ForwardedSyntaxResolver {
    fn resolve(&self, ctx: &HttpContext, base: ConnectionInfo) -> ConnectionInfo {
        let Some(entry) = ctx.header(&self.header).and_then(|value| value.split(',').next()) else {
            return base;
        };

        let mut info = base;
        if let Some(proto) = capture(&PROTO_PATTERN, entry) {
            info = info.with_scheme(proto.to_ascii_lowercase());
        }
        if let Some(client) = capture(&FOR_PATTERN, entry).and_then(|value| HostAndPort::parse(value, info.client_address().port())) {
            info = info.with_client_address(client);
        }
        if let Some(host) = capture(&HOST_PATTERN, entry).and_then(|value| HostAndPort::parse(value, default_port_for_scheme(info.scheme()))) {
            info = info.with_host_address(host);
        }
        info
    }
}

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// The de-facto `X-Forwarded-For`, `X-Forwarded-Proto` and `X-Forwarded-Host` headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct XForwardedResolver;

impl ConnectionInfoResolver for XForwardedResolver {
    fn resolve(&self, ctx: &HttpContext, base: ConnectionInfo) -> ConnectionInfo {
        let first = |name: &str| ctx.header(name).and_then(|value| value.split(',').next()).map(str::trim).filter(|value| !value.is_empty());

        let mut info = base;
        if let Some(proto) = first(X_FORWARDED_PROTO) {
            info = info.with_scheme(proto.to_ascii_lowercase());
        }
        if let Some(client) = first(X_FORWARDED_FOR).and_then(|value| HostAndPort::parse(value, info.client_address().port())) {
            info = info.with_client_address(client);
        }
        if let Some(host) = first(X_FORWARDED_HOST).and_then(|value| HostAndPort::parse(value, default_port_for_scheme(info.scheme()))) {
            info = info.with_host_address(host);
        }
        info
    }
}

/// PROXY protocol first, then `Forwarded`, then `X-Forwarded-*`.
pub fn default_resolver() -> impl ConnectionInfoResolver {
    ProxyProtocolResolver.then(ForwardedSyntaxResolver::default()).then(XForwardedResolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use nimbus_http::protocol::ConnectionMeta;

    fn invalid_base() -> ConnectionInfo {
        ConnectionInfo::new("INVALID", HostAndPort::new("INVALID", None), HostAndPort::new("INVALID", None))
    }

    fn context(headers: &[(&str, &str)]) -> HttpContext {
        let mut builder = Request::builder().uri("/api/v3/node");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        HttpContext::new(builder.body(Bytes::new()).unwrap(), invalid_base())
    }

    #[test]
    fn forwarded_for_proto_and_host() {
        let ctx = context(&[("forwarded", "for=192.0.2.60;proto=http;host=203.0.113.43")]);
        let info = ForwardedSyntaxResolver::default().resolve(&ctx, invalid_base());

        assert_eq!(info.scheme(), "http");
        assert_eq!(info.host_address(), &HostAndPort::new("203.0.113.43", Some(80)));
        assert_eq!(info.client_address(), &HostAndPort::new("192.0.2.60", None));
    }

    #[test]
    fn forwarded_uses_the_first_hop_and_quoted_values() {
        let ctx = context(&[("forwarded", r#"for="[2001:db8:cafe::17]:4711";proto=https, for=198.51.100.17"#)]);
        let info = ForwardedSyntaxResolver::default().resolve(&ctx, invalid_base());

        assert_eq!(info.scheme(), "https");
        assert_eq!(info.client_address(), &HostAndPort::new("2001:db8:cafe::17", Some(4711)));
        assert_eq!(info.host_address(), &HostAndPort::new("INVALID", None));
    }

    #[test]
    fn forwarded_header_name_is_configurable() {
        let ctx = context(&[("x-proxy-forwarded", "host=panel.example.com;proto=https")]);
        let info = ForwardedSyntaxResolver::new(HeaderName::from_static("x-proxy-forwarded")).resolve(&ctx, invalid_base());
        assert_eq!(info.host_address(), &HostAndPort::new("panel.example.com", Some(443)));

        let untouched = ForwardedSyntaxResolver::default().resolve(&ctx, invalid_base());
        assert_eq!(untouched, invalid_base());
    }

    #[test]
    fn x_forwarded_headers() {
        let ctx = context(&[("x-forwarded-for", "203.0.113.7, 10.0.0.2"), ("x-forwarded-proto", "https"), ("x-forwarded-host", "cloud.example.com")]);
        let info = XForwardedResolver.resolve(&ctx, invalid_base());

        assert_eq!(info.scheme(), "https");
        assert_eq!(info.client_address(), &HostAndPort::new("203.0.113.7", None));
        assert_eq!(info.host_address(), &HostAndPort::new("cloud.example.com", Some(443)));
    }

    #[test]
    fn proxy_protocol_source_then_headers() {
        let meta = ConnectionMeta::new(None, Some("10.0.0.2:50000".parse().unwrap())).with_proxied_source(Some("192.0.2.60:51000".parse().unwrap()));
        let request = Request::builder().uri("/").header("x-forwarded-host", "cloud.example.com").extension(meta).body(Bytes::new()).unwrap();
        let ctx = HttpContext::from_request(request);

        let info = default_resolver().resolve(&ctx, ctx.connection_info().clone());
        assert_eq!(info.client_address(), &HostAndPort::new("192.0.2.60", Some(51000)));
        assert_eq!(info.host_address(), &HostAndPort::new("cloud.example.com", Some(80)));

        let without_preamble = ProxyProtocolResolver.resolve(&context(&[]), invalid_base());
        assert_eq!(without_preamble, invalid_base());
        assert_eq!(NoopResolver.resolve(&ctx, invalid_base()), invalid_base());
    }
}
