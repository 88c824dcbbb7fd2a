//! Cross-origin resource sharing: preflight answers and the checks on actual requests.

use crate::context::HttpContext;
use crate::error::ConfigError;
use crate::problem::ProblemDetails;
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use nimbus_http::protocol::body::ResponseBody;
use nimbus_http::protocol::{HostAndPort, default_port_for_scheme};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_PRIVATE_NETWORK: &str = "access-control-request-private-network";
const ALLOW_PRIVATE_NETWORK: &str = "access-control-allow-private-network";

/// A CORS policy. Origin patterns are `*`, an exact origin such as `https://panel.example.com`,
/// or `*.example.com` for every subdomain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CorsConfig {
    allowed_origins: Vec<String>,
    allowed_headers: Vec<String>,
    exposed_headers: Vec<String>,
    allow_credentials: bool,
    /// seconds
    max_age: Option<u64>,
    allow_private_network: bool,
}

impl CorsConfig {
    /// Any origin, any header, credentials allowed.
    pub fn permissive() -> Self {
        Self { allowed_origins: vec!["*".to_owned()], allowed_headers: vec!["*".to_owned()], allow_credentials: true, ..Self::default() }
    }

    #[must_use]
    pub fn allowed_origin(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_origins.push(pattern.into());
        self
    }

    #[must_use]
    pub fn allowed_header(mut self, name: impl Into<String>) -> Self {
        self.allowed_headers.push(name.into());
        self
    }

    #[must_use]
    pub fn exposed_header(mut self, name: impl Into<String>) -> Self {
        self.exposed_headers.push(name.into());
        self
    }

    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age.as_secs());
        self
    }

    #[must_use]
    pub fn allow_private_network(mut self, allow: bool) -> Self {
        self.allow_private_network = allow;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for pattern in &self.allowed_origins {
            let wildcard_misplaced = pattern.strip_prefix("*.").unwrap_or(pattern).contains('*') && pattern != "*";
            if pattern.is_empty() || wildcard_misplaced {
                return Err(ConfigError::InvalidOrigin(pattern.clone()));
            }
        }
        Ok(())
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|pattern| origin_matches(pattern, origin))
    }

    fn header_allowed(&self, name: &str) -> bool {
        self.allowed_headers.iter().any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(name))
    }

    /// `*` only when any origin is allowed and no credentials are shared.
    fn allow_origin_value(&self, origin: &str) -> Option<HeaderValue> {
        if !self.allow_credentials && self.allowed_origins.iter().any(|pattern| pattern == "*") {
            return Some(HeaderValue::from_static("*"));
        }
        HeaderValue::from_str(origin).ok()
    }
}

fn origin_matches(pattern: &str, origin: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(domain) = pattern.strip_prefix("*.") {
        let suffix = format!(".{}", domain.to_ascii_lowercase());
        return parse_origin(origin).is_some_and(|(_, host)| host.host().to_ascii_lowercase().ends_with(&suffix));
    }
    pattern.trim_end_matches('/').eq_ignore_ascii_case(origin.trim_end_matches('/'))
}

/// Splits `scheme://host[:port]`, filling in the default port of the scheme.
fn parse_origin(origin: &str) -> Option<(String, HostAndPort)> {
    let (scheme, rest) = origin.split_once("://")?;
    let scheme = scheme.to_ascii_lowercase();
    let authority = rest.split('/').next()?;
    let host = HostAndPort::parse(authority, default_port_for_scheme(&scheme))?;
    Some((scheme, host))
}

/// What a preflight request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightInfo {
    origin: String,
    request_method: Method,
    request_headers: Vec<String>,
    private_network: bool,
}

impl PreflightInfo {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn request_method(&self) -> &Method {
        &self.request_method
    }

    pub fn request_headers(&self) -> &[String] {
        &self.request_headers
    }
}

/// `Some` for `OPTIONS` requests carrying `Origin` and `Access-Control-Request-Method`.
pub fn extract_preflight_info(request: &Request<Bytes>) -> Option<PreflightInfo> {
    if request.method() != Method::OPTIONS {
        return None;
    }

    let headers = request.headers();
    let text = |name: &HeaderName| headers.get(name).and_then(|value| value.to_str().ok());
    let origin = text(&header::ORIGIN)?.to_owned();
    let request_method = Method::from_bytes(text(&header::ACCESS_CONTROL_REQUEST_METHOD)?.trim().as_bytes()).ok()?;
    let request_headers = headers
        .get_all(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
    let private_network = text(&HeaderName::from_static(REQUEST_PRIVATE_NETWORK)).is_some_and(|value| value.eq_ignore_ascii_case("true"));

    Some(PreflightInfo { origin, request_method, request_headers, private_network })
}

/// Answers a preflight request. `config` is the policy of the handler registered for the
/// requested method, `None` when there is no such handler.
pub fn process_preflight_request(ctx: &HttpContext, info: &PreflightInfo, config: Option<&CorsConfig>) -> Response<ResponseBody> {
    let Some(config) = config else {
        return ProblemDetails::not_found().detail(format!("no handler for {} {}", info.request_method, ctx.path())).into_response();
    };

    if !config.origin_allowed(&info.origin) {
        return violation(format!("origin {} is not allowed", info.origin));
    }
    if let Some(header) = info.request_headers.iter().find(|header| !config.header_allowed(header)) {
        return violation(format!("header {header} is not allowed"));
    }
    if info.private_network && !config.allow_private_network {
        return violation("private network access is not allowed");
    }

    let mut response = Response::new(ResponseBody::empty());
    let headers = response.headers_mut();
    if let Some(value) = config.allow_origin_value(&info.origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(header::VARY, HeaderValue::from_static("Origin, Access-Control-Request-Method, Access-Control-Request-Headers"));
    if let Ok(method) = HeaderValue::from_str(info.request_method.as_str()) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, method);
    }
    if !info.request_headers.is_empty()
        && let Ok(value) = HeaderValue::from_str(&info.request_headers.join(", "))
    {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
    }
    if config.allow_credentials {
        headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
    if let Some(max_age) = config.max_age {
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(max_age));
    }
    if info.private_network {
        headers.insert(HeaderName::from_static(ALLOW_PRIVATE_NETWORK), HeaderValue::from_static("true"));
    }
    response
}

/// Checks the `Origin` of an actual request. Allowed cross-origin requests get their CORS
/// headers added to the pending response headers; `false` means the request must be
/// refused.
pub fn process_normal_request(ctx: &mut HttpContext, config: &CorsConfig) -> bool {
    let Some(origin) = ctx.header(header::ORIGIN).map(str::to_owned) else {
        return true;
    };
    if is_same_origin(ctx, &origin) {
        return true;
    }
    if !config.origin_allowed(&origin) {
        debug!(origin = %origin, path = ctx.path(), "refused cross origin request");
        return false;
    }

    let pending = ctx.response_headers_mut();
    if let Some(value) = config.allow_origin_value(&origin) {
        pending.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    pending.append(header::VARY, HeaderValue::from_static("Origin"));
    if !config.exposed_headers.is_empty()
        && let Ok(value) = HeaderValue::from_str(&config.exposed_headers.join(", "))
    {
        pending.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, value);
    }
    if config.allow_credentials {
        pending.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
    true
}

fn is_same_origin(ctx: &HttpContext, origin: &str) -> bool {
    let info = ctx.connection_info();
    parse_origin(origin).is_some_and(|(scheme, host)| {
        scheme == info.scheme()
            && host.host().eq_ignore_ascii_case(info.host_address().host())
            && host.port() == info.host_address().port()
    })
}

/// The 403 answer for requests refused by the policy.
pub fn violation(detail: impl Into<String>) -> Response<ResponseBody> {
    ProblemDetails::new(StatusCode::FORBIDDEN, "cors-policy-violation").detail(detail).into_response()
}
