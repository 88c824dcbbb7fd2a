//! Answering an upgrade request with a WebSocket handshake and handing the connection to a
//! session callback.

use crate::context::HttpContext;
use crate::error::HandlerError;
use crate::problem::ProblemDetails;
use http::{HeaderValue, Response, StatusCode, header};
use nimbus_http::protocol::body::ResponseBody;
use nimbus_http::protocol::has_connection_token;
use nimbus_http::upgrade::Upgraded;
use std::future::Future;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::debug;

pub type WebSocket = WebSocketStream<Upgraded>;

const SUPPORTED_VERSION: &str = "13";

/// Validates the handshake headers of `ctx` and returns the `101` response. `session` runs
/// with the established socket once the response is on the wire.
///
/// Requests that are not a version 13 WebSocket handshake fail with a 400 problem.
pub fn accept<F, Fut>(ctx: &HttpContext, session: F) -> Result<Response<ResponseBody>, HandlerError>
where
    F: FnOnce(WebSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let headers = ctx.headers();
    let upgrade_to_websocket = headers.get(header::UPGRADE).and_then(|value| value.to_str().ok()).is_some_and(|value| value.eq_ignore_ascii_case("websocket"));
    if !upgrade_to_websocket || !has_connection_token(headers, "upgrade") {
        return Err(invalid("the request is not a websocket upgrade").into());
    }
    if ctx.header(header::SEC_WEBSOCKET_VERSION) != Some(SUPPORTED_VERSION) {
        return Err(invalid("only websocket version 13 is supported").into());
    }
    let Some(key) = ctx.header(header::SEC_WEBSOCKET_KEY) else {
        return Err(invalid("missing Sec-WebSocket-Key").into());
    };
    let accept = HeaderValue::from_str(&derive_accept_key(key.trim().as_bytes())).map_err(HandlerError::other)?;

    let path = ctx.path().to_owned();
    let body = ResponseBody::upgrade(move |upgraded| async move {
        debug!(path = %path, "websocket session established");
        let socket = WebSocketStream::from_raw_socket(upgraded, Role::Server, None).await;
        session(socket).await;
    });

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    Ok(response)
}

fn invalid(detail: &str) -> ProblemDetails {
    ProblemDetails::bad_request("invalid-websocket-handshake", detail)
}
