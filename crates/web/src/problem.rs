//! `application/problem+json` bodies (RFC 9457) for every error the server answers itself.

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header};
use nimbus_http::protocol::body::ResponseBody;
use serde::Serialize;
use tracing::error;

pub const PROBLEM_JSON: &str = "application/problem+json";

/// A problem document. `type` is a short slug such as `route-not-found`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    kind: String,
    title: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ProblemDetails {
    pub fn new(status: StatusCode, kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), title: status.canonical_reason().unwrap_or("Unknown").to_owned(), status: status.as_u16(), detail: None }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "route-not-found").detail("no handler is registered for the requested route")
    }

    pub fn bad_request(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, kind).detail(detail)
    }

    pub fn internal_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal-error")
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let body = serde_json::to_vec(&self).unwrap_or_else(|e| {
            error!(cause = %e, "failed to serialize problem details");
            Vec::new()
        });
        let mut response = Response::new(ResponseBody::full(Bytes::from(body)));
        *response.status_mut() = self.status();
        response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
        response
    }
}

/// A JSON response with `status`; serialization failures become a 500 problem.
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(ResponseBody::full(body));
            *response.status_mut() = status;
            response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(mime::APPLICATION_JSON.as_ref()));
            response
        }
        Err(e) => {
            error!(cause = %e, "failed to serialize response body");
            ProblemDetails::internal_error().into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn serializes_as_problem_json() {
        let response = ProblemDetails::new(StatusCode::FORBIDDEN, "missing-scopes").detail("scope global:admin required").into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "missing-scopes", "title": "Forbidden", "status": 403, "detail": "scope global:admin required"})
        );
    }

    #[tokio::test]
    async fn detail_is_optional() {
        let body = ProblemDetails::internal_error().into_response().into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"type":"internal-error","title":"Internal Server Error","status":500}"#);
    }
}
