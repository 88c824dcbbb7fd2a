use crate::problem::ProblemDetails;
use http::{Method, Response};
use nimbus_http::protocol::body::ResponseBody;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Why a handler could not be added to the registry.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("a handler for {method} {path} is already registered")]
    DuplicateHandler { path: String, method: Method },

    #[error("segment {segment} of {path} is ambiguous with the existing sibling {existing}")]
    AmbiguousSegment { path: String, segment: String, existing: String },

    #[error("the wildcard segment must be the last segment of {path}")]
    WildcardNotLast { path: String },

    #[error("invalid segment {segment:?} in {path}")]
    InvalidSegment { path: String, segment: String },

    #[error("path parameter {name} is not part of {path}")]
    UnknownPathParameter { path: String, name: String },
}

/// What an endpoint or processor can fail with.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A complete response to send as is; no exception processor runs for it.
    #[error("request answered early with status {}", .0.status())]
    Response(Box<Response<ResponseBody>>),

    #[error("json processing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn response(response: Response<ResponseBody>) -> Self {
        Self::Response(Box::new(response))
    }

    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }
}

impl From<ProblemDetails> for HandlerError {
    fn from(problem: ProblemDetails) -> Self {
        Self::response(problem.into_response())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one listener must be configured")]
    NoListener,

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid cors origin pattern {0:?}")]
    InvalidOrigin(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind { address: SocketAddr, source: io::Error },

    #[error("failed to start the execution pool: {0}")]
    Pool(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}
