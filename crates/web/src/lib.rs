//! Management API layer of the nimbus engine.
//!
//! Handlers are described by a [`HandlerDescriptor`] (method, path template, parameter
//! sources, CORS policy, authentication requirement, processors) and registered in a
//! [`HandlerRegistry`] backed by a [`tree::HandlerTree`] of path segments. The
//! [`server::Dispatcher`] resolves the connection info of each request, matches it against
//! the tree and runs the handler pipeline.
//!
//! # Example
//!
//! ```no_run
//! use http::StatusCode;
//! use nimbus_web::{HandlerDescriptor, ParamSource, Server, ServerConfig, endpoint_fn, json_response};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::default())?;
//!     server.register(HandlerDescriptor::get("/api/v3/service/{name}").param(ParamSource::path("name")).handler(endpoint_fn(
//!         |_ctx, params| Box::pin(async move { Ok(json_response(StatusCode::OK, &json!({ "name": params.text(0) }))) }),
//!     )))?;
//!
//!     server.start().await?.wait().await;
//!     Ok(())
//! }
//! ```
//!
//! # Path templates
//!
//! - `literal` matches the segment exactly
//! - `{name}` matches any single segment and binds it as `name`
//! - `{*rest}` must be the last segment and binds everything that is left

pub mod auth;
pub mod config;
pub mod context;
pub mod cors;
pub mod date;
pub mod decoding;
pub mod descriptor;
pub mod error;
pub mod interceptor;
pub mod params;
pub mod problem;
pub mod registry;
pub mod resolver;
pub mod server;
pub mod tree;
pub mod websocket;

pub use auth::{AuthProvider, AuthProviderRegistry, AuthResult, RestUser};
pub use config::{ListenerConfig, ServerConfig};
pub use context::HttpContext;
pub use cors::CorsConfig;
pub use descriptor::{Endpoint, HandlerDescriptor, endpoint_fn};
pub use error::{ConfigError, HandlerError, RegistrationError, ServerError};
pub use params::{BoundParams, ParamSource};
pub use problem::{ProblemDetails, json_response};
pub use registry::HandlerRegistry;
pub use server::{RunningServer, Server};

pub use nimbus_http::protocol::body::ResponseBody;
