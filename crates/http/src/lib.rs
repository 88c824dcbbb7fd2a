//! HTTP/1.x transport runtime of the nimbus management API engine.
//!
//! The crate reads requests off any `AsyncRead + AsyncWrite` stream, aggregates their
//! bodies, runs a [`handler::Handler`] for each of them on a bounded
//! [`pool::ExecutionPool`] and writes the responses back in request order.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use nimbus_http::connection::{ConnectionConfig, HttpConnection};
//! use nimbus_http::handler::make_handler;
//! use nimbus_http::pool::ExecutionPool;
//! use nimbus_http::protocol::ConnectionMeta;
//! use nimbus_http::protocol::body::ResponseBody;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tracing::{info, warn};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:2812").await?;
//!     let handler = Arc::new(make_handler(|request: Request<Bytes>| async move {
//!         Response::new(ResponseBody::from(format!("hello {}", request.uri().path())))
//!     }));
//!     let pool = Arc::new(ExecutionPool::new(4, 256)?);
//!
//!     loop {
//!         let (stream, peer) = match listener.accept().await {
//!             Ok(accepted) => accepted,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!         info!(%peer, "accepted connection");
//!
//!         let meta = ConnectionMeta::new(stream.local_addr().ok(), Some(peer));
//!         let (reader, writer) = stream.into_split();
//!         let connection = HttpConnection::new(reader, writer, meta, ConnectionConfig::default());
//!         let (handler, pool) = (Arc::clone(&handler), Arc::clone(&pool));
//!         tokio::spawn(async move {
//!             if let Err(e) = connection.process(handler, pool).await {
//!                 e.log();
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`protocol`]: heads, payload framing, addresses, response bodies and errors
//! - [`codec`]: request decoding and aggregation, response encoding, PROXY protocol
//! - [`connection`]: the per-connection state machine and the acceptor seam for TLS
//! - [`pool`]: bounded handler execution, saturation answers 503
//! - [`failure`]: classification of transport errors into log levels
//! - [`upgrade`]: hand-off of the raw stream after `101 Switching Protocols`
//!
//! # Limits
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - request heads up to 8 KiB with at most 64 headers
//! - request bodies up to [`connection::ConnectionConfig::max_content_length`]

pub mod codec;
pub mod connection;
pub mod failure;
pub mod handler;
pub mod pool;
pub mod protocol;
pub mod upgrade;

mod utils;
pub(crate) use utils::ensure;
