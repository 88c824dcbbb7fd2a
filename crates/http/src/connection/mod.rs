//! Connection lifecycle: read requests, hand them to the execution pool, write responses
//! back in request order, keep the connection alive or close it.

mod acceptor;
mod http_connection;

pub use acceptor::{Acceptor, LocalAcceptor, PlainAcceptor};
pub use http_connection::{ConnectionConfig, HttpConnection};
