//! Streaming codecs for the HTTP/1.x wire format.
//!
//! - [`RequestDecoder`] yields a request head followed by its payload items
//! - [`RequestAggregator`] joins those into complete requests bounded by a maximum length
//! - [`ResponseEncoder`] writes a response head and frames its payload
//! - [`ProxyDecoder`] consumes an optional PROXY protocol preamble before any of the above
//!
//! ```
//! use bytes::BytesMut;
//! use nimbus_http::codec::{DecodedRequest, RequestAggregator};
//! use tokio_util::codec::Decoder;
//!
//! let mut buf = BytesMut::from("GET /api/v3/node HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let mut aggregator = RequestAggregator::default();
//! match aggregator.decode(&mut buf) {
//!     Ok(Some(DecodedRequest::Request(request))) => assert_eq!(request.uri().path(), "/api/v3/node"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod aggregator;
mod body;
mod header;
mod proxy_decoder;
mod request_decoder;
mod response_encoder;

pub use aggregator::{DEFAULT_MAX_CONTENT_LENGTH, DecodedRequest, RequestAggregator};
pub use proxy_decoder::{ProxyDecoder, ProxyHeader, ProxyMode};
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
