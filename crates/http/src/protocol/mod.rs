//! Protocol types shared by the codecs, the connection and the web layer.
//!
//! - [`Message`], [`PayloadItem`] and [`PayloadSize`] flow through the codecs
//! - [`RequestHeader`] and [`ResponseHead`] are the decoded/encoded heads
//! - [`HostAndPort`], [`ConnectionInfo`] and [`ConnectionMeta`] describe who is connected
//! - [`body::ResponseBody`] is what handlers answer with

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;
pub use request::{has_connection_token, is_keep_alive, is_upgrade};

mod response;
pub use response::{CancelSend, ResponseHead};

mod address;
pub use address::{ConnectionInfo, ConnectionMeta, HostAndPort, default_port_for_scheme};

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
