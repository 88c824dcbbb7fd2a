//! Response bodies as the transport writes them.
//!
//! Request bodies are aggregated by the codec before dispatch and handed to handlers as
//! `Bytes`; only the response side streams.

mod chunked_stream;
mod response_body;

pub use chunked_stream::{CHUNK_SIZE, ChunkedStream};
pub use response_body::ResponseBody;
