use http::Response;

/// A response head before its body is attached; what the header encoder writes.
pub type ResponseHead = Response<()>;

/// Response extension telling the connection to write nothing and close.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelSend;
