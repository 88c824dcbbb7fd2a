use crate::codec::RequestDecoder;
use crate::ensure;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};
use bytes::{Bytes, BytesMut};
use http::Request;
use tokio_util::codec::Decoder;

/// Default upper bound for an aggregated request body.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 2 * 1024 * 1024;

/// What the connection reads off the wire.
#[derive(Debug)]
pub enum DecodedRequest {
    /// The head asked for `100 Continue` before sending its body.
    Continue,
    /// A complete request with its body.
    Request(Request<Bytes>),
}

/// Collects the streamed payload of each request into one buffer of at most
/// `max_content_length` bytes.
///
/// All partial state lives in the decoder, so dropping a pending read and reading again
/// later never loses bytes.
#[derive(Debug)]
pub struct RequestAggregator {
    decoder: RequestDecoder,
    pending: Option<(RequestHeader, BytesMut)>,
    max_content_length: usize,
}

impl RequestAggregator {
    pub fn new(max_content_length: usize) -> Self {
        Self { decoder: RequestDecoder::new(), pending: None, max_content_length }
    }
}

impl Default for RequestAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_LENGTH)
    }
}

impl Decoder for RequestAggregator {
    type Item = DecodedRequest;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let max = self.max_content_length;
        loop {
            match self.decoder.decode(src)? {
                None => return Ok(None),

                Some(Message::Header((header, payload_size))) => {
                    if let PayloadSize::Length(length) = payload_size {
                        ensure!(length <= max as u64, ParseError::too_large_body(max));
                    }

                    let expects_continue = header.expects_continue() && !payload_size.is_empty();
                    let capacity = match payload_size {
                        PayloadSize::Length(length) => usize::try_from(length).unwrap_or(max),
                        _ => 0,
                    };
                    self.pending = Some((header, BytesMut::with_capacity(capacity)));

                    if expects_continue {
                        return Ok(Some(DecodedRequest::Continue));
                    }
                }

                Some(Message::Payload(PayloadItem::Chunk(bytes))) => {
                    let Some((_, body)) = &mut self.pending else {
                        return Err(ParseError::invalid_body("payload without request head"));
                    };
                    ensure!(body.len() + bytes.len() <= max, ParseError::too_large_body(max));
                    body.extend_from_slice(&bytes);
                }

                Some(Message::Payload(PayloadItem::Eof)) => {
                    let (header, body) = self.pending.take().ok_or_else(|| ParseError::invalid_body("payload without request head"))?;
                    return Ok(Some(DecodedRequest::Request(header.body(body.freeze()))));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use indoc::indoc;

    fn request(item: Option<DecodedRequest>) -> Request<Bytes> {
        match item {
            Some(DecodedRequest::Request(request)) => request,
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn pipelined_requests() {
        let str = indoc! {r##"
        POST /api/v3/group HTTP/1.1
        Content-Length: 4

        abcdGET /api/v3/node HTTP/1.1
        Host: localhost

        "##};
        let mut buf = BytesMut::from(str);
        let mut aggregator = RequestAggregator::default();

        let first = request(aggregator.decode(&mut buf).unwrap());
        assert_eq!(first.method(), Method::POST);
        assert_eq!(first.body().as_ref(), b"abcd");

        let second = request(aggregator.decode(&mut buf).unwrap());
        assert_eq!(second.uri().path(), "/api/v3/node");
        assert!(second.body().is_empty());

        assert!(aggregator.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn chunked_body_is_joined() {
        let mut buf = BytesMut::from("POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n");
        let mut aggregator = RequestAggregator::default();
        assert_eq!(request(aggregator.decode(&mut buf).unwrap()).body().as_ref(), b"hello world");
    }

    #[test]
    fn body_arriving_in_pieces() {
        let mut buf = BytesMut::from("PUT /x HTTP/1.1\r\nContent-Length: 6\r\n\r\nabc");
        let mut aggregator = RequestAggregator::default();
        assert!(aggregator.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"def");
        assert_eq!(request(aggregator.decode(&mut buf).unwrap()).body().as_ref(), b"abcdef");
    }

    #[test]
    fn announced_length_over_limit() {
        let mut buf = BytesMut::from("POST /x HTTP/1.1\r\nContent-Length: 11\r\n\r\n");
        let mut aggregator = RequestAggregator::new(10);
        assert!(matches!(aggregator.decode(&mut buf), Err(ParseError::TooLargeBody { max_size: 10 })));
    }

    #[test]
    fn chunked_over_limit() {
        let mut buf = BytesMut::from("POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n8\r\n12345678\r\n8\r\n12345678\r\n0\r\n\r\n");
        let mut aggregator = RequestAggregator::new(10);
        assert!(matches!(aggregator.decode(&mut buf), Err(ParseError::TooLargeBody { .. })));
    }

    #[test]
    fn expect_continue_comes_first() {
        let mut buf = BytesMut::from("POST /x HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\n");
        let mut aggregator = RequestAggregator::default();

        assert!(matches!(aggregator.decode(&mut buf).unwrap(), Some(DecodedRequest::Continue)));
        assert!(aggregator.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"ok");
        assert_eq!(request(aggregator.decode(&mut buf).unwrap()).body().as_ref(), b"ok");
    }
}
