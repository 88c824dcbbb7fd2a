//! `Transfer-Encoding: chunked` request payloads (RFC 9112 section 7.1).
//!
//! Chunk extensions and trailer fields are consumed and dropped.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::{Body, BodyCr, BodyLf, End, EndCr, EndLf, Extension, Size, SizeLf, SizeLws, Trailer, TrailerLf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    Size,
    SizeLws,
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut buf = None;
            self.state = match self.state.step(src, &mut self.remaining_size, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(state) => state?,
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.has_remaining() {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

/// Expects `$expected` next and moves to `$next`, failing with `$reason` otherwise.
macro_rules! expect_byte {
    ($src:ident, $expected:literal, $next:expr, $reason:literal) => {{
        match try_next_byte!($src) {
            $expected => Poll::Ready(Ok($next)),
            _ => Poll::Ready(Err(ParseError::invalid_body($reason))),
        }
    }};
}

type Step = Poll<Result<ChunkedState, ParseError>>;

impl ChunkedState {
    fn step(self, src: &mut BytesMut, remaining: &mut u64, buf: &mut Option<Bytes>) -> Step {
        match self {
            Size => Self::read_size(src, remaining),
            SizeLws => Self::read_size_lws(src),
            Extension => Self::read_extension(src),
            SizeLf => match try_next_byte!(src) {
                b'\n' if *remaining == 0 => Poll::Ready(Ok(EndCr)),
                b'\n' => Poll::Ready(Ok(Body)),
                _ => Poll::Ready(Err(ParseError::invalid_body("invalid chunk size LF"))),
            },
            Body => Self::read_body(src, remaining, buf),
            BodyCr => expect_byte!(src, b'\r', BodyLf, "invalid chunk body CR"),
            BodyLf => expect_byte!(src, b'\n', Size, "invalid chunk body LF"),
            Trailer => match try_next_byte!(src) {
                b'\r' => Poll::Ready(Ok(TrailerLf)),
                _ => Poll::Ready(Ok(Trailer)),
            },
            TrailerLf => expect_byte!(src, b'\n', EndCr, "invalid trailer end LF"),
            EndCr => match try_next_byte!(src) {
                b'\r' => Poll::Ready(Ok(EndLf)),
                _ => Poll::Ready(Ok(Trailer)),
            },
            EndLf => expect_byte!(src, b'\n', End, "invalid chunk end LF"),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn read_size(src: &mut BytesMut, size: &mut u64) -> Step {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return Poll::Ready(Err(ParseError::invalid_body("invalid chunk size line"))),
        };

        match size.checked_mul(16).and_then(|size| size.checked_add(u64::from(digit))) {
            Some(new_size) => {
                *size = new_size;
                Poll::Ready(Ok(Size))
            }
            None => Poll::Ready(Err(ParseError::invalid_body("chunk size overflow"))),
        }
    }

    fn read_size_lws(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => Poll::Ready(Err(ParseError::invalid_body("invalid chunk size linear white space"))),
        }
    }

    fn read_extension(src: &mut BytesMut) -> Step {
        // a bare LF inside an extension is rejected rather than treated as line end
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Err(ParseError::invalid_body("invalid chunk extension contains newline"))),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_body(src: &mut BytesMut, remaining: &mut u64, buf: &mut Option<Bytes>) -> Step {
        if *remaining == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let read_size = usize::try_from(*remaining).unwrap_or(usize::MAX).min(src.len());
        *remaining -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if *remaining > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> Bytes {
        decoder.decode(buffer).unwrap().unwrap().into_bytes().unwrap()
    }

    #[test]
    fn single_chunk() {
        let mut buffer = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"1234567890abcdef"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn multiple_chunks() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"hello"));
        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b", world"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn extensions_and_trailers_are_skipped() {
        let mut buffer = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\nTrailer: value\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"hello"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn partial_chunk_is_emitted_as_it_arrives() {
        let mut buffer = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"hel"));
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"lo\r\n0\r\n\r\n");
        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"lo"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn invalid_size_and_missing_crlf() {
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut BytesMut::from(&b"xyz\r\n"[..])).is_err());

        let mut buffer = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"hello"));
        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn size_overflow() {
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut BytesMut::from(&b"fffffffffffffffff\r\n"[..])).is_err());
    }

    #[test]
    fn large_chunk() {
        let size = 1024 * 1024;
        let mut data = format!("{size:x}\r\n").into_bytes();
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let mut buffer = BytesMut::from(&data[..]);
        let mut decoder = ChunkedDecoder::new();

        let bytes = chunk(&mut decoder, &mut buffer);
        assert_eq!(bytes.len(), size);
        assert!(bytes.iter().all(|&b| b == b'A'));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
