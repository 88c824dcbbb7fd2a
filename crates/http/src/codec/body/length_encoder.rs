use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

/// Writes exactly `length` payload bytes; anything beyond is dropped with a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let PayloadItem::Chunk(mut bytes) = item else {
            return Ok(());
        };

        let mut left = usize::try_from(self.length).unwrap_or(usize::MAX).min(bytes.remaining());
        dst.reserve(left);
        while left > 0 {
            let chunk = bytes.chunk();
            let take = chunk.len().min(left);
            dst.extend_from_slice(&chunk[..take]);
            bytes.advance(take);
            left -= take;
            self.length -= take as u64;
        }

        if bytes.has_remaining() {
            warn!(extra = bytes.remaining(), "payload exceeds announced content-length");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn truncates_to_announced_length() {
        let mut encoder = LengthEncoder::new(4);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"ab")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"cdef")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"abcd");
    }
}
