use bytes::{Buf, Bytes};

/// A unit flowing through the codecs: either a head or a piece of its payload.
///
/// `T` is the head type (request or response head plus its [`PayloadSize`]), `Data` is the
/// buffer type carried by payload chunks.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    Header(T),
    Payload(PayloadItem<Data>),
}

/// One item of a payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

/// How the payload of a message is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` framing
    Length(u64),
    /// `Transfer-Encoding: chunked` framing
    Chunked,
    /// no payload at all
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Picks the response framing for a body of the given exact size.
    ///
    /// Bodies of unknown size and bodies larger than `inline_threshold` are streamed chunked,
    /// everything else is written inline with a `Content-Length`.
    pub fn for_response(exact: Option<u64>, inline_threshold: u64) -> Self {
        match exact {
            Some(0) => PayloadSize::Empty,
            Some(length) if length <= inline_threshold => PayloadSize::Length(length),
            _ => PayloadSize::Chunked,
        }
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_framing_respects_inline_threshold() {
        assert_eq!(PayloadSize::for_response(Some(0), 1024), PayloadSize::Empty);
        assert_eq!(PayloadSize::for_response(Some(12), 1024), PayloadSize::Length(12));
        assert_eq!(PayloadSize::for_response(Some(1024), 1024), PayloadSize::Length(1024));
        assert_eq!(PayloadSize::for_response(Some(1025), 1024), PayloadSize::Chunked);
        assert_eq!(PayloadSize::for_response(None, 1024), PayloadSize::Chunked);
    }
}
