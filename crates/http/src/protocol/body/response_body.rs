use crate::protocol::HttpError;
use crate::protocol::body::chunked_stream::{CHUNK_SIZE, ChunkedStream};
use crate::upgrade::{OnUpgrade, Upgraded};
use bytes::Bytes;
use futures::Stream;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncRead;

type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// The body of every response written by the transport.
pub struct ResponseBody {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Bytes),
    Stream(UnsyncBoxBody<Bytes, HttpError>),
    Reader(ChunkedStream<BoxedReader>),
    Upgrade(Option<OnUpgrade>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() { Self::empty() } else { Self { kind: Kind::Full(bytes) } }
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes, Error = HttpError> + Send + 'static,
    {
        Self { kind: Kind::Stream(UnsyncBoxBody::new(body)) }
    }

    /// A body pulled from `reader` until it is exhausted, always sent chunked.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self { kind: Kind::Reader(ChunkedStream::new(Box::pin(reader))) }
    }

    /// An empty body that takes over the connection after a 101 response was written.
    pub fn upgrade<F, Fut>(on_upgrade: F) -> Self
    where
        F: FnOnce(Upgraded) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: OnUpgrade = Box::new(move |upgraded| Box::pin(on_upgrade(upgraded)));
        Self { kind: Kind::Upgrade(Some(callback)) }
    }

    pub fn is_upgrade(&self) -> bool {
        matches!(self.kind, Kind::Upgrade(_))
    }

    /// Takes the upgrade callback, leaving an empty body behind.
    pub fn take_upgrade(&mut self) -> Option<OnUpgrade> {
        match &mut self.kind {
            Kind::Upgrade(callback) => callback.take(),
            _ => None,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Empty => "Empty",
            Kind::Full(_) => "Full",
            Kind::Stream(_) => "Stream",
            Kind::Reader(_) => "Reader",
            Kind::Upgrade(_) => "Upgrade",
        };
        f.debug_struct("ResponseBody").field("kind", &kind).field("size_hint", &self.size_hint().exact()).finish()
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::full(bytes)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::full(bytes)
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::full(value)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::full(Bytes::from_static(value.as_bytes()))
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let kind = &mut self.get_mut().kind;
        match kind {
            Kind::Empty | Kind::Upgrade(_) => Poll::Ready(None),
            Kind::Full(bytes) if bytes.is_empty() => Poll::Ready(None),
            Kind::Full(bytes) => {
                let slice = bytes.split_to(bytes.len().min(CHUNK_SIZE));
                Poll::Ready(Some(Ok(Frame::data(slice))))
            }
            Kind::Stream(box_body) => Pin::new(box_body).poll_frame(cx),
            Kind::Reader(stream) => match Pin::new(stream).poll_next(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(crate::protocol::SendError::from(e).into()))),
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Empty | Kind::Upgrade(_) => true,
            Kind::Full(bytes) => bytes.is_empty(),
            Kind::Stream(box_body) => box_body.is_end_stream(),
            Kind::Reader(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Empty | Kind::Upgrade(_) => SizeHint::with_exact(0),
            Kind::Full(bytes) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(box_body) => box_body.size_hint(),
            Kind::Reader(_) => SizeHint::new(),
        }
    }
}
