use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};

/// Size of the slices a streamed response body is cut into.
pub const CHUNK_SIZE: usize = 8192;

pin_project! {
    /// Pulls a response body of unknown length out of an [`AsyncRead`] in slices of at most
    /// `chunk_size` bytes.
    ///
    /// The end of the input is detected by reading one byte ahead and keeping it for the next
    /// chunk; the source length is never assumed.
    #[derive(Debug)]
    pub struct ChunkedStream<R> {
        #[pin]
        reader: R,
        pushback: Option<u8>,
        chunk_size: usize,
        progress: u64,
        end: bool,
    }
}

impl<R: AsyncRead> ChunkedStream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self { reader, pushback: None, chunk_size: chunk_size.max(1), progress: 0, end: false }
    }

    /// Bytes handed out so far.
    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Always unknown.
    pub fn length(&self) -> Option<u64> {
        None
    }

    /// Resolves to `true` once the source is exhausted. A byte read while looking ahead is pushed
    /// back and becomes the first byte of the next chunk.
    pub fn poll_end_of_input(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<bool>> {
        let this = self.project();
        if *this.end {
            return Poll::Ready(Ok(true));
        }
        if this.pushback.is_some() {
            return Poll::Ready(Ok(false));
        }

        let mut byte = [0_u8; 1];
        let mut buf = ReadBuf::new(&mut byte);
        ready!(this.reader.poll_read(cx, &mut buf))?;

        if buf.filled().is_empty() {
            *this.end = true;
            Poll::Ready(Ok(true))
        } else {
            *this.pushback = Some(byte[0]);
            Poll::Ready(Ok(false))
        }
    }
}

impl<R: AsyncRead> Stream for ChunkedStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match ready!(self.as_mut().poll_end_of_input(cx)) {
            Err(e) => return Poll::Ready(Some(Err(e))),
            Ok(true) => return Poll::Ready(None),
            Ok(false) => {}
        }

        let this = self.project();
        let Some(first) = *this.pushback else {
            return Poll::Ready(None);
        };

        let mut chunk = vec![0_u8; *this.chunk_size];
        chunk[0] = first;
        let read = if chunk.len() > 1 {
            let mut buf = ReadBuf::new(&mut chunk[1..]);
            match this.reader.poll_read(cx, &mut buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(Ok(())) => buf.filled().len(),
            }
        } else {
            // the pending byte fills the chunk, the next poll looks ahead again
            0
        };

        if read == 0 && chunk.len() > 1 {
            *this.end = true;
        }
        this.pushback.take();
        chunk.truncate(read + 1);
        *this.progress += chunk.len() as u64;
        Poll::Ready(Some(Ok(Bytes::from(chunk))))
    }
}
