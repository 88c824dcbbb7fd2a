//! Hand-off of a connection to another protocol after `101 Switching Protocols`.

use bytes::{Buf, Bytes};
use futures::future::BoxFuture;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Callback receiving the raw connection once the 101 response has been flushed.
pub type OnUpgrade = Box<dyn FnOnce(Upgraded) -> BoxFuture<'static, ()> + Send>;

/// The raw stream of an upgraded connection.
///
/// Bytes the HTTP decoder had already buffered past the upgrade request are replayed before
/// reading from the socket again.
pub struct Upgraded {
    buffered: Bytes,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl Upgraded {
    pub fn new<R, W>(buffered: Bytes, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self { buffered, reader: Box::new(reader), writer: Box::new(writer) }
    }
}

impl fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgraded").field("buffered", &self.buffered.len()).finish_non_exhaustive()
    }
}

impl AsyncRead for Upgraded {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.buffered.has_remaining() {
            let n = this.buffered.len().min(buf.remaining());
            buf.put_slice(&this.buffered.split_to(n));
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for Upgraded {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn replays_buffered_bytes_first() {
        let (client, server) = tokio::io::duplex(64);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let mut upgraded = Upgraded::new(Bytes::from_static(b"early "), server_read, server_write);

        client_write.write_all(b"late").await.unwrap();
        let mut received = [0_u8; 10];
        upgraded.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"early late");

        upgraded.write_all(b"pong").await.unwrap();
        let mut echoed = [0_u8; 4];
        client_read.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"pong");
    }
}
