use crate::failure::TransportError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Turns an accepted socket into the stream HTTP is spoken on.
///
/// This is where TLS plugs in: an implementation performs the handshake and reports handshake
/// failures as [`TransportError::Tls`] so they are classified like every other transport error.
#[trait_variant::make(Acceptor: Send)]
pub trait LocalAcceptor {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn accept(&self, stream: TcpStream) -> Result<Self::Stream, TransportError>;

    /// Whether accepted streams are encrypted, which makes the base scheme `https`.
    fn is_secure(&self) -> bool;
}

/// Plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAcceptor;

impl Acceptor for PlainAcceptor {
    type Stream = TcpStream;

    async fn accept(&self, stream: TcpStream) -> Result<TcpStream, TransportError> {
        Ok(stream)
    }

    fn is_secure(&self) -> bool {
        false
    }
}
