use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use futures::stream::FuturesOrdered;
use futures::{FutureExt, SinkExt, StreamExt};
use http::{HeaderValue, Method, Request, Response, StatusCode, Version, header};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, sleep, timeout};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, trace, warn};

use crate::codec::{DEFAULT_MAX_CONTENT_LENGTH, DecodedRequest, ProxyDecoder, ProxyMode, RequestAggregator, ResponseEncoder};
use crate::failure::TransportError;
use crate::handler::Handler;
use crate::pool::ExecutionPool;
use crate::protocol::body::ResponseBody;
use crate::protocol::{CancelSend, ConnectionMeta, Message, PayloadItem, PayloadSize, ResponseHead, SendError, has_connection_token, is_keep_alive, is_upgrade};
use crate::upgrade::{OnUpgrade, Upgraded};

const INIT_BUFFER_SIZE: usize = 8 * 1024;

type ResponseMessage = Message<(ResponseHead, PayloadSize), Bytes>;

/// Per-listener transport settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// largest aggregated request body, larger ones are answered with 413
    pub max_content_length: usize,
    /// how long a connection may sit idle between requests
    pub read_timeout: Duration,
    /// full bodies up to this size are written with `Content-Length`, larger ones chunked
    pub inline_threshold: u64,
    /// requests read ahead while earlier responses are still pending
    pub max_pipelined: usize,
    pub proxy_mode: ProxyMode,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            read_timeout: Duration::from_secs(30),
            inline_threshold: 64 * 1024,
            max_pipelined: 16,
            proxy_mode: ProxyMode::Disabled,
        }
    }
}

/// A response waiting for its turn on the wire, with what the request said about it.
struct Pending {
    response: Response<ResponseBody>,
    version: Version,
    head_only: bool,
    keep_alive: bool,
}

enum Written {
    KeepAlive,
    Close,
    Upgrade(OnUpgrade),
}

/// One HTTP/1.x connection.
///
/// Requests are read ahead while earlier ones are still being handled on the
/// [`ExecutionPool`]; responses are written strictly in request order. The connection
/// closes after a response that is not kept alive, after a request it cannot decode, after
/// the peer stops sending, or after `read_timeout` without a request.
pub struct HttpConnection<R, W> {
    reader: R,
    writer: W,
    meta: ConnectionMeta,
    config: ConnectionConfig,
}

impl<R, W> std::fmt::Debug for HttpConnection<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").field("meta", &self.meta).field("config", &self.config).finish_non_exhaustive()
    }
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(reader: R, writer: W, meta: ConnectionMeta, config: ConnectionConfig) -> Self {
        Self { reader, writer, meta, config }
    }

    pub async fn process<H>(self, handler: Arc<H>, pool: Arc<ExecutionPool>) -> Result<(), TransportError>
    where
        H: Handler + Sync + 'static,
    {
        let Self { reader, writer, mut meta, config } = self;

        let mut framed_read = FramedRead::with_capacity(reader, ProxyDecoder::new(config.proxy_mode), INIT_BUFFER_SIZE);
        if config.proxy_mode != ProxyMode::Disabled {
            match timeout(config.read_timeout, framed_read.next()).await {
                Err(_elapsed) => return Err(TransportError::Timeout(config.read_timeout)),
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => {
                    debug!(cause = %e, "rejected connection without valid proxy protocol preamble");
                    return Err(e.into());
                }
                Ok(Some(Ok(preamble))) => meta = meta.with_proxied_source(preamble.source()),
            }
        }

        let mut framed_read = framed_read.map_decoder(|_proxy| RequestAggregator::new(config.max_content_length));
        let mut framed_write = FramedWrite::new(writer, ResponseEncoder::new());

        let mut in_flight = FuturesOrdered::<BoxFuture<'static, Result<Pending, TransportError>>>::new();
        let mut reading = true;
        let mut upgrading = false;
        let idle = sleep(config.read_timeout);
        tokio::pin!(idle);

        let on_upgrade = loop {
            if !reading && in_flight.is_empty() {
                break None;
            }

            tokio::select! {
                biased;

                Some(pending) = in_flight.next(), if !in_flight.is_empty() => {
                    match write_response(&mut framed_write, pending?, config.inline_threshold).await? {
                        Written::KeepAlive => {}
                        Written::Close => break None,
                        Written::Upgrade(on_upgrade) => break Some(on_upgrade),
                    }
                    upgrading = false;
                    idle.as_mut().reset(Instant::now() + config.read_timeout);
                }

                frame = framed_read.next(), if reading && !upgrading && in_flight.len() < config.max_pipelined => {
                    idle.as_mut().reset(Instant::now() + config.read_timeout);
                    match frame {
                        Some(Ok(DecodedRequest::Request(request))) => {
                            let keep_alive = is_keep_alive(request.version(), request.headers());
                            upgrading = is_upgrade(request.headers());
                            reading = keep_alive;
                            in_flight.push_back(dispatch(request, &meta, keep_alive, &handler, &pool));
                        }

                        Some(Ok(DecodedRequest::Continue)) => {
                            let writer = framed_write.get_mut();
                            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
                            writer.flush().await?;
                            trace!("sent 100 continue");
                        }

                        Some(Err(e)) => {
                            let Some(status) = e.status_code() else {
                                return Err(e.into());
                            };
                            debug!(cause = %e, %status, "can't decode request, closing connection");

                            while let Some(pending) = in_flight.next().await {
                                if !matches!(write_response(&mut framed_write, pending?, config.inline_threshold).await?, Written::KeepAlive) {
                                    return Ok(());
                                }
                            }
                            let rejection = Pending { response: status_response(status), version: Version::HTTP_11, head_only: false, keep_alive: false };
                            write_response(&mut framed_write, rejection, config.inline_threshold).await?;
                            break None;
                        }

                        None => {
                            trace!("peer finished sending requests");
                            reading = false;
                        }
                    }
                }

                () = &mut idle, if in_flight.is_empty() => {
                    return Err(TransportError::Timeout(config.read_timeout));
                }

                else => break None,
            }
        };

        let Some(on_upgrade) = on_upgrade else {
            if let Err(e) = framed_write.get_mut().shutdown().await {
                trace!(cause = %e, "shutdown after close");
            }
            return Ok(());
        };

        let parts = framed_read.into_parts();
        let upgraded = Upgraded::new(parts.read_buf.freeze(), parts.io, framed_write.into_inner());
        debug!(peer = ?meta.peer_addr(), "connection upgraded");
        on_upgrade(upgraded).await;
        Ok(())
    }
}

fn dispatch<H>(
    mut request: Request<Bytes>,
    meta: &ConnectionMeta,
    keep_alive: bool,
    handler: &Arc<H>,
    pool: &ExecutionPool,
) -> BoxFuture<'static, Result<Pending, TransportError>>
where
    H: Handler + Sync + 'static,
{
    let version = request.version();
    let head_only = request.method() == Method::HEAD;
    request.extensions_mut().insert(meta.clone());

    let handler = Arc::clone(handler);
    match pool.submit(async move { handler.call(request).await }) {
        Ok(join_handle) => async move {
            let response = match join_handle.await {
                Ok(response) => response,
                Err(e) if e.is_cancelled() => return Err(TransportError::ChannelClosed),
                Err(e) => {
                    error!(cause = %e, "request handler panicked");
                    status_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
            };
            Ok(Pending { response, version, head_only, keep_alive })
        }
        .boxed(),

        Err(rejected) => {
            warn!(cause = %rejected, "rejecting request");
            let response = status_response(StatusCode::SERVICE_UNAVAILABLE);
            future::ready(Ok(Pending { response, version, head_only, keep_alive })).boxed()
        }
    }
}

async fn write_response<W>(framed_write: &mut FramedWrite<W, ResponseEncoder>, pending: Pending, inline_threshold: u64) -> Result<Written, SendError>
where
    W: AsyncWrite + Unpin,
{
    let Pending { response, version, head_only, keep_alive } = pending;
    if response.extensions().get::<CancelSend>().is_some() {
        trace!("response cancelled by handler, closing connection");
        return Ok(Written::Close);
    }
    let (mut parts, mut body) = response.into_parts();
    parts.version = if version == Version::HTTP_10 { Version::HTTP_10 } else { Version::HTTP_11 };

    if parts.status == StatusCode::SWITCHING_PROTOCOLS
        && let Some(on_upgrade) = body.take_upgrade()
    {
        framed_write.send(ResponseMessage::Header((ResponseHead::from_parts(parts, ()), PayloadSize::Empty))).await?;
        return Ok(Written::Upgrade(on_upgrade));
    }

    let keep_alive = keep_alive && !has_connection_token(&parts.headers, "close");
    let connection = if keep_alive { "keep-alive" } else { "close" };
    parts.headers.insert(header::CONNECTION, HeaderValue::from_static(connection));

    let exact = body.size_hint().exact();
    let payload_size = if head_only {
        if let Some(length) = exact
            && !parts.headers.contains_key(header::CONTENT_LENGTH)
        {
            parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }
        PayloadSize::Empty
    } else {
        PayloadSize::for_response(exact, inline_threshold)
    };

    framed_write.feed(ResponseMessage::Header((ResponseHead::from_parts(parts, ()), payload_size))).await?;
    if !payload_size.is_empty() {
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(SendError::invalid_body)?;
            if let Ok(data) = frame.into_data() {
                framed_write.feed(ResponseMessage::Payload(PayloadItem::Chunk(data))).await?;
            }
        }
    }
    framed_write.send(ResponseMessage::Payload(PayloadItem::Eof)).await?;

    Ok(if keep_alive { Written::KeepAlive } else { Written::Close })
}

fn status_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::empty());
    *response.status_mut() = status;
    response
}
