//! Listener setup and the dispatch of decoded requests to registered handlers.

use crate::auth::AuthProviderRegistry;
use crate::config::{ListenerConfig, ServerConfig};
use crate::context::HttpContext;
use crate::cors::{self, CorsConfig};
use crate::decoding::{decode_path, decode_request};
use crate::descriptor::{Endpoint, HandlerDescriptor};
use crate::error::{HandlerError, RegistrationError, ServerError};
use crate::params::{self, BoundParams};
use crate::problem::ProblemDetails;
use crate::registry::HandlerRegistry;
use crate::resolver::{ConnectionInfoResolver, default_resolver};
use crate::date::DateService;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, header};
use nimbus_http::connection::{Acceptor, ConnectionConfig, HttpConnection, PlainAcceptor};
use nimbus_http::handler::Handler;
use nimbus_http::pool::ExecutionPool;
use nimbus_http::protocol::ConnectionMeta;
use nimbus_http::protocol::body::ResponseBody;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

/// Answers every request no handler matched with a `404` problem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

#[async_trait]
impl Endpoint for NotFound {
    async fn handle(&self, _ctx: &mut HttpContext, _params: BoundParams) -> Result<Response<ResponseBody>, HandlerError> {
        Ok(ProblemDetails::not_found().into_response())
    }
}

pub struct Server {
    config: ServerConfig,
    registry: Arc<HandlerRegistry>,
    resolver: Arc<dyn ConnectionInfoResolver>,
    fallback: Arc<dyn Endpoint>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server").field("config", &self.config).field("registry", &self.registry).finish_non_exhaustive()
    }
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let auth = Arc::new(AuthProviderRegistry::new());
        Ok(Self {
            config,
            registry: Arc::new(HandlerRegistry::new(auth)),
            resolver: Arc::new(default_resolver()),
            fallback: Arc::new(NotFound),
        })
    }

    /// Replaces the resolver chain refining the connection info of each request.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ConnectionInfoResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Replaces the endpoint answering requests no handler matched.
    #[must_use]
    pub fn with_fallback(mut self, endpoint: impl Endpoint + 'static) -> Self {
        self.fallback = Arc::new(endpoint);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn auth_providers(&self) -> &Arc<AuthProviderRegistry> {
        self.registry.auth_providers()
    }

    pub fn register(&self, descriptor: HandlerDescriptor) -> Result<(), RegistrationError> {
        self.registry.register(descriptor)
    }

    /// The request handler used by every listener. Must be called inside a tokio runtime.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            registry: Arc::clone(&self.registry),
            resolver: Arc::clone(&self.resolver),
            fallback: Arc::clone(&self.fallback),
            default_cors: self.config.cors.clone(),
            max_content_length: self.config.max_content_length,
            date: DateService::new(),
        }
    }

    pub async fn start(self) -> Result<RunningServer, ServerError> {
        self.start_with(PlainAcceptor).await
    }

    /// Binds every configured listener and serves connections accepted through `acceptor`.
    ///
    /// Handlers registered after the start become visible to running listeners immediately.
    pub async fn start_with<A>(self, acceptor: A) -> Result<RunningServer, ServerError>
    where
        A: Acceptor + Sync + 'static,
    {
        let pool = ExecutionPool::new(self.config.pool_workers, self.config.pool_capacity).map_err(ServerError::Pool)?;
        let pool = Arc::new(pool);
        let dispatcher = Arc::new(self.dispatcher());
        let acceptor = Arc::new(acceptor);

        // dropping `running` on a failed bind stops the listeners bound so far
        let mut running = RunningServer { local_addrs: Vec::new(), tasks: Vec::new(), registry: Arc::clone(&self.registry) };
        for listener_config in &self.config.listeners {
            let address = listener_config.address;
            let listener = TcpListener::bind(address).await.map_err(|source| ServerError::Bind { address, source })?;
            let local_addr = listener.local_addr().unwrap_or(address);
            info!(address = %local_addr, proxy_mode = ?listener_config.proxy_mode, "start listening");

            let connection_config = self.config.connection_config(listener_config);
            running.local_addrs.push(local_addr);
            running.tasks.push(tokio::spawn(accept_loop(
                listener,
                Arc::clone(&acceptor),
                Arc::clone(&dispatcher),
                Arc::clone(&pool),
                connection_config,
            )));
        }

        Ok(running)
    }

    /// Shorthand for a single plain listener on `address`.
    pub async fn bind(address: SocketAddr) -> Result<RunningServer, ServerError> {
        let config = ServerConfig { listeners: vec![ListenerConfig::new(address)], ..ServerConfig::default() };
        Self::new(config)?.start().await
    }
}

async fn accept_loop<A>(
    listener: TcpListener,
    acceptor: Arc<A>,
    dispatcher: Arc<Dispatcher>,
    pool: Arc<ExecutionPool>,
    config: ConnectionConfig,
) where
    A: Acceptor + Sync + 'static,
{
    // dropped with this loop, which aborts every connection still open
    let mut connections = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished
                    && e.is_panic()
                {
                    error!(cause = %e, "connection task panicked");
                }
                continue;
            }
        };
        let (tcp_stream, peer_addr) = match accepted {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let acceptor = Arc::clone(&acceptor);
        let dispatcher = Arc::clone(&dispatcher);
        let pool = Arc::clone(&pool);
        let config = config.clone();

        connections.spawn(async move {
            if let Err(e) = tcp_stream.set_nodelay(true) {
                trace!(cause = %e, "failed to set TCP_NODELAY");
            }
            let local_addr = tcp_stream.local_addr().ok();

            let stream = match acceptor.accept(tcp_stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    e.log();
                    return;
                }
            };

            let meta = ConnectionMeta::new(local_addr, Some(peer_addr)).with_secure(acceptor.is_secure());
            let (reader, writer) = tokio::io::split(stream);
            match HttpConnection::new(reader, writer, meta, config).process(dispatcher, pool).await {
                Ok(()) => trace!(peer = %peer_addr, "connection closed"),
                Err(e) => e.log(),
            }
        });
    }
}

/// Handle of the listeners started by [`Server::start`]. Dropping it stops accepting and
/// closes every open connection.
pub struct RunningServer {
    local_addrs: Vec<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
    registry: Arc<HandlerRegistry>,
}

impl fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningServer").field("local_addrs", &self.local_addrs).finish_non_exhaustive()
    }
}

impl RunningServer {
    /// Bound addresses in listener order, with ephemeral ports resolved.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Runs until every listener task ended, which only happens on a panic.
    pub async fn wait(mut self) {
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await
                && e.is_panic()
            {
                error!(cause = %e, "listener task panicked");
            }
        }
    }

    /// Stops the listeners and aborts their connections. Handlers already running on the
    /// execution pool finish, but their responses are discarded.
    pub fn shutdown(self) {
        info!(addresses = ?self.local_addrs, "stop listening");
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Routes decoded requests through CORS, authentication, the processor pipeline and the
/// matched endpoint.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    resolver: Arc<dyn ConnectionInfoResolver>,
    fallback: Arc<dyn Endpoint>,
    default_cors: CorsConfig,
    max_content_length: usize,
    date: DateService,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("default_cors", &self.default_cors)
            .field("max_content_length", &self.max_content_length)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub async fn dispatch(&self, request: Request<Bytes>) -> Response<ResponseBody> {
        let method = request.method().clone();
        let path = request.uri().path().to_owned();

        let mut response = match decode_request(request, self.max_content_length) {
            Ok(request) => {
                let mut ctx = HttpContext::from_request(request);
                let info = self.resolver.resolve(&ctx, ctx.connection_info().clone());
                ctx.set_connection_info(info);

                let response = self.route(&mut ctx).await;
                ctx.finish(response)
            }
            Err(problem) => problem.into_response(),
        };

        response.headers_mut().entry(header::DATE).or_insert_with(|| self.date.header_value());
        debug!(%method, %path, status = response.status().as_u16(), "handled request");
        response
    }

    async fn route(&self, ctx: &mut HttpContext) -> Response<ResponseBody> {
        let segments = match decode_path(ctx.path()) {
            Ok(segments) => segments,
            Err(problem) => return problem.into_response(),
        };
        let Some(route) = self.registry.find_segments(&segments) else {
            return self.fallback(ctx).await;
        };

        if let Some(info) = cors::extract_preflight_info(ctx.request()) {
            let config = route
                .handler(info.request_method(), false)
                .map(|handler| handler.config().cors().unwrap_or(&self.default_cors));
            return cors::process_preflight_request(ctx, &info, config);
        }

        let Some(handler) = route.handler(ctx.method(), ctx.upgrade_requested()).cloned() else {
            return self.fallback(ctx).await;
        };

        let config = handler.config();
        if !cors::process_normal_request(ctx, config.cors().unwrap_or(&self.default_cors)) {
            return cors::violation("origin is not allowed for this route");
        }

        ctx.set_path_params(route.into_params());
        for (key, value) in config.hints() {
            ctx.set_hint(key.as_str(), value.as_str());
        }

        let sources = config.params();
        let processors = config.processors();
        let invocation = processors.invoke(ctx, handler.endpoint(), |ctx| params::bind(ctx, sources)).await;
        processors.resolve(ctx, invocation).await
    }

    async fn fallback(&self, ctx: &mut HttpContext) -> Response<ResponseBody> {
        match self.fallback.handle(ctx, BoundParams::default()).await {
            Ok(response) => response,
            Err(HandlerError::Response(response)) => *response,
            Err(e) => {
                error!(cause = %e, path = ctx.path(), "fallback handler failed");
                ProblemDetails::internal_error().into_response()
            }
        }
    }
}

impl Handler for Dispatcher {
    async fn call(&self, request: Request<Bytes>) -> Response<ResponseBody> {
        self.dispatch(request).await
    }
}
