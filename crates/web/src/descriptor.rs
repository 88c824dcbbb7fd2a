//! What gets registered: a path template, a method, the handler configuration and the
//! endpoint to run.
//!
//! ```
//! use nimbus_web::descriptor::{HandlerDescriptor, endpoint_fn};
//! use nimbus_web::params::ParamSource;
//! use nimbus_web::problem::json_response;
//! use http::StatusCode;
//!
//! let descriptor = HandlerDescriptor::get("/api/v3/service/{name}")
//!     .authenticate(["basic"], ["cloudnet_rest:service_read"])
//!     .param(ParamSource::path("name"))
//!     .handler(endpoint_fn(|_ctx, params| {
//!         Box::pin(async move {
//!             let name = params.text(0).unwrap_or_default().to_owned();
//!             Ok(json_response(StatusCode::OK, &name))
//!         })
//!     }));
//! assert_eq!(descriptor.path(), "/api/v3/service/{name}");
//! ```

use crate::context::HttpContext;
use crate::cors::CorsConfig;
use crate::error::HandlerError;
use crate::interceptor::{ExceptionProcessor, PostProcessor, PreProcessor, Processors};
use crate::params::{BoundParams, ParamSource};
use async_trait::async_trait;
use futures::future::BoxFuture;
use http::{Method, Response};
use nimbus_http::protocol::body::ResponseBody;
use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Pseudo method for handlers answering `GET` requests that carry `Connection: upgrade`.
pub static UPGRADE: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"UPGRADE").expect("valid method token"));

/// The executable part of a handler.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn handle(&self, ctx: &mut HttpContext, params: BoundParams) -> Result<Response<ResponseBody>, HandlerError>;
}

/// An [`Endpoint`] backed by a closure returning a boxed future.
pub struct EndpointFn<F> {
    f: F,
}

impl<F> fmt::Debug for EndpointFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointFn").finish_non_exhaustive()
    }
}

pub fn endpoint_fn<F>(f: F) -> EndpointFn<F>
where
    F: for<'a> Fn(&'a mut HttpContext, BoundParams) -> BoxFuture<'a, Result<Response<ResponseBody>, HandlerError>> + Send + Sync,
{
    EndpointFn { f }
}

#[async_trait]
impl<F> Endpoint for EndpointFn<F>
where
    F: for<'a> Fn(&'a mut HttpContext, BoundParams) -> BoxFuture<'a, Result<Response<ResponseBody>, HandlerError>> + Send + Sync,
{
    async fn handle(&self, ctx: &mut HttpContext, params: BoundParams) -> Result<Response<ResponseBody>, HandlerError> {
        (self.f)(ctx, params).await
    }
}

/// Which providers may authenticate a request and which scopes it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequirement {
    providers: Vec<String>,
    scopes: BTreeSet<String>,
}

impl AuthRequirement {
    pub fn new<P, S>(providers: P, scopes: S) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self { providers: providers.into_iter().map(Into::into).collect(), scopes: scopes.into_iter().map(Into::into).collect() }
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }
}

/// Everything about a handler except its endpoint.
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    pub(crate) cors: Option<CorsConfig>,
    pub(crate) authentication: Option<AuthRequirement>,
    pub(crate) params: Vec<ParamSource>,
    pub(crate) hints: Vec<(String, String)>,
    pub(crate) processors: Processors,
}

impl HandlerConfig {
    /// The handler's own policy; `None` means the server default applies.
    pub fn cors(&self) -> Option<&CorsConfig> {
        self.cors.as_ref()
    }

    pub fn authentication(&self) -> Option<&AuthRequirement> {
        self.authentication.as_ref()
    }

    pub fn params(&self) -> &[ParamSource] {
        &self.params
    }

    pub fn hints(&self) -> &[(String, String)] {
        &self.hints
    }

    pub fn processors(&self) -> &Processors {
        &self.processors
    }
}

/// A handler ready to be registered.
#[derive(Clone)]
pub struct HandlerDescriptor {
    path: String,
    method: Method,
    config: HandlerConfig,
    endpoint: Arc<dyn Endpoint>,
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor").field("path", &self.path).field("method", &self.method).field("config", &self.config).finish()
    }
}

impl HandlerDescriptor {
    pub fn builder(method: Method, path: impl Into<String>) -> HandlerDescriptorBuilder {
        HandlerDescriptorBuilder { path: path.into(), method, config: HandlerConfig::default() }
    }

    pub fn get(path: impl Into<String>) -> HandlerDescriptorBuilder {
        Self::builder(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> HandlerDescriptorBuilder {
        Self::builder(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> HandlerDescriptorBuilder {
        Self::builder(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> HandlerDescriptorBuilder {
        Self::builder(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> HandlerDescriptorBuilder {
        Self::builder(Method::DELETE, path)
    }

    /// A handler for upgrade requests on `path`, see [`UPGRADE`].
    pub fn upgrade(path: impl Into<String>) -> HandlerDescriptorBuilder {
        Self::builder(UPGRADE.clone(), path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    pub(crate) fn into_parts(self) -> (String, RegisteredHandler) {
        (self.path, RegisteredHandler { method: self.method, config: self.config, endpoint: self.endpoint })
    }
}

#[derive(Debug)]
pub struct HandlerDescriptorBuilder {
    path: String,
    method: Method,
    config: HandlerConfig,
}

impl HandlerDescriptorBuilder {
    /// Requires a user authenticated by one of `providers` (tried in order) holding one of
    /// `scopes`.
    #[must_use]
    pub fn authenticate<P, S>(mut self, providers: P, scopes: S) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        self.config.authentication = Some(AuthRequirement::new(providers, scopes));
        self
    }

    /// Appends the next positional parameter.
    #[must_use]
    pub fn param(mut self, source: ParamSource) -> Self {
        self.config.params.push(source);
        self
    }

    #[must_use]
    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = Some(cors);
        self
    }

    /// A fixed value put into the context before the handler runs.
    #[must_use]
    pub fn hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.hints.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn pre_processor(mut self, processor: impl PreProcessor + 'static) -> Self {
        self.config.processors.pre.push(Arc::new(processor));
        self
    }

    #[must_use]
    pub fn post_processor(mut self, processor: impl PostProcessor + 'static) -> Self {
        self.config.processors.post.push(Arc::new(processor));
        self
    }

    #[must_use]
    pub fn exception_processor(mut self, processor: impl ExceptionProcessor + 'static) -> Self {
        self.config.processors.exception.push(Arc::new(processor));
        self
    }

    pub fn handler(self, endpoint: impl Endpoint + 'static) -> HandlerDescriptor {
        HandlerDescriptor { path: self.path, method: self.method, config: self.config, endpoint: Arc::new(endpoint) }
    }
}

/// A handler as stored in the dispatch tree.
#[derive(Clone)]
pub struct RegisteredHandler {
    pub(crate) method: Method,
    pub(crate) config: HandlerConfig,
    pub(crate) endpoint: Arc<dyn Endpoint>,
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler").field("method", &self.method).field("config", &self.config).finish_non_exhaustive()
    }
}

impl RegisteredHandler {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &dyn Endpoint {
        self.endpoint.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_is_its_own_method() {
        assert_eq!(UPGRADE.as_str(), "UPGRADE");
        assert_ne!(*UPGRADE, Method::GET);
    }

    #[test]
    fn builder_collects_configuration() {
        let descriptor = HandlerDescriptor::post("/api/v3/group")
            .authenticate(["basic", "websocket"], ["cloudnet_rest:group_write"])
            .param(ParamSource::user())
            .param(ParamSource::query("name"))
            .hint("audit", "group")
            .handler(endpoint_fn(|_ctx, _params| Box::pin(async { Ok(Response::new(ResponseBody::empty())) })));

        assert_eq!(descriptor.method(), Method::POST);
        let auth = descriptor.config().authentication().unwrap();
        assert_eq!(auth.providers(), ["basic", "websocket"]);
        assert!(auth.scopes().contains("cloudnet_rest:group_write"));
        assert_eq!(descriptor.config().params().len(), 2);
        assert_eq!(descriptor.config().hints(), [("audit".to_owned(), "group".to_owned())]);
        assert!(descriptor.config().cors().is_none());
    }
}
