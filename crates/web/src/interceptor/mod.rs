//! The processors around an endpoint and the tagged result of running them.
//!
//! Order of one invocation: every pre-processor (each may answer early), the endpoint,
//! every post-processor (each may replace the response). A failure anywhere goes to the
//! exception processors exactly once.

use crate::context::HttpContext;
use crate::descriptor::Endpoint;
use crate::error::HandlerError;
use crate::params::BoundParams;
use crate::problem::ProblemDetails;
use async_trait::async_trait;
use http::Response;
use nimbus_http::protocol::body::ResponseBody;
use tracing::error;

pub type HttpResponse = Response<ResponseBody>;

/// Outcome of a pre-processor.
#[derive(Debug)]
pub enum Flow {
    Continue,
    /// Stop here and answer with this response.
    Handled(HttpResponse),
}

/// Outcome of a post-processor, which owns the response while it runs.
#[derive(Debug)]
pub enum PostFlow {
    /// Pass the response, possibly modified, to the next post-processor.
    Continue(HttpResponse),
    /// Answer with this response and skip the remaining post-processors.
    Handled(HttpResponse),
}

/// Outcome of the whole pipeline.
#[derive(Debug)]
pub enum Invocation {
    /// The endpoint answered and no post-processor vetoed.
    Ok(HttpResponse),
    /// A processor answered instead of the endpoint.
    Handled(HttpResponse),
    Failed(HandlerError),
}

#[async_trait]
pub trait PreProcessor: Send + Sync {
    async fn pre_process(&self, ctx: &mut HttpContext) -> Result<Flow, HandlerError>;
}

#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn post_process(&self, ctx: &mut HttpContext, response: HttpResponse) -> Result<PostFlow, HandlerError>;
}

#[async_trait]
pub trait ExceptionProcessor: Send + Sync {
    /// Hands `error` back to let the next processor try.
    async fn handle_exception(&self, ctx: &mut HttpContext, error: HandlerError) -> Result<HttpResponse, HandlerError>;
}

/// The processors of one handler, in the order they run.
#[derive(Clone, Default)]
pub struct Processors {
    pub pre: Vec<std::sync::Arc<dyn PreProcessor>>,
    pub post: Vec<std::sync::Arc<dyn PostProcessor>>,
    pub exception: Vec<std::sync::Arc<dyn ExceptionProcessor>>,
}

impl std::fmt::Debug for Processors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processors")
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .field("exception", &self.exception.len())
            .finish()
    }
}

impl Processors {
    /// Runs pre-processors, `endpoint` and post-processors.
    ///
    /// `bind` runs after the pre-processors so authentication happens before parameters
    /// such as the user are bound.
    pub async fn invoke<B>(&self, ctx: &mut HttpContext, endpoint: &dyn Endpoint, bind: B) -> Invocation
    where
        B: FnOnce(&mut HttpContext) -> Result<BoundParams, HandlerError> + Send,
    {
        for processor in &self.pre {
            match processor.pre_process(ctx).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Handled(response)) => return Invocation::Handled(response),
                Err(e) => return Invocation::Failed(e),
            }
        }

        let params = match bind(ctx) {
            Ok(params) => params,
            Err(e) => return Invocation::Failed(e),
        };

        let mut response = match endpoint.handle(ctx, params).await {
            Ok(response) => response,
            Err(e) => return Invocation::Failed(e),
        };

        for processor in &self.post {
            response = match processor.post_process(ctx, response).await {
                Ok(PostFlow::Continue(response)) => response,
                Ok(PostFlow::Handled(replacement)) => return Invocation::Handled(replacement),
                Err(e) => return Invocation::Failed(e),
            };
        }
        Invocation::Ok(response)
    }

    /// Turns an invocation into the response to send.
    pub async fn resolve(&self, ctx: &mut HttpContext, invocation: Invocation) -> HttpResponse {
        let mut error = match invocation {
            Invocation::Ok(response) | Invocation::Handled(response) => return response,
            Invocation::Failed(HandlerError::Response(response)) => return *response,
            Invocation::Failed(error) => error,
        };

        for processor in &self.exception {
            error = match processor.handle_exception(ctx, error).await {
                Ok(response) => return response,
                Err(HandlerError::Response(response)) => return *response,
                Err(unhandled) => unhandled,
            };
        }

        error!(cause = %error, path = ctx.path(), "unhandled error while processing request");
        ProblemDetails::internal_error().into_response()
    }
}
