//! The seam between the transport and whatever answers requests.

use crate::protocol::body::ResponseBody;
use bytes::Bytes;
use http::{Request, Response};
use std::fmt;
use std::future::Future;

/// Answers one aggregated request.
///
/// Failures are expressed as responses; the transport only turns a panicking handler into a
/// `500 Internal Server Error`.
#[trait_variant::make(Handler: Send)]
pub trait LocalHandler {
    async fn call(&self, request: Request<Bytes>) -> Response<ResponseBody>;
}

pub struct HandlerFn<F> {
    f: F,
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync,
    Fut: Future<Output = Response<ResponseBody>> + Send,
{
    async fn call(&self, request: Request<Bytes>) -> Response<ResponseBody> {
        (self.f)(request).await
    }
}

pub fn make_handler<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Bytes>) -> Fut,
    Fut: Future<Output = Response<ResponseBody>>,
{
    HandlerFn { f }
}
