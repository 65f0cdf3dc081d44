//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the handler and the result
//! on its way back. Data meant for the handler goes into
//! [`Context::extra`](crate::Context).
//!
//! Within one endpoint, middleware runs in declaration order. Across a nested
//! route tree, middleware declared on an outer node runs before middleware
//! declared on an inner node, and middleware attached to the endpoint itself
//! runs last, immediately before the handler.
//!
//! Built-in middleware:
//! - [`trace()`]: a per-request span, logging status and latency
//! - [`load_context_services()`]: puts app-wide [`ContextServices`](crate::ContextServices)
//!   on every request

mod services;
mod trace;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Error;
use crate::handler::Endpoint;
use crate::response::Response;

pub use services::{LoadContextServices, load_context_services};
pub use trace::{Trace, trace};

/// A request interceptor.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Handles `ctx`, usually by calling `next.run(ctx)` somewhere inside.
    ///
    /// Returning without calling `next` short-circuits the chain.
    async fn handle(&self, ctx: Context, next: Next) -> Result<Response, Error>;
}

/// A middleware shared between every endpoint it is attached to.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The rest of the chain after the current middleware.
pub struct Next {
    endpoint: Arc<Endpoint>,
    index: usize,
}

impl Next {
    pub(crate) fn new(endpoint: Arc<Endpoint>) -> Self {
        Self { endpoint, index: 0 }
    }

    /// Runs the remaining middleware, then the handler.
    pub async fn run(self, ctx: Context) -> Result<Response, Error> {
        let Self { endpoint, index } = self;
        match endpoint.middleware.get(index).cloned() {
            Some(middleware) => middleware.handle(ctx, Self { endpoint, index: index + 1 }).await,
            None => endpoint.handler.call(ctx).await,
        }
    }
}

/// Concatenates `parent` and `child`, parent first.
pub fn chain(parent: &[BoxedMiddleware], child: &[BoxedMiddleware]) -> Vec<BoxedMiddleware> {
    parent.iter().chain(child).cloned().collect()
}

/// Middleware built from an async closure.
pub struct FromFn<F>(F);

/// Wraps an async closure as middleware.
///
/// ```rust
/// use sprig::middleware;
///
/// #[derive(Clone)]
/// struct User(&'static str);
///
/// let auth = middleware::from_fn(|mut ctx, next| async move {
///     ctx.extra.insert(User("alice"));
///     next.run(ctx).await
/// });
/// # let _ = auth;
/// ```
pub fn from_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    Arc::new(FromFn(f))
}

#[async_trait]
impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    async fn handle(&self, ctx: Context, next: Next) -> Result<Response, Error> {
        (self.0)(ctx, next).await
    }
}
