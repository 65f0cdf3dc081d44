//! Handler trait, type erasure and endpoints.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in a single radix tree, so
//! each one is hidden behind a trait object (`dyn ErasedHandler`):
//!
//! ```text
//! async fn show(ctx: Context) -> Response { … }    ← user writes this
//!        ↓ Endpoint::new(show)
//! show.into_boxed_handler()                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                        ← stored as BoxedHandler
//!        ↓ wrapped by the builder when the route carries metadata
//! handler.call(ctx) at request time                ← one vtable dispatch
//! ```
//!
//! Handlers never fail from the router's point of view: whatever they return
//! is turned into a [`Response`] through [`IntoResponse`]. Failures raised
//! *around* a handler (body validation, service construction) travel as
//! `Err(Error)` through the middleware chain.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::middleware::{BoxedMiddleware, Next};
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response, Error>>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(ctx: Context) -> impl IntoResponse
/// ```
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response, Error>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { Ok(fut.await.into_response()) })
    }
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// A handler plus the middleware that runs in front of it.
///
/// Middleware executes in the order given, outermost first.
#[derive(Clone)]
pub struct Endpoint {
    pub(crate) middleware: Vec<BoxedMiddleware>,
    pub(crate) handler: BoxedHandler,
}

impl Endpoint {
    pub fn new(handler: impl Handler) -> Self {
        Self { middleware: Vec::new(), handler: handler.into_boxed_handler() }
    }

    /// Appends middleware that runs after anything already attached.
    pub fn middleware(mut self, middleware: impl IntoIterator<Item = BoxedMiddleware>) -> Self {
        self.middleware.extend(middleware);
        self
    }

    pub fn middleware_len(&self) -> usize {
        self.middleware.len()
    }

    /// Runs the middleware chain, then the handler.
    pub async fn call(self: Arc<Self>, ctx: Context) -> Result<Response, Error> {
        Next::new(self).run(ctx).await
    }
}
