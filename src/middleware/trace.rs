//! Per-request tracing span.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{Instrument, info, info_span};

use super::{BoxedMiddleware, Middleware, Next};
use crate::context::Context;
use crate::error::Error;
use crate::response::Response;

/// Opens a `request` span around the rest of the chain and logs the final
/// status with its latency.
///
/// Errors are logged with their message by
/// [`Router::dispatch`](crate::Router::dispatch), not here.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

/// Shorthand for a shared [`Trace`].
pub fn trace() -> BoxedMiddleware {
    std::sync::Arc::new(Trace)
}

#[async_trait]
impl Middleware for Trace {
    async fn handle(&self, ctx: Context, next: Next) -> Result<Response, Error> {
        let span = info_span!(
            "request",
            method = %ctx.request.method(),
            path = %ctx.request.path(),
        );
        let start = Instant::now();
        let result = next.run(ctx).instrument(span.clone()).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let status = match &result {
            Ok(res) => res.status_code(),
            Err(e) => e.status(),
        };
        span.in_scope(|| info!(status = status.as_u16(), latency_ms, "request completed"));
        result
    }
}
