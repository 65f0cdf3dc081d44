//! Loads the app-wide [`ContextServices`] into each request.

use async_trait::async_trait;

use super::{BoxedMiddleware, Middleware, Next};
use crate::context::Context;
use crate::context_services::ContextServices;
use crate::error::Error;
use crate::response::Response;

/// Inserts a copy of its collection into [`Context::extra`] and continues.
#[derive(Clone, Debug)]
pub struct LoadContextServices(ContextServices);

/// Shorthand for a shared [`LoadContextServices`].
pub fn load_context_services(services: ContextServices) -> BoxedMiddleware {
    std::sync::Arc::new(LoadContextServices(services))
}

#[async_trait]
impl Middleware for LoadContextServices {
    async fn handle(&self, mut ctx: Context, next: Next) -> Result<Response, Error> {
        ctx.extra.insert(self.0.clone());
        next.run(ctx).await
    }
}
