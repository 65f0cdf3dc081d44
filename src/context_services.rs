//! Named services carried on each request.
//!
//! A [`ContextServices`] collection is assembled once at startup and handed
//! to [`middleware::load_context_services`](crate::middleware::load_context_services),
//! which puts a copy of it into every request's [`Context`]. Handlers and
//! later middleware read it with [`Context::context_services`]. What they
//! register on that copy stays with the one request.
//!
//! Unlike a route's [`ServiceContainer`](crate::ServiceContainer), nothing
//! here is built lazily: values are registered already constructed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::service::Instance;

/// Name → service map shared by every route behind the loader middleware.
///
/// ```rust
/// use sprig::ContextServices;
///
/// let mut services = ContextServices::new();
/// services.register("greeting", String::from("hello"));
///
/// assert_eq!(services.get::<String>("greeting").as_deref().map(String::as_str), Some("hello"));
/// assert!(services.get::<u32>("greeting").is_none());
/// ```
#[derive(Clone, Default)]
pub struct ContextServices {
    services: HashMap<String, Instance>,
}

impl ContextServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `service` under `name`, replacing any previous value.
    pub fn register<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, service: T) -> &mut Self {
        self.register_shared(name, Arc::new(service))
    }

    /// Like [`register`](Self::register), for a value that is already shared.
    pub fn register_shared<T: Send + Sync + 'static>(
        &mut self,
        name: impl Into<String>,
        service: Arc<T>,
    ) -> &mut Self {
        self.services.insert(name.into(), service as Instance);
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<String>, service: T) -> Self {
        self.register(name, service);
        self
    }

    /// The service `name`, or `None` if it is absent or not a `T`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let instance = self.services.get(name)?;
        Arc::clone(instance).downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize { self.services.len() }
    pub fn is_empty(&self) -> bool { self.services.is_empty() }
}

impl fmt::Debug for ContextServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.services.keys()).finish()
    }
}

impl Context {
    /// The collection the loader middleware put on this request.
    pub fn context_services(&self) -> Option<&ContextServices> {
        self.extra.get::<ContextServices>()
    }

    /// Mutable access, for registering request-scoped values.
    pub fn context_services_mut(&mut self) -> Option<&mut ContextServices> {
        self.extra.get_mut::<ContextServices>()
    }
}
