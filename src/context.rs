//! Per-request context handed to middleware and handlers.

use std::sync::Arc;

use http::Extensions;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;
use crate::request::Request;
use crate::service::Services;

/// The request plus everything sprig and middleware attach to it.
///
/// - `body` holds the value a route's body schema produced, and is `None`
///   on routes without one.
/// - `services` holds the route's resolved services.
/// - `extra` is a typed map for middleware to pass data down the chain.
#[derive(Debug)]
pub struct Context {
    pub request: Request,
    pub body: Option<Value>,
    pub services: Option<Services>,
    pub extra: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request, body: None, services: None, extra: Extensions::new() }
    }

    /// Shorthand for `ctx.request.param(key)`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.request.param(key)
    }

    /// Deserializes the validated body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.body.as_ref().map(|body| T::deserialize(body))
    }

    /// The resolved service `name`.
    pub fn service<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, Error> {
        match &self.services {
            Some(services) => services.get(name),
            None => Err(Error::UnknownService { name: name.to_owned() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use serde_json::json;

    #[test]
    fn body_is_read_typed() {
        #[derive(serde::Deserialize)]
        struct NewPost {
            title: String,
        }
        let mut ctx = Context::new(Request::new(Method::Post, "/posts"));
        assert!(ctx.body_as::<NewPost>().is_none());

        ctx.body = Some(json!({ "title": "x" }));
        assert_eq!(ctx.body_as::<NewPost>().unwrap().unwrap().title, "x");
    }

    #[test]
    fn services_are_absent_by_default() {
        let ctx = Context::new(Request::new(Method::Get, "/"));
        assert!(matches!(ctx.service::<u8>("db"), Err(Error::UnknownService { .. })));
    }
}
