//! Radix-tree request router.
//!
//! One tree per HTTP method, plus one for [`Method::Any`]. O(path-length)
//! lookup. Enhanced routes are installed by
//! [`RouterBuilder`](crate::RouterBuilder); [`Router::on`] registers plain
//! handlers directly.

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use matchit::{InsertError, Router as MatchitRouter};
use tracing::{error, warn};

use crate::context::Context;
use crate::handler::{Endpoint, Handler};
use crate::method::Method;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Endpoint>>>,
}

enum Lookup {
    Found(Arc<Endpoint>, HashMap<String, String>),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plain handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `ctx.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with a route
    /// already registered for `method`.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.endpoint(method, path, Endpoint::new(handler))
    }

    /// Like [`on`](Self::on), for a handler with its own middleware.
    pub fn endpoint(mut self, method: Method, path: &str, endpoint: Endpoint) -> Self {
        self.insert(method, path, endpoint)
            .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
        self
    }

    pub(crate) fn insert(
        &mut self,
        method: Method,
        path: &str,
        endpoint: Endpoint,
    ) -> Result<(), InsertError> {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(endpoint))
    }

    fn lookup(&self, method: Method, path: &str) -> Lookup {
        for tree in [self.routes.get(&method), self.routes.get(&Method::Any)].into_iter().flatten() {
            if let Ok(matched) = tree.at(path) {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                return Lookup::Found(Arc::clone(matched.value), params);
            }
        }

        let mut allowed: Vec<Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| *method)
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        allowed.sort_by_key(|m| m.as_str());
        Lookup::MethodNotAllowed(allowed)
    }

    /// Routes one request and produces one response.
    ///
    /// Errors that escape the middleware chain are logged here and turned
    /// into their response.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let (endpoint, params) = match self.lookup(req.method(), req.path()) {
            Lookup::Found(endpoint, params) => (endpoint, params),
            Lookup::NotFound => return Response::status(StatusCode::NOT_FOUND),
            Lookup::MethodNotAllowed(allowed) => {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                return Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header("allow", &allow)
                    .no_body();
            }
        };
        req.set_params(params);

        let method = req.method();
        let path = req.path().to_owned();
        match endpoint.call(Context::new(req)).await {
            Ok(res) => res,
            Err(e) => {
                if e.status().is_client_error() {
                    warn!(%method, %path, error = %e, "request rejected");
                } else {
                    error!(%method, %path, error = %e, "request failed");
                }
                e.into_response()
            }
        }
    }
}
