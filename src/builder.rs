//! Route-tree builder.
//!
//! [`RouterBuilder`] pairs a tree of [`Route`]s with a tree of handlers of the
//! same shape, merges the middleware declared along the way, wraps every
//! handler so it receives its parsed body and resolved services, and installs
//! the result into a [`Router`](crate::Router).
//!
//! Nothing is installed until [`RouterBuilder::build`], which checks the whole
//! configuration first:
//!
//! - both trees have the same shape, key for key;
//! - every declared route is mapped to exactly one handler;
//! - every route that declares services has a provider that registers them.
//!
//! Any violation is a [`ConfigError`] and no router is produced.
//!
//! ```rust
//! use sprig::{Context, HandlerTree, Route, RouteTree, RouterBuilder, middleware};
//!
//! async fn index(_ctx: Context) -> &'static str { "posts" }
//! async fn show(ctx: Context) -> String { format!("post {}", ctx.param("id").unwrap_or("?")) }
//!
//! let routes = RouteTree::node([
//!     ("index", Route::get("/posts").into()),
//!     ("show", Route::get("/posts/{id}").into()),
//! ]);
//!
//! let handlers = HandlerTree::with_middleware(
//!     [middleware::trace()],
//!     HandlerTree::node([
//!         ("index", HandlerTree::handler(index)),
//!         ("show", HandlerTree::handler(show)),
//!     ]),
//! );
//!
//! let router = RouterBuilder::new(routes.clone())
//!     .map(routes, handlers)
//!     .build()
//!     .expect("route tree is consistent");
//! # let _ = router;
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::error::{ConfigError, Error};
use crate::handler::{BoxFuture, BoxedHandler, Endpoint, ErasedHandler, Handler};
use crate::metadata::{MetadataStore, RouteMetadata};
use crate::middleware::{self, BoxedMiddleware};
use crate::registry::ProviderRegistry;
use crate::response::Response;
use crate::route::{Route, RouteTree};
use crate::schema::parse_body;
use crate::service::ServiceContainer;

// ── HandlerTree ───────────────────────────────────────────────────────────────

/// Handlers laid out in the same shape as a [`RouteTree`].
#[derive(Clone)]
pub enum HandlerTree {
    /// The handler for one route, possibly with its own middleware.
    Leaf(Endpoint),
    /// Handlers for a nested route map, keyed like it.
    Node(BTreeMap<String, HandlerTree>),
    /// Middleware applied to every endpoint below.
    Wrapped(Vec<BoxedMiddleware>, Box<HandlerTree>),
}

impl HandlerTree {
    pub fn handler(handler: impl Handler) -> Self {
        Self::Leaf(Endpoint::new(handler))
    }

    pub fn endpoint(endpoint: Endpoint) -> Self {
        Self::Leaf(endpoint)
    }

    pub fn node<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, HandlerTree)>,
        K: Into<String>,
    {
        Self::Node(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn with_middleware(
        middleware: impl IntoIterator<Item = BoxedMiddleware>,
        inner: HandlerTree,
    ) -> Self {
        Self::Wrapped(middleware.into_iter().collect(), Box::new(inner))
    }
}

impl From<Endpoint> for HandlerTree {
    fn from(endpoint: Endpoint) -> Self {
        Self::Leaf(endpoint)
    }
}

// ── RouterBuilder ─────────────────────────────────────────────────────────────

/// Collects routes, metadata, providers and handler mappings, then builds a
/// [`Router`](crate::Router).
pub struct RouterBuilder {
    declared: Vec<Route>,
    metadata: MetadataStore,
    providers: ProviderRegistry,
    mappings: Vec<(RouteTree, HandlerTree)>,
    router: crate::Router,
}

impl RouterBuilder {
    /// Starts a builder that must end up mapping every route in `declared`.
    pub fn new(declared: RouteTree) -> Self {
        Self {
            declared: declared.routes().into_iter().cloned().collect(),
            metadata: MetadataStore::new(),
            providers: ProviderRegistry::new(),
            mappings: Vec::new(),
            router: crate::Router::new(),
        }
    }

    /// A builder with no declared routes; only the mappings it receives are checked.
    pub fn empty() -> Self {
        Self::new(RouteTree::Node(BTreeMap::new()))
    }

    /// Merges `meta` into the route's metadata.
    pub fn attach(mut self, route: &Route, meta: RouteMetadata) -> Self {
        self.metadata.attach(route, meta);
        self
    }

    /// Uses `metadata` as the metadata store, replacing anything attached so far.
    pub fn metadata(mut self, metadata: MetadataStore) -> Self {
        self.metadata = metadata;
        self
    }

    /// Registers the container that serves `route`'s required services.
    pub fn provide(mut self, route: &Route, container: impl Into<Arc<ServiceContainer>>) -> Self {
        self.providers.register_provider(route, container);
        self
    }

    /// Uses `providers` as the provider registry, replacing anything provided so far.
    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    /// Maps a single route.
    pub fn route(self, route: &Route, endpoint: impl Into<HandlerTree>) -> Self {
        self.map(RouteTree::Leaf(route.clone()), endpoint.into())
    }

    /// Maps a route tree onto a handler tree of the same shape.
    pub fn map(mut self, routes: RouteTree, handlers: HandlerTree) -> Self {
        self.mappings.push((routes, handlers));
        self
    }

    /// Registers a plain handler that bypasses metadata and services.
    ///
    /// # Panics
    ///
    /// Panics like [`Router::on`](crate::Router::on) on an invalid or
    /// conflicting pattern.
    pub fn raw(mut self, method: crate::Method, path: &str, handler: impl Handler) -> Self {
        self.router = self.router.on(method, path, handler);
        self
    }

    /// Validates the configuration and installs every mapped route.
    pub fn build(self) -> Result<crate::Router, Error> {
        let Self { declared, metadata, providers, mappings, mut router } = self;

        let mut leaves = Vec::new();
        for (routes, handlers) in mappings {
            merge(&routes, handlers, &[], "", &mut leaves)?;
        }

        let mut installed = HashSet::with_capacity(leaves.len());
        for (route, endpoint) in leaves {
            if !installed.insert(route.id()) {
                return Err(ConfigError::DuplicateRoute {
                    route: route.to_string(),
                    reason: "mapped more than once".to_owned(),
                }
                .into());
            }

            let meta = metadata.lookup(&route).cloned();
            let provider = check_services(&route, meta.as_ref(), &providers)?;
            let endpoint = wrap(&route, meta, provider, endpoint);

            debug!(
                route = %route,
                middleware = endpoint.middleware_len(),
                "installing route"
            );
            router
                .insert(route.method(), route.pattern(), endpoint)
                .map_err(|e| ConfigError::DuplicateRoute {
                    route: route.to_string(),
                    reason: e.to_string(),
                })?;
        }

        if let Some(route) = declared.iter().find(|r| !installed.contains(&r.id())) {
            return Err(ConfigError::Unmapped { route: route.to_string() }.into());
        }

        Ok(router)
    }
}

/// Builds a router from one route tree, its handlers, the metadata store and
/// the provider registry.
pub fn build_router(
    routes: RouteTree,
    handlers: HandlerTree,
    metadata: MetadataStore,
    providers: ProviderRegistry,
) -> Result<crate::Router, Error> {
    RouterBuilder::new(routes.clone())
        .metadata(metadata)
        .providers(providers)
        .map(routes, handlers)
        .build()
}

// ── Tree walk ─────────────────────────────────────────────────────────────────

fn join(path: &str, key: &str) -> String {
    if path.is_empty() { key.to_owned() } else { format!("{path}.{key}") }
}

fn mismatch(path: &str, detail: &'static str) -> ConfigError {
    let path = if path.is_empty() { "<root>".to_owned() } else { path.to_owned() };
    ConfigError::ShapeMismatch { path, detail }
}

/// Walks `routes` and `handlers` in lockstep, collecting one endpoint per
/// route with `inherited` middleware in front of its own.
fn merge(
    routes: &RouteTree,
    handlers: HandlerTree,
    inherited: &[BoxedMiddleware],
    path: &str,
    out: &mut Vec<(Route, Endpoint)>,
) -> Result<(), ConfigError> {
    match (routes, handlers) {
        (_, HandlerTree::Wrapped(middleware, inner)) => {
            let merged = middleware::chain(inherited, &middleware);
            merge(routes, *inner, &merged, path, out)
        }
        (RouteTree::Leaf(route), HandlerTree::Leaf(endpoint)) => {
            let middleware = middleware::chain(inherited, &endpoint.middleware);
            out.push((route.clone(), Endpoint { middleware, handler: endpoint.handler }));
            Ok(())
        }
        (RouteTree::Node(children), HandlerTree::Node(mut handlers)) => {
            for (key, child) in children {
                let path = join(path, key);
                let handler = handlers
                    .remove(key)
                    .ok_or_else(|| mismatch(&path, "route has no handler"))?;
                merge(child, handler, inherited, &path, out)?;
            }
            match handlers.keys().next() {
                Some(key) => Err(mismatch(&join(path, key), "handler has no route")),
                None => Ok(()),
            }
        }
        (RouteTree::Leaf(_), HandlerTree::Node(_)) => {
            Err(mismatch(path, "route is a leaf but handlers are a nested map"))
        }
        (RouteTree::Node(_), HandlerTree::Leaf(_)) => {
            Err(mismatch(path, "routes are a nested map but handler is a leaf"))
        }
    }
}

/// The provider for a route that declares services, after checking it
/// registers every declared name with the declared type.
fn check_services(
    route: &Route,
    meta: Option<&RouteMetadata>,
    providers: &ProviderRegistry,
) -> Result<Option<Arc<ServiceContainer>>, ConfigError> {
    let Some(required) = meta.and_then(RouteMetadata::required_services) else {
        return Ok(None);
    };
    let provider = providers
        .get_provider(route)
        .ok_or_else(|| ConfigError::MissingProvider { route: route.to_string() })?;
    for (name, requirement) in required {
        let Some((type_id, found)) = provider.output_type(name) else {
            return Err(ConfigError::MissingService { route: route.to_string(), name: name.clone() });
        };
        if type_id != requirement.type_id() {
            return Err(ConfigError::ServiceType {
                route: route.to_string(),
                name: name.clone(),
                expected: requirement.type_name(),
                found,
            });
        }
    }
    Ok(Some(Arc::clone(provider)))
}

// ── Wrapped handler ───────────────────────────────────────────────────────────

struct Enhanced {
    route: Route,
    meta: RouteMetadata,
    provider: Option<Arc<ServiceContainer>>,
    inner: BoxedHandler,
}

/// Puts body parsing and service injection in front of `endpoint`'s handler.
///
/// Routes without metadata keep their handler untouched.
fn wrap(
    route: &Route,
    meta: Option<RouteMetadata>,
    provider: Option<Arc<ServiceContainer>>,
    endpoint: Endpoint,
) -> Endpoint {
    let Some(meta) = meta else {
        return endpoint;
    };
    let enhanced = Enhanced { route: route.clone(), meta, provider, inner: endpoint.handler };
    Endpoint { middleware: endpoint.middleware, handler: Arc::new(EnhancedHandler(Arc::new(enhanced))) }
}

struct EnhancedHandler(Arc<Enhanced>);

impl ErasedHandler for EnhancedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response, Error>> {
        let enhanced = Arc::clone(&self.0);
        Box::pin(async move { enhanced.call(ctx).await })
    }
}

impl Enhanced {
    /// Body first, then services, then the handler. Dropping the returned
    /// future at any await abandons the request before the handler runs.
    async fn call(&self, mut ctx: Context) -> Result<Response, Error> {
        ctx.body = match self.meta.body_schema() {
            Some(schema) => {
                let form = ctx.request.form_data()?;
                Some(parse_body(schema.as_ref(), form).await?)
            }
            None => None,
        };

        if let Some(required) = self.meta.required_services() {
            let provider = self.provider.as_ref().ok_or_else(|| {
                ConfigError::MissingProvider { route: self.route.to_string() }
            })?;
            let services = provider.resolve_all().await?;
            for (name, requirement) in required {
                let instance = services
                    .instance(name)
                    .ok_or_else(|| Error::UnknownService { name: name.clone() })?;
                if !requirement.accepts(&**instance) {
                    return Err(Error::ServiceType {
                        name: name.clone(),
                        expected: requirement.type_name(),
                    });
                }
            }
            ctx.services = Some(services);
        }

        self.inner.call(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::request::Request;
    use crate::schema::{self, Issue, PathSegment, Validation};
    use crate::service::service_token;
    use http::StatusCode;
    use serde_json::json;

    async fn ok(_ctx: Context) -> &'static str {
        "ok"
    }

    async fn echo_body(ctx: Context) -> String {
        ctx.body.map(|b| b.to_string()).unwrap_or_else(|| "none".to_owned())
    }

    fn title_required() -> impl schema::Schema {
        schema::from_fn(|form| match form.get("title") {
            Some(_) => Validation::Valid(form.to_value()),
            None => Validation::Invalid(vec![
                Issue::new("is required").at(PathSegment::key("title")),
            ]),
        })
    }

    fn config_error(result: Result<crate::Router, Error>) -> ConfigError {
        match result {
            Err(Error::Config(e)) => e,
            Err(other) => panic!("expected a configuration error, got {other}"),
            Ok(_) => panic!("expected a configuration error, got a router"),
        }
    }

    #[test]
    fn missing_handler_is_a_shape_mismatch() {
        let routes = RouteTree::node([
            ("a", Route::get("/a").into()),
            ("b", Route::get("/b").into()),
        ]);
        let handlers = HandlerTree::node([("a", HandlerTree::handler(ok))]);

        let err = config_error(RouterBuilder::new(routes.clone()).map(routes, handlers).build());
        assert!(matches!(err, ConfigError::ShapeMismatch { ref path, .. } if path == "b"), "{err}");
    }

    #[test]
    fn extra_handler_is_a_shape_mismatch() {
        let routes = RouteTree::node([("a", Route::get("/a").into())]);
        let handlers = HandlerTree::node([
            ("a", HandlerTree::handler(ok)),
            ("z", HandlerTree::handler(ok)),
        ]);

        let err = config_error(RouterBuilder::new(routes.clone()).map(routes, handlers).build());
        assert!(matches!(err, ConfigError::ShapeMismatch { ref path, .. } if path == "z"), "{err}");
    }

    #[test]
    fn leaf_against_node_is_a_shape_mismatch() {
        let routes = RouteTree::node([("a", RouteTree::node([("b", Route::get("/a/b").into())]))]);
        let handlers = HandlerTree::node([("a", HandlerTree::handler(ok))]);

        let err = config_error(RouterBuilder::empty().map(routes, handlers).build());
        assert!(matches!(err, ConfigError::ShapeMismatch { ref path, .. } if path == "a"), "{err}");
    }

    #[test]
    fn declared_routes_must_be_mapped() {
        let index = Route::get("/posts");
        let show = Route::get("/posts/{id}");
        let declared = RouteTree::node([("index", index.clone().into()), ("show", show.into())]);

        let err = config_error(RouterBuilder::new(declared).route(&index, HandlerTree::handler(ok)).build());
        assert!(matches!(err, ConfigError::Unmapped { ref route } if route == "GET /posts/{id}"));
    }

    #[test]
    fn mapping_a_route_twice_is_rejected() {
        let index = Route::get("/posts");
        let err = config_error(
            RouterBuilder::empty()
                .route(&index, HandlerTree::handler(ok))
                .route(&index, HandlerTree::handler(ok))
                .build(),
        );
        assert!(matches!(err, ConfigError::DuplicateRoute { .. }));
    }

    #[test]
    fn services_without_provider_fail_the_build() {
        let route = Route::get("/posts");
        let db = service_token::<String>();

        let err = config_error(
            RouterBuilder::empty()
                .attach(&route, RouteMetadata::new().service("db", &db))
                .route(&route, HandlerTree::handler(ok))
                .build(),
        );
        assert!(matches!(err, ConfigError::MissingProvider { .. }));
    }

    #[test]
    fn provider_must_register_every_declared_service() {
        let route = Route::get("/posts");
        let db = service_token::<String>();
        let cache = service_token::<String>();

        let err = config_error(
            RouterBuilder::empty()
                .attach(&route, RouteMetadata::new().service("db", &db).service("cache", &cache))
                .provide(&route, ServiceContainer::new().register("db", || String::from("pg")))
                .route(&route, HandlerTree::handler(ok))
                .build(),
        );
        assert!(matches!(err, ConfigError::MissingService { ref name, .. } if name == "cache"));
    }

    #[tokio::test]
    async fn valid_body_reaches_the_handler() {
        let route = Route::post("/posts");
        let router = RouterBuilder::empty()
            .attach(&route, RouteMetadata::new().body(title_required()))
            .route(&route, HandlerTree::handler(echo_body))
            .build()
            .unwrap();

        let req = Request::new(Method::Post, "/posts").with_form(&[("title", "x")]);
        let res = router.dispatch(req).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), json!({ "title": "x" }).to_string().as_bytes());
    }

    #[tokio::test]
    async fn invalid_body_never_reaches_the_handler() {
        let route = Route::post("/posts");
        let router = RouterBuilder::empty()
            .attach(&route, RouteMetadata::new().body(title_required()))
            .route(&route, HandlerTree::handler(echo_body))
            .build()
            .unwrap();

        let res = router.dispatch(Request::new(Method::Post, "/posts")).await;
        assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(res.body(), b"title: is required".as_slice());
    }

    #[tokio::test]
    async fn stale_body_is_cleared_on_routes_without_schema() {
        let route = Route::get("/posts");
        let db = service_token::<String>();
        let inject = middleware::from_fn(|mut ctx: Context, next: middleware::Next| async move {
            ctx.body = Some(json!("stale"));
            next.run(ctx).await
        });

        let router = RouterBuilder::empty()
            .attach(&route, RouteMetadata::new().service("db", &db))
            .provide(&route, ServiceContainer::new().register("db", || String::from("pg")))
            .route(&route, Endpoint::new(echo_body).middleware([inject]))
            .build()
            .unwrap();

        let res = router.dispatch(Request::new(Method::Get, "/posts")).await;
        assert_eq!(res.body(), b"none".as_slice());
    }

    #[test]
    fn mistyped_service_fails_the_build() {
        let route = Route::get("/posts");
        let db = service_token::<u64>();

        let err = config_error(
            RouterBuilder::empty()
                .attach(&route, RouteMetadata::new().service("db", &db))
                .provide(&route, ServiceContainer::new().register("db", || String::from("pg")))
                .route(&route, HandlerTree::handler(ok))
                .build(),
        );
        assert!(
            matches!(err, ConfigError::ServiceType { ref name, found, .. }
                if name == "db" && found == std::any::type_name::<String>()),
            "{err}"
        );
    }

    #[tokio::test]
    async fn routes_without_metadata_are_untouched() {
        let route = Route::get("/");
        let router = build_router(
            RouteTree::Leaf(route),
            HandlerTree::handler(echo_body),
            MetadataStore::new(),
            ProviderRegistry::new(),
        )
        .unwrap();

        let res = router.dispatch(Request::new(Method::Get, "/")).await;
        assert_eq!(res.body(), b"none".as_slice());
    }
}
