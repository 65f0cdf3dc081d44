//! # sprig
//!
//! Per-route body schemas, lazily built services and nested middleware on
//! top of a radix-tree HTTP router.
//!
//! ## The contract
//!
//! The router matches paths. sprig decides what a handler receives:
//!
//! - **Route metadata**: a [`Route`] can declare a body [`Schema`] and the
//!   services it needs. Metadata attaches to the route's identity, never to
//!   its method and pattern text.
//! - **Service containers**: each route gets a [`ServiceContainer`] of named
//!   factories. A service is built on first use, exactly once even under
//!   concurrent first requests, and shared from then on.
//! - **Route trees**: nested maps of routes are paired with handler trees of
//!   the same shape. Middleware declared on an outer node runs before
//!   middleware declared further in; endpoint middleware runs last.
//! - **Checked builds**: shape mismatches, unmapped routes and missing
//!   providers fail [`RouterBuilder::build`], before any request is served.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sprig::{
//!     Context, HandlerTree, Route, RouteMetadata, RouteTree, RouterBuilder, Server,
//!     ServiceContainer, middleware, schema, service_token,
//! };
//!
//! #[derive(serde::Deserialize, serde::Serialize)]
//! struct NewPost { title: String }
//!
//! struct Repo;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sprig::Error> {
//!     let repo = service_token::<Repo>();
//!     let create = Route::post("/posts");
//!     let routes = RouteTree::node([("create", create.clone().into())]);
//!
//!     let router = RouterBuilder::new(routes.clone())
//!         .attach(&create, RouteMetadata::new()
//!             .body(schema::deserialize::<NewPost>())
//!             .service("repo", &repo))
//!         .provide(&create, ServiceContainer::new().register("repo", || Repo))
//!         .map(routes, HandlerTree::with_middleware(
//!             [middleware::trace()],
//!             HandlerTree::node([("create", HandlerTree::handler(create_post))]),
//!         ))
//!         .build()?;
//!
//!     Server::bind(([0, 0, 0, 0], 3000)).serve(router).await
//! }
//!
//! async fn create_post(ctx: Context) -> Result<String, sprig::Error> {
//!     let _repo: Arc<Repo> = ctx.service("repo")?;
//!     let post: NewPost = ctx.body_as().expect("schema attached").expect("validated");
//!     Ok(format!("created {}", post.title))
//! }
//! ```

mod builder;
mod context;
mod context_services;
mod error;
mod handler;
mod metadata;
mod method;
mod registry;
mod request;
mod response;
mod route;
mod router;
mod server;
mod service;

pub mod health;
pub mod middleware;
pub mod schema;

pub use builder::{HandlerTree, RouterBuilder, build_router};
pub use context::Context;
pub use context_services::ContextServices;
pub use error::{BodyValidationError, BoxError, ConfigError, Error};
pub use handler::{Endpoint, Handler};
pub use metadata::{MetadataStore, Requirement, RouteMetadata};
pub use method::Method;
pub use middleware::{BoxedMiddleware, Middleware, Next};
pub use registry::ProviderRegistry;
pub use request::{FormData, Request};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use route::{Route, RouteId, RouteTree};
pub use router::Router;
pub use schema::Schema;
pub use server::Server;
pub use service::{Instance, ServiceContainer, ServiceToken, Services, service_token};
