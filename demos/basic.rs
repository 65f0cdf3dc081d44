//! Minimal sprig example: a posts API with a validated form body, a lazily
//! built repository shared per route, and nested middleware.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/posts
//!   curl -X POST http://localhost:3000/posts -d 'title=hello'
//!   curl -X POST http://localhost:3000/posts              # 422
//!   curl -X DELETE http://localhost:3000/admin/posts/1 -H 'x-admin: 1'
//!   curl http://localhost:3000/healthz

use std::sync::{Arc, Mutex};

use http::StatusCode;
use sprig::{
    Context, Endpoint, HandlerTree, Method, Next, Response, Route, RouteMetadata, RouteTree,
    RouterBuilder, Server, ServiceContainer, health, middleware, schema, service_token,
};

#[derive(serde::Deserialize, serde::Serialize)]
struct NewPost {
    title: String,
}

#[derive(Default)]
struct Repo {
    titles: Mutex<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<(), sprig::Error> {
    tracing_subscriber::fmt::init();

    let repo = service_token::<Repo>();
    let routes = RouteTree::node([
        ("index", Route::get("/posts").into()),
        ("create", Route::post("/posts").into()),
        ("admin", RouteTree::node([
            ("destroy", Route::delete("/admin/posts/{id}").into()),
        ])),
    ]);
    let route = |path| routes.route(path).expect("declared above").clone();

    // One container for every posts route: the repository is built once.
    let shared = Arc::new(ServiceContainer::new().register("repo", Repo::default));

    let admin_only = middleware::from_fn(|ctx: Context, next: Next| async move {
        if ctx.request.header("x-admin").is_none() {
            return Ok(Response::status(StatusCode::FORBIDDEN));
        }
        next.run(ctx).await
    });

    let handlers = HandlerTree::with_middleware(
        [middleware::trace()],
        HandlerTree::node([
            ("index", HandlerTree::handler(index)),
            ("create", HandlerTree::handler(create)),
            ("admin", HandlerTree::node([
                ("destroy", Endpoint::new(destroy).middleware([admin_only]).into()),
            ])),
        ]),
    );

    let uses_repo = RouteMetadata::new().service("repo", &repo);
    let router = RouterBuilder::new(routes.clone())
        .attach(&route("index"), uses_repo.clone())
        .attach(&route("create"), uses_repo.body(schema::deserialize::<NewPost>()))
        .provide(&route("index"), Arc::clone(&shared))
        .provide(&route("create"), shared)
        .map(routes.clone(), handlers)
        .raw(Method::Get, "/healthz", health::liveness)
        .raw(Method::Get, "/readyz", health::readiness)
        .build()?;

    Server::bind(([0, 0, 0, 0], 3000)).serve(router).await
}

// GET /posts
async fn index(ctx: Context) -> Result<String, sprig::Error> {
    let repo: Arc<Repo> = ctx.service("repo")?;
    let titles = repo.titles.lock().map(|t| t.join("\n")).unwrap_or_default();
    Ok(titles)
}

// POST /posts, title=...
async fn create(ctx: Context) -> Result<Response, sprig::Error> {
    let repo: Arc<Repo> = ctx.service("repo")?;
    let Some(Ok(post)) = ctx.body_as::<NewPost>() else {
        return Ok(Response::status(StatusCode::BAD_REQUEST));
    };
    if let Ok(mut titles) = repo.titles.lock() {
        titles.push(post.title);
    }
    Ok(Response::status(StatusCode::CREATED))
}

// DELETE /admin/posts/{id}
async fn destroy(_ctx: Context) -> StatusCode {
    StatusCode::NO_CONTENT
}
