//! End-to-end behaviour of enhanced routes, driven through `Router::dispatch`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http::StatusCode;
use serde_json::json;
use sprig::{
    BoxedMiddleware, Context, ContextServices, Endpoint, HandlerTree, Method, Next, Request, Route, RouteMetadata,
    RouteTree, RouterBuilder, ServiceContainer, middleware, schema, service_token,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Clone, Default)]
struct Trail(Vec<&'static str>);

fn mark(label: &'static str) -> BoxedMiddleware {
    middleware::from_fn(move |mut ctx: Context, next: Next| async move {
        let mut trail = ctx.extra.remove::<Trail>().unwrap_or_default();
        trail.0.push(label);
        ctx.extra.insert(trail);
        next.run(ctx).await
    })
}

async fn report_trail(ctx: Context) -> String {
    ctx.extra.get::<Trail>().map(|t| t.0.join(",")).unwrap_or_default()
}

#[derive(Debug)]
struct Pool(usize);

#[derive(serde::Deserialize, serde::Serialize)]
struct NewPost {
    title: String,
}

#[tokio::test]
async fn middleware_runs_root_to_leaf() {
    init_tracing();
    let routes = RouteTree::node([
        ("posts", RouteTree::node([
            ("admin", RouteTree::node([
                ("destroy", Route::delete("/posts/{id}").into()),
            ])),
            ("index", Route::get("/posts").into()),
        ])),
    ]);
    let handlers = HandlerTree::with_middleware(
        [mark("A"), mark("B")],
        HandlerTree::node([
            ("posts", HandlerTree::node([
                ("admin", HandlerTree::with_middleware(
                    [mark("admin")],
                    HandlerTree::node([(
                        "destroy",
                        Endpoint::new(report_trail).middleware([mark("C")]).into(),
                    )]),
                )),
                ("index", Endpoint::new(report_trail).middleware([mark("C")]).into()),
            ])),
        ]),
    );

    let router = RouterBuilder::new(routes.clone()).map(routes, handlers).build().unwrap();

    let res = router.dispatch(Request::new(Method::Get, "/posts")).await;
    assert_eq!(res.body(), b"A,B,C".as_slice());

    let res = router.dispatch(Request::new(Method::Delete, "/posts/3")).await;
    assert_eq!(res.body(), b"A,B,admin,C".as_slice());
}

#[tokio::test]
async fn services_only_route_gets_services_and_no_body() {
    init_tracing();
    let pool = service_token::<Pool>();
    let name = service_token::<String>();
    let route = Route::get("/status");

    let router = RouterBuilder::empty()
        .attach(&route, RouteMetadata::new().service("pool", &pool).service("name", &name))
        .provide(
            &route,
            ServiceContainer::new()
                .register("pool", || Pool(5))
                .register("name", || String::from("primary")),
        )
        .route(&route, HandlerTree::handler(|ctx: Context| async move {
            assert!(ctx.body.is_none());
            let services = ctx.services.as_ref().expect("services attached");
            let pool = services.get::<Pool>("pool")?;
            let name = services.get::<String>("name")?;
            Ok::<_, sprig::Error>(format!("{name}:{}", pool.0))
        }))
        .build()
        .unwrap();

    let res = router.dispatch(Request::new(Method::Get, "/status")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body(), b"primary:5".as_slice());
}

#[tokio::test]
async fn body_schema_round_trip() {
    init_tracing();
    let route = Route::post("/posts");
    let router = RouterBuilder::empty()
        .attach(&route, RouteMetadata::new().body(schema::deserialize::<NewPost>()))
        .route(&route, HandlerTree::handler(|ctx: Context| async move {
            let body = ctx.body.clone().unwrap_or_default();
            assert_eq!(body, json!({ "title": "x" }));
            let post: NewPost = ctx.body_as().unwrap().unwrap();
            post.title
        }))
        .build()
        .unwrap();

    let ok = router
        .dispatch(Request::new(Method::Post, "/posts").with_form(&[("title", "x")]))
        .await;
    assert_eq!(ok.body(), b"x".as_slice());

    let rejected = router.dispatch(Request::new(Method::Post, "/posts")).await;
    assert_eq!(rejected.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let message = String::from_utf8_lossy(rejected.body()).into_owned();
    assert!(message.contains("title"), "{message}");
}

#[tokio::test]
async fn metadata_from_separate_attach_calls_is_combined() {
    let route = Route::post("/posts");
    let pool = service_token::<Pool>();

    let router = RouterBuilder::empty()
        .attach(&route, RouteMetadata::new().body(schema::deserialize::<NewPost>()))
        .attach(&route, RouteMetadata::new().service("pool", &pool))
        .provide(&route, ServiceContainer::new().register("pool", || Pool(1)))
        .route(&route, HandlerTree::handler(|ctx: Context| async move {
            let pool = ctx.service::<Pool>("pool")?;
            let post: NewPost = ctx.body_as().unwrap().unwrap();
            Ok::<_, sprig::Error>(format!("{} {}", post.title, pool.0))
        }))
        .build()
        .unwrap();

    let res = router
        .dispatch(Request::new(Method::Post, "/posts").with_form(&[("title", "t")]))
        .await;
    assert_eq!(res.body(), b"t 1".as_slice());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_share_one_construction() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let pool = service_token::<Pool>();
    let route = Route::get("/pool");

    let container = ServiceContainer::new().register_async("pool", move || {
        let counter = Arc::clone(&counter);
        async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            Ok::<_, io::Error>(Pool(counter.fetch_add(1, Ordering::SeqCst)))
        }
    });

    let router = Arc::new(
        RouterBuilder::empty()
            .attach(&route, RouteMetadata::new().service("pool", &pool))
            .provide(&route, container)
            .route(&route, HandlerTree::handler(|ctx: Context| async move {
                let pool = ctx.service::<Pool>("pool")?;
                Ok::<_, sprig::Error>(format!("{:p}", Arc::as_ptr(&pool)))
            }))
            .build()
            .unwrap(),
    );

    let requests: Vec<_> = (0..12)
        .map(|_| {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.dispatch(Request::new(Method::Get, "/pool")).await })
        })
        .collect();

    let mut bodies = Vec::new();
    for request in requests {
        bodies.push(request.await.unwrap().body().to_vec());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(bodies.iter().all(|b| *b == bodies[0]));
}

#[tokio::test]
async fn failed_factory_fails_the_request_then_recovers() {
    init_tracing();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let pool = service_token::<Pool>();
    let route = Route::get("/pool");

    let container = ServiceContainer::new().register_async("pool", move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            match attempt {
                0 => Err(io::Error::other("connection refused")),
                n => Ok(Pool(n)),
            }
        }
    });

    let handled = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&handled);
    let router = RouterBuilder::empty()
        .attach(&route, RouteMetadata::new().service("pool", &pool))
        .provide(&route, container)
        .route(&route, HandlerTree::handler(move |_ctx: Context| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                "ok"
            }
        }))
        .build()
        .unwrap();

    let first = router.dispatch(Request::new(Method::Get, "/pool")).await;
    assert_eq!(first.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(handled.load(Ordering::SeqCst), 0);

    let second = router.dispatch(Request::new(Method::Get, "/pool")).await;
    assert_eq!(second.status_code(), StatusCode::OK);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abandoned_request_never_reaches_the_handler() {
    init_tracing();
    let pool = service_token::<Pool>();
    let route = Route::get("/slow");
    let handled = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&handled);

    let container = ServiceContainer::new().register_async("pool", || async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, io::Error>(Pool(0))
    });

    let router = RouterBuilder::empty()
        .attach(&route, RouteMetadata::new().service("pool", &pool))
        .provide(&route, container)
        .route(&route, HandlerTree::handler(move |_ctx: Context| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                "ok"
            }
        }))
        .build()
        .unwrap();

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        router.dispatch(Request::new(Method::Get, "/slow")),
    )
    .await;
    assert!(timed_out.is_err());
    assert_eq!(handled.load(Ordering::SeqCst), 0);

    let res = router.dispatch(Request::new(Method::Get, "/slow")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[test]
fn partial_handler_tree_is_rejected_at_build_time() {
    let routes = RouteTree::node([
        ("a", Route::get("/a").into()),
        ("b", Route::get("/b").into()),
    ]);
    let handlers = HandlerTree::node([("a", HandlerTree::handler(report_trail))]);

    let result = RouterBuilder::new(routes.clone()).map(routes, handlers).build();
    assert!(matches!(
        result,
        Err(sprig::Error::Config(sprig::ConfigError::ShapeMismatch { .. }))
    ));
}

#[tokio::test]
async fn raw_health_routes_sit_beside_enhanced_ones() {
    let route = Route::get("/posts");
    let pool = service_token::<Pool>();
    let router = RouterBuilder::empty()
        .raw(Method::Get, "/healthz", sprig::health::liveness)
        .raw(Method::Get, "/readyz", sprig::health::readiness)
        .attach(&route, RouteMetadata::new().service("pool", &pool))
        .provide(&route, ServiceContainer::new().register("pool", || Pool(2)))
        .route(&route, HandlerTree::handler(report_trail))
        .build()
        .unwrap();

    let live = router.dispatch(Request::new(Method::Get, "/healthz")).await;
    assert_eq!(live.body(), b"ok".as_slice());
    let ready = router.dispatch(Request::new(Method::Get, "/readyz")).await;
    assert_eq!(ready.body(), b"ready".as_slice());
    let posts = router.dispatch(Request::new(Method::Get, "/posts")).await;
    assert_eq!(posts.status_code(), StatusCode::OK);
}

#[derive(Debug)]
struct User(String);

#[tokio::test]
async fn handlers_read_services_the_loader_put_on_the_request() {
    init_tracing();
    let app = ContextServices::new().with("pool", Pool(9));
    let identify = middleware::from_fn(|mut ctx: Context, next: Next| async move {
        if let Some(name) = ctx.request.header("x-user").map(str::to_owned) {
            if let Some(services) = ctx.context_services_mut() {
                services.register("user", User(name));
            }
        }
        next.run(ctx).await
    });

    async fn whoami(ctx: Context) -> String {
        let Some(services) = ctx.context_services() else {
            return "no services".to_owned();
        };
        let pool = services.get::<Pool>("pool").map_or(0, |pool| pool.0);
        let user = services.get::<User>("user").map_or_else(|| "anonymous".to_owned(), |u| u.0.clone());
        format!("{user}@{pool}")
    }

    let routes = RouteTree::node([("me", Route::get("/me").into())]);
    let handlers = HandlerTree::with_middleware(
        [middleware::load_context_services(app), identify],
        HandlerTree::node([("me", HandlerTree::handler(whoami))]),
    );
    let router = RouterBuilder::new(routes.clone()).map(routes, handlers).build().unwrap();

    let named = router
        .dispatch(Request::new(Method::Get, "/me").with_header("x-user", "ada"))
        .await;
    assert_eq!(named.body(), b"ada@9".as_slice());

    // A value registered during one request is not seen by the next.
    let anonymous = router.dispatch(Request::new(Method::Get, "/me")).await;
    assert_eq!(anonymous.body(), b"anonymous@9".as_slice());
}
