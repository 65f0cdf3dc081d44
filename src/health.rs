//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! They take no metadata, so register them as raw routes:
//!
//! ```rust
//! use sprig::{Method, RouterBuilder, health};
//!
//! let builder = RouterBuilder::empty()
//!     .raw(Method::Get, "/healthz", health::liveness)
//!     .raw(Method::Get, "/readyz", health::readiness);
//! # let _ = builder;
//! ```
//!
//! To gate readiness on a route's services, map your own handler with the
//! services it needs and report `503` until they resolve.

use crate::{Context, Response};

/// Kubernetes liveness probe handler.
///
/// Always returns `200 OK` with body `"ok"`.
pub async fn liveness(_ctx: Context) -> Response {
    Response::text("ok")
}

/// Kubernetes readiness probe handler (default implementation).
pub async fn readiness(_ctx: Context) -> Response {
    Response::text("ready")
}
