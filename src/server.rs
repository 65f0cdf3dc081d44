//! TCP front end.
//!
//! [`Server`] accepts connections, lets hyper speak HTTP/1.1 or HTTP/2 on
//! each one, buffers request bodies and hands every request to
//! [`Router::dispatch`].
//!
//! On shutdown the accept loop stops first; connections already open are
//! allowed to finish before `serve` returns. By default the shutdown trigger
//! is SIGTERM or Ctrl-C; [`Server::serve_with_shutdown`] takes any future.
//!
//! Bodies larger than [`Server::body_limit`] (2 MiB unless configured) are
//! refused with `413 Payload Too Large` before routing.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Serves a [`Router`] on one socket address.
#[derive(Clone, Copy, Debug)]
pub struct Server {
    addr: SocketAddr,
    body_limit: usize,
}

const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

impl Server {
    /// ```rust,no_run
    /// use sprig::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 3000));
    /// ```
    pub fn bind(addr: impl Into<SocketAddr>) -> Self {
        Self { addr: addr.into(), body_limit: DEFAULT_BODY_LIMIT }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Largest request body, in bytes, the server reads.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Serves until SIGTERM or Ctrl-C, then drains open connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then drains open connections.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "sprig listening");
        run(listener, Arc::new(router), self.body_limit, signal).await;
        info!("sprig stopped");
        Ok(())
    }
}

async fn run(
    listener: TcpListener,
    router: Arc<Router>,
    body_limit: usize,
    signal: impl Future<Output = ()>,
) {
    let mut connections = JoinSet::new();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            // Shutdown wins over queued connections.
            biased;

            () = &mut signal => {
                info!(open = connections.len(), "shutting down, draining connections");
                break;
            }

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        continue;
                    }
                };
                let router = Arc::clone(&router);
                connections.spawn(connection(TokioIo::new(stream), peer, router, body_limit));
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    while connections.join_next().await.is_some() {}
}

async fn connection(
    io: TokioIo<tokio::net::TcpStream>,
    peer: SocketAddr,
    router: Arc<Router>,
    body_limit: usize,
) {
    debug!(%peer, "connection opened");
    let service = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { handle(&router, req, peer, body_limit).await }
    });

    if let Err(e) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, service).await {
        warn!(%peer, error = %e, "connection closed with error");
    }
}

/// Turns one hyper request into a [`Request`] and routes it. Every failure
/// becomes a response, so hyper never sees an error.
async fn handle(
    router: &Router,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
    body_limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let Ok(method) = Method::try_from(req.method()) else {
        return Ok(Response::status(StatusCode::METHOD_NOT_ALLOWED).into_inner());
    };

    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, body_limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(%peer, limit = body_limit, "request body too large");
            return Ok(Response::status(StatusCode::PAYLOAD_TOO_LARGE).into_inner());
        }
        Err(e) => {
            warn!(%peer, error = %e, "unreadable request body");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let response = router.dispatch(Request::from_parts(method, &parts, body)).await;
    Ok(response.into_inner())
}

/// Resolves on SIGTERM (Unix) or Ctrl-C.
///
/// A signal that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
