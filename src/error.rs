//! Unified error type.
//!
//! Two families live here. [`ConfigError`] is raised while a
//! [`RouterBuilder`](crate::RouterBuilder) is being built and stops the
//! router from ever serving. Everything else in [`Error`] happens per request
//! and travels back up the middleware chain until
//! [`Router::dispatch`](crate::Router::dispatch) turns it into a response.

use std::fmt;

use http::StatusCode;

use crate::response::{IntoResponse, Response};
use crate::schema::Issue;

/// Boxed error returned by fallible service factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by sprig's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown service `{name}`")]
    UnknownService { name: String },

    #[error("service `{name}` is not a `{expected}`")]
    ServiceType { name: String, expected: &'static str },

    /// A service factory failed. Displays as the factory's own error; the
    /// name is kept for logging.
    #[error("{source}")]
    Factory {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    BodyValidation(#[from] BodyValidationError),

    #[error("malformed form data: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The status code this error maps to when it reaches the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BodyValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Form(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn factory(name: &str, source: BoxError) -> Self {
        Self::Factory { name: name.to_owned(), source }
    }
}

/// Client errors carry their message; server errors never leak internals.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            Response::builder().status(status).text(self.to_string())
        } else {
            Response::status(status)
        }
    }
}

/// A route tree that cannot be turned into a router.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("route tree and handler tree differ at `{path}`: {detail}")]
    ShapeMismatch { path: String, detail: &'static str },

    #[error("{route} declares required services but no provider is registered for it")]
    MissingProvider { route: String },

    #[error("{route} requires service `{name}` which its provider does not register")]
    MissingService { route: String, name: String },

    #[error("{route} requires service `{name}` as `{expected}` but its provider builds `{found}`")]
    ServiceType {
        route: String,
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{route} is declared but no handler was mapped to it")]
    Unmapped { route: String },

    #[error("{route} cannot be installed: {reason}")]
    DuplicateRoute { route: String, reason: String },
}

/// Every issue a body schema reported for one request.
#[derive(Debug, Clone)]
pub struct BodyValidationError {
    issues: Vec<Issue>,
}

impl BodyValidationError {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

/// `path: message` per issue joined by `; `, or a fixed message when the
/// schema rejected the input without saying why.
impl fmt::Display for BodyValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return f.write_str("Body validation failed");
        }
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BodyValidationError {}
