//! Body schemas.
//!
//! A [`Schema`] receives the request's decoded form fields and either accepts
//! them, producing the value handlers see as [`Context::body`](crate::Context),
//! or rejects them with a list of [`Issue`]s. Any validation library can sit
//! behind the trait; [`deserialize`] covers the common serde case.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::BodyValidationError;
use crate::request::FormData;

/// Outcome of one validation run.
#[derive(Clone, Debug)]
pub enum Validation {
    Valid(Value),
    Invalid(Vec<Issue>),
}

/// Validates raw form input into a body value.
#[async_trait]
pub trait Schema: Send + Sync + 'static {
    async fn validate(&self, input: FormData) -> Validation;
}

/// One problem found in the input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub message: String,
    pub path: Vec<PathSegment>,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), path: Vec::new() }
    }

    /// Appends a segment to the issue's path.
    pub fn at(mut self, segment: PathSegment) -> Self {
        self.path.push(segment);
        self
    }

    /// The path joined with `.`, empty when there is nothing to show.
    pub fn path_string(&self) -> String {
        self.path.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path_string();
        if path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{path}: {}", self.message)
        }
    }
}

/// A step into nested input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

// ── Built-in schemas ──────────────────────────────────────────────────────────

/// Schema that deserializes the form into `T`.
///
/// The body handed to the handler is `T` serialized back to JSON, so defaults
/// and coerced numbers are already applied. Read it typed with
/// [`Context::body_as`](crate::Context::body_as).
pub struct Deserialize<T>(PhantomData<fn() -> T>);

/// Shorthand for [`Deserialize::<T>`](Deserialize).
pub fn deserialize<T>() -> Deserialize<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    Deserialize(PhantomData)
}

#[async_trait]
impl<T> Schema for Deserialize<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    async fn validate(&self, input: FormData) -> Validation {
        let parsed = match input.deserialize::<T>() {
            Ok(parsed) => parsed,
            Err(e) => return Validation::Invalid(vec![Issue::new(e.to_string())]),
        };
        match serde_json::to_value(parsed) {
            Ok(value) => Validation::Valid(value),
            Err(e) => Validation::Invalid(vec![Issue::new(e.to_string())]),
        }
    }
}

/// Schema backed by a synchronous closure.
pub struct FnSchema<F>(F);

/// Builds a [`Schema`] from a closure.
///
/// ```rust
/// use sprig::schema::{self, Issue, PathSegment, Validation};
///
/// let title_required = schema::from_fn(|form| match form.get("title") {
///     Some(title) if !title.is_empty() => Validation::Valid(form.to_value()),
///     _ => Validation::Invalid(vec![
///         Issue::new("is required").at(PathSegment::key("title")),
///     ]),
/// });
/// # let _ = title_required;
/// ```
pub fn from_fn<F>(f: F) -> FnSchema<F>
where
    F: Fn(FormData) -> Validation + Send + Sync + 'static,
{
    FnSchema(f)
}

#[async_trait]
impl<F> Schema for FnSchema<F>
where
    F: Fn(FormData) -> Validation + Send + Sync + 'static,
{
    async fn validate(&self, input: FormData) -> Validation {
        (self.0)(input)
    }
}

/// Runs `schema` over `input`, folding rejection into one error.
pub(crate) async fn parse_body(
    schema: &dyn Schema,
    input: FormData,
) -> Result<Value, BodyValidationError> {
    match schema.validate(input).await {
        Validation::Valid(value) => Ok(value),
        Validation::Invalid(issues) => Err(BodyValidationError::new(issues)),
    }
}
