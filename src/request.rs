//! Incoming HTTP request type and its decoded form fields.

use std::collections::BTreeMap;
use std::collections::HashMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::method::Method;

/// An incoming HTTP request with its body already read into memory.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    /// Creates a request for `uri` (path plus optional `?query`).
    ///
    /// The server builds requests from the wire; this constructor exists for
    /// driving a [`Router`](crate::Router) directly, e.g. in tests.
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (uri, None),
        };
        Self {
            method,
            path: path.to_owned(),
            query,
            headers: Vec::new(),
            body: Bytes::new(),
            params: HashMap::new(),
        }
    }

    pub(crate) fn from_parts(method: Method, parts: &http::request::Parts, body: Bytes) -> Self {
        let headers = parts.headers.iter()
            .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
            .collect();
        Self {
            method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers,
            body,
            params: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets an `application/x-www-form-urlencoded` body built from `fields`.
    pub fn with_form(self, fields: &[(&str, &str)]) -> Self {
        // Encoding a slice of string pairs cannot fail.
        let encoded = serde_urlencoded::to_string(fields).unwrap_or_default();
        self.with_header("content-type", "application/x-www-form-urlencoded")
            .with_body(encoded)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/posts/{id}`, `req.param("id")` on `/posts/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Decodes the request's form fields.
    ///
    /// Reads a url-encoded body, or the query string when the body is empty.
    /// A field sent more than once keeps its last value.
    pub fn form_data(&self) -> Result<FormData, Error> {
        let pairs: Vec<(String, String)> = if !self.body.is_empty() {
            serde_urlencoded::from_bytes(&self.body)?
        } else {
            match &self.query {
                Some(query) => serde_urlencoded::from_str(query)?,
                None => Vec::new(),
            }
        };
        Ok(pairs.into_iter().collect())
    }
}

/// Form fields as a flat `name → value` mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormData(BTreeMap<String, String>);

impl FormData {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// The fields as a JSON object of strings.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self.0.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }

    /// Deserializes the fields into `T` with url-encoded coercion rules, so
    /// `"42"` fills a numeric field.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_urlencoded::de::Error> {
        let encoded = serde_urlencoded::to_string(&self.0).unwrap_or_default();
        serde_urlencoded::from_str(&encoded)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
