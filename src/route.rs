//! Route identities and route trees.
//!
//! A [`Route`] is one `(method, pattern)` endpoint with an identity of its
//! own. Metadata and service providers attach to that identity, never to the
//! text: two routes created separately for `GET /posts` are different keys.
//! Cloning a `Route` copies the handle, not the identity.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::method::Method;

static NEXT_ROUTE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a [`Route`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct RouteId(u64);

/// One routable endpoint.
#[derive(Clone)]
pub struct Route {
    id: RouteId,
    method: Method,
    pattern: Arc<str>,
}

impl Route {
    /// Creates a new route with a fresh identity.
    ///
    /// `pattern` uses `{name}` path parameters and is only parsed when the
    /// route is installed.
    pub fn new(method: Method, pattern: &str) -> Self {
        Self {
            id: RouteId(NEXT_ROUTE_ID.fetch_add(1, Ordering::Relaxed)),
            method,
            pattern: Arc::from(pattern),
        }
    }

    pub fn get(pattern: &str) -> Self { Self::new(Method::Get, pattern) }
    pub fn post(pattern: &str) -> Self { Self::new(Method::Post, pattern) }
    pub fn put(pattern: &str) -> Self { Self::new(Method::Put, pattern) }
    pub fn patch(pattern: &str) -> Self { Self::new(Method::Patch, pattern) }
    pub fn delete(pattern: &str) -> Self { Self::new(Method::Delete, pattern) }
    pub fn any(pattern: &str) -> Self { Self::new(Method::Any, pattern) }

    pub fn id(&self) -> RouteId { self.id }
    pub fn method(&self) -> Method { self.method }
    pub fn pattern(&self) -> &str { &self.pattern }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Route {}

impl Hash for Route {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Route#{}({self})", self.id.0)
    }
}

/// A nested map of routes, keyed by name.
#[derive(Clone, Debug)]
pub enum RouteTree {
    Leaf(Route),
    Node(BTreeMap<String, RouteTree>),
}

impl RouteTree {
    /// Builds an internal node from `(key, subtree)` pairs.
    ///
    /// ```rust
    /// use sprig::{Route, RouteTree};
    ///
    /// let routes = RouteTree::node([
    ///     ("index", Route::get("/posts").into()),
    ///     ("admin", RouteTree::node([
    ///         ("destroy", Route::delete("/posts/{id}").into()),
    ///     ])),
    /// ]);
    /// assert_eq!(routes.routes().len(), 2);
    /// ```
    pub fn node<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, RouteTree)>,
        K: Into<String>,
    {
        Self::Node(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Every route in the tree, depth-first in key order.
    pub fn routes(&self) -> Vec<&Route> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Route>) {
        match self {
            Self::Leaf(route) => out.push(route),
            Self::Node(children) => children.values().for_each(|child| child.collect(out)),
        }
    }

    /// Looks up a subtree by dotted path, e.g. `"admin.destroy"`.
    pub fn get(&self, path: &str) -> Option<&RouteTree> {
        path.split('.').try_fold(self, |tree, key| match tree {
            Self::Node(children) => children.get(key),
            Self::Leaf(_) => None,
        })
    }

    /// The route at a dotted path, if that path names a leaf.
    pub fn route(&self, path: &str) -> Option<&Route> {
        match self.get(path)? {
            Self::Leaf(route) => Some(route),
            Self::Node(_) => None,
        }
    }
}

impl From<Route> for RouteTree {
    fn from(route: Route) -> Self {
        Self::Leaf(route)
    }
}
