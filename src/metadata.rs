//! Route metadata: body schema and required services, keyed by route identity.

use std::any::{Any, TypeId, type_name};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::route::{Route, RouteId, RouteTree};
use crate::schema::Schema;
use crate::service::ServiceToken;

/// A declared dependency: the token that names it and how to type-check it.
#[derive(Clone, Copy)]
pub struct Requirement {
    token: u64,
    type_id: TypeId,
    type_name: &'static str,
    accepts: fn(&(dyn Any + Send + Sync)) -> bool,
}

impl Requirement {
    fn of<T: Send + Sync + 'static>(token: &ServiceToken<T>) -> Self {
        Self {
            token: token.id(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            accepts: |instance| instance.is::<T>(),
        }
    }

    pub fn token_id(&self) -> u64 { self.token }
    pub fn type_id(&self) -> TypeId { self.type_id }
    pub fn type_name(&self) -> &'static str { self.type_name }

    pub(crate) fn accepts(&self, instance: &(dyn Any + Send + Sync)) -> bool {
        (self.accepts)(instance)
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.token)
    }
}

/// What a route declares about its requests.
///
/// Built fluently and attached with [`MetadataStore::attach`]:
///
/// ```rust
/// use sprig::{RouteMetadata, schema, service_token};
///
/// #[derive(serde::Deserialize, serde::Serialize)]
/// struct NewPost { title: String }
///
/// struct Db;
/// let db = service_token::<Db>();
///
/// let meta = RouteMetadata::new()
///     .body(schema::deserialize::<NewPost>())
///     .service("db", &db);
/// assert!(meta.body_schema().is_some());
/// ```
#[derive(Clone, Default)]
pub struct RouteMetadata {
    body: Option<Arc<dyn Schema>>,
    services: Option<BTreeMap<String, Requirement>>,
}

impl RouteMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and parses the request body with `schema`.
    pub fn body(mut self, schema: impl Schema) -> Self {
        self.body = Some(Arc::new(schema));
        self
    }

    /// Requires the service `name`, typed by `token`.
    pub fn service<T: Send + Sync + 'static>(mut self, name: &str, token: &ServiceToken<T>) -> Self {
        self.services
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_owned(), Requirement::of(token));
        self
    }

    pub fn body_schema(&self) -> Option<&Arc<dyn Schema>> {
        self.body.as_ref()
    }

    /// Declared services by name, or `None` if the route declares none.
    pub fn required_services(&self) -> Option<&BTreeMap<String, Requirement>> {
        self.services.as_ref().filter(|s| !s.is_empty())
    }

    fn is_empty(&self) -> bool {
        self.body.is_none() && self.required_services().is_none()
    }

    /// Each field this record sets overwrites the same field in `self`;
    /// unset fields leave `self` untouched.
    fn merge(&mut self, other: RouteMetadata) {
        if let Some(body) = other.body {
            self.body = Some(body);
        }
        if let Some(services) = other.services {
            self.services = Some(services);
        }
    }
}

impl fmt::Debug for RouteMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMetadata")
            .field("body", &self.body.is_some())
            .field("services", &self.services)
            .finish()
    }
}

/// Identity-keyed metadata for every enhanced route.
///
/// Populated while the router is being assembled and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct MetadataStore {
    entries: HashMap<RouteId, RouteMetadata>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `meta` into whatever `route` already carries.
    ///
    /// Attaching a body schema keeps previously declared services and vice
    /// versa. Records that end up declaring nothing are not stored.
    pub fn attach(&mut self, route: &Route, meta: RouteMetadata) -> &mut Self {
        let mut merged = self.entries.remove(&route.id()).unwrap_or_default();
        merged.merge(meta);
        if !merged.is_empty() {
            self.entries.insert(route.id(), merged);
        }
        self
    }

    /// Attaches metadata to every route of `tree` for which `f` returns some.
    pub fn attach_each<F>(&mut self, tree: &RouteTree, mut f: F) -> &mut Self
    where
        F: FnMut(&Route) -> Option<RouteMetadata>,
    {
        for route in tree.routes() {
            if let Some(meta) = f(route) {
                self.attach(route, meta);
            }
        }
        self
    }

    pub fn lookup(&self, route: &Route) -> Option<&RouteMetadata> {
        self.entries.get(&route.id())
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{self, Validation};
    use crate::service::service_token;

    fn accept_all() -> impl Schema {
        schema::from_fn(|form| Validation::Valid(form.to_value()))
    }

    #[test]
    fn attach_calls_merge_instead_of_overwrite() {
        let route = Route::post("/posts");
        let db = service_token::<String>();
        let mut store = MetadataStore::new();

        store.attach(&route, RouteMetadata::new().body(accept_all()));
        store.attach(&route, RouteMetadata::new().service("db", &db));

        let meta = store.lookup(&route).unwrap();
        assert!(meta.body_schema().is_some());
        assert_eq!(meta.required_services().unwrap()["db"].token_id(), db.id());
    }

    #[test]
    fn metadata_is_keyed_by_identity() {
        let a = Route::post("/posts");
        let b = Route::post("/posts");
        let mut store = MetadataStore::new();
        store.attach(&a, RouteMetadata::new().body(accept_all()));
        assert!(store.lookup(&a).is_some());
        assert!(store.lookup(&b).is_none());
    }

    #[test]
    fn empty_metadata_is_not_stored() {
        let route = Route::get("/");
        let mut store = MetadataStore::new();
        store.attach(&route, RouteMetadata::new());
        assert!(store.is_empty());
    }

    #[test]
    fn attach_each_walks_the_tree() {
        let routes = RouteTree::node([
            ("index", Route::get("/posts").into()),
            ("create", Route::post("/posts").into()),
        ]);
        let mut store = MetadataStore::new();
        store.attach_each(&routes, |route| {
            (route.method() == crate::Method::Post).then(|| RouteMetadata::new().body(accept_all()))
        });
        assert_eq!(store.len(), 1);
        assert!(store.lookup(routes.route("create").unwrap()).is_some());
    }

    #[test]
    fn requirement_checks_the_token_type() {
        let token = service_token::<u32>();
        let meta = RouteMetadata::new().service("n", &token);
        let req = meta.required_services().unwrap()["n"];
        assert_eq!(req.type_id(), TypeId::of::<u32>());
        assert!(req.accepts(&7_u32));
        assert!(!req.accepts(&"seven"));
    }
}
