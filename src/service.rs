//! Per-route service containers.
//!
//! A [`ServiceContainer`] holds named factories and builds each service at
//! most once, on first use. Every request routed to the endpoint then shares
//! that instance. Construction is single-flight: concurrent first requests
//! wait on one factory call instead of racing to build their own.
//!
//! A factory that fails (or whose caller is cancelled mid-construction)
//! leaves its slot empty, so the next resolution tries again.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::{BoxError, Error};
use crate::handler::BoxFuture;

/// A constructed service, shared by every request that resolves it.
pub type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn() -> BoxFuture<Result<Instance, BoxError>> + Send + Sync>;

// ── ServiceToken ──────────────────────────────────────────────────────────────

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Names a typed dependency slot without committing to an implementation.
///
/// Create one per dependency and reuse it wherever that dependency is
/// required; the type parameter is checked when the service is resolved.
pub struct ServiceToken<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

/// Creates a fresh [`ServiceToken`].
pub fn service_token<T: Send + Sync + 'static>() -> ServiceToken<T> {
    ServiceToken {
        id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
        _marker: PhantomData,
    }
}

impl<T> ServiceToken<T> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Clone for ServiceToken<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ServiceToken<T> {}

impl<T> PartialEq for ServiceToken<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ServiceToken<T> {}

impl<T> fmt::Debug for ServiceToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceToken<{}>#{}", type_name::<T>(), self.id)
    }
}

// ── ServiceContainer ──────────────────────────────────────────────────────────

struct Entry {
    name: String,
    output: (TypeId, &'static str),
    factory: Factory,
    instance: OnceCell<Instance>,
}

/// Named factories with lazy, cached, single-flight construction.
///
/// ```rust
/// use sprig::ServiceContainer;
///
/// # async fn run() -> Result<(), sprig::Error> {
/// let container = ServiceContainer::new()
///     .register("greeting", || String::from("hello"));
///
/// let a = container.resolve_as::<String>("greeting").await?;
/// let b = container.resolve_as::<String>("greeting").await?;
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ServiceContainer {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous, infallible factory under `name`.
    ///
    /// Re-registering a name replaces its factory but keeps an instance that
    /// was already built.
    pub fn register<T, F>(self, name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.insert(name.into(), output::<T>(), Arc::new(move || -> BoxFuture<Result<Instance, BoxError>> {
            let instance: Instance = Arc::new(factory());
            Box::pin(std::future::ready(Ok(instance)))
        }))
    }

    /// Registers an async, fallible factory under `name`, e.g. one that
    /// opens a connection pool.
    pub fn register_async<T, E, F, Fut>(self, name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.insert(name.into(), output::<T>(), Arc::new(move || -> BoxFuture<Result<Instance, BoxError>> {
            let fut = factory();
            Box::pin(async move {
                let service = fut.await.map_err(Into::<BoxError>::into)?;
                Ok::<_, BoxError>(Arc::new(service) as Instance)
            })
        }))
    }

    fn insert(mut self, name: String, output: (TypeId, &'static str), factory: Factory) -> Self {
        match self.index.get(&name) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.output = output;
                entry.factory = factory;
            }
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push(Entry { name, output, factory, instance: OnceCell::new() });
            }
        }
        self
    }

    /// The type the factory registered under `name` produces, with its name.
    pub(crate) fn output_type(&self, name: &str) -> Option<(TypeId, &'static str)> {
        self.index.get(name).map(|&i| self.entries[i].output)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Returns the service registered under `name`, building it on first use.
    pub async fn resolve(&self, name: &str) -> Result<Instance, Error> {
        let entry = self.index.get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| Error::UnknownService { name: name.to_owned() })?;
        resolve_entry(entry).await
    }

    /// Typed [`resolve`](Self::resolve).
    pub async fn resolve_as<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, Error> {
        downcast(name, self.resolve(name).await?)
    }

    /// Resolves every registered service, in registration order.
    pub async fn resolve_all(&self) -> Result<Services, Error> {
        let mut instances = HashMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            instances.insert(entry.name.clone(), resolve_entry(entry).await?);
        }
        Ok(Services { instances })
    }
}

async fn resolve_entry(entry: &Entry) -> Result<Instance, Error> {
    if let Some(instance) = entry.instance.get() {
        trace!(service = %entry.name, "service cache hit");
        return Ok(Arc::clone(instance));
    }
    let instance = entry.instance
        .get_or_try_init(|| {
            debug!(service = %entry.name, "constructing service");
            (entry.factory)()
        })
        .await
        .map_err(|source| Error::factory(&entry.name, source))?;
    Ok(Arc::clone(instance))
}

fn output<T: 'static>() -> (TypeId, &'static str) {
    (TypeId::of::<T>(), type_name::<T>())
}

fn downcast<T: Send + Sync + 'static>(name: &str, instance: Instance) -> Result<Arc<T>, Error> {
    instance.downcast::<T>().map_err(|_| Error::ServiceType {
        name: name.to_owned(),
        expected: type_name::<T>(),
    })
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.entries.iter().map(|e| &e.name).collect::<Vec<_>>())
            .finish()
    }
}

// ── Services ──────────────────────────────────────────────────────────────────

/// The resolved services of one request, keyed by name.
#[derive(Clone, Default)]
pub struct Services {
    instances: HashMap<String, Instance>,
}

impl Services {
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, Error> {
        let instance = self.instances.get(name)
            .ok_or_else(|| Error::UnknownService { name: name.to_owned() })?;
        downcast(name, Arc::clone(instance))
    }

    /// [`get`](Self::get) with the type taken from a token.
    pub fn token<T: Send + Sync + 'static>(
        &self,
        name: &str,
        _token: &ServiceToken<T>,
    ) -> Result<Arc<T>, Error> {
        self.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    pub(crate) fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.get(name)
    }

    pub fn len(&self) -> usize { self.instances.len() }
    pub fn is_empty(&self) -> bool { self.instances.is_empty() }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.instances.keys()).finish()
    }
}
