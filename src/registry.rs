//! Route → service container registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::route::{Route, RouteId};
use crate::service::ServiceContainer;

/// Identity-keyed mapping from routes to the container that serves them.
///
/// One container may back several routes; share it through the `Arc`.
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<RouteId, Arc<ServiceContainer>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(
        &mut self,
        route: &Route,
        container: impl Into<Arc<ServiceContainer>>,
    ) -> &mut Self {
        self.providers.insert(route.id(), container.into());
        self
    }

    pub fn get_provider(&self, route: &Route) -> Option<&Arc<ServiceContainer>> {
        self.providers.get(&route.id())
    }

    pub fn len(&self) -> usize { self.providers.len() }
    pub fn is_empty(&self) -> bool { self.providers.is_empty() }
}
