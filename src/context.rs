use std::sync::Arc;

use crate::registry::Registry;
use crate::route::{RouteTable, Router, SettingsLoader};

/// Everything a page needs, constructed explicitly and passed around.
/// Independent contexts share nothing.
pub struct Context {
    router: Router,
    registry: Registry,
}

impl Context {
    pub fn new(table: RouteTable, loader: Arc<dyn SettingsLoader>) -> Self {
        Self::with_registry(Router::new(table, loader), Registry::new())
    }

    pub fn with_registry(router: Router, registry: Registry) -> Self {
        Self { router, registry }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// The collaborator registry. Clone it to hand out shared access.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
