use std::sync::Arc;

use tracing::debug;

use crate::route::{ResolvedRoute, RouteTable, SettingsLoader};
use crate::RouteError;

/// Outcome of [`Router::navigate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// No route matched; the caller performs a full navigation to `url`.
    Unrouted { url: String },
    /// A different route than the current one matched; the caller performs a
    /// full navigation. Settings are not loaded.
    Reload(ResolvedRoute),
    /// First navigation or same route: update the page in place. Settings
    /// and extender are loaded.
    Update(ResolvedRoute),
}

/// Navigation state over a [`RouteTable`].
pub struct Router {
    table: RouteTable,
    loader: Arc<dyn SettingsLoader>,
    current: Option<ResolvedRoute>,
}

impl Router {
    pub fn new(table: RouteTable, loader: Arc<dyn SettingsLoader>) -> Self {
        Self {
            table,
            loader,
            current: None,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut RouteTable {
        &mut self.table
    }

    pub fn current(&self) -> Option<&ResolvedRoute> {
        self.current.as_ref()
    }

    pub async fn navigate(&mut self, url: &str) -> Result<Navigation, RouteError> {
        let mut route = self.table.resolve(url)?;
        let Some(index) = route.index else {
            debug!(url, "unrouted navigation");
            return Ok(Navigation::Unrouted {
                url: url.to_string(),
            });
        };

        if let Some(current) = &self.current {
            if current.name != route.name {
                debug!(url, from = ?current.name, to = ?route.name, "route changed, reloading");
                self.current = Some(route.clone());
                return Ok(Navigation::Reload(route));
            }
        }

        if let Some(reference) = route.settings_ref.clone() {
            let settings = self
                .table
                .load_settings(index, &reference, self.loader.as_ref())
                .await?;
            route.settings = Some(settings);
        }
        if let Some(reference) = route.extender_ref.clone() {
            let extender = self
                .table
                .load_extender(index, &reference, self.loader.as_ref())
                .await?;
            route.extender = Some(extender);
        }

        self.current = Some(route.clone());
        Ok(Navigation::Update(route))
    }
}
