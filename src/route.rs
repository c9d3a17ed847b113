//! Route table and navigation.
//!
//! A [`RouteTable`] holds compiled route entries in priority order and
//! resolves URLs against them, newest entry first. A [`Router`] adds the
//! navigation state on top: it remembers the current route, lazily loads
//! route settings through a [`SettingsLoader`] and decides whether a
//! navigation can update the page in place or needs a full reload.

pub mod router;
pub mod table;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pattern::{ParamValue, Params, PathPattern, PatternOptions};

pub use router::{Navigation, Router};
pub use table::{RouteEntry, RouteTable};

/// Loads the content behind a route's `settings` / `extender` reference.
/// The transport is up to the implementor.
#[async_trait]
pub trait SettingsLoader: Send + Sync {
    async fn load(&self, reference: &str) -> anyhow::Result<Value>;
}

// ---------------------------------------------------------------------------
// Route definitions
// ---------------------------------------------------------------------------

/// One or several path patterns for a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutePath {
    One(String),
    Many(Vec<String>),
}

impl RoutePath {
    /// Display form: alternatives joined with `|`.
    pub fn display(&self) -> String {
        match self {
            RoutePath::One(path) => path.clone(),
            RoutePath::Many(paths) => paths.join("|"),
        }
    }
}

impl From<&str> for RoutePath {
    fn from(path: &str) -> Self {
        RoutePath::One(path.to_string())
    }
}

impl From<Vec<&str>> for RoutePath {
    fn from(paths: Vec<&str>) -> Self {
        RoutePath::Many(paths.into_iter().map(str::to_string).collect())
    }
}

impl From<RoutePath> for PathPattern {
    fn from(path: RoutePath) -> Self {
        match path {
            RoutePath::One(path) => PathPattern::Path(path),
            RoutePath::Many(paths) => PathPattern::Alternatives(paths),
        }
    }
}

/// What is registered for a route besides its title.
///
/// `name`, `settings` and `extender` may contain `${param}` placeholders
/// filled from the matched path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub path: RoutePath,
    #[serde(default)]
    pub name: Option<String>,
    /// Required origin, e.g. `https://example.com`.
    #[serde(default)]
    pub origin: Option<String>,
    /// Settings reference handed to the [`SettingsLoader`].
    #[serde(default)]
    pub settings: Option<String>,
    #[serde(default)]
    pub extender: Option<String>,
    /// Opaque per-route options passed through to the caller.
    #[serde(default)]
    pub options: Option<Value>,
}

impl RouteSpec {
    pub fn new(path: impl Into<RoutePath>) -> Self {
        Self {
            path: path.into(),
            name: None,
            origin: None,
            settings: None,
            extender: None,
            options: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn settings(mut self, reference: impl Into<String>) -> Self {
        self.settings = Some(reference.into());
        self
    }

    pub fn extender(mut self, reference: impl Into<String>) -> Self {
        self.extender = Some(reference.into());
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

/// A route as written in a routes config document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub title: String,
    #[serde(flatten)]
    pub spec: RouteSpec,
}

/// Declarative routes block.
///
/// ```json
/// { "options": { "strict": true },
///   "routes": [ { "title": "User", "path": "/users/:id", "name": "user-${id}" } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutesConfig {
    pub options: PatternOptions,
    /// In registration order; later routes take priority.
    pub routes: Vec<RouteDefinition>,
}

// ---------------------------------------------------------------------------
// Resolution result
// ---------------------------------------------------------------------------

/// Result of resolving a URL. `index` and `name` are `None` when no route
/// matched; callers fall back to a full navigation in that case.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedRoute {
    /// Position of the matched entry in the table.
    pub index: Option<usize>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub url: String,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub query_params: BTreeMap<String, String>,
    pub params: Params,
    pub settings_ref: Option<String>,
    pub extender_ref: Option<String>,
    pub route_options: Option<Value>,
    pub settings: Option<Value>,
    pub extender: Option<Value>,
}

impl ResolvedRoute {
    pub fn is_routed(&self) -> bool {
        self.index.is_some()
    }
}

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder expression"))
}

/// Replace `${name}` with the matching parameter. Repeated values are joined
/// with `/`. Unknown or uncaptured parameters are left as written.
pub fn interpolate(template: &str, params: &Params) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| match params.get(&caps[1]) {
            Some(ParamValue::Single(value)) => value.clone(),
            Some(ParamValue::Repeated(values)) => values.join("/"),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interpolates_known_params() {
        let params = Params::new().with("id", "42").with("rest", vec!["a", "b"]);
        assert_eq!(interpolate("user-${id}", &params), "user-42");
        assert_eq!(interpolate("/cfg/${rest}.json", &params), "/cfg/a/b.json");
    }

    #[test]
    fn leaves_unknown_placeholders() {
        let mut params = Params::new();
        params.insert("tab", None);
        assert_eq!(interpolate("${missing}/${tab}", &params), "${missing}/${tab}");
    }

    #[test]
    fn config_accepts_single_and_many_paths() {
        let config: RoutesConfig = serde_json::from_str(
            r#"{
                "options": { "strict": true },
                "routes": [
                    { "title": "Home", "path": "/" },
                    { "title": "Docs", "path": ["/docs", "/guide"], "settings": "/s.json" }
                ]
            }"#,
        )
        .unwrap();

        assert!(config.options.strict);
        assert_eq!(config.routes[0].spec.path, RoutePath::from("/"));
        assert_eq!(config.routes[1].spec.path, RoutePath::from(vec!["/docs", "/guide"]));
        assert_eq!(config.routes[1].spec.settings.as_deref(), Some("/s.json"));
    }
}
