use std::sync::Arc;

use serde_json::Value;
use tracing::trace;
use url::{Origin, Url};

use crate::pattern::{Matcher, PathCompiler, PatternCompiler, PatternOptions};
use crate::route::{interpolate, ResolvedRoute, RouteSpec, RoutesConfig, SettingsLoader};
use crate::RouteError;

/// Base for resolving relative URLs such as `/users/42?tab=a`.
const BASE_URL: &str = "http://localhost";

/// A value fetched through the [`SettingsLoader`], keyed by the reference it
/// was loaded from.
#[derive(Debug, Clone, PartialEq)]
struct Loaded {
    reference: String,
    value: Value,
}

/// A registered route. Immutable apart from its lazily loaded settings and
/// extender.
#[derive(Debug)]
pub struct RouteEntry {
    pub title: String,
    pub name: Option<String>,
    pub origin: Option<String>,
    pub path: String,
    pub settings_ref: Option<String>,
    pub extender_ref: Option<String>,
    pub route_options: Option<Value>,
    matcher: Matcher,
    /// `origin` parsed, so scheme and host case or default ports don't matter.
    required_origin: Option<Origin>,
    settings: Option<Loaded>,
    extender: Option<Loaded>,
}

impl RouteEntry {
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn settings(&self) -> Option<&Value> {
        self.settings.as_ref().map(|loaded| &loaded.value)
    }

    pub fn extender(&self) -> Option<&Value> {
        self.extender.as_ref().map(|loaded| &loaded.value)
    }
}

#[derive(Debug, Clone, Copy)]
enum Lazy {
    Settings,
    Extender,
}

/// Ordered route list, resolved from the last entry to the first.
///
/// Prepended entries sit at the tail, so they take priority over appended
/// ones. Within each group the most recently added entry wins.
pub struct RouteTable {
    compiler: Arc<dyn PatternCompiler>,
    entries: Vec<RouteEntry>,
    prepended: usize,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::with_compiler(Arc::new(PathCompiler::default()))
    }
}

impl RouteTable {
    pub fn new(options: PatternOptions) -> Self {
        Self::with_compiler(Arc::new(PathCompiler::new(options)))
    }

    pub fn with_compiler(compiler: Arc<dyn PatternCompiler>) -> Self {
        Self {
            compiler,
            entries: Vec::new(),
            prepended: 0,
        }
    }

    /// Build a table from a routes config, registering routes in order.
    pub fn from_config(config: RoutesConfig) -> Result<Self, RouteError> {
        let mut table = Self::new(config.options);
        for route in config.routes {
            table.add_route(route.title, route.spec, false)?;
        }
        Ok(table)
    }

    pub fn from_json(json: &str) -> Result<Self, RouteError> {
        let config: RoutesConfig = serde_json::from_str(json)?;
        Self::from_config(config)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&RouteEntry> {
        self.entries.get(index)
    }

    /// Compile and register a route. A prepended route is checked before
    /// every other route; an appended one only before earlier appended ones.
    pub fn add_route(
        &mut self,
        title: impl Into<String>,
        spec: RouteSpec,
        prepend: bool,
    ) -> Result<&RouteEntry, RouteError> {
        let path = spec.path.display();
        let matcher = self.compiler.compile(spec.path.into())?;
        let required_origin = spec
            .origin
            .as_deref()
            .map(|origin| {
                Url::parse(origin)
                    .map(|url| url.origin())
                    .map_err(|source| RouteError::InvalidUrl {
                        url: origin.to_string(),
                        source,
                    })
            })
            .transpose()?;
        let entry = RouteEntry {
            title: title.into(),
            name: spec.name,
            origin: spec.origin,
            path,
            settings_ref: spec.settings,
            extender_ref: spec.extender,
            route_options: spec.options,
            matcher,
            required_origin,
            settings: None,
            extender: None,
        };
        trace!(title = %entry.title, path = %entry.path, prepend, "route added");

        let index = if prepend {
            self.prepended += 1;
            self.entries.len()
        } else {
            self.entries.len() - self.prepended
        };
        self.entries.insert(index, entry);
        Ok(&self.entries[index])
    }

    /// Resolve `url` against the table, scanning from the last entry to the
    /// first. No match is not an error: the result is simply unrouted.
    pub fn resolve(&self, url: &str) -> Result<ResolvedRoute, RouteError> {
        let parsed = parse_url(url)?;
        let origin = parsed.origin();
        let path = parsed.path().to_string();
        let query = parsed.query().unwrap_or_default().to_string();
        // Repeated keys: the last value wins.
        let query_params = parsed.query_pairs().into_owned().collect();

        let mut route = ResolvedRoute {
            url: url.to_string(),
            path,
            query,
            query_params,
            ..Default::default()
        };

        let found = self.entries.iter().enumerate().rev().find_map(|(index, entry)| {
            if entry.required_origin.as_ref().is_some_and(|expected| *expected != origin) {
                return None;
            }
            entry
                .matcher
                .match_path(&route.path)
                .map(|matched| (index, entry, matched.params))
        });

        let Some((index, entry, params)) = found else {
            trace!(url, "no route matched");
            return Ok(route);
        };
        trace!(url, title = %entry.title, index, "route matched");

        route.index = Some(index);
        route.title = Some(entry.title.clone());
        route.name = Some(match &entry.name {
            Some(name) => interpolate(name, &params),
            None => entry.title.clone(),
        });
        route.settings_ref = entry.settings_ref.as_deref().map(|r| interpolate(r, &params));
        route.extender_ref = entry.extender_ref.as_deref().map(|r| interpolate(r, &params));
        route.route_options = entry.route_options.clone();
        route.settings = entry.settings().cloned();
        route.extender = entry.extender().cloned();
        route.params = params;
        Ok(route)
    }

    /// Settings of entry `index`, loading them through `loader` unless the
    /// value cached on the entry was loaded from the same `reference`.
    pub async fn load_settings(
        &mut self,
        index: usize,
        reference: &str,
        loader: &dyn SettingsLoader,
    ) -> Result<Value, RouteError> {
        self.load(index, Lazy::Settings, reference, loader).await
    }

    pub async fn load_extender(
        &mut self,
        index: usize,
        reference: &str,
        loader: &dyn SettingsLoader,
    ) -> Result<Value, RouteError> {
        self.load(index, Lazy::Extender, reference, loader).await
    }

    async fn load(
        &mut self,
        index: usize,
        kind: Lazy,
        reference: &str,
        loader: &dyn SettingsLoader,
    ) -> Result<Value, RouteError> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(RouteError::UnknownEntry(index))?;
        let slot = match kind {
            Lazy::Settings => &mut entry.settings,
            Lazy::Extender => &mut entry.extender,
        };

        if let Some(loaded) = slot.as_ref().filter(|loaded| loaded.reference == reference) {
            trace!(reference, ?kind, "using cached route data");
            return Ok(loaded.value.clone());
        }

        let value = loader
            .load(reference)
            .await
            .map_err(|source| RouteError::Settings {
                reference: reference.to_string(),
                source,
            })?;
        *slot = Some(Loaded {
            reference: reference.to_string(),
            value: value.clone(),
        });
        Ok(value)
    }
}

fn parse_url(url: &str) -> Result<Url, RouteError> {
    let invalid = |source| RouteError::InvalidUrl {
        url: url.to_string(),
        source,
    };
    let base = Url::parse(BASE_URL).map_err(invalid)?;
    Url::options().base_url(Some(&base)).parse(url).map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn resolves_params_and_query() {
        let mut table = RouteTable::default();
        table
            .add_route("User", RouteSpec::new("/users/:id").name("user-${id}"), false)
            .unwrap();

        let route = table.resolve("/users/42?tab=posts&tab=likes&q=a%20b").unwrap();
        assert_eq!(route.index, Some(0));
        assert_eq!(route.name.as_deref(), Some("user-42"));
        assert_eq!(route.params.get_str("id"), Some("42"));
        assert_eq!(route.query, "tab=posts&tab=likes&q=a%20b");
        assert_eq!(route.query_params.get("tab").map(String::as_str), Some("likes"));
        assert_eq!(route.query_params.get("q").map(String::as_str), Some("a b"));
    }

    #[test]
    fn unmatched_url_is_unrouted() {
        let mut table = RouteTable::default();
        table.add_route("User", RouteSpec::new("/users/:id"), false).unwrap();

        let route = table.resolve("/about").unwrap();
        assert!(!route.is_routed());
        assert_eq!(route.name, None);
        assert_eq!(route.path, "/about");
    }

    #[test]
    fn later_entries_win() {
        let mut table = RouteTable::default();
        table.add_route("Any", RouteSpec::new("/:page"), false).unwrap();
        table.add_route("About", RouteSpec::new("/about"), false).unwrap();

        assert_eq!(table.resolve("/about").unwrap().title.as_deref(), Some("About"));
        assert_eq!(table.resolve("/contact").unwrap().title.as_deref(), Some("Any"));
    }

    #[test]
    fn origin_must_match_when_declared() {
        let mut table = RouteTable::default();
        table
            .add_route("Remote", RouteSpec::new("/x").origin("https://example.com"), false)
            .unwrap();

        assert!(table.resolve("https://example.com/x").unwrap().is_routed());
        assert!(!table.resolve("/x").unwrap().is_routed());
    }

    #[test]
    fn origin_compares_normalized() {
        let mut table = RouteTable::default();
        table
            .add_route("Remote", RouteSpec::new("/x").origin("https://Example.com:443/"), false)
            .unwrap();

        assert!(table.resolve("https://example.com/x").unwrap().is_routed());
        assert!(!table.resolve("https://example.com:8443/x").unwrap().is_routed());
    }

    #[test]
    fn unparsable_origin_is_rejected() {
        let mut table = RouteTable::default();
        let err = table
            .add_route("Bad", RouteSpec::new("/x").origin("not a url"), false)
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidUrl { .. }));
    }

    #[test]
    fn name_defaults_to_title() {
        let mut table = RouteTable::default();
        table.add_route("Home", RouteSpec::new("/"), false).unwrap();
        assert_eq!(table.resolve("/").unwrap().name.as_deref(), Some("Home"));
    }

    #[test]
    fn from_json_registers_in_order() {
        let table = RouteTable::from_json(
            r#"{ "routes": [
                { "title": "A", "path": "/a", "options": { "layout": "wide" } },
                { "title": "B", "path": ["/b", "/bee"] }
            ] }"#,
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.entry(1).map(|e| e.path.as_str()), Some("/b|/bee"));
        let route = table.resolve("/a").unwrap();
        assert_eq!(route.route_options, Some(json!({ "layout": "wide" })));
        assert_eq!(table.resolve("/bee").unwrap().title.as_deref(), Some("B"));
    }

    #[test]
    fn bad_pattern_is_reported() {
        let mut table = RouteTable::default();
        let err = table.add_route("Bad", RouteSpec::new("/(a(b))"), false).unwrap_err();
        assert!(matches!(err, RouteError::Pattern(_)));
        assert!(table.is_empty());
    }
}
