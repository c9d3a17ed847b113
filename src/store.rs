//! Key/value stores.
//!
//! [`Store`] is the plain core: a JSON tree addressed by dotted paths
//! (`"a.b.c"`). Behaviour is layered on by composition rather than
//! inheritance:
//!
//! - [`ObservableStore`]: subscriber list, filter, sync/async notification
//! - [`BindableStore`]: per-key element bindings with the anti-echo rule
//! - [`MultiStore`]: read-only first-match-wins overlay
//! - [`ArrayStore`]: indexed list of stores
//!
//! The decorators are generic over any `ReadStore + WriteStore` core.

pub mod array;
pub mod bindable;
pub mod multi;
pub mod observable;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::element::ElementRef;
use crate::StoreError;

pub use array::ArrayStore;
pub use bindable::{BindCallback, BindContext, BindableConfig, BindableStore, BindingMode};
pub use multi::MultiStore;
pub use observable::{
    Dispatch, DispatchState, Filter, Handler, Notification, ObservableConfig, ObservableStore,
    ObserverInfo,
};

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Read access to a store tree.
pub trait ReadStore: Send + Sync {
    /// Value at `path`, `None` if any segment is missing or not a container.
    fn get(&self, path: &str) -> Option<Value>;

    fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Copy of the whole tree.
    fn snapshot(&self) -> Value;
}

/// Write access to a store tree. Every write reports the leaves it changed.
pub trait WriteStore {
    fn set(&mut self, path: &str, value: Value, options: &SetOptions) -> Result<Changes, StoreError>;

    fn remove(&mut self, path: &str) -> Result<Changes, StoreError>;

    /// Deep-merge another tree into this one.
    fn merge(&mut self, other: Value) -> Result<Changes, StoreError>;

    fn clear(&mut self) -> Result<Changes, StoreError>;

    /// Replace the whole tree.
    fn replace(&mut self, value: Value) -> Result<Changes, StoreError>;
}

// ---------------------------------------------------------------------------
// SetOptions
// ---------------------------------------------------------------------------

/// Options for a single `set`.
#[derive(Clone)]
pub struct SetOptions {
    /// Merge into the existing value instead of overwriting it.
    pub merge: bool,
    /// Notify observers / bound elements (default: true).
    pub notify_on_change: bool,
    /// Element that originated the change; it is never written back to.
    pub source: Option<ElementRef>,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            merge: false,
            notify_on_change: true,
            source: None,
        }
    }
}

impl fmt::Debug for SetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetOptions")
            .field("merge", &self.merge)
            .field("notify_on_change", &self.notify_on_change)
            .field("source", &self.source.is_some())
            .finish()
    }
}

impl SetOptions {
    pub fn merging() -> Self {
        Self {
            merge: true,
            ..Default::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            notify_on_change: false,
            ..Default::default()
        }
    }

    pub fn from_element(source: ElementRef) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Changes
// ---------------------------------------------------------------------------

/// The changed-set carried by one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Changes {
    /// Everything may have changed (`clear`).
    All,
    /// Dotted leaf key → new value. Removed leaves map to `null`.
    Keys(BTreeMap<String, Value>),
}

impl Default for Changes {
    fn default() -> Self {
        Changes::Keys(BTreeMap::new())
    }
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        match self {
            Changes::All => false,
            Changes::Keys(keys) => keys.is_empty(),
        }
    }

    /// Whether a change affects `key`: the key itself, a descendant, or an
    /// ancestor changed.
    pub fn touches(&self, key: &str) -> bool {
        match self {
            Changes::All => true,
            Changes::Keys(keys) => keys.keys().any(|changed| paths_overlap(changed, key)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Changes::All => None,
            Changes::Keys(keys) => keys.get(key),
        }
    }

    /// `"*"` for [`Changes::All`], an object of changed keys otherwise.
    pub fn to_value(&self) -> Value {
        match self {
            Changes::All => Value::String("*".into()),
            Changes::Keys(keys) => Value::Object(
                keys.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ),
        }
    }
}

fn paths_overlap(a: &str, b: &str) -> bool {
    let nested = |long: &str, short: &str| {
        long.strip_prefix(short)
            .is_some_and(|rest| rest.starts_with('.'))
    };
    a == b || nested(a, b) || nested(b, a)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Plain key/value tree with dotted-path access.
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    root: Value,
    read_only: bool,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
            read_only: false,
        }
    }

    /// Build a store from a tree. Non-object values are wrapped as `{"value": v}`.
    pub fn from_value(value: Value) -> Self {
        let root = match value {
            Value::Object(_) => value,
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                Value::Object(map)
            }
        };
        Self {
            root,
            read_only: false,
        }
    }

    /// A store that rejects every write.
    pub fn read_only(value: Value) -> Self {
        Self::from_value(value).freeze()
    }

    pub fn freeze(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Borrow the value at `path`.
    pub fn value(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, path)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Deep-merge with a custom policy. The policy receives the current tree
    /// and the incoming one.
    pub fn merge_with<F>(&mut self, other: Value, merge: F) -> Result<Changes, StoreError>
    where
        F: FnOnce(&mut Value, Value),
    {
        self.ensure_writable("merge")?;
        let before = self.root.clone();
        merge(&mut self.root, other);
        if !self.root.is_object() {
            self.root = before;
            return Err(StoreError::Assertion(
                "merge must leave an object at the root".into(),
            ));
        }
        Ok(diff_trees(&before, &self.root))
    }

    fn ensure_writable(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::UnsupportedOperation {
                operation,
                store: "read-only store",
            });
        }
        Ok(())
    }
}

impl ReadStore for Store {
    fn get(&self, path: &str) -> Option<Value> {
        self.value(path).cloned()
    }

    fn has(&self, path: &str) -> bool {
        self.value(path).is_some()
    }

    fn snapshot(&self) -> Value {
        self.root.clone()
    }
}

impl WriteStore for Store {
    fn set(&mut self, path: &str, value: Value, options: &SetOptions) -> Result<Changes, StoreError> {
        self.ensure_writable("set")?;
        let parts = split_path(path);
        if parts.is_empty() && !value.is_object() {
            return Err(StoreError::Assertion(
                "only an object can be set at the root".into(),
            ));
        }

        let old = lookup(&self.root, path);
        let new = match (options.merge, old) {
            (true, Some(old)) => {
                let mut merged = old.clone();
                deep_merge(&mut merged, value);
                merged
            }
            _ => value,
        };

        let mut changed = BTreeMap::new();
        diff(path, old, &new, &mut changed);
        if changed.is_empty() {
            return Ok(Changes::default());
        }

        *slot_mut(&mut self.root, &parts)? = new;
        Ok(Changes::Keys(changed))
    }

    fn remove(&mut self, path: &str) -> Result<Changes, StoreError> {
        self.ensure_writable("remove")?;
        let mut parts = split_path(path);
        let Some(leaf) = parts.pop() else {
            return Ok(Changes::default());
        };

        let parent = match lookup_parts_mut(&mut self.root, &parts) {
            Some(parent) => parent,
            None => return Ok(Changes::default()),
        };
        let removed = match parent {
            Value::Object(map) => map.remove(leaf),
            Value::Array(items) => match leaf.parse::<usize>() {
                Ok(index) if index < items.len() => Some(items.remove(index)),
                _ => None,
            },
            _ => None,
        };

        let mut changed = BTreeMap::new();
        if let Some(old) = removed {
            removed_leaves(path, &old, &mut changed);
        }
        Ok(Changes::Keys(changed))
    }

    fn merge(&mut self, other: Value) -> Result<Changes, StoreError> {
        if !other.is_object() {
            return Err(StoreError::Assertion("can only merge an object tree".into()));
        }
        self.merge_with(other, deep_merge)
    }

    fn clear(&mut self) -> Result<Changes, StoreError> {
        self.ensure_writable("clear")?;
        self.root = Value::Object(Map::new());
        Ok(Changes::All)
    }

    fn replace(&mut self, value: Value) -> Result<Changes, StoreError> {
        self.ensure_writable("replace")?;
        let Value::Object(map) = value else {
            return Err(StoreError::Assertion("replacement must be an object".into()));
        };
        let changed = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.root = Value::Object(map);
        Ok(Changes::Keys(changed))
    }
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|part| !part.is_empty()).collect()
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn step<'a>(value: &'a Value, part: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(part),
        Value::Array(items) => items.get(part.parse::<usize>().ok()?),
        _ => None,
    }
}

pub(crate) fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    split_path(path)
        .into_iter()
        .try_fold(root, |current, part| step(current, part))
}

fn lookup_parts_mut<'a>(root: &'a mut Value, parts: &[&str]) -> Option<&'a mut Value> {
    let mut current = root;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get_mut(*part)?,
            Value::Array(items) => items.get_mut(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Slot at `parts`, creating intermediate objects. Existing arrays are
/// descended into by index and padded with `null` up to it; a non-index
/// segment on an array is rejected. Scalars in the way are replaced.
fn slot_mut<'a>(root: &'a mut Value, parts: &[&str]) -> Result<&'a mut Value, StoreError> {
    let mut current = root;
    for part in parts {
        current = match current {
            Value::Array(items) => {
                let index = part.parse::<usize>().map_err(|_| {
                    StoreError::Assertion(format!("array segment `{part}` is not an index"))
                })?;
                if index >= items.len() {
                    items.resize(index + 1, Value::Null);
                }
                &mut items[index]
            }
            slot => object_mut(slot)
                .entry(part.to_string())
                .or_insert(Value::Null),
        };
    }
    Ok(current)
}

fn object_mut(slot: &mut Value) -> &mut Map<String, Value> {
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just replaced by an object"),
    }
}

/// Default merge policy: objects merge recursively, arrays concatenate,
/// everything else is overwritten.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => target.extend(source),
        (slot, source) => *slot = source,
    }
}

/// Changed leaves between two whole trees.
pub(crate) fn diff_trees(before: &Value, after: &Value) -> Changes {
    let mut changed = BTreeMap::new();
    diff("", Some(before), after, &mut changed);
    Changes::Keys(changed)
}

fn diff(path: &str, old: Option<&Value>, new: &Value, out: &mut BTreeMap<String, Value>) {
    match (old, new) {
        (Some(old), new) if old == new => {}
        (Some(Value::Object(old)), Value::Object(new)) => {
            for (key, value) in new {
                diff(&join_path(path, key), old.get(key), value, out);
            }
            for (key, value) in old.iter().filter(|(key, _)| !new.contains_key(*key)) {
                removed_leaves(&join_path(path, key), value, out);
            }
        }
        (_, Value::Object(new)) if !new.is_empty() => {
            for (key, value) in new {
                diff(&join_path(path, key), None, value, out);
            }
        }
        _ => {
            out.insert(path.to_string(), new.clone());
        }
    }
}

fn removed_leaves(path: &str, old: &Value, out: &mut BTreeMap<String, Value>) {
    match old {
        Value::Object(map) if !map.is_empty() => {
            for (key, value) in map {
                removed_leaves(&join_path(path, key), value, out);
            }
        }
        _ => {
            out.insert(path.to_string(), Value::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn keys(changes: &Changes) -> Vec<String> {
        match changes {
            Changes::All => vec!["*".into()],
            Changes::Keys(keys) => keys.keys().cloned().collect(),
        }
    }

    #[test]
    fn set_then_get() {
        let mut store = Store::new();
        store.set("a.b", json!(1), &SetOptions::default()).unwrap();
        assert_eq!(store.get("a.b"), Some(json!(1)));
        assert_eq!(store.get("a"), Some(json!({ "b": 1 })));
    }

    #[test]
    fn remove_then_default() {
        let mut store = Store::new();
        store.set("a.b", json!(1), &SetOptions::default()).unwrap();
        store.remove("a.b").unwrap();
        assert_eq!(store.get_or("a.b", json!("dflt")), json!("dflt"));
        assert!(!store.has("a.b"));
        assert!(store.has("a"));
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut store = Store::new();
        let changes = store.remove("x.y.z").unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn get_through_scalar_returns_none() {
        let store = Store::from_value(json!({ "a": 5 }));
        assert_eq!(store.get("a.b"), None);
        assert_eq!(store.get_or("a.b", json!(0)), json!(0));
    }

    #[test]
    fn array_index_segments() {
        let store = Store::from_value(json!({ "list": [{ "id": 1 }, { "id": 2 }] }));
        assert_eq!(store.get("list.1.id"), Some(json!(2)));
        assert_eq!(store.get("list.5.id"), None);
    }

    #[test]
    fn set_past_the_end_pads_the_array() {
        let mut store = Store::from_value(json!({ "list": [1, 2] }));
        let changes = store.set("list.4", json!(9), &SetOptions::default()).unwrap();

        assert_eq!(changes.get("list.4"), Some(&json!(9)));
        assert_eq!(store.get("list"), Some(json!([1, 2, null, null, 9])));
        assert_eq!(store.get("list.0"), Some(json!(1)));
    }

    #[test]
    fn non_index_segment_on_array_is_rejected() {
        let mut store = Store::from_value(json!({ "list": [1, 2] }));
        let err = store.set("list.name", json!("x"), &SetOptions::default()).unwrap_err();

        assert!(matches!(err, StoreError::Assertion(_)));
        assert_eq!(store.get("list"), Some(json!([1, 2])));
    }

    #[test]
    fn set_reports_only_changed_leaves() {
        let mut store = Store::from_value(json!({ "a": { "b": 1, "c": 2 } }));
        let changes = store
            .set("a", json!({ "b": 1, "c": 3 }), &SetOptions::default())
            .unwrap();
        assert_eq!(keys(&changes), vec!["a.c"]);
        assert_eq!(changes.get("a.c"), Some(&json!(3)));
    }

    #[test]
    fn identical_value_produces_no_change() {
        let mut store = Store::from_value(json!({ "k": "v" }));
        let changes = store.set("k", json!("v"), &SetOptions::default()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn overwrite_reports_removed_leaves() {
        let mut store = Store::from_value(json!({ "a": { "b": 1, "c": 2 } }));
        let changes = store.set("a", json!({ "b": 1 }), &SetOptions::default()).unwrap();
        assert_eq!(changes.get("a.c"), Some(&Value::Null));
    }

    #[test]
    fn set_with_merge() {
        let mut store = Store::from_value(json!({ "a": { "b": 1, "tags": ["x"] } }));
        store
            .set("a", json!({ "c": 2, "tags": ["y"] }), &SetOptions::merging())
            .unwrap();
        assert_eq!(store.get("a"), Some(json!({ "b": 1, "c": 2, "tags": ["x", "y"] })));
    }

    #[test]
    fn merge_concatenates_arrays_and_overwrites_scalars() {
        let mut store = Store::from_value(json!({ "list": [1], "n": 1, "o": { "x": 1 } }));
        store
            .merge(json!({ "list": [2, 3], "n": 2, "o": { "y": 2 } }))
            .unwrap();
        assert_eq!(
            store.snapshot(),
            json!({ "list": [1, 2, 3], "n": 2, "o": { "x": 1, "y": 2 } })
        );
    }

    #[test]
    fn merge_with_custom_policy() {
        let mut store = Store::from_value(json!({ "n": 1 }));
        store
            .merge_with(json!({ "n": 5 }), |target, _| {
                target["n"] = json!(42);
            })
            .unwrap();
        assert_eq!(store.get("n"), Some(json!(42)));
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let mut store = Store::read_only(json!({ "a": 1 }));
        let err = store.set("a", json!(2), &SetOptions::default()).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedOperation { operation: "set", .. }));
        assert!(matches!(
            store.merge(json!({})).unwrap_err(),
            StoreError::UnsupportedOperation { operation: "merge", .. }
        ));
        assert_eq!(store.get("a"), Some(json!(1)));
    }

    #[test]
    fn set_replaces_scalar_intermediate() {
        let mut store = Store::from_value(json!({ "a": 1 }));
        store.set("a.b", json!(2), &SetOptions::default()).unwrap();
        assert_eq!(store.get("a"), Some(json!({ "b": 2 })));
    }

    #[test]
    fn clear_and_replace() {
        let mut store = Store::from_value(json!({ "a": 1 }));
        assert_eq!(store.clear().unwrap(), Changes::All);
        assert!(!store.has("a"));

        let changes = store.replace(json!({ "b": { "c": 1 } })).unwrap();
        assert_eq!(keys(&changes), vec!["b"]);
        assert_eq!(store.get("b.c"), Some(json!(1)));
    }

    #[test]
    fn changes_touch_related_paths() {
        let mut map = BTreeMap::new();
        map.insert("user.name".to_string(), json!("ada"));
        let changes = Changes::Keys(map);
        assert!(changes.touches("user"));
        assert!(changes.touches("user.name"));
        assert!(changes.touches("user.name.first"));
        assert!(!changes.touches("username"));
        assert!(Changes::All.touches("anything"));
    }
}
