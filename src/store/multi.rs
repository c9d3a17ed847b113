//! Read-only overlay of several stores.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::store::{deep_merge, Changes, ReadStore, SetOptions, Store, WriteStore};
use crate::StoreError;

/// Answers lookups from the first overlaid store that has the path.
/// Every write fails with [`StoreError::UnsupportedOperation`].
#[derive(Clone, Default)]
pub struct MultiStore {
    stores: Vec<Arc<dyn ReadStore>>,
}

impl MultiStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: ReadStore + 'static>(&mut self, store: S) -> &mut Self {
        self.stores.push(Arc::new(store));
        self
    }

    /// Overlay a store that is also used elsewhere.
    pub fn push_shared(&mut self, store: Arc<dyn ReadStore>) -> &mut Self {
        self.stores.push(store);
        self
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Deep-merge every overlaid tree, in addition order, into a plain store.
    pub fn clone_tree(&self) -> Store {
        Store::from_value(self.snapshot())
    }

    fn unsupported(operation: &'static str) -> StoreError {
        StoreError::UnsupportedOperation {
            operation,
            store: "multi store",
        }
    }
}

impl ReadStore for MultiStore {
    fn get(&self, path: &str) -> Option<Value> {
        self.stores.iter().find_map(|store| store.get(path))
    }

    fn has(&self, path: &str) -> bool {
        self.stores.iter().any(|store| store.has(path))
    }

    fn snapshot(&self) -> Value {
        let mut tree = Value::Object(Map::new());
        for store in &self.stores {
            deep_merge(&mut tree, store.snapshot());
        }
        tree
    }
}

impl WriteStore for MultiStore {
    fn set(&mut self, _path: &str, _value: Value, _options: &SetOptions) -> Result<Changes, StoreError> {
        Err(Self::unsupported("set"))
    }

    fn remove(&mut self, _path: &str) -> Result<Changes, StoreError> {
        Err(Self::unsupported("remove"))
    }

    fn merge(&mut self, _other: Value) -> Result<Changes, StoreError> {
        Err(Self::unsupported("merge"))
    }

    fn clear(&mut self) -> Result<Changes, StoreError> {
        Err(Self::unsupported("clear"))
    }

    fn replace(&mut self, _value: Value) -> Result<Changes, StoreError> {
        Err(Self::unsupported("replace"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn overlay() -> MultiStore {
        let mut multi = MultiStore::new();
        multi
            .push(Store::from_value(json!({ "x": 1, "list": [1] })))
            .push(Store::from_value(json!({ "x": 2, "y": 3, "list": [2] })));
        multi
    }

    #[test]
    fn first_match_wins() {
        let multi = overlay();
        assert_eq!(multi.get("x"), Some(json!(1)));
        assert_eq!(multi.get("y"), Some(json!(3)));
        assert!(multi.has("y"));
        assert!(!multi.has("z"));
    }

    #[test]
    fn clone_merges_in_addition_order() {
        let tree = overlay().clone_tree();
        assert_eq!(tree.snapshot(), json!({ "x": 2, "y": 3, "list": [1, 2] }));
    }

    #[test]
    fn writes_are_unsupported() {
        let mut multi = overlay();
        let err = multi.set("x", json!(9), &SetOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnsupportedOperation { operation: "set", store: "multi store" }
        ));
        assert!(multi.merge(json!({})).is_err());
        assert!(multi.remove("x").is_err());
        assert_eq!(multi.get("x"), Some(json!(1)));
    }
}
