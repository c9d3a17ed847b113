//! Indexed list of stores.
//!
//! Every operation addresses an item by position, then a dotted key inside
//! that item. Out-of-range indices read as missing and write as errors.

use serde_json::Value;

use crate::store::{Changes, ReadStore, SetOptions, Store, WriteStore};
use crate::StoreError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayStore {
    items: Vec<Store>,
}

impl ArrayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON array; each element becomes one item store.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            items: values.into_iter().map(Store::from_value).collect(),
        }
    }

    /// Append an item and return its index.
    pub fn push(&mut self, item: Value) -> usize {
        self.items.push(Store::from_value(item));
        self.items.len() - 1
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, index: usize) -> Option<&Store> {
        self.items.get(index)
    }

    pub fn get(&self, index: usize, key: &str) -> Option<Value> {
        self.items.get(index)?.get(key)
    }

    pub fn has(&self, index: usize, key: &str) -> bool {
        self.items.get(index).is_some_and(|item| item.has(key))
    }

    pub fn set(&mut self, index: usize, key: &str, value: Value) -> Result<Changes, StoreError> {
        self.item_mut(index)?
            .set(key, value, &SetOptions::default())
    }

    /// Delete `key` from the item at `index`.
    pub fn remove(&mut self, index: usize, key: &str) -> Result<Changes, StoreError> {
        self.item_mut(index)?.remove(key)
    }

    /// The items as one JSON array.
    pub fn to_value(&self) -> Value {
        Value::Array(self.items.iter().map(|item| item.snapshot()).collect())
    }

    fn item_mut(&mut self, index: usize) -> Result<&mut Store, StoreError> {
        let len = self.items.len();
        self.items.get_mut(index).ok_or_else(|| {
            StoreError::Assertion(format!("index {index} out of range for {len} items"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn indexed_access() {
        let mut rows = ArrayStore::new();
        rows.push(json!({ "name": "ada" }));
        let second = rows.push(json!({ "name": "grace", "tags": { "lang": "cobol" } }));

        assert_eq!(second, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.get(1, "tags.lang"), Some(json!("cobol")));
        assert_eq!(rows.get(5, "name"), None);
        assert!(rows.has(0, "name"));
        assert!(!rows.has(0, "tags"));
    }

    #[test]
    fn set_and_remove_target_one_item() {
        let mut rows = ArrayStore::from_values(vec![json!({ "a": 1 }), json!({ "a": 2 })]);
        rows.set(0, "b", json!(true)).unwrap();

        let changes = rows.remove(1, "a").unwrap();
        assert_eq!(changes.get("a"), Some(&Value::Null));
        assert_eq!(rows.to_value(), json!([{ "a": 1, "b": true }, {}]));
    }

    #[test]
    fn out_of_range_write_fails() {
        let mut rows = ArrayStore::new();
        assert!(matches!(
            rows.set(0, "a", json!(1)).unwrap_err(),
            StoreError::Assertion(_)
        ));
        assert!(rows.remove(3, "a").is_err());
    }
}
