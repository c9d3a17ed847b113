//! Bindable store.
//!
//! Keeps store keys in sync with UI elements. Each key owns an ordered list
//! of weakly-held elements and an optional transform applied to incoming
//! values.
//!
//! **Anti-echo rule:** when an element pushes a value into the store, every
//! other element bound to an affected key is updated, but the originating
//! element is never written back to. Outgoing writes are tagged
//! `from_store`, and the listeners installed here ignore such events.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{trace, warn};

use crate::element::{same_element, ChangeEvent, Element, ElementRef, ListenerId, WriteOptions};
use crate::store::{Changes, ReadStore, SetOptions, Store, WriteStore};
use crate::StoreError;

/// Transform applied to a value before it is stored under a bound key.
pub type BindCallback = Arc<dyn Fn(Value, &BindContext) -> Value + Send + Sync>;

/// Passed to a [`BindCallback`].
pub struct BindContext {
    pub key: String,
    pub source: Option<ElementRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingMode {
    /// Store → elements only. No listener is installed on elements.
    OneWay,
    /// Elements → store only. Stores never write to elements.
    OneWayReverse,
    #[default]
    TwoWay,
}

impl BindingMode {
    fn writes_elements(self) -> bool {
        self != BindingMode::OneWayReverse
    }

    fn listens_to_elements(self) -> bool {
        self != BindingMode::OneWay
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindableConfig {
    pub mode: BindingMode,
}

struct BoundElement {
    element: Weak<dyn Element>,
    listener: Option<ListenerId>,
}

#[derive(Default)]
struct Binding {
    elements: Vec<BoundElement>,
    callback: Option<BindCallback>,
}

struct Shared<S> {
    store: RwLock<S>,
    bindings: RwLock<BTreeMap<String, Binding>>,
    mode: BindingMode,
}

/// A store whose keys can be bound to elements. Cloning shares the store.
pub struct BindableStore<S = Store> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for BindableStore<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for BindableStore<Store> {
    fn default() -> Self {
        Self::new(Store::new(), BindableConfig::default())
    }
}

impl<S> BindableStore<S>
where
    S: ReadStore + WriteStore + 'static,
{
    pub fn new(store: S, config: BindableConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store: RwLock::new(store),
                bindings: RwLock::new(BTreeMap::new()),
                mode: config.mode,
            }),
        }
    }

    pub fn mode(&self) -> BindingMode {
        self.shared.mode
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    /// Bind `element` to `key`.
    ///
    /// Returns `Ok(false)` when the element already carries the bound marker;
    /// nothing is registered twice. Unless the mode is one-way, a change
    /// listener is installed that writes the element's value into the store
    /// with the element as the change source.
    pub fn bind_to(
        &self,
        key: &str,
        element: &ElementRef,
        callback: Option<BindCallback>,
    ) -> Result<bool, StoreError> {
        if key.trim().is_empty() {
            return Err(StoreError::Assertion("binding key must not be empty".into()));
        }
        if element.is_bound() {
            trace!(key, "element already bound");
            return Ok(false);
        }
        element.set_bound(true);

        let listener = self
            .shared
            .mode
            .listens_to_elements()
            .then(|| element.add_change_listener(self.element_listener(key, element)));

        {
            let mut bindings = self.shared.bindings.write();
            let binding = bindings.entry(key.to_string()).or_default();
            binding.elements.push(BoundElement {
                element: Arc::downgrade(element),
                listener,
            });
            if callback.is_some() {
                binding.callback = callback;
            }
        }

        if self.shared.mode.writes_elements() {
            if let Some(value) = self.get(key) {
                element.set_value(
                    &value,
                    WriteOptions {
                        trigger_change: false,
                        from_store: true,
                    },
                );
            }
        }

        trace!(key, mode = ?self.shared.mode, "element bound");
        Ok(true)
    }

    /// Detach `element` from `key`, removing its listener and bound marker.
    pub fn unbind(&self, key: &str, element: &ElementRef) -> bool {
        let target = Arc::downgrade(element);
        let removed = {
            let mut bindings = self.shared.bindings.write();
            let Some(binding) = bindings.get_mut(key) else {
                return false;
            };
            let position = binding
                .elements
                .iter()
                .position(|bound| Weak::ptr_eq(&bound.element, &target));
            position.map(|index| binding.elements.remove(index))
        };

        match removed {
            Some(bound) => {
                if let Some(listener) = bound.listener {
                    element.remove_change_listener(listener);
                }
                element.set_bound(false);
                true
            }
            None => false,
        }
    }

    /// Live elements bound to `key`, in binding order.
    pub fn bound_elements(&self, key: &str) -> Vec<ElementRef> {
        self.shared
            .bindings
            .read()
            .get(key)
            .map(|binding| {
                binding
                    .elements
                    .iter()
                    .filter_map(|bound| bound.element.upgrade())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn element_listener(&self, key: &str, element: &ElementRef) -> Arc<dyn Fn(&ChangeEvent) + Send + Sync> {
        let shared = Arc::downgrade(&self.shared);
        let source = Arc::downgrade(element);
        let key = key.to_string();

        Arc::new(move |event: &ChangeEvent| {
            if event.from_store {
                return;
            }
            let (Some(shared), Some(source)) = (shared.upgrade(), source.upgrade()) else {
                return;
            };
            let store = BindableStore { shared };
            let value = source.value();
            if let Err(err) = store.set(&key, value, SetOptions::from_element(source)) {
                warn!(key = %key, error = %err, "element update rejected by store");
            }
        })
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Store `value` under `key` (after the key's transform, if any) and push
    /// the result to every affected element except `options.source`.
    pub fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<Changes, StoreError> {
        let callback = self
            .shared
            .bindings
            .read()
            .get(key)
            .and_then(|binding| binding.callback.clone());
        let value = match callback {
            Some(callback) => callback(
                value,
                &BindContext {
                    key: key.to_string(),
                    source: options.source.clone(),
                },
            ),
            None => value,
        };

        let changes = self.shared.store.write().set(key, value, &options)?;
        if options.notify_on_change {
            self.push_to_elements(&changes, options.source.as_ref());
        }
        Ok(changes)
    }

    /// Replace the whole tree and refresh every element except `source`.
    pub fn replace(&self, value: Value, source: Option<&ElementRef>) -> Result<Changes, StoreError> {
        let changes = self.shared.store.write().replace(value)?;
        self.push_to_elements(&Changes::All, source);
        Ok(changes)
    }

    pub fn remove(&self, key: &str) -> Result<Changes, StoreError> {
        let changes = self.shared.store.write().remove(key)?;
        self.push_to_elements(&changes, None);
        Ok(changes)
    }

    pub fn merge(&self, other: Value) -> Result<Changes, StoreError> {
        let changes = self.shared.store.write().merge(other)?;
        self.push_to_elements(&changes, None);
        Ok(changes)
    }

    pub fn clear(&self) -> Result<Changes, StoreError> {
        let changes = self.shared.store.write().clear()?;
        self.push_to_elements(&changes, None);
        Ok(changes)
    }

    fn push_to_elements(&self, changes: &Changes, source: Option<&ElementRef>) {
        if changes.is_empty() || !self.shared.mode.writes_elements() {
            return;
        }

        // Collect under the locks, write after releasing them: element
        // writes may fire listeners that re-enter the store.
        let targets: Vec<(ElementRef, Value)> = {
            let store = self.shared.store.read();
            let bindings = self.shared.bindings.read();
            let mut targets = Vec::new();
            for (key, binding) in bindings.iter().filter(|(key, _)| changes.touches(key)) {
                let value = store.get(key).unwrap_or(Value::Null);
                for element in binding.elements.iter().filter_map(|b| b.element.upgrade()) {
                    if source.is_some_and(|source| same_element(source, &element)) {
                        trace!(key = %key, "skipping change source");
                        continue;
                    }
                    targets.push((element, value.clone()));
                }
            }
            targets
        };

        for (element, value) in targets {
            element.set_value(&value, WriteOptions::from_store());
        }
    }
}

impl<S> ReadStore for BindableStore<S>
where
    S: ReadStore + WriteStore + 'static,
{
    fn get(&self, path: &str) -> Option<Value> {
        self.shared.store.read().get(path)
    }

    fn has(&self, path: &str) -> bool {
        self.shared.store.read().has(path)
    }

    fn snapshot(&self) -> Value {
        self.shared.store.read().snapshot()
    }
}
