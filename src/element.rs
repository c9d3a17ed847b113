//! Element handle contract.
//!
//! The stores never create or render UI elements. They only need this narrow
//! capability: read and write a value, listen for changes, and carry a
//! "bound" marker so a second bind of the same element is a no-op.

use std::sync::Arc;

use serde_json::Value;

/// Shared handle to a bound element.
pub type ElementRef = Arc<dyn Element>;

/// Listener attached to an element's change event.
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Identifies an attached listener so it can be detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A change-style event fired by an element.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub value: Value,
    /// Set when the change was caused by a store pushing a value into the
    /// element. Listeners must not feed such events back into the store.
    pub from_store: bool,
}

/// How a value is written into an element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Fire a change event after writing.
    pub trigger_change: bool,
    /// Tag the write (and any event it fires) as store-originated.
    pub from_store: bool,
}

impl WriteOptions {
    /// Options used by stores when pushing values to bound elements.
    pub fn from_store() -> Self {
        Self {
            trigger_change: true,
            from_store: true,
        }
    }
}

pub trait Element: Send + Sync {
    /// Current value of the element.
    fn value(&self) -> Value;

    fn set_value(&self, value: &Value, options: WriteOptions);

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId;

    fn remove_change_listener(&self, id: ListenerId);

    fn is_bound(&self) -> bool;

    fn set_bound(&self, bound: bool);
}

/// Identity comparison of two element handles.
pub fn same_element(a: &ElementRef, b: &ElementRef) -> bool {
    Arc::ptr_eq(a, b)
}
