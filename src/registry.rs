//! Named collaborator registry.
//!
//! Components register themselves under a name; others look them up or wait
//! for them to appear. Waiting is the only operation in the crate with an
//! intrinsic timeout.

use std::any::Any;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::RegistryError;

/// Default for [`Registry::wait_for`].
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(10_000);

type Collaborator = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Inner {
    entries: DashMap<String, Collaborator>,
    registered: Notify,
}

/// Shared registry. Clones see the same entries.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `name`, replacing any previous entry, and wake
    /// every waiter.
    pub fn register<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.register_shared(name, Arc::new(value));
    }

    pub fn register_shared<T: Any + Send + Sync>(&self, name: impl Into<String>, value: Arc<T>) {
        let name = name.into();
        trace!(name = %name, "collaborator registered");
        self.inner.entries.insert(name, value);
        self.inner.registered.notify_waiters();
    }

    /// The collaborator registered under `name`, if it has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let entry = self.inner.entries.get(name)?;
        Arc::clone(entry.value()).downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.entries.contains_key(name)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.inner.entries.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Wait until a `T` is registered under `name`.
    pub async fn wait_for<T: Any + Send + Sync>(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Arc<T>, RegistryError> {
        let wait = async {
            loop {
                // Enable before checking so a register between the check and
                // the await is not missed.
                let mut notified = pin!(self.inner.registered.notified());
                notified.as_mut().enable();
                if let Some(value) = self.get::<T>(name) {
                    return value;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            warn!(name, ?timeout, "collaborator did not register in time");
            RegistryError::Timeout {
                name: name.to_string(),
                waited: timeout,
            }
        })
    }
}
