//! Observable store.
//!
//! Wraps a store core with a subscriber list and a filter predicate. Every
//! effective write triggers one notification cycle carrying the changed-set.
//!
//! Dispatch modes:
//! - [`Dispatch::Sync`]: accepted observers run strictly in subscription
//!   order, each awaited before the next starts. A failing handler stops the
//!   cycle and the error reaches the caller.
//! - [`Dispatch::Async`]: accepted observers are spawned on the current
//!   tokio runtime and the cycle returns once all of them are started.
//!   Handler failures are logged and never reach the caller.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::store::{Changes, ReadStore, SetOptions, Store, WriteStore};
use crate::StoreError;

/// Future returned by an observer handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Observer handler.
pub type Handler = Arc<dyn Fn(Notification) -> HandlerFuture + Send + Sync>;

/// Store-level filter, consulted once per observer per notification.
pub type Filter = Arc<dyn Fn(&Changes, &ObserverInfo, &[Value]) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    #[default]
    Sync,
    Async,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservableConfig {
    pub dispatch: Dispatch,
    /// Start muted: writes apply but notify nobody.
    pub muted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Notifying,
}

/// Registration details handed to the filter and the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverInfo {
    pub id: String,
    pub options: Value,
}

/// What an observer receives.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub changes: Changes,
    pub observer: ObserverInfo,
    pub args: Vec<Value>,
}

struct Observer {
    info: ObserverInfo,
    handler: Handler,
}

struct Shared<S> {
    store: RwLock<S>,
    observers: RwLock<Vec<Observer>>,
    filter: RwLock<Option<Filter>>,
    muted: AtomicBool,
    in_flight: AtomicUsize,
    dispatch: Dispatch,
}

/// Marks a notification cycle as in flight for its lifetime.
struct CycleGuard<'a>(&'a AtomicUsize);

impl<'a> CycleGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A store that notifies subscribers on change. Cloning shares the store.
pub struct ObservableStore<S = Store> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for ObservableStore<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for ObservableStore<Store> {
    fn default() -> Self {
        Self::new(Store::new(), ObservableConfig::default())
    }
}

impl<S> ObservableStore<S>
where
    S: ReadStore + WriteStore + 'static,
{
    pub fn new(store: S, config: ObservableConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store: RwLock::new(store),
                observers: RwLock::new(Vec::new()),
                filter: RwLock::new(None),
                muted: AtomicBool::new(config.muted),
                in_flight: AtomicUsize::new(0),
                dispatch: config.dispatch,
            }),
        }
    }

    pub fn dispatch(&self) -> Dispatch {
        self.shared.dispatch
    }

    pub fn state(&self) -> DispatchState {
        if self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            DispatchState::Notifying
        } else {
            DispatchState::Idle
        }
    }

    // -----------------------------------------------------------------------
    // Subscribers
    // -----------------------------------------------------------------------

    /// Register an observer. Registering the same id twice creates two
    /// registrations.
    pub fn subscribe<F, Fut>(&self, id: impl Into<String>, handler: F, options: Value)
    where
        F: Fn(Notification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: Handler = Arc::new(move |notification| handler(notification).boxed());
        self.subscribe_handler(id, boxed, options);
    }

    pub fn subscribe_handler(&self, id: impl Into<String>, handler: Handler, options: Value) {
        let info = ObserverInfo {
            id: id.into(),
            options,
        };
        trace!(observer = %info.id, "subscribed");
        self.shared.observers.write().push(Observer { info, handler });
    }

    /// Remove every registration with `id`. Returns whether any existed.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut observers = self.shared.observers.write();
        let before = observers.len();
        observers.retain(|observer| observer.info.id != id);
        before != observers.len()
    }

    /// Ids of registered observers, in subscription order.
    pub fn observers(&self) -> Vec<String> {
        self.shared
            .observers
            .read()
            .iter()
            .map(|observer| observer.info.id.clone())
            .collect()
    }

    pub fn set_filter<F>(&self, filter: F)
    where
        F: Fn(&Changes, &ObserverInfo, &[Value]) -> bool + Send + Sync + 'static,
    {
        *self.shared.filter.write() = Some(Arc::new(filter));
    }

    pub fn clear_filter(&self) {
        *self.shared.filter.write() = None;
    }

    pub fn mute(&self) {
        self.shared.muted.store(true, Ordering::SeqCst);
    }

    pub fn unmute(&self) {
        self.shared.muted.store(false, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub async fn set(
        &self,
        path: &str,
        value: Value,
        options: SetOptions,
    ) -> Result<Changes, StoreError> {
        let changes = self.shared.store.write().set(path, value, &options)?;
        if options.notify_on_change && !changes.is_empty() {
            self.notify(changes.clone(), Vec::new()).await?;
        }
        Ok(changes)
    }

    pub async fn remove(&self, path: &str) -> Result<Changes, StoreError> {
        let changes = self.shared.store.write().remove(path)?;
        if !changes.is_empty() {
            self.notify(changes.clone(), Vec::new()).await?;
        }
        Ok(changes)
    }

    pub async fn merge(&self, other: Value) -> Result<Changes, StoreError> {
        let changes = self.shared.store.write().merge(other)?;
        if !changes.is_empty() {
            self.notify(changes.clone(), Vec::new()).await?;
        }
        Ok(changes)
    }

    /// Empty the store and notify with [`Changes::All`].
    pub async fn clear(&self) -> Result<(), StoreError> {
        let changes = self.shared.store.write().clear()?;
        self.notify(changes, Vec::new()).await
    }

    /// Replace the whole tree and notify with its top-level entries.
    pub async fn replace(&self, value: Value) -> Result<(), StoreError> {
        let changes = self.shared.store.write().replace(value)?;
        self.notify(changes, Vec::new()).await
    }

    // -----------------------------------------------------------------------
    // Notification
    // -----------------------------------------------------------------------

    /// Run one notification cycle.
    pub async fn notify(&self, changes: Changes, args: Vec<Value>) -> Result<(), StoreError> {
        if self.is_muted() {
            trace!("store muted, notification dropped");
            return Ok(());
        }

        // Snapshot so handlers may (un)subscribe without deadlocking.
        let targets: Vec<(ObserverInfo, Handler)> = self
            .shared
            .observers
            .read()
            .iter()
            .map(|observer| (observer.info.clone(), Arc::clone(&observer.handler)))
            .collect();
        let filter = self.shared.filter.read().clone();

        let _cycle = CycleGuard::enter(&self.shared.in_flight);
        debug!(
            observers = targets.len(),
            dispatch = ?self.shared.dispatch,
            "notifying observers"
        );

        let accepted = targets.into_iter().filter(|(info, _)| {
            let accepted = filter
                .as_ref()
                .map_or(true, |filter| filter(&changes, info, &args));
            if !accepted {
                trace!(observer = %info.id, "filtered out");
            }
            accepted
        });

        match self.shared.dispatch {
            Dispatch::Sync => {
                for (info, handler) in accepted {
                    let id = info.id.clone();
                    let notification = Notification {
                        changes: changes.clone(),
                        observer: info,
                        args: args.clone(),
                    };
                    handler(notification)
                        .await
                        .map_err(|source| StoreError::Observer { id, source })?;
                }
            }
            Dispatch::Async => {
                let runtime =
                    tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
                for (info, handler) in accepted {
                    let id = info.id.clone();
                    let pending = handler(Notification {
                        changes: changes.clone(),
                        observer: info,
                        args: args.clone(),
                    });
                    runtime.spawn(async move {
                        if let Err(err) = pending.await {
                            warn!(observer = %id, error = %err, "observer failed");
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

impl<S> ReadStore for ObservableStore<S>
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
