//! Registry of live connections for diagnostics and tests.
//!
//! `ConnectionRegistry` stores non-owning weak references, so registration
//! never keeps a connection alive. Connections add themselves when built and
//! remove themselves when destroyed or when their transport ends. While the
//! registry is disabled both operations are ignored.

use std::{
    fmt,
    sync::{
        Arc,
        PoisonError,
        RwLock,
        Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;

use crate::connection::{Connection, ConnectionId, Shared};

/// Change reported to a registry observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryChange {
    /// A connection was registered.
    Added(ConnectionId),
    /// A connection was unregistered.
    Removed(ConnectionId),
}

type Observer = Arc<dyn Fn(RegistryChange) + Send + Sync>;

/// Concurrent table of connections keyed by [`ConnectionId`].
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use docwire::registry::{ConnectionRegistry, RegistryChange};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let registry = ConnectionRegistry::new();
/// let sink = Arc::clone(&seen);
/// registry.enable_with(move |change: RegistryChange| {
///     sink.lock().expect("observer lock").push(change);
/// });
/// assert!(registry.is_enabled());
/// assert!(registry.is_empty());
/// ```
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: DashMap<ConnectionId, Weak<Shared>>,
    enabled: AtomicBool,
    observer: RwLock<Option<Observer>>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.entries.len())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    /// Create a disabled, empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Start accounting with an empty table and no observer.
    pub fn enable(&self) { self.enable_inner(None); }

    /// Start accounting with an empty table, notifying `observer` of every
    /// add and remove.
    pub fn enable_with<F>(&self, observer: F)
    where
        F: Fn(RegistryChange) + Send + Sync + 'static,
    {
        self.enable_inner(Some(Arc::new(observer)));
    }

    fn enable_inner(&self, observer: Option<Observer>) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = observer;
        self.entries.clear();
        self.enabled.store(true, Ordering::Release);
    }

    /// Stop accounting and drop the observer. Existing entries stay visible
    /// until the next [`enable`](Self::enable).
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Returns `true` while accounting is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool { self.enabled.load(Ordering::Acquire) }

    /// Register `connection` under `id`. Ignored while disabled.
    pub fn add(&self, id: ConnectionId, connection: &Connection) {
        if !self.is_enabled() {
            return;
        }
        self.entries.insert(id, connection.downgrade());
        self.notify(RegistryChange::Added(id));
    }

    /// Unregister `id`. Ignored while disabled or when `id` is absent.
    pub fn remove(&self, id: ConnectionId) {
        if !self.is_enabled() {
            return;
        }
        if self.entries.remove(&id).is_some() {
            self.notify(RegistryChange::Removed(id));
        }
    }

    /// Retrieve the connection registered under `id` if it is still alive.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        let guard = self.entries.get(&id);
        let shared = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if shared.is_none() {
            self.entries.remove_if(&id, |_, weak| weak.strong_count() == 0);
        }
        shared.map(Connection::from_shared)
    }

    /// Prune dropped connections, then return the live ones ordered by id.
    ///
    /// This holds per-bucket write locks while iterating.
    #[must_use]
    pub fn all(&self) -> Vec<Connection> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|_, weak| {
            if let Some(shared) = weak.upgrade() {
                live.push(Connection::from_shared(shared));
                true
            } else {
                false
            }
        });
        live.sort_by_key(Connection::id);
        live
    }

    /// Number of entries, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns `true` when no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    fn notify(&self, change: RegistryChange) {
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer(change);
        }
    }
}
