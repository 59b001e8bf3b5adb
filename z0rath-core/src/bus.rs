//! In-process event bus
//!
//! A dispatch table from event kind to an ordered list of listeners.
//! `publish` snapshots the listeners for a kind, releases the table lock and
//! invokes them synchronously in registration order, so handlers may freely
//! subscribe, unsubscribe or publish from inside a callback.
//!
//! Listeners added during a publish are not part of that publish. Listeners
//! removed during a publish are skipped if they have not run yet: every
//! listener carries a liveness flag that `unsubscribe` clears before the
//! entry leaves the table.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use z0rath_model::{InvalidationEvent, InvalidationKind};

/// Bus carrying server-pushed invalidations to permission consumers.
pub type InvalidationBus = EventBus<InvalidationKind, InvalidationEvent>;

type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct Listener<P> {
    id: u64,
    live: Arc<AtomicBool>,
    once: bool,
    handler: Handler<P>,
}

impl<P> Clone for Listener<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            live: Arc::clone(&self.live),
            once: self.once,
            handler: Arc::clone(&self.handler),
        }
    }
}

struct Registry<K, P> {
    next_id: u64,
    table: HashMap<K, Vec<Listener<P>>>,
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription<K> {
    kind: K,
    id: u64,
}

impl<K: Copy> Subscription<K> {
    /// Event kind the listener was registered for.
    pub fn kind(&self) -> K {
        self.kind
    }
}

/// Typed publish/subscribe registry keyed by event kind.
///
/// Cloning yields another handle onto the same registry.
pub struct EventBus<K, P> {
    registry: Arc<Mutex<Registry<K, P>>>,
}

impl<K, P> Clone for EventBus<K, P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<K, P> Default for EventBus<K, P>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> fmt::Debug for EventBus<K, P>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(String, usize)> = self
            .registry
            .try_lock()
            .map(|registry| {
                registry
                    .table
                    .iter()
                    .map(|(kind, listeners)| (format!("{kind:?}"), listeners.len()))
                    .collect()
            })
            .unwrap_or_default();
        f.debug_struct("EventBus")
            .field("listeners", &counts)
            .finish()
    }
}

impl<K, P> EventBus<K, P>
where
    K: Copy + Eq + Hash,
{
    /// Empty bus with no listeners.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                table: HashMap::new(),
            })),
        }
    }

    /// Register `handler` for every future publish of `kind`.
    pub fn subscribe<F>(&self, kind: K, handler: F) -> Subscription<K>
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(handler), false)
    }

    /// Register `handler` for the next publish of `kind` only.
    pub fn subscribe_once<F>(&self, kind: K, handler: F) -> Subscription<K>
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(handler), true)
    }

    /// Subscribe and tie the registration to the returned guard's lifetime.
    pub fn scoped<F>(&self, kind: K, handler: F) -> ScopedSubscription<K, P>
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let subscription = self.subscribe(kind, handler);
        ScopedSubscription {
            bus: self.clone(),
            subscription: Some(subscription),
        }
    }

    fn register(&self, kind: K, handler: Handler<P>, once: bool) -> Subscription<K> {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.table.entry(kind).or_default().push(Listener {
            id,
            live: Arc::new(AtomicBool::new(true)),
            once,
            handler,
        });
        Subscription { kind, id }
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, subscription: Subscription<K>) -> bool {
        let mut registry = self.registry.lock();
        let Some(listeners) = registry.table.get_mut(&subscription.kind) else {
            return false;
        };
        let Some(index) = listeners.iter().position(|l| l.id == subscription.id) else {
            return false;
        };
        let listener = listeners.remove(index);
        listener.live.store(false, Ordering::SeqCst);
        if listeners.is_empty() {
            registry.table.remove(&subscription.kind);
        }
        true
    }

    /// Remove every listener registered for `kind`.
    pub fn clear(&self, kind: K) {
        if let Some(listeners) = self.registry.lock().table.remove(&kind) {
            for listener in listeners {
                listener.live.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Number of listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: K) -> usize {
        self.registry
            .lock()
            .table
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `payload` to the current listeners of `kind`.
    ///
    /// Returns how many listeners were invoked.
    pub fn publish(&self, kind: K, payload: &P) -> usize {
        let snapshot = match self.registry.lock().table.get(&kind) {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut spent_once = false;
        for listener in &snapshot {
            let live = if listener.once {
                let was_live = listener.live.swap(false, Ordering::SeqCst);
                spent_once |= was_live;
                was_live
            } else {
                listener.live.load(Ordering::SeqCst)
            };
            if live {
                (listener.handler)(payload);
                delivered += 1;
            }
        }

        if spent_once {
            let mut registry = self.registry.lock();
            if let Some(listeners) = registry.table.get_mut(&kind) {
                listeners.retain(|l| l.live.load(Ordering::SeqCst));
                if listeners.is_empty() {
                    registry.table.remove(&kind);
                }
            }
        }

        delivered
    }
}

/// Unsubscribes its listener when dropped.
pub struct ScopedSubscription<K, P>
where
    K: Copy + Eq + Hash,
{
    bus: EventBus<K, P>,
    subscription: Option<Subscription<K>>,
}

impl<K, P> ScopedSubscription<K, P>
where
    K: Copy + Eq + Hash,
{
    /// The registration this guard owns, until cancelled.
    pub fn subscription(&self) -> Option<Subscription<K>> {
        self.subscription
    }

    /// Unsubscribe now instead of at drop.
    pub fn cancel(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(subscription);
        }
    }
}

impl<K, P> Drop for ScopedSubscription<K, P>
where
    K: Copy + Eq + Hash,
{
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<K, P> fmt::Debug for ScopedSubscription<K, P>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedSubscription")
            .field("subscription", &self.subscription)
            .finish()
    }
}
