//! Typed publish/subscribe event bus.
//!
//! Every component of the sync engine communicates through this bus or
//! through direct calls into a manager's public API. Dispatch is
//! synchronous and in registration order. Subscriptions are scoped: the
//! [`Subscription`] handle removes its listener when dropped, so a
//! component's listeners live exactly as long as the component keeps the
//! handles.
//!
//! Dispatch semantics:
//! - A listener that unsubscribes during dispatch of an event is skipped
//!   for the remainder of that pass (it still ran if it already ran).
//! - A listener added during dispatch is not invoked in that pass.
//! - Publishing from inside a listener is legal and nests; nesting deeper
//!   than [`MAX_DISPATCH_DEPTH`] drops the publish with a warning.
//! - Publishing with zero listeners is a no-op.

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Re-entrant publishes nested beyond this depth are dropped.
pub const MAX_DISPATCH_DEPTH: usize = 32;

thread_local! {
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

type Handler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

struct Entry {
    id: u64,
    alive: Arc<AtomicBool>,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    topics: Mutex<HashMap<TypeId, Vec<Entry>>>,
    next_id: AtomicU64,
}

/// Process-wide typed event dispatcher. Cheap to clone; clones share the
/// same listener registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of type `E`. The listener stays
    /// registered until the returned [`Subscription`] is dropped.
    pub fn subscribe<E, F>(&self, listener: F) -> Subscription
    where
        E: Any,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let alive = Arc::new(AtomicBool::new(true));
        let handler: Handler = Arc::new(move |event| {
            if let Some(event) = event.downcast_ref::<E>() {
                listener(event);
            }
        });

        let mut topics = self.inner.topics.lock().unwrap();
        topics.entry(TypeId::of::<E>()).or_default().push(Entry {
            id,
            alive: alive.clone(),
            handler,
        });

        Subscription {
            bus: Arc::downgrade(&self.inner),
            type_id: TypeId::of::<E>(),
            id,
            alive,
        }
    }

    /// Synchronously invoke every live listener for `E`, in registration
    /// order. Listener registry changes made during the pass take effect
    /// for later passes only, except that unsubscribed listeners are
    /// skipped immediately.
    pub fn publish<E: Any>(&self, event: &E) {
        let depth = DISPATCH_DEPTH.with(Cell::get);
        if depth >= MAX_DISPATCH_DEPTH {
            log::warn!(
                "event dispatch nested beyond {MAX_DISPATCH_DEPTH} levels; dropping publish"
            );
            return;
        }
        DISPATCH_DEPTH.with(|d| d.set(depth + 1));
        // Snapshot outside the lock so listeners can publish, subscribe
        // and unsubscribe freely while we iterate.
        let snapshot: Vec<(Arc<AtomicBool>, Handler)> = {
            let topics = self.inner.topics.lock().unwrap();
            match topics.get(&TypeId::of::<E>()) {
                Some(entries) => entries
                    .iter()
                    .map(|entry| (entry.alive.clone(), entry.handler.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };
        for (alive, handler) in snapshot {
            if alive.load(Ordering::Acquire) {
                handler(event);
            }
        }
        DISPATCH_DEPTH.with(|d| d.set(depth));
    }

    /// Number of live listeners for `E`.
    pub fn listener_count<E: Any>(&self) -> usize {
        let topics = self.inner.topics.lock().unwrap();
        topics
            .get(&TypeId::of::<E>())
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Scoped listener registration. Dropping it guarantees the listener is
/// never invoked again, even mid-dispatch.
pub struct Subscription {
    bus: Weak<BusInner>,
    type_id: TypeId,
    id: u64,
    alive: Arc<AtomicBool>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
        if let Some(inner) = self.bus.upgrade() {
            if let Ok(mut topics) = inner.topics.lock() {
                if let Some(entries) = topics.get_mut(&self.type_id) {
                    entries.retain(|entry| entry.id != self.id);
                }
            }
        }
    }
}
