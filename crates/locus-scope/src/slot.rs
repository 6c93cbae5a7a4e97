//! Per-thread storage cells.
//!
//! Every [`Slot`] owns a process-unique [`SlotId`]. The instances themselves
//! live in a thread-local registry keyed by that id, so the same `Slot` value
//! names a distinct cell on every thread that touches it. The registry borrow
//! is never held while user code runs.
//!
//! Each entry keeps a weak handle on its slot's liveness token. When a slot is
//! dropped it bumps a global retirement counter, and every other thread
//! evicts that slot's entries on its next registry access.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::api::Api;
use crate::error::ScopeError;

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// Number of slots dropped so far, process wide.
static RETIRED_SLOTS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static SLOTS: RefCell<Registry> = RefCell::new(Registry::default());
}

struct Entry {
    alive: Weak<()>,
    value: Box<dyn Any>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<SlotId, Entry>,
    /// Value of `RETIRED_SLOTS` at the last sweep on this thread.
    swept_at: u64,
}

impl Registry {
    /// Removes entries whose slot has been dropped. The caller drops the
    /// returned entries once the registry borrow is released.
    fn sweep(&mut self) -> Vec<Entry> {
        let retired = RETIRED_SLOTS.load(Ordering::Acquire);
        if retired == self.swept_at {
            return Vec::new();
        }
        self.swept_at = retired;

        let dead: Vec<SlotId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.alive.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        if !dead.is_empty() {
            tracing::debug!(count = dead.len(), "evicting entries of dropped slots");
        }
        dead.iter().filter_map(|id| self.entries.remove(id)).collect()
    }

    fn lookup<A: Api>(&self, id: SlotId) -> Option<Rc<A>> {
        self.entries
            .get(&id)
            .and_then(|entry| entry.value.downcast_ref::<Rc<A>>())
            .cloned()
    }

    fn store<A: Api>(&mut self, id: SlotId, alive: &Arc<()>, value: Option<Rc<A>>) -> Option<Rc<A>> {
        let previous = match value {
            Some(api) => self.entries.insert(
                id,
                Entry {
                    alive: Arc::downgrade(alive),
                    value: Box::new(api),
                },
            ),
            None => self.entries.remove(&id),
        };
        // The old `Rc` is handed back so it is dropped after the borrow ends.
        previous
            .and_then(|entry| entry.value.downcast::<Rc<A>>().ok())
            .map(|api| *api)
    }
}

/// Sweeps, then runs `f`; evicted entries are dropped after the borrow ends.
fn visit<R>(registry: &RefCell<Registry>, f: impl FnOnce(&mut Registry) -> R) -> R {
    let (out, evicted) = {
        let mut registry = registry.borrow_mut();
        let evicted = registry.sweep();
        (f(&mut registry), evicted)
    };
    drop(evicted);
    out
}

/// Identifies one [`Slot`] across all threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cell holding at most one `Rc<A>` per thread.
///
/// `Slot` itself stores only its id and a liveness token, and is
/// `Send + Sync` for any `A`; the instances never leave the thread that
/// installed them.
///
/// Dropping a slot removes the dropping thread's entry at once. Entries held
/// by other threads are dropped, without [`Api::release`], the next time
/// those threads touch any slot, or when they exit.
pub struct Slot<A: Api> {
    id: SlotId,
    alive: Arc<()>,
    _api: PhantomData<fn() -> A>,
}

impl<A: Api> Slot<A> {
    pub fn new() -> Self {
        Self {
            id: SlotId(NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed)),
            alive: Arc::new(()),
            _api: PhantomData,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    /// The calling thread's instance, if any.
    ///
    /// # Panics
    ///
    /// Panics if called while the thread's locals are being destroyed, the
    /// same way [`std::thread::LocalKey::with`] does.
    pub fn get(&self) -> Option<Rc<A>> {
        SLOTS.with(|registry| visit(registry, |registry| registry.lookup(self.id)))
    }

    pub fn try_get(&self) -> Result<Option<Rc<A>>, ScopeError> {
        SLOTS
            .try_with(|registry| visit(registry, |registry| registry.lookup(self.id)))
            .map_err(|_| self.unavailable())
    }

    /// Installs `value` for the calling thread (`None` removes the entry)
    /// and returns what was there before.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Slot::get`].
    pub fn replace(&self, value: Option<Rc<A>>) -> Option<Rc<A>> {
        SLOTS.with(|registry| {
            visit(registry, |registry| registry.store(self.id, &self.alive, value))
        })
    }

    pub fn try_replace(&self, value: Option<Rc<A>>) -> Result<Option<Rc<A>>, ScopeError> {
        SLOTS
            .try_with(|registry| {
                visit(registry, |registry| registry.store(self.id, &self.alive, value))
            })
            .map_err(|_| self.unavailable())
    }

    /// Removes and returns the calling thread's instance.
    pub fn take(&self) -> Option<Rc<A>> {
        self.replace(None)
    }

    fn unavailable(&self) -> ScopeError {
        ScopeError::SlotUnavailable { slot: self.id }
    }
}

impl<A: Api> Default for Slot<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Api> fmt::Debug for Slot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("api", &std::any::type_name::<A>())
            .finish()
    }
}

impl<A: Api> Drop for Slot<A> {
    fn drop(&mut self) {
        let _ = self.try_replace(None);
        // The token must be dead before the retirement is published, or a
        // concurrent sweep could record the new count and keep the entry.
        drop(std::mem::replace(&mut self.alive, Arc::new(())));
        RETIRED_SLOTS.fetch_add(1, Ordering::Release);
    }
}
