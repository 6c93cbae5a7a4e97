//! Per-thread API managers.
//!
//! An [`ApiManager`] binds at most one instance of its [`Api`] to each
//! thread. The instance is created lazily by [`ApiManager::current`], can be
//! discarded with [`ApiManager::reset`], and can be overridden for the length
//! of a unit of work with [`ApiManager::with`] / [`ApiManager::run`]. The
//! override is undone by a [`ScopeGuard`] destructor, so the previous
//! instance comes back on every exit path, unwinding included.

use std::fmt;
use std::rc::Rc;

use crate::api::Api;
use crate::error::ScopeError;
use crate::slot::Slot;

#[cfg(feature = "future")]
use crate::future::Scoped;

/// Associates instances of [`ApiManager::Api`] with the current thread.
///
/// Implementors supply the factory and the storage; every other operation is
/// provided.
pub trait ApiManager {
    type Api: Api;

    /// Builds a brand-new instance. Does not touch the slot.
    fn create(&self) -> Rc<Self::Api>;

    fn slot(&self) -> &Slot<Self::Api>;

    /// The calling thread's instance, created with [`ApiManager::create`] on
    /// first use. Returns the same `Rc` until the next [`ApiManager::reset`].
    ///
    /// # Panics
    ///
    /// Panics if the thread's locals have already been destroyed; see
    /// [`ApiManager::try_current`].
    fn current(&self) -> Rc<Self::Api> {
        let slot = self.slot();
        if let Some(api) = slot.get() {
            return api;
        }

        let api = self.create();
        tracing::debug!(slot = %slot.id(), "created api for current thread");
        slot.replace(Some(api.clone()));
        api
    }

    fn try_current(&self) -> Result<Rc<Self::Api>, ScopeError> {
        let slot = self.slot();
        if let Some(api) = slot.try_get()? {
            return Ok(api);
        }

        let api = self.create();
        tracing::debug!(slot = %slot.id(), "created api for current thread");
        slot.try_replace(Some(api.clone()))?;
        Ok(api)
    }

    /// The calling thread's instance without creating one.
    fn installed(&self) -> Option<Rc<Self::Api>> {
        self.slot().get()
    }

    /// Releases the calling thread's instance and forgets it.
    ///
    /// A thread with no instance gets one created and released, matching
    /// `current()` followed by `release()`. The entry is removed even when
    /// `release` panics.
    fn reset(&self) {
        let api = self.current();
        let _clear = ScopeGuard::restoring(self.slot(), None);
        tracing::debug!(slot = %self.slot().id(), "releasing api for current thread");
        api.release();
    }

    /// Installs `api` for the calling thread until the returned guard drops.
    fn enter(&self, api: Rc<Self::Api>) -> ScopeGuard<'_, Self::Api> {
        ScopeGuard::install(self.slot(), api)
    }

    /// Runs `work` with `api` installed and returns its result unchanged.
    ///
    /// The previous instance (or its absence) is restored before this
    /// returns or unwinds. `api` is not released.
    fn with<R, W>(&self, api: Rc<Self::Api>, work: W) -> R
    where
        W: FnOnce() -> R,
    {
        let _guard = self.enter(api);
        work()
    }

    /// [`ApiManager::with`] for work without a result.
    fn run<W>(&self, api: Rc<Self::Api>, work: W)
    where
        W: FnOnce(),
    {
        self.with(api, work);
    }

    /// Wraps `fut` so that `api` is installed whenever it is polled.
    #[cfg(feature = "future")]
    fn scope<F>(&self, api: Rc<Self::Api>, fut: F) -> Scoped<'_, Self, F>
    where
        Self: Sized,
        F: Future,
    {
        Scoped::new(self, api, fut)
    }
}

/// Restores a slot to a captured value when dropped.
///
/// Returned by [`ApiManager::enter`]. Guards on the same slot must be dropped
/// in the reverse order they were created in.
#[must_use = "the previous instance is restored as soon as the guard is dropped"]
pub struct ScopeGuard<'a, A: Api> {
    slot: &'a Slot<A>,
    saved: Option<Rc<A>>,
}

impl<'a, A: Api> ScopeGuard<'a, A> {
    fn install(slot: &'a Slot<A>, api: Rc<A>) -> Self {
        let saved = slot.replace(Some(api));
        tracing::trace!(slot = %slot.id(), had_previous = saved.is_some(), "installed api");
        Self { slot, saved }
    }

    fn restoring(slot: &'a Slot<A>, saved: Option<Rc<A>>) -> Self {
        Self { slot, saved }
    }

    /// The instance that comes back when this guard drops.
    pub fn previous(&self) -> Option<&Rc<A>> {
        self.saved.as_ref()
    }
}

impl<A: Api> Drop for ScopeGuard<'_, A> {
    fn drop(&mut self) {
        let saved = self.saved.take();
        let absent = saved.is_none();
        match self.slot.try_replace(saved) {
            Ok(_displaced) => {
                tracing::trace!(slot = %self.slot.id(), absent, "restored previous api");
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not restore previous api");
            }
        }
    }
}

impl<A: Api> fmt::Debug for ScopeGuard<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("slot", &self.slot.id())
            .field("has_previous", &self.saved.is_some())
            .finish()
    }
}

type Factory<A> = Box<dyn Fn() -> Rc<A> + Send + Sync>;

/// An [`ApiManager`] driven by an injected factory.
///
/// `ScopedManager` is `Send + Sync`, so one value (often a `static`) can
/// serve every thread; each thread still sees only its own instance.
pub struct ScopedManager<A: Api> {
    factory: Factory<A>,
    slot: Slot<A>,
}

impl<A: Api> ScopedManager<A> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::from_shared(move || Rc::new(factory()))
    }

    /// Builds a manager whose factory already returns `Rc`s, e.g. to hand
    /// out clones of a shared prototype.
    pub fn from_shared<F>(factory: F) -> Self
    where
        F: Fn() -> Rc<A> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            slot: Slot::new(),
        }
    }
}

impl<A: Api + Default> Default for ScopedManager<A> {
    fn default() -> Self {
        Self::new(A::default)
    }
}

impl<A: Api> ApiManager for ScopedManager<A> {
    type Api = A;

    fn create(&self) -> Rc<A> {
        (self.factory)()
    }

    fn slot(&self) -> &Slot<A> {
        &self.slot
    }
}

impl<A: Api> fmt::Debug for ScopedManager<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedManager")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}
