//! Scoped installation for async tasks.
//!
//! A task that hops between polls cannot hold a [`ScopeGuard`] across an
//! `.await`: other tasks on the same thread would see its instance. [`Scoped`]
//! instead enters the instance for the length of each `poll` and restores the
//! previous one before yielding.
//!
//! [`ScopeGuard`]: crate::ScopeGuard

use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::FusedFuture;
use pin_project::{pin_project, pinned_drop};

use crate::manager::ApiManager;

/// Future returned by [`ApiManager::scope`].
///
/// The instance is also installed while the inner future is dropped, so
/// destructors inside it see the same instance its polls did.
#[pin_project(PinnedDrop)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Scoped<'m, M: ApiManager, F> {
    manager: &'m M,
    api: Rc<M::Api>,
    // `None` only after `PinnedDrop::drop` has run.
    #[pin]
    fut: Option<F>,
}

impl<'m, M: ApiManager, F: Future> Scoped<'m, M, F> {
    pub fn new(manager: &'m M, api: Rc<M::Api>, fut: F) -> Self {
        Self {
            manager,
            api,
            fut: Some(fut),
        }
    }

    /// The instance installed while the inner future runs.
    pub fn api(&self) -> &Rc<M::Api> {
        &self.api
    }
}

impl<M: ApiManager, F: Future> Future for Scoped<'_, M, F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.manager.enter(this.api.clone());
        match this.fut.as_pin_mut() {
            Some(fut) => fut.poll(cx),
            None => Poll::Pending,
        }
    }
}

impl<M: ApiManager, F: FusedFuture> FusedFuture for Scoped<'_, M, F> {
    fn is_terminated(&self) -> bool {
        self.fut.as_ref().is_none_or(FusedFuture::is_terminated)
    }
}

#[pinned_drop]
impl<M: ApiManager, F> PinnedDrop for Scoped<'_, M, F> {
    fn drop(self: Pin<&mut Self>) {
        let mut this = self.project();
        if this.fut.is_none() {
            return;
        }
        // Entering panics once the thread's locals are gone; drop bare then.
        let _guard = match this.manager.slot().try_get() {
            Ok(_) => Some(this.manager.enter(this.api.clone())),
            Err(_) => None,
        };
        this.fut.set(None);
    }
}

impl<M: ApiManager, F> fmt::Debug for Scoped<'_, M, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped")
            .field("slot", &self.manager.slot().id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use futures::executor::block_on;
    use futures::future::{self, FutureExt};

    use super::*;
    use crate::api::Api;
    use crate::manager::ScopedManager;

    #[derive(Default)]
    struct Tag;

    impl Api for Tag {
        fn release(&self) {}
    }

    #[test]
    fn test_scope_installs_during_poll() {
        let manager = ScopedManager::<Tag>::default();
        let api = manager.create();

        let seen = block_on(manager.scope(api.clone(), async { manager.current() }));
        assert!(Rc::ptr_eq(&seen, &api));
        assert!(manager.installed().is_none());
    }

    #[test]
    fn test_scope_passes_output_through() {
        let manager = ScopedManager::<Tag>::default();
        let out = block_on(manager.scope(manager.create(), async { 3_141_529 }));
        assert_eq!(out, 3_141_529);
    }

    #[test]
    fn test_scope_restores_between_polls() {
        let manager = ScopedManager::<Tag>::default();
        let outside = manager.current();
        let inside = manager.create();
        let observed = RefCell::new(Vec::new());

        let mut polls = 0;
        let mut scoped = manager.scope(
            inside.clone(),
            future::poll_fn(|cx| {
                observed.borrow_mut().push(manager.current());
                polls += 1;
                if polls < 2 {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                } else {
                    Poll::Ready(())
                }
            }),
        );

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(scoped.poll_unpin(&mut cx).is_pending());
        assert!(Rc::ptr_eq(&manager.current(), &outside));
        assert!(scoped.poll_unpin(&mut cx).is_ready());
        drop(scoped);

        let observed = observed.into_inner();
        assert_eq!(observed.len(), 2);
        assert!(observed.iter().all(|api| Rc::ptr_eq(api, &inside)));
        assert!(Rc::ptr_eq(&manager.current(), &outside));
    }

    #[test]
    fn test_fused_inner_reports_termination() {
        let manager = ScopedManager::<Tag>::default();
        let mut scoped = manager.scope(manager.create(), future::ready(1).fuse());
        assert!(!scoped.is_terminated());
        assert_eq!(block_on(&mut scoped), 1);
        assert!(scoped.is_terminated());
    }

    struct DropWitness<'a> {
        manager: &'a ScopedManager<Tag>,
        seen: &'a RefCell<Option<Rc<Tag>>>,
    }

    impl Drop for DropWitness<'_> {
        fn drop(&mut self) {
            *self.seen.borrow_mut() = self.manager.installed();
        }
    }

    #[test]
    fn test_inner_future_dropped_with_instance_installed() {
        let manager = ScopedManager::<Tag>::default();
        let outside = manager.current();
        let inside = manager.create();
        let seen = RefCell::new(None);

        let witness = DropWitness {
            manager: &manager,
            seen: &seen,
        };
        let mut scoped = Box::pin(manager.scope(inside.clone(), async move {
            let _witness = witness;
            future::pending::<()>().await;
        }));

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(scoped.as_mut().poll(&mut cx).is_pending());
        drop(scoped);

        let seen = seen.into_inner().expect("destructor saw an instance");
        assert!(Rc::ptr_eq(&seen, &inside));
        assert!(Rc::ptr_eq(&manager.current(), &outside));
    }
}
