//! The service contract managed per thread.

/// A service whose instances are bound to the current thread by an
/// [`ApiManager`](crate::ApiManager).
///
/// Implementations may keep per-thread state (caches, connections, buffers).
/// [`release`](Api::release) is where that state is given up, and is invoked
/// by [`ApiManager::reset`](crate::ApiManager::reset) before the instance is
/// removed from the thread.
///
/// Instances are shared as `Rc<Self>`, so any state that `release` mutates
/// lives behind interior mutability.
pub trait Api: 'static {
    /// Releases resources held on behalf of the current thread.
    ///
    /// Called at most once per instance by the manager. Should not panic; if
    /// it does, the slot is still cleared and the panic continues to the
    /// caller of `reset`.
    fn release(&self);
}
