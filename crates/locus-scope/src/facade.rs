//! Static facades over a process-wide [`ScopedManager`](crate::ScopedManager).

/// Declares a unit struct whose associated functions delegate to a lazily
/// built `static` [`ScopedManager`](crate::ScopedManager).
///
/// ```
/// use std::cell::Cell;
/// use locus_scope::{Api, api_facade};
///
/// #[derive(Default)]
/// pub struct Clock {
///     ticks: Cell<u64>,
/// }
///
/// impl Api for Clock {
///     fn release(&self) {}
/// }
///
/// api_facade! {
///     /// The current thread's clock.
///     pub struct Clocks: Clock = Clock::default;
/// }
///
/// Clocks::get().ticks.set(5);
/// assert_eq!(Clocks::get().ticks.get(), 5);
///
/// let frozen = Clocks::create();
/// Clocks::run(frozen, || assert_eq!(Clocks::get().ticks.get(), 0));
/// assert_eq!(Clocks::get().ticks.get(), 5);
/// ```
#[macro_export]
macro_rules! api_facade {
    ($(#[$meta:meta])* $vis:vis struct $name:ident: $api:ty = $factory:expr;) => {
        $(#[$meta])*
        $vis struct $name;

        #[allow(dead_code)]
        impl $name {
            /// The manager every function of this facade delegates to.
            pub fn manager() -> &'static $crate::ScopedManager<$api> {
                static MANAGER: ::std::sync::LazyLock<$crate::ScopedManager<$api>> =
                    ::std::sync::LazyLock::new(|| $crate::ScopedManager::new($factory));
                &MANAGER
            }

            /// The calling thread's instance, created on first use.
            pub fn get() -> ::std::rc::Rc<$api> {
                $crate::ApiManager::current(Self::manager())
            }

            /// A new instance that is not installed anywhere.
            pub fn create() -> ::std::rc::Rc<$api> {
                $crate::ApiManager::create(Self::manager())
            }

            /// Releases and forgets the calling thread's instance.
            pub fn reset() {
                $crate::ApiManager::reset(Self::manager())
            }

            /// Runs `work` with `api` installed, then restores the previous instance.
            pub fn with<R, W>(api: ::std::rc::Rc<$api>, work: W) -> R
            where
                W: ::std::ops::FnOnce() -> R,
            {
                $crate::ApiManager::with(Self::manager(), api, work)
            }

            /// Like `with`, for work without a result.
            pub fn run<W>(api: ::std::rc::Rc<$api>, work: W)
            where
                W: ::std::ops::FnOnce(),
            {
                $crate::ApiManager::run(Self::manager(), api, work)
            }
        }
    };
}
