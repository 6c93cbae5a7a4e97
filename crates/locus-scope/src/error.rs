//! Errors reported by the manager itself.
//!
//! Failures raised by user code (units of work, factories, `release`) are
//! never represented here: they reach the caller untouched.

use crate::slot::SlotId;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScopeError {
    /// The calling thread's slot registry has already been destroyed. Only
    /// observable from destructors that run during thread exit.
    #[error("thread-local storage for slot {slot} is no longer available")]
    SlotUnavailable { slot: SlotId },
}
