//! # Locus Scope
//!
//! Thread-scoped API instances with guaranteed restoration.
//!
//! ## Overview
//!
//! An [`ApiManager`] keeps one instance of an [`Api`] per thread. Code asks
//! for the current instance with [`ApiManager::current`] (created on first
//! use), discards it with [`ApiManager::reset`], or temporarily swaps in a
//! different one with [`ApiManager::with`] / [`ApiManager::run`]. Whatever
//! was installed before comes back when the unit of work finishes, whether
//! it returns or panics.
//!
//! ## Features
//!
//! - **🧵 Per-thread**: each thread sees only its own instance, no locking
//! - **↩️ Restoring**: overrides are undone by a drop guard on every exit path
//! - **⏳ Async**: [`ApiManager::scope`] keeps an override attached to one
//!   task across `.await` points (feature `future`, on by default)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use locus_scope::{Api, ApiManager, ScopedManager};
//!
//! #[derive(Default)]
//! struct Buffer {
//!     lines: RefCell<Vec<String>>,
//! }
//!
//! impl Api for Buffer {
//!     fn release(&self) {
//!         self.lines.borrow_mut().clear();
//!     }
//! }
//!
//! let buffers = ScopedManager::<Buffer>::default();
//! buffers.current().lines.borrow_mut().push("hello".into());
//!
//! let scratch = buffers.create();
//! let count = buffers.with(scratch.clone(), || {
//!     buffers.current().lines.borrow_mut().push("scratch".into());
//!     buffers.current().lines.borrow().len()
//! });
//!
//! assert_eq!(count, 1);
//! assert_eq!(scratch.lines.borrow().as_slice(), ["scratch"]);
//! assert!(!Rc::ptr_eq(&scratch, &buffers.current()));
//! assert_eq!(buffers.current().lines.borrow().as_slice(), ["hello"]);
//!
//! buffers.reset();
//! assert!(buffers.current().lines.borrow().is_empty());
//! ```

pub mod api;
pub mod error;
mod facade;
#[cfg(feature = "future")]
pub mod future;
pub mod manager;
pub mod slot;

pub use api::Api;
pub use error::ScopeError;
#[cfg(feature = "future")]
pub use future::Scoped;
pub use manager::{ApiManager, ScopeGuard, ScopedManager};
pub use slot::{Slot, SlotId};
