//! Key-value store protocol for kvgraph.
//!
//! The mapper never talks to a concrete database. It issues commands through
//! the [`KeyValueStore`] trait, which models a Redis-like server: string
//! values with atomic counters, hashes, lists, and sorted sets.
//!
//! # Backends
//!
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Rules
//!
//! 1. `incr` is atomic per key; identifier allocation relies on it.
//! 2. Reads of absent keys are empty, never errors.
//! 3. Empty containers disappear, so `exists` is false for them.
//! 4. Every call is cancellable through a [`CancelToken`].

pub mod cancel;
pub mod error;
pub mod memory;
pub mod traits;

pub use cancel::CancelToken;
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, Value};
pub use traits::KeyValueStore;
