//! Durable backup collaborator for kvgraph.
//!
//! A backup keeps an eventually-consistent durable copy of the live store.
//! The mapper calls a `restore_*` hook before it first touches a key, so a
//! cold cache is seeded from durable storage, and an update hook before each
//! primary mutation. Backup failures never abort a primary mutation.
//!
//! # Modules
//!
//! - [`error`]: error types for backup operations
//! - [`traits`]: the [`Backup`] trait
//! - [`noop`]: [`NoopBackup`], used when no backup is configured
//! - [`memory`]: [`InMemoryBackup`] with a process-wide table cache
//! - [`blocking`]: [`BlockingBackup`], synchronous wrappers

pub mod blocking;
pub mod error;
pub mod memory;
pub mod noop;
pub mod traits;

pub use blocking::BlockingBackup;
pub use error::{BackupError, BackupResult};
pub use memory::{BackupSnapshot, DurableValue, InMemoryBackup};
pub use noop::NoopBackup;
pub use traits::Backup;
