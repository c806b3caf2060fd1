//! The [`Backup`] trait: the durable secondary store consumed by the mapper.

use async_trait::async_trait;
use kvgraph_store::KeyValueStore;

use crate::error::BackupResult;

/// Durable copy of the live key-value store, kept eventually consistent.
///
/// Each store structure has a `restore_*` hook, which pulls the durable copy
/// into the live store when the live store is missing the key, and a set of
/// update hooks that push one live mutation into the durable copy. Callers
/// treat every hook as best-effort: a failure is logged and the primary
/// mutation still runs.
///
/// Keys are formatted store keys (`prefix:id:suffix`).
#[async_trait]
pub trait Backup: Send + Sync {
    // -- hashes --

    async fn restore_hash(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()>;

    /// Merge `fields` into the durable hash.
    async fn update_hash(&self, key: &str, fields: &[(String, String)]) -> BackupResult<()>;

    async fn update_hash_value(&self, key: &str, field: &str, value: &str) -> BackupResult<()>;

    async fn delete_hash(&self, key: &str) -> BackupResult<()>;

    async fn delete_hash_value(&self, key: &str, field: &str) -> BackupResult<()>;

    // -- lists --

    async fn restore_list(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()>;

    async fn add_list_item(&self, key: &str, value: &str) -> BackupResult<()>;

    /// Insert `value` at the head of the durable list.
    async fn push_front_list_item(&self, key: &str, value: &str) -> BackupResult<()>;

    /// Remove every occurrence of `value`.
    async fn remove_list_item(&self, key: &str, value: &str) -> BackupResult<()>;

    /// Replace `old` with `new`. The new value moves to the tail, matching
    /// the live store's remove-then-push.
    async fn update_list_item(&self, key: &str, old: &str, new: &str) -> BackupResult<()>;

    async fn delete_list(&self, key: &str) -> BackupResult<()>;

    // -- sorted sets --

    async fn restore_set(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()>;

    async fn add_set_item(&self, key: &str, member: &str, score: f64) -> BackupResult<()>;

    async fn update_set_item(&self, key: &str, member: &str, score: f64) -> BackupResult<()>;

    async fn remove_set_item(&self, key: &str, member: &str) -> BackupResult<()>;

    async fn delete_set(&self, key: &str) -> BackupResult<()>;

    // -- strings --

    async fn restore_string(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()>;

    async fn update_string(&self, key: &str, value: &str) -> BackupResult<()>;

    async fn delete_string(&self, key: &str) -> BackupResult<()>;

    // -- counters --

    async fn restore_counter(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()>;

    /// Record the counter's current value after an increment.
    async fn update_counter(&self, key: &str, value: i64) -> BackupResult<()>;
}
