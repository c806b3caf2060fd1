use async_trait::async_trait;

use crate::error::StoreResult;

/// Key-value store protocol consumed by the mapper.
///
/// Keys are formatted `prefix:id:suffix` strings. Values are the store's
/// native text. Implementations must satisfy these invariants:
/// - [`incr`](Self::incr) is atomic: concurrent callers on one key never
///   observe the same result. Identifier allocation depends on this.
/// - Every other command may be last-writer-wins.
/// - Reading an absent key yields an empty result, never an error.
/// - Using a key with a command of another structure is an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically increment the integer at `key` (absent counts as 0) and
    /// return the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete a key of any structure. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Set several hash fields in one command.
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// All fields of a hash, sorted by field name.
    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, String)>>;

    /// Remove one hash field. Returns `true` if it existed.
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool>;

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Push onto the head of a list; returns the new length.
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Push onto the tail of a list; returns the new length.
    async fn rpush(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Pop the tail of `source` and push it onto the head of `destination`.
    async fn rpoplpush(&self, source: &str, destination: &str) -> StoreResult<Option<String>>;

    /// Remove every occurrence of `value`; returns how many were removed.
    async fn lrem(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Elements between `start` and `stop` inclusive. Negative indices count
    /// from the tail, so `(0, -1)` is the whole list.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    /// Add or re-score a member. Returns `true` if the member is new.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<bool>;

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Members by ascending rank, with scores. Indices as for `lrange`.
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<(String, f64)>>;

    /// Members with `min <= score <= max`, ascending.
    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>>;
}
