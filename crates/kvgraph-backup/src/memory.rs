//! In-memory durable backup for tests and single-process deployments.
//!
//! [`InMemoryBackup`] groups keys into tables named `namespace.prefix`,
//! where `prefix` is the key's first segment. Table handles live in a
//! process-wide cache, so two backups opened on the same namespace share
//! their data just as two clients of one database would. The cache mutex
//! guards only the check-and-insert of a handle; each table carries its own
//! lock and is safe for concurrent use once registered.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use async_trait::async_trait;
use kvgraph_store::KeyValueStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BackupError, BackupResult};
use crate::traits::Backup;

/// The durable form of one live-store value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DurableValue {
    Hash(BTreeMap<String, String>),
    List(Vec<String>),
    Set(BTreeMap<String, f64>),
    String(String),
    Counter(i64),
}

impl DurableValue {
    fn kind(&self) -> &'static str {
        match self {
            DurableValue::Hash(_) => "hash",
            DurableValue::List(_) => "list",
            DurableValue::Set(_) => "set",
            DurableValue::String(_) => "string",
            DurableValue::Counter(_) => "counter",
        }
    }
}

/// Serializable image of every table in one namespace.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub namespace: String,
    pub tables: BTreeMap<String, BTreeMap<String, DurableValue>>,
}

#[derive(Debug, Default)]
struct Table {
    entries: RwLock<HashMap<String, DurableValue>>,
}

type TableCache = Mutex<HashMap<String, Arc<Table>>>;

static TABLES: OnceLock<TableCache> = OnceLock::new();

fn table_handle(name: &str) -> Arc<Table> {
    let mut tables = TABLES
        .get_or_init(TableCache::default)
        .lock()
        .expect("lock poisoned");
    let handle = tables.entry(name.to_string()).or_insert_with(|| {
        debug!(table = name, "registering backup table");
        Arc::new(Table::default())
    });
    Arc::clone(handle)
}

fn wrong_kind(key: &str, expected: &'static str, found: &DurableValue) -> BackupError {
    BackupError::WrongKind {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

/// An in-memory implementation of [`Backup`].
#[derive(Clone, Debug)]
pub struct InMemoryBackup {
    namespace: String,
}

impl InMemoryBackup {
    /// Open (or create) the backup for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn table_name(&self, key: &str) -> String {
        let prefix = key.split(':').next().unwrap_or(key);
        format!("{}.{}", self.namespace, prefix)
    }

    fn table(&self, key: &str) -> Arc<Table> {
        table_handle(&self.table_name(key))
    }

    /// A copy of the durable value at `key`.
    pub fn value(&self, key: &str) -> Option<DurableValue> {
        let table = self.table(key);
        let entries = table.entries.read().expect("lock poisoned");
        entries.get(key).cloned()
    }

    fn remove(&self, key: &str) {
        let table = self.table(key);
        table.entries.write().expect("lock poisoned").remove(key);
    }

    /// Apply `f` to the value at `key`, creating it with `init` if absent.
    /// Values left empty are dropped.
    fn update<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> DurableValue,
        f: impl FnOnce(&mut DurableValue) -> BackupResult<T>,
    ) -> BackupResult<T> {
        let table = self.table(key);
        let mut entries = table.entries.write().expect("lock poisoned");
        let value = entries.entry(key.to_string()).or_insert_with(init);
        let result = f(value);
        let empty = match entries.get(key) {
            Some(DurableValue::Hash(h)) => h.is_empty(),
            Some(DurableValue::List(l)) => l.is_empty(),
            Some(DurableValue::Set(s)) => s.is_empty(),
            _ => false,
        };
        if empty {
            entries.remove(key);
        }
        result
    }

    /// Image of every table belonging to this namespace.
    pub fn snapshot(&self) -> BackupSnapshot {
        let scope = format!("{}.", self.namespace);
        let handles: Vec<(String, Arc<Table>)> = {
            let tables = TABLES
                .get_or_init(TableCache::default)
                .lock()
                .expect("lock poisoned");
            tables
                .iter()
                .filter_map(|(name, table)| {
                    let short = name.strip_prefix(&scope)?;
                    Some((short.to_string(), Arc::clone(table)))
                })
                .collect()
        };
        let mut snapshot = BackupSnapshot {
            namespace: self.namespace.clone(),
            tables: BTreeMap::new(),
        };
        for (name, table) in handles {
            let entries = table.entries.read().expect("lock poisoned");
            if entries.is_empty() {
                continue;
            }
            let rows = entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            snapshot.tables.insert(name, rows);
        }
        snapshot
    }

    /// The snapshot as pretty-printed JSON.
    pub fn snapshot_json(&self) -> BackupResult<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Replace the contents of every table named in `snapshot`. Tables not
    /// named are left alone. The snapshot's own namespace is ignored, so an
    /// image taken from one namespace can seed another.
    pub fn restore_snapshot(&self, snapshot: &BackupSnapshot) {
        for (name, rows) in &snapshot.tables {
            let table = table_handle(&format!("{}.{}", self.namespace, name));
            let mut entries = table.entries.write().expect("lock poisoned");
            *entries = rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
        debug!(
            namespace = %self.namespace,
            tables = snapshot.tables.len(),
            "restored backup snapshot"
        );
    }

    /// Parse and apply a JSON snapshot.
    pub fn restore_snapshot_json(&self, json: &str) -> BackupResult<()> {
        let snapshot: BackupSnapshot = serde_json::from_str(json)?;
        self.restore_snapshot(&snapshot);
        Ok(())
    }
}

macro_rules! with_kind {
    ($key:expr, $value:expr, $variant:ident, $name:literal) => {
        match $value {
            DurableValue::$variant(inner) => inner,
            other => return Err(wrong_kind($key, $name, other)),
        }
    };
}

#[async_trait]
impl Backup for InMemoryBackup {
    async fn restore_hash(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        if store.exists(key).await? {
            return Ok(());
        }
        match self.value(key) {
            Some(DurableValue::Hash(fields)) => {
                debug!(key, fields = fields.len(), "restoring hash from backup");
                let fields: Vec<(String, String)> = fields.into_iter().collect();
                store.hset(key, &fields).await?;
                Ok(())
            }
            Some(other) => Err(wrong_kind(key, "hash", &other)),
            None => Ok(()),
        }
    }

    async fn update_hash(&self, key: &str, fields: &[(String, String)]) -> BackupResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        self.update(
            key,
            || DurableValue::Hash(BTreeMap::new()),
            |value| {
                let hash = with_kind!(key, value, Hash, "hash");
                hash.extend(fields.iter().cloned());
                Ok(())
            },
        )
    }

    async fn update_hash_value(&self, key: &str, field: &str, value: &str) -> BackupResult<()> {
        self.update(
            key,
            || DurableValue::Hash(BTreeMap::new()),
            |current| {
                let hash = with_kind!(key, current, Hash, "hash");
                hash.insert(field.to_string(), value.to_string());
                Ok(())
            },
        )
    }

    async fn delete_hash(&self, key: &str) -> BackupResult<()> {
        self.remove(key);
        Ok(())
    }

    async fn delete_hash_value(&self, key: &str, field: &str) -> BackupResult<()> {
        if self.value(key).is_none() {
            return Ok(());
        }
        self.update(
            key,
            || DurableValue::Hash(BTreeMap::new()),
            |value| {
                let hash = with_kind!(key, value, Hash, "hash");
                hash.remove(field);
                Ok(())
            },
        )
    }

    async fn restore_list(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        if store.exists(key).await? {
            return Ok(());
        }
        match self.value(key) {
            Some(DurableValue::List(items)) => {
                debug!(key, items = items.len(), "restoring list from backup");
                for item in &items {
                    store.rpush(key, item).await?;
                }
                Ok(())
            }
            Some(other) => Err(wrong_kind(key, "list", &other)),
            None => Ok(()),
        }
    }

    async fn add_list_item(&self, key: &str, value: &str) -> BackupResult<()> {
        self.update(
            key,
            || DurableValue::List(Vec::new()),
            |current| {
                with_kind!(key, current, List, "list").push(value.to_string());
                Ok(())
            },
        )
    }

    async fn push_front_list_item(&self, key: &str, value: &str) -> BackupResult<()> {
        self.update(
            key,
            || DurableValue::List(Vec::new()),
            |current| {
                with_kind!(key, current, List, "list").insert(0, value.to_string());
                Ok(())
            },
        )
    }

    async fn remove_list_item(&self, key: &str, value: &str) -> BackupResult<()> {
        if self.value(key).is_none() {
            return Ok(());
        }
        self.update(
            key,
            || DurableValue::List(Vec::new()),
            |current| {
                with_kind!(key, current, List, "list").retain(|v| v != value);
                Ok(())
            },
        )
    }

    async fn update_list_item(&self, key: &str, old: &str, new: &str) -> BackupResult<()> {
        self.update(
            key,
            || DurableValue::List(Vec::new()),
            |current| {
                let list = with_kind!(key, current, List, "list");
                list.retain(|v| v != old);
                list.push(new.to_string());
                Ok(())
            },
        )
    }

    async fn delete_list(&self, key: &str) -> BackupResult<()> {
        self.remove(key);
        Ok(())
    }

    async fn restore_set(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        if store.exists(key).await? {
            return Ok(());
        }
        match self.value(key) {
            Some(DurableValue::Set(members)) => {
                debug!(key, members = members.len(), "restoring sorted set from backup");
                for (member, score) in &members {
                    store.zadd(key, member, *score).await?;
                }
                Ok(())
            }
            Some(other) => Err(wrong_kind(key, "set", &other)),
            None => Ok(()),
        }
    }

    async fn add_set_item(&self, key: &str, member: &str, score: f64) -> BackupResult<()> {
        self.update(
            key,
            || DurableValue::Set(BTreeMap::new()),
            |current| {
                with_kind!(key, current, Set, "set").insert(member.to_string(), score);
                Ok(())
            },
        )
    }

    async fn update_set_item(&self, key: &str, member: &str, score: f64) -> BackupResult<()> {
        self.add_set_item(key, member, score).await
    }

    async fn remove_set_item(&self, key: &str, member: &str) -> BackupResult<()> {
        if self.value(key).is_none() {
            return Ok(());
        }
        self.update(
            key,
            || DurableValue::Set(BTreeMap::new()),
            |current| {
                with_kind!(key, current, Set, "set").remove(member);
                Ok(())
            },
        )
    }

    async fn delete_set(&self, key: &str) -> BackupResult<()> {
        self.remove(key);
        Ok(())
    }

    async fn restore_string(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        if store.exists(key).await? {
            return Ok(());
        }
        match self.value(key) {
            Some(DurableValue::String(value)) => {
                debug!(key, "restoring string from backup");
                store.set(key, &value).await?;
                Ok(())
            }
            Some(other) => Err(wrong_kind(key, "string", &other)),
            None => Ok(()),
        }
    }

    async fn update_string(&self, key: &str, value: &str) -> BackupResult<()> {
        self.update(
            key,
            || DurableValue::String(String::new()),
            |current| {
                *with_kind!(key, current, String, "string") = value.to_string();
                Ok(())
            },
        )
    }

    async fn delete_string(&self, key: &str) -> BackupResult<()> {
        self.remove(key);
        Ok(())
    }

    async fn restore_counter(&self, store: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        if store.exists(key).await? {
            return Ok(());
        }
        match self.value(key) {
            Some(DurableValue::Counter(value)) => {
                debug!(key, value, "restoring counter from backup");
                store.set(key, &value.to_string()).await?;
                Ok(())
            }
            Some(other) => Err(wrong_kind(key, "counter", &other)),
            None => Ok(()),
        }
    }

    async fn update_counter(&self, key: &str, value: i64) -> BackupResult<()> {
        self.update(
            key,
            || DurableValue::Counter(0),
            |current| {
                let counter = with_kind!(key, current, Counter, "counter");
                // Increments can land out of order; never move backwards.
                *counter = (*counter).max(value);
                Ok(())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kvgraph_store::InMemoryStore;

    use super::*;

    /// Each test gets its own namespace; the table cache is process-wide.
    fn backup() -> InMemoryBackup {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        InMemoryBackup::new(format!("test-{}", NEXT.fetch_add(1, Ordering::Relaxed)))
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ---- Test 1: Hash update then restore into an empty store ----
    #[tokio::test]
    async fn hash_restores_into_empty_store() {
        let backup = backup();
        backup
            .update_hash("Order:1", &pairs(&[("id", "1"), ("total", "9")]))
            .await
            .unwrap();
        backup
            .update_hash_value("Order:1", "total", "12")
            .await
            .unwrap();

        let store = InMemoryStore::new();
        backup.restore_hash(&store, "Order:1").await.unwrap();
        assert_eq!(
            store.hgetall("Order:1").await.unwrap(),
            pairs(&[("id", "1"), ("total", "12")])
        );
    }

    // ---- Test 2: Restore never overwrites a live key ----
    #[tokio::test]
    async fn restore_skips_present_keys() {
        let backup = backup();
        backup
            .update_hash("Order:1", &pairs(&[("total", "1")]))
            .await
            .unwrap();
        let store = InMemoryStore::new();
        store
            .hset("Order:1", &pairs(&[("total", "2")]))
            .await
            .unwrap();
        backup.restore_hash(&store, "Order:1").await.unwrap();
        assert_eq!(
            store.hget("Order:1", "total").await.unwrap().as_deref(),
            Some("2")
        );
    }

    // ---- Test 3: List items keep push order; update moves to the tail ----
    #[tokio::test]
    async fn list_mirrors_live_semantics() {
        let backup = backup();
        for v in ["a", "b", "c"] {
            backup.add_list_item("Order:1:tags", v).await.unwrap();
        }
        backup
            .update_list_item("Order:1:tags", "a", "z")
            .await
            .unwrap();
        backup.remove_list_item("Order:1:tags", "b").await.unwrap();
        backup.push_front_list_item("Order:1:tags", "y").await.unwrap();
        assert_eq!(
            backup.value("Order:1:tags"),
            Some(DurableValue::List(vec!["y".into(), "c".into(), "z".into()]))
        );

        let store = InMemoryStore::new();
        backup.restore_list(&store, "Order:1:tags").await.unwrap();
        assert_eq!(
            store.lrange("Order:1:tags", 0, -1).await.unwrap(),
            vec!["y", "c", "z"]
        );
    }

    // ---- Test 4: Sorted set scores survive restore ----
    #[tokio::test]
    async fn set_restores_scores() {
        let backup = backup();
        backup.add_set_item("Board:1:top", "p2", 20.0).await.unwrap();
        backup.add_set_item("Board:1:top", "p1", 10.0).await.unwrap();
        backup
            .update_set_item("Board:1:top", "p2", 5.0)
            .await
            .unwrap();

        let store = InMemoryStore::new();
        backup.restore_set(&store, "Board:1:top").await.unwrap();
        assert_eq!(
            store.zrange("Board:1:top", 0, -1).await.unwrap(),
            vec![("p2".to_string(), 5.0), ("p1".to_string(), 10.0)]
        );

        backup.remove_set_item("Board:1:top", "p1").await.unwrap();
        backup.remove_set_item("Board:1:top", "p2").await.unwrap();
        assert_eq!(backup.value("Board:1:top"), None);
    }

    // ---- Test 5: Counter restores and never regresses ----
    #[tokio::test]
    async fn counter_is_monotonic() {
        let backup = backup();
        backup.update_counter("Order", 5).await.unwrap();
        backup.update_counter("Order", 3).await.unwrap();
        assert_eq!(backup.value("Order"), Some(DurableValue::Counter(5)));

        let store = InMemoryStore::new();
        backup.restore_counter(&store, "Order").await.unwrap();
        assert_eq!(store.incr("Order").await.unwrap(), 6);
    }

    // ---- Test 6: Strings and deletes ----
    #[tokio::test]
    async fn string_update_and_delete() {
        let backup = backup();
        backup.update_string("Config:main", "on").await.unwrap();
        let store = InMemoryStore::new();
        backup.restore_string(&store, "Config:main").await.unwrap();
        assert_eq!(store.get("Config:main").await.unwrap().as_deref(), Some("on"));

        backup.delete_string("Config:main").await.unwrap();
        assert_eq!(backup.value("Config:main"), None);
    }

    // ---- Test 7: Kind mismatch is an error ----
    #[tokio::test]
    async fn wrong_kind_is_reported() {
        let backup = backup();
        backup.add_list_item("Order:1", "x").await.unwrap();
        let err = backup
            .update_hash_value("Order:1", "f", "v")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackupError::WrongKind {
                expected: "hash",
                found: "list",
                ..
            }
        ));
    }

    // ---- Test 8: Same namespace shares tables ----
    #[tokio::test]
    async fn namespace_shares_table_handles() {
        let first = backup();
        let second = InMemoryBackup::new(first.namespace());
        first.update_string("Flag:1", "up").await.unwrap();
        assert_eq!(
            second.value("Flag:1"),
            Some(DurableValue::String("up".into()))
        );
    }

    // ---- Test 9: Snapshot seeds another namespace ----
    #[tokio::test]
    async fn snapshot_round_trip_through_json() {
        let source = backup();
        source
            .update_hash("Order:1", &pairs(&[("id", "1")]))
            .await
            .unwrap();
        source.add_list_item("Order:1:tags", "new").await.unwrap();
        source.update_counter("Order", 1).await.unwrap();

        let json = source.snapshot_json().unwrap();
        let target = backup();
        target.restore_snapshot_json(&json).unwrap();

        assert_eq!(target.snapshot().tables, source.snapshot().tables);
        assert_eq!(target.snapshot().tables["Order"].len(), 3);
    }
}
