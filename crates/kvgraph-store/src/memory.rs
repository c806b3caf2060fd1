use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::traits::KeyValueStore;

/// A stored value: one of the store's native structures.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Hash(BTreeMap<String, String>),
    List(VecDeque<String>),
    /// Members kept sorted by `(score, member)`.
    SortedSet(Vec<(String, f64)>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Hash(_) => "hash",
            Value::List(_) => "list",
            Value::SortedSet(_) => "zset",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
        }
    }
}

/// In-memory, `HashMap`-based key-value store.
///
/// Intended for tests, demos, and embedding. Every command takes the lock
/// once, so each command is atomic. Empty hashes, lists, and sorted sets
/// are removed, as in Redis. The store also counts commands by name so
/// tests can assert that a write was (or was not) issued.
pub struct InMemoryStore {
    data: RwLock<HashMap<String, Value>>,
    commands: Mutex<HashMap<&'static str, u64>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            commands: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.read().expect("lock poisoned").is_empty()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let data = self.data.read().expect("lock poisoned");
        let mut keys: Vec<String> = data.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// A copy of the value at `key`.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.data.read().expect("lock poisoned").get(key).cloned()
    }

    /// How many times the named command (e.g. `"hset"`) has run.
    pub fn command_count(&self, command: &str) -> u64 {
        self.commands
            .lock()
            .expect("lock poisoned")
            .get(command)
            .copied()
            .unwrap_or(0)
    }

    /// Remove all keys and reset command counts.
    pub fn clear(&self) {
        self.data.write().expect("lock poisoned").clear();
        self.commands.lock().expect("lock poisoned").clear();
    }

    fn record(&self, command: &'static str) {
        tracing::trace!(command, "store command");
        *self
            .commands
            .lock()
            .expect("lock poisoned")
            .entry(command)
            .or_insert(0) += 1;
    }

    fn read<T>(
        &self,
        command: &'static str,
        f: impl FnOnce(&HashMap<String, Value>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.record(command);
        let data = self.data.read().expect("lock poisoned");
        f(&data)
    }

    fn write<T>(
        &self,
        command: &'static str,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Value>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.record(command);
        let mut data = self.data.write().expect("lock poisoned");
        let result = f(&mut data);
        if data.get(key).is_some_and(Value::is_empty) {
            data.remove(key);
        }
        result
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("key_count", &self.len())
            .finish()
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

macro_rules! typed {
    ($data:expr, $key:expr, $variant:ident, $name:literal) => {
        match $data.get($key) {
            None => None,
            Some(Value::$variant(inner)) => Some(inner),
            Some(other) => return Err(wrong_type($key, $name, other)),
        }
    };
}

macro_rules! typed_mut {
    ($data:expr, $key:expr, $variant:ident, $name:literal, $default:expr) => {
        match $data
            .entry($key.to_string())
            .or_insert_with(|| Value::$variant($default))
        {
            Value::$variant(inner) => inner,
            other => return Err(wrong_type($key, $name, other)),
        }
    };
}

/// Resolve inclusive, possibly negative, range bounds against `len`.
fn range_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.write("incr", key, |data| {
            let entry = data
                .entry(key.to_string())
                .or_insert_with(|| Value::String("0".into()));
            let Value::String(current) = entry else {
                return Err(wrong_type(key, "string", entry));
            };
            let next = current
                .parse::<i64>()
                .map_err(|_| StoreError::NotAnInteger {
                    key: key.to_string(),
                })?
                + 1;
            *current = next.to_string();
            Ok(next)
        })
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.read("get", |data| Ok(typed!(data, key, String, "string").cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.write("set", key, |data| {
            data.insert(key.to_string(), Value::String(value.to_string()));
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.write("del", key, |data| Ok(data.remove(key).is_some()))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.read("exists", |data| Ok(data.contains_key(key)))
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        self.write("hset", key, |data| {
            let hash = typed_mut!(data, key, Hash, "hash", BTreeMap::new());
            for (field, value) in fields {
                hash.insert(field.clone(), value.clone());
            }
            Ok(())
        })
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.read("hget", |data| {
            Ok(typed!(data, key, Hash, "hash").and_then(|h| h.get(field).cloned()))
        })
    }

    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        self.read("hgetall", |data| {
            Ok(typed!(data, key, Hash, "hash")
                .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default())
        })
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.write("hdel", key, |data| match data.get_mut(key) {
            None => Ok(false),
            Some(Value::Hash(h)) => Ok(h.remove(field).is_some()),
            Some(other) => Err(wrong_type(key, "hash", other)),
        })
    }

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.read("hexists", |data| {
            Ok(typed!(data, key, Hash, "hash").is_some_and(|h| h.contains_key(field)))
        })
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.write("lpush", key, |data| {
            let list = typed_mut!(data, key, List, "list", VecDeque::new());
            list.push_front(value.to_string());
            Ok(list.len() as u64)
        })
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.write("rpush", key, |data| {
            let list = typed_mut!(data, key, List, "list", VecDeque::new());
            list.push_back(value.to_string());
            Ok(list.len() as u64)
        })
    }

    async fn rpoplpush(&self, source: &str, destination: &str) -> StoreResult<Option<String>> {
        self.record("rpoplpush");
        let mut data = self.data.write().expect("lock poisoned");
        if let Some(other) = data
            .get(destination)
            .filter(|v| !matches!(v, Value::List(_)))
        {
            return Err(wrong_type(destination, "list", other));
        }
        let popped = match data.get_mut(source) {
            None => return Ok(None),
            Some(Value::List(list)) => list.pop_back(),
            Some(other) => return Err(wrong_type(source, "list", other)),
        };
        if data.get(source).is_some_and(Value::is_empty) {
            data.remove(source);
        }
        if let Some(value) = &popped {
            if let Value::List(list) = data
                .entry(destination.to_string())
                .or_insert_with(|| Value::List(VecDeque::new()))
            {
                list.push_front(value.clone());
            }
        }
        Ok(popped)
    }

    async fn lrem(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.write("lrem", key, |data| match data.get_mut(key) {
            None => Ok(0),
            Some(Value::List(list)) => {
                let before = list.len();
                list.retain(|v| v != value);
                Ok((before - list.len()) as u64)
            }
            Some(other) => Err(wrong_type(key, "list", other)),
        })
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.read("lrange", |data| {
            let Some(list) = typed!(data, key, List, "list") else {
                return Ok(Vec::new());
            };
            Ok(match range_bounds(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            })
        })
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<bool> {
        self.write("zadd", key, |data| {
            let set = typed_mut!(data, key, SortedSet, "zset", Vec::new());
            let existed = match set.iter().position(|(m, _)| m == member) {
                Some(index) => {
                    set.remove(index);
                    true
                }
                None => false,
            };
            let at = set.partition_point(|(m, s)| (*s, m.as_str()) < (score, member));
            set.insert(at, (member.to_string(), score));
            Ok(!existed)
        })
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.write("zrem", key, |data| match data.get_mut(key) {
            None => Ok(false),
            Some(Value::SortedSet(set)) => {
                let before = set.len();
                set.retain(|(m, _)| m != member);
                Ok(set.len() != before)
            }
            Some(other) => Err(wrong_type(key, "zset", other)),
        })
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<(String, f64)>> {
        self.read("zrange", |data| {
            let Some(set) = typed!(data, key, SortedSet, "zset") else {
                return Ok(Vec::new());
            };
            Ok(match range_bounds(set.len(), start, stop) {
                Some((from, to)) => set[from..=to].to_vec(),
                None => Vec::new(),
            })
        })
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>> {
        self.read("zrangebyscore", |data| {
            Ok(typed!(data, key, SortedSet, "zset")
                .map(|set| {
                    set.iter()
                        .filter(|(_, s)| *s >= min && *s <= max)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    // -----------------------------------------------------------------------
    // Strings and counters
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn set_get_delete() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.exists("k").await.unwrap());
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn incr_starts_at_one() {
        let store = InMemoryStore::new();
        assert_eq!(store.incr("Order").await.unwrap(), 1);
        assert_eq!(store.incr("Order").await.unwrap(), 2);
        assert_eq!(store.get("Order").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn incr_on_text_fails() {
        let store = InMemoryStore::new();
        store.set("k", "abc").await.unwrap();
        assert!(matches!(
            store.incr("k").await,
            Err(StoreError::NotAnInteger { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_never_collide() {
        let store = Arc::new(InMemoryStore::new());
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.push(store.incr("counter").await.unwrap());
                }
                seen
            }));
        }
        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert_eq!(all.last(), Some(&400));
    }

    // -----------------------------------------------------------------------
    // Hashes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn hash_commands() {
        let store = InMemoryStore::new();
        store
            .hset(
                "Order:1",
                &[("b".into(), "2".into()), ("a".into(), "1".into())],
            )
            .await
            .unwrap();
        assert_eq!(store.hget("Order:1", "a").await.unwrap().as_deref(), Some("1"));
        assert!(store.hexists("Order:1", "b").await.unwrap());
        assert_eq!(
            store.hgetall("Order:1").await.unwrap(),
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
        assert!(store.hdel("Order:1", "a").await.unwrap());
        assert!(store.hdel("Order:1", "b").await.unwrap());
        assert!(!store.exists("Order:1").await.unwrap());
        assert_eq!(store.command_count("hset"), 1);
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let store = InMemoryStore::new();
        store.rpush("k", "a").await.unwrap();
        assert!(matches!(
            store.hget("k", "f").await,
            Err(StoreError::WrongType {
                expected: "hash",
                found: "list",
                ..
            })
        ));
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn push_remove_range() {
        let store = InMemoryStore::new();
        for v in ["a", "b", "c"] {
            store.rpush("l", v).await.unwrap();
        }
        store.lpush("l", "z").await.unwrap();
        store.rpush("l", "b").await.unwrap();
        assert_eq!(store.lrem("l", "b").await.unwrap(), 2);
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec!["z", "a", "c"]);
        assert_eq!(store.lrange("l", -2, -1).await.unwrap(), vec!["a", "c"]);
        assert_eq!(store.lrange("l", 5, 10).await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn rpoplpush_moves_tail_to_head() {
        let store = InMemoryStore::new();
        store.rpush("src", "a").await.unwrap();
        store.rpush("src", "b").await.unwrap();
        store.rpush("dst", "x").await.unwrap();
        assert_eq!(
            store.rpoplpush("src", "dst").await.unwrap().as_deref(),
            Some("b")
        );
        assert_eq!(store.lrange("dst", 0, -1).await.unwrap(), vec!["b", "x"]);
        assert_eq!(store.rpoplpush("missing", "dst").await.unwrap(), None);
    }

    // -----------------------------------------------------------------------
    // Sorted sets
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn sorted_set_orders_by_score() {
        let store = InMemoryStore::new();
        assert!(store.zadd("z", "five", 5.0).await.unwrap());
        assert!(store.zadd("z", "one", 1.0).await.unwrap());
        assert!(store.zadd("z", "three", 3.0).await.unwrap());
        let members: Vec<_> = store
            .zrange("z", 0, -1)
            .await
            .unwrap()
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        assert_eq!(members, vec!["one", "three", "five"]);

        assert!(!store.zadd("z", "one", 10.0).await.unwrap());
        let by_score = store.zrange_by_score("z", 2.0, 5.0).await.unwrap();
        assert_eq!(
            by_score,
            vec![("three".to_string(), 3.0), ("five".to_string(), 5.0)]
        );
        assert!(store.zrem("z", "three").await.unwrap());
        assert!(!store.zrem("z", "three").await.unwrap());
    }
}
