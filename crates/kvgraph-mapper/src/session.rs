//! The object manager: one [`Session`] per logical unit of work.
//!
//! A session bundles the store, the backup, the converter registry, the
//! descriptor cache, and the handler set. It is cheap to clone; every tracked
//! proxy holds a clone so it can load itself on first access.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

use kvgraph_backup::{Backup, BackupResult, NoopBackup};
use kvgraph_store::{CancelToken, KeyValueStore, StoreResult};
use kvgraph_types::{ConverterRegistry, EntityDescriptor, KeyDescriptor};
use tracing::{debug, warn};

use crate::config::MapperConfig;
use crate::engine::{MaterializationEngine, Retrieved};
use crate::entity::Entity;
use crate::error::{MapperError, MapperResult};
use crate::handler::HandlerSet;
use crate::ident;
use crate::state::ProxyState;
use crate::tracked::Tracked;

/// Store structure behind a key, selecting the backup hook to call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Structure {
    Hash,
    List,
    Set,
    Counter,
}

/// Validated descriptors, built once per type.
#[derive(Default)]
struct DescriptorRegistry {
    by_type: RwLock<HashMap<TypeId, Arc<EntityDescriptor>>>,
}

impl DescriptorRegistry {
    fn get<E: Entity>(&self) -> MapperResult<Arc<EntityDescriptor>> {
        let type_id = TypeId::of::<E>();
        if let Some(found) = self.by_type.read().expect("lock poisoned").get(&type_id) {
            return Ok(Arc::clone(found));
        }
        let descriptor = Arc::new(E::describe()?);
        debug!(entity = descriptor.name(), "registered entity descriptor");
        let mut by_type = self.by_type.write().expect("lock poisoned");
        Ok(Arc::clone(by_type.entry(type_id).or_insert(descriptor)))
    }
}

struct SessionInner {
    store: Arc<dyn KeyValueStore>,
    backup: Arc<dyn Backup>,
    converters: ConverterRegistry,
    descriptors: DescriptorRegistry,
    handlers: HandlerSet,
    engine: MaterializationEngine,
    config: MapperConfig,
    cancel: CancelToken,
}

/// Handle to the store, backup, and mapping machinery.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Session with no backup and default configuration.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: Arc<dyn KeyValueStore>) -> SessionBuilder {
        SessionBuilder {
            store,
            backup: None,
            config: MapperConfig::default(),
            converters: None,
            cancel: None,
        }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.inner.store.as_ref()
    }

    pub fn config(&self) -> &MapperConfig {
        &self.inner.config
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.inner.converters
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    pub(crate) fn handlers(&self) -> &HandlerSet {
        &self.inner.handlers
    }

    pub(crate) fn engine(&self) -> &MaterializationEngine {
        &self.inner.engine
    }

    /// The validated descriptor of `E`.
    pub fn descriptor<E: Entity>(&self) -> MapperResult<Arc<EntityDescriptor>> {
        self.inner.descriptors.get::<E>()
    }

    // ---- Store and backup plumbing ----

    /// Drive one store call under the session's cancellation token.
    pub(crate) async fn run<T>(
        &self,
        call: impl Future<Output = StoreResult<T>>,
    ) -> MapperResult<T> {
        Ok(self.inner.cancel.run(call).await?)
    }

    pub(crate) fn backup(&self) -> &dyn Backup {
        self.inner.backup.as_ref()
    }

    /// Await a backup call, logging failures instead of returning them.
    pub(crate) async fn best_effort(
        &self,
        op: &'static str,
        key: &str,
        call: impl Future<Output = BackupResult<()>> + Send,
    ) {
        tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => {
                debug!(op, key, "backup call abandoned on cancellation");
            }
            result = call => {
                if let Err(error) = result {
                    warn!(op, key, %error, "backup call failed");
                }
            }
        }
    }

    /// Seed `key` from the backup if the live store is missing it.
    pub(crate) async fn restore(&self, structure: Structure, key: &str) {
        if !self.inner.config.restore_from_backup {
            return;
        }
        let store = self.store();
        let backup = self.backup();
        let call = match structure {
            Structure::Hash => backup.restore_hash(store, key),
            Structure::List => backup.restore_list(store, key),
            Structure::Set => backup.restore_set(store, key),
            Structure::Counter => backup.restore_counter(store, key),
        };
        self.best_effort("restore", key, call).await;
    }

    /// Restore the proxy's key at most once per binding.
    pub(crate) async fn restore_once(
        &self,
        state: &mut ProxyState,
        structure: Structure,
    ) -> MapperResult<()> {
        if state.take_restore() {
            let key = state.require_key()?.formatted();
            self.restore(structure, &key).await;
        }
        Ok(())
    }

    // ---- Object API ----

    /// Unloaded proxy for the stored `E` with this id. It loads itself on
    /// first access.
    pub fn reference<E: Entity>(&self, id: &str) -> MapperResult<Tracked<E>> {
        let descriptor = self.descriptor::<E>()?;
        let key = KeyDescriptor::for_type(&descriptor, id)?;
        Tracked::reference(self, key)
    }

    /// Materialize the `E` stored under `id`.
    ///
    /// A missing record is not an error: the status is
    /// [`Retrieval::NotFound`](crate::engine::Retrieval::NotFound) and the
    /// object holds default values.
    pub async fn retrieve<E: Entity>(&self, id: &str) -> MapperResult<Retrieved<E>> {
        let mut object = self.reference::<E>(id)?;
        let status = object.load().await?;
        Ok(Retrieved { object, status })
    }

    /// Persist an object: allocate its id if empty, write its scalar fields
    /// in one batch, and write containers that were built in memory.
    /// Containers already bound to the store are kept in sync by their
    /// interceptors and are not rewritten.
    pub async fn save<E: Entity>(&self, tracked: &mut Tracked<E>) -> MapperResult<KeyDescriptor> {
        let descriptor = self.descriptor::<E>()?;
        if let Some(key) = tracked.state().key() {
            if !tracked.state().is_processed() {
                debug!(key = %key, "skipping save of unloaded proxy");
                return Ok(key.clone());
            }
        }
        let id = match tracked.stored_id(&descriptor) {
            Some(id) => id,
            None => {
                let value = ident::allocate(self, &descriptor).await?;
                let id = value
                    .identifier_text()
                    .ok_or_else(|| MapperError::Detached(descriptor.name().to_string()))?;
                tracked
                    .entity_mut()
                    .put(descriptor.identifier().name, value)?;
                id
            }
        };
        let key = KeyDescriptor::for_type(&descriptor, &id)?;
        if let Some(bound) = tracked.state().key() {
            if bound != &key {
                return Err(MapperError::ImmutableIdentifier {
                    key: bound.formatted(),
                });
            }
        }
        tracked.state_mut().attach(self, key.clone(), None, None, true);
        self.engine().save(self, tracked).await?;
        Ok(key)
    }

    /// Wrap and save a new object.
    pub async fn create<E: Entity>(&self, entity: E) -> MapperResult<Tracked<E>> {
        let mut tracked = Tracked::new(entity);
        self.save(&mut tracked).await?;
        Ok(tracked)
    }

    /// Delete an object's record and container keys, cascading into owned
    /// entities whose field allows it.
    pub async fn delete<E: Entity>(&self, tracked: &mut Tracked<E>) -> MapperResult<bool> {
        if tracked.state().key().is_none() {
            return Ok(false);
        }
        self.engine().delete(self, tracked).await
    }

    /// Delete the `E` stored under `id`.
    pub async fn delete_by_id<E: Entity>(&self, id: &str) -> MapperResult<bool> {
        let mut tracked = self.reference::<E>(id)?;
        self.delete(&mut tracked).await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    store: Arc<dyn KeyValueStore>,
    backup: Option<Arc<dyn Backup>>,
    config: MapperConfig,
    converters: Option<ConverterRegistry>,
    cancel: Option<CancelToken>,
}

impl SessionBuilder {
    pub fn backup(mut self, backup: Arc<dyn Backup>) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom registry instead of the built-in converters.
    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = Some(converters);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Session {
        let converters = self
            .converters
            .unwrap_or_else(|| ConverterRegistry::with_strict_uuid(self.config.strict_uuid));
        Session {
            inner: Arc::new(SessionInner {
                store: self.store,
                backup: self.backup.unwrap_or_else(|| Arc::new(NoopBackup)),
                converters,
                descriptors: DescriptorRegistry::default(),
                handlers: HandlerSet::standard(),
                engine: MaterializationEngine,
                config: self.config,
                cancel: self.cancel.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};

    use kvgraph_store::{InMemoryStore, KeyValueStore, Value};
    use kvgraph_types::TypeError;

    use super::*;
    use crate::fixtures::{Board, Order, OrderLine, RecordingBackup, Score};
    use crate::ident::counter_key;

    fn setup() -> (Arc<InMemoryStore>, Session) {
        let store = Arc::new(InMemoryStore::new());
        let session = Session::new(store.clone());
        (store, session)
    }

    // ---- Test 1: Identifier allocation ----

    #[tokio::test]
    async fn ids_are_allocated_sequentially() {
        let (store, session) = setup();
        for expected in ["1", "2", "3"] {
            let order = session.create(Order::default()).await.unwrap();
            assert_eq!(order.id(), Some(expected));
            assert_eq!(order.peek().id, expected);
        }
        let counter = counter_key(&session.descriptor::<Order>().unwrap()).unwrap();
        assert_eq!(counter, "Order");
        assert_eq!(store.get(&counter).await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_get_unique_ids() {
        let (_store, session) = setup();
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move {
                    let line = session.create(OrderLine::default()).await.unwrap();
                    line.id().unwrap().to_string()
                })
            })
            .collect();
        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap());
        }
        assert_eq!(ids.len(), 32);
    }

    #[tokio::test]
    async fn explicit_ids_are_kept() {
        let (store, session) = setup();
        let order = session
            .create(Order {
                id: "A-7".into(),
                ..Order::default()
            })
            .await
            .unwrap();
        assert_eq!(order.key().unwrap().formatted(), "Order:A-7");
        assert!(store.get("Order").await.unwrap().is_none());
    }

    // ---- Test 2: Saving ----

    #[tokio::test]
    async fn identifier_cannot_change_after_binding() {
        let (_store, session) = setup();
        let mut order = session.create(Order::default()).await.unwrap();
        order.get_mut().await.unwrap().id = "9".into();
        let err = session.save(&mut order).await.unwrap_err();
        assert!(matches!(err, MapperError::ImmutableIdentifier { .. }));
    }

    #[tokio::test]
    async fn saving_an_unloaded_reference_writes_nothing() {
        let (store, session) = setup();
        session.create(Order::default()).await.unwrap();
        let writes = store.command_count("hset");
        let mut order = session.reference::<Order>("1").unwrap();
        let key = session.save(&mut order).await.unwrap();
        assert_eq!(key.formatted(), "Order:1");
        assert_eq!(store.command_count("hset"), writes);
    }

    #[tokio::test]
    async fn save_after_get_mut_writes_scalars() {
        let (store, session) = setup();
        let mut order = session.create(Order::default()).await.unwrap();
        order.get_mut().await.unwrap().total = 40;
        session.save(&mut order).await.unwrap();
        assert_eq!(
            store.hget("Order:1", "total").await.unwrap().as_deref(),
            Some("40")
        );
    }

    #[tokio::test]
    async fn deleting_a_detached_object_is_a_no_op() {
        let (_store, session) = setup();
        let mut order = Tracked::new(Order::default());
        assert!(!session.delete(&mut order).await.unwrap());
    }

    // ---- Test 3: Conversion failures ----

    #[tokio::test]
    async fn non_numeric_text_fails_with_key_and_field() {
        let (store, session) = setup();
        store
            .hset(
                "Order:9",
                &[
                    ("id".to_string(), "9".to_string()),
                    ("total".to_string(), "lots".to_string()),
                ],
            )
            .await
            .unwrap();
        let err = session.retrieve::<Order>("9").await.unwrap_err();
        match err {
            MapperError::Conversion { key, field, source } => {
                assert_eq!(key, "Order:9");
                assert_eq!(field, "total");
                assert!(matches!(source, TypeError::Conversion { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // ---- Test 4: Backup hooks ----

    fn with_backup(
        backup: fn(Arc<InMemoryStore>) -> RecordingBackup,
    ) -> (Arc<InMemoryStore>, Arc<RecordingBackup>, Session) {
        let store = Arc::new(InMemoryStore::new());
        let backup = Arc::new(backup(store.clone()));
        let session = Session::builder(store.clone()).backup(backup.clone()).build();
        (store, backup, session)
    }

    fn score(points: i64) -> Tracked<Score> {
        Tracked::new(Score {
            points,
            ..Score::default()
        })
    }

    #[tokio::test]
    async fn failing_backup_never_blocks_mutations() {
        let (store, backup, session) = with_backup(RecordingBackup::failing);
        let mut order = session.create(Order::default()).await.unwrap();
        assert!(order.set_field("customer", "grace").await.unwrap());
        let loaded = order.get_mut().await.unwrap();
        loaded.tags.push("b".to_string()).await.unwrap();
        loaded.tags.push_front("a".to_string()).await.unwrap();
        loaded.attributes.insert("weight".into(), 3).await.unwrap();
        let mut board = session.create(Board::default()).await.unwrap();
        let scores = &mut board.get_mut().await.unwrap().scores;
        scores.insert(score(4)).await.unwrap();

        assert!(!backup.calls().is_empty());
        assert_eq!(
            store.hget("Order:1", "customer").await.unwrap().as_deref(),
            Some("grace")
        );
        assert_eq!(store.lrange("Order:1:tags", 0, -1).await.unwrap(), ["a", "b"]);
        assert_eq!(
            store.hget("Order:1:attributes", "weight").await.unwrap().as_deref(),
            Some("3")
        );
        assert_eq!(
            store.zrange("Board:1:scores", 0, -1).await.unwrap(),
            [("Score:1".to_string(), 4.0)]
        );
    }

    #[tokio::test]
    async fn backup_hears_each_mutation_before_the_store() {
        let (_store, backup, session) = with_backup(RecordingBackup::new);
        let mut order = session.create(Order::default()).await.unwrap();
        let mut board = session.create(Board::default()).await.unwrap();
        backup.reset();

        order.set_field("customer", "ada").await.unwrap();
        let loaded = order.get_mut().await.unwrap();
        loaded.tags.push("b".to_string()).await.unwrap();
        loaded.tags.push_front("a".to_string()).await.unwrap();
        loaded.attributes.insert("weight".into(), 3).await.unwrap();
        let scores = &mut board.get_mut().await.unwrap().scores;
        scores.insert(score(4)).await.unwrap();

        let hash = backup.calls_to("update_hash_value");
        assert_eq!(hash.len(), 2);
        assert_eq!(hash[0].key, "Order:1");
        let Some(Value::Hash(fields)) = &hash[0].live else {
            panic!("order record missing: {:?}", hash[0]);
        };
        assert_eq!(fields.get("customer").map(String::as_str), Some(""));
        assert_eq!(hash[1].key, "Order:1:attributes");
        assert_eq!(hash[1].live, None);

        let appended = backup.calls_to("add_list_item");
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].live, None);
        let prepended = backup.calls_to("push_front_list_item");
        assert_eq!(prepended.len(), 1);
        assert_eq!(
            prepended[0].live,
            Some(Value::List(VecDeque::from(vec!["b".to_string()])))
        );
        assert!(backup.calls_to("delete_list").is_empty());

        let added = backup.calls_to("add_set_item");
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].key, "Board:1:scores");
        assert_eq!(added[0].live, None);
    }
}
