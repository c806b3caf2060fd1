//! Entity types and a recording backup shared by the unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kvgraph_backup::{Backup, BackupError, BackupResult};
use kvgraph_store::{InMemoryStore, KeyValueStore, Value};
use kvgraph_types::{ElementKind, EntityDescriptor, ScalarType, ScalarValue, TypeResult};
use uuid::Uuid;

use crate::entity::{Entity, Member, Record};
use crate::tracked::{Tracked, TrackedList, TrackedMap, TrackedSet};

#[derive(Debug, Default)]
pub struct Order {
    pub id: String,
    pub customer: String,
    pub total: i64,
    pub lines: TrackedList<Tracked<OrderLine>>,
    pub related: TrackedList<Tracked<OrderLine>>,
    pub tags: TrackedList<String>,
    pub attributes: TrackedMap<String, i64>,
    pub notes: TrackedList<String>,
    pub address: Tracked<Address>,
}

impl Record for Order {
    fn get(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "id" => Some(self.id.clone().into()),
            "customer" => Some(self.customer.clone().into()),
            "total" => Some(self.total.into()),
            _ => None,
        }
    }

    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "customer" => self.customer = value.try_into()?,
            "total" => self.total = value.try_into()?,
            _ => {}
        }
        Ok(())
    }

    fn members(&mut self) -> Vec<(&'static str, &mut dyn Member)> {
        vec![
            ("lines", &mut self.lines as &mut dyn Member),
            ("related", &mut self.related as &mut dyn Member),
            ("tags", &mut self.tags as &mut dyn Member),
            ("attributes", &mut self.attributes as &mut dyn Member),
            ("notes", &mut self.notes as &mut dyn Member),
            ("address", &mut self.address as &mut dyn Member),
        ]
    }
}

impl Entity for Order {
    fn describe() -> TypeResult<EntityDescriptor> {
        EntityDescriptor::builder("Order")
            .identifier("id", ScalarType::Text)
            .scalar("customer", ScalarType::Text)
            .scalar("total", ScalarType::Long)
            .list("lines", ElementKind::Entity("OrderLine"))
            .list("related", ElementKind::Entity("OrderLine"))
            .no_cascade()
            .list("tags", ElementKind::Scalar(ScalarType::Text))
            .map("attributes", ScalarType::Text, ElementKind::Scalar(ScalarType::Long))
            .list("notes", ElementKind::Scalar(ScalarType::Text))
            .lazy()
            .sub_record("address", "Address")
            .build()
    }
}

#[derive(Debug, Default)]
pub struct OrderLine {
    pub id: String,
    pub sku: String,
    pub quantity: i32,
}

impl Record for OrderLine {
    fn get(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "id" => Some(self.id.clone().into()),
            "sku" => Some(self.sku.clone().into()),
            "quantity" => Some(self.quantity.into()),
            _ => None,
        }
    }

    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "sku" => self.sku = value.try_into()?,
            "quantity" => self.quantity = value.try_into()?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for OrderLine {
    fn describe() -> TypeResult<EntityDescriptor> {
        EntityDescriptor::builder("OrderLine")
            .identifier("id", ScalarType::Text)
            .scalar("sku", ScalarType::Text)
            .scalar("quantity", ScalarType::Integer)
            .build()
    }
}

/// Sub-record stored under its own prefix with the owning order's id.
#[derive(Debug, Default)]
pub struct Address {
    pub id: String,
    pub city: String,
}

impl Record for Address {
    fn get(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "id" => Some(self.id.clone().into()),
            "city" => Some(self.city.clone().into()),
            _ => None,
        }
    }

    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "city" => self.city = value.try_into()?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Address {
    fn describe() -> TypeResult<EntityDescriptor> {
        EntityDescriptor::builder("Address")
            .identifier("id", ScalarType::Text)
            .scalar("city", ScalarType::Text)
            .build()
    }
}

/// UUID-keyed entity.
#[derive(Debug, Default)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub listed: DateTime<Utc>,
}

impl Record for Product {
    fn get(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.clone().into()),
            "listed" => Some(self.listed.into()),
            _ => None,
        }
    }

    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "name" => self.name = value.try_into()?,
            "listed" => self.listed = value.try_into()?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Product {
    fn describe() -> TypeResult<EntityDescriptor> {
        EntityDescriptor::builder("Product")
            .identifier("id", ScalarType::Uuid)
            .scalar("name", ScalarType::Text)
            .scalar("listed", ScalarType::DateTime)
            .build()
    }
}

#[derive(Debug, Default)]
pub struct Board {
    pub id: String,
    pub title: String,
    pub scores: TrackedSet<Score>,
}

impl Record for Board {
    fn get(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "id" => Some(self.id.clone().into()),
            "title" => Some(self.title.clone().into()),
            _ => None,
        }
    }

    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "title" => self.title = value.try_into()?,
            _ => {}
        }
        Ok(())
    }

    fn members(&mut self) -> Vec<(&'static str, &mut dyn Member)> {
        vec![("scores", &mut self.scores as &mut dyn Member)]
    }
}

impl Entity for Board {
    fn describe() -> TypeResult<EntityDescriptor> {
        EntityDescriptor::builder("Board")
            .identifier("id", ScalarType::Text)
            .scalar("title", ScalarType::Text)
            .ordered_set("scores", "Score")
            .build()
    }
}

#[derive(Debug, Default)]
pub struct Score {
    pub id: String,
    pub player: String,
    pub points: i64,
}

impl Record for Score {
    fn get(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "id" => Some(self.id.clone().into()),
            "player" => Some(self.player.clone().into()),
            "points" => Some(self.points.into()),
            _ => None,
        }
    }

    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "player" => self.player = value.try_into()?,
            "points" => self.points = value.try_into()?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Score {
    fn describe() -> TypeResult<EntityDescriptor> {
        EntityDescriptor::builder("Score")
            .identifier("id", ScalarType::Text)
            .scalar("player", ScalarType::Text)
            .order_key("points", ScalarType::Long)
            .build()
    }
}

/// Entity without an order key.
#[derive(Debug, Default)]
pub struct Tag {
    pub id: String,
    pub label: String,
}

impl Record for Tag {
    fn get(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "id" => Some(self.id.clone().into()),
            "label" => Some(self.label.clone().into()),
            _ => None,
        }
    }

    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "label" => self.label = value.try_into()?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Tag {
    fn describe() -> TypeResult<EntityDescriptor> {
        EntityDescriptor::builder("Tag")
            .identifier("id", ScalarType::Text)
            .scalar("label", ScalarType::Text)
            .build()
    }
}

/// One backup hook call and the live value of its key at that moment.
#[derive(Clone, Debug, PartialEq)]
pub struct BackupCall {
    pub op: &'static str,
    pub key: String,
    pub live: Option<Value>,
}

/// Backup that records every hook call against the live store, and fails
/// all of them when built with `failing`.
pub struct RecordingBackup {
    store: Arc<InMemoryStore>,
    fail: bool,
    calls: Mutex<Vec<BackupCall>>,
}

impl RecordingBackup {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(store: Arc<InMemoryStore>) -> Self {
        Self {
            fail: true,
            ..Self::new(store)
        }
    }

    pub fn calls(&self) -> Vec<BackupCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls to `op`, in order.
    pub fn calls_to(&self, op: &str) -> Vec<BackupCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn note(&self, op: &'static str, key: &str) -> BackupResult<()> {
        self.calls.lock().unwrap().push(BackupCall {
            op,
            key: key.to_string(),
            live: self.store.value(key),
        });
        if self.fail {
            return Err(BackupError::WrongKind {
                key: key.to_string(),
                expected: "anything",
                found: "an outage",
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Backup for RecordingBackup {
    async fn restore_hash(&self, _: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        self.note("restore_hash", key)
    }
    async fn update_hash(&self, key: &str, _: &[(String, String)]) -> BackupResult<()> {
        self.note("update_hash", key)
    }
    async fn update_hash_value(&self, key: &str, _: &str, _: &str) -> BackupResult<()> {
        self.note("update_hash_value", key)
    }
    async fn delete_hash(&self, key: &str) -> BackupResult<()> {
        self.note("delete_hash", key)
    }
    async fn delete_hash_value(&self, key: &str, _: &str) -> BackupResult<()> {
        self.note("delete_hash_value", key)
    }
    async fn restore_list(&self, _: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        self.note("restore_list", key)
    }
    async fn add_list_item(&self, key: &str, _: &str) -> BackupResult<()> {
        self.note("add_list_item", key)
    }
    async fn push_front_list_item(&self, key: &str, _: &str) -> BackupResult<()> {
        self.note("push_front_list_item", key)
    }
    async fn remove_list_item(&self, key: &str, _: &str) -> BackupResult<()> {
        self.note("remove_list_item", key)
    }
    async fn update_list_item(&self, key: &str, _: &str, _: &str) -> BackupResult<()> {
        self.note("update_list_item", key)
    }
    async fn delete_list(&self, key: &str) -> BackupResult<()> {
        self.note("delete_list", key)
    }
    async fn restore_set(&self, _: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        self.note("restore_set", key)
    }
    async fn add_set_item(&self, key: &str, _: &str, _: f64) -> BackupResult<()> {
        self.note("add_set_item", key)
    }
    async fn update_set_item(&self, key: &str, _: &str, _: f64) -> BackupResult<()> {
        self.note("update_set_item", key)
    }
    async fn remove_set_item(&self, key: &str, _: &str) -> BackupResult<()> {
        self.note("remove_set_item", key)
    }
    async fn delete_set(&self, key: &str) -> BackupResult<()> {
        self.note("delete_set", key)
    }
    async fn restore_string(&self, _: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        self.note("restore_string", key)
    }
    async fn update_string(&self, key: &str, _: &str) -> BackupResult<()> {
        self.note("update_string", key)
    }
    async fn delete_string(&self, key: &str) -> BackupResult<()> {
        self.note("delete_string", key)
    }
    async fn restore_counter(&self, _: &dyn KeyValueStore, key: &str) -> BackupResult<()> {
        self.note("restore_counter", key)
    }
    async fn update_counter(&self, key: &str, _: i64) -> BackupResult<()> {
        self.note("update_counter", key)
    }
}
