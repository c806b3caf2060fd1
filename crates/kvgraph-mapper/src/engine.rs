//! Recursive materialization, save, and delete over an entity graph.
//!
//! The engine walks an entity's members through [`Member`] and dispatches
//! each one to its capability handler. Each pass over a proxy runs under its
//! `processing` flag, so interceptors triggered while the engine populates a
//! container pass straight through and a proxy reached twice in one walk is
//! visited once.

use std::future::Future;
use std::pin::Pin;

use kvgraph_types::Capability;
use tracing::debug;

use crate::entity::{Entity, Member, Owner};
use crate::error::MapperResult;
use crate::session::Session;
use crate::tracked::Tracked;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retrieval {
    Found,
    NotFound,
}

impl Retrieval {
    pub fn is_found(self) -> bool {
        self == Retrieval::Found
    }
}

impl From<bool> for Retrieval {
    fn from(found: bool) -> Self {
        if found {
            Retrieval::Found
        } else {
            Retrieval::NotFound
        }
    }
}

/// A retrieved object with its status.
#[derive(Debug)]
pub struct Retrieved<E: Entity> {
    pub object: Tracked<E>,
    pub status: Retrieval,
}

#[derive(Debug, Default)]
pub struct MaterializationEngine;

impl MaterializationEngine {
    /// Populate `member` from the store. Entity members also materialize
    /// their non-lazy fields. A proxy that is already loaded, or is being
    /// loaded further up the stack, reports its last status without I/O.
    pub fn retrieve<'a>(
        &'a self,
        session: &'a Session,
        member: &'a mut dyn Member,
    ) -> BoxFuture<'a, MapperResult<Retrieval>> {
        Box::pin(async move {
            if member.state().is_processed() {
                return Ok(Retrieval::from(member.state().was_found()));
            }
            let Some(guard) = member.state().begin() else {
                return Ok(Retrieval::from(member.state().was_found()));
            };
            let handler = session.handlers().resolve(member)?;
            let status = handler.read(session, member).await?;
            if member.capability() == Capability::Entity && status.is_found() {
                self.retrieve_members(session, member).await?;
            }
            if let Some(key) = member.state().key() {
                debug!(key = %key, ?status, "materialized");
            }
            guard.complete(status.is_found());
            Ok(status)
        })
    }

    async fn retrieve_members(
        &self,
        session: &Session,
        member: &mut dyn Member,
    ) -> MapperResult<()> {
        let key = member.state().require_key()?.clone();
        let Some((record, descriptor)) = member.record(session)? else {
            return Ok(());
        };
        for (name, child) in record.members() {
            let field = descriptor.require_field(name)?;
            let owner = Owner {
                key: &key,
                descriptor: &descriptor,
                field,
            };
            child.attach(session, owner, false)?;
            if field.lazy || child.state().is_processed() {
                continue;
            }
            self.retrieve(session, child).await?;
        }
        Ok(())
    }

    /// Write `member` and, for entities, the members that need it: fresh
    /// containers and sub-records, plus sub-records already loaded.
    /// Containers bound earlier were kept in sync by their interceptors.
    pub fn save<'a>(
        &'a self,
        session: &'a Session,
        member: &'a mut dyn Member,
    ) -> BoxFuture<'a, MapperResult<()>> {
        Box::pin(async move {
            let Some(_guard) = member.state().begin() else {
                return Ok(());
            };
            let handler = session.handlers().resolve(member)?;
            handler.save(session, member).await?;
            if member.capability() == Capability::Entity {
                self.save_members(session, member).await?;
            }
            Ok(())
        })
    }

    async fn save_members(
        &self,
        session: &Session,
        member: &mut dyn Member,
    ) -> MapperResult<()> {
        let key = member.state().require_key()?.clone();
        let Some((record, descriptor)) = member.record(session)? else {
            return Ok(());
        };
        for (name, child) in record.members() {
            let field = descriptor.require_field(name)?;
            let owner = Owner {
                key: &key,
                descriptor: &descriptor,
                field,
            };
            let fresh = child.attach(session, owner, true)?;
            let write = match child.capability() {
                Capability::Entity => fresh || child.state().is_processed(),
                _ => fresh,
            };
            if write {
                self.save(session, child).await?;
            }
        }
        Ok(())
    }

    /// Delete `member` from the store. Entities delete their record and
    /// then every member, skipping sub-records whose field turns cascading
    /// off. Containers delete their entity elements first when the field
    /// cascades. Afterwards the proxy is loaded and empty.
    pub fn delete<'a>(
        &'a self,
        session: &'a Session,
        member: &'a mut dyn Member,
    ) -> BoxFuture<'a, MapperResult<bool>> {
        Box::pin(async move {
            self.retrieve(session, member).await?;
            let Some(guard) = member.state().begin() else {
                return Ok(false);
            };
            let handler = session.handlers().resolve(member)?;
            let removed = if member.capability() == Capability::Entity {
                let removed = handler.delete(session, member).await?;
                self.delete_members(session, member).await?;
                removed
            } else {
                let cascade = member.state().field().map_or(true, |f| f.cascade);
                if cascade {
                    member.discard_elements(session).await?;
                }
                handler.delete(session, member).await?
            };
            member.clear();
            member.state().mark_deleted();
            if let Some(key) = member.state().key() {
                debug!(key = %key, removed, "deleted");
            }
            drop(guard);
            Ok(removed)
        })
    }

    async fn delete_members(
        &self,
        session: &Session,
        member: &mut dyn Member,
    ) -> MapperResult<()> {
        let key = member.state().require_key()?.clone();
        let Some((record, descriptor)) = member.record(session)? else {
            return Ok(());
        };
        for (name, child) in record.members() {
            let field = descriptor.require_field(name)?;
            let owner = Owner {
                key: &key,
                descriptor: &descriptor,
                field,
            };
            child.attach(session, owner, false)?;
            if child.capability() == Capability::Entity && !field.cascade {
                continue;
            }
            self.delete(session, child).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kvgraph_backup::InMemoryBackup;
    use kvgraph_store::{CancelToken, InMemoryStore, KeyValueStore};

    use super::*;
    use crate::error::MapperError;
    use crate::fixtures::{Order, OrderLine};
    use crate::state::Phase;

    fn setup() -> (Arc<InMemoryStore>, Session) {
        let store = Arc::new(InMemoryStore::new());
        let session = Session::new(store.clone());
        (store, session)
    }

    fn line(sku: &str) -> Tracked<OrderLine> {
        Tracked::new(OrderLine {
            sku: sku.into(),
            ..OrderLine::default()
        })
    }

    // ---- Test 1: Eager and lazy members ----

    #[tokio::test]
    async fn lazy_members_load_on_first_access() {
        let (store, session) = setup();
        let order = Order {
            tags: vec!["x".to_string()].into(),
            notes: vec!["call first".to_string()].into(),
            ..Order::default()
        };
        session.create(order).await.unwrap();

        let reads = store.command_count("lrange");
        let mut order = session.retrieve::<Order>("1").await.unwrap().object;
        // lines, related and tags; notes is lazy
        assert_eq!(store.command_count("lrange"), reads + 3);
        let loaded = order.get_mut().await.unwrap();
        assert_eq!(loaded.tags.peek(), ["x"]);
        assert_eq!(loaded.notes.state().phase(), Phase::Unloaded);

        assert_eq!(loaded.notes.items().await.unwrap(), ["call first"]);
        assert_eq!(store.command_count("lrange"), reads + 4);
        assert_eq!(loaded.notes.state().phase(), Phase::Loaded);
    }

    #[tokio::test]
    async fn sub_record_shares_owner_id() {
        let (store, session) = setup();
        let mut order = Order::default();
        order.address.entity_mut().city = "Lisbon".into();
        session.create(order).await.unwrap();
        assert_eq!(
            store.hget("Address:1", "city").await.unwrap().as_deref(),
            Some("Lisbon")
        );

        let mut loaded = session.retrieve::<Order>("1").await.unwrap().object;
        let address = &loaded.get().await.unwrap().address;
        assert_eq!(address.peek().city, "Lisbon");
        assert_eq!(address.state().parent().unwrap().formatted(), "Order:1");
    }

    // ---- Test 2: Cascading deletes ----

    #[tokio::test]
    async fn delete_cascades_only_where_declared() {
        let (store, session) = setup();
        let order = Order {
            lines: vec![line("owned")].into(),
            related: vec![line("shared")].into(),
            tags: vec!["x".to_string()].into(),
            ..Order::default()
        };
        let mut order = session.create(order).await.unwrap();
        assert!(store.exists("OrderLine:1").await.unwrap());
        assert!(store.exists("OrderLine:2").await.unwrap());

        assert!(session.delete(&mut order).await.unwrap());
        for key in ["Order:1", "Order:1:lines", "Order:1:related", "Order:1:tags", "Address:1"] {
            assert!(!store.exists(key).await.unwrap(), "{key} survived");
        }
        assert!(!store.exists("OrderLine:1").await.unwrap());
        assert!(store.exists("OrderLine:2").await.unwrap());
        assert!(!order.state().was_found());
        assert!(order.peek().lines.peek().is_empty());
    }

    #[tokio::test]
    async fn delete_by_id_loads_before_cascading() {
        let (store, session) = setup();
        let order = Order {
            lines: vec![line("a"), line("b")].into(),
            ..Order::default()
        };
        session.create(order).await.unwrap();
        assert!(session.delete_by_id::<Order>("1").await.unwrap());
        assert!(!store.exists("OrderLine:1").await.unwrap());
        assert!(!store.exists("OrderLine:2").await.unwrap());
        assert!(!session.delete_by_id::<Order>("1").await.unwrap());
    }

    // ---- Test 3: Stale references ----

    #[tokio::test]
    async fn stale_references_are_dropped_on_read() {
        let (store, session) = setup();
        let order = Order {
            lines: vec![line("a"), line("b")].into(),
            ..Order::default()
        };
        session.create(order).await.unwrap();
        session.delete_by_id::<OrderLine>("1").await.unwrap();

        let mut order = session.retrieve::<Order>("1").await.unwrap().object;
        let lines = &mut order.get_mut().await.unwrap().lines;
        assert_eq!(lines.len().await.unwrap(), 1);
        assert_eq!(lines.peek()[0].id(), Some("2"));
        assert_eq!(
            store.lrange("Order:1:lines", 0, -1).await.unwrap(),
            ["OrderLine:2"]
        );
    }

    // ---- Test 4: Cancellation ----

    #[tokio::test]
    async fn cancelled_load_returns_to_unloaded() {
        let store = Arc::new(InMemoryStore::new());
        let token = CancelToken::new();
        let session = Session::builder(store)
            .cancel_token(token.clone())
            .build();
        let mut order = session.reference::<Order>("1").unwrap();
        token.cancel();

        let err = order.load().await.unwrap_err();
        assert!(matches!(err, MapperError::Cancelled));
        assert_eq!(order.state().phase(), Phase::Unloaded);
        assert!(!order.state().is_processing());
    }

    // ---- Test 5: Backup restore ----

    #[tokio::test]
    async fn empty_store_is_seeded_from_backup() {
        let backup = Arc::new(InMemoryBackup::new("engine-restore"));
        let first = Session::builder(Arc::new(InMemoryStore::new()))
            .backup(backup.clone())
            .build();
        let order = Order {
            customer: "ada".into(),
            tags: vec!["x".to_string(), "y".to_string()].into(),
            ..Order::default()
        };
        first.create(order).await.unwrap();

        let store = Arc::new(InMemoryStore::new());
        let second = Session::builder(store.clone())
            .backup(Arc::new(InMemoryBackup::new("engine-restore")))
            .build();
        let mut restored = second.retrieve::<Order>("1").await.unwrap();
        assert!(restored.status.is_found());
        let loaded = restored.object.get_mut().await.unwrap();
        assert_eq!(loaded.customer, "ada");
        assert_eq!(loaded.tags.peek(), ["x", "y"]);

        let next = second.create(Order::default()).await.unwrap();
        assert_eq!(next.id(), Some("2"));
    }
}
