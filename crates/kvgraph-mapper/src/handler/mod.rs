//! Capability handlers: read, save, and delete one container shape.
//!
//! Dispatch is by tag when the field descriptor names the shape, which is
//! always the case for fields of a described entity. Members without a
//! descriptor fall back to asking each handler in priority order
//! (list, map, ordered set, entity) and taking the first that accepts.

mod entity;
mod list;
mod map;
mod sorted_set;

use async_trait::async_trait;
use kvgraph_types::Capability;
use tracing::info;

use crate::engine::Retrieval;
use crate::entity::Member;
use crate::error::{MapperError, MapperResult};
use crate::session::{Session, Structure};

pub use entity::EntityHandler;
pub use list::ListHandler;
pub use map::MapHandler;
pub use sorted_set::OrderedSetHandler;

#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    fn capability(&self) -> Capability;

    /// Shape recognition. Exactly one standard handler accepts any member.
    fn can_handle(&self, member: &dyn Member) -> bool {
        member.capability() == self.capability()
    }

    /// Populate `member` from the store.
    async fn read(&self, session: &Session, member: &mut dyn Member) -> MapperResult<Retrieval>;

    /// Write `member` to the store. Entities write their scalar fields in
    /// one batch; containers replace the whole key.
    async fn save(&self, session: &Session, member: &mut dyn Member) -> MapperResult<bool>;

    /// Remove the member's key. Cascading into elements is the caller's job.
    async fn delete(&self, session: &Session, member: &mut dyn Member) -> MapperResult<bool>;
}

/// The handlers in priority order.
pub struct HandlerSet {
    handlers: Vec<Box<dyn CapabilityHandler>>,
}

impl HandlerSet {
    pub fn standard() -> Self {
        Self {
            handlers: vec![
                Box::new(ListHandler),
                Box::new(MapHandler),
                Box::new(OrderedSetHandler),
                Box::new(EntityHandler),
            ],
        }
    }

    fn by_capability(&self, capability: Capability) -> Option<&dyn CapabilityHandler> {
        self.handlers
            .iter()
            .map(AsRef::as_ref)
            .find(|h| h.capability() == capability)
    }

    /// The handler for `member`.
    pub fn resolve(&self, member: &dyn Member) -> MapperResult<&dyn CapabilityHandler> {
        let actual = member.capability();
        if let Some(field) = member.state().field() {
            if let Some(declared) = field.shape.capability() {
                if declared != actual {
                    return Err(MapperError::ShapeMismatch {
                        field: field.name.to_string(),
                        declared,
                        actual,
                    });
                }
                return self
                    .by_capability(declared)
                    .ok_or_else(|| MapperError::NoHandler(field.name.to_string()));
            }
        }
        self.handlers
            .iter()
            .map(AsRef::as_ref)
            .find(|h| h.can_handle(member))
            .ok_or_else(|| MapperError::NoHandler(format!("{actual:?} member")))
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.capability()))
            .finish()
    }
}

/// Error for a member whose encoded content does not match its handler.
pub(crate) fn mismatch(member: &dyn Member, declared: Capability) -> MapperError {
    MapperError::ShapeMismatch {
        field: member.state().field_name().to_string(),
        declared,
        actual: member.capability(),
    }
}

/// Keep entries whose referenced entity still exists and remove the rest
/// from the container. `target` is what the container stores for the entry
/// (list value, hash field, or set member); `reference` is the formatted
/// key it points at.
pub(crate) async fn drop_stale<T: Send + Sync>(
    session: &Session,
    container: &str,
    structure: Structure,
    entries: Vec<T>,
    target: fn(&T) -> &str,
    reference: fn(&T) -> &str,
) -> MapperResult<Vec<T>> {
    if !session.config().heal_stale_references {
        return Ok(entries);
    }
    let mut live = Vec::with_capacity(entries.len());
    for entry in entries {
        let referenced = reference(&entry);
        session.restore(Structure::Hash, referenced).await;
        if session.run(session.store().exists(referenced)).await? {
            live.push(entry);
            continue;
        }
        let target = target(&entry);
        info!(container, reference = referenced, "removing stale reference");
        let backup = session.backup();
        let store = session.store();
        match structure {
            Structure::List => {
                session
                    .best_effort(
                        "remove_list_item",
                        container,
                        backup.remove_list_item(container, target),
                    )
                    .await;
                session.run(store.lrem(container, target)).await?;
            }
            Structure::Hash => {
                session
                    .best_effort(
                        "delete_hash_value",
                        container,
                        backup.delete_hash_value(container, target),
                    )
                    .await;
                session.run(store.hdel(container, target)).await?;
            }
            Structure::Set => {
                session
                    .best_effort(
                        "remove_set_item",
                        container,
                        backup.remove_set_item(container, target),
                    )
                    .await;
                session.run(store.zrem(container, target)).await?;
            }
            Structure::Counter => {}
        }
    }
    Ok(live)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Address, Score, Tag};
    use crate::tracked::{Tracked, TrackedList, TrackedMap, TrackedSet};

    #[test]
    fn each_member_matches_exactly_one_handler() {
        let set = HandlerSet::standard();
        let members: Vec<Box<dyn Member>> = vec![
            Box::new(TrackedList::<String>::new()),
            Box::new(TrackedMap::<String, i64>::new()),
            Box::new(TrackedSet::<Score>::new()),
            Box::new(Tracked::new(Address::default())),
            Box::new(TrackedList::<Tracked<Tag>>::new()),
        ];
        for member in &members {
            let accepting = set
                .handlers
                .iter()
                .filter(|h| h.can_handle(member.as_ref()))
                .count();
            assert_eq!(accepting, 1, "{:?}", member.capability());
        }
    }

    #[test]
    fn fallback_follows_priority_order() {
        let set = HandlerSet::standard();
        let list = TrackedList::<i64>::new();
        assert_eq!(set.resolve(&list).unwrap().capability(), Capability::List);
        let entity = Tracked::new(Address::default());
        assert_eq!(set.resolve(&entity).unwrap().capability(), Capability::Entity);
        assert_eq!(
            format!("{set:?}"),
            "[List, Map, OrderedSet, Entity]"
        );
    }
}
