use async_trait::async_trait;
use kvgraph_types::Capability;

use super::{drop_stale, mismatch, CapabilityHandler};
use crate::engine::Retrieval;
use crate::entity::{Member, RawContent};
use crate::error::MapperResult;
use crate::session::{Session, Structure};

/// Sorted sets of entity references scored by the member's order key.
#[derive(Debug, Default)]
pub struct OrderedSetHandler;

fn set_member(entry: &(String, f64)) -> &str {
    &entry.0
}

#[async_trait]
impl CapabilityHandler for OrderedSetHandler {
    fn capability(&self) -> Capability {
        Capability::OrderedSet
    }

    async fn read(&self, session: &Session, member: &mut dyn Member) -> MapperResult<Retrieval> {
        session.restore_once(member.state_mut(), Structure::Set).await?;
        let key = member.state().require_key()?.formatted();
        let entries = session.run(session.store().zrange(&key, 0, -1)).await?;
        let entries = drop_stale(
            session,
            &key,
            Structure::Set,
            entries,
            set_member,
            set_member,
        )
        .await?;
        let found = !entries.is_empty();
        member.decode(RawContent::Set(entries), session)?;
        Ok(Retrieval::from(found))
    }

    async fn save(&self, session: &Session, member: &mut dyn Member) -> MapperResult<bool> {
        member.persist_elements(session).await?;
        let key = member.state().require_key()?.formatted();
        let RawContent::Set(entries) = member.encode(session)? else {
            return Err(mismatch(member, Capability::OrderedSet));
        };
        let backup = session.backup();
        session.best_effort("delete_set", &key, backup.delete_set(&key)).await;
        for (value, score) in &entries {
            session
                .best_effort("add_set_item", &key, backup.add_set_item(&key, value, *score))
                .await;
        }
        let store = session.store();
        session.run(store.delete(&key)).await?;
        for (value, score) in &entries {
            session.run(store.zadd(&key, value, *score)).await?;
        }
        Ok(!entries.is_empty())
    }

    async fn delete(&self, session: &Session, member: &mut dyn Member) -> MapperResult<bool> {
        let key = member.state().require_key()?.formatted();
        session
            .best_effort("delete_set", &key, session.backup().delete_set(&key))
            .await;
        session.run(session.store().delete(&key)).await
    }
}
