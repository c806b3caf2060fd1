use async_trait::async_trait;
use kvgraph_types::Capability;

use super::{drop_stale, mismatch, CapabilityHandler};
use crate::engine::Retrieval;
use crate::entity::{Member, RawContent};
use crate::error::MapperResult;
use crate::session::{Session, Structure};

/// Maps stored as a hash of converted keys to encoded values.
#[derive(Debug, Default)]
pub struct MapHandler;

fn entry_field(entry: &(String, String)) -> &str {
    &entry.0
}

fn entry_value(entry: &(String, String)) -> &str {
    &entry.1
}

#[async_trait]
impl CapabilityHandler for MapHandler {
    fn capability(&self) -> Capability {
        Capability::Map
    }

    async fn read(&self, session: &Session, member: &mut dyn Member) -> MapperResult<Retrieval> {
        session.restore_once(member.state_mut(), Structure::Hash).await?;
        let key = member.state().require_key()?.formatted();
        let mut entries = session.run(session.store().hgetall(&key)).await?;
        if member.holds_entities() {
            entries = drop_stale(
                session,
                &key,
                Structure::Hash,
                entries,
                entry_field,
                entry_value,
            )
            .await?;
        }
        let found = !entries.is_empty();
        member.decode(RawContent::Map(entries), session)?;
        Ok(Retrieval::from(found))
    }

    async fn save(&self, session: &Session, member: &mut dyn Member) -> MapperResult<bool> {
        member.persist_elements(session).await?;
        let key = member.state().require_key()?.formatted();
        let RawContent::Map(entries) = member.encode(session)? else {
            return Err(mismatch(member, Capability::Map));
        };
        let backup = session.backup();
        session.best_effort("delete_hash", &key, backup.delete_hash(&key)).await;
        let store = session.store();
        session.run(store.delete(&key)).await?;
        if entries.is_empty() {
            return Ok(false);
        }
        session
            .best_effort("update_hash", &key, backup.update_hash(&key, &entries))
            .await;
        session.run(store.hset(&key, &entries)).await?;
        Ok(true)
    }

    async fn delete(&self, session: &Session, member: &mut dyn Member) -> MapperResult<bool> {
        let key = member.state().require_key()?.formatted();
        session
            .best_effort("delete_hash", &key, session.backup().delete_hash(&key))
            .await;
        session.run(session.store().delete(&key)).await
    }
}
