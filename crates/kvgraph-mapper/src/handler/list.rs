use async_trait::async_trait;
use kvgraph_types::Capability;

use super::{drop_stale, mismatch, CapabilityHandler};
use crate::engine::Retrieval;
use crate::entity::{Member, RawContent};
use crate::error::MapperResult;
use crate::session::{Session, Structure};

/// Ordered lists, duplicates allowed.
#[derive(Debug, Default)]
pub struct ListHandler;

#[async_trait]
impl CapabilityHandler for ListHandler {
    fn capability(&self) -> Capability {
        Capability::List
    }

    async fn read(&self, session: &Session, member: &mut dyn Member) -> MapperResult<Retrieval> {
        session.restore_once(member.state_mut(), Structure::List).await?;
        let key = member.state().require_key()?.formatted();
        let mut values = session.run(session.store().lrange(&key, 0, -1)).await?;
        if member.holds_entities() {
            values = drop_stale(
                session,
                &key,
                Structure::List,
                values,
                String::as_str,
                String::as_str,
            )
            .await?;
        }
        let found = !values.is_empty();
        member.decode(RawContent::List(values), session)?;
        Ok(Retrieval::from(found))
    }

    async fn save(&self, session: &Session, member: &mut dyn Member) -> MapperResult<bool> {
        member.persist_elements(session).await?;
        let key = member.state().require_key()?.formatted();
        let RawContent::List(values) = member.encode(session)? else {
            return Err(mismatch(member, Capability::List));
        };
        let backup = session.backup();
        session.best_effort("delete_list", &key, backup.delete_list(&key)).await;
        for value in &values {
            session
                .best_effort("add_list_item", &key, backup.add_list_item(&key, value))
                .await;
        }
        let store = session.store();
        session.run(store.delete(&key)).await?;
        for value in &values {
            session.run(store.rpush(&key, value)).await?;
        }
        Ok(!values.is_empty())
    }

    async fn delete(&self, session: &Session, member: &mut dyn Member) -> MapperResult<bool> {
        let key = member.state().require_key()?.formatted();
        session
            .best_effort("delete_list", &key, session.backup().delete_list(&key))
            .await;
        session.run(session.store().delete(&key)).await
    }
}
