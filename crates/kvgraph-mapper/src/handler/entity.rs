use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kvgraph_types::{Capability, EntityDescriptor};
use tracing::trace;

use super::CapabilityHandler;
use crate::engine::Retrieval;
use crate::entity::{Member, Record};
use crate::error::{MapperError, MapperResult};
use crate::session::{Session, Structure};

/// Hash records: one hash field per scalar field.
#[derive(Debug, Default)]
pub struct EntityHandler;

fn require_record<'m>(
    member: &'m mut dyn Member,
    session: &Session,
) -> MapperResult<(&'m mut dyn Record, Arc<EntityDescriptor>)> {
    let field = member.state().field_name().to_string();
    member
        .record(session)?
        .ok_or_else(|| MapperError::NoHandler(format!("entity member without a record {field}")))
}

#[async_trait]
impl CapabilityHandler for EntityHandler {
    fn capability(&self) -> Capability {
        Capability::Entity
    }

    async fn read(&self, session: &Session, member: &mut dyn Member) -> MapperResult<Retrieval> {
        session.restore_once(member.state_mut(), Structure::Hash).await?;
        let key = member.state().require_key()?.formatted();
        let stored = session.run(session.store().hgetall(&key)).await?;
        if stored.is_empty() {
            trace!(key = %key, "record not found");
            return Ok(Retrieval::NotFound);
        }
        let stored: HashMap<String, String> = stored.into_iter().collect();
        let (record, descriptor) = require_record(member, session)?;
        for field in descriptor.scalar_fields() {
            let Some(ty) = field.scalar_type() else {
                continue;
            };
            let raw = stored.get(field.name).map(String::as_str);
            // The id of a reference comes from its key.
            if raw.is_none() && field.identifier {
                continue;
            }
            let value = session
                .converters()
                .read(ty, raw)
                .map_err(|e| MapperError::from(e).in_field(&key, field.name))?;
            record.put(field.name, value)?;
        }
        Ok(Retrieval::Found)
    }

    async fn save(&self, session: &Session, member: &mut dyn Member) -> MapperResult<bool> {
        let key = member.state().require_key()?.formatted();
        let (record, descriptor) = require_record(member, session)?;
        let mut fields = Vec::new();
        for field in descriptor.scalar_fields() {
            if let Some(value) = record.get(field.name) {
                fields.push((field.name.to_string(), session.converters().write(&value)?));
            }
        }
        if fields.is_empty() {
            return Ok(false);
        }
        session
            .best_effort("update_hash", &key, session.backup().update_hash(&key, &fields))
            .await;
        session.run(session.store().hset(&key, &fields)).await?;
        trace!(key = %key, fields = fields.len(), "wrote record");
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
