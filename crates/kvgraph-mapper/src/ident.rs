//! Identifier allocation.
//!
//! Text identifiers come from an atomic increment of the type's counter key
//! (`prefix:suffix`, never containing an id). UUID identifiers are random
//! and generated locally without consulting the store.

use kvgraph_types::{EntityDescriptor, KeyDescriptor, ScalarType, ScalarValue};
use tracing::debug;

use crate::error::MapperResult;
use crate::session::{Session, Structure};

/// The counter key used to allocate ids for this type.
pub fn counter_key(descriptor: &EntityDescriptor) -> MapperResult<String> {
    Ok(KeyDescriptor::for_type(descriptor, "")?.counter_key())
}

/// Allocate a fresh identifier value for a record of this type.
pub(crate) async fn allocate(
    session: &Session,
    descriptor: &EntityDescriptor,
) -> MapperResult<ScalarValue> {
    if descriptor.identifier().scalar_type() == Some(ScalarType::Uuid) {
        let id = uuid::Builder::from_random_bytes(rand::random()).into_uuid();
        debug!(entity = descriptor.name(), %id, "generated identifier");
        return Ok(ScalarValue::Uuid(id));
    }

    let counter = counter_key(descriptor)?;
    session.restore(Structure::Counter, &counter).await;
    let next = session.run(session.store().incr(&counter)).await?;
    session
        .best_effort(
            "update_counter",
            &counter,
            session.backup().update_counter(&counter, next),
        )
        .await;
    debug!(counter = %counter, id = next, "allocated identifier");
    Ok(ScalarValue::Text(next.to_string()))
}
