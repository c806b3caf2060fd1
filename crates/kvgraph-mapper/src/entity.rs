//! Traits connecting user types to the mapper.
//!
//! An entity type implements [`Record`] (field access by name) and
//! [`Entity`] (its static descriptor). Container fields and sub-records are
//! [`Member`]s: tracked wrappers that know their shape, carry a
//! [`ProxyState`], and translate to and from the store's raw structures.

use std::sync::Arc;

use async_trait::async_trait;
use kvgraph_types::{
    Capability, EntityDescriptor, FieldDescriptor, KeyDescriptor, ScalarValue, TypeResult,
};

use crate::error::{MapperError, MapperResult};
use crate::session::Session;
use crate::state::ProxyState;

/// Field access for one entity instance.
pub trait Record: Send + Sync {
    /// Current value of a scalar field, `None` for unknown names.
    fn get(&self, field: &str) -> Option<ScalarValue>;

    /// Assign a scalar field. Unknown names are ignored.
    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()>;

    /// Container and sub-record fields, by field name.
    fn members(&mut self) -> Vec<(&'static str, &mut dyn Member)> {
        Vec::new()
    }
}

/// A type persisted as a hash record.
pub trait Entity: Record + Default + 'static {
    /// Static metadata. Called once per session and cached.
    fn describe() -> TypeResult<EntityDescriptor>;
}

/// Where a member sits: the owning record and the field holding it.
#[derive(Clone, Copy, Debug)]
pub struct Owner<'a> {
    pub key: &'a KeyDescriptor,
    pub descriptor: &'a EntityDescriptor,
    pub field: &'a FieldDescriptor,
}

/// A container's content in store form.
#[derive(Clone, Debug, PartialEq)]
pub enum RawContent {
    /// List elements in order.
    List(Vec<String>),
    /// Hash fields and values.
    Map(Vec<(String, String)>),
    /// Sorted-set members and scores, ascending.
    Set(Vec<(String, f64)>),
}

/// A tracked field value: a container or a sub-record.
#[async_trait]
pub trait Member: Send + Sync {
    /// The shape this value has, used to pick its handler.
    fn capability(&self) -> Capability;

    fn state(&self) -> &ProxyState;

    fn state_mut(&mut self) -> &mut ProxyState;

    /// Bind to the store key derived from `owner`. Returns `true` if the
    /// member was not bound there before. `loaded` marks in-memory content
    /// as authoritative.
    fn attach(&mut self, session: &Session, owner: Owner<'_>, loaded: bool) -> MapperResult<bool>;

    /// Drop in-memory content.
    fn clear(&mut self);

    /// Whether elements are entity references.
    fn holds_entities(&self) -> bool {
        false
    }

    /// The record behind a sub-record member.
    fn record(
        &mut self,
        _session: &Session,
    ) -> MapperResult<Option<(&mut dyn Record, Arc<EntityDescriptor>)>> {
        Ok(None)
    }

    /// Replace in-memory content with what the store holds.
    fn decode(&mut self, _raw: RawContent, _session: &Session) -> MapperResult<()> {
        Err(not_a_container(self.capability()))
    }

    fn encode(&self, _session: &Session) -> MapperResult<RawContent> {
        Err(not_a_container(self.capability()))
    }

    /// Save owned entity elements, allocating their ids.
    async fn persist_elements(&mut self, _session: &Session) -> MapperResult<()> {
        Ok(())
    }

    /// Delete owned entity elements.
    async fn discard_elements(&mut self, _session: &Session) -> MapperResult<()> {
        Ok(())
    }
}

fn not_a_container(capability: Capability) -> MapperError {
    MapperError::NoHandler(format!("{capability:?} member as a container"))
}
