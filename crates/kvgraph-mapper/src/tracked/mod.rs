//! Tracked proxies: the objects applications hold.
//!
//! A [`Tracked`] entity loads itself on first access and writes scalar
//! assignments straight through to its hash record. The container wrappers
//! ([`TrackedList`], [`TrackedMap`], [`TrackedSet`]) do the same for their
//! store structures, mirroring each mutation to the backup first.

mod list;
mod map;
mod set;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kvgraph_types::{
    Capability, EntityDescriptor, KeyDescriptor, ScalarType, ScalarValue, TypeError,
};
use tracing::trace;

use crate::engine::Retrieval;
use crate::entity::{Entity, Member, Owner, Record};
use crate::error::{MapperError, MapperResult};
use crate::session::{Session, Structure};
use crate::state::ProxyState;

pub use list::TrackedList;
pub use map::TrackedMap;
pub use set::TrackedSet;

/// Load a member through its session if it has not been loaded yet.
/// Detached members report `Found`: their memory is authoritative.
pub(crate) async fn load_member(member: &mut dyn Member) -> MapperResult<Retrieval> {
    match member.state().pending_load() {
        Some(session) => session.engine().retrieve(&session, member).await,
        None => Ok(Retrieval::from(
            !member.state().is_attached() || member.state().was_found(),
        )),
    }
}

/// Descriptor of `E`, from the session when the proxy has one.
pub(crate) fn describe<E: Entity>(state: &ProxyState) -> MapperResult<Arc<EntityDescriptor>> {
    match state.session() {
        Some(session) => session.descriptor::<E>(),
        None => Ok(Arc::new(E::describe()?)),
    }
}

/// Key or field name, for error messages.
pub(crate) fn label(state: &ProxyState) -> String {
    match state.key() {
        Some(key) => key.formatted(),
        None => state.field_name().to_string(),
    }
}

/// Whether removing an element also deletes the entity it references.
pub(crate) fn cascades(state: &ProxyState) -> bool {
    state.field().map_or(true, |f| f.cascade)
}

/// The owner's key, which entity elements record as their parent.
pub(crate) fn parent_key(state: &ProxyState) -> MapperResult<KeyDescriptor> {
    match state.parent() {
        Some(parent) => Ok(parent.clone()),
        None => Ok(state.require_key()?.clone()),
    }
}

/// Reject a member placed in a field declared with another shape.
pub(crate) fn check_shape(owner: &Owner<'_>, actual: Capability) -> MapperResult<()> {
    match owner.field.shape.capability() {
        Some(declared) if declared == actual => Ok(()),
        Some(declared) => Err(MapperError::ShapeMismatch {
            field: owner.field.name.to_string(),
            declared,
            actual,
        }),
        None => Err(TypeError::InvalidDescriptor {
            entity: owner.descriptor.name().to_string(),
            reason: format!("scalar field {} holds a {actual:?} member", owner.field.name),
        }
        .into()),
    }
}

pub(crate) fn element_mismatch(owner: &Owner<'_>) -> MapperError {
    TypeError::InvalidDescriptor {
        entity: owner.descriptor.name().to_string(),
        reason: format!(
            "field {} holds elements of another type than declared",
            owner.field.name
        ),
    }
    .into()
}

fn identifier_type(descriptor: &EntityDescriptor) -> MapperResult<ScalarType> {
    let field = descriptor.identifier();
    field.scalar_type().ok_or_else(|| MapperError::NotScalar {
        entity: descriptor.name().to_string(),
        field: field.name.to_string(),
    })
}

/// An entity with its proxy state.
pub struct Tracked<E: Entity> {
    entity: E,
    state: ProxyState,
}

impl<E: Entity> Tracked<E> {
    /// Wrap an object built in memory. It is written on save.
    pub fn new(entity: E) -> Self {
        Self {
            entity,
            state: ProxyState::detached(),
        }
    }

    /// Unloaded proxy for the record under `key`.
    pub(crate) fn reference(session: &Session, key: KeyDescriptor) -> MapperResult<Self> {
        let descriptor = session.descriptor::<E>()?;
        let id = session
            .converters()
            .read(identifier_type(&descriptor)?, Some(key.id()))?;
        let mut entity = E::default();
        entity.put(descriptor.identifier().name, id)?;
        Ok(Self {
            entity,
            state: ProxyState::unloaded(session, key),
        })
    }

    pub fn key(&self) -> Option<&KeyDescriptor> {
        self.state.key()
    }

    /// Id of the bound record.
    pub fn id(&self) -> Option<&str> {
        self.state.key().map(KeyDescriptor::id)
    }

    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut ProxyState {
        &mut self.state
    }

    pub(crate) fn require_key(&self) -> MapperResult<&KeyDescriptor> {
        self.state.require_key()
    }

    pub(crate) fn entity_mut(&mut self) -> &mut E {
        &mut self.entity
    }

    /// The identifier held in memory, if one is assigned.
    pub(crate) fn stored_id(&self, descriptor: &EntityDescriptor) -> Option<String> {
        self.entity
            .get(descriptor.identifier().name)
            .filter(|value| !value.is_empty_identifier())
            .and_then(|value| value.identifier_text())
    }

    /// The in-memory object, without loading it.
    pub fn peek(&self) -> &E {
        &self.entity
    }

    pub fn into_inner(self) -> E {
        self.entity
    }

    /// Load from the store if that has not happened yet. Objects built in
    /// memory report `Found`.
    pub async fn load(&mut self) -> MapperResult<Retrieval> {
        load_member(self).await
    }

    pub async fn get(&mut self) -> MapperResult<&E> {
        self.load().await?;
        Ok(&self.entity)
    }

    /// Mutable access to the loaded object. Changes made this way reach the
    /// store on the next save.
    pub async fn get_mut(&mut self) -> MapperResult<&mut E> {
        self.load().await?;
        Ok(&mut self.entity)
    }

    /// Assign a scalar field and write it through to the record.
    ///
    /// Returns `false` without writing when the record already holds the
    /// value. Identifiers cannot change once the object is bound to a key.
    pub async fn set_field(
        &mut self,
        name: &str,
        value: impl Into<ScalarValue>,
    ) -> MapperResult<bool> {
        let value = value.into();
        let descriptor = describe::<E>(&self.state)?;
        let field = descriptor.require_field(name)?;
        let ty = field.scalar_type().ok_or_else(|| MapperError::NotScalar {
            entity: descriptor.name().to_string(),
            field: name.to_string(),
        })?;
        if value.scalar_type() != ty {
            return Err(TypeError::Mismatch {
                expected: ty,
                actual: value.scalar_type(),
            }
            .into());
        }
        self.load().await?;
        if field.identifier {
            if let Some(key) = self.state.key() {
                if value.identifier_text().as_deref() != Some(key.id()) {
                    return Err(MapperError::ImmutableIdentifier {
                        key: key.formatted(),
                    });
                }
            }
        }

        let Some(session) = self.state.live_session() else {
            self.entity.put(name, value)?;
            return Ok(true);
        };
        session.restore_once(&mut self.state, Structure::Hash).await?;
        let key = self.state.require_key()?.formatted();
        let text = session.converters().write(&value)?;
        let stored = session.run(session.store().hget(&key, name)).await?;
        if stored.as_deref() == Some(text.as_str()) {
            self.entity.put(name, value)?;
            return Ok(false);
        }
        session
            .best_effort(
                "update_hash_value",
                &key,
                session.backup().update_hash_value(&key, name, &text),
            )
            .await;
        session
            .run(session.store().hset(&key, &[(name.to_string(), text)]))
            .await?;
        trace!(key = %key, field = name, "wrote field");
        self.entity.put(name, value)?;
        Ok(true)
    }
}

impl<E: Entity> Default for Tracked<E> {
    fn default() -> Self {
        Self::new(E::default())
    }
}

#[async_trait]
impl<E: Entity> Member for Tracked<E> {
    fn capability(&self) -> Capability {
        Capability::Entity
    }

    fn state(&self) -> &ProxyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProxyState {
        &mut self.state
    }

    /// Sub-records share the owner's id under their own prefix.
    fn attach(&mut self, session: &Session, owner: Owner<'_>, loaded: bool) -> MapperResult<bool> {
        check_shape(&owner, Capability::Entity)?;
        let descriptor = session.descriptor::<E>()?;
        let id = owner.key.id();
        let key = KeyDescriptor::for_type(&descriptor, id)?;
        if self.stored_id(&descriptor).is_none() {
            let value = session
                .converters()
                .read(identifier_type(&descriptor)?, Some(id))?;
            self.entity.put(descriptor.identifier().name, value)?;
        }
        Ok(self.state.attach(
            session,
            key,
            Some(owner.key.clone()),
            Some(owner.field.clone()),
            loaded,
        ))
    }

    fn clear(&mut self) {}

    fn record(
        &mut self,
        session: &Session,
    ) -> MapperResult<Option<(&mut dyn Record, Arc<EntityDescriptor>)>> {
        let descriptor = session.descriptor::<E>()?;
        let record: &mut dyn Record = &mut self.entity;
        Ok(Some((record, descriptor)))
    }
}

impl<E: Entity + fmt::Debug> fmt::Debug for Tracked<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("entity", &self.entity)
            .field("state", &self.state)
            .finish()
    }
}
