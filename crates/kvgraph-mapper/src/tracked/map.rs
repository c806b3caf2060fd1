use async_trait::async_trait;
use kvgraph_types::{Capability, FieldShape, KeyDescriptor};

use super::{cascades, check_shape, element_mismatch, label, load_member, parent_key};
use crate::element::{Element, MapKey};
use crate::engine::Retrieval;
use crate::entity::{Member, Owner, RawContent};
use crate::error::{MapperError, MapperResult};
use crate::handler::mismatch;
use crate::session::{Session, Structure};
use crate::state::ProxyState;

/// A map field backed by a store hash. Keys are stored in their converted
/// text form, values encoded as elements.
pub struct TrackedMap<K: MapKey, V: Element> {
    entries: Vec<(K, V)>,
    state: ProxyState,
}

impl<K: MapKey, V: Element> TrackedMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            state: ProxyState::detached(),
        }
    }

    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    pub fn peek(&self) -> &[(K, V)] {
        &self.entries
    }

    pub async fn load(&mut self) -> MapperResult<Retrieval> {
        load_member(self).await
    }

    pub async fn entries(&mut self) -> MapperResult<&[(K, V)]> {
        self.load().await?;
        Ok(&self.entries)
    }

    pub async fn len(&mut self) -> MapperResult<usize> {
        self.load().await?;
        Ok(self.entries.len())
    }

    pub async fn is_empty(&mut self) -> MapperResult<bool> {
        Ok(self.len().await? == 0)
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub async fn get(&mut self, key: &K) -> MapperResult<Option<&V>> {
        self.load().await?;
        Ok(self.position(key).map(|i| &self.entries[i].1))
    }

    pub async fn get_mut(&mut self, key: &K) -> MapperResult<Option<&mut V>> {
        self.load().await?;
        Ok(self.position(key).map(|i| &mut self.entries[i].1))
    }

    pub async fn contains_key(&mut self, key: &K) -> MapperResult<bool> {
        self.load().await?;
        Ok(self.position(key).is_some())
    }

    /// Insert or replace, returning the previous value. A replaced entity
    /// is deleted when the field cascades.
    pub async fn insert(&mut self, key: K, mut value: V) -> MapperResult<Option<V>> {
        self.load().await?;
        let existing = self.position(&key);
        let Some(session) = self.state.live_session() else {
            return Ok(self.place(existing, key, value));
        };
        session.restore_once(&mut self.state, Structure::Hash).await?;
        let container = self.state.require_key()?.formatted();
        let field = session.converters().write_key(&key.to_scalar())?;
        value.persist(&session, &parent_key(&self.state)?).await?;
        let encoded = value.encode(&session)?;
        if let Some(i) = existing {
            let cascade = V::ENTITY && cascades(&self.state);
            let old = &mut self.entries[i].1;
            if cascade && !old.same(&value) {
                old.discard(&session).await?;
            }
        }
        session
            .best_effort(
                "update_hash_value",
                &container,
                session.backup().update_hash_value(&container, &field, &encoded),
            )
            .await;
        session
            .run(session.store().hset(&container, &[(field, encoded)]))
            .await?;
        Ok(self.place(existing, key, value))
    }

    fn place(&mut self, existing: Option<usize>, key: K, value: V) -> Option<V> {
        match existing {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove a key, returning its value. A removed entity is deleted when
    /// the field cascades.
    pub async fn remove(&mut self, key: &K) -> MapperResult<Option<V>> {
        self.load().await?;
        let Some(i) = self.position(key) else {
            return Ok(None);
        };
        let Some(session) = self.state.live_session() else {
            return Ok(Some(self.entries.remove(i).1));
        };
        session.restore_once(&mut self.state, Structure::Hash).await?;
        let container = self.state.require_key()?.formatted();
        let field = session.converters().write_key(&key.to_scalar())?;
        if V::ENTITY && cascades(&self.state) {
            self.entries[i].1.discard(&session).await?;
        }
        session
            .best_effort(
                "delete_hash_value",
                &container,
                session.backup().delete_hash_value(&container, &field),
            )
            .await;
        session.run(session.store().hdel(&container, &field)).await?;
        Ok(Some(self.entries.remove(i).1))
    }
}

impl<K: MapKey, V: Element> Default for TrackedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MapKey, V: Element> FromIterator<(K, V)> for TrackedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            let existing = map.position(&key);
            map.place(existing, key, value);
        }
        map
    }
}

impl<K, V> std::fmt::Debug for TrackedMap<K, V>
where
    K: MapKey + std::fmt::Debug,
    V: Element + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedMap")
            .field("entries", &self.entries)
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl<K: MapKey, V: Element> Member for TrackedMap<K, V> {
    fn capability(&self) -> Capability {
        Capability::Map
    }

    fn state(&self) -> &ProxyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProxyState {
        &mut self.state
    }

    fn attach(&mut self, session: &Session, owner: Owner<'_>, loaded: bool) -> MapperResult<bool> {
        check_shape(&owner, Capability::Map)?;
        match owner.field.shape {
            FieldShape::Map { key, value } if key == K::TYPE && V::fits(&value) => {}
            _ => return Err(element_mismatch(&owner)),
        }
        let key = KeyDescriptor::for_field(owner.descriptor, owner.field, owner.key.id())?;
        Ok(self.state.attach(
            session,
            key,
            Some(owner.key.clone()),
            Some(owner.field.clone()),
            loaded,
        ))
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn holds_entities(&self) -> bool {
        V::ENTITY
    }

    fn decode(&mut self, raw: RawContent, session: &Session) -> MapperResult<()> {
        let RawContent::Map(pairs) = raw else {
            return Err(mismatch(self, Capability::Map));
        };
        let container = label(&self.state);
        let field = self.state.field_name();
        let mut entries = Vec::with_capacity(pairs.len());
        for (raw_key, raw_value) in &pairs {
            let key = session
                .converters()
                .read(K::TYPE, Some(raw_key))
                .and_then(K::from_scalar)
                .map_err(MapperError::from)
                .map_err(|e| e.in_field(&container, field))?;
            let value = V::decode(raw_value, session).map_err(|e| e.in_field(&container, field))?;
            entries.push((key, value));
        }
        self.entries = entries;
        Ok(())
    }

    fn encode(&self, session: &Session) -> MapperResult<RawContent> {
        let pairs = self
            .entries
            .iter()
            .map(|(key, value)| {
                Ok((
                    session.converters().write_key(&key.to_scalar())?,
                    value.encode(session)?,
                ))
            })
            .collect::<MapperResult<_>>()?;
        Ok(RawContent::Map(pairs))
    }

    async fn persist_elements(&mut self, session: &Session) -> MapperResult<()> {
        if !V::ENTITY {
            return Ok(());
        }
        let parent = parent_key(&self.state)?;
        for (_, value) in &mut self.entries {
            value.persist(session, &parent).await?;
        }
        Ok(())
    }

    async fn discard_elements(&mut self, session: &Session) -> MapperResult<()> {
        for (_, value) in &mut self.entries {
            value.discard(session).await?;
        }
        Ok(())
    }
}
