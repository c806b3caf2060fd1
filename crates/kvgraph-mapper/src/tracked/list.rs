use async_trait::async_trait;
use kvgraph_types::{Capability, FieldShape, KeyDescriptor};

use super::{cascades, check_shape, element_mismatch, label, load_member, parent_key};
use crate::element::Element;
use crate::engine::Retrieval;
use crate::entity::{Member, Owner, RawContent};
use crate::error::{MapperError, MapperResult};
use crate::handler::mismatch;
use crate::session::{Session, Structure};
use crate::state::ProxyState;

/// A list field backed by a store list.
///
/// Once bound, every mutation is applied to the backup and then to the
/// store before the in-memory list changes. An entity appears at most once:
/// pushing one that is already present moves it to the tail.
pub struct TrackedList<T: Element> {
    items: Vec<T>,
    state: ProxyState,
}

impl<T: Element> TrackedList<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            state: ProxyState::detached(),
        }
    }

    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    /// The in-memory items, without loading.
    pub fn peek(&self) -> &[T] {
        &self.items
    }

    pub async fn load(&mut self) -> MapperResult<Retrieval> {
        load_member(self).await
    }

    pub async fn items(&mut self) -> MapperResult<&[T]> {
        self.load().await?;
        Ok(&self.items)
    }

    pub async fn len(&mut self) -> MapperResult<usize> {
        self.load().await?;
        Ok(self.items.len())
    }

    pub async fn is_empty(&mut self) -> MapperResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Mutable access to one element. Entity elements write their own
    /// fields through; scalar changes made here are not written.
    pub async fn get_mut(&mut self, index: usize) -> MapperResult<Option<&mut T>> {
        self.load().await?;
        Ok(self.items.get_mut(index))
    }

    /// Session and container key for a write, or `None` to stay in memory.
    async fn begin_write(&mut self) -> MapperResult<Option<(Session, String)>> {
        self.load().await?;
        let Some(session) = self.state.live_session() else {
            return Ok(None);
        };
        session.restore_once(&mut self.state, Structure::List).await?;
        let key = self.state.require_key()?.formatted();
        Ok(Some((session, key)))
    }

    async fn prepare(&self, session: &Session, item: &mut T) -> MapperResult<String> {
        let parent = parent_key(&self.state)?;
        item.persist(session, &parent).await?;
        item.encode(session)
    }

    /// Take out entity elements equal to `item` ahead of re-adding it.
    async fn unlink(
        &mut self,
        session: &Session,
        key: &str,
        item: &T,
        value: &str,
    ) -> MapperResult<()> {
        if !T::ENTITY || !self.items.iter().any(|x| x.same(item)) {
            return Ok(());
        }
        session
            .best_effort("remove_list_item", key, session.backup().remove_list_item(key, value))
            .await;
        session.run(session.store().lrem(key, value)).await?;
        self.items.retain(|x| !x.same(item));
        Ok(())
    }

    /// Append to the tail.
    pub async fn push(&mut self, mut item: T) -> MapperResult<()> {
        let Some((session, key)) = self.begin_write().await? else {
            self.items.push(item);
            return Ok(());
        };
        let value = self.prepare(&session, &mut item).await?;
        self.unlink(&session, &key, &item, &value).await?;
        session
            .best_effort("add_list_item", &key, session.backup().add_list_item(&key, &value))
            .await;
        session.run(session.store().rpush(&key, &value)).await?;
        self.items.push(item);
        Ok(())
    }

    /// Prepend to the head.
    pub async fn push_front(&mut self, mut item: T) -> MapperResult<()> {
        let Some((session, key)) = self.begin_write().await? else {
            self.items.insert(0, item);
            return Ok(());
        };
        let value = self.prepare(&session, &mut item).await?;
        self.unlink(&session, &key, &item, &value).await?;
        session
            .best_effort(
                "push_front_list_item",
                &key,
                session.backup().push_front_list_item(&key, &value),
            )
            .await;
        session.run(session.store().lpush(&key, &value)).await?;
        self.items.insert(0, item);
        Ok(())
    }

    /// Remove every element equal to `item`, returning how many went.
    /// Referenced entities are deleted when the field cascades.
    pub async fn remove(&mut self, item: &T) -> MapperResult<usize> {
        let Some((session, key)) = self.begin_write().await? else {
            let before = self.items.len();
            self.items.retain(|x| !x.same(item));
            return Ok(before - self.items.len());
        };
        let before = self.items.len();
        if !self.items.iter().any(|x| x.same(item)) {
            return Ok(0);
        }
        let value = item.encode(&session)?;
        if T::ENTITY && cascades(&self.state) {
            for x in self.items.iter_mut().filter(|x| x.same(item)) {
                x.discard(&session).await?;
            }
        }
        session
            .best_effort(
                "remove_list_item",
                &key,
                session.backup().remove_list_item(&key, &value),
            )
            .await;
        session.run(session.store().lrem(&key, &value)).await?;
        self.items.retain(|x| !x.same(item));
        Ok(before - self.items.len())
    }

    /// Remove the element at `index`. In the store this removes every
    /// occurrence of its value, and the in-memory list follows.
    pub async fn remove_at(&mut self, index: usize) -> MapperResult<T> {
        self.load().await?;
        self.check_index(index)?;
        let Some((session, key)) = self.begin_write().await? else {
            return Ok(self.items.remove(index));
        };
        let value = self.items[index].encode(&session)?;
        if T::ENTITY && cascades(&self.state) {
            self.items[index].discard(&session).await?;
        }
        session
            .best_effort(
                "remove_list_item",
                &key,
                session.backup().remove_list_item(&key, &value),
            )
            .await;
        session.run(session.store().lrem(&key, &value)).await?;
        let removed = self.items.remove(index);
        self.items.retain(|x| !x.same(&removed));
        Ok(removed)
    }

    /// Replace the element at `index`, returning the old one. In the store
    /// the old value is removed and the new one appended, so a bound list
    /// moves the new element to the tail.
    pub async fn set(&mut self, index: usize, mut item: T) -> MapperResult<T> {
        self.load().await?;
        self.check_index(index)?;
        let Some((session, key)) = self.begin_write().await? else {
            return Ok(std::mem::replace(&mut self.items[index], item));
        };
        let value = self.prepare(&session, &mut item).await?;
        let old = self.items[index].encode(&session)?;
        if T::ENTITY && cascades(&self.state) && !self.items[index].same(&item) {
            self.items[index].discard(&session).await?;
        }
        session
            .best_effort(
                "update_list_item",
                &key,
                session.backup().update_list_item(&key, &old, &value),
            )
            .await;
        session.run(session.store().lrem(&key, &old)).await?;
        session.run(session.store().rpush(&key, &value)).await?;
        let replaced = self.items.remove(index);
        self.items.retain(|x| !x.same(&replaced));
        self.items.push(item);
        Ok(replaced)
    }

    fn check_index(&self, index: usize) -> MapperResult<()> {
        if index < self.items.len() {
            return Ok(());
        }
        Err(MapperError::IndexOutOfRange {
            key: label(&self.state),
            index,
            len: self.items.len(),
        })
    }
}

impl<T: Element> Default for TrackedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> From<Vec<T>> for TrackedList<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            items,
            state: ProxyState::detached(),
        }
    }
}

impl<T: Element + std::fmt::Debug> std::fmt::Debug for TrackedList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedList")
            .field("items", &self.items)
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl<T: Element> Member for TrackedList<T> {
    fn capability(&self) -> Capability {
        Capability::List
    }

    fn state(&self) -> &ProxyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProxyState {
        &mut self.state
    }

    fn attach(&mut self, session: &Session, owner: Owner<'_>, loaded: bool) -> MapperResult<bool> {
        check_shape(&owner, Capability::List)?;
        match owner.field.shape {
            FieldShape::List(element) if T::fits(&element) => {}
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
        self.items.clear();
    }

    fn holds_entities(&self) -> bool {
        T::ENTITY
    }

    fn decode(&mut self, raw: RawContent, session: &Session) -> MapperResult<()> {
        let RawContent::List(values) = raw else {
            return Err(mismatch(self, Capability::List));
        };
        let key = label(&self.state);
        self.items = values
            .iter()
            .map(|v| T::decode(v, session).map_err(|e| e.in_field(&key, self.state.field_name())))
            .collect::<MapperResult<_>>()?;
        Ok(())
    }

    fn encode(&self, session: &Session) -> MapperResult<RawContent> {
        let values = self
            .items
            .iter()
            .map(|item| item.encode(session))
            .collect::<MapperResult<_>>()?;
        Ok(RawContent::List(values))
    }

    async fn persist_elements(&mut self, session: &Session) -> MapperResult<()> {
        if !T::ENTITY {
            return Ok(());
        }
        let parent = parent_key(&self.state)?;
        for item in &mut self.items {
            item.persist(session, &parent).await?;
        }
        Ok(())
    }

    async fn discard_elements(&mut self, session: &Session) -> MapperResult<()> {
        for item in &mut self.items {
            item.discard(session).await?;
        }
        Ok(())
    }
}
