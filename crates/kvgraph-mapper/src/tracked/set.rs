use async_trait::async_trait;
use kvgraph_types::{Capability, FieldShape, KeyDescriptor, TypeError};

use super::{
    cascades, check_shape, describe, element_mismatch, label, load_member, parent_key, Tracked,
};
use crate::element::Element;
use crate::engine::Retrieval;
use crate::entity::{Entity, Member, Owner, RawContent};
use crate::error::{MapperError, MapperResult};
use crate::handler::{drop_stale, mismatch};
use crate::session::{Session, Structure};
use crate::state::ProxyState;

/// An ordered-set field backed by a store sorted set.
///
/// Members are entity references scored by the member type's order key and
/// kept in ascending score order. Adding a member that is already present
/// re-scores it.
pub struct TrackedSet<E: Entity> {
    entries: Vec<(Tracked<E>, f64)>,
    state: ProxyState,
}

fn set_member(entry: &(String, f64)) -> &str {
    &entry.0
}

fn member_text<E: Entity>(item: &Tracked<E>) -> String {
    item.key().map(KeyDescriptor::formatted).unwrap_or_default()
}

impl<E: Entity> TrackedSet<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            state: ProxyState::detached(),
        }
    }

    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    /// Members and scores in memory, without loading.
    pub fn peek(&self) -> &[(Tracked<E>, f64)] {
        &self.entries
    }

    pub async fn load(&mut self) -> MapperResult<Retrieval> {
        load_member(self).await
    }

    pub async fn entries(&mut self) -> MapperResult<&[(Tracked<E>, f64)]> {
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

    /// Score of `item` from its order-key field.
    async fn score(&self, item: &mut Tracked<E>) -> MapperResult<f64> {
        let descriptor = describe::<E>(&self.state)?;
        let order = descriptor.order_key()?;
        let value = item.get().await?.get(order.name);
        value
            .and_then(|v| v.as_score())
            .ok_or_else(|| {
                TypeError::MissingOrderKey {
                    entity: descriptor.name().to_string(),
                    reason: format!("field {} holds no orderable value", order.name),
                }
                .into()
            })
    }

    /// Insert in store order: by score, ties by member key.
    fn place(&mut self, item: Tracked<E>, score: f64) {
        self.entries.retain(|(x, _)| !x.same(&item));
        let member = member_text(&item);
        let at = self
            .entries
            .partition_point(|(x, s)| *s < score || (*s == score && member_text(x) <= member));
        self.entries.insert(at, (item, score));
    }

    /// Add or re-score a member, returning its score. New entities are
    /// saved first.
    pub async fn insert(&mut self, mut item: Tracked<E>) -> MapperResult<f64> {
        self.load().await?;
        let score = self.score(&mut item).await?;
        let Some(session) = self.state.live_session() else {
            self.place(item, score);
            return Ok(score);
        };
        session.restore_once(&mut self.state, Structure::Set).await?;
        let key = self.state.require_key()?.formatted();
        item.persist(&session, &parent_key(&self.state)?).await?;
        let member = Element::encode(&item, &session)?;
        let backup = session.backup();
        if self.entries.iter().any(|(x, _)| x.same(&item)) {
            session
                .best_effort("update_set_item", &key, backup.update_set_item(&key, &member, score))
                .await;
        } else {
            session
                .best_effort("add_set_item", &key, backup.add_set_item(&key, &member, score))
                .await;
        }
        session.run(session.store().zadd(&key, &member, score)).await?;
        self.place(item, score);
        Ok(score)
    }

    /// Remove a member. The entity is deleted when the field cascades.
    pub async fn remove(&mut self, item: &Tracked<E>) -> MapperResult<bool> {
        self.load().await?;
        let Some(index) = self.entries.iter().position(|(x, _)| x.same(item)) else {
            return Ok(false);
        };
        self.remove_at(index).await?;
        Ok(true)
    }

    /// Remove the member at `index` in score order.
    pub async fn remove_at(&mut self, index: usize) -> MapperResult<Tracked<E>> {
        self.load().await?;
        if index >= self.entries.len() {
            return Err(MapperError::IndexOutOfRange {
                key: label(&self.state),
                index,
                len: self.entries.len(),
            });
        }
        let Some(session) = self.state.live_session() else {
            return Ok(self.entries.remove(index).0);
        };
        session.restore_once(&mut self.state, Structure::Set).await?;
        let key = self.state.require_key()?.formatted();
        let member = Element::encode(&self.entries[index].0, &session)?;
        if cascades(&self.state) {
            self.entries[index].0.discard(&session).await?;
        }
        session
            .best_effort(
                "remove_set_item",
                &key,
                session.backup().remove_set_item(&key, &member),
            )
            .await;
        session.run(session.store().zrem(&key, &member)).await?;
        Ok(self.entries.remove(index).0)
    }

    /// Members scored between `min` and `max` inclusive, read from the store
    /// as unloaded references.
    pub async fn range_by_score(&mut self, min: f64, max: f64) -> MapperResult<Vec<Tracked<E>>> {
        let Some(session) = self.state.session().cloned() else {
            return Err(MapperError::Detached(format!(
                "field {}",
                self.state.field_name()
            )));
        };
        session.restore_once(&mut self.state, Structure::Set).await?;
        let key = self.state.require_key()?.formatted();
        let found = session
            .run(session.store().zrange_by_score(&key, min, max))
            .await?;
        let kept = drop_stale(
            &session,
            &key,
            Structure::Set,
            found.clone(),
            set_member,
            set_member,
        )
        .await?;
        if kept.len() < found.len() {
            let stale: Vec<&str> = found
                .iter()
                .map(|(member, _)| member.as_str())
                .filter(|member| !kept.iter().any(|(k, _)| k == member))
                .collect();
            self.entries.retain(|(x, _)| !stale.contains(&member_text(x).as_str()));
        }
        kept
            .iter()
            .map(|(member, _)| Tracked::reference(&session, KeyDescriptor::parse(member)?))
            .collect()
    }
}

impl<E: Entity> Default for TrackedSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity + std::fmt::Debug> std::fmt::Debug for TrackedSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedSet")
            .field("entries", &self.entries)
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl<E: Entity> Member for TrackedSet<E> {
    fn capability(&self) -> Capability {
        Capability::OrderedSet
    }

    fn state(&self) -> &ProxyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProxyState {
        &mut self.state
    }

    fn attach(&mut self, session: &Session, owner: Owner<'_>, loaded: bool) -> MapperResult<bool> {
        check_shape(&owner, Capability::OrderedSet)?;
        let descriptor = session.descriptor::<E>()?;
        match owner.field.shape {
            FieldShape::OrderedSet(name) if name == descriptor.name() => {}
            _ => return Err(element_mismatch(&owner)),
        }
        descriptor.order_key()?;
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
        true
    }

    fn decode(&mut self, raw: RawContent, session: &Session) -> MapperResult<()> {
        let RawContent::Set(members) = raw else {
            return Err(mismatch(self, Capability::OrderedSet));
        };
        self.entries = members
            .iter()
            .map(|(member, score)| Ok((<Tracked<E> as Element>::decode(member, session)?, *score)))
            .collect::<MapperResult<_>>()?;
        Ok(())
    }

    fn encode(&self, session: &Session) -> MapperResult<RawContent> {
        let members = self
            .entries
            .iter()
            .map(|(item, score)| Ok((Element::encode(item, session)?, *score)))
            .collect::<MapperResult<_>>()?;
        Ok(RawContent::Set(members))
    }

    async fn persist_elements(&mut self, session: &Session) -> MapperResult<()> {
        let parent = parent_key(&self.state)?;
        for (item, _) in &mut self.entries {
            item.persist(session, &parent).await?;
        }
        Ok(())
    }

    async fn discard_elements(&mut self, session: &Session) -> MapperResult<()> {
        for (item, _) in &mut self.entries {
            item.discard(session).await?;
        }
        Ok(())
    }
}
