//! Per-proxy load state.
//!
//! Every tracked entity and container carries a [`ProxyState`]. It records
//! where the proxy lives in the store, which session it talks to, and two
//! flags: `processing` is set while a load or cascading save is in flight
//! and makes interceptors pass through, `processed` is set after the first
//! load and stays set for the life of the proxy.
//!
//! ```text
//! Unloaded --first access--> Loading --success--> Loaded
//!     ^                         |
//!     +---- error / cancel -----+
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kvgraph_types::{FieldDescriptor, KeyDescriptor};

use crate::error::{MapperError, MapperResult};
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Debug, Default)]
struct LoadFlags {
    processed: AtomicBool,
    processing: AtomicBool,
    found: AtomicBool,
}

/// Clears `processing` when dropped, whichever way the load exits.
#[must_use = "dropping the guard immediately ends the load"]
pub(crate) struct ProcessingGuard {
    flags: Arc<LoadFlags>,
}

impl ProcessingGuard {
    /// Mark the load successful.
    pub(crate) fn complete(self, found: bool) {
        self.flags.found.store(found, Ordering::Release);
        self.flags.processed.store(true, Ordering::Release);
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.flags.processing.store(false, Ordering::Release);
    }
}

pub struct ProxyState {
    session: Option<Session>,
    key: Option<KeyDescriptor>,
    parent: Option<KeyDescriptor>,
    field: Option<FieldDescriptor>,
    flags: Arc<LoadFlags>,
    restored: bool,
}

impl ProxyState {
    /// State of an object built in memory. There is nothing to load, so it
    /// starts out loaded.
    pub fn detached() -> Self {
        let flags = LoadFlags::default();
        flags.processed.store(true, Ordering::Release);
        Self {
            session: None,
            key: None,
            parent: None,
            field: None,
            flags: Arc::new(flags),
            restored: false,
        }
    }

    /// State of a proxy for a stored record that has not been read yet.
    pub(crate) fn unloaded(session: &Session, key: KeyDescriptor) -> Self {
        Self {
            session: Some(session.clone()),
            key: Some(key),
            parent: None,
            field: None,
            flags: Arc::new(LoadFlags::default()),
            restored: false,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.is_processing() {
            Phase::Loading
        } else if self.is_processed() {
            Phase::Loaded
        } else {
            Phase::Unloaded
        }
    }

    pub fn is_processed(&self) -> bool {
        self.flags.processed.load(Ordering::Acquire)
    }

    pub fn is_processing(&self) -> bool {
        self.flags.processing.load(Ordering::Acquire)
    }

    /// Whether the last load found a stored record.
    pub fn was_found(&self) -> bool {
        self.flags.found.load(Ordering::Acquire)
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    pub fn key(&self) -> Option<&KeyDescriptor> {
        self.key.as_ref()
    }

    /// Key of the entity that owns this proxy, if any.
    pub fn parent(&self) -> Option<&KeyDescriptor> {
        self.parent.as_ref()
    }

    pub fn field(&self) -> Option<&FieldDescriptor> {
        self.field.as_ref()
    }

    pub(crate) fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub(crate) fn require_key(&self) -> MapperResult<&KeyDescriptor> {
        self.key.as_ref().ok_or_else(|| {
            MapperError::Detached(
                self.field
                    .as_ref()
                    .map_or_else(|| "object".to_string(), |f| format!("field {}", f.name)),
            )
        })
    }

    /// Field name used in error context.
    pub(crate) fn field_name(&self) -> &str {
        self.field.as_ref().map_or("", |f| f.name)
    }

    /// Session to route a mutation through, or `None` when the mutation
    /// should stay in memory: the proxy is detached, or a load or cascading
    /// save is already running on it.
    pub(crate) fn live_session(&self) -> Option<Session> {
        if self.is_processing() {
            return None;
        }
        self.session.clone()
    }

    /// Session to load through if the proxy still has to be loaded.
    pub(crate) fn pending_load(&self) -> Option<Session> {
        match self.phase() {
            Phase::Unloaded => self.session.clone(),
            _ => None,
        }
    }

    /// Bind the proxy to a store key. Rebinding to the same key keeps the
    /// current flags. Returns `true` if the proxy was not bound there before.
    pub(crate) fn attach(
        &mut self,
        session: &Session,
        key: KeyDescriptor,
        parent: Option<KeyDescriptor>,
        field: Option<FieldDescriptor>,
        loaded: bool,
    ) -> bool {
        if self.session.is_some() && self.key.as_ref() == Some(&key) {
            if parent.is_some() {
                self.parent = parent;
            }
            return false;
        }
        self.session = Some(session.clone());
        self.key = Some(key);
        self.parent = parent;
        self.field = field;
        self.restored = false;
        self.flags = Arc::new(LoadFlags::default());
        if loaded {
            self.flags.found.store(true, Ordering::Release);
            self.flags.processed.store(true, Ordering::Release);
        }
        true
    }

    pub(crate) fn set_parent(&mut self, parent: KeyDescriptor) {
        self.parent = Some(parent);
    }

    /// Enter `Loading`. Returns `None` if a load is already running.
    pub(crate) fn begin(&self) -> Option<ProcessingGuard> {
        self.flags
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard {
                flags: Arc::clone(&self.flags),
            })
    }

    /// Returns `true` exactly once per binding: the first caller restores
    /// the key from the backup.
    pub(crate) fn take_restore(&mut self) -> bool {
        !std::mem::replace(&mut self.restored, true)
    }

    /// After a delete the proxy is loaded and empty.
    pub(crate) fn mark_deleted(&self) {
        self.flags.found.store(false, Ordering::Release);
        self.flags.processed.store(true, Ordering::Release);
    }
}

impl Default for ProxyState {
    fn default() -> Self {
        Self::detached()
    }
}

impl fmt::Debug for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyState")
            .field("key", &self.key.as_ref().map(KeyDescriptor::formatted))
            .field("parent", &self.parent.as_ref().map(KeyDescriptor::formatted))
            .field("phase", &self.phase())
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kvgraph_store::InMemoryStore;

    use super::*;

    fn session() -> Session {
        Session::new(Arc::new(InMemoryStore::new()))
    }

    fn key(id: &str) -> KeyDescriptor {
        KeyDescriptor::new(Some("Order"), id, None).unwrap()
    }

    #[test]
    fn detached_state_is_loaded() {
        let state = ProxyState::detached();
        assert_eq!(state.phase(), Phase::Loaded);
        assert!(!state.is_attached());
        assert!(state.pending_load().is_none());
    }

    #[test]
    fn guard_transitions_to_loaded() {
        let state = ProxyState::unloaded(&session(), key("1"));
        assert_eq!(state.phase(), Phase::Unloaded);
        let guard = state.begin().unwrap();
        assert_eq!(state.phase(), Phase::Loading);
        assert!(state.begin().is_none());
        assert!(state.live_session().is_none());
        guard.complete(true);
        assert_eq!(state.phase(), Phase::Loaded);
        assert!(state.was_found());
    }

    #[test]
    fn dropped_guard_resets_processing() {
        let state = ProxyState::unloaded(&session(), key("1"));
        {
            let _guard = state.begin().unwrap();
            assert!(state.is_processing());
        }
        assert!(!state.is_processing());
        assert_eq!(state.phase(), Phase::Unloaded);
    }

    #[test]
    fn attach_is_idempotent_per_key() {
        let session = session();
        let mut state = ProxyState::detached();
        assert!(state.attach(&session, key("1"), None, None, false));
        assert_eq!(state.phase(), Phase::Unloaded);
        assert!(!state.attach(&session, key("1"), None, None, true));
        assert_eq!(state.phase(), Phase::Unloaded);
        assert!(state.attach(&session, key("2"), None, None, true));
        assert_eq!(state.phase(), Phase::Loaded);
    }

    #[test]
    fn restore_is_taken_once() {
        let mut state = ProxyState::unloaded(&session(), key("1"));
        assert!(state.take_restore());
        assert!(!state.take_restore());
    }
}
