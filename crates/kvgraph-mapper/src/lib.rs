//! Object mapping for kvgraph.
//!
//! Maps entity graphs onto key-value store structures: each entity is a hash
//! record, list and map fields are lists and hashes under the owner's key,
//! and ordered-set fields are sorted sets scored by the member's order key.
//! Objects are materialized lazily: a [`Tracked`] proxy loads itself on first
//! access, and once bound its mutations are written through to the store and
//! mirrored to a [`Backup`](kvgraph_backup::Backup).
//!
//! The entry point is [`Session`].

pub mod config;
pub mod element;
pub mod engine;
pub mod entity;
pub mod error;
pub mod handler;
pub mod ident;
pub mod session;
pub mod state;
pub mod tracked;

#[cfg(test)]
mod fixtures;

pub use config::MapperConfig;
pub use element::{Element, MapKey};
pub use engine::{MaterializationEngine, Retrieval, Retrieved};
pub use entity::{Entity, Member, Owner, RawContent, Record};
pub use error::{MapperError, MapperResult};
pub use handler::{CapabilityHandler, HandlerSet};
pub use ident::counter_key;
pub use session::{Session, SessionBuilder};
pub use state::{Phase, ProxyState};
pub use tracked::{Tracked, TrackedList, TrackedMap, TrackedSet};

// Re-export the types entity definitions need
pub use kvgraph_types::{
    Capability, ElementKind, EntityDescriptor, FieldDescriptor, FieldShape, KeyDescriptor,
    ScalarType, ScalarValue, TypeError, TypeResult,
};
