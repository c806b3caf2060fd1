//! Values held inside tracked containers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kvgraph_types::{ElementKind, KeyDescriptor, ScalarType, ScalarValue, TypeResult};
use uuid::Uuid;

use crate::entity::Entity;
use crate::error::MapperResult;
use crate::session::Session;
use crate::tracked::Tracked;

/// A list element, map value, or sorted-set member.
///
/// Scalars encode through the session's converters. Entity references
/// encode as the referenced entity's formatted key and are saved or deleted
/// along with their container.
#[async_trait]
pub trait Element: Send + Sync + Sized + 'static {
    /// `true` for entity references.
    const ENTITY: bool;

    /// Store text for this element. Entity references must have an id.
    fn encode(&self, session: &Session) -> MapperResult<String>;

    fn decode(raw: &str, session: &Session) -> MapperResult<Self>;

    /// Whether two elements denote the same stored value.
    fn same(&self, other: &Self) -> bool;

    /// Whether this element fits a field declared with `kind`.
    fn fits(kind: &ElementKind) -> bool;

    /// Make the element storable: entity references get an id and are
    /// saved, and record `parent` as their owner.
    async fn persist(&mut self, _session: &Session, _parent: &KeyDescriptor) -> MapperResult<()> {
        Ok(())
    }

    /// Delete what the element owns in the store.
    async fn discard(&mut self, _session: &Session) -> MapperResult<()> {
        Ok(())
    }
}

/// A map key type. Only types whose text form round-trips losslessly
/// qualify, so there is no implementation for `f64`.
pub trait MapKey: Clone + PartialEq + Send + Sync + 'static {
    const TYPE: ScalarType;

    fn to_scalar(&self) -> ScalarValue;

    fn from_scalar(value: ScalarValue) -> TypeResult<Self>;
}

macro_rules! scalar_element {
    ($($rust:ty => $ty:ident),* $(,)?) => {
        $(
            impl Element for $rust {
                const ENTITY: bool = false;

                fn encode(&self, session: &Session) -> MapperResult<String> {
                    Ok(session.converters().write(&ScalarValue::from(self.clone()))?)
                }

                fn decode(raw: &str, session: &Session) -> MapperResult<Self> {
                    let value = session.converters().read(ScalarType::$ty, Some(raw))?;
                    Ok(<$rust>::try_from(value)?)
                }

                fn same(&self, other: &Self) -> bool {
                    self == other
                }

                fn fits(kind: &ElementKind) -> bool {
                    *kind == ElementKind::Scalar(ScalarType::$ty)
                }
            }
        )*
    };
}

scalar_element! {
    String => Text,
    i32 => Integer,
    i64 => Long,
    f64 => Double,
    bool => Bool,
    DateTime<Utc> => DateTime,
    Uuid => Uuid,
}

macro_rules! map_key {
    ($($rust:ty => $ty:ident),* $(,)?) => {
        $(
            impl MapKey for $rust {
                const TYPE: ScalarType = ScalarType::$ty;

                fn to_scalar(&self) -> ScalarValue {
                    ScalarValue::from(self.clone())
                }

                fn from_scalar(value: ScalarValue) -> TypeResult<Self> {
                    <$rust>::try_from(value)
                }
            }
        )*
    };
}

map_key! {
    String => Text,
    i32 => Integer,
    i64 => Long,
    bool => Bool,
    DateTime<Utc> => DateTime,
    Uuid => Uuid,
}

#[async_trait]
impl<E: Entity> Element for Tracked<E> {
    const ENTITY: bool = true;

    fn encode(&self, _session: &Session) -> MapperResult<String> {
        Ok(self.require_key()?.formatted())
    }

    fn decode(raw: &str, session: &Session) -> MapperResult<Self> {
        Tracked::reference(session, KeyDescriptor::parse(raw)?)
    }

    fn same(&self, other: &Self) -> bool {
        matches!((self.key(), other.key()), (Some(a), Some(b)) if a == b)
    }

    fn fits(kind: &ElementKind) -> bool {
        kind.is_entity()
    }

    async fn persist(&mut self, session: &Session, parent: &KeyDescriptor) -> MapperResult<()> {
        session.save(self).await?;
        self.state_mut().set_parent(parent.clone());
        Ok(())
    }

    async fn discard(&mut self, session: &Session) -> MapperResult<()> {
        session.delete(self).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use kvgraph_store::InMemoryStore;
    use kvgraph_types::TypeError;

    use super::*;
    use crate::error::MapperError;

    fn session() -> Session {
        Session::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn scalar_elements_use_the_converters() {
        let session = session();
        assert_eq!(42i64.encode(&session).unwrap(), "42");
        assert_eq!(i64::decode("42", &session).unwrap(), 42);
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let text = when.encode(&session).unwrap();
        assert_eq!(DateTime::<Utc>::decode(&text, &session).unwrap(), when);
    }

    #[test]
    fn non_numeric_text_is_a_conversion_error() {
        let err = i32::decode("abc", &session()).unwrap_err();
        assert!(matches!(err, MapperError::Type(TypeError::Conversion { .. })));
    }

    #[test]
    fn fits_checks_declared_kind() {
        assert!(String::fits(&ElementKind::Scalar(ScalarType::Text)));
        assert!(!String::fits(&ElementKind::Scalar(ScalarType::Long)));
        assert!(!i64::fits(&ElementKind::Entity("Order")));
    }

    #[test]
    fn map_keys_round_trip_through_scalars() {
        let id = Uuid::nil();
        assert_eq!(Uuid::from_scalar(id.to_scalar()).unwrap(), id);
        assert_eq!(<i32 as MapKey>::TYPE, ScalarType::Integer);
        assert!(String::from_scalar(ScalarValue::Long(1)).is_err());
    }
}
