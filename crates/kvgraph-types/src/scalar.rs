use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Semantic type of a scalar field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarType {
    Text,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    Double,
    Bool,
    DateTime,
    Uuid,
}

impl ScalarType {
    /// All scalar types, in registration order.
    pub const ALL: [ScalarType; 7] = [
        ScalarType::Text,
        ScalarType::Integer,
        ScalarType::Long,
        ScalarType::Double,
        ScalarType::Bool,
        ScalarType::DateTime,
        ScalarType::Uuid,
    ];

    /// Whether values of this type survive a round trip through the store's
    /// text form without loss, which map keys and identifiers require.
    pub fn is_lossless_key(&self) -> bool {
        !matches!(self, ScalarType::Double)
    }

    /// Whether this type may serve as a sorted-set order key.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            ScalarType::Integer | ScalarType::Long | ScalarType::Double | ScalarType::DateTime
        )
    }

    /// Whether this type may serve as an entity identifier.
    pub fn is_identifier(&self) -> bool {
        matches!(self, ScalarType::Text | ScalarType::Uuid)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Text => "text",
            ScalarType::Integer => "integer",
            ScalarType::Long => "long",
            ScalarType::Double => "double",
            ScalarType::Bool => "bool",
            ScalarType::DateTime => "date-time",
            ScalarType::Uuid => "uuid",
        };
        f.write_str(name)
    }
}

/// A scalar value held by an entity field or a container element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Text(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
}

impl ScalarValue {
    /// The semantic type of this value.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::Text(_) => ScalarType::Text,
            ScalarValue::Integer(_) => ScalarType::Integer,
            ScalarValue::Long(_) => ScalarType::Long,
            ScalarValue::Double(_) => ScalarType::Double,
            ScalarValue::Bool(_) => ScalarType::Bool,
            ScalarValue::DateTime(_) => ScalarType::DateTime,
            ScalarValue::Uuid(_) => ScalarType::Uuid,
        }
    }

    /// The zero value of a scalar type.
    pub fn zero(ty: ScalarType) -> Self {
        match ty {
            ScalarType::Text => ScalarValue::Text(String::new()),
            ScalarType::Integer => ScalarValue::Integer(0),
            ScalarType::Long => ScalarValue::Long(0),
            ScalarType::Double => ScalarValue::Double(0.0),
            ScalarType::Bool => ScalarValue::Bool(false),
            ScalarType::DateTime => ScalarValue::DateTime(DateTime::<Utc>::default()),
            ScalarType::Uuid => ScalarValue::Uuid(Uuid::nil()),
        }
    }

    /// Sorted-set score for orderable values. Date-times score as
    /// milliseconds since the Unix epoch.
    pub fn as_score(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(v) => Some(f64::from(*v)),
            ScalarValue::Long(v) => Some(*v as f64),
            ScalarValue::Double(v) => Some(*v),
            ScalarValue::DateTime(v) => Some(v.timestamp_millis() as f64),
            _ => None,
        }
    }

    /// Returns `true` for an empty text or nil UUID, the "no identifier yet"
    /// states of an identifier field.
    pub fn is_empty_identifier(&self) -> bool {
        match self {
            ScalarValue::Text(s) => s.is_empty(),
            ScalarValue::Uuid(u) => u.is_nil(),
            _ => false,
        }
    }

    /// Identifier text as it appears in a formatted key.
    pub fn identifier_text(&self) -> Option<String> {
        match self {
            ScalarValue::Text(s) if !s.is_empty() => Some(s.clone()),
            ScalarValue::Uuid(u) if !u.is_nil() => Some(u.to_string()),
            _ => None,
        }
    }
}

macro_rules! scalar_conversions {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$rust> for ScalarValue {
                fn from(value: $rust) -> Self {
                    ScalarValue::$variant(value)
                }
            }

            impl TryFrom<ScalarValue> for $rust {
                type Error = TypeError;

                fn try_from(value: ScalarValue) -> Result<Self, Self::Error> {
                    match value {
                        ScalarValue::$variant(v) => Ok(v),
                        other => Err(TypeError::Mismatch {
                            expected: ScalarType::$variant,
                            actual: other.scalar_type(),
                        }),
                    }
                }
            }
        )*
    };
}

scalar_conversions! {
    String => Text,
    i32 => Integer,
    i64 => Long,
    f64 => Double,
    bool => Bool,
    DateTime<Utc> => DateTime,
    Uuid => Uuid,
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}
