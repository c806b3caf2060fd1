use thiserror::Error;

use crate::scalar::ScalarType;

/// Errors produced by scalar conversion and descriptor validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    /// A stored value could not be parsed as the declared scalar type.
    #[error("cannot read {value:?} as {ty}: {reason}")]
    Conversion {
        ty: ScalarType,
        value: String,
        reason: String,
    },

    /// A value of one scalar type was supplied where another was declared.
    #[error("type mismatch: expected {expected}, got {actual}")]
    Mismatch {
        expected: ScalarType,
        actual: ScalarType,
    },

    /// A map key or identifier field uses a type that does not convert
    /// losslessly to the store's text form.
    #[error("invalid key type {ty} for {context}")]
    InvalidKeyType { ty: ScalarType, context: String },

    /// A sorted-set element type has no usable order key.
    #[error("entity {entity} has no usable order key: {reason}")]
    MissingOrderKey { entity: String, reason: String },

    /// The entity descriptor is malformed.
    #[error("invalid descriptor for {entity}: {reason}")]
    InvalidDescriptor { entity: String, reason: String },

    /// No field with this name exists on the entity.
    #[error("unknown field {field} on {entity}")]
    UnknownField { entity: String, field: String },
}

/// Errors produced when building or parsing store keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is empty")]
    Empty,

    #[error("key {raw:?} has {count} segments, expected 1 to 3")]
    TooManySegments { raw: String, count: usize },

    #[error("key {raw:?} contains an empty segment")]
    EmptySegment { raw: String },

    #[error("{segment} segment {value:?} contains the reserved ':' separator")]
    ReservedSeparator { segment: &'static str, value: String },
}

/// Result alias for conversion and descriptor operations.
pub type TypeResult<T> = Result<T, TypeError>;
