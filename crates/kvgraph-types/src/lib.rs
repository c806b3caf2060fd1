//! Foundation types for kvgraph.
//!
//! kvgraph maps typed object graphs onto a key-value store's native
//! structures (hashes, lists, sorted sets). This crate holds the pieces that
//! every other kvgraph crate shares and that never touch the store:
//!
//! - [`KeyDescriptor`]: the three-part `prefix:id:suffix` store key
//! - [`ScalarType`] / [`ScalarValue`]: semantic scalar types and values
//! - [`ConverterRegistry`]: scalar values to and from store text
//! - [`EntityDescriptor`]: static per-type metadata replacing reflection

pub mod convert;
pub mod descriptor;
pub mod error;
pub mod key;
pub mod scalar;

pub use convert::{ConverterRegistry, ScalarConverter};
pub use descriptor::{
    Capability, ElementKind, EntityDescriptor, EntityDescriptorBuilder, FieldDescriptor,
    FieldShape,
};
pub use error::{KeyError, TypeError, TypeResult};
pub use key::KeyDescriptor;
pub use scalar::{ScalarType, ScalarValue};
