//! Static entity metadata.
//!
//! Every entity type publishes one [`EntityDescriptor`] listing its fields,
//! the identifier field, per-field cascade/lazy flags, and (for types used as
//! sorted-set members) the order key. Descriptors are built once through
//! [`EntityDescriptorBuilder`], which validates them, and are then looked up
//! by type identity at runtime instead of reflecting over the type.

use std::collections::HashSet;

use crate::error::{TypeError, TypeResult};
use crate::scalar::ScalarType;

/// Container shape served by one capability handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    List,
    Map,
    OrderedSet,
    Entity,
}

impl Capability {
    /// Handler priority: the first capability whose recognizer accepts a
    /// value wins.
    pub const PRIORITY: [Capability; 4] = [
        Capability::List,
        Capability::Map,
        Capability::OrderedSet,
        Capability::Entity,
    ];
}

/// What a list element or map value holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Scalar(ScalarType),
    /// A reference to another entity, stored as that entity's formatted key.
    Entity(&'static str),
}

impl ElementKind {
    pub fn is_entity(&self) -> bool {
        matches!(self, ElementKind::Entity(_))
    }
}

/// Shape of one entity field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldShape {
    /// Stored as one field of the owner's hash record.
    Scalar(ScalarType),
    /// A sub-record of the named type stored under its own prefix with the
    /// owner's id.
    Entity(&'static str),
    List(ElementKind),
    Map { key: ScalarType, value: ElementKind },
    /// Entity references ordered by the member type's order key.
    OrderedSet(&'static str),
}

impl FieldShape {
    /// The capability handler responsible for this shape, or `None` for
    /// plain scalars, which live inside the owner's hash record.
    pub fn capability(&self) -> Option<Capability> {
        match self {
            FieldShape::Scalar(_) => None,
            FieldShape::Entity(_) => Some(Capability::Entity),
            FieldShape::List(_) => Some(Capability::List),
            FieldShape::Map { .. } => Some(Capability::Map),
            FieldShape::OrderedSet(_) => Some(Capability::OrderedSet),
        }
    }

    /// Element kind of list, map, and sorted-set containers.
    pub fn element(&self) -> Option<ElementKind> {
        match self {
            FieldShape::List(element) => Some(*element),
            FieldShape::Map { value, .. } => Some(*value),
            FieldShape::OrderedSet(entity) => Some(ElementKind::Entity(entity)),
            _ => None,
        }
    }
}

/// Metadata for one field of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub shape: FieldShape,
    /// Marks the single identifier field.
    pub identifier: bool,
    /// Marks the field used as score when this entity is a sorted-set member.
    pub order_key: bool,
    /// Delete owned entities when they leave this container. Defaults on.
    pub cascade: bool,
    /// Defer loading until first access instead of materializing with the
    /// owner.
    pub lazy: bool,
    /// Overrides the field name as the container key suffix.
    pub suffix: Option<&'static str>,
}

impl FieldDescriptor {
    fn new(name: &'static str, shape: FieldShape) -> Self {
        Self {
            name,
            shape,
            identifier: false,
            order_key: false,
            cascade: true,
            lazy: false,
            suffix: None,
        }
    }

    /// The scalar type if this field is stored inside the hash record.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self.shape {
            FieldShape::Scalar(ty) => Some(ty),
            _ => None,
        }
    }

    /// Suffix of the container key derived from this field.
    pub fn key_suffix(&self) -> &'static str {
        self.suffix.unwrap_or(self.name)
    }
}

/// Metadata for one entity type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityDescriptor {
    name: &'static str,
    base: Option<&'static str>,
    prefix: Option<&'static str>,
    suffix: Option<&'static str>,
    fields: Vec<FieldDescriptor>,
    identifier: usize,
}

impl EntityDescriptor {
    /// Start describing the entity type `name`.
    pub fn builder(name: &'static str) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder {
            name,
            base: None,
            prefix: None,
            suffix: None,
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Base type name for types that are conceptually sub-records.
    pub fn base(&self) -> Option<&'static str> {
        self.base
    }

    /// Key prefix: the explicit override, else the base type's name, else
    /// the type's own name.
    pub fn key_prefix(&self) -> &'static str {
        self.prefix.or(self.base).unwrap_or(self.name)
    }

    pub fn key_suffix(&self) -> Option<&'static str> {
        self.suffix
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Like [`field`](Self::field) but reports unknown names as an error.
    pub fn require_field(&self, name: &str) -> TypeResult<&FieldDescriptor> {
        self.field(name).ok_or_else(|| TypeError::UnknownField {
            entity: self.name.to_string(),
            field: name.to_string(),
        })
    }

    /// The identifier field. Validation guarantees exactly one exists.
    pub fn identifier(&self) -> &FieldDescriptor {
        &self.fields[self.identifier]
    }

    /// Fields persisted inside the hash record, identifier included.
    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| matches!(f.shape, FieldShape::Scalar(_)))
    }

    /// Container and sub-record fields.
    pub fn member_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| !matches!(f.shape, FieldShape::Scalar(_)))
    }

    /// The order key used when this entity is a sorted-set member.
    pub fn order_key(&self) -> TypeResult<&FieldDescriptor> {
        let field = self
            .fields
            .iter()
            .find(|f| f.order_key)
            .ok_or_else(|| TypeError::MissingOrderKey {
                entity: self.name.to_string(),
                reason: "no field is marked as order key".into(),
            })?;
        match field.scalar_type() {
            Some(ty) if ty.is_orderable() => Ok(field),
            _ => Err(TypeError::MissingOrderKey {
                entity: self.name.to_string(),
                reason: format!(
                    "order key {} is not integer, long, double or date-time",
                    field.name
                ),
            }),
        }
    }
}

/// Builder for [`EntityDescriptor`].
///
/// Field modifiers (`lazy`, `no_cascade`, `with_suffix`) apply to the most
/// recently added field.
#[derive(Debug)]
pub struct EntityDescriptorBuilder {
    name: &'static str,
    base: Option<&'static str>,
    prefix: Option<&'static str>,
    suffix: Option<&'static str>,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptorBuilder {
    /// Declare the base type; its name becomes the default key prefix.
    pub fn base(mut self, base: &'static str) -> Self {
        self.base = Some(base);
        self
    }

    pub fn prefix(mut self, prefix: &'static str) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn suffix(mut self, suffix: &'static str) -> Self {
        self.suffix = Some(suffix);
        self
    }

    pub fn identifier(mut self, name: &'static str, ty: ScalarType) -> Self {
        let mut field = FieldDescriptor::new(name, FieldShape::Scalar(ty));
        field.identifier = true;
        self.fields.push(field);
        self
    }

    pub fn scalar(mut self, name: &'static str, ty: ScalarType) -> Self {
        self.fields
            .push(FieldDescriptor::new(name, FieldShape::Scalar(ty)));
        self
    }

    /// A scalar field that also orders this entity inside sorted sets.
    pub fn order_key(mut self, name: &'static str, ty: ScalarType) -> Self {
        let mut field = FieldDescriptor::new(name, FieldShape::Scalar(ty));
        field.order_key = true;
        self.fields.push(field);
        self
    }

    pub fn sub_record(mut self, name: &'static str, entity: &'static str) -> Self {
        self.fields
            .push(FieldDescriptor::new(name, FieldShape::Entity(entity)));
        self
    }

    pub fn list(mut self, name: &'static str, element: ElementKind) -> Self {
        self.fields
            .push(FieldDescriptor::new(name, FieldShape::List(element)));
        self
    }

    pub fn map(mut self, name: &'static str, key: ScalarType, value: ElementKind) -> Self {
        self.fields
            .push(FieldDescriptor::new(name, FieldShape::Map { key, value }));
        self
    }

    pub fn ordered_set(mut self, name: &'static str, entity: &'static str) -> Self {
        self.fields
            .push(FieldDescriptor::new(name, FieldShape::OrderedSet(entity)));
        self
    }

    /// Defer loading of the last field until first access.
    pub fn lazy(mut self) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.lazy = true;
        }
        self
    }

    /// Keep owned entities when they leave the last field's container.
    pub fn no_cascade(mut self) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.cascade = false;
        }
        self
    }

    /// Override the container key suffix of the last field.
    pub fn with_suffix(mut self, suffix: &'static str) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.suffix = Some(suffix);
        }
        self
    }

    /// Validate and finish the descriptor.
    pub fn build(self) -> TypeResult<EntityDescriptor> {
        let invalid = |reason: String| TypeError::InvalidDescriptor {
            entity: self.name.to_string(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("type name must not be empty".into()));
        }
        for segment in [Some(self.name), self.base, self.prefix, self.suffix]
            .into_iter()
            .flatten()
            .chain(self.fields.iter().map(FieldDescriptor::key_suffix))
        {
            if segment.contains(':') {
                return Err(invalid(format!("{segment:?} contains ':'")));
            }
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(invalid("field name must not be empty".into()));
            }
            if !seen.insert(field.name) {
                return Err(invalid(format!("duplicate field {}", field.name)));
            }
            if let FieldShape::Map { key, .. } = field.shape {
                if !key.is_lossless_key() {
                    return Err(TypeError::InvalidKeyType {
                        ty: key,
                        context: format!("map key of {}.{}", self.name, field.name),
                    });
                }
            }
        }

        let identifiers: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.identifier)
            .map(|(i, _)| i)
            .collect();
        let identifier = match identifiers.as_slice() {
            [index] => *index,
            [] => return Err(invalid("no identifier field".into())),
            _ => return Err(invalid("more than one identifier field".into())),
        };
        let id_type = self.fields[identifier].scalar_type();
        if let Some(ty) = id_type.filter(|ty| !ty.is_identifier()) {
            return Err(TypeError::InvalidKeyType {
                ty,
                context: format!("identifier of {}", self.name),
            });
        }

        let order_keys: Vec<&FieldDescriptor> =
            self.fields.iter().filter(|f| f.order_key).collect();
        if order_keys.len() > 1 {
            return Err(invalid("more than one order key".into()));
        }
        if let Some(field) = order_keys.first() {
            if !field.scalar_type().is_some_and(|ty| ty.is_orderable()) {
                return Err(TypeError::MissingOrderKey {
                    entity: self.name.to_string(),
                    reason: format!("order key {} has an unsupported type", field.name),
                });
            }
        }

        Ok(EntityDescriptor {
            name: self.name,
            base: self.base,
            prefix: self.prefix,
            suffix: self.suffix,
            fields: self.fields,
            identifier,
        })
    }
}
