use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::descriptor::{EntityDescriptor, FieldDescriptor};
use crate::error::KeyError;

/// Reserved separator between key segments.
pub const SEPARATOR: char = ':';

/// Three-part store key: `prefix:id:suffix`.
///
/// Absent segments are elided when formatting, so a key without a suffix
/// formats as `prefix:id`. Equality and hashing are defined over the
/// formatted key, not the structured fields. Colons are never allowed inside
/// a segment: construction and parsing both reject them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyDescriptor {
    prefix: Option<String>,
    id: String,
    suffix: Option<String>,
}

impl KeyDescriptor {
    /// Build a key from its parts. Empty prefix or suffix strings count as
    /// absent; an empty id is allowed only for counter keys.
    pub fn new(prefix: Option<&str>, id: &str, suffix: Option<&str>) -> Result<Self, KeyError> {
        let prefix = prefix.filter(|p| !p.is_empty());
        let suffix = suffix.filter(|s| !s.is_empty());
        check_segment("prefix", prefix)?;
        check_segment("id", Some(id))?;
        check_segment("suffix", suffix)?;
        Ok(Self {
            prefix: prefix.map(str::to_string),
            id: id.to_string(),
            suffix: suffix.map(str::to_string),
        })
    }

    /// Key of an entity's hash record, from its type metadata.
    pub fn for_type(descriptor: &EntityDescriptor, id: &str) -> Result<Self, KeyError> {
        Self::new(Some(descriptor.key_prefix()), id, descriptor.key_suffix())
    }

    /// Key of a container field owned by the entity `owner` with this id.
    pub fn for_field(
        owner: &EntityDescriptor,
        field: &FieldDescriptor,
        id: &str,
    ) -> Result<Self, KeyError> {
        Self::new(Some(owner.key_prefix()), id, Some(field.key_suffix()))
    }

    /// Parse a raw key of one to three colon-separated segments.
    ///
    /// One segment is an id, two are `prefix:id`, three are
    /// `prefix:id:suffix`.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        if raw.is_empty() {
            return Err(KeyError::Empty);
        }
        let segments: Vec<&str> = raw.split(SEPARATOR).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(KeyError::EmptySegment {
                raw: raw.to_string(),
            });
        }
        match segments.as_slice() {
            [id] => Self::new(None, id, None),
            [prefix, id] => Self::new(Some(*prefix), id, None),
            [prefix, id, suffix] => Self::new(Some(*prefix), id, Some(*suffix)),
            _ => Err(KeyError::TooManySegments {
                raw: raw.to_string(),
                count: segments.len(),
            }),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// A key sharing prefix and id with this one but with another suffix.
    pub fn with_suffix(&self, suffix: &str) -> Result<Self, KeyError> {
        Self::new(self.prefix(), &self.id, Some(suffix))
    }

    /// A key sharing prefix and suffix with this one but with another id.
    pub fn with_id(&self, id: &str) -> Result<Self, KeyError> {
        Self::new(self.prefix(), id, self.suffix())
    }

    /// The formatted `prefix:id:suffix` key.
    pub fn formatted(&self) -> String {
        join([self.prefix(), Some(self.id.as_str()), self.suffix()])
    }

    /// The counter key, `prefix:suffix`, used only for identifier
    /// allocation. It never includes the id.
    pub fn counter_key(&self) -> String {
        join([self.prefix(), None, self.suffix()])
    }
}

fn check_segment(segment: &'static str, value: Option<&str>) -> Result<(), KeyError> {
    match value {
        Some(v) if v.contains(SEPARATOR) => Err(KeyError::ReservedSeparator {
            segment,
            value: v.to_string(),
        }),
        _ => Ok(()),
    }
}

fn join(segments: [Option<&str>; 3]) -> String {
    segments
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

impl PartialEq for KeyDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.formatted() == other.formatted()
    }
}

impl Eq for KeyDescriptor {}

impl Hash for KeyDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.formatted().hash(state);
    }
}

impl fmt::Display for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}
