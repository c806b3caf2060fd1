//! Scalar conversion between entity values and the store's text form.
//!
//! A [`ConverterRegistry`] holds one [`ScalarConverter`] per [`ScalarType`].
//! Writing produces the text stored in a hash field, list element, or map
//! entry; reading parses it back.
//!
//! # Absent values
//!
//! Reading an absent value yields the type's zero value: `""`, `0`, `0.0`,
//! `false`, the Unix epoch, or the nil UUID. The UUID converter can run in
//! strict mode instead, where an absent value is a [`TypeError::Conversion`].
//! Unparseable text is always an error and never coerced to zero.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{TypeError, TypeResult};
use crate::scalar::{ScalarType, ScalarValue};

/// Converts one scalar type to and from store text.
pub trait ScalarConverter: Send + Sync {
    fn scalar_type(&self) -> ScalarType;

    /// Encode a value of this converter's type.
    fn write(&self, value: &ScalarValue) -> TypeResult<String>;

    /// Decode stored text; `None` means the value is absent.
    fn read(&self, raw: Option<&str>) -> TypeResult<ScalarValue>;
}

fn conversion_error(ty: ScalarType, raw: &str, reason: impl fmt::Display) -> TypeError {
    TypeError::Conversion {
        ty,
        value: raw.to_string(),
        reason: reason.to_string(),
    }
}

fn expect_type(expected: ScalarType, value: &ScalarValue) -> TypeResult<()> {
    if value.scalar_type() == expected {
        Ok(())
    } else {
        Err(TypeError::Mismatch {
            expected,
            actual: value.scalar_type(),
        })
    }
}

#[derive(Debug, Default)]
struct TextConverter;

impl ScalarConverter for TextConverter {
    fn scalar_type(&self) -> ScalarType {
        ScalarType::Text
    }

    fn write(&self, value: &ScalarValue) -> TypeResult<String> {
        match value {
            ScalarValue::Text(s) => Ok(s.clone()),
            other => Err(TypeError::Mismatch {
                expected: ScalarType::Text,
                actual: other.scalar_type(),
            }),
        }
    }

    fn read(&self, raw: Option<&str>) -> TypeResult<ScalarValue> {
        Ok(ScalarValue::Text(raw.unwrap_or_default().to_string()))
    }
}

/// Numbers and booleans: `Display` out, `FromStr` in.
#[derive(Debug)]
struct ParseConverter {
    ty: ScalarType,
}

impl ScalarConverter for ParseConverter {
    fn scalar_type(&self) -> ScalarType {
        self.ty
    }

    fn write(&self, value: &ScalarValue) -> TypeResult<String> {
        expect_type(self.ty, value)?;
        match value {
            ScalarValue::Integer(v) => Ok(v.to_string()),
            ScalarValue::Long(v) => Ok(v.to_string()),
            ScalarValue::Double(v) => Ok(v.to_string()),
            ScalarValue::Bool(v) => Ok(v.to_string()),
            other => Err(TypeError::Mismatch {
                expected: self.ty,
                actual: other.scalar_type(),
            }),
        }
    }

    fn read(&self, raw: Option<&str>) -> TypeResult<ScalarValue> {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Ok(ScalarValue::zero(self.ty));
        };
        let text = raw.trim();
        let err = |e: &dyn fmt::Display| conversion_error(self.ty, raw, e);
        match self.ty {
            ScalarType::Integer => text.parse().map(ScalarValue::Integer).map_err(|e| err(&e)),
            ScalarType::Long => text.parse().map(ScalarValue::Long).map_err(|e| err(&e)),
            ScalarType::Double => text.parse().map(ScalarValue::Double).map_err(|e| err(&e)),
            ScalarType::Bool => text.parse().map(ScalarValue::Bool).map_err(|e| err(&e)),
            other => Err(TypeError::Mismatch {
                expected: self.ty,
                actual: other,
            }),
        }
    }
}

/// Date-times as RFC 3339 with millisecond precision. Integer text is also
/// accepted on read, as milliseconds since the Unix epoch.
#[derive(Debug, Default)]
struct DateTimeConverter;

impl ScalarConverter for DateTimeConverter {
    fn scalar_type(&self) -> ScalarType {
        ScalarType::DateTime
    }

    fn write(&self, value: &ScalarValue) -> TypeResult<String> {
        match value {
            ScalarValue::DateTime(at) => Ok(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            other => Err(TypeError::Mismatch {
                expected: ScalarType::DateTime,
                actual: other.scalar_type(),
            }),
        }
    }

    fn read(&self, raw: Option<&str>) -> TypeResult<ScalarValue> {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Ok(ScalarValue::zero(ScalarType::DateTime));
        };
        if let Ok(millis) = raw.parse::<i64>() {
            return DateTime::<Utc>::from_timestamp_millis(millis)
                .map(ScalarValue::DateTime)
                .ok_or_else(|| conversion_error(ScalarType::DateTime, raw, "out of range"));
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|at| ScalarValue::DateTime(at.with_timezone(&Utc)))
            .map_err(|e| conversion_error(ScalarType::DateTime, raw, e))
    }
}

#[derive(Debug, Default)]
struct UuidConverter {
    strict: bool,
}

impl ScalarConverter for UuidConverter {
    fn scalar_type(&self) -> ScalarType {
        ScalarType::Uuid
    }

    fn write(&self, value: &ScalarValue) -> TypeResult<String> {
        match value {
            ScalarValue::Uuid(u) => Ok(u.to_string()),
            other => Err(TypeError::Mismatch {
                expected: ScalarType::Uuid,
                actual: other.scalar_type(),
            }),
        }
    }

    fn read(&self, raw: Option<&str>) -> TypeResult<ScalarValue> {
        match raw.filter(|r| !r.is_empty()) {
            Some(raw) => Uuid::parse_str(raw)
                .map(ScalarValue::Uuid)
                .map_err(|e| conversion_error(ScalarType::Uuid, raw, e)),
            None if self.strict => Err(conversion_error(ScalarType::Uuid, "", "value is absent")),
            None => Ok(ScalarValue::Uuid(Uuid::nil())),
        }
    }
}

/// One converter per scalar type.
pub struct ConverterRegistry {
    converters: HashMap<ScalarType, Box<dyn ScalarConverter>>,
}

impl ConverterRegistry {
    /// Registry with the built-in converters and lenient UUID reads.
    pub fn new() -> Self {
        Self::with_strict_uuid(false)
    }

    /// Registry with the built-in converters; `strict` makes reading an
    /// absent UUID an error.
    pub fn with_strict_uuid(strict: bool) -> Self {
        let mut registry = Self {
            converters: HashMap::new(),
        };
        registry.register(Box::new(TextConverter));
        for ty in [
            ScalarType::Integer,
            ScalarType::Long,
            ScalarType::Double,
            ScalarType::Bool,
        ] {
            registry.register(Box::new(ParseConverter { ty }));
        }
        registry.register(Box::new(DateTimeConverter));
        registry.register(Box::new(UuidConverter { strict }));
        registry
    }

    /// Install a converter, replacing any existing one for its type.
    pub fn register(&mut self, converter: Box<dyn ScalarConverter>) {
        self.converters.insert(converter.scalar_type(), converter);
    }

    fn converter(&self, ty: ScalarType) -> TypeResult<&dyn ScalarConverter> {
        self.converters
            .get(&ty)
            .map(|c| c.as_ref())
            .ok_or_else(|| conversion_error(ty, "", "no converter registered"))
    }

    /// Encode a value for the store.
    pub fn write(&self, value: &ScalarValue) -> TypeResult<String> {
        self.converter(value.scalar_type())?.write(value)
    }

    /// Decode stored text as `ty`.
    pub fn read(&self, ty: ScalarType, raw: Option<&str>) -> TypeResult<ScalarValue> {
        self.converter(ty)?.read(raw)
    }

    /// Encode a map key. Only types that round-trip losslessly qualify.
    pub fn write_key(&self, value: &ScalarValue) -> TypeResult<String> {
        let ty = value.scalar_type();
        if !ty.is_lossless_key() {
            return Err(TypeError::InvalidKeyType {
                ty,
                context: "map key".into(),
            });
        }
        self.write(value)
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.converters.keys().collect();
        types.sort();
        f.debug_struct("ConverterRegistry")
            .field("types", &types)
            .finish()
    }
}
