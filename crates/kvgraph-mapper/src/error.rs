use kvgraph_store::StoreError;
use kvgraph_types::{Capability, KeyError, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapperError {
    /// A stored value could not be parsed as its declared scalar type.
    #[error("cannot read {key} field {field}: {source}")]
    Conversion {
        key: String,
        field: String,
        #[source]
        source: TypeError,
    },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    /// The object has no store key yet (detached and never saved).
    #[error("{0} is not attached to a session")]
    Detached(String),

    #[error("identifier of {key} cannot change once assigned")]
    ImmutableIdentifier { key: String },

    #[error("field {entity}.{field} is not a scalar field")]
    NotScalar { entity: String, field: String },

    #[error("field {field} is declared as {declared:?} but holds a {actual:?} container")]
    ShapeMismatch {
        field: String,
        declared: Capability,
        actual: Capability,
    },

    #[error("index {index} out of range for {key} of length {len}")]
    IndexOutOfRange {
        key: String,
        index: usize,
        len: usize,
    },

    #[error("no handler accepts {0}")]
    NoHandler(String),
}

impl From<StoreError> for MapperError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => MapperError::Cancelled,
            other => MapperError::Store(other),
        }
    }
}

impl MapperError {
    /// Attach the store key and field to a bare conversion failure.
    pub(crate) fn in_field(self, key: &str, field: &str) -> Self {
        match self {
            MapperError::Type(source @ TypeError::Conversion { .. }) => MapperError::Conversion {
                key: key.to_string(),
                field: field.to_string(),
                source,
            },
            other => other,
        }
    }
}

pub type MapperResult<T> = Result<T, MapperError>;
