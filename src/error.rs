//! Error taxonomy for the query and mutation layer.
//!
//! Every stage fails fast: the first error is returned as-is and the remaining
//! stages are skipped. Registration problems are reported separately by
//! [`RegistryError`](crate::registry::RegistryError) when the registry is built.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the filter compiler, pagination engine and mutation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// User input failed a declared rule.
    #[error("validation failed for `{property}`: {reason}")]
    Validation { property: String, reason: String },

    /// A filter named an operator outside the wire contract.
    #[error("invalid filter operator `{operator}` on `{field}`")]
    InvalidFilterOperator { field: String, operator: String },

    /// A known operator received an operand of the wrong shape.
    #[error("invalid operand for `{operator}` on `{field}`: {reason}")]
    InvalidFilterValue {
        field: String,
        operator: String,
        reason: String,
    },

    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    #[error("unknown property `{property}` on `{entity}`")]
    UnknownProperty { entity: String, property: String },

    #[error("property `{property}` on `{entity}` is not filterable")]
    NotFilterable { entity: String, property: String },

    #[error("property `{property}` on `{entity}` is not sortable")]
    NotSortable { entity: String, property: String },

    /// A default, transform or output hook returned an error.
    #[error("{stage} hook failed for `{property}`: {reason}")]
    HookFailed {
        stage: &'static str,
        property: String,
        reason: String,
    },

    /// Update targeted an identifier that does not exist.
    #[error("{entity} `{id}` not found")]
    NotFound { entity: String, id: String },

    /// Backing store failure, surfaced without retry.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            property: property.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_value(
        field: impl Into<String>,
        operator: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFilterValue {
            field: field.into(),
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code, exposed as the GraphQL `code` extension.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::InvalidFilterOperator { .. } => "INVALID_FILTER_OPERATOR",
            Error::InvalidFilterValue { .. } => "INVALID_FILTER_VALUE",
            Error::UnknownEntity(_) => "UNKNOWN_ENTITY",
            Error::UnknownProperty { .. } => "UNKNOWN_PROPERTY",
            Error::NotFilterable { .. } => "NOT_FILTERABLE",
            Error::NotSortable { .. } => "NOT_SORTABLE",
            Error::HookFailed { .. } => "HOOK_FAILED",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Store(_) => "STORE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// True for failures caused by the request rather than the store.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Error::Store(_) | Error::Serialization(_))
    }
}
