//! Typed GraphQL client error types.

use serde_json::Value;
use thiserror::Error;

use crate::GraphQLResponseError;

/// Result type for typed GraphQL client operations.
pub type Result<T> = std::result::Result<T, GraphQLError>;

/// Typed GraphQL client errors.
#[derive(Debug, Error)]
pub enum GraphQLError {
    /// The selection names a type or field the schema does not know.
    #[error("Schema mismatch: type `{type_name}` has no field `{field}`")]
    SchemaMismatch {
        /// Type the lookup was performed on.
        type_name: String,
        /// Field that was not found (empty when the type itself is unknown).
        field: String,
    },

    /// An object-typed field was selected without a sub-selection.
    #[error("Missing selection: object field `{type_name}.{field}` needs a nested selection")]
    MissingSelection {
        /// Type declaring the field.
        type_name: String,
        /// The object-typed field.
        field: String,
    },

    /// An argument is not declared for the field, or a required one is missing.
    #[error("Invalid argument `{argument}` on `{type_name}.{field}`: {reason}")]
    InvalidArgument {
        /// Type declaring the field.
        type_name: String,
        /// Field the argument was given to.
        field: String,
        /// Argument name.
        argument: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The schema descriptor is inconsistent or cannot be parsed.
    #[error("Invalid type map: {0}")]
    InvalidTypeMap(String),

    /// The selection itself is malformed.
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// The network call carrying the operation failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server reported errors for this operation.
    #[error("GraphQL errors: {errors:?}")]
    Operation {
        /// Errors attributed to the operation, paths relative to its own root fields.
        errors: Vec<GraphQLResponseError>,
        /// Partial data returned alongside the errors, if any.
        data: Option<Value>,
    },

    /// A discriminant guard rejected a decoded value.
    #[error("Type guard failed: expected one of {expected:?}, found {found:?}")]
    TypeGuard {
        /// Allowed type names.
        expected: Vec<String>,
        /// Discriminant carried by the value, if it had one.
        found: Option<String>,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response payload does not fit the schema.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl GraphQLError {
    pub(crate) fn schema_mismatch(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    pub(crate) fn invalid_argument(
        type_name: impl Into<String>,
        field: impl Into<String>,
        argument: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            type_name: type_name.into(),
            field: field.into(),
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error was raised while compiling a selection.
    ///
    /// Compile errors are raised before anything is enqueued, so no network
    /// call was made for the operation.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch { .. }
                | Self::MissingSelection { .. }
                | Self::InvalidArgument { .. }
                | Self::InvalidSelection(_)
        )
    }

    /// Check if this is a network error.
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if this is a GraphQL error (server-side).
    pub fn is_graphql_error(&self) -> bool {
        matches!(self, Self::Operation { .. })
    }

    /// Get GraphQL errors if this is a GraphQL error.
    pub fn graphql_errors(&self) -> Option<&[GraphQLResponseError]> {
        match self {
            Self::Operation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Get the partial data returned next to server errors.
    pub fn partial_data(&self) -> Option<&Value> {
        match self {
            Self::Operation { data, .. } => data.as_ref(),
            _ => None,
        }
    }
}

/// A failed network call.
///
/// Cloneable so a single failure can settle every operation of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Error message.
    pub message: String,
    /// HTTP status code, when the server answered.
    pub status: Option<u16>,
}

impl TransportError {
    /// Create a transport error without a status code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Create a transport error for a non-success HTTP status.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self {
            message: error.to_string(),
            status: error.status().map(|s| s.as_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = GraphQLError::schema_mismatch("User", "nickname");
        assert!(err.is_compile_error());
        assert!(!err.is_network_error());

        let err = GraphQLError::from(TransportError::new("connection refused"));
        assert!(err.is_network_error());
        assert!(!err.is_compile_error());
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_operation_error_exposes_errors_and_data() {
        let err = GraphQLError::Operation {
            errors: vec![GraphQLResponseError {
                message: "boom".to_string(),
                locations: None,
                path: None,
                extensions: None,
            }],
            data: Some(serde_json::json!({ "me": null })),
        };

        assert!(err.is_graphql_error());
        assert_eq!(err.graphql_errors().map(|e| e.len()), Some(1));
        assert!(err.partial_data().is_some());
    }
}
