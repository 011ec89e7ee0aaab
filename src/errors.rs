// Copyright 2025 Cowboy AI, LLC.

//! Error types for object-document mapping operations

use thiserror::Error;

/// Errors that can occur while declaring, building or persisting models
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OdmError {
    /// A schema entry names a type tag that is not recognised
    #[error("Invalid field type '{type_name}' for field '{field}'")]
    InvalidType {
        /// Field whose declaration is invalid
        field: String,
        /// The offending type tag
        type_name: String,
    },

    /// A list declaration does not carry exactly one element type
    #[error("List field '{field}' must declare exactly one element type, found {count}")]
    AmbiguousList {
        /// Field whose declaration is invalid
        field: String,
        /// Number of element types that were declared
        count: usize,
    },

    /// A reference points at something that is neither a model nor `Mixed`
    #[error("Field '{field}' references '{target}', which is not a model")]
    InvalidReference {
        /// Field holding the reference
        field: String,
        /// The referenced type name
        target: String,
    },

    /// A model name could not be resolved against the registry
    #[error("Model '{0}' not found")]
    UnknownModel(String),

    /// A model with the same name is already registered
    #[error("Model '{0}' is already registered")]
    DuplicateModel(String),

    /// An abstract interface model was registered as a concrete model
    #[error("Model '{0}' is an interface and cannot be registered")]
    InterfaceModel(String),

    /// A persistence operation was attempted without a repository
    #[error("{model}::{operation}() called without a repository")]
    MissingRepository {
        /// Model that needed the repository
        model: String,
        /// Operation that was attempted
        operation: String,
    },

    /// The identity field of a model is declared with an unusable type
    #[error("Model '{model}' has an invalid identity field: {reason}")]
    InvalidIdentity {
        /// Model being declared
        model: String,
        /// What is wrong with the identity field
        reason: String,
    },

    /// A value has the wrong shape for the field's declared type
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue {
        /// Field being written
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A user supplied validator rejected a value
    #[error("Validation failed for field '{field}': {message}")]
    Validation {
        /// Field being written
        field: String,
        /// Message returned by the validator, unmodified
        message: String,
    },

    /// A write was attempted against a readonly field
    #[error("Field '{field}' is readonly")]
    ReadonlyField {
        /// Field being written
        field: String,
    },

    /// A field name does not exist on the model
    #[error("Model '{model}' has no field '{field}'")]
    UnknownField {
        /// Model being accessed
        model: String,
        /// Requested field name
        field: String,
    },

    /// Raw data could not be matched to a model type
    #[error("Data has no resolvable '$type' or 'meta.type' discriminator")]
    MissingDiscriminator,

    /// The backend has no record for the requested identity
    #[error("Record not found: {model} with id {id}")]
    NotFound {
        /// Model type name
        model: String,
        /// Requested identity
        id: String,
    },

    /// The backend rejected a write because the concurrency token is stale
    #[error("Concurrency conflict on {model} {id}: expected cas {expected}, but found {actual}")]
    Conflict {
        /// Model type name
        model: String,
        /// Identity of the record
        id: String,
        /// Token carried by the instance
        expected: u64,
        /// Token currently held by the backend
        actual: u64,
    },

    /// A path expression could not be applied during a deep load
    #[error("Invalid load path '{path}': {reason}")]
    Path {
        /// The path (or path prefix) that failed
        path: String,
        /// Why it failed
        reason: String,
    },

    /// Backend storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for object-document mapping operations
pub type OdmResult<T> = Result<T, OdmError>;

impl From<serde_json::Error> for OdmError {
    fn from(err: serde_json::Error) -> Self {
        OdmError::Serialization(err.to_string())
    }
}

impl OdmError {
    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, OdmError::NotFound { .. })
    }

    /// Check if this is a concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, OdmError::Conflict { .. })
    }

    /// Check if this is a value or validator error
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            OdmError::InvalidValue { .. }
                | OdmError::Validation { .. }
                | OdmError::ReadonlyField { .. }
                | OdmError::MissingDiscriminator
        )
    }

    /// Check if this is a schema or wiring error raised by programmer mistakes
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            OdmError::InvalidType { .. }
                | OdmError::AmbiguousList { .. }
                | OdmError::InvalidReference { .. }
                | OdmError::UnknownModel(_)
                | OdmError::DuplicateModel(_)
                | OdmError::InterfaceModel(_)
                | OdmError::MissingRepository { .. }
                | OdmError::InvalidIdentity { .. }
        )
    }

    /// Check if this is a deep-load path error
    pub fn is_path_error(&self) -> bool {
        matches!(self, OdmError::Path { .. } | OdmError::UnknownField { .. })
    }

    pub(crate) fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        OdmError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn path(path: &str, reason: impl Into<String>) -> Self {
        OdmError::Path {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing_repository(model: &str, operation: &str) -> Self {
        OdmError::MissingRepository {
            model: model.to_string(),
            operation: operation.to_string(),
        }
    }
}
