//! Error types for SCIM store operations.
//!
//! Every layer has its own error enum (filter parsing, filter compilation,
//! patch resolution, storage) and they all convert into [`ScimError`], which
//! carries enough information for a caller to pick the protocol status code
//! and `scimType` of an error response.

use crate::filter::{FilterError, ParseError};
use crate::patch::PatchError;
use crate::resource::version::VersionError;
use crate::storage::StorageError;

/// Main error type for SCIM store operations.
#[derive(Debug, thiserror::Error)]
pub enum ScimError {
    /// Resource data doesn't satisfy the resource invariants
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The filter or patch path could not be parsed
    #[error("Invalid filter: {0}")]
    Parse(#[from] ParseError),

    /// The filter parsed but cannot be compiled into predicates
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// A PATCH operation could not be applied
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    /// Errors from the storage collaborator
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed version stamp supplied by the client
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID {id}")]
    ResourceNotFound { resource_type: String, id: String },

    /// The client's `If-Match` version no longer matches the stored one
    #[error("Precondition failed: expected version {expected}, found {current}")]
    PreconditionFailed { expected: String, current: String },

    /// Malformed request envelope
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// A post-write hook rejected the written resource
    #[error("Write hook failed: {message}")]
    Hook { message: String },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

/// Validation errors raised before anything is written to storage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Required attribute is missing
    #[error("Required attribute '{attribute}' is missing")]
    MissingRequiredAttribute { attribute: String },

    /// Invalid value for attribute with canonical values
    #[error("Attribute '{attribute}' has invalid value '{value}', allowed values: {allowed:?}")]
    InvalidCanonicalValue {
        attribute: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Multiple primary values in multi-valued attribute
    #[error("Attribute '{attribute}' cannot have multiple primary values")]
    MultiplePrimaryValues { attribute: String },

    /// Missing required sub-attribute in multi-valued
    #[error("Attribute '{attribute}' missing required sub-attribute '{sub_attribute}'")]
    MissingRequiredSubAttribute {
        attribute: String,
        sub_attribute: String,
    },
}

/// Errors that can occur while assembling a backend.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl ScimError {
    /// Create a resource not found error
    pub fn resource_not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a hook failure
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }

    /// HTTP status code a protocol layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ScimError::Validation(_)
            | ScimError::Parse(_)
            | ScimError::Filter(_)
            | ScimError::Patch(_)
            | ScimError::Json(_)
            | ScimError::Version(_)
            | ScimError::InvalidRequest { .. } => 400,
            ScimError::Storage(e) if e.is_not_found() => 404,
            ScimError::Storage(e) if e.is_constraint() => 409,
            ScimError::Storage(e) if e.is_not_singular() => 400,
            ScimError::Storage(_) => 500,
            ScimError::ResourceNotFound { .. } => 404,
            ScimError::PreconditionFailed { .. } => 412,
            ScimError::Hook { .. } | ScimError::Internal { .. } => 500,
        }
    }

    /// RFC 7644 `scimType` detail keyword, when one applies.
    pub fn scim_type(&self) -> Option<&'static str> {
        match self {
            ScimError::Parse(_) | ScimError::Filter(_) => Some("invalidFilter"),
            ScimError::Patch(e) => Some(e.scim_type()),
            ScimError::Validation(_) | ScimError::Json(_) => Some("invalidValue"),
            ScimError::Storage(e) if e.is_constraint() => Some("uniqueness"),
            ScimError::Version(_) => Some("invalidVers"),
            ScimError::InvalidRequest { .. } => Some("invalidSyntax"),
            _ => None,
        }
    }
}

impl ValidationError {
    /// Create a missing required attribute error
    pub fn missing_required(attribute: impl Into<String>) -> Self {
        Self::MissingRequiredAttribute {
            attribute: attribute.into(),
        }
    }

    /// Create a multiple-primary error
    pub fn multiple_primary(attribute: impl Into<String>) -> Self {
        Self::MultiplePrimaryValues {
            attribute: attribute.into(),
        }
    }
}

// Result type aliases for convenience
pub type ScimResult<T> = Result<T, ScimError>;
pub type ValidationResult<T> = Result<T, ValidationError>;
pub type BuildResult<T> = Result<T, BuildError>;
