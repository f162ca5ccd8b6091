//! Storage-specific error types for pure data operations.
//!
//! These errors are separate from SCIM protocol errors. They keep "the row
//! does not exist", "the query matched more than one row" and "a constraint
//! rejected the write" apart so that callers can map each of them to a
//! different protocol status code.

use std::fmt;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// The requested row was not found.
    NotFound { entity: String, id: String },

    /// A query expected to yield exactly one row yielded `count` rows.
    NotSingular { entity: String, count: usize },

    /// A uniqueness or foreign-key constraint rejected the write.
    Constraint { entity: String, message: String },

    /// Invalid predicate or query parameters.
    InvalidQuery { message: String },

    /// Row data that cannot be stored.
    InvalidData { message: String },

    /// Generic internal storage error.
    Internal {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound { entity, id } => {
                write!(f, "{} not found: {}", entity, id)
            }
            StorageError::NotSingular { entity, count } => {
                write!(f, "{} query is not singular: {} rows matched", entity, count)
            }
            StorageError::Constraint { entity, message } => {
                write!(f, "Constraint violation on {}: {}", entity, message)
            }
            StorageError::InvalidQuery { message } => write!(f, "Invalid query: {}", message),
            StorageError::InvalidData { message } => write!(f, "Invalid data: {}", message),
            StorageError::Internal { message, .. } => {
                write!(f, "Internal storage error: {}", message)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Internal { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl StorageError {
    /// Create a new NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a new NotSingular error.
    pub fn not_singular(entity: impl Into<String>, count: usize) -> Self {
        Self::NotSingular {
            entity: entity.into(),
            count,
        }
    }

    /// Create a new Constraint error.
    pub fn constraint(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a new InvalidQuery error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create a new InvalidData error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Internal error wrapping a source error.
    pub fn internal_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the error means the addressed row does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Whether the error means a query matched zero or several rows when one was required.
    pub fn is_not_singular(&self) -> bool {
        matches!(self, StorageError::NotSingular { .. })
    }

    /// Whether the error is a constraint violation.
    pub fn is_constraint(&self) -> bool {
        matches!(self, StorageError::Constraint { .. })
    }
}
