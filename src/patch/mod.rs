//! SCIM PATCH operations (RFC 7644 §3.5.2).
//!
//! A [`PatchRequest`] carries an ordered list of [`PatchOperation`]s. Each
//! operation's path is parsed in patch mode and resolved against the
//! resource's registry into a [`PatchTarget`], which [`PatchEngine`] then
//! applies through the storage collaborator.
//!
//! ## Path forms
//!
//! ```text
//! userName                          singular attribute
//! name.givenName                    sub-attribute of a complex singular attribute
//! emails                            whole multi-valued attribute
//! emails[type eq "work"]            matching items
//! emails[type eq "work"].value      one sub-attribute of the single matching item
//! ```
//!
//! Operations are applied one at a time. A failing operation leaves the
//! effects of the operations before it in place.

mod engine;
mod path;

pub use engine::{Owner, PatchEngine};
pub use path::{PatchTarget, resolve_path};

use crate::filter::{FilterError, LookupError, ParseError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// Errors raised while resolving or applying a PATCH operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    #[error("request must include the PatchOp message schema")]
    InvalidSchema,

    #[error("invalid path '{path}': {source}")]
    InvalidPath { path: String, source: ParseError },

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("{0}")]
    NoTarget(String),

    #[error("'{0}' is read-only")]
    ReadOnly(String),

    #[error("{0} is not mutable")]
    Immutable(String),

    #[error("invalid value for '{attr}': {message}")]
    InvalidValue { attr: String, message: String },

    #[error("query must resolve to one element")]
    NotSingular,

    #[error("'{0}' selects items of a multi-valued attribute without a value filter")]
    MissingFilter(String),

    #[error("'{0}' selects items but names no sub-attribute to set")]
    MissingSubAttribute(String),
}

impl PatchError {
    /// RFC 7644 `scimType` for this error.
    pub fn scim_type(&self) -> &'static str {
        match self {
            PatchError::InvalidSchema => "invalidSyntax",
            PatchError::InvalidPath { .. }
            | PatchError::Lookup(_)
            | PatchError::MissingFilter(_)
            | PatchError::MissingSubAttribute(_) => "invalidPath",
            PatchError::Filter(_) => "invalidFilter",
            PatchError::NoTarget(_) | PatchError::NotSingular => "noTarget",
            PatchError::ReadOnly(_) | PatchError::Immutable(_) => "mutability",
            PatchError::InvalidValue { .. } => "invalidValue",
        }
    }

    pub(crate) fn invalid_value(attr: impl Into<String>, message: impl fmt::Display) -> Self {
        PatchError::InvalidValue {
            attr: attr.into(),
            message: message.to_string(),
        }
    }
}

/// The operation keyword. Matched case-insensitively on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

impl TryFrom<String> for PatchOp {
    type Error = String;

    fn try_from(op: String) -> Result<Self, Self::Error> {
        match op.to_ascii_lowercase().as_str() {
            "add" => Ok(PatchOp::Add),
            "remove" => Ok(PatchOp::Remove),
            "replace" => Ok(PatchOp::Replace),
            _ => Err(format!("unsupported PATCH operation '{}'", op)),
        }
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Replace => "replace",
        })
    }
}

/// One operation of a PATCH request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: Some(path.into()),
            value,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: Some(path.into()),
            value,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: Some(path.into()),
            value: Value::Null,
        }
    }
}

/// A PATCH request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<PatchOperation>,
}

impl PatchRequest {
    pub fn new(operations: Vec<PatchOperation>) -> Self {
        Self {
            schemas: vec![PATCH_OP_SCHEMA.to_string()],
            operations,
        }
    }

    /// Check the envelope before any operation is applied.
    pub fn validate(&self) -> Result<(), PatchError> {
        if !self.schemas.iter().any(|s| s == PATCH_OP_SCHEMA) {
            return Err(PatchError::InvalidSchema);
        }
        if self.operations.is_empty() {
            return Err(PatchError::invalid_value("Operations", "at least one operation is required"));
        }
        for operation in &self.operations {
            if operation.op == PatchOp::Remove && operation.path.is_none() {
                return Err(PatchError::NoTarget(
                    "remove operation requires a path".to_string(),
                ));
            }
        }
        Ok(())
    }
}
