//! Group membership references.
//!
//! [`GroupMember`] is an item of a Group's `members`; [`GroupRef`] is an item of
//! the read-only `groups` attribute derived for a User.

use crate::error::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};

/// Allowed values of a member's `type`.
pub const MEMBER_TYPES: [&str; 2] = ["User", "Group"];

/// A member of a Group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Id of the member resource
    #[serde(default)]
    pub value: String,
    #[serde(default, rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub member_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl GroupMember {
    pub fn user(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            member_type: Some("User".to_string()),
            ..Self::default()
        }
    }

    pub fn group(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            member_type: Some("Group".to_string()),
            ..Self::default()
        }
    }

    pub fn is_user(&self) -> bool {
        self.member_type.as_deref() == Some("User")
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.value.is_empty() {
            return Err(ValidationError::MissingRequiredSubAttribute {
                attribute: "members".to_string(),
                sub_attribute: "value".to_string(),
            });
        }
        if let Some(member_type) = &self.member_type {
            if !MEMBER_TYPES.contains(&member_type.as_str()) {
                return Err(ValidationError::InvalidCanonicalValue {
                    attribute: "members.type".to_string(),
                    value: member_type.clone(),
                    allowed: MEMBER_TYPES.iter().map(|t| t.to_string()).collect(),
                });
            }
        }
        Ok(())
    }
}

/// A group a User belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub value: String,
    #[serde(default, rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub membership_type: Option<String>,
}
