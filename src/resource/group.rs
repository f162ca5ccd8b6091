//! The SCIM Group resource (RFC 7643 §4.2).

use crate::error::{ValidationError, ValidationResult};
use crate::resource::GROUP_SCHEMA;
use crate::resource::value_objects::{GroupMember, Meta};
use serde::{Deserialize, Serialize};

fn default_schemas() -> Vec<String> {
    vec![GROUP_SCHEMA.to_string()]
}

/// A Group as exchanged with clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default = "default_schemas")]
    pub schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<GroupMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            schemas: default_schemas(),
            id: None,
            external_id: None,
            display_name: String::new(),
            members: Vec::new(),
            meta: None,
        }
    }
}

impl Group {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn with_member(mut self, member: GroupMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::missing_required("displayName"));
        }
        self.members.iter().try_for_each(GroupMember::validate)
    }
}
