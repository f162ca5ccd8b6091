//! SCIM resource model.
//!
//! The protocol-facing [`User`] and [`Group`] types are plain serde structs
//! whose optional attributes are `Option`s. They are validated with
//! `validate()` before anything reaches storage, and stamped with a weak
//! version computed by [`EtagComputer`].

pub mod group;
pub mod user;
pub mod value_objects;
pub mod version;

pub use group::Group;
pub use user::User;
pub use value_objects::{
    Address, GroupMember, GroupRef, MEMBER_TYPES, Meta, MultiValue, MultiValued, Name,
    validate_single_primary, validate_values,
};
pub use version::{EtagComputer, HttpVersion, RawVersion, ScimVersion, VersionError};

use serde::{Deserialize, Serialize};
use std::fmt;

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";

/// The resource types this crate stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    User,
    Group,
}

impl ResourceType {
    /// Name used in `meta.resourceType` and in member `type` values.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::User => "User",
            ResourceType::Group => "Group",
        }
    }

    pub fn schema(&self) -> &'static str {
        match self {
            ResourceType::User => USER_SCHEMA,
            ResourceType::Group => GROUP_SCHEMA,
        }
    }

    /// Endpoint segment used to build `meta.location` and `$ref` URLs.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ResourceType::User => "Users",
            ResourceType::Group => "Groups",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
