//! The SCIM User resource (RFC 7643 §4.1).

use crate::error::{ValidationError, ValidationResult};
use crate::resource::USER_SCHEMA;
use crate::resource::value_objects::{
    Address, GroupRef, Meta, MultiValue, Name, validate_single_primary, validate_values,
};
use serde::{Deserialize, Serialize};

fn default_schemas() -> Vec<String> {
    vec![USER_SCHEMA.to_string()]
}

/// A User as exchanged with clients.
///
/// `password` is accepted on input and never serialized. `id`, `groups` and
/// `meta` are assigned by the server; values sent by a client are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default = "default_schemas")]
    pub schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<MultiValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phone_numbers: Vec<MultiValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ims: Vec<MultiValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<MultiValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entitlements: Vec<MultiValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<MultiValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x509_certificates: Vec<MultiValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            schemas: default_schemas(),
            id: None,
            external_id: None,
            user_name: String::new(),
            name: None,
            display_name: None,
            nick_name: None,
            profile_url: None,
            title: None,
            user_type: None,
            preferred_language: None,
            locale: None,
            timezone: None,
            active: None,
            password: None,
            emails: Vec::new(),
            phone_numbers: Vec::new(),
            ims: Vec::new(),
            photos: Vec::new(),
            addresses: Vec::new(),
            entitlements: Vec::new(),
            roles: Vec::new(),
            x509_certificates: Vec::new(),
            groups: Vec::new(),
            meta: None,
        }
    }
}

impl User {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            ..Self::default()
        }
    }

    /// The generic multi-valued collections, keyed by attribute name.
    pub fn collections(&self) -> [(&'static str, &[MultiValue]); 7] {
        [
            ("emails", self.emails.as_slice()),
            ("phoneNumbers", self.phone_numbers.as_slice()),
            ("ims", self.ims.as_slice()),
            ("photos", self.photos.as_slice()),
            ("entitlements", self.entitlements.as_slice()),
            ("roles", self.roles.as_slice()),
            ("x509Certificates", self.x509_certificates.as_slice()),
        ]
    }

    /// Check the invariants that must hold before anything is persisted.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.user_name.trim().is_empty() {
            return Err(ValidationError::missing_required("userName"));
        }
        for (attribute, items) in self.collections() {
            validate_values(attribute, items)?;
            validate_single_primary(attribute, items)?;
        }
        validate_single_primary("addresses", &self.addresses)?;
        Ok(())
    }
}
