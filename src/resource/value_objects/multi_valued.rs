//! Items of the generic multi-valued User attributes.
//!
//! `emails`, `phoneNumbers`, `ims`, `photos`, `roles`, `entitlements` and
//! `x509Certificates` all share the `value`/`display`/`type`/`primary` shape.

use crate::error::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};

/// Common behaviour of collection items.
pub trait MultiValued {
    fn is_primary(&self) -> bool;
}

/// One item of a generic multi-valued attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

impl MultiValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }
}

impl MultiValued for MultiValue {
    fn is_primary(&self) -> bool {
        self.primary == Some(true)
    }
}

/// Fail when more than one item of `attribute` is marked primary.
pub fn validate_single_primary<T: MultiValued>(
    attribute: &str,
    items: &[T],
) -> ValidationResult<()> {
    if items.iter().filter(|item| item.is_primary()).count() > 1 {
        return Err(ValidationError::multiple_primary(attribute));
    }
    Ok(())
}

/// Fail when an item of `attribute` has no `value`.
pub fn validate_values(attribute: &str, items: &[MultiValue]) -> ValidationResult<()> {
    if items
        .iter()
        .any(|item| item.value.as_deref().is_none_or(str::is_empty))
    {
        return Err(ValidationError::MissingRequiredSubAttribute {
            attribute: attribute.to_string(),
            sub_attribute: "value".to_string(),
        });
    }
    Ok(())
}
