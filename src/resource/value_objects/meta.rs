//! Resource metadata (RFC 7643 §3.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The `meta` attribute every resource carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub resource_type: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Meta {
    pub fn new(
        resource_type: impl Into<String>,
        created: DateTime<Utc>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            created,
            last_modified,
            location: None,
            version: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// `{base_url}/{endpoint}/{id}`, without a doubled slash.
    pub fn generate_location(base_url: &str, endpoint: &str, id: &str) -> String {
        format!("{}/{}/{}", base_url.trim_end_matches('/'), endpoint, id)
    }
}
