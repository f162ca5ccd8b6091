//! Search across `/Users`, `/Groups` and the server root.
//!
//! The filter is compiled once for every resource type in scope. Types left
//! without a predicate are not queried at all, and when no type has one the
//! search answers with an empty list without touching storage. Root searches
//! query users and groups concurrently; the first storage error wins.

use crate::backend::{Backend, convert};
use crate::error::{ScimError, ScimResult};
use crate::filter;
use crate::resource::{Group, User};
use crate::storage::{GroupRecord, StorageProvider, UserRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const LIST_RESPONSE_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
pub const SEARCH_REQUEST_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:SearchRequest";

/// Which endpoint a search was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// `/.search`
    All,
    /// `/Users/.search`
    Users,
    /// `/Groups/.search`
    Groups,
}

impl SearchScope {
    fn wants(&self) -> (bool, bool) {
        match self {
            SearchScope::All => (true, true),
            SearchScope::Users => (true, false),
            SearchScope::Groups => (false, true),
        }
    }
}

fn search_schemas() -> Vec<String> {
    vec![SEARCH_REQUEST_SCHEMA.to_string()]
}

/// A `.search` request body (RFC 7644 §3.4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default = "search_schemas")]
    pub schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// 1-based index of the first result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            schemas: search_schemas(),
            filter: None,
            start_index: None,
            count: None,
        }
    }
}

impl SearchRequest {
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..Self::default()
        }
    }

    pub fn paged(mut self, start_index: usize, count: usize) -> Self {
        self.start_index = Some(start_index);
        self.count = Some(count);
        self
    }

    /// Check the message schema of the request body.
    pub fn validate(&self) -> ScimResult<()> {
        if !self.schemas.iter().any(|s| s == SEARCH_REQUEST_SCHEMA) {
            return Err(ScimError::invalid_request(format!(
                "search requests must declare the {} schema",
                SEARCH_REQUEST_SCHEMA
            )));
        }
        Ok(())
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    User(User),
    Group(Group),
}

impl Resource {
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Resource::User(user) => Some(user),
            Resource::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Resource::Group(group) => Some(group),
            Resource::User(_) => None,
        }
    }
}

/// A ListResponse message (RFC 7644 §3.4.2).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub schemas: Vec<String>,
    pub total_results: usize,
    pub items_per_page: usize,
    pub start_index: usize,
    #[serde(rename = "Resources")]
    pub resources: Vec<Resource>,
}

impl ListResponse {
    fn new(total_results: usize, start_index: usize, resources: Vec<Resource>) -> Self {
        Self {
            schemas: vec![LIST_RESPONSE_SCHEMA.to_string()],
            total_results,
            items_per_page: resources.len(),
            start_index,
            resources,
        }
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.resources.iter().filter_map(Resource::as_user)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.resources.iter().filter_map(Resource::as_group)
    }
}

enum Hit {
    User(UserRecord),
    Group(GroupRecord),
}

impl<S: StorageProvider> Backend<S> {
    /// Run a search. Users come before groups; each is ordered by creation time.
    pub async fn search(
        &self,
        request: &SearchRequest,
        scope: SearchScope,
    ) -> ScimResult<ListResponse> {
        log::info!("Searching {:?} with filter {:?}", scope, request.filter);
        request.validate()?;
        let start_index = request.start_index.unwrap_or(1).max(1);
        let count = request
            .count
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_results);

        let (want_users, want_groups) = scope.wants();
        let compiled = match request.filter.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                let expr = self.parser.parse(text, false)?;
                let compiled = filter::compile(&expr, want_users, want_groups)?;
                if compiled.is_unsatisfiable() {
                    log::debug!("Filter '{}' cannot match any resource type", text);
                    return Ok(ListResponse::new(0, start_index, Vec::new()));
                }
                Some(compiled)
            }
            _ => None,
        };

        let users_predicate = compiled.as_ref().and_then(|c| c.users.as_ref());
        let groups_predicate = compiled.as_ref().and_then(|c| c.groups.as_ref());
        let query_users = want_users && (compiled.is_none() || users_predicate.is_some());
        let query_groups = want_groups && (compiled.is_none() || groups_predicate.is_some());

        let users = async {
            if query_users {
                self.storage.query_users(users_predicate).await
            } else {
                Ok(Vec::new())
            }
        };
        let groups = async {
            if query_groups {
                self.storage.query_groups(groups_predicate).await
            } else {
                Ok(Vec::new())
            }
        };
        let (users, groups) = tokio::try_join!(users, groups)?;

        let total_results = users.len() + groups.len();
        let page: Vec<Hit> = users
            .into_iter()
            .map(Hit::User)
            .chain(groups.into_iter().map(Hit::Group))
            .skip(start_index - 1)
            .take(count)
            .collect();

        let resources = self.page_resources(page).await?;
        log::debug!(
            "Search matched {} resources, returning {}",
            total_results,
            resources.len()
        );
        Ok(ListResponse::new(total_results, start_index, resources))
    }

    async fn page_resources(&self, page: Vec<Hit>) -> Result<Vec<Resource>, ScimError> {
        let user_ids: Vec<Uuid> = page
            .iter()
            .filter_map(|hit| match hit {
                Hit::User(record) => Some(record.row.id),
                Hit::Group(_) => None,
            })
            .collect();
        let mut memberships = self.groups_of(&user_ids).await?;

        Ok(page
            .into_iter()
            .map(|hit| match hit {
                Hit::User(record) => {
                    let groups = memberships.remove(&record.row.id).unwrap_or_default();
                    Resource::User(convert::user_from_record(&record, groups, &self.config))
                }
                Hit::Group(record) => {
                    Resource::Group(convert::group_from_record(&record, &self.config))
                }
            })
            .collect())
    }
}
