//! Backend use-cases: create, replace, get, delete, patch and search.
//!
//! A [`Backend`] owns the storage handle, the filter parser, the version
//! stamp computer and the configuration. Every use-case validates its input
//! before any storage call, and whole-resource writes are one storage call
//! each, so a create or replace either lands completely or not at all.
//!
//! # Example Usage
//!
//! ```rust
//! use scim_store::backend::{BackendBuilder, SearchRequest, SearchScope};
//! use scim_store::resource::User;
//! use scim_store::storage::InMemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = BackendBuilder::new(InMemoryStorage::new()).build()?;
//!
//! let created = backend.create_user(User::new("bjensen")).await?;
//! assert!(created.meta.unwrap().version.unwrap().starts_with("W/\""));
//!
//! let request = SearchRequest::with_filter("userName eq \"BJENSEN\"");
//! let found = backend.search(&request, SearchScope::Users).await?;
//! assert_eq!(found.total_results, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub(crate) mod convert;
pub mod hooks;
pub mod search;

pub use config::{BackendBuilder, BackendConfig};
pub use hooks::WriteHook;
pub use search::{ListResponse, LIST_RESPONSE_SCHEMA, Resource, SearchRequest, SearchScope};

use crate::error::{ScimError, ScimResult};
use crate::filter::{FilterParser, ScimFilterParser};
use crate::patch::{Owner, PatchEngine, PatchRequest};
use crate::resource::{EtagComputer, Group, GroupRef, HttpVersion, ResourceType, User};
use crate::storage::rows::item_columns;
use crate::storage::{GroupRecord, Predicate, Relation, Scalar, StorageProvider, UserRecord};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// SCIM use-cases over a [`StorageProvider`].
pub struct Backend<S> {
    storage: S,
    parser: Arc<dyn FilterParser>,
    etags: EtagComputer,
    config: BackendConfig,
}

impl<S: StorageProvider> Backend<S> {
    /// A backend with the default configuration and a random version salt.
    pub fn new(storage: S) -> Self {
        Self::from_parts(
            storage,
            Arc::new(ScimFilterParser::default()),
            EtagComputer::random(),
            BackendConfig::default(),
        )
    }

    pub(crate) fn from_parts(
        storage: S,
        parser: Arc<dyn FilterParser>,
        etags: EtagComputer,
        config: BackendConfig,
    ) -> Self {
        Self {
            storage,
            parser,
            etags,
            config,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn etags(&self) -> &EtagComputer {
        &self.etags
    }

    pub async fn create_user(&self, user: User) -> ScimResult<User> {
        log::info!("Creating user '{}'", user.user_name);
        user.validate()?;

        let version = self.etags.compute_user(&user);
        let now = Utc::now();
        let record = convert::user_record(&user, Uuid::new_v4(), version.to_string(), now, now);
        let stored = self.storage.insert_user(record).await?;

        let created = convert::user_from_record(&stored, Vec::new(), &self.config);
        hooks::run_user_hooks(&self.config.hooks, &created)?;
        Ok(created)
    }

    /// Replace every attribute and collection of an existing user.
    ///
    /// `id` and `meta.created` are kept. When `if_match` is given it must
    /// equal the stored version (or be `*`).
    pub async fn replace_user(
        &self,
        id: &str,
        user: User,
        if_match: Option<&str>,
    ) -> ScimResult<User> {
        log::info!("Replacing user {}", id);
        let uuid = parse_id(ResourceType::User, id)?;
        user.validate()?;

        let current = self
            .storage
            .get_user(uuid)
            .await?
            .ok_or_else(|| ScimError::resource_not_found("User", id))?;
        check_precondition(if_match, &current.row.etag)?;

        let version = self.etags.compute_user(&user);
        let record = convert::user_record(
            &user,
            uuid,
            version.to_string(),
            current.row.created,
            Utc::now(),
        );
        let stored = self.storage.replace_user(record).await?;

        let replaced = self.user_view(&stored).await?;
        hooks::run_user_hooks(&self.config.hooks, &replaced)?;
        Ok(replaced)
    }

    pub async fn get_user(&self, id: &str) -> ScimResult<User> {
        let uuid = parse_id(ResourceType::User, id)?;
        let record = self
            .storage
            .get_user(uuid)
            .await?
            .ok_or_else(|| ScimError::resource_not_found("User", id))?;
        self.user_view(&record).await
    }

    /// Delete a user and drop it from every group it belonged to.
    pub async fn delete_user(&self, id: &str) -> ScimResult<()> {
        log::info!("Deleting user {}", id);
        let uuid = parse_id(ResourceType::User, id)?;
        if !self.storage.delete_user(uuid).await? {
            return Err(ScimError::resource_not_found("User", id));
        }

        let membership = member_value_is(&[uuid]);
        let groups = self
            .storage
            .query_groups(Some(&has_member(membership.clone())))
            .await?;
        for group in groups {
            let stale = self
                .storage
                .query_items(Relation::Members, group.row.id, Some(&membership))
                .await?;
            let ids: Vec<Uuid> = stale.iter().map(|item| item.id).collect();
            self.storage.delete_items(Relation::Members, &ids).await?;
            log::debug!("Dropped user {} from group {}", id, group.row.id);
        }
        Ok(())
    }

    /// Apply every operation of `request` in order.
    ///
    /// Operations are committed one by one; when one fails the ones before
    /// it stay applied. `meta.version` is only recomputed when
    /// [`BackendConfig::recompute_etag_on_patch`] is set.
    pub async fn patch_user(&self, id: &str, request: &PatchRequest) -> ScimResult<User> {
        log::info!("Patching user {} ({} operations)", id, request.operations.len());
        request.validate()?;
        let uuid = parse_id(ResourceType::User, id)?;
        let current = self
            .storage
            .get_user(uuid)
            .await?
            .ok_or_else(|| ScimError::resource_not_found("User", id))?;

        let mut owner = Owner::User(current.row);
        let engine = PatchEngine::new(&self.storage, self.parser.as_ref(), &self.config);
        for operation in &request.operations {
            engine.apply(&mut owner, operation).await?;
        }

        let mut record = self
            .storage
            .get_user(uuid)
            .await?
            .ok_or_else(|| ScimError::resource_not_found("User", id))?;
        record.row.last_modified = Utc::now();
        if self.config.recompute_etag_on_patch {
            let mut view = convert::user_from_record(&record, Vec::new(), &self.config);
            view.password = record.row.password.clone();
            record.row.etag = self.etags.compute_user(&view).to_string();
        }
        record.row = self.storage.update_user(record.row).await?;

        let patched = self.user_view(&record).await?;
        hooks::run_user_hooks(&self.config.hooks, &patched)?;
        Ok(patched)
    }

    pub async fn create_group(&self, group: Group) -> ScimResult<Group> {
        log::info!("Creating group '{}'", group.display_name);
        group.validate()?;

        let now = Utc::now();
        let record = self.stamped_group_record(&group, Uuid::new_v4(), now, now);
        let stored = self.storage.insert_group(record).await?;

        let created = convert::group_from_record(&stored, &self.config);
        hooks::run_group_hooks(&self.config.hooks, &created)?;
        Ok(created)
    }

    pub async fn replace_group(
        &self,
        id: &str,
        group: Group,
        if_match: Option<&str>,
    ) -> ScimResult<Group> {
        log::info!("Replacing group {}", id);
        let uuid = parse_id(ResourceType::Group, id)?;
        group.validate()?;

        let current = self
            .storage
            .get_group(uuid)
            .await?
            .ok_or_else(|| ScimError::resource_not_found("Group", id))?;
        check_precondition(if_match, &current.row.etag)?;

        let record = self.stamped_group_record(&group, uuid, current.row.created, Utc::now());
        let stored = self.storage.replace_group(record).await?;

        let replaced = convert::group_from_record(&stored, &self.config);
        hooks::run_group_hooks(&self.config.hooks, &replaced)?;
        Ok(replaced)
    }

    pub async fn get_group(&self, id: &str) -> ScimResult<Group> {
        let uuid = parse_id(ResourceType::Group, id)?;
        let record = self
            .storage
            .get_group(uuid)
            .await?
            .ok_or_else(|| ScimError::resource_not_found("Group", id))?;
        Ok(convert::group_from_record(&record, &self.config))
    }

    pub async fn delete_group(&self, id: &str) -> ScimResult<()> {
        log::info!("Deleting group {}", id);
        let uuid = parse_id(ResourceType::Group, id)?;
        if self.storage.delete_group(uuid).await? {
            Ok(())
        } else {
            Err(ScimError::resource_not_found("Group", id))
        }
    }

    pub async fn patch_group(&self, id: &str, request: &PatchRequest) -> ScimResult<Group> {
        log::info!("Patching group {} ({} operations)", id, request.operations.len());
        request.validate()?;
        let uuid = parse_id(ResourceType::Group, id)?;
        let current = self
            .storage
            .get_group(uuid)
            .await?
            .ok_or_else(|| ScimError::resource_not_found("Group", id))?;

        let mut owner = Owner::Group(current.row);
        let engine = PatchEngine::new(&self.storage, self.parser.as_ref(), &self.config);
        for operation in &request.operations {
            engine.apply(&mut owner, operation).await?;
        }

        let mut record = self
            .storage
            .get_group(uuid)
            .await?
            .ok_or_else(|| ScimError::resource_not_found("Group", id))?;
        record.row.last_modified = Utc::now();
        if self.config.recompute_etag_on_patch {
            let view = convert::group_from_record(&record, &self.config);
            record.row.etag = self.etags.compute_group(&view).to_string();
        }
        record.row = self.storage.update_group(record.row).await?;

        let patched = convert::group_from_record(&record, &self.config);
        hooks::run_group_hooks(&self.config.hooks, &patched)?;
        Ok(patched)
    }

    /// Build the record for `group` and stamp it from the stored view, so that
    /// generated member `$ref`s hash the same here and after a patch.
    fn stamped_group_record(
        &self,
        group: &Group,
        id: Uuid,
        created: chrono::DateTime<Utc>,
        now: chrono::DateTime<Utc>,
    ) -> GroupRecord {
        let mut record = convert::group_record(group, id, String::new(), created, now, &self.config);
        let view = convert::group_from_record(&record, &self.config);
        record.row.etag = self.etags.compute_group(&view).to_string();
        record
    }

    /// The protocol view of `record`, with its group memberships.
    async fn user_view(&self, record: &UserRecord) -> ScimResult<User> {
        let mut groups = self.groups_of(&[record.row.id]).await?;
        let mine = groups.remove(&record.row.id).unwrap_or_default();
        Ok(convert::user_from_record(record, mine, &self.config))
    }

    /// Direct group memberships of each of `user_ids`.
    pub(crate) async fn groups_of(
        &self,
        user_ids: &[Uuid],
    ) -> ScimResult<HashMap<Uuid, Vec<GroupRef>>> {
        let mut memberships: HashMap<Uuid, Vec<GroupRef>> = HashMap::new();
        if user_ids.is_empty() {
            return Ok(memberships);
        }

        let groups = self
            .storage
            .query_groups(Some(&has_member(member_value_is(user_ids))))
            .await?;
        for group in &groups {
            for item in group.items(Relation::Members) {
                if item.item_type.as_deref() == Some("Group") {
                    continue;
                }
                let Some(user_id) = item.value.as_deref().and_then(|v| Uuid::parse_str(v).ok())
                else {
                    continue;
                };
                if !user_ids.contains(&user_id) {
                    continue;
                }
                let refs = memberships.entry(user_id).or_default();
                if !refs.iter().any(|r| r.value == group.row.id.to_string()) {
                    refs.push(convert::group_ref(&group.row, &self.config));
                }
            }
        }
        Ok(memberships)
    }
}

/// Ids are UUIDs; anything else cannot name a stored resource.
fn parse_id(resource_type: ResourceType, id: &str) -> ScimResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| ScimError::resource_not_found(resource_type.as_str(), id))
}

fn check_precondition(if_match: Option<&str>, current: &str) -> ScimResult<()> {
    let Some(expected) = if_match.map(str::trim) else {
        return Ok(());
    };
    if expected == "*" {
        return Ok(());
    }
    let wanted: HttpVersion = expected.parse()?;
    let matches = current
        .parse::<HttpVersion>()
        .map(|stored| stored == wanted)
        .unwrap_or(false);
    if matches {
        Ok(())
    } else {
        Err(ScimError::PreconditionFailed {
            expected: expected.to_string(),
            current: current.to_string(),
        })
    }
}

/// Member item whose `value` is one of `user_ids`.
fn member_value_is(user_ids: &[Uuid]) -> Predicate {
    Predicate::or(
        user_ids
            .iter()
            .map(|id| Predicate::Equals {
                column: item_columns::VALUE,
                value: Scalar::Text(id.to_string()),
                fold_case: false,
            })
            .collect(),
    )
}

fn has_member(filter: Predicate) -> Predicate {
    Predicate::HasItem {
        relation: Relation::Members,
        filter: Some(Box::new(filter)),
    }
}
