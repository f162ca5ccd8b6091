//! Common test utilities for the SCIM store integration tests.

use scim_store::backend::WriteHook;
use scim_store::error::{ScimError, ScimResult};
use scim_store::resource::{Group, User};
use scim_store::storage::{
    GroupRecord, GroupRow, InMemoryStorage, ItemRow, Predicate, Relation, StorageError,
    StorageProvider, UserRecord, UserRow,
};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

pub mod fixtures;

/// Wraps [`InMemoryStorage`] and fails the calls it was told to fail.
///
/// Query calls are counted so tests can assert storage was never touched.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: InMemoryStorage,
    pub fail_user_queries: AtomicBool,
    pub fail_group_queries: AtomicBool,
    pub fail_item_inserts: AtomicBool,
    pub queries: AtomicUsize,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::internal(format!("{} unavailable", what)))
        } else {
            Ok(())
        }
    }
}

impl StorageProvider for FlakyStorage {
    async fn insert_user(&self, record: UserRecord) -> Result<UserRecord, StorageError> {
        self.inner.insert_user(record).await
    }

    async fn replace_user(&self, record: UserRecord) -> Result<UserRecord, StorageError> {
        self.inner.replace_user(record).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, StorageError> {
        self.inner.get_user(id).await
    }

    async fn query_users(
        &self,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<UserRecord>, StorageError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_user_queries, "users")?;
        self.inner.query_users(predicate).await
    }

    async fn update_user(&self, row: UserRow) -> Result<UserRow, StorageError> {
        self.inner.update_user(row).await
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StorageError> {
        self.inner.delete_user(id).await
    }

    async fn insert_group(&self, record: GroupRecord) -> Result<GroupRecord, StorageError> {
        self.inner.insert_group(record).await
    }

    async fn replace_group(&self, record: GroupRecord) -> Result<GroupRecord, StorageError> {
        self.inner.replace_group(record).await
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<GroupRecord>, StorageError> {
        self.inner.get_group(id).await
    }

    async fn query_groups(
        &self,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<GroupRecord>, StorageError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_group_queries, "groups")?;
        self.inner.query_groups(predicate).await
    }

    async fn update_group(&self, row: GroupRow) -> Result<GroupRow, StorageError> {
        self.inner.update_group(row).await
    }

    async fn delete_group(&self, id: Uuid) -> Result<bool, StorageError> {
        self.inner.delete_group(id).await
    }

    async fn query_items(
        &self,
        relation: Relation,
        owner_id: Uuid,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<ItemRow>, StorageError> {
        self.inner.query_items(relation, owner_id, predicate).await
    }

    async fn insert_item(&self, relation: Relation, item: ItemRow) -> Result<ItemRow, StorageError> {
        Self::check(&self.fail_item_inserts, "items")?;
        self.inner.insert_item(relation, item).await
    }

    async fn update_item(&self, relation: Relation, item: ItemRow) -> Result<ItemRow, StorageError> {
        self.inner.update_item(relation, item).await
    }

    async fn delete_items(&self, relation: Relation, ids: &[Uuid]) -> Result<usize, StorageError> {
        self.inner.delete_items(relation, ids).await
    }

    async fn delete_all_items(
        &self,
        relation: Relation,
        owner_id: Uuid,
    ) -> Result<usize, StorageError> {
        self.inner.delete_all_items(relation, owner_id).await
    }
}

/// A write hook that records the names it saw, optionally rejecting users.
///
/// Clones share one log, so a test keeps a clone after handing the hook over.
#[derive(Clone, Default)]
pub struct RecordingHook {
    seen: Arc<Mutex<Vec<String>>>,
    reject_users: bool,
}

impl RecordingHook {
    pub fn rejecting() -> Self {
        Self {
            reject_users: true,
            ..Self::default()
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl WriteHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    fn after_user_write(&self, user: &User) -> ScimResult<()> {
        self.seen.lock().unwrap().push(user.user_name.clone());
        if self.reject_users {
            return Err(ScimError::hook(format!("rejected {}", user.user_name)));
        }
        Ok(())
    }

    fn after_group_write(&self, group: &Group) -> ScimResult<()> {
        self.seen.lock().unwrap().push(group.display_name.clone());
        Ok(())
    }
}
