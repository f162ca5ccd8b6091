//! Storage abstraction layer for SCIM resources.
//!
//! The [`StorageProvider`] trait is the Create/Query/Update/Delete contract the
//! rest of the crate talks to. It knows about rows, relations and
//! [`Predicate`]s, and nothing about SCIM filters, PATCH paths or version
//! stamps; those live in the layers above.
//!
//! Whole-resource writes (`insert_*`, `replace_*`) take a [`Record`] holding
//! the resource row and all of its collection items and must persist them as
//! one unit. Item-level writes are independent calls and carry no
//! transactional guarantee across calls.
//!
//! # Example Usage
//!
//! ```rust
//! use scim_store::storage::{InMemoryStorage, StorageProvider, UserRecord, UserRow};
//! use chrono::Utc;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = InMemoryStorage::new();
//! let row = UserRow::new(Uuid::new_v4(), "bjensen", Utc::now());
//! let stored = storage.insert_user(UserRecord::new(row)).await?;
//!
//! let found = storage.get_user(stored.row.id).await?;
//! assert!(found.is_some());
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod in_memory;
pub mod predicate;
pub mod rows;

pub use errors::StorageError;
pub use in_memory::{InMemoryStorage, InMemoryStorageStats};
pub use predicate::{NoRelations, Predicate, RelationLoader};
pub use rows::{
    Cell, Column, GroupRecord, GroupRow, ItemRow, Record, Relation, Row, Scalar, UserRecord,
    UserRow,
};

use std::future::Future;
use uuid::Uuid;

/// Core trait for storage backends.
///
/// Query results are ordered by creation time, then by id. Item queries keep
/// insertion order.
pub trait StorageProvider: Send + Sync {
    /// Persist a new user row with all of its collection items.
    ///
    /// Fails with a constraint error when the userName is taken.
    fn insert_user(
        &self,
        record: UserRecord,
    ) -> impl Future<Output = Result<UserRecord, StorageError>> + Send;

    /// Replace an existing user row and every one of its collection items.
    fn replace_user(
        &self,
        record: UserRecord,
    ) -> impl Future<Output = Result<UserRecord, StorageError>> + Send;

    /// Load a user with its collection items.
    fn get_user(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<UserRecord>, StorageError>> + Send;

    /// Load every user matching `predicate` (all users when `None`).
    fn query_users(
        &self,
        predicate: Option<&Predicate>,
    ) -> impl Future<Output = Result<Vec<UserRecord>, StorageError>> + Send;

    /// Update the scalar columns of an existing user row.
    fn update_user(&self, row: UserRow)
    -> impl Future<Output = Result<UserRow, StorageError>> + Send;

    /// Delete a user and its collection items. Returns whether it existed.
    fn delete_user(&self, id: Uuid) -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn insert_group(
        &self,
        record: GroupRecord,
    ) -> impl Future<Output = Result<GroupRecord, StorageError>> + Send;

    fn replace_group(
        &self,
        record: GroupRecord,
    ) -> impl Future<Output = Result<GroupRecord, StorageError>> + Send;

    fn get_group(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<GroupRecord>, StorageError>> + Send;

    fn query_groups(
        &self,
        predicate: Option<&Predicate>,
    ) -> impl Future<Output = Result<Vec<GroupRecord>, StorageError>> + Send;

    fn update_group(
        &self,
        row: GroupRow,
    ) -> impl Future<Output = Result<GroupRow, StorageError>> + Send;

    fn delete_group(&self, id: Uuid) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Items of `relation` owned by `owner_id`, filtered by `predicate` when given.
    fn query_items(
        &self,
        relation: Relation,
        owner_id: Uuid,
        predicate: Option<&Predicate>,
    ) -> impl Future<Output = Result<Vec<ItemRow>, StorageError>> + Send;

    /// Create an item and link it to `item.owner_id`.
    ///
    /// Fails with a constraint error when the owner does not exist.
    fn insert_item(
        &self,
        relation: Relation,
        item: ItemRow,
    ) -> impl Future<Output = Result<ItemRow, StorageError>> + Send;

    fn update_item(
        &self,
        relation: Relation,
        item: ItemRow,
    ) -> impl Future<Output = Result<ItemRow, StorageError>> + Send;

    /// Delete the listed items. Returns how many existed.
    fn delete_items(
        &self,
        relation: Relation,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<usize, StorageError>> + Send;

    /// Delete every item of `relation` owned by `owner_id`.
    fn delete_all_items(
        &self,
        relation: Relation,
        owner_id: Uuid,
    ) -> impl Future<Output = Result<usize, StorageError>> + Send;

    /// The single item matching `predicate`.
    ///
    /// Fails with `NotFound` when nothing matches and `NotSingular` when more
    /// than one item does.
    fn only_item(
        &self,
        relation: Relation,
        owner_id: Uuid,
        predicate: &Predicate,
    ) -> impl Future<Output = Result<ItemRow, StorageError>> + Send {
        async move {
            let mut items = self.query_items(relation, owner_id, Some(predicate)).await?;
            match items.len() {
                1 => Ok(items.remove(0)),
                0 => Err(StorageError::not_found(
                    relation.table(),
                    predicate.to_string(),
                )),
                count => Err(StorageError::not_singular(relation.table(), count)),
            }
        }
    }
}
