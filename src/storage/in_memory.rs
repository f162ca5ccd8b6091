//! In-memory storage implementation for SCIM resources.
//!
//! Thread-safe implementation of [`StorageProvider`] backed by hash maps behind
//! a tokio `RwLock`. It is meant for tests, development and embedding; every
//! whole-resource write happens under one write lock, so inserts and replaces
//! of a resource with its collection items are atomic.
//!
//! # Constraints
//!
//! * `userName` is unique across users, compared case-insensitively.
//! * Items can only be linked to an existing owner of the right type.
//!
//! # Example Usage
//!
//! ```rust
//! use scim_store::storage::{InMemoryStorage, Predicate, Scalar, StorageProvider, UserRecord, UserRow};
//! use scim_store::storage::rows::user_columns;
//! use chrono::Utc;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = InMemoryStorage::new();
//! storage
//!     .insert_user(UserRecord::new(UserRow::new(Uuid::new_v4(), "alice", Utc::now())))
//!     .await?;
//!
//! let predicate = Predicate::Equals {
//!     column: user_columns::USER_NAME,
//!     value: Scalar::Text("ALICE".into()),
//!     fold_case: true,
//! };
//! let found = storage.query_users(Some(&predicate)).await?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::resource::ResourceType;
use crate::storage::{
    GroupRecord, GroupRow, ItemRow, Predicate, Record, Relation, RelationLoader, StorageError,
    StorageProvider, UserRecord, UserRow,
};
use crate::storage::predicate::NoRelations;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, UserRow>,
    groups: HashMap<Uuid, GroupRow>,
    items: HashMap<Relation, Vec<ItemRow>>,
}

impl RelationLoader for Tables {
    fn load(&self, relation: Relation, owner_id: Uuid) -> Result<Vec<&ItemRow>, StorageError> {
        Ok(self
            .items
            .get(&relation)
            .map(|rows| rows.iter().filter(|r| r.owner_id == owner_id).collect())
            .unwrap_or_default())
    }
}

impl Tables {
    fn owner_exists(&self, resource_type: ResourceType, id: Uuid) -> bool {
        match resource_type {
            ResourceType::User => self.users.contains_key(&id),
            ResourceType::Group => self.groups.contains_key(&id),
        }
    }

    fn check_user_name(&self, user_name: &str, except: Uuid) -> Result<(), StorageError> {
        let wanted = user_name.to_lowercase();
        let taken = self
            .users
            .values()
            .any(|row| row.id != except && row.user_name.to_lowercase() == wanted);
        if taken {
            return Err(StorageError::constraint(
                "users",
                format!("userName '{}' already exists", user_name),
            ));
        }
        Ok(())
    }

    fn children(&self, resource_type: ResourceType, owner_id: Uuid) -> BTreeMap<Relation, Vec<ItemRow>> {
        Relation::for_owner(resource_type)
            .iter()
            .filter_map(|relation| {
                let items: Vec<ItemRow> = self
                    .items
                    .get(relation)
                    .map(|rows| {
                        rows.iter()
                            .filter(|r| r.owner_id == owner_id)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                (!items.is_empty()).then_some((*relation, items))
            })
            .collect()
    }

    fn remove_children(&mut self, resource_type: ResourceType, owner_id: Uuid) {
        for relation in Relation::for_owner(resource_type) {
            if let Some(rows) = self.items.get_mut(relation) {
                rows.retain(|r| r.owner_id != owner_id);
            }
        }
    }

    fn insert_children(
        &mut self,
        resource_type: ResourceType,
        owner_id: Uuid,
        children: &BTreeMap<Relation, Vec<ItemRow>>,
    ) {
        for (relation, items) in children {
            let rows = self.items.entry(*relation).or_default();
            for item in items {
                let mut item = item.clone();
                item.owner_id = owner_id;
                rows.push(item);
            }
        }
        log::trace!(
            "Linked {} item rows to {} {}",
            children.values().map(Vec::len).sum::<usize>(),
            resource_type,
            owner_id
        );
    }

    fn user_record(&self, row: &UserRow) -> UserRecord {
        Record {
            row: row.clone(),
            children: self.children(ResourceType::User, row.id),
        }
    }

    fn group_record(&self, row: &GroupRow) -> GroupRecord {
        Record {
            row: row.clone(),
            children: self.children(ResourceType::Group, row.id),
        }
    }
}

fn check_relations<R>(record: &Record<R>, resource_type: ResourceType) -> Result<(), StorageError> {
    match record.children.keys().find(|r| r.owner() != resource_type) {
        Some(relation) => Err(StorageError::invalid_data(format!(
            "{} items cannot belong to a {}",
            relation, resource_type
        ))),
        None => Ok(()),
    }
}

/// Thread-safe in-memory storage implementation.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get storage statistics for debugging and monitoring.
    pub async fn stats(&self) -> InMemoryStorageStats {
        let tables = self.tables.read().await;
        InMemoryStorageStats {
            user_count: tables.users.len(),
            group_count: tables.groups.len(),
            item_count: tables.items.values().map(Vec::len).sum(),
        }
    }
}

impl StorageProvider for InMemoryStorage {
    async fn insert_user(&self, record: UserRecord) -> Result<UserRecord, StorageError> {
        check_relations(&record, ResourceType::User)?;
        let mut tables = self.tables.write().await;

        if tables.users.contains_key(&record.row.id) {
            return Err(StorageError::constraint(
                "users",
                format!("duplicate key {}", record.row.id),
            ));
        }
        tables.check_user_name(&record.row.user_name, record.row.id)?;

        let id = record.row.id;
        tables.users.insert(id, record.row.clone());
        tables.insert_children(ResourceType::User, id, &record.children);
        Ok(tables.user_record(&record.row))
    }

    async fn replace_user(&self, record: UserRecord) -> Result<UserRecord, StorageError> {
        check_relations(&record, ResourceType::User)?;
        let mut tables = self.tables.write().await;

        let id = record.row.id;
        if !tables.users.contains_key(&id) {
            return Err(StorageError::not_found("users", id.to_string()));
        }
        tables.check_user_name(&record.row.user_name, id)?;

        tables.users.insert(id, record.row.clone());
        tables.remove_children(ResourceType::User, id);
        tables.insert_children(ResourceType::User, id, &record.children);
        Ok(tables.user_record(&record.row))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).map(|row| tables.user_record(row)))
    }

    async fn query_users(
        &self,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<UserRecord>, StorageError> {
        let tables = self.tables.read().await;
        let mut matched = Vec::new();
        for row in tables.users.values() {
            let keep = match predicate {
                Some(predicate) => predicate.evaluate(row, &*tables)?,
                None => true,
            };
            if keep {
                matched.push(row);
            }
        }
        matched.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        Ok(matched.into_iter().map(|row| tables.user_record(row)).collect())
    }

    async fn update_user(&self, row: UserRow) -> Result<UserRow, StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&row.id) {
            return Err(StorageError::not_found("users", row.id.to_string()));
        }
        tables.check_user_name(&row.user_name, row.id)?;
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut tables = self.tables.write().await;
        let existed = tables.users.remove(&id).is_some();
        if existed {
            tables.remove_children(ResourceType::User, id);
        }
        Ok(existed)
    }

    async fn insert_group(&self, record: GroupRecord) -> Result<GroupRecord, StorageError> {
        check_relations(&record, ResourceType::Group)?;
        let mut tables = self.tables.write().await;

        let id = record.row.id;
        if tables.groups.contains_key(&id) {
            return Err(StorageError::constraint(
                "groups",
                format!("duplicate key {}", id),
            ));
        }
        tables.groups.insert(id, record.row.clone());
        tables.insert_children(ResourceType::Group, id, &record.children);
        Ok(tables.group_record(&record.row))
    }

    async fn replace_group(&self, record: GroupRecord) -> Result<GroupRecord, StorageError> {
        check_relations(&record, ResourceType::Group)?;
        let mut tables = self.tables.write().await;

        let id = record.row.id;
        if !tables.groups.contains_key(&id) {
            return Err(StorageError::not_found("groups", id.to_string()));
        }
        tables.groups.insert(id, record.row.clone());
        tables.remove_children(ResourceType::Group, id);
        tables.insert_children(ResourceType::Group, id, &record.children);
        Ok(tables.group_record(&record.row))
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<GroupRecord>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.groups.get(&id).map(|row| tables.group_record(row)))
    }

    async fn query_groups(
        &self,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<GroupRecord>, StorageError> {
        let tables = self.tables.read().await;
        let mut matched = Vec::new();
        for row in tables.groups.values() {
            let keep = match predicate {
                Some(predicate) => predicate.evaluate(row, &*tables)?,
                None => true,
            };
            if keep {
                matched.push(row);
            }
        }
        matched.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        Ok(matched.into_iter().map(|row| tables.group_record(row)).collect())
    }

    async fn update_group(&self, row: GroupRow) -> Result<GroupRow, StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&row.id) {
            return Err(StorageError::not_found("groups", row.id.to_string()));
        }
        tables.groups.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_group(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut tables = self.tables.write().await;
        let existed = tables.groups.remove(&id).is_some();
        if existed {
            tables.remove_children(ResourceType::Group, id);
        }
        Ok(existed)
    }

    async fn query_items(
        &self,
        relation: Relation,
        owner_id: Uuid,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<ItemRow>, StorageError> {
        let tables = self.tables.read().await;
        let mut matched = Vec::new();
        for item in tables.load(relation, owner_id)? {
            let keep = match predicate {
                Some(predicate) => predicate.evaluate(item, &NoRelations)?,
                None => true,
            };
            if keep {
                matched.push(item.clone());
            }
        }
        Ok(matched)
    }

    async fn insert_item(&self, relation: Relation, item: ItemRow) -> Result<ItemRow, StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.owner_exists(relation.owner(), item.owner_id) {
            return Err(StorageError::constraint(
                relation.table(),
                format!("foreign key: no {} with id {}", relation.owner(), item.owner_id),
            ));
        }
        let rows = tables.items.entry(relation).or_default();
        if rows.iter().any(|r| r.id == item.id) {
            return Err(StorageError::constraint(
                relation.table(),
                format!("duplicate key {}", item.id),
            ));
        }
        rows.push(item.clone());
        Ok(item)
    }

    async fn update_item(&self, relation: Relation, item: ItemRow) -> Result<ItemRow, StorageError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .items
            .get_mut(&relation)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == item.id))
            .ok_or_else(|| StorageError::not_found(relation.table(), item.id.to_string()))?;
        if slot.owner_id != item.owner_id {
            return Err(StorageError::constraint(
                relation.table(),
                "items cannot be moved to another owner",
            ));
        }
        *slot = item.clone();
        Ok(item)
    }

    async fn delete_items(&self, relation: Relation, ids: &[Uuid]) -> Result<usize, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.items.get_mut(&relation) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !ids.contains(&r.id));
        Ok(before - rows.len())
    }

    async fn delete_all_items(&self, relation: Relation, owner_id: Uuid) -> Result<usize, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.items.get_mut(&relation) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| r.owner_id != owner_id);
        Ok(before - rows.len())
    }
}

/// Statistics about the current state of in-memory storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryStorageStats {
    pub user_count: usize,
    pub group_count: usize,
    /// Collection items across all relations
    pub item_count: usize,
}
