//! The Patch Engine: applies resolved PATCH operations through storage.
//!
//! Scalar changes are written to the owner row at once; collection changes
//! are item-level storage calls. Every write that could leave a collection
//! with two primary items is checked before it is issued.

use crate::backend::BackendConfig;
use crate::backend::convert::{address_row, member, member_row, multi_value_row};
use crate::error::{ScimError, ScimResult, ValidationError};
use crate::filter::{Field, FieldKind, FilterParser, Registry};
use crate::patch::path::{PatchTarget, resolve_path};
use crate::patch::{PatchError, PatchOp, PatchOperation};
use crate::resource::{
    Address, GroupMember, MultiValue, ResourceType, validate_single_primary, validate_values,
};
use crate::storage::{
    GroupRow, ItemRow, Predicate, Relation, Row, Scalar, StorageProvider, UserRow,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// The loaded row a PATCH request is applied to.
#[derive(Debug, Clone, PartialEq)]
pub enum Owner {
    User(UserRow),
    Group(GroupRow),
}

impl Owner {
    pub fn id(&self) -> Uuid {
        match self {
            Owner::User(row) => row.id,
            Owner::Group(row) => row.id,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        match self {
            Owner::User(_) => ResourceType::User,
            Owner::Group(_) => ResourceType::Group,
        }
    }

    fn row_mut(&mut self) -> &mut dyn Row {
        match self {
            Owner::User(row) => row,
            Owner::Group(row) => row,
        }
    }
}

/// Applies PATCH operations to one owner row.
pub struct PatchEngine<'a, S> {
    storage: &'a S,
    parser: &'a dyn FilterParser,
    config: &'a BackendConfig,
}

impl<'a, S: StorageProvider> PatchEngine<'a, S> {
    pub fn new(storage: &'a S, parser: &'a dyn FilterParser, config: &'a BackendConfig) -> Self {
        Self {
            storage,
            parser,
            config,
        }
    }

    /// Dispatch on `op.op`.
    pub async fn apply(&self, owner: &mut Owner, op: &PatchOperation) -> ScimResult<()> {
        log::debug!(
            "Applying {} {:?} to {} {}",
            op.op,
            op.path,
            owner.resource_type(),
            owner.id()
        );
        match op.op {
            PatchOp::Add => self.apply_add(owner, op).await,
            PatchOp::Remove => self.apply_remove(owner, op).await,
            PatchOp::Replace => self.apply_replace(owner, op).await,
        }
    }

    pub async fn apply_add(&self, owner: &mut Owner, op: &PatchOperation) -> ScimResult<()> {
        match &op.path {
            Some(path) => {
                let target = self.resolve(owner, path)?;
                self.add(owner, target, &op.value).await
            }
            None => self.apply_each(owner, &op.value, PatchOp::Add).await,
        }
    }

    pub async fn apply_remove(&self, owner: &mut Owner, op: &PatchOperation) -> ScimResult<()> {
        let Some(path) = &op.path else {
            return Err(PatchError::NoTarget("remove operation requires a path".to_string()).into());
        };
        let target = self.resolve(owner, path)?;
        self.remove(owner, target).await
    }

    pub async fn apply_replace(&self, owner: &mut Owner, op: &PatchOperation) -> ScimResult<()> {
        match &op.path {
            Some(path) => {
                let target = self.resolve(owner, path)?;
                self.replace(owner, target, &op.value).await
            }
            None => self.apply_each(owner, &op.value, PatchOp::Replace).await,
        }
    }

    fn resolve(&self, owner: &Owner, path: &str) -> Result<PatchTarget, PatchError> {
        resolve_path(self.parser, owner.resource_type(), path)
    }

    /// A path-less add or replace: every member of the object value is its own path.
    async fn apply_each(&self, owner: &mut Owner, value: &Value, op: PatchOp) -> ScimResult<()> {
        let Value::Object(members) = value else {
            return Err(PatchError::invalid_value(
                "value",
                "an operation without a path needs an object value",
            )
            .into());
        };
        for (path, value) in members {
            let target = self.resolve(owner, path)?;
            match op {
                PatchOp::Replace => self.replace(owner, target, value).await?,
                _ => self.add(owner, target, value).await?,
            }
        }
        Ok(())
    }

    async fn add(&self, owner: &mut Owner, target: PatchTarget, value: &Value) -> ScimResult<()> {
        if value.is_null() {
            return Err(PatchError::invalid_value("value", "add requires a value").into());
        }
        match target {
            PatchTarget::Field(field) => {
                let scalar = decode_scalar(&field, value)?;
                self.set_fields(owner, &[(field, scalar)]).await
            }
            PatchTarget::Complex(prefix) => {
                let updates = complex_updates(owner.resource_type(), &prefix, value)?;
                self.set_fields(owner, &updates).await
            }
            PatchTarget::Collection {
                relation,
                filter: None,
                sub_attr: None,
            } => self.add_items(owner.id(), relation, value).await,
            PatchTarget::Collection {
                relation,
                filter: Some(filter),
                sub_attr: Some(field),
            } => self.set_item_field(owner.id(), relation, &filter, field, value).await,
            PatchTarget::Collection {
                relation,
                filter: Some(_),
                sub_attr: None,
            } => Err(PatchError::MissingSubAttribute(relation.attribute().to_string()).into()),
            PatchTarget::Collection { relation, .. } => {
                Err(PatchError::MissingFilter(relation.attribute().to_string()).into())
            }
        }
    }

    async fn remove(&self, owner: &mut Owner, target: PatchTarget) -> ScimResult<()> {
        match target {
            PatchTarget::Field(field) => self.set_fields(owner, &[(field, None)]).await,
            PatchTarget::Complex(prefix) => {
                let cleared = complex_fields(owner.resource_type(), &prefix)
                    .map(|field| (field, None))
                    .collect::<Vec<_>>();
                self.set_fields(owner, &cleared).await
            }
            PatchTarget::Collection {
                relation,
                filter: None,
                sub_attr: None,
            } => {
                let removed = self.storage.delete_all_items(relation, owner.id()).await?;
                log::debug!("Removed all {} {} of {}", removed, relation, owner.id());
                Ok(())
            }
            PatchTarget::Collection {
                relation,
                filter: Some(filter),
                sub_attr: None,
            } => {
                let matched = self
                    .storage
                    .query_items(relation, owner.id(), Some(&filter))
                    .await?;
                let ids: Vec<Uuid> = matched.iter().map(|item| item.id).collect();
                let removed = self.storage.delete_items(relation, &ids).await?;
                log::debug!("Removed {} {} matching {}", removed, relation, filter);
                Ok(())
            }
            // Sub-attributes of selected items are never removable, unlike add.
            PatchTarget::Collection {
                filter: Some(_),
                sub_attr: Some(field),
                ..
            } => Err(PatchError::Immutable(field.name.to_string()).into()),
            PatchTarget::Collection { relation, .. } => {
                Err(PatchError::MissingFilter(relation.attribute().to_string()).into())
            }
        }
    }

    async fn replace(
        &self,
        owner: &mut Owner,
        target: PatchTarget,
        value: &Value,
    ) -> ScimResult<()> {
        match target {
            PatchTarget::Field(field) => {
                let scalar = decode_scalar(&field, value)?;
                self.set_fields(owner, &[(field, scalar)]).await
            }
            PatchTarget::Complex(prefix) => {
                let mut updates: Vec<(Field, Option<Scalar>)> =
                    complex_fields(owner.resource_type(), &prefix)
                        .map(|field| (field, None))
                        .collect();
                if !value.is_null() {
                    for (field, scalar) in complex_updates(owner.resource_type(), &prefix, value)? {
                        if let Some(slot) = updates.iter_mut().find(|slot| slot.0 == field) {
                            slot.1 = scalar;
                        }
                    }
                }
                self.set_fields(owner, &updates).await
            }
            PatchTarget::Collection {
                relation,
                filter: None,
                sub_attr: None,
            } => {
                let items = if value.is_null() {
                    Vec::new()
                } else {
                    self.decode_items(owner.id(), relation, value)?
                };
                check_primary(relation, &items)?;
                self.storage.delete_all_items(relation, owner.id()).await?;
                for item in items {
                    self.storage.insert_item(relation, item).await?;
                }
                Ok(())
            }
            PatchTarget::Collection {
                relation,
                filter: Some(filter),
                sub_attr: Some(field),
            } => self.set_item_field(owner.id(), relation, &filter, field, value).await,
            PatchTarget::Collection {
                relation,
                filter: Some(filter),
                sub_attr: None,
            } => self.merge_items(owner.id(), relation, &filter, value).await,
            PatchTarget::Collection { relation, .. } => {
                Err(PatchError::MissingFilter(relation.attribute().to_string()).into())
            }
        }
    }

    /// Assign columns of the owner row and persist it.
    async fn set_fields(
        &self,
        owner: &mut Owner,
        updates: &[(Field, Option<Scalar>)],
    ) -> ScimResult<()> {
        let row = owner.row_mut();
        for (field, scalar) in updates {
            row.assign(field.column, scalar.clone())
                .map_err(|e| PatchError::invalid_value(field.name, e))?;
        }

        match owner {
            Owner::User(row) => *row = self.storage.update_user(row.clone()).await?,
            Owner::Group(row) => *row = self.storage.update_group(row.clone()).await?,
        }
        Ok(())
    }

    /// Create and link new items, skipping ones already present.
    async fn add_items(&self, owner_id: Uuid, relation: Relation, value: &Value) -> ScimResult<()> {
        let existing = self.storage.query_items(relation, owner_id, None).await?;
        let mut fresh: Vec<ItemRow> = Vec::new();
        for item in self.decode_items(owner_id, relation, value)? {
            if existing.iter().chain(&fresh).any(|e| same_item(relation, e, &item)) {
                log::debug!("Skipping duplicate {} item {:?}", relation, item.identity());
                continue;
            }
            fresh.push(item);
        }

        let all: Vec<ItemRow> = existing.into_iter().chain(fresh.iter().cloned()).collect();
        check_primary(relation, &all)?;

        for item in fresh {
            self.storage.insert_item(relation, item).await?;
        }
        Ok(())
    }

    /// Set one sub-attribute of the single item matching `filter`.
    async fn set_item_field(
        &self,
        owner_id: Uuid,
        relation: Relation,
        filter: &Predicate,
        field: Field,
        value: &Value,
    ) -> ScimResult<()> {
        let mut item = self
            .storage
            .only_item(relation, owner_id, filter)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() || e.is_not_singular() => {
                    ScimError::from(PatchError::NotSingular)
                }
                e => ScimError::from(e),
            })?;

        let scalar = decode_scalar(&field, value)?;
        item.assign(field.column, scalar)
            .map_err(|e| PatchError::invalid_value(field.name, e))?;
        if relation == Relation::Members {
            member(&item).validate()?;
        }

        if item.is_primary() {
            let mut all = self.storage.query_items(relation, owner_id, None).await?;
            all.retain(|other| other.id != item.id);
            all.push(item.clone());
            check_primary(relation, &all)?;
        }

        self.storage.update_item(relation, item).await?;
        Ok(())
    }

    /// Copy the members of an object value onto every item matching `filter`.
    async fn merge_items(
        &self,
        owner_id: Uuid,
        relation: Relation,
        filter: &Predicate,
        value: &Value,
    ) -> ScimResult<()> {
        let Value::Object(members) = value else {
            return Err(
                PatchError::invalid_value(relation.attribute(), "expected an object").into(),
            );
        };

        let all = self.storage.query_items(relation, owner_id, None).await?;
        let matched = self
            .storage
            .query_items(relation, owner_id, Some(filter))
            .await?;
        if matched.is_empty() {
            return Err(PatchError::NoTarget(format!(
                "no {} item matches {}",
                relation, filter
            ))
            .into());
        }

        let updates = item_updates(relation, members)?;
        let mut changed = Vec::with_capacity(matched.len());
        for mut item in matched {
            for (field, scalar) in &updates {
                item.assign(field.column, scalar.clone())
                    .map_err(|e| PatchError::invalid_value(field.name, e))?;
            }
            if relation == Relation::Members {
                member(&item).validate()?;
            }
            changed.push(item);
        }

        let after: Vec<ItemRow> = all
            .into_iter()
            .filter(|item| !changed.iter().any(|c| c.id == item.id))
            .chain(changed.iter().cloned())
            .collect();
        check_primary(relation, &after)?;

        for item in changed {
            self.storage.update_item(relation, item).await?;
        }
        Ok(())
    }

    /// One item per element of an array value, or one item for an object.
    fn decode_items(
        &self,
        owner_id: Uuid,
        relation: Relation,
        value: &Value,
    ) -> ScimResult<Vec<ItemRow>> {
        match value {
            Value::Array(values) => values
                .iter()
                .map(|v| self.decode_item(owner_id, relation, v))
                .collect(),
            other => Ok(vec![self.decode_item(owner_id, relation, other)?]),
        }
    }

    fn decode_item(&self, owner_id: Uuid, relation: Relation, value: &Value) -> ScimResult<ItemRow> {
        let invalid = |e: serde_json::Error| PatchError::invalid_value(relation.attribute(), e);
        match relation {
            Relation::Addresses => {
                let address = Address::deserialize(value).map_err(invalid)?;
                Ok(address_row(owner_id, &address))
            }
            Relation::Members => {
                let member = GroupMember::deserialize(value).map_err(invalid)?;
                member.validate()?;
                Ok(member_row(owner_id, &member, self.config))
            }
            _ => {
                let item = MultiValue::deserialize(value).map_err(invalid)?;
                validate_values(relation.attribute(), std::slice::from_ref(&item))?;
                Ok(multi_value_row(owner_id, &item))
            }
        }
    }
}

/// Items compare by (`$ref`, `type`, `value`); addresses, which have no
/// value, compare by every address column.
fn same_item(relation: Relation, a: &ItemRow, b: &ItemRow) -> bool {
    match relation {
        Relation::Addresses => {
            a.formatted == b.formatted
                && a.street_address == b.street_address
                && a.locality == b.locality
                && a.region == b.region
                && a.postal_code == b.postal_code
                && a.country == b.country
                && a.item_type == b.item_type
        }
        _ => a.identity() == b.identity(),
    }
}

fn check_primary(relation: Relation, items: &[ItemRow]) -> Result<(), ValidationError> {
    validate_single_primary(relation.attribute(), items)
}

/// Decode a JSON value for `field`. `null` clears the field.
fn decode_scalar(field: &Field, value: &Value) -> Result<Option<Scalar>, PatchError> {
    match (field.kind, value) {
        (_, Value::Null) => Ok(None),
        (FieldKind::Bool, Value::Bool(b)) => Ok(Some(Scalar::Bool(*b))),
        // Some provisioning clients send booleans as "True"/"False".
        (FieldKind::Bool, Value::String(s)) if s.eq_ignore_ascii_case("true") => {
            Ok(Some(Scalar::Bool(true)))
        }
        (FieldKind::Bool, Value::String(s)) if s.eq_ignore_ascii_case("false") => {
            Ok(Some(Scalar::Bool(false)))
        }
        (FieldKind::Text | FieldKind::ExactText, Value::String(s)) => {
            Ok(Some(Scalar::Text(s.clone())))
        }
        (kind, other) => Err(PatchError::invalid_value(
            field.name,
            format!(
                "expected {}, got {}",
                if kind == FieldKind::Bool { "a boolean" } else { "a string" },
                json_kind(other)
            ),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Dotted fields under `prefix`, e.g. every `name.*` column.
fn complex_fields(resource_type: ResourceType, prefix: &str) -> impl Iterator<Item = Field> + '_ {
    Registry::for_type(resource_type).fields().filter(move |field| {
        field
            .name
            .split_once('.')
            .is_some_and(|(parent, _)| parent.eq_ignore_ascii_case(prefix))
    })
}

fn complex_updates(
    resource_type: ResourceType,
    prefix: &str,
    value: &Value,
) -> Result<Vec<(Field, Option<Scalar>)>, PatchError> {
    let Value::Object(members) = value else {
        return Err(PatchError::invalid_value(prefix, "expected an object"));
    };
    let registry = Registry::for_type(resource_type);
    members
        .iter()
        .map(|(key, value)| {
            let field = registry
                .field(&format!("{}.{}", prefix, key))
                .ok_or_else(|| crate::filter::LookupError::UnknownSubAttribute {
                    parent: prefix.to_string(),
                    sub: key.clone(),
                })?;
            Ok((field, decode_scalar(&field, value)?))
        })
        .collect()
}

fn item_updates(
    relation: Relation,
    members: &Map<String, Value>,
) -> Result<Vec<(Field, Option<Scalar>)>, PatchError> {
    members
        .iter()
        .map(|(key, value)| {
            let field = relation.registry().field(key).ok_or_else(|| {
                crate::filter::LookupError::UnknownSubAttribute {
                    parent: relation.attribute().to_string(),
                    sub: key.clone(),
                }
            })?;
            Ok((field, decode_scalar(&field, value)?))
        })
        .collect()
}
