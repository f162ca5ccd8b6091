//! Conversion between protocol resources and storage rows.

use crate::backend::BackendConfig;
use crate::resource::{
    Address, Group, GroupMember, GroupRef, Meta, MultiValue, MultiValued, Name, ResourceType,
    User,
};
use crate::storage::{GroupRecord, GroupRow, ItemRow, Relation, UserRecord, UserRow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl MultiValued for ItemRow {
    fn is_primary(&self) -> bool {
        self.primary == Some(true)
    }
}

/// The generic collection of `user` stored under `relation`.
///
/// `None` for relations that do not hold [`MultiValue`] items.
pub(crate) fn collection(user: &User, relation: Relation) -> Option<&[MultiValue]> {
    let items = match relation {
        Relation::Emails => &user.emails,
        Relation::PhoneNumbers => &user.phone_numbers,
        Relation::Ims => &user.ims,
        Relation::Photos => &user.photos,
        Relation::Entitlements => &user.entitlements,
        Relation::Roles => &user.roles,
        Relation::X509Certificates => &user.x509_certificates,
        Relation::Addresses | Relation::Members => return None,
    };
    Some(items.as_slice())
}

fn collection_mut(user: &mut User, relation: Relation) -> Option<&mut Vec<MultiValue>> {
    match relation {
        Relation::Emails => Some(&mut user.emails),
        Relation::PhoneNumbers => Some(&mut user.phone_numbers),
        Relation::Ims => Some(&mut user.ims),
        Relation::Photos => Some(&mut user.photos),
        Relation::Entitlements => Some(&mut user.entitlements),
        Relation::Roles => Some(&mut user.roles),
        Relation::X509Certificates => Some(&mut user.x509_certificates),
        Relation::Addresses | Relation::Members => None,
    }
}

pub(crate) fn multi_value_row(owner_id: Uuid, item: &MultiValue) -> ItemRow {
    ItemRow {
        value: item.value.clone(),
        display: item.display.clone(),
        item_type: item.item_type.clone(),
        primary: item.primary,
        ..ItemRow::new(owner_id)
    }
}

pub(crate) fn address_row(owner_id: Uuid, address: &Address) -> ItemRow {
    ItemRow {
        formatted: address.formatted.clone(),
        street_address: address.street_address.clone(),
        locality: address.locality.clone(),
        region: address.region.clone(),
        postal_code: address.postal_code.clone(),
        country: address.country.clone(),
        item_type: address.address_type.clone(),
        primary: address.primary,
        ..ItemRow::new(owner_id)
    }
}

/// A member row; `$ref` is filled in from `config` when the client left it out.
pub(crate) fn member_row(owner_id: Uuid, member: &GroupMember, config: &BackendConfig) -> ItemRow {
    let reference = member.reference.clone().unwrap_or_else(|| {
        let target = if member.member_type.as_deref() == Some("Group") {
            ResourceType::Group
        } else {
            ResourceType::User
        };
        config.ref_url(target, &member.value)
    });
    ItemRow {
        value: Some(member.value.clone()),
        display: member.display.clone(),
        item_type: member.member_type.clone(),
        reference: Some(reference),
        ..ItemRow::new(owner_id)
    }
}

fn multi_value(row: &ItemRow) -> MultiValue {
    MultiValue {
        value: row.value.clone(),
        display: row.display.clone(),
        item_type: row.item_type.clone(),
        primary: row.primary,
    }
}

fn address(row: &ItemRow) -> Address {
    Address {
        formatted: row.formatted.clone(),
        street_address: row.street_address.clone(),
        locality: row.locality.clone(),
        region: row.region.clone(),
        postal_code: row.postal_code.clone(),
        country: row.country.clone(),
        address_type: row.item_type.clone(),
        primary: row.primary,
    }
}

pub(crate) fn member(row: &ItemRow) -> GroupMember {
    GroupMember {
        value: row.value.clone().unwrap_or_default(),
        reference: row.reference.clone(),
        member_type: row.item_type.clone(),
        display: row.display.clone(),
    }
}

/// Build the row and items for `user`. Client-supplied `id`, `meta` and
/// `groups` are ignored.
pub(crate) fn user_record(
    user: &User,
    id: Uuid,
    etag: String,
    created: DateTime<Utc>,
    now: DateTime<Utc>,
) -> UserRecord {
    let name = user.name.clone().unwrap_or_default();
    let row = UserRow {
        external_id: user.external_id.clone(),
        display_name: user.display_name.clone(),
        nick_name: user.nick_name.clone(),
        profile_url: user.profile_url.clone(),
        title: user.title.clone(),
        user_type: user.user_type.clone(),
        preferred_language: user.preferred_language.clone(),
        locale: user.locale.clone(),
        timezone: user.timezone.clone(),
        active: user.active,
        password: user.password.clone(),
        name_formatted: name.formatted,
        name_family_name: name.family_name,
        name_given_name: name.given_name,
        name_middle_name: name.middle_name,
        name_honorific_prefix: name.honorific_prefix,
        name_honorific_suffix: name.honorific_suffix,
        etag,
        created,
        last_modified: now,
        ..UserRow::new(id, user.user_name.clone(), created)
    };

    let mut record = UserRecord::new(row);
    for relation in Relation::USER {
        let items: Vec<ItemRow> = match collection(user, relation) {
            Some(items) => items.iter().map(|item| multi_value_row(id, item)).collect(),
            None => user
                .addresses
                .iter()
                .map(|item| address_row(id, item))
                .collect(),
        };
        if !items.is_empty() {
            record.children.insert(relation, items);
        }
    }
    record
}

pub(crate) fn group_record(
    group: &Group,
    id: Uuid,
    etag: String,
    created: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &BackendConfig,
) -> GroupRecord {
    let row = GroupRow {
        external_id: group.external_id.clone(),
        etag,
        last_modified: now,
        ..GroupRow::new(id, group.display_name.clone(), created)
    };

    let mut record = GroupRecord::new(row);
    if !group.members.is_empty() {
        let members = group
            .members
            .iter()
            .map(|m| member_row(id, m, config))
            .collect();
        record.children.insert(Relation::Members, members);
    }
    record
}

/// The protocol view of a stored user. `groups` is supplied by the caller.
pub(crate) fn user_from_record(
    record: &UserRecord,
    groups: Vec<GroupRef>,
    config: &BackendConfig,
) -> User {
    let row = &record.row;
    let name = Name {
        formatted: row.name_formatted.clone(),
        family_name: row.name_family_name.clone(),
        given_name: row.name_given_name.clone(),
        middle_name: row.name_middle_name.clone(),
        honorific_prefix: row.name_honorific_prefix.clone(),
        honorific_suffix: row.name_honorific_suffix.clone(),
    };

    let mut user = User {
        id: Some(row.id.to_string()),
        external_id: row.external_id.clone(),
        user_name: row.user_name.clone(),
        name: (!name.is_empty()).then_some(name),
        display_name: row.display_name.clone(),
        nick_name: row.nick_name.clone(),
        profile_url: row.profile_url.clone(),
        title: row.title.clone(),
        user_type: row.user_type.clone(),
        preferred_language: row.preferred_language.clone(),
        locale: row.locale.clone(),
        timezone: row.timezone.clone(),
        active: row.active,
        password: None,
        addresses: record.items(Relation::Addresses).iter().map(address).collect(),
        groups,
        meta: Some(meta(ResourceType::User, row.id, &row.etag, row.created, row.last_modified, config)),
        ..User::default()
    };
    for relation in Relation::USER {
        if let Some(items) = collection_mut(&mut user, relation) {
            *items = record.items(relation).iter().map(multi_value).collect();
        }
    }
    user
}

pub(crate) fn group_from_record(record: &GroupRecord, config: &BackendConfig) -> Group {
    let row = &record.row;
    Group {
        id: Some(row.id.to_string()),
        external_id: row.external_id.clone(),
        display_name: row.display_name.clone(),
        members: record.items(Relation::Members).iter().map(member).collect(),
        meta: Some(meta(ResourceType::Group, row.id, &row.etag, row.created, row.last_modified, config)),
        ..Group::default()
    }
}

/// The `groups` entry a user gets for being a member of `group`.
pub(crate) fn group_ref(group: &GroupRow, config: &BackendConfig) -> GroupRef {
    let id = group.id.to_string();
    GroupRef {
        reference: Some(config.ref_url(ResourceType::Group, &id)),
        value: id,
        display: Some(group.display_name.clone()),
        membership_type: Some("direct".to_string()),
    }
}

fn meta(
    resource_type: ResourceType,
    id: Uuid,
    etag: &str,
    created: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    config: &BackendConfig,
) -> Meta {
    let meta = Meta::new(resource_type.as_str(), created, last_modified)
        .with_location(config.ref_url(resource_type, &id.to_string()));
    if etag.is_empty() {
        meta
    } else {
        meta.with_version(etag)
    }
}
