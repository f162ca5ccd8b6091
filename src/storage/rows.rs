//! Row types persisted by a storage backend.
//!
//! Users and groups are stored as one row each. Every multi-valued collection
//! is its own table of [`ItemRow`]s linked to the owning row through
//! `owner_id`. Columns are addressed by [`Column`] identifiers so predicates
//! and patch operations can read and write them without knowing the concrete
//! row type.

use crate::resource::ResourceType;
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifier of a storage column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column(&'static str);

impl Column {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Columns of the `users` table.
pub mod user_columns {
    use super::Column;

    pub const USER_NAME: Column = Column::new("user_name");
    pub const EXTERNAL_ID: Column = Column::new("external_id");
    pub const DISPLAY_NAME: Column = Column::new("display_name");
    pub const NICK_NAME: Column = Column::new("nick_name");
    pub const PROFILE_URL: Column = Column::new("profile_url");
    pub const TITLE: Column = Column::new("title");
    pub const USER_TYPE: Column = Column::new("user_type");
    pub const PREFERRED_LANGUAGE: Column = Column::new("preferred_language");
    pub const LOCALE: Column = Column::new("locale");
    pub const TIMEZONE: Column = Column::new("timezone");
    pub const ACTIVE: Column = Column::new("active");
    pub const PASSWORD: Column = Column::new("password");
    pub const NAME_FORMATTED: Column = Column::new("name_formatted");
    pub const NAME_FAMILY_NAME: Column = Column::new("name_family_name");
    pub const NAME_GIVEN_NAME: Column = Column::new("name_given_name");
    pub const NAME_MIDDLE_NAME: Column = Column::new("name_middle_name");
    pub const NAME_HONORIFIC_PREFIX: Column = Column::new("name_honorific_prefix");
    pub const NAME_HONORIFIC_SUFFIX: Column = Column::new("name_honorific_suffix");
}

/// Columns of the `groups` table.
pub mod group_columns {
    use super::Column;

    pub const DISPLAY_NAME: Column = Column::new("display_name");
    pub const EXTERNAL_ID: Column = Column::new("external_id");
}

/// Columns shared by every collection-item table.
pub mod item_columns {
    use super::Column;

    pub const VALUE: Column = Column::new("value");
    pub const DISPLAY: Column = Column::new("display");
    pub const TYPE: Column = Column::new("type");
    pub const PRIMARY: Column = Column::new("primary");
    pub const REF: Column = Column::new("ref");
    pub const FORMATTED: Column = Column::new("formatted");
    pub const STREET_ADDRESS: Column = Column::new("street_address");
    pub const LOCALITY: Column = Column::new("locality");
    pub const REGION: Column = Column::new("region");
    pub const POSTAL_CODE: Column = Column::new("postal_code");
    pub const COUNTRY: Column = Column::new("country");
}

/// A borrowed column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell<'a> {
    Text(&'a str),
    Bool(bool),
    Null,
}

/// An owned column value, used for comparisons and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Text(String),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => write!(f, "\"{}\"", s),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A multi-valued relation between a resource row and its item rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    Emails,
    PhoneNumbers,
    Ims,
    Photos,
    Addresses,
    Entitlements,
    Roles,
    X509Certificates,
    Members,
}

impl Relation {
    /// User relations in the order they are declared on the User schema.
    pub const USER: [Relation; 8] = [
        Relation::Emails,
        Relation::PhoneNumbers,
        Relation::Ims,
        Relation::Photos,
        Relation::Addresses,
        Relation::Entitlements,
        Relation::Roles,
        Relation::X509Certificates,
    ];

    pub const GROUP: [Relation; 1] = [Relation::Members];

    /// Protocol attribute name.
    pub fn attribute(&self) -> &'static str {
        match self {
            Relation::Emails => "emails",
            Relation::PhoneNumbers => "phoneNumbers",
            Relation::Ims => "ims",
            Relation::Photos => "photos",
            Relation::Addresses => "addresses",
            Relation::Entitlements => "entitlements",
            Relation::Roles => "roles",
            Relation::X509Certificates => "x509Certificates",
            Relation::Members => "members",
        }
    }

    /// Storage table name.
    pub fn table(&self) -> &'static str {
        match self {
            Relation::Emails => "emails",
            Relation::PhoneNumbers => "phone_numbers",
            Relation::Ims => "ims",
            Relation::Photos => "photos",
            Relation::Addresses => "addresses",
            Relation::Entitlements => "entitlements",
            Relation::Roles => "roles",
            Relation::X509Certificates => "x509_certificates",
            Relation::Members => "group_members",
        }
    }

    /// Resource type that owns rows of this relation.
    pub fn owner(&self) -> ResourceType {
        match self {
            Relation::Members => ResourceType::Group,
            _ => ResourceType::User,
        }
    }

    pub fn for_owner(resource_type: ResourceType) -> &'static [Relation] {
        match resource_type {
            ResourceType::User => &Self::USER,
            ResourceType::Group => &Self::GROUP,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute())
    }
}

/// Column access shared by every row type.
pub trait Row {
    /// Table name, used in error messages.
    fn table(&self) -> &'static str;

    /// Primary key.
    fn id(&self) -> Uuid;

    /// Read a column. `None` means the table has no such column.
    fn cell(&self, column: Column) -> Option<Cell<'_>>;

    /// Write a column; `None` clears it.
    fn assign(&mut self, column: Column, value: Option<Scalar>) -> Result<(), StorageError>;
}

fn text(value: &Option<String>) -> Cell<'_> {
    value.as_deref().map(Cell::Text).unwrap_or(Cell::Null)
}

fn set_text(
    table: &str,
    slot: &mut Option<String>,
    column: Column,
    value: Option<Scalar>,
) -> Result<(), StorageError> {
    match value {
        Some(Scalar::Text(s)) => *slot = Some(s),
        None => *slot = None,
        Some(Scalar::Bool(_)) => {
            return Err(StorageError::invalid_data(format!(
                "{}.{} holds text, got a boolean",
                table, column
            )));
        }
    }
    Ok(())
}

fn set_bool(
    table: &str,
    slot: &mut Option<bool>,
    column: Column,
    value: Option<Scalar>,
) -> Result<(), StorageError> {
    match value {
        Some(Scalar::Bool(b)) => *slot = Some(b),
        None => *slot = None,
        Some(Scalar::Text(_)) => {
            return Err(StorageError::invalid_data(format!(
                "{}.{} holds a boolean, got text",
                table, column
            )));
        }
    }
    Ok(())
}

fn unknown_column(table: &str, column: Column) -> StorageError {
    StorageError::invalid_query(format!("table {} has no column {}", table, column))
}

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: Uuid,
    pub user_name: String,
    pub external_id: Option<String>,
    pub display_name: Option<String>,
    pub nick_name: Option<String>,
    pub profile_url: Option<String>,
    pub title: Option<String>,
    pub user_type: Option<String>,
    pub preferred_language: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub active: Option<bool>,
    pub password: Option<String>,
    pub name_formatted: Option<String>,
    pub name_family_name: Option<String>,
    pub name_given_name: Option<String>,
    pub name_middle_name: Option<String>,
    pub name_honorific_prefix: Option<String>,
    pub name_honorific_suffix: Option<String>,
    pub etag: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl UserRow {
    /// A row with only the required columns set.
    pub fn new(id: Uuid, user_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_name: user_name.into(),
            external_id: None,
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
            name_formatted: None,
            name_family_name: None,
            name_given_name: None,
            name_middle_name: None,
            name_honorific_prefix: None,
            name_honorific_suffix: None,
            etag: String::new(),
            created: now,
            last_modified: now,
        }
    }

    fn text_slot(&mut self, column: Column) -> Option<&mut Option<String>> {
        use user_columns::*;
        let slot = match column {
            EXTERNAL_ID => &mut self.external_id,
            DISPLAY_NAME => &mut self.display_name,
            NICK_NAME => &mut self.nick_name,
            PROFILE_URL => &mut self.profile_url,
            TITLE => &mut self.title,
            USER_TYPE => &mut self.user_type,
            PREFERRED_LANGUAGE => &mut self.preferred_language,
            LOCALE => &mut self.locale,
            TIMEZONE => &mut self.timezone,
            PASSWORD => &mut self.password,
            NAME_FORMATTED => &mut self.name_formatted,
            NAME_FAMILY_NAME => &mut self.name_family_name,
            NAME_GIVEN_NAME => &mut self.name_given_name,
            NAME_MIDDLE_NAME => &mut self.name_middle_name,
            NAME_HONORIFIC_PREFIX => &mut self.name_honorific_prefix,
            NAME_HONORIFIC_SUFFIX => &mut self.name_honorific_suffix,
            _ => return None,
        };
        Some(slot)
    }
}

impl Row for UserRow {
    fn table(&self) -> &'static str {
        "users"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn cell(&self, column: Column) -> Option<Cell<'_>> {
        use user_columns::*;
        let cell = match column {
            USER_NAME => Cell::Text(&self.user_name),
            EXTERNAL_ID => text(&self.external_id),
            DISPLAY_NAME => text(&self.display_name),
            NICK_NAME => text(&self.nick_name),
            PROFILE_URL => text(&self.profile_url),
            TITLE => text(&self.title),
            USER_TYPE => text(&self.user_type),
            PREFERRED_LANGUAGE => text(&self.preferred_language),
            LOCALE => text(&self.locale),
            TIMEZONE => text(&self.timezone),
            ACTIVE => self.active.map(Cell::Bool).unwrap_or(Cell::Null),
            PASSWORD => text(&self.password),
            NAME_FORMATTED => text(&self.name_formatted),
            NAME_FAMILY_NAME => text(&self.name_family_name),
            NAME_GIVEN_NAME => text(&self.name_given_name),
            NAME_MIDDLE_NAME => text(&self.name_middle_name),
            NAME_HONORIFIC_PREFIX => text(&self.name_honorific_prefix),
            NAME_HONORIFIC_SUFFIX => text(&self.name_honorific_suffix),
            _ => return None,
        };
        Some(cell)
    }

    fn assign(&mut self, column: Column, value: Option<Scalar>) -> Result<(), StorageError> {
        match column {
            user_columns::USER_NAME => match value {
                Some(Scalar::Text(s)) if !s.is_empty() => {
                    self.user_name = s;
                    Ok(())
                }
                _ => Err(StorageError::invalid_data("users.user_name must be non-empty text")),
            },
            user_columns::ACTIVE => set_bool("users", &mut self.active, column, value),
            _ => match self.text_slot(column) {
                Some(slot) => set_text("users", slot, column, value),
                None => Err(unknown_column("users", column)),
            },
        }
    }
}

/// A row of the `groups` table.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub id: Uuid,
    pub display_name: String,
    pub external_id: Option<String>,
    pub etag: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl GroupRow {
    pub fn new(id: Uuid, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            external_id: None,
            etag: String::new(),
            created: now,
            last_modified: now,
        }
    }
}

impl Row for GroupRow {
    fn table(&self) -> &'static str {
        "groups"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn cell(&self, column: Column) -> Option<Cell<'_>> {
        match column {
            group_columns::DISPLAY_NAME => Some(Cell::Text(&self.display_name)),
            group_columns::EXTERNAL_ID => Some(text(&self.external_id)),
            _ => None,
        }
    }

    fn assign(&mut self, column: Column, value: Option<Scalar>) -> Result<(), StorageError> {
        match column {
            group_columns::DISPLAY_NAME => match value {
                Some(Scalar::Text(s)) if !s.is_empty() => {
                    self.display_name = s;
                    Ok(())
                }
                _ => Err(StorageError::invalid_data(
                    "groups.display_name must be non-empty text",
                )),
            },
            group_columns::EXTERNAL_ID => set_text("groups", &mut self.external_id, column, value),
            _ => Err(unknown_column("groups", column)),
        }
    }
}

/// A row of one of the collection-item tables.
///
/// The address columns are only populated in the `addresses` table and the
/// `ref` column only in `group_members`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub value: Option<String>,
    pub display: Option<String>,
    pub item_type: Option<String>,
    pub primary: Option<bool>,
    pub reference: Option<String>,
    pub formatted: Option<String>,
    pub street_address: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl ItemRow {
    pub fn new(owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            ..Self::default()
        }
    }

    pub fn is_primary(&self) -> bool {
        self.primary == Some(true)
    }

    /// The (`$ref`, `type`, `value`) triple used to detect duplicate adds.
    pub fn identity(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.reference.as_deref(),
            self.item_type.as_deref(),
            self.value.as_deref(),
        )
    }

    fn text_slot(&mut self, column: Column) -> Option<&mut Option<String>> {
        use item_columns::*;
        let slot = match column {
            VALUE => &mut self.value,
            DISPLAY => &mut self.display,
            TYPE => &mut self.item_type,
            REF => &mut self.reference,
            FORMATTED => &mut self.formatted,
            STREET_ADDRESS => &mut self.street_address,
            LOCALITY => &mut self.locality,
            REGION => &mut self.region,
            POSTAL_CODE => &mut self.postal_code,
            COUNTRY => &mut self.country,
            _ => return None,
        };
        Some(slot)
    }
}

impl Row for ItemRow {
    fn table(&self) -> &'static str {
        "items"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn cell(&self, column: Column) -> Option<Cell<'_>> {
        use item_columns::*;
        let cell = match column {
            VALUE => text(&self.value),
            DISPLAY => text(&self.display),
            TYPE => text(&self.item_type),
            PRIMARY => self.primary.map(Cell::Bool).unwrap_or(Cell::Null),
            REF => text(&self.reference),
            FORMATTED => text(&self.formatted),
            STREET_ADDRESS => text(&self.street_address),
            LOCALITY => text(&self.locality),
            REGION => text(&self.region),
            POSTAL_CODE => text(&self.postal_code),
            COUNTRY => text(&self.country),
            _ => return None,
        };
        Some(cell)
    }

    fn assign(&mut self, column: Column, value: Option<Scalar>) -> Result<(), StorageError> {
        if column == item_columns::PRIMARY {
            return set_bool("items", &mut self.primary, column, value);
        }
        match self.text_slot(column) {
            Some(slot) => set_text("items", slot, column, value),
            None => Err(unknown_column("items", column)),
        }
    }
}

/// A resource row together with its collection items, keyed by relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<R> {
    pub row: R,
    pub children: BTreeMap<Relation, Vec<ItemRow>>,
}

impl<R> Record<R> {
    pub fn new(row: R) -> Self {
        Self {
            row,
            children: BTreeMap::new(),
        }
    }

    /// Items of one relation, in insertion order.
    pub fn items(&self, relation: Relation) -> &[ItemRow] {
        self.children
            .get(&relation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub type UserRecord = Record<UserRow>;
pub type GroupRecord = Record<GroupRow>;
