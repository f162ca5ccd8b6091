//! Predicate Registry: protocol attribute names to storage identifiers.
//!
//! Each resource type has a static table mapping attribute names to either a
//! column ([`Field`]) or a multi-valued [`Relation`]. Every relation has its
//! own table for the sub-attributes of its items. Lookups are
//! case-insensitive and unknown names are always an error.

use crate::resource::ResourceType;
use crate::storage::rows::{Column, Relation, group_columns, item_columns, user_columns};

/// How a column's values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Text compared case-insensitively
    Text,
    /// Text compared exactly
    ExactText,
    Bool,
}

/// A singular attribute backed by one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Canonical protocol name
    pub name: &'static str,
    pub column: Column,
    pub kind: FieldKind,
    /// Whether the attribute may appear in a search filter.
    pub filterable: bool,
}

impl Field {
    const fn text(name: &'static str, column: Column) -> Self {
        Self {
            name,
            column,
            kind: FieldKind::Text,
            filterable: true,
        }
    }

    const fn exact(name: &'static str, column: Column) -> Self {
        Self {
            name,
            column,
            kind: FieldKind::ExactText,
            filterable: true,
        }
    }

    const fn boolean(name: &'static str, column: Column) -> Self {
        Self {
            name,
            column,
            kind: FieldKind::Bool,
            filterable: true,
        }
    }

    const fn hidden(mut self) -> Self {
        self.filterable = false;
        self
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, FieldKind::Text | FieldKind::ExactText)
    }

    /// Whether text comparisons on this field ignore case.
    pub fn folds_case(&self) -> bool {
        self.kind == FieldKind::Text
    }
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Field(Field),
    Relation(Relation),
}

/// Attribute table of one resource type or one relation's items.
#[derive(Debug)]
pub struct Registry {
    name: &'static str,
    entries: &'static [Entry],
}

/// What an attribute name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// A singular attribute.
    Field(Field),
    /// A whole multi-valued attribute.
    Relation(Relation),
    /// One sub-attribute of a multi-valued attribute's items.
    RelationField { relation: Relation, field: Field },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("unknown attribute '{attr}' for {resource}")]
    UnknownAttribute { resource: &'static str, attr: String },

    #[error("unknown sub-attribute '{sub}' of '{parent}'")]
    UnknownSubAttribute { parent: String, sub: String },

    #[error("'{attr}' has no sub-attributes")]
    NotMultiValued { attr: String },
}

impl LookupError {
    /// Whether the attribute itself is unknown to the registry, as opposed
    /// to a known attribute being used wrongly.
    pub fn is_unknown_attribute(&self) -> bool {
        matches!(self, LookupError::UnknownAttribute { .. })
    }
}

static USERS: Registry = Registry {
    name: "User",
    entries: &[
        Entry::Field(Field::text("userName", user_columns::USER_NAME)),
        Entry::Field(Field::exact("externalId", user_columns::EXTERNAL_ID)),
        Entry::Field(Field::text("displayName", user_columns::DISPLAY_NAME)),
        Entry::Field(Field::text("nickName", user_columns::NICK_NAME)),
        Entry::Field(Field::exact("profileUrl", user_columns::PROFILE_URL)),
        Entry::Field(Field::text("title", user_columns::TITLE)),
        Entry::Field(Field::text("userType", user_columns::USER_TYPE)),
        Entry::Field(Field::text("preferredLanguage", user_columns::PREFERRED_LANGUAGE)),
        Entry::Field(Field::text("locale", user_columns::LOCALE)),
        Entry::Field(Field::text("timezone", user_columns::TIMEZONE)),
        Entry::Field(Field::boolean("active", user_columns::ACTIVE)),
        Entry::Field(Field::exact("password", user_columns::PASSWORD).hidden()),
        Entry::Field(Field::text("name.formatted", user_columns::NAME_FORMATTED)),
        Entry::Field(Field::text("name.familyName", user_columns::NAME_FAMILY_NAME)),
        Entry::Field(Field::text("name.givenName", user_columns::NAME_GIVEN_NAME)),
        Entry::Field(Field::text("name.middleName", user_columns::NAME_MIDDLE_NAME)),
        Entry::Field(Field::text("name.honorificPrefix", user_columns::NAME_HONORIFIC_PREFIX)),
        Entry::Field(Field::text("name.honorificSuffix", user_columns::NAME_HONORIFIC_SUFFIX)),
        Entry::Relation(Relation::Emails),
        Entry::Relation(Relation::PhoneNumbers),
        Entry::Relation(Relation::Ims),
        Entry::Relation(Relation::Photos),
        Entry::Relation(Relation::Addresses),
        Entry::Relation(Relation::Entitlements),
        Entry::Relation(Relation::Roles),
        Entry::Relation(Relation::X509Certificates),
    ],
};

static GROUPS: Registry = Registry {
    name: "Group",
    entries: &[
        Entry::Field(Field::text("displayName", group_columns::DISPLAY_NAME)),
        Entry::Field(Field::exact("externalId", group_columns::EXTERNAL_ID)),
        Entry::Relation(Relation::Members),
    ],
};

static ITEMS: Registry = Registry {
    name: "multi-valued item",
    entries: &[
        Entry::Field(Field::text("value", item_columns::VALUE)),
        Entry::Field(Field::text("display", item_columns::DISPLAY)),
        Entry::Field(Field::text("type", item_columns::TYPE)),
        Entry::Field(Field::boolean("primary", item_columns::PRIMARY)),
    ],
};

static ADDRESSES: Registry = Registry {
    name: "address",
    entries: &[
        Entry::Field(Field::text("formatted", item_columns::FORMATTED)),
        Entry::Field(Field::text("streetAddress", item_columns::STREET_ADDRESS)),
        Entry::Field(Field::text("locality", item_columns::LOCALITY)),
        Entry::Field(Field::text("region", item_columns::REGION)),
        Entry::Field(Field::text("postalCode", item_columns::POSTAL_CODE)),
        Entry::Field(Field::text("country", item_columns::COUNTRY)),
        Entry::Field(Field::text("type", item_columns::TYPE)),
        Entry::Field(Field::boolean("primary", item_columns::PRIMARY)),
    ],
};

static MEMBERS: Registry = Registry {
    name: "member",
    entries: &[
        Entry::Field(Field::exact("value", item_columns::VALUE)),
        Entry::Field(Field::exact("$ref", item_columns::REF)),
        Entry::Field(Field::text("type", item_columns::TYPE)),
        Entry::Field(Field::text("display", item_columns::DISPLAY)),
    ],
};

impl Registry {
    /// Attribute table of a resource type.
    pub fn for_type(resource_type: ResourceType) -> &'static Registry {
        match resource_type {
            ResourceType::User => &USERS,
            ResourceType::Group => &GROUPS,
        }
    }

    /// Name used in error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn entry(&self, key: &str) -> Option<Entry> {
        self.entries
            .iter()
            .find(|entry| entry_name(entry).eq_ignore_ascii_case(key))
            .copied()
    }

    /// Look up a singular field by name.
    pub fn field(&self, key: &str) -> Option<Field> {
        match self.entry(key)? {
            Entry::Field(field) => Some(field),
            Entry::Relation(_) => None,
        }
    }

    /// Every singular field of this table, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Field(field) => Some(*field),
            Entry::Relation(_) => None,
        })
    }

    /// Whether some dotted key starts with `prefix.` (complex singular attributes such as `name`).
    pub fn is_complex(&self, prefix: &str) -> bool {
        self.entries.iter().any(|entry| {
            let name = entry_name(entry);
            name.len() > prefix.len() + 1
                && name.as_bytes()[prefix.len()] == b'.'
                && name[..prefix.len()].eq_ignore_ascii_case(prefix)
        })
    }

    /// Resolve an attribute name.
    ///
    /// The whole name is tried first, so dotted keys such as `name.givenName`
    /// win over the `parent.sub` split.
    pub fn resolve(&self, attr: &str) -> Result<Resolved, LookupError> {
        if let Some(entry) = self.entry(attr) {
            return Ok(match entry {
                Entry::Field(field) => Resolved::Field(field),
                Entry::Relation(relation) => Resolved::Relation(relation),
            });
        }

        let Some((parent, sub)) = attr.split_once('.') else {
            return Err(self.unknown(attr));
        };

        match self.entry(parent) {
            Some(Entry::Relation(relation)) => match relation.registry().field(sub) {
                Some(field) => Ok(Resolved::RelationField { relation, field }),
                None => Err(LookupError::UnknownSubAttribute {
                    parent: relation.attribute().to_string(),
                    sub: sub.to_string(),
                }),
            },
            Some(Entry::Field(field)) => Err(LookupError::NotMultiValued {
                attr: field.name.to_string(),
            }),
            None if self.is_complex(parent) => Err(LookupError::UnknownSubAttribute {
                parent: parent.to_string(),
                sub: sub.to_string(),
            }),
            None => Err(self.unknown(attr)),
        }
    }

    fn unknown(&self, attr: &str) -> LookupError {
        LookupError::UnknownAttribute {
            resource: self.name,
            attr: attr.to_string(),
        }
    }
}

fn entry_name(entry: &Entry) -> &'static str {
    match entry {
        Entry::Field(field) => field.name,
        Entry::Relation(relation) => relation.attribute(),
    }
}

impl Relation {
    /// Attribute table of this relation's items.
    pub fn registry(&self) -> &'static Registry {
        match self {
            Relation::Addresses => &ADDRESSES,
            Relation::Members => &MEMBERS,
            _ => &ITEMS,
        }
    }
}
