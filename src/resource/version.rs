//! Version stamps for SCIM resources.
//!
//! Versions are weak ETags computed from resource content, so two
//! representations with the same semantic content carry the same version and
//! any change to a stored value produces a new one.
//!
//! * [`EtagComputer`] streams a resource's settable fields through a salted
//!   SHA-256 digest in a fixed order.
//! * [`HttpVersion`] / [`RawVersion`] keep the `W/"..."` header form and the
//!   bare opaque form apart at compile time.
//!
//! # Basic Usage
//!
//! ```rust
//! use scim_store::resource::User;
//! use scim_store::resource::version::{EtagComputer, HttpVersion, RawVersion};
//!
//! let computer = EtagComputer::new(*b"fixed salt");
//! let version = computer.compute_user(&User::new("bjensen"));
//! assert!(version.to_string().starts_with("W/\""));
//!
//! // Client supplied If-Match values parse into the same type
//! let parsed: HttpVersion = version.to_string().parse().unwrap();
//! assert_eq!(parsed, version);
//!
//! // The opaque part compares equal across formats
//! let raw = RawVersion::from(parsed);
//! assert_eq!(raw, version);
//! ```

use crate::resource::value_objects::{Address, MultiValue, Name};
use crate::resource::{Group, User};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, marker::PhantomData, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

// Phantom type markers for format distinction
#[derive(Debug, Clone, Copy)]
pub struct Http;

#[derive(Debug, Clone, Copy)]
pub struct Raw;

/// Opaque version identifier tagged with its textual format.
#[derive(Debug, Clone, Eq, Hash)]
pub struct ScimVersion<Format> {
    opaque: String,
    _format: PhantomData<Format>,
}

/// `W/"abc"` form used in `meta.version` and `If-Match` headers.
pub type HttpVersion = ScimVersion<Http>;

/// Bare opaque form.
pub type RawVersion = ScimVersion<Raw>;

impl<Format> ScimVersion<Format> {
    /// Wrap an already computed opaque value.
    pub fn from_hash(hash_string: impl AsRef<str>) -> RawVersion {
        ScimVersion {
            opaque: hash_string.as_ref().to_string(),
            _format: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.opaque
    }
}

impl fmt::Display for ScimVersion<Raw> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.opaque)
    }
}

impl fmt::Display for ScimVersion<Http> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W/\"{}\"", self.opaque)
    }
}

impl FromStr for ScimVersion<Raw> {
    type Err = VersionError;

    fn from_str(version_str: &str) -> Result<Self, Self::Err> {
        let trimmed = version_str.trim();
        if trimmed.is_empty() {
            return Err(VersionError::ParseError(
                "Version string cannot be empty".to_string(),
            ));
        }
        Ok(RawVersion::from_hash(trimmed))
    }
}

impl FromStr for ScimVersion<Http> {
    type Err = VersionError;

    /// Accepts weak (`W/"x"`) and strong (`"x"`) entity tags.
    fn from_str(etag_header: &str) -> Result<Self, Self::Err> {
        let trimmed = etag_header.trim();
        let quoted = trimmed.strip_prefix("W/").unwrap_or(trimmed);

        let opaque = quoted
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .filter(|inner| !inner.is_empty())
            .ok_or_else(|| VersionError::InvalidEtagFormat(etag_header.to_string()))?;

        Ok(RawVersion::from_hash(opaque).into())
    }
}

impl From<ScimVersion<Raw>> for ScimVersion<Http> {
    fn from(raw: ScimVersion<Raw>) -> Self {
        ScimVersion {
            opaque: raw.opaque,
            _format: PhantomData,
        }
    }
}

impl From<ScimVersion<Http>> for ScimVersion<Raw> {
    fn from(http: ScimVersion<Http>) -> Self {
        ScimVersion {
            opaque: http.opaque,
            _format: PhantomData,
        }
    }
}

// Versions are equal when their opaque values match, whatever the format
impl<F1, F2> PartialEq<ScimVersion<F2>> for ScimVersion<F1> {
    fn eq(&self, other: &ScimVersion<F2>) -> bool {
        self.opaque == other.opaque
    }
}

impl<Format> Serialize for ScimVersion<Format> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.opaque.serialize(serializer)
    }
}

impl<'de, Format> Deserialize<'de> for ScimVersion<Format> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opaque = String::deserialize(deserializer)?;
        Ok(ScimVersion {
            opaque,
            _format: PhantomData,
        })
    }
}

/// Errors that can occur while reading a client-supplied version.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VersionError {
    /// Invalid ETag format provided
    #[error("Invalid ETag format: {0}")]
    InvalidEtagFormat(String),

    /// Version parsing failed
    #[error("Failed to parse version: {0}")]
    ParseError(String),
}

/// Computes deterministic weak ETags from resource content.
///
/// The digest is seeded with a salt chosen once per backend, then fed every
/// settable field in a fixed declared order. Each optional value is written
/// as a presence byte followed by a length-prefixed payload, so moving a value
/// from one field to the next, or from absent to empty, changes the output.
/// Collection items are fed in submission order, each ending with one byte
/// marking whether it is primary.
#[derive(Clone)]
pub struct EtagComputer {
    salt: Vec<u8>,
}

impl fmt::Debug for EtagComputer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtagComputer")
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

impl EtagComputer {
    pub fn new(salt: impl Into<Vec<u8>>) -> Self {
        Self { salt: salt.into() }
    }

    /// A computer with a fresh random salt.
    pub fn random() -> Self {
        Self::new(Uuid::new_v4().as_bytes().to_vec())
    }

    pub fn compute_user(&self, user: &User) -> HttpVersion {
        let mut stamp = Stamp::new(&self.salt);

        stamp.text(Some(user.user_name.as_str()));
        stamp.text(user.external_id.as_deref());
        stamp.text(user.display_name.as_deref());
        stamp.text(user.nick_name.as_deref());
        stamp.text(user.profile_url.as_deref());
        stamp.text(user.title.as_deref());
        stamp.text(user.user_type.as_deref());
        stamp.text(user.preferred_language.as_deref());
        stamp.text(user.locale.as_deref());
        stamp.text(user.timezone.as_deref());
        stamp.text(user.active.map(|a| if a { "true" } else { "false" }));
        stamp.text(user.password.as_deref());
        stamp.name(user.name.as_ref());

        stamp.items(&user.emails);
        stamp.items(&user.phone_numbers);
        stamp.items(&user.ims);
        stamp.items(&user.photos);
        stamp.addresses(&user.addresses);
        stamp.items(&user.entitlements);
        stamp.items(&user.roles);
        stamp.items(&user.x509_certificates);

        stamp.finish()
    }

    pub fn compute_group(&self, group: &Group) -> HttpVersion {
        let mut stamp = Stamp::new(&self.salt);

        stamp.text(Some(group.display_name.as_str()));
        stamp.text(group.external_id.as_deref());

        stamp.count(group.members.len());
        for member in &group.members {
            stamp.text(Some(member.value.as_str()));
            stamp.text(member.display.as_deref());
            stamp.text(member.member_type.as_deref());
            stamp.text(member.reference.as_deref());
            stamp.flag(false);
        }

        stamp.finish()
    }
}

struct Stamp(Sha256);

impl Stamp {
    fn new(salt: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        Self(hasher)
    }

    fn text(&mut self, value: Option<&str>) {
        match value {
            Some(value) => {
                self.0.update([1u8]);
                self.0.update((value.len() as u64).to_be_bytes());
                self.0.update(value.as_bytes());
            }
            None => self.0.update([0u8]),
        }
    }

    fn flag(&mut self, set: bool) {
        self.0.update([u8::from(set)]);
    }

    fn count(&mut self, n: usize) {
        self.0.update((n as u64).to_be_bytes());
    }

    fn name(&mut self, name: Option<&Name>) {
        let empty = Name::default();
        let name = name.unwrap_or(&empty);
        self.text(name.formatted.as_deref());
        self.text(name.family_name.as_deref());
        self.text(name.given_name.as_deref());
        self.text(name.middle_name.as_deref());
        self.text(name.honorific_prefix.as_deref());
        self.text(name.honorific_suffix.as_deref());
    }

    fn items(&mut self, items: &[MultiValue]) {
        self.count(items.len());
        for item in items {
            self.text(item.value.as_deref());
            self.text(item.display.as_deref());
            self.text(item.item_type.as_deref());
            self.flag(item.primary == Some(true));
        }
    }

    fn addresses(&mut self, addresses: &[Address]) {
        self.count(addresses.len());
        for address in addresses {
            self.text(address.formatted.as_deref());
            self.text(address.street_address.as_deref());
            self.text(address.locality.as_deref());
            self.text(address.region.as_deref());
            self.text(address.postal_code.as_deref());
            self.text(address.country.as_deref());
            self.text(address.address_type.as_deref());
            self.flag(address.primary == Some(true));
        }
    }

    fn finish(self) -> HttpVersion {
        RawVersion::from_hash(BASE64.encode(self.0.finalize())).into()
    }
}
