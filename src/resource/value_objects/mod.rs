//! Value objects for the sub-structures of SCIM resources.
//!
//! Every optional attribute is an `Option`, so whether a client sent a value
//! is carried by the type rather than guessed from a zero value.

mod address;
mod group_member;
mod meta;
mod multi_valued;
mod name;

pub use address::Address;
pub use group_member::{GroupMember, GroupRef, MEMBER_TYPES};
pub use meta::Meta;
pub use multi_valued::{MultiValue, MultiValued, validate_single_primary, validate_values};
pub use name::Name;
