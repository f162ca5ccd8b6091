//! SCIM filters: parsing, attribute resolution and compilation to predicates.
//!
//! * [`parser`] turns filter strings and PATCH paths into [`Expr`] trees.
//! * [`registry`] maps protocol attribute names to storage columns and relations.
//! * [`compiler`] turns an [`Expr`] into one [`Predicate`](crate::storage::Predicate)
//!   per requested resource type.

pub mod ast;
pub mod compiler;
pub mod parser;
pub mod registry;

pub use ast::{CompareOp, Expr, Literal, LogicalOp, RegexOp};
pub use compiler::{CompiledFilter, FilterError, compile, compile_item_filter};
pub use parser::{FilterParser, ParseError, ScimFilterParser, parse};
pub use registry::{Field, FieldKind, LookupError, Registry, Resolved};
