//! PATCH path resolution.

use crate::filter::{Expr, Field, FilterParser, LookupError, ParseError, Registry, Resolved};
use crate::filter::compile_item_filter;
use crate::patch::PatchError;
use crate::resource::ResourceType;
use crate::storage::{Predicate, Relation};

/// Attributes the server owns.
const READ_ONLY: [&str; 4] = ["id", "meta", "groups", "schemas"];

/// What a PATCH path points at.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchTarget {
    /// A singular attribute, including dotted sub-attributes such as `name.givenName`.
    Field(Field),
    /// A whole complex singular attribute such as `name`.
    Complex(String),
    /// A multi-valued attribute, optionally narrowed to the items matching
    /// `filter` and to one `sub_attr` of those items.
    Collection {
        relation: Relation,
        filter: Option<Predicate>,
        sub_attr: Option<Field>,
    },
}

/// Parse `path` in patch mode and resolve it for `resource_type`.
pub fn resolve_path(
    parser: &dyn FilterParser,
    resource_type: ResourceType,
    path: &str,
) -> Result<PatchTarget, PatchError> {
    let invalid = |source: ParseError| PatchError::InvalidPath {
        path: path.to_string(),
        source,
    };

    let Expr::ValuePath {
        attr,
        filter,
        sub_attr,
    } = parser.parse(path, true).map_err(invalid)?
    else {
        return Err(invalid(ParseError::Syntax {
            message: "expected an attribute path".to_string(),
            position: 0,
        }));
    };

    let root = attr.split('.').next().unwrap_or_default();
    if READ_ONLY.iter().any(|name| name.eq_ignore_ascii_case(root)) {
        return Err(PatchError::ReadOnly(attr));
    }

    let registry = Registry::for_type(resource_type);
    if registry.field(&attr).is_none() && registry.is_complex(&attr) {
        if filter.is_some() {
            return Err(LookupError::NotMultiValued { attr }.into());
        }
        return Ok(PatchTarget::Complex(attr));
    }

    let target = match registry.resolve(&attr)? {
        Resolved::Field(field) => {
            if filter.is_some() {
                return Err(LookupError::NotMultiValued {
                    attr: field.name.to_string(),
                }
                .into());
            }
            PatchTarget::Field(field)
        }
        Resolved::Relation(relation) => {
            let filter = filter
                .map(|expr| compile_item_filter(relation, &expr))
                .transpose()?;
            let sub_attr = sub_attr
                .map(|sub| {
                    relation.registry().field(&sub).ok_or_else(|| {
                        LookupError::UnknownSubAttribute {
                            parent: relation.attribute().to_string(),
                            sub,
                        }
                    })
                })
                .transpose()?;
            PatchTarget::Collection {
                relation,
                filter,
                sub_attr,
            }
        }
        Resolved::RelationField { .. } => return Err(PatchError::MissingFilter(attr)),
    };

    log::debug!("Resolved patch path '{}' to {:?}", path, target);
    Ok(target)
}
