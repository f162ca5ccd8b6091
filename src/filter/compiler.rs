//! Filter Compiler: expression trees to storage predicates.
//!
//! One traversal serves every search endpoint. The caller says which resource
//! types it wants and gets one predicate per wanted type back.
//!
//! ## Missing predicates
//!
//! For a single resource type, a leaf naming an attribute that type does not
//! have yields no predicate, which means "this type cannot match". Combining:
//!
//! | lhs     | rhs     | and     | or      |
//! |---------|---------|---------|---------|
//! | p       | q       | p and q | p or q  |
//! | p       | missing | missing | p       |
//! | missing | q       | missing | q       |
//! | missing | missing | missing | missing |
//!
//! An attribute that no wanted type has but another resource type does (a
//! `userName` filter sent to `/Groups`) is just missing everywhere. An
//! attribute no resource type knows at all is a hard error. When every
//! wanted type ends up without a predicate the filter is unsatisfiable and
//! the search must return nothing.

use crate::filter::ast::{CompareOp, Expr, Literal, LogicalOp, RegexOp};
use crate::filter::registry::{Field, FieldKind, LookupError, Registry, Resolved};
use crate::resource::ResourceType;
use crate::storage::{Predicate, Relation, Scalar};

/// Errors raised while compiling a parsed filter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("{0} is not implemented")]
    Unimplemented(String),

    #[error("operator '{op}' is not valid for attribute '{attr}'")]
    InvalidOperator { attr: String, op: String },

    #[error("invalid comparison value for '{attr}': {message}")]
    InvalidValue { attr: String, message: String },

    #[error("attribute '{attr}' cannot be used in a filter")]
    NotFilterable { attr: String },
}

/// Per-resource-type predicates produced by [`compile`].
///
/// `None` means the type was not requested or cannot match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    pub users: Option<Predicate>,
    pub groups: Option<Predicate>,
}

impl CompiledFilter {
    /// True when no resource type can match.
    pub fn is_unsatisfiable(&self) -> bool {
        self.users.is_none() && self.groups.is_none()
    }

    pub fn for_type(&self, resource_type: ResourceType) -> Option<&Predicate> {
        match resource_type {
            ResourceType::User => self.users.as_ref(),
            ResourceType::Group => self.groups.as_ref(),
        }
    }
}

/// Compile `expr` for the requested resource types.
///
/// ```
/// use scim_store::filter::{compile, parse};
///
/// let expr = parse("displayName co \"Inc\"", false).unwrap();
/// let compiled = compile(&expr, false, true).unwrap();
/// assert!(compiled.users.is_none());
/// assert!(compiled.groups.is_some());
/// ```
pub fn compile(
    expr: &Expr,
    want_users: bool,
    want_groups: bool,
) -> Result<CompiledFilter, FilterError> {
    let targets: Vec<ResourceType> = [
        (ResourceType::User, want_users),
        (ResourceType::Group, want_groups),
    ]
    .into_iter()
    .filter_map(|(resource_type, wanted)| wanted.then_some(resource_type))
    .collect();

    let mut compiled = CompiledFilter::default();
    if targets.is_empty() {
        return Ok(compiled);
    }

    let registries: Vec<&'static Registry> =
        targets.iter().map(|t| Registry::for_type(*t)).collect();
    let others: Vec<&'static Registry> = [ResourceType::User, ResourceType::Group]
        .into_iter()
        .filter(|t| !targets.contains(t))
        .map(Registry::for_type)
        .collect();
    let predicates = Compiler {
        registries: &registries,
        others: &others,
    }
    .node(expr)?;

    for (target, predicate) in targets.into_iter().zip(predicates) {
        match target {
            ResourceType::User => compiled.users = predicate,
            ResourceType::Group => compiled.groups = predicate,
        }
    }

    log::debug!(
        "Compiled filter '{}': users={:?} groups={:?}",
        expr,
        compiled.users.as_ref().map(ToString::to_string),
        compiled.groups.as_ref().map(ToString::to_string)
    );
    Ok(compiled)
}

/// Compile the bracketed filter of a value path against `relation`'s items.
pub fn compile_item_filter(relation: Relation, expr: &Expr) -> Result<Predicate, FilterError> {
    let registries = [relation.registry()];
    let mut predicates = Compiler {
        registries: &registries,
        others: &[],
    }
    .node(expr)?;

    predicates
        .pop()
        .flatten()
        .ok_or_else(|| FilterError::Unimplemented(format!("empty {} filter", relation)))
}

struct Compiler<'a> {
    registries: &'a [&'static Registry],
    /// Resource types that were not requested.
    others: &'a [&'static Registry],
}

impl Compiler<'_> {
    /// One entry per registry, in registry order.
    fn node(&self, expr: &Expr) -> Result<Vec<Option<Predicate>>, FilterError> {
        match expr {
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.node(lhs)?;
                let rhs = self.node(rhs)?;
                Ok(lhs
                    .into_iter()
                    .zip(rhs)
                    .map(|pair| match (*op, pair) {
                        (LogicalOp::And, (Some(a), Some(b))) => Some(merge(a, b, LogicalOp::And)),
                        (LogicalOp::And, _) => None,
                        (LogicalOp::Or, (Some(a), Some(b))) => Some(merge(a, b, LogicalOp::Or)),
                        (LogicalOp::Or, (a, b)) => a.or(b),
                    })
                    .collect())
            }
            Expr::Compare { op, .. } if *op != CompareOp::Eq => Err(FilterError::Unimplemented(
                format!("the '{}' operator", op),
            )),
            Expr::Paren { negated: true, .. } => {
                Err(FilterError::Unimplemented("'not' expressions".to_string()))
            }
            Expr::Paren { negated: false, .. } => Err(FilterError::Unimplemented(
                "parenthesized expressions".to_string(),
            )),
            Expr::ValuePath { attr, .. } => Err(FilterError::Unimplemented(format!(
                "the value filter on '{}'",
                attr
            ))),
            Expr::Compare { attr, .. } | Expr::Regex { attr, .. } | Expr::Presence { attr } => {
                self.leaf(attr, expr)
            }
        }
    }

    fn leaf(&self, attr: &str, expr: &Expr) -> Result<Vec<Option<Predicate>>, FilterError> {
        let mut predicates = Vec::with_capacity(self.registries.len());
        let mut unknown = None;

        for registry in self.registries {
            match registry.resolve(attr) {
                Ok(resolved) => predicates.push(Some(build(resolved, attr, expr)?)),
                Err(error) if error.is_unknown_attribute() => {
                    unknown.get_or_insert(error);
                    predicates.push(None);
                }
                Err(error) => return Err(error.into()),
            }
        }

        if let Some(error) = unknown {
            let known_elsewhere = self.others.iter().any(|r| r.resolve(attr).is_ok());
            if predicates.iter().all(Option::is_none) && !known_elsewhere {
                return Err(error.into());
            }
        }
        Ok(predicates)
    }
}

fn merge(a: Predicate, b: Predicate, op: LogicalOp) -> Predicate {
    let mut parts = Vec::new();
    for predicate in [a, b] {
        match (op, predicate) {
            (LogicalOp::And, Predicate::And(inner)) | (LogicalOp::Or, Predicate::Or(inner)) => {
                parts.extend(inner)
            }
            (_, other) => parts.push(other),
        }
    }
    match op {
        LogicalOp::And => Predicate::And(parts),
        LogicalOp::Or => Predicate::Or(parts),
    }
}

fn build(resolved: Resolved, attr: &str, expr: &Expr) -> Result<Predicate, FilterError> {
    match resolved {
        Resolved::Field(field) => condition(&field, attr, expr),
        Resolved::Relation(relation) => {
            if matches!(expr, Expr::Presence { .. }) {
                return Ok(Predicate::HasItem {
                    relation,
                    filter: None,
                });
            }
            // a bare multi-valued attribute compares its items' value
            let field = relation
                .registry()
                .field("value")
                .ok_or_else(|| FilterError::InvalidOperator {
                    attr: attr.to_string(),
                    op: operator(expr).to_string(),
                })?;
            Ok(Predicate::HasItem {
                relation,
                filter: Some(Box::new(condition(&field, attr, expr)?)),
            })
        }
        Resolved::RelationField { relation, field } => Ok(Predicate::HasItem {
            relation,
            filter: Some(Box::new(condition(&field, attr, expr)?)),
        }),
    }
}

fn condition(field: &Field, attr: &str, expr: &Expr) -> Result<Predicate, FilterError> {
    if !field.filterable {
        return Err(FilterError::NotFilterable {
            attr: attr.to_string(),
        });
    }

    match expr {
        Expr::Presence { .. } if field.is_text() => Ok(Predicate::present_text(field.column)),
        Expr::Presence { .. } => Ok(Predicate::NotNull(field.column)),
        Expr::Compare { value, .. } => {
            let value = match (field.kind, value) {
                (FieldKind::Bool, Literal::Bool(b)) => Scalar::Bool(*b),
                (FieldKind::Text | FieldKind::ExactText, Literal::String(s)) => {
                    Scalar::Text(s.clone())
                }
                (kind, other) => {
                    return Err(FilterError::InvalidValue {
                        attr: attr.to_string(),
                        message: format!(
                            "expected a {} literal, got {}",
                            if kind == FieldKind::Bool { "boolean" } else { "string" },
                            other.kind()
                        ),
                    });
                }
            };
            Ok(Predicate::Equals {
                column: field.column,
                value,
                fold_case: field.folds_case(),
            })
        }
        Expr::Regex { op, value, .. } => {
            if !field.is_text() {
                return Err(FilterError::InvalidOperator {
                    attr: attr.to_string(),
                    op: op.to_string(),
                });
            }
            let Literal::String(value) = value else {
                return Err(FilterError::InvalidValue {
                    attr: attr.to_string(),
                    message: format!("expected a string literal, got {}", value.kind()),
                });
            };
            let (column, value, fold_case) = (field.column, value.clone(), field.folds_case());
            Ok(match op {
                RegexOp::Co => Predicate::Contains {
                    column,
                    value,
                    fold_case,
                },
                RegexOp::Sw => Predicate::StartsWith {
                    column,
                    value,
                    fold_case,
                },
                RegexOp::Ew => Predicate::EndsWith {
                    column,
                    value,
                    fold_case,
                },
            })
        }
        other => Err(FilterError::Unimplemented(other.to_string())),
    }
}

fn operator(expr: &Expr) -> &'static str {
    match expr {
        Expr::Compare { op, .. } => op.as_str(),
        Expr::Regex { op, .. } => op.as_str(),
        Expr::Presence { .. } => "pr",
        _ => "?",
    }
}
