//! Composable predicates consumed by the storage query layer.
//!
//! A [`Predicate`] is plain data: the filter compiler produces it, a storage
//! backend either translates it into its own query language or evaluates it
//! directly against rows with [`Predicate::evaluate`].

use crate::storage::rows::{Cell, Column, ItemRow, Relation, Row, Scalar};
use crate::storage::StorageError;
use std::fmt;
use uuid::Uuid;

/// A boolean condition over the columns and relations of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`; text is compared case-insensitively when `fold_case` is set.
    Equals {
        column: Column,
        value: Scalar,
        fold_case: bool,
    },
    /// `column` contains `value`.
    Contains {
        column: Column,
        value: String,
        fold_case: bool,
    },
    /// `column` starts with `value`.
    StartsWith {
        column: Column,
        value: String,
        fold_case: bool,
    },
    /// `column` ends with `value`.
    EndsWith {
        column: Column,
        value: String,
        fold_case: bool,
    },
    /// `column IS NOT NULL`.
    NotNull(Column),
    /// The row has at least one item in `relation`, matching `filter` when given.
    HasItem {
        relation: Relation,
        filter: Option<Box<Predicate>>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// `column IS NOT NULL AND column != ''`.
    ///
    /// An empty string never counts as present.
    pub fn present_text(column: Column) -> Self {
        Predicate::And(vec![
            Predicate::NotNull(column),
            Predicate::Not(Box::new(Predicate::Equals {
                column,
                value: Scalar::Text(String::new()),
                fold_case: false,
            })),
        ])
    }

    /// Conjunction of `predicates`, collapsing a single element.
    pub fn and(mut predicates: Vec<Predicate>) -> Self {
        if predicates.len() == 1 {
            predicates.remove(0)
        } else {
            Predicate::And(predicates)
        }
    }

    /// Disjunction of `predicates`, collapsing a single element.
    pub fn or(mut predicates: Vec<Predicate>) -> Self {
        if predicates.len() == 1 {
            predicates.remove(0)
        } else {
            Predicate::Or(predicates)
        }
    }

    /// Evaluate against a row, loading related items through `relations`.
    pub fn evaluate<R: Row>(
        &self,
        row: &R,
        relations: &dyn RelationLoader,
    ) -> Result<bool, StorageError> {
        match self {
            Predicate::Equals {
                column,
                value,
                fold_case,
            } => Ok(match (read(row, *column)?, value) {
                (Cell::Text(actual), Scalar::Text(expected)) => {
                    if *fold_case {
                        actual.to_lowercase() == expected.to_lowercase()
                    } else {
                        actual == expected
                    }
                }
                (Cell::Bool(actual), Scalar::Bool(expected)) => actual == *expected,
                _ => false,
            }),
            Predicate::Contains {
                column,
                value,
                fold_case,
            } => text_match(row, *column, value, *fold_case, |a, b| a.contains(b)),
            Predicate::StartsWith {
                column,
                value,
                fold_case,
            } => text_match(row, *column, value, *fold_case, |a, b| a.starts_with(b)),
            Predicate::EndsWith {
                column,
                value,
                fold_case,
            } => text_match(row, *column, value, *fold_case, |a, b| a.ends_with(b)),
            Predicate::NotNull(column) => Ok(read(row, *column)? != Cell::Null),
            Predicate::HasItem { relation, filter } => {
                for item in relations.load(*relation, row.id())? {
                    let matched = match filter {
                        Some(filter) => filter.evaluate(item, &NoRelations)?,
                        None => true,
                    };
                    if matched {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::And(predicates) => {
                for predicate in predicates {
                    if !predicate.evaluate(row, relations)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(predicates) => {
                for predicate in predicates {
                    if predicate.evaluate(row, relations)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(predicate) => Ok(!predicate.evaluate(row, relations)?),
        }
    }
}

fn read<R: Row>(row: &R, column: Column) -> Result<Cell<'_>, StorageError> {
    row.cell(column).ok_or_else(|| {
        StorageError::invalid_query(format!("table {} has no column {}", row.table(), column))
    })
}

fn text_match<R: Row>(
    row: &R,
    column: Column,
    needle: &str,
    fold_case: bool,
    test: impl Fn(&str, &str) -> bool,
) -> Result<bool, StorageError> {
    Ok(match read(row, column)? {
        Cell::Text(actual) if fold_case => test(&actual.to_lowercase(), &needle.to_lowercase()),
        Cell::Text(actual) => test(actual, needle),
        _ => false,
    })
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals { column, value, .. } => write!(f, "{} = {}", column, value),
            Predicate::Contains { column, value, .. } => write!(f, "{} LIKE \"%{}%\"", column, value),
            Predicate::StartsWith { column, value, .. } => {
                write!(f, "{} LIKE \"{}%\"", column, value)
            }
            Predicate::EndsWith { column, value, .. } => write!(f, "{} LIKE \"%{}\"", column, value),
            Predicate::NotNull(column) => write!(f, "{} IS NOT NULL", column),
            Predicate::HasItem { relation, filter } => match filter {
                Some(filter) => write!(f, "HAS {}({})", relation.table(), filter),
                None => write!(f, "HAS {}", relation.table()),
            },
            Predicate::And(predicates) => join(f, predicates, " AND "),
            Predicate::Or(predicates) => join(f, predicates, " OR "),
            Predicate::Not(predicate) => write!(f, "NOT ({})", predicate),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, predicates: &[Predicate], separator: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, predicate) in predicates.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", predicate)?;
    }
    write!(f, ")")
}

/// Source of related item rows during predicate evaluation.
pub trait RelationLoader {
    fn load(&self, relation: Relation, owner_id: Uuid) -> Result<Vec<&ItemRow>, StorageError>;
}

/// Loader for rows that have no relations of their own (collection items).
pub struct NoRelations;

impl RelationLoader for NoRelations {
    fn load(&self, relation: Relation, _owner_id: Uuid) -> Result<Vec<&ItemRow>, StorageError> {
        Err(StorageError::invalid_query(format!(
            "{} cannot be traversed from a collection item",
            relation
        )))
    }
}
