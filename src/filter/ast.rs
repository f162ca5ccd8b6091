//! Filter expression tree.
//!
//! The tree is produced by the parser and consumed by the compiler and the
//! patch engine. It models every construct the SCIM filter grammar can express,
//! including the ones the compiler refuses (ordering operators, grouping,
//! negation), so that a refusal is an explicit compile error rather than a
//! parse failure.

use std::fmt;

/// A parsed filter or patch path.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `attr eq|ne|gt|ge|lt|le value`
    Compare {
        attr: String,
        op: CompareOp,
        value: Literal,
    },
    /// `attr co|sw|ew value`
    Regex {
        attr: String,
        op: RegexOp,
        value: Literal,
    },
    /// `attr pr`
    Presence { attr: String },
    /// `lhs and|or rhs`
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `(inner)` or `not (inner)`
    Paren { negated: bool, inner: Box<Expr> },
    /// `attr[filter].sub`, every part after `attr` optional
    ValuePath {
        attr: String,
        filter: Option<Box<Expr>>,
        sub_attr: Option<String>,
    },
}

impl Expr {
    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::Logical {
            op: LogicalOp::And,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::Logical {
            op: LogicalOp::Or,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Attribute a leaf node refers to; `None` for logical and grouping nodes.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Expr::Compare { attr, .. }
            | Expr::Regex { attr, .. }
            | Expr::Presence { attr }
            | Expr::ValuePath { attr, .. } => Some(attr),
            Expr::Logical { .. } | Expr::Paren { .. } => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Compare { attr, op, value } => write!(f, "{} {} {}", attr, op, value),
            Expr::Regex { attr, op, value } => write!(f, "{} {} {}", attr, op, value),
            Expr::Presence { attr } => write!(f, "{} pr", attr),
            Expr::Logical { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            Expr::Paren { negated, inner } => {
                if *negated {
                    write!(f, "not ({})", inner)
                } else {
                    write!(f, "({})", inner)
                }
            }
            Expr::ValuePath {
                attr,
                filter,
                sub_attr,
            } => {
                write!(f, "{}", attr)?;
                if let Some(filter) = filter {
                    write!(f, "[{}]", filter)?;
                }
                if let Some(sub) = sub_attr {
                    write!(f, ".{}", sub)?;
                }
                Ok(())
            }
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substring operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexOp {
    /// Contains
    Co,
    /// Starts with
    Sw,
    /// Ends with
    Ew,
}

impl RegexOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegexOp::Co => "co",
            RegexOp::Sw => "sw",
            RegexOp::Ew => "ew",
        }
    }
}

impl fmt::Display for RegexOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => f.write_str("and"),
            LogicalOp::Or => f.write_str("or"),
        }
    }
}

/// Comparison values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Bool(bool),
    Number(f64),
    Null,
}

impl Literal {
    /// Name of the literal's type, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::String(_) => "string",
            Literal::Bool(_) => "boolean",
            Literal::Number(_) => "number",
            Literal::Null => "null",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Null => f.write_str("null"),
        }
    }
}
