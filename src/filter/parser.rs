//! SCIM filter and PATCH path parser (RFC 7644 §3.4.2.2 and §3.5.2).
//!
//! ## Grammar
//!
//! ```text
//! filter     = orExpr
//! orExpr     = andExpr { "or" andExpr }
//! andExpr    = unary { "and" unary }
//! unary      = "not" "(" filter ")" | "(" filter ")" | attrExpr
//! attrExpr   = ATTRNAME "[" filter "]"
//!            | ATTRNAME "pr"
//!            | ATTRNAME OP value
//! path       = ATTRNAME [ "[" filter "]" [ "." ATTRNAME ] ]
//! value      = "true" | "false" | "null" | NUMBER | STRING
//! ```
//!
//! Attribute names keep their dots (`name.givenName`, `emails.value`); the
//! registry decides how to split them. The core User and Group schema URN
//! prefixes are stripped. Brackets cannot nest.
//!
//! ## Limits
//!
//! - Maximum input length: 4096 bytes
//! - Maximum nesting depth: 32 levels

use crate::filter::ast::{CompareOp, Expr, Literal, LogicalOp, RegexOp};

/// Maximum allowed length of a filter or path, in bytes.
pub const MAX_FILTER_LENGTH: usize = 4096;

/// Maximum nesting depth of parentheses and brackets.
pub const MAX_FILTER_DEPTH: usize = 32;

const SCHEMA_PREFIXES: [&str; 2] = [
    "urn:ietf:params:scim:schemas:core:2.0:User:",
    "urn:ietf:params:scim:schemas:core:2.0:Group:",
];

/// Filter parsing error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("{message} at position {position}")]
    Syntax { message: String, position: usize },

    #[error("filter exceeds maximum length ({length} bytes, max {max})")]
    TooLong { length: usize, max: usize },

    #[error("filter exceeds maximum nesting depth ({max})")]
    TooDeep { max: usize },

    #[error("nested value filters are not supported (position {position})")]
    NestedValuePath { position: usize },
}

impl ParseError {
    fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }
}

/// Turns filter strings into expression trees.
///
/// `patch_mode` switches to the PATCH path grammar, which always yields an
/// [`Expr::ValuePath`].
pub trait FilterParser: Send + Sync {
    fn parse(&self, input: &str, patch_mode: bool) -> Result<Expr, ParseError>;
}

/// The built-in recursive-descent parser.
#[derive(Debug, Clone, Copy)]
pub struct ScimFilterParser {
    max_length: usize,
    max_depth: usize,
}

impl Default for ScimFilterParser {
    fn default() -> Self {
        Self {
            max_length: MAX_FILTER_LENGTH,
            max_depth: MAX_FILTER_DEPTH,
        }
    }
}

impl ScimFilterParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// A parser with custom input limits.
    pub fn with_limits(max_length: usize, max_depth: usize) -> Self {
        Self {
            max_length,
            max_depth,
        }
    }
}

impl FilterParser for ScimFilterParser {
    fn parse(&self, input: &str, patch_mode: bool) -> Result<Expr, ParseError> {
        if input.len() > self.max_length {
            return Err(ParseError::TooLong {
                length: input.len(),
                max: self.max_length,
            });
        }
        if input.trim().is_empty() {
            return Err(ParseError::syntax("Empty expression", 0));
        }

        let mut parser = Parser::new(input, self.max_depth);
        let expr = if patch_mode {
            parser.parse_path()?
        } else {
            parser.parse_filter()?
        };

        parser.skip_whitespace();
        if parser.position < parser.input.len() {
            return Err(ParseError::syntax(
                format!("Unexpected input: '{}'", &parser.input[parser.position..]),
                parser.position,
            ));
        }

        Ok(expr)
    }
}

/// Parse with the default parser and limits.
///
/// ```
/// use scim_store::filter::{parse, Expr};
///
/// let expr = parse("emails[type eq \"work\"].value", true).unwrap();
/// assert!(matches!(expr, Expr::ValuePath { .. }));
/// ```
pub fn parse(input: &str, patch_mode: bool) -> Result<Expr, ParseError> {
    ScimFilterParser::default().parse(input, patch_mode)
}

struct Parser<'a> {
    input: &'a str,
    position: usize,
    depth: usize,
    max_depth: usize,
    in_brackets: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, max_depth: usize) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
            max_depth,
            in_brackets: false,
        }
    }

    fn enter_scope(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::TooDeep {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn exit_scope(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // path = ATTRNAME [ "[" filter "]" [ "." ATTRNAME ] ]
    fn parse_path(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        let attr = self.parse_attr_name()?;

        if self.peek() != Some('[') {
            return Ok(Expr::ValuePath {
                attr,
                filter: None,
                sub_attr: None,
            });
        }

        let filter = self.parse_bracket()?;
        let sub_attr = if self.try_char('.') {
            Some(self.parse_attr_name()?)
        } else {
            None
        };

        Ok(Expr::ValuePath {
            attr,
            filter: Some(Box::new(filter)),
            sub_attr,
        })
    }

    fn parse_filter(&mut self) -> Result<Expr, ParseError> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and_expr()?;
        while self.try_keyword("or") {
            let rhs = self.parse_and_expr()?;
            lhs = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        while self.try_keyword("and") {
            let rhs = self.parse_unary()?;
            lhs = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        let negated = self.try_keyword("not");
        if negated {
            self.skip_whitespace();
            if self.peek() != Some('(') {
                return Err(ParseError::syntax(
                    "Expected '(' after 'not'",
                    self.position,
                ));
            }
        }

        if self.try_char('(') {
            self.enter_scope()?;
            let inner = self.parse_filter()?;
            self.exit_scope();
            self.skip_whitespace();
            if !self.try_char(')') {
                return Err(ParseError::syntax(
                    "Expected ')' to close grouped expression",
                    self.position,
                ));
            }
            return Ok(Expr::Paren {
                negated,
                inner: Box::new(inner),
            });
        }

        self.parse_attr_expr()
    }

    fn parse_attr_expr(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        let attr = self.parse_attr_name()?;

        if self.peek() == Some('[') {
            let filter = self.parse_bracket()?;
            if self.peek() == Some('.') {
                return Err(ParseError::syntax(
                    "A sub-attribute after a value filter is only valid in a PATCH path",
                    self.position,
                ));
            }
            return Ok(Expr::ValuePath {
                attr,
                filter: Some(Box::new(filter)),
                sub_attr: None,
            });
        }

        if self.try_keyword("pr") {
            return Ok(Expr::Presence { attr });
        }

        self.skip_whitespace();
        let start = self.position;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance();
        }
        let op = self.input[start..self.position].to_ascii_lowercase();

        let compare = match op.as_str() {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            _ => None,
        };
        let regex = match op.as_str() {
            "co" => Some(RegexOp::Co),
            "sw" => Some(RegexOp::Sw),
            "ew" => Some(RegexOp::Ew),
            _ => None,
        };

        match (compare, regex) {
            (Some(op), _) => {
                let value = self.parse_value()?;
                Ok(Expr::Compare { attr, op, value })
            }
            (_, Some(op)) => {
                let value = self.parse_value()?;
                Ok(Expr::Regex { attr, op, value })
            }
            _ if op.is_empty() => Err(ParseError::syntax("Expected operator", start)),
            _ => Err(ParseError::syntax(
                format!("Unknown operator: '{}'", op),
                start,
            )),
        }
    }

    fn parse_bracket(&mut self) -> Result<Expr, ParseError> {
        if self.in_brackets {
            return Err(ParseError::NestedValuePath {
                position: self.position,
            });
        }
        self.advance();
        self.enter_scope()?;
        self.in_brackets = true;
        let filter = self.parse_filter();
        self.in_brackets = false;
        let filter = filter?;
        self.exit_scope();

        self.skip_whitespace();
        if !self.try_char(']') {
            return Err(ParseError::syntax(
                "Expected ']' to close value filter",
                self.position,
            ));
        }
        Ok(filter)
    }

    fn parse_attr_name(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.position;

        if !self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '$')
        {
            return Err(ParseError::syntax("Expected attribute name", start));
        }

        while self.peek().is_some_and(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '$')
        }) {
            self.advance();
        }

        let name = &self.input[start..self.position];
        if name.ends_with('.') || name.contains("..") {
            return Err(ParseError::syntax(
                format!("Malformed attribute name: '{}'", name),
                start,
            ));
        }

        Ok(strip_schema_prefix(name).to_string())
    }

    fn parse_value(&mut self) -> Result<Literal, ParseError> {
        self.skip_whitespace();

        if self.peek() == Some('"') {
            return self.parse_string_value();
        }
        if self.try_keyword("true") {
            return Ok(Literal::Bool(true));
        }
        if self.try_keyword("false") {
            return Ok(Literal::Bool(false));
        }
        if self.try_keyword("null") {
            return Ok(Literal::Null);
        }
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
        {
            return self.parse_number_value();
        }

        Err(ParseError::syntax(
            "Expected value (string, boolean, number, or null)",
            self.position,
        ))
    }

    fn parse_string_value(&mut self) -> Result<Literal, ParseError> {
        // opening quote
        self.advance();
        let mut value = String::new();

        loop {
            match self.peek() {
                None => return Err(ParseError::syntax("Unterminated string", self.position)),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('/') => '/',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        _ => {
                            return Err(ParseError::syntax(
                                "Invalid escape sequence",
                                self.position,
                            ));
                        }
                    };
                    value.push(escaped);
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(Literal::String(value))
    }

    fn parse_number_value(&mut self) -> Result<Literal, ParseError> {
        let start = self.position;

        if matches!(self.peek(), Some('-' | '+')) {
            self.advance();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.advance();
            if matches!(self.peek(), Some('-' | '+')) {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.input[start..self.position];
        text.parse::<f64>()
            .map(Literal::Number)
            .map_err(|_| ParseError::syntax(format!("Invalid number: '{}'", text), start))
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.position += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn try_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let remaining = &self.input[self.position..];

        let Some(head) = remaining.get(..keyword.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(keyword) {
            return false;
        }

        // keyword must not be the prefix of a longer identifier
        let next = remaining[keyword.len()..].chars().next();
        if next.is_none_or(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':'))) {
            self.position += keyword.len();
            true
        } else {
            false
        }
    }
}

fn strip_schema_prefix(name: &str) -> &str {
    for prefix in SCHEMA_PREFIXES {
        if name.len() > prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(prefix) {
            return &name[prefix.len()..];
        }
    }
    name
}
