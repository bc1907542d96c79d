//! Filter expression compilation.
//!
//! A filter is a small infix language over record fields:
//! comparisons (`==`, `!=`, `<`, `<=`, `>`, `>=`), full-text match
//! (`@`), boolean combinators (`&&`, `||`, `!`) and parentheses.
//! String literals are double-quoted and escape exactly `\\` and `\"`;
//! time literals are single-quoted (`'2010-04-01'`). Compilation
//! resolves every field reference up front and type-checks literals
//! against the resolved field, so a compiled [`Expr`] is immutable and
//! cannot fail resolution at evaluation time.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::accessor::Accessor;
use crate::construct::{Registry, Table};
use crate::datatype::{ColumnType, Time, Value, ValueType};
use crate::error::{FacetbaseError, Result};

// ------------- time literals -------------
lazy_static! {
    static ref YEAR_RE: Regex = Regex::new(r"^\d{4}$").unwrap();
    static ref YEAR_MONTH_RE: Regex = Regex::new(r"^\d{4}-\d{2}$").unwrap();
    static ref DATE_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref DATETIME_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}$").unwrap();
}

/// Parse a time literal at one of the accepted granularities.
pub fn parse_time(text: &str) -> Result<Time> {
    let bad = || FacetbaseError::syntax(format!("malformed time literal '{text}'"), None);
    if YEAR_RE.is_match(text) {
        return text.parse::<u16>().map(Time::Year).map_err(|_| bad());
    }
    if YEAR_MONTH_RE.is_match(text) {
        let year = text[..4].parse::<u16>().map_err(|_| bad())?;
        let month = text[5..7].parse::<u8>().map_err(|_| bad())?;
        if !(1..=12).contains(&month) {
            return Err(bad());
        }
        return Ok(Time::YearMonth(year, month));
    }
    if DATE_RE.is_match(text) {
        return NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Time::Date)
            .map_err(|_| bad());
    }
    if DATETIME_RE.is_match(text) {
        let normalized = text.replacen('T', " ", 1);
        return NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S")
            .map(Time::DateTime)
            .map_err(|_| bad());
    }
    Err(bad())
}

/// Escape a literal for embedding in a double-quoted filter string.
/// Exactly the backslash and the double quote are escaped.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ------------- match terms -------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFlags {
    /// When set, a match token starting with `-` excludes records
    /// matching that token; when unset the `-` is ordinary text.
    pub allow_leading_not: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTerm {
    pub token: String,
    pub negated: bool,
}

/// Parse a whitespace-separated match query into terms. A term with no
/// searchable text (operator punctuation only) is a syntax error, never
/// a silent empty match.
pub fn parse_query(text: &str, flags: QueryFlags) -> Result<Vec<MatchTerm>> {
    let mut terms = Vec::new();
    for raw in text.split_whitespace() {
        let (token, negated) = match raw.strip_prefix('-') {
            Some(rest) if flags.allow_leading_not && !rest.is_empty() => (rest, true),
            _ => (raw, false),
        };
        if !token.chars().any(|c| c.is_alphanumeric()) {
            return Err(FacetbaseError::syntax(
                format!("match term \"{raw}\" has no searchable text"),
                None,
            ));
        }
        terms.push(MatchTerm {
            token: token.to_string(),
            negated,
        });
    }
    if terms.is_empty() {
        return Err(FacetbaseError::syntax("empty match query", None));
    }
    Ok(terms)
}

// ------------- expression tree -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl CompareOp {
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equal => ordering == Ordering::Equal,
            CompareOp::NotEqual => ordering != Ordering::Equal,
            CompareOp::Less => ordering == Ordering::Less,
            CompareOp::LessOrEqual => ordering != Ordering::Greater,
            CompareOp::Greater => ordering == Ordering::Greater,
            CompareOp::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Less => "<",
            CompareOp::LessOrEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterOrEqual => ">=",
        };
        write!(f, "{symbol}")
    }
}

/// A compiled filter. Built once per query, never mutated afterwards.
#[derive(Debug)]
pub enum Expr {
    Compare {
        field: String,
        accessor: Accessor,
        op: CompareOp,
        literal: Value,
    },
    /// Full-text match against a stored text column. `ordinal` indexes
    /// the precomputed identity set the evaluator prepares per query.
    Match {
        column: String,
        terms: Vec<MatchTerm>,
        ordinal: usize,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Match nodes in ordinal order.
    pub(crate) fn collect_matches<'e>(&'e self, out: &mut Vec<(usize, &'e str, &'e [MatchTerm])>) {
        match self {
            Expr::Match { column, terms, ordinal } => out.push((*ordinal, column, terms)),
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_matches(out);
                right.collect_matches(out);
            }
            Expr::Not(inner) => inner.collect_matches(out),
            Expr::Compare { .. } => {}
        }
    }
}

// ------------- lexer -------------
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(String),
    Int(i64),
    Str(String),
    Time(Time),
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Match,
    And,
    Or,
    Not,
    LeftParen,
    RightParen,
    Eof,
}

fn describe(token: &Token) -> String {
    match token {
        Token::Field(name) => format!("field \"{name}\""),
        Token::Int(i) => format!("integer {i}"),
        Token::Str(_) => "a string literal".to_string(),
        Token::Time(_) => "a time literal".to_string(),
        Token::Equal => "\"==\"".to_string(),
        Token::NotEqual => "\"!=\"".to_string(),
        Token::Less => "\"<\"".to_string(),
        Token::LessOrEqual => "\"<=\"".to_string(),
        Token::Greater => "\">\"".to_string(),
        Token::GreaterOrEqual => "\">=\"".to_string(),
        Token::Match => "\"@\"".to_string(),
        Token::And => "\"&&\"".to_string(),
        Token::Or => "\"||\"".to_string(),
        Token::Not => "\"!\"".to_string(),
        Token::LeftParen => "\"(\"".to_string(),
        Token::RightParen => "\")\"".to_string(),
        Token::Eof => "end of input".to_string(),
    }
}

struct Lexer {
    input: Vec<char>,
    position: usize,
    current: Option<char>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current = chars.first().copied();
        Self {
            input: chars,
            position: 0,
            current,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.current.is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn read_field(&mut self) -> Token {
        let mut name = String::new();
        while let Some(c) = self.current {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Token::Field(name)
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.position;
        let mut digits = String::new();
        if self.current == Some('-') {
            digits.push('-');
            self.advance();
        }
        while let Some(c) = self.current {
            if c.is_ascii_digit() {
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }
        digits
            .parse::<i64>()
            .map(Token::Int)
            .map_err(|_| FacetbaseError::syntax(format!("invalid integer literal \"{digits}\""), Some(start)))
    }

    fn read_string(&mut self) -> Result<Token> {
        let start = self.position;
        self.advance(); // opening quote
        let mut text = String::new();
        while let Some(c) = self.current {
            match c {
                '"' => {
                    self.advance();
                    return Ok(Token::Str(text));
                }
                '\\' => {
                    self.advance();
                    match self.current {
                        Some(escaped @ ('\\' | '"')) => {
                            text.push(escaped);
                            self.advance();
                        }
                        Some(other) => {
                            return Err(FacetbaseError::syntax(
                                format!("unsupported escape sequence \\{other}"),
                                Some(self.position),
                            ));
                        }
                        None => break,
                    }
                }
                _ => {
                    text.push(c);
                    self.advance();
                }
            }
        }
        Err(FacetbaseError::syntax("unterminated string literal", Some(start)))
    }

    fn read_time(&mut self) -> Result<Token> {
        let start = self.position;
        self.advance(); // opening quote
        let mut text = String::new();
        while let Some(c) = self.current {
            if c == '\'' {
                self.advance();
                return parse_time(&text).map(Token::Time);
            }
            text.push(c);
            self.advance();
        }
        Err(FacetbaseError::syntax("unterminated time literal", Some(start)))
    }

    fn next_token(&mut self) -> Result<(Token, usize)> {
        self.skip_whitespace();
        let start = self.position;
        let token = match self.current {
            None => Token::Eof,
            Some(c) if c.is_ascii_digit() => return self.read_number().map(|t| (t, start)),
            Some('-') if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                return self.read_number().map(|t| (t, start));
            }
            Some(c) if c.is_alphabetic() || c == '_' => return Ok((self.read_field(), start)),
            Some('"') => return self.read_string().map(|t| (t, start)),
            Some('\'') => return self.read_time().map(|t| (t, start)),
            Some('=') => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    Token::Equal
                } else {
                    return Err(FacetbaseError::syntax(
                        "single \"=\" is not an operator; use \"==\"",
                        Some(start),
                    ));
                }
            }
            Some('!') => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    Token::NotEqual
                } else {
                    Token::Not
                }
            }
            Some('<') => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    Token::LessOrEqual
                } else {
                    Token::Less
                }
            }
            Some('>') => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    Token::GreaterOrEqual
                } else {
                    Token::Greater
                }
            }
            Some('@') => {
                self.advance();
                Token::Match
            }
            Some('&') => {
                self.advance();
                if self.current == Some('&') {
                    self.advance();
                    Token::And
                } else {
                    return Err(FacetbaseError::syntax("single \"&\"; use \"&&\"", Some(start)));
                }
            }
            Some('|') => {
                self.advance();
                if self.current == Some('|') {
                    self.advance();
                    Token::Or
                } else {
                    return Err(FacetbaseError::syntax("single \"|\"; use \"||\"", Some(start)));
                }
            }
            Some('(') => {
                self.advance();
                Token::LeftParen
            }
            Some(')') => {
                self.advance();
                Token::RightParen
            }
            Some(other) => {
                return Err(FacetbaseError::syntax(
                    format!("unexpected character \"{other}\""),
                    Some(start),
                ));
            }
        };
        Ok((token, start))
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        loop {
            let (token, position) = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push((token, position));
            if done {
                return Ok(tokens);
            }
        }
    }
}

// ------------- parser -------------
struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    position: usize,
    registry: &'a Registry,
    table: &'a Table,
    flags: QueryFlags,
    match_ordinals: usize,
}

impl<'a> Parser<'a> {
    fn current(&self) -> &Token {
        &self.tokens[self.position].0
    }

    fn current_position(&self) -> usize {
        self.tokens[self.position].1
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.position].0.clone();
        if token != Token::Eof {
            self.position += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let expr = self.parse_or()?;
        if *self.current() != Token::Eof {
            return Err(FacetbaseError::syntax(
                format!("unexpected {} after the expression", describe(self.current())),
                Some(self.current_position()),
            ));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while *self.current() == Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while *self.current() == Token::And {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if *self.current() == Token::Not {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let position = self.current_position();
        match self.advance() {
            Token::LeftParen => {
                let expr = self.parse_or()?;
                match self.advance() {
                    Token::RightParen => Ok(expr),
                    other => Err(FacetbaseError::syntax(
                        format!("expected \")\", found {}", describe(&other)),
                        Some(position),
                    )),
                }
            }
            Token::Field(name) => self.parse_comparison(name, position),
            other => Err(FacetbaseError::syntax(
                format!("expected a field or \"(\", found {}", describe(&other)),
                Some(position),
            )),
        }
    }

    fn parse_comparison(&mut self, field: String, position: usize) -> Result<Expr> {
        let accessor = Accessor::resolve(self.registry, self.table, &field)?;
        let op = match self.advance() {
            Token::Equal => CompareOp::Equal,
            Token::NotEqual => CompareOp::NotEqual,
            Token::Less => CompareOp::Less,
            Token::LessOrEqual => CompareOp::LessOrEqual,
            Token::Greater => CompareOp::Greater,
            Token::GreaterOrEqual => CompareOp::GreaterOrEqual,
            Token::Match => return self.parse_match(field, accessor, position),
            other => {
                return Err(FacetbaseError::syntax(
                    format!(
                        "expected a comparison operator after \"{field}\", found {}",
                        describe(&other)
                    ),
                    Some(position),
                ));
            }
        };
        let literal = match self.advance() {
            Token::Int(i) => Value::Int(i),
            Token::Str(s) => Value::Text(s),
            Token::Time(t) => Value::Time(t),
            other => {
                return Err(FacetbaseError::syntax(
                    format!(
                        "\"{field} {op}\" is missing its right-hand literal, found {}",
                        describe(&other)
                    ),
                    Some(position),
                ));
            }
        };
        self.check_literal(&accessor, &field, &literal)?;
        Ok(Expr::Compare {
            field,
            accessor,
            op,
            literal,
        })
    }

    fn parse_match(&mut self, field: String, accessor: Accessor, position: usize) -> Result<Expr> {
        let query = match self.advance() {
            Token::Str(s) => s,
            other => {
                return Err(FacetbaseError::syntax(
                    format!(
                        "the match operator expects a double-quoted query, found {}",
                        describe(&other)
                    ),
                    Some(position),
                ));
            }
        };
        let column = match &accessor {
            Accessor::Column { name } => match self.table.column(name).map(|c| c.column_type()) {
                Some(ColumnType::Text) => name.clone(),
                Some(other) => {
                    return Err(FacetbaseError::Type(format!(
                        "match target \"{field}\" must be a text column, not {other}"
                    )));
                }
                None => return Err(FacetbaseError::UnknownField(field)),
            },
            _ => {
                return Err(FacetbaseError::Type(format!(
                    "match target \"{field}\" must be a stored text column"
                )));
            }
        };
        let terms = parse_query(&query, self.flags)?;
        let ordinal = self.match_ordinals;
        self.match_ordinals += 1;
        Ok(Expr::Match { column, terms, ordinal })
    }

    fn check_literal(&self, accessor: &Accessor, field: &str, literal: &Value) -> Result<()> {
        let field_type = accessor.result_type(self.registry, self.table)?;
        let literal_type = literal.value_type();
        if field_type == literal_type {
            return Ok(());
        }
        // reference-backed fields also compare against the empty-string sentinel
        if literal_type == ValueType::Text && accessor.may_project_empty(self.table) {
            return Ok(());
        }
        Err(FacetbaseError::Type(format!(
            "cannot compare field \"{field}\" of type {field_type} with a {literal_type} literal"
        )))
    }
}

/// Compile a filter string against a table. Field references resolve and
/// type-check here, so the returned expression evaluates without further
/// schema lookups failing.
pub fn compile(registry: &Registry, table: &Table, text: &str, flags: QueryFlags) -> Result<Expr> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        position: 0,
        registry,
        table,
        flags,
        match_ordinals: 0,
    };
    let expr = parser.parse_expression()?;
    debug!(filter = text, "compiled filter expression");
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::Registry;
    use crate::datatype::ColumnType;

    fn fixture() -> Registry {
        let mut registry = Registry::new();
        registry.create_table("Entries", Some(ValueType::Text)).unwrap();
        registry.create_column("Entries", "content", ColumnType::Text).unwrap();
        registry.create_column("Entries", "count", ColumnType::Int).unwrap();
        registry.create_column("Entries", "published", ColumnType::Time).unwrap();
        registry
    }

    fn compile_on(registry: &Registry, text: &str) -> Result<Expr> {
        let table = registry.table("Entries").unwrap();
        compile(registry, table, text, QueryFlags::default())
    }

    #[test]
    fn escaped_literals_round_trip() {
        let registry = fixture();
        for raw in ["the \\ book", "the \"best\" book", "a\\\\b", "\"\""] {
            let filter = format!("_key == \"{}\"", escape(raw));
            let expr = compile_on(&registry, &filter).expect("filter compiles");
            let Expr::Compare { literal, .. } = expr else {
                panic!("expected a comparison")
            };
            assert_eq!(literal, Value::text(raw), "unescape(escape) identity for {raw:?}");
        }
    }

    #[test]
    fn unknown_escape_is_rejected() {
        let registry = fixture();
        let err = compile_on(&registry, r#"_key == "a\nb""#).unwrap_err();
        assert!(matches!(err, FacetbaseError::Syntax { .. }), "got {err}");
    }

    #[test]
    fn dangling_operator_is_a_syntax_error() {
        let registry = fixture();
        for text in ["_key <", "count >=", "<", "count == && _key == \"x\""] {
            let err = compile_on(&registry, text).unwrap_err();
            assert!(matches!(err, FacetbaseError::Syntax { .. }), "{text}: got {err}");
        }
    }

    #[test]
    fn single_equals_is_rejected() {
        let registry = fixture();
        let err = compile_on(&registry, "_key = \"x\"").unwrap_err();
        assert!(matches!(err, FacetbaseError::Syntax { .. }));
    }

    #[test]
    fn literal_types_are_checked_at_compile_time() {
        let registry = fixture();
        let err = compile_on(&registry, "count == \"five\"").unwrap_err();
        assert!(matches!(err, FacetbaseError::Type(_)), "got {err}");
        let err = compile_on(&registry, "published > 42").unwrap_err();
        assert!(matches!(err, FacetbaseError::Type(_)), "got {err}");
    }

    #[test]
    fn unknown_fields_fail_resolution() {
        let registry = fixture();
        let err = compile_on(&registry, "missing == 1").unwrap_err();
        assert!(matches!(err, FacetbaseError::UnknownField(_)), "got {err}");
        // reserved underscore names other than the intrinsics
        let err = compile_on(&registry, "_score > 1").unwrap_err();
        assert!(matches!(err, FacetbaseError::UnknownField(_)), "got {err}");
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let registry = fixture();
        let expr = compile_on(&registry, "count == 1 || count == 2 && count == 3").unwrap();
        let Expr::Or(_, right) = expr else {
            panic!("expected \"||\" at the root")
        };
        assert!(matches!(*right, Expr::And(_, _)));
    }

    #[test]
    fn negation_applies_to_the_following_term() {
        let registry = fixture();
        let expr = compile_on(&registry, "!count == 1 && count == 2").unwrap();
        let Expr::And(left, _) = expr else {
            panic!("expected \"&&\" at the root")
        };
        assert!(matches!(*left, Expr::Not(_)));
    }

    #[test]
    fn time_literal_granularities() {
        assert_eq!(parse_time("2010").unwrap(), Time::Year(2010));
        assert_eq!(parse_time("2010-04").unwrap(), Time::YearMonth(2010, 4));
        assert_eq!(
            parse_time("2010-04-01").unwrap(),
            Time::Date(NaiveDate::from_ymd_opt(2010, 4, 1).unwrap())
        );
        assert!(parse_time("2010-04-01T12:30:00").is_ok());
        assert!(parse_time("2010-13").is_err(), "month 13");
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn match_terms_honor_the_leading_not_flag() {
        let off = parse_query("-mroonga fast", QueryFlags::default()).unwrap();
        assert_eq!(off[0], MatchTerm { token: "-mroonga".into(), negated: false });
        let on = parse_query(
            "-mroonga fast",
            QueryFlags { allow_leading_not: true },
        )
        .unwrap();
        assert_eq!(on[0], MatchTerm { token: "mroonga".into(), negated: true });
        assert_eq!(on[1], MatchTerm { token: "fast".into(), negated: false });
    }

    #[test]
    fn operator_only_query_is_a_syntax_error() {
        let err = parse_query("<", QueryFlags::default()).unwrap_err();
        assert!(matches!(err, FacetbaseError::Syntax { .. }));
        let err = parse_query("", QueryFlags::default()).unwrap_err();
        assert!(matches!(err, FacetbaseError::Syntax { .. }));
    }

    #[test]
    fn match_expression_compiles_against_text_columns_only() {
        let registry = fixture();
        assert!(compile_on(&registry, "content @ \"fast\"").is_ok());
        let err = compile_on(&registry, "count @ \"fast\"").unwrap_err();
        assert!(matches!(err, FacetbaseError::Type(_)), "got {err}");
    }
}
