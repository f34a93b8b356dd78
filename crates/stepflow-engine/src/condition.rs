//! Edge condition language.
//!
//! A condition compares a state value (looked up by dotted key path) with a
//! literal, or combines such comparisons with `&&`, `||` and `!`:
//!
//! ```text
//! complexity_score > 5
//! status == "ok" && !(retries >= 3)
//! review.verdict in ["approve", "merge"] or force
//! ```
//!
//! Evaluation never fails: a missing key makes its comparison (or bare
//! truthiness test) false, and negation then applies to that result, so
//! `!missing` holds.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use stepflow_core::error::{Result, StepflowError};

use crate::state::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    In,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Contains => "contains",
            Self::In => "in",
        })
    }
}

/// A parsed edge predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        path: Vec<String>,
        op: CompareOp,
        value: Value,
    },
    /// Bare key: true when present and truthy.
    Truthy { path: Vec<String> },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Parse a condition expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let err = |message: String| StepflowError::ConditionParse {
            expr: expr.to_string(),
            message,
        };
        let tokens = tokenize(expr).map_err(err)?;
        if tokens.is_empty() {
            return Err(err("empty expression".into()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let condition = parser.parse_or().map_err(err)?;
        if let Some(tok) = parser.peek() {
            return Err(err(format!("unexpected trailing {}", tok.describe())));
        }
        Ok(condition)
    }

    /// Evaluate against the current state.
    pub fn evaluate(&self, state: &StateStore) -> bool {
        match self {
            Self::Compare { path, op, value } => match state.lookup(path) {
                Some(actual) => compare(actual, *op, value),
                None => false,
            },
            Self::Truthy { path } => state.lookup(path).is_some_and(is_truthy),
            Self::Not(inner) => !inner.evaluate(state),
            Self::And(a, b) => a.evaluate(state) && b.evaluate(state),
            Self::Or(a, b) => a.evaluate(state) || b.evaluate(state),
        }
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(actual, expected),
        CompareOp::Ne => !values_equal(actual, expected),
        CompareOp::Gt => order(actual, expected) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            order(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Lt => order(actual, expected) == Some(Ordering::Less),
        CompareOp::Le => matches!(
            order(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Contains => contains(actual, expected),
        CompareOp::In => contains(expected, actual),
    }
}

/// Equality with numbers compared by value (`3 == 3.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

/// Ordering is only defined between two numbers or two strings.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), n) => items.iter().any(|item| values_equal(item, n)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ── Tokenizer ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(serde_json::Number),
    True,
    False,
    Null,
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(s) => format!("identifier `{s}`"),
            Self::Str(s) => format!("string \"{s}\""),
            Self::Num(n) => format!("number {n}"),
            Self::True => "`true`".into(),
            Self::False => "`false`".into(),
            Self::Null => "`null`".into(),
            Self::Op(op) => format!("operator `{op}`"),
            Self::And => "`&&`".into(),
            Self::Or => "`||`".into(),
            Self::Not => "`!`".into(),
            Self::LParen => "`(`".into(),
            Self::RParen => "`)`".into(),
            Self::LBracket => "`[`".into(),
            Self::RBracket => "`]`".into(),
            Self::Comma => "`,`".into(),
        }
    }
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' | '<' => {
                let (op, len) = match (c, next) {
                    ('>', Some('=')) => (CompareOp::Ge, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    ('<', Some('=')) => (CompareOp::Le, 2),
                    _ => (CompareOp::Lt, 1),
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".into()),
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some(escaped) => s.push(*escaped),
                                None => return Err("unterminated string literal".into()),
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit()
                || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_number(&text)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "contains" => Token::Op(CompareOp::Contains),
                    "in" => Token::Op(CompareOp::In),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }

    Ok(tokens)
}

fn parse_number(text: &str) -> std::result::Result<serde_json::Number, String> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(n.into());
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .ok_or_else(|| format!("invalid number `{text}`"))
}

// ── Parser ──────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!(
                "expected {} but found {}",
                expected.describe(),
                tok.describe()
            )),
            None => Err(format!("expected {} at end of input", expected.describe())),
        }
    }

    fn parse_or(&mut self) -> ParseResult<Condition> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Condition> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Condition> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Condition> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                let path: Vec<String> = name.split('.').map(str::to_string).collect();
                if path.iter().any(|seg| seg.is_empty()) {
                    return Err(format!("invalid key path `{name}`"));
                }
                match self.peek() {
                    Some(Token::Op(op)) => {
                        let op = *op;
                        self.advance();
                        let value = self.parse_literal()?;
                        Ok(Condition::Compare { path, op, value })
                    }
                    _ => Ok(Condition::Truthy { path }),
                }
            }
            Some(tok) => Err(format!("expected a state key but found {}", tok.describe())),
            None => Err("unexpected end of input".into()),
        }
    }

    fn parse_literal(&mut self) -> ParseResult<Value> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Num(n)) => Ok(Value::Number(n)),
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.advance();
                    return Ok(Value::Array(items));
                }
                loop {
                    items.push(self.parse_literal()?);
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        Some(tok) => {
                            return Err(format!("expected `,` or `]` but found {}", tok.describe()))
                        }
                        None => return Err("unterminated list literal".into()),
                    }
                }
                Ok(Value::Array(items))
            }
            Some(tok) => Err(format!("expected a literal but found {}", tok.describe())),
            None => Err("expected a literal at end of input".into()),
        }
    }
}
