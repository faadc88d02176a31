//! Predicate language for conditional grants.
//!
//! A conditional grant carries an expression evaluated against the contextual
//! data of a claim check, e.g. `userId == authUserId`.
//!
//! Supported syntax:
//! - Comparisons: `==`, `!=`, `>`, `<`, `>=`, `<=`
//! - Boolean operators: `&&`, `||`, `!`
//! - Membership: `x in list`
//! - Dot-path access: `project.ownerId`, `authUserId`
//! - Literals: integers, floats, `"strings"`, `true`, `false`
//! - Parentheses for grouping
//!
//! A path that does not resolve is *missing*. Missing values never compare
//! equal to anything, not even another missing value. A comparison involving
//! one is itself missing, and so is its negation; `&&` and `||` only decide
//! when the known side settles the result. A condition that ends up missing
//! evaluates to `false`, so absent data can never produce a grant.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::authz::errors::AuthzError;
use serde_json::Value;

// ─── AST ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(LitValue),
    Path(Vec<String>),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryNot(Box<Expr>),
    In {
        element: Box<Expr>,
        collection: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LitValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

// ─── Lexer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Dot,
    LParen,
    RParen,
    Op(BinOp),
    Not,
    In,
}

struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    /// Consume the next char if it equals `c`.
    fn eat(&mut self, c: char) -> bool {
        if self.chars.peek().map(|&(_, next)| next) == Some(c) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    /// Consume chars while `pred` holds and return the end offset.
    fn take_while(&mut self, start: usize, pred: impl Fn(char) -> bool) -> usize {
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        end
    }

    fn tokens(mut self) -> Result<Vec<Token>, AuthzError> {
        let mut out = Vec::new();
        while let Some((start, c)) = self.chars.next() {
            let token = match c {
                c if c.is_whitespace() => continue,
                '.' => Token::Dot,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '=' if self.eat('=') => Token::Op(BinOp::Eq),
                '!' if self.eat('=') => Token::Op(BinOp::Ne),
                '!' => Token::Not,
                '>' if self.eat('=') => Token::Op(BinOp::Ge),
                '>' => Token::Op(BinOp::Gt),
                '<' if self.eat('=') => Token::Op(BinOp::Le),
                '<' => Token::Op(BinOp::Lt),
                '&' if self.eat('&') => Token::Op(BinOp::And),
                '|' if self.eat('|') => Token::Op(BinOp::Or),
                '"' => self.string()?,
                c if c.is_ascii_digit() => {
                    let end = self.take_while(start + 1, |c| c.is_ascii_digit() || c == '.');
                    number(&self.src[start..end])?
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let end =
                        self.take_while(start + 1, |c| c.is_ascii_alphanumeric() || c == '_');
                    match &self.src[start..end] {
                        "true" => Token::True,
                        "false" => Token::False,
                        "in" => Token::In,
                        word => Token::Ident(word.to_string()),
                    }
                }
                c => {
                    return Err(AuthzError::InvalidCondition(format!(
                        "unexpected character `{c}`"
                    )));
                }
            };
            out.push(token);
        }
        Ok(out)
    }

    /// Lex a string literal; the opening quote is already consumed.
    fn string(&mut self) -> Result<Token, AuthzError> {
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => return Ok(Token::Str(s)),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, escaped)) => s.push(escaped),
                    None => break,
                },
                Some((_, c)) => s.push(c),
                None => break,
            }
        }
        Err(AuthzError::InvalidCondition(
            "unterminated string literal".into(),
        ))
    }
}

fn number(text: &str) -> Result<Token, AuthzError> {
    if text.contains('.') {
        text.parse()
            .map(Token::Float)
            .map_err(|_| AuthzError::InvalidCondition(format!("invalid float `{text}`")))
    } else {
        text.parse()
            .map(Token::Int)
            .map_err(|_| AuthzError::InvalidCondition(format!("invalid integer `{text}`")))
    }
}

// ─── Parser ─────────────────────────────────────────────────────────────

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    /// or_expr = and_expr ("||" and_expr)*
    fn parse_or(&mut self) -> Result<Expr, AuthzError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Op(BinOp::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = binop(BinOp::Or, left, right);
        }
        Ok(left)
    }

    /// and_expr = comparison ("&&" comparison)*
    fn parse_and(&mut self) -> Result<Expr, AuthzError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::Op(BinOp::And)) {
            self.advance();
            let right = self.parse_comparison()?;
            left = binop(BinOp::And, left, right);
        }
        Ok(left)
    }

    /// comparison = unary (("==" | "!=" | ">" | "<" | ">=" | "<=" | "in") unary)?
    fn parse_comparison(&mut self) -> Result<Expr, AuthzError> {
        let left = self.parse_unary()?;
        match self.peek() {
            Some(Token::Op(op)) if !matches!(op, BinOp::And | BinOp::Or) => {
                let op = *op;
                self.advance();
                let right = self.parse_unary()?;
                Ok(binop(op, left, right))
            }
            Some(Token::In) => {
                self.advance();
                let right = self.parse_unary()?;
                Ok(Expr::In {
                    element: Box::new(left),
                    collection: Box::new(right),
                })
            }
            _ => Ok(left),
        }
    }

    /// unary = "!" unary | primary
    fn parse_unary(&mut self) -> Result<Expr, AuthzError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryNot(Box::new(expr)));
        }
        self.parse_primary()
    }

    /// primary = literal | path | "(" expr ")"
    fn parse_primary(&mut self) -> Result<Expr, AuthzError> {
        let expr = match self.advance() {
            Some(Token::Int(n)) => Expr::Literal(LitValue::Int(n)),
            Some(Token::Float(f)) => Expr::Literal(LitValue::Float(f)),
            Some(Token::Str(s)) => Expr::Literal(LitValue::Str(s)),
            Some(Token::True) => Expr::Literal(LitValue::Bool(true)),
            Some(Token::False) => Expr::Literal(LitValue::Bool(false)),
            Some(Token::Ident(name)) => {
                let mut path = vec![name];
                while self.peek() == Some(&Token::Dot) {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(seg)) => path.push(seg),
                        _ => {
                            return Err(AuthzError::InvalidCondition(
                                "expected identifier after `.`".into(),
                            ));
                        }
                    }
                }
                Expr::Path(path)
            }
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if self.advance() != Some(Token::RParen) {
                    return Err(AuthzError::InvalidCondition(
                        "expected closing parenthesis `)`".into(),
                    ));
                }
                inner
            }
            other => {
                return Err(AuthzError::InvalidCondition(format!(
                    "unexpected token: {other:?}"
                )));
            }
        };
        Ok(expr)
    }
}

fn binop(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::BinOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse a condition expression string into an AST.
pub fn parse_condition(input: &str) -> Result<Expr, AuthzError> {
    let tokens = Lexer::new(input).tokens()?;
    if tokens.is_empty() {
        return Err(AuthzError::InvalidCondition("empty expression".into()));
    }
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(trailing) = parser.tokens.get(parser.pos) {
        return Err(AuthzError::InvalidCondition(format!(
            "unexpected trailing token: {trailing:?}"
        )));
    }
    Ok(expr)
}

// ─── Evaluator ──────────────────────────────────────────────────────────

/// Evaluate a parsed expression against JSON contextual data.
///
/// Returns `Ok(false)` when the outcome depends on missing data. Errors are
/// reserved for ill-typed expressions (e.g. `&&` over numbers).
pub fn evaluate(expr: &Expr, data: &Value) -> Result<bool, AuthzError> {
    match eval_operand(expr, data)? {
        Operand::Bool(b) => Ok(b),
        Operand::Missing => Ok(false),
        other => Err(AuthzError::InvalidCondition(format!(
            "condition must evaluate to boolean, got: {other:?}"
        ))),
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Array(Vec<Operand>),
    /// Unresolved path, JSON `null`, or a nested object
    Missing,
}

impl Operand {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Operand::Int(n) => Some(*n as f64),
            Operand::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Three-valued truth: `None` when missing.
    fn truth(&self, op: &str) -> Result<Option<bool>, AuthzError> {
        match self {
            Operand::Bool(b) => Ok(Some(*b)),
            Operand::Missing => Ok(None),
            _ => Err(AuthzError::InvalidCondition(format!(
                "`{op}` requires boolean operands"
            ))),
        }
    }

    /// Strict equality: a missing operand is never equal to anything.
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Operand::Int(a), Operand::Int(b)) => a == b,
            (Operand::Float(a), Operand::Float(b)) => a == b,
            (Operand::Int(a), Operand::Float(b)) | (Operand::Float(b), Operand::Int(a)) => {
                (*a as f64) == *b
            }
            (Operand::Str(a), Operand::Str(b)) => a == b,
            (Operand::Bool(a), Operand::Bool(b)) => a == b,
            (Operand::Array(a), Operand::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same(y))
            }
            _ => false,
        }
    }

    fn is_missing(&self) -> bool {
        matches!(self, Operand::Missing)
    }
}

fn eval_operand(expr: &Expr, data: &Value) -> Result<Operand, AuthzError> {
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            LitValue::Int(n) => Operand::Int(*n),
            LitValue::Float(f) => Operand::Float(*f),
            LitValue::Str(s) => Operand::Str(s.clone()),
            LitValue::Bool(b) => Operand::Bool(*b),
        }),
        Expr::Path(segments) => {
            let resolved = segments
                .iter()
                .try_fold(data, |current, seg| current.get(seg));
            Ok(resolved.map(json_operand).unwrap_or(Operand::Missing))
        }
        Expr::UnaryNot(inner) => match eval_operand(inner, data)? {
            Operand::Bool(b) => Ok(Operand::Bool(!b)),
            Operand::Missing => Ok(Operand::Missing),
            _ => Err(AuthzError::InvalidCondition(
                "`!` operator requires a boolean operand".into(),
            )),
        },
        Expr::In {
            element,
            collection,
        } => {
            let elem = eval_operand(element, data)?;
            match eval_operand(collection, data)? {
                Operand::Missing => Ok(Operand::Missing),
                Operand::Array(_) if elem.is_missing() => Ok(Operand::Missing),
                Operand::Array(items) => Ok(Operand::Bool(items.iter().any(|i| i.same(&elem)))),
                _ => Err(AuthzError::InvalidCondition(
                    "`in` operator requires an array on the right side".into(),
                )),
            }
        }
        Expr::BinOp { op, left, right } => {
            let l = eval_operand(left, data)?;
            let r = eval_operand(right, data)?;
            let result = match op {
                BinOp::And => {
                    return Ok(match (l.truth("&&")?, r.truth("&&")?) {
                        (Some(false), _) | (_, Some(false)) => Operand::Bool(false),
                        (Some(true), Some(true)) => Operand::Bool(true),
                        _ => Operand::Missing,
                    })
                }
                BinOp::Or => {
                    return Ok(match (l.truth("||")?, r.truth("||")?) {
                        (Some(true), _) | (_, Some(true)) => Operand::Bool(true),
                        (Some(false), Some(false)) => Operand::Bool(false),
                        _ => Operand::Missing,
                    })
                }
                _ if l.is_missing() || r.is_missing() => return Ok(Operand::Missing),
                BinOp::Eq => l.same(&r),
                BinOp::Ne => !l.same(&r),
                BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => {
                    let (Some(lf), Some(rf)) = (l.as_f64(), r.as_f64()) else {
                        return Err(AuthzError::InvalidCondition(
                            "comparison operator requires numeric operands".into(),
                        ));
                    };
                    match op {
                        BinOp::Gt => lf > rf,
                        BinOp::Lt => lf < rf,
                        BinOp::Ge => lf >= rf,
                        _ => lf <= rf,
                    }
                }
            };
            Ok(Operand::Bool(result))
        }
    }
}

fn json_operand(value: &Value) -> Operand {
    match value {
        Value::Null | Value::Object(_) => Operand::Missing,
        Value::Bool(b) => Operand::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map(Operand::Int)
            .or_else(|| n.as_f64().map(Operand::Float))
            .unwrap_or(Operand::Missing),
        Value::String(s) => Operand::Str(s.clone()),
        Value::Array(arr) => Operand::Array(arr.iter().map(json_operand).collect()),
    }
}
