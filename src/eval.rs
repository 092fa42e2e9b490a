//! Expression evaluation for interpreted programs
//!
//! Evaluates translated expression text against instance state and loop
//! locals. The language is deliberately small: string/number/boolean/null
//! literals, `!` negation, dotted identifier paths rooted at `instance.`
//! or `locals.`, and a top-level call form for event handlers. Unknown
//! identifiers evaluate to `Null`; a malformed expression surfaces as an
//! [`Error`] when the program runs, never at compile time.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    /// Dotted identifier path, e.g. `instance.user.name`.
    Path(Vec<String>),
    Not(Box<Expr>),
    /// Call form, e.g. `instance.increment(locals.$event)`. Only valid
    /// in event-handler position; see `runtime`.
    Call { path: Vec<String>, args: Vec<Expr> },
}

/// Parse translated expression source.
pub fn parse(source: &str) -> Result<Expr> {
    let mut parser = ExprParser {
        chars: source.chars().collect(),
        pos: 0,
        source,
    };
    parser.skip_whitespace();
    let expr = parser.expression()?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("trailing input after expression"));
    }
    Ok(expr)
}

struct ExprParser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl ExprParser<'_> {
    fn error(&self, message: &str) -> Error {
        Error::expression(self.source, message)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        if self.peek() == Some('!') {
            self.pos += 1;
            self.skip_whitespace();
            return Ok(Expr::Not(Box::new(self.expression()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut text = String::new();
                loop {
                    match self.peek() {
                        Some(c) if c == quote => {
                            self.pos += 1;
                            return Ok(Expr::String(text));
                        }
                        Some('\\') => {
                            self.pos += 1;
                            match self.peek() {
                                Some('n') => text.push('\n'),
                                Some(c) => text.push(c),
                                None => return Err(self.error("unterminated string")),
                            }
                            self.pos += 1;
                        }
                        Some(c) => {
                            text.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("unterminated string")),
                    }
                }
            }
            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) if is_identifier_start(c) => self.path_or_call(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> Result<Expr> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| self.error("invalid number"))
    }

    fn path_or_call(&mut self) -> Result<Expr> {
        let mut segments = vec![self.identifier()];
        while self.peek() == Some('.') {
            self.pos += 1;
            if !matches!(self.peek(), Some(c) if is_identifier_start(c)) {
                return Err(self.error("expected identifier after `.`"));
            }
            segments.push(self.identifier());
        }

        // Keyword literals arrive as bare paths.
        if segments.len() == 1 {
            match segments[0].as_str() {
                "true" => return Ok(Expr::Bool(true)),
                "false" => return Ok(Expr::Bool(false)),
                "null" => return Ok(Expr::Null),
                _ => {}
            }
        }

        self.skip_whitespace();
        if self.peek() == Some('(') {
            self.pos += 1;
            let mut args = Vec::new();
            self.skip_whitespace();
            if self.peek() != Some(')') {
                loop {
                    args.push(self.expression()?);
                    self.skip_whitespace();
                    match self.peek() {
                        Some(',') => {
                            self.pos += 1;
                            self.skip_whitespace();
                        }
                        Some(')') => break,
                        _ => return Err(self.error("expected `,` or `)` in call")),
                    }
                }
            }
            self.pos += 1;
            return Ok(Expr::Call {
                path: segments,
                args,
            });
        }

        Ok(Expr::Path(segments))
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_identifier_continue(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// The ambient bindings an expression resolves against.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub instance: &'a Map<String, Value>,
    pub locals: &'a Map<String, Value>,
}

pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<Value> {
    match expr {
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Number(n) => Ok(serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Path(segments) => Ok(resolve(segments, scope)),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&evaluate(inner, scope)?))),
        Expr::Call { path, .. } => Err(Error::expression(
            path.join("."),
            "calls are only supported in event-handler position",
        )),
    }
}

/// Walk a dotted path. The first segment picks the root map: `instance`
/// and `locals` are explicit roots; a `$`-prefixed head resolves through
/// locals; anything else tries locals first, then instance. Missing
/// bindings are `Null`.
fn resolve(segments: &[String], scope: &Scope<'_>) -> Value {
    let (root, rest): (&Value, &[String]) = match segments[0].as_str() {
        "instance" => match rest_lookup(scope.instance, segments.get(1)) {
            Some(value) => (value, &segments[2.min(segments.len())..]),
            None => return Value::Null,
        },
        "locals" => match rest_lookup(scope.locals, segments.get(1)) {
            Some(value) => (value, &segments[2.min(segments.len())..]),
            None => return Value::Null,
        },
        head => {
            let map = if head.starts_with('$') {
                scope.locals
            } else if scope.locals.contains_key(head) {
                scope.locals
            } else {
                scope.instance
            };
            match map.get(head) {
                Some(value) => (value, &segments[1..]),
                None => return Value::Null,
            }
        }
    };

    let mut current = root;
    for segment in rest {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(value) => value,
                None => return Value::Null,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(value) => value,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    current.clone()
}

fn rest_lookup<'a>(map: &'a Map<String, Value>, key: Option<&String>) -> Option<&'a Value> {
    map.get(key?.as_str())
}

/// JS-flavored truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Coerce a value to attribute/text content.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
