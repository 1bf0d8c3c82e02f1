//! Parser for the filter expressions a model writes, e.g.
//!
//! ```text
//! and(eq("genre", "animated"), gt("year", 1990), in("director", ["Kon", 'Nolan']))
//! ```
//!
//! `NO_FILTER` (or an empty string) means no filter.

use serde_json::{Number, Value};

use super::query::{Comparator, FilterExpr, Operator};
use crate::error::RetrieverError;

/// Deepest call or list nesting accepted from model output.
const MAX_DEPTH: usize = 64;

pub fn parse_filter(input: &str) -> Result<Option<FilterExpr>, RetrieverError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "NO_FILTER" {
        return Ok(None);
    }

    let mut parser = Parser {
        src: trimmed,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(Some(expr))
}

enum Arg {
    Expr(FilterExpr),
    Value(Value),
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> Result<(), RetrieverError> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(&format!("expected '{expected}', found end of input"))),
        }
    }

    fn error(&self, msg: &str) -> RetrieverError {
        RetrieverError::Parse(format!("{msg} at offset {} in {:?}", self.pos, self.src))
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, RetrieverError>,
    ) -> Result<T, RetrieverError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(&format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let out = parse(self);
        self.depth -= 1;
        out
    }

    fn ident(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn expr(&mut self) -> Result<FilterExpr, RetrieverError> {
        self.skip_ws();
        let name = self.ident();
        if name.is_empty() {
            return Err(self.error("expected a comparator or operator"));
        }
        match self.arg_after_ident(name)? {
            Arg::Expr(e) => Ok(e),
            Arg::Value(_) => Err(self.error(&format!("expected a function call, found `{name}`"))),
        }
    }

    fn arg_after_ident(&mut self, name: &str) -> Result<Arg, RetrieverError> {
        self.skip_ws();
        if self.peek() != Some('(') {
            return match name {
                "true" => Ok(Arg::Value(Value::Bool(true))),
                "false" => Ok(Arg::Value(Value::Bool(false))),
                _ => Err(self.error(&format!("unexpected identifier `{name}`"))),
            };
        }
        self.bump();
        let args = self.nested(Self::args)?;
        self.eat(')')?;
        self.call(name, args).map(Arg::Expr)
    }

    fn args(&mut self) -> Result<Vec<Arg>, RetrieverError> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            return Ok(args);
        }
        loop {
            args.push(self.arg()?);
            self.skip_ws();
            if self.peek() == Some(',') {
                self.bump();
            } else {
                return Ok(args);
            }
        }
    }

    fn arg(&mut self) -> Result<Arg, RetrieverError> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                let name = self.ident();
                self.arg_after_ident(name)
            }
            _ => self.value().map(Arg::Value),
        }
    }

    fn value(&mut self) -> Result<Value, RetrieverError> {
        self.skip_ws();
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.bump();
                self.string(q).map(Value::String)
            }
            Some('[') => {
                self.bump();
                self.nested(Self::list)
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let name = self.ident();
                match name {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(self.error(&format!("unexpected identifier `{name}`"))),
                }
            }
            Some(c) => Err(self.error(&format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, RetrieverError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn number(&mut self) -> Result<Value, RetrieverError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.bump();
        }
        let text = &self.src[start..self.pos];
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error(&format!("invalid number `{text}`")))
    }

    fn list(&mut self) -> Result<Value, RetrieverError> {
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Value::Array(items)),
                _ => return Err(self.error("expected ',' or ']' in list")),
            }
        }
    }

    fn call(&self, name: &str, args: Vec<Arg>) -> Result<FilterExpr, RetrieverError> {
        if let Some(comparator) = Comparator::from_name(name) {
            let mut args = args.into_iter();
            return match (args.next(), args.next(), args.next()) {
                (Some(Arg::Value(Value::String(attribute))), Some(Arg::Value(value)), None) => {
                    Ok(FilterExpr::Comparison {
                        comparator,
                        attribute,
                        value,
                    })
                }
                _ => Err(self.error(&format!(
                    "`{name}` takes an attribute name and a value"
                ))),
            };
        }

        let Some(operator) = Operator::from_name(name) else {
            return Err(self.error(&format!("unknown function `{name}`")));
        };
        let mut arguments = args
            .into_iter()
            .map(|a| match a {
                Arg::Expr(e) => Ok(e),
                Arg::Value(v) => Err(self.error(&format!(
                    "`{name}` takes filter expressions, found {v}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        match (operator, arguments.len()) {
            (_, 0) => Err(self.error(&format!("`{name}` needs at least one argument"))),
            (Operator::Not, 1) => Ok(FilterExpr::not(arguments.remove(0))),
            (Operator::Not, _) => Err(self.error("`not` takes exactly one argument")),
            (_, 1) => Ok(arguments.remove(0)),
            _ => Ok(FilterExpr::Operation {
                operator,
                arguments,
            }),
        }
    }
}
