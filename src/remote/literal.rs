//! Permissive parser for host-language literal syntax.
//!
//! Some service builds serialise the element list with Python `repr` instead
//! of JSON: single-quoted strings, `True`/`False`/`None`, tuples and trailing
//! commas. This parser accepts that dialect (and plain JSON) and yields the
//! same `serde_json::Value` a strict parse of the equivalent JSON would.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Deepest container nesting accepted, same as serde_json's recursion limit.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at byte {position}")]
pub struct LiteralError {
    pub message: String,
    pub position: usize,
}

pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut parser = LiteralParser {
        src: input,
        pos: 0,
        depth: 0,
    };
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.pos != input.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> LiteralParser<'a> {
    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, want: char) -> Result<(), LiteralError> {
        match self.bump() {
            Some(ch) if ch == want => Ok(()),
            Some(ch) => Err(self.error(format!("expected '{want}', found '{ch}'"))),
            None => Err(self.error(format!("expected '{want}', found end of input"))),
        }
    }

    fn parse_value(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.nested(|p| p.parse_sequence('[', ']')),
            Some('(') => self.nested(|p| p.parse_sequence('(', ')')),
            Some('{') => self.nested(Self::parse_mapping),
            Some('\'') | Some('"') => self.parse_string().map(Value::String),
            Some(ch) if ch == '-' || ch == '+' || ch == '.' || ch.is_ascii_digit() => {
                self.parse_number()
            }
            Some(ch) if ch.is_alphabetic() => self.parse_keyword(),
            Some(ch) => Err(self.error(format!("unexpected character '{ch}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Value, LiteralError>,
    ) -> Result<Value, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_sequence(&mut self, open: char, close: char) -> Result<Value, LiteralError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(Value::Array(items));
            }
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(ch) if ch == close => return Ok(Value::Array(items)),
                Some(ch) => return Err(self.error(format!("expected ',' or '{close}', found '{ch}'"))),
                None => return Err(self.error(format!("unterminated sequence, expected '{close}'"))),
            }
        }
    }

    fn parse_mapping(&mut self) -> Result<Value, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Object(map));
            }
            let key = match self.parse_value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => return Err(self.error(format!("unsupported mapping key {other}"))),
            };
            self.skip_ws();
            self.expect(':')?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                Some(ch) => return Err(self.error(format!("expected ',' or '}}', found '{ch}'"))),
                None => return Err(self.error("unterminated mapping, expected '}'")),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(ch) if ch == quote => return Ok(out),
                Some('\\') => self.parse_escape(&mut out)?,
                Some(ch) => out.push(ch),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        match self.bump() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('0') => out.push('\0'),
            Some('/') => out.push('/'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('x') => out.push(self.parse_hex_char(2)?),
            Some('u') => {
                let high = self.parse_hex_code(4)?;
                // JSON-style surrogate pair, e.g. \uD83D\uDE00
                if (0xD800..0xDC00).contains(&high) && self.src[self.pos..].starts_with("\\u") {
                    self.pos += 2;
                    let low = self.parse_hex_code(4)?;
                    let combined = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
                    out.push(char::from_u32(combined).ok_or_else(|| self.error("invalid surrogate pair"))?);
                } else {
                    out.push(char::from_u32(high).ok_or_else(|| self.error("invalid unicode escape"))?);
                }
            }
            Some('U') => out.push(self.parse_hex_char(8)?),
            // Unknown escapes are kept verbatim, as Python does.
            Some(ch) => {
                out.push('\\');
                out.push(ch);
            }
            None => return Err(self.error("unterminated escape")),
        }
        Ok(())
    }

    fn parse_hex_code(&mut self, digits: usize) -> Result<u32, LiteralError> {
        let end = self.pos + digits;
        let src = self.src;
        let hex = src
            .get(self.pos..end)
            .ok_or_else(|| self.error("truncated hex escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex escape"))?;
        self.pos = end;
        Ok(code)
    }

    fn parse_hex_char(&mut self, digits: usize) -> Result<char, LiteralError> {
        let code = self.parse_hex_code(digits)?;
        char::from_u32(code).ok_or_else(|| self.error("invalid character escape"))
    }

    fn parse_number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '+' | '_') {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        let src = self.src;
        let raw = &src[start..self.pos];
        let text = raw.trim_start_matches('+').replace('_', "");

        let is_float = text.contains(['.', 'e', 'E']);
        if !is_float {
            if let Ok(n) = text.parse::<u64>() {
                return Ok(Value::Number(n.into()));
            }
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        let f = text
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number '{raw}'")))?;
        Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| self.error(format!("non-finite number '{raw}'")))
    }

    fn parse_keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        let src = self.src;
        match &src[start..self.pos] {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            other => {
                self.pos = start;
                Err(self.error(format!("unknown identifier '{other}'")))
            }
        }
    }
}
