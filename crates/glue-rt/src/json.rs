use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<JsonValue>),
    Object(BTreeMap<String, JsonValue>),
}

pub fn encode(value: &JsonValue) -> String {
    let mut out = String::new();
    encode_value(value, &mut out, None, 0);
    out
}

/// Encodes with newlines and four-space indentation.
pub fn encode_pretty(value: &JsonValue) -> String {
    let mut out = String::new();
    encode_value(value, &mut out, Some(4), 0);
    out
}

fn encode_value(value: &JsonValue, out: &mut String, indent: Option<usize>, depth: usize) {
    match value {
        JsonValue::Null => out.push_str("null"),
        JsonValue::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        JsonValue::Int(v) => out.push_str(&v.to_string()),
        JsonValue::Float(v) => encode_float(*v, out),
        JsonValue::String(v) => encode_string(v, out),
        JsonValue::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                newline(out, indent, depth + 1);
                encode_value(item, out, indent, depth + 1);
            }
            newline(out, indent, depth);
            out.push(']');
        }
        JsonValue::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push('{');
            for (idx, (key, value)) in map.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                newline(out, indent, depth + 1);
                encode_string(key, out);
                out.push(':');
                if indent.is_some() {
                    out.push(' ');
                }
                encode_value(value, out, indent, depth + 1);
            }
            newline(out, indent, depth);
            out.push('}');
        }
    }
}

fn newline(out: &mut String, indent: Option<usize>, depth: usize) {
    if let Some(width) = indent {
        out.push('\n');
        for _ in 0..width * depth {
            out.push(' ');
        }
    }
}

fn encode_float(value: f64, out: &mut String) {
    if !value.is_finite() {
        out.push_str("null");
        return;
    }
    let text = value.to_string();
    out.push_str(&text);
    // keep floats distinguishable from ints on the wire
    if !text.contains(['.', 'e', 'E']) {
        out.push_str(".0");
    }
}

fn encode_string(value: &str, out: &mut String) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

/// Deepest array/object nesting `decode` accepts.
pub const MAX_DEPTH: usize = 256;

pub fn decode(input: &str) -> Result<JsonValue, String> {
    let mut parser = Parser::new(input);
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.eof() {
        Ok(value)
    } else {
        Err(format!("trailing characters at offset {}", parser.pos))
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b' ' || ch == b'\n' || ch == b'\t' || ch == b'\r' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn parse_value(&mut self) -> Result<JsonValue, String> {
        self.skip_ws();
        match self.peek() {
            Some(b'n') => self.parse_null(),
            Some(b't') | Some(b'f') => self.parse_bool(),
            Some(b'"') => self.parse_string().map(JsonValue::String),
            Some(b'[') => self.nested(Self::parse_array),
            Some(b'{') => self.nested(Self::parse_object),
            Some(b'-') | Some(b'0'..=b'9') => self.parse_number(),
            Some(_) => Err(format!("unexpected character at offset {}", self.pos)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<JsonValue, String>,
    ) -> Result<JsonValue, String> {
        if self.depth >= MAX_DEPTH {
            return Err(format!("nesting too deep at offset {}", self.pos));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_null(&mut self) -> Result<JsonValue, String> {
        if self.consume_bytes(b"null") {
            Ok(JsonValue::Null)
        } else {
            Err("invalid null".to_string())
        }
    }

    fn parse_bool(&mut self) -> Result<JsonValue, String> {
        if self.consume_bytes(b"true") {
            Ok(JsonValue::Bool(true))
        } else if self.consume_bytes(b"false") {
            Ok(JsonValue::Bool(false))
        } else {
            Err("invalid bool".to_string())
        }
    }

    fn parse_number(&mut self) -> Result<JsonValue, String> {
        let start = self.pos;
        let mut is_float = false;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        if !self.eat_digits() {
            return Err("invalid number".to_string());
        }
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            if !self.eat_digits() {
                return Err("invalid number".to_string());
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            if !self.eat_digits() {
                return Err("invalid number".to_string());
            }
        }
        let slice = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| "invalid number".to_string())?;
        if !is_float {
            if let Ok(value) = slice.parse::<i64>() {
                return Ok(JsonValue::Int(value));
            }
        }
        let value = slice
            .parse::<f64>()
            .map_err(|_| "invalid number".to_string())?;
        Ok(JsonValue::Float(value))
    }

    fn eat_digits(&mut self) -> bool {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.pos > start
    }

    fn parse_string(&mut self) -> Result<String, String> {
        if self.bump() != Some(b'"') {
            return Err("expected string".to_string());
        }
        let mut out: Vec<u8> = Vec::new();
        while let Some(ch) = self.bump() {
            match ch {
                b'"' => {
                    return String::from_utf8(out).map_err(|_| "invalid utf-8 in string".to_string());
                }
                b'\\' => {
                    let esc = self.bump().ok_or_else(|| "invalid escape".to_string())?;
                    let decoded = match esc {
                        b'"' => '"',
                        b'\\' => '\\',
                        b'/' => '/',
                        b'b' => '\u{08}',
                        b'f' => '\u{0C}',
                        b'n' => '\n',
                        b'r' => '\r',
                        b't' => '\t',
                        b'u' => self.parse_unicode_escape()?,
                        _ => return Err("invalid escape".to_string()),
                    };
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(decoded.encode_utf8(&mut buf).as_bytes());
                }
                _ => out.push(ch),
            }
        }
        Err("unterminated string".to_string())
    }

    fn parse_unicode_escape(&mut self) -> Result<char, String> {
        let high = self.parse_hex4()?;
        if (0xD800..0xDC00).contains(&high) {
            if !self.consume_bytes(b"\\u") {
                return Err("unpaired surrogate".to_string());
            }
            let low = self.parse_hex4()?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err("invalid low surrogate".to_string());
            }
            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            return std::char::from_u32(code).ok_or_else(|| "invalid unicode escape".to_string());
        }
        std::char::from_u32(high).ok_or_else(|| "invalid unicode escape".to_string())
    }

    fn parse_hex4(&mut self) -> Result<u32, String> {
        let mut value: u32 = 0;
        for _ in 0..4 {
            let ch = self
                .bump()
                .ok_or_else(|| "invalid unicode escape".to_string())?;
            value = value * 16
                + match ch {
                    b'0'..=b'9' => (ch - b'0') as u32,
                    b'a'..=b'f' => (ch - b'a' + 10) as u32,
                    b'A'..=b'F' => (ch - b'A' + 10) as u32,
                    _ => return Err("invalid unicode escape".to_string()),
                };
        }
        Ok(value)
    }

    fn parse_array(&mut self) -> Result<JsonValue, String> {
        if self.bump() != Some(b'[') {
            return Err("expected [".to_string());
        }
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(JsonValue::Array(items));
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.bump() {
                Some(b',') => {}
                Some(b']') => break,
                _ => return Err("expected ',' or ']'".to_string()),
            }
        }
        Ok(JsonValue::Array(items))
    }

    fn parse_object(&mut self) -> Result<JsonValue, String> {
        if self.bump() != Some(b'{') {
            return Err("expected {".to_string());
        }
        let mut map = BTreeMap::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(JsonValue::Object(map));
        }
        loop {
            self.skip_ws();
            let key = self.parse_string()?;
            self.skip_ws();
            if self.bump() != Some(b':') {
                return Err("expected ':'".to_string());
            }
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(b',') => {}
                Some(b'}') => break,
                _ => return Err("expected ',' or '}'".to_string()),
            }
        }
        Ok(JsonValue::Object(map))
    }

    fn consume_bytes(&mut self, expected: &[u8]) -> bool {
        if self.bytes[self.pos..].starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }
}
