//! Structural shapes: parsing the shape notation, matching values
//! against shapes and casting values into them.
//!
//! Notation: `string`, `number`, `bool`, `html`, `any`, `[T]`,
//! `{name: T, other: T}` (exactly these fields) and `{_: T}` (any
//! keys, all values of shape T).

use std::fmt::{Display, Write as _};

use kstring::KString;
use thiserror::Error;

use crate::{html::Markup,
            value::{Value, Vars, format_number}};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    String,
    Number,
    Bool,
    Html,
    Any,
    Array(Box<Shape>),
    /// Exactly these fields, all required. Kept sorted by name.
    Object(Vec<(KString, Shape)>),
    /// Arbitrary keys, uniform values.
    Map(Box<Shape>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid shape {input:?} at offset {offset}: {message}")]
pub struct ShapeSyntaxError {
    pub input: String,
    pub offset: usize,
    pub message: &'static str,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CastErrorKind {
    #[error("cannot cast {found} {value} to {expected}")]
    Mismatch { expected: String, found: &'static str, value: String },
    #[error("missing field {field:?}")]
    MissingField { field: KString },
    #[error("unexpected field {field:?}")]
    UnexpectedField { field: KString },
}

/// Cast failure, with the path (`.a[2].b`) to the offending part.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct CastError {
    pub path: String,
    pub kind: CastErrorKind,
}

impl Display for CastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} at {}", self.kind, self.path)
        }
    }
}

impl CastError {
    fn mismatch(expected: &Shape, value: &Value) -> CastError {
        let mut shown = value.to_string();
        if shown.chars().count() > 40 {
            shown = shown.chars().take(37).collect::<String>() + "...";
        }
        CastError {
            path: String::new(),
            kind: CastErrorKind::Mismatch {
                expected: expected.to_string(),
                found: value.type_name(),
                value: format!("{shown:?}"),
            }
        }
    }

    fn within(mut self, segment: impl Display) -> CastError {
        self.path = format!("{segment}{}", self.path);
        self
    }
}

struct ShapeParser<'s> {
    input: &'s str,
    pos: usize,
}

impl<'s> ShapeParser<'s> {
    fn error(&self, message: &'static str) -> ShapeSyntaxError {
        ShapeSyntaxError { input: self.input.into(), offset: self.pos, message }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.input[self.pos..].chars().next() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.input[self.pos..].chars().next()
    }

    fn expect(&mut self, c: char, message: &'static str) -> Result<(), ShapeSyntaxError> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn word(&mut self) -> &'s str {
        self.skip_ws();
        let rest = &self.input[self.pos..];
        let len = rest.find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn shape(&mut self) -> Result<Shape, ShapeSyntaxError> {
        match self.peek() {
            Some('[') => {
                self.pos += 1;
                let inner = self.shape()?;
                self.expect(']', "expecting ']'")?;
                Ok(Shape::Array(Box::new(inner)))
            }
            Some('{') => {
                self.pos += 1;
                self.object()
            }
            Some(_) => {
                let start = self.pos;
                let w = self.word();
                match w {
                    "string" | "str" => Ok(Shape::String),
                    "number" | "num" => Ok(Shape::Number),
                    "bool" | "boolean" => Ok(Shape::Bool),
                    "html" => Ok(Shape::Html),
                    "any" => Ok(Shape::Any),
                    _ => {
                        self.pos = start;
                        Err(self.error("unknown shape name"))
                    }
                }
            }
            None => Err(self.error("expecting a shape")),
        }
    }

    // after the '{'
    fn object(&mut self) -> Result<Shape, ShapeSyntaxError> {
        let mut fields: Vec<(KString, Shape)> = Vec::new();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(Shape::Object(fields))
        }
        loop {
            let start = self.pos;
            let name = self.word();
            if name.is_empty() {
                return Err(self.error("expecting a field name"))
            }
            self.expect(':', "expecting ':'")?;
            let shape = self.shape()?;
            if name == "_" {
                if !fields.is_empty() {
                    self.pos = start;
                    return Err(self.error("'_' must be the only field"))
                }
                self.expect('}', "'_' must be the only field")?;
                return Ok(Shape::Map(Box::new(shape)))
            }
            let name = crate::ident::canonical_name(name);
            if fields.iter().any(|(n, _)| *n == name) {
                self.pos = start;
                return Err(self.error("duplicate field"))
            }
            fields.push((name, shape));
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    // trailing comma
                    if self.peek() == Some('}') {
                        self.pos += 1;
                        break
                    }
                }
                Some('}') => {
                    self.pos += 1;
                    break
                }
                _ => return Err(self.error("expecting ',' or '}'"))
            }
        }
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Shape::Object(fields))
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let digits = s.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(s);
    // reject "inf", "NaN" and friends
    if !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

impl Shape {
    pub fn parse(s: &str) -> Result<Shape, ShapeSyntaxError> {
        let mut p = ShapeParser { input: s, pos: 0 };
        let shape = p.shape()?;
        if p.peek().is_some() {
            return Err(p.error("trailing input"))
        }
        Ok(shape)
    }

    /// Object shape with the given fields (names canonicalized).
    pub fn object(fields: impl IntoIterator<Item = (KString, Shape)>) -> Shape {
        let mut fields: Vec<(KString, Shape)> = fields.into_iter()
            .map(|(n, s)| (crate::ident::canonical_name(&n), s))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        fields.dedup_by(|a, b| a.0 == b.0);
        Shape::Object(fields)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Shape::Any)
    }

    /// The shape of field `name` for object shapes.
    pub fn field(&self, name: &str) -> Option<&Shape> {
        match self {
            Shape::Object(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, s)| s),
            Shape::Map(s) => Some(s),
            Shape::Any => Some(&Shape::Any),
            _ => None
        }
    }

    /// Whether `value` conforms without any conversion.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Shape::Any, _) => true,
            (Shape::String, Value::String(_)) => true,
            (Shape::Number, Value::Number(_)) => true,
            (Shape::Bool, Value::Bool(_)) => true,
            (Shape::Html, Value::Html(_)) => true,
            (Shape::Array(s), Value::Array(items)) => items.iter().all(|v| s.matches(v)),
            (Shape::Map(s), Value::Object(m)) => m.values().all(|v| s.matches(v)),
            (Shape::Object(fields), Value::Object(m)) =>
                m.len() == fields.len()
                && fields.iter().all(|(name, s)| m.get(name).map_or(false, |v| s.matches(v))),
            _ => false
        }
    }

    /// Coerce `value` into this shape.
    pub fn cast(&self, value: Value) -> Result<Value, CastError> {
        match (self, value) {
            (Shape::Any, v) => Ok(v),

            (Shape::String, v @ Value::String(_)) => Ok(v),
            (Shape::String, Value::Number(n)) => Ok(Value::String(KString::from_string(format_number(n)))),

            (Shape::Number, v @ Value::Number(_)) => Ok(v),
            (Shape::Number, Value::String(s)) => match parse_number(&s) {
                Some(n) => Ok(Value::Number(n)),
                None => Err(CastError::mismatch(self, &Value::String(s))),
            },
            (Shape::Number, Value::Html(m)) => {
                let text = m.to_plain_string();
                match parse_number(&text) {
                    Some(n) => Ok(Value::Number(n)),
                    None => Err(CastError::mismatch(self, &Value::Html(m))),
                }
            }

            (Shape::Bool, v @ Value::Bool(_)) => Ok(v),
            // presence of a bare attribute
            (Shape::Bool, Value::String(s)) if s.is_empty() => Ok(Value::Bool(true)),

            (Shape::Html, v @ Value::Html(_)) => Ok(v),
            (Shape::Html, Value::String(s)) => Ok(Value::Html(Markup::text(&s))),
            (Shape::Html, Value::Number(n)) => Ok(Value::Html(Markup::text(&format_number(n)))),

            (Shape::Array(s), Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(s.cast(item).map_err(|e| e.within(format_args!("[{i}]")))?);
                }
                Ok(Value::Array(out))
            }

            (Shape::Map(s), Value::Object(m)) => {
                let mut out = Vars::new();
                for (k, v) in m {
                    let v = s.cast(v).map_err(|e| e.within(format_args!(".{k}")))?;
                    out.insert(k, v);
                }
                Ok(Value::Object(out))
            }

            (Shape::Object(fields), Value::Object(mut m)) => {
                let mut out = Vars::new();
                for (name, s) in fields {
                    match m.remove(name) {
                        Some(v) => {
                            let v = s.cast(v).map_err(|e| e.within(format_args!(".{name}")))?;
                            out.insert(name.clone(), v);
                        }
                        None => return Err(CastError {
                            path: String::new(),
                            kind: CastErrorKind::MissingField { field: name.clone() },
                        }),
                    }
                }
                if let Some(extra) = m.into_keys().next() {
                    return Err(CastError {
                        path: String::new(),
                        kind: CastErrorKind::UnexpectedField { field: extra },
                    })
                }
                Ok(Value::Object(out))
            }

            (_, v) => Err(CastError::mismatch(self, &v)),
        }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::String => f.write_str("string"),
            Shape::Number => f.write_str("number"),
            Shape::Bool => f.write_str("bool"),
            Shape::Html => f.write_str("html"),
            Shape::Any => f.write_str("any"),
            Shape::Array(s) => write!(f, "[{s}]"),
            Shape::Map(s) => write!(f, "{{_: {s}}}"),
            Shape::Object(fields) => {
                f.write_char('{')?;
                for (i, (name, s)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {s}")?;
                }
                f.write_char('}')
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sh(s: &str) -> Shape {
        Shape::parse(s).unwrap()
    }

    fn v(j: serde_json::Value) -> Value {
        Value::from_json(j)
    }

    #[test]
    fn t_parse() {
        assert_eq!(sh("string"), Shape::String);
        assert_eq!(sh(" [ number ] "), Shape::Array(Box::new(Shape::Number)));
        assert_eq!(sh("{b: bool, a: [html]}"),
                   Shape::Object(vec![("a".into(), Shape::Array(Box::new(Shape::Html))),
                                      ("b".into(), Shape::Bool)]));
        assert_eq!(sh("{_: any}"), Shape::Map(Box::new(Shape::Any)));
        assert_eq!(sh("{firstName: string,}").to_string(), "{first_name: string}");
        assert_eq!(sh("{}"), Shape::Object(vec![]));
        for bad in ["", "strin", "[number", "{a string}", "{a: string, a: number}",
                    "{a: string, _: number}", "number number"] {
            assert!(Shape::parse(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn t_display_roundtrip() {
        for s in ["string", "[number]", "{a: bool, b: {_: [html]}}", "any"] {
            assert_eq!(sh(s).to_string(), s);
        }
    }

    #[test]
    fn t_matches() {
        let s = sh("{name: string, tags: [string]}");
        assert!(s.matches(&v(json!({"name": "x", "tags": ["a"]}))));
        assert!(!s.matches(&v(json!({"name": "x"}))));
        assert!(!s.matches(&v(json!({"name": "x", "tags": [], "extra": 1}))));
        assert!(!s.matches(&v(json!({"name": 1, "tags": []}))));
        assert!(sh("any").matches(&Value::Null));
        assert!(!sh("bool").matches(&Value::str("")));
    }

    #[test]
    fn t_cast_primitives() {
        assert_eq!(sh("number").cast(Value::str(" 42 ")), Ok(Value::Number(42.)));
        assert_eq!(sh("number").cast(Value::str("-1.5e2")), Ok(Value::Number(-150.)));
        assert!(sh("number").cast(Value::str("abc")).is_err());
        assert!(sh("number").cast(Value::str("inf")).is_err());
        assert_eq!(sh("string").cast(Value::Number(3.)), Ok(Value::str("3")));
        assert_eq!(sh("bool").cast(Value::str("")), Ok(Value::Bool(true)));
        assert!(sh("bool").cast(Value::str("true")).is_err());
        assert!(sh("bool").cast(Value::Number(1.)).is_err());
        assert_eq!(sh("html").cast(Value::str("<b>")).unwrap()
                   .to_json(), json!("&lt;b&gt;"));
        assert_eq!(sh("number").cast(Value::Html(Markup::text("42"))),
                   Ok(Value::Number(42.)));
    }

    #[test]
    fn t_cast_paths() {
        let e = sh("[number]").cast(v(json!(["1", "2", "x"]))).unwrap_err();
        assert_eq!(e.path, "[2]");
        let e = sh("{a: {b: [bool]}}").cast(v(json!({"a": {"b": [true, 1]}}))).unwrap_err();
        assert_eq!(e.path, ".a.b[1]");
        assert!(e.to_string().ends_with("at .a.b[1]"), "{e}");
        let e = sh("{a: number}").cast(v(json!({}))).unwrap_err();
        assert_eq!(e.kind, CastErrorKind::MissingField { field: "a".into() });
        let e = sh("{a: number}").cast(v(json!({"a": 1, "b": 2}))).unwrap_err();
        assert_eq!(e.kind, CastErrorKind::UnexpectedField { field: "b".into() });
        let r = sh("{_: number}").cast(v(json!({"x": "1", "y": 2}))).unwrap();
        assert_eq!(r.to_json(), json!({"x": 1, "y": 2}));
    }

    #[test]
    fn t_cast_idempotent() {
        let cases = [
            ("number", json!("17")),
            ("string", json!(2.5)),
            ("[number]", json!(["1", 2])),
            ("{a: string, b: [number]}", json!({"a": 1, "b": ["3"]})),
            ("{_: string}", json!({"x": 1})),
            ("any", json!({"q": [null]})),
            ("bool", json!("")),
        ];
        for (s, j) in cases {
            let shape = sh(s);
            let once = shape.cast(v(j)).unwrap();
            let twice = shape.cast(once.clone()).unwrap();
            assert_eq!(once, twice, "{s}");
            assert!(shape.matches(&once), "{s}");
        }
    }
}
