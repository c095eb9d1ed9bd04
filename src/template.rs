//! Expression templates: text or attribute values split into literal
//! spans and `${...}` interpolations. The interpolated expressions
//! are kept as source strings and only evaluated at render time.

use kstring::KString;
use thiserror::Error;

use crate::source::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Interp {
    pub expr: KString,
    /// Span of the whole `${...}`.
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Literal(KString),
    Interp(Interp),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    parts: Vec<Part>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated interpolation, missing '}}'")]
    Unterminated { offset: usize },
    #[error("empty interpolation '${{}}'")]
    Empty { offset: usize, len: usize },
}

impl TemplateError {
    pub fn offset(&self) -> usize {
        match self {
            TemplateError::Unterminated { offset } => *offset,
            TemplateError::Empty { offset, .. } => *offset,
        }
    }
}

/// `s[i..]` must start with `${`. Returns the index just behind the
/// closing `}`. Nested braces and quoted strings inside the
/// expression are skipped over.
pub fn scan_interpolation(s: &str, i: usize) -> Result<usize, TemplateError> {
    let bytes = s.as_bytes();
    debug_assert!(bytes.get(i) == Some(&b'$') && bytes.get(i + 1) == Some(&b'{'));
    let mut depth = 0u32;
    let mut j = i + 2;
    while j < bytes.len() {
        match bytes[j] {
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    if s[i + 2..j].trim().is_empty() {
                        return Err(TemplateError::Empty { offset: i, len: j + 1 - i })
                    }
                    return Ok(j + 1)
                }
                depth -= 1;
            }
            q @ (b'"' | b'\'' | b'`') => {
                j += 1;
                while j < bytes.len() && bytes[j] != q {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
            }
            _ => ()
        }
        j += 1;
    }
    Err(TemplateError::Unterminated { offset: i })
}

/// Accumulates literal text and interpolations in order.
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    parts: Vec<Part>,
    lit: String,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push_char(&mut self, c: char) {
        self.lit.push(c)
    }
    pub fn push_str(&mut self, s: &str) {
        self.lit.push_str(s)
    }
    fn flush(&mut self) {
        if !self.lit.is_empty() {
            let lit = std::mem::take(&mut self.lit);
            self.parts.push(Part::Literal(KString::from_string(lit)));
        }
    }
    pub fn push_interp(&mut self, expr: &str, span: Span) {
        self.flush();
        self.parts.push(Part::Interp(Interp {
            expr: KString::from_ref(expr.trim()),
            span
        }));
    }
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty() && self.lit.is_empty()
    }
    pub fn finish(mut self) -> Template {
        self.flush();
        Template { parts: self.parts }
    }
}

impl Template {
    pub fn literal(s: impl Into<KString>) -> Template {
        let s: KString = s.into();
        if s.is_empty() {
            Template::default()
        } else {
            Template { parts: vec![Part::Literal(s)] }
        }
    }

    /// Parse `s`, which starts at byte `base` of its source (for the
    /// spans). `$${` is a literal `${`. No character references are
    /// decoded here, see the tokenizer for that.
    pub fn parse(s: &str, base: usize) -> Result<Template, TemplateError> {
        let mut b = TemplateBuilder::new();
        let mut i = 0;
        let bytes = s.as_bytes();
        while i < bytes.len() {
            if bytes[i] == b'$' {
                if s[i..].starts_with("$${") {
                    b.push_str("${");
                    i += 3;
                    continue;
                }
                if s[i..].starts_with("${") {
                    let end = scan_interpolation(s, i).map_err(|e| match e {
                        TemplateError::Unterminated { offset } =>
                            TemplateError::Unterminated { offset: offset + base },
                        TemplateError::Empty { offset, len } =>
                            TemplateError::Empty { offset: offset + base, len },
                    })?;
                    b.push_interp(&s[i + 2..end - 1], Span::new(base + i, base + end));
                    i = end;
                    continue;
                }
            }
            let c = s[i..].chars().next().expect("i < len on char boundary");
            b.push_char(c);
            i += c.len_utf8();
        }
        Ok(b.finish())
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Some if there are no interpolations.
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [] => Some(""),
            [Part::Literal(s)] => Some(s.as_str()),
            _ => None
        }
    }

    /// The interpolation if the template consists of exactly one and
    /// nothing else; its value is then used unconverted.
    pub fn single_interp(&self) -> Option<&Interp> {
        match self.parts.as_slice() {
            [Part::Interp(i)] => Some(i),
            _ => None
        }
    }

    /// True if it's literal whitespace (or empty).
    pub fn is_whitespace(&self) -> bool {
        self.parts.iter().all(|p| match p {
            Part::Literal(s) => s.chars().all(char::is_whitespace),
            Part::Interp(_) => false,
        })
    }

    pub fn interps(&self) -> impl Iterator<Item = &Interp> {
        self.parts.iter().filter_map(|p| match p {
            Part::Interp(i) => Some(i),
            Part::Literal(_) => None,
        })
    }

    /// Back to template syntax, for diagnostics.
    pub fn to_source(&self) -> String {
        let mut s = String::new();
        for p in &self.parts {
            match p {
                Part::Literal(l) => s.push_str(&l.replace("${", "$${")),
                Part::Interp(i) => {
                    s.push_str("${");
                    s.push_str(&i.expr);
                    s.push('}');
                }
            }
        }
        s
    }
}
