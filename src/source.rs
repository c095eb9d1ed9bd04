//! Markup source text with enough indexing to map byte offsets back
//! to line/column, and to cut out context windows for diagnostics.

use std::{path::{Path, PathBuf}, fmt::Debug};

use kstring::KString;
use serde::Serialize;

/// Byte range into a `Source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start: start as u32, end: end.max(start) as u32 }
    }
    pub fn len(&self) -> u32 {
        self.end - self.start
    }
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
    /// Smallest span covering both.
    pub fn join(self, other: Span) -> Span {
        Span { start: self.start.min(other.start), end: self.end.max(other.end) }
    }
}

/// 1-based line and column (column counted in chars).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLine {
    pub line: u32,
    pub text: KString,
}

pub struct Source {
    path: PathBuf,
    text: String,
    // byte offset of the start of each line
    line_starts: Vec<u32>,
}

impl Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("path", &self.path)
            .field("len", &self.text.len())
            .finish()
    }
}

impl Source {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Source {
        let text: String = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Source { path: path.into(), text, line_starts }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn slice(&self, span: Span) -> &str {
        let end = (span.end as usize).min(self.text.len());
        let start = (span.start as usize).min(end);
        self.text.get(start..end).unwrap_or("")
    }

    pub fn position(&self, offset: u32) -> Position {
        let i = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1, // line_starts[0] == 0, thus i >= 1
        };
        let line_start = self.line_starts[i] as usize;
        let offset = (offset as usize).min(self.text.len());
        let column = self.text.get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        Position { line: i as u32 + 1, column: column as u32 + 1 }
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// The text of 1-based `line`, without its line terminator.
    pub fn line(&self, line: u32) -> Option<&str> {
        let i = (line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(i)? as usize;
        let end = self.line_starts.get(i + 1)
            .map(|e| *e as usize)
            .unwrap_or(self.text.len());
        let s = self.text.get(start..end)?;
        Some(s.trim_end_matches(|c| c == '\n' || c == '\r'))
    }

    /// Lines around `line`, `radius` on each side, clipped to the file.
    pub fn context(&self, line: u32, radius: u32) -> Vec<SourceLine> {
        let first = line.saturating_sub(radius).max(1);
        let last = (line + radius).min(self.line_count());
        (first..=last).filter_map(|l| {
            Some(SourceLine {
                line: l,
                text: KString::from_ref(self.line(l)?),
            })
        }).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_position() {
        let s = Source::new("x.chtml", "ab\ncdé\n\nf");
        assert_eq!(s.position(0), Position { line: 1, column: 1 });
        assert_eq!(s.position(3), Position { line: 2, column: 1 });
        assert_eq!(s.position(7), Position { line: 2, column: 4 });
        assert_eq!(s.position(8), Position { line: 3, column: 1 });
        assert_eq!(s.position(9), Position { line: 4, column: 1 });
        assert_eq!(s.position(10), Position { line: 4, column: 2 });
    }

    #[test]
    fn t_context() {
        let s = Source::new("x.chtml", "1\n2\n3\n4\n5\n");
        let c = s.context(2, 2);
        assert_eq!(c.iter().map(|l| l.line).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(c[1].text.as_str(), "2");
        assert_eq!(s.line(6), Some(""));
        assert_eq!(s.line(7), None);
    }
}
