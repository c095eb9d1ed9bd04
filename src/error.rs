//! Error types shared between parsing, loading and rendering, and the
//! structured error records handed to fallback components.

use std::{fmt::Display, path::PathBuf};

use itertools::Itertools;
use kstring::KString;
use serde::Serialize;
use strum::AsRefStr;
use thiserror::Error;

use crate::{def_boxed_thiserror,
            shape::CastError,
            source::{Position, Source, SourceLine, Span},
            value::Value};

/// Lines of context on each side in diagnostics.
pub const CONTEXT_RADIUS: u32 = 2;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}:{}:{}: {message}", .file.display(), .position.line, .position.column)]
pub struct ParseError {
    pub file: PathBuf,
    pub position: Position,
    pub length: u32,
    pub message: String,
    pub context: Vec<SourceLine>,
}

impl ParseError {
    pub fn new(source: &Source, span: Span, message: impl Into<String>) -> ParseError {
        let position = source.position(span.start);
        ParseError {
            file: source.path().to_owned(),
            position,
            length: span.len(),
            message: message.into(),
            context: source.context(position.line, CONTEXT_RADIUS),
        }
    }

    pub fn frame(&self) -> Frame {
        Frame {
            path: KString::from_static("(parse)"),
            file: self.file.to_string_lossy().into(),
            line: self.position.line,
            column: self.position.column,
            length: self.length,
            source: self.context.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("component not found: {name:?}")]
    NotFound { name: KString },
    #[error("failed to load component {name:?}")]
    Failed {
        name: KString,
        #[source]
        source: anyhow::Error,
    },
}

/// A fragment was asked for that the output doesn't contain.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("no element with id {id:?} in the output of {component:?}")]
pub struct FragmentNotFound {
    pub component: KString,
    pub id: KString,
}

impl ImportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ImportError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum ArgError {
    #[error("unrecognized argument {name:?} for component {component:?}")]
    Unrecognized { component: KString, name: KString },
    #[error("missing argument {name:?} for component {component:?}")]
    Missing { component: KString, name: KString },
    #[error("argument {name:?} for component {component:?}")]
    Cast {
        component: KString,
        name: KString,
        #[source]
        source: CastError,
    },
}

/// One step of the location stack of a render error, innermost first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    /// The component (import name) being rendered.
    pub path: KString,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub length: u32,
    pub source: Vec<SourceLine>,
}

impl Frame {
    pub fn new(path: &str, source: &Source, span: Span) -> Frame {
        let pos = source.position(span.start);
        Frame {
            path: KString::from_ref(path),
            file: source.path().to_string_lossy().into(),
            line: pos.line,
            column: pos.column,
            length: span.len(),
            source: source.context(pos.line, CONTEXT_RADIUS),
        }
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{}:{})", self.path, self.file, self.line, self.column)
    }
}

def_boxed_thiserror!(RenderError, pub enum RenderErrorKind {
    #[error("{cause:#}")]
    Located {
        cause: anyhow::Error,
        frames: Vec<Frame>,
    },
    #[error("{} errors: {}", .0.len(), .0.iter().map(|e| e.to_string()).join("; "))]
    Aggregate(Vec<RenderError>),
});

impl RenderError {
    /// Wrap `cause`, or if it already is a render error, add the frame
    /// to it.
    pub fn located(cause: anyhow::Error, frame: Option<Frame>) -> RenderError {
        match cause.downcast::<RenderError>() {
            Ok(mut e) => {
                if let Some(frame) = frame {
                    e.push_frame(frame);
                }
                e
            }
            Err(cause) => RenderError(Box::new(RenderErrorKind::Located {
                cause,
                frames: frame.into_iter().collect(),
            }))
        }
    }

    pub fn push_frame(&mut self, frame: Frame) {
        match &mut **self {
            RenderErrorKind::Located { frames, .. } => {
                if frames.last() != Some(&frame) {
                    frames.push(frame)
                }
            }
            RenderErrorKind::Aggregate(errs) => for e in errs {
                e.push_frame(frame.clone())
            }
        }
    }

    /// Combine, flattening nested aggregates; a single error is
    /// returned as is.
    pub fn aggregate(errs: Vec<RenderError>) -> RenderError {
        let mut flat = Vec::with_capacity(errs.len());
        for e in errs {
            match e.into_kind() {
                RenderErrorKind::Aggregate(inner) => flat.extend(inner),
                kind => flat.push(RenderError(Box::new(kind))),
            }
        }
        if flat.len() == 1 {
            flat.pop().expect("len checked")
        } else {
            RenderError(Box::new(RenderErrorKind::Aggregate(flat)))
        }
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        match &**self {
            RenderErrorKind::Located { cause, frames } =>
                vec![ErrorRecord::new(cause, frames.clone())],
            RenderErrorKind::Aggregate(errs) =>
                errs.iter().flat_map(|e| e.records()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    Parse,
    NotFound,
    Import,
    UnrecognizedArgument,
    MissingArgument,
    Cast,
    Eval,
    Route,
    Render,
}

impl ErrorKind {
    /// The innermost classifiable error in the chain decides.
    pub fn of(err: &anyhow::Error) -> ErrorKind {
        let mut kind = ErrorKind::Render;
        for e in err.chain() {
            if let Some(k) = ErrorKind::of_single(e) {
                kind = k;
            }
        }
        kind
    }

    fn of_single(e: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
        if e.is::<ParseError>() {
            Some(ErrorKind::Parse)
        } else if let Some(e) = e.downcast_ref::<ImportError>() {
            Some(if e.is_not_found() { ErrorKind::NotFound } else { ErrorKind::Import })
        } else if e.is::<FragmentNotFound>() {
            Some(ErrorKind::NotFound)
        } else if let Some(e) = e.downcast_ref::<ArgError>() {
            Some(match e {
                ArgError::Unrecognized { .. } => ErrorKind::UnrecognizedArgument,
                ArgError::Missing { .. } => ErrorKind::MissingArgument,
                ArgError::Cast { .. } => ErrorKind::Cast,
            })
        } else if e.is::<CastError>() {
            Some(ErrorKind::Cast)
        } else if e.is::<crate::expr::EvalError>() {
            Some(ErrorKind::Eval)
        } else if e.is::<crate::router::RouteError>() {
            Some(ErrorKind::Route)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub stack: Vec<Frame>,
}

impl ErrorRecord {
    pub fn new(cause: &anyhow::Error, mut stack: Vec<Frame>) -> ErrorRecord {
        // a parse error knows its own location
        if let Some(pe) = cause.chain().find_map(|e| e.downcast_ref::<ParseError>()) {
            stack.insert(0, pe.frame());
        }
        ErrorRecord {
            kind: ErrorKind::of(cause),
            message: cause.root_cause().to_string(),
            stack,
        }
    }

    pub fn to_value(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(j) => Value::from_json(j),
            Err(_) => Value::Null,
        }
    }
}

/// Records for any error; render errors contribute their location
/// stacks.
pub fn error_records(err: &anyhow::Error) -> Vec<ErrorRecord> {
    match err.chain().find_map(|e| e.downcast_ref::<RenderError>()) {
        Some(re) => re.records(),
        None => vec![ErrorRecord::new(err, Vec::new())],
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn src() -> Source {
        Source::new("page.chtml", "<p>\n  ${x}\n</p>\n")
    }

    #[test]
    fn t_parse_error() {
        let e = ParseError::new(&src(), Span::new(6, 10), "bad");
        assert_eq!(e.to_string(), "page.chtml:2:3: bad");
        assert_eq!(e.length, 4);
        assert_eq!(e.context.len(), 4);
    }

    #[test]
    fn t_frames_accumulate() {
        let s = src();
        let e = RenderError::located(anyhow!("boom"), Some(Frame::new("inner", &s, Span::new(6, 10))));
        let e = RenderError::located(e.into(), Some(Frame::new("outer", &s, Span::new(0, 3))));
        let records = e.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "boom");
        assert_eq!(records[0].kind, ErrorKind::Render);
        let paths: Vec<&str> = records[0].stack.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["inner", "outer"]);
        assert_eq!(records[0].stack[0].line, 2);
    }

    #[test]
    fn t_aggregate() {
        let a = RenderError::located(anyhow!("a"), None);
        let b = RenderError::located(
            ImportError::NotFound { name: "x".into() }.into(), None);
        let c = RenderError::located(anyhow!("c"), None);
        let inner = RenderError::aggregate(vec![b, c]);
        let all = RenderError::aggregate(vec![a, inner]);
        let records = all.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].kind, ErrorKind::NotFound);
        assert_eq!(records[1].kind.as_ref(), "not-found");
        assert!(all.to_string().starts_with("3 errors: "));
        let j = serde_json::to_value(&records[1]).unwrap();
        assert_eq!(j["kind"], "not-found");
    }

    #[test]
    fn t_kind_innermost() {
        let cast = crate::shape::Shape::Number.cast(Value::str("x")).unwrap_err();
        let e: anyhow::Error = ArgError::Cast {
            component: "c".into(),
            name: "n".into(),
            source: cast,
        }.into();
        assert_eq!(ErrorKind::of(&e), ErrorKind::Cast);
        let e: anyhow::Error = ArgError::Unrecognized {
            component: "c".into(), name: "age".into()
        }.into();
        assert_eq!(ErrorKind::of(&e), ErrorKind::UnrecognizedArgument);
        let e: anyhow::Error = FragmentNotFound { component: "c".into(), id: "x".into() }.into();
        assert_eq!(ErrorKind::of(&e), ErrorKind::NotFound);
    }
}
