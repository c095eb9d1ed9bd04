//! Wrapper components: `ErrorBoundary` turns render errors into a
//! fallback rendering with status, `RouteComponent` passes the
//! parameters of a route, `Fragment` keeps one element of the output.

use std::sync::Arc;

use anyhow::Result;
use kstring::KString;

use crate::{component::{check_args, render_fragment, Component},
            elements::Namespace,
            error::{error_records, ErrorKind, ErrorRecord},
            html::Markup,
            node::{Attr, Document, NodeData, NodeId},
            scope::Scope,
            shape::Shape,
            value::{Value, Vars},
            warn};

/// The status for a failed render: 404 if a component wasn't found.
pub fn error_status(records: &[ErrorRecord]) -> u16 {
    if records.iter().any(|r| r.kind == ErrorKind::NotFound) {
        404
    } else {
        500
    }
}

/// Handle `err`: set the status and render `fallback` with `errors`
/// (the error records) and `status`. Without a fallback, `err` is
/// passed on.
pub fn render_fallback(fallback: Option<&Arc<dyn Component>>,
                       scope: &Arc<Scope>,
                       err: anyhow::Error) -> Result<Value> {
    let records = error_records(&err);
    let status = error_status(&records);
    scope.set_status(status);
    let fallback = match fallback {
        Some(f) => f,
        None => return Err(err),
    };
    let mut vars = Vars::new();
    vars.insert(KString::from_static("errors"),
                Value::from(records.iter().map(ErrorRecord::to_value).collect::<Vec<_>>()));
    vars.insert(KString::from_static("status"), Value::from(status as f64));
    match fallback.render(&scope.spawn(vars)) {
        Ok(v) => Ok(v),
        Err(e2) => {
            warn!("fallback {:?} failed: {:#}", fallback.name(), e2);
            let mut all = records;
            all.extend(error_records(&e2));
            Ok(Value::Html(diagnostic_page(status, &all)))
        }
    }
}

#[derive(Debug)]
pub struct ErrorBoundary {
    inner: Arc<dyn Component>,
    fallback: Option<Arc<dyn Component>>,
}

impl ErrorBoundary {
    pub fn new(inner: Arc<dyn Component>, fallback: Option<Arc<dyn Component>>) -> ErrorBoundary {
        ErrorBoundary { inner, fallback }
    }
}

impl Component for ErrorBoundary {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn render(&self, scope: &Arc<Scope>) -> Result<Value> {
        match self.inner.render(scope) {
            Ok(v) => Ok(v),
            Err(e) => render_fallback(self.fallback.as_ref(), scope, e),
        }
    }

    fn dispose(&self) -> Result<()> {
        let r = self.inner.dispose();
        if let Some(f) = &self.fallback {
            f.dispose()?;
        }
        r
    }

    fn input_shape(&self) -> Option<Shape> {
        self.inner.input_shape()
    }
}

fn element(doc: &mut Document, parent: NodeId, name: &'static str, attrs: Vec<Attr>) -> NodeId {
    doc.push(parent, NodeData::element(name, Namespace::Html, attrs))
}

fn text_element(doc: &mut Document, parent: NodeId, name: &'static str, class: &'static str,
                text: String) -> NodeId {
    let attrs = vec![Attr::literal("class", Some(KString::from_static(class)))];
    let e = element(doc, parent, name, attrs);
    doc.push(e, NodeData::literal_text(KString::from_string(text)));
    e
}

/// The page shown when the fallback failed too. Only depends on the
/// records.
pub fn diagnostic_page(status: u16, records: &[ErrorRecord]) -> Markup {
    let mut doc = Document::new();
    let root = doc.root();
    doc.push(root, NodeData::new(crate::node::NodeKind::Doctype(KString::from_static("html")),
                                 "", Namespace::Html, Default::default()));
    let html = element(&mut doc, root, "html", vec![]);
    let head = element(&mut doc, html, "head", vec![]);
    text_element(&mut doc, head, "title", "title", format!("Error {status}"));
    let body = element(&mut doc, html, "body", vec![]);
    text_element(&mut doc, body, "h1", "status", format!("Error {status}"));
    for r in records {
        let div = element(&mut doc, body, "div",
                          vec![Attr::literal("class", Some(KString::from_static("error")))]);
        text_element(&mut doc, div, "p", "message",
                     format!("{}: {}", r.kind.as_ref(), r.message));
        for frame in &r.stack {
            text_element(&mut doc, div, "p", "frame", frame.to_string());
            let lines: String = frame.source.iter()
                .map(|l| format!("{:>5}{} {}\n", l.line,
                                 if l.line == frame.line { ">" } else { " " },
                                 l.text))
                .collect();
            text_element(&mut doc, div, "pre", "source", lines);
        }
    }
    Markup::from_document(doc)
}

/// Renders a routed component with the route parameters as its
/// arguments, on top of the variables of the scope. Components with
/// declared arguments only get the scope variables they declare; the
/// route parameters must all be declared.
#[derive(Debug)]
pub struct RouteComponent {
    inner: Arc<dyn Component>,
    params: Vars,
}

impl RouteComponent {
    pub fn new(inner: Arc<dyn Component>, params: Vars) -> RouteComponent {
        RouteComponent { inner, params }
    }

    pub fn params(&self) -> &Vars {
        &self.params
    }
}

impl Component for RouteComponent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn render(&self, scope: &Arc<Scope>) -> Result<Value> {
        let shape = self.inner.input_shape();
        let mut args: Vars = scope.vars().into_iter()
            .filter(|(k, _)| match &shape {
                Some(shape) => shape.field(k).is_some(),
                None => true,
            })
            .collect();
        if let Some(shape) = &shape {
            check_args(self.inner.name(), shape, &self.params)?;
        }
        args.extend(self.params.clone());
        self.inner.render(&scope.spawn(args))
    }

    fn dispose(&self) -> Result<()> {
        self.inner.dispose()
    }

    fn input_shape(&self) -> Option<Shape> {
        self.inner.input_shape()
    }
}

/// The subtree with the given id of the inner component's output. A
/// missing id is a not-found error, so inside an `ErrorBoundary` it
/// gives status 404 and the fallback.
#[derive(Debug)]
pub struct Fragment {
    inner: Arc<dyn Component>,
    id: KString,
}

impl Fragment {
    pub fn new(inner: Arc<dyn Component>, id: &str) -> Fragment {
        Fragment { inner, id: KString::from_ref(id) }
    }
}

impl Component for Fragment {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn render(&self, scope: &Arc<Scope>) -> Result<Value> {
        render_fragment(&*self.inner, scope, &self.id)
    }

    fn dispose(&self) -> Result<()> {
        self.inner.dispose()
    }

    fn input_shape(&self) -> Option<Shape> {
        self.inner.input_shape()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{component::{FnComponent, NoImports},
                expr::ExprEvaluator,
                interp::{output_string, ChtmlComponent},
                source::Source,
                value::vars};
    use anyhow::anyhow;

    fn chtml(name: &str, text: &str) -> Arc<dyn Component> {
        Arc::new(ChtmlComponent::parse(name, Arc::new(Source::new(format!("{name}.chtml"), text)),
                                       Arc::new(NoImports), Arc::new(ExprEvaluator::new()))
                 .unwrap())
    }

    #[test]
    fn t_passes_success_and_errors_without_fallback() {
        let ok = ErrorBoundary::new(chtml("ok", "<p>fine</p>"), None);
        let scope = Scope::root(Vars::new());
        assert_eq!(output_string(&ok.render(&scope).unwrap()).unwrap(), "<p>fine</p>");
        assert_eq!(scope.response().status, None);

        let bad = ErrorBoundary::new(chtml("bad", "<p>${nope}</p>"), None);
        let scope = Scope::root(Vars::new());
        assert!(bad.render(&scope).is_err());
        assert_eq!(scope.response().status, Some(500));
    }

    #[test]
    fn t_fallback_gets_records() {
        let fallback = chtml("_error", concat!(
            r#"<h1>${status}</h1><p c:for="e in errors">${e.kind}: ${e.message} "#,
            r#"at ${e.stack[0].line}:${e.stack[0].column}</p>"#));
        let page = ErrorBoundary::new(chtml("page", "<div>\n <c:missing/></div>"),
                                      Some(fallback));
        let scope = Scope::root(Vars::new());
        let out = output_string(&page.render(&scope).unwrap()).unwrap();
        assert_eq!(out, "<h1>404</h1><p>not-found: component not found: &quot;missing&quot; at 2:2</p>");
        assert_eq!(scope.response().status, Some(404));
    }

    #[test]
    fn t_failing_fallback_gives_diagnostic_page() {
        let fallback: Arc<dyn Component> = Arc::new(FnComponent::new(
            "_error", |_: &Arc<Scope>| Err(anyhow!("fallback broken"))));
        let page = ErrorBoundary::new(chtml("page", "<p>${1 +}</p>"), Some(fallback));
        let scope = Scope::root(Vars::new());
        let out = output_string(&page.render(&scope).unwrap()).unwrap();
        assert!(out.starts_with("<!DOCTYPE html><html><head><title class=\"title\">Error 500</title>"));
        assert!(out.contains("<p class=\"message\">render: fallback broken</p>"));
        assert!(out.contains("<p class=\"message\">eval: "));
        // deterministic
        let out2 = output_string(&page.render(&Scope::root(Vars::new())).unwrap()).unwrap();
        assert_eq!(out, out2);
    }

    #[test]
    fn t_route_component() {
        let open = RouteComponent::new(chtml("p", "${user_id}/${lang}"),
                                       vars([("user_id", Value::from("42"))]));
        let scope = Scope::root(vars([("lang", Value::from("en"))]));
        assert_eq!(output_string(&open.render(&scope).unwrap()).unwrap(), "42/en");

        let declared = RouteComponent::new(chtml("p", "<c arg=\"user_id number\"/>${user_id + 1}"),
                                           vars([("user_id", Value::from("42"))]));
        assert_eq!(output_string(&declared.render(&scope).unwrap()).unwrap(), "43");

        let undeclared = RouteComponent::new(chtml("p", "<c arg=\"x\"/>${x}"),
                                             vars([("user_id", Value::from("42"))]));
        let e = undeclared.render(&scope).unwrap_err();
        assert_eq!(error_records(&e)[0].kind, ErrorKind::UnrecognizedArgument);
    }

    #[test]
    fn t_fragment_in_boundary() {
        let fallback = chtml("_error", "<h1>${status}</h1>");
        let page = chtml("page", "<div><p id=\"a\">A</p></div>");
        let found = ErrorBoundary::new(Arc::new(Fragment::new(page.clone(), "a")),
                                       Some(fallback.clone()));
        let scope = Scope::root(Vars::new());
        assert_eq!(output_string(&found.render(&scope).unwrap()).unwrap(), "<p id=\"a\">A</p>");
        assert_eq!(scope.response().status, None);

        let missing = ErrorBoundary::new(Arc::new(Fragment::new(page, "b")), Some(fallback));
        let scope = Scope::root(Vars::new());
        assert_eq!(output_string(&missing.render(&scope).unwrap()).unwrap(), "<h1>404</h1>");
        assert_eq!(scope.response().status, Some(404));
    }
}
