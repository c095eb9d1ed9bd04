//! Rendering parsed documents: `ChtmlComponent` walks the node tree of
//! one `.chtml` file, evaluating conditions, loops, interpolations and
//! imports against a scope, and builds a fresh output `Document`.

use std::{fmt::Debug, sync::{Arc, Mutex}};

use anyhow::{Context, Result};
use kstring::KString;

use crate::{component::{check_args, Component, Importer},
            dt,
            elements::Namespace,
            error::{ArgError, Frame, ParseError, RenderError},
            expr::Evaluator,
            html::Markup,
            ident::{canonical_name, canonicalize_expression},
            node::{Attr, Control, Document, NodeData, NodeId, NodeKind},
            parser::TreeBuilder,
            scope::Scope,
            shape::Shape,
            source::{Source, Span},
            template::{Interp, Part, Template},
            value::{Value, Vars}};

/// An `arg` declaration at the top level of a document.
#[derive(Debug, Clone)]
pub struct ArgDecl {
    pub name: KString,
    pub shape: Option<Shape>,
    /// The `<c arg>` node, whose children are the default.
    pub node: NodeId,
    pub has_default: bool,
    pub span: Span,
}

/// Where `<c:attr>` writes to.
enum Target {
    Element(NodeId),
    Args(Vars),
}

struct Ctx {
    out: Document,
    targets: Vec<Target>,
    /// The node whose value is the document's result.
    capture: Option<NodeId>,
    captured: Option<Value>,
}

impl Ctx {
    fn holder(&mut self) -> NodeId {
        self.out.new_node(NodeData::new(NodeKind::Document, "", Namespace::Control,
                                        Span::default()))
    }
}

pub struct ChtmlComponent {
    name: KString,
    source: Arc<Source>,
    doc: Arc<Document>,
    args: Vec<ArgDecl>,
    input_shape: Option<Shape>,
    value_node: Option<NodeId>,
    importer: Arc<dyn Importer>,
    evaluator: Arc<dyn Evaluator>,
    imported: Mutex<Vec<Arc<dyn Component>>>,
}

impl Debug for ChtmlComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("ChtmlComponent({:?}, {:?})",
                                 self.name.as_str(), self.source.path()))
    }
}

/// The interpolation making up all of `t`, ignoring whitespace
/// around it.
fn value_interp(t: &Template) -> Option<&Interp> {
    let mut found = None;
    for part in t.parts() {
        match part {
            Part::Literal(s) if s.trim().is_empty() => (),
            Part::Interp(i) if found.is_none() => found = Some(i),
            _ => return None
        }
    }
    found
}

/// A top level text node consisting of just one interpolation, if it
/// is the only output of the document.
fn find_value_node(doc: &Document) -> Option<NodeId> {
    let mut found = None;
    for c in doc.children(doc.root()) {
        match &doc.get(c).kind {
            NodeKind::Text { whitespace: true, .. }
            | NodeKind::Comment(_)
            | NodeKind::SetAttr { .. }
            | NodeKind::Control(Control::Arg { .. })
            | NodeKind::Control(Control::Var { .. }) => (),
            NodeKind::Text { template, raw: false, .. }
            if found.is_none() && value_interp(template).is_some() => found = Some(c),
            _ => return None
        }
    }
    found
}

fn flush_text(out: &mut Document, parent: NodeId, buf: &mut String) {
    if !buf.is_empty() {
        let s = std::mem::take(buf);
        out.push(parent, NodeData::literal_text(KString::from_string(s)));
    }
}

/// Insert an interpolated value into the output. Markup is copied,
/// arrays are inserted element by element, null is nothing.
fn insert_value(out: &mut Document, parent: NodeId, value: &Value, buf: &mut String) {
    match value {
        Value::Null => (),
        Value::Html(m) => {
            flush_text(out, parent, buf);
            m.copy_into(out, parent);
        }
        Value::Array(items) => for v in items {
            insert_value(out, parent, v, buf)
        },
        v => buf.push_str(&v.to_text()),
    }
}

fn set_attr(attrs: &mut Vec<Attr>, name: &str, value: Option<KString>, append: bool) {
    match attrs.iter_mut().find(|a| a.name == name) {
        Some(a) => {
            let new = match (append, a.value.as_ref().and_then(|t| t.as_literal()), value) {
                (true, Some(old), Some(v)) if !old.is_empty() =>
                    Some(KString::from_string(format!("{old} {v}"))),
                (_, _, v) => v,
            };
            a.value = new.map(Template::literal);
        }
        None => attrs.push(Attr::literal(KString::from_ref(name), value)),
    }
}

impl ChtmlComponent {
    pub fn new(name: impl Into<KString>,
               source: Arc<Source>,
               doc: Document,
               importer: Arc<dyn Importer>,
               evaluator: Arc<dyn Evaluator>) -> ChtmlComponent {
        let mut args = Vec::new();
        for c in doc.children(doc.root()) {
            let d = doc.get(c);
            if let NodeKind::Control(Control::Arg { name, shape }) = &d.kind {
                let has_default = doc.children(c).any(|n| !doc.is_whitespace(n));
                args.push(ArgDecl {
                    name: name.clone(),
                    shape: shape.clone(),
                    node: c,
                    has_default,
                    span: d.span,
                });
            }
        }
        let input_shape = if args.is_empty() {
            None
        } else {
            Some(Shape::object(args.iter().map(
                |a| (a.name.clone(), a.shape.clone().unwrap_or(Shape::Any)))))
        };
        let value_node = find_value_node(&doc);
        ChtmlComponent {
            name: name.into(),
            source,
            doc: Arc::new(doc),
            args,
            input_shape,
            value_node,
            importer,
            evaluator,
            imported: Mutex::new(Vec::new()),
        }
    }

    pub fn parse(name: impl Into<KString>,
                 source: Arc<Source>,
                 importer: Arc<dyn Importer>,
                 evaluator: Arc<dyn Evaluator>) -> Result<ChtmlComponent, ParseError> {
        let doc = TreeBuilder::new(&source).build()?;
        Ok(ChtmlComponent::new(name, source, doc, importer, evaluator))
    }

    pub fn source(&self) -> &Arc<Source> {
        &self.source
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn args(&self) -> &[ArgDecl] {
        &self.args
    }

    fn frame(&self, span: Span) -> Frame {
        Frame::new(&self.name, &self.source, span)
    }

    fn located(&self, e: anyhow::Error, span: Span) -> RenderError {
        RenderError::located(e, Some(self.frame(span)))
    }

    fn eval(&self, expr: &str, span: Span, scope: &Arc<Scope>) -> Result<Value, RenderError> {
        let canon = canonicalize_expression(expr);
        self.evaluator.evaluate(&canon, &scope.vars())
            .with_context(|| format!("evaluating {expr:?}"))
            .map_err(|e| self.located(e, span))
    }

    fn interpolate_string(&self, t: &Template, scope: &Arc<Scope>) -> Result<String, RenderError> {
        let mut s = String::new();
        for part in t.parts() {
            match part {
                Part::Literal(l) => s.push_str(l),
                Part::Interp(i) => s.push_str(&self.eval(&i.expr, i.span, scope)?.to_text()),
            }
        }
        Ok(s)
    }

    /// A single interpolation keeps its value, anything else is a
    /// string.
    fn template_value(&self, t: &Template, scope: &Arc<Scope>) -> Result<Value, RenderError> {
        match t.single_interp() {
            Some(i) => self.eval(&i.expr, i.span, scope),
            None => Ok(Value::from(self.interpolate_string(t, scope)?)),
        }
    }

    fn render_attrs(&self, attrs: &[Attr], scope: &Arc<Scope>) -> Result<Vec<Attr>, RenderError> {
        let mut out = Vec::with_capacity(attrs.len());
        for a in attrs {
            let value = match &a.value {
                None => None,
                Some(t) => match self.template_value(t, scope)? {
                    Value::Null | Value::Bool(false) => continue,
                    Value::Bool(true) => None,
                    v => Some(KString::from_string(v.to_text())),
                }
            };
            out.push(Attr { name: a.name.clone(), value: value.map(Template::literal), span: a.span });
        }
        Ok(out)
    }

    /// Render all children of `parent`, collecting the errors of all
    /// of them.
    fn render_children(&self, ctx: &mut Ctx, parent: NodeId, out_parent: NodeId,
                       scope: &Arc<Scope>) -> Result<(), RenderError> {
        let mut errors = Vec::new();
        for child in self.doc.children(parent) {
            if let Err(e) = self.render_node(ctx, child, out_parent, scope) {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RenderError::aggregate(errors))
        }
    }

    fn render_node(&self, ctx: &mut Ctx, id: NodeId, out_parent: NodeId, scope: &Arc<Scope>)
                   -> Result<(), RenderError> {
        let node = self.doc.get(id);
        if node.prev_cond.is_some() {
            // rendered by the head of its chain
            return Ok(())
        }
        if node.cond.is_none() {
            return self.render_repeated(ctx, id, out_parent, scope)
        }
        let mut cur = Some(id);
        while let Some(c) = cur {
            let n = self.doc.get(c);
            let pass = match n.cond.as_ref().and_then(|cond| cond.expr.as_ref().map(|e| (e, cond.span))) {
                None => true,
                Some((expr, span)) => self.eval(expr, span, scope)?.is_truthy(),
            };
            if pass {
                return self.render_repeated(ctx, c, out_parent, &scope.spawn_branch())
            }
            cur = n.next_cond;
        }
        Ok(())
    }

    fn render_repeated(&self, ctx: &mut Ctx, id: NodeId, out_parent: NodeId, scope: &Arc<Scope>)
                       -> Result<(), RenderError> {
        let node = self.doc.get(id);
        let l = match &node.for_loop {
            None => return self.render_single(ctx, id, out_parent, scope),
            Some(l) => l,
        };
        let iterations: Vec<(Value, Value)> = match self.eval(&l.expr, l.span, scope)? {
            Value::Array(items) => items.into_iter().enumerate()
                .map(|(i, v)| (Value::Number(i as f64), v))
                .collect(),
            Value::Object(m) => m.into_iter()
                .map(|(k, v)| (Value::String(k), v))
                .collect(),
            v => return Err(self.located(
                anyhow::anyhow!("can't iterate over {} (in loop over {:?})",
                                v.type_name(), l.expr.as_str()),
                l.span)),
        };
        let mut errors = Vec::new();
        for (index, value) in iterations {
            let mut vars = Vars::new();
            vars.insert(l.value_var.clone(), value);
            if let Some(index_var) = &l.index_var {
                vars.insert(index_var.clone(), index);
            }
            let iteration = scope.spawn_inherit(vars);
            if let Err(e) = self.render_single(ctx, id, out_parent, &iteration) {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RenderError::aggregate(errors))
        }
    }

    fn render_single(&self, ctx: &mut Ctx, id: NodeId, out_parent: NodeId, scope: &Arc<Scope>)
                     -> Result<(), RenderError> {
        let node = self.doc.get(id);
        match &node.kind {
            NodeKind::Document => self.render_children(ctx, id, out_parent, scope),
            NodeKind::Element => {
                let attrs = self.render_attrs(&node.attrs, scope)?;
                let mut data = NodeData::new(NodeKind::Element, node.name.clone(),
                                             node.namespace, node.span);
                data.attrs = attrs;
                let el = ctx.out.push(out_parent, data);
                ctx.targets.push(Target::Element(el));
                let r = self.render_children(ctx, id, el, scope);
                ctx.targets.pop();
                r
            }
            NodeKind::Text { template, whitespace, raw } => {
                if *raw || *whitespace {
                    ctx.out.push(out_parent, NodeData::new(node.kind.clone(), "",
                                                           node.namespace, node.span));
                    return Ok(())
                }
                if ctx.capture == Some(id) {
                    if let Some(i) = value_interp(template) {
                        ctx.captured = Some(self.eval(&i.expr, i.span, scope)?);
                        return Ok(())
                    }
                }
                let mut buf = String::new();
                for part in template.parts() {
                    match part {
                        Part::Literal(l) => buf.push_str(l),
                        Part::Interp(i) => {
                            let v = self.eval(&i.expr, i.span, scope)?;
                            insert_value(&mut ctx.out, out_parent, &v, &mut buf);
                        }
                    }
                }
                flush_text(&mut ctx.out, out_parent, &mut buf);
                Ok(())
            }
            NodeKind::Comment(_) | NodeKind::Doctype(_) => {
                ctx.out.push(out_parent, NodeData::new(node.kind.clone(), "",
                                                       node.namespace, node.span));
                Ok(())
            }
            // transparent, so a `var` inside binds next to the container
            NodeKind::Control(Control::Passthrough) =>
                self.render_children(ctx, id, out_parent, &scope.spawn_branch()),
            NodeKind::Control(Control::Var { name, shape }) => {
                let value = self.container_value(ctx, id, &scope.spawn_inherit(Vars::new()))?;
                let value = match shape {
                    Some(shape) => shape.cast(value)
                        .with_context(|| format!("var {name}"))
                        .map_err(|e| self.located(e, node.span))?,
                    None => value,
                };
                scope.bind(name.clone(), value);
                Ok(())
            }
            // bound before rendering starts
            NodeKind::Control(Control::Arg { .. }) => Ok(()),
            NodeKind::SetAttr { name, append } => {
                let value = self.container_value(ctx, id, scope)?;
                let text = match value {
                    Value::Null | Value::Bool(false) => None,
                    Value::Bool(true) => Some(KString::default()),
                    v => Some(KString::from_string(v.to_text())),
                };
                match ctx.targets.last_mut() {
                    Some(Target::Element(el)) => {
                        let el = *el;
                        match text {
                            Some(t) => set_attr(&mut ctx.out.get_mut(el).attrs, name,
                                                if t.is_empty() && !*append { None } else { Some(t) },
                                                *append),
                            None => ctx.out.get_mut(el).attrs.retain(|a| a.name != name.as_str()),
                        }
                    }
                    Some(Target::Args(args)) => {
                        let key = canonical_name(name);
                        let old = args.get(&key).map(|v| v.to_text()).filter(|s| !s.is_empty());
                        match (text, *append, old) {
                            (Some(t), true, Some(old)) => {
                                args.insert(key, Value::from(format!("{old} {t}")));
                            }
                            (Some(t), _, _) => { args.insert(key, Value::String(t)); }
                            (None, _, _) => { args.remove(&key); }
                        }
                    }
                    // no-op at the top level
                    None => (),
                }
                Ok(())
            }
            NodeKind::Import => self.render_import(ctx, id, out_parent, scope),
        }
    }

    /// The value of a `var`, `arg` or `c:attr` body: the raw value of a
    /// lone interpolation, the text of lone literal text, markup
    /// otherwise.
    fn container_value(&self, ctx: &mut Ctx, id: NodeId, scope: &Arc<Scope>)
                       -> Result<Value, RenderError> {
        let significant: Vec<NodeId> = self.doc.children(id)
            .filter(|c| !self.doc.is_whitespace(*c)
                    && !matches!(self.doc.get(*c).kind, NodeKind::Comment(_)))
            .collect();
        if let [only] = significant.as_slice() {
            if let NodeKind::Text { template, raw: false, .. } = &self.doc.get(*only).kind {
                if let Some(i) = value_interp(template) {
                    return self.eval(&i.expr, i.span, scope)
                }
                if let Some(s) = template.as_literal() {
                    return Ok(Value::str(s.trim()))
                }
            }
        }
        if significant.is_empty() {
            return Ok(Value::str(""))
        }
        let holder = ctx.holder();
        self.render_children(ctx, id, holder, scope)?;
        Ok(Value::Html(Markup::from_document(ctx.out.children_document(holder))))
    }

    fn render_import(&self, ctx: &mut Ctx, id: NodeId, out_parent: NodeId, scope: &Arc<Scope>)
                     -> Result<(), RenderError> {
        let node = self.doc.get(id);
        dt!("render_import", node.name.as_str());
        let component = self.importer.import(&node.name, Some(self.source.path()))
            .map_err(|e| self.located(e.into(), node.span))?;

        let mut args = Vars::new();
        for a in &node.attrs {
            let value = match &a.value {
                // bare attributes cast to bool true
                None => Value::str(""),
                Some(t) => self.template_value(t, scope)?,
            };
            args.insert(canonical_name(&a.name), value);
        }

        // the body is rendered in our scope
        ctx.targets.push(Target::Args(args));
        let holder = ctx.holder();
        let body = self.render_children(ctx, id, holder, scope);
        let mut args = match ctx.targets.pop() {
            Some(Target::Args(args)) => args,
            _ => Vars::new(),
        };
        body?;
        let has_body = ctx.out.children(holder).any(|c| !ctx.out.is_whitespace(c));
        if has_body {
            args.insert(KString::from_static("_"),
                        Value::Html(Markup::from_document(ctx.out.children_document(holder))));
        }

        if let Some(shape) = component.input_shape() {
            check_args(component.name(), &shape, &args)
                .map_err(|e| self.located(e.into(), node.span))?;
        }
        let value = component.render(&scope.spawn(args))
            .map_err(|e| self.located(e, node.span))?;
        {
            let mut imported = self.imported.lock().expect("never poisoned");
            let ptr = Arc::as_ptr(&component) as *const ();
            if !imported.iter().any(|c| Arc::as_ptr(c) as *const () == ptr) {
                imported.push(component);
            }
        }
        let mut buf = String::new();
        insert_value(&mut ctx.out, out_parent, &value, &mut buf);
        flush_text(&mut ctx.out, out_parent, &mut buf);
        Ok(())
    }

    /// Check, cast and bind the arguments into `scope`; missing
    /// arguments get their default.
    fn bind_args(&self, ctx: &mut Ctx, given: &Vars, scope: &Arc<Scope>)
                 -> Result<(), RenderError> {
        if let Some(shape) = &self.input_shape {
            check_args(&self.name, shape, given).map_err(|e| RenderError::located(e.into(), None))?;
        }
        for decl in &self.args {
            let value = match given.get(&decl.name) {
                Some(v) => v.clone(),
                None if decl.has_default => self.container_value(ctx, decl.node, scope)?,
                None => return Err(self.located(ArgError::Missing {
                    component: self.name.clone(),
                    name: decl.name.clone(),
                }.into(), decl.span)),
            };
            let value = match &decl.shape {
                Some(shape) => shape.cast(value).map_err(|source| self.located(ArgError::Cast {
                    component: self.name.clone(),
                    name: decl.name.clone(),
                    source,
                }.into(), decl.span))?,
                None => value,
            };
            scope.bind(decl.name.clone(), value);
        }
        if !given.contains_key("_") {
            scope.bind(KString::from_static("_"), Value::Html(Markup::empty()));
        }
        Ok(())
    }
}

impl Component for ChtmlComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, scope: &Arc<Scope>) -> Result<Value> {
        dt!("render", self.name.as_str());
        let mut ctx = Ctx {
            out: Document::new(),
            targets: Vec::new(),
            capture: self.value_node,
            captured: None,
        };
        let given = scope.vars();
        let local = scope.spawn_inherit(Vars::new());
        self.bind_args(&mut ctx, &given, &local)?;
        let root = ctx.out.root();
        self.render_children(&mut ctx, self.doc.root(), root, &local)?;
        if let Some(v) = ctx.captured.take() {
            return Ok(v)
        }
        Ok(Value::Html(Markup::from_document(ctx.out)))
    }

    fn dispose(&self) -> Result<()> {
        let imported = std::mem::take(&mut *self.imported.lock().expect("never poisoned"));
        let mut errors = Vec::new();
        for c in imported {
            if let Err(e) = c.dispose() {
                errors.push(RenderError::located(e, None));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RenderError::aggregate(errors).into())
        }
    }

    fn input_shape(&self) -> Option<Shape> {
        self.input_shape.clone()
    }
}

/// The text a render result is sent as: HTML for markup, the plain
/// text of anything else.
pub fn output_string(value: &Value) -> Result<String> {
    match value {
        Value::Html(m) => m.to_html_string(),
        v => Ok(v.to_text()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{component::FnComponent,
                error::{error_records, ErrorKind, ImportError},
                expr::ExprEvaluator,
                value::vars};
    use std::path::Path;

    #[derive(Debug, Default)]
    struct TestImporter {
        components: Vec<(KString, Arc<dyn Component>)>,
    }

    impl Importer for TestImporter {
        fn import(&self, name: &str, _from: Option<&Path>)
                  -> Result<Arc<dyn Component>, ImportError> {
            self.components.iter().find(|(n, _)| n == name)
                .map(|(_, c)| c.clone())
                .ok_or_else(|| ImportError::NotFound { name: KString::from_ref(name) })
        }
    }

    fn component(name: &str, text: &str, importer: Arc<dyn Importer>) -> Arc<ChtmlComponent> {
        let source = Arc::new(Source::new(format!("{name}.chtml"), text));
        Arc::new(ChtmlComponent::parse(name, source, importer,
                                       Arc::new(ExprEvaluator::new())).unwrap())
    }

    fn render_with(text: &str, importer: Arc<dyn Importer>, vars: Vars) -> Result<String> {
        let c = component("page", text, importer);
        output_string(&c.render(&Scope::root(vars))?)
    }

    fn render(text: &str) -> String {
        render_with(text, Arc::new(TestImporter::default()), Vars::new()).unwrap()
    }

    #[test]
    fn t_conditions() {
        assert_eq!(render("<p c:if=\"true\">A</p><p c:else>B</p>"), "<p>A</p>");
        assert_eq!(render("<p c:if=\"false\">A</p><p c:else>B</p>"), "<p>B</p>");
        assert_eq!(render("<p c:if=\"1 > 2\">A</p>\n<p c:else-if=\"2 > 1\">B</p>\n<p c:else>C</p>"),
                   "\n<p>B</p>\n");
        assert_eq!(render("<p c:if=\"\">A</p>"), "<p>A</p>");
        assert_eq!(render("<c if=\"false\">A</c><c else>B</c>"), "B");
    }

    #[test]
    fn t_loops() {
        assert_eq!(render("<li c:for=\"x in [1,2,3]\">${x}</li>"),
                   "<li>1</li><li>2</li><li>3</li>");
        assert_eq!(render("<c for=\"k, v in {a: 1, b: 2}\">${k}=${v};</c>"), "a=1;b=2;");
        assert_eq!(render("<li c:for=\"i, x in ['a', 'b']\">${i}${x}</li>"),
                   "<li>0a</li><li>1b</li>");
        assert_eq!(render("<ul><li c:for=\"x in []\">${x}</li></ul>"), "<ul></ul>");
        let e = render_with("<p c:for=\"x in 3\">${x}</p>", Arc::new(TestImporter::default()),
                            Vars::new()).unwrap_err();
        assert!(e.to_string().contains("can't iterate over number"));
    }

    #[test]
    fn t_vars_and_values() {
        assert_eq!(render("<c var=\"n number\">42</c>${n+1}"), "43");
        assert_eq!(render("<c var=\"items\">${[1, 2]}</c><i c:for=\"x in items\">${x}</i>"),
                   "<i>1</i><i>2</i>");
        assert_eq!(render("<c var=\"b\"><b>bold</b></c><p>${b}</p>"), "<p><b>bold</b></p>");
        assert_eq!(render("<p c:if=\"true\"><c var=\"x\">1</c></p>${x}"), "<p></p>1");
        assert_eq!(render("<c><c var=\"x\">1</c></c>${x}"), "1");
        assert_eq!(render("<c if=\"true\"><c var=\"x\">2</c></c>${x}"), "2");
        assert_eq!(render("<c if=\"false\">A</c><c else><c var=\"x\">3</c></c>${x}"), "3");
        // visible to later siblings of the same iteration only
        assert_eq!(render("<li c:for=\"v in [1, 2]\"><c var=\"y\">${v * 10}</c>${y}</li>"),
                   "<li>10</li><li>20</li>");
        assert_eq!(render("<c for=\"v in [1, 2]\"><c var=\"y\">${v}</c>[${y}]</c>"),
                   "[1][2]");
        assert!(render_with("<c for=\"v in [1]\"><c var=\"y\">1</c></c>${y}",
                            Arc::new(TestImporter::default()), Vars::new()).is_err());
        let e = render_with("<c var=\"n number\">abc</c>", Arc::new(TestImporter::default()),
                            Vars::new()).unwrap_err();
        assert_eq!(error_records(&e)[0].kind, ErrorKind::Cast);
    }

    #[test]
    fn t_interpolation() {
        let v = vars([("name", Value::from("<you>")), ("someArg", Value::Null)]);
        assert_eq!(render_with("<p title=\"hi ${name}\">Hello ${name}!</p>",
                               Arc::new(TestImporter::default()), v).unwrap(),
                   "<p title=\"hi &lt;you&gt;\">Hello &lt;you&gt;!</p>");
        assert_eq!(render("<input disabled=\"${false}\" checked=\"${true}\">"), "<input checked>");
        assert_eq!(render("<script>if (a < b) {}</script>"), "<script>if (a < b) {}</script>");
        assert_eq!(render("<p>${['a', 'b']}</p>"), "<p>ab</p>");
        let c = component("v", " ${ {a: 1} } ", Arc::new(TestImporter::default()));
        let v = c.render(&Scope::root(Vars::new())).unwrap();
        assert_eq!(v.get("a"), Some(&Value::from(1.)));
    }

    #[test]
    fn t_imports() {
        let mut importer = TestImporter::default();
        let card = component("card", "<c arg=\"title string\"></c>\
                                      <c arg=\"someFlag bool\">${false}</c>\
                                      <div class=\"card\" data-flag=\"${some_flag}\">\
                                      <h2>${title}</h2>${_}</div>",
                             Arc::new(TestImporter::default()));
        importer.components.push(("card".into(), card));
        importer.components.push(("shout".into(), Arc::new(FnComponent::new(
            "shout", |scope: &Arc<Scope>| {
                let s = scope.get("_").map(|v| v.to_text()).unwrap_or_default();
                Ok(Value::from(s.to_uppercase()))
            }))));
        let importer: Arc<dyn Importer> = Arc::new(importer);
        assert_eq!(
            render_with("<c:card title=\"T\" some-flag><p>body</p></c:card>",
                        importer.clone(), Vars::new()).unwrap(),
            "<div class=\"card\" data-flag><h2>T</h2><p>body</p></div>");
        assert_eq!(
            render_with("<c:card><c:attr name=\"title\">From attr</c:attr></c:card>",
                        importer.clone(), Vars::new()).unwrap(),
            "<div class=\"card\"><h2>From attr</h2></div>");
        assert_eq!(
            render_with("<c:card title=\"A\"><c:attr name=\"title\" append>B</c:attr></c:card>",
                        importer.clone(), Vars::new()).unwrap(),
            "<div class=\"card\"><h2>A B</h2></div>");
        assert_eq!(
            render_with("<c:card><c:attr name=\"title\" append>B</c:attr></c:card>",
                        importer.clone(), Vars::new()).unwrap(),
            "<div class=\"card\"><h2>B</h2></div>");
        // null removes the argument
        let e = render_with("<c:card title=\"A\"><c:attr name=\"title\">${null}</c:attr></c:card>",
                            importer.clone(), Vars::new()).unwrap_err();
        assert_eq!(error_records(&e)[0].kind, ErrorKind::MissingArgument);
        assert_eq!(render_with("<c:shout>hey ${1+1}</c:shout>", importer.clone(), Vars::new())
                   .unwrap(), "HEY 2");

        let e = render_with("<c:card title=\"T\" age=\"3\"></c:card>",
                            importer.clone(), Vars::new()).unwrap_err();
        assert_eq!(error_records(&e)[0].kind, ErrorKind::UnrecognizedArgument);
        assert!(e.to_string().contains("\"age\""));

        let e = render_with("<c:card></c:card>", importer.clone(), Vars::new()).unwrap_err();
        assert_eq!(error_records(&e)[0].kind, ErrorKind::MissingArgument);

        let e = render_with("<p>\n<c:nope></c:nope></p>", importer, Vars::new()).unwrap_err();
        assert_eq!(error_records(&e)[0].kind, ErrorKind::NotFound);
        let re = e.downcast_ref::<RenderError>().unwrap();
        let records = re.records();
        assert_eq!(records[0].stack[0].line, 2);
    }

    #[test]
    fn t_set_attr() {
        assert_eq!(render("<p class=\"a\"><c:attr name=\"class\" append>b</c:attr>x</p>"),
                   "<p class=\"a b\">x</p>");
        assert_eq!(render("<p class=\"a\"><c:attr name=\"class\">b</c:attr></p>"),
                   "<p class=\"b\"></p>");
        assert_eq!(render("<c:attr name=\"x\">1</c:attr>ok"), "ok");
    }

    #[test]
    fn t_errors_aggregate() {
        let e = render_with("<p>${nope1}</p><p>${nope2}</p>", Arc::new(TestImporter::default()),
                            Vars::new()).unwrap_err();
        let re = e.downcast_ref::<RenderError>().unwrap();
        let records = re.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.kind == ErrorKind::Eval));
        assert_eq!(records[1].stack[0].path.as_str(), "page");
        assert_eq!(records[1].stack[0].column, 19);
    }

    #[test]
    fn t_identifier_normalization() {
        let v = vars([("some_arg_1", Value::from("x"))]);
        assert_eq!(render_with("<p>${someArg1}${some_arg_1}</p>",
                               Arc::new(TestImporter::default()), v).unwrap(),
                   "<p>xx</p>");
        let mut importer = TestImporter::default();
        importer.components.push(("echo".into(), component(
            "echo", "<c arg=\"someArg1\"></c><b>${someArg1}</b>",
            Arc::new(TestImporter::default()))));
        let importer: Arc<dyn Importer> = Arc::new(importer);
        for attr in ["some-arg-1", "someArg1", "some_arg_1"] {
            assert_eq!(render_with(&format!("<c:echo {attr}=\"y\"></c:echo>"),
                                   importer.clone(), Vars::new()).unwrap(),
                       "<b>y</b>");
        }
    }
}
