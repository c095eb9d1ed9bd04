//! Tree construction: tokens to a `Document`, with the `c:`
//! directives split out into the node fields the interpreter uses.

use kstring::KString;

use crate::{elements::{has_optional_end, implicit_close_barrier, implicitly_closes,
                       is_html_integration_point, is_rcdata, is_raw_text,
                       is_scope_marker, is_void, Namespace},
            error::ParseError,
            ident::canonical_name,
            node::{Attr, Cond, CondKind, Control, Document, Loop, NodeData, NodeId, NodeKind},
            nodt,
            shape::Shape,
            source::{Source, Span},
            template::Template,
            tokenizer::{RawAttr, Token, TokenKind, Tokenizer}};

/// Answers whether an import name can be resolved. Used to report
/// unknown components at parse time; no loading happens.
pub type ImportCheck<'a> = &'a dyn Fn(&str) -> bool;

struct OpenElement {
    id: NodeId,
    /// As used for end tag matching.
    tag: KString,
    namespace: Namespace,
    span: Span,
}

#[derive(Default)]
struct Directives {
    cond: Option<Cond>,
    for_loop: Option<Loop>,
    var: Option<(KString, Option<Shape>, Span)>,
    arg: Option<(KString, Option<Shape>, Span)>,
}

pub struct TreeBuilder<'s> {
    source: &'s Source,
    tokenizer: Tokenizer<'s>,
    doc: Document,
    stack: Vec<OpenElement>,
    import_check: Option<ImportCheck<'s>>,
}

fn is_ident(s: &str) -> bool {
    let mut cs = s.chars();
    match cs.next() {
        Some(c) if c.is_alphabetic() || c == '_' => (),
        _ => return false
    }
    cs.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

impl<'s> TreeBuilder<'s> {
    pub fn new(source: &'s Source) -> TreeBuilder<'s> {
        TreeBuilder {
            source,
            tokenizer: Tokenizer::new(source),
            doc: Document::new(),
            stack: Vec::new(),
            import_check: None,
        }
    }

    pub fn with_import_check(mut self, check: ImportCheck<'s>) -> Self {
        self.import_check = Some(check);
        self
    }

    fn error(&self, span: Span, message: impl Into<String>) -> ParseError {
        ParseError::new(self.source, span, message)
    }

    fn current(&self) -> NodeId {
        self.stack.last().map(|o| o.id).unwrap_or_else(|| self.doc.root())
    }

    /// The namespace new plain elements land in: that of the innermost
    /// non-control element, unless it's an HTML integration point.
    fn context_namespace(&self) -> Namespace {
        for o in self.stack.iter().rev() {
            match o.namespace {
                Namespace::Control => continue,
                Namespace::Html => return Namespace::Html,
                ns => {
                    let name = &self.doc.get(o.id).name;
                    return if is_html_integration_point(ns, name) {
                        Namespace::Html
                    } else {
                        ns
                    }
                }
            }
        }
        Namespace::Html
    }

    pub fn build(mut self) -> Result<Document, ParseError> {
        nodt!("build", self.source.path());
        while let Some(token) = self.tokenizer.next_token()? {
            self.token(token)?;
        }
        for o in self.stack.iter().rev() {
            if !(o.namespace == Namespace::Html && has_optional_end(&o.tag)) {
                return Err(self.error(o.span, format!("unterminated element <{}>", o.tag)))
            }
        }
        Ok(self.doc)
    }

    fn token(&mut self, token: Token) -> Result<(), ParseError> {
        let Token { kind, span } = token;
        match kind {
            TokenKind::StartTag { name, attrs, self_closing } =>
                self.start_tag(name, attrs, self_closing, span)?,
            TokenKind::EndTag { name } => self.end_tag(&name, span)?,
            TokenKind::Text(template) => {
                if !template.is_empty() {
                    let parent = self.current();
                    self.doc.push(parent, NodeData::text(template, span));
                }
            }
            TokenKind::RawText(s) => {
                let parent = self.current();
                let template = Template::literal(s);
                let whitespace = template.is_whitespace();
                self.doc.push(parent, NodeData::new(
                    NodeKind::Text { template, whitespace, raw: true },
                    "", Namespace::Html, span));
            }
            TokenKind::Comment(s) => {
                let parent = self.current();
                self.doc.push(parent, NodeData::new(
                    NodeKind::Comment(s), "", Namespace::Html, span));
            }
            TokenKind::Doctype(s) => {
                let parent = self.current();
                self.doc.push(parent, NodeData::new(
                    NodeKind::Doctype(s), "", Namespace::Html, span));
            }
        }
        Ok(())
    }

    /// Pop HTML elements that `name` implicitly closes.
    fn close_implied(&mut self, name: &str) {
        loop {
            let mut closed = false;
            for i in (0..self.stack.len()).rev() {
                let o = &self.stack[i];
                if o.namespace == Namespace::Html && implicitly_closes(name, &o.tag) {
                    self.stack.truncate(i);
                    closed = true;
                    break
                }
                if is_scope_marker(o.namespace, &o.tag)
                    || (o.namespace == Namespace::Html && implicit_close_barrier(name, &o.tag))
                {
                    break
                }
            }
            if !closed {
                return
            }
        }
    }

    fn directive_expr(&self, attr: &RawAttr) -> Result<Option<KString>, ParseError> {
        match &attr.value {
            None => Ok(None),
            Some(t) => {
                if let Some(s) = t.as_literal() {
                    let s = s.trim();
                    Ok(if s.is_empty() { None } else { Some(KString::from_ref(s)) })
                } else if let Some(i) = t.single_interp() {
                    Ok(Some(i.expr.clone()))
                } else {
                    Err(self.error(attr.span, format!(
                        "the value of {} must be an expression, not a mix of text and \
                         interpolations", attr.name)))
                }
            }
        }
    }

    fn parse_loop(&self, attr: &RawAttr) -> Result<Loop, ParseError> {
        let s = self.directive_expr(attr)?.unwrap_or_default();
        let bad = || self.error(attr.span, format!(
            "invalid loop {:?}, expecting \"NAME in EXPR\" or \"INDEX, NAME in EXPR\"", s.as_str()));
        let (vars, expr) = s.split_once(" in ").ok_or_else(bad)?;
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(bad())
        }
        let names: Vec<&str> = vars.split(',').map(str::trim).collect();
        if !names.iter().all(|n| is_ident(n)) {
            return Err(bad())
        }
        let (index_var, value_var) = match names.as_slice() {
            [v] => (None, canonical_name(v)),
            [i, v] => (Some(canonical_name(i)), canonical_name(v)),
            _ => return Err(bad())
        };
        Ok(Loop { value_var, index_var, expr: KString::from_ref(expr), span: attr.span })
    }

    /// `NAME` or `NAME SHAPE`.
    fn parse_binding(&self, attr: &RawAttr) -> Result<(KString, Option<Shape>, Span), ParseError> {
        let s = attr.value.as_ref().and_then(|t| t.as_literal()).ok_or_else(
            || self.error(attr.span, format!("{} needs a literal \"NAME [SHAPE]\" value",
                                             attr.name)))?;
        let s = s.trim();
        let (name, shape) = match s.find(char::is_whitespace) {
            Some(i) => (&s[..i], s[i..].trim()),
            None => (s, ""),
        };
        if !is_ident(name) {
            return Err(self.error(attr.span, format!("invalid name {name:?} in {}", attr.name)))
        }
        let shape = if shape.is_empty() {
            None
        } else {
            Some(Shape::parse(shape).map_err(
                |e| self.error(attr.span, format!("{} {name}: {e}", attr.name)))?)
        };
        Ok((canonical_name(name), shape, attr.span))
    }

    fn set_cond(&self, d: &mut Directives, kind: CondKind, attr: &RawAttr)
                -> Result<(), ParseError> {
        if d.cond.is_some() {
            return Err(self.error(attr.span, "more than one conditional directive"))
        }
        let expr = match kind {
            CondKind::Else => {
                if attr.value.as_ref().map_or(false, |t| !t.is_empty()) {
                    return Err(self.error(attr.span, "else takes no value"))
                }
                None
            }
            _ => self.directive_expr(attr)?,
        };
        d.cond = Some(Cond { kind, expr, span: attr.span });
        Ok(())
    }

    /// Split directives off `attrs`, returning the rest.
    fn directives(&self, kind: &NodeKind, attrs: Vec<RawAttr>)
                  -> Result<(Directives, Vec<RawAttr>), ParseError> {
        let mut d = Directives::default();
        let mut rest = Vec::new();
        let is_control = matches!(kind, NodeKind::Control(_));
        for attr in attrs {
            let lower = attr.name.to_ascii_lowercase();
            let directive = match lower.strip_prefix("c:") {
                Some(dir) => dir.to_owned(),
                None if is_control => lower.clone(),
                None => {
                    rest.push(attr);
                    continue
                }
            };
            match directive.as_str() {
                "if" => self.set_cond(&mut d, CondKind::If, &attr)?,
                "else-if" | "elseif" => self.set_cond(&mut d, CondKind::ElseIf, &attr)?,
                "else" => self.set_cond(&mut d, CondKind::Else, &attr)?,
                "for" => {
                    if d.for_loop.is_some() {
                        return Err(self.error(attr.span, "duplicate for directive"))
                    }
                    d.for_loop = Some(self.parse_loop(&attr)?);
                }
                "var" if is_control => d.var = Some(self.parse_binding(&attr)?),
                "arg" if is_control => d.arg = Some(self.parse_binding(&attr)?),
                _ if lower.starts_with("c:") => return Err(self.error(
                    attr.span, format!("unknown directive {}", attr.name))),
                _ => return Err(self.error(
                    attr.span, format!("unexpected attribute {} on <c>", attr.name))),
            }
        }
        if let (Some(c), Some(_)) = (&d.cond, &d.for_loop) {
            return Err(self.error(c.span, "for and conditional directives can't be \
                                           combined on the same element"))
        }
        if let (Some(_), Some((_, _, span))) = (&d.var, &d.arg) {
            return Err(self.error(*span, "var and arg can't be combined"))
        }
        if let Some((_, _, span)) = &d.arg {
            if d.cond.is_some() || d.for_loop.is_some() {
                return Err(self.error(*span, "arg declarations can't be conditional or \
                                              repeated"))
            }
            if !self.stack.is_empty() {
                return Err(self.error(*span, "arg declarations are only allowed at the \
                                              top level"))
            }
        }
        Ok((d, rest))
    }

    /// Link an else/else-if node to the preceding conditional sibling.
    fn link_cond(&mut self, id: NodeId, span: Span) -> Result<(), ParseError> {
        let mut prev = self.doc.get(id).prev_sibling;
        while let Some(p) = prev {
            let d = self.doc.get(p);
            if self.doc.is_whitespace(p) || matches!(d.kind, NodeKind::Comment(_)) {
                prev = d.prev_sibling;
            } else {
                break
            }
        }
        let ok = prev.filter(|p| {
            let d = self.doc.get(*p);
            d.next_cond.is_none()
                && matches!(&d.cond, Some(c) if c.kind != CondKind::Else)
        });
        match ok {
            Some(p) => {
                self.doc.get_mut(p).next_cond = Some(id);
                self.doc.get_mut(id).prev_cond = Some(p);
                Ok(())
            }
            None => Err(self.error(span, "else without a preceding if or else-if"))
        }
    }

    fn start_tag(&mut self, raw_name: KString, attrs: Vec<RawAttr>, self_closing: bool,
                 span: Span) -> Result<(), ParseError> {
        let lower = raw_name.to_ascii_lowercase();
        let (mut kind, name, namespace) = if let Some(rest) = lower.strip_prefix("c:") {
            if rest == "attr" {
                (NodeKind::SetAttr { name: KString::default(), append: false },
                 KString::from_static("c:attr"), Namespace::Control)
            } else {
                // keep the case of the import name
                let name = KString::from_ref(&raw_name[2..]);
                if name.is_empty() {
                    return Err(self.error(span, "missing component name after c:"))
                }
                if let Some(check) = self.import_check {
                    if !check(&name) {
                        return Err(self.error(span, format!("unknown component c:{name}")))
                    }
                }
                (NodeKind::Import, name, Namespace::Control)
            }
        } else if lower == "c" {
            (NodeKind::Control(Control::Passthrough), KString::from_static("c"),
             Namespace::Control)
        } else if lower == "svg" {
            (NodeKind::Element, KString::from_static("svg"), Namespace::Svg)
        } else if lower == "math" {
            (NodeKind::Element, KString::from_static("math"), Namespace::MathMl)
        } else {
            match self.context_namespace() {
                Namespace::Html => (NodeKind::Element, KString::from_string(lower.clone()),
                                    Namespace::Html),
                ns => (NodeKind::Element, raw_name.clone(), ns),
            }
        };

        let (directives, attrs) = self.directives(&kind, attrs)?;

        match &mut kind {
            NodeKind::Control(control) => {
                if let Some((name, shape, _)) = directives.var.clone() {
                    *control = Control::Var { name, shape };
                } else if let Some((name, shape, _)) = directives.arg.clone() {
                    *control = Control::Arg { name, shape };
                }
            }
            NodeKind::SetAttr { name, append } => {
                for a in &attrs {
                    match a.name.to_ascii_lowercase().as_str() {
                        "name" => {
                            *name = a.value.as_ref().and_then(|t| t.as_literal())
                                .map(|s| KString::from_ref(s.trim()))
                                .filter(|s| !s.is_empty())
                                .ok_or_else(|| self.error(
                                    a.span, "c:attr needs a literal, non-empty name"))?;
                        }
                        "append" => *append = true,
                        _ => return Err(self.error(
                            a.span, format!("unexpected attribute {} on c:attr", a.name)))
                    }
                }
                if name.is_empty() {
                    return Err(self.error(span, "c:attr without name"))
                }
            }
            _ => ()
        }

        let mut node_attrs: Vec<Attr> = Vec::new();
        if !matches!(kind, NodeKind::SetAttr { .. }) {
            for a in attrs {
                let name = if namespace == Namespace::Html {
                    KString::from_string(a.name.to_ascii_lowercase())
                } else {
                    a.name
                };
                // like HTML, the first of duplicates wins
                if node_attrs.iter().any(|x| x.name == name) {
                    continue
                }
                node_attrs.push(Attr { name, value: a.value, span: a.span });
            }
        }

        if namespace == Namespace::Html {
            self.close_implied(&name);
        }

        let is_else = matches!(&directives.cond, Some(c) if c.kind != CondKind::If);
        let mut data = NodeData::new(kind, name.clone(), namespace, span);
        data.attrs = node_attrs;
        data.cond = directives.cond;
        data.for_loop = directives.for_loop;
        let parent = self.current();
        let id = self.doc.push(parent, data);
        if is_else {
            self.link_cond(id, span)?;
        }

        let leaf = match namespace {
            Namespace::Html => is_void(&name),
            _ => self_closing,
        };
        if !leaf {
            if namespace == Namespace::Html {
                if is_raw_text(&name) {
                    self.tokenizer.set_raw_text(&name, false);
                } else if is_rcdata(&name) {
                    self.tokenizer.set_raw_text(&name, true);
                }
            }
            let tag = match self.doc.get(id).kind {
                NodeKind::Import | NodeKind::SetAttr { .. } => KString::from_string(lower),
                _ => name,
            };
            self.stack.push(OpenElement { id, tag, namespace, span });
        }
        Ok(())
    }

    fn end_tag(&mut self, name: &str, span: Span) -> Result<(), ParseError> {
        for i in (0..self.stack.len()).rev() {
            let o = &self.stack[i];
            if o.tag.eq_ignore_ascii_case(name) {
                if let Some(unclosed) = self.stack[i + 1..].iter().rev().find(
                    |o| !(o.namespace == Namespace::Html && has_optional_end(&o.tag)))
                {
                    return Err(self.error(unclosed.span, format!(
                        "element <{}> not closed before </{name}>", unclosed.tag)))
                }
                self.stack.truncate(i);
                return Ok(())
            }
            if is_scope_marker(o.namespace, &o.tag) {
                break
            }
        }
        Err(self.error(span, format!("unexpected end tag </{name}>")))
    }
}

pub fn parse_document(source: &Source) -> Result<Document, ParseError> {
    TreeBuilder::new(source).build()
}

pub fn parse_document_checked(source: &Source, check: ImportCheck<'_>)
                              -> Result<Document, ParseError> {
    TreeBuilder::new(source).with_import_check(check).build()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::Print;

    fn parse(s: &str) -> Document {
        parse_document(&Source::new("t.chtml", s)).unwrap()
    }

    fn parse_err(s: &str) -> String {
        parse_document(&Source::new("t.chtml", s)).unwrap_err().message
    }

    fn html(doc: &Document) -> String {
        doc.root().to_html_fragment_string(doc).unwrap()
    }

    fn elements<'d>(doc: &'d Document, name: &str) -> Vec<NodeId> {
        doc.descendants(doc.root()).into_iter()
            .filter(|n| doc.get(*n).name == name)
            .collect()
    }

    #[test]
    fn t_implicit_close() {
        let doc = parse("<ul><li>a<li>b</ul><p>x<div>y</div>");
        assert_eq!(html(&doc), "<ul><li>a</li><li>b</li></ul><p>x</p><div>y</div>");
        let doc = parse("<ul><li>a<ol><li>b</ol></ul>");
        assert_eq!(html(&doc), "<ul><li>a<ol><li>b</li></ol></li></ul>");
        let doc = parse("<table><tr><td>1<td>2<tr><td>3</table>");
        assert_eq!(html(&doc),
                   "<table><tr><td>1</td><td>2</td></tr><tr><td>3</td></tr></table>");
        let doc = parse("<dl><dt>a<dd>b<dt>c</dl>");
        assert_eq!(elements(&doc, "dt").len(), 2);
        assert_eq!(doc.parent(elements(&doc, "dd")[0]), Some(elements(&doc, "dl")[0]));
    }

    #[test]
    fn t_component_bodies_are_scope_markers() {
        // the inner <li> must not close the <li> outside the import
        let doc = parse("<ul><li><c:item><li>x</li></c:item></li></ul>");
        let lis = elements(&doc, "li");
        assert_eq!(lis.len(), 2);
        assert_eq!(doc.get(doc.parent(lis[1]).unwrap()).kind, NodeKind::Import);
    }

    #[test]
    fn t_void_and_foreign() {
        let doc = parse("<p>a<br>b<img src=x></p><svg viewBox=\"0 0 1 1\">\
                         <linearGradient/><foreignObject><DIV>x</DIV></foreignObject></svg>");
        assert_eq!(html(&doc),
                   "<p>a<br>b<img src=\"x\"></p><svg viewBox=\"0 0 1 1\"><linearGradient/>\
                    <foreignObject><div>x</div></foreignObject></svg>");
    }

    #[test]
    fn t_raw_text() {
        let doc = parse("<script>a < b && ${c}</script><title>${t}</title>");
        let script = elements(&doc, "script")[0];
        let text = doc.get(doc.get(script).first_child.unwrap());
        assert!(matches!(&text.kind, NodeKind::Text { raw: true, template, .. }
                         if template.as_literal() == Some("a < b && ${c}")));
        let title = elements(&doc, "title")[0];
        let text = doc.get(doc.get(title).first_child.unwrap());
        assert!(matches!(&text.kind, NodeKind::Text { template, .. }
                         if template.single_interp().is_some()));
    }

    #[test]
    fn t_cond_chain() {
        let doc = parse("<p c:if=\"a\">A</p>\n<!-- x -->\n<p c:else-if=\"${b}\">B</p><p c:else>C</p>");
        let ps = elements(&doc, "p");
        assert_eq!(doc.get(ps[0]).next_cond, Some(ps[1]));
        assert_eq!(doc.get(ps[1]).prev_cond, Some(ps[0]));
        assert_eq!(doc.get(ps[1]).next_cond, Some(ps[2]));
        assert_eq!(doc.get(ps[1]).cond.as_ref().unwrap().expr.as_deref(), Some("b"));
        assert_eq!(doc.get(ps[2]).cond.as_ref().unwrap().kind, CondKind::Else);
        assert!(doc.get(ps[0]).attrs.is_empty());
        // empty condition
        let doc = parse("<p c:if=\"\">A</p>");
        assert_eq!(doc.get(elements(&doc, "p")[0]).cond.as_ref().unwrap().expr, None);
    }

    #[test]
    fn t_control_and_loops() {
        let doc = parse("<c arg=\"title string\">Untitled</c>\
                         <c var=\"items [number]\">${[1]}</c>\
                         <c for=\"i, someItem in items\">${i}</c>\
                         <li c:for=\"x in [1,2]\">${x}</li>");
        let cs = elements(&doc, "c");
        assert_eq!(doc.get(cs[0]).kind, NodeKind::Control(Control::Arg {
            name: "title".into(), shape: Some(Shape::String) }));
        assert_eq!(doc.get(cs[1]).kind, NodeKind::Control(Control::Var {
            name: "items".into(), shape: Some(Shape::Array(Box::new(Shape::Number))) }));
        let l = doc.get(cs[2]).for_loop.as_ref().unwrap();
        assert_eq!(l.value_var.as_str(), "some_item");
        assert_eq!(l.index_var.as_deref(), Some("i"));
        assert_eq!(l.expr.as_str(), "items");
        let li = elements(&doc, "li")[0];
        assert_eq!(doc.get(li).for_loop.as_ref().unwrap().expr.as_str(), "[1,2]");
    }

    #[test]
    fn t_imports_and_set_attr() {
        let doc = parse("<c:ui.Card someTitle=\"x\"><c:attr name=\"class\" append>big</c:attr>\
                         </c:ui.Card>");
        let card = doc.children(doc.root()).next().unwrap();
        let d = doc.get(card);
        assert_eq!(d.kind, NodeKind::Import);
        assert_eq!(d.name.as_str(), "ui.Card");
        assert_eq!(d.attrs[0].name.as_str(), "someTitle");
        let set = doc.get(d.first_child.unwrap());
        assert_eq!(set.kind, NodeKind::SetAttr { name: "class".into(), append: true });
        let check = |name: &str| name == "known";
        let src = Source::new("t.chtml", "<c:unknown></c:unknown>");
        let e = parse_document_checked(&src, &check).unwrap_err();
        assert_eq!(e.message, "unknown component c:unknown");
    }

    #[test]
    fn t_errors() {
        assert_eq!(parse_err("<div><span></div>"),
                   "element <span> not closed before </div>");
        assert_eq!(parse_err("<div>x"), "unterminated element <div>");
        assert_eq!(parse_err("x</div>"), "unexpected end tag </div>");
        assert_eq!(parse_err("<p c:for=\"x in y\" c:if=\"x\">a</p>"),
                   "for and conditional directives can't be combined on the same element");
        assert_eq!(parse_err("<p c:else>a</p>"), "else without a preceding if or else-if");
        assert_eq!(parse_err("<p c:foo=\"1\">a</p>"), "unknown directive c:foo");
        assert_eq!(parse_err("<div><c arg=\"x\"></c></div>"),
                   "arg declarations are only allowed at the top level");
        assert_eq!(parse_err("<p c:for=\"in y\">a</p>"),
                   "invalid loop \"in y\", expecting \"NAME in EXPR\" or \"INDEX, NAME in EXPR\"");
        let e = parse_document(&Source::new("t.chtml", "<p>\n  <b>${}</b></p>")).unwrap_err();
        assert_eq!(e.position.line, 2);
        assert_eq!(e.position.column, 6);
    }
}
