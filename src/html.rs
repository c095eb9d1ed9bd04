//! Serializing documents back to HTML, and `Markup`, the forest of
//! output nodes that travels as a value.

use std::{borrow::Cow, io::Write, sync::Arc, fmt::Debug};

use anyhow::Result;

use crate::{elements::{is_void, Namespace},
            node::{Document, NodeId, NodeKind, NodeData},
            template::Part};

pub const DOCTYPE: &str = "<!DOCTYPE html>\n";

pub fn html_escape(out: &mut impl Write, bytes: &[u8]) -> std::io::Result<()> {
    let mut last = 0;
    for (i, b) in bytes.iter().enumerate() {
        let rep: &[u8] = match b {
            b'&' => b"&amp;",
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'"' => b"&quot;",
            b'\'' => b"&#39;",
            _ => continue
        };
        out.write_all(&bytes[last..i])?;
        out.write_all(rep)?;
        last = i + 1;
    }
    out.write_all(&bytes[last..])
}

pub fn html_escape_string(s: &str) -> String {
    let mut v = Vec::with_capacity(s.len());
    html_escape(&mut v, s.as_bytes()).expect("no I/O errors on Vec");
    // Safe: escaping only replaces ASCII bytes by ASCII sequences.
    unsafe { String::from_utf8_unchecked(v) }
}

pub trait Print {
    /// Print serialized HTML.
    fn print_html_fragment(&self, out: &mut impl Write, doc: &Document) -> Result<()>;

    /// Print the text content only, ignoring all markup.
    fn print_plain(&self, out: &mut String, doc: &Document);

    fn to_html_fragment_string(&self, doc: &Document) -> Result<String> {
        let mut s = Vec::new();
        self.print_html_fragment(&mut s, doc)?;
        Ok(String::from_utf8(s)?)
    }

    fn to_plain_string(&self, doc: &Document) -> String {
        let mut s = String::new();
        self.print_plain(&mut s, doc);
        s
    }
}

fn print_template_literal(out: &mut impl Write, node: &NodeData, escape: bool) -> Result<()> {
    if let NodeKind::Text { template, .. } = &node.kind {
        for part in template.parts() {
            match part {
                Part::Literal(s) =>
                    if escape {
                        html_escape(out, s.as_bytes())?
                    } else {
                        out.write_all(s.as_bytes())?
                    },
                // unrendered source tree; print it as written
                Part::Interp(i) => write!(out, "${{{}}}", i.expr)?,
            }
        }
    }
    Ok(())
}

impl Print for NodeId {
    fn print_html_fragment(&self, out: &mut impl Write, doc: &Document) -> Result<()> {
        let node = doc.get(*self);
        match &node.kind {
            NodeKind::Document => {
                for child in doc.children(*self) {
                    child.print_html_fragment(out, doc)?;
                }
            }
            NodeKind::Text { raw, .. } => {
                let in_raw_parent = node.parent
                    .map(|p| crate::elements::is_raw_text(&doc.get(p).name))
                    .unwrap_or(false);
                print_template_literal(out, node, !(*raw || in_raw_parent))?;
            }
            NodeKind::Comment(s) => {
                out.write_all(b"<!--")?;
                out.write_all(s.as_bytes())?;
                out.write_all(b"-->")?;
            }
            NodeKind::Doctype(s) => {
                out.write_all(b"<!DOCTYPE ")?;
                out.write_all(s.as_bytes())?;
                out.write_all(b">")?;
            }
            NodeKind::Element | NodeKind::Import | NodeKind::Control(_)
                | NodeKind::SetAttr { .. } =>
            {
                let name: Cow<str> = match &node.kind {
                    NodeKind::Import => Cow::Owned(format!("c:{}", node.name)),
                    _ => Cow::Borrowed(node.name.as_str()),
                };
                out.write_all(b"<")?;
                out.write_all(name.as_bytes())?;
                for att in &node.attrs {
                    out.write_all(b" ")?;
                    out.write_all(att.name.as_bytes())?;
                    if let Some(value) = &att.value {
                        out.write_all(b"=\"")?;
                        match value.as_literal() {
                            Some(s) => html_escape(out, s.as_bytes())?,
                            None => html_escape(out, value.to_source().as_bytes())?,
                        }
                        out.write_all(b"\"")?;
                    }
                }
                let childless = !doc.has_children(*self);
                if node.namespace == Namespace::Html && is_void(&name) {
                    out.write_all(b">")?;
                } else if childless && matches!(node.namespace, Namespace::Svg | Namespace::MathMl) {
                    out.write_all(b"/>")?;
                } else {
                    out.write_all(b">")?;
                    for child in doc.children(*self) {
                        child.print_html_fragment(out, doc)?;
                    }
                    out.write_all(b"</")?;
                    out.write_all(name.as_bytes())?;
                    out.write_all(b">")?;
                }
            }
        }
        Ok(())
    }

    fn print_plain(&self, out: &mut String, doc: &Document) {
        let node = doc.get(*self);
        match &node.kind {
            NodeKind::Text { template, .. } => {
                if let Some(s) = template.as_literal() {
                    out.push_str(s)
                } else {
                    out.push_str(&template.to_source())
                }
            }
            NodeKind::Comment(_) | NodeKind::Doctype(_) => (),
            _ => for child in doc.children(*self) {
                child.print_plain(out, doc)
            }
        }
    }
}

/// A forest of nodes in a shared, finished output document.
#[derive(Clone)]
pub struct Markup {
    doc: Arc<Document>,
    roots: Vec<NodeId>,
}

impl Debug for Markup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_html_string() {
            Ok(s) => write!(f, "Markup({s:?})"),
            Err(_) => write!(f, "Markup(<{} roots>)", self.roots.len()),
        }
    }
}

impl PartialEq for Markup {
    fn eq(&self, other: &Self) -> bool {
        self.to_html_string().ok() == other.to_html_string().ok()
    }
}

impl Markup {
    pub fn new(doc: Arc<Document>, roots: Vec<NodeId>) -> Markup {
        Markup { doc, roots }
    }

    /// All top level nodes of `doc`.
    pub fn from_document(doc: Document) -> Markup {
        let roots = doc.children(doc.root()).collect();
        Markup { doc: Arc::new(doc), roots }
    }

    pub fn empty() -> Markup {
        Markup::from_document(Document::new())
    }

    /// A single text node.
    pub fn text(s: &str) -> Markup {
        let mut doc = Document::new();
        let root = doc.root();
        doc.push(root, NodeData::literal_text(kstring::KString::from_ref(s)));
        Markup::from_document(doc)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Copy all roots into `dst` below `parent`.
    pub fn copy_into(&self, dst: &mut Document, parent: NodeId) {
        for root in &self.roots {
            self.doc.clone_subtree_into(*root, dst, parent);
        }
    }

    /// The subtree of the first element with the given `id`
    /// attribute, if any.
    pub fn fragment(&self, id_attr: &str) -> Option<Markup> {
        self.roots.iter().find_map(|r| self.doc.find_by_id_from(*r, id_attr))
            .map(|n| Markup { doc: self.doc.clone(), roots: vec![n] })
    }

    pub fn print_html(&self, out: &mut impl Write) -> Result<()> {
        for r in &self.roots {
            r.print_html_fragment(out, &self.doc)?;
        }
        Ok(())
    }

    pub fn to_html_string(&self) -> Result<String> {
        let mut v = Vec::new();
        self.print_html(&mut v)?;
        Ok(String::from_utf8(v)?)
    }

    pub fn to_plain_string(&self) -> String {
        let mut s = String::new();
        for r in &self.roots {
            r.print_plain(&mut s, &self.doc);
        }
        s
    }

    /// Whether the output starts with a doctype or `<html>` element,
    /// i.e. is a whole page.
    pub fn is_page(&self) -> bool {
        self.roots.iter()
            .filter(|r| !self.doc.is_whitespace(**r))
            .next()
            .map_or(false, |r| {
                let d = self.doc.get(*r);
                matches!(d.kind, NodeKind::Doctype(_))
                    || (d.is_element() && d.name == "html")
            })
    }
}
