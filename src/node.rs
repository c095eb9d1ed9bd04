//! The node tree, as an arena of `NodeData` addressed by `NodeId`.
//! Parsed markup and rendered output both use `Document`.

use std::fmt::Debug;

use kstring::KString;

use crate::{elements::Namespace,
            shape::Shape,
            source::Span,
            template::Template};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a `<c>` container does.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Passthrough,
    /// Bind the rendered children to `name` in the enclosing scope.
    Var { name: KString, shape: Option<Shape> },
    /// Declare an input argument; the children are the default.
    Arg { name: KString, shape: Option<Shape> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Element,
    /// `<c:NAME>`, `name` holds NAME.
    Import,
    Control(Control),
    /// `<c:attr name=..>`.
    SetAttr { name: KString, append: bool },
    Text {
        template: Template,
        whitespace: bool,
        /// script/style content, printed unescaped
        raw: bool,
    },
    Comment(KString),
    Doctype(KString),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: KString,
    /// None for a bare attribute (`<input disabled>`).
    pub value: Option<Template>,
    pub span: Span,
}

impl Attr {
    pub fn literal(name: impl Into<KString>, value: Option<KString>) -> Attr {
        Attr {
            name: name.into(),
            value: value.map(Template::literal),
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondKind {
    If,
    ElseIf,
    Else,
}

/// An empty or missing expression counts as true.
#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    pub kind: CondKind,
    pub expr: Option<KString>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub value_var: KString,
    pub index_var: Option<KString>,
    pub expr: KString,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub name: KString,
    pub namespace: Namespace,
    pub attrs: Vec<Attr>,
    pub cond: Option<Cond>,
    pub prev_cond: Option<NodeId>,
    pub next_cond: Option<NodeId>,
    pub for_loop: Option<Loop>,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub span: Span,
}

impl NodeData {
    pub fn new(kind: NodeKind, name: impl Into<KString>, namespace: Namespace, span: Span)
               -> NodeData {
        NodeData {
            kind,
            name: name.into(),
            namespace,
            attrs: Vec::new(),
            cond: None,
            prev_cond: None,
            next_cond: None,
            for_loop: None,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            span,
        }
    }

    pub fn element(name: impl Into<KString>, namespace: Namespace, attrs: Vec<Attr>)
                   -> NodeData {
        let mut n = NodeData::new(NodeKind::Element, name, namespace, Span::default());
        n.attrs = attrs;
        n
    }

    pub fn text(template: Template, span: Span) -> NodeData {
        let whitespace = template.is_whitespace();
        NodeData::new(NodeKind::Text { template, whitespace, raw: false },
                      "", Namespace::Html, span)
    }

    pub fn literal_text(s: impl Into<KString>) -> NodeData {
        NodeData::text(Template::literal(s), Span::default())
    }

    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element)
    }
}

pub struct Document {
    nodes: Vec<NodeData>,
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

pub struct Children<'d> {
    doc: &'d Document,
    next: Option<NodeId>,
}

impl<'d> Iterator for Children<'d> {
    type Item = NodeId;
    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.doc.get(id).next_sibling;
        Some(id)
    }
}

impl Document {
    /// A document with just its root node.
    pub fn new() -> Document {
        Document {
            nodes: vec![NodeData::new(NodeKind::Document, "", Namespace::Control,
                                      Span::default())]
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.get(self.root()).first_child.is_none()
    }

    /// Panics on ids from another document, like slice indexing.
    pub fn get(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    /// Add a detached node.
    pub fn new_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.get(child).parent.is_none());
        let last = self.get(parent).last_child;
        {
            let c = self.get_mut(child);
            c.parent = Some(parent);
            c.prev_sibling = last;
            c.next_sibling = None;
        }
        match last {
            Some(last) => self.get_mut(last).next_sibling = Some(child),
            None => self.get_mut(parent).first_child = Some(child),
        }
        self.get_mut(parent).last_child = Some(child);
    }

    /// `new_node` plus `append_child`.
    pub fn push(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = self.new_node(data);
        self.append_child(parent, id);
        id
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).parent
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children { doc: self, next: self.get(id).first_child }
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.get(id).first_child.is_some()
    }

    /// Copy the subtree at `id` into `dst` as the last child of
    /// `parent`. Condition chain links are not copied, the copy is a
    /// chain of its own.
    pub fn clone_subtree_into(&self, id: NodeId, dst: &mut Document, parent: NodeId)
                              -> NodeId {
        let src = self.get(id);
        let mut data = NodeData::new(src.kind.clone(), src.name.clone(), src.namespace,
                                     src.span);
        data.attrs = src.attrs.clone();
        data.cond = src.cond.clone();
        data.for_loop = src.for_loop.clone();
        let new = dst.push(parent, data);
        for child in self.children(id) {
            self.clone_subtree_into(child, dst, new);
        }
        new
    }

    /// A fresh document holding a copy of the subtree at `id` as the
    /// only child of its root.
    pub fn subdocument(&self, id: NodeId) -> Document {
        if id == self.root() {
            return self.children_document(id)
        }
        let mut doc = Document::new();
        let root = doc.root();
        self.clone_subtree_into(id, &mut doc, root);
        doc
    }

    /// A fresh document holding copies of the children of `id`.
    pub fn children_document(&self, id: NodeId) -> Document {
        let mut doc = Document::new();
        let root = doc.root();
        for child in self.children(id) {
            self.clone_subtree_into(child, &mut doc, root);
        }
        doc
    }

    /// Depth first, document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            let children: Vec<NodeId> = self.children(n).collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// First element (in document order, below `from`) whose `id`
    /// attribute is literally `id_attr`.
    pub fn find_by_id_from(&self, from: NodeId, id_attr: &str) -> Option<NodeId> {
        self.descendants(from).into_iter().find(|n| {
            let d = self.get(*n);
            d.is_element()
                && d.attr("id")
                .and_then(|a| a.value.as_ref())
                .and_then(|t| t.as_literal())
                == Some(id_attr)
        })
    }

    pub fn find_by_id(&self, id_attr: &str) -> Option<NodeId> {
        self.find_by_id_from(self.root(), id_attr)
    }

    pub fn is_whitespace(&self, id: NodeId) -> bool {
        matches!(self.get(id).kind, NodeKind::Text { whitespace: true, .. })
    }

    /// The chain of element names from the root down to `id`, for
    /// diagnostics.
    pub fn node_path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            let d = self.get(n);
            match &d.kind {
                NodeKind::Document => (),
                NodeKind::Text { .. } => names.push(KString::from_static("#text")),
                NodeKind::Comment(_) => names.push(KString::from_static("#comment")),
                NodeKind::Doctype(_) => names.push(KString::from_static("#doctype")),
                _ => names.push(d.name.clone()),
            }
            cur = d.parent;
        }
        names.reverse();
        itertools::join(names.iter().map(|n| n.as_str()), " > ")
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.push(root, NodeData::element(
            "div", Namespace::Html,
            vec![Attr::literal("id", Some(KString::from_static("main")))]));
        doc.push(div, NodeData::literal_text("  "));
        let p = doc.push(div, NodeData::element("p", Namespace::Html, vec![]));
        doc.push(p, NodeData::literal_text("hi"));
        (doc, div, p)
    }

    #[test]
    fn t_links() {
        let (doc, div, p) = sample();
        let kids: Vec<_> = doc.children(div).collect();
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[1], p);
        assert_eq!(doc.parent(p), Some(div));
        assert_eq!(doc.get(p).prev_sibling, Some(kids[0]));
        assert!(doc.is_whitespace(kids[0]));
        assert!(!doc.is_whitespace(p));
        assert_eq!(doc.node_path(p), "div > p");
    }

    #[test]
    fn t_find_and_subdocument() {
        let (doc, div, _) = sample();
        assert_eq!(doc.find_by_id("main"), Some(div));
        assert_eq!(doc.find_by_id("nope"), None);
        let sub = doc.subdocument(div);
        let top: Vec<_> = sub.children(sub.root()).collect();
        assert_eq!(top.len(), 1);
        assert_eq!(sub.get(top[0]).name, "div");
        assert_eq!(sub.descendants(top[0]).len(), 4);
    }

    #[test]
    fn t_clone_drops_cond_links() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.push(root, NodeData::element("p", Namespace::Html, vec![]));
        let b = doc.push(root, NodeData::element("p", Namespace::Html, vec![]));
        doc.get_mut(a).cond = Some(Cond {
            kind: CondKind::If, expr: Some("x".into()), span: Span::default()
        });
        doc.get_mut(a).next_cond = Some(b);
        doc.get_mut(b).prev_cond = Some(a);
        let mut dst = Document::new();
        let dst_root = dst.root();
        let c = doc.clone_subtree_into(a, &mut dst, dst_root);
        assert_eq!(dst.get(c).next_cond, None);
        assert_eq!(dst.get(c).cond, doc.get(a).cond);
    }
}
