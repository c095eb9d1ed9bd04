//! Static facts about HTML elements needed for tree construction and
//! serialization.

use std::collections::HashMap;

use kstring::KString;
use lazy_static::lazy_static;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Html,
    Svg,
    MathMl,
    /// `<c>`, `<c:...>` and the parse tree's document node.
    Control,
}

#[derive(Debug, Default)]
pub struct ElementMeta {
    pub tag_name: &'static str,
    /// Never has content or an end tag (`<br>`).
    pub void: bool,
    /// Content is literal text up to the end tag, never interpolated.
    pub raw_text: bool,
    /// Content is text up to the end tag, but interpolated.
    pub rcdata: bool,
    /// May be closed implicitly, including at end of input.
    pub optional_end: bool,
    /// Starting this element closes an open `<p>` in button scope.
    pub closes_p: bool,
    /// Stops the "has element in scope" search.
    pub scope_marker: bool,
    /// Start tags of these elements implicitly close an open element
    /// of this kind (searching up to the next scope marker).
    pub closed_by: &'static [&'static str],
}

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link",
    "meta", "source", "track", "wbr",
];

const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "dialog", "div",
    "dl", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hgroup", "hr", "li", "dd", "dt", "main",
    "menu", "nav",
    "ol", "p", "pre", "section", "summary", "table", "ul",
];

const SCOPE_MARKERS: &[&str] = &[
    "applet", "caption", "html", "marquee", "object", "table", "td", "template",
    "th",
];

const OPTIONAL_END: &[(&str, &[&str])] = &[
    ("p", &[]),
    ("li", &["li"]),
    ("dt", &["dt", "dd"]),
    ("dd", &["dt", "dd"]),
    ("option", &["option", "optgroup"]),
    ("optgroup", &["optgroup"]),
    ("rb", &["rb", "rt", "rtc", "rp"]),
    ("rt", &["rb", "rt", "rtc", "rp"]),
    ("rp", &["rb", "rt", "rtc", "rp"]),
    ("tr", &["tr", "tbody", "thead", "tfoot"]),
    ("td", &["td", "th", "tr", "tbody", "thead", "tfoot"]),
    ("th", &["td", "th", "tr", "tbody", "thead", "tfoot"]),
    ("thead", &["tbody", "tfoot"]),
    ("tbody", &["tbody", "tfoot"]),
    ("tfoot", &["tbody"]),
    ("caption", &["colgroup", "thead", "tbody", "tfoot", "tr"]),
    ("colgroup", &["colgroup", "thead", "tbody", "tfoot", "tr"]),
    ("head", &["body"]),
    ("body", &[]),
    ("html", &[]),
];

/// Foreign-content elements that switch back to HTML parsing for their
/// children, and also act as scope markers.
const SVG_INTEGRATION_POINTS: &[&str] = &["foreignObject", "desc", "title"];
const MATHML_TEXT_INTEGRATION_POINTS: &[&str] = &["mi", "mo", "mn", "ms", "mtext", "annotation-xml"];

pub struct MetaDb {
    pub elementmeta: HashMap<KString, ElementMeta>,
}

impl MetaDb {
    fn new() -> MetaDb {
        let mut elementmeta: HashMap<KString, ElementMeta> = HashMap::new();
        let mut entry = |name: &'static str| -> &mut ElementMeta {
            elementmeta.entry(KString::from_static(name)).or_insert_with(
                || ElementMeta { tag_name: name, ..Default::default() })
        };
        for name in VOID {
            entry(name).void = true;
        }
        for name in ["script", "style"] {
            entry(name).raw_text = true;
        }
        for name in ["textarea", "title"] {
            entry(name).rcdata = true;
        }
        for name in CLOSES_P {
            entry(name).closes_p = true;
        }
        for name in SCOPE_MARKERS {
            entry(name).scope_marker = true;
        }
        for (name, closed_by) in OPTIONAL_END {
            let m = entry(name);
            m.optional_end = true;
            m.closed_by = closed_by;
        }
        MetaDb { elementmeta }
    }

    pub fn get(&self, name: &str) -> Option<&ElementMeta> {
        self.elementmeta.get(name)
    }
}

lazy_static! {
    pub static ref METADB: MetaDb = MetaDb::new();
}

fn meta_flag(name: &str, f: impl Fn(&ElementMeta) -> bool) -> bool {
    METADB.get(name).map_or(false, f)
}

pub fn is_void(name: &str) -> bool {
    meta_flag(name, |m| m.void)
}
pub fn is_raw_text(name: &str) -> bool {
    meta_flag(name, |m| m.raw_text)
}
pub fn is_rcdata(name: &str) -> bool {
    meta_flag(name, |m| m.rcdata)
}
pub fn has_optional_end(name: &str) -> bool {
    meta_flag(name, |m| m.optional_end)
}
pub fn closes_p(name: &str) -> bool {
    meta_flag(name, |m| m.closes_p)
}

/// Whether starting `new` implicitly closes an open `open` element.
pub fn implicitly_closes(new: &str, open: &str) -> bool {
    if open == "p" {
        return closes_p(new)
    }
    METADB.get(open).map_or(false, |m| m.closed_by.contains(&new))
}

/// Open elements that end the search for something `new` would close
/// implicitly (a new `li` leaves the `li` of an outer list alone).
pub fn implicit_close_barrier(new: &str, open: &str) -> bool {
    match new {
        "li" => matches!(open, "ul" | "ol" | "menu"),
        "dt" | "dd" => open == "dl",
        "option" | "optgroup" => matches!(open, "select" | "datalist"),
        "tr" | "thead" | "tbody" | "tfoot" | "caption" | "colgroup" => open == "table",
        "td" | "th" => open == "tr",
        _ => open == "button",
    }
}

pub fn is_scope_marker(namespace: Namespace, name: &str) -> bool {
    match namespace {
        Namespace::Html => meta_flag(name, |m| m.scope_marker),
        Namespace::Svg => SVG_INTEGRATION_POINTS.contains(&name),
        Namespace::MathMl => MATHML_TEXT_INTEGRATION_POINTS.contains(&name),
        // component bodies are isolated
        Namespace::Control => true,
    }
}

/// Foreign elements whose children are parsed as HTML again.
pub fn is_html_integration_point(namespace: Namespace, name: &str) -> bool {
    match namespace {
        Namespace::Svg => SVG_INTEGRATION_POINTS.contains(&name),
        Namespace::MathMl => MATHML_TEXT_INTEGRATION_POINTS.contains(&name),
        Namespace::Html | Namespace::Control => false,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_metadb() {
        assert!(is_void("br"));
        assert!(!is_void("div"));
        assert!(is_raw_text("script"));
        assert!(is_rcdata("textarea"));
        assert!(has_optional_end("li"));
        assert!(!has_optional_end("div"));
    }

    #[test]
    fn t_implicitly_closes() {
        assert!(implicitly_closes("div", "p"));
        assert!(!implicitly_closes("span", "p"));
        assert!(implicitly_closes("li", "li"));
        assert!(implicitly_closes("dd", "dt"));
        assert!(implicitly_closes("tr", "td"));
        assert!(!implicitly_closes("li", "ul"));
        assert!(implicitly_closes("li", "p"));
        assert!(implicit_close_barrier("li", "ol"));
        assert!(!implicit_close_barrier("li", "div"));
    }

    #[test]
    fn t_scope_marker() {
        assert!(is_scope_marker(Namespace::Html, "table"));
        assert!(is_scope_marker(Namespace::Control, "c:card"));
        assert!(is_scope_marker(Namespace::Svg, "foreignObject"));
        assert!(!is_scope_marker(Namespace::Html, "div"));
    }
}
