//! Splitting markup into tags, text, comments and doctypes. Text and
//! attribute values come out as `Template`s, with character
//! references decoded and `${...}` interpolations cut out.

use kstring::KString;

use crate::{error::ParseError,
            source::{Source, Span},
            template::{scan_interpolation, TemplateBuilder, Template, TemplateError}};

#[derive(Debug, Clone, PartialEq)]
pub struct RawAttr {
    /// As written.
    pub name: KString,
    pub value: Option<Template>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    StartTag {
        /// As written.
        name: KString,
        attrs: Vec<RawAttr>,
        self_closing: bool,
    },
    EndTag { name: KString },
    Text(Template),
    /// Content of script/style, taken literally.
    RawText(KString),
    Comment(KString),
    Doctype(KString),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Data,
    /// Up to `</name`, no references, no interpolation.
    RawText,
    /// Up to `</name`, references and interpolation but no tags.
    Rcdata,
}

pub struct Tokenizer<'s> {
    source: &'s Source,
    text: &'s str,
    pos: usize,
    mode: Mode,
    end_tag: KString,
}

fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b':' | b'.') || c >= 0x80
}

fn is_attr_name_char(c: u8) -> bool {
    !(c.is_ascii_whitespace() || matches!(c, b'=' | b'>' | b'/' | b'"' | b'\'' | b'<'))
}

/// Offset of the first interpolation start in `s`, reading `$${`
/// escapes left to right the way `scan_text` does.
fn find_interp(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' {
            if bytes[i + 1] == b'{' {
                return Some(i)
            }
            if bytes[i + 1] == b'$' && bytes.get(i + 2) == Some(&b'{') {
                i += 3;
                continue;
            }
        }
        i += 1;
    }
    None
}

/// The character a named or numeric reference at the start of `s`
/// (just after the `&`) stands for, and the length consumed (incl.
/// the `;`).
fn char_ref(s: &str) -> Option<(char, usize)> {
    const NAMED: &[(&str, char)] = &[
        ("amp;", '&'),
        ("lt;", '<'),
        ("gt;", '>'),
        ("quot;", '"'),
        ("apos;", '\''),
        ("nbsp;", '\u{A0}'),
    ];
    if let Some(rest) = s.strip_prefix('#') {
        let (digits, radix, skip) = match rest.strip_prefix(|c| c == 'x' || c == 'X') {
            Some(hex) => (hex, 16, 2),
            None => (rest, 10, 1),
        };
        let len = digits.find(|c: char| !c.is_digit(radix)).unwrap_or(digits.len());
        if len == 0 || !digits[len..].starts_with(';') {
            return None
        }
        let n = u32::from_str_radix(&digits[..len], radix).ok()?;
        let c = char::from_u32(n).filter(|c| *c != '\0').unwrap_or('\u{FFFD}');
        return Some((c, skip + len + 1))
    }
    NAMED.iter().find(|(name, _)| s.starts_with(name)).map(|(name, c)| (*c, name.len()))
}

impl<'s> Tokenizer<'s> {
    pub fn new(source: &'s Source) -> Tokenizer<'s> {
        Tokenizer {
            source,
            text: source.text(),
            pos: 0,
            mode: Mode::Data,
            end_tag: KString::default(),
        }
    }

    fn error(&self, span: Span, message: impl Into<String>) -> ParseError {
        ParseError::new(self.source, span, message)
    }

    fn template_error(&self, e: TemplateError) -> ParseError {
        match e {
            TemplateError::Unterminated { offset } =>
                self.error(Span::new(offset, offset + 2), e.to_string()),
            TemplateError::Empty { offset, len } =>
                self.error(Span::new(offset, offset + len), e.to_string()),
        }
    }

    /// The tree builder calls this after a start tag of an element
    /// whose content isn't markup.
    pub fn set_raw_text(&mut self, end_tag: &str, rcdata: bool) {
        self.mode = if rcdata { Mode::Rcdata } else { Mode::RawText };
        self.end_tag = KString::from_ref(end_tag);
    }

    fn rest(&self) -> &'s str {
        &self.text[self.pos..]
    }

    fn peek_byte(&self, ahead: usize) -> Option<u8> {
        self.text.as_bytes().get(self.pos + ahead).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek_byte(0).map_or(false, |c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Whether `<` at the current position opens markup (as opposed to
    /// being a literal less-than sign).
    fn at_markup(&self) -> bool {
        match (self.peek_byte(1), self.peek_byte(2)) {
            (Some(c), _) if is_name_start(c) => true,
            (Some(b'/'), Some(c)) if is_name_start(c) || c == b'>' => true,
            (Some(b'!'), _) | (Some(b'?'), _) => true,
            _ => false
        }
    }

    /// Position of the `</end_tag` that terminates raw text, or the
    /// end of input.
    fn raw_text_end(&self) -> usize {
        let bytes = self.text.as_bytes();
        let n = self.end_tag.len();
        let mut i = self.pos;
        while let Some(off) = self.text[i..].find("</") {
            let j = i + off;
            let name_end = j + 2 + n;
            if name_end <= bytes.len()
                && self.text[j + 2..name_end].eq_ignore_ascii_case(&self.end_tag)
                && bytes.get(name_end).map_or(true, |c| c.is_ascii_whitespace()
                                               || *c == b'>' || *c == b'/')
            {
                return j
            }
            i = j + 2;
        }
        bytes.len()
    }

    /// Text up to `end` into `b`, decoding references and cutting out
    /// interpolations.
    fn scan_text(&mut self, b: &mut TemplateBuilder, end: usize) -> Result<(), ParseError> {
        while self.pos < end {
            let rest = &self.text[self.pos..end];
            let c = rest.as_bytes()[0];
            if c == b'$' {
                if rest.starts_with("$${") {
                    b.push_str("${");
                    self.pos += 3;
                    continue;
                }
                if rest.starts_with("${") {
                    let stop = scan_interpolation(self.text, self.pos)
                        .map_err(|e| self.template_error(e))?;
                    if stop > end {
                        return Err(self.template_error(
                            TemplateError::Unterminated { offset: self.pos }))
                    }
                    b.push_interp(&self.text[self.pos + 2..stop - 1],
                                  Span::new(self.pos, stop));
                    self.pos = stop;
                    continue;
                }
            }
            if c == b'&' {
                if let Some((ch, len)) = char_ref(&rest[1..]) {
                    b.push_char(ch);
                    self.pos += 1 + len;
                    continue;
                }
            }
            let ch = rest.chars().next().expect("pos < end");
            b.push_char(ch);
            self.pos += ch.len_utf8();
        }
        Ok(())
    }

    /// Data state text up to the next markup.
    fn data_text(&mut self) -> Result<Template, ParseError> {
        let mut b = TemplateBuilder::new();
        loop {
            let rest = self.rest();
            let next_lt = rest.find('<').map(|i| self.pos + i).unwrap_or(self.text.len());
            let next_interp = find_interp(rest).map(|i| self.pos + i);
            match next_interp {
                // an interpolation may contain `<`
                Some(i) if i < next_lt => {
                    self.scan_text(&mut b, i)?;
                    let stop = scan_interpolation(self.text, self.pos)
                        .map_err(|e| self.template_error(e))?;
                    self.scan_text(&mut b, stop)?;
                }
                _ => {
                    self.scan_text(&mut b, next_lt)?;
                    if self.pos >= self.text.len() || self.at_markup() {
                        return Ok(b.finish())
                    }
                    b.push_char('<');
                    self.pos += 1;
                }
            }
        }
    }

    fn tag_name(&mut self) -> KString {
        let start = self.pos;
        while self.peek_byte(0).map_or(false, is_name_char) {
            self.pos += 1;
        }
        KString::from_ref(&self.text[start..self.pos])
    }

    fn attr_value(&mut self) -> Result<Template, ParseError> {
        let mut b = TemplateBuilder::new();
        match self.peek_byte(0) {
            Some(q @ (b'"' | b'\'')) => {
                self.pos += 1;
                let start = self.pos;
                loop {
                    let rest = self.rest();
                    let close = rest.find(q as char).map(|i| self.pos + i);
                    let interp = find_interp(rest).map(|i| self.pos + i);
                    match (interp, close) {
                        (Some(i), Some(c)) if i < c => {
                            self.scan_text(&mut b, i)?;
                            let stop = scan_interpolation(self.text, self.pos)
                                .map_err(|e| self.template_error(e))?;
                            self.scan_text(&mut b, stop)?;
                        }
                        (_, Some(c)) => {
                            self.scan_text(&mut b, c)?;
                            self.pos += 1;
                            return Ok(b.finish())
                        }
                        (_, None) => return Err(self.error(
                            Span::new(start - 1, self.text.len()),
                            "unterminated attribute value"))
                    }
                }
            }
            _ => {
                let start = self.pos;
                let mut end = start;
                let bytes = self.text.as_bytes();
                while end < bytes.len() {
                    if self.text[end..].starts_with("$${") {
                        end += 3;
                        continue;
                    }
                    if bytes[end] == b'$' && bytes.get(end + 1) == Some(&b'{') {
                        end = scan_interpolation(self.text, end)
                            .map_err(|e| self.template_error(e))?;
                        continue;
                    }
                    if bytes[end].is_ascii_whitespace() || bytes[end] == b'>' {
                        break
                    }
                    end += 1;
                }
                self.scan_text(&mut b, end)?;
                Ok(b.finish())
            }
        }
    }

    // after `<name`
    fn start_tag(&mut self, tag_start: usize, name: KString) -> Result<Token, ParseError> {
        let mut attrs: Vec<RawAttr> = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek_byte(0) {
                None => return Err(self.error(Span::new(tag_start, self.pos),
                                              format!("unterminated tag <{name}"))),
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(Token {
                        kind: TokenKind::StartTag { name, attrs, self_closing: false },
                        span: Span::new(tag_start, self.pos),
                    })
                }
                Some(b'/') if self.peek_byte(1) == Some(b'>') => {
                    self.pos += 2;
                    return Ok(Token {
                        kind: TokenKind::StartTag { name, attrs, self_closing: true },
                        span: Span::new(tag_start, self.pos),
                    })
                }
                Some(b'/') => {
                    self.pos += 1;
                }
                Some(c) if is_attr_name_char(c) => {
                    let attr_start = self.pos;
                    while self.peek_byte(0).map_or(false, is_attr_name_char) {
                        self.pos += 1;
                    }
                    let attr_name = KString::from_ref(&self.text[attr_start..self.pos]);
                    let save = self.pos;
                    self.skip_whitespace();
                    let value = if self.peek_byte(0) == Some(b'=') {
                        self.pos += 1;
                        self.skip_whitespace();
                        Some(self.attr_value()?)
                    } else {
                        self.pos = save;
                        None
                    };
                    attrs.push(RawAttr {
                        name: attr_name,
                        value,
                        span: Span::new(attr_start, self.pos),
                    });
                }
                Some(c) => return Err(self.error(
                    Span::new(self.pos, self.pos + 1),
                    format!("unexpected character {:?} in tag <{name}>", c as char)))
            }
        }
    }

    fn until(&mut self, terminator: &str, start: usize, what: &str) -> Result<&'s str, ParseError> {
        match self.rest().find(terminator) {
            Some(i) => {
                let s = &self.text[self.pos..self.pos + i];
                self.pos += i + terminator.len();
                Ok(s)
            }
            None => Err(self.error(Span::new(start, self.text.len()),
                                   format!("unterminated {what}")))
        }
    }

    fn markup(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let rest = self.rest();
        if rest.starts_with("<!--") {
            self.pos += 4;
            let s = self.until("-->", start, "comment")?;
            return Ok(Token { kind: TokenKind::Comment(KString::from_ref(s)),
                              span: Span::new(start, self.pos) })
        }
        if rest.len() >= 9 && rest[..9].eq_ignore_ascii_case("<!doctype") {
            self.pos += 9;
            let s = self.until(">", start, "doctype")?;
            return Ok(Token { kind: TokenKind::Doctype(KString::from_ref(s.trim())),
                              span: Span::new(start, self.pos) })
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            self.pos += 2;
            let s = self.until(">", start, "comment")?;
            return Ok(Token { kind: TokenKind::Comment(KString::from_ref(s)),
                              span: Span::new(start, self.pos) })
        }
        if rest.starts_with("</") {
            self.pos += 2;
            if self.peek_byte(0) == Some(b'>') {
                // `</>` is ignored
                self.pos += 1;
                return Ok(Token { kind: TokenKind::Text(Template::default()),
                                  span: Span::new(start, self.pos) })
            }
            let name = self.tag_name();
            self.until(">", start, "end tag")?;
            return Ok(Token { kind: TokenKind::EndTag { name },
                              span: Span::new(start, self.pos) })
        }
        self.pos += 1;
        let name = self.tag_name();
        self.start_tag(start, name)
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        if self.pos >= self.text.len() {
            return Ok(None)
        }
        let start = self.pos;
        match self.mode {
            Mode::RawText | Mode::Rcdata => {
                let end = self.raw_text_end();
                let kind = if self.mode == Mode::RawText {
                    let s = &self.text[self.pos..end];
                    self.pos = end;
                    TokenKind::RawText(KString::from_ref(s))
                } else {
                    let mut b = TemplateBuilder::new();
                    self.scan_text(&mut b, end)?;
                    TokenKind::Text(b.finish())
                };
                self.mode = Mode::Data;
                Ok(Some(Token { kind, span: Span::new(start, self.pos) }))
            }
            Mode::Data => {
                if self.peek_byte(0) == Some(b'<') && self.at_markup() {
                    Ok(Some(self.markup()?))
                } else {
                    let t = self.data_text()?;
                    Ok(Some(Token { kind: TokenKind::Text(t), span: Span::new(start, self.pos) }))
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Part;

    fn tokens(s: &str) -> Vec<TokenKind> {
        let src = Source::new("t.chtml", s);
        let mut t = Tokenizer::new(&src);
        let mut out = Vec::new();
        while let Some(tok) = t.next_token().unwrap() {
            if let TokenKind::StartTag { name, .. } = &tok.kind {
                let lower = name.to_ascii_lowercase();
                if lower == "script" {
                    t.set_raw_text("script", false);
                } else if lower == "textarea" {
                    t.set_raw_text("textarea", true);
                }
            }
            out.push(tok.kind);
        }
        out
    }

    fn text(s: &str) -> TokenKind {
        TokenKind::Text(Template::literal(KString::from_ref(s)))
    }

    #[test]
    fn t_tags_and_text() {
        let t = tokens("<p class=a id='b' hidden>x &amp; y</p>");
        match &t[0] {
            TokenKind::StartTag { name, attrs, self_closing } => {
                assert_eq!(name.as_str(), "p");
                assert!(!self_closing);
                assert_eq!(attrs.len(), 3);
                assert_eq!(attrs[1].value.as_ref().unwrap().as_literal(), Some("b"));
                assert_eq!(attrs[2].value, None);
            }
            other => panic!("{other:?}")
        }
        assert_eq!(t[1], text("x & y"));
        assert_eq!(t[2], TokenKind::EndTag { name: "p".into() });
    }

    #[test]
    fn t_interpolation() {
        let t = tokens("<a title=\"${x > 1 ? \"big\" : 'small'}\">a < b ${ '<' }</a>");
        match &t[0] {
            TokenKind::StartTag { attrs, .. } => {
                let v = attrs[0].value.as_ref().unwrap();
                assert_eq!(v.single_interp().unwrap().expr.as_str(),
                           "x > 1 ? \"big\" : 'small'");
            }
            other => panic!("{other:?}")
        }
        match &t[1] {
            TokenKind::Text(tpl) => {
                assert_eq!(tpl.parts().len(), 2);
                assert_eq!(tpl.parts()[0], Part::Literal("a < b ".into()));
            }
            other => panic!("{other:?}")
        }
    }

    #[test]
    fn t_escaped_interpolation() {
        assert_eq!(find_interp("a $${x} ${y}"), Some(8));
        assert_eq!(find_interp("$$${y}"), None);
        assert_eq!(find_interp("$${"), None);
        let t = tokens("<p title=\"$${x}\" alt=$${y}>cost: $${x} ${ n }</p>");
        match &t[0] {
            TokenKind::StartTag { attrs, .. } => {
                assert_eq!(attrs[0].value.as_ref().unwrap().as_literal(), Some("${x}"));
                assert_eq!(attrs[1].value.as_ref().unwrap().as_literal(), Some("${y}"));
            }
            other => panic!("{other:?}")
        }
        match &t[1] {
            TokenKind::Text(tpl) => {
                assert_eq!(tpl.parts()[0], Part::Literal("cost: ${x} ".into()));
                assert_eq!(tpl.interps().next().unwrap().expr.as_str(), "n");
            }
            other => panic!("{other:?}")
        }
    }

    #[test]
    fn t_comments_doctype_selfclosing() {
        let t = tokens("<!DOCTYPE html><!-- c --><br/><?x?>");
        assert_eq!(t[0], TokenKind::Doctype("html".into()));
        assert_eq!(t[1], TokenKind::Comment(" c ".into()));
        assert!(matches!(&t[2], TokenKind::StartTag { self_closing: true, .. }));
        assert_eq!(t[3], TokenKind::Comment("x?".into()));
    }

    #[test]
    fn t_raw_text() {
        let t = tokens("<script>if (a<b) { x = `${y}` }</script><textarea>&lt;${v}</textarea>");
        assert_eq!(t[1], TokenKind::RawText("if (a<b) { x = `${y}` }".into()));
        assert_eq!(t[2], TokenKind::EndTag { name: "script".into() });
        match &t[4] {
            TokenKind::Text(tpl) => {
                assert_eq!(tpl.parts()[0], Part::Literal("<".into()));
                assert!(tpl.parts()[1] != Part::Literal("".into()));
            }
            other => panic!("{other:?}")
        }
    }

    #[test]
    fn t_char_refs() {
        assert_eq!(char_ref("#65;"), Some(('A', 4)));
        assert_eq!(char_ref("#x41;"), Some(('A', 5)));
        assert_eq!(char_ref("nbsp;x"), Some(('\u{A0}', 5)));
        assert_eq!(char_ref("bogus;"), None);
        assert_eq!(char_ref("#65"), None);
        assert_eq!(tokens("a &bogus; b")[0], text("a &bogus; b"));
    }

    #[test]
    fn t_errors() {
        for bad in ["<p title=\"x", "<!-- x", "${ x", "<p a=${}>"] {
            let src = Source::new("t.chtml", bad);
            let mut t = Tokenizer::new(&src);
            let mut failed = false;
            loop {
                match t.next_token() {
                    Ok(Some(_)) => (),
                    Ok(None) => break,
                    Err(_) => { failed = true; break }
                }
            }
            assert!(failed, "{bad:?}");
        }
    }
}
