//! Canonical identifier names. `some-arg-1`, `someArg1` and
//! `some_arg_1` all denote the same binding, `some_arg_1`.

use std::borrow::Cow;

use kstring::KString;

fn is_boundary(prev: char, c: char, next: Option<char>) -> bool {
    (prev.is_lowercase() && c.is_uppercase())
        || (prev.is_alphabetic() && c.is_ascii_digit())
        || (prev.is_ascii_digit() && c.is_alphabetic())
        // "HTMLParser": split before the 'P'
        || (prev.is_uppercase() && c.is_uppercase()
            && next.map_or(false, |n| n.is_lowercase()))
}

/// Split on `-`/`_` and camelCase boundaries, lower-case, join with
/// `_`. A lone `_` stays as it is.
pub fn canonical_name(s: &str) -> KString {
    if s == "_" {
        return KString::from_static("_")
    }
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    let mut word_open = false;
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == '_' {
            word_open = false;
            continue;
        }
        let starts_word =
            if !word_open {
                true
            } else {
                let prev = chars[i - 1]; // word_open implies i > 0
                is_boundary(prev, c, chars.get(i + 1).copied())
            };
        if starts_word && !out.is_empty() {
            out.push('_');
        }
        out.extend(c.to_lowercase());
        word_open = true;
    }
    KString::from_string(out)
}

pub fn is_canonical(s: &str) -> bool {
    canonical_name(s) == s
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Rewrite the identifiers in an expression to their canonical form,
/// leaving string literals, numbers and member names (after `.`)
/// alone. Returns the input unchanged when nothing needed rewriting.
pub fn canonicalize_expression(expr: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(expr.len());
    let mut changed = false;
    let mut chars = expr.char_indices().peekable();
    let mut last_significant: Option<char> = None;
    while let Some((i, c)) = chars.next() {
        if c == '"' || c == '\'' || c == '`' {
            out.push(c);
            let mut escaped = false;
            for (_, c2) in chars.by_ref() {
                out.push(c2);
                if escaped {
                    escaped = false;
                } else if c2 == '\\' {
                    escaped = true;
                } else if c2 == c {
                    break;
                }
            }
            last_significant = Some(c);
        } else if c.is_ascii_digit() {
            out.push(c);
            while let Some(&(_, c2)) = chars.peek() {
                if c2.is_alphanumeric() || c2 == '.' || c2 == '_' {
                    out.push(c2);
                    chars.next();
                } else {
                    break;
                }
            }
            last_significant = Some('0');
        } else if is_ident_start(c) {
            let start = i;
            let mut end = i + c.len_utf8();
            while let Some(&(j, c2)) = chars.peek() {
                if is_ident_continue(c2) {
                    end = j + c2.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let ident = &expr[start..end];
            if last_significant == Some('.') {
                out.push_str(ident);
            } else {
                let canon = canonical_name(ident);
                if canon != ident {
                    changed = true;
                }
                out.push_str(&canon);
            }
            last_significant = Some('a');
        } else {
            out.push(c);
            if !c.is_whitespace() {
                last_significant = Some(c);
            }
        }
    }
    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(expr)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_canonical_name() {
        for s in ["some-arg-1", "someArg1", "some_arg_1", "SomeArg1", "some-Arg_1"] {
            assert_eq!(canonical_name(s).as_str(), "some_arg_1", "for {s:?}");
        }
        assert_eq!(canonical_name("_").as_str(), "_");
        assert_eq!(canonical_name("HTMLParser").as_str(), "html_parser");
        assert_eq!(canonical_name("title").as_str(), "title");
        assert_eq!(canonical_name("x").as_str(), "x");
    }

    #[test]
    fn t_canonical_is_stable() {
        for s in ["someArg1", "a-b-c", "HTMLParser", "_", "foo__bar"] {
            let c = canonical_name(s);
            assert_eq!(canonical_name(&c), c);
            assert!(is_canonical(&c));
        }
    }

    #[test]
    fn t_canonicalize_expression() {
        assert_eq!(canonicalize_expression("someArg1 + 1"), "some_arg_1 + 1");
        assert_eq!(canonicalize_expression("user.firstName"), "user.firstName");
        assert_eq!(canonicalize_expression("myList[0].fooBar"), "my_list[0].fooBar");
        assert_eq!(canonicalize_expression("'someArg' + x"), "'someArg' + x");
        assert_eq!(canonicalize_expression("1.5e3 + aB"), "1.5e3 + a_b");
        assert!(matches!(canonicalize_expression("a + b"), Cow::Borrowed(_)));
    }
}
