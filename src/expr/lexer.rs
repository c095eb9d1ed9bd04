//! Tokens of the expression language.

use kstring::KString;

use super::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    Ident(KString),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Question,
    QuestionQuestion,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    /// byte offset into the expression
    pub offset: usize,
}

pub fn syntax_error(expr: &str, offset: usize, message: impl Into<String>) -> EvalError {
    EvalError::Syntax { expr: expr.into(), offset, message: message.into() }
}

fn keyword(s: &str) -> Option<Tok> {
    Some(match s {
        "true" => Tok::True,
        "false" => Tok::False,
        "null" | "undefined" => Tok::Null,
        "and" => Tok::And,
        "or" => Tok::Or,
        "not" => Tok::Not,
        "in" => Tok::In,
        _ => return None
    })
}

pub fn tokenize(expr: &str) -> Result<Vec<Token>, EvalError> {
    let bytes = expr.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let next = bytes.get(i + 1).copied();
        let two = |a: u8, b: u8| c == a && next == Some(b);
        let tok = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'0'..=b'9' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.'
                                          || bytes[i] == b'_') {
                    // `1.foo` is not a number continuation, but `1.5` is
                    if bytes[i] == b'.' && !bytes.get(i + 1).map_or(false, u8::is_ascii_digit) {
                        break
                    }
                    i += 1;
                }
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = expr[start..i].replace('_', "");
                let n: f64 = text.parse().map_err(
                    |_| syntax_error(expr, start, format!("invalid number {text:?}")))?;
                tokens.push(Token { tok: Tok::Number(n), offset: start });
                continue;
            }
            b'"' | b'\'' | b'`' => {
                let q = c;
                let mut s = String::new();
                i += 1;
                loop {
                    let ch = match expr[i..].chars().next() {
                        Some(ch) => ch,
                        None => return Err(syntax_error(expr, start, "unterminated string")),
                    };
                    i += ch.len_utf8();
                    if ch as u32 == q as u32 {
                        break
                    }
                    if ch == '\\' {
                        let esc = expr[i..].chars().next().ok_or_else(
                            || syntax_error(expr, start, "unterminated string"))?;
                        i += esc.len_utf8();
                        s.push(match esc {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '0' => '\0',
                            other => other,
                        });
                    } else {
                        s.push(ch);
                    }
                }
                tokens.push(Token { tok: Tok::Str(s), offset: start });
                continue;
            }
            _ if two(b'?', b'?') => { i += 2; Tok::QuestionQuestion }
            _ if two(b'=', b'=') => {
                i += 2;
                if bytes.get(i) == Some(&b'=') { i += 1; }
                Tok::EqEq
            }
            _ if two(b'!', b'=') => {
                i += 2;
                if bytes.get(i) == Some(&b'=') { i += 1; }
                Tok::NotEq
            }
            _ if two(b'<', b'=') => { i += 2; Tok::Le }
            _ if two(b'>', b'=') => { i += 2; Tok::Ge }
            _ if two(b'&', b'&') => { i += 2; Tok::AndAnd }
            _ if two(b'|', b'|') => { i += 2; Tok::OrOr }
            b'(' => { i += 1; Tok::LParen }
            b')' => { i += 1; Tok::RParen }
            b'[' => { i += 1; Tok::LBracket }
            b']' => { i += 1; Tok::RBracket }
            b'{' => { i += 1; Tok::LBrace }
            b'}' => { i += 1; Tok::RBrace }
            b',' => { i += 1; Tok::Comma }
            b'.' => { i += 1; Tok::Dot }
            b':' => { i += 1; Tok::Colon }
            b'?' => { i += 1; Tok::Question }
            b'!' => { i += 1; Tok::Bang }
            b'+' => { i += 1; Tok::Plus }
            b'-' => { i += 1; Tok::Minus }
            b'*' => { i += 1; Tok::Star }
            b'/' => { i += 1; Tok::Slash }
            b'%' => { i += 1; Tok::Percent }
            b'<' => { i += 1; Tok::Lt }
            b'>' => { i += 1; Tok::Gt }
            _ => {
                let ch = expr[i..].chars().next().expect("i < len");
                if ch.is_alphabetic() || ch == '_' || ch == '$' {
                    let rest = &expr[i..];
                    let len = rest.find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                        .unwrap_or(rest.len());
                    let word = &rest[..len];
                    i += len;
                    match keyword(word) {
                        Some(t) => t,
                        None => Tok::Ident(KString::from_ref(word)),
                    }
                } else {
                    return Err(syntax_error(expr, i, format!("unexpected character {ch:?}")))
                }
            }
        };
        tokens.push(Token { tok, offset: start });
    }
    tokens.push(Token { tok: Tok::Eof, offset: expr.len() });
    Ok(tokens)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<Tok> {
        tokenize(s).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn t_tokenize() {
        assert_eq!(toks("n+1"), vec![Tok::Ident("n".into()), Tok::Plus, Tok::Number(1.), Tok::Eof]);
        assert_eq!(toks("a.b[0] ?? 'x\\'y'"),
                   vec![Tok::Ident("a".into()), Tok::Dot, Tok::Ident("b".into()),
                        Tok::LBracket, Tok::Number(0.), Tok::RBracket,
                        Tok::QuestionQuestion, Tok::Str("x'y".into()), Tok::Eof]);
        assert_eq!(toks("1.5e3 === 1_500"), vec![Tok::Number(1500.), Tok::EqEq,
                                                  Tok::Number(1500.), Tok::Eof]);
        assert_eq!(toks("x in xs and not y"),
                   vec![Tok::Ident("x".into()), Tok::In, Tok::Ident("xs".into()),
                        Tok::And, Tok::Not, Tok::Ident("y".into()), Tok::Eof]);
    }

    #[test]
    fn t_errors() {
        assert!(matches!(tokenize("'abc"), Err(EvalError::Syntax { offset: 0, .. })));
        assert!(matches!(tokenize("a # b"), Err(EvalError::Syntax { offset: 2, .. })));
    }
}
