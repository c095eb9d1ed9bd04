//! Expression syntax tree and a precedence climbing parser.

use kstring::KString;

use crate::value::Value;
use super::{EvalError, lexer::{Tok, Token, tokenize, syntax_error}};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Coalesce,
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    fn from_tok(tok: &Tok) -> Option<BinOp> {
        Some(match tok {
            Tok::QuestionQuestion => BinOp::Coalesce,
            Tok::OrOr | Tok::Or => BinOp::Or,
            Tok::AndAnd | Tok::And => BinOp::And,
            Tok::EqEq => BinOp::Eq,
            Tok::NotEq => BinOp::NotEq,
            Tok::Lt => BinOp::Lt,
            Tok::Le => BinOp::Le,
            Tok::Gt => BinOp::Gt,
            Tok::Ge => BinOp::Ge,
            Tok::In => BinOp::In,
            Tok::Plus => BinOp::Add,
            Tok::Minus => BinOp::Sub,
            Tok::Star => BinOp::Mul,
            Tok::Slash => BinOp::Div,
            Tok::Percent => BinOp::Rem,
            _ => return None
        })
    }

    /// Higher binds tighter; all binary operators are left associative.
    fn precedence(self) -> u8 {
        match self {
            BinOp::Coalesce => 1,
            BinOp::Or => 2,
            BinOp::And => 3,
            BinOp::Eq | BinOp::NotEq => 4,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::In => 5,
            BinOp::Add | BinOp::Sub => 6,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(KString),
    Array(Vec<Expr>),
    Object(Vec<(KString, Expr)>),
    Member(Box<Expr>, KString),
    Index(Box<Expr>, Box<Expr>),
    Call(KString, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
}

struct Parser<'e> {
    expr: &'e str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'e> Parser<'e> {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Tok {
        let t = self.tokens[self.pos].tok.clone();
        if t != Tok::Eof {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<(), EvalError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(format!("expecting {what}")))
        }
    }

    fn error(&self, message: String) -> EvalError {
        syntax_error(self.expr, self.offset(), message)
    }

    fn expression(&mut self) -> Result<Expr, EvalError> {
        let cond = self.binary(1)?;
        if self.eat(&Tok::Question) {
            let then = self.expression()?;
            self.expect(&Tok::Colon, "':'")?;
            let els = self.expression()?;
            Ok(Expr::Cond(Box::new(cond), Box::new(then), Box::new(els)))
        } else {
            Ok(cond)
        }
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr, EvalError> {
        let mut left = self.unary()?;
        while let Some(op) = BinOp::from_tok(self.peek()) {
            let prec = op.precedence();
            if prec < min_prec {
                break
            }
            self.advance();
            let right = self.binary(prec + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Tok::Bang | Tok::Not => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            Tok::Minus => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            Tok::Plus => {
                self.advance();
                self.unary()
            }
            _ => self.postfix()
        }
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let mut e = self.primary()?;
        loop {
            match self.peek() {
                Tok::Dot => {
                    self.advance();
                    match self.advance() {
                        Tok::Ident(name) => e = Expr::Member(Box::new(e), name),
                        // keywords are fine as member names
                        Tok::In => e = Expr::Member(Box::new(e), "in".into()),
                        _ => return Err(self.error("expecting a member name".into()))
                    }
                }
                Tok::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&Tok::RBracket, "']'")?;
                    e = Expr::Index(Box::new(e), Box::new(index));
                }
                Tok::LParen => {
                    let name = match &e {
                        Expr::Ident(name) => name.clone(),
                        _ => return Err(self.error("only builtin functions can be called".into()))
                    };
                    self.advance();
                    let args = self.list(&Tok::RParen, "')'")?;
                    e = Expr::Call(name, args);
                }
                _ => return Ok(e)
            }
        }
    }

    // after the opening token
    fn list(&mut self, close: &Tok, what: &str) -> Result<Vec<Expr>, EvalError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items)
        }
        loop {
            items.push(self.expression()?);
            if self.eat(close) {
                return Ok(items)
            }
            self.expect(&Tok::Comma, &format!("',' or {what}"))?;
            if self.eat(close) {
                return Ok(items)
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let offset = self.offset();
        match self.advance() {
            Tok::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Tok::Str(s) => Ok(Expr::Literal(Value::from(s))),
            Tok::True => Ok(Expr::Literal(Value::Bool(true))),
            Tok::False => Ok(Expr::Literal(Value::Bool(false))),
            Tok::Null => Ok(Expr::Literal(Value::Null)),
            Tok::Ident(name) => Ok(Expr::Ident(name)),
            Tok::LParen => {
                let e = self.expression()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(e)
            }
            Tok::LBracket => Ok(Expr::Array(self.list(&Tok::RBracket, "']'")?)),
            Tok::LBrace => {
                let mut fields = Vec::new();
                if self.eat(&Tok::RBrace) {
                    return Ok(Expr::Object(fields))
                }
                loop {
                    let key = match self.advance() {
                        Tok::Ident(k) => k,
                        Tok::Str(s) => KString::from_string(s),
                        _ => return Err(self.error("expecting a field name".into()))
                    };
                    self.expect(&Tok::Colon, "':'")?;
                    fields.push((key, self.expression()?));
                    if self.eat(&Tok::RBrace) {
                        break
                    }
                    self.expect(&Tok::Comma, "',' or '}'")?;
                    if self.eat(&Tok::RBrace) {
                        break
                    }
                }
                Ok(Expr::Object(fields))
            }
            Tok::Eof => Err(syntax_error(self.expr, offset, "unexpected end of expression")),
            t => Err(syntax_error(self.expr, offset, format!("unexpected token {t:?}"))),
        }
    }
}

pub fn parse(expr: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(expr)?;
    let mut p = Parser { expr, tokens, pos: 0 };
    let e = p.expression()?;
    if *p.peek() != Tok::Eof {
        return Err(p.error("unexpected trailing input".into()))
    }
    Ok(e)
}
