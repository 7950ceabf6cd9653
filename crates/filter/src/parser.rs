//! Recursive-descent parser for the filter expression language.
//!
//! Precedence, loosest to tightest: pipe, or, and, not, comparison,
//! additive, multiplicative, exponent (right-assoc), unary minus, accessor.
//! Constructor bodies and call arguments restart at the level below pipe,
//! so a pipe inside `[…]`, `{…}` or an argument needs parentheses.

use spg_domain::error::{ErrorKind, Result};

use crate::ast::{BinOp, Expr};
use crate::token::{lex, Token};

pub fn parse(source: &str) -> Result<Expr> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.pipe()?;
    if parser.pos != parser.tokens.len() {
        return Err(ErrorKind::FilterFailed(format!(
            "unexpected trailing input near token {}",
            parser.pos
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(ErrorKind::FilterFailed(format!(
                "expected {expected:?}, found {:?}",
                self.peek()
            )))
        }
    }

    // ── Precedence ladder ────────────────────────────────────────────

    fn pipe(&mut self) -> Result<Expr> {
        let mut expr = self.or()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.or()?;
            expr = Expr::Pipe(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut expr = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            expr = Expr::Binary(BinOp::Or, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut expr = self.not()?;
        while self.eat(&Token::And) {
            let rhs = self.not()?;
            expr = Expr::Binary(BinOp::And, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            let inner = self.not()?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.comparison()
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut expr = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::Ne) => BinOp::Ne,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Ge) => BinOp::Ge,
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::In) => BinOp::In,
                // `not in`: only when `not` is directly followed by `in`.
                Some(Token::Not) if self.tokens.get(self.pos + 1) == Some(&Token::In) => {
                    self.pos += 1;
                    BinOp::NotIn
                }
                _ => break,
            };
            self.pos += 1;
            let rhs = self.additive()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut expr = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut expr = self.power()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.power()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.unary()?;
        if self.eat(&Token::Caret) {
            let exp = self.power()?;
            Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)))
        } else {
            Ok(base)
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let inner = self.unary()?;
            Ok(Expr::Neg(Box::new(inner)))
        } else {
            self.postfix()
        }
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            let seg = self.segment()?;
            expr = Expr::Access(Box::new(expr), seg);
        }
        Ok(expr)
    }

    fn segment(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(Token::Str(name)) => Ok(name),
            other => Err(ErrorKind::FilterFailed(format!(
                "expected field name after '.', found {other:?}"
            ))),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Null) => Ok(Expr::Null),
            Some(Token::Param(name)) => Ok(Expr::Param(name)),
            Some(Token::Dot) => {
                // `.name` path or the bare identity `.`.
                match self.peek() {
                    Some(Token::Ident(_)) | Some(Token::Str(_)) => {
                        let seg = self.segment()?;
                        Ok(Expr::Access(Box::new(Expr::Identity), seg))
                    }
                    _ => Ok(Expr::Identity),
                }
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.pipe()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    // Bare name is a zero-argument call (`keys`, `reverse`).
                    Ok(Expr::Call(name, Vec::new()))
                }
            }
            Some(Token::LParen) => {
                let expr = self.pipe()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.or()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Some(Token::LBrace) => {
                let mut pairs = Vec::new();
                if self.peek() != Some(&Token::RBrace) {
                    loop {
                        let key = match self.next() {
                            Some(Token::Ident(k)) => k,
                            Some(Token::Str(k)) => k,
                            other => {
                                return Err(ErrorKind::FilterFailed(format!(
                                    "expected object key, found {other:?}"
                                )))
                            }
                        };
                        self.expect(Token::Colon)?;
                        let value = self.or()?;
                        pairs.push((key, value));
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::Object(pairs))
            }
            other => Err(ErrorKind::FilterFailed(format!(
                "unexpected token {other:?}"
            ))),
        }
    }
}
