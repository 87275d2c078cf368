//! Parser for textual theory expressions.
//!
//! This is the surface syntax used for atoms inside `[..]` brackets of a
//! specification property, for the `fetch_atoms` list, and for the atom
//! table of the persisted automaton format. The sugar `y(x)` denotes the
//! value `x` held one step ago and nests (`y(y(x))`); it is resolved to the
//! lookback prefix during parsing.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::theory::{base_name, Term, VarType, FETCH_PREFIX};

/// Maximum expression nesting accepted by the parser. Deeper input is
/// rejected instead of risking unbounded recursion on adversarial input.
const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Not,
    And,
    Or,
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' => {
                chars.next();
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Or);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                tokens.push(Token::Eq);
            }
            '0'..='9' => {
                let mut value = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        value.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let parsed = value
                    .parse::<i64>()
                    .map_err(|e| Error::Parse(format!("number '{}': {}", value, e)))?;
                tokens.push(Token::Num(parsed));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            other => {
                return Err(Error::Parse(format!(
                    "unexpected character '{}' in expression",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    vars: &'a HashMap<String, VarType>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> Result<()> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(Error::Parse(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::Parse("expression too deeply nested".into()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn or_expr(&mut self) -> Result<Term> {
        self.enter()?;
        let mut term = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.and_expr()?;
            term = match term {
                Term::Or(mut ts) => {
                    ts.push(rhs);
                    Term::Or(ts)
                }
                other => Term::Or(vec![other, rhs]),
            };
        }
        self.leave();
        Ok(term)
    }

    fn and_expr(&mut self) -> Result<Term> {
        let mut term = self.not_expr()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.not_expr()?;
            term = match term {
                Term::And(mut ts) => {
                    ts.push(rhs);
                    Term::And(ts)
                }
                other => Term::And(vec![other, rhs]),
            };
        }
        Ok(term)
    }

    fn not_expr(&mut self) -> Result<Term> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            self.enter()?;
            let inner = self.not_expr()?;
            self.leave();
            return Ok(inner.negated());
        }
        self.cmp_expr()
    }

    fn cmp_expr(&mut self) -> Result<Term> {
        let lhs = self.add_expr()?;
        let op = match self.peek() {
            Some(Token::Lt) => Term::Lt,
            Some(Token::Le) => Term::Le,
            Some(Token::Gt) => Term::Gt,
            Some(Token::Ge) => Term::Ge,
            Some(Token::Eq) => Term::Eq,
            _ => return Ok(lhs),
        };
        self.next();
        let rhs = self.add_expr()?;
        Ok(op(Box::new(lhs), Box::new(rhs)))
    }

    fn add_expr(&mut self) -> Result<Term> {
        let mut term = self.mul_expr()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    term = term.add(self.mul_expr()?);
                }
                Some(Token::Minus) => {
                    self.next();
                    term = term.sub(self.mul_expr()?);
                }
                _ => return Ok(term),
            }
        }
    }

    fn mul_expr(&mut self) -> Result<Term> {
        let mut term = self.unary_expr()?;
        while self.peek() == Some(&Token::Star) {
            self.next();
            let rhs = self.unary_expr()?;
            term = Term::Mul(Box::new(term), Box::new(rhs));
        }
        Ok(term)
    }

    fn unary_expr(&mut self) -> Result<Term> {
        if self.peek() == Some(&Token::Minus) {
            self.next();
            self.enter()?;
            let inner = self.unary_expr()?;
            self.leave();
            return Ok(Term::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Term> {
        match self.next() {
            Some(Token::Num(n)) => {
                if self.peek() == Some(&Token::Slash) {
                    self.next();
                    match self.next() {
                        Some(Token::Num(d)) if d != 0 => Ok(Term::Real(n, d)),
                        other => Err(Error::Parse(format!(
                            "expected non-zero denominator, found {:?}",
                            other
                        ))),
                    }
                } else {
                    Ok(Term::Int(n))
                }
            }
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.or_expr()?;
                self.leave();
                self.eat(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Term::True),
                "false" => Ok(Term::False),
                "y" if self.peek() == Some(&Token::LParen) => self.fetch_var(),
                _ => self.variable(name),
            },
            other => Err(Error::Parse(format!(
                "expected expression, found {:?}",
                other
            ))),
        }
    }

    /// `y(x)` and its nestings resolve to a lookback-prefixed variable.
    fn fetch_var(&mut self) -> Result<Term> {
        self.eat(&Token::LParen)?;
        let inner = match self.next() {
            Some(Token::Ident(name)) => {
                if name == "y" && self.peek() == Some(&Token::LParen) {
                    self.fetch_var()?
                } else {
                    self.variable(name)?
                }
            }
            other => {
                return Err(Error::Parse(format!(
                    "history reference takes a variable, found {:?}",
                    other
                )))
            }
        };
        self.eat(&Token::RParen)?;
        match inner {
            Term::Var(name, ty) => Ok(Term::Var(format!("{}{}", FETCH_PREFIX, name), ty)),
            _ => Err(Error::Parse("history reference takes a variable".into())),
        }
    }

    fn variable(&mut self, name: String) -> Result<Term> {
        match self.vars.get(base_name(&name)) {
            Some(ty) => Ok(Term::Var(name, *ty)),
            None => Err(Error::UnknownVariable(name)),
        }
    }
}

/// Parse a theory expression against the given variable declarations.
pub fn parse_term(src: &str, vars: &HashMap<String, VarType>) -> Result<Term> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        vars,
        depth: 0,
    };
    let term = parser.or_expr()?;
    match parser.peek() {
        None => Ok(term),
        Some(token) => Err(Error::Parse(format!(
            "trailing input at {:?} in '{}'",
            token, src
        ))),
    }
}
