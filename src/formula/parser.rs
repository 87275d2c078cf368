//! Parsers for the LTL surface syntax and for literal-level guard formulas.
//!
//! The LTL parser accepts `G X F U W R ! & | -> <->` with theory atoms in
//! square brackets; `F`, `R` and `W` are sugar and desugared right here, so
//! the tree handed onwards only carries the core operator set. The guard
//! parser reads the propositional formulas of the backend's transitions and
//! of the persisted automaton format: symbols, `t`/`f`, `! & |`.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::theory::parser::parse_term;
use crate::theory::VarType;

const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Globally,
    Next,
    Finally,
    Until,
    WeakUntil,
    Release,
    Not,
    And,
    Or,
    Implies,
    Iff,
    LParen,
    RParen,
    Atom(String),
    Sym(String),
}

fn tokenize_ltl(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            'G' => {
                chars.next();
                tokens.push(Token::Globally);
            }
            'X' => {
                chars.next();
                tokens.push(Token::Next);
            }
            'F' => {
                chars.next();
                tokens.push(Token::Finally);
            }
            'U' => {
                chars.next();
                tokens.push(Token::Until);
            }
            'W' => {
                chars.next();
                tokens.push(Token::WeakUntil);
            }
            'R' => {
                chars.next();
                tokens.push(Token::Release);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' => {
                chars.next();
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Or);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '-' => {
                chars.next();
                match chars.next() {
                    Some((_, '>')) => tokens.push(Token::Implies),
                    _ => return Err(Error::Parse("expected '>' after '-'".into())),
                }
            }
            '<' => {
                chars.next();
                match (chars.next(), chars.next()) {
                    (Some((_, '-')), Some((_, '>'))) => tokens.push(Token::Iff),
                    _ => return Err(Error::Parse("expected '->' after '<'".into())),
                }
            }
            '[' => {
                let rest = &src[pos + 1..];
                let end = rest
                    .find(']')
                    .ok_or_else(|| Error::Parse("unterminated '[' atom".into()))?;
                tokens.push(Token::Atom(rest[..end].to_string()));
                for _ in 0..end + 2 {
                    chars.next();
                }
            }
            other => {
                return Err(Error::Parse(format!(
                    "unexpected character '{}' in formula",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

fn tokenize_guard(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' => {
                chars.next();
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Or);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Sym(name));
            }
            other => {
                return Err(Error::Parse(format!(
                    "unexpected character '{}' in guard",
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
    vars: Option<&'a HashMap<String, VarType>>,
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

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::Parse("formula too deeply nested".into()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn iff_expr(&mut self) -> Result<Formula> {
        self.enter()?;
        let mut formula = self.impl_expr()?;
        while self.peek() == Some(&Token::Iff) {
            self.next();
            let rhs = self.impl_expr()?;
            formula = formula.iff(rhs);
        }
        self.leave();
        Ok(formula)
    }

    fn impl_expr(&mut self) -> Result<Formula> {
        let lhs = self.or_expr()?;
        if self.peek() == Some(&Token::Implies) {
            self.next();
            self.enter()?;
            let rhs = self.impl_expr()?;
            self.leave();
            return Ok(lhs.implies(rhs));
        }
        Ok(lhs)
    }

    fn or_expr(&mut self) -> Result<Formula> {
        let mut formula = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            formula = formula.or(self.and_expr()?);
        }
        Ok(formula)
    }

    fn and_expr(&mut self) -> Result<Formula> {
        let mut formula = self.until_expr()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            formula = formula.and(self.until_expr()?);
        }
        Ok(formula)
    }

    fn until_expr(&mut self) -> Result<Formula> {
        let lhs = self.unary_expr()?;
        match self.peek() {
            Some(Token::Until) => {
                self.next();
                self.enter()?;
                let rhs = self.until_expr()?;
                self.leave();
                Ok(lhs.until(rhs))
            }
            Some(Token::WeakUntil) => {
                self.next();
                self.enter()?;
                let rhs = self.until_expr()?;
                self.leave();
                // p W q = (p U q) | G p
                Ok(lhs.clone().until(rhs).or(lhs.globally()))
            }
            Some(Token::Release) => {
                self.next();
                self.enter()?;
                let rhs = self.until_expr()?;
                self.leave();
                // p R q = !(!p U !q)
                Ok(lhs.neg().until(rhs.neg()).neg())
            }
            _ => Ok(lhs),
        }
    }

    fn unary_expr(&mut self) -> Result<Formula> {
        let op = match self.peek() {
            Some(Token::Not) => Some(Token::Not),
            Some(Token::Globally) => Some(Token::Globally),
            Some(Token::Next) => Some(Token::Next),
            Some(Token::Finally) => Some(Token::Finally),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            self.enter()?;
            let inner = self.unary_expr()?;
            self.leave();
            return Ok(match op {
                Token::Not => inner.neg(),
                Token::Globally => inner.globally(),
                Token::Next => inner.next(),
                // F p = t U p
                Token::Finally => Formula::tt().until(inner),
                _ => unreachable!(),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Formula> {
        match self.next() {
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.iff_expr()?;
                self.leave();
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(Error::Parse(format!("expected ')', found {:?}", other))),
                }
            }
            Some(Token::Atom(src)) => {
                let vars = self
                    .vars
                    .expect("atoms only appear in the LTL surface syntax");
                let term = parse_term(&src, vars)?;
                Formula::from_term(&term)
            }
            Some(Token::Sym(name)) => Ok(Formula::sym(name)),
            other => Err(Error::Parse(format!(
                "expected formula, found {:?}",
                other
            ))),
        }
    }
}

/// Parse an LTL property against the given variable declarations.
///
/// # Errors
///
/// Besides syntax errors, fails when a history reference is not covered by
/// enough `X` operators.
pub fn parse_ltl(src: &str, vars: &HashMap<String, VarType>) -> Result<Formula> {
    let tokens = tokenize_ltl(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        vars: Some(vars),
        depth: 0,
    };
    let formula = parser.iff_expr()?;
    if let Some(token) = parser.peek() {
        return Err(Error::Parse(format!("trailing input at {:?}", token)));
    }
    if !formula.check_fetch_level() {
        return Err(Error::Parse(
            "history reference deeper than its X nesting".into(),
        ));
    }
    Ok(formula)
}

/// Parse a literal-level guard formula (`t`, `f`, symbols, `! & |`).
pub fn parse_guard(src: &str) -> Result<Formula> {
    let tokens = tokenize_guard(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        vars: None,
        depth: 0,
    };
    let formula = parser.or_expr()?;
    match parser.peek() {
        None => Ok(formula),
        Some(token) => Err(Error::Parse(format!("trailing input at {:?}", token))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::Term;

    fn vars() -> HashMap<String, VarType> {
        let mut map = HashMap::new();
        map.insert("d".to_string(), VarType::Int);
        map.insert("r".to_string(), VarType::Int);
        map
    }

    fn lt(a: &str, b: &str) -> Term {
        Term::var(a, VarType::Int).lt(Term::var(b, VarType::Int))
    }

    #[test]
    fn parses_globally_with_normalized_atom() {
        let f = parse_ltl("G ([r <= d])", &vars()).unwrap();
        assert_eq!(f, Formula::atom(lt("d", "r")).neg().globally());
    }

    #[test]
    fn finally_desugars_to_until() {
        let f = parse_ltl("F ([r < d])", &vars()).unwrap();
        assert_eq!(f, Formula::tt().until(Formula::atom(lt("r", "d"))));
    }

    #[test]
    fn release_and_weak_until_desugar() {
        let p = Formula::atom(lt("r", "d"));
        let q = Formula::atom(lt("d", "r"));
        let released = parse_ltl("[r < d] R [d < r]", &vars()).unwrap();
        assert_eq!(released, p.clone().neg().until(q.clone().neg()).neg());
        let weak = parse_ltl("[r < d] W [d < r]", &vars()).unwrap();
        assert_eq!(weak, p.clone().until(q).or(p.globally()));
    }

    #[test]
    fn conjunction_binds_tighter_than_implication() {
        let f = parse_ltl("[r < d] & [d < r] -> X [r < d]", &vars()).unwrap();
        assert!(matches!(f, Formula::Implies(_, _)));
    }

    #[test]
    fn history_reference_requires_matching_next() {
        assert!(parse_ltl("G ([y(d) < d])", &vars()).is_err());
        assert!(parse_ltl("G (X [y(d) < d])", &vars()).is_ok());
    }

    #[test]
    fn guard_parser_round_trips_display() {
        for src in ["(l0 & !(l1))", "t", "((l0 | l1) & !(l2))"] {
            let guard = parse_guard(src).unwrap();
            assert_eq!(parse_guard(&guard.to_string()).unwrap(), guard);
        }
    }
}
