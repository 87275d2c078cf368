//! Z3-backed implementation of the [`TheorySolver`] contract.
//!
//! A fresh context is created per query so that no solver lifetime escapes
//! into the crate's data model; terms are translated on the way in and
//! quantifier-elimination results are lowered back to [`Term`] on the way
//! out.

use std::collections::HashMap;

use z3::ast::{forall_const, Ast, Bool, Dynamic, Int, Real};
use z3::{AstKind, Config, Context, DeclKind, Goal, SatResult, SortKind, Solver, Tactic};

use crate::error::{Error, Result};
use crate::theory::solver::{Model, TheorySolver, Value};
use crate::theory::{Term, VarType};

/// Theory solver running every query against a fresh Z3 context.
pub struct Z3Solver {
    config: Config,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

enum Arith<'ctx> {
    Int(Int<'ctx>),
    Real(Real<'ctx>),
}

fn promote<'ctx>(a: Arith<'ctx>, b: Arith<'ctx>) -> (Arith<'ctx>, Arith<'ctx>) {
    match (a, b) {
        (Arith::Int(x), Arith::Real(y)) => (Arith::Real(Real::from_int(&x)), Arith::Real(y)),
        (Arith::Real(x), Arith::Int(y)) => (Arith::Real(x), Arith::Real(Real::from_int(&y))),
        pair => pair,
    }
}

fn arith<'ctx>(ctx: &'ctx Context, term: &Term) -> Result<Arith<'ctx>> {
    match term {
        Term::Var(name, VarType::Int) => Ok(Arith::Int(Int::new_const(ctx, name.as_str()))),
        Term::Var(name, VarType::Real) => Ok(Arith::Real(Real::new_const(ctx, name.as_str()))),
        Term::Int(v) => Ok(Arith::Int(Int::from_i64(ctx, *v))),
        Term::Real(n, d) => {
            let num = Real::from_int(&Int::from_i64(ctx, *n));
            let den = Real::from_int(&Int::from_i64(ctx, *d));
            Ok(Arith::Real(num / den))
        }
        Term::Add(a, b) => arith_binary(ctx, a, b, |x, y| x + y, |x, y| x + y),
        Term::Sub(a, b) => arith_binary(ctx, a, b, |x, y| x - y, |x, y| x - y),
        Term::Mul(a, b) => arith_binary(ctx, a, b, |x, y| x * y, |x, y| x * y),
        Term::Neg(a) => match arith(ctx, a)? {
            Arith::Int(x) => Ok(Arith::Int(-x)),
            Arith::Real(x) => Ok(Arith::Real(-x)),
        },
        other => Err(Error::UnhandledShape(format!(
            "arithmetic operand expected, got {}",
            other
        ))),
    }
}

fn arith_binary<'ctx, FI, FR>(
    ctx: &'ctx Context,
    a: &Term,
    b: &Term,
    int_op: FI,
    real_op: FR,
) -> Result<Arith<'ctx>>
where
    FI: FnOnce(Int<'ctx>, Int<'ctx>) -> Int<'ctx>,
    FR: FnOnce(Real<'ctx>, Real<'ctx>) -> Real<'ctx>,
{
    match promote(arith(ctx, a)?, arith(ctx, b)?) {
        (Arith::Int(x), Arith::Int(y)) => Ok(Arith::Int(int_op(x, y))),
        (Arith::Real(x), Arith::Real(y)) => Ok(Arith::Real(real_op(x, y))),
        _ => unreachable!("promote yields matching sorts"),
    }
}

fn compare<'ctx, FI, FR>(
    ctx: &'ctx Context,
    a: &Term,
    b: &Term,
    int_cmp: FI,
    real_cmp: FR,
) -> Result<Bool<'ctx>>
where
    FI: FnOnce(&Int<'ctx>, &Int<'ctx>) -> Bool<'ctx>,
    FR: FnOnce(&Real<'ctx>, &Real<'ctx>) -> Bool<'ctx>,
{
    match promote(arith(ctx, a)?, arith(ctx, b)?) {
        (Arith::Int(x), Arith::Int(y)) => Ok(int_cmp(&x, &y)),
        (Arith::Real(x), Arith::Real(y)) => Ok(real_cmp(&x, &y)),
        _ => unreachable!("promote yields matching sorts"),
    }
}

fn translate<'ctx>(ctx: &'ctx Context, term: &Term) -> Result<Bool<'ctx>> {
    match term {
        Term::True => Ok(Bool::from_bool(ctx, true)),
        Term::False => Ok(Bool::from_bool(ctx, false)),
        Term::Lt(a, b) => compare(ctx, a, b, Int::lt, Real::lt),
        Term::Le(a, b) => compare(ctx, a, b, Int::le, Real::le),
        Term::Gt(a, b) => compare(ctx, a, b, Int::gt, Real::gt),
        Term::Ge(a, b) => compare(ctx, a, b, Int::ge, Real::ge),
        Term::Eq(a, b) => match promote(arith(ctx, a)?, arith(ctx, b)?) {
            (Arith::Int(x), Arith::Int(y)) => Ok(x._eq(&y)),
            (Arith::Real(x), Arith::Real(y)) => Ok(x._eq(&y)),
            _ => unreachable!("promote yields matching sorts"),
        },
        Term::Not(a) => Ok(translate(ctx, a)?.not()),
        Term::And(ts) => {
            let parts = ts
                .iter()
                .map(|t| translate(ctx, t))
                .collect::<Result<Vec<_>>>()?;
            let refs: Vec<&Bool> = parts.iter().collect();
            Ok(Bool::and(ctx, &refs))
        }
        Term::Or(ts) => {
            let parts = ts
                .iter()
                .map(|t| translate(ctx, t))
                .collect::<Result<Vec<_>>>()?;
            let refs: Vec<&Bool> = parts.iter().collect();
            Ok(Bool::or(ctx, &refs))
        }
        Term::Implies(a, b) => Ok(translate(ctx, a)?.implies(&translate(ctx, b)?)),
        Term::Forall(vs, body) => quantified(ctx, vs, body, true),
        Term::Exists(vs, body) => quantified(ctx, vs, body, false),
        other => Err(Error::UnhandledShape(format!(
            "boolean term expected, got {}",
            other
        ))),
    }
}

fn quantified<'ctx>(
    ctx: &'ctx Context,
    vars: &[(String, VarType)],
    body: &Term,
    universal: bool,
) -> Result<Bool<'ctx>> {
    let consts: Vec<Dynamic> = vars
        .iter()
        .map(|(name, ty)| match ty {
            VarType::Int => Int::new_const(ctx, name.as_str()).into(),
            VarType::Real => Real::new_const(ctx, name.as_str()).into(),
        })
        .collect();
    let bounds: Vec<&dyn Ast> = consts.iter().map(|c| c as &dyn Ast).collect();
    let body = translate(ctx, body)?;
    if universal {
        Ok(forall_const(ctx, &bounds, &[], &body))
    } else {
        Ok(z3::ast::exists_const(ctx, &bounds, &[], &body))
    }
}

/// Lower a quantifier-free Z3 expression back into a [`Term`].
fn lower(ast: &Dynamic) -> Result<Term> {
    match ast.kind() {
        AstKind::Numeral => {
            if let Some(int) = ast.as_int() {
                let v = int
                    .as_i64()
                    .ok_or_else(|| Error::UnhandledShape("integer numeral overflow".into()))?;
                return Ok(Term::Int(v));
            }
            if let Some(real) = ast.as_real() {
                if let Some((n, d)) = real.as_real() {
                    return Ok(Term::Real(n, d));
                }
            }
            Err(Error::UnhandledShape("unsupported numeral sort".into()))
        }
        AstKind::App => {
            let children = ast
                .children()
                .iter()
                .map(lower)
                .collect::<Result<Vec<_>>>()?;
            let decl = ast.decl();
            match decl.kind() {
                DeclKind::TRUE => Ok(Term::True),
                DeclKind::FALSE => Ok(Term::False),
                DeclKind::AND => Ok(Term::and(children)),
                DeclKind::OR => Ok(Term::Or(children)),
                DeclKind::NOT => Ok(only(children)?.negated()),
                DeclKind::IMPLIES => {
                    let (a, b) = pair(children)?;
                    Ok(a.implies(b))
                }
                DeclKind::LE => binary(children, Term::Le),
                DeclKind::GE => binary(children, Term::Ge),
                DeclKind::LT => binary(children, Term::Lt),
                DeclKind::GT => binary(children, Term::Gt),
                DeclKind::EQ => binary(children, Term::Eq),
                DeclKind::ADD => Ok(fold_binary(children, Term::Add)?),
                DeclKind::SUB => Ok(fold_binary(children, Term::Sub)?),
                DeclKind::MUL => Ok(fold_binary(children, Term::Mul)?),
                DeclKind::UMINUS => Ok(Term::Neg(Box::new(only(children)?))),
                DeclKind::UNINTERPRETED if children.is_empty() => {
                    let ty = match ast.get_sort().kind() {
                        SortKind::Int => VarType::Int,
                        SortKind::Real => VarType::Real,
                        kind => {
                            return Err(Error::UnhandledShape(format!(
                                "variable of sort {:?}",
                                kind
                            )))
                        }
                    };
                    Ok(Term::Var(decl.name(), ty))
                }
                kind => Err(Error::UnhandledShape(format!(
                    "operator {:?} in solver result",
                    kind
                ))),
            }
        }
        kind => Err(Error::UnhandledShape(format!(
            "ast of kind {:?} in solver result",
            kind
        ))),
    }
}

fn only(mut children: Vec<Term>) -> Result<Term> {
    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Err(Error::UnhandledShape("unary operator arity".into()))
    }
}

fn pair(mut children: Vec<Term>) -> Result<(Term, Term)> {
    if children.len() == 2 {
        let b = children.remove(1);
        let a = children.remove(0);
        Ok((a, b))
    } else {
        Err(Error::UnhandledShape("binary operator arity".into()))
    }
}

fn binary<F>(children: Vec<Term>, make: F) -> Result<Term>
where
    F: FnOnce(Box<Term>, Box<Term>) -> Term,
{
    let (a, b) = pair(children)?;
    Ok(make(Box::new(a), Box::new(b)))
}

fn fold_binary<F>(children: Vec<Term>, make: F) -> Result<Term>
where
    F: Fn(Box<Term>, Box<Term>) -> Term,
{
    let mut iter = children.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| Error::UnhandledShape("empty operator application".into()))?;
    Ok(iter.fold(first, |acc, t| make(Box::new(acc), Box::new(t))))
}

impl TheorySolver for Z3Solver {
    fn is_sat(&self, term: &Term) -> Result<bool> {
        let ctx = Context::new(&self.config);
        let formula = translate(&ctx, term)?;
        let solver = Solver::new(&ctx);
        solver.assert(&formula);
        match solver.check() {
            SatResult::Sat => Ok(true),
            SatResult::Unsat => Ok(false),
            SatResult::Unknown => Err(Error::SolverUnknown(term.to_string())),
        }
    }

    fn eliminate_quantifiers(&self, term: &Term) -> Result<Term> {
        let ctx = Context::new(&self.config);
        let formula = translate(&ctx, term)?;
        let goal = Goal::new(&ctx, false, false, false);
        goal.assert(&formula);
        let tactic = Tactic::new(&ctx, "qe");
        let result = tactic
            .apply(&goal, None)
            .map_err(|e| Error::SolverUnknown(format!("quantifier elimination: {}", e)))?;
        // a goal is the conjunction of its formulas; the result is the
        // disjunction over all subgoals
        let mut disjuncts = Vec::new();
        for subgoal in result.list_subgoals() {
            let formulas = subgoal.get_formulas::<Bool>();
            let conjuncts = formulas
                .into_iter()
                .map(|f| lower(&f.into()))
                .collect::<Result<Vec<_>>>()?;
            disjuncts.push(Term::and(conjuncts));
        }
        Ok(match disjuncts.len() {
            0 => Term::False,
            1 => disjuncts.into_iter().next().unwrap(),
            _ => Term::Or(disjuncts),
        })
    }

    fn unsat_core(&self, assertions: &[Term]) -> Result<Vec<usize>> {
        let ctx = Context::new(&self.config);
        let solver = Solver::new(&ctx);
        let mut trackers = Vec::with_capacity(assertions.len());
        for (i, assertion) in assertions.iter().enumerate() {
            let formula = translate(&ctx, assertion)?;
            let tracker = Bool::new_const(&ctx, format!("track_{}", i));
            solver.assert_and_track(&formula, &tracker);
            trackers.push(tracker);
        }
        match solver.check() {
            SatResult::Unsat => {
                let core = solver.get_unsat_core();
                Ok(trackers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| core.iter().any(|c| c == *t))
                    .map(|(i, _)| i)
                    .collect())
            }
            SatResult::Sat => Err(Error::UnhandledShape(
                "unsat core requested for satisfiable assertions".into(),
            )),
            SatResult::Unknown => Err(Error::SolverUnknown("unsat core".into())),
        }
    }

    fn model(&self, term: &Term) -> Result<Option<Model>> {
        let ctx = Context::new(&self.config);
        let formula = translate(&ctx, term)?;
        let solver = Solver::new(&ctx);
        solver.assert(&formula);
        match solver.check() {
            SatResult::Unsat => Ok(None),
            SatResult::Unknown => Err(Error::SolverUnknown(term.to_string())),
            SatResult::Sat => {
                let model = solver
                    .get_model()
                    .ok_or_else(|| Error::SolverUnknown("missing model".into()))?;
                let mut values = HashMap::new();
                for (name, ty) in term.vars() {
                    let value = match ty {
                        VarType::Int => model
                            .eval(&Int::new_const(&ctx, name.as_str()), true)
                            .and_then(|v| v.as_i64())
                            .map(Value::Int),
                        VarType::Real => model
                            .eval(&Real::new_const(&ctx, name.as_str()), true)
                            .and_then(|v| v.as_real())
                            .map(|(n, d)| Value::Real(n, d)),
                    };
                    if let Some(value) = value {
                        values.insert(name, value);
                    }
                }
                Ok(Some(Model::new(values)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::solver::TheorySolver;

    fn ivar(name: &str) -> Term {
        Term::var(name, VarType::Int)
    }

    #[test]
    fn satisfiability_of_simple_constraints() {
        let solver = Z3Solver::new();
        let sat = ivar("x").lt(Term::Int(0));
        assert!(solver.is_sat(&sat).unwrap());
        let unsat = Term::and(vec![
            ivar("x").lt(Term::Int(0)),
            Term::Int(0).lt(ivar("x")),
        ]);
        assert!(!solver.is_sat(&unsat).unwrap());
    }

    #[test]
    fn validity_of_universal_closure() {
        let solver = Z3Solver::new();
        // forall d. exists r. !(d < r) is valid over the integers
        let body = Term::exists(
            vec![("r".to_string(), VarType::Int)],
            ivar("d").lt(ivar("r")).negated(),
        );
        assert!(solver.is_valid_closed(&body).unwrap());
        // d < d + 0 is not valid
        let bad = ivar("d").lt(ivar("d").add(Term::Int(0)));
        assert!(!solver.is_valid_closed(&bad).unwrap());
    }

    #[test]
    fn quantifier_elimination_removes_bound_variables() {
        let solver = Z3Solver::new();
        // exists r. d < r & r < d is false
        let contradictory = Term::exists(
            vec![("r".to_string(), VarType::Int)],
            Term::and(vec![ivar("d").lt(ivar("r")), ivar("r").lt(ivar("d"))]),
        );
        let eliminated = solver.eliminate_quantifiers(&contradictory).unwrap();
        assert!(!solver.is_sat(&eliminated).unwrap());

        // exists r. r < d is true for every integer d
        let satisfiable = Term::exists(
            vec![("r".to_string(), VarType::Int)],
            ivar("r").lt(ivar("d")),
        );
        let eliminated = solver.eliminate_quantifiers(&satisfiable).unwrap();
        assert!(eliminated.vars().iter().all(|(name, _)| name != "r"));
        assert!(solver.is_valid_closed(&eliminated).unwrap());
    }

    #[test]
    fn unsat_core_is_minimal_subset() {
        let solver = Z3Solver::new();
        let assertions = vec![
            ivar("x").lt(Term::Int(0)),
            ivar("y").lt(Term::Int(10)),
            Term::Int(5).lt(ivar("x")),
        ];
        let core = solver.unsat_core(&assertions).unwrap();
        assert!(core.contains(&0));
        assert!(core.contains(&2));
        assert!(!core.contains(&1));
    }

    #[test]
    fn model_provides_typed_values() {
        let solver = Z3Solver::new();
        let term = Term::and(vec![
            ivar("x").lt(Term::Int(7)),
            Term::Int(5).lt(ivar("x")),
        ]);
        let model = solver.model(&term).unwrap().unwrap();
        assert_eq!(model.get("x"), Some(Value::Int(6)));

        let unsat = Term::and(vec![
            ivar("x").lt(Term::Int(0)),
            Term::Int(0).lt(ivar("x")),
        ]);
        assert!(solver.model(&unsat).unwrap().is_none());
    }
}
