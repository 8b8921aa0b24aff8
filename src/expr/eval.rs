//! Expression evaluation against a state and a call.
//!
//! ## Value semantics
//!
//! - Missing paths evaluate to `null`.
//! - Truthiness: `null`, `false`, `0`, `NaN` and `""` are false; everything else is true.
//! - Arithmetic on non-numbers yields `null`; `+` concatenates when either side is a string.
//! - Integer arithmetic stays integral until it overflows or divides unevenly.
//! - `==` is structural, with `1 == 1.0`.
//! - Ordering compares numbers with numbers and strings with strings; any other pair is false.
//! - `and`/`or` short-circuit (parsing already rejected unknown operators).
//!
//! ## Budget
//!
//! An [`Evaluator`] may carry a node limit (checked once per parsed expression)
//! and an iteration limit for `any`.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::ast::{Expr, Operator};
use super::path::{walk_json, walk_map, walk_state, Path, PathRoot, Step};
use crate::core::action::Payload;
use crate::core::error::EvalError;
use crate::core::state::GameState;

/// Name under which `any` exposes the current element.
pub const ITEM_BINDING: &str = "item";

/// What an expression can see.
#[derive(Clone, Copy, Debug)]
pub struct EvalContext<'a> {
    pub state: &'a GameState,
    pub by: Option<&'a str>,
    pub payload: &'a Payload,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(state: &'a GameState, by: Option<&'a str>, payload: &'a Payload) -> Self {
        Self { state, by, payload }
    }
}

/// Evaluates expressions, optionally within a node and iteration budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Evaluator {
    max_nodes: Option<usize>,
    max_iterations: Option<usize>,
}

impl Evaluator {
    /// An evaluator without limits.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Limit the node count of each parsed expression.
    #[must_use]
    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.max_nodes = Some(limit);
        self
    }

    /// Limit how many elements one `any` may visit.
    #[must_use]
    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.max_iterations = Some(limit);
        self
    }

    /// Parse an expression and check it against the node budget.
    pub fn prepare(&self, ast: &Value) -> Result<Expr, EvalError> {
        let expr = Expr::parse(ast)?;
        if let Some(limit) = self.max_nodes {
            let nodes = expr.node_count();
            if nodes > limit {
                return Err(EvalError::TooManyNodes { nodes, limit });
            }
        }
        Ok(expr)
    }

    /// Evaluate a parsed expression.
    pub fn eval(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let mut bindings = Vec::new();
        self.eval_in(expr, ctx, &mut bindings)
    }

    /// Evaluate a parsed expression as a condition.
    pub fn check(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<bool, EvalError> {
        Ok(truthy(&self.eval(expr, ctx)?))
    }

    /// Parse and evaluate a JSON expression.
    pub fn eval_value(&self, ast: &Value, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        self.eval(&self.prepare(ast)?, ctx)
    }

    /// Parse and evaluate a condition. An absent condition holds.
    pub fn eval_condition(&self, ast: Option<&Value>, ctx: &EvalContext<'_>) -> Result<bool, EvalError> {
        match ast {
            None => Ok(true),
            Some(ast) => self.check(&self.prepare(ast)?, ctx),
        }
    }

    fn eval_in(
        &self,
        expr: &Expr,
        ctx: &EvalContext<'_>,
        bindings: &mut Vec<(String, Value)>,
    ) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(path) => resolve(path, ctx, bindings),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval_in(item, ctx, bindings))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Op(op, args) => self.apply(*op, args, ctx, bindings),
        }
    }

    fn apply(
        &self,
        op: Operator,
        args: &[Expr],
        ctx: &EvalContext<'_>,
        bindings: &mut Vec<(String, Value)>,
    ) -> Result<Value, EvalError> {
        op.check_arity(args.len())?;
        match op {
            Operator::And => {
                for arg in args {
                    if !truthy(&self.eval_in(arg, ctx, bindings)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Operator::Or => {
                for arg in args {
                    if truthy(&self.eval_in(arg, ctx, bindings)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Operator::Not => Ok(Value::Bool(!truthy(&self.eval_in(&args[0], ctx, bindings)?))),
            Operator::Any => {
                let Value::Array(items) = self.eval_in(&args[0], ctx, bindings)? else {
                    return Ok(Value::Bool(false));
                };
                if let Some(limit) = self.max_iterations {
                    if items.len() > limit {
                        return Err(EvalError::TooManyIterations {
                            len: items.len(),
                            limit,
                        });
                    }
                }
                for item in items {
                    bindings.push((ITEM_BINDING.to_string(), item));
                    let hit = self.eval_in(&args[1], ctx, bindings);
                    bindings.pop();
                    if truthy(&hit?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Operator::Get => {
                let mut current = self.eval_in(&args[0], ctx, bindings)?;
                for arg in &args[1..] {
                    let step = match self.eval_in(arg, ctx, bindings)? {
                        Value::Number(n) => match n.as_i64() {
                            Some(i) => Step::Index(i),
                            None => return Ok(Value::Null),
                        },
                        Value::String(key) => Step::Key(key),
                        Value::Bool(b) => Step::Key(b.to_string()),
                        _ => return Ok(Value::Null),
                    };
                    current = walk_json(&current, std::slice::from_ref(&step)).unwrap_or(Value::Null);
                }
                Ok(current)
            }
            _ => {
                let lhs = self.eval_in(&args[0], ctx, bindings)?;
                let rhs = self.eval_in(&args[1], ctx, bindings)?;
                Ok(binary(op, &lhs, &rhs))
            }
        }
    }
}

/// Look a path up: bindings, then payload, then state for unprefixed paths.
fn resolve(path: &Path, ctx: &EvalContext<'_>, bindings: &[(String, Value)]) -> Result<Value, EvalError> {
    let steps = path.steps(ctx.by)?;
    let found = match path.root() {
        PathRoot::State => walk_state(ctx.state, &steps),
        PathRoot::Payload => walk_map(ctx.payload, &steps),
        PathRoot::Unprefixed => {
            let bound = match steps.split_first() {
                Some((Step::Key(name), rest)) => bindings
                    .iter()
                    .rev()
                    .find(|(bound, _)| bound == name)
                    .and_then(|(_, value)| walk_json(value, rest)),
                _ => None,
            };
            bound
                .or_else(|| walk_map(ctx.payload, &steps))
                .or_else(|| walk_state(ctx.state, &steps))
        }
    };
    Ok(found.unwrap_or(Value::Null))
}

/// JavaScript-style truthiness.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Structural equality with numeric comparison for numbers.
#[must_use]
pub fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| loose_eq(v, w)))
        }
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn float_value(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

fn arithmetic(op: Operator, a: &Number, b: &Number) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            Operator::Add => x.checked_add(y),
            Operator::Sub => x.checked_sub(y),
            Operator::Mul => x.checked_mul(y),
            Operator::Div if x.checked_rem(y) == Some(0) => x.checked_div(y),
            Operator::Mod if y != 0 => x.checked_rem(y),
            _ => None,
        };
        if let Some(result) = exact {
            return Value::from(result);
        }
    }
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Value::Null;
    };
    let result = match op {
        Operator::Add => x + y,
        Operator::Sub => x - y,
        Operator::Mul => x * y,
        Operator::Div => x / y,
        Operator::Mod => x % y,
        _ => return Value::Null,
    };
    float_value(result)
}

fn binary(op: Operator, lhs: &Value, rhs: &Value) -> Value {
    match op {
        Operator::Eq => Value::Bool(loose_eq(lhs, rhs)),
        Operator::Ne => Value::Bool(!loose_eq(lhs, rhs)),
        Operator::Gt => Value::Bool(compare(lhs, rhs) == Some(Ordering::Greater)),
        Operator::Ge => Value::Bool(matches!(compare(lhs, rhs), Some(Ordering::Greater | Ordering::Equal))),
        Operator::Lt => Value::Bool(compare(lhs, rhs) == Some(Ordering::Less)),
        Operator::Le => Value::Bool(matches!(compare(lhs, rhs), Some(Ordering::Less | Ordering::Equal))),
        Operator::Add => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
            (Value::String(a), Value::String(b)) => Value::String(format!("{a}{b}")),
            (Value::String(a), Value::Number(b)) => Value::String(format!("{a}{}", number_text(b))),
            (Value::Number(a), Value::String(b)) => Value::String(format!("{}{b}", number_text(a))),
            _ => Value::Null,
        },
        Operator::Sub | Operator::Mul | Operator::Div | Operator::Mod => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
            _ => Value::Null,
        },
        Operator::And | Operator::Or | Operator::Not | Operator::Get | Operator::Any => Value::Null,
    }
}
