//! Expression AST.
//!
//! Source shapes accepted by [`Expr::parse`]:
//!
//! | JSON | meaning |
//! |---|---|
//! | scalar / `null` | literal |
//! | `{"const": v}` | literal `v`, not evaluated |
//! | `{"var": "path"}` | path lookup, see [`Path`] |
//! | `{"op": "+", "args": [...]}` | operator application |
//! | `[a, b, ...]` | element-wise evaluation |
//!
//! Parsing is closed-world: an operator outside [`Operator`] is an error.

use std::fmt;

use serde_json::Value;

use super::path::Path;
use crate::core::error::EvalError;

/// Supported operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    // === Arithmetic ===
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // === Comparison ===
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,

    // === Logic ===
    And,
    Or,
    Not,

    // === Access ===
    Get,
    Any,
}

impl Operator {
    /// Parse an operator name, accepting symbolic and word spellings.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "+" | "add" => Self::Add,
            "-" | "sub" => Self::Sub,
            "*" | "mul" => Self::Mul,
            "/" | "div" => Self::Div,
            "%" | "mod" => Self::Mod,
            "==" | "eq" => Self::Eq,
            "!=" | "neq" | "ne" => Self::Ne,
            ">" | "gt" => Self::Gt,
            ">=" | "gte" | "ge" => Self::Ge,
            "<" | "lt" => Self::Lt,
            "<=" | "lte" | "le" => Self::Le,
            "and" | "&&" => Self::And,
            "or" | "||" => Self::Or,
            "not" | "!" => Self::Not,
            "get" => Self::Get,
            "any" => Self::Any,
            _ => return None,
        };
        Some(op)
    }

    /// Canonical spelling.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Get => "get",
            Self::Any => "any",
        }
    }

    pub(crate) fn check_arity(self, got: usize) -> Result<(), EvalError> {
        let (ok, expected) = match self {
            Self::Not => (got == 1, "1"),
            Self::Get => (got >= 1, "at least 1"),
            Self::And | Self::Or => (true, "any number of"),
            _ => (got == 2, "2"),
        };
        if ok {
            Ok(())
        } else {
            Err(EvalError::Arity {
                op: self.symbol(),
                expected,
                got,
            })
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(Path),
    Op(Operator, Vec<Expr>),
    List(Vec<Expr>),
}

impl Expr {
    /// Parse an expression from its JSON form.
    pub fn parse(ast: &Value) -> Result<Self, EvalError> {
        match ast {
            Value::Array(items) => Ok(Self::List(
                items.iter().map(Self::parse).collect::<Result<_, _>>()?,
            )),
            Value::Object(node) => {
                if let Some(value) = node.get("const") {
                    return Ok(Self::Literal(value.clone()));
                }
                if let Some(path) = node.get("var") {
                    let path = path
                        .as_str()
                        .ok_or_else(|| EvalError::Malformed("'var' must be a string".into()))?;
                    return Ok(Self::Var(Path::parse(path)?));
                }
                if let Some(op) = node.get("op") {
                    let name = op
                        .as_str()
                        .ok_or_else(|| EvalError::Malformed("'op' must be a string".into()))?;
                    let op = Operator::parse(name)
                        .ok_or_else(|| EvalError::UnknownOperator(name.to_string()))?;
                    let args = match node.get("args") {
                        None | Some(Value::Null) => Vec::new(),
                        Some(Value::Array(args)) => {
                            args.iter().map(Self::parse).collect::<Result<_, _>>()?
                        }
                        Some(_) => return Err(EvalError::Malformed("'args' must be an array".into())),
                    };
                    op.check_arity(args.len())?;
                    return Ok(Self::Op(op, args));
                }
                Err(EvalError::Malformed(format!(
                    "object must have 'const', 'var' or 'op', got {ast}"
                )))
            }
            scalar => Ok(Self::Literal(scalar.clone())),
        }
    }

    /// Number of nodes in this expression.
    #[must_use]
    pub fn node_count(&self) -> usize {
        match self {
            Self::Literal(_) | Self::Var(_) => 1,
            Self::Op(_, args) | Self::List(args) => 1 + args.iter().map(Self::node_count).sum::<usize>(),
        }
    }

    /// Every variable path referenced by this expression.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a Path>) {
        match self {
            Self::Var(path) => out.push(path),
            Self::Op(_, args) | Self::List(args) => {
                for arg in args {
                    arg.collect_paths(out);
                }
            }
            Self::Literal(_) => {}
        }
    }
}
