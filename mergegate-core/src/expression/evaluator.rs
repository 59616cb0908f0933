// Predicate Evaluator
// Evaluates compiled skip predicates against the run context

use crate::expression::parser::{BinaryOp, ContextPath, Expr, ExprParser, Function, ValueType};
use crate::expression::PredicateError;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Facts about the current run that skip predicates may inspect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl RunContext {
    pub fn new(commit_message: impl Into<String>) -> Self {
        Self {
            commit_message: commit_message.into(),
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Look up a context value; anything undefined reads as an empty string
    fn lookup(&self, path: &ContextPath) -> &str {
        match path {
            ContextPath::CommitMessage => &self.commit_message,
            ContextPath::Branch => self.branch.as_deref().unwrap_or_default(),
            ContextPath::Event => self.event.as_deref().unwrap_or_default(),
            ContextPath::Env(name) => self.env.get(name).map(String::as_str).unwrap_or_default(),
        }
    }
}

/// Runtime value produced while evaluating a predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    String(String),
}

impl Value {
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::Bool(true) => "true",
            Value::Bool(false) => "false",
            Value::String(s) => s,
        }
    }
}

/// Tree-walking evaluator. Expressions reaching it have already been
/// type checked, so evaluation cannot fail.
pub struct Evaluator<'a> {
    context: &'a RunContext,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a RunContext) -> Self {
        Self { context }
    }

    pub fn evaluate(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Bool(b) => Value::Bool(*b),
            Expr::String(s) => Value::String(s.clone()),
            Expr::Reference(path) => Value::String(self.context.lookup(path).to_string()),
            Expr::Not(inner) => Value::Bool(!self.evaluate(inner).as_bool()),
            Expr::Binary { op, left, right } => self.evaluate_binary(*op, left, right),
            Expr::FunctionCall { name, args } => self.evaluate_function(*name, args),
        }
    }

    fn evaluate_binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Value {
        match op {
            // Short-circuit
            BinaryOp::And => {
                Value::Bool(self.evaluate(left).as_bool() && self.evaluate(right).as_bool())
            }
            BinaryOp::Or => {
                Value::Bool(self.evaluate(left).as_bool() || self.evaluate(right).as_bool())
            }
            BinaryOp::Eq => Value::Bool(self.evaluate(left) == self.evaluate(right)),
            BinaryOp::Ne => Value::Bool(self.evaluate(left) != self.evaluate(right)),
        }
    }

    fn evaluate_function(&self, function: Function, args: &[Expr]) -> Value {
        let values: Vec<Value> = args.iter().map(|arg| self.evaluate(arg)).collect();
        let text = |index: usize| values.get(index).map(Value::as_str).unwrap_or_default();

        match function {
            Function::Contains => Value::Bool(text(0).contains(text(1))),
            Function::StartsWith => Value::Bool(text(0).starts_with(text(1))),
            Function::EndsWith => Value::Bool(text(0).ends_with(text(1))),
            Function::Lower => Value::String(text(0).to_lowercase()),
            Function::Always => Value::Bool(true),
        }
    }
}

/// A compiled `skip_if` condition
#[derive(Debug, Clone, PartialEq)]
pub struct SkipPredicate {
    source: String,
    expr: Expr,
}

impl SkipPredicate {
    /// Parse and type check a predicate; the result must be a boolean
    pub fn compile(source: &str) -> Result<Self, PredicateError> {
        let expr = ExprParser::parse_str(source)?;

        match expr.check()? {
            ValueType::Bool => Ok(Self {
                source: source.to_string(),
                expr,
            }),
            found => Err(PredicateError::TypeMismatch(format!(
                "predicate must evaluate to a boolean, got {}",
                found
            ))),
        }
    }

    /// True when the job should be skipped
    pub fn evaluate(&self, context: &RunContext) -> bool {
        Evaluator::new(context).evaluate(&self.expr).as_bool()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for SkipPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
