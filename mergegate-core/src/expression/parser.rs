// Predicate Parser
// Parses tokens into a typed AST; references and functions are resolved here

use crate::expression::lexer::{Lexer, Token};
use crate::expression::PredicateError;

use std::fmt;

/// Abstract Syntax Tree node for predicates
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Boolean literal
    Bool(bool),

    /// String literal
    String(String),

    /// Reference into the run context: commit.message, env.NAME
    Reference(ContextPath),

    /// Function call: contains(commit.message, '[ci skip]')
    FunctionCall { name: Function, args: Vec<Expr> },

    /// Logical negation: !expr
    Not(Box<Expr>),

    /// Binary operation: a == b, a && b
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// A resolved location in the run context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextPath {
    CommitMessage,
    Branch,
    Event,
    Env(String),
}

impl ContextPath {
    /// Resolve a dotted reference. GitHub-style spellings are accepted as
    /// aliases so existing workflow conditions carry over unchanged.
    fn resolve(parts: &[String]) -> Option<Self> {
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        match parts.as_slice() {
            ["commit", "message"] | ["github", "event", "head_commit", "message"] => {
                Some(ContextPath::CommitMessage)
            }
            ["commit", "branch"] | ["github", "ref_name"] => Some(ContextPath::Branch),
            ["event"] | ["github", "event_name"] => Some(ContextPath::Event),
            ["env", name] => Some(ContextPath::Env(name.to_string())),
            _ => None,
        }
    }
}

/// Built-in predicate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Contains,
    StartsWith,
    EndsWith,
    Lower,
    Always,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "contains" => Some(Function::Contains),
            "startswith" => Some(Function::StartsWith),
            "endswith" => Some(Function::EndsWith),
            "lower" => Some(Function::Lower),
            "always" => Some(Function::Always),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Function::Contains => "contains",
            Function::StartsWith => "startsWith",
            Function::EndsWith => "endsWith",
            Function::Lower => "lower",
            Function::Always => "always",
        }
    }

    fn signature(self) -> (&'static [ValueType], ValueType) {
        const TWO_STRINGS: &[ValueType] = &[ValueType::String, ValueType::String];
        match self {
            Function::Contains | Function::StartsWith | Function::EndsWith => {
                (TWO_STRINGS, ValueType::Bool)
            }
            Function::Lower => (&[ValueType::String], ValueType::String),
            Function::Always => (&[], ValueType::Bool),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,  // ==
    Ne,  // !=
    And, // &&
    Or,  // ||
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Eq => write!(f, "=="),
            BinaryOp::Ne => write!(f, "!="),
            BinaryOp::And => write!(f, "&&"),
            BinaryOp::Or => write!(f, "||"),
        }
    }
}

/// Static type of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "boolean"),
            ValueType::String => write!(f, "string"),
        }
    }
}

impl Expr {
    /// Infer the static type of this expression, rejecting ill-typed trees.
    pub fn check(&self) -> Result<ValueType, PredicateError> {
        match self {
            Expr::Bool(_) => Ok(ValueType::Bool),
            Expr::String(_) | Expr::Reference(_) => Ok(ValueType::String),
            Expr::FunctionCall { name, args } => {
                let (params, returns) = name.signature();
                for (arg, expected) in args.iter().zip(params) {
                    let found = arg.check()?;
                    if found != *expected {
                        return Err(PredicateError::TypeMismatch(format!(
                            "{}() expects {} arguments, got {}",
                            name.name(),
                            expected,
                            found
                        )));
                    }
                }
                Ok(returns)
            }
            Expr::Not(inner) => match inner.check()? {
                ValueType::Bool => Ok(ValueType::Bool),
                found => Err(PredicateError::TypeMismatch(format!(
                    "'!' expects a boolean, got {}",
                    found
                ))),
            },
            Expr::Binary { op, left, right } => {
                let lhs = left.check()?;
                let rhs = right.check()?;
                match op {
                    BinaryOp::And | BinaryOp::Or => {
                        if lhs != ValueType::Bool || rhs != ValueType::Bool {
                            return Err(PredicateError::TypeMismatch(format!(
                                "'{}' expects booleans, got {} and {}",
                                op, lhs, rhs
                            )));
                        }
                    }
                    BinaryOp::Eq | BinaryOp::Ne => {
                        if lhs != rhs {
                            return Err(PredicateError::TypeMismatch(format!(
                                "cannot compare {} with {}",
                                lhs, rhs
                            )));
                        }
                    }
                }
                Ok(ValueType::Bool)
            }
        }
    }
}

/// Recursive descent parser for skip predicates
pub struct ExprParser {
    tokens: Vec<(Token, usize)>,
    position: usize,
}

impl ExprParser {
    pub fn new(tokens: Vec<(Token, usize)>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse expression from string
    pub fn parse_str(input: &str) -> Result<Expr, PredicateError> {
        let tokens = Lexer::new(input).tokenize()?;
        Self::new(tokens).parse()
    }

    /// Parse the token stream into an expression
    pub fn parse(&mut self) -> Result<Expr, PredicateError> {
        let expr = self.parse_or()?;

        if self.peek() != &Token::Eof {
            return Err(self.error(format!("unexpected token: {}", self.peek())));
        }

        Ok(expr)
    }

    // Precedence (lowest to highest):
    // 1. Or: ||
    // 2. And: &&
    // 3. Equality: == !=
    // 4. Unary: !
    // 5. Primary: literals, references, calls, parentheses

    fn parse_or(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_and()?;

        while self.check(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_equality()?;

        while self.check(&Token::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                _ => break,
            };

            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, PredicateError> {
        if self.check(&Token::Not) {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(expr)));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, PredicateError> {
        match self.peek().clone() {
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::String(s))
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_or()?;
                self.expect(&Token::RParen, "expected ')'")?;
                Ok(expr)
            }
            Token::Identifier(name) => {
                self.advance();
                if self.check(&Token::LParen) {
                    self.parse_call(name)
                } else {
                    self.parse_reference(name)
                }
            }
            other => Err(self.error(format!("unexpected token: {}", other))),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, PredicateError> {
        let function =
            Function::lookup(&name).ok_or_else(|| PredicateError::UnknownFunction(name.clone()))?;

        self.expect(&Token::LParen, "expected '('")?;
        let mut args = Vec::new();

        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.check(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        self.expect(&Token::RParen, "expected ')' after arguments")?;

        let expected = function.signature().0.len();
        if args.len() != expected {
            return Err(PredicateError::Arity {
                name: function.name().to_string(),
                expected,
                found: args.len(),
            });
        }

        Ok(Expr::FunctionCall {
            name: function,
            args,
        })
    }

    fn parse_reference(&mut self, root: String) -> Result<Expr, PredicateError> {
        let mut parts = vec![root];

        while self.check(&Token::Dot) {
            self.advance();
            let Token::Identifier(property) = self.peek().clone() else {
                return Err(self.error("expected property name after '.'"));
            };
            self.advance();
            parts.push(property);
        }

        ContextPath::resolve(&parts)
            .map(Expr::Reference)
            .ok_or_else(|| PredicateError::UnknownReference(parts.join(".")))
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|(token, _)| token)
            .unwrap_or(&Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, token: &Token, message: &str) -> Result<(), PredicateError> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: impl Into<String>) -> PredicateError {
        let position = self
            .tokens
            .get(self.position)
            .map(|(_, offset)| *offset)
            .unwrap_or_default();
        PredicateError::syntax(message, position)
    }
}
