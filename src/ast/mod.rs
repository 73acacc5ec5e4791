//! AST nodes for Mico.
//!
//! Statements and expressions are tagged sums; the compiler dispatches on
//! them with plain `match`. `Display` renders the canonical parenthesized
//! form, which the compiler also uses to order hash-literal keys
//! deterministically.

use std::fmt;

use crate::span::Span;

/// A parsed program: a list of top-level statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A statement with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `let name = value;`
    Let { name: String, value: Expr },
    /// `return value;`
    Return(Expr),
    /// An expression in statement position.
    Expression(Expr),
}

/// A braced statement list, as in `if` consequences and function bodies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

/// An expression with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Variable reference: `foo`
    Identifier(String),
    /// Integer literal: `42`
    IntegerLiteral(i64),
    /// String literal: `"hello"`
    StringLiteral(String),
    /// Boolean literal: `true`, `false`
    BooleanLiteral(bool),

    /// Prefix operation: `-x`, `!x`
    Prefix {
        operator: PrefixOp,
        right: Box<Expr>,
    },

    /// Infix operation: `a + b`
    Infix {
        operator: InfixOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `if (condition) { consequence } else { alternative }`.
    /// An expression: a branch not taken and not present yields null.
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
    },

    /// Function literal: `fn(a, b) { a + b }`.
    /// `name` is empty unless a `let` binding stamped its own name in,
    /// which is what makes recursive self-reference compile.
    Function {
        parameters: Vec<String>,
        body: Block,
        name: String,
    },

    /// Call: `callee(a, b)`
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// Array literal: `[1, 2, 3]`
    Array(Vec<Expr>),

    /// Hash literal: `{"a": 1}` (key/value pairs in source order)
    Hash(Vec<(Expr, Expr)>),

    /// Index: `left[index]`
    Index { left: Box<Expr>, index: Box<Expr> },
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Minus,
    Bang,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Minus => write!(f, "-"),
            PrefixOp::Bang => write!(f, "!"),
        }
    }
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    NotEq,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Lt => "<",
            InfixOp::Gt => ">",
            InfixOp::Le => "<=",
            InfixOp::Ge => ">=",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            write!(f, "{}", statement)?;
        }
        Ok(())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Let { name, value } => write!(f, "let {} = {};", name, value),
            StmtKind::Return(value) => write!(f, "return {};", value),
            StmtKind::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            write!(f, "{}", statement)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Identifier(name) => write!(f, "{}", name),
            ExprKind::IntegerLiteral(value) => write!(f, "{}", value),
            ExprKind::StringLiteral(value) => write!(f, "{}", value),
            ExprKind::BooleanLiteral(value) => write!(f, "{}", value),
            ExprKind::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            ExprKind::Infix {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if {} {}", condition, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, " else {}", alternative)?;
                }
                Ok(())
            }
            ExprKind::Function {
                parameters,
                body,
                name,
            } => {
                write!(f, "fn")?;
                if !name.is_empty() {
                    write!(f, "<{}>", name)?;
                }
                write!(f, "({}) {}", parameters.join(", "), body)
            }
            ExprKind::Call {
                function,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, args.join(", "))
            }
            ExprKind::Array(elements) => {
                let elements: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elements.join(", "))
            }
            ExprKind::Hash(pairs) => {
                let pairs: Vec<String> = pairs
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            ExprKind::Index { left, index } => write!(f, "({}[{}])", left, index),
        }
    }
}
