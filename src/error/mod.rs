//! Error types for every stage of the pipeline.

use crate::span::Span;
use thiserror::Error;

/// Parser errors. The parser collects these into a list and keeps going,
/// so a single pass reports every bad statement.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("expected {expected}, got '{found}' at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("no prefix parse rule for '{found}' at {span}")]
    NoPrefixRule { found: String, span: Span },

    #[error("could not parse '{literal}' as integer at {span}")]
    InvalidInteger { literal: String, span: Span },

    #[error("illegal character '{0}' at {1}")]
    IllegalChar(char, Span),
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn no_prefix_rule(found: impl Into<String>, span: Span) -> Self {
        Self::NoPrefixRule {
            found: found.into(),
            span,
        }
    }

    pub fn invalid_integer(literal: impl Into<String>, span: Span) -> Self {
        Self::InvalidInteger {
            literal: literal.into(),
            span,
        }
    }

    pub fn illegal_char(c: char, span: Span) -> Self {
        Self::IllegalChar(c, span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::NoPrefixRule { span, .. } => *span,
            Self::InvalidInteger { span, .. } => *span,
            Self::IllegalChar(_, span) => *span,
        }
    }
}

/// Compile-time errors from the bytecode compiler.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("undefined variable {name} at {span}")]
    UndefinedVariable { name: String, span: Span },
}

impl CompileError {
    pub fn undefined_variable(name: impl Into<String>, span: Span) -> Self {
        Self::UndefinedVariable {
            name: name.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UndefinedVariable { span, .. } => *span,
        }
    }
}

/// Runtime errors from the virtual machine. Bytecode carries no source
/// locations, so these have none either.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unsupported types for binary operation: {left} {right}")]
    UnsupportedBinaryTypes {
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported operator for {left} {right}")]
    UnsupportedComparison {
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("calling non-function: {0}")]
    CallingNonFunction(&'static str),

    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArity { want: usize, got: usize },

    #[error("stack overflow")]
    StackOverflow,

    #[error("frame overflow")]
    FrameOverflow,

    #[error("undefined opcode {0}")]
    UndefinedOpcode(u8),

    #[error("not a function: {0}")]
    NotAFunction(&'static str),
}

impl RuntimeError {
    pub fn unsupported_binary_types(left: &'static str, right: &'static str) -> Self {
        Self::UnsupportedBinaryTypes { left, right }
    }

    pub fn unsupported_comparison(left: &'static str, right: &'static str) -> Self {
        Self::UnsupportedComparison { left, right }
    }

    pub fn wrong_arity(want: usize, got: usize) -> Self {
        Self::WrongArity { want, got }
    }
}

fn fmt_parser_errors(errors: &[ParserError]) -> String {
    errors
        .iter()
        .map(|e| format!("\t{}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A unified error type for the CLI and REPL drivers.
#[derive(Debug, Error)]
pub enum MicoError {
    #[error("Parser errors:\n{}", fmt_parser_errors(.0))]
    Parser(Vec<ParserError>),

    #[error("Compiler error: {0}")]
    Compile(#[from] CompileError),

    #[error("VM error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Vec<ParserError>> for MicoError {
    fn from(errors: Vec<ParserError>) -> Self {
        Self::Parser(errors)
    }
}
