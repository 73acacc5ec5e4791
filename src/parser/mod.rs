//! Pratt parser for Mico source code.
//!
//! Precedence-climbing over a two-token window. Errors are collected into
//! a list and the parser synchronizes to the next statement boundary, so
//! one pass reports every bad statement instead of stopping at the first.


use crate::ast::{Block, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use crate::error::ParserError;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

/// Operator binding strength, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn token_precedence(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Lt | TokenKind::Gt | TokenKind::Le | TokenKind::Ge => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Asterisk | TokenKind::Slash => Precedence::Product,
        TokenKind::Lparen => Precedence::Call,
        TokenKind::Lbracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// The parser consumes a token stream and produces a [`Program`].
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<ParserError>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, Span::default()));
        }
        Self {
            tokens,
            position: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the whole token stream. Returns the accumulated error list if
    /// any statement failed to parse.
    pub fn parse(mut self) -> Result<Program, Vec<ParserError>> {
        let mut statements = Vec::new();
        while self.current().kind != TokenKind::Eof {
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize();
                }
            }
            self.advance();
        }
        if self.errors.is_empty() {
            Ok(Program { statements })
        } else {
            Err(self.errors)
        }
    }

    // --- Token window ---

    fn current(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.tokens[(self.position + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    /// Advance onto the next token if it has the expected kind.
    fn expect_peek(&mut self, expected: &TokenKind) -> Result<(), ParserError> {
        if self.peek().kind == *expected {
            self.advance();
            Ok(())
        } else {
            Err(ParserError::unexpected_token(
                format!("'{}'", expected),
                self.peek().kind.to_string(),
                self.peek().span,
            ))
        }
    }

    /// Skip to the next statement boundary after an error.
    fn synchronize(&mut self) {
        while self.current().kind != TokenKind::Semicolon && self.current().kind != TokenKind::Eof
        {
            self.advance();
        }
    }

    // --- Statements ---

    /// Parse one statement, leaving the cursor on its last token.
    fn parse_statement(&mut self) -> Result<Stmt, ParserError> {
        if self.current().kind == TokenKind::Let {
            self.parse_let_statement()
        } else if self.current().kind == TokenKind::Return {
            self.parse_return_statement()
        } else {
            self.parse_expression_statement()
        }
    }

    fn parse_let_statement(&mut self) -> Result<Stmt, ParserError> {
        let span = self.current().span;
        let name = match &self.peek().kind {
            TokenKind::Ident(name) => name.clone(),
            other => {
                return Err(ParserError::unexpected_token(
                    "an identifier",
                    other.to_string(),
                    self.peek().span,
                ))
            }
        };
        self.advance();
        self.expect_peek(&TokenKind::Assign)?;
        self.advance();
        let mut value = self.parse_expression(Precedence::Lowest)?;

        // A let-bound function literal knows its own name, so its body can
        // call it recursively.
        if let ExprKind::Function { name: fn_name, .. } = &mut value.kind {
            fn_name.clone_from(&name);
        }

        if self.peek().kind == TokenKind::Semicolon {
            self.advance();
        }
        Ok(Stmt::new(StmtKind::Let { name, value }, span))
    }

    fn parse_return_statement(&mut self) -> Result<Stmt, ParserError> {
        let span = self.current().span;
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        if self.peek().kind == TokenKind::Semicolon {
            self.advance();
        }
        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ParserError> {
        let span = self.current().span;
        let expr = self.parse_expression(Precedence::Lowest)?;
        if self.peek().kind == TokenKind::Semicolon {
            self.advance();
        }
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    // --- Expressions ---

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expr, ParserError> {
        let mut left = self.parse_prefix()?;
        while self.peek().kind != TokenKind::Semicolon
            && precedence < token_precedence(&self.peek().kind)
        {
            self.advance();
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParserError> {
        let token = self.current().clone();
        let span = token.span;
        match token.kind {
            TokenKind::Ident(name) => Ok(Expr::new(ExprKind::Identifier(name), span)),
            TokenKind::Int(literal) => {
                let value = literal
                    .parse::<i64>()
                    .map_err(|_| ParserError::invalid_integer(literal.as_str(), span))?;
                Ok(Expr::new(ExprKind::IntegerLiteral(value), span))
            }
            TokenKind::Str(value) => Ok(Expr::new(ExprKind::StringLiteral(value), span)),
            TokenKind::True => Ok(Expr::new(ExprKind::BooleanLiteral(true), span)),
            TokenKind::False => Ok(Expr::new(ExprKind::BooleanLiteral(false), span)),
            TokenKind::Bang => self.parse_prefix_expression(PrefixOp::Bang, span),
            TokenKind::Minus => self.parse_prefix_expression(PrefixOp::Minus, span),
            TokenKind::Lparen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect_peek(&TokenKind::Rparen)?;
                Ok(expr)
            }
            TokenKind::If => self.parse_if_expression(span),
            TokenKind::Fn => self.parse_function_literal(span),
            TokenKind::Lbracket => {
                let elements = self.parse_expression_list(&TokenKind::Rbracket)?;
                Ok(Expr::new(ExprKind::Array(elements), span))
            }
            TokenKind::Lbrace => self.parse_hash_literal(span),
            TokenKind::Illegal(c) => Err(ParserError::illegal_char(c, span)),
            other => Err(ParserError::no_prefix_rule(other.to_string(), span)),
        }
    }

    fn parse_prefix_expression(
        &mut self,
        operator: PrefixOp,
        span: Span,
    ) -> Result<Expr, ParserError> {
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        Ok(Expr::new(
            ExprKind::Prefix {
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr, ParserError> {
        let span = self.current().span;
        let kind = self.current().kind.clone();
        match &kind {
            TokenKind::Lparen => {
                let arguments = self.parse_expression_list(&TokenKind::Rparen)?;
                Ok(Expr::new(
                    ExprKind::Call {
                        function: Box::new(left),
                        arguments,
                    },
                    span,
                ))
            }
            TokenKind::Lbracket => {
                self.advance();
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect_peek(&TokenKind::Rbracket)?;
                Ok(Expr::new(
                    ExprKind::Index {
                        left: Box::new(left),
                        index: Box::new(index),
                    },
                    span,
                ))
            }
            operator_kind => {
                let operator = match operator_kind {
                    TokenKind::Plus => InfixOp::Add,
                    TokenKind::Minus => InfixOp::Sub,
                    TokenKind::Asterisk => InfixOp::Mul,
                    TokenKind::Slash => InfixOp::Div,
                    TokenKind::Lt => InfixOp::Lt,
                    TokenKind::Gt => InfixOp::Gt,
                    TokenKind::Le => InfixOp::Le,
                    TokenKind::Ge => InfixOp::Ge,
                    TokenKind::Eq => InfixOp::Eq,
                    TokenKind::NotEq => InfixOp::NotEq,
                    other => {
                        return Err(ParserError::unexpected_token(
                            "an operator",
                            other.to_string(),
                            span,
                        ))
                    }
                };
                let precedence = token_precedence(operator_kind);
                self.advance();
                let right = self.parse_expression(precedence)?;
                Ok(Expr::new(
                    ExprKind::Infix {
                        operator,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                ))
            }
        }
    }

    fn parse_if_expression(&mut self, span: Span) -> Result<Expr, ParserError> {
        self.expect_peek(&TokenKind::Lparen)?;
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(&TokenKind::Rparen)?;
        self.expect_peek(&TokenKind::Lbrace)?;
        let consequence = self.parse_block()?;

        let alternative = if self.peek().kind == TokenKind::Else {
            self.advance();
            self.expect_peek(&TokenKind::Lbrace)?;
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            span,
        ))
    }

    /// Parse a braced statement list. The cursor sits on `{` and ends on
    /// the matching `}`.
    fn parse_block(&mut self) -> Result<Block, ParserError> {
        let mut statements = Vec::new();
        self.advance();
        while self.current().kind != TokenKind::Rbrace && self.current().kind != TokenKind::Eof {
            statements.push(self.parse_statement()?);
            self.advance();
        }
        if self.current().kind != TokenKind::Rbrace {
            return Err(ParserError::unexpected_token(
                "'}'",
                self.current().kind.to_string(),
                self.current().span,
            ));
        }
        Ok(Block { statements })
    }

    fn parse_function_literal(&mut self, span: Span) -> Result<Expr, ParserError> {
        self.expect_peek(&TokenKind::Lparen)?;
        let parameters = self.parse_function_parameters()?;
        self.expect_peek(&TokenKind::Lbrace)?;
        let body = self.parse_block()?;
        Ok(Expr::new(
            ExprKind::Function {
                parameters,
                body,
                name: String::new(),
            },
            span,
        ))
    }

    fn parse_function_parameters(&mut self) -> Result<Vec<String>, ParserError> {
        let mut parameters = Vec::new();
        if self.peek().kind == TokenKind::Rparen {
            self.advance();
            return Ok(parameters);
        }
        self.advance();
        loop {
            match &self.current().kind {
                TokenKind::Ident(name) => parameters.push(name.clone()),
                other => {
                    return Err(ParserError::unexpected_token(
                        "a parameter name",
                        other.to_string(),
                        self.current().span,
                    ))
                }
            }
            if self.peek().kind == TokenKind::Comma {
                self.advance();
                self.advance();
            } else {
                break;
            }
        }
        self.expect_peek(&TokenKind::Rparen)?;
        Ok(parameters)
    }

    /// Parse a comma-separated expression list ending at `end`. The cursor
    /// sits on the opening delimiter and ends on `end`.
    fn parse_expression_list(&mut self, end: &TokenKind) -> Result<Vec<Expr>, ParserError> {
        let mut list = Vec::new();
        if self.peek().kind == *end {
            self.advance();
            return Ok(list);
        }
        self.advance();
        list.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek().kind == TokenKind::Comma {
            self.advance();
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect_peek(end)?;
        Ok(list)
    }

    fn parse_hash_literal(&mut self, span: Span) -> Result<Expr, ParserError> {
        let mut pairs = Vec::new();
        while self.peek().kind != TokenKind::Rbrace {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect_peek(&TokenKind::Colon)?;
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if self.peek().kind != TokenKind::Rbrace {
                self.expect_peek(&TokenKind::Comma)?;
            }
        }
        self.expect_peek(&TokenKind::Rbrace)?;
        Ok(Expr::new(ExprKind::Hash(pairs), span))
    }
}
