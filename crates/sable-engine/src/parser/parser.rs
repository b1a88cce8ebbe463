//! Recursive-descent parser for the Sable language.

use crate::parser::ast::*;
use crate::parser::lexer::{LexError, Lexer};
use crate::parser::token::{Span, Token};

/// Errors produced while parsing.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ParseError {
    /// Tokenization failed.
    #[error(transparent)]
    Lex(#[from] LexError),
    /// A token other than the expected one was found.
    #[error("expected {expected} at byte {offset}, found {found}")]
    Expected {
        expected: String,
        found: String,
        offset: u32,
    },
    /// The source ended in the middle of a construct.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// An expression that cannot be assigned to appeared left of `=`.
    #[error("invalid assignment target at byte {0}")]
    InvalidAssignTarget(u32),
}

/// Parser over a token stream.
pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    next_func_id: usize,
}

impl Parser {
    /// Tokenize and prepare a parser for the given source.
    pub fn new(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: Lexer::tokenize(source)?,
            pos: 0,
            next_func_id: 0,
        })
    }

    /// Parse a whole script.
    pub fn parse(mut self) -> Result<Script, ParseError> {
        let mut body = Vec::new();
        while self.peek().is_some() {
            body.push(self.statement()?);
        }
        Ok(Script {
            body,
            func_count: self.next_func_id,
        })
    }

    // ── Token cursor ─────────────────────────────────────────────────────

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn offset(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| s.start)
            .unwrap_or_else(|| self.tokens.last().map(|(_, s)| s.end).unwrap_or(0))
    }

    fn advance(&mut self) -> Result<(Token, Span), ParseError> {
        let item = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(item)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<Span, ParseError> {
        let offset = self.offset();
        let (found, span) = self.advance()?;
        if found == token {
            Ok(span)
        } else {
            Err(ParseError::Expected {
                expected: token.to_string(),
                found: found.to_string(),
                offset,
            })
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        let offset = self.offset();
        let (found, span) = self.advance()?;
        match found {
            Token::Ident(name) => Ok((name, span)),
            other => Err(ParseError::Expected {
                expected: "identifier".to_string(),
                found: other.to_string(),
                offset,
            }),
        }
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let offset = self.offset();
        match self.peek().ok_or(ParseError::UnexpectedEof)? {
            Token::Var | Token::Let | Token::Const => self.decl_statement(),
            Token::Function => {
                // A `function` keyword in statement position is a declaration.
                let func = self.function_literal(true)?;
                Ok(Stmt::Func(func))
            }
            Token::Return => {
                self.advance()?;
                let value = if self.peek() == Some(&Token::Semicolon)
                    || self.peek() == Some(&Token::RBrace)
                    || self.peek().is_none()
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.eat(&Token::Semicolon);
                Ok(Stmt::Return { value, offset })
            }
            Token::If => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let cond = self.expression()?;
                self.expect(Token::RParen)?;
                let then = self.block_or_single()?;
                let otherwise = if self.eat(&Token::Else) {
                    Some(self.block_or_single()?)
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then,
                    otherwise,
                    offset,
                })
            }
            Token::While => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let cond = self.expression()?;
                self.expect(Token::RParen)?;
                let body = self.block_or_single()?;
                Ok(Stmt::While { cond, body, offset })
            }
            Token::For => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let init = if self.eat(&Token::Semicolon) {
                    None
                } else {
                    let stmt = match self.peek() {
                        Some(Token::Var) | Some(Token::Let) | Some(Token::Const) => {
                            self.decl_statement()?
                        }
                        _ => {
                            let expr_offset = self.offset();
                            let expr = self.expression()?;
                            self.eat(&Token::Semicolon);
                            Stmt::Expr {
                                expr,
                                offset: expr_offset,
                            }
                        }
                    };
                    Some(Box::new(stmt))
                };
                let cond = if self.peek() == Some(&Token::Semicolon) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(Token::Semicolon)?;
                let update = if self.peek() == Some(&Token::RParen) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(Token::RParen)?;
                let body = self.block_or_single()?;
                Ok(Stmt::For {
                    init,
                    cond,
                    update,
                    body,
                    offset,
                })
            }
            Token::LBrace => {
                let body = self.block()?;
                Ok(Stmt::Block { body, offset })
            }
            Token::Debugger => {
                self.advance()?;
                self.eat(&Token::Semicolon);
                Ok(Stmt::Debugger { offset })
            }
            _ => {
                let expr = self.expression()?;
                self.eat(&Token::Semicolon);
                Ok(Stmt::Expr { expr, offset })
            }
        }
    }

    fn decl_statement(&mut self) -> Result<Stmt, ParseError> {
        let offset = self.offset();
        let (kw, _) = self.advance()?;
        let kind = match kw {
            Token::Var => DeclKind::Var,
            Token::Let => DeclKind::Let,
            _ => DeclKind::Const,
        };
        let (name, _) = self.expect_ident()?;
        let init = if self.eat(&Token::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        self.eat(&Token::Semicolon);
        Ok(Stmt::Decl {
            kind,
            name,
            init,
            offset,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(Token::LBrace)?;
        let mut body = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(ParseError::UnexpectedEof);
            }
            body.push(self.statement()?);
        }
        self.expect(Token::RBrace)?;
        Ok(body)
    }

    fn block_or_single(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.peek() == Some(&Token::LBrace) {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn function_literal(&mut self, named: bool) -> Result<FuncLit, ParseError> {
        let offset = self.offset();
        self.expect(Token::Function)?;
        let name = if named {
            Some(self.expect_ident()?.0)
        } else if matches!(self.peek(), Some(Token::Ident(_))) {
            // Named function expression.
            Some(self.expect_ident()?.0)
        } else {
            None
        };
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                params.push(self.expect_ident()?.0);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        let body = self.block()?;

        let id = self.next_func_id;
        self.next_func_id += 1;
        Ok(FuncLit {
            id,
            name,
            params,
            body,
            offset,
        })
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let target = self.logical_or()?;
        if self.eat(&Token::Assign) {
            match target {
                Expr::Ident(..) | Expr::Member { .. } => {}
                _ => return Err(ParseError::InvalidAssignTarget(offset)),
            }
            let value = self.assignment()?;
            return Ok(Expr::Assign {
                target: Box::new(target),
                value: Box::new(value),
                offset,
            });
        }
        Ok(target)
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let mut lhs = self.logical_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.logical_and()?;
            lhs = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset,
            };
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let mut lhs = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset,
            };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.advance()?;
            let rhs = self.comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset,
            };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Ge) => BinOp::Ge,
                _ => break,
            };
            self.advance()?;
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset,
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance()?;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset,
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnOp::Neg),
            Some(Token::Bang) => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                offset,
            });
        }
        self.postfix()
    }

    /// Calls and member accesses, left-associative.
    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            let offset = self.offset();
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance()?;
                    let (name, _) = self.expect_ident()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        key: MemberKey::Name(name),
                        offset,
                    };
                }
                Some(Token::LBracket) => {
                    self.advance()?;
                    let index = self.expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        key: MemberKey::Index(Box::new(index)),
                        offset,
                    };
                }
                Some(Token::LParen) => {
                    self.advance()?;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen)?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        offset,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        match self.peek().ok_or(ParseError::UnexpectedEof)? {
            Token::Undefined => {
                self.advance()?;
                Ok(Expr::Undefined(offset))
            }
            Token::Null => {
                self.advance()?;
                Ok(Expr::Null(offset))
            }
            Token::True => {
                self.advance()?;
                Ok(Expr::Bool(true, offset))
            }
            Token::False => {
                self.advance()?;
                Ok(Expr::Bool(false, offset))
            }
            Token::IntLiteral(v) => {
                let v = *v;
                self.advance()?;
                Ok(Expr::Int(v, offset))
            }
            Token::FloatLiteral(v) => {
                let v = *v;
                self.advance()?;
                Ok(Expr::Float(v, offset))
            }
            Token::StringLiteral(_) => {
                let (token, _) = self.advance()?;
                match token {
                    Token::StringLiteral(s) => Ok(Expr::Str(s, offset)),
                    _ => unreachable!(),
                }
            }
            Token::Ident(_) => {
                let (token, _) = self.advance()?;
                match token {
                    Token::Ident(name) => Ok(Expr::Ident(name, offset)),
                    _ => unreachable!(),
                }
            }
            Token::This => {
                self.advance()?;
                Ok(Expr::This(offset))
            }
            Token::Function => {
                let func = self.function_literal(false)?;
                Ok(Expr::Func(func))
            }
            Token::LParen => {
                self.advance()?;
                let expr = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance()?;
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(items, offset))
            }
            Token::LBrace => {
                self.advance()?;
                let mut props = Vec::new();
                if self.peek() != Some(&Token::RBrace) {
                    loop {
                        let key = self.property_key()?;
                        self.expect(Token::Colon)?;
                        let value = self.expression()?;
                        props.push((key, value));
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::Object(props, offset))
            }
            other => Err(ParseError::Expected {
                expected: "expression".to_string(),
                found: other.to_string(),
                offset,
            }),
        }
    }

    /// Object-literal keys: identifiers, keywords used as names, strings, ints.
    fn property_key(&mut self) -> Result<String, ParseError> {
        let offset = self.offset();
        let (token, _) = self.advance()?;
        match token {
            Token::Ident(name) => Ok(name),
            Token::StringLiteral(s) => Ok(s),
            Token::IntLiteral(v) => Ok(v.to_string()),
            other => {
                // Keywords are valid property names (`{this: 1}` etc).
                let text = other.to_string();
                if text.chars().all(|c| c.is_ascii_alphabetic()) {
                    Ok(text)
                } else {
                    Err(ParseError::Expected {
                        expected: "property name".to_string(),
                        found: text,
                        offset,
                    })
                }
            }
        }
    }

    /// Unused helper kept for the parser's lookahead-hungry callers.
    #[allow(dead_code)]
    fn peek2(&self) -> Option<(&Token, &Token)> {
        match (self.peek(), self.peek_at(1)) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }
}
