//! Lexer for the Sable language.
//!
//! Tokenization is driven by the logos library; the logos token enum is
//! converted into the main [`Token`] enum with spans attached.

use crate::parser::token::{Span, Token};
use logos::Logos;

/// Errors produced while tokenizing source text.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum LexError {
    /// A character that does not start any token.
    #[error("unexpected character at byte {0}")]
    UnexpectedChar(u32),
    /// A string literal without a closing quote.
    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(u32),
    /// A numeric literal that does not parse.
    #[error("invalid number literal at byte {0}")]
    InvalidNumber(u32),
}

/// Logos-based token enum used internally for tokenization.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
enum RawToken {
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Ident,

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+")]
    Float,

    #[regex(r"[0-9]+")]
    Int,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#)]
    Str,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
}

/// Tokenizes Sable source text into `(Token, Span)` pairs.
pub struct Lexer;

impl Lexer {
    /// Tokenize the entire source, failing on the first invalid token.
    pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>, LexError> {
        let mut out = Vec::new();
        let mut lexer = RawToken::lexer(source);

        while let Some(raw) = lexer.next() {
            let range = lexer.span();
            let span = Span::new(range.start as u32, range.end as u32);
            let slice = lexer.slice();

            let raw = raw.map_err(|_| {
                // A lone quote means the string regex failed to close.
                if slice.starts_with('"') || slice.starts_with('\'') {
                    LexError::UnterminatedString(span.start)
                } else {
                    LexError::UnexpectedChar(span.start)
                }
            })?;

            let token = match raw {
                RawToken::Ident => match Token::keyword(slice) {
                    Some(kw) => kw,
                    None => Token::Ident(slice.to_string()),
                },
                RawToken::Int => match slice.parse::<i32>() {
                    Ok(v) => Token::IntLiteral(v),
                    // Out of i32 range: fall back to a float literal.
                    Err(_) => slice
                        .parse::<f64>()
                        .map(Token::FloatLiteral)
                        .map_err(|_| LexError::InvalidNumber(span.start))?,
                },
                RawToken::Float => slice
                    .parse::<f64>()
                    .map(Token::FloatLiteral)
                    .map_err(|_| LexError::InvalidNumber(span.start))?,
                RawToken::Str => Token::StringLiteral(unescape(&slice[1..slice.len() - 1])),
                RawToken::LParen => Token::LParen,
                RawToken::RParen => Token::RParen,
                RawToken::LBrace => Token::LBrace,
                RawToken::RBrace => Token::RBrace,
                RawToken::LBracket => Token::LBracket,
                RawToken::RBracket => Token::RBracket,
                RawToken::Comma => Token::Comma,
                RawToken::Semicolon => Token::Semicolon,
                RawToken::Colon => Token::Colon,
                RawToken::Dot => Token::Dot,
                RawToken::EqEq => Token::EqEq,
                RawToken::NotEq => Token::NotEq,
                RawToken::Le => Token::Le,
                RawToken::Ge => Token::Ge,
                RawToken::AndAnd => Token::AndAnd,
                RawToken::OrOr => Token::OrOr,
                RawToken::Assign => Token::Assign,
                RawToken::Plus => Token::Plus,
                RawToken::Minus => Token::Minus,
                RawToken::Star => Token::Star,
                RawToken::Slash => Token::Slash,
                RawToken::Percent => Token::Percent,
                RawToken::Bang => Token::Bang,
                RawToken::Lt => Token::Lt,
                RawToken::Gt => Token::Gt,
            };

            out.push((token, span));
        }

        Ok(out)
    }
}

/// Process escape sequences in a string literal body.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
