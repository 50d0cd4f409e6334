//! Lexer for tsh command lines.
//!
//! Converts a line into words and operators using the logos lexer generator.
//!
//! # Token Categories
//!
//! - **Words**: runs of characters up to whitespace or an operator
//! - **Quoted words**: `'...'`, taken literally (no escapes)
//! - **Operators**: `<`, `>`, `>>`, `2>`, `|`, `&`

use logos::{Logos, Span};
use std::fmt;
use thiserror::Error;

/// A token with its span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
pub enum LexerError {
    #[default]
    #[error("unexpected character")]
    UnexpectedCharacter,
    #[error("unterminated quote")]
    UnterminatedQuote,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexerError)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token(">>")]
    GtGt,

    #[token("2>")]
    Stderr,

    #[token(">")]
    Gt,

    #[token("<")]
    Lt,

    #[token("|")]
    Pipe,

    #[token("&")]
    Amp,

    /// Single-quoted string: `'...'` - literal content, quotes removed
    #[regex(r"'[^']*'", lex_single_string)]
    SingleString(String),

    #[regex(r"'[^']*", unterminated)]
    UnterminatedQuote,

    /// Bare word: program names, arguments, paths
    #[regex(r"[^ \t\r\n'<>|&]+", lex_word)]
    Word(String),
}

fn lex_single_string(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    // Strip the surrounding single quotes
    s[1..s.len() - 1].to_string()
}

fn unterminated(_: &mut logos::Lexer<Token>) -> Result<(), LexerError> {
    Err(LexerError::UnterminatedQuote)
}

fn lex_word(lex: &mut logos::Lexer<Token>) -> String {
    lex.slice().to_string()
}

impl Token {
    /// The word carried by this token, if it is one.
    pub fn into_word(self) -> Option<String> {
        match self {
            Token::Word(s) | Token::SingleString(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::GtGt => write!(f, ">>"),
            Token::Stderr => write!(f, "2>"),
            Token::Gt => write!(f, ">"),
            Token::Lt => write!(f, "<"),
            Token::Pipe => write!(f, "|"),
            Token::Amp => write!(f, "&"),
            Token::SingleString(s) => write!(f, "'{}'", s),
            Token::UnterminatedQuote => write!(f, "'"),
            Token::Word(s) => write!(f, "{}", s),
        }
    }
}

/// Tokenize a command line.
///
/// Returns all errors found rather than stopping at the first one.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token>>, Vec<Spanned<LexerError>>> {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, span) in lexer.spanned() {
        match result {
            Ok(token) => tokens.push(Spanned::new(token, span)),
            Err(err) => errors.push(Spanned::new(err, span)),
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}
