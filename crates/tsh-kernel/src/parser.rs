//! Turns a tokenized command line into a [`CommandSpec`].
//!
//! The grammar is a pipeline of simple commands run as one job:
//!
//! ```text
//! line     := stage ("|" stage)* ["&"]
//! stage    := item+
//! item     := word | redirect
//! redirect := ("<" | ">" | ">>" | "2>") word
//! ```

use thiserror::Error;

use crate::lexer::{LexerError, Token, tokenize};
use tsh_types::{CommandSpec, Redirect, RedirectKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{error} at column {column}")]
    Lex { error: LexerError, column: usize },
    #[error("expected a file name after `{0}`")]
    MissingRedirectTarget(RedirectKind),
    #[error("`&` is only allowed at the end of a command")]
    MisplacedAmpersand,
    #[error("missing command")]
    MissingCommand,
}

fn redirect_kind(token: &Token) -> Option<RedirectKind> {
    match token {
        Token::Lt => Some(RedirectKind::Stdin),
        Token::Gt => Some(RedirectKind::Stdout),
        Token::GtGt => Some(RedirectKind::Append),
        Token::Stderr => Some(RedirectKind::Stderr),
        _ => None,
    }
}

/// Parse one command line. `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<CommandSpec>, ParseError> {
    let tokens = tokenize(line).map_err(|errors| {
        let first = errors.into_iter().next();
        ParseError::Lex {
            column: first.as_ref().map(|e| e.span.start + 1).unwrap_or(1),
            error: first.map(|e| e.token).unwrap_or_default(),
        }
    })?;

    let mut stages = Vec::new();
    let mut current = CommandSpec::default();
    let mut background = false;
    let mut tokens = tokens.into_iter().map(|s| s.token).peekable();

    while let Some(token) = tokens.next() {
        if let Some(kind) = redirect_kind(&token) {
            let path = tokens
                .next()
                .and_then(Token::into_word)
                .ok_or(ParseError::MissingRedirectTarget(kind))?;
            current.redirects.push(Redirect::new(kind, path));
            continue;
        }
        match token {
            Token::Amp if tokens.peek().is_none() => background = true,
            Token::Amp => return Err(ParseError::MisplacedAmpersand),
            Token::Pipe => {
                if current.argv.is_empty() {
                    return Err(ParseError::MissingCommand);
                }
                stages.push(std::mem::take(&mut current));
            }
            other => {
                if let Some(word) = other.into_word() {
                    current.argv.push(word);
                }
            }
        }
    }

    if current.argv.is_empty() {
        if stages.is_empty() && current.redirects.is_empty() && !background {
            return Ok(None);
        }
        return Err(ParseError::MissingCommand);
    }
    stages.push(current);

    let mut stages = stages.into_iter();
    let Some(mut head) = stages.next() else {
        return Ok(None);
    };
    head.pipeline = stages.collect();
    head.background = background;
    Ok(Some(head))
}
