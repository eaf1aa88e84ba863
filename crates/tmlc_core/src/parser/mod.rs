//! Recursive-descent parser producing `crate::ast` directly from the token
//! stream in `crate::lexer`. The surface grammar is not the object of this
//! compiler (front ends are an external collaborator); this parser exists
//! so the later stages (checker, borrow checker, monomorphizer, emitter)
//! have a real tree to work with end to end. `ParseState`/`ParseError`
//! carry the position-tracking and error-recovery infrastructure; the
//! grammar rules themselves live in `recursive`.

mod parse_state;
mod recursive;

pub use parse_state::ParseState;
pub use recursive::parse_module;

use std::{error::Error, fmt::Display};

use crate::lexer::Span;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParseError {
    pub message: String,
    pub position: Option<Span>,
}

impl ParseError {
    pub fn eof(item: &str) -> ParseError {
        ParseError {
            message: format!("hit EOF while parsing {item}"),
            position: None,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(pos) = &self.position {
            f.write_str(pos.to_string(&self.message).as_str())
        } else {
            f.write_str(&self.message)
        }
    }
}

impl Error for ParseError {}
