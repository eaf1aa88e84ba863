//! Code generator diagnostics. Unlike the
//! checker and borrow checker, most of the emitter's internal invariants are
//! guaranteed by a successful check + borrow pass already, so the bulk of
//! `codegen/*` uses `.unwrap()` on LLVM builder calls. This type only covers
//! the handful of failures that can legitimately happen against
//! otherwise-valid input: an unresolved variable reference or an
//! argument-count mismatch surfaced late because monomorphization skipped a
//! definition.

use std::{error::Error, fmt::Display};

#[derive(Clone, Debug, PartialEq)]
pub struct CodegenError {
    pub code: &'static str,
    pub message: String,
}

impl CodegenError {
    pub fn unknown_variable(name: &str) -> Self {
        Self {
            code: "C004",
            message: format!("unknown variable '{name}' at codegen time"),
        }
    }

    pub fn wrong_arg_count(callee: &str, expected: usize, actual: usize) -> Self {
        Self {
            code: "C015",
            message: format!(
                "'{callee}' expects {expected} argument(s), found {actual}"
            ),
        }
    }

    pub fn unresolved_symbol(name: &str) -> Self {
        Self {
            code: "C004",
            message: format!("no monomorphized definition found for '{name}'"),
        }
    }
}

impl Display for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for CodegenError {}

pub type CodegenResult<T> = Result<T, CodegenError>;
