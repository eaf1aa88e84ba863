//! Borrow checker diagnostics: the `B001`-`B013`
//! family. Structured the same way as `typechecker::error` — one flat
//! tagged struct rather than a variant per failure — so both checkers
//! collect a batch of diagnostics per module instead of aborting on the
//! first one.

use std::{error::Error, fmt::Display};

use crate::lexer::Span;

/// The original borrow checker's fix-it payload for move/borrow
/// conflicts.
#[derive(Clone, Debug, PartialEq)]
pub struct BorrowSuggestion {
    pub message: String,
    pub fix: Option<String>,
}

impl BorrowSuggestion {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fix: None,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BorrowCheckError {
    pub code: &'static str,
    pub message: String,
    pub span: Span,
    pub related: Vec<(String, Span)>,
    pub suggestion: Option<BorrowSuggestion>,
}

impl BorrowCheckError {
    fn new(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
            related: Vec::new(),
            suggestion: None,
        }
    }

    fn with_related(mut self, note: impl Into<String>, span: Span) -> Self {
        self.related.push((note.into(), span));
        self
    }

    fn with_suggestion(mut self, suggestion: BorrowSuggestion) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn use_after_move(place: &str, span: Span, moved_at: Span) -> Self {
        Self::new("B001", format!("use of moved value '{place}'"), span)
            .with_related(format!("'{place}' moved here"), moved_at)
            .with_suggestion(BorrowSuggestion::new(format!(
                "'{place}' does not implement a copy — borrow it with '&{place}' instead"
            )))
    }

    pub fn move_while_borrowed(place: &str, span: Span, borrowed_at: Span) -> Self {
        Self::new("B002", format!("cannot move '{place}' while it is borrowed"), span)
            .with_related("borrow occurs here", borrowed_at)
    }

    pub fn assign_to_immutable(place: &str, span: Span) -> Self {
        Self::new("B003", format!("cannot assign to immutable place '{place}'"), span).with_suggestion(
            BorrowSuggestion::new(format!("declare '{place}' with 'mut'")).with_fix(format!("mut {place}")),
        )
    }

    pub fn assign_while_borrowed(place: &str, span: Span, borrowed_at: Span) -> Self {
        Self::new("B004", format!("cannot assign to '{place}' while it is borrowed"), span)
            .with_related("borrow occurs here", borrowed_at)
    }

    pub fn borrow_of_moved(place: &str, span: Span, moved_at: Span) -> Self {
        Self::new("B005", format!("cannot borrow '{place}' after it was moved"), span)
            .with_related(format!("'{place}' moved here"), moved_at)
    }

    pub fn mut_borrow_of_non_mut(place: &str, span: Span) -> Self {
        Self::new(
            "B006",
            format!("cannot borrow '{place}' as mutable: it is not declared 'mut'"),
            span,
        )
        .with_suggestion(BorrowSuggestion::new(format!("declare '{place}' with 'mut'")))
    }

    pub fn mut_borrow_while_immut(place: &str, span: Span, other_at: Span) -> Self {
        Self::new(
            "B007",
            format!("cannot borrow '{place}' as mutable because it is also borrowed as immutable"),
            span,
        )
        .with_related("immutable borrow occurs here", other_at)
    }

    pub fn double_mut_borrow(place: &str, span: Span, first_at: Span) -> Self {
        Self::new("B008", format!("cannot borrow '{place}' as mutable more than once at a time"), span)
            .with_related("first mutable borrow occurs here", first_at)
    }

    pub fn immut_borrow_while_mut(place: &str, span: Span, other_at: Span) -> Self {
        Self::new(
            "B009",
            format!("cannot borrow '{place}' as immutable because it is also borrowed as mutable"),
            span,
        )
        .with_related("mutable borrow occurs here", other_at)
    }

    pub fn return_ref_to_local(place: &str, span: Span) -> Self {
        Self::new("B010", format!("cannot return a reference to local variable '{place}'"), span)
    }

    pub fn partial_move(place: &str, moved_fields: &[String], span: Span) -> Self {
        let note_span = span.clone();
        Self::new("B011", format!("use of partially moved value '{place}'"), span)
            .with_related(format!("moved field(s): {}", moved_fields.join(", ")), note_span)
    }

    pub fn overlapping_borrow(place: &str, span: Span, other_at: Span) -> Self {
        Self::new("B012", format!("overlapping borrow of '{place}'"), span)
            .with_related("other borrow occurs here", other_at)
    }

    pub fn use_while_borrowed(place: &str, span: Span, borrowed_at: Span) -> Self {
        Self::new("B013", format!("cannot use '{place}' while it is mutably borrowed"), span)
            .with_related("borrow occurs here", borrowed_at)
    }
}

impl Display for BorrowCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.span.to_string(&self.message))
    }
}

impl Error for BorrowCheckError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_after_move_carries_related_span() {
        let err = BorrowCheckError::use_after_move("x", Span::default(), Span::default());
        assert_eq!(err.code, "B001");
        assert_eq!(err.related.len(), 1);
    }
}
