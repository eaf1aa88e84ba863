//! Patterns used by `when` (match) arms. Exhaustiveness over these is
//! checked by `typechecker::checker::check_exhaustiveness`.

use crate::lexer::Span;

use super::{Expr, NodeId};

#[derive(Debug, Clone)]
pub enum Pattern {
    /// `_`.
    Wildcard { id: NodeId, span: Span },
    /// A bare name; binds the whole scrutinee (or payload) and also
    /// matches everything, making it (like `Wildcard`) a catch-all arm for
    /// exhaustiveness purposes.
    Binding {
        id: NodeId,
        name: String,
        span: Span,
    },
    Literal {
        id: NodeId,
        value: LiteralPattern,
        span: Span,
    },
    /// `Just(v)`, `Pair(a, b)` — enum/tuple-struct variant with positional
    /// payload bindings.
    TupleStruct {
        id: NodeId,
        path: Vec<String>,
        name: String,
        elements: Vec<Pattern>,
        span: Span,
    },
    /// `Point { x, y: py }` — record pattern; complete iff every
    /// non-defaulted field is bound or wildcarded.
    Struct {
        id: NodeId,
        path: Vec<String>,
        name: String,
        fields: Vec<(String, Pattern)>,
        has_rest: bool,
        span: Span,
    },
    /// `when x { Just(v) if v > 0 => ... }`.
    Guarded {
        id: NodeId,
        pattern: Box<Pattern>,
        condition: Box<Expr>,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralPattern {
    Int(i128),
    Float(u64), // bit pattern of the f64, so patterns can derive PartialEq
    Bool(bool),
    Char(char),
    Str(String),
}

impl Pattern {
    pub fn span(&self) -> &Span {
        match self {
            Pattern::Wildcard { span, .. }
            | Pattern::Binding { span, .. }
            | Pattern::Literal { span, .. }
            | Pattern::TupleStruct { span, .. }
            | Pattern::Struct { span, .. }
            | Pattern::Guarded { span, .. } => span,
        }
    }

    /// Whether this pattern, on its own, matches any value of its type
    /// (wildcard or a plain binding) — used by the exhaustiveness checker
    /// to short-circuit a `when` as complete.
    pub fn is_catch_all(&self) -> bool {
        matches!(self, Pattern::Wildcard { .. } | Pattern::Binding { .. })
    }

    /// The variant name this pattern discriminates on, if any.
    pub fn variant_name(&self) -> Option<&str> {
        match self {
            Pattern::TupleStruct { name, .. } | Pattern::Struct { name, .. } => Some(name),
            Pattern::Guarded { pattern, .. } => pattern.variant_name(),
            _ => None,
        }
    }
}
