//! Borrow checker (C7): place/projection algebra, non-lexical-lifetime
//! liveness, the move/borrow state machine and the `B001`-`B013`
//! diagnostics.
//!
//! Follows a per-place state machine (`Owned`, `Moved`, `Borrowed`,
//! `MutBorrowed`, `Dropped`) driven one function body at a time, the same
//! one-pass-per-function checking shape the type checker uses. Runs
//! after the type checker and does not mutate the
//! AST or type table; like the type checker it collects every violation
//! in a batch rather than aborting at the first one.

pub mod error;

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::lexer::Span;
use crate::registry::ModuleRegistry;
use crate::span::Location;
use crate::typechecker::TypeTable;
use crate::types::Type;

pub use error::{BorrowCheckError, BorrowSuggestion};

/// One step of a place's access path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Projection {
    Field(String),
    Index,
    Deref,
}

/// `{ base, projections }` — a memory location named by a base variable
/// plus a sequence of field/index/deref steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Place {
    pub base: String,
    pub projections: Vec<Projection>,
}

impl Place {
    pub fn root(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            projections: Vec::new(),
        }
    }

    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut p = self.clone();
        p.projections.push(Projection::Field(name.into()));
        p
    }

    pub fn indexed(&self) -> Self {
        let mut p = self.clone();
        p.projections.push(Projection::Index);
        p
    }

    pub fn deref(&self) -> Self {
        let mut p = self.clone();
        p.projections.push(Projection::Deref);
        p
    }

    /// Two places overlap iff one's projection sequence is a prefix of
    /// the other's; a mutable borrow of `x.f` conflicts
    /// with any borrow of `x`, `x.f`, or `x.f.*`, but `x.f` and `x.g`
    /// never overlap.
    pub fn overlaps(&self, other: &Place) -> bool {
        if self.base != other.base {
            return false;
        }
        let (shorter, longer) = if self.projections.len() <= other.projections.len() {
            (&self.projections, &other.projections)
        } else {
            (&other.projections, &self.projections)
        };
        longer.starts_with(shorter.as_slice())
    }

    /// The field name the first projection names, if this place is a
    /// direct field of its base (used for partial-move bookkeeping).
    pub fn root_field(&self) -> Option<&str> {
        match self.projections.first() {
            Some(Projection::Field(f)) => Some(f.as_str()),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        let mut s = self.base.clone();
        for p in &self.projections {
            match p {
                Projection::Field(f) => {
                    s.push('.');
                    s.push_str(f);
                }
                Projection::Index => s.push_str("[_]"),
                Projection::Deref => s.insert(0, '*'),
            }
        }
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Moved,
    Borrowed,
    MutBorrowed,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    FullyOwned,
    PartiallyMoved,
    FullyMoved,
}

#[derive(Debug, Clone)]
pub struct BorrowRecord {
    pub id: usize,
    pub place: Place,
    pub is_mut: bool,
    pub start: Location,
    pub end: Option<Location>,
    /// Last use of the *reference* that holds this borrow (not of the
    /// borrowed-from place itself); `None` until some use of a binding
    /// reborrowing this place is recorded. `apply_nll` prunes against
    /// this, not against the owner place's own last use.
    pub last_use: Option<Location>,
    /// Set while a two-phase borrow's activation is deferred past
    /// argument evaluation.
    pub two_phase_pending: bool,
    pub span: Span,
}


#[derive(Debug, Clone)]
pub struct PlaceState {
    pub name: String,
    pub ty: Type,
    pub ownership: Ownership,
    pub is_mutable: bool,
    pub active_borrows: Vec<usize>,
    pub last_use: Option<Location>,
    pub moved_fields: HashSet<String>,
    pub is_initialized: bool,
    pub move_location: Option<Location>,
    declared_at: Span,
}

impl PlaceState {
    pub fn move_state(&self, all_fields: &[String]) -> MoveState {
        if self.moved_fields.is_empty() {
            MoveState::FullyOwned
        } else if all_fields.is_empty() || all_fields.iter().all(|f| self.moved_fields.contains(f)) {
            MoveState::FullyMoved
        } else {
            MoveState::PartiallyMoved
        }
    }
}

/// The full per-function borrow-tracking state: every tracked place, the
/// live borrow table, and the reborrow map.
#[derive(Debug, Default)]
struct BorrowEnv {
    places: HashMap<String, PlaceState>,
    borrows: Vec<BorrowRecord>,
    next_borrow_id: usize,
    /// `let b = r;` where `r: ref T` — `b` is a reborrow of whatever `r`
    /// itself borrows from, so releasing `b` should be attributed back to
    /// that original place for diagnostics.
    reborrow_sources: HashMap<String, Place>,
}

impl BorrowEnv {
    fn declare(&mut self, name: &str, ty: Type, is_mutable: bool, span: Span) {
        self.places.insert(
            name.to_string(),
            PlaceState {
                name: name.to_string(),
                ty,
                ownership: Ownership::Owned,
                is_mutable,
                active_borrows: Vec::new(),
                last_use: None,
                moved_fields: HashSet::new(),
                is_initialized: true,
                move_location: None,
                declared_at: span,
            },
        );
    }

    fn get(&self, name: &str) -> Option<&PlaceState> {
        self.places.get(name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut PlaceState> {
        self.places.get_mut(name)
    }

    /// `apply_nll(loc)`: prune every active borrow whose `last_use < loc`,
    /// run at the head of every statement. A borrow with no recorded
    /// `last_use` yet (its holding reference has not been used since it
    /// was taken) is left alive rather than pruned.
    fn apply_nll(&mut self, loc: &Location) {
        for borrow in &mut self.borrows {
            if borrow.end.is_none() {
                if let Some(last_use) = &borrow.last_use {
                    if last_use < loc {
                        borrow.end = Some(last_use.clone());
                    }
                }
            }
        }
        let live_ids: HashSet<usize> = self
            .borrows
            .iter()
            .filter(|b| b.end.is_none())
            .map(|b| b.id)
            .collect();
        for state in self.places.values_mut() {
            state.active_borrows.retain(|id| live_ids.contains(id));
        }
    }

    /// `mark_used(place, loc)`: refresh `last_use` on the place itself,
    /// and — when `base` is itself a reference binding (`let r = &x`) —
    /// on every active borrow rooted at the place it reborrows, so a
    /// borrow's lifetime is tied to the last use of the *reference*
    /// holding it rather than to the borrowed-from place's own uses.
    fn mark_used(&mut self, base: &str, loc: Location) {
        if let Some(state) = self.places.get_mut(base) {
            state.last_use = Some(loc.clone());
        }
        if let Some(source) = self.reborrow_sources.get(base).cloned() {
            for borrow in &mut self.borrows {
                if borrow.end.is_none() && borrow.place.overlaps(&source) {
                    borrow.last_use = Some(loc.clone());
                }
            }
        }
    }

    fn active_borrows_of<'a>(&'a self, place: &Place) -> Vec<&'a BorrowRecord> {
        self.borrows
            .iter()
            .filter(|b| b.end.is_none() && b.place.overlaps(place))
            .collect()
    }

    fn new_borrow(&mut self, place: Place, is_mut: bool, start: Location, span: Span) -> usize {
        let id = self.next_borrow_id;
        self.next_borrow_id += 1;
        self.borrows.push(BorrowRecord {
            id,
            place: place.clone(),
            is_mut,
            start,
            end: None,
            last_use: None,
            two_phase_pending: false,
            span,
        });
        if let Some(state) = self.places.get_mut(&place.base) {
            state.active_borrows.push(id);
            state.ownership = if is_mut { Ownership::MutBorrowed } else { Ownership::Borrowed };
        }
        id
    }
}

pub struct BorrowOutcome {
    pub errors: Vec<BorrowCheckError>,
}

pub fn check_module(registry: &ModuleRegistry, types: &TypeTable, module: &Module) -> BorrowOutcome {
    let mut checker = BorrowChecker {
        registry,
        types,
        env: BorrowEnv::default(),
        errors: Vec::new(),
        statement_counter: 0,
        locals: HashSet::new(),
    };
    for item in &module.items {
        checker.check_item(item);
    }
    BorrowOutcome { errors: checker.errors }
}

struct BorrowChecker<'r> {
    registry: &'r ModuleRegistry,
    types: &'r TypeTable,
    env: BorrowEnv,
    errors: Vec<BorrowCheckError>,
    statement_counter: usize,
    /// Names declared in the function currently being checked — used by
    /// escape analysis on `return`.
    locals: HashSet<String>,
}

impl<'r> BorrowChecker<'r> {
    fn next_location(&mut self, span: &Span) -> Location {
        let loc = Location::new(self.statement_counter, span.clone());
        self.statement_counter += 1;
        loc
    }

    fn type_of(&self, id: NodeId) -> Type {
        self.types.get(&id).cloned().unwrap_or(Type::Unknown)
    }

    fn field_names_of(&self, ty: &Type) -> Vec<String> {
        match ty.auto_deref() {
            Type::Named(n) | Type::Class(n) => {
                if let Some(s) = self.registry.find_struct(&n.name) {
                    s.fields.iter().map(|f| f.name.clone()).collect()
                } else if let Some(c) = self.registry.find_class(&n.name) {
                    c.fields.iter().map(|f| f.name.clone()).collect()
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    /// Types that are copied rather than moved on use: primitives and
    /// references themselves (copying a reference does not move the
    /// referent).
    fn is_copy(&self, ty: &Type) -> bool {
        matches!(ty, Type::Primitive(_) | Type::Ref { .. } | Type::Ptr(_) | Type::Func { .. })
    }

    fn check_item(&mut self, item: &Item) {
        match item {
            Item::Func(f) => {
                if let Some(body) = &f.body {
                    self.check_function_body(&f.sig, body, false);
                }
            }
            Item::Impl(i) => {
                for m in &i.methods {
                    self.check_function_body(&m.sig, &m.body, !m.is_static);
                }
            }
            Item::Class(c) => {
                for m in &c.methods {
                    if let Some(body) = &m.body {
                        self.check_function_body(&m.sig, body, !m.is_static);
                    }
                }
            }
            Item::Behavior(b) => {
                for m in &b.methods {
                    if let Some(body) = &m.default_body {
                        let sig = FuncSig {
                            name: m.name.clone(),
                            type_params: m.type_params.clone(),
                            params: m.params.clone(),
                            return_type: m.return_type.clone(),
                            where_constraints: vec![],
                        };
                        self.check_function_body(&sig, body, true);
                    }
                }
            }
            _ => {}
        }
    }

    fn check_function_body(&mut self, sig: &FuncSig, body: &Expr, has_self: bool) {
        self.env = BorrowEnv::default();
        self.statement_counter = 0;
        self.locals = HashSet::new();

        if has_self {
            self.env.declare("self", Type::Unknown, false, body.span().clone());
            self.locals.insert("self".to_string());
        }
        for param in &sig.params {
            self.env.declare(&param.name, Type::Unknown, param.is_mut, body.span().clone());
            self.locals.insert(param.name.clone());
        }

        self.walk_expr(body);
    }

    /// Walks an expression for its move/borrow effects. Returns the
    /// [`Place`] it denotes when the expression is itself place-like
    /// (identifier, field access, index, deref), so callers building
    /// nested places (`&x.f`, `x.f = ...`) can compose on top of it.
    fn walk_expr(&mut self, expr: &Expr) -> Option<Place> {
        match expr {
            Expr::Literal { .. } => None,
            Expr::Ident { name, span, id } => {
                let loc = self.next_location(span);
                self.use_place(&Place::root(name.clone()), *id, span, loc);
                Some(Place::root(name.clone()))
            }
            Expr::Path { segments, .. } => segments.last().map(|n| Place::root(n.clone())),
            Expr::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
                None
            }
            Expr::Unary { op, operand, span, .. } => self.walk_unary(*op, operand, span),
            Expr::Assign { target, value, span, .. } => {
                self.walk_assign(target, value, span);
                None
            }
            Expr::Call { callee, args, .. } => {
                self.walk_expr(callee);
                self.walk_call_args(args);
                None
            }
            Expr::MethodCall { receiver, args, .. } => {
                let place = self.walk_expr(receiver);
                if let Some(place) = &place {
                    self.begin_two_phase(place);
                }
                self.walk_call_args(args);
                if let Some(place) = &place {
                    self.end_two_phase(place);
                }
                None
            }
            Expr::Field { base, field, span, id } => {
                let base_place = self.walk_expr(base);
                let place = base_place.map(|p| p.field(field.clone()));
                if let Some(place) = &place {
                    let loc = self.next_location(span);
                    self.use_place(place, *id, span, loc);
                }
                place
            }
            Expr::Index { base, index, .. } => {
                let base_place = self.walk_expr(base);
                self.walk_expr(index);
                base_place.map(|p| p.indexed())
            }
            Expr::Range { start, end, .. } => {
                if let Some(s) = start {
                    self.walk_expr(s);
                }
                if let Some(e) = end {
                    self.walk_expr(e);
                }
                None
            }
            Expr::Block { statements, trailing, .. } => {
                for stmt in statements {
                    self.walk_stmt(stmt);
                }
                trailing.as_ref().and_then(|t| self.walk_expr(t))
            }
            Expr::If { condition, then_branch, else_branch, .. } => {
                self.walk_expr(condition);
                self.walk_expr(then_branch);
                if let Some(else_branch) = else_branch {
                    self.walk_expr(else_branch);
                }
                None
            }
            Expr::Ternary { condition, then_value, else_value, .. } => {
                self.walk_expr(condition);
                self.walk_expr(then_value);
                self.walk_expr(else_value);
                None
            }
            Expr::When { scrutinee, arms, .. } => {
                self.walk_expr(scrutinee);
                for arm in arms {
                    self.walk_pattern(&arm.pattern);
                    self.walk_expr(&arm.body);
                }
                None
            }
            Expr::Loop { body, .. } | Expr::While { body, .. } => {
                if let Expr::While { condition, .. } = expr {
                    self.walk_expr(condition);
                }
                self.walk_expr(body);
                None
            }
            Expr::For { binding, iterator, body, span, .. } => {
                self.walk_expr(iterator);
                self.env.declare(binding, Type::Unknown, false, span.clone());
                self.locals.insert(binding.clone());
                self.walk_expr(body);
                None
            }
            Expr::Return { value, span, .. } => {
                if let Some(v) = value {
                    self.walk_expr(v);
                    self.check_escape(v, span);
                }
                None
            }
            Expr::Break { value, .. } => {
                if let Some(v) = value {
                    self.walk_expr(v);
                }
                None
            }
            Expr::Continue { .. } => None,
            Expr::Tuple { elements, .. } | Expr::Array { elements, .. } => {
                for e in elements {
                    self.walk_expr(e);
                }
                None
            }
            Expr::Struct { fields, .. } => {
                for f in fields {
                    self.walk_expr(&f.value);
                }
                None
            }
            Expr::Closure { body, .. } => {
                self.walk_expr(body);
                None
            }
            Expr::Cast { value, .. } => self.walk_expr(value),
            Expr::Try { value, .. } => self.walk_expr(value),
            Expr::Lowlevel { operands, .. } => {
                for op in operands {
                    self.walk_expr(op);
                }
                None
            }
            Expr::InterpolatedString { segments, .. } | Expr::TemplateLiteral { segments, .. } => {
                for seg in segments {
                    if let Some(e) = &seg.interpolated {
                        self.walk_expr(e);
                    }
                }
                None
            }
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        let loc = self.next_location(stmt.span());
        self.env.apply_nll(&loc);
        match stmt {
            Stmt::Let(let_stmt) => {
                self.walk_expr(&let_stmt.value);
                let ty = self.type_of(let_stmt.id);
                self.env.declare(&let_stmt.name, ty, let_stmt.is_mut, let_stmt.span.clone());
                self.locals.insert(let_stmt.name.clone());
                if let Expr::Unary { op: UnaryOp::Ref | UnaryOp::RefMut, operand, .. } = let_stmt.value.as_ref() {
                    if let Expr::Ident { name, .. } = operand.as_ref() {
                        self.env.reborrow_sources.insert(let_stmt.name.clone(), Place::root(name.clone()));
                    }
                }
            }
            Stmt::Expr(e) => {
                self.walk_expr(&e.expr);
            }
        }
    }

    fn walk_pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Binding { name, span, .. } => {
                self.env.declare(name, Type::Unknown, false, span.clone());
                self.locals.insert(name.clone());
            }
            Pattern::TupleStruct { elements, .. } => {
                for el in elements {
                    self.walk_pattern(el);
                }
            }
            Pattern::Struct { fields, .. } => {
                for (_, p) in fields {
                    self.walk_pattern(p);
                }
            }
            Pattern::Guarded { pattern, condition, .. } => {
                self.walk_pattern(pattern);
                self.walk_expr(condition);
            }
            Pattern::Wildcard { .. } | Pattern::Literal { .. } => {}
        }
    }

    /// Records a use of `place` at `loc`: checks for use-after-move
    /// (B001), partial move (B011), and use-while-mutably-borrowed
    /// (B013), then moves the place unless its type is `Copy`.
    fn use_place(&mut self, place: &Place, id: NodeId, span: &Span, loc: Location) {
        let ty = self.type_of(id);
        let is_copy = self.is_copy(&ty);

        if let Some(state) = self.env.get(&place.base).cloned() {
            if place.projections.is_empty() {
                let fields = self.field_names_of(&state.ty);
                match state.move_state(&fields) {
                    MoveState::FullyMoved => {
                        if let Some(at) = &state.move_location {
                            self.errors.push(BorrowCheckError::use_after_move(
                                &place.display(),
                                span.clone(),
                                at.span.clone(),
                            ));
                        }
                    }
                    MoveState::PartiallyMoved => {
                        let missing: Vec<String> = state.moved_fields.iter().cloned().collect();
                        self.errors
                            .push(BorrowCheckError::partial_move(&place.display(), &missing, span.clone()));
                    }
                    MoveState::FullyOwned => {}
                }
            } else if let Some(field) = place.root_field() {
                if state.moved_fields.contains(field) {
                    if let Some(at) = &state.move_location {
                        self.errors.push(BorrowCheckError::use_after_move(
                            &place.display(),
                            span.clone(),
                            at.span.clone(),
                        ));
                    }
                }
            }

            for borrow in self.env.active_borrows_of(place) {
                if borrow.is_mut {
                    self.errors.push(BorrowCheckError::use_while_borrowed(
                        &place.display(),
                        span.clone(),
                        borrow.span.clone(),
                    ));
                }
            }
        }

        self.env.mark_used(&place.base, loc);

        if !is_copy && place.projections.is_empty() {
            if let Some(state) = self.env.get_mut(&place.base) {
                state.ownership = Ownership::Moved;
            }
        } else if !is_copy {
            if let Some(field) = place.root_field() {
                if let Some(state) = self.env.get_mut(&place.base) {
                    state.moved_fields.insert(field.to_string());
                }
            }
        }
    }

    fn walk_unary(&mut self, op: UnaryOp, operand: &Expr, span: &Span) -> Option<Place> {
        match op {
            UnaryOp::Ref | UnaryOp::RefMut => {
                let place = self.walk_place_only(operand);
                if let Some(place) = &place {
                    let is_mut = matches!(op, UnaryOp::RefMut);
                    self.check_borrow_conflicts(place, is_mut, span);
                    if is_mut {
                        if let Some(state) = self.env.get(&place.base) {
                            if !state.is_mutable {
                                self.errors
                                    .push(BorrowCheckError::mut_borrow_of_non_mut(&place.display(), span.clone()));
                            }
                        }
                        if place
                            .projections
                            .iter()
                            .all(|p| !matches!(p, Projection::Deref))
                        {
                            if let Some(state) = self.env.get(&place.base) {
                                if state.moved_fields.contains(
                                    place.root_field().unwrap_or_default(),
                                ) {
                                    self.errors.push(BorrowCheckError::borrow_of_moved(
                                        &place.display(),
                                        span.clone(),
                                        state.declared_at.clone(),
                                    ));
                                }
                            }
                        }
                    }
                    let loc = self.next_location(span);
                    self.env.new_borrow(place.clone(), is_mut, loc, span.clone());
                }
                None
            }
            UnaryOp::Deref => self.walk_expr(operand).map(|p| p.deref()),
            UnaryOp::Neg | UnaryOp::Not => {
                self.walk_expr(operand);
                None
            }
        }
    }

    /// Like `walk_expr` but never counts as a *use* of the base place —
    /// taking `&x` does not move `x`.
    fn walk_place_only(&mut self, expr: &Expr) -> Option<Place> {
        match expr {
            Expr::Ident { name, .. } => Some(Place::root(name.clone())),
            Expr::Field { base, field, .. } => self.walk_place_only(base).map(|p| p.field(field.clone())),
            Expr::Index { base, index, .. } => {
                self.walk_expr(index);
                self.walk_place_only(base).map(|p| p.indexed())
            }
            Expr::Unary { op: UnaryOp::Deref, operand, .. } => self.walk_place_only(operand).map(|p| p.deref()),
            other => self.walk_expr(other),
        }
    }

    fn check_borrow_conflicts(&mut self, place: &Place, is_mut: bool, span: &Span) {
        for borrow in self.env.active_borrows_of(place) {
            if is_mut {
                if borrow.is_mut {
                    self.errors
                        .push(BorrowCheckError::double_mut_borrow(&place.display(), span.clone(), borrow.span.clone()));
                } else {
                    self.errors.push(BorrowCheckError::mut_borrow_while_immut(
                        &place.display(),
                        span.clone(),
                        borrow.span.clone(),
                    ));
                }
            } else if borrow.is_mut {
                self.errors
                    .push(BorrowCheckError::immut_borrow_while_mut(&place.display(), span.clone(), borrow.span.clone()));
            } else if borrow.place != *place {
                self.errors
                    .push(BorrowCheckError::overlapping_borrow(&place.display(), span.clone(), borrow.span.clone()));
            }
        }
    }

    fn walk_assign(&mut self, target: &Expr, value: &Expr, span: &Span) {
        self.walk_expr(value);
        let place = self.walk_place_only(target);
        if let Some(place) = place {
            if place.projections.is_empty() {
                if let Some(state) = self.env.get(&place.base) {
                    if !state.is_mutable && state.ownership != Ownership::Moved {
                        self.errors
                            .push(BorrowCheckError::assign_to_immutable(&place.display(), span.clone()));
                    }
                }
            }
            for borrow in self.env.active_borrows_of(&place) {
                self.errors
                    .push(BorrowCheckError::assign_while_borrowed(&place.display(), span.clone(), borrow.span.clone()));
            }
            if let Some(state) = self.env.get_mut(&place.base) {
                state.ownership = Ownership::Owned;
                if place.projections.is_empty() {
                    state.moved_fields.clear();
                } else if let Some(field) = place.root_field() {
                    state.moved_fields.remove(field);
                }
            }
        }
    }

    /// Two-phase borrows: suspend an outstanding mutable
    /// borrow on the receiver while evaluating a method call's arguments,
    /// so `x.push(x.len())` is legal; reactivate it before the call.
    fn begin_two_phase(&mut self, place: &Place) {
        for borrow in &mut self.env.borrows {
            if borrow.place.overlaps(place) && borrow.is_mut && borrow.end.is_none() {
                borrow.two_phase_pending = true;
            }
        }
    }

    fn end_two_phase(&mut self, place: &Place) {
        for borrow in &mut self.env.borrows {
            if borrow.place.overlaps(place) {
                borrow.two_phase_pending = false;
            }
        }
    }

    fn walk_call_args(&mut self, args: &[Expr]) {
        for arg in args {
            self.walk_expr(arg);
        }
    }

    /// : for every reference-typed value returned, verify
    /// none of the borrowed places are locals of the current function.
    fn check_escape(&mut self, value: &Expr, span: &Span) {
        if let Expr::Unary { op: UnaryOp::Ref | UnaryOp::RefMut, operand, .. } = value {
            if let Some(root) = root_ident(operand) {
                if self.locals.contains(&root) {
                    self.errors.push(BorrowCheckError::return_ref_to_local(&root, span.clone()));
                }
            }
        } else if let Expr::Ident { name, .. } = value {
            if let Some(source) = self.env.reborrow_sources.get(name) {
                if self.locals.contains(&source.base) {
                    self.errors.push(BorrowCheckError::return_ref_to_local(&source.base, span.clone()));
                }
            }
        }
    }
}

fn root_ident(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident { name, .. } => Some(name.clone()),
        Expr::Field { base, .. } => root_ident(base),
        Expr::Index { base, .. } => root_ident(base),
        Expr::Unary { op: UnaryOp::Deref, operand, .. } => root_ident(operand),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeIdGen;

    fn span() -> Span {
        Span::default()
    }

    fn make_module(func: FuncDecl) -> Module {
        Module {
            id: 0,
            path: vec!["test".into()],
            items: vec![Item::Func(func)],
            span: span(),
        }
    }

    fn simple_sig(name: &str) -> FuncSig {
        FuncSig {
            name: name.into(),
            type_params: vec![],
            params: vec![],
            return_type: TypeExpr::Unit { id: 999, span: span() },
            where_constraints: vec![],
        }
    }

    #[test]
    fn place_field_overlaps_its_base() {
        let x = Place::root("x");
        let xf = x.field("f");
        assert!(x.overlaps(&xf));
        assert!(xf.overlaps(&x));
    }

    #[test]
    fn disjoint_fields_do_not_overlap() {
        let xf = Place::root("x").field("f");
        let xg = Place::root("x").field("g");
        assert!(!xf.overlaps(&xg));
    }

    #[test]
    fn use_after_move_is_reported() {
        let mut ids = NodeIdGen::new();
        let id_a = ids.next();
        let id_b = ids.next();
        let registry = ModuleRegistry::new();
        let types = TypeTable::new();

        let body = Expr::Block {
            id: ids.next(),
            statements: vec![
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "a".into(),
                    is_mut: false,
                    annotated_type: None,
                    value: Box::new(Expr::Struct {
                        id: ids.next(),
                        path: vec![],
                        name: "Thing".into(),
                        type_args: vec![],
                        fields: vec![],
                        span: span(),
                    }),
                    span: span(),
                }),
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "b".into(),
                    is_mut: false,
                    annotated_type: None,
                    value: Box::new(Expr::Ident { id: id_a, name: "a".into(), span: span() }),
                    span: span(),
                }),
                Stmt::Expr(ExprStmt {
                    id: ids.next(),
                    expr: Box::new(Expr::Ident { id: id_b, name: "a".into(), span: span() }),
                    span: span(),
                }),
            ],
            trailing: None,
            span: span(),
        };

        let func = FuncDecl {
            id: ids.next(),
            sig: simple_sig("main"),
            is_pub: true,
            body: Some(body),
            span: span(),
        };
        let module = make_module(func);
        let outcome = check_module(&registry, &types, &module);
        assert!(outcome.errors.iter().any(|e| e.code == "B001"));
    }

    #[test]
    fn copy_type_is_not_moved_on_use() {
        let mut ids = NodeIdGen::new();
        let id_a = ids.next();
        let id_b = ids.next();
        let registry = ModuleRegistry::new();
        let mut types = TypeTable::new();
        let int_id = ids.next();
        types.insert(int_id, Type::Primitive(crate::types::PrimitiveKind::I64));

        let body = Expr::Block {
            id: ids.next(),
            statements: vec![
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "a".into(),
                    is_mut: false,
                    annotated_type: None,
                    value: Box::new(Expr::Literal {
                        id: int_id,
                        value: Literal::Int { value: 1, suffix: None },
                        span: span(),
                    }),
                    span: span(),
                }),
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "b".into(),
                    is_mut: false,
                    annotated_type: None,
                    value: Box::new(Expr::Ident { id: id_a, name: "a".into(), span: span() }),
                    span: span(),
                }),
                Stmt::Expr(ExprStmt {
                    id: ids.next(),
                    expr: Box::new(Expr::Ident { id: id_b, name: "a".into(), span: span() }),
                    span: span(),
                }),
            ],
            trailing: None,
            span: span(),
        };

        let func = FuncDecl {
            id: ids.next(),
            sig: simple_sig("main"),
            is_pub: true,
            body: Some(body),
            span: span(),
        };
        let module = make_module(func);
        let outcome = check_module(&registry, &types, &module);
        assert!(!outcome.errors.iter().any(|e| e.code == "B001"));
    }

    /// `let mut v = Thing{}; let a = &mut v; v;` — using `v` directly
    /// while `a` holds a live mutable borrow of it must report B013; this
    /// is the exact-place case the exclusion used to swallow.
    #[test]
    fn use_of_mutably_borrowed_place_is_reported() {
        let mut ids = NodeIdGen::new();
        let registry = ModuleRegistry::new();
        let types = TypeTable::new();

        let body = Expr::Block {
            id: ids.next(),
            statements: vec![
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "v".into(),
                    is_mut: true,
                    annotated_type: None,
                    value: Box::new(Expr::Struct {
                        id: ids.next(),
                        path: vec![],
                        name: "Thing".into(),
                        type_args: vec![],
                        fields: vec![],
                        span: span(),
                    }),
                    span: span(),
                }),
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "a".into(),
                    is_mut: false,
                    annotated_type: None,
                    value: Box::new(Expr::Unary {
                        id: ids.next(),
                        op: UnaryOp::RefMut,
                        operand: Box::new(Expr::Ident { id: ids.next(), name: "v".into(), span: span() }),
                        span: span(),
                    }),
                    span: span(),
                }),
                Stmt::Expr(ExprStmt {
                    id: ids.next(),
                    expr: Box::new(Expr::Ident { id: ids.next(), name: "v".into(), span: span() }),
                    span: span(),
                }),
            ],
            trailing: None,
            span: span(),
        };

        let func = FuncDecl {
            id: ids.next(),
            sig: simple_sig("main"),
            is_pub: true,
            body: Some(body),
            span: span(),
        };
        let module = make_module(func);
        let outcome = check_module(&registry, &types, &module);
        assert!(outcome.errors.iter().any(|e| e.code == "B013"));
    }

    /// `let mut x = 42; let r = &x; x = 100;` with no intervening use of
    /// `r` — the assignment must be reported as B004, since `r` is still
    /// a live borrow of `x` as far as the checker can tell.
    #[test]
    fn reassigning_borrowed_place_is_reported() {
        let mut ids = NodeIdGen::new();
        let registry = ModuleRegistry::new();
        let types = TypeTable::new();

        let body = Expr::Block {
            id: ids.next(),
            statements: vec![
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "x".into(),
                    is_mut: true,
                    annotated_type: None,
                    value: Box::new(Expr::Literal {
                        id: ids.next(),
                        value: Literal::Int { value: 42, suffix: None },
                        span: span(),
                    }),
                    span: span(),
                }),
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "r".into(),
                    is_mut: false,
                    annotated_type: None,
                    value: Box::new(Expr::Unary {
                        id: ids.next(),
                        op: UnaryOp::Ref,
                        operand: Box::new(Expr::Ident { id: ids.next(), name: "x".into(), span: span() }),
                        span: span(),
                    }),
                    span: span(),
                }),
                Stmt::Expr(ExprStmt {
                    id: ids.next(),
                    expr: Box::new(Expr::Assign {
                        id: ids.next(),
                        target: Box::new(Expr::Ident { id: ids.next(), name: "x".into(), span: span() }),
                        value: Box::new(Expr::Literal {
                            id: ids.next(),
                            value: Literal::Int { value: 100, suffix: None },
                            span: span(),
                        }),
                        span: span(),
                    }),
                    span: span(),
                }),
            ],
            trailing: None,
            span: span(),
        };

        let func = FuncDecl {
            id: ids.next(),
            sig: simple_sig("main"),
            is_pub: true,
            body: Some(body),
            span: span(),
        };
        let module = make_module(func);
        let outcome = check_module(&registry, &types, &module);
        assert!(outcome.errors.iter().any(|e| e.code == "B004"));
    }

    /// `let mut x = 42; let r = &x; r; x = 100;` — `r`'s only use
    /// precedes the reassignment, so NLL must prune the borrow before
    /// `x = 100` and the program must typecheck (spec.md S2, property 3).
    #[test]
    fn nll_prunes_borrow_after_last_use_of_reference() {
        let mut ids = NodeIdGen::new();
        let registry = ModuleRegistry::new();
        let types = TypeTable::new();

        let body = Expr::Block {
            id: ids.next(),
            statements: vec![
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "x".into(),
                    is_mut: true,
                    annotated_type: None,
                    value: Box::new(Expr::Literal {
                        id: ids.next(),
                        value: Literal::Int { value: 42, suffix: None },
                        span: span(),
                    }),
                    span: span(),
                }),
                Stmt::Let(LetStmt {
                    id: ids.next(),
                    name: "r".into(),
                    is_mut: false,
                    annotated_type: None,
                    value: Box::new(Expr::Unary {
                        id: ids.next(),
                        op: UnaryOp::Ref,
                        operand: Box::new(Expr::Ident { id: ids.next(), name: "x".into(), span: span() }),
                        span: span(),
                    }),
                    span: span(),
                }),
                Stmt::Expr(ExprStmt {
                    id: ids.next(),
                    expr: Box::new(Expr::Ident { id: ids.next(), name: "r".into(), span: span() }),
                    span: span(),
                }),
                Stmt::Expr(ExprStmt {
                    id: ids.next(),
                    expr: Box::new(Expr::Assign {
                        id: ids.next(),
                        target: Box::new(Expr::Ident { id: ids.next(), name: "x".into(), span: span() }),
                        value: Box::new(Expr::Literal {
                            id: ids.next(),
                            value: Literal::Int { value: 100, suffix: None },
                            span: span(),
                        }),
                        span: span(),
                    }),
                    span: span(),
                }),
            ],
            trailing: None,
            span: span(),
        };

        let func = FuncDecl {
            id: ids.next(),
            sig: simple_sig("main"),
            is_pub: true,
            body: Some(body),
            span: span(),
        };
        let module = make_module(func);
        let outcome = check_module(&registry, &types, &module);
        assert!(!outcome.errors.iter().any(|e| e.code == "B004"));
    }
}
