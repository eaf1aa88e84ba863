//! Closure lowering.
//!
//! The type checker's `infer_closure` deliberately leaves `Type::Closure`'s
//! `captures` empty and defers the analysis entirely to this module (see the
//! doc comment on `typechecker::infer_closure`): free-variable discovery
//! only matters to code generation (it decides environment layout), so
//! there is no reason to compute it twice. This module re-derives the same
//! "walk the body before the params are in scope" rule, but against
//! already-codegen'd names in the enclosing `CodegenContext` scope stack
//! rather than against the checker's `TypeEnv`.

use std::collections::BTreeSet;

use inkwell::values::{BasicValueEnum, PointerValue};
use inkwell::AddressSpace;

use crate::ast::{ClosureParam, Expr, Stmt};

use super::CodegenContext;

/// A free variable captured by value, in first-seen order.
pub struct Capture {
    pub name: String,
}

/// Finds every identifier `body` reads that is neither one of `params` nor
/// bound by a `let` inside `body` itself, and that the enclosing codegen
/// scope actually has a binding for (anything else is a global function
/// name, resolved directly at the call site instead of captured).
pub fn free_variables<'ctx>(ctx: &CodegenContext<'ctx>, params: &[ClosureParam], body: &Expr) -> Vec<Capture> {
    let mut bound: BTreeSet<String> = params.iter().map(|p| p.name.clone()).collect();
    let mut seen_order = Vec::new();
    let mut seen_set = BTreeSet::new();
    walk_expr(ctx, body, &mut bound, &mut seen_order, &mut seen_set);
    seen_order.into_iter().map(|name| Capture { name }).collect()
}

fn walk_expr<'ctx>(
    ctx: &CodegenContext<'ctx>,
    expr: &Expr,
    bound: &mut BTreeSet<String>,
    order: &mut Vec<String>,
    seen: &mut BTreeSet<String>,
) {
    match expr {
        Expr::Ident { name, .. } => {
            if !bound.contains(name) && ctx.lookup_variable(name).is_some() && seen.insert(name.clone()) {
                order.push(name.clone());
            }
        }
        Expr::Path { .. } | Expr::Literal { .. } | Expr::Continue { .. } => {}
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(ctx, lhs, bound, order, seen);
            walk_expr(ctx, rhs, bound, order, seen);
        }
        Expr::Unary { operand, .. } => walk_expr(ctx, operand, bound, order, seen),
        Expr::Assign { target, value, .. } => {
            walk_expr(ctx, target, bound, order, seen);
            walk_expr(ctx, value, bound, order, seen);
        }
        Expr::Call { callee, args, .. } => {
            walk_expr(ctx, callee, bound, order, seen);
            for a in args {
                walk_expr(ctx, a, bound, order, seen);
            }
        }
        Expr::MethodCall { receiver, args, .. } => {
            walk_expr(ctx, receiver, bound, order, seen);
            for a in args {
                walk_expr(ctx, a, bound, order, seen);
            }
        }
        Expr::Field { base, .. } => walk_expr(ctx, base, bound, order, seen),
        Expr::Index { base, index, .. } => {
            walk_expr(ctx, base, bound, order, seen);
            walk_expr(ctx, index, bound, order, seen);
        }
        Expr::Range { start, end, .. } => {
            if let Some(s) = start {
                walk_expr(ctx, s, bound, order, seen);
            }
            if let Some(e) = end {
                walk_expr(ctx, e, bound, order, seen);
            }
        }
        Expr::Block { statements, trailing, .. } => {
            let mut inner_bound = bound.clone();
            for stmt in statements {
                match stmt {
                    Stmt::Let(l) => {
                        walk_expr(ctx, &l.value, &mut inner_bound, order, seen);
                        inner_bound.insert(l.name.clone());
                    }
                    Stmt::Expr(e) => walk_expr(ctx, &e.expr, &mut inner_bound, order, seen),
                }
            }
            if let Some(t) = trailing {
                walk_expr(ctx, t, &mut inner_bound, order, seen);
            }
        }
        Expr::If { condition, then_branch, else_branch, .. } => {
            walk_expr(ctx, condition, bound, order, seen);
            walk_expr(ctx, then_branch, bound, order, seen);
            if let Some(e) = else_branch {
                walk_expr(ctx, e, bound, order, seen);
            }
        }
        Expr::Ternary { condition, then_value, else_value, .. } => {
            walk_expr(ctx, condition, bound, order, seen);
            walk_expr(ctx, then_value, bound, order, seen);
            walk_expr(ctx, else_value, bound, order, seen);
        }
        Expr::When { scrutinee, arms, .. } => {
            walk_expr(ctx, scrutinee, bound, order, seen);
            for arm in arms {
                let mut arm_bound = bound.clone();
                bind_pattern_names(&arm.pattern, &mut arm_bound);
                walk_expr(ctx, &arm.body, &mut arm_bound, order, seen);
            }
        }
        Expr::Loop { body, .. } | Expr::While { body, .. } => walk_expr(ctx, body, bound, order, seen),
        Expr::For { binding, iterator, body, .. } => {
            walk_expr(ctx, iterator, bound, order, seen);
            let mut inner = bound.clone();
            inner.insert(binding.clone());
            walk_expr(ctx, body, &mut inner, order, seen);
        }
        Expr::Return { value, .. } | Expr::Break { value, .. } => {
            if let Some(v) = value {
                walk_expr(ctx, v, bound, order, seen);
            }
        }
        Expr::Tuple { elements, .. } | Expr::Array { elements, .. } => {
            for e in elements {
                walk_expr(ctx, e, bound, order, seen);
            }
        }
        Expr::Struct { fields, .. } => {
            for f in fields {
                walk_expr(ctx, &f.value, bound, order, seen);
            }
        }
        Expr::Closure { params, body, .. } => {
            let mut inner = bound.clone();
            inner.extend(params.iter().map(|p| p.name.clone()));
            walk_expr(ctx, body, &mut inner, order, seen);
        }
        Expr::Cast { value, .. } | Expr::Try { value, .. } => walk_expr(ctx, value, bound, order, seen),
        Expr::Lowlevel { operands, .. } => {
            for o in operands {
                walk_expr(ctx, o, bound, order, seen);
            }
        }
        Expr::InterpolatedString { segments, .. } | Expr::TemplateLiteral { segments, .. } => {
            for seg in segments {
                if let Some(inner) = &seg.interpolated {
                    walk_expr(ctx, inner, bound, order, seen);
                }
            }
        }
    }
}

fn bind_pattern_names(pattern: &crate::ast::Pattern, bound: &mut BTreeSet<String>) {
    use crate::ast::Pattern;
    match pattern {
        Pattern::Binding { name, .. } => {
            bound.insert(name.clone());
        }
        Pattern::TupleStruct { elements, .. } => {
            for e in elements {
                bind_pattern_names(e, bound);
            }
        }
        Pattern::Struct { fields, .. } => {
            for (_, p) in fields {
                bind_pattern_names(p, bound);
            }
        }
        Pattern::Guarded { pattern, .. } => bind_pattern_names(pattern, bound),
        Pattern::Wildcard { .. } | Pattern::Literal { .. } => {}
    }
}

impl<'ctx> CodegenContext<'ctx> {
    /// Builds the heap environment struct for a capturing closure: a
    /// `malloc`'d block shaped like `{capture_0_ty, capture_1_ty, ...}`,
    /// populated from the current values of each captured name.
    pub fn build_closure_environment(&self, captures: &[Capture]) -> PointerValue<'ctx> {
        if captures.is_empty() {
            return self.null_ptr();
        }

        let field_values: Vec<BasicValueEnum<'ctx>> = captures
            .iter()
            .map(|c| {
                let (ptr, ty, _) = self
                    .lookup_variable(&c.name)
                    .unwrap_or_else(|| panic!("capture '{}' not found in enclosing scope", c.name));
                self.builder.build_load(ty, ptr, &format!("cap.{}", c.name)).unwrap()
            })
            .collect();

        let field_types: Vec<_> = field_values.iter().map(|v| v.get_type()).collect();
        let env_struct_ty = self.context.struct_type(&field_types, false);

        let size = env_struct_ty
            .size_of()
            .unwrap_or_else(|| self.context.i64_type().const_int(0, false));
        let malloc = self.runtime_fn("malloc");
        let raw = self
            .builder
            .build_call(malloc, &[size.into()], "env.raw")
            .unwrap()
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();

        for (idx, value) in field_values.into_iter().enumerate() {
            let field_ptr = self
                .builder
                .build_struct_gep(env_struct_ty, raw, idx as u32, "env.field.ptr")
                .unwrap();
            self.builder.build_store(field_ptr, value).unwrap();
        }

        raw
    }

    /// Unpacks captures out of an implementation function's first
    /// parameter (`env: ptr`) back into named local slots, so the closure
    /// body's free-variable references resolve exactly as they did in the
    /// enclosing scope.
    pub fn unpack_closure_environment(
        &self,
        env_ptr: PointerValue<'ctx>,
        captures: &[Capture],
        capture_types: &[crate::types::Type],
    ) {
        if captures.is_empty() {
            return;
        }
        let field_llvm_types: Vec<_> = capture_types.iter().map(|t| self.get_llvm_type(t)).collect();
        let env_struct_ty = self.context.struct_type(&field_llvm_types, false);

        for (idx, (capture, ty)) in captures.iter().zip(capture_types.iter()).enumerate() {
            let field_ptr = self
                .builder
                .build_struct_gep(env_struct_ty, env_ptr, idx as u32, "env.field.ptr")
                .unwrap();
            let value = self
                .builder
                .build_load(field_llvm_types[idx], field_ptr, &format!("cap.{}", capture.name))
                .unwrap();
            let slot = self.declare_local(&capture.name, ty, false);
            self.builder.build_store(slot, value).unwrap();
        }
    }

    pub fn closure_impl_fn_type(
        &self,
        param_types: &[crate::types::Type],
        return_type: &crate::types::Type,
    ) -> inkwell::types::FunctionType<'ctx> {
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let mut llvm_params: Vec<inkwell::types::BasicMetadataTypeEnum> = vec![ptr_ty.into()];
        llvm_params.extend(param_types.iter().map(|t| self.get_llvm_type(t).into()));

        match return_type {
            crate::types::Type::Primitive(crate::types::PrimitiveKind::Unit) => {
                self.context.void_type().fn_type(&llvm_params, false)
            }
            other => self.get_llvm_type(other).fn_type(&llvm_params, false),
        }
    }
}
