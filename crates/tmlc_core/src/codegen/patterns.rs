//! `when` expression lowering. A `when` over an enum scrutinee lowers to a switch on
//! the tagged union's discriminant, one destination block per arm that binds
//! its payload fields via `extractvalue`/struct-GEP, an optional guard
//! branch, and a phi node merging every arm's result at the join block.
//!
//! Exhaustiveness itself was already checked in C6; this
//! module only has to lower arms that survived that check, so an
//! unreachable "no arm matched" path is modeled as `unreachable` rather than
//! a runtime panic.

use inkwell::values::BasicValueEnum;
use inkwell::IntPredicate;

use crate::ast::{Expr, LiteralPattern, Pattern, WhenArm};
use crate::monomorphize::MonomorphizedEnum;
use crate::types::Type;

use super::CodegenContext;

/// Generates a full `when` expression: `scrutinee` is evaluated once, then
/// dispatched against `arms` in order (first match wins, matching the
/// source's textual arm order — arms are not reordered).
pub fn codegen_when<'ctx>(
    ctx: &CodegenContext<'ctx>,
    scrutinee: &Expr,
    arms: &[WhenArm],
    result_ty: &Type,
) -> Option<BasicValueEnum<'ctx>> {
    let scrutinee_ty = ctx.resolve_node_type(scrutinee.id());
    let scrutinee_value = super::expr::codegen_expr(ctx, scrutinee)?;

    let function = ctx.current_function.borrow().expect("when outside a function body");
    let merge_block = ctx.context.append_basic_block(function, "when.merge");

    let result_llvm_ty = if matches!(result_ty, Type::Primitive(crate::types::PrimitiveKind::Unit)) {
        None
    } else {
        Some(ctx.get_llvm_type(result_ty))
    };

    let mut incoming: Vec<(BasicValueEnum<'ctx>, inkwell::basic_block::BasicBlock<'ctx>)> = Vec::new();

    let enum_def = enum_definition(ctx, &scrutinee_ty);

    // Stash the scrutinee behind a stack slot so payload extraction (which
    // needs a pointer, not a loaded value) has something to GEP into.
    let scrutinee_slot = ctx.declare_local("when.scrutinee", &scrutinee_ty, false);
    ctx.builder.build_store(scrutinee_slot, scrutinee_value).unwrap();

    let mut next_check_block = ctx.context.append_basic_block(function, "when.arm.0.check");
    ctx.builder.build_unconditional_branch(next_check_block).unwrap();

    for (arm_idx, arm) in arms.iter().enumerate() {
        ctx.builder.position_at_end(next_check_block);

        let body_block = ctx.context.append_basic_block(function, &format!("when.arm.{arm_idx}.body"));
        let fallthrough_block = if arm_idx + 1 < arms.len() {
            ctx.context.append_basic_block(function, &format!("when.arm.{}.check", arm_idx + 1))
        } else {
            ctx.context.append_basic_block(function, "when.no_match")
        };

        // Each arm gets its own name scope so two arms binding the same
        // name (e.g. `Just(v)` followed by a plain `v` wildcard-capture) to
        // different types don't collide in the scope map, even though both
        // ultimately allocate in the shared function entry block.
        ctx.enter_scope();
        bind_and_branch(
            ctx,
            &arm.pattern,
            scrutinee_slot,
            &scrutinee_ty,
            enum_def,
            body_block,
            fallthrough_block,
        );

        ctx.builder.position_at_end(body_block);
        let arm_value = super::expr::codegen_expr(ctx, &arm.body);
        if ctx.builder.get_insert_block().unwrap().get_terminator().is_none() {
            // Drop/lifetime-end the arm's own bindings before leaving —
            // must happen while the block is still open, since inserting
            // after a terminator (e.g. a `return` inside the arm) is
            // invalid IR, hence the terminator check above.
            ctx.exit_scope();
            if let Some(value) = arm_value {
                incoming.push((value, ctx.builder.get_insert_block().unwrap()));
            }
            ctx.builder.build_unconditional_branch(merge_block).unwrap();
        } else {
            ctx.pop_scope_silently();
        }

        next_check_block = fallthrough_block;
    }

    // `next_check_block` is now the final "no arm matched" block; checked
    // exhaustiveness means this is unreachable at runtime.
    ctx.builder.position_at_end(next_check_block);
    ctx.builder.build_unreachable().unwrap();

    ctx.builder.position_at_end(merge_block);
    match result_llvm_ty {
        Some(ty) if !incoming.is_empty() => {
            let phi = ctx.builder.build_phi(ty, "when.result").unwrap();
            for (value, block) in &incoming {
                phi.add_incoming(&[(value as &dyn inkwell::values::BasicValue, *block)]);
            }
            Some(phi.as_basic_value())
        }
        _ => None,
    }
}

fn enum_definition<'ctx, 'a>(ctx: &'a CodegenContext<'ctx>, ty: &Type) -> Option<&'a MonomorphizedEnum> {
    match ty.auto_deref() {
        Type::Named(n) => {
            let key = super::mangled(n);
            ctx.program.enums.iter().find(|e| e.mangled_name == key)
        }
        _ => None,
    }
}

/// Emits the match test for one pattern: on success, binds any payload
/// names into the current scope and branches to `on_match`; on failure,
/// branches to `on_fail` (the next arm's check block, or the unreachable
/// tail).
fn bind_and_branch<'ctx>(
    ctx: &CodegenContext<'ctx>,
    pattern: &Pattern,
    scrutinee_slot: inkwell::values::PointerValue<'ctx>,
    scrutinee_ty: &Type,
    enum_def: Option<&MonomorphizedEnum>,
    on_match: inkwell::basic_block::BasicBlock<'ctx>,
    on_fail: inkwell::basic_block::BasicBlock<'ctx>,
) {
    match pattern {
        Pattern::Wildcard { .. } => {
            ctx.builder.build_unconditional_branch(on_match).unwrap();
        }
        Pattern::Binding { name, .. } => {
            let llvm_ty = ctx.get_llvm_type(scrutinee_ty);
            let value = ctx.builder.build_load(llvm_ty, scrutinee_slot, "when.bind").unwrap();
            let slot = ctx.declare_local(name, scrutinee_ty, false);
            ctx.builder.build_store(slot, value).unwrap();
            ctx.builder.build_unconditional_branch(on_match).unwrap();
        }
        Pattern::Literal { value, .. } => {
            let llvm_ty = ctx.get_llvm_type(scrutinee_ty);
            let scrutinee_value = ctx.builder.build_load(llvm_ty, scrutinee_slot, "when.lit.val").unwrap();
            let matches = literal_eq(ctx, scrutinee_value, value);
            ctx.builder.build_conditional_branch(matches, on_match, on_fail).unwrap();
        }
        Pattern::TupleStruct { name, elements, .. } => {
            let Some(def) = enum_def else {
                ctx.builder.build_unconditional_branch(on_fail).unwrap();
                return;
            };
            let llvm_ty = ctx.get_llvm_type(scrutinee_ty);
            let enum_value = ctx.builder.build_load(llvm_ty, scrutinee_slot, "when.enum.val").unwrap();
            let tag = ctx.extract_enum_tag(enum_value).into_int_value();
            let expected_tag = def
                .variants
                .iter()
                .position(|(n, _)| n == name)
                .expect("unknown variant reached codegen") as u64;
            let tag_matches = ctx
                .builder
                .build_int_compare(
                    IntPredicate::EQ,
                    tag,
                    ctx.context.i32_type().const_int(expected_tag, false),
                    "when.tag.eq",
                )
                .unwrap();

            let bind_block = ctx.context.append_basic_block(
                *ctx.current_function.borrow().as_ref().unwrap(),
                "when.tuple.bind",
            );
            ctx.builder.build_conditional_branch(tag_matches, bind_block, on_fail).unwrap();
            ctx.builder.position_at_end(bind_block);

            let (_, payload_types) = &def.variants[expected_tag as usize];
            for (idx, (elem_pattern, payload_ty)) in elements.iter().zip(payload_types.iter()).enumerate() {
                let payload = ctx.extract_enum_payload(def, name, scrutinee_slot, idx);
                bind_payload(ctx, elem_pattern, payload, payload_ty);
            }
            ctx.builder.build_unconditional_branch(on_match).unwrap();
        }
        Pattern::Struct { fields, .. } => {
            // Struct patterns only ever discriminate struct-typed
            // scrutinees (no variant tag to check) — bind every named
            // field directly off the scrutinee's own fields.
            let Type::Named(n) = scrutinee_ty.auto_deref() else {
                ctx.builder.build_unconditional_branch(on_fail).unwrap();
                return;
            };
            let key = super::mangled(n);
            let Some(s) = ctx.program.structs.iter().find(|s| s.mangled_name == key) else {
                ctx.builder.build_unconditional_branch(on_fail).unwrap();
                return;
            };
            let llvm_ty = ctx.get_llvm_type(scrutinee_ty);
            for (field_name, field_pattern) in fields {
                let index = s
                    .fields
                    .iter()
                    .position(|(n, _)| n == field_name)
                    .expect("unknown field reached codegen") as u32;
                let field_ty = &s.fields[index as usize].1;
                let field_ptr = ctx
                    .builder
                    .build_struct_gep(llvm_ty, scrutinee_slot, index, "when.field.ptr")
                    .unwrap();
                let field_llvm_ty = ctx.get_llvm_type(field_ty);
                let value = ctx.builder.build_load(field_llvm_ty, field_ptr, "when.field.val").unwrap();
                bind_payload(ctx, field_pattern, value, field_ty);
            }
            ctx.builder.build_unconditional_branch(on_match).unwrap();
        }
        Pattern::Guarded { pattern, condition, .. } => {
            let function = *ctx.current_function.borrow().as_ref().unwrap();
            let guard_block = ctx.context.append_basic_block(function, "when.guard");
            bind_and_branch(ctx, pattern, scrutinee_slot, scrutinee_ty, enum_def, guard_block, on_fail);
            ctx.builder.position_at_end(guard_block);
            let cond_value = super::expr::codegen_expr(ctx, condition)
                .expect("guard condition produced no value")
                .into_int_value();
            ctx.builder.build_conditional_branch(cond_value, on_match, on_fail).unwrap();
        }
    }
}

fn bind_payload<'ctx>(
    ctx: &CodegenContext<'ctx>,
    pattern: &Pattern,
    value: BasicValueEnum<'ctx>,
    ty: &Type,
) {
    match pattern {
        Pattern::Binding { name, .. } => {
            let slot = ctx.declare_local(name, ty, false);
            ctx.builder.build_store(slot, value).unwrap();
        }
        Pattern::Wildcard { .. } => {}
        // Nested structural patterns inside a payload position go through a
        // temporary slot so the same `bind_and_branch` machinery applies
        // recursively without duplicating the tag/field logic here.
        other => {
            let slot = ctx.declare_local("when.nested", ty, false);
            ctx.builder.build_store(slot, value).unwrap();
            let function = *ctx.current_function.borrow().as_ref().unwrap();
            let matched = ctx.context.append_basic_block(function, "when.nested.ok");
            let failed = ctx.context.append_basic_block(function, "when.nested.fail");
            let enum_def = enum_definition(ctx, ty);
            bind_and_branch(ctx, other, slot, ty, enum_def, matched, failed);
            ctx.builder.position_at_end(failed);
            ctx.builder.build_unreachable().unwrap();
            ctx.builder.position_at_end(matched);
        }
    }
}

fn literal_eq<'ctx>(ctx: &CodegenContext<'ctx>, scrutinee: BasicValueEnum<'ctx>, pattern: &LiteralPattern) -> inkwell::values::IntValue<'ctx> {
    match pattern {
        LiteralPattern::Int(v) => {
            let int_value = scrutinee.into_int_value();
            let expected = int_value.get_type().const_int(*v as u64, true);
            ctx.builder.build_int_compare(IntPredicate::EQ, int_value, expected, "lit.eq").unwrap()
        }
        LiteralPattern::Bool(v) => {
            let int_value = scrutinee.into_int_value();
            let expected = ctx.context.bool_type().const_int(*v as u64, false);
            ctx.builder.build_int_compare(IntPredicate::EQ, int_value, expected, "lit.eq").unwrap()
        }
        LiteralPattern::Char(v) => {
            let int_value = scrutinee.into_int_value();
            let expected = ctx.context.i32_type().const_int(*v as u64, false);
            ctx.builder.build_int_compare(IntPredicate::EQ, int_value, expected, "lit.eq").unwrap()
        }
        LiteralPattern::Float(bits) => {
            let float_value = scrutinee.into_float_value();
            let expected = ctx.context.f64_type().const_float(f64::from_bits(*bits));
            ctx.builder
                .build_float_compare(inkwell::FloatPredicate::OEQ, float_value, expected, "lit.eq")
                .unwrap()
        }
        LiteralPattern::Str(s) => {
            let ptr_value = scrutinee.into_pointer_value();
            let global = ctx.builder.build_global_string_ptr(s, "lit.str").unwrap();
            let str_eq = ctx.runtime_fn("str_eq");
            ctx.builder
                .build_call(str_eq, &[ptr_value.into(), global.as_pointer_value().into()], "lit.streq")
                .unwrap()
                .try_as_basic_value()
                .left()
                .unwrap()
                .into_int_value()
        }
    }
}
