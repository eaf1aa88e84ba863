//! Three-tier primitive method dispatch. `receiver.m(args)`
//! on a value of primitive type lowers one of three ways depending on which
//! tier `m` falls into; `dispatch` is the single entry point `expr.rs`'s
//! method-call lowering consults once it has resolved the receiver's type
//! to `Type::Primitive`.

use inkwell::values::BasicValueEnum;
use inkwell::{FloatPredicate, IntPredicate};

use crate::types::{PrimitiveKind, Type};

use super::CodegenContext;

/// Tries to lower `receiver.method(args)` as a primitive intrinsic. Returns
/// `None` if `kind`/`method` isn't one this module recognizes, so the caller
/// falls back to ordinary behavior-method resolution (a primitive can still
/// have a real `impl SomeBehavior for I32` the checker resolved).
pub fn dispatch<'ctx>(
    ctx: &CodegenContext<'ctx>,
    kind: PrimitiveKind,
    method: &str,
    receiver: BasicValueEnum<'ctx>,
    args: &[BasicValueEnum<'ctx>],
) -> Option<BasicValueEnum<'ctx>> {
    if let Some(v) = tier1(ctx, kind, method, receiver, args) {
        return Some(v);
    }
    if let Some(v) = tier2(ctx, kind, method, receiver, args) {
        return Some(v);
    }
    tier3(ctx, kind, method, receiver, args)
}

/// Always-inlined operational identities.
fn tier1<'ctx>(
    ctx: &CodegenContext<'ctx>,
    kind: PrimitiveKind,
    method: &str,
    receiver: BasicValueEnum<'ctx>,
    args: &[BasicValueEnum<'ctx>],
) -> Option<BasicValueEnum<'ctx>> {
    if kind == PrimitiveKind::Bool && method == "negate" {
        let v = receiver.into_int_value();
        return Some(ctx.builder.build_not(v, "bool.negate").unwrap().into());
    }
    if kind == PrimitiveKind::Str && method == "to_string" {
        return Some(receiver);
    }
    match method {
        "duplicate" | "to_owned" | "borrow" | "borrow_mut" => Some(receiver),
        "is_zero" => Some(compare_to_zero(ctx, kind, receiver, IntPredicate::EQ, FloatPredicate::OEQ)),
        "is_one" => Some(compare_to_const(ctx, kind, receiver, 1, IntPredicate::EQ, FloatPredicate::OEQ)),
        "neg" if kind.is_integer() => Some(ctx.builder.build_int_neg(receiver.into_int_value(), "neg").unwrap().into()),
        "neg" if kind.is_float() => Some(ctx.builder.build_float_neg(receiver.into_float_value(), "neg").unwrap().into()),
        "add" | "sub" | "mul" | "div" | "rem" if args.len() == 1 => {
            Some(arith(ctx, kind, method, receiver, args[0]))
        }
        "cmp" if args.len() == 1 => Some(cmp_three_way(ctx, kind, receiver, args[0])),
        "max" if args.len() == 1 => Some(select(ctx, kind, receiver, args[0], true)),
        "min" if args.len() == 1 => Some(select(ctx, kind, receiver, args[0], false)),
        _ => None,
    }
}

fn arith<'ctx>(ctx: &CodegenContext<'ctx>, kind: PrimitiveKind, op: &str, lhs: BasicValueEnum<'ctx>, rhs: BasicValueEnum<'ctx>) -> BasicValueEnum<'ctx> {
    if kind.is_float() {
        let (l, r) = (lhs.into_float_value(), rhs.into_float_value());
        return match op {
            "add" => ctx.builder.build_float_add(l, r, "fadd").unwrap().into(),
            "sub" => ctx.builder.build_float_sub(l, r, "fsub").unwrap().into(),
            "mul" => ctx.builder.build_float_mul(l, r, "fmul").unwrap().into(),
            "div" => ctx.builder.build_float_div(l, r, "fdiv").unwrap().into(),
            "rem" => ctx.builder.build_float_rem(l, r, "frem").unwrap().into(),
            _ => unreachable!(),
        };
    }
    let (l, r) = (lhs.into_int_value(), rhs.into_int_value());
    match op {
        "add" => ctx.builder.build_int_add(l, r, "iadd").unwrap().into(),
        "sub" => ctx.builder.build_int_sub(l, r, "isub").unwrap().into(),
        "mul" => ctx.builder.build_int_mul(l, r, "imul").unwrap().into(),
        "div" if kind.is_signed() => ctx.builder.build_int_signed_div(l, r, "idiv").unwrap().into(),
        "div" => ctx.builder.build_int_unsigned_div(l, r, "idiv").unwrap().into(),
        "rem" if kind.is_signed() => ctx.builder.build_int_signed_rem(l, r, "irem").unwrap().into(),
        "rem" => ctx.builder.build_int_unsigned_rem(l, r, "irem").unwrap().into(),
        _ => unreachable!(),
    }
}

fn compare_to_zero<'ctx>(ctx: &CodegenContext<'ctx>, kind: PrimitiveKind, value: BasicValueEnum<'ctx>, ip: IntPredicate, fp: FloatPredicate) -> BasicValueEnum<'ctx> {
    compare_to_const(ctx, kind, value, 0, ip, fp)
}

fn compare_to_const<'ctx>(ctx: &CodegenContext<'ctx>, kind: PrimitiveKind, value: BasicValueEnum<'ctx>, constant: u64, ip: IntPredicate, fp: FloatPredicate) -> BasicValueEnum<'ctx> {
    if kind.is_float() {
        let f = value.into_float_value();
        let zero = f.get_type().const_float(constant as f64);
        ctx.builder.build_float_compare(fp, f, zero, "fcmp").unwrap().into()
    } else {
        let i = value.into_int_value();
        let zero = i.get_type().const_int(constant, false);
        ctx.builder.build_int_compare(ip, i, zero, "icmp").unwrap().into()
    }
}

/// `cmp` returns an `I32`-ish three-way comparison (`-1`/`0`/`1`), built out
/// of two comparisons and two `select`s the way small always-inlined
/// comparator helpers typically lower.
fn cmp_three_way<'ctx>(ctx: &CodegenContext<'ctx>, kind: PrimitiveKind, lhs: BasicValueEnum<'ctx>, rhs: BasicValueEnum<'ctx>) -> BasicValueEnum<'ctx> {
    let i32_ty = ctx.context.i32_type();
    let (lt, gt) = if kind.is_float() {
        let (l, r) = (lhs.into_float_value(), rhs.into_float_value());
        (
            ctx.builder.build_float_compare(FloatPredicate::OLT, l, r, "lt").unwrap(),
            ctx.builder.build_float_compare(FloatPredicate::OGT, l, r, "gt").unwrap(),
        )
    } else {
        let (l, r) = (lhs.into_int_value(), rhs.into_int_value());
        let (ltp, gtp) = if kind.is_signed() {
            (IntPredicate::SLT, IntPredicate::SGT)
        } else {
            (IntPredicate::ULT, IntPredicate::UGT)
        };
        (
            ctx.builder.build_int_compare(ltp, l, r, "lt").unwrap(),
            ctx.builder.build_int_compare(gtp, l, r, "gt").unwrap(),
        )
    };
    let neg_one = i32_ty.const_int((-1i64) as u64, true);
    let zero = i32_ty.const_int(0, false);
    let one = i32_ty.const_int(1, false);
    let gt_or_eq = ctx.builder.build_select(gt, one, zero, "gt.sel").unwrap().into_int_value();
    ctx.builder.build_select(lt, neg_one, gt_or_eq, "cmp.sel").unwrap()
}

fn select<'ctx>(ctx: &CodegenContext<'ctx>, kind: PrimitiveKind, lhs: BasicValueEnum<'ctx>, rhs: BasicValueEnum<'ctx>, want_max: bool) -> BasicValueEnum<'ctx> {
    if kind.is_float() {
        let (l, r) = (lhs.into_float_value(), rhs.into_float_value());
        let pred = if want_max { FloatPredicate::OGT } else { FloatPredicate::OLT };
        let cond = ctx.builder.build_float_compare(pred, l, r, "sel.cmp").unwrap();
        ctx.builder.build_select(cond, l, r, "sel").unwrap()
    } else {
        let (l, r) = (lhs.into_int_value(), rhs.into_int_value());
        let pred = match (want_max, kind.is_signed()) {
            (true, true) => IntPredicate::SGT,
            (true, false) => IntPredicate::UGT,
            (false, true) => IntPredicate::SLT,
            (false, false) => IntPredicate::ULT,
        };
        let cond = ctx.builder.build_int_compare(pred, l, r, "sel.cmp").unwrap();
        ctx.builder.build_select(cond, l, r, "sel").unwrap()
    }
}

const CHECKED_OPS: &[&str] = &["checked_add", "checked_sub", "checked_mul", "checked_div", "checked_rem", "checked_neg", "checked_shl", "checked_shr"];

/// Checked arithmetic via LLVM overflow intrinsics, paired with a
/// `Maybe[T]` construction. `checked_div` and
/// `checked_rem` additionally guard against a zero divisor, since those
/// have no corresponding `llvm.*.with.overflow` intrinsic.
fn tier2<'ctx>(
    ctx: &CodegenContext<'ctx>,
    kind: PrimitiveKind,
    method: &str,
    receiver: BasicValueEnum<'ctx>,
    args: &[BasicValueEnum<'ctx>],
) -> Option<BasicValueEnum<'ctx>> {
    if !CHECKED_OPS.contains(&method) || !kind.is_integer() {
        return None;
    }
    let maybe_enum = ctx
        .program
        .enums
        .iter()
        .find(|e| e.base_name == "Maybe" && e.variants.iter().any(|(n, p)| n == "Just" && p.first() == Some(&Type::Primitive(kind))))?;

    let bits = kind.bit_width();
    let just_value = if method == "checked_neg" {
        checked_neg(ctx, kind, receiver, bits)
    } else if method == "checked_shl" || method == "checked_shr" {
        // Shift amount overflow isn't tracked by an LLVM intrinsic; treat
        // any shift amount `>= bit width` as overflow, matching the
        // well-defined-shift convention the rest of this tier follows.
        checked_shift(ctx, kind, method, receiver, args[0], bits)
    } else if method == "checked_div" || method == "checked_rem" {
        checked_div_rem(ctx, kind, method, receiver, args[0])
    } else {
        checked_overflow_op(ctx, kind, method, receiver, args[0], bits)
    };

    match just_value {
        Some((value, is_ok)) => {
            let just = ctx.build_enum_value(maybe_enum, "Just", &[value]);
            let nothing = ctx.build_enum_value(maybe_enum, "Nothing", &[]);
            Some(ctx.builder.build_select(is_ok, just, nothing, "checked.sel").unwrap())
        }
        None => None,
    }
}

fn checked_overflow_op<'ctx>(
    ctx: &CodegenContext<'ctx>,
    kind: PrimitiveKind,
    method: &str,
    lhs: BasicValueEnum<'ctx>,
    rhs: BasicValueEnum<'ctx>,
    bits: u32,
) -> Option<(BasicValueEnum<'ctx>, inkwell::values::IntValue<'ctx>)> {
    let op = match method {
        "checked_add" => "add",
        "checked_sub" => "sub",
        "checked_mul" => "mul",
        _ => return None,
    };
    let intrinsic = ctx.overflow_intrinsic(op, kind.is_signed(), bits);
    let call = ctx
        .builder
        .build_call(intrinsic, &[lhs.into(), rhs.into()], "checked.call")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap()
        .into_struct_value();
    let value = ctx.builder.build_extract_value(call, 0, "checked.val").unwrap();
    let overflowed = ctx.builder.build_extract_value(call, 1, "checked.ovf").unwrap().into_int_value();
    let ok = ctx.builder.build_not(overflowed, "checked.ok").unwrap();
    Some((value, ok))
}

fn checked_div_rem<'ctx>(
    ctx: &CodegenContext<'ctx>,
    kind: PrimitiveKind,
    method: &str,
    lhs: BasicValueEnum<'ctx>,
    rhs: BasicValueEnum<'ctx>,
) -> Option<(BasicValueEnum<'ctx>, inkwell::values::IntValue<'ctx>)> {
    let divisor = rhs.into_int_value();
    let zero = divisor.get_type().const_int(0, false);
    let nonzero = ctx.builder.build_int_compare(IntPredicate::NE, divisor, zero, "div.nonzero").unwrap();
    let op = if method == "checked_div" { "div" } else { "rem" };
    let value = arith(ctx, kind, op, lhs, rhs);
    Some((value, nonzero))
}

fn checked_neg<'ctx>(ctx: &CodegenContext<'ctx>, kind: PrimitiveKind, value: BasicValueEnum<'ctx>, bits: u32) -> Option<(BasicValueEnum<'ctx>, inkwell::values::IntValue<'ctx>)> {
    let int_ty = ctx.context.custom_width_int_type(bits);
    let zero = int_ty.const_int(0, false);
    checked_overflow_op(ctx, kind, "checked_sub", zero.into(), value, bits)
}

fn checked_shift<'ctx>(
    ctx: &CodegenContext<'ctx>,
    kind: PrimitiveKind,
    method: &str,
    value: BasicValueEnum<'ctx>,
    amount: BasicValueEnum<'ctx>,
    bits: u32,
) -> Option<(BasicValueEnum<'ctx>, inkwell::values::IntValue<'ctx>)> {
    let shift_amount = amount.into_int_value();
    let limit = shift_amount.get_type().const_int(bits as u64, false);
    let in_range = ctx.builder.build_int_compare(IntPredicate::ULT, shift_amount, limit, "shift.ok").unwrap();
    let int_value = value.into_int_value();
    let result = if method == "checked_shl" {
        ctx.builder.build_left_shift(int_value, shift_amount, "shl").unwrap()
    } else if kind.is_signed() {
        ctx.builder.build_right_shift(int_value, shift_amount, true, "ashr").unwrap()
    } else {
        ctx.builder.build_right_shift(int_value, shift_amount, false, "lshr").unwrap()
    };
    Some((result.into(), in_range))
}

/// Dispatched to the registered `@tml_<TypeName>_<method>` implementation
/// — every primitive method not already covered
/// by tier 1/2: `hash`, non-`Str` `to_string`, `parse_*`, `trim`, `split`,
/// `replace`, etc.
fn tier3<'ctx>(
    ctx: &CodegenContext<'ctx>,
    kind: PrimitiveKind,
    method: &str,
    receiver: BasicValueEnum<'ctx>,
    args: &[BasicValueEnum<'ctx>],
) -> Option<BasicValueEnum<'ctx>> {
    let symbol = format!("tml_{}_{method}", kind.short_name());
    let ptr_ty = ctx.context.ptr_type(inkwell::AddressSpace::default());
    let mut param_types: Vec<inkwell::types::BasicMetadataTypeEnum> = vec![receiver.get_type().into()];
    param_types.extend(args.iter().map(|a| a.get_type().into()));
    let fn_type = ptr_ty.fn_type(&param_types, false);
    let func = ctx.declare_with_type(&symbol, fn_type);

    let mut call_args: Vec<inkwell::values::BasicMetadataValueEnum> = vec![receiver.into()];
    call_args.extend(args.iter().map(|a| (*a).into()));
    ctx.builder
        .build_call(func, &call_args, "tier3.call")
        .unwrap()
        .try_as_basic_value()
        .left()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monomorphize::MonomorphizedProgram;
    use crate::registry::ModuleRegistry;
    use crate::typechecker::TypeTable;

    fn maybe_i8_enum() -> crate::monomorphize::MonomorphizedEnum {
        crate::monomorphize::MonomorphizedEnum {
            mangled_name: "Maybe__I8".into(),
            base_name: "Maybe".into(),
            variants: vec![("Just".into(), vec![Type::Primitive(PrimitiveKind::I8)]), ("Nothing".into(), vec![])],
        }
    }

    /// S1: `x.checked_add(y)` on an `I8` receiver lowers to
    /// `llvm.sadd.with.overflow.i8` and selects between `Just`/`Nothing`.
    #[test]
    fn checked_add_emits_overflow_intrinsic_and_maybe() {
        let context = inkwell::context::Context::create();
        let registry = ModuleRegistry::new();
        let mut program = MonomorphizedProgram::default();
        program.enums.push(maybe_i8_enum());
        let node_types = TypeTable::new();
        let ctx = CodegenContext::new(&context, "test", "x86_64-unknown-linux-gnu", &registry, &program, &node_types);

        let i8_ty = context.i8_type();
        let return_ty = ctx.enum_layout(&maybe_i8_enum()).llvm_type;
        let fn_type = return_ty.fn_type(&[i8_ty.into(), i8_ty.into()], false);
        let function = ctx.module.add_function("checked_add_test", fn_type, None);
        let entry = context.append_basic_block(function, "entry");
        ctx.builder.position_at_end(entry);

        let lhs = function.get_nth_param(0).unwrap();
        let rhs = function.get_nth_param(1).unwrap();
        let result = dispatch(&ctx, PrimitiveKind::I8, "checked_add", lhs, &[rhs]).expect("checked_add should lower");
        ctx.builder.build_return(Some(&result as &dyn inkwell::values::BasicValue)).unwrap();

        let ir = ctx.module.print_to_string().to_string();
        assert!(ir.contains("llvm.sadd.with.overflow.i8"), "missing overflow intrinsic call:\n{ir}");
        assert!(ir.contains("select"), "missing Just/Nothing select:\n{ir}");
    }

    /// Without a `Maybe` instantiation for the receiver's primitive kind in
    /// scope, checked arithmetic has nothing to construct and tier 2 must
    /// decline (falling through to tier 3's symbol-call fallback, which also
    /// fails here since `tml_I8_checked_add` isn't declared in a test
    /// module, so `dispatch` returns `None`).
    #[test]
    fn checked_add_without_maybe_instantiation_does_not_panic() {
        let context = inkwell::context::Context::create();
        let registry = ModuleRegistry::new();
        let program = MonomorphizedProgram::default();
        let node_types = TypeTable::new();
        let ctx = CodegenContext::new(&context, "test", "x86_64-unknown-linux-gnu", &registry, &program, &node_types);

        let i8_ty = context.i8_type();
        let fn_type = i8_ty.fn_type(&[i8_ty.into(), i8_ty.into()], false);
        let function = ctx.module.add_function("checked_add_test", fn_type, None);
        let entry = context.append_basic_block(function, "entry");
        ctx.builder.position_at_end(entry);

        let lhs = function.get_nth_param(0).unwrap();
        let rhs = function.get_nth_param(1).unwrap();
        assert!(tier2(&ctx, PrimitiveKind::I8, "checked_add", lhs, &[rhs]).is_none());
    }
}
