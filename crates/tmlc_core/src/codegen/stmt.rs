//! Function, impl-method and class-method declaration/body codegen. Each
//! kind follows the same two-pass shape `vtable` uses for behavior impls: a
//! `register_*` pass adds the bare function declaration so forward
//! references and mutual recursion resolve independent of generation order,
//! then a `codegen_*` pass fills in the body against the
//! already-registered `FunctionValue`.

use std::collections::HashMap;

use inkwell::module::Linkage;
use inkwell::values::BasicValue;

use crate::ast::{ClassDecl, TypeExpr};
use crate::monomorphize::{MonomorphizedFunc, MonomorphizedImplMethod};
use crate::types::{NamedType, PrimitiveKind, Type};

use super::expr::{codegen_expr, method_fn_type};
use super::CodegenContext;

fn is_exported(ctx: &CodegenContext<'_>, base_name: &str) -> bool {
    base_name == "main" || ctx.registry.find_func(base_name).map(|d| d.is_pub).unwrap_or(false)
}

/// `TypeExpr -> Type` resolution for a signature that may reference both
/// `Self` and the enclosing impl block's own type parameters (`T` in
/// `impl[T] Show for Pair[T]`); `vtable::type_expr_to_type` only covers
/// `Self` since behavior default bodies never introduce their own generics.
fn resolve_type_expr(te: &TypeExpr, self_ty: &Type, bindings: &HashMap<String, Type>) -> Type {
    match te {
        TypeExpr::Unit { .. } => Type::UNIT,
        TypeExpr::Name { name, .. } if name == "Self" => self_ty.clone(),
        TypeExpr::Name { name, type_args, .. } => {
            if let Some(bound) = bindings.get(name) {
                return bound.clone();
            }
            if let Some(prim) = crate::typechecker::env::primitive_kind_of(name) {
                Type::Primitive(prim)
            } else {
                Type::Named(NamedType {
                    name: name.clone(),
                    module_path: Vec::new(),
                    type_args: type_args.iter().map(|t| resolve_type_expr(t, self_ty, bindings)).collect(),
                })
            }
        }
        TypeExpr::Ref { is_mut, inner, .. } => Type::Ref {
            is_mut: *is_mut,
            inner: Box::new(resolve_type_expr(inner, self_ty, bindings)),
            lifetime: None,
        },
        TypeExpr::Ptr { inner, .. } => Type::Ptr(Box::new(resolve_type_expr(inner, self_ty, bindings))),
        TypeExpr::Tuple { elements, .. } => {
            Type::Tuple(elements.iter().map(|t| resolve_type_expr(t, self_ty, bindings)).collect())
        }
        TypeExpr::Array { element, length, .. } => Type::Array {
            element: Box::new(resolve_type_expr(element, self_ty, bindings)),
            length: *length,
        },
        TypeExpr::Slice { element, .. } => Type::Slice(Box::new(resolve_type_expr(element, self_ty, bindings))),
        TypeExpr::Func { params, return_type, .. } => Type::Func {
            params: params.iter().map(|t| resolve_type_expr(t, self_ty, bindings)).collect(),
            return_type: Box::new(resolve_type_expr(return_type, self_ty, bindings)),
        },
        TypeExpr::Dyn { name, type_args, .. } => Type::DynBehavior(NamedType {
            name: name.clone(),
            module_path: Vec::new(),
            type_args: type_args.iter().map(|t| resolve_type_expr(t, self_ty, bindings)).collect(),
        }),
    }
}

/// Declares (but does not yet define) one monomorphized top-level function.
/// `main` and any other `pub` function get external linkage, since they may
/// be called from outside this translation unit (the C runtime's entry
/// point, or a future multi-module link); everything else is `internal`.
pub fn register_func_declaration<'ctx>(ctx: &CodegenContext<'ctx>, func: &MonomorphizedFunc) {
    if func.body.is_none() || ctx.module.get_function(&func.mangled_name).is_some() {
        return;
    }
    let fn_type = method_fn_type(ctx, &func.param_types, &func.return_type, false);
    let linkage = if is_exported(ctx, &func.base_name) {
        Linkage::External
    } else {
        Linkage::Internal
    };
    let function = ctx.module.add_function(&func.mangled_name, fn_type, Some(linkage));
    ctx.store_function(&func.mangled_name, function);
}

/// Declares one monomorphized impl method. Always `internal`: even an
/// exported type's methods are only ever reached through a direct call or a
/// vtable slot emitted into this same module.
pub fn register_impl_method_declaration<'ctx>(ctx: &CodegenContext<'ctx>, method: &MonomorphizedImplMethod) {
    if ctx.module.get_function(&method.mangled_name).is_some() {
        return;
    }
    let self_ty = Type::named(&method.target_mangled_name);
    let bindings: HashMap<String, Type> = method
        .impl_type_params
        .iter()
        .zip(method.type_args.iter())
        .map(|(p, t)| (p.name.clone(), t.clone()))
        .collect();
    let param_types: Vec<Type> = method
        .sig
        .params
        .iter()
        .map(|p| resolve_type_expr(&p.annotated_type, &self_ty, &bindings))
        .collect();
    let return_type = resolve_type_expr(&method.sig.return_type, &self_ty, &bindings);

    let fn_type = method_fn_type(ctx, &param_types, &return_type, !method.is_static);
    let function = ctx.module.add_function(&method.mangled_name, fn_type, Some(Linkage::Internal));
    ctx.store_function(&method.mangled_name, function);
}

/// Declares every method a class directly declares, under the
/// `{ClassName}__{method}` convention `codegen_method_call`'s static
/// fallback expects. Classes are never generic, so no monomorphization pass
/// ever touches them — this is the only place their methods get declared.
pub fn register_class_methods<'ctx>(ctx: &CodegenContext<'ctx>, class: &ClassDecl) {
    let self_ty = Type::Class(NamedType {
        name: class.name.clone(),
        module_path: Vec::new(),
        type_args: Vec::new(),
    });
    for method in &class.methods {
        let mangled = format!("{}__{}", class.name, method.sig.name);
        if ctx.module.get_function(&mangled).is_some() {
            continue;
        }
        let param_types: Vec<Type> = method
            .sig
            .params
            .iter()
            .map(|p| resolve_type_expr(&p.annotated_type, &self_ty, &HashMap::new()))
            .collect();
        let return_type = resolve_type_expr(&method.sig.return_type, &self_ty, &HashMap::new());
        let fn_type = method_fn_type(ctx, &param_types, &return_type, !method.is_static);
        let function = ctx.module.add_function(&mangled, fn_type, Some(Linkage::Internal));
        ctx.store_function(&mangled, function);
    }
}

/// Shared body-emission shape for a function/method: open the entry block,
/// bind each parameter (storing an optional receiver into `self` first),
/// generate the body, and close out with a `return` matching the declared
/// return type — a `Unit` return always lowers to a bare `ret void` even if
/// the body's trailing expression produced a value, matching how every
/// other statement position drops an ignored expression result.
fn codegen_function_body<'ctx>(
    ctx: &CodegenContext<'ctx>,
    function: inkwell::values::FunctionValue<'ctx>,
    receiver_ty: Option<&Type>,
    params: &[(&str, Type, bool)],
    return_type: &Type,
    body: &crate::ast::Expr,
) {
    let prev_fn = *ctx.current_function.borrow();
    let entry = ctx.context.append_basic_block(function, "entry");
    ctx.current_function.replace(Some(function));
    ctx.builder.position_at_end(entry);
    ctx.enter_scope();

    let mut next_param = 0u32;
    if let Some(ty) = receiver_ty {
        let llvm_value = function.get_nth_param(next_param).unwrap();
        let slot = ctx.declare_local("self", ty, false);
        ctx.builder.build_store(slot, llvm_value).unwrap();
        next_param += 1;
    }
    for (name, ty, is_mut) in params {
        let llvm_value = function.get_nth_param(next_param).unwrap();
        let slot = ctx.declare_local(name, ty, *is_mut);
        ctx.builder.build_store(slot, llvm_value).unwrap();
        next_param += 1;
    }

    let result = codegen_expr(ctx, body);
    if ctx.builder.get_insert_block().unwrap().get_terminator().is_none() {
        ctx.exit_scope();
        match (return_type, result) {
            (Type::Primitive(PrimitiveKind::Unit), _) => {
                ctx.builder.build_return(None).unwrap();
            }
            (_, Some(value)) => {
                ctx.builder.build_return(Some(&value as &dyn BasicValue)).unwrap();
            }
            (_, None) => {
                ctx.builder.build_unreachable().unwrap();
            }
        }
    } else {
        ctx.pop_scope_silently();
    }

    ctx.current_function.replace(prev_fn);
}

pub fn codegen_func_body<'ctx>(ctx: &CodegenContext<'ctx>, func: &MonomorphizedFunc) {
    let Some(body) = &func.body else { return };
    let Some(function) = ctx.module.get_function(&func.mangled_name) else { return };

    let prev_bindings = ctx.push_bindings(&func.sig.type_params, &func.type_args);
    let params: Vec<(&str, Type, bool)> = func
        .sig
        .params
        .iter()
        .zip(func.param_types.iter())
        .map(|(p, ty)| (p.name.as_str(), ty.clone(), p.is_mut))
        .collect();
    codegen_function_body(ctx, function, None, &params, &func.return_type, body);
    ctx.restore_bindings(prev_bindings);
}

pub fn codegen_impl_method_body<'ctx>(ctx: &CodegenContext<'ctx>, method: &MonomorphizedImplMethod) {
    let Some(function) = ctx.module.get_function(&method.mangled_name) else { return };

    let self_ty = Type::named(&method.target_mangled_name);
    let bindings: HashMap<String, Type> = method
        .impl_type_params
        .iter()
        .zip(method.type_args.iter())
        .map(|(p, t)| (p.name.clone(), t.clone()))
        .collect();
    let param_types: Vec<Type> = method
        .sig
        .params
        .iter()
        .map(|p| resolve_type_expr(&p.annotated_type, &self_ty, &bindings))
        .collect();
    let return_type = resolve_type_expr(&method.sig.return_type, &self_ty, &bindings);

    let prev_bindings = ctx.push_bindings(&method.impl_type_params, &method.type_args);
    let params: Vec<(&str, Type, bool)> = method
        .sig
        .params
        .iter()
        .zip(param_types.iter())
        .map(|(p, ty)| (p.name.as_str(), ty.clone(), p.is_mut))
        .collect();
    let receiver = if method.is_static { None } else { Some(&self_ty) };
    codegen_function_body(ctx, function, receiver, &params, &return_type, &method.body);
    ctx.restore_bindings(prev_bindings);
}

pub fn codegen_class_method_bodies<'ctx>(ctx: &CodegenContext<'ctx>, class: &ClassDecl) {
    let self_ty = Type::Class(NamedType {
        name: class.name.clone(),
        module_path: Vec::new(),
        type_args: Vec::new(),
    });
    for method in &class.methods {
        let Some(body) = &method.body else { continue };
        let mangled = format!("{}__{}", class.name, method.sig.name);
        let Some(function) = ctx.module.get_function(&mangled) else { continue };

        let param_types: Vec<Type> = method
            .sig
            .params
            .iter()
            .map(|p| resolve_type_expr(&p.annotated_type, &self_ty, &HashMap::new()))
            .collect();
        let return_type = resolve_type_expr(&method.sig.return_type, &self_ty, &HashMap::new());
        let params: Vec<(&str, Type, bool)> = method
            .sig
            .params
            .iter()
            .zip(param_types.iter())
            .map(|(p, ty)| (p.name.as_str(), ty.clone(), p.is_mut))
            .collect();
        let receiver = if method.is_static { None } else { Some(&self_ty) };
        codegen_function_body(ctx, function, receiver, &params, &return_type, body);
    }
}
