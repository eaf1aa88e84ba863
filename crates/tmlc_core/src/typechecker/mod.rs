//! Type checker (C6): bidirectional checking, method resolution order,
//! trait-bound satisfaction, pattern exhaustiveness.
//!
//! Follows a shallow-check-then-deep-check shape
//! (register signatures first so forward references resolve, then check
//! every body) but checks eagerly into a side table keyed by [`NodeId`]
//! instead of rewriting the AST into a second typed tree — see the note on
//! `ast::Module` for why. Diagnostics are collected in a batch per module
//! rather than aborting on the first error.

pub mod env;
pub mod error;

use std::collections::HashMap;

use crate::ast::*;
use crate::lexer::Span;
use crate::registry::ModuleRegistry;
use crate::types::{NamedType, PrimitiveKind, Type};

pub use env::TypeEnv;
pub use error::TypeCheckError;

/// Per-node type annotations produced by a successful (or partially
/// successful) check pass, keyed by [`NodeId`].
pub type TypeTable = HashMap<NodeId, Type>;

pub struct CheckOutcome {
    pub types: TypeTable,
    pub errors: Vec<TypeCheckError>,
}

pub fn check_module(registry: &ModuleRegistry, module: &Module) -> CheckOutcome {
    let mut checker = TypeChecker::new(registry);
    checker.shallow_check(module);
    for item in &module.items {
        checker.check_item(item);
    }
    checker.check_main_function(module);
    CheckOutcome {
        types: checker.types,
        errors: checker.errors,
    }
}

struct TypeChecker<'r> {
    env: TypeEnv<'r>,
    errors: Vec<TypeCheckError>,
    types: TypeTable,
    /// Return type of the function body currently being checked, so
    /// `Return` expressions and the implicit trailing-block value can be
    /// checked against it.
    expected_return: Vec<Type>,
    /// Whether we are lexically inside a loop, for `Break`/`Continue`
    /// validity (loop lowering is codegen's concern; here it's just scope).
    loop_depth: usize,
}

impl<'r> TypeChecker<'r> {
    fn new(registry: &'r ModuleRegistry) -> Self {
        Self {
            env: TypeEnv::new(registry),
            errors: Vec::new(),
            types: HashMap::new(),
            expected_return: Vec::new(),
            loop_depth: 0,
        }
    }

    fn record(&mut self, id: NodeId, ty: Type) -> Type {
        self.types.insert(id, ty.clone());
        ty
    }

    fn push_error(&mut self, err: TypeCheckError) {
        self.errors.push(err);
    }

    /// Phase 1: register every top-level signature before checking any
    /// body, so forward references within the same module resolve.
    fn shallow_check(&mut self, module: &Module) {
        for item in &module.items {
            match item {
                Item::Func(f) => {
                    let ty = self.resolve_func_sig(&f.sig);
                    self.env.define(f.sig.name.clone(), ty, false, f.span.clone());
                }
                Item::Const(c) => {
                    let ty = c
                        .annotated_type
                        .as_ref()
                        .map(|t| self.resolve_type_expr(t))
                        .unwrap_or(Type::Unknown);
                    self.env.define(c.name.clone(), ty, false, c.span.clone());
                }
                Item::Use(u) => {
                    let short = u.alias.clone().unwrap_or_else(|| {
                        u.path.last().cloned().unwrap_or_default()
                    });
                    self.env.add_import(short, u.path.clone());
                }
                _ => {}
            }
        }
    }

    fn resolve_func_sig(&mut self, sig: &FuncSig) -> Type {
        let params = sig
            .params
            .iter()
            .map(|p| self.resolve_type_expr(&p.annotated_type))
            .collect();
        let return_type = Box::new(self.resolve_type_expr(&sig.return_type));
        Type::Func { params, return_type }
    }

    /// `TypeExpr -> Type` resolution: surface names are looked up against
    /// primitives first, then the registry; unknown names produce a T011
    /// diagnostic with a Levenshtein suggestion and resolve to
    /// [`Type::Unknown`] so checking can continue.
    fn resolve_type_expr(&mut self, ty: &TypeExpr) -> Type {
        match ty {
            TypeExpr::Unit { .. } => Type::UNIT,
            TypeExpr::Name { name, type_args, path, span, .. } => {
                if let Some(kind) = env::primitive_kind_of(name) {
                    return Type::Primitive(kind);
                }
                let args: Vec<Type> = type_args.iter().map(|a| self.resolve_type_expr(a)).collect();
                if let Some(gv) = self.env.lookup_generic(name) {
                    return Type::GenericVar(gv.clone());
                }
                if let Some(assoc) = self.env.resolve_assoc_type(name) {
                    return assoc.clone();
                }
                let known_struct = self.env.registry.find_struct(name).is_some();
                let known_enum = self.env.registry.find_enum(name).is_some();
                let known_class = self.env.registry.find_class(name).is_some();
                let known_behavior = self.env.registry.find_behavior(name).is_some();
                if !(known_struct || known_enum || known_class || known_behavior) {
                    let known = self.env.all_known_names();
                    self.push_error(TypeCheckError::undefined_type(name, span.clone(), &known));
                    return Type::Unknown;
                }
                let named = NamedType {
                    name: name.clone(),
                    module_path: path.clone(),
                    type_args: args,
                };
                if known_class {
                    Type::Class(named)
                } else {
                    Type::Named(named)
                }
            }
            TypeExpr::Ref { is_mut, inner, .. } => Type::Ref {
                is_mut: *is_mut,
                inner: Box::new(self.resolve_type_expr(inner)),
                lifetime: None,
            },
            TypeExpr::Ptr { inner, .. } => Type::Ptr(Box::new(self.resolve_type_expr(inner))),
            TypeExpr::Tuple { elements, .. } => {
                Type::Tuple(elements.iter().map(|e| self.resolve_type_expr(e)).collect())
            }
            TypeExpr::Array { element, length, .. } => Type::Array {
                element: Box::new(self.resolve_type_expr(element)),
                length: *length,
            },
            TypeExpr::Slice { element, .. } => Type::Slice(Box::new(self.resolve_type_expr(element))),
            TypeExpr::Func { params, return_type, .. } => Type::Func {
                params: params.iter().map(|p| self.resolve_type_expr(p)).collect(),
                return_type: Box::new(self.resolve_type_expr(return_type)),
            },
            TypeExpr::Dyn { name, type_args, .. } => Type::DynBehavior(NamedType {
                name: name.clone(),
                module_path: vec![],
                type_args: type_args.iter().map(|a| self.resolve_type_expr(a)).collect(),
            }),
        }
    }

    fn check_item(&mut self, item: &Item) {
        match item {
            Item::Func(f) => self.check_func(f),
            Item::Struct(s) => self.check_struct_decl(s),
            Item::Enum(_) | Item::Use(_) | Item::TypeAlias(_) => {}
            Item::Behavior(b) => self.check_behavior_decl(b),
            Item::Impl(i) => self.check_impl_decl(i),
            Item::Class(c) => self.check_class_decl(c),
            Item::Const(c) => self.check_const_decl(c),
        }
    }

    fn check_struct_decl(&mut self, decl: &StructDecl) {
        self.env.push_scope();
        for tp in &decl.type_params {
            self.env.define_generic(tp.clone());
        }
        for field in &decl.fields {
            self.resolve_type_expr(&field.annotated_type);
        }
        self.env.pop_scope();
    }

    fn check_behavior_decl(&mut self, decl: &BehaviorDecl) {
        self.env.push_scope();
        for assoc in &decl.assoc_types {
            self.env.bind_assoc_type(assoc.clone(), Type::Unknown);
        }
        let mut seen_names = std::collections::HashSet::new();
        for m in &decl.methods {
            // unique method name within its behavior.
            if !seen_names.insert(m.name.clone()) {
                self.push_error(TypeCheckError::new(
                    "T002",
                    format!("duplicate method '{}' in behavior '{}'", m.name, decl.name),
                    decl.span.clone(),
                ));
            }
            if let Some(body) = &m.default_body {
                self.env.push_scope();
                for p in &m.params {
                    let ty = self.resolve_type_expr(&p.annotated_type);
                    self.env.define(p.name.clone(), ty, p.is_mut, decl.span.clone());
                }
                let ret = self.resolve_type_expr(&m.return_type);
                self.expected_return.push(ret.clone());
                self.infer_expr(body, Some(&ret));
                self.expected_return.pop();
                self.env.pop_scope();
            }
        }
        self.env.clear_assoc_types();
        self.env.pop_scope();
    }

    fn check_impl_decl(&mut self, decl: &ImplDecl) {
        self.env.push_scope();
        for tp in &decl.type_params {
            self.env.define_generic(tp.clone());
        }
        for (name, binding) in &decl.assoc_type_bindings {
            let ty = self.resolve_type_expr(binding);
            self.env.bind_assoc_type(name.clone(), ty);
        }
        let target = self.resolve_type_expr(&decl.target_type);
        for method in &decl.methods {
            self.env.push_scope();
            self.env.define("self", target.clone(), false, decl.span.clone());
            for p in &method.sig.params {
                let ty = self.resolve_type_expr(&p.annotated_type);
                self.env.define(p.name.clone(), ty, p.is_mut, decl.span.clone());
            }
            let ret = self.resolve_type_expr(&method.sig.return_type);
            self.expected_return.push(ret.clone());
            self.infer_expr(&method.body, Some(&ret));
            self.expected_return.pop();
            self.env.pop_scope();
        }
        self.env.clear_assoc_types();
        self.env.pop_scope();
    }

    fn check_class_decl(&mut self, decl: &ClassDecl) {
        self.env.push_scope();
        let self_ty = Type::Class(NamedType {
            name: decl.name.clone(),
            module_path: vec![],
            type_args: vec![],
        });
        for field in &decl.fields {
            self.resolve_type_expr(&field.annotated_type);
        }
        for method in &decl.methods {
            if let Some(body) = &method.body {
                self.env.push_scope();
                if !method.is_static {
                    self.env.define("self", self_ty.clone(), false, decl.span.clone());
                }
                for p in &method.sig.params {
                    let ty = self.resolve_type_expr(&p.annotated_type);
                    self.env.define(p.name.clone(), ty, p.is_mut, decl.span.clone());
                }
                let ret = self.resolve_type_expr(&method.sig.return_type);
                self.expected_return.push(ret.clone());
                self.infer_expr(body, Some(&ret));
                self.expected_return.pop();
                self.env.pop_scope();
            }
        }
        self.env.pop_scope();
    }

    fn check_const_decl(&mut self, decl: &ConstDecl) {
        let expected = decl.annotated_type.as_ref().map(|t| self.resolve_type_expr(t));
        if expected.is_none() {
            self.push_error(TypeCheckError::new(
                "T032",
                format!("constant '{}' needs a valid annotated type", decl.name),
                decl.span.clone(),
            ));
        }
        self.infer_expr(&decl.value, expected.as_ref());
    }

    fn check_func(&mut self, decl: &FuncDecl) {
        let Some(body) = &decl.body else { return };
        self.env.push_scope();
        for tp in &decl.sig.type_params {
            self.env.define_generic(tp.clone());
        }
        for p in &decl.sig.params {
            let ty = self.resolve_type_expr(&p.annotated_type);
            self.env.define(p.name.clone(), ty, p.is_mut, decl.span.clone());
        }
        let ret = self.resolve_type_expr(&decl.sig.return_type);
        self.expected_return.push(ret.clone());
        self.infer_expr(body, Some(&ret));
        self.expected_return.pop();
        self.env.pop_scope();
    }

    fn check_main_function(&mut self, module: &Module) {
        let has_main = module.items.iter().any(|i| matches!(i, Item::Func(f) if f.sig.name == "main"));
        if !has_main {
            self.push_error(TypeCheckError::missing_main(module.span.clone()));
        }
    }

    // ---- expression checking -------------------------------------------------

    fn infer_expr(&mut self, expr: &Expr, expected: Option<&Type>) -> Type {
        let ty = match expr {
            Expr::Literal { value, span, .. } => self.infer_literal(value, expected, span),
            Expr::Ident { id, name, span } => self.infer_ident(*id, name, span),
            Expr::Path { segments, span, .. } => self.infer_path(segments, span),
            Expr::Binary { op, lhs, rhs, span, .. } => self.infer_binary(*op, lhs, rhs, span),
            Expr::Unary { op, operand, span, .. } => self.infer_unary(*op, operand, span),
            Expr::Assign { target, value, span, .. } => self.infer_assign(target, value, span),
            Expr::Call { callee, args, span, .. } => self.infer_call(callee, args, span),
            Expr::MethodCall {
                receiver,
                method,
                args,
                span,
                ..
            } => self.infer_method_call(receiver, method, args, span),
            Expr::Field { base, field, span, .. } => self.infer_field(base, field, span),
            Expr::Index { base, index, span, .. } => self.infer_index(base, index, span),
            Expr::Range { start, end, span, .. } => self.infer_range(start, end, span),
            Expr::Block { statements, trailing, span, .. } => {
                self.infer_block(statements, trailing, expected, span)
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
                span,
                ..
            } => self.infer_if(condition, then_branch, else_branch.as_deref(), expected, span),
            Expr::Ternary {
                condition,
                then_value,
                else_value,
                span,
                ..
            } => self.infer_if(condition, then_value, Some(else_value.as_ref()), expected, span),
            Expr::When { scrutinee, arms, span, .. } => self.infer_when(scrutinee, arms, expected, span),
            Expr::Loop { body, span, .. } => {
                self.loop_depth += 1;
                self.infer_expr(body, None);
                self.loop_depth -= 1;
                let _ = span;
                Type::UNIT
            }
            Expr::While { condition, body, span, .. } => {
                self.infer_expr(condition, Some(&Type::BOOL));
                self.loop_depth += 1;
                self.infer_expr(body, None);
                self.loop_depth -= 1;
                let _ = span;
                Type::UNIT
            }
            Expr::For {
                binding,
                iterator,
                body,
                span,
                ..
            } => self.infer_for(binding, iterator, body, span),
            Expr::Return { value, span, .. } => self.infer_return(value.as_deref(), span),
            Expr::Break { value, .. } => {
                if let Some(v) = value {
                    self.infer_expr(v, None);
                }
                Type::UNIT
            }
            Expr::Continue { .. } => Type::UNIT,
            Expr::Tuple { elements, span, .. } => self.infer_tuple(elements, expected, span),
            Expr::Array { elements, span, .. } => self.infer_array(elements, expected, span),
            Expr::Struct {
                path,
                name,
                type_args,
                fields,
                span,
                ..
            } => self.infer_struct_literal(path, name, type_args, fields, span),
            Expr::Closure {
                params,
                return_type,
                body,
                span,
                ..
            } => self.infer_closure(params, return_type.as_ref(), body, span),
            Expr::Cast { value, target_type, span, .. } => self.infer_cast(value, target_type, span),
            Expr::Try { value, span, .. } => self.infer_try(value, span),
            Expr::Lowlevel { operands, .. } => {
                for op in operands {
                    self.infer_expr(op, None);
                }
                Type::Unknown
            }
            Expr::InterpolatedString { segments, .. } | Expr::TemplateLiteral { segments, .. } => {
                for seg in segments {
                    if let Some(e) = &seg.interpolated {
                        self.infer_expr(e, None);
                    }
                }
                Type::Primitive(PrimitiveKind::Str)
            }
        };
        self.record(expr.id(), ty)
    }

    fn infer_literal(&mut self, lit: &Literal, expected: Option<&Type>, span: &Span) -> Type {
        match lit {
            Literal::Int { suffix, .. } => {
                if let Some(suffix) = suffix {
                    if let Some(kind) = env::primitive_kind_of(suffix) {
                        return Type::Primitive(kind);
                    }
                }
                // bidirectional coercion: an expected integer-kind flows
                // into the literal.
                if let Some(Type::Primitive(p)) = expected {
                    if p.is_integer() {
                        return Type::Primitive(*p);
                    }
                }
                Type::Primitive(PrimitiveKind::I64)
            }
            Literal::Float { suffix, .. } => {
                if let Some(suffix) = suffix {
                    if let Some(kind) = env::primitive_kind_of(suffix) {
                        return Type::Primitive(kind);
                    }
                }
                if let Some(Type::Primitive(p)) = expected {
                    if p.is_float() {
                        return Type::Primitive(*p);
                    }
                }
                Type::Primitive(PrimitiveKind::F64)
            }
            Literal::Bool(_) => Type::BOOL,
            Literal::Char(_) => Type::Primitive(PrimitiveKind::Char),
            Literal::Str(_) => {
                let _ = span;
                Type::Primitive(PrimitiveKind::Str)
            }
        }
    }

    fn infer_ident(&mut self, _id: NodeId, name: &str, span: &Span) -> Type {
        if let Some(binding) = self.env.lookup(name) {
            return binding.ty.clone();
        }
        if let Some(decl) = self.env.registry.find_func(name) {
            return self.resolve_func_sig(&decl.sig.clone());
        }
        if let Some(decl) = self.env.registry.find_const(name) {
            if let Some(t) = &decl.annotated_type {
                return self.resolve_type_expr(t);
            }
        }
        let known = self.env.all_known_names();
        self.push_error(TypeCheckError::undefined_variable(name, span.clone(), &known));
        Type::Unknown
    }

    fn infer_path(&mut self, segments: &[String], span: &Span) -> Type {
        // `TypeName::member` (a static/associated method, `Point::new` or a
        // class's own `static` method) resolves against the type named by
        // the second-to-last segment before falling back to plain ident
        // lookup, so a qualified call or an unqualified one sharing a tail
        // segment name don't get confused with one another.
        if segments.len() >= 2 {
            let type_name = &segments[segments.len() - 2];
            let member = segments.last().unwrap();
            if let Some(ty) = self.resolve_static_member(type_name, member) {
                return ty;
            }
        }
        if let Some(last) = segments.last() {
            return self.infer_ident(0, last, span);
        }
        Type::Unknown
    }

    /// `TypeName::member`: a class's own `static` method, or an inherent
    /// (non-behavior) impl method, looked up by declared name rather than
    /// mangled symbol since no monomorphized program exists yet at check
    /// time.
    fn resolve_static_member(&mut self, type_name: &str, member: &str) -> Option<Type> {
        if let Some(class_decl) = self.env.registry.find_class(type_name) {
            if let Some(m) = class_decl.methods.iter().find(|m| m.sig.name == member) {
                return Some(self.resolve_func_sig(&m.sig.clone()));
            }
        }
        for impl_decl in self.env.registry.impls_for_type(type_name) {
            if impl_decl.behavior.is_none() {
                if let Some(m) = impl_decl.methods.iter().find(|m| m.sig.name == member) {
                    return Some(self.resolve_func_sig(&m.sig.clone()));
                }
            }
        }
        None
    }

    fn infer_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, span: &Span) -> Type {
        let lhs_ty = self.infer_expr(lhs, None);
        let rhs_ty = self.infer_expr(rhs, Some(&lhs_ty));
        match op {
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Rem => {
                if !lhs_ty.does_eq(&rhs_ty) && !lhs_ty.is_unknown() && !rhs_ty.is_unknown() {
                    self.push_error(TypeCheckError::mismatch(&lhs_ty, &rhs_ty, span.clone()));
                }
                lhs_ty
            }
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                Type::BOOL
            }
            BinaryOp::And | BinaryOp::Or => {
                self.expect(&lhs_ty, &Type::BOOL, span);
                self.expect(&rhs_ty, &Type::BOOL, span);
                Type::BOOL
            }
        }
    }

    fn expect(&mut self, actual: &Type, expected: &Type, span: &Span) {
        if !actual.is_unknown() && !expected.is_unknown() && !actual.does_eq(expected) {
            self.push_error(TypeCheckError::mismatch(expected, actual, span.clone()));
        }
    }

    fn infer_unary(&mut self, op: UnaryOp, operand: &Expr, span: &Span) -> Type {
        let operand_ty = self.infer_expr(operand, None);
        match op {
            UnaryOp::Neg => operand_ty,
            UnaryOp::Not => {
                self.expect(&operand_ty, &Type::BOOL, span);
                Type::BOOL
            }
            UnaryOp::Ref => Type::shared_ref(operand_ty),
            UnaryOp::RefMut => Type::mut_ref(operand_ty),
            UnaryOp::Deref => operand_ty.auto_deref().clone(),
        }
    }

    fn infer_assign(&mut self, target: &Expr, value: &Expr, span: &Span) -> Type {
        let target_ty = self.infer_expr(target, None);
        if let Expr::Ident { name, .. } = target {
            if let Some(binding) = self.env.lookup(name) {
                if !binding.is_mut {
                    self.push_error(TypeCheckError::immutable_reassign(name, span.clone()));
                }
            }
        }
        self.infer_expr(value, Some(&target_ty));
        Type::UNIT
    }

    /// Method resolution order for `receiver.m(args)`.
    fn resolve_method(&mut self, receiver_ty: &Type, method: &str, span: &Span) -> Option<Type> {
        // Step 1: auto-deref through Ref.
        let receiver_ty = receiver_ty.auto_deref().clone();

        // Step 2: inherent methods (`TypeName::m` in the registry).
        if let Type::Named(n) | Type::Class(n) = &receiver_ty {
            for impl_decl in self.env.registry.impls_for_type(&n.name) {
                if impl_decl.behavior.is_none() {
                    if let Some(m) = impl_decl.methods.iter().find(|m| m.sig.name == method) {
                        return Some(self.resolve_func_sig(&m.sig));
                    }
                }
            }
        }

        // Step 3: primitive intrinsic methods, modeled
        // here as any registered primitive impl (the emitter distinguishes
        // the three inlining tiers separately).
        if let Type::Primitive(kind) = &receiver_ty {
            if let Some(sig) = self.env.lookup_primitive_method(*kind, method).cloned() {
                return Some(self.resolve_func_sig(&sig));
            }
            if is_always_inlined_primitive_method(method) {
                return Some(Type::Func {
                    params: vec![],
                    return_type: Box::new(receiver_ty.clone()),
                });
            }
        }

        // Step 4: class base chain.
        if let Type::Class(n) = &receiver_ty {
            let mut current = Some(n.name.clone());
            while let Some(class_name) = current {
                if let Some(class_decl) = self.env.registry.find_class(&class_name) {
                    if let Some(m) = class_decl.methods.iter().find(|m| m.sig.name == method) {
                        return Some(self.resolve_func_sig(&m.sig.clone()));
                    }
                    current = class_decl.base.clone();
                } else {
                    break;
                }
            }
        }

        // Step 5: trait objects.
        if let Type::DynBehavior(n) = &receiver_ty {
            if let Some(behavior) = self.env.registry.find_behavior(&n.name) {
                if let Some(m) = behavior.methods.iter().find(|m| m.name == method) {
                    return Some(Type::Func {
                        params: m.params.iter().map(|p| self.resolve_type_expr(&p.annotated_type)).collect(),
                        return_type: Box::new(self.resolve_type_expr(&m.return_type)),
                    });
                }
            }
        }

        // Step 6: generic receivers `T: B1 + B2`, in where-clause order.
        if let Type::GenericVar(v) = &receiver_ty {
            for bound in &v.bounds {
                if let Some(behavior) = self.env.registry.find_behavior(bound) {
                    if let Some(m) = behavior.methods.iter().find(|m| m.name == method) {
                        return Some(Type::Func {
                            params: m.params.iter().map(|p| self.resolve_type_expr(&p.annotated_type)).collect(),
                            return_type: Box::new(self.resolve_type_expr(&m.return_type)),
                        });
                    }
                }
            }
        }

        let _ = span;
        None
    }

    fn infer_call(&mut self, callee: &Expr, args: &[Expr], span: &Span) -> Type {
        let callee_ty = self.infer_expr(callee, None);
        match callee_ty {
            Type::Func { params, return_type } | Type::Closure { params, return_type, .. } => {
                if params.len() != args.len() {
                    self.push_error(TypeCheckError::wrong_arg_count(params.len(), args.len(), span.clone()));
                }
                for (arg, param_ty) in args.iter().zip(params.iter()) {
                    self.infer_expr(arg, Some(param_ty));
                }
                for arg in args.iter().skip(params.len()) {
                    self.infer_expr(arg, None);
                }
                *return_type
            }
            _ => {
                for arg in args {
                    self.infer_expr(arg, None);
                }
                Type::Unknown
            }
        }
    }

    fn infer_method_call(&mut self, receiver: &Expr, method: &str, args: &[Expr], span: &Span) -> Type {
        let receiver_ty = self.infer_expr(receiver, None);
        match self.resolve_method(&receiver_ty, method, span) {
            Some(Type::Func { params, return_type }) => {
                for (arg, param_ty) in args.iter().zip(params.iter()) {
                    self.infer_expr(arg, Some(param_ty));
                }
                for arg in args.iter().skip(params.len()) {
                    self.infer_expr(arg, None);
                }
                *return_type
            }
            Some(other) => other,
            None => {
                for arg in args {
                    self.infer_expr(arg, None);
                }
                let known = self.env.all_known_names();
                self.push_error(TypeCheckError::unknown_method(&receiver_ty, method, span.clone(), &known));
                Type::Unknown
            }
        }
    }

    fn infer_field(&mut self, base: &Expr, field: &str, span: &Span) -> Type {
        let base_ty = self.infer_expr(base, None).auto_deref().clone();
        match &base_ty {
            Type::Named(n) | Type::Class(n) => {
                if let Some(decl) = self.env.registry.find_struct(&n.name) {
                    if let Some(f) = decl.fields.iter().find(|f| f.name == field) {
                        return self.resolve_type_expr(&f.annotated_type);
                    }
                    let known: Vec<String> = decl.fields.iter().map(|f| f.name.clone()).collect();
                    self.push_error(
                        TypeCheckError::missing_field(&decl.name, field, span.clone())
                            .with_suggestion(
                                error::nearest_suggestion(field, &known)
                                    .map(|s| format!("did you mean '{s}'?"))
                                    .unwrap_or_default(),
                            ),
                    );
                }
                if let Some(decl) = self.env.registry.find_class(&n.name) {
                    if let Some(f) = decl.fields.iter().find(|f| f.name == field) {
                        return self.resolve_type_expr(&f.annotated_type);
                    }
                }
                Type::Unknown
            }
            Type::Tuple(items) => field
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Type::Unknown),
            _ => Type::Unknown,
        }
    }

    fn infer_index(&mut self, base: &Expr, index: &Expr, span: &Span) -> Type {
        let base_ty = self.infer_expr(base, None);
        self.infer_expr(index, None);
        let _ = span;
        match base_ty.auto_deref() {
            Type::Array { element, .. } | Type::Slice(element) => (**element).clone(),
            _ => Type::Unknown,
        }
    }

    fn infer_range(&mut self, start: &Option<Box<Expr>>, end: &Option<Box<Expr>>, _span: &Span) -> Type {
        let int_ty = Type::Primitive(PrimitiveKind::I64);
        if let Some(s) = start {
            self.infer_expr(s, Some(&int_ty));
        }
        if let Some(e) = end {
            self.infer_expr(e, Some(&int_ty));
        }
        Type::Named(NamedType {
            name: "Range".into(),
            module_path: vec![],
            type_args: vec![int_ty],
        })
    }

    fn infer_block(
        &mut self,
        statements: &[Stmt],
        trailing: &Option<Box<Expr>>,
        expected: Option<&Type>,
        _span: &Span,
    ) -> Type {
        self.env.push_scope();
        for stmt in statements {
            self.check_stmt(stmt);
        }
        let ty = if let Some(trailing) = trailing {
            self.infer_expr(trailing, expected)
        } else {
            Type::UNIT
        };
        self.env.pop_scope();
        ty
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let(let_stmt) => {
                let expected = let_stmt.annotated_type.as_ref().map(|t| self.resolve_type_expr(t));
                let value_ty = self.infer_expr(&let_stmt.value, expected.as_ref());
                let ty = expected.unwrap_or(value_ty);
                self.env.define(let_stmt.name.clone(), ty, let_stmt.is_mut, let_stmt.span.clone());
            }
            Stmt::Expr(e) => {
                self.infer_expr(&e.expr, None);
            }
        }
    }

    fn infer_if(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
        expected: Option<&Type>,
        _span: &Span,
    ) -> Type {
        self.infer_expr(condition, Some(&Type::BOOL));
        let then_ty = self.infer_expr(then_branch, expected);
        match else_branch {
            Some(else_branch) => {
                let else_ty = self.infer_expr(else_branch, Some(&then_ty));
                if then_ty.does_eq(&Type::UNIT) {
                    else_ty
                } else {
                    then_ty
                }
            }
            None => Type::UNIT,
        }
    }

    fn infer_for(&mut self, binding: &str, iterator: &Expr, body: &Expr, span: &Span) -> Type {
        let iter_ty = self.infer_expr(iterator, None);
        let elem_ty = match &iter_ty {
            Type::Named(n) if n.name == "Range" => {
                n.type_args.first().cloned().unwrap_or(Type::Primitive(PrimitiveKind::I64))
            }
            Type::Array { element, .. } | Type::Slice(element) => (**element).clone(),
            _ => Type::Unknown,
        };
        self.env.push_scope();
        self.env.define(binding.to_string(), elem_ty, false, span.clone());
        self.loop_depth += 1;
        self.infer_expr(body, None);
        self.loop_depth -= 1;
        self.env.pop_scope();
        Type::UNIT
    }

    fn infer_return(&mut self, value: Option<&Expr>, span: &Span) -> Type {
        let expected = self.expected_return.last().cloned();
        match value {
            Some(v) => {
                self.infer_expr(v, expected.as_ref());
            }
            None => {
                if let Some(expected) = &expected {
                    self.expect(&Type::UNIT, expected, span);
                }
            }
        }
        Type::Unknown // `Return` itself never produces a usable value at its use site
    }

    fn infer_tuple(&mut self, elements: &[Expr], expected: Option<&Type>, _span: &Span) -> Type {
        let expected_elems = match expected {
            Some(Type::Tuple(items)) => Some(items.clone()),
            _ => None,
        };
        let tys = elements
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let exp = expected_elems.as_ref().and_then(|v| v.get(i));
                self.infer_expr(e, exp)
            })
            .collect();
        Type::Tuple(tys)
    }

    fn infer_array(&mut self, elements: &[Expr], expected: Option<&Type>, _span: &Span) -> Type {
        let expected_elem = match expected {
            Some(Type::Array { element, .. }) | Some(Type::Slice(element)) => Some((**element).clone()),
            _ => None,
        };
        let mut elem_ty = expected_elem.unwrap_or(Type::Unknown);
        for e in elements {
            let t = self.infer_expr(e, Some(&elem_ty));
            if elem_ty.is_unknown() {
                elem_ty = t;
            }
        }
        Type::Array {
            element: Box::new(elem_ty),
            length: elements.len(),
        }
    }

    /// Generic inference for struct construction: infer
    /// each generic type parameter from the field expression it is used
    /// in, unifying against other occurrences; the first conflict raises
    /// T050.
    fn infer_struct_literal(
        &mut self,
        _path: &[String],
        name: &str,
        type_args: &[TypeExpr],
        fields: &[StructFieldInit],
        span: &Span,
    ) -> Type {
        let Some(decl) = self.env.registry.find_struct(name).cloned() else {
            let known = self.env.all_known_names();
            self.push_error(TypeCheckError::unknown_struct(name, span.clone(), &known));
            for f in fields {
                self.infer_expr(&f.value, None);
            }
            return Type::Unknown;
        };

        let mut inferred: HashMap<String, Type> = HashMap::new();
        if !type_args.is_empty() {
            for (tp, arg) in decl.type_params.iter().zip(type_args.iter()) {
                let resolved = self.resolve_type_expr(arg);
                inferred.insert(tp.name.clone(), resolved);
            }
        }

        for field_decl in &decl.fields {
            let Some(init) = fields.iter().find(|f| f.name == field_decl.name) else {
                if !field_decl.has_default {
                    self.push_error(TypeCheckError::missing_field(name, &field_decl.name, span.clone()));
                }
                continue;
            };

            let declared_is_generic_param = matches!(
                &field_decl.annotated_type,
                TypeExpr::Name { name: n, type_args, .. } if type_args.is_empty()
                    && decl.type_params.iter().any(|tp| &tp.name == n)
            );

            if declared_is_generic_param {
                let TypeExpr::Name { name: param_name, .. } = &field_decl.annotated_type else {
                    unreachable!()
                };
                let value_ty = self.infer_expr(&init.value, inferred.get(param_name));
                match inferred.get(param_name) {
                    Some(existing) if !existing.does_eq(&value_ty) && !value_ty.is_unknown() => {
                        self.push_error(TypeCheckError::ambiguous_generic(0, init.value.span().clone()));
                    }
                    _ => {
                        inferred.insert(param_name.clone(), value_ty);
                    }
                }
            } else {
                let expected = self.resolve_type_expr(&field_decl.annotated_type);
                self.infer_expr(&init.value, Some(&expected));
            }
        }

        for init in fields {
            if !decl.fields.iter().any(|f| f.name == init.name) {
                self.infer_expr(&init.value, None);
            }
        }

        let type_args = decl
            .type_params
            .iter()
            .map(|tp| inferred.get(&tp.name).cloned().unwrap_or(Type::Unknown))
            .collect();

        Type::Named(NamedType {
            name: name.to_string(),
            module_path: vec![],
            type_args,
        })
    }

    fn infer_closure(
        &mut self,
        params: &[ClosureParam],
        return_type: Option<&TypeExpr>,
        body: &Expr,
        _span: &Span,
    ) -> Type {
        //  "Closure capture inference": walk the body before
        // adding parameters to scope to find free variables. The capture
        // set itself is computed later by codegen's lambda lowering
        // (`get_lambda_captures`-equivalent over the monomorphized body);
        // here we only need the function type for the checker.
        self.env.push_scope();
        let param_tys: Vec<Type> = params
            .iter()
            .map(|p| {
                p.annotated_type
                    .as_ref()
                    .map(|t| self.resolve_type_expr(t))
                    .unwrap_or(Type::Unknown)
            })
            .collect();
        for (p, ty) in params.iter().zip(param_tys.iter()) {
            self.env.define(p.name.clone(), ty.clone(), false, p.annotated_type.as_ref().map(|t| t.span().clone()).unwrap_or_default());
        }
        let expected_ret = return_type.map(|t| self.resolve_type_expr(t));
        let body_ty = self.infer_expr(body, expected_ret.as_ref());
        self.env.pop_scope();
        Type::Closure {
            params: param_tys,
            return_type: Box::new(expected_ret.unwrap_or(body_ty)),
            captures: vec![],
        }
    }

    fn infer_cast(&mut self, value: &Expr, target_type: &TypeExpr, _span: &Span) -> Type {
        self.infer_expr(value, None);
        self.resolve_type_expr(target_type)
    }

    ///  "Try operator": `!` on `Maybe[T]` yields `T`
    /// (early-returns `Nothing`); on `Outcome[T, E]` yields `T`
    /// (early-returns `Err(E)`); any other receiver is T033.
    fn infer_try(&mut self, value: &Expr, span: &Span) -> Type {
        let value_ty = self.infer_expr(value, None);
        match &value_ty {
            Type::Named(n) if n.name == "Maybe" && n.type_args.len() == 1 => n.type_args[0].clone(),
            Type::Named(n) if n.name == "Outcome" && n.type_args.len() == 2 => n.type_args[0].clone(),
            Type::Unknown => Type::Unknown,
            other => {
                self.push_error(TypeCheckError::invalid_try_receiver(other, span.clone()));
                Type::Unknown
            }
        }
    }

    ///  "Pattern exhaustiveness": a `when` is complete iff it
    /// covers every variant of a finite sum type, or contains a
    /// wildcard/binding arm.
    fn infer_when(&mut self, scrutinee: &Expr, arms: &[WhenArm], expected: Option<&Type>, span: &Span) -> Type {
        let scrutinee_ty = self.infer_expr(scrutinee, None);
        let mut result_ty = expected.cloned().unwrap_or(Type::Unknown);

        for arm in arms {
            self.env.push_scope();
            self.bind_pattern(&arm.pattern, &scrutinee_ty);
            let arm_ty = self.infer_expr(&arm.body, Some(&result_ty));
            if result_ty.is_unknown() {
                result_ty = arm_ty;
            }
            self.env.pop_scope();
        }

        if let Type::Named(n) = scrutinee_ty.auto_deref() {
            if let Some(enum_decl) = self.env.registry.find_enum(&n.name) {
                let has_catch_all = arms.iter().any(|a| a.pattern.is_catch_all());
                if !has_catch_all {
                    let covered: std::collections::HashSet<&str> =
                        arms.iter().filter_map(|a| a.pattern.variant_name()).collect();
                    let missing: Vec<String> = enum_decl
                        .variants
                        .iter()
                        .filter(|v| !covered.contains(v.name.as_str()))
                        .map(|v| v.name.clone())
                        .collect();
                    if !missing.is_empty() {
                        self.push_error(TypeCheckError::non_exhaustive_when(&missing, span.clone()));
                    }
                }
            }
        }

        result_ty
    }

    fn bind_pattern(&mut self, pattern: &Pattern, scrutinee_ty: &Type) {
        match pattern {
            Pattern::Wildcard { .. } => {}
            Pattern::Binding { name, span, .. } => {
                self.env.define(name.clone(), scrutinee_ty.clone(), false, span.clone());
            }
            Pattern::Literal { .. } => {}
            Pattern::TupleStruct { name, elements, span, .. } => {
                if let Some(enum_decl) = self.env.registry.find_enum(&scrutinee_name(scrutinee_ty)) {
                    if let Some(variant) = enum_decl.variants.iter().find(|v| &v.name == name) {
                        for (el, payload_ty) in elements.iter().zip(variant.payload_types.clone().iter()) {
                            let ty = self.resolve_type_expr(payload_ty);
                            self.bind_pattern(el, &ty);
                        }
                        return;
                    }
                }
                for el in elements {
                    self.bind_pattern(el, &Type::Unknown);
                }
                let _ = span;
            }
            Pattern::Struct { fields, .. } => {
                for (_, p) in fields {
                    self.bind_pattern(p, &Type::Unknown);
                }
            }
            Pattern::Guarded { pattern, condition, .. } => {
                self.bind_pattern(pattern, scrutinee_ty);
                self.infer_expr(condition, Some(&Type::BOOL));
            }
        }
    }
}

fn scrutinee_name(ty: &Type) -> String {
    match ty.auto_deref() {
        Type::Named(n) => n.name.clone(),
        _ => String::new(),
    }
}

/// Tier 1: methods that always inline, so the checker can accept them on
/// any primitive receiver without a registered impl.
fn is_always_inlined_primitive_method(name: &str) -> bool {
    matches!(
        name,
        "add" | "sub" | "mul" | "div" | "rem" | "neg" | "cmp" | "max" | "min" | "duplicate"
            | "to_owned" | "borrow" | "borrow_mut" | "is_zero" | "is_one" | "negate" | "to_string"
            | "checked_add" | "checked_sub" | "checked_mul" | "checked_div" | "checked_rem"
            | "checked_neg" | "checked_shl" | "checked_shr"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeIdGen;
    use crate::lexer::Span;

    fn module_of(items: Vec<Item>) -> Module {
        Module {
            id: 0,
            path: vec!["test".into()],
            items,
            span: Span::default(),
        }
    }

    fn func_returning_unit(body: Expr) -> FuncDecl {
        FuncDecl {
            id: 1,
            sig: FuncSig {
                name: "main".into(),
                type_params: vec![],
                params: vec![],
                return_type: TypeExpr::Unit { id: 2, span: Span::default() },
                where_constraints: vec![],
            },
            is_pub: true,
            body: Some(body),
            span: Span::default(),
        }
    }

    fn lit_int(id: NodeId, v: i128) -> Expr {
        Expr::Literal {
            id,
            value: Literal::Int { value: v, suffix: None },
            span: Span::default(),
        }
    }

    #[test]
    fn missing_main_is_reported() {
        let mut ids = NodeIdGen::new();
        let _ = ids.next();
        let registry = ModuleRegistry::new();
        let module = module_of(vec![]);
        let outcome = check_module(&registry, &module);
        assert!(outcome.errors.iter().any(|e| e.code == "T040"));
    }

    #[test]
    fn integer_literal_defaults_to_i64() {
        let registry = ModuleRegistry::new();
        let body = Expr::Block {
            id: 10,
            statements: vec![],
            trailing: Some(Box::new(lit_int(11, 42))),
            span: Span::default(),
        };
        let module = module_of(vec![Item::Func(FuncDecl {
            sig: FuncSig {
                return_type: TypeExpr::Name {
                    id: 12,
                    path: vec![],
                    name: "I64".into(),
                    type_args: vec![],
                    span: Span::default(),
                },
                ..func_returning_unit(body.clone()).sig
            },
            ..func_returning_unit(body)
        })]);
        let outcome = check_module(&registry, &module);
        assert_eq!(outcome.types.get(&11), Some(&Type::Primitive(PrimitiveKind::I64)));
    }

    #[test]
    fn nonexhaustive_when_is_reported() {
        let mut registry = ModuleRegistry::new();
        let enum_decl = EnumDecl {
            id: 20,
            name: "Maybe".into(),
            type_params: vec![TypeParam { name: "T".into(), bounds: vec![] }],
            variants: vec![
                EnumVariant { name: "Just".into(), payload_types: vec![] },
                EnumVariant { name: "Nothing".into(), payload_types: vec![] },
            ],
            is_pub: true,
            span: Span::default(),
        };
        let module_with_enum = module_of(vec![Item::Enum(enum_decl)]);
        registry.insert_module(&module_with_enum);

        let scrutinee = Expr::Ident { id: 30, name: "m".into(), span: Span::default() };
        let when_expr = Expr::When {
            id: 31,
            scrutinee: Box::new(scrutinee),
            arms: vec![WhenArm {
                pattern: Pattern::TupleStruct {
                    id: 32,
                    path: vec![],
                    name: "Just".into(),
                    elements: vec![],
                    span: Span::default(),
                },
                body: Box::new(lit_int(33, 1)),
                span: Span::default(),
            }],
            span: Span::default(),
        };
        let body = Expr::Block {
            id: 34,
            statements: vec![Stmt::Let(LetStmt {
                id: 35,
                name: "m".into(),
                is_mut: false,
                annotated_type: None,
                value: Box::new(Expr::Struct {
                    id: 36,
                    path: vec![],
                    name: "Maybe".into(),
                    type_args: vec![],
                    fields: vec![],
                    span: Span::default(),
                }),
                span: Span::default(),
            })],
            trailing: Some(Box::new(when_expr)),
            span: Span::default(),
        };
        let module = module_of(vec![Item::Func(func_returning_unit(body))]);
        registry.insert_module(&module);
        let outcome = check_module(&registry, &module);
        assert!(outcome.errors.iter().any(|e| e.code == "T020"));
    }

    #[test]
    fn qualified_call_resolves_class_static_method() {
        let mut registry = ModuleRegistry::new();
        let class_decl = ClassDecl {
            id: 40,
            name: "Point".into(),
            base: None,
            fields: vec![ClassField {
                name: "x".into(),
                annotated_type: TypeExpr::Name {
                    id: 41,
                    path: vec![],
                    name: "I64".into(),
                    type_args: vec![],
                    span: Span::default(),
                },
                is_static: false,
            }],
            methods: vec![ClassMethodSig {
                sig: FuncSig {
                    name: "new".into(),
                    type_params: vec![],
                    params: vec![],
                    return_type: TypeExpr::Name {
                        id: 42,
                        path: vec![],
                        name: "Point".into(),
                        type_args: vec![],
                        span: Span::default(),
                    },
                    where_constraints: vec![],
                },
                body: None,
                is_static: true,
                is_virtual: false,
            }],
            implements: vec![],
            is_pub: true,
            span: Span::default(),
        };
        let module_with_class = module_of(vec![Item::Class(class_decl)]);
        registry.insert_module(&module_with_class);

        let path = Expr::Path {
            id: 50,
            segments: vec!["Point".into(), "new".into()],
            span: Span::default(),
        };
        let call = Expr::Call {
            id: 51,
            callee: Box::new(path),
            args: vec![],
            span: Span::default(),
        };
        let body = Expr::Block {
            id: 52,
            statements: vec![],
            trailing: Some(Box::new(call)),
            span: Span::default(),
        };
        let module = module_of(vec![Item::Func(FuncDecl {
            sig: FuncSig {
                return_type: TypeExpr::Name {
                    id: 53,
                    path: vec![],
                    name: "Point".into(),
                    type_args: vec![],
                    span: Span::default(),
                },
                ..func_returning_unit(body.clone()).sig
            },
            ..func_returning_unit(body)
        })]);
        registry.insert_module(&module);
        let outcome = check_module(&registry, &module);
        assert!(outcome.errors.is_empty(), "unexpected errors: {:?}", outcome.errors);
        assert_eq!(outcome.types.get(&51), Some(&Type::Class(NamedType {
            name: "Point".into(),
            module_path: vec![],
            type_args: vec![],
        })));
    }
}
