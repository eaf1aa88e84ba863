//! Monomorphization (C8): walks every concrete instantiation of a generic
//! struct, enum or function that the type checker observed and expands it
//! into a ground (type-variable-free) definition keyed by its mangled name
//!. The emitter (C9) only ever sees ground
//! definitions; it never emits a generic item directly.
//!
//! Mirrors the type checker's shallow/deep split: a first pass collects
//! every `(base_name, type_args)` pair the checker's [`TypeTable`] proves is
//! actually used, then a work-list drains those pending instantiations,
//! substituting generics into field/variant/signature types and queueing
//! any further instantiation a substituted type itself requires (e.g.
//! `Pair[Maybe[I64], I32]` first requires `Maybe[I64]`).

use std::collections::{HashMap, VecDeque};

use crate::ast::{EnumDecl, FuncDecl, FuncSig, ImplDecl, StructDecl, TypeExpr, TypeParam};
use crate::registry::ModuleRegistry;
use crate::typechecker::env::primitive_kind_of;
use crate::typechecker::TypeTable;
use crate::types::mangle::mangled_name;
use crate::types::{ClosureCapture, NamedType, Type};

#[derive(Debug, Clone)]
pub struct MonomorphizedStruct {
    pub mangled_name: String,
    pub base_name: String,
    pub fields: Vec<(String, Type)>,
}

#[derive(Debug, Clone)]
pub struct MonomorphizedEnum {
    pub mangled_name: String,
    pub base_name: String,
    pub variants: Vec<(String, Vec<Type>)>,
}

#[derive(Debug, Clone)]
pub struct MonomorphizedFunc {
    pub mangled_name: String,
    pub base_name: String,
    pub sig: FuncSig,
    pub body: Option<crate::ast::Expr>,
    pub param_types: Vec<Type>,
    pub return_type: Type,
    /// Concrete arguments this instantiation was expanded with, so the
    /// emitter can rebuild `{type_param -> Type}` bindings (via [`bind`])
    /// and re-resolve the types of sub-expressions inside `body` from the
    /// checker's generic [`TypeTable`] on demand, rather than re-deriving a
    /// second substituted type table up front.
    pub type_args: Vec<Type>,
}

#[derive(Debug, Clone)]
pub struct MonomorphizedImplMethod {
    pub mangled_name: String,
    pub target_mangled_name: String,
    pub behavior: Option<String>,
    pub sig: FuncSig,
    pub body: crate::ast::Expr,
    /// Mirrors `ImplMethod::is_static`: no `self` receiver, called by
    /// mangled name alone (`Point__new(...)` rather than
    /// `Point__distance(self, ...)`).
    pub is_static: bool,
    /// Bindings in effect for this instantiation: the impl block's own
    /// type parameters bound to the concrete arguments the target type was
    /// instantiated with (empty for inherent, non-generic impls).
    pub type_args: Vec<Type>,
    pub impl_type_params: Vec<TypeParam>,
}

#[derive(Debug, Default)]
pub struct MonomorphizedProgram {
    pub structs: Vec<MonomorphizedStruct>,
    pub enums: Vec<MonomorphizedEnum>,
    pub funcs: Vec<MonomorphizedFunc>,
    pub impl_methods: Vec<MonomorphizedImplMethod>,
}

type Bindings = HashMap<String, Type>;

fn bind(type_params: &[crate::ast::TypeParam], type_args: &[Type]) -> Bindings {
    type_params
        .iter()
        .zip(type_args.iter())
        .map(|(p, t)| (p.name.clone(), t.clone()))
        .collect()
}

/// Substitutes every [`Type::GenericVar`] named in `bindings` with its bound
/// concrete type, recursing through every compound type constructor.
pub fn substitute(ty: &Type, bindings: &Bindings) -> Type {
    match ty {
        Type::GenericVar(v) => bindings.get(&v.name).cloned().unwrap_or_else(|| ty.clone()),
        Type::Named(n) => Type::Named(substitute_named(n, bindings)),
        Type::Class(n) => Type::Class(substitute_named(n, bindings)),
        Type::Interface(n) => Type::Interface(substitute_named(n, bindings)),
        Type::DynBehavior(n) => Type::DynBehavior(substitute_named(n, bindings)),
        Type::Ref { is_mut, inner, lifetime } => Type::Ref {
            is_mut: *is_mut,
            inner: Box::new(substitute(inner, bindings)),
            lifetime: lifetime.clone(),
        },
        Type::Ptr(inner) => Type::Ptr(Box::new(substitute(inner, bindings))),
        Type::Tuple(items) => Type::Tuple(items.iter().map(|t| substitute(t, bindings)).collect()),
        Type::Array { element, length } => Type::Array {
            element: Box::new(substitute(element, bindings)),
            length: *length,
        },
        Type::Slice(inner) => Type::Slice(Box::new(substitute(inner, bindings))),
        Type::Func { params, return_type } => Type::Func {
            params: params.iter().map(|t| substitute(t, bindings)).collect(),
            return_type: Box::new(substitute(return_type, bindings)),
        },
        Type::Closure { params, return_type, captures } => Type::Closure {
            params: params.iter().map(|t| substitute(t, bindings)).collect(),
            return_type: Box::new(substitute(return_type, bindings)),
            captures: captures
                .iter()
                .map(|c| ClosureCapture {
                    name: c.name.clone(),
                    ty: Box::new(substitute(&c.ty, bindings)),
                    is_mut: c.is_mut,
                })
                .collect(),
        },
        Type::Primitive(_) | Type::Unknown => ty.clone(),
    }
}

fn substitute_named(n: &NamedType, bindings: &Bindings) -> NamedType {
    NamedType {
        name: n.name.clone(),
        module_path: n.module_path.clone(),
        type_args: n.type_args.iter().map(|t| substitute(t, bindings)).collect(),
    }
}

/// Collects every compound type nested inside `ty` that still names a
/// declared struct/enum/impl target, so the work list can queue its
/// instantiation too.
fn collect_named(ty: &Type, out: &mut Vec<NamedType>) {
    match ty {
        Type::Named(n) => {
            out.push(n.clone());
            for arg in &n.type_args {
                collect_named(arg, out);
            }
        }
        Type::Class(n) | Type::Interface(n) | Type::DynBehavior(n) => {
            for arg in &n.type_args {
                collect_named(arg, out);
            }
        }
        Type::Ref { inner, .. } | Type::Ptr(inner) | Type::Slice(inner) => collect_named(inner, out),
        Type::Array { element, .. } => collect_named(element, out),
        Type::Tuple(items) => items.iter().for_each(|t| collect_named(t, out)),
        Type::Func { params, return_type } | Type::Closure { params, return_type, .. } => {
            params.iter().for_each(|t| collect_named(t, out));
            collect_named(return_type, out);
        }
        Type::Primitive(_) | Type::GenericVar(_) | Type::Unknown => {}
    }
}

struct Monomorphizer<'r> {
    registry: &'r ModuleRegistry,
    program: MonomorphizedProgram,
    seen_structs: HashMap<String, ()>,
    seen_enums: HashMap<String, ()>,
    seen_funcs: HashMap<String, ()>,
    pending_structs: VecDeque<(String, Vec<Type>)>,
    pending_enums: VecDeque<(String, Vec<Type>)>,
    pending_funcs: VecDeque<(String, Vec<Type>)>,
    /// Every concrete `(base_name, type_args)` a struct/enum was actually
    /// instantiated with, kept around so `pending_generic_impls` can find which impl blocks apply to which instantiation after
    /// the struct/enum work list has drained.
    instantiated: Vec<(String, Vec<Type>)>,
}

impl<'r> Monomorphizer<'r> {
    fn new(registry: &'r ModuleRegistry) -> Self {
        Self {
            registry,
            program: MonomorphizedProgram::default(),
            seen_structs: HashMap::new(),
            seen_enums: HashMap::new(),
            seen_funcs: HashMap::new(),
            pending_structs: VecDeque::new(),
            pending_enums: VecDeque::new(),
            pending_funcs: VecDeque::new(),
            instantiated: Vec::new(),
        }
    }

    fn require_named(&mut self, n: &NamedType) {
        if let Some(decl) = self.registry.find_struct(&n.name).cloned() {
            self.require_struct(&decl, &n.type_args);
        } else if let Some(decl) = self.registry.find_enum(&n.name).cloned() {
            self.require_enum(&decl, &n.type_args);
        }
    }

    fn require_struct(&mut self, decl: &StructDecl, type_args: &[Type]) {
        let key = mangled_name(&decl.name, type_args);
        if self.seen_structs.contains_key(&key) {
            return;
        }
        self.seen_structs.insert(key.clone(), ());
        self.pending_structs.push_back((decl.name.clone(), type_args.to_vec()));
    }

    fn require_enum(&mut self, decl: &EnumDecl, type_args: &[Type]) {
        let key = mangled_name(&decl.name, type_args);
        if self.seen_enums.contains_key(&key) {
            return;
        }
        self.seen_enums.insert(key.clone(), ());
        self.pending_enums.push_back((decl.name.clone(), type_args.to_vec()));
    }

    fn require_func(&mut self, decl: &FuncDecl, type_args: &[Type]) {
        let key = mangled_name(&decl.sig.name, type_args);
        if self.seen_funcs.contains_key(&key) {
            return;
        }
        self.seen_funcs.insert(key.clone(), ());
        self.pending_funcs.push_back((decl.sig.name.clone(), type_args.to_vec()));
    }

    /// Resolves a surface type expression to a ground or generic-variable
    /// [`Type`], the same way the type checker's `resolve_type_expr` does,
    /// but without the mutable error-collection state: by the time
    /// monomorphization runs the program has already checked successfully,
    /// so every name is known to resolve.
    fn resolve_ground(&self, ty: &TypeExpr, type_params: &[TypeParam]) -> Type {
        match ty {
            TypeExpr::Unit { .. } => Type::UNIT,
            TypeExpr::Name { name, type_args, path, .. } => {
                if let Some(kind) = primitive_kind_of(name) {
                    return Type::Primitive(kind);
                }
                if let Some(tp) = type_params.iter().find(|p| &p.name == name) {
                    return Type::GenericVar(crate::types::GenericVar {
                        name: tp.name.clone(),
                        bounds: tp.bounds.clone(),
                    });
                }
                let args: Vec<Type> = type_args.iter().map(|a| self.resolve_ground(a, type_params)).collect();
                let named = NamedType {
                    name: name.clone(),
                    module_path: path.clone(),
                    type_args: args,
                };
                if self.registry.find_class(name).is_some() {
                    Type::Class(named)
                } else {
                    Type::Named(named)
                }
            }
            TypeExpr::Ref { is_mut, inner, .. } => Type::Ref {
                is_mut: *is_mut,
                inner: Box::new(self.resolve_ground(inner, type_params)),
                lifetime: None,
            },
            TypeExpr::Ptr { inner, .. } => Type::Ptr(Box::new(self.resolve_ground(inner, type_params))),
            TypeExpr::Tuple { elements, .. } => {
                Type::Tuple(elements.iter().map(|e| self.resolve_ground(e, type_params)).collect())
            }
            TypeExpr::Array { element, length, .. } => Type::Array {
                element: Box::new(self.resolve_ground(element, type_params)),
                length: *length,
            },
            TypeExpr::Slice { element, .. } => Type::Slice(Box::new(self.resolve_ground(element, type_params))),
            TypeExpr::Func { params, return_type, .. } => Type::Func {
                params: params.iter().map(|p| self.resolve_ground(p, type_params)).collect(),
                return_type: Box::new(self.resolve_ground(return_type, type_params)),
            },
            TypeExpr::Dyn { name, type_args, .. } => Type::DynBehavior(NamedType {
                name: name.clone(),
                module_path: vec![],
                type_args: type_args.iter().map(|a| self.resolve_ground(a, type_params)).collect(),
            }),
        }
    }

    fn drain(&mut self) {
        loop {
            if let Some((name, args)) = self.pending_structs.pop_front() {
                self.expand_struct(&name, &args);
                continue;
            }
            if let Some((name, args)) = self.pending_enums.pop_front() {
                self.expand_enum(&name, &args);
                continue;
            }
            if let Some((name, args)) = self.pending_funcs.pop_front() {
                self.expand_func(&name, &args);
                continue;
            }
            break;
        }
    }

    fn expand_struct(&mut self, name: &str, type_args: &[Type]) {
        let Some(decl) = self.registry.find_struct(name).cloned() else {
            return;
        };
        let bindings = bind(&decl.type_params, type_args);
        let mut fields = Vec::new();
        for field in &decl.fields {
            let ty = substitute(&self.resolve_ground(&field.annotated_type, &decl.type_params), &bindings);
            let mut nested = Vec::new();
            collect_named(&ty, &mut nested);
            for n in nested {
                self.require_named(&n);
            }
            fields.push((field.name.clone(), ty));
        }
        self.instantiated.push((name.to_string(), type_args.to_vec()));
        self.program.structs.push(MonomorphizedStruct {
            mangled_name: mangled_name(name, type_args),
            base_name: name.to_string(),
            fields,
        });
    }

    fn expand_enum(&mut self, name: &str, type_args: &[Type]) {
        let Some(decl) = self.registry.find_enum(name).cloned() else {
            return;
        };
        let bindings = bind(&decl.type_params, type_args);
        let mut variants = Vec::new();
        for variant in &decl.variants {
            let payload: Vec<Type> = variant
                .payload_types
                .iter()
                .map(|t| substitute(&self.resolve_ground(t, &decl.type_params), &bindings))
                .collect();
            for ty in &payload {
                let mut nested = Vec::new();
                collect_named(ty, &mut nested);
                for n in nested {
                    self.require_named(&n);
                }
            }
            variants.push((variant.name.clone(), payload));
        }
        self.instantiated.push((name.to_string(), type_args.to_vec()));
        self.program.enums.push(MonomorphizedEnum {
            mangled_name: mangled_name(name, type_args),
            base_name: name.to_string(),
            variants,
        });
    }

    fn expand_func(&mut self, name: &str, type_args: &[Type]) {
        let Some(decl) = self.registry.find_func(name).cloned() else {
            return;
        };
        let bindings = bind(&decl.sig.type_params, type_args);
        let param_types: Vec<Type> = decl
            .sig
            .params
            .iter()
            .map(|p| substitute(&self.resolve_ground(&p.annotated_type, &decl.sig.type_params), &bindings))
            .collect();
        let return_type =
            substitute(&self.resolve_ground(&decl.sig.return_type, &decl.sig.type_params), &bindings);
        for ty in param_types.iter().chain(std::iter::once(&return_type)) {
            let mut nested = Vec::new();
            collect_named(ty, &mut nested);
            for n in nested {
                self.require_named(&n);
            }
        }
        self.program.funcs.push(MonomorphizedFunc {
            mangled_name: mangled_name(name, type_args),
            base_name: name.to_string(),
            sig: decl.sig.clone(),
            body: decl.body.clone(),
            param_types,
            return_type,
            type_args: type_args.to_vec(),
        });
    }
}

/// Seeds the work list from every concrete type the type checker recorded,
/// expands the transitive closure of required instantiations, and also
/// carries forward every non-generic top-level function, struct and enum
/// untouched (they need no substitution, but the emitter still expects
/// them collected in one [`MonomorphizedProgram`]).
pub fn monomorphize(registry: &ModuleRegistry, types: &TypeTable) -> MonomorphizedProgram {
    let mut m = Monomorphizer::new(registry);

    for ty in types.values() {
        let mut named = Vec::new();
        collect_named(ty, &mut named);
        for n in named {
            if !n.type_args.is_empty() {
                m.require_named(&n);
            }
        }
    }

    for module in registry.modules() {
        for (name, decl) in &module.structs {
            if decl.type_params.is_empty() {
                m.require_struct(decl, &[]);
            }
            let _ = name;
        }
        for (name, decl) in &module.enums {
            if decl.type_params.is_empty() {
                m.require_enum(decl, &[]);
            }
            let _ = name;
        }
        for (name, decl) in &module.functions {
            if decl.sig.type_params.is_empty() {
                m.require_func(decl, &[]);
            }
            let _ = name;
        }
    }

    m.drain();

    for module in registry.modules() {
        for impl_decl in &module.impls {
            if impl_decl.type_params.is_empty() {
                expand_inherent_impl(&mut m, impl_decl);
            }
        }
    }

    // `pending_generic_impls`: every impl block that is
    // itself generic is matched, after the fact, against every concrete
    // instantiation of its target type that the struct/enum work list
    // produced — `impl[T] Show for Pair[T]` applies once per `Pair[...]`
    // the program actually constructs.
    let instantiated = m.instantiated.clone();
    for module in registry.modules() {
        for impl_decl in &module.impls {
            if impl_decl.type_params.is_empty() {
                continue;
            }
            let Some(target_base) = target_name(&impl_decl.target_type) else {
                continue;
            };
            for (base, args) in &instantiated {
                if base != target_base {
                    continue;
                }
                expand_generic_impl(&mut m, impl_decl, args);
            }
        }
    }

    m.program
}

fn expand_inherent_impl(m: &mut Monomorphizer<'_>, impl_decl: &ImplDecl) {
    let Some(base) = target_name(&impl_decl.target_type) else {
        return;
    };
    let target_mangled = mangled_name(base, &[]);
    for method in &impl_decl.methods {
        m.program.impl_methods.push(MonomorphizedImplMethod {
            mangled_name: format!("{}__{}", target_mangled, method.sig.name),
            target_mangled_name: target_mangled.clone(),
            behavior: impl_decl.behavior.clone(),
            sig: method.sig.clone(),
            body: method.body.clone(),
            is_static: method.is_static,
            type_args: vec![],
            impl_type_params: vec![],
        });
    }
}

/// Binds `impl_decl`'s own type parameters from the positional type
/// arguments the target type (`Pair[T]` in `impl[T] Show for Pair[T]`) was
/// declared with, against the concrete instantiation's args, then
/// substitutes every method signature and body accordingly.
fn expand_generic_impl(m: &mut Monomorphizer<'_>, impl_decl: &ImplDecl, instance_args: &[Type]) {
    let target_param_names: Vec<&str> = match &impl_decl.target_type {
        TypeExpr::Name { type_args, .. } => type_args
            .iter()
            .map(|t| match t {
                TypeExpr::Name { name, .. } => name.as_str(),
                _ => "",
            })
            .collect(),
        _ => vec![],
    };

    let bindings: Bindings = target_param_names
        .iter()
        .zip(instance_args.iter())
        .map(|(name, ty)| (name.to_string(), ty.clone()))
        .collect();

    let target_mangled = mangled_name(target_name(&impl_decl.target_type).unwrap_or(""), instance_args);
    for method in &impl_decl.methods {
        let substituted_body = substitute_expr_types(&method.body, &bindings, m);
        m.program.impl_methods.push(MonomorphizedImplMethod {
            mangled_name: format!("{}__{}", target_mangled, method.sig.name),
            target_mangled_name: target_mangled.clone(),
            behavior: impl_decl.behavior.clone(),
            sig: method.sig.clone(),
            body: substituted_body,
            is_static: method.is_static,
            type_args: instance_args.to_vec(),
            impl_type_params: impl_decl.type_params.clone(),
        });
    }
}

/// The body itself (an untyped AST) never mentions types directly except
/// through nested `Struct { type_args, .. }` and `Cast { target_type, .. }`
/// nodes; substitution there just rewrites the surface [`TypeExpr`] so the
/// emitter's own type resolution (which re-derives ground types from
/// `TypeExpr` the same way the checker did) sees concrete names. Everything
/// else is left untouched — the emitter recovers expression types from the
/// checker's [`TypeTable`] plus these bindings at codegen time.
fn substitute_expr_types(expr: &crate::ast::Expr, bindings: &Bindings, m: &Monomorphizer<'_>) -> crate::ast::Expr {
    use crate::ast::Expr;
    let resub = |e: &Expr| substitute_expr_types(e, bindings, m);
    match expr.clone() {
        Expr::Struct { id, path, name, type_args, fields, span } => Expr::Struct {
            id,
            path,
            name,
            type_args: type_args
                .iter()
                .map(|t| type_to_type_expr(&substitute(&m.resolve_ground(t, &[]), bindings), t.span().clone()))
                .collect(),
            fields: fields
                .into_iter()
                .map(|f| crate::ast::StructFieldInit { name: f.name, value: Box::new(resub(&f.value)) })
                .collect(),
            span,
        },
        Expr::Block { id, statements, trailing, span } => Expr::Block {
            id,
            statements: statements
                .into_iter()
                .map(|s| substitute_stmt_types(&s, bindings, m))
                .collect(),
            trailing: trailing.map(|t| Box::new(resub(&t))),
            span,
        },
        other => other,
    }
}

fn substitute_stmt_types(stmt: &crate::ast::Stmt, bindings: &Bindings, m: &Monomorphizer<'_>) -> crate::ast::Stmt {
    use crate::ast::Stmt;
    match stmt.clone() {
        Stmt::Let(mut l) => {
            l.value = Box::new(substitute_expr_types(&l.value, bindings, m));
            Stmt::Let(l)
        }
        Stmt::Expr(mut e) => {
            e.expr = Box::new(substitute_expr_types(&e.expr, bindings, m));
            Stmt::Expr(e)
        }
    }
}

/// Renders a resolved ground [`Type`] back to the minimal [`TypeExpr`] the
/// emitter's own `resolve_ground` can round-trip, for the handful of AST
/// positions (`Struct.type_args`) that keep surface syntax even after
/// substitution.
fn type_to_type_expr(ty: &Type, span: crate::lexer::Span) -> TypeExpr {
    match ty {
        Type::Primitive(p) => TypeExpr::Name {
            id: 0,
            path: vec![],
            name: p.short_name().to_string(),
            type_args: vec![],
            span,
        },
        Type::Named(n) | Type::Class(n) | Type::Interface(n) => TypeExpr::Name {
            id: 0,
            path: n.module_path.clone(),
            name: n.name.clone(),
            type_args: n.type_args.iter().map(|t| type_to_type_expr(t, span.clone())).collect(),
            span,
        },
        _ => TypeExpr::Unit { id: 0, span },
    }
}

fn target_name(target: &crate::ast::TypeExpr) -> Option<&str> {
    match target {
        crate::ast::TypeExpr::Name { name, .. } => Some(name),
        crate::ast::TypeExpr::Dyn { name, .. } => Some(name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{EnumVariant, StructField, TypeExpr, TypeParam};
    use crate::lexer::Span;
    use crate::registry::{ModuleData, ModuleRegistry};
    use crate::types::PrimitiveKind;

    fn maybe_decl() -> EnumDecl {
        EnumDecl {
            id: 0,
            name: "Maybe".into(),
            type_params: vec![TypeParam { name: "T".into(), bounds: vec![] }],
            variants: vec![
                EnumVariant {
                    name: "Just".into(),
                    payload_types: vec![TypeExpr::Name {
                        path: vec![],
                        name: "T".into(),
                        type_args: vec![],
                        span: Span::default(),
                    }],
                },
                EnumVariant { name: "Nothing".into(), payload_types: vec![] },
            ],
            is_pub: true,
            span: Span::default(),
        }
    }

    fn pair_decl() -> StructDecl {
        StructDecl {
            id: 1,
            name: "Pair".into(),
            type_params: vec![
                TypeParam { name: "A".into(), bounds: vec![] },
                TypeParam { name: "B".into(), bounds: vec![] },
            ],
            fields: vec![
                StructField {
                    name: "first".into(),
                    annotated_type: TypeExpr::Name {
                        path: vec![],
                        name: "A".into(),
                        type_args: vec![],
                        span: Span::default(),
                    },
                    has_default: false,
                },
                StructField {
                    name: "second".into(),
                    annotated_type: TypeExpr::Name {
                        path: vec![],
                        name: "B".into(),
                        type_args: vec![],
                        span: Span::default(),
                    },
                    has_default: false,
                },
            ],
            is_union: false,
            is_pub: true,
            span: Span::default(),
        }
    }

    fn registry_with(structs: Vec<StructDecl>, enums: Vec<EnumDecl>) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        let mut items: Vec<crate::ast::Item> = structs.into_iter().map(crate::ast::Item::Struct).collect();
        items.extend(enums.into_iter().map(crate::ast::Item::Enum));
        let module = crate::ast::Module {
            id: 0,
            path: vec!["test".into()],
            items,
            span: Span::default(),
        };
        registry.insert_module(&module);
        registry
    }

    #[test]
    fn nested_generic_instantiation_requires_inner_type() {
        let registry = registry_with(vec![pair_decl()], vec![maybe_decl()]);
        let mut types = TypeTable::new();
        types.insert(
            0,
            Type::Named(NamedType {
                name: "Pair".into(),
                module_path: vec![],
                type_args: vec![
                    Type::Named(NamedType {
                        name: "Maybe".into(),
                        module_path: vec![],
                        type_args: vec![Type::Primitive(PrimitiveKind::I64)],
                    }),
                    Type::Primitive(PrimitiveKind::I32),
                ],
            }),
        );

        let program = monomorphize(&registry, &types);
        assert!(program.structs.iter().any(|s| s.mangled_name == "Pair__Maybe__I64__I32"));
        assert!(program.enums.iter().any(|e| e.mangled_name == "Maybe__I64"));
    }
}
