//! Type environment (C5): scoped name lookup, generic parameter tracking,
//! import resolution, associated-type substitution, primitive method
//! resolution and behavior subsumption.

use std::collections::{HashMap, HashSet};

use crate::ast::{FuncSig, TypeParam};
use crate::lexer::Span;
use crate::registry::ModuleRegistry;
use crate::types::{GenericVar, NamedType, PrimitiveKind, Type};

#[derive(Debug, Clone)]
pub struct Binding {
    pub ty: Type,
    pub is_mut: bool,
    pub span: Span,
}

/// One LIFO frame of the scope stack. Shadowing is allowed: a new `define` in an inner frame simply
/// occludes an outer binding of the same name without touching it.
#[derive(Debug, Clone, Default)]
struct Frame {
    bindings: HashMap<String, Binding>,
    /// Generic type parameters introduced in this frame (function or impl
    /// block), each with its `where`-clause bound behaviors in order.
    generics: HashMap<String, GenericVar>,
}

/// Generalizes a lexical-scope design that threads a
/// shared `Rc<RefCell<Option<Type>>>` type slot per variable for gradual
/// inference) to this crate's eager-resolution design: every binding
/// carries its fully resolved [`Type`] once `define` runs, since bodies are
/// checked bottom-up rather than unified incrementally.
#[derive(Debug, Clone)]
pub struct TypeEnv<'r> {
    pub registry: &'r ModuleRegistry,
    frames: Vec<Frame>,
    /// short name -> fully qualified module path + symbol.
    imports: HashMap<String, Vec<String>>,
    /// `P::m -> FuncSig` table for primitive method resolution.
    primitive_impls: HashMap<(PrimitiveKind, String), FuncSig>,
    /// associated-type name -> concrete binding, active while checking the
    /// body of one `impl` block.
    assoc_type_bindings: HashMap<String, Type>,
}

impl<'r> TypeEnv<'r> {
    pub fn new(registry: &'r ModuleRegistry) -> Self {
        Self {
            registry,
            frames: vec![Frame::default()],
            imports: HashMap::new(),
            primitive_impls: HashMap::new(),
            assoc_type_bindings: HashMap::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_scope(&mut self) {
        self.frames.pop();
    }

    pub fn define(&mut self, name: impl Into<String>, ty: Type, is_mut: bool, span: Span) {
        let frame = self.frames.last_mut().expect("scope stack never empty");
        frame.bindings.insert(name.into(), Binding { ty, is_mut, span });
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.bindings.get(name))
    }

    pub fn define_generic(&mut self, var: TypeParam) {
        let frame = self.frames.last_mut().expect("scope stack never empty");
        frame.generics.insert(
            var.name.clone(),
            GenericVar {
                name: var.name,
                bounds: var.bounds,
            },
        );
    }

    pub fn lookup_generic(&self, name: &str) -> Option<&GenericVar> {
        self.frames.iter().rev().find_map(|f| f.generics.get(name))
    }

    pub fn all_known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .frames
            .iter()
            .flat_map(|f| f.bindings.keys().cloned())
            .collect();
        names.extend(self.registry.all_known_names());
        names
    }

    /// `use a::b::c` registers `c -> [a, b, c]` so later lookups of the
    /// bare name `c` resolve through the registry.
    pub fn add_import(&mut self, short_name: impl Into<String>, qualified: Vec<String>) {
        self.imports.insert(short_name.into(), qualified);
    }

    pub fn resolve_imported_symbol(&self, name: &str) -> Option<&[String]> {
        self.imports.get(name).map(|v| v.as_slice())
    }

    pub fn bind_assoc_type(&mut self, name: impl Into<String>, ty: Type) {
        self.assoc_type_bindings.insert(name.into(), ty);
    }

    pub fn clear_assoc_types(&mut self) {
        self.assoc_type_bindings.clear();
    }

    pub fn resolve_assoc_type(&self, name: &str) -> Option<&Type> {
        self.assoc_type_bindings.get(name)
    }

    pub fn register_primitive_method(&mut self, kind: PrimitiveKind, name: impl Into<String>, sig: FuncSig) {
        self.primitive_impls.insert((kind, name.into()), sig);
    }

    ///  "Primitive method resolution": local impl table
    /// first, then falls through to whatever the caller additionally
    /// searches (imported modules) since this crate keeps one flat table
    /// rather than per-module tables — imported primitive impls are
    /// merged into it at import time.
    pub fn lookup_primitive_method(&self, kind: PrimitiveKind, name: &str) -> Option<&FuncSig> {
        self.primitive_impls.get(&(kind, name.to_string()))
    }

    ///  `type_implements(T, B)`: explicit impl, transitive
    /// super-behavior, or the `Send`/`Sync` auto-derive rule (§4.1.1).
    pub fn type_implements(&self, ty: &Type, behavior: &str) -> bool {
        if behavior == "Send" || behavior == "Sync" {
            return self.auto_derive_marker(ty, behavior, &mut HashSet::new());
        }
        self.has_explicit_or_super_impl(ty, behavior, &mut HashSet::new())
    }

    fn has_explicit_or_super_impl(&self, ty: &Type, behavior: &str, visiting: &mut HashSet<String>) -> bool {
        let type_name = match ty {
            Type::Named(n) | Type::Class(n) | Type::Interface(n) | Type::DynBehavior(n) => n.name.clone(),
            Type::GenericVar(v) => {
                return v.bounds.iter().any(|b| b == behavior)
                    || v.bounds
                        .iter()
                        .any(|b| self.behavior_has_super(b, behavior, visiting));
            }
            _ => return false,
        };

        if self
            .registry
            .impl_of_behavior_for(behavior, &type_name)
            .is_some()
        {
            return true;
        }

        // (b) some other impl `B' for T` where B' transitively super-behaves B.
        for impl_decl in self.registry.impls_for_type(&type_name) {
            if let Some(b_prime) = &impl_decl.behavior {
                if self.behavior_has_super(b_prime, behavior, visiting) {
                    return true;
                }
            }
        }
        false
    }

    /// DAG traversal over `super_behaviors` with cycle detection.
    fn behavior_has_super(&self, behavior: &str, target: &str, visiting: &mut HashSet<String>) -> bool {
        if behavior == target {
            return true;
        }
        if !visiting.insert(behavior.to_string()) {
            return false;
        }
        let result = match self.registry.find_behavior(behavior) {
            Some(decl) => decl
                .super_behaviors
                .iter()
                .any(|s| self.behavior_has_super(s, target, visiting)),
            None => false,
        };
        visiting.remove(behavior);
        result
    }

    /// : auto-derive of `Send`/`Sync` thread-safety
    /// markers, component-wise with cycle breaking.
    fn auto_derive_marker(&self, ty: &Type, marker: &str, visiting: &mut HashSet<String>) -> bool {
        match ty {
            Type::Ptr(_) => false,
            Type::Ref { is_mut: false, inner, .. } => match marker {
                "Send" => self.auto_derive_marker(inner, "Sync", visiting),
                "Sync" => self.auto_derive_marker(inner, "Sync", visiting),
                _ => false,
            },
            Type::Ref { is_mut: true, inner, .. } => match marker {
                "Send" => self.auto_derive_marker(inner, "Send", visiting),
                "Sync" => false,
                _ => false,
            },
            Type::Func { .. } => true,
            Type::Closure { .. } => false,
            Type::Tuple(items) => items.iter().all(|t| self.auto_derive_marker(t, marker, visiting)),
            Type::Array { element, .. } | Type::Slice(element) => {
                self.auto_derive_marker(element, marker, visiting)
            }
            Type::Named(n) | Type::Class(n) | Type::Interface(n) => {
                self.auto_derive_composite(n, marker, visiting)
            }
            Type::Primitive(_) | Type::GenericVar(_) | Type::DynBehavior(_) | Type::Unknown => true,
        }
    }

    fn auto_derive_composite(&self, named: &NamedType, marker: &str, visiting: &mut HashSet<String>) -> bool {
        if !visiting.insert(named.name.clone()) {
            // cycle: the field graph closes on itself; treat as satisfied
            // so the recursion terminates.
            return true;
        }

        let result = if let Some(s) = self.registry.find_struct(&named.name) {
            s.fields
                .iter()
                .all(|f| self.type_expr_marker(&f.annotated_type, marker, visiting))
        } else if let Some(e) = self.registry.find_enum(&named.name) {
            e.variants.iter().all(|v| {
                v.payload_types
                    .iter()
                    .all(|p| self.type_expr_marker(p, marker, visiting))
            })
        } else if let Some(c) = self.registry.find_class(&named.name) {
            let mut fields_ok = c
                .fields
                .iter()
                .all(|f| self.type_expr_marker(&f.annotated_type, marker, visiting));
            if let Some(base) = &c.base {
                fields_ok &= self.auto_derive_composite(
                    &NamedType {
                        name: base.clone(),
                        module_path: vec![],
                        type_args: vec![],
                    },
                    marker,
                    visiting,
                );
            }
            fields_ok
        } else {
            true
        };

        visiting.remove(&named.name);
        result
    }

    fn type_expr_marker(&self, ty: &crate::ast::TypeExpr, marker: &str, visiting: &mut HashSet<String>) -> bool {
        // Conservative resolution: TypeExpr -> Type happens in the checker
        // proper; here we only need enough of the shape to recurse the
        // Send/Sync rule, so unresolved generics default to satisfied
        // (a generic parameter's bound, not its erased shape, governs it).
        use crate::ast::TypeExpr;
        match ty {
            TypeExpr::Name { name, type_args, .. } => {
                if type_args.is_empty() {
                    if let Some(kind) = primitive_kind_of(name) {
                        let _ = kind;
                        return true;
                    }
                }
                self.auto_derive_marker(
                    &Type::Named(NamedType {
                        name: name.clone(),
                        module_path: vec![],
                        type_args: vec![],
                    }),
                    marker,
                    visiting,
                )
            }
            TypeExpr::Ref { is_mut, inner, .. } => self.auto_derive_marker(
                &Type::Ref {
                    is_mut: *is_mut,
                    inner: Box::new(Type::Unknown),
                    lifetime: None,
                },
                marker,
                visiting,
            ) && self.type_expr_marker(inner, marker, visiting),
            TypeExpr::Ptr { .. } => false,
            TypeExpr::Tuple { elements, .. } => elements
                .iter()
                .all(|e| self.type_expr_marker(e, marker, visiting)),
            TypeExpr::Array { element, .. } | TypeExpr::Slice { element, .. } => {
                self.type_expr_marker(element, marker, visiting)
            }
            TypeExpr::Func { .. } => true,
            TypeExpr::Dyn { .. } => true,
            TypeExpr::Unit { .. } => true,
        }
    }

    ///  `type_needs_drop`.
    pub fn type_needs_drop(&self, ty: &Type) -> bool {
        self.type_needs_drop_visiting(ty, &mut HashSet::new())
    }

    fn type_needs_drop_visiting(&self, ty: &Type, visiting: &mut HashSet<String>) -> bool {
        match ty {
            Type::Primitive(_) | Type::Ref { .. } | Type::Ptr(_) | Type::Slice(_) | Type::Func { .. } => false,
            Type::Tuple(items) => items.iter().any(|t| self.type_needs_drop_visiting(t, visiting)),
            Type::Array { element, .. } => self.type_needs_drop_visiting(element, visiting),
            Type::Closure { .. } => true,
            Type::Named(n) | Type::Class(n) | Type::Interface(n) => {
                if self.registry.impl_of_behavior_for("Drop", &n.name).is_some() {
                    return true;
                }
                if !visiting.insert(n.name.clone()) {
                    return false;
                }
                let result = if let Some(s) = self.registry.find_struct(&n.name) {
                    s.fields
                        .iter()
                        .any(|f| self.type_expr_needs_drop(&f.annotated_type, visiting))
                } else if let Some(e) = self.registry.find_enum(&n.name) {
                    e.variants.iter().any(|v| {
                        v.payload_types
                            .iter()
                            .any(|p| self.type_expr_needs_drop(p, visiting))
                    })
                } else {
                    false
                };
                visiting.remove(&n.name);
                result
            }
            Type::DynBehavior(_) => true,
            Type::GenericVar(_) | Type::Unknown => false,
        }
    }

    fn type_expr_needs_drop(&self, ty: &crate::ast::TypeExpr, visiting: &mut HashSet<String>) -> bool {
        use crate::ast::TypeExpr;
        match ty {
            TypeExpr::Name { name, .. } => {
                if primitive_kind_of(name).is_some() {
                    return false;
                }
                self.type_needs_drop_visiting(
                    &Type::Named(NamedType {
                        name: name.clone(),
                        module_path: vec![],
                        type_args: vec![],
                    }),
                    visiting,
                )
            }
            TypeExpr::Tuple { elements, .. } => elements
                .iter()
                .any(|e| self.type_expr_needs_drop(e, visiting)),
            TypeExpr::Array { element, .. } => self.type_expr_needs_drop(element, visiting),
            _ => false,
        }
    }
}

/// Maps a surface type name to its [`PrimitiveKind`], if it names a
/// built-in scalar.
pub fn primitive_kind_of(name: &str) -> Option<PrimitiveKind> {
    Some(match name {
        "I8" => PrimitiveKind::I8,
        "I16" => PrimitiveKind::I16,
        "I32" => PrimitiveKind::I32,
        "I64" => PrimitiveKind::I64,
        "I128" => PrimitiveKind::I128,
        "U8" => PrimitiveKind::U8,
        "U16" => PrimitiveKind::U16,
        "U32" => PrimitiveKind::U32,
        "U64" => PrimitiveKind::U64,
        "U128" => PrimitiveKind::U128,
        "F32" => PrimitiveKind::F32,
        "F64" => PrimitiveKind::F64,
        "Bool" => PrimitiveKind::Bool,
        "Char" => PrimitiveKind::Char,
        "Str" => PrimitiveKind::Str,
        "Unit" => PrimitiveKind::Unit,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_occludes_without_destroying_outer_binding() {
        let registry = ModuleRegistry::new();
        let mut env = TypeEnv::new(&registry);
        env.define("x", Type::Primitive(PrimitiveKind::I32), false, Span::default());
        env.push_scope();
        env.define("x", Type::Primitive(PrimitiveKind::Bool), true, Span::default());
        assert!(env.lookup("x").unwrap().ty.does_eq(&Type::Primitive(PrimitiveKind::Bool)));
        env.pop_scope();
        assert!(env.lookup("x").unwrap().ty.does_eq(&Type::Primitive(PrimitiveKind::I32)));
    }

    #[test]
    fn send_sync_raw_pointer_never_send() {
        let registry = ModuleRegistry::new();
        let env = TypeEnv::new(&registry);
        let ptr = Type::Ptr(Box::new(Type::Primitive(PrimitiveKind::I32)));
        assert!(!env.type_implements(&ptr, "Send"));
        assert!(!env.type_implements(&ptr, "Sync"));
    }

    #[test]
    fn send_sync_function_pointers_always_both() {
        let registry = ModuleRegistry::new();
        let env = TypeEnv::new(&registry);
        let f = Type::Func {
            params: vec![],
            return_type: Box::new(Type::UNIT),
        };
        assert!(env.type_implements(&f, "Send"));
        assert!(env.type_implements(&f, "Sync"));
    }

    #[test]
    fn primitives_never_need_drop() {
        let registry = ModuleRegistry::new();
        let env = TypeEnv::new(&registry);
        assert!(!env.type_needs_drop(&Type::Primitive(PrimitiveKind::Str)));
    }
}
