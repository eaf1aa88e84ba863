//! Module/import registry (C4): the cross-module name resolution table
//! shared by the checker and the code generator.
//!
//! A `ModuleRegistry` maps a module path to the items it declares. It is
//! populated once, before checking begins, by walking every parsed
//! [`Module`] in the compilation unit; afterwards it is read-only for the
//! rest of the pipeline.

use std::collections::HashMap;

use crate::ast::{
    BehaviorDecl, ClassDecl, ConstDecl, EnumDecl, FuncDecl, ImplDecl, Item, Module, StructDecl,
    TypeAliasDecl, UseDecl,
};

/// Everything declared directly in one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleData {
    pub path: Vec<String>,
    pub functions: HashMap<String, FuncDecl>,
    pub structs: HashMap<String, StructDecl>,
    pub enums: HashMap<String, EnumDecl>,
    pub behaviors: HashMap<String, BehaviorDecl>,
    pub classes: HashMap<String, ClassDecl>,
    pub constants: HashMap<String, ConstDecl>,
    pub type_aliases: HashMap<String, TypeAliasDecl>,
    /// `impl` blocks declared in this module, in source order (method
    /// resolution and vtable emission both rely on declaration order).
    pub impls: Vec<ImplDecl>,
    pub uses: Vec<UseDecl>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<Vec<String>, ModuleData>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates the registry from one parsed module. Call once per module
    /// in the compilation unit before checking begins.
    pub fn insert_module(&mut self, module: &Module) {
        let mut data = ModuleData {
            path: module.path.clone(),
            ..Default::default()
        };

        for item in &module.items {
            match item {
                Item::Func(f) => {
                    data.functions.insert(f.sig.name.clone(), f.clone());
                }
                Item::Struct(s) => {
                    data.structs.insert(s.name.clone(), s.clone());
                }
                Item::Enum(e) => {
                    data.enums.insert(e.name.clone(), e.clone());
                }
                Item::Behavior(b) => {
                    data.behaviors.insert(b.name.clone(), b.clone());
                }
                Item::Impl(i) => {
                    data.impls.push(i.clone());
                }
                Item::Class(c) => {
                    data.classes.insert(c.name.clone(), c.clone());
                }
                Item::Const(c) => {
                    data.constants.insert(c.name.clone(), c.clone());
                }
                Item::Use(u) => {
                    data.uses.push(u.clone());
                }
                Item::TypeAlias(a) => {
                    data.type_aliases.insert(a.name.clone(), a.clone());
                }
            }
        }

        self.modules.insert(module.path.clone(), data);
    }

    pub fn module(&self, path: &[String]) -> Option<&ModuleData> {
        self.modules.get(path)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleData> {
        self.modules.values()
    }

    /// Searches every module for a struct of the given name. Used once a
    /// `use`-alias has been resolved to a bare name by the type
    /// environment.
    pub fn find_struct(&self, name: &str) -> Option<&StructDecl> {
        self.modules.values().find_map(|m| m.structs.get(name))
    }

    pub fn find_enum(&self, name: &str) -> Option<&EnumDecl> {
        self.modules.values().find_map(|m| m.enums.get(name))
    }

    pub fn find_behavior(&self, name: &str) -> Option<&BehaviorDecl> {
        self.modules.values().find_map(|m| m.behaviors.get(name))
    }

    pub fn find_class(&self, name: &str) -> Option<&ClassDecl> {
        self.modules.values().find_map(|m| m.classes.get(name))
    }

    pub fn find_func(&self, name: &str) -> Option<&FuncDecl> {
        self.modules.values().find_map(|m| m.functions.get(name))
    }

    pub fn find_const(&self, name: &str) -> Option<&ConstDecl> {
        self.modules.values().find_map(|m| m.constants.get(name))
    }

    pub fn find_type_alias(&self, name: &str) -> Option<&TypeAliasDecl> {
        self.modules.values().find_map(|m| m.type_aliases.get(name))
    }

    /// All `impl` blocks (inherent or behavior) targeting a given nominal
    /// type name, across every module, in the order they were inserted
    /// (stable per 's "receiver-side list order ... decides,
    /// stable").
    pub fn impls_for_type<'a>(&'a self, type_name: &str) -> Vec<&'a ImplDecl> {
        self.modules
            .values()
            .flat_map(|m| m.impls.iter())
            .filter(|i| type_expr_names(&i.target_type, type_name))
            .collect()
    }

    /// The single `impl Behavior for Type` block, if one is registered.
    pub fn impl_of_behavior_for<'a>(
        &'a self,
        behavior: &str,
        type_name: &str,
    ) -> Option<&'a ImplDecl> {
        self.modules.values().flat_map(|m| m.impls.iter()).find(|i| {
            i.behavior.as_deref() == Some(behavior) && type_expr_names(&i.target_type, type_name)
        })
    }

    /// All registered `impl Behavior for _` blocks, regardless of target,
    /// used by `type_implements` super-behavior DAG traversal.
    pub fn impls_of_behavior<'a>(&'a self, behavior: &str) -> Vec<&'a ImplDecl> {
        self.modules
            .values()
            .flat_map(|m| m.impls.iter())
            .filter(|i| i.behavior.as_deref() == Some(behavior))
            .collect()
    }

    /// Every name declared anywhere, used by the Levenshtein-nearest
    /// suggestion machinery in `typechecker::error`.
    pub fn all_known_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for m in self.modules.values() {
            names.extend(m.functions.keys().cloned());
            names.extend(m.structs.keys().cloned());
            names.extend(m.enums.keys().cloned());
            names.extend(m.behaviors.keys().cloned());
            names.extend(m.classes.keys().cloned());
            names.extend(m.constants.keys().cloned());
            names.extend(m.type_aliases.keys().cloned());
        }
        names
    }
}

fn type_expr_names(ty: &crate::ast::TypeExpr, name: &str) -> bool {
    matches!(ty, crate::ast::TypeExpr::Name { name: n, .. } if n == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FuncSig, NodeIdGen};
    use crate::lexer::Span;

    fn dummy_func(name: &str) -> FuncDecl {
        FuncDecl {
            id: 0,
            sig: FuncSig {
                name: name.to_string(),
                type_params: vec![],
                params: vec![],
                return_type: crate::ast::TypeExpr::Unit {
                    id: 1,
                    span: Span::default(),
                },
                where_constraints: vec![],
            },
            is_pub: true,
            body: None,
            span: Span::default(),
        }
    }

    #[test]
    fn finds_function_across_modules() {
        let mut ids = NodeIdGen::new();
        let _ = ids.next();
        let mut reg = ModuleRegistry::new();
        let module = Module {
            id: 0,
            path: vec!["core".into()],
            items: vec![Item::Func(dummy_func("duplicate"))],
            span: Span::default(),
        };
        reg.insert_module(&module);

        assert!(reg.find_func("duplicate").is_some());
        assert!(reg.find_func("missing").is_none());
    }
}
