//! Top-level declaration nodes.

use crate::lexer::Span;

use super::{Expr, NodeId, TypeExpr};

#[derive(Debug, Clone)]
pub enum Item {
    Func(FuncDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Behavior(BehaviorDecl),
    Impl(ImplDecl),
    Class(ClassDecl),
    Const(ConstDecl),
    Use(UseDecl),
    TypeAlias(TypeAliasDecl),
}

impl Item {
    pub fn span(&self) -> &Span {
        match self {
            Item::Func(d) => &d.span,
            Item::Struct(d) => &d.span,
            Item::Enum(d) => &d.span,
            Item::Behavior(d) => &d.span,
            Item::Impl(d) => &d.span,
            Item::Class(d) => &d.span,
            Item::Const(d) => &d.span,
            Item::Use(d) => &d.span,
            Item::TypeAlias(d) => &d.span,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Item::Func(d) => Some(&d.sig.name),
            Item::Struct(d) => Some(&d.name),
            Item::Enum(d) => Some(&d.name),
            Item::Behavior(d) => Some(&d.name),
            Item::Impl(_) => None,
            Item::Class(d) => Some(&d.name),
            Item::Const(d) => Some(&d.name),
            Item::Use(_) => None,
            Item::TypeAlias(d) => Some(&d.name),
        }
    }
}

/// A generic type parameter together with its `where`-clause bounds, e.g.
/// `T: Display + Clone`.
#[derive(Debug, Clone)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FuncParam {
    pub name: String,
    pub annotated_type: TypeExpr,
    pub is_mut: bool,
}

///  `FuncSig`.
#[derive(Debug, Clone)]
pub struct FuncSig {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<FuncParam>,
    pub return_type: TypeExpr,
    pub where_constraints: Vec<TypeParam>,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub id: NodeId,
    pub sig: FuncSig,
    pub is_pub: bool,
    pub body: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: String,
    pub annotated_type: TypeExpr,
    pub has_default: bool,
}

///  `StructDef`.
#[derive(Debug, Clone)]
pub struct StructDecl {
    pub id: NodeId,
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub fields: Vec<StructField>,
    pub is_union: bool,
    pub is_pub: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumVariant {
    pub name: String,
    pub payload_types: Vec<TypeExpr>,
}

///  `EnumDef`. Tag is the source-declaration index of the
/// variant in `variants` (`Just = 0`, `Nothing = 1` for `Maybe[T]`).
#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub id: NodeId,
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub variants: Vec<EnumVariant>,
    pub is_pub: bool,
    pub span: Span,
}

impl EnumDecl {
    pub fn tag_of(&self, variant_name: &str) -> Option<u32> {
        self.variants
            .iter()
            .position(|v| v.name == variant_name)
            .map(|idx| idx as u32)
    }
}

#[derive(Debug, Clone)]
pub struct BehaviorMethod {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<FuncParam>,
    pub return_type: TypeExpr,
    pub default_body: Option<Expr>,
}

impl BehaviorMethod {
    pub fn has_default(&self) -> bool {
        self.default_body.is_some()
    }
}

///  `BehaviorDef` (trait).
#[derive(Debug, Clone)]
pub struct BehaviorDecl {
    pub id: NodeId,
    pub name: String,
    pub super_behaviors: Vec<String>,
    pub assoc_types: Vec<String>,
    pub methods: Vec<BehaviorMethod>,
    pub is_pub: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ImplMethod {
    pub sig: FuncSig,
    pub body: Expr,
    pub is_static: bool,
}

/// `impl Behavior for Type { ... }`, or `impl Type { ... }` (an inherent
/// impl block) when `behavior` is `None`.
#[derive(Debug, Clone)]
pub struct ImplDecl {
    pub id: NodeId,
    pub behavior: Option<String>,
    pub behavior_type_args: Vec<TypeExpr>,
    pub target_type: TypeExpr,
    pub type_params: Vec<TypeParam>,
    pub assoc_type_bindings: Vec<(String, TypeExpr)>,
    pub methods: Vec<ImplMethod>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ClassField {
    pub name: String,
    pub annotated_type: TypeExpr,
    pub is_static: bool,
}

#[derive(Debug, Clone)]
pub struct ClassMethodSig {
    pub sig: FuncSig,
    pub body: Option<Expr>,
    pub is_static: bool,
    pub is_virtual: bool,
}

///  `ClassDef`. `inheritance_path` bookkeeping for shadowed
/// field names and vtable slot assignment is computed by the type
/// environment once `base` is resolved (`typechecker::env`), not stored
/// on the syntax node.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub id: NodeId,
    pub name: String,
    pub base: Option<String>,
    pub fields: Vec<ClassField>,
    pub methods: Vec<ClassMethodSig>,
    pub implements: Vec<String>,
    pub is_pub: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub id: NodeId,
    pub name: String,
    pub annotated_type: Option<TypeExpr>,
    pub value: Expr,
    pub is_pub: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct UseDecl {
    pub id: NodeId,
    pub path: Vec<String>,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeAliasDecl {
    pub id: NodeId,
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub target_type: TypeExpr,
    pub is_pub: bool,
    pub span: Span,
}
