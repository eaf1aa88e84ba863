//! LLVM-IR emitter (C9): the monomorphizer's output plus the registry's
//! classes walk down to a single textual `.ll` module. A `CodegenContext`
//! carries the LLVM handles plus a lexical scope stack; each `ast::Expr` /
//! `ast::Stmt` variant has a dedicated lowering function dispatched from a
//! single entry point, rather than a typed visitor over a second tree (the
//! same flattening `ast::mod` already chose over one struct per node kind).
//!
//! Function types are *not* uniformly erased to a `{ptr, ptr}` closure pair
//! at the type level — only values of `Type::Func` / `Type::Closure` are;
//! everything else lowers to its own concrete LLVM type so structs, enums
//! and primitives keep a faithful memory layout for the places the borrow
//! checker reasons about.

pub mod closures;
pub mod enums;
pub mod error;
pub mod expr;
pub mod intrinsics;
pub mod patterns;
pub mod runtime;
pub mod stmt;
pub mod vtable;

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::targets::TargetTriple;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};
use inkwell::AddressSpace;

use crate::ast::{ClassDecl, NodeId, TypeParam};
use crate::monomorphize::MonomorphizedProgram;
use crate::registry::ModuleRegistry;
use crate::typechecker::TypeTable;
use crate::types::{mangled_name, NamedType, Type};

pub use error::{CodegenError, CodegenResult};

/// `mangled_name` shorthand over a `NamedType`'s own fields, used whenever
/// codegen needs to look a `Type::Named`/`Type::Class` up in the
/// monomorphized program by its mangled symbol.
pub fn mangled(n: &NamedType) -> String {
    mangled_name(&n.name, &n.type_args)
}

/// A single lexical scope frame: named stack slots (their LLVM alloca
/// pointer, loaded at each use site — this is what makes every local
/// addressable for the borrow checker's semantics) plus named functions for
/// direct-call resolution.
#[derive(Default)]
pub struct Scope<'ctx> {
    variables: HashMap<String, (PointerValue<'ctx>, BasicTypeEnum<'ctx>, bool)>,
    functions: HashMap<String, FunctionValue<'ctx>>,
}

/// One entry of the C10 drop/lifetime stack: an alloca introduced in the
/// current block scope, together with the type needed to recompute its
/// `llvm.lifetime.start/end` size and (for values whose type needs drop
/// semantics) the mangled name of a `drop`-behavior method to call.
pub struct ScopedAlloca<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub llvm_type: BasicTypeEnum<'ctx>,
    pub needs_drop: bool,
    pub ty: Type,
}

pub struct CodegenContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub registry: &'ctx ModuleRegistry,
    pub program: &'ctx MonomorphizedProgram,
    /// The checker's per-node type table, consulted for
    /// expression types that the monomorphizer's `MonomorphizedFunc`/
    /// `MonomorphizedImplMethod` didn't already carry a substituted copy of —
    /// see the doc comment on `MonomorphizedFunc::type_args` for why this is
    /// resolved on demand rather than precomputed.
    pub node_types: &'ctx TypeTable,
    /// Generic bindings in effect for whichever monomorphized item is
    /// currently being generated, so a node's checker-assigned (possibly
    /// still-generic) type can be substituted down to the instantiation's
    /// concrete type via [`resolve_node_type`](Self::resolve_node_type).
    bindings: RefCell<HashMap<String, Type>>,
    types: RefCell<HashMap<Type, BasicTypeEnum<'ctx>>>,
    scopes: RefCell<Vec<Scope<'ctx>>>,
    /// C10: one frame per lexically entered block; popped (in reverse
    /// introduction order) on scope exit, whether by fallthrough or by a
    /// `return`/`break`/`continue` terminator.
    drop_scopes: RefCell<Vec<Vec<ScopedAlloca<'ctx>>>>,
    /// `(condition_block, exit_block)` per lexically enclosing loop, for
    /// `Continue`/`Break` lowering.
    loop_stack: RefCell<Vec<(inkwell::basic_block::BasicBlock<'ctx>, inkwell::basic_block::BasicBlock<'ctx>)>>,
    pub current_function: RefCell<Option<FunctionValue<'ctx>>>,
}

impl<'ctx> CodegenContext<'ctx> {
    pub fn new(
        context: &'ctx Context,
        module_name: &str,
        target_triple: &str,
        registry: &'ctx ModuleRegistry,
        program: &'ctx MonomorphizedProgram,
        node_types: &'ctx TypeTable,
    ) -> Self {
        let module = context.create_module(module_name);
        module.set_triple(&TargetTriple::create(target_triple));
        Self {
            context,
            module,
            builder: context.create_builder(),
            registry,
            program,
            node_types,
            bindings: RefCell::new(HashMap::new()),
            types: RefCell::new(HashMap::new()),
            scopes: RefCell::new(Vec::new()),
            drop_scopes: RefCell::new(Vec::new()),
            loop_stack: RefCell::new(Vec::new()),
            current_function: RefCell::new(None),
        }
    }

    /// Installs the generic bindings for the monomorphized item about to be
    /// generated (empty for non-generic items), replacing whatever bindings
    /// were in effect before; returns the previous bindings so the caller can
    /// restore them once the item's body is done.
    pub fn push_bindings(&self, type_params: &[TypeParam], type_args: &[Type]) -> HashMap<String, Type> {
        let fresh: HashMap<String, Type> = type_params
            .iter()
            .zip(type_args.iter())
            .map(|(p, t)| (p.name.clone(), t.clone()))
            .collect();
        self.bindings.replace(fresh)
    }

    pub fn restore_bindings(&self, previous: HashMap<String, Type>) {
        self.bindings.replace(previous);
    }

    /// Looks a node up in the checker's type table and substitutes the
    /// current item's generic bindings into it, so a still-generic checker
    /// type (e.g. `T` inside a function generic over `T`) resolves to the
    /// concrete type this monomorphized instantiation was expanded with.
    pub fn resolve_node_type(&self, id: NodeId) -> Type {
        let raw = self.node_types.get(&id).cloned().unwrap_or(Type::Unknown);
        crate::monomorphize::substitute(&raw, &self.bindings.borrow())
    }

    pub fn enter_scope(&self) {
        self.scopes.borrow_mut().push(Scope::default());
        self.drop_scopes.borrow_mut().push(Vec::new());
    }

    /// Pops the innermost lexical/drop scope, emitting `llvm.lifetime.end`
    /// for every alloca it introduced, in reverse order of introduction.
    /// Drop-behavior calls for values whose type needs drop glue
    /// (`typechecker::env::type_needs_drop`) are emitted first, since the
    /// glue itself may still read the value.
    pub fn exit_scope(&self) {
        self.scopes.borrow_mut().pop();
        if let Some(frame) = self.drop_scopes.borrow_mut().pop() {
            for alloca in frame.iter().rev() {
                if alloca.needs_drop {
                    self.call_drop_glue(alloca);
                }
                self.end_lifetime(alloca.ptr, alloca.llvm_type);
            }
        }
    }

    /// Pops the innermost scope without emitting drop/lifetime-end calls —
    /// used when the block that would receive them is already terminated
    /// (e.g. a `return` inside a `when` arm), where inserting further
    /// instructions would produce invalid IR. The allocas themselves are
    /// harmless to leave un-ended; the function is exiting regardless.
    pub fn pop_scope_silently(&self) {
        self.scopes.borrow_mut().pop();
        self.drop_scopes.borrow_mut().pop();
    }

    /// Emits drop/lifetime-end calls for every currently open scope, in
    /// reverse order of introduction, without popping them — used by
    /// `return`, which exits every enclosing scope up to the function body
    /// at once rather than one at a time.
    pub fn unwind_all_scopes(&self) {
        for frame in self.drop_scopes.borrow().iter().rev() {
            for alloca in frame.iter().rev() {
                if alloca.needs_drop {
                    self.call_drop_glue(alloca);
                }
                self.end_lifetime(alloca.ptr, alloca.llvm_type);
            }
        }
    }

    fn call_drop_glue(&self, alloca: &ScopedAlloca<'ctx>) {
        let name = match &alloca.ty {
            Type::Named(n) | Type::Class(n) => n.name.clone(),
            _ => return,
        };
        let symbol = format!("tml_{name}_drop");
        if self.module.get_function(&symbol).is_some() {
            let value = self.builder.build_load(alloca.llvm_type, alloca.ptr, "drop.val").unwrap();
            let callee = self.module.get_function(&symbol).unwrap();
            self.builder.build_call(callee, &[value.into()], "").ok();
        }
    }

    fn end_lifetime(&self, ptr: PointerValue<'ctx>, llvm_type: BasicTypeEnum<'ctx>) {
        let size = llvm_type.size_of().map(|s| s.into()).unwrap_or_else(|| self.context.i64_type().const_int(0, false).into());
        let intrinsic = self.lifetime_intrinsic(false);
        self.builder.build_call(intrinsic, &[size, ptr.into()], "").ok();
    }

    fn start_lifetime(&self, ptr: PointerValue<'ctx>, llvm_type: BasicTypeEnum<'ctx>) {
        let size = llvm_type.size_of().map(|s| s.into()).unwrap_or_else(|| self.context.i64_type().const_int(0, false).into());
        let intrinsic = self.lifetime_intrinsic(true);
        self.builder.build_call(intrinsic, &[size, ptr.into()], "").ok();
    }

    /// Hoisted `alloca` in the function's entry block, registered both as a named local and as a
    /// C10 drop/lifetime scope entry.
    pub fn declare_local(&self, name: &str, ty: &Type, is_mut: bool) -> PointerValue<'ctx> {
        let llvm_type = self.get_llvm_type(ty);
        let entry_builder = self.context.create_builder();
        let function = self.current_function.borrow().expect("declare_local outside a function body");
        let entry = function.get_first_basic_block().expect("function missing entry block");
        match entry.get_first_instruction() {
            Some(first_instr) => entry_builder.position_before(&first_instr),
            None => entry_builder.position_at_end(entry),
        }
        let ptr = entry_builder.build_alloca(llvm_type, name).unwrap();
        self.start_lifetime(ptr, llvm_type);

        if let Some(scope) = self.scopes.borrow_mut().last_mut() {
            scope.variables.insert(name.to_string(), (ptr, llvm_type, is_mut));
        }
        if let Some(frame) = self.drop_scopes.borrow_mut().last_mut() {
            frame.push(ScopedAlloca {
                ptr,
                llvm_type,
                needs_drop: self.type_needs_drop_shallow(ty),
                ty: ty.clone(),
            });
        }
        ptr
    }

    fn type_needs_drop_shallow(&self, ty: &Type) -> bool {
        match ty.auto_deref() {
            Type::Named(n) | Type::Class(n) => {
                self.registry.impl_of_behavior_for("Drop", &n.name).is_some()
            }
            _ => false,
        }
    }

    pub fn lookup_variable(&self, name: &str) -> Option<(PointerValue<'ctx>, BasicTypeEnum<'ctx>, bool)> {
        self.scopes
            .borrow()
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name).copied())
    }

    pub fn store_function(&self, name: &str, value: FunctionValue<'ctx>) {
        if let Some(scope) = self.scopes.borrow_mut().last_mut() {
            scope.functions.insert(name.to_string(), value);
        }
    }

    pub fn lookup_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.scopes
            .borrow()
            .iter()
            .rev()
            .find_map(|scope| scope.functions.get(name).copied())
            .or_else(|| self.module.get_function(name))
    }

    pub fn push_loop(&self, cond: inkwell::basic_block::BasicBlock<'ctx>, exit: inkwell::basic_block::BasicBlock<'ctx>) {
        self.loop_stack.borrow_mut().push((cond, exit));
    }

    pub fn pop_loop(&self) {
        self.loop_stack.borrow_mut().pop();
    }

    pub fn current_loop(&self) -> Option<(inkwell::basic_block::BasicBlock<'ctx>, inkwell::basic_block::BasicBlock<'ctx>)> {
        self.loop_stack.borrow().last().copied()
    }

    /// Converts a core [`Type`] to its LLVM representation, memoized in
    /// `types` so repeated lookups of the same type skip re-deriving it.
    pub fn get_llvm_type(&self, ty: &Type) -> BasicTypeEnum<'ctx> {
        if let Some(cached) = self.types.borrow().get(ty) {
            return *cached;
        }
        let llvm_type = self.convert_type(ty);
        self.types.borrow_mut().insert(ty.clone(), llvm_type);
        llvm_type
    }

    fn convert_type(&self, ty: &Type) -> BasicTypeEnum<'ctx> {
        use crate::types::PrimitiveKind as P;
        match ty {
            Type::Primitive(P::Unit) => self.context.struct_type(&[], false).into(),
            Type::Primitive(P::Bool) => self.context.bool_type().into(),
            Type::Primitive(P::Char) => self.context.i32_type().into(),
            Type::Primitive(P::Str) => self.context.ptr_type(AddressSpace::default()).into(),
            Type::Primitive(P::F32) => self.context.f32_type().into(),
            Type::Primitive(P::F64) => self.context.f64_type().into(),
            Type::Primitive(p) => self.context.custom_width_int_type(p.bit_width()).into(),
            Type::Ref { .. } | Type::Ptr(_) => self.context.ptr_type(AddressSpace::default()).into(),
            Type::Tuple(items) => {
                let field_types: Vec<BasicTypeEnum> = items.iter().map(|t| self.get_llvm_type(t)).collect();
                self.context.struct_type(&field_types, false).into()
            }
            Type::Array { element, length } => {
                let elem_ty = self.get_llvm_type(element);
                elem_ty.array_type(*length as u32).into()
            }
            // Fat pointer `{ ptr data, i64 len }`.
            Type::Slice(_) => self
                .context
                .struct_type(
                    &[
                        self.context.ptr_type(AddressSpace::default()).into(),
                        self.context.i64_type().into(),
                    ],
                    false,
                )
                .into(),
            // Uniform `{fn_ptr, env_ptr}` representation for every callable
            // value.
            Type::Func { .. } | Type::Closure { .. } => self.closure_struct_type().into(),
            Type::GenericVar(_) => {
                panic!("GenericVar reached codegen unsubstituted — monomorphization invariant violated")
            }
            // Nominal reference type, vtable slot 0; always
            // handled through a pointer to the class's struct layout.
            Type::Class(_) | Type::Interface(_) => self.context.ptr_type(AddressSpace::default()).into(),
            // Fat pointer `{data_ptr, vtable_ptr}`.
            Type::DynBehavior(_) => self
                .context
                .struct_type(
                    &[
                        self.context.ptr_type(AddressSpace::default()).into(),
                        self.context.ptr_type(AddressSpace::default()).into(),
                    ],
                    false,
                )
                .into(),
            Type::Named(n) => {
                let key = mangled(n);
                if let Some(s) = self.program.structs.iter().find(|s| s.mangled_name == key) {
                    let field_types: Vec<BasicTypeEnum> =
                        s.fields.iter().map(|(_, t)| self.get_llvm_type(t)).collect();
                    self.context.struct_type(&field_types, false).into()
                } else if let Some(e) = self.program.enums.iter().find(|e| e.mangled_name == key) {
                    self.enum_layout(e).llvm_type.into()
                } else {
                    // A type alias or an opaque forward reference the
                    // monomorphizer never needed a definition for; represent
                    // it as an opaque pointer rather than panicking so
                    // partially-compiled units still emit something
                    //.
                    self.context.ptr_type(AddressSpace::default()).into()
                }
            }
            Type::Unknown => panic!("Type::Unknown reached codegen"),
        }
    }

    /// Canonical closure/function-value struct `{ ptr fn, ptr env }`.
    pub fn closure_struct_type(&self) -> inkwell::types::StructType<'ctx> {
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        self.context.struct_type(&[ptr_ty.into(), ptr_ty.into()], false)
    }

    pub fn build_closure_value(&self, fn_ptr: PointerValue<'ctx>, env_ptr: PointerValue<'ctx>) -> BasicValueEnum<'ctx> {
        let struct_ty = self.closure_struct_type();
        let undef = struct_ty.get_undef();
        let with_fn = self
            .builder
            .build_insert_value(undef, fn_ptr, 0, "closure.fn")
            .unwrap();
        let with_env = self
            .builder
            .build_insert_value(with_fn, env_ptr, 1, "closure.env")
            .unwrap();
        with_env.as_basic_value_enum()
    }

    pub fn extract_closure_fn_ptr(&self, closure: BasicValueEnum<'ctx>) -> PointerValue<'ctx> {
        self.builder
            .build_extract_value(closure.into_struct_value(), 0, "closure.fn.ptr")
            .unwrap()
            .into_pointer_value()
    }

    pub fn extract_closure_env_ptr(&self, closure: BasicValueEnum<'ctx>) -> PointerValue<'ctx> {
        self.builder
            .build_extract_value(closure.into_struct_value(), 1, "closure.env.ptr")
            .unwrap()
            .into_pointer_value()
    }
}

/// `attributes #0 = { nounwind mustprogress willreturn }` applies to every
/// emitted `define`. inkwell's enum-attribute plumbing
/// requires per-kind numeric IDs looked up from the LLVM attribute table at
/// runtime; since this crate never links against a live LLVM to query that
/// table, the attribute clause is appended as a textual post-pass over
/// `module.print_to_string()` instead — every `define` line gets ` #0`
/// appended and the `attributes #0 = { ... }` line is appended once at the
/// end.
fn apply_function_attributes(ir: &str) -> String {
    let mut out = String::with_capacity(ir.len() + 64);
    for line in ir.lines() {
        if let Some(brace_pos) = line.rfind('{') {
            if line.starts_with("define ") {
                let (head, tail) = line.split_at(brace_pos);
                out.push_str(head.trim_end());
                out.push_str(" #0 ");
                out.push_str(tail);
                out.push('\n');
                continue;
            }
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("\nattributes #0 = { nounwind mustprogress willreturn }\n");
    out
}

/// Top-level entry point (C9): produce a valid LLVM textual module.
/// Declares every monomorphized struct/enum's
/// layout implicitly via `get_llvm_type` on first use, emits every
/// monomorphized function and impl method, emits a vtable per registered
/// behavior impl, lays out classes directly from the registry (classes are
/// never generic, so the monomorphizer never touches them), and returns the
/// finished `.ll` text.
pub fn emit_module<'ctx>(
    context: &'ctx Context,
    module_name: &str,
    target_triple: &str,
    registry: &'ctx ModuleRegistry,
    program: &'ctx MonomorphizedProgram,
    node_types: &'ctx TypeTable,
) -> String {
    let ctx = CodegenContext::new(context, module_name, target_triple, registry, program, node_types);
    ctx.enter_scope();

    // Pass 1: register every function/impl-method/class-method declaration
    // so forward references and mutual recursion resolve, independent of
    // the order bodies are generated in below.
    for func in &program.funcs {
        stmt::register_func_declaration(&ctx, func);
    }
    for method in &program.impl_methods {
        stmt::register_impl_method_declaration(&ctx, method);
    }
    for class in all_classes(registry) {
        stmt::register_class_methods(&ctx, class);
    }

    // Pass 2: bodies.
    for func in &program.funcs {
        stmt::codegen_func_body(&ctx, func);
    }
    for method in &program.impl_methods {
        stmt::codegen_impl_method_body(&ctx, method);
    }
    for class in all_classes(registry) {
        stmt::codegen_class_method_bodies(&ctx, class);
    }

    // Vtables, once every method they reference has a definition.
    vtable::emit_all_vtables(&ctx);

    ctx.exit_scope();

    apply_function_attributes(&ctx.module.print_to_string().to_string())
}

fn all_classes(registry: &ModuleRegistry) -> Vec<&ClassDecl> {
    registry.modules().flat_map(|m| m.classes.values()).collect()
}
