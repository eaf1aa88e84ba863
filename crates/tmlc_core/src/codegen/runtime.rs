//! Fixed external-symbol catalog, declared lazily the first time each symbol
//! is referenced so the emitter never re-declares a symbol. The
//! declare-once-then-cache shape mirrors the closure struct type cache in
//! `codegen::mod`.

use inkwell::module::Linkage;
use inkwell::values::FunctionValue;
use inkwell::AddressSpace;

use super::CodegenContext;

impl<'ctx> CodegenContext<'ctx> {
    /// Returns the already-declared function with this name, or declares it
    /// against the module's external-symbol catalog and returns the fresh
    /// declaration. Every runtime symbol this crate ever emits a call to goes
    /// through here exactly once.
    pub fn runtime_fn(&self, name: &str) -> FunctionValue<'ctx> {
        if let Some(existing) = self.module.get_function(name) {
            return existing;
        }

        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let i64_ty = self.context.i64_type();
        let i32_ty = self.context.i32_type();
        let i1_ty = self.context.bool_type();
        let void_ty = self.context.void_type();

        let fn_type = match name {
            "malloc" => ptr_ty.fn_type(&[i64_ty.into()], false),
            "free" => void_ty.fn_type(&[ptr_ty.into()], false),
            "mem_alloc" => ptr_ty.fn_type(&[i64_ty.into()], false),
            "mem_realloc" => ptr_ty.fn_type(&[ptr_ty.into(), i64_ty.into()], false),
            "mem_free" => void_ty.fn_type(&[ptr_ty.into()], false),
            "printf" => i32_ty.fn_type(&[ptr_ty.into()], true),
            "panic" => void_ty.fn_type(&[ptr_ty.into()], false),
            "str_concat_opt" => ptr_ty.fn_type(&[ptr_ty.into(), ptr_ty.into()], false),
            "str_eq" => i1_ty.fn_type(&[ptr_ty.into(), ptr_ty.into()], false),
            "str_len" => i64_ty.fn_type(&[ptr_ty.into()], false),
            "tml_Text_new" => ptr_ty.fn_type(&[], false),
            "tml_Text_from" => ptr_ty.fn_type(&[ptr_ty.into()], false),
            "tml_Text_push_str" => void_ty.fn_type(&[ptr_ty.into(), ptr_ty.into()], false),
            "tml_cover_func" => void_ty.fn_type(&[ptr_ty.into()], false),
            // `@tml_<Type>_<method>` tier-3 dispatch calls and numeric
            // `_to_string` conversions all share the shape `(ptr|iN) -> ptr`
            // or `(ptr, ...) -> iN`; callers that need a different shape
            // (e.g. a specific integer width) build the `FunctionType`
            // themselves and call `declare_with_type` instead.
            other if other.ends_with("_to_string") => ptr_ty.fn_type(&[i64_ty.into()], false),
            // Generic tier-3 `@tml_<Type>_<method>` dispatch call: one
            // pointer-ish argument in, one pointer out. Callers with a
            // different shape use `declare_with_type` instead.
            _ => ptr_ty.fn_type(&[ptr_ty.into()], false),
        };

        self.module.add_function(name, fn_type, Some(Linkage::External))
    }

    /// Declares (or returns the existing declaration for) a runtime symbol
    /// whose signature isn't one of the fixed shapes `runtime_fn` guesses at
    /// — used for per-width overflow intrinsics and per-type tier-3 dispatch
    /// calls where the emitter already knows the exact `FunctionType`.
    pub fn declare_with_type(
        &self,
        name: &str,
        fn_type: inkwell::types::FunctionType<'ctx>,
    ) -> FunctionValue<'ctx> {
        if let Some(existing) = self.module.get_function(name) {
            return existing;
        }
        self.module.add_function(name, fn_type, Some(Linkage::External))
    }

    /// `llvm.lifetime.start.p0` / `llvm.lifetime.end.p0`, declared once and
    /// invoked at every scope entry/exit.
    pub fn lifetime_intrinsic(&self, start: bool) -> FunctionValue<'ctx> {
        let name = if start {
            "llvm.lifetime.start.p0"
        } else {
            "llvm.lifetime.end.p0"
        };
        if let Some(existing) = self.module.get_function(name) {
            return existing;
        }
        let void_ty = self.context.void_type();
        let i64_ty = self.context.i64_type();
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let fn_type = void_ty.fn_type(&[i64_ty.into(), ptr_ty.into()], false);
        self.module.add_function(name, fn_type, Some(Linkage::External))
    }

    /// `llvm.<s|u><op>.with.overflow.i<N>`, the checked-arithmetic family
    /// used by tier-2 primitive methods.
    pub fn overflow_intrinsic(&self, op: &str, signed: bool, bits: u32) -> FunctionValue<'ctx> {
        let sign = if signed { "s" } else { "u" };
        let name = format!("llvm.{sign}{op}.with.overflow.i{bits}");
        if let Some(existing) = self.module.get_function(&name) {
            return existing;
        }
        let int_ty = self.context.custom_width_int_type(bits);
        let result_ty = self.context.struct_type(
            &[int_ty.into(), self.context.bool_type().into()],
            false,
        );
        let fn_type = result_ty.fn_type(&[int_ty.into(), int_ty.into()], false);
        self.module.add_function(&name, fn_type, Some(Linkage::External))
    }
}
