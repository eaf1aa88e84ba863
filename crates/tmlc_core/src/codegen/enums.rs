//! Enum tagged-union layout and construction. A value of enum type `E` lowers to
//! `{ i32 tag, [data_bytes x i8] data }`; `data_bytes` is the widest
//! variant's payload size in bits, rounded up to a whole byte.

use inkwell::types::{BasicTypeEnum, StructType};
use inkwell::values::{BasicValueEnum, PointerValue};
use inkwell::AddressSpace;

use crate::monomorphize::MonomorphizedEnum;
use crate::types::Type;

use super::CodegenContext;

pub struct EnumLayout<'ctx> {
    pub llvm_type: StructType<'ctx>,
    pub data_bytes: u32,
}

impl<'ctx> CodegenContext<'ctx> {
    /// Bit width used purely to size the tagged-union payload slot — an
    /// approximation of the target's real struct layout, sufficient since
    /// this crate never has LLVM actually lay the module out.
    pub fn type_bit_width(&self, ty: &Type) -> u32 {
        match ty {
            Type::Primitive(p) => p.bit_width().max(8),
            Type::Ref { .. } | Type::Ptr(_) | Type::Func { .. } | Type::Closure { .. } => 64,
            Type::Tuple(items) => items.iter().map(|t| self.type_bit_width(t)).sum::<u32>().max(8),
            Type::Array { element, length } => self.type_bit_width(element) * (*length as u32).max(1),
            Type::Slice(_) => 128,
            Type::Class(_) => 64,
            Type::DynBehavior(_) => 128,
            Type::Interface(_) => 64,
            Type::GenericVar(_) | Type::Unknown => 64,
            Type::Named(n) => {
                if let Some(s) = self.program.structs.iter().find(|s| s.mangled_name == super::mangled(n)) {
                    s.fields.iter().map(|(_, t)| self.type_bit_width(t)).sum::<u32>().max(8)
                } else if let Some(e) = self.program.enums.iter().find(|e| e.mangled_name == super::mangled(n)) {
                    self.enum_layout_bits(e)
                } else {
                    64
                }
            }
        }
    }

    fn enum_layout_bits(&self, e: &MonomorphizedEnum) -> u32 {
        32 + e
            .variants
            .iter()
            .map(|(_, payload)| payload.iter().map(|t| self.type_bit_width(t)).sum::<u32>())
            .max()
            .unwrap_or(0)
    }

    /// Builds (and caches, via the normal `get_llvm_type` path) the LLVM
    /// struct type for a monomorphized enum.
    pub fn enum_layout(&self, e: &MonomorphizedEnum) -> EnumLayout<'ctx> {
        let widest_bits = e
            .variants
            .iter()
            .map(|(_, payload)| payload.iter().map(|t| self.type_bit_width(t)).sum::<u32>())
            .max()
            .unwrap_or(0);
        let data_bytes = widest_bits.div_ceil(8);
        let tag_ty = self.context.i32_type();
        let data_ty = self.context.i8_type().array_type(data_bytes);
        let llvm_type = self.context.struct_type(&[tag_ty.into(), data_ty.into()], false);
        EnumLayout { llvm_type, data_bytes }
    }

    /// Constructs a value of enum `e`'s variant `variant_name` with the
    /// given already-codegen'd payload values, per  S5 ("value
    /// stored as `{ i32 0, i64 7 }`"): an `alloca` of the tagged-union type,
    /// tag stored directly, payload stored through a pointer cast of the
    /// data field to the payload's own LLVM type (a tuple struct when a
    /// variant carries more than one payload value).
    pub fn build_enum_value(
        &self,
        e: &MonomorphizedEnum,
        variant_name: &str,
        payload: &[BasicValueEnum<'ctx>],
    ) -> BasicValueEnum<'ctx> {
        let layout = self.enum_layout(e);
        let tag = e
            .variants
            .iter()
            .position(|(n, _)| n == variant_name)
            .expect("unknown enum variant reached codegen") as u64;

        let slot = self.builder.build_alloca(layout.llvm_type, "enum.tmp").unwrap();
        let tag_ptr = self
            .builder
            .build_struct_gep(layout.llvm_type, slot, 0, "enum.tag.ptr")
            .unwrap();
        self.builder
            .build_store(tag_ptr, self.context.i32_type().const_int(tag, false))
            .unwrap();

        if !payload.is_empty() {
            let data_ptr = self
                .builder
                .build_struct_gep(layout.llvm_type, slot, 1, "enum.data.ptr")
                .unwrap();
            if payload.len() == 1 {
                self.builder.build_store(data_ptr, payload[0]).unwrap();
            } else {
                let payload_types: Vec<BasicTypeEnum> = payload.iter().map(|v| v.get_type()).collect();
                let payload_struct_ty = self.context.struct_type(&payload_types, false);
                for (idx, value) in payload.iter().enumerate() {
                    let field_ptr = self
                        .builder
                        .build_struct_gep(payload_struct_ty, data_ptr, idx as u32, "enum.payload.field")
                        .unwrap();
                    self.builder.build_store(field_ptr, *value).unwrap();
                }
            }
        }

        self.builder.build_load(layout.llvm_type, slot, "enum.value").unwrap()
    }

    /// Extracts the `i32` discriminant from an already-materialized enum
    /// value.
    pub fn extract_enum_tag(&self, enum_value: BasicValueEnum<'ctx>) -> BasicValueEnum<'ctx> {
        self.builder
            .build_extract_value(enum_value.into_struct_value(), 0, "enum.tag")
            .unwrap()
    }

    /// Loads a variant's payload back out of an enum value already bound to
    /// a stack slot, reading through a bitcast of the `data` field to the
    /// variant's own payload type(s).
    pub fn extract_enum_payload(
        &self,
        e: &MonomorphizedEnum,
        variant_name: &str,
        enum_ptr: PointerValue<'ctx>,
        index: usize,
    ) -> BasicValueEnum<'ctx> {
        let layout = self.enum_layout(e);
        let (_, payload_types) = e
            .variants
            .iter()
            .find(|(n, _)| n == variant_name)
            .expect("unknown enum variant reached codegen");

        let data_ptr = self
            .builder
            .build_struct_gep(layout.llvm_type, enum_ptr, 1, "enum.data.ptr")
            .unwrap();

        if payload_types.len() == 1 {
            let field_ty = self.get_llvm_type(&payload_types[0]);
            self.builder.build_load(field_ty, data_ptr, "enum.payload").unwrap()
        } else {
            let field_llvm_types: Vec<BasicTypeEnum> =
                payload_types.iter().map(|t| self.get_llvm_type(t)).collect();
            let payload_struct_ty = self.context.struct_type(&field_llvm_types, false);
            let field_ptr = self
                .builder
                .build_struct_gep(payload_struct_ty, data_ptr, index as u32, "enum.payload.field")
                .unwrap();
            self.builder
                .build_load(field_llvm_types[index], field_ptr, "enum.payload")
                .unwrap()
        }
    }

    pub fn null_ptr(&self) -> PointerValue<'ctx> {
        self.context.ptr_type(AddressSpace::default()).const_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monomorphize::MonomorphizedProgram;
    use crate::registry::ModuleRegistry;
    use crate::typechecker::TypeTable;

    fn maybe_i64_enum() -> MonomorphizedEnum {
        MonomorphizedEnum {
            mangled_name: "Maybe__I64".into(),
            base_name: "Maybe".into(),
            variants: vec![("Just".into(), vec![Type::Primitive(crate::types::PrimitiveKind::I64)]), ("Nothing".into(), vec![])],
        }
    }

    /// S5: `Maybe[I64]::Just(7)` lowers to `{ i32 0, i64 7 }` (tag 0 is
    /// `Just`'s declaration-order index), and the tag extracted back out of
    /// that value round-trips.
    #[test]
    fn just_variant_tags_zero_and_round_trips() {
        let context = inkwell::context::Context::create();
        let registry = ModuleRegistry::new();
        let program = MonomorphizedProgram::default();
        let node_types = TypeTable::new();
        let ctx = CodegenContext::new(&context, "test", "x86_64-unknown-linux-gnu", &registry, &program, &node_types);
        let enum_decl = maybe_i64_enum();

        let i64_ty = context.i64_type();
        let layout = ctx.enum_layout(&enum_decl);
        let fn_type = layout.llvm_type.fn_type(&[i64_ty.into()], false);
        let function = ctx.module.add_function("just_test", fn_type, None);
        let entry = context.append_basic_block(function, "entry");
        ctx.builder.position_at_end(entry);

        let payload = function.get_nth_param(0).unwrap();
        let just_value = ctx.build_enum_value(&enum_decl, "Just", &[payload]);
        let tag = ctx.extract_enum_tag(just_value);
        assert_eq!(tag.into_int_value().get_type(), context.i32_type());

        ctx.builder
            .build_return(Some(&just_value as &dyn inkwell::values::BasicValue))
            .unwrap();

        let ir = ctx.module.print_to_string().to_string();
        assert!(ir.contains("enum.tag.ptr"), "missing tag store:\n{ir}");
        assert!(ir.contains("store i32 0"), "Just should tag as 0:\n{ir}");
        assert!(ir.contains("enum.data.ptr"), "missing payload store:\n{ir}");
    }

    /// `Nothing` tags one past `Just` (declaration order), with no payload
    /// store at all.
    #[test]
    fn nothing_variant_tags_one_with_no_payload_store() {
        let context = inkwell::context::Context::create();
        let registry = ModuleRegistry::new();
        let program = MonomorphizedProgram::default();
        let node_types = TypeTable::new();
        let ctx = CodegenContext::new(&context, "test", "x86_64-unknown-linux-gnu", &registry, &program, &node_types);
        let enum_decl = maybe_i64_enum();

        let layout = ctx.enum_layout(&enum_decl);
        let fn_type = layout.llvm_type.fn_type(&[], false);
        let function = ctx.module.add_function("nothing_test", fn_type, None);
        let entry = context.append_basic_block(function, "entry");
        ctx.builder.position_at_end(entry);

        let nothing_value = ctx.build_enum_value(&enum_decl, "Nothing", &[]);
        ctx.builder
            .build_return(Some(&nothing_value as &dyn inkwell::values::BasicValue))
            .unwrap();

        let ir = ctx.module.print_to_string().to_string();
        assert!(ir.contains("store i32 1"), "Nothing should tag as 1:\n{ir}");
        assert!(!ir.contains("enum.data.ptr"), "Nothing carries no payload:\n{ir}");
    }
}
