//! Monomorphization name mangling.
//!
//! `mangled_name` maps `(base_name, type_args)` to a unique symbol:
//! `Maybe[I64]` → `Maybe__I64`, `Pair[I32, Str]` → `Pair__I32__Str`. Module
//! paths are stripped and component types are mangled recursively so the
//! cache key is stable regardless of which module referenced the
//! instantiation.

use super::{PrimitiveKind, Type};

/// Mangles a single type into its component of a compound symbol. Tuples
/// use `Tup_N__args__` per ; references and pointers flatten
/// the inner type since the pointee's mangled name is already unique.
pub fn mangle_type(ty: &Type) -> String {
    match ty {
        Type::Primitive(p) => mangle_primitive(*p),
        Type::Named(n) | Type::Class(n) | Type::Interface(n) | Type::DynBehavior(n) => {
            mangled_name(&n.name, &n.type_args)
        }
        Type::Ref { inner, .. } => mangle_type(inner),
        Type::Ptr(inner) => mangle_type(inner),
        Type::Tuple(items) => {
            let args = items.iter().map(mangle_type).collect::<Vec<_>>().join("__");
            format!("Tup_{}__{}__", items.len(), args)
        }
        Type::Array { element, length } => format!("Arr_{}_{}", length, mangle_type(element)),
        Type::Slice(element) => format!("Slice_{}", mangle_type(element)),
        Type::Func {
            params,
            return_type,
        } => {
            let args = params.iter().map(mangle_type).collect::<Vec<_>>().join("_");
            format!("Fn_{}_{}", args, mangle_type(return_type))
        }
        Type::Closure {
            params,
            return_type,
            ..
        } => {
            let args = params.iter().map(mangle_type).collect::<Vec<_>>().join("_");
            format!("Closure_{}_{}", args, mangle_type(return_type))
        }
        Type::GenericVar(v) => v.name.clone(),
        Type::Unknown => "Unknown".to_string(),
    }
}

fn mangle_primitive(kind: PrimitiveKind) -> String {
    kind.short_name().to_string()
}

/// `mangled_name("Maybe", [I64]) == "Maybe__I64"`. A bare base name with no
/// type arguments mangles to itself (non-generic items are their own
/// symbol).
pub fn mangled_name(base_name: &str, type_args_normalized: &[Type]) -> String {
    if type_args_normalized.is_empty() {
        return base_name.to_string();
    }
    let args = type_args_normalized
        .iter()
        .map(mangle_type)
        .collect::<Vec<_>>()
        .join("__");
    format!("{base_name}__{args}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NamedType;

    #[test]
    fn mangles_maybe_i64() {
        let args = vec![Type::Primitive(PrimitiveKind::I64)];
        assert_eq!(mangled_name("Maybe", &args), "Maybe__I64");
    }

    #[test]
    fn mangles_pair_of_two_args() {
        let args = vec![
            Type::Primitive(PrimitiveKind::I32),
            Type::Primitive(PrimitiveKind::Str),
        ];
        assert_eq!(mangled_name("Pair", &args), "Pair__I32__Str");
    }

    #[test]
    fn mangles_nested_generic() {
        let inner = Type::Named(NamedType {
            name: "Maybe".into(),
            module_path: vec![],
            type_args: vec![Type::Primitive(PrimitiveKind::I64)],
        });
        assert_eq!(mangled_name("Pair", &[inner, Type::Primitive(PrimitiveKind::I32)]), "Pair__Maybe__I64__I32");
    }

    #[test]
    fn non_generic_mangles_to_itself() {
        assert_eq!(mangled_name("Point", &[]), "Point");
    }
}
