//! C type and declarator rendering.

use std::fmt::Write;

use crate::ir::{Sign, Type};

/// Renders `ty` as a C type name.
///
/// Pointer-to-array is displayed as pointer-to-element: C programmers access
/// such a pointer with array syntax anyway.
pub fn append_type(out: &mut String, ty: &Type) {
    match ty.resolved() {
        Type::Void => out.push_str("void"),
        Type::Integer { size, sign } => {
            if *sign == Sign::Unsigned {
                out.push_str("unsigned ");
            }
            out.push_str(match size {
                8 => "char",
                16 => "short",
                64 => "long long",
                _ => "int",
            });
        }
        Type::Float { size } => out.push_str(match size {
            64 => "double",
            80 => "long double",
            _ => "float",
        }),
        Type::Pointer(pointee) => {
            if let Type::Array { base, .. } = pointee.resolved() {
                append_type(out, base);
            } else {
                append_type(out, pointee);
            }
            out.push_str(" *");
        }
        Type::Array { base, .. } => {
            // Bare array type (not a declarator position); decays
            append_type(out, base);
            out.push_str(" *");
        }
        Type::Func { ret, .. } => {
            append_type(out, ret);
            out.push_str(" (*)()");
        }
        Type::Compound { .. } => out.push_str("struct { /* ... */ }"),
        Type::Union(_) => out.push_str("union { /* ... */ }"),
        Type::Named { name, .. } => out.push_str(name),
        Type::Size(bits) => {
            let _ = write!(out, "__size{bits}");
        }
    }
}

/// Renders the declarator `ty name` with C99 syntax.
///
/// - pointer-to-array becomes `T *name`
/// - arrays become `T name[N]` (`T name[]` when unbounded)
/// - function pointers become `R (*name)(P, ...)`
pub fn append_type_ident(out: &mut String, ty: &Type, ident: &str) {
    match ty.resolved() {
        Type::Pointer(pointee) => match pointee.resolved() {
            Type::Array { base, .. } => {
                append_type(out, base);
                let _ = write!(out, " *{ident}");
            }
            Type::Func { ret, params, variadic } => {
                append_type(out, ret);
                let _ = write!(out, " (*{ident})(");
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    append_type(out, p);
                }
                if *variadic {
                    if !params.is_empty() {
                        out.push_str(", ");
                    }
                    out.push_str("...");
                }
                out.push(')');
            }
            _ => {
                append_type(out, ty);
                out.push_str(ident);
            }
        },
        Type::Array { base, length } => {
            append_type_ident(out, base, ident);
            match length {
                Some(n) => {
                    let _ = write!(out, "[{n}]");
                }
                None => out.push_str("[]"),
            }
        }
        Type::Void => {
            // A void local is a failed type inference; declare as int
            log::warn!("declaring void type as int for {ident}");
            let _ = write!(out, "int {ident}");
        }
        _ => {
            append_type(out, ty);
            let _ = write!(out, " {ident}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(ty: &Type, name: &str) -> String {
        let mut out = String::new();
        append_type_ident(&mut out, ty, name);
        out
    }

    #[test]
    fn test_basic_declarators() {
        assert_eq!(ident(&Type::int(), "x"), "int x");
        assert_eq!(
            ident(
                &Type::Integer {
                    size: 8,
                    sign: Sign::Unsigned
                },
                "b"
            ),
            "unsigned char b"
        );
        assert_eq!(ident(&Type::Float { size: 64 }, "d"), "double d");
    }

    #[test]
    fn test_pointer_to_array_decays() {
        let ty = Type::Pointer(Box::new(Type::Array {
            base: Box::new(Type::int()),
            length: Some(10),
        }));
        assert_eq!(ident(&ty, "p"), "int *p");
    }

    #[test]
    fn test_array_declarator() {
        let ty = Type::Array {
            base: Box::new(Type::Integer {
                size: 8,
                sign: Sign::Unsigned,
            }),
            length: Some(16),
        };
        assert_eq!(ident(&ty, "buf"), "unsigned char buf[16]");
    }

    #[test]
    fn test_function_pointer_declarator() {
        let ty = Type::Pointer(Box::new(Type::Func {
            ret: Box::new(Type::int()),
            params: vec![Type::int(), Type::int()],
            variadic: false,
        }));
        assert_eq!(ident(&ty, "cb"), "int (*cb)(int, int)");
    }
}
