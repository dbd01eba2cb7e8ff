//! The type lattice.
//!
//! Types form a lattice ordered by specificity. [`Type::meet`] returns the more
//! specific of two compatible types, degrades to a [`Type::Size`] when only the
//! sizes agree, and to [`Type::Void`] (the diagnostic bottom) when the operands
//! are incompatible. Signedness `Unknown` joins with either concrete signedness.
//!
//! Sizes are measured in bits throughout. [`Type::Named`] carries its definition
//! inline; the `resolves_to_*` predicates follow it transparently.

use std::fmt;

/// Signedness of an integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    /// Known signed.
    Signed,
    /// Known unsigned.
    Unsigned,
    /// Not yet determined; joins with either concrete signedness.
    Unknown,
}

impl Sign {
    fn meet(self, other: Sign) -> Option<Sign> {
        match (self, other) {
            (Sign::Unknown, s) | (s, Sign::Unknown) => Some(s),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }
}

/// A type in the lattice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// No type information (also the diagnostic result of an incompatible meet).
    Void,
    /// Integer of the given bit size and signedness.
    Integer {
        /// Size in bits.
        size: u16,
        /// Signedness; `Unknown` until analysis settles it.
        sign: Sign,
    },
    /// IEEE float of the given bit size.
    Float {
        /// Size in bits.
        size: u16,
    },
    /// Pointer to the pointee type.
    Pointer(Box<Type>),
    /// Array of `base`, either bounded or unbounded.
    Array {
        /// Element type.
        base: Box<Type>,
        /// Number of elements; `None` for unbounded arrays.
        length: Option<u64>,
    },
    /// Function type.
    Func {
        /// Return type.
        ret: Box<Type>,
        /// Parameter types in order.
        params: Vec<Type>,
        /// Whether the function is variadic.
        variadic: bool,
    },
    /// Structure with named fields in declaration order.
    Compound {
        /// `(name, type)` pairs in order.
        fields: Vec<(String, Type)>,
    },
    /// Union of the alternatives.
    Union(Vec<Type>),
    /// A name bound to a compound/union definition.
    Named {
        /// The bound name (emitted as the C type name).
        name: String,
        /// The definition the name resolves to.
        target: Box<Type>,
    },
    /// Size is known but the structure is not.
    Size(u16),
}

/// Default machine integer size in bits.
pub(crate) const STD_SIZE: u16 = 32;

impl Type {
    /// A signed 32-bit integer, the C default.
    #[must_use]
    pub fn int() -> Type {
        Type::Integer {
            size: STD_SIZE,
            sign: Sign::Signed,
        }
    }

    /// An integer of unknown signedness.
    #[must_use]
    pub fn integer(size: u16) -> Type {
        Type::Integer {
            size,
            sign: Sign::Unknown,
        }
    }

    /// The size of the type in bits. Unbounded arrays and void report 0.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Type::Void => 0,
            Type::Integer { size, .. } | Type::Float { size } | Type::Size(size) => {
                u64::from(*size)
            }
            Type::Pointer(_) | Type::Func { .. } => u64::from(STD_SIZE),
            Type::Array { base, length } => length.map_or(0, |n| base.size() * n),
            Type::Compound { fields } => fields.iter().map(|(_, t)| t.size()).sum(),
            Type::Union(alts) => alts.iter().map(Type::size).max().unwrap_or(0),
            Type::Named { target, .. } => target.size(),
        }
    }

    /// Follows `Named` indirections to the underlying definition.
    #[must_use]
    pub fn resolved(&self) -> &Type {
        let mut t = self;
        while let Type::Named { target, .. } = t {
            t = target;
        }
        t
    }

    /// Whether this resolves to `Void`.
    #[must_use]
    pub fn resolves_to_void(&self) -> bool {
        matches!(self.resolved(), Type::Void)
    }

    /// Whether this resolves to an integer.
    #[must_use]
    pub fn resolves_to_integer(&self) -> bool {
        matches!(self.resolved(), Type::Integer { .. })
    }

    /// Whether this resolves to a float.
    #[must_use]
    pub fn resolves_to_float(&self) -> bool {
        matches!(self.resolved(), Type::Float { .. })
    }

    /// Whether this resolves to a pointer.
    #[must_use]
    pub fn resolves_to_pointer(&self) -> bool {
        matches!(self.resolved(), Type::Pointer(_))
    }

    /// Whether this resolves to an array.
    #[must_use]
    pub fn resolves_to_array(&self) -> bool {
        matches!(self.resolved(), Type::Array { .. })
    }

    /// Whether this resolves to a function type.
    #[must_use]
    pub fn resolves_to_func(&self) -> bool {
        matches!(self.resolved(), Type::Func { .. })
    }

    /// Whether this resolves to a compound.
    #[must_use]
    pub fn resolves_to_compound(&self) -> bool {
        matches!(self.resolved(), Type::Compound { .. })
    }

    /// Whether this resolves to a size-only type.
    #[must_use]
    pub fn resolves_to_size(&self) -> bool {
        matches!(self.resolved(), Type::Size(_))
    }

    /// Whether this is an 8-bit integer, printed as a char constant.
    #[must_use]
    pub fn is_char(&self) -> bool {
        matches!(self.resolved(), Type::Integer { size: 8, .. })
    }

    /// Whether this integer type is known unsigned.
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self.resolved(),
            Type::Integer {
                sign: Sign::Unsigned,
                ..
            }
        )
    }

    /// The pointee if this resolves to a pointer.
    #[must_use]
    pub fn pointee(&self) -> Option<&Type> {
        match self.resolved() {
            Type::Pointer(p) => Some(p),
            _ => None,
        }
    }

    /// The element type if this resolves to an array.
    #[must_use]
    pub fn array_base(&self) -> Option<&Type> {
        match self.resolved() {
            Type::Array { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Whether `self` and `other` can meet without degrading to `Void`.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Type) -> bool {
        !matches!(self.meet(other), Type::Void) || self.resolves_to_void()
            || other.resolves_to_void()
    }

    /// The lattice join: the more specific of two compatible types.
    ///
    /// Void is the identity. Two types whose structures conflict but whose
    /// sizes agree meet to a [`Type::Size`]; fully incompatible types meet to
    /// `Void`, which downstream code treats as a diagnostic.
    #[must_use]
    pub fn meet(&self, other: &Type) -> Type {
        let a = self.resolved();
        let b = other.resolved();

        match (a, b) {
            (Type::Void, t) | (t, Type::Void) => t.clone(),

            (
                Type::Integer {
                    size: sa,
                    sign: ga,
                },
                Type::Integer {
                    size: sb,
                    sign: gb,
                },
            ) => {
                if sa != sb {
                    return if a.size() == b.size() {
                        Type::Size(*sa)
                    } else {
                        Type::Void
                    };
                }
                match ga.meet(*gb) {
                    Some(sign) => Type::Integer { size: *sa, sign },
                    None => Type::Size(*sa),
                }
            }

            (Type::Float { size: sa }, Type::Float { size: sb }) => {
                if sa == sb {
                    a.clone()
                } else {
                    Type::Void
                }
            }

            (Type::Pointer(pa), Type::Pointer(pb)) => {
                let pointee = pa.meet(pb);
                if matches!(pointee, Type::Void) && !pa.resolves_to_void()
                    && !pb.resolves_to_void()
                {
                    Type::Size(STD_SIZE)
                } else {
                    Type::Pointer(Box::new(pointee))
                }
            }

            (
                Type::Array {
                    base: ba,
                    length: la,
                },
                Type::Array {
                    base: bb,
                    length: lb,
                },
            ) => {
                let base = ba.meet(bb);
                if matches!(base, Type::Void) {
                    return Type::Void;
                }
                // A bounded array is more specific than an unbounded one
                let length = match (la, lb) {
                    (Some(x), Some(y)) if x == y => Some(*x),
                    (Some(x), None) | (None, Some(x)) => Some(*x),
                    (None, None) => None,
                    _ => return Type::Void,
                };
                Type::Array {
                    base: Box::new(base),
                    length,
                }
            }

            // A size-only type is compatible with anything of the same size
            (Type::Size(s), t) | (t, Type::Size(s)) => {
                if t.size() == u64::from(*s) {
                    t.clone()
                } else {
                    Type::Void
                }
            }

            (Type::Func { .. }, Type::Func { .. })
            | (Type::Compound { .. }, Type::Compound { .. })
            | (Type::Union(_), Type::Union(_)) => {
                if a == b {
                    a.clone()
                } else if a.size() == b.size() && a.size() > 0 {
                    Type::Size(a.size() as u16)
                } else {
                    Type::Void
                }
            }

            _ => {
                if a.size() == b.size() && a.size() > 0 {
                    Type::Size(a.size() as u16)
                } else {
                    Type::Void
                }
            }
        }
    }
}

impl fmt::Display for Type {
    /// Diagnostic rendering; the C back end renders declarators separately.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Integer { size, sign } => {
                let prefix = match sign {
                    Sign::Signed => "i",
                    Sign::Unsigned => "u",
                    Sign::Unknown => "j",
                };
                write!(f, "{prefix}{size}")
            }
            Type::Float { size } => write!(f, "f{size}"),
            Type::Pointer(p) => write!(f, "{p}*"),
            Type::Array {
                base,
                length: Some(n),
            } => write!(f, "{base}[{n}]"),
            Type::Array { base, length: None } => write!(f, "{base}[]"),
            Type::Func { ret, params, .. } => {
                write!(f, "{ret}(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            Type::Compound { fields } => write!(f, "struct{{{}}}", fields.len()),
            Type::Union(alts) => write!(f, "union{{{}}}", alts.len()),
            Type::Named { name, .. } => write!(f, "{name}"),
            Type::Size(bits) => write!(f, "size{bits}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32s() -> Type {
        Type::Integer {
            size: 32,
            sign: Sign::Signed,
        }
    }

    fn i32u() -> Type {
        Type::Integer {
            size: 32,
            sign: Sign::Unsigned,
        }
    }

    fn i32j() -> Type {
        Type::Integer {
            size: 32,
            sign: Sign::Unknown,
        }
    }

    #[test]
    fn test_meet_void_identity() {
        assert_eq!(Type::Void.meet(&i32s()), i32s());
        assert_eq!(i32s().meet(&Type::Void), i32s());
    }

    #[test]
    fn test_meet_signedness() {
        // Unknown joins with either concrete signedness
        assert_eq!(i32j().meet(&i32s()), i32s());
        assert_eq!(i32u().meet(&i32j()), i32u());
        // Conflicting signedness degrades to size-only
        assert_eq!(i32s().meet(&i32u()), Type::Size(32));
    }

    #[test]
    fn test_meet_commutative() {
        let pairs = [
            (i32s(), i32u()),
            (i32j(), i32s()),
            (Type::Float { size: 32 }, i32j()),
            (Type::Pointer(Box::new(Type::Void)), Type::Size(32)),
        ];
        for (a, b) in pairs {
            assert_eq!(a.meet(&b), b.meet(&a));
        }
    }

    #[test]
    fn test_meet_associative() {
        let a = i32j();
        let b = i32s();
        let c = Type::Size(32);
        assert_eq!(a.meet(&b).meet(&c), a.meet(&b.meet(&c)));
    }

    #[test]
    fn test_meet_incompatible() {
        let f64t = Type::Float { size: 64 };
        assert_eq!(i32s().meet(&f64t), Type::Void);
    }

    #[test]
    fn test_meet_size_with_matching_structure() {
        let ptr = Type::Pointer(Box::new(i32s()));
        assert_eq!(Type::Size(32).meet(&ptr), ptr);
        assert_eq!(Type::Size(64).meet(&ptr), Type::Void);
    }

    #[test]
    fn test_named_resolution() {
        let t = Type::Named {
            name: "size_t".into(),
            target: Box::new(i32u()),
        };
        assert!(t.resolves_to_integer());
        assert!(t.is_unsigned());
        assert_eq!(t.size(), 32);
    }

    #[test]
    fn test_array_sizes() {
        let arr = Type::Array {
            base: Box::new(Type::Integer {
                size: 8,
                sign: Sign::Unsigned,
            }),
            length: Some(16),
        };
        assert_eq!(arr.size(), 128);
    }

    #[test]
    fn test_array_meet_prefers_bounded() {
        let bounded = Type::Array {
            base: Box::new(i32s()),
            length: Some(4),
        };
        let unbounded = Type::Array {
            base: Box::new(i32j()),
            length: None,
        };
        let met = bounded.meet(&unbounded);
        assert_eq!(
            met,
            Type::Array {
                base: Box::new(i32s()),
                length: Some(4),
            }
        );
    }
}
