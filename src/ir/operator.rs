//! Operator tags for expression tree nodes.
//!
//! Every [`Exp`](crate::ir::Exp) node is tagged with an [`Operator`] drawn from this
//! fixed enumeration. The tags cover integer and float arithmetic, logical and bitwise
//! operations, signed/unsigned comparison variants, conversions, memory and register
//! locations, constants of each kind, machine flags, and the wildcard forms used by
//! pattern matching.
//!
//! Category predicates ([`Operator::is_comparison`], [`Operator::is_commutative`], ...)
//! drive the simplifier and the back end; the operator name (via [`AsRef<str>`]) is
//! only used for diagnostics.

use strum::{AsRefStr, EnumCount};

/// Tag of an expression tree node.
///
/// The comparison variants come in signed/unsigned pairs; the float variants come in
/// single/double/quad triples where the original machine semantics distinguish them.
/// Wildcard variants only appear inside search patterns, never in procedure IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, AsRefStr, EnumCount)]
pub enum Operator {
    // Integer arithmetic
    /// Integer addition
    Plus,
    /// Integer subtraction
    Minus,
    /// Integer multiplication (unsigned)
    Mult,
    /// Integer multiplication (signed)
    Mults,
    /// Integer division (unsigned)
    Div,
    /// Integer division (signed)
    Divs,
    /// Integer modulus (unsigned)
    Mod,
    /// Integer modulus (signed)
    Mods,
    /// Integer negation
    Neg,

    // Float arithmetic
    /// Float addition
    FPlus,
    /// Float subtraction
    FMinus,
    /// Float multiplication
    FMult,
    /// Float division
    FDiv,
    /// Float negation
    FNeg,
    /// Double addition
    FPlusD,
    /// Double subtraction
    FMinusD,
    /// Double multiplication
    FMultD,
    /// Double division
    FDivD,
    /// Quad addition
    FPlusQ,
    /// Quad subtraction
    FMinusQ,
    /// Quad multiplication
    FMultQ,
    /// Quad division
    FDivQ,
    /// Single-to-double multiply
    FMultSD,
    /// Double-to-quad multiply
    FMultDQ,
    /// Square root (single)
    SqrtS,
    /// Square root (double)
    SqrtD,
    /// Square root (quad)
    SqrtQ,

    // Logicals
    /// Logical and
    And,
    /// Logical or
    Or,
    /// Logical not
    LNot,

    // Comparisons
    /// Equality
    Equals,
    /// Inequality
    NotEqual,
    /// Signed less-than
    Less,
    /// Signed greater-than
    Gtr,
    /// Signed less-or-equal
    LessEq,
    /// Signed greater-or-equal
    GtrEq,
    /// Unsigned less-than
    LessUns,
    /// Unsigned greater-than
    GtrUns,
    /// Unsigned less-or-equal
    LessEqUns,
    /// Unsigned greater-or-equal
    GtrEqUns,

    // Bit manipulation
    /// Bitwise not
    Not,
    /// Bitwise and
    BitAnd,
    /// Bitwise or
    BitOr,
    /// Bitwise xor
    BitXor,
    /// Shift left
    ShiftL,
    /// Logical shift right
    ShiftR,
    /// Arithmetic shift right
    ShiftRA,
    /// Rotate left
    RotateL,
    /// Rotate right
    RotateR,
    /// Rotate left through carry
    RotateLC,
    /// Rotate right through carry
    RotateRC,

    // Memory and locations
    /// Register location: `r[K]`
    RegOf,
    /// Memory location: `m[addr]`
    MemOf,
    /// Address-of: `a[loc]`
    AddrOf,
    /// Named parameter location
    Param,
    /// Named local location
    Local,
    /// Named global location
    Global,
    /// Temporary location
    Temp,
    /// Member access on a compound: `e.field`
    MemberAccess,
    /// Array subscript: `e[i]`
    ArrayIndex,

    // Structure / annotation
    /// Expression annotated with a type (cast)
    TypedExp,
    /// SSA subscript: use referring to its definition
    Subscript,
    /// Phi function over the definitions reaching a join
    Phi,
    /// Bit range extraction: `e@[n:m]`
    At,
    /// Ternary conditional: `c ? a : b`
    Tern,
    /// List cons cell (right-associative spine)
    List,
    /// List terminator
    Nil,
    /// Size annotation override
    Size,
    /// Argument-list placeholder inside flag calls
    Arg,
    /// Guarded assignment condition
    Guard,
    /// "Defines everything" marker used by call analysis
    DefineAll,
    /// Call to a flag-setting function
    FlagCall,
    /// Machine-specific feature access
    MachFtr,
    /// Successor of a register (for register pairs)
    Successor,

    // Conversions
    /// Sign extension
    SgnEx,
    /// Zero fill
    Zfill,
    /// Truncate signed
    TruncS,
    /// Truncate unsigned
    TruncU,
    /// Float size conversion
    Fsize,
    /// Integer to float
    Itof,
    /// Float to integer
    Ftoi,
    /// Round to nearest
    Fround,
    /// Truncate toward zero
    Ftrunc,
    /// Float absolute value
    Fabs,
    /// Force interpretation as integer
    ForceInt,
    /// Force interpretation as float
    ForceFlt,

    // Transcendentals
    /// Sine
    Sin,
    /// Cosine
    Cos,
    /// Tangent
    Tan,
    /// Arc tangent
    ArcTan,
    /// Base-2 logarithm
    Log2,
    /// Base-10 logarithm
    Log10,
    /// Natural logarithm
    LogE,
    /// Power
    Pow,
    /// Square root
    Sqrt,

    // Constants
    /// Integer constant
    IntConst,
    /// Long (64-bit) constant
    LongConst,
    /// Float constant
    FltConst,
    /// String constant
    StrConst,
    /// Function address constant
    FuncConst,
    /// True
    True,
    /// False
    False,

    // Wildcards (search patterns only)
    /// Matches any expression
    Wild,
    /// Matches any integer constant
    WildIntConst,
    /// Matches any string constant
    WildStrConst,
    /// Matches any memory location
    WildMemOf,
    /// Matches any register location
    WildRegOf,
    /// Matches any address-of
    WildAddrOf,

    // Machine state terminals
    /// Program counter
    Pc,
    /// Abstract frame pointer
    Afp,
    /// Abstract global pointer
    Agp,
    /// The %flags holder
    Flags,
    /// The float %flags holder
    Fflags,
    /// Anull bit (delay slot annulment)
    Anull,
    /// Zero flag
    ZF,
    /// Carry flag
    CF,
    /// Negative flag
    NF,
    /// Overflow flag
    OF,
    /// Direction flag
    DF,
    /// Float zero flag
    FZF,
    /// Float less flag
    FLF,
    /// Float greater flag
    FGF,

    // Float stack machine
    /// Push on the float stack
    Fpush,
    /// Pop from the float stack
    Fpop,
}

impl Operator {
    /// Whether this operator commutes over its two operands.
    ///
    /// Used by the simplifier for canonical operand ordering (constants to the
    /// right, hash order for ties).
    #[must_use]
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Operator::Plus
                | Operator::Mult
                | Operator::Mults
                | Operator::BitAnd
                | Operator::BitOr
                | Operator::BitXor
                | Operator::And
                | Operator::Or
                | Operator::Equals
                | Operator::NotEqual
                | Operator::FPlus
                | Operator::FMult
                | Operator::FPlusD
                | Operator::FMultD
                | Operator::FPlusQ
                | Operator::FMultQ
        )
    }

    /// Whether this operator is associative (used for flattening nests).
    #[must_use]
    pub fn is_associative(self) -> bool {
        matches!(
            self,
            Operator::Plus
                | Operator::Mult
                | Operator::Mults
                | Operator::BitAnd
                | Operator::BitOr
                | Operator::BitXor
        )
    }

    /// Whether this is one of the ten comparison operators.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Equals
                | Operator::NotEqual
                | Operator::Less
                | Operator::Gtr
                | Operator::LessEq
                | Operator::GtrEq
                | Operator::LessUns
                | Operator::GtrUns
                | Operator::LessEqUns
                | Operator::GtrEqUns
        )
    }

    /// Whether this comparison treats its operands as unsigned.
    #[must_use]
    pub fn is_unsigned_comparison(self) -> bool {
        matches!(
            self,
            Operator::LessUns | Operator::GtrUns | Operator::LessEqUns | Operator::GtrEqUns
        )
    }

    /// Whether this operator computes on floats.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Operator::FPlus
                | Operator::FMinus
                | Operator::FMult
                | Operator::FDiv
                | Operator::FNeg
                | Operator::FPlusD
                | Operator::FMinusD
                | Operator::FMultD
                | Operator::FDivD
                | Operator::FPlusQ
                | Operator::FMinusQ
                | Operator::FMultQ
                | Operator::FDivQ
                | Operator::FMultSD
                | Operator::FMultDQ
                | Operator::SqrtS
                | Operator::SqrtD
                | Operator::SqrtQ
                | Operator::Fabs
                | Operator::Fround
                | Operator::Ftrunc
                | Operator::Sqrt
        )
    }

    /// Whether this tag marks a machine flag terminal.
    #[must_use]
    pub fn is_flag(self) -> bool {
        matches!(
            self,
            Operator::ZF
                | Operator::CF
                | Operator::NF
                | Operator::OF
                | Operator::DF
                | Operator::FZF
                | Operator::FLF
                | Operator::FGF
                | Operator::Flags
                | Operator::Fflags
        )
    }

    /// Whether this tag only appears in search patterns.
    #[must_use]
    pub fn is_wildcard(self) -> bool {
        matches!(
            self,
            Operator::Wild
                | Operator::WildIntConst
                | Operator::WildStrConst
                | Operator::WildMemOf
                | Operator::WildRegOf
                | Operator::WildAddrOf
        )
    }

    /// The negation of a comparison, staying within the same signedness family.
    ///
    /// Returns `None` for non-comparisons; `¬(a < b)` becomes `a >= b` only
    /// because both are signed variants, and likewise for the unsigned family.
    #[must_use]
    pub fn negated_comparison(self) -> Option<Operator> {
        Some(match self {
            Operator::Equals => Operator::NotEqual,
            Operator::NotEqual => Operator::Equals,
            Operator::Less => Operator::GtrEq,
            Operator::GtrEq => Operator::Less,
            Operator::Gtr => Operator::LessEq,
            Operator::LessEq => Operator::Gtr,
            Operator::LessUns => Operator::GtrEqUns,
            Operator::GtrEqUns => Operator::LessUns,
            Operator::GtrUns => Operator::LessEqUns,
            Operator::LessEqUns => Operator::GtrUns,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use strum::EnumCount;

    use super::Operator;

    #[test]
    fn test_commutativity() {
        assert!(Operator::Plus.is_commutative());
        assert!(Operator::BitXor.is_commutative());
        assert!(!Operator::Minus.is_commutative());
        assert!(!Operator::ShiftL.is_commutative());
        assert!(!Operator::Divs.is_commutative());
    }

    #[test]
    fn test_negated_comparison_preserves_signedness() {
        assert_eq!(Operator::Less.negated_comparison(), Some(Operator::GtrEq));
        assert_eq!(
            Operator::LessUns.negated_comparison(),
            Some(Operator::GtrEqUns)
        );
        assert_eq!(Operator::Plus.negated_comparison(), None);

        // Negation is an involution on every comparison
        for op in [
            Operator::Equals,
            Operator::NotEqual,
            Operator::Less,
            Operator::Gtr,
            Operator::LessEq,
            Operator::GtrEq,
            Operator::LessUns,
            Operator::GtrUns,
            Operator::LessEqUns,
            Operator::GtrEqUns,
        ] {
            let negated = op.negated_comparison().unwrap();
            assert_eq!(negated.negated_comparison(), Some(op));
            assert_eq!(
                op.is_unsigned_comparison(),
                negated.is_unsigned_comparison()
            );
        }
    }

    #[test]
    fn test_operator_inventory_size() {
        // The tag set is fixed; growing it means touching the simplifier
        // and the back end as well.
        assert!(Operator::COUNT > 120);
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(Operator::Plus.as_ref(), "Plus");
        assert_eq!(Operator::WildMemOf.as_ref(), "WildMemOf");
    }
}
