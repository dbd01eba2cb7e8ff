//! The operator-tagged expression tree.
//!
//! An [`Exp`] is an immutable tree node tagged with an [`Operator`]. Leaves carry a
//! [`Value`]; interior nodes carry one to three children behind [`SharedExp`]
//! reference-counted handles. Subtrees may be shared by multiple parents: rewrites
//! return a new node for the changed path and reuse untouched subtrees, so sharing
//! is never observable through mutation.
//!
//! # Structure
//!
//! ```text
//! Exp
//! ├── Const(Value)                   // integer / long / float / string / address / function
//! ├── Terminal(Operator)             // pc, flags, nil, wildcards, true/false
//! ├── Unary(Operator, e)             // m[e], a[e], r[e], -e, ~e, ...
//! ├── Binary(Operator, e1, e2)       // e1 + e2, e1 <u e2, list cons, ...
//! ├── Ternary(Operator, e1, e2, e3)  // e1 ? e2 : e3, e1@[e2:e3], sgnex(from, to, e)
//! ├── Typed(Type, e)                 // (T)e
//! └── Subscript(e, def)              // SSA use: e{def}, def None = entry value
//! ```
//!
//! Equality and hashing are structural. Two expressions that print the same are
//! equal and hash identically, which makes [`SharedExp`] directly usable as a map
//! key (the symbol map, definition collectors, rename stacks).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::ir::{Address, Operator, RegId, StatementId, Type};

/// Reference-counted handle to a shared expression subtree.
pub type SharedExp = Rc<Exp>;

/// Leaf payload of a constant expression node.
///
/// Floats hash and compare by bit pattern so that structural hashing stays
/// consistent with structural equality.
#[derive(Debug, Clone)]
pub enum Value {
    /// Integer constant (canonically 32-bit, kept sign-extended)
    Int(i64),
    /// 64-bit constant
    Long(u64),
    /// Float constant
    Float(f64),
    /// String constant
    Str(String),
    /// Address constant (e.g. a switch table base)
    Addr(Address),
    /// Function reference by name
    Func(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Addr(a), Value::Addr(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Str(v) => v.hash(state),
            Value::Addr(v) => v.hash(state),
            Value::Func(v) => v.hash(state),
        }
    }
}

/// An expression tree node.
///
/// See the [module docs](self) for the overall shape. Nodes are constructed
/// through the associated functions ([`Exp::binary`], [`Exp::reg`],
/// [`Exp::mem_of`], ...) which all return [`SharedExp`] handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Exp {
    /// Constant leaf.
    Const(Value),
    /// Leaf with no payload: machine state, nil, wildcards.
    Terminal(Operator),
    /// One-child node.
    Unary(Operator, SharedExp),
    /// Two-child node.
    Binary(Operator, SharedExp, SharedExp),
    /// Three-child node.
    Ternary(Operator, SharedExp, SharedExp, SharedExp),
    /// Type-annotated expression (a cast in the back end).
    Typed(Type, SharedExp),
    /// SSA use subscript: the base location plus the id of its reaching
    /// definition. `None` is the implicit definition (value on entry).
    Subscript(SharedExp, Option<StatementId>),
}

impl Exp {
    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// Integer constant.
    #[must_use]
    pub fn int(value: i64) -> SharedExp {
        Rc::new(Exp::Const(Value::Int(value)))
    }

    /// 64-bit constant.
    #[must_use]
    pub fn long(value: u64) -> SharedExp {
        Rc::new(Exp::Const(Value::Long(value)))
    }

    /// Float constant.
    #[must_use]
    pub fn flt(value: f64) -> SharedExp {
        Rc::new(Exp::Const(Value::Float(value)))
    }

    /// String constant.
    #[must_use]
    pub fn str_const(value: &str) -> SharedExp {
        Rc::new(Exp::Const(Value::Str(value.to_string())))
    }

    /// Address constant.
    #[must_use]
    pub fn addr(value: Address) -> SharedExp {
        Rc::new(Exp::Const(Value::Addr(value)))
    }

    /// Function reference constant.
    #[must_use]
    pub fn func(name: &str) -> SharedExp {
        Rc::new(Exp::Const(Value::Func(name.to_string())))
    }

    /// Terminal node for the given operator.
    #[must_use]
    pub fn terminal(op: Operator) -> SharedExp {
        Rc::new(Exp::Terminal(op))
    }

    /// The list terminator.
    #[must_use]
    pub fn nil() -> SharedExp {
        Exp::terminal(Operator::Nil)
    }

    /// Unary node.
    #[must_use]
    pub fn unary(op: Operator, sub: SharedExp) -> SharedExp {
        Rc::new(Exp::Unary(op, sub))
    }

    /// Binary node.
    #[must_use]
    pub fn binary(op: Operator, lhs: SharedExp, rhs: SharedExp) -> SharedExp {
        Rc::new(Exp::Binary(op, lhs, rhs))
    }

    /// Ternary node.
    #[must_use]
    pub fn ternary(op: Operator, e1: SharedExp, e2: SharedExp, e3: SharedExp) -> SharedExp {
        Rc::new(Exp::Ternary(op, e1, e2, e3))
    }

    /// Type-annotated expression.
    #[must_use]
    pub fn typed(ty: Type, sub: SharedExp) -> SharedExp {
        Rc::new(Exp::Typed(ty, sub))
    }

    /// SSA use subscript.
    #[must_use]
    pub fn subscript(base: SharedExp, def: Option<StatementId>) -> SharedExp {
        Rc::new(Exp::Subscript(base, def))
    }

    /// Register location `r[K]`.
    #[must_use]
    pub fn reg(id: RegId) -> SharedExp {
        Exp::unary(Operator::RegOf, Exp::int(i64::from(id)))
    }

    /// Memory location `m[addr]`.
    #[must_use]
    pub fn mem_of(addr: SharedExp) -> SharedExp {
        Exp::unary(Operator::MemOf, addr)
    }

    /// Address-of `a[loc]`.
    #[must_use]
    pub fn addr_of(loc: SharedExp) -> SharedExp {
        Exp::unary(Operator::AddrOf, loc)
    }

    /// Named parameter location.
    #[must_use]
    pub fn param(name: &str) -> SharedExp {
        Exp::unary(Operator::Param, Exp::str_const(name))
    }

    /// Named local location.
    #[must_use]
    pub fn local(name: &str) -> SharedExp {
        Exp::unary(Operator::Local, Exp::str_const(name))
    }

    /// Named global location.
    #[must_use]
    pub fn global(name: &str) -> SharedExp {
        Exp::unary(Operator::Global, Exp::str_const(name))
    }

    /// Builds a right-associative `List` spine from the items, terminated by `Nil`.
    #[must_use]
    pub fn list<I>(items: I) -> SharedExp
    where
        I: IntoIterator<Item = SharedExp>,
        I::IntoIter: DoubleEndedIterator,
    {
        let mut tail = Exp::nil();
        for item in items.into_iter().rev() {
            tail = Exp::binary(Operator::List, item, tail);
        }
        tail
    }

    // ------------------------------------------------------------------
    // Shape queries
    // ------------------------------------------------------------------

    /// The operator tag of this node.
    #[must_use]
    pub fn oper(&self) -> Operator {
        match self {
            Exp::Const(Value::Int(_)) => Operator::IntConst,
            Exp::Const(Value::Long(_)) => Operator::LongConst,
            Exp::Const(Value::Float(_)) => Operator::FltConst,
            Exp::Const(Value::Str(_)) => Operator::StrConst,
            Exp::Const(Value::Addr(_)) => Operator::IntConst,
            Exp::Const(Value::Func(_)) => Operator::FuncConst,
            Exp::Terminal(op) => *op,
            Exp::Unary(op, _) => *op,
            Exp::Binary(op, _, _) => *op,
            Exp::Ternary(op, _, _, _) => *op,
            Exp::Typed(_, _) => Operator::TypedExp,
            Exp::Subscript(_, _) => Operator::Subscript,
        }
    }

    /// Number of children of this node (0 for leaves).
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Exp::Const(_) | Exp::Terminal(_) => 0,
            Exp::Unary(_, _) | Exp::Typed(_, _) | Exp::Subscript(_, _) => 1,
            Exp::Binary(_, _, _) => 2,
            Exp::Ternary(_, _, _, _) => 3,
        }
    }

    /// Child `i`, or `None` past the arity.
    #[must_use]
    pub fn child(&self, i: usize) -> Option<&SharedExp> {
        match (self, i) {
            (Exp::Unary(_, a) | Exp::Typed(_, a) | Exp::Subscript(a, _), 0) => Some(a),
            (Exp::Binary(_, a, _) | Exp::Ternary(_, a, _, _), 0) => Some(a),
            (Exp::Binary(_, _, b) | Exp::Ternary(_, _, b, _), 1) => Some(b),
            (Exp::Ternary(_, _, _, c), 2) => Some(c),
            _ => None,
        }
    }

    /// First child. Panics on leaves; callers match the shape first.
    #[must_use]
    pub fn sub1(&self) -> &SharedExp {
        self.child(0).expect("expression has no first child")
    }

    /// Second child.
    #[must_use]
    pub fn sub2(&self) -> &SharedExp {
        self.child(1).expect("expression has no second child")
    }

    /// Third child.
    #[must_use]
    pub fn sub3(&self) -> &SharedExp {
        self.child(2).expect("expression has no third child")
    }

    /// Returns a copy of this node with child `i` replaced.
    ///
    /// The untouched children are shared with the original node.
    #[must_use]
    pub fn with_child(&self, i: usize, new: SharedExp) -> SharedExp {
        match (self, i) {
            (Exp::Unary(op, _), 0) => Exp::unary(*op, new),
            (Exp::Typed(ty, _), 0) => Exp::typed(ty.clone(), new),
            (Exp::Subscript(_, def), 0) => Exp::subscript(new, *def),
            (Exp::Binary(op, _, b), 0) => Exp::binary(*op, new, b.clone()),
            (Exp::Binary(op, a, _), 1) => Exp::binary(*op, a.clone(), new),
            (Exp::Ternary(op, _, b, c), 0) => Exp::ternary(*op, new, b.clone(), c.clone()),
            (Exp::Ternary(op, a, _, c), 1) => Exp::ternary(*op, a.clone(), new, c.clone()),
            (Exp::Ternary(op, a, b, _), 2) => Exp::ternary(*op, a.clone(), b.clone(), new),
            _ => panic!("with_child: index {i} out of range"),
        }
    }

    /// Integer value of this node if it is an integer constant.
    #[must_use]
    pub fn int_value(&self) -> Option<i64> {
        match self {
            Exp::Const(Value::Int(v)) => Some(*v),
            Exp::Const(Value::Addr(a)) => Some(a.value() as i64),
            _ => None,
        }
    }

    /// Address value of this node if it is an address or integer constant.
    #[must_use]
    pub fn addr_value(&self) -> Option<Address> {
        match self {
            Exp::Const(Value::Addr(a)) => Some(*a),
            Exp::Const(Value::Int(v)) => Some(Address(*v as u64)),
            _ => None,
        }
    }

    /// Whether this is an integer constant.
    #[must_use]
    pub fn is_int_const(&self) -> bool {
        matches!(self, Exp::Const(Value::Int(_)))
    }

    /// Whether this is any constant leaf.
    #[must_use]
    pub fn is_const(&self) -> bool {
        matches!(self, Exp::Const(_))
    }

    /// Whether this is the list terminator.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Exp::Terminal(Operator::Nil))
    }

    /// Whether this is a memory location.
    #[must_use]
    pub fn is_mem_of(&self) -> bool {
        matches!(self, Exp::Unary(Operator::MemOf, _))
    }

    /// Whether this is a register location.
    #[must_use]
    pub fn is_reg_of(&self) -> bool {
        matches!(self, Exp::Unary(Operator::RegOf, _))
    }

    /// The register number if this is a register location.
    #[must_use]
    pub fn reg_id(&self) -> Option<RegId> {
        match self {
            Exp::Unary(Operator::RegOf, sub) => sub.int_value().and_then(|v| RegId::try_from(v).ok()),
            _ => None,
        }
    }

    /// Whether this is an assignable location (register, memory, named
    /// parameter/local/global/temp).
    #[must_use]
    pub fn is_location(&self) -> bool {
        matches!(
            self.oper(),
            Operator::RegOf
                | Operator::MemOf
                | Operator::Param
                | Operator::Local
                | Operator::Global
                | Operator::Temp
                | Operator::Flags
                | Operator::Fflags
                | Operator::Pc
        )
    }

    /// Whether this is an SSA subscript.
    #[must_use]
    pub fn is_subscript(&self) -> bool {
        matches!(self, Exp::Subscript(_, _))
    }

    /// Whether `pattern` matches this expression.
    ///
    /// Wildcard operators in the pattern match any node of the corresponding
    /// shape; everything else must match structurally.
    #[must_use]
    pub fn matches(&self, pattern: &Exp) -> bool {
        match pattern {
            Exp::Terminal(Operator::Wild) => return true,
            Exp::Terminal(Operator::WildIntConst) => return self.is_int_const(),
            Exp::Terminal(Operator::WildStrConst) => {
                return matches!(self, Exp::Const(Value::Str(_)))
            }
            Exp::Terminal(Operator::WildMemOf) => return self.is_mem_of(),
            Exp::Terminal(Operator::WildRegOf) => return self.is_reg_of(),
            Exp::Terminal(Operator::WildAddrOf) => {
                return matches!(self, Exp::Unary(Operator::AddrOf, _))
            }
            _ => {}
        }

        if self.oper() != pattern.oper() || self.arity() != pattern.arity() {
            return false;
        }
        match (self, pattern) {
            (Exp::Const(a), Exp::Const(b)) => a == b,
            (Exp::Terminal(a), Exp::Terminal(b)) => a == b,
            (Exp::Typed(ta, _), Exp::Typed(tb, _)) if ta != tb => false,
            (Exp::Subscript(_, da), Exp::Subscript(_, db)) if da != db => false,
            _ => (0..self.arity()).all(|i| {
                self.child(i)
                    .expect("arity-bounded index")
                    .matches(pattern.child(i).expect("arity-bounded index"))
            }),
        }
    }

}

/// Rewriting and search operations over shared expression handles.
///
/// Implemented on [`SharedExp`]; rewrites return the same handle when
/// nothing below changed, so subtree sharing survives every pass.
pub trait ExpRewrite {
    /// Applies `f` to every child and rebuilds this node only if a child
    /// actually changed (pointer identity); otherwise the original handle
    /// comes back.
    #[must_use]
    fn map_children(&self, f: impl FnMut(&SharedExp) -> SharedExp) -> SharedExp;

    /// Bottom-up rewrite: children first, then the (possibly rebuilt) node
    /// itself. Untouched subtrees are shared with the input.
    #[must_use]
    fn map_post(&self, f: &mut impl FnMut(&SharedExp) -> SharedExp) -> SharedExp;

    /// Pre-order read-only visit. The visitor returns `false` to skip the
    /// children of the current node.
    fn visit_pre(&self, f: &mut impl FnMut(&SharedExp) -> bool);

    /// Whether any subexpression matches `pattern`.
    #[must_use]
    fn search(&self, pattern: &Exp) -> bool;

    /// Collects all subexpressions matching `pattern`, in pre-order.
    #[must_use]
    fn search_all(&self, pattern: &Exp) -> Vec<SharedExp>;

    /// Replaces every subexpression matching `pattern` with `replacement`,
    /// returning the new root and whether anything changed.
    ///
    /// Replacement is not recursive into replaced subtrees.
    #[must_use]
    fn search_and_replace(&self, pattern: &Exp, replacement: &SharedExp) -> (SharedExp, bool);

    /// Removes every SSA subscript, leaving the base locations.
    ///
    /// Used when comparing expressions across renames and by the back end,
    /// which never prints subscripts.
    #[must_use]
    fn strip_subscripts(&self) -> SharedExp;
}

impl ExpRewrite for SharedExp {
    fn map_children(&self, mut f: impl FnMut(&SharedExp) -> SharedExp) -> SharedExp {
        match &**self {
            Exp::Const(_) | Exp::Terminal(_) => self.clone(),
            Exp::Unary(op, a) => {
                let na = f(a);
                if Rc::ptr_eq(&na, a) {
                    self.clone()
                } else {
                    Exp::unary(*op, na)
                }
            }
            Exp::Typed(ty, a) => {
                let na = f(a);
                if Rc::ptr_eq(&na, a) {
                    self.clone()
                } else {
                    Exp::typed(ty.clone(), na)
                }
            }
            Exp::Subscript(a, def) => {
                let na = f(a);
                if Rc::ptr_eq(&na, a) {
                    self.clone()
                } else {
                    Exp::subscript(na, *def)
                }
            }
            Exp::Binary(op, a, b) => {
                let na = f(a);
                let nb = f(b);
                if Rc::ptr_eq(&na, a) && Rc::ptr_eq(&nb, b) {
                    self.clone()
                } else {
                    Exp::binary(*op, na, nb)
                }
            }
            Exp::Ternary(op, a, b, c) => {
                let na = f(a);
                let nb = f(b);
                let nc = f(c);
                if Rc::ptr_eq(&na, a) && Rc::ptr_eq(&nb, b) && Rc::ptr_eq(&nc, c) {
                    self.clone()
                } else {
                    Exp::ternary(*op, na, nb, nc)
                }
            }
        }
    }

    fn map_post(&self, f: &mut impl FnMut(&SharedExp) -> SharedExp) -> SharedExp {
        let rebuilt = self.map_children(|child| child.map_post(f));
        f(&rebuilt)
    }

    fn visit_pre(&self, f: &mut impl FnMut(&SharedExp) -> bool) {
        if !f(self) {
            return;
        }
        for i in 0..self.arity() {
            self.child(i).expect("arity-bounded index").visit_pre(f);
        }
    }

    fn search(&self, pattern: &Exp) -> bool {
        let mut found = false;
        self.visit_pre(&mut |e| {
            if e.matches(pattern) {
                found = true;
            }
            !found
        });
        found
    }

    fn search_all(&self, pattern: &Exp) -> Vec<SharedExp> {
        let mut hits = Vec::new();
        self.visit_pre(&mut |e| {
            if e.matches(pattern) {
                hits.push(e.clone());
            }
            true
        });
        hits
    }

    fn search_and_replace(&self, pattern: &Exp, replacement: &SharedExp) -> (SharedExp, bool) {
        if self.matches(pattern) {
            return (replacement.clone(), true);
        }
        let mut changed = false;
        let result = self.map_children(|child| {
            let (new, ch) = child.search_and_replace(pattern, replacement);
            changed |= ch;
            new
        });
        (result, changed)
    }

    fn strip_subscripts(&self) -> SharedExp {
        self.map_post(&mut |e| match &**e {
            Exp::Subscript(base, _) => base.clone(),
            _ => e.clone(),
        })
    }
}

impl fmt::Display for Exp {
    /// Diagnostic rendering, close to the RTL notation used in logs:
    /// `m[r28 - 4]{12}`, `r24 + 5`, `"str"`. The C back end has its own
    /// precedence-aware printer.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exp::Const(Value::Int(v)) => write!(f, "{v}"),
            Exp::Const(Value::Long(v)) => write!(f, "{v}LL"),
            Exp::Const(Value::Float(v)) => write!(f, "{v}"),
            Exp::Const(Value::Str(s)) => write!(f, "\"{s}\""),
            Exp::Const(Value::Addr(a)) => write!(f, "{a}"),
            Exp::Const(Value::Func(n)) => write!(f, "{n}"),
            Exp::Terminal(op) => write!(f, "%{}", op.as_ref()),
            Exp::Unary(Operator::RegOf, sub) => match sub.int_value() {
                Some(v) => write!(f, "r{v}"),
                None => write!(f, "r[{sub}]"),
            },
            Exp::Unary(Operator::MemOf, sub) => write!(f, "m[{sub}]"),
            Exp::Unary(Operator::AddrOf, sub) => write!(f, "a[{sub}]"),
            Exp::Unary(Operator::Param | Operator::Local | Operator::Global, sub) => {
                match &**sub {
                    Exp::Const(Value::Str(s)) => write!(f, "{s}"),
                    other => write!(f, "{other}"),
                }
            }
            Exp::Unary(Operator::Neg | Operator::FNeg, sub) => write!(f, "-{sub}"),
            Exp::Unary(Operator::Not, sub) => write!(f, "~{sub}"),
            Exp::Unary(Operator::LNot, sub) => write!(f, "!{sub}"),
            Exp::Unary(op, sub) => write!(f, "{}({sub})", op.as_ref()),
            Exp::Binary(op, a, b) => {
                let sym = match op {
                    Operator::Plus | Operator::FPlus => "+",
                    Operator::Minus | Operator::FMinus => "-",
                    Operator::Mult | Operator::Mults | Operator::FMult => "*",
                    Operator::Div | Operator::Divs | Operator::FDiv => "/",
                    Operator::Mod | Operator::Mods => "%",
                    Operator::BitAnd => "&",
                    Operator::BitOr => "|",
                    Operator::BitXor => "^",
                    Operator::ShiftL => "<<",
                    Operator::ShiftR | Operator::ShiftRA => ">>",
                    Operator::And => "&&",
                    Operator::Or => "||",
                    Operator::Equals => "=",
                    Operator::NotEqual => "~=",
                    Operator::Less => "<",
                    Operator::Gtr => ">",
                    Operator::LessEq => "<=",
                    Operator::GtrEq => ">=",
                    Operator::LessUns => "<u",
                    Operator::GtrUns => ">u",
                    Operator::LessEqUns => "<=u",
                    Operator::GtrEqUns => ">=u",
                    _ => {
                        return write!(f, "{}({a}, {b})", op.as_ref());
                    }
                };
                write!(f, "{a} {sym} {b}")
            }
            Exp::Ternary(Operator::Tern, c, t, e) => write!(f, "{c} ? {t} : {e}"),
            Exp::Ternary(Operator::At, e, n, m) => write!(f, "{e}@[{n}:{m}]"),
            Exp::Ternary(op, a, b, c) => write!(f, "{}({a}, {b}, {c})", op.as_ref()),
            Exp::Typed(ty, sub) => write!(f, "({ty}){sub}"),
            Exp::Subscript(base, Some(def)) => write!(f, "{base}{{{def}}}"),
            Exp::Subscript(base, None) => write!(f, "{base}{{-}}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::*;

    fn hash_of(e: &Exp) -> u64 {
        let mut h = DefaultHasher::new();
        e.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let a = Exp::binary(Operator::Plus, Exp::reg(24), Exp::int(1));
        let b = Exp::binary(Operator::Plus, Exp::reg(24), Exp::int(1));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = Exp::binary(Operator::Plus, Exp::reg(25), Exp::int(1));
        assert_ne!(a, c);
    }

    #[test]
    fn test_subscript_distinguishes_defs() {
        let a = Exp::subscript(Exp::reg(24), Some(StatementId(1)));
        let b = Exp::subscript(Exp::reg(24), Some(StatementId(2)));
        let c = Exp::subscript(Exp::reg(24), None);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.strip_subscripts(), b.strip_subscripts());
    }

    #[test]
    fn test_with_child_shares_untouched_subtrees() {
        let lhs = Exp::reg(24);
        let sum = Exp::binary(Operator::Plus, lhs.clone(), Exp::int(1));
        let new = sum.with_child(1, Exp::int(2));
        // The register child is shared, not cloned
        assert!(Rc::ptr_eq(new.sub1(), &lhs));
        assert_eq!(new.sub2().int_value(), Some(2));
        // Original is unchanged
        assert_eq!(sum.sub2().int_value(), Some(1));
    }

    #[test]
    fn test_wildcard_matching() {
        let e = Exp::mem_of(Exp::binary(Operator::Plus, Exp::reg(28), Exp::int(-4)));
        assert!(e.matches(&Exp::Terminal(Operator::WildMemOf)));
        assert!(!e.matches(&Exp::Terminal(Operator::WildRegOf)));

        let pat = Exp::mem_of(Exp::binary(
            Operator::Plus,
            Exp::terminal(Operator::Wild),
            Exp::terminal(Operator::WildIntConst),
        ));
        assert!(e.matches(&pat));
    }

    #[test]
    fn test_search_and_replace() {
        let e = Exp::binary(
            Operator::Plus,
            Exp::reg(24),
            Exp::binary(Operator::Mult, Exp::reg(24), Exp::int(4)),
        );
        let (replaced, changed) = e.search_and_replace(&Exp::reg(24), &Exp::local("x"));
        assert!(changed);
        assert_eq!(replaced.to_string(), "x + x * 4");
        // Original untouched
        assert_eq!(e.to_string(), "r24 + r24 * 4");
    }

    #[test]
    fn test_list_spine() {
        let l = Exp::list([Exp::int(1), Exp::int(2), Exp::int(3)]);
        assert_eq!(l.oper(), Operator::List);
        assert_eq!(l.sub1().int_value(), Some(1));
        assert_eq!(l.sub2().sub1().int_value(), Some(2));
        assert!(l.sub2().sub2().sub2().is_nil());
    }

    #[test]
    fn test_display() {
        let e = Exp::mem_of(Exp::binary(Operator::Minus, Exp::reg(28), Exp::int(4)));
        assert_eq!(e.to_string(), "m[r28 - 4]");
        let s = Exp::subscript(Exp::reg(24), Some(StatementId(5)));
        assert_eq!(s.to_string(), "r24{5}");
    }
}
