//! The statement algebra.
//!
//! A [`Statement`] is a uniquely numbered IR operation inside an RTL: an
//! assignment, a phi, a branch, a call, a return, or a switch dispatch. Every
//! statement belongs to exactly one RTL and thus to exactly one basic block.
//!
//! Statements expose a uniform rewriting surface: [`Statement::uses`] and
//! [`Statement::defines`] for dataflow queries, [`Statement::map_uses`] for
//! SSA rename and propagation, [`Statement::search_and_replace`] for symbol
//! mapping, and [`Statement::simplify`] for expression canonicalization
//! (including the read-modify-write lowering of bitfield stores).

use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::analysis::cfg::BlockId;
use crate::ir::{simplify, Address, Exp, ExpRewrite, Operator, SharedExp, StatementId, Type};
use crate::program::ProcId;

/// An ordinary assignment `lhs := rhs` with a type annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    /// Type of the assigned value.
    pub ty: Type,
    /// Destination location.
    pub lhs: SharedExp,
    /// Source expression.
    pub rhs: SharedExp,
}

impl Assign {
    /// New assignment with an untyped (`Void`) annotation.
    #[must_use]
    pub fn new(lhs: SharedExp, rhs: SharedExp) -> Assign {
        Assign {
            ty: Type::Void,
            lhs,
            rhs,
        }
    }
}

/// An SSA phi: one incoming definition per predecessor block.
///
/// `None` incomings refer to the implicit definition (the location's value on
/// procedure entry). Removing a predecessor edge removes its incoming.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiAssign {
    /// The location being merged.
    pub lhs: SharedExp,
    /// Reaching definition per predecessor block.
    pub incoming: BTreeMap<BlockId, Option<StatementId>>,
}

/// A definition with no right-hand side: the location's value on entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplicitAssign {
    /// The location defined on entry.
    pub lhs: SharedExp,
}

/// A conditional branch terminating a two-way block.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchStatement {
    /// Branch condition; `None` until branch analysis recovers it.
    pub cond: Option<SharedExp>,
    /// Address of the taken target.
    pub dest: Address,
}

/// An unconditional jump. A non-constant destination makes the containing
/// block a computed jump until indirect-transfer recovery resolves it.
#[derive(Debug, Clone, PartialEq)]
pub struct GotoStatement {
    /// Jump destination expression.
    pub dest: SharedExp,
}

/// A call, direct or computed.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStatement {
    /// Destination expression (a constant address for direct calls).
    pub dest: SharedExp,
    /// The resolved callee, when known.
    pub dest_proc: Option<ProcId>,
    /// Arguments as `param-location := actual` assignments.
    pub args: Vec<Assign>,
    /// Locations this call defines (from the callee's modifieds or the ABI).
    pub defines: Vec<(Type, SharedExp)>,
    /// Id of the callee's return statement once the callee is analyzed;
    /// `None` means the call is treated as childless.
    pub callee_return: Option<StatementId>,
    /// Reaching definitions at the call site, captured during SSA rename.
    /// Call bypassing reads preserved locations out of this map.
    pub collector: FxHashMap<SharedExp, Option<StatementId>>,
}

impl CallStatement {
    /// New call to the given destination with no arguments or defines yet.
    #[must_use]
    pub fn new(dest: SharedExp) -> CallStatement {
        CallStatement {
            dest,
            dest_proc: None,
            args: Vec::new(),
            defines: Vec::new(),
            callee_return: None,
            collector: FxHashMap::default(),
        }
    }

    /// Whether the destination is computed rather than a constant address.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.dest.addr_value().is_none() && !matches!(&*self.dest, Exp::Const(_))
    }
}

/// The single return statement of a procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    /// Locations modified by the procedure (preserveds already subtracted).
    pub modifieds: Vec<(Type, SharedExp)>,
    /// Returned values as `location := value` assignments, parallel to a
    /// prefix of `modifieds`.
    pub returns: Vec<Assign>,
    /// Reaching definitions at the return, captured during SSA rename.
    pub collector: FxHashMap<SharedExp, Option<StatementId>>,
}

impl ReturnStatement {
    /// New empty return.
    #[must_use]
    pub fn new() -> ReturnStatement {
        ReturnStatement {
            modifieds: Vec::new(),
            returns: Vec::new(),
            collector: FxHashMap::default(),
        }
    }
}

impl Default for ReturnStatement {
    fn default() -> Self {
        Self::new()
    }
}

/// How a recovered switch table maps indices to targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    /// Table of target addresses indexed linearly from `lower`.
    Uniform,
    /// Table of offsets added to the table base.
    Offset,
    /// Fortran-style table whose entries are the case values themselves.
    Fortran,
}

/// Description of a recovered switch, attached to the `Case` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchInfo {
    /// The switched expression.
    pub exp: SharedExp,
    /// Table layout.
    pub kind: SwitchKind,
    /// Address of the jump table.
    pub table_addr: Address,
    /// Lowest case value.
    pub lower: i64,
    /// Highest case value.
    pub upper: i64,
    /// Number of table entries.
    pub num_cases: usize,
    /// Decoded absolute target per case, in index order.
    pub targets: Vec<Address>,
    /// Default target, if the guard branch provides one.
    pub default: Option<Address>,
}

/// A multi-way dispatch terminating an n-way block.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseStatement {
    /// The original computed destination.
    pub dest: SharedExp,
    /// Recovered table description; `None` while the jump is still opaque.
    pub info: Option<SwitchInfo>,
}

/// The statement kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `lhs := rhs`
    Assign(Assign),
    /// SSA phi
    PhiAssign(PhiAssign),
    /// Definition on entry
    ImplicitAssign(ImplicitAssign),
    /// Conditional branch
    Branch(BranchStatement),
    /// Unconditional or computed jump
    Goto(GotoStatement),
    /// Call
    Call(CallStatement),
    /// Procedure return
    Return(ReturnStatement),
    /// Switch dispatch
    Case(CaseStatement),
}

/// A uniquely numbered statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Unique, monotonically assigned id.
    pub id: StatementId,
    /// The operation.
    pub kind: StatementKind,
}

impl Statement {
    /// Wraps a kind with the given id.
    #[must_use]
    pub fn new(id: StatementId, kind: StatementKind) -> Statement {
        Statement { id, kind }
    }

    /// Whether this is a phi.
    #[must_use]
    pub fn is_phi(&self) -> bool {
        matches!(self.kind, StatementKind::PhiAssign(_))
    }

    /// Whether this is a call.
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self.kind, StatementKind::Call(_))
    }

    /// Whether this is a return.
    #[must_use]
    pub fn is_return(&self) -> bool {
        matches!(self.kind, StatementKind::Return(_))
    }

    /// Whether this is a recovered high-level indirect control transfer
    /// (a `Case` with switch info, or a computed call).
    #[must_use]
    pub fn is_hl_transfer(&self) -> bool {
        match &self.kind {
            StatementKind::Case(c) => c.info.is_some(),
            StatementKind::Call(c) => c.is_computed(),
            _ => false,
        }
    }

    /// The locations this statement defines.
    #[must_use]
    pub fn defines(&self) -> Vec<SharedExp> {
        match &self.kind {
            StatementKind::Assign(a) => vec![a.lhs.clone()],
            StatementKind::PhiAssign(p) => vec![p.lhs.clone()],
            StatementKind::ImplicitAssign(i) => vec![i.lhs.clone()],
            StatementKind::Call(c) => c.defines.iter().map(|(_, e)| e.clone()).collect(),
            StatementKind::Return(r) => r.modifieds.iter().map(|(_, e)| e.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// All SSA subscripts appearing in use positions.
    #[must_use]
    pub fn uses(&self) -> Vec<SharedExp> {
        let mut result = Vec::new();
        self.for_each_use(&mut |e| {
            e.visit_pre(&mut |sub| {
                if sub.is_subscript() {
                    result.push(sub.clone());
                }
                true
            });
        });
        result
    }

    /// Visits each expression in a use position.
    ///
    /// For assignments whose destination is a memory location, the address
    /// computation inside the destination counts as a use.
    pub fn for_each_use(&self, f: &mut impl FnMut(&SharedExp)) {
        let lhs_address_use = |lhs: &SharedExp, f: &mut dyn FnMut(&SharedExp)| {
            if let Exp::Unary(Operator::MemOf, addr) = &**lhs {
                f(addr);
            }
        };
        match &self.kind {
            StatementKind::Assign(a) => {
                f(&a.rhs);
                lhs_address_use(&a.lhs, f);
            }
            StatementKind::PhiAssign(p) => lhs_address_use(&p.lhs, f),
            StatementKind::ImplicitAssign(_) => {}
            StatementKind::Branch(b) => {
                if let Some(cond) = &b.cond {
                    f(cond);
                }
            }
            StatementKind::Goto(g) => f(&g.dest),
            StatementKind::Call(c) => {
                if c.is_computed() {
                    f(&c.dest);
                }
                for arg in &c.args {
                    f(&arg.rhs);
                }
            }
            StatementKind::Return(r) => {
                for ret in &r.returns {
                    f(&ret.rhs);
                }
            }
            StatementKind::Case(c) => {
                f(&c.dest);
                if let Some(info) = &c.info {
                    f(&info.exp);
                }
            }
        }
    }

    /// Rewrites each expression in a use position through `f`.
    ///
    /// Returns whether anything changed. This is the workhorse of SSA rename
    /// and statement propagation.
    pub fn map_uses(&mut self, f: &mut impl FnMut(&SharedExp) -> SharedExp) -> bool {
        fn apply(
            slot: &mut SharedExp,
            f: &mut impl FnMut(&SharedExp) -> SharedExp,
            changed: &mut bool,
        ) {
            let new = f(slot);
            if new != *slot {
                *slot = new;
                *changed = true;
            }
        }
        // The address inside a memory-destination is a use even though the
        // destination itself is a definition.
        fn apply_lhs_address(
            lhs: &mut SharedExp,
            f: &mut impl FnMut(&SharedExp) -> SharedExp,
            changed: &mut bool,
        ) {
            if let Exp::Unary(Operator::MemOf, addr) = &**lhs {
                let new_addr = f(addr);
                if new_addr != *addr {
                    *lhs = Exp::mem_of(new_addr);
                    *changed = true;
                }
            }
        }

        let mut changed = false;
        match &mut self.kind {
            StatementKind::Assign(a) => {
                apply(&mut a.rhs, f, &mut changed);
                apply_lhs_address(&mut a.lhs, f, &mut changed);
            }
            StatementKind::PhiAssign(p) => apply_lhs_address(&mut p.lhs, f, &mut changed),
            StatementKind::ImplicitAssign(_) => {}
            StatementKind::Branch(b) => {
                if let Some(cond) = &mut b.cond {
                    apply(cond, f, &mut changed);
                }
            }
            StatementKind::Goto(g) => apply(&mut g.dest, f, &mut changed),
            StatementKind::Call(c) => {
                if c.is_computed() {
                    apply(&mut c.dest, f, &mut changed);
                }
                for arg in &mut c.args {
                    apply(&mut arg.rhs, f, &mut changed);
                }
            }
            StatementKind::Return(r) => {
                for ret in &mut r.returns {
                    apply(&mut ret.rhs, f, &mut changed);
                }
            }
            StatementKind::Case(c) => {
                apply(&mut c.dest, f, &mut changed);
                if let Some(info) = &mut c.info {
                    apply(&mut info.exp, f, &mut changed);
                }
            }
        }
        changed
    }

    /// Inlines the definition `def_id := rhs` into this statement's uses.
    ///
    /// Every use `loc{def_id}` becomes `rhs`; the statement is simplified
    /// afterwards. Returns whether anything was propagated.
    pub fn propagate_to(&mut self, def_id: StatementId, rhs: &SharedExp) -> bool {
        let changed = self.map_uses(&mut |e| {
            e.map_post(&mut |sub| match &**sub {
                Exp::Subscript(_, Some(d)) if *d == def_id => rhs.clone(),
                _ => sub.clone(),
            })
        });
        if changed {
            self.simplify();
        }
        changed
    }

    /// Replaces every subexpression matching `pattern` with `replacement`, in
    /// both use and definition positions. Returns whether anything changed.
    pub fn search_and_replace(&mut self, pattern: &Exp, replacement: &SharedExp) -> bool {
        let mut changed = self.map_uses(&mut |e| e.search_and_replace(pattern, replacement).0);
        let mut replace_def = |slot: &mut SharedExp| {
            let (new, ch) = slot.search_and_replace(pattern, replacement);
            if ch {
                *slot = new;
                changed = true;
            }
        };
        match &mut self.kind {
            StatementKind::Assign(a) => replace_def(&mut a.lhs),
            StatementKind::PhiAssign(p) => replace_def(&mut p.lhs),
            StatementKind::ImplicitAssign(i) => replace_def(&mut i.lhs),
            StatementKind::Call(c) => {
                for (_, d) in &mut c.defines {
                    replace_def(d);
                }
            }
            StatementKind::Return(r) => {
                for (_, m) in &mut r.modifieds {
                    replace_def(m);
                }
                for ret in &mut r.returns {
                    replace_def(&mut ret.lhs);
                }
            }
            _ => {}
        }
        changed
    }

    /// Canonicalizes every expression in this statement.
    ///
    /// An assignment to a bitfield `x@[n:m] := rhs` with constant bounds is
    /// lowered here to the read-modify-write form
    /// `x := (x & ~(mask << m)) | ((rhs & mask) << m)`.
    pub fn simplify(&mut self) -> bool {
        let mut changed = self.map_uses(&mut |e| simplify(e));

        if let StatementKind::Assign(a) = &mut self.kind {
            if let Exp::Ternary(Operator::At, base, n, m) = &*a.lhs.clone() {
                if let (Some(n), Some(m)) = (n.int_value(), m.int_value()) {
                    if n >= m && n - m < 63 {
                        let mask = (1i64 << (n - m + 1)) - 1;
                        let keep = Exp::binary(
                            Operator::BitAnd,
                            base.clone(),
                            Exp::int(!(mask << m) as i32 as i64),
                        );
                        let insert = Exp::binary(
                            Operator::ShiftL,
                            Exp::binary(Operator::BitAnd, a.rhs.clone(), Exp::int(mask)),
                            Exp::int(m),
                        );
                        a.lhs = base.clone();
                        a.rhs = simplify(&Exp::binary(Operator::BitOr, keep, insert));
                        changed = true;
                    }
                }
            }
            let s = simplify(&a.rhs);
            if s != a.rhs {
                a.rhs = s;
                changed = true;
            }
        }
        changed
    }
}

impl fmt::Display for Statement {
    /// RTL-style diagnostic rendering: `12 r24 := r24{11} + 1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4} ", self.id)?;
        match &self.kind {
            StatementKind::Assign(a) => write!(f, "{} := {}", a.lhs, a.rhs),
            StatementKind::PhiAssign(p) => {
                write!(f, "{} := phi(", p.lhs)?;
                let mut first = true;
                for (bb, def) in &p.incoming {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    match def {
                        Some(d) => write!(f, "{bb}:{d}")?,
                        None => write!(f, "{bb}:-")?,
                    }
                }
                write!(f, ")")
            }
            StatementKind::ImplicitAssign(i) => write!(f, "{} := -", i.lhs),
            StatementKind::Branch(b) => match &b.cond {
                Some(cond) => write!(f, "BRANCH {} if {}", b.dest, cond),
                None => write!(f, "BRANCH {}", b.dest),
            },
            StatementKind::Goto(g) => write!(f, "GOTO {}", g.dest),
            StatementKind::Call(c) => {
                write!(f, "CALL {}(", c.dest)?;
                for (i, arg) in c.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg.rhs)?;
                }
                write!(f, ")")
            }
            StatementKind::Return(r) => {
                write!(f, "RET")?;
                for (i, ret) in r.returns.iter().enumerate() {
                    write!(f, "{} {} := {}", if i > 0 { "," } else { "" }, ret.lhs, ret.rhs)?;
                }
                Ok(())
            }
            StatementKind::Case(c) => write!(f, "CASE {}", c.dest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assign(id: u32, lhs: SharedExp, rhs: SharedExp) -> Statement {
        Statement::new(StatementId(id), StatementKind::Assign(Assign::new(lhs, rhs)))
    }

    #[test]
    fn test_defines_and_uses() {
        let mut s = assign(
            1,
            Exp::reg(24),
            Exp::binary(
                Operator::Plus,
                Exp::subscript(Exp::reg(24), Some(StatementId(0))),
                Exp::int(1),
            ),
        );
        assert_eq!(s.defines(), vec![Exp::reg(24)]);
        let uses = s.uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0], Exp::subscript(Exp::reg(24), Some(StatementId(0))));
        assert!(!s.simplify());
    }

    #[test]
    fn test_memof_lhs_address_is_a_use() {
        let s = assign(
            2,
            Exp::mem_of(Exp::subscript(Exp::reg(28), Some(StatementId(1)))),
            Exp::int(0),
        );
        let uses = s.uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0], Exp::subscript(Exp::reg(28), Some(StatementId(1))));
    }

    #[test]
    fn test_propagate_to() {
        let mut s = assign(
            3,
            Exp::reg(25),
            Exp::binary(
                Operator::Plus,
                Exp::subscript(Exp::reg(24), Some(StatementId(1))),
                Exp::int(2),
            ),
        );
        let rhs = Exp::binary(
            Operator::Plus,
            Exp::subscript(Exp::reg(24), None),
            Exp::int(3),
        );
        assert!(s.propagate_to(StatementId(1), &rhs));
        if let StatementKind::Assign(a) = &s.kind {
            // (r24{-} + 3) + 2 simplifies to r24{-} + 5
            assert_eq!(
                a.rhs,
                Exp::binary(
                    Operator::Plus,
                    Exp::subscript(Exp::reg(24), None),
                    Exp::int(5)
                )
            );
        } else {
            panic!("not an assign");
        }
    }

    #[test]
    fn test_bitfield_store_lowering() {
        // r24@[7:4] := 3  becomes  r24 := r24 & ~0xf0 | (3 & 0xf) << 4
        let mut s = assign(
            4,
            Exp::ternary(Operator::At, Exp::reg(24), Exp::int(7), Exp::int(4)),
            Exp::int(3),
        );
        assert!(s.simplify());
        if let StatementKind::Assign(a) = &s.kind {
            assert_eq!(a.lhs, Exp::reg(24));
            assert_eq!(
                a.rhs,
                Exp::binary(
                    Operator::BitOr,
                    Exp::binary(Operator::BitAnd, Exp::reg(24), Exp::int(-241)),
                    Exp::int(0x30),
                )
            );
        } else {
            panic!("not an assign");
        }
    }

    #[test]
    fn test_bitfield_write_then_read_round_trip() {
        // Writing v into x@[n:m] and reading the field back yields
        // v & ((1 << (n-m+1)) - 1), for any starting x
        for (n, m, v, x) in [
            (7i64, 4i64, 3i64, 0i64),
            (7, 4, 0x1f, -1),
            (15, 8, 0xab, 0x1234),
            (3, 0, 9, 0x7777),
            (31, 16, 0xdead, 0),
        ] {
            let mut store = assign(
                1,
                Exp::ternary(Operator::At, Exp::reg(24), Exp::int(n), Exp::int(m)),
                Exp::int(v),
            );
            store.simplify();
            let StatementKind::Assign(a) = &store.kind else {
                panic!("store did not stay an assign");
            };
            assert_eq!(a.lhs, Exp::reg(24));

            // Evaluate the new value of x, then the field read
            let (new_x, _) = a.rhs.search_and_replace(&Exp::reg(24), &Exp::int(x));
            let new_x = simplify(&new_x);
            let read = simplify(&Exp::ternary(
                Operator::At,
                new_x,
                Exp::int(n),
                Exp::int(m),
            ));
            let mask = (1i64 << (n - m + 1)) - 1;
            assert_eq!(
                read.int_value(),
                Some(v & mask),
                "field [{n}:{m}] write {v} over {x}"
            );
        }
    }

    #[test]
    fn test_phi_incoming_per_predecessor() {
        let mut incoming = BTreeMap::new();
        incoming.insert(BlockId::new(0), Some(StatementId(5)));
        incoming.insert(BlockId::new(2), None);
        let s = Statement::new(
            StatementId(9),
            StatementKind::PhiAssign(PhiAssign {
                lhs: Exp::reg(24),
                incoming,
            }),
        );
        assert_eq!(s.defines(), vec![Exp::reg(24)]);
        assert_eq!(s.to_string().trim_start(), "9 r24 := phi(bb0:5, bb2:-)");
    }
}
