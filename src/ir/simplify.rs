//! Canonicalizing expression simplifier.
//!
//! [`simplify`] rewrites an expression to a canonical equivalent and is
//! referentially transparent: equal inputs produce equal outputs, and
//! `simplify(simplify(e)) == simplify(e)`.
//!
//! Rewrites are applied bottom-up, in priority order:
//!
//! 1. Constant folding for arithmetic, bitwise, comparison and float operators
//! 2. Identity and absorber elements (`x+0`, `x*0`, `x&~0`, `x^x`, ...)
//! 3. Associativity normalization: constants combined and moved to the right
//! 4. Address arithmetic: `a[m[e]]` and `m[a[e]]` collapse to `e`
//! 5. Bitfield reads: `x@[n:m]` with constant bounds becomes shift-and-mask
//! 6. Comparison canonicalization within the same signedness family
//! 7. Power-of-two unsigned division and modulus become shifts and masks
//! 8. Nested identical casts elided, casts of integer constants re-typed
//!
//! Commutative tie-break: with two constants the operator folds; with one
//! constant the constant goes right; otherwise operands are ordered by a
//! stable structural-hash total order.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::ir::{Exp, ExpRewrite, Operator, SharedExp, Value};

/// Simplifies an expression to fixpoint.
///
/// Returns an equivalent expression with canonical operand ordering for
/// commutative operators and all constant folding applied. The input is
/// never mutated; untouched subtrees are shared with the result.
#[must_use]
pub fn simplify(exp: &SharedExp) -> SharedExp {
    let mut current = exp.clone();
    // Each round is a full bottom-up sweep; the rule set shrinks expressions,
    // so this terminates quickly in practice.
    for _ in 0..16 {
        let next = current.map_post(&mut simplify_node);
        if next == current {
            return next;
        }
        current = next;
    }
    current
}

/// Single-node rewrite, assuming the children are already canonical.
fn simplify_node(exp: &SharedExp) -> SharedExp {
    let e = match &**exp {
        Exp::Unary(op, sub) => simplify_unary(exp, *op, sub),
        Exp::Binary(op, lhs, rhs) => simplify_binary(exp, *op, lhs, rhs),
        Exp::Ternary(op, a, b, c) => simplify_ternary(exp, *op, a, b, c),
        Exp::Typed(_, _) => simplify_cast(exp),
        _ => exp.clone(),
    };
    e
}

fn simplify_unary(exp: &SharedExp, op: Operator, sub: &SharedExp) -> SharedExp {
    match op {
        // a[m[e]] == e and m[a[e]] == e
        Operator::AddrOf => match &**sub {
            Exp::Unary(Operator::MemOf, inner) => inner.clone(),
            _ => exp.clone(),
        },
        Operator::MemOf => match &**sub {
            Exp::Unary(Operator::AddrOf, inner) => inner.clone(),
            _ => exp.clone(),
        },

        Operator::Neg => match sub.int_value() {
            Some(v) => Exp::int(wrap32(v.wrapping_neg())),
            None => match &**sub {
                // --x == x
                Exp::Unary(Operator::Neg, inner) => inner.clone(),
                _ => exp.clone(),
            },
        },
        Operator::Not => match sub.int_value() {
            Some(v) => Exp::int(wrap32(!v)),
            None => match &**sub {
                Exp::Unary(Operator::Not, inner) => inner.clone(),
                _ => exp.clone(),
            },
        },
        Operator::LNot => match &**sub {
            // !!x == x
            Exp::Unary(Operator::LNot, inner) => inner.clone(),
            // !(a < b) == a >= b, staying within the signedness family
            Exp::Binary(cmp, a, b) => match cmp.negated_comparison() {
                Some(negated) => Exp::binary(negated, a.clone(), b.clone()),
                None => fold_lnot_const(exp, sub),
            },
            Exp::Terminal(Operator::True) => Exp::terminal(Operator::False),
            Exp::Terminal(Operator::False) => Exp::terminal(Operator::True),
            _ => fold_lnot_const(exp, sub),
        },
        Operator::FNeg => match &**sub {
            Exp::Const(Value::Float(v)) => Exp::flt(-v),
            _ => exp.clone(),
        },
        _ => exp.clone(),
    }
}

fn fold_lnot_const(exp: &SharedExp, sub: &SharedExp) -> SharedExp {
    match sub.int_value() {
        Some(v) => Exp::int(i64::from(v == 0)),
        None => exp.clone(),
    }
}

fn simplify_binary(
    exp: &SharedExp,
    op: Operator,
    lhs: &SharedExp,
    rhs: &SharedExp,
) -> SharedExp {
    // 1. Constant folding
    if let (Some(a), Some(b)) = (lhs.int_value(), rhs.int_value()) {
        if let Some(folded) = fold_int(op, a, b) {
            return folded;
        }
    }
    if let (Exp::Const(Value::Float(a)), Exp::Const(Value::Float(b))) = (&**lhs, &**rhs) {
        if let Some(folded) = fold_float(op, *a, *b) {
            return folded;
        }
    }

    // 2. Identities and absorbers
    if let Some(reduced) = apply_identities(op, lhs, rhs) {
        return reduced;
    }

    // 3. Associativity: (x op c1) op c2 combines the constants; a constant on
    // the left of a commutative operator moves right.
    if op.is_associative() {
        if let Some(c2) = rhs.int_value() {
            if let Exp::Binary(inner_op, x, inner_rhs) = &**lhs {
                if *inner_op == op {
                    if let Some(c1) = inner_rhs.int_value() {
                        if let Some(folded) = fold_int(op, c1, c2) {
                            return Exp::binary(op, x.clone(), folded);
                        }
                    }
                }
            }
        }
        // (x + c1) - c2 and (x - c1) +/- c2 combine as well
    }
    if op == Operator::Minus {
        if let Some(c2) = rhs.int_value() {
            if let Exp::Binary(Operator::Plus, x, inner_rhs) = &**lhs {
                if let Some(c1) = inner_rhs.int_value() {
                    return simplify_node(&Exp::binary(
                        Operator::Plus,
                        x.clone(),
                        Exp::int(wrap32(c1.wrapping_sub(c2))),
                    ));
                }
            }
            if let Exp::Binary(Operator::Minus, x, inner_rhs) = &**lhs {
                if let Some(c1) = inner_rhs.int_value() {
                    return Exp::binary(
                        Operator::Minus,
                        x.clone(),
                        Exp::int(wrap32(c1.wrapping_add(c2))),
                    );
                }
            }
        }
    }

    // 6. `cmp == 0` is the negated comparison; `cmp != 0` is the comparison
    if op == Operator::Equals || op == Operator::NotEqual {
        if rhs.int_value() == Some(0) {
            if let Exp::Binary(cmp, a, b) = &**lhs {
                if let Some(negated) = cmp.negated_comparison() {
                    return if op == Operator::Equals {
                        Exp::binary(negated, a.clone(), b.clone())
                    } else {
                        lhs.clone()
                    };
                }
            }
        }
    }

    // 7. Power-of-two unsigned division and modulus
    if let Some(c) = rhs.int_value() {
        if c > 1 && (c & (c - 1)) == 0 {
            let k = c.trailing_zeros();
            match op {
                Operator::Div => {
                    return Exp::binary(Operator::ShiftR, lhs.clone(), Exp::int(i64::from(k)))
                }
                Operator::Mod => {
                    return Exp::binary(Operator::BitAnd, lhs.clone(), Exp::int(c - 1))
                }
                _ => {}
            }
        }
    }

    // Commutative ordering: constants right, hash order for ties
    if op.is_commutative() {
        let swap = if lhs.is_const() && !rhs.is_const() {
            true
        } else if !lhs.is_const() && !rhs.is_const() {
            stable_hash(lhs) > stable_hash(rhs)
        } else {
            false
        };
        if swap {
            return Exp::binary(op, rhs.clone(), lhs.clone());
        }
    }

    exp.clone()
}

fn simplify_ternary(
    exp: &SharedExp,
    op: Operator,
    a: &SharedExp,
    b: &SharedExp,
    c: &SharedExp,
) -> SharedExp {
    match op {
        // 5. Bitfield read with constant bounds: x@[n:m] == (x >> m) & mask
        Operator::At => {
            if let (Some(n), Some(m)) = (b.int_value(), c.int_value()) {
                if n >= m && n - m < 63 {
                    let mask = (1i64 << (n - m + 1)) - 1;
                    let shifted = if m == 0 {
                        a.clone()
                    } else {
                        Exp::binary(Operator::ShiftR, a.clone(), Exp::int(m))
                    };
                    return Exp::binary(Operator::BitAnd, shifted, Exp::int(mask));
                }
            }
            exp.clone()
        }
        // Constant condition selects a branch
        Operator::Tern => match a.int_value() {
            Some(0) => c.clone(),
            Some(_) => b.clone(),
            None => exp.clone(),
        },
        _ => exp.clone(),
    }
}

/// 8. Nested identical casts collapse; a cast of an integer constant is
/// absorbed into the constant when the target is an integer type.
fn simplify_cast(exp: &SharedExp) -> SharedExp {
    let Exp::Typed(ty, sub) = &**exp else {
        return exp.clone();
    };
    if let Exp::Typed(inner_ty, _) = &**sub {
        if inner_ty == ty {
            return sub.clone();
        }
    }
    // Char-typed constants keep their cast; the back end prints them as
    // character literals
    if ty.resolves_to_integer() && !ty.is_char() && sub.is_int_const() {
        return sub.clone();
    }
    exp.clone()
}

fn apply_identities(op: Operator, lhs: &SharedExp, rhs: &SharedExp) -> Option<SharedExp> {
    let rc = rhs.int_value();
    match op {
        Operator::Plus => {
            if rc == Some(0) {
                return Some(lhs.clone());
            }
            if lhs.int_value() == Some(0) {
                return Some(rhs.clone());
            }
        }
        Operator::Minus => {
            if rc == Some(0) {
                return Some(lhs.clone());
            }
            if lhs == rhs {
                return Some(Exp::int(0));
            }
        }
        Operator::Mult | Operator::Mults => {
            if rc == Some(0) || lhs.int_value() == Some(0) {
                return Some(Exp::int(0));
            }
            if rc == Some(1) {
                return Some(lhs.clone());
            }
            if lhs.int_value() == Some(1) {
                return Some(rhs.clone());
            }
        }
        Operator::Div | Operator::Divs => {
            if rc == Some(1) {
                return Some(lhs.clone());
            }
        }
        Operator::BitAnd => {
            if rc == Some(-1) {
                return Some(lhs.clone());
            }
            if rc == Some(0) {
                return Some(Exp::int(0));
            }
            if lhs == rhs {
                return Some(lhs.clone());
            }
        }
        Operator::BitOr => {
            if rc == Some(0) {
                return Some(lhs.clone());
            }
            if lhs == rhs {
                return Some(lhs.clone());
            }
        }
        Operator::BitXor => {
            if rc == Some(0) {
                return Some(lhs.clone());
            }
            if lhs == rhs {
                return Some(Exp::int(0));
            }
        }
        Operator::ShiftL | Operator::ShiftR | Operator::ShiftRA => {
            if rc == Some(0) {
                return Some(lhs.clone());
            }
        }
        Operator::And => {
            if matches!(&**rhs, Exp::Terminal(Operator::True)) {
                return Some(lhs.clone());
            }
            if matches!(&**rhs, Exp::Terminal(Operator::False)) {
                return Some(Exp::terminal(Operator::False));
            }
            if matches!(&**lhs, Exp::Terminal(Operator::True)) {
                return Some(rhs.clone());
            }
            if matches!(&**lhs, Exp::Terminal(Operator::False)) {
                return Some(Exp::terminal(Operator::False));
            }
        }
        Operator::Or => {
            if matches!(&**rhs, Exp::Terminal(Operator::False)) {
                return Some(lhs.clone());
            }
            if matches!(&**rhs, Exp::Terminal(Operator::True)) {
                return Some(Exp::terminal(Operator::True));
            }
            if matches!(&**lhs, Exp::Terminal(Operator::False)) {
                return Some(rhs.clone());
            }
            if matches!(&**lhs, Exp::Terminal(Operator::True)) {
                return Some(Exp::terminal(Operator::True));
            }
        }
        _ => {}
    }
    None
}

/// Folds an integer binary operation, with 32-bit wrapping semantics for the
/// arithmetic operators. Returns `None` for undefined results (division by
/// zero) and non-foldable operators.
fn fold_int(op: Operator, a: i64, b: i64) -> Option<SharedExp> {
    let v = match op {
        Operator::Plus => wrap32(a.wrapping_add(b)),
        Operator::Minus => wrap32(a.wrapping_sub(b)),
        Operator::Mult | Operator::Mults => wrap32(a.wrapping_mul(b)),
        Operator::Divs => {
            if b == 0 {
                return None;
            }
            wrap32(a.wrapping_div(b))
        }
        Operator::Div => {
            if b == 0 {
                return None;
            }
            wrap32(((a as u32 as u64) / (b as u32 as u64)) as i64)
        }
        Operator::Mods => {
            if b == 0 {
                return None;
            }
            wrap32(a.wrapping_rem(b))
        }
        Operator::Mod => {
            if b == 0 {
                return None;
            }
            wrap32(((a as u32 as u64) % (b as u32 as u64)) as i64)
        }
        Operator::BitAnd => wrap32(a & b),
        Operator::BitOr => wrap32(a | b),
        Operator::BitXor => wrap32(a ^ b),
        Operator::ShiftL => wrap32((a as u32).wrapping_shl(b as u32) as i64),
        Operator::ShiftR => wrap32(i64::from((a as u32).wrapping_shr(b as u32))),
        Operator::ShiftRA => wrap32(i64::from((a as i32).wrapping_shr(b as u32))),
        Operator::Equals => i64::from(a == b),
        Operator::NotEqual => i64::from(a != b),
        Operator::Less => i64::from(a < b),
        Operator::Gtr => i64::from(a > b),
        Operator::LessEq => i64::from(a <= b),
        Operator::GtrEq => i64::from(a >= b),
        Operator::LessUns => i64::from((a as u32) < (b as u32)),
        Operator::GtrUns => i64::from((a as u32) > (b as u32)),
        Operator::LessEqUns => i64::from((a as u32) <= (b as u32)),
        Operator::GtrEqUns => i64::from((a as u32) >= (b as u32)),
        _ => return None,
    };
    Some(Exp::int(v))
}

fn fold_float(op: Operator, a: f64, b: f64) -> Option<SharedExp> {
    let v = match op {
        Operator::FPlus | Operator::FPlusD | Operator::FPlusQ => a + b,
        Operator::FMinus | Operator::FMinusD | Operator::FMinusQ => a - b,
        Operator::FMult | Operator::FMultD | Operator::FMultQ => a * b,
        Operator::FDiv | Operator::FDivD | Operator::FDivQ => {
            if b == 0.0 {
                return None;
            }
            a / b
        }
        _ => return None,
    };
    Some(Exp::flt(v))
}

/// Sign-extended 32-bit wrap, the machine-int model of the IR.
fn wrap32(v: i64) -> i64 {
    i64::from(v as i32)
}

/// Deterministic structural hash for the commutative tie-break.
fn stable_hash(e: &SharedExp) -> u64 {
    let mut hasher = FxHasher::default();
    e.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn reg(n: u16) -> SharedExp {
        Exp::reg(n)
    }

    #[test]
    fn test_constant_folding() {
        let e = Exp::binary(Operator::Plus, Exp::int(30), Exp::int(12));
        assert_eq!(simplify(&e).int_value(), Some(42));

        let e = Exp::binary(Operator::Mult, Exp::int(-3), Exp::int(5));
        assert_eq!(simplify(&e).int_value(), Some(-15));

        let e = Exp::binary(Operator::LessUns, Exp::int(-1), Exp::int(1));
        assert_eq!(simplify(&e).int_value(), Some(0));

        let e = Exp::binary(Operator::Less, Exp::int(-1), Exp::int(1));
        assert_eq!(simplify(&e).int_value(), Some(1));
    }

    #[test]
    fn test_division_by_zero_not_folded() {
        let e = Exp::binary(Operator::Divs, Exp::int(1), Exp::int(0));
        assert_eq!(simplify(&e), e);
    }

    #[test]
    fn test_identities() {
        let x = reg(24);
        assert_eq!(
            simplify(&Exp::binary(Operator::Plus, x.clone(), Exp::int(0))),
            x
        );
        assert_eq!(
            simplify(&Exp::binary(Operator::Mult, x.clone(), Exp::int(0))).int_value(),
            Some(0)
        );
        assert_eq!(
            simplify(&Exp::binary(Operator::Mult, x.clone(), Exp::int(1))),
            x
        );
        assert_eq!(
            simplify(&Exp::binary(Operator::BitXor, x.clone(), x.clone())).int_value(),
            Some(0)
        );
        assert_eq!(
            simplify(&Exp::binary(Operator::Minus, x.clone(), x.clone())).int_value(),
            Some(0)
        );
        assert_eq!(
            simplify(&Exp::binary(Operator::BitAnd, x.clone(), Exp::int(-1))),
            x
        );
    }

    #[test]
    fn test_constants_move_right_and_combine() {
        let x = reg(24);
        let e = Exp::binary(Operator::Plus, Exp::int(3), x.clone());
        let s = simplify(&e);
        assert_eq!(s, Exp::binary(Operator::Plus, x.clone(), Exp::int(3)));

        // (x + 3) + 4 == x + 7
        let e = Exp::binary(
            Operator::Plus,
            Exp::binary(Operator::Plus, x.clone(), Exp::int(3)),
            Exp::int(4),
        );
        assert_eq!(simplify(&e), Exp::binary(Operator::Plus, x, Exp::int(7)));
    }

    #[test]
    fn test_plus_minus_chains_combine() {
        let x = reg(28);
        // (x + 8) - 4 == x + 4
        let e = Exp::binary(
            Operator::Minus,
            Exp::binary(Operator::Plus, x.clone(), Exp::int(8)),
            Exp::int(4),
        );
        assert_eq!(
            simplify(&e),
            Exp::binary(Operator::Plus, x.clone(), Exp::int(4))
        );
        // (x - 8) - 4 == x - 12
        let e = Exp::binary(
            Operator::Minus,
            Exp::binary(Operator::Minus, x.clone(), Exp::int(8)),
            Exp::int(4),
        );
        assert_eq!(simplify(&e), Exp::binary(Operator::Minus, x, Exp::int(12)));
    }

    #[test]
    fn test_address_arithmetic() {
        let x = reg(28);
        assert_eq!(simplify(&Exp::addr_of(Exp::mem_of(x.clone()))), x);
        assert_eq!(simplify(&Exp::mem_of(Exp::addr_of(x.clone()))), x);
    }

    #[test]
    fn test_bitfield_collapse() {
        // x@[7:4] == (x >> 4) & 0xf
        let e = Exp::ternary(Operator::At, reg(24), Exp::int(7), Exp::int(4));
        let s = simplify(&e);
        assert_eq!(
            s,
            Exp::binary(
                Operator::BitAnd,
                Exp::binary(Operator::ShiftR, reg(24), Exp::int(4)),
                Exp::int(0xf),
            )
        );

        // Low bitfield needs no shift: x@[3:0] == x & 0xf
        let e = Exp::ternary(Operator::At, reg(24), Exp::int(3), Exp::int(0));
        assert_eq!(
            simplify(&e),
            Exp::binary(Operator::BitAnd, reg(24), Exp::int(0xf))
        );
    }

    #[test]
    fn test_comparison_negation_keeps_signedness() {
        let cmp = Exp::binary(Operator::LessUns, reg(24), reg(25));
        let e = Exp::unary(Operator::LNot, cmp);
        assert_eq!(
            simplify(&e),
            Exp::binary(Operator::GtrEqUns, reg(24), reg(25))
        );
    }

    #[test]
    fn test_unsigned_power_of_two_division() {
        let e = Exp::binary(Operator::Div, reg(24), Exp::int(8));
        assert_eq!(
            simplify(&e),
            Exp::binary(Operator::ShiftR, reg(24), Exp::int(3))
        );
        // Signed division is not a plain shift
        let e = Exp::binary(Operator::Divs, reg(24), Exp::int(8));
        assert_eq!(simplify(&e), e);
    }

    #[test]
    fn test_cast_collapse() {
        use crate::ir::Type;
        let inner = Exp::typed(Type::int(), reg(24));
        let e = Exp::typed(Type::int(), inner.clone());
        assert_eq!(simplify(&e), inner);

        let e = Exp::typed(Type::int(), Exp::int(7));
        assert_eq!(simplify(&e).int_value(), Some(7));
    }

    #[test]
    fn test_idempotence() {
        let exprs = [
            Exp::binary(
                Operator::Plus,
                Exp::binary(Operator::Mult, reg(24), Exp::int(4)),
                Exp::binary(Operator::Plus, Exp::int(3), reg(25)),
            ),
            Exp::ternary(Operator::At, reg(24), Exp::int(15), Exp::int(8)),
            Exp::unary(
                Operator::LNot,
                Exp::binary(Operator::GtrEq, reg(24), Exp::int(10)),
            ),
            Exp::mem_of(Exp::binary(Operator::Minus, reg(28), Exp::int(4))),
        ];
        for e in exprs {
            let once = simplify(&e);
            let twice = simplify(&once);
            assert_eq!(once, twice, "not idempotent for {e}");
        }
    }

    #[test]
    fn test_untouched_subtrees_shared() {
        let addr = Exp::binary(Operator::Minus, reg(28), Exp::int(4));
        let e = Exp::binary(
            Operator::Plus,
            Exp::mem_of(addr.clone()),
            Exp::binary(Operator::Plus, Exp::int(1), Exp::int(2)),
        );
        let s = simplify(&e);
        // The memof side did not change and is shared with the input
        assert!(Rc::ptr_eq(s.sub1().sub1(), &addr));
        assert_eq!(s.sub2().int_value(), Some(3));
    }
}
