//! Local type analysis.
//!
//! A bidirectional sweep over one procedure: evidence flows up from operator
//! shapes (float arithmetic, unsigned comparisons, memory addressing) and
//! down from assignment annotations, meeting into one type per location.
//! Results land on the assignment annotations, the locals map, and the
//! parameter list.

use rustc_hash::FxHashMap;

use crate::ir::{Exp, ExpRewrite, Operator, SharedExp, Sign, StatementKind, Type};
use crate::passes::{Pass, PassContext, PassId};
use crate::Result;

/// Evidence the sweep gathers per location.
#[derive(Default)]
struct Evidence {
    types: FxHashMap<SharedExp, Type>,
}

impl Evidence {
    fn observe(&mut self, loc: &SharedExp, ty: Type) {
        if ty == Type::Void {
            return;
        }
        let key = loc.strip_subscripts();
        let merged = match self.types.get(&key) {
            Some(existing) => existing.meet(&ty),
            None => ty,
        };
        // An incompatible meet is a diagnostic, not evidence; keep the older
        // observation in that case
        if merged != Type::Void {
            self.types.insert(key, merged);
        }
    }
}

/// The type an expression computes, bottom-up, recording location evidence
/// along the way.
fn infer(e: &SharedExp, ev: &mut Evidence) -> Type {
    match &**e {
        Exp::Const(crate::ir::Value::Int(_)) => Type::integer(32),
        Exp::Const(crate::ir::Value::Long(_)) => Type::integer(64),
        Exp::Const(crate::ir::Value::Float(_)) => Type::Float { size: 64 },
        Exp::Const(crate::ir::Value::Str(_)) => Type::Pointer(Box::new(Type::Integer {
            size: 8,
            sign: Sign::Signed,
        })),
        Exp::Const(_) | Exp::Terminal(_) => Type::Void,
        Exp::Subscript(base, _) => infer(base, ev),
        Exp::Typed(ty, sub) => {
            let _ = infer(sub, ev);
            ty.clone()
        }
        Exp::Unary(op, sub) => match op {
            Operator::MemOf => {
                // The address computes a pointer
                let _ = infer(sub, ev);
                if sub.is_subscript() || sub.is_reg_of() {
                    ev.observe(sub, Type::Pointer(Box::new(Type::Size(32))));
                }
                Type::Size(32)
            }
            Operator::AddrOf => {
                let pointee = infer(sub, ev);
                Type::Pointer(Box::new(pointee))
            }
            Operator::RegOf | Operator::Temp => Type::integer(32),
            Operator::Neg | Operator::Not => infer(sub, ev),
            Operator::LNot => Type::int(),
            Operator::FNeg | Operator::Fabs | Operator::Sqrt => {
                let t = infer(sub, ev);
                ev.observe(sub, Type::Float { size: 64 });
                if t.resolves_to_float() {
                    t
                } else {
                    Type::Float { size: 64 }
                }
            }
            _ => {
                let _ = infer(sub, ev);
                Type::Void
            }
        },
        Exp::Binary(op, lhs, rhs) => {
            let lt = infer(lhs, ev);
            let rt = infer(rhs, ev);
            if op.is_float() {
                ev.observe(lhs, Type::Float { size: 64 });
                ev.observe(rhs, Type::Float { size: 64 });
                return Type::Float { size: 64 };
            }
            if op.is_comparison() {
                let sign = if op.is_unsigned_comparison() {
                    Sign::Unsigned
                } else if matches!(op, Operator::Equals | Operator::NotEqual) {
                    Sign::Unknown
                } else {
                    Sign::Signed
                };
                let operand_ty = Type::Integer { size: 32, sign };
                ev.observe(lhs, operand_ty.clone());
                ev.observe(rhs, operand_ty);
                return Type::int();
            }
            match op {
                Operator::Plus | Operator::Minus => {
                    // Pointer arithmetic keeps the pointer type
                    if lt.resolves_to_pointer() {
                        lt
                    } else if rt.resolves_to_pointer() {
                        rt
                    } else {
                        lt.meet(&rt)
                    }
                }
                Operator::Div | Operator::Mod | Operator::ShiftR => {
                    ev.observe(
                        lhs,
                        Type::Integer {
                            size: 32,
                            sign: Sign::Unsigned,
                        },
                    );
                    Type::Integer {
                        size: 32,
                        sign: Sign::Unsigned,
                    }
                }
                Operator::Divs | Operator::Mods | Operator::ShiftRA | Operator::Mults => {
                    ev.observe(
                        lhs,
                        Type::Integer {
                            size: 32,
                            sign: Sign::Signed,
                        },
                    );
                    Type::Integer {
                        size: 32,
                        sign: Sign::Signed,
                    }
                }
                _ => lt.meet(&rt),
            }
        }
        Exp::Ternary(op, _, b, c) => match op {
            Operator::Tern => {
                let bt = infer(b, ev);
                let ct = infer(c, ev);
                bt.meet(&ct)
            }
            Operator::Itof | Operator::Fsize => Type::Float { size: 64 },
            Operator::Ftoi => Type::int(),
            _ => Type::Void,
        },
    }
}

/// Per-procedure type inference.
pub struct LocalTypeAnalysisPass;

impl Pass for LocalTypeAnalysisPass {
    fn id(&self) -> PassId {
        PassId::LocalTypeAnalysis
    }

    fn name(&self) -> &'static str {
        "LocalTypeAnalysis"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let mut ev = Evidence::default();

        // Gather evidence from every expression in the procedure
        let mut rhs_types: FxHashMap<crate::ir::StatementId, Type> = FxHashMap::default();
        ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
            stmt.for_each_use(&mut |e| {
                let _ = infer(e, &mut ev);
            });
            if let StatementKind::Assign(a) = &stmt.kind {
                let ty = infer(&a.rhs, &mut ev);
                if ty != Type::Void {
                    ev.observe(&a.lhs, ty.clone());
                    rhs_types.insert(stmt.id, ty);
                }
                if a.ty != Type::Void {
                    ev.observe(&a.lhs, a.ty.clone());
                }
            }
        });

        // Write the settled types back onto untyped assignments
        let mut changed = false;
        let types = std::mem::take(&mut ev.types);
        ctx.proc.cfg.for_each_statement_mut(&mut |_, stmt| {
            if let StatementKind::Assign(a) = &mut stmt.kind {
                if a.ty == Type::Void {
                    let settled = types
                        .get(&a.lhs.strip_subscripts())
                        .cloned()
                        .or_else(|| rhs_types.get(&stmt.id).cloned());
                    if let Some(ty) = settled {
                        if ty != Type::Void {
                            a.ty = ty;
                            changed = true;
                        }
                    }
                }
            }
        });

        // Locals and parameters pick up their settled types
        for (loc, ty) in &types {
            if let Exp::Unary(Operator::Local, name) = &**loc {
                if let Exp::Const(crate::ir::Value::Str(name)) = &**name {
                    if let Some(slot) = ctx.proc.locals.get_mut(name) {
                        let merged = slot.meet(ty);
                        if merged != Type::Void && merged != *slot {
                            *slot = merged;
                            changed = true;
                        }
                    }
                }
            }
        }
        for param in &mut ctx.proc.params {
            if let Some(ty) = types.get(&param.exp.strip_subscripts()) {
                let merged = param.ty.meet(ty);
                if merged != Type::Void && merged != param.ty {
                    param.ty = merged;
                    changed = true;
                }
            }
        }

        Ok(changed)
    }
}
