//! Propagation and its cleanups: statement propagation, dead-copy removal,
//! and strength-reduction reversal.

use rustc_hash::FxHashMap;

use crate::ir::{Exp, ExpRewrite, Operator, SharedExp, StatementId, StatementKind};
use crate::passes::{def_index, use_counts, DefKind, Pass, PassContext, PassId};
use crate::Result;

/// Inlines definitions into their uses.
///
/// A definition `loc := rhs` propagates into a use `loc{def}` when doing so
/// cannot change meaning under later rewrites: constants and memory-free
/// right-hand sides always propagate; a right-hand side containing a memory
/// load only propagates when the definition has a single use (moving a load
/// past another store would otherwise need alias reasoning).
pub struct StatementPropagationPass;

impl Pass for StatementPropagationPass {
    fn id(&self) -> PassId {
        PassId::StatementPropagation
    }

    fn name(&self) -> &'static str {
        "StatementPropagation"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let cfg = &mut ctx.proc.cfg;
        let mut changed = false;

        // Iterate: propagated right-hand sides may expose further candidates
        for _ in 0..8 {
            let defs = def_index(cfg);
            let counts = use_counts(cfg);

            let mut candidates: FxHashMap<StatementId, SharedExp> = FxHashMap::default();
            for (&id, (kind, _lhs, rhs)) in &defs {
                if *kind != DefKind::Assign {
                    continue;
                }
                let rhs = rhs.as_ref().expect("assign defs carry their rhs");
                let uses = counts.get(&id).copied().unwrap_or(0);
                if uses == 0 {
                    continue;
                }
                let has_memof = rhs.search(&Exp::Terminal(Operator::WildMemOf));
                if !has_memof || uses == 1 {
                    candidates.insert(id, rhs.clone());
                }
            }
            if candidates.is_empty() {
                break;
            }

            let mut round_changed = false;
            cfg.for_each_statement_mut(&mut |_, stmt| {
                let own_id = stmt.id;
                let ch = stmt.map_uses(&mut |e| {
                    e.map_post(&mut |sub| match &**sub {
                        Exp::Subscript(_, Some(def)) if *def != own_id => {
                            match candidates.get(def) {
                                Some(rhs) => rhs.clone(),
                                None => sub.clone(),
                            }
                        }
                        _ => sub.clone(),
                    })
                });
                if ch {
                    stmt.simplify();
                    round_changed = true;
                }
            });

            changed |= round_changed;
            if !round_changed {
                break;
            }
        }

        Ok(changed)
    }
}

/// Drops dead copy assignments left behind by propagation.
///
/// This is a readability cleanup between fixpoint rounds; the full liveness
/// sweep is `UnusedStatementRemoval`. Only register/temporary definitions
/// with zero remaining uses are touched; memory writes are observable.
pub struct AssignRemovalPass;

impl Pass for AssignRemovalPass {
    fn id(&self) -> PassId {
        PassId::AssignRemoval
    }

    fn name(&self) -> &'static str {
        "AssignRemoval"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let cfg = &mut ctx.proc.cfg;
        let counts = use_counts(cfg);
        let mut changed = false;

        for bb in cfg.block_ids().collect::<Vec<_>>() {
            let block = cfg.block_mut(bb).expect("iterating live ids");
            for rtl in &mut block.rtls {
                rtl.statements.retain(|stmt| {
                    let StatementKind::Assign(a) = &stmt.kind else {
                        return true;
                    };
                    let base = a.lhs.strip_subscripts();
                    if base.is_mem_of() || !base.is_location() {
                        return true;
                    }
                    if counts.get(&stmt.id).copied().unwrap_or(0) > 0 {
                        return true;
                    }
                    changed = true;
                    false
                });
            }
        }

        Ok(changed)
    }
}

/// Rewrites strength-reduced induction scaling back to multiplication.
///
/// Compilers lower `i * 2^k` to `i << k`; array indexing reads better as the
/// multiply, so shifts whose operand is a phi-defined value (the induction
/// variable shape) are rewritten to `i * 2^k`. Bitfield shift-and-mask code
/// does not match and is left alone.
pub struct StrengthReductionReversalPass;

impl Pass for StrengthReductionReversalPass {
    fn id(&self) -> PassId {
        PassId::StrengthReductionReversal
    }

    fn name(&self) -> &'static str {
        "StrengthReductionReversal"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let cfg = &mut ctx.proc.cfg;
        let defs = def_index(cfg);
        let mut changed = false;

        cfg.for_each_statement_mut(&mut |_, stmt| {
            changed |= stmt.map_uses(&mut |e| {
                e.map_post(&mut |sub| {
                    let Exp::Binary(Operator::ShiftL, val, amount) = &**sub else {
                        return sub.clone();
                    };
                    let Some(k) = amount.int_value() else {
                        return sub.clone();
                    };
                    if !(1..=30).contains(&k) {
                        return sub.clone();
                    }
                    let Exp::Subscript(_, Some(def)) = &**val else {
                        return sub.clone();
                    };
                    let phi_defined = defs
                        .get(def)
                        .is_some_and(|(kind, _, _)| *kind == DefKind::Phi);
                    if !phi_defined {
                        return sub.clone();
                    }
                    Exp::binary(Operator::Mult, val.clone(), Exp::int(1 << k))
                })
            });
        });

        Ok(changed)
    }
}
