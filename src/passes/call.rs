//! Call-site passes: defines, arguments, bypassing, and argument dedup.

use rustc_hash::FxHashMap;

use crate::ir::{Assign, Exp, ExpRewrite, SharedExp, StatementId, StatementKind, Type};
use crate::passes::{def_index, Pass, PassContext, PassId};
use crate::program::{ProcId, ProcStatus, Procedure};
use crate::Result;

/// What a call site knows about its callee's effect on a location.
fn callee_preserves(ctx: &PassContext, dest_proc: Option<ProcId>, loc: &Exp) -> bool {
    let stack_reg = Exp::reg(ctx.prog.stack_reg);
    match dest_proc.and_then(|id| ctx.callee(id)) {
        Some(Procedure::User(callee)) => {
            callee.status >= ProcStatus::EarlyDone && callee.is_preserved(loc)
        }
        Some(Procedure::Lib(lib)) => {
            // Library procedures clobber their return location only
            if loc == &*stack_reg {
                return true;
            }
            if lib.signature.ret_type == Type::Void {
                return true;
            }
            !ctx.prog
                .return_regs
                .iter()
                .any(|&r| loc == &*Exp::reg(r))
        }
        // Childless (unknown or in-cycle) callees: assume the ABI stack
        // discipline and nothing else
        None => loc == &*stack_reg,
    }
}

/// Refreshes every call's defined-locations list.
///
/// Finalized user callees contribute their modifieds; library callees their
/// return location; childless calls fall back to the ABI defaults (return
/// register and stack pointer).
pub struct CallDefineUpdatePass;

impl Pass for CallDefineUpdatePass {
    fn id(&self) -> PassId {
        PassId::CallDefineUpdate
    }

    fn name(&self) -> &'static str {
        "CallDefineUpdate"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let mut changed = false;

        // Resolve desired defines per call first; the CFG borrow stays local
        let mut desired: FxHashMap<StatementId, Vec<(Type, SharedExp)>> = FxHashMap::default();
        ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
            let StatementKind::Call(call) = &stmt.kind else {
                return;
            };
            let defines = match call.dest_proc.and_then(|id| ctx.callee(id)) {
                Some(Procedure::User(callee))
                    if callee.status >= ProcStatus::EarlyDone && callee.ret_stmt().is_some() =>
                {
                    callee
                        .ret_stmt()
                        .expect("checked above")
                        .modifieds
                        .clone()
                }
                Some(Procedure::Lib(lib)) => {
                    if lib.signature.ret_type == Type::Void {
                        Vec::new()
                    } else {
                        vec![(
                            lib.signature.ret_type.clone(),
                            Exp::reg(ctx.prog.return_regs[0]),
                        )]
                    }
                }
                _ => {
                    vec![
                        (Type::integer(32), Exp::reg(ctx.prog.return_regs[0])),
                        (Type::integer(32), Exp::reg(ctx.prog.stack_reg)),
                    ]
                }
            };
            desired.insert(stmt.id, defines);
        });

        ctx.proc.cfg.for_each_statement_mut(&mut |_, stmt| {
            if let StatementKind::Call(call) = &mut stmt.kind {
                if let Some(defines) = desired.remove(&stmt.id) {
                    if call.defines != defines {
                        call.defines = defines;
                        changed = true;
                    }
                }
            }
        });

        Ok(changed)
    }
}

/// Materializes call arguments from the callee's parameter list and the
/// call site's reaching definitions.
pub struct CallArgumentUpdatePass;

impl Pass for CallArgumentUpdatePass {
    fn id(&self) -> PassId {
        PassId::CallArgumentUpdate
    }

    fn name(&self) -> &'static str {
        "CallArgumentUpdate"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let live_defs = def_index(&ctx.proc.cfg);
        let mut changed = false;

        // Callee parameter lists, resolved up front
        let mut params_for: FxHashMap<StatementId, Vec<(String, Type, SharedExp)>> =
            FxHashMap::default();
        ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
            let StatementKind::Call(call) = &stmt.kind else {
                return;
            };
            let params = match call.dest_proc.and_then(|id| ctx.callee(id)) {
                Some(Procedure::User(callee)) => callee
                    .params
                    .iter()
                    .map(|p| (p.name.clone(), p.ty.clone(), p.exp.clone()))
                    .collect(),
                Some(Procedure::Lib(lib)) => lib
                    .signature
                    .params
                    .iter()
                    .map(|p| (p.name.clone(), p.ty.clone(), p.exp.clone()))
                    .collect(),
                None => Vec::new(),
            };
            params_for.insert(stmt.id, params);
        });

        ctx.proc.cfg.for_each_statement_mut(&mut |_, stmt| {
            let id = stmt.id;
            let StatementKind::Call(call) = &mut stmt.kind else {
                return;
            };
            let Some(params) = params_for.remove(&id) else {
                return;
            };
            if params.is_empty() {
                return;
            }

            let args: Vec<Assign> = params
                .into_iter()
                .map(|(_, ty, exp)| {
                    let key = exp.strip_subscripts();
                    // Collector entries may point at definitions a cleanup
                    // removed; fall back to the entry value then
                    let def = call
                        .collector
                        .get(&key)
                        .copied()
                        .flatten()
                        .filter(|d| live_defs.contains_key(d));
                    Assign {
                        ty,
                        lhs: exp.clone(),
                        rhs: Exp::subscript(key, def),
                    }
                })
                .collect();

            if call.args != args {
                call.args = args;
                changed = true;
            }
        });

        Ok(changed)
    }
}

/// Bypasses preserved locations across calls and collapses degenerate phis.
///
/// A use `loc{call}` where the callee provably preserves `loc` is redirected
/// to the definition that reached the call site. A phi whose incomings all
/// agree (ignoring self-references) degrades to a copy assignment, which
/// propagation then dissolves.
pub struct CallAndPhiFixPass;

impl Pass for CallAndPhiFixPass {
    fn id(&self) -> PassId {
        PassId::CallAndPhiFix
    }

    fn name(&self) -> &'static str {
        "CallAndPhiFix"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let mut changed = false;

        // Call sites: destination and reaching definitions
        let mut calls: FxHashMap<
            StatementId,
            (Option<ProcId>, FxHashMap<SharedExp, Option<StatementId>>),
        > = FxHashMap::default();
        ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
            if let StatementKind::Call(call) = &stmt.kind {
                calls.insert(stmt.id, (call.dest_proc, call.collector.clone()));
            }
        });

        // Decide bypasses without holding a CFG borrow
        let mut bypass: FxHashMap<(StatementId, SharedExp), Option<StatementId>> =
            FxHashMap::default();
        ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
            for use_exp in stmt.uses() {
                let Exp::Subscript(base, Some(def)) = &*use_exp else {
                    continue;
                };
                let Some((dest_proc, collector)) = calls.get(def) else {
                    continue;
                };
                let key = base.strip_subscripts();
                if callee_preserves(ctx, *dest_proc, &key) {
                    let reaching = collector.get(&key).copied().flatten();
                    bypass.insert((*def, key), reaching);
                }
            }
        });

        if !bypass.is_empty() {
            ctx.proc.cfg.for_each_statement_mut(&mut |_, stmt| {
                let ch = stmt.map_uses(&mut |e| {
                    e.map_post(&mut |sub| {
                        let Exp::Subscript(base, Some(def)) = &**sub else {
                            return sub.clone();
                        };
                        let key = base.strip_subscripts();
                        match bypass.get(&(*def, key)) {
                            Some(reaching) => Exp::subscript(base.clone(), *reaching),
                            None => sub.clone(),
                        }
                    })
                });
                if ch {
                    stmt.simplify();
                    changed = true;
                }
            });
        }

        // Collectors and phi incomings reference definitions too; bypass the
        // preserved ones there as well so preservation proofs can see past
        // intervening calls
        let mut collector_bypass: FxHashMap<(StatementId, SharedExp), Option<StatementId>> =
            FxHashMap::default();
        for (&call_id, (dest_proc, collector)) in &calls {
            for (loc, reaching) in collector {
                if callee_preserves(ctx, *dest_proc, loc) {
                    collector_bypass.insert((call_id, loc.clone()), *reaching);
                }
            }
        }
        let resolve = move |loc: &SharedExp, def: StatementId| -> Option<Option<StatementId>> {
            collector_bypass.get(&(def, loc.clone())).copied()
        };
        ctx.proc.cfg.for_each_statement_mut(&mut |_, stmt| {
            match &mut stmt.kind {
                StatementKind::Return(ret) => {
                    let entries: Vec<(SharedExp, StatementId)> = ret
                        .collector
                        .iter()
                        .filter_map(|(loc, def)| def.map(|d| (loc.clone(), d)))
                        .collect();
                    for (loc, def) in entries {
                        if let Some(reaching) = resolve(&loc, def) {
                            ret.collector.insert(loc, reaching);
                            changed = true;
                        }
                    }
                }
                StatementKind::Call(call) => {
                    let entries: Vec<(SharedExp, StatementId)> = call
                        .collector
                        .iter()
                        .filter_map(|(loc, def)| def.map(|d| (loc.clone(), d)))
                        .collect();
                    for (loc, def) in entries {
                        if def != stmt.id {
                            if let Some(reaching) = resolve(&loc, def) {
                                call.collector.insert(loc, reaching);
                                changed = true;
                            }
                        }
                    }
                }
                StatementKind::PhiAssign(phi) => {
                    let key = phi.lhs.strip_subscripts();
                    for def in phi.incoming.values_mut() {
                        if let Some(d) = *def {
                            if let Some(reaching) = resolve(&key, d) {
                                *def = reaching;
                                changed = true;
                            }
                        }
                    }
                }
                _ => {}
            }
        });

        // Degenerate phis become copies
        ctx.proc.cfg.for_each_statement_mut(&mut |_, stmt| {
            let own_id = stmt.id;
            let StatementKind::PhiAssign(phi) = &stmt.kind else {
                return;
            };
            let mut distinct: Vec<Option<StatementId>> = Vec::new();
            for def in phi.incoming.values() {
                if *def == Some(own_id) {
                    continue; // self-reference through the back edge
                }
                if !distinct.contains(def) {
                    distinct.push(*def);
                }
            }
            if distinct.len() == 1 {
                let lhs = phi.lhs.clone();
                let rhs = Exp::subscript(lhs.strip_subscripts(), distinct[0]);
                stmt.kind = StatementKind::Assign(Assign::new(lhs, rhs));
                changed = true;
            }
        });

        Ok(changed)
    }
}

/// Removes duplicate arguments from call sites.
///
/// Distinct-looking argument expressions can turn out to be duplicates once
/// propagation settles (`m[r24{30}]` and `m[r28{40} - 4]` resolving to the
/// same slot); only the first occurrence per destination location stays.
pub struct DuplicateArgsRemovalPass;

impl Pass for DuplicateArgsRemovalPass {
    fn id(&self) -> PassId {
        PassId::DuplicateArgsRemoval
    }

    fn name(&self) -> &'static str {
        "DuplicateArgsRemoval"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let mut changed = false;
        ctx.proc.cfg.for_each_statement_mut(&mut |_, stmt| {
            let StatementKind::Call(call) = &mut stmt.kind else {
                return;
            };
            let mut seen: Vec<SharedExp> = Vec::new();
            let before = call.args.len();
            call.args.retain(|arg| {
                let key = arg.lhs.strip_subscripts();
                if seen.contains(&key) {
                    return false;
                }
                seen.push(key);
                true
            });
            changed |= call.args.len() != before;
        });
        Ok(changed)
    }
}
