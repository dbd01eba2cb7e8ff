//! Preservation analysis: proving locations restored to their entry values.
//!
//! A location is **preserved** when the procedure provably returns it holding
//! the value it had on entry (callee-save registers, the stack pointer after
//! frame teardown). Preserved locations are subtracted from the return
//! statement and bypassed at call sites.

use rustc_hash::FxHashMap;

use crate::ir::{simplify, Assign, Exp, ExpRewrite, RegId, SharedExp, StatementId, Type};
use crate::passes::{def_index, DefKind, Pass, PassContext, PassId};
use crate::program::UserProc;
use crate::Result;

/// Attempts to prove that `loc` holds its entry value at the return.
///
/// Walks the definition that reaches the return and expands assignment
/// right-hand sides until the expression either settles to `loc{-}` (the
/// entry value) or stops changing. Phi and call definitions are opaque here;
/// call bypassing has already rewritten the provable ones.
fn proves_preserved(proc: &UserProc, loc: &SharedExp) -> bool {
    let Some(ret) = proc.ret_stmt() else {
        // No return: nothing observes the exit value
        return true;
    };
    let reaching = ret.collector.get(loc).copied().flatten();
    let Some(reaching) = reaching else {
        return true; // never redefined on any path to the return
    };

    let defs = def_index(&proc.cfg);
    let entry_value = Exp::subscript(loc.clone(), None);
    let mut exp = Exp::subscript(loc.clone(), Some(reaching));

    for _ in 0..16 {
        let expanded = exp.map_post(&mut |sub| match &**sub {
            Exp::Subscript(_, Some(def)) => match defs.get(def) {
                Some((DefKind::Assign, _, Some(rhs))) => rhs.clone(),
                _ => sub.clone(),
            },
            _ => sub.clone(),
        });
        let expanded = simplify(&expanded);
        if expanded == entry_value {
            return true;
        }
        if expanded == exp {
            return false;
        }
        exp = expanded;
    }
    false
}

/// Proves the stack pointer preserved.
///
/// Split from the general analysis so locals can be named alias-conservatively
/// before the full register preservation results are in.
pub struct SpPreservationPass;

impl Pass for SpPreservationPass {
    fn id(&self) -> PassId {
        PassId::SPPreservation
    }

    fn name(&self) -> &'static str {
        "SPPreservation"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let sp = Exp::reg(ctx.prog.stack_reg);
        if ctx.proc.is_preserved(&sp) {
            return Ok(false);
        }
        if proves_preserved(ctx.proc, &sp) {
            ctx.proc.set_preserved(sp);
            return Ok(true);
        }
        log::debug!("stack pointer not provably preserved in '{}'", ctx.proc.name);
        Ok(false)
    }
}

/// Proves preservation for every location in the return's modifieds and
/// subtracts the proven ones from the return.
pub struct PreservationAnalysisPass;

impl Pass for PreservationAnalysisPass {
    fn id(&self) -> PassId {
        PassId::PreservationAnalysis
    }

    fn name(&self) -> &'static str {
        "PreservationAnalysis"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let candidates: Vec<SharedExp> = match ctx.proc.ret_stmt() {
            Some(ret) => ret.modifieds.iter().map(|(_, loc)| loc.clone()).collect(),
            None => return Ok(false),
        };

        let mut proven: Vec<SharedExp> = Vec::new();
        for loc in candidates {
            if !ctx.proc.is_preserved(&loc) && proves_preserved(ctx.proc, &loc) {
                proven.push(loc);
            }
        }
        if proven.is_empty() {
            return Ok(false);
        }

        for loc in &proven {
            log::debug!("'{}' preserves {}", ctx.proc.name, loc);
            ctx.proc.set_preserved(loc.clone());
        }
        if let Some(ret) = ctx.proc.ret_stmt_mut() {
            ret.modifieds.retain(|(_, loc)| !proven.contains(loc));
            ret.returns
                .retain(|a| !proven.contains(&a.lhs.strip_subscripts()));
        }
        Ok(true)
    }
}

/// Refreshes the return's modifieds from the definitions reaching the exit.
///
/// Every register with a real reaching definition and no preservation proof
/// is a modified; return registers sort first so the primary return stays
/// stable.
pub fn update_modifieds(proc: &mut UserProc, return_regs: &[RegId]) -> bool {
    let preserved = proc.preserved.clone();
    let collector: FxHashMap<SharedExp, Option<StatementId>> = match proc.ret_stmt() {
        Some(ret) => ret.collector.clone(),
        None => return false,
    };

    let mut desired: Vec<(Type, SharedExp)> = Vec::new();
    for (loc, def) in &collector {
        if def.is_none() || !loc.is_reg_of() {
            continue;
        }
        if preserved.contains(loc) {
            continue;
        }
        desired.push((Type::integer(32), loc.clone()));
    }
    let rank = |loc: &SharedExp| -> (usize, String) {
        let primary = loc
            .reg_id()
            .and_then(|r| return_regs.iter().position(|&rr| rr == r))
            .unwrap_or(usize::MAX);
        (primary, loc.to_string())
    };
    desired.sort_by_key(|(_, loc)| rank(loc));

    let ret = proc.ret_stmt_mut().expect("checked above");
    if ret.modifieds != desired {
        ret.modifieds = desired;
        true
    } else {
        false
    }
}

/// Rebuilds the returned values from the modifieds and the definitions
/// reaching the exit.
///
/// Existing return assignments are kept, since propagation has already
/// rewritten their values; only locations that newly joined or left the modifieds
/// change the list.
pub fn update_returns(proc: &mut UserProc) -> bool {
    let Some(ret) = proc.ret_stmt() else {
        return false;
    };
    let collector = ret.collector.clone();
    let desired: Vec<Assign> = ret
        .modifieds
        .iter()
        .map(|(ty, loc)| {
            match ret.returns.iter().find(|a| &a.lhs.strip_subscripts() == loc) {
                Some(existing) => existing.clone(),
                None => {
                    let def = collector.get(loc).copied().flatten();
                    Assign {
                        ty: ty.clone(),
                        lhs: loc.clone(),
                        rhs: Exp::subscript(loc.clone(), def),
                    }
                }
            }
        })
        .collect();

    let ret = proc.ret_stmt_mut().expect("checked above");
    if ret.returns != desired {
        ret.returns = desired;
        true
    } else {
        false
    }
}
