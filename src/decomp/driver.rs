//! The recursive procedure decompiler.
//!
//! Drives one procedure at a time through the early/middle/late pass
//! sequences, recursing into callees first. Two protocols complicate the
//! otherwise linear pipeline:
//!
//! - **Recursion groups.** When the callee walk closes a cycle in the call
//!   graph, every procedure on the call stack from the cycle head down joins
//!   one recursion group (unioning with any group already known). Members are
//!   analyzed together once the walk returns to the head: individually up to
//!   the middle sequence with their mutual calls treated as childless, then
//!   jointly to a fixpoint, then each through the late sequence.
//!
//! - **Indirect-transfer restart.** When switch recovery rewrites a computed
//!   jump mid-analysis, most prior analysis of the procedure is invalid. The
//!   recovered high-level transfers are saved with the decoder, the CFG is
//!   cleared and redecoded (now including the switch targets), and the
//!   procedure is decompiled again from scratch. The set of discovered
//!   targets grows monotonically, so the restart loop terminates.
//!
//! The call-stack invariant (each procedure appears at most once) is what
//! makes the driver's exclusive logical lock on the current procedure sound.

use rustc_hash::FxHashMap;

use crate::decomp::{decode::decode_proc, indirect::decode_indirect_transfers};
use crate::ir::{ExpRewrite, StatementKind};
use crate::passes::{update_modifieds, update_returns, PassContext, PassId, PassManager};
use crate::program::{ProcId, ProcSet, ProcSetRef, ProcStatus, Procedure, Program};
use crate::project::Project;
use crate::Result;

/// Cap on middle-decompile fixpoint rounds; the loop exits earlier at
/// fixpoint and the cap is a safety net.
const MAX_MIDDLE_ROUNDS: usize = 12;
/// Rounds of the update-returns refinement inside each middle round.
const UPDATE_RETURNS_ROUNDS: usize = 3;
/// Outer repeats of the recursion-group DFS.
const MAX_GROUP_REPEATS: usize = 2;

/// The recursive driver. One instance decompiles any number of procedures;
/// the call stack and recursion-group registry persist across top-level
/// invocations so shared groups are found once.
pub struct ProcDecompiler {
    call_stack: Vec<ProcId>,
    recursion_groups: FxHashMap<ProcId, ProcSetRef>,
    passes: PassManager,
}

impl ProcDecompiler {
    /// A fresh driver with an empty call stack.
    #[must_use]
    pub fn new() -> ProcDecompiler {
        ProcDecompiler {
            call_stack: Vec::new(),
            recursion_groups: FxHashMap::default(),
            passes: PassManager::new(),
        }
    }

    /// Decompiles `proc` (and, recursively, its callees) to `Final`.
    ///
    /// A failure aborts only this procedure: it is marked `Undecoded` and the
    /// caller moves on to the next one.
    pub fn decompile(
        &mut self,
        prog: &mut Program,
        project: &mut Project,
        proc: ProcId,
    ) -> ProcStatus {
        match self.try_decompile_recursive(prog, project, proc) {
            Ok(status) => status,
            Err(e) => {
                log::error!("decompilation of {proc} failed: {e}");
                if let Some(user) = prog.user_proc_mut(proc) {
                    user.status = ProcStatus::Undecoded;
                }
                // Failed frames did not unwind their stack entries
                self.call_stack.clear();
                ProcStatus::Undecoded
            }
        }
    }

    fn try_decompile_recursive(
        &mut self,
        prog: &mut Program,
        project: &mut Project,
        proc: ProcId,
    ) -> Result<ProcStatus> {
        let name = match prog.proc(proc) {
            Some(p) => p.name().to_string(),
            None => return Ok(ProcStatus::Undecoded),
        };
        let status = prog.user_proc(proc).map_or(ProcStatus::Undecoded, |p| p.status);

        log::info!(
            "{} procedure '{}'",
            if status >= ProcStatus::Visited {
                "Re-visiting"
            } else {
                "Visiting"
            },
            name
        );
        project.alert_discovered(&name);

        if status >= ProcStatus::Final {
            log::warn!("procedure '{name}' is already final");
            return Ok(ProcStatus::Final);
        }

        if status < ProcStatus::Decoded && !decode_proc(prog, project, proc)? {
            return Ok(ProcStatus::Undecoded);
        }
        if let Some(user) = prog.user_proc_mut(proc) {
            if user.status < ProcStatus::Visited {
                user.status = ProcStatus::Visited;
            }
        }

        self.call_stack.push(proc);
        if project.settings.verbose_output {
            self.print_call_stack(prog);
        }

        if project.settings.decode_children {
            self.visit_callees(prog, project, proc)?;
        }

        let status = prog.user_proc(proc).map_or(ProcStatus::Undecoded, |p| p.status);
        if status != ProcStatus::InCycle {
            project.alert_decompiling(&name);
            log::info!("Decompiling procedure '{name}'");

            self.early_decompile(prog, project, proc)?;
            // A restart inside the middle sequence has already driven the
            // procedure to completion; the late passes below are idempotent
            self.middle_decompile(prog, project, proc)?;

            if project.settings.verbose_output {
                self.print_call_stack(prog);
            }
        }

        let status = prog.user_proc(proc).map_or(ProcStatus::Undecoded, |p| p.status);
        if status != ProcStatus::InCycle {
            self.late_decompile(prog, project, proc)?;
            if let Some(user) = prog.user_proc_mut(proc) {
                user.status = ProcStatus::Final;
            }
            project.alert_end_decompile(&name);
        } else if let Some(group) = self.recursion_groups.get(&proc).cloned() {
            // The big test: back at the first group member on the stack means
            // the strongly connected component is complete
            let first_member = self
                .call_stack
                .iter()
                .find(|p| group.borrow().contains(p))
                .copied();
            if first_member == Some(proc) {
                self.recursion_group_analysis(prog, project, &group)?;
                if let Some(user) = prog.user_proc_mut(proc) {
                    user.status = ProcStatus::Final;
                }
                project.alert_end_decompile(&name);
            }
        }

        debug_assert_eq!(self.call_stack.last(), Some(&proc));
        self.call_stack.pop();
        log::info!("Finished decompile of '{name}'");

        Ok(prog.user_proc(proc).map_or(ProcStatus::Undecoded, |p| p.status))
    }

    /// Depth-first recursion into the callees, detecting call-graph cycles.
    fn visit_callees(
        &mut self,
        prog: &mut Program,
        project: &mut Project,
        proc: ProcId,
    ) -> Result<()> {
        // Call sites with user-procedure callees
        let mut callees: Vec<(crate::ir::StatementId, ProcId)> = Vec::new();
        if let Some(user) = prog.user_proc(proc) {
            user.cfg.for_each_statement(&mut |_, stmt| {
                if let StatementKind::Call(call) = &stmt.kind {
                    if let Some(id) = call.dest_proc {
                        if prog.proc(id).is_some_and(|p| !p.is_lib()) {
                            callees.push((stmt.id, id));
                        }
                    }
                }
            });
        }

        for (call_id, callee) in callees {
            let callee_status = prog
                .user_proc(callee)
                .map_or(ProcStatus::Undecoded, |p| p.status);

            if callee_status == ProcStatus::Final {
                // Already decompiled; only the callee-return link is missing
                self.set_callee_return(prog, proc, call_id, callee);
                continue;
            }

            if (ProcStatus::Visited..=ProcStatus::EarlyDone).contains(&callee_status) {
                // A new cycle, or a new branch of a known cycle
                if self.call_stack.contains(&callee) {
                    let from = self
                        .call_stack
                        .iter()
                        .position(|&p| p == callee)
                        .expect("contains checked above");
                    let members: ProcSet = self.call_stack[from..].iter().copied().collect();
                    self.create_recursion_group(prog, members);
                } else if let Some(group) =
                    prog.user_proc(callee).and_then(|p| p.recursion_group.clone())
                {
                    let first = self
                        .call_stack
                        .iter()
                        .position(|p| group.borrow().contains(p));
                    if let Some(first) = first {
                        for p in self.call_stack[first + 1..].to_vec() {
                            self.add_to_recursion_group(prog, p, &group);
                        }
                    }
                }
                if let Some(user) = prog.user_proc_mut(proc) {
                    user.status = ProcStatus::InCycle;
                }
            } else {
                log::debug!("preparing to decompile callee {callee} of {proc}");
                self.try_decompile_recursive(prog, project, callee)?;
                self.set_callee_return(prog, proc, call_id, callee);

                // The recursion may have swept this procedure into a group
                if prog.user_proc(proc).is_some_and(|p| p.status != ProcStatus::InCycle) {
                    if let Some(group) = self.recursion_groups.get(&proc).cloned() {
                        if let Some(user) = prog.user_proc_mut(proc) {
                            user.status = ProcStatus::InCycle;
                            user.recursion_group = Some(group);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn set_callee_return(
        &self,
        prog: &mut Program,
        proc: ProcId,
        call_id: crate::ir::StatementId,
        callee: ProcId,
    ) {
        let ret_id = prog.user_proc(callee).and_then(|p| p.ret_stmt_id());
        if let Some(user) = prog.user_proc_mut(proc) {
            user.cfg.for_each_statement_mut(&mut |_, stmt| {
                if stmt.id == call_id {
                    if let StatementKind::Call(call) = &mut stmt.kind {
                        call.callee_return = ret_id;
                    }
                }
            });
        }
    }

    /// Unions `members` into one recursion group, absorbing any groups the
    /// members already belong to, and installs the shared handle everywhere.
    fn create_recursion_group(&mut self, prog: &mut Program, members: ProcSet) {
        let mut all: ProcSet = members;
        for p in all.clone() {
            if let Some(existing) = self.recursion_groups.get(&p) {
                all.extend(existing.borrow().iter().copied());
            }
        }
        log::debug!("creating recursion group: {all:?}");

        let handle: ProcSetRef = std::rc::Rc::new(std::cell::RefCell::new(all.clone()));
        for p in all {
            self.recursion_groups.insert(p, handle.clone());
            if let Some(user) = prog.user_proc_mut(p) {
                user.recursion_group = Some(handle.clone());
                user.status = ProcStatus::InCycle;
            }
        }
    }

    fn add_to_recursion_group(&mut self, prog: &mut Program, proc: ProcId, group: &ProcSetRef) {
        let mut all: ProcSet = group.borrow().clone();
        all.insert(proc);
        if let Some(existing) = self.recursion_groups.get(&proc) {
            all.extend(existing.borrow().iter().copied());
        }
        group.replace(all.clone());
        for p in all {
            self.recursion_groups.insert(p, group.clone());
            if let Some(user) = prog.user_proc_mut(p) {
                user.recursion_group = Some(group.clone());
                user.status = ProcStatus::InCycle;
            }
        }
    }

    /// Runs one registered pass with the procedure detached from the arena.
    fn run_pass(
        &mut self,
        prog: &mut Program,
        project: &Project,
        id: PassId,
        proc: ProcId,
    ) -> Result<bool> {
        let Some(mut user) = prog.detach_proc(proc) else {
            return Ok(false);
        };
        let result = {
            let mut ctx = PassContext {
                proc_id: proc,
                proc: &mut user,
                prog,
                settings: &project.settings,
            };
            self.passes.execute(id, &mut ctx)
        };
        prog.attach_proc(proc, user);
        result
    }

    /// Initialization, first phi placement and renaming, mostly for the
    /// stack pointer.
    fn early_decompile(
        &mut self,
        prog: &mut Program,
        project: &mut Project,
        proc: ProcId,
    ) -> Result<()> {
        let name = prog.proc(proc).map_or_else(String::new, |p| p.name().to_string());
        project.alert_decompile_debug_point(&name, "Before Initialise");

        self.run_pass(prog, project, PassId::StatementInit, proc)?;
        self.run_pass(prog, project, PassId::BBSimplify, proc)?;
        self.run_pass(prog, project, PassId::Dominators, proc)?;

        project.alert_decompile_debug_point(&name, "After Initialise");
        if prog.user_proc(proc).is_some_and(|p| p.status >= ProcStatus::EarlyDone) {
            return Ok(());
        }

        project.alert_decompile_debug_point(&name, "Before Early");
        log::debug!("### Beginning early decompile for '{name}' ###");

        self.run_pass(prog, project, PassId::CallDefineUpdate, proc)?;
        self.run_pass(prog, project, PassId::GlobalConstReplace, proc)?;
        self.run_pass(prog, project, PassId::PhiPlacement, proc)?;
        self.run_pass(prog, project, PassId::BlockVarRename, proc)?;
        self.run_pass(prog, project, PassId::StatementPropagation, proc)?;

        project.alert_decompile_debug_point(&name, "After Early");
        Ok(())
    }

    /// Preservation, argument discovery and the main fixpoint loop; ends
    /// with indirect-transfer recovery and possibly a restart.
    ///
    /// Returns whether the procedure was restarted (in which case it has
    /// already been decompiled to completion by the nested call).
    fn middle_decompile(
        &mut self,
        prog: &mut Program,
        project: &mut Project,
        proc: ProcId,
    ) -> Result<bool> {
        debug_assert_eq!(self.call_stack.last(), Some(&proc));
        let name = prog.proc(proc).map_or_else(String::new, |p| p.name().to_string());
        project.alert_decompile_debug_point(&name, "Before Middle");
        log::debug!("### Beginning middleDecompile for '{name}' ###");

        // Bypass callees that are finalised, if any
        self.run_pass(prog, project, PassId::CallAndPhiFix, proc)?;
        if prog.user_proc(proc).is_some_and(|p| p.status != ProcStatus::InCycle) {
            self.run_pass(prog, project, PassId::StatementPropagation, proc)?;
        }

        self.run_pass(prog, project, PassId::SPPreservation, proc)?;
        // Splitting sp from the rest of the preservations allows alias
        // conservative naming of locals; the rest are done here as well
        // since frame-based locals need them all
        self.run_pass(prog, project, PassId::PreservationAnalysis, proc)?;
        self.run_pass(prog, project, PassId::CallAndPhiFix, proc)?;

        if project.settings.use_promotion {
            self.promote_signature(prog, proc);
        }

        self.run_pass(prog, project, PassId::PhiPlacement, proc)?;
        self.run_pass(prog, project, PassId::BlockVarRename, proc)?;
        self.run_pass(prog, project, PassId::StatementPropagation, proc)?;
        self.run_pass(prog, project, PassId::CallArgumentUpdate, proc)?;
        self.run_pass(prog, project, PassId::StrengthReductionReversal, proc)?;

        // Repeat until no change, with a safety-net round cap
        let mut round = 3;
        loop {
            let mut change = self.run_pass(prog, project, PassId::PhiPlacement, proc)?;
            change |= self.run_pass(prog, project, PassId::BlockVarRename, proc)?;

            // Seed the return statement with everything reaching the exit
            let return_regs = prog.return_regs.clone();
            if let Some(user) = prog.user_proc_mut(proc) {
                if user.ret_stmt().is_some() {
                    update_modifieds(user, &return_regs);
                    update_returns(user);
                }
            }

            if project.settings.change_signatures {
                for i in 0..UPDATE_RETURNS_ROUNDS {
                    log::debug!("### update returns loop iteration {i} ###");
                    if prog
                        .user_proc(proc)
                        .is_some_and(|p| p.status != ProcStatus::InCycle)
                    {
                        self.run_pass(prog, project, PassId::BlockVarRename, proc)?;
                    }
                    self.run_pass(prog, project, PassId::PreservationAnalysis, proc)?;
                    self.run_pass(prog, project, PassId::CallDefineUpdate, proc)?;
                    self.run_pass(prog, project, PassId::CallAndPhiFix, proc)?;
                    // Preserveds subtract from returns
                    self.run_pass(prog, project, PassId::PreservationAnalysis, proc)?;
                }
            }

            project.alert_decompile_debug_point(&name, "Before propagating statements");
            change |= self.run_pass(prog, project, PassId::StatementPropagation, proc)?;
            change |= self.run_pass(prog, project, PassId::BlockVarRename, proc)?;
            project.alert_decompile_debug_point(&name, "After propagating statements");

            // Readability only; nothing relies on these being removed
            self.run_pass(prog, project, PassId::AssignRemoval, proc)?;

            round += 1;
            if !change || round >= MAX_MIDDLE_ROUNDS {
                break;
            }
        }

        // Memofs were held back from renaming until their address
        // expressions stabilized; let them in now
        log::debug!("### allowing SSA renaming of all memof expressions ###");
        if let Some(user) = prog.user_proc_mut(proc) {
            user.cfg.dataflow.set_rename_locals_params(true);
        }
        self.run_pass(prog, project, PassId::PhiPlacement, proc)?;
        self.run_pass(prog, project, PassId::BlockVarRename, proc)?;
        self.run_pass(prog, project, PassId::StatementPropagation, proc)?;
        self.run_pass(prog, project, PassId::CallAndPhiFix, proc)?;

        // Check for indirect jumps or calls not already removed by
        // propagation of constants
        let mut recovered = false;
        if let Some(mut user) = prog.detach_proc(proc) {
            recovered = decode_indirect_transfers(&mut user, prog, &project.settings);
            prog.attach_proc(proc, user);
        }

        if recovered {
            // At least one indirect transfer was decoded, invalidating most
            // of the analysis so far. Redo everything.
            log::info!(
                "Restarting decompilation of '{name}' because indirect jumps or calls have been analyzed"
            );
            project.alert_decompile_debug_point(&name, "Before restarting decompilation");

            self.save_decoded_icts(prog, project, proc);

            if let Some(user) = prog.user_proc_mut(proc) {
                user.remove_ret_stmt();
                user.cfg.clear();
            }
            if !decode_proc(prog, project, proc)? {
                return Ok(true);
            }
            if let Some(user) = prog.user_proc_mut(proc) {
                user.cfg.dataflow.set_rename_locals_params(false);
                user.status = ProcStatus::Visited;
            }

            debug_assert_eq!(self.call_stack.last(), Some(&proc));
            self.call_stack.pop();
            self.try_decompile_recursive(prog, project, proc)?;
            self.call_stack.push(proc);
            return Ok(true);
        }

        self.run_pass(prog, project, PassId::PreservationAnalysis, proc)?;
        self.run_pass(prog, project, PassId::DuplicateArgsRemoval, proc)?;

        if let Some(user) = prog.user_proc_mut(proc) {
            user.status = ProcStatus::EarlyDone;
        }
        project.alert_decompile_debug_point(&name, "after middle");
        Ok(false)
    }

    /// Type analysis, unused-code removal, final parameters and branch
    /// fusion.
    fn late_decompile(
        &mut self,
        prog: &mut Program,
        project: &mut Project,
        proc: ProcId,
    ) -> Result<()> {
        let name = prog.proc(proc).map_or_else(String::new, |p| p.name().to_string());
        project.alert_decompiling(&name);
        project.alert_decompile_debug_point(&name, "Before Final");
        log::debug!("### Removing unused statements for '{name}' ###");

        if prog.user_proc(proc).is_some_and(|p| p.status < ProcStatus::Final) {
            // Type analysis reveals additional uses; removing unused
            // statements before it is unsafe
            self.run_pass(prog, project, PassId::LocalTypeAnalysis, proc)?;
            self.run_pass(prog, project, PassId::PhiPlacement, proc)?;
            self.run_pass(prog, project, PassId::BlockVarRename, proc)?;
            self.run_pass(prog, project, PassId::StatementPropagation, proc)?;
        }

        self.run_pass(prog, project, PassId::UnusedStatementRemoval, proc)?;
        self.run_pass(prog, project, PassId::FinalParameterSearch, proc)?;

        if project.settings.name_parameters {
            self.run_pass(prog, project, PassId::ParameterSymbolMap, proc)?;
        }

        self.run_pass(prog, project, PassId::CallDefineUpdate, proc)?;
        self.run_pass(prog, project, PassId::CallArgumentUpdate, proc)?;
        self.run_pass(prog, project, PassId::BranchAnalysis, proc)?;

        project.alert_decompile_debug_point(&name, "after final");
        Ok(())
    }

    /// Joint analysis of a completed recursion group.
    fn recursion_group_analysis(
        &mut self,
        prog: &mut Program,
        project: &mut Project,
        group: &ProcSetRef,
    ) -> Result<()> {
        let members: Vec<ProcId> = group.borrow().iter().copied().collect();
        if members.is_empty() {
            return Ok(());
        }
        log::info!(
            "Performing recursion group analysis for {} recursive procedures",
            members.len()
        );

        let entry = members[0];
        for _ in 0..=MAX_GROUP_REPEATS {
            let mut visited = ProcSet::new();
            let changed =
                self.decompile_proc_in_recursion_group(prog, project, entry, group, &mut visited)?;
            if !changed {
                break;
            }
        }

        for _ in 0..2 {
            for &member in &members {
                self.late_decompile(prog, project, member)?;
            }
        }

        log::debug!("=== End recursion group analysis ===");
        for &member in &members {
            if let Some(user) = prog.user_proc_mut(member) {
                user.status = ProcStatus::Final;
            }
            let name = prog.proc(member).map_or_else(String::new, |p| p.name().to_string());
            project.alert_end_decompile(&name);
        }
        Ok(())
    }

    fn decompile_proc_in_recursion_group(
        &mut self,
        prog: &mut Program,
        project: &mut Project,
        proc: ProcId,
        group: &ProcSetRef,
        visited: &mut ProcSet,
    ) -> Result<bool> {
        let mut changed = false;
        visited.insert(proc);
        self.call_stack.push(proc);

        // Unvisited group callees first (depth first)
        let mut callees: Vec<ProcId> = Vec::new();
        if let Some(user) = prog.user_proc(proc) {
            user.cfg.for_each_statement(&mut |_, stmt| {
                if let StatementKind::Call(call) = &stmt.kind {
                    if let Some(id) = call.dest_proc {
                        if !callees.contains(&id) {
                            callees.push(id);
                        }
                    }
                }
            });
        }
        for callee in callees {
            if prog.proc(callee).map_or(true, Procedure::is_lib) {
                continue;
            }
            if visited.contains(&callee) || !group.borrow().contains(&callee) {
                continue;
            }
            changed |=
                self.decompile_proc_in_recursion_group(prog, project, callee, group, visited)?;
        }

        // So the calls are treated as childless
        if let Some(user) = prog.user_proc_mut(proc) {
            user.status = ProcStatus::InCycle;
        }
        let name = prog.proc(proc).map_or_else(String::new, |p| p.name().to_string());
        project.alert_decompiling(&name);

        self.early_decompile(prog, project, proc)?;
        // The standard preservation analysis performs conditional
        // preservation for the group
        self.middle_decompile(prog, project, proc)?;
        if let Some(user) = prog.user_proc_mut(proc) {
            user.status = ProcStatus::Preserveds;
        }

        self.mark_as_non_childless(prog, proc, group);

        // Propagate into the initial arguments before unused statements go
        changed |= self.run_pass(prog, project, PassId::LocalAndParamMap, proc)?;
        changed |= self.run_pass(prog, project, PassId::CallArgumentUpdate, proc)?;
        changed |= self.run_pass(prog, project, PassId::Dominators, proc)?;
        changed |= self.run_pass(prog, project, PassId::StatementPropagation, proc)?;

        debug_assert_eq!(self.call_stack.last(), Some(&proc));
        self.call_stack.pop();
        Ok(changed)
    }

    /// Links every call to a group peer with the peer's return statement.
    fn mark_as_non_childless(&self, prog: &mut Program, proc: ProcId, group: &ProcSetRef) {
        let peers: Vec<ProcId> = group.borrow().iter().copied().collect();
        let mut ret_ids: FxHashMap<ProcId, Option<crate::ir::StatementId>> = FxHashMap::default();
        for &peer in &peers {
            ret_ids.insert(peer, prog.user_proc(peer).and_then(|p| p.ret_stmt_id()));
        }
        if let Some(user) = prog.user_proc_mut(proc) {
            user.cfg.for_each_statement_mut(&mut |_, stmt| {
                if let StatementKind::Call(call) = &mut stmt.kind {
                    if let Some(dest) = call.dest_proc {
                        if let Some(ret) = ret_ids.get(&dest) {
                            call.callee_return = *ret;
                        }
                    }
                }
            });
        }
    }

    /// Promotes the inferred parameters and return into the signature.
    fn promote_signature(&self, prog: &mut Program, proc: ProcId) {
        if let Some(user) = prog.user_proc_mut(proc) {
            if user.signature.forced || user.promoted {
                return;
            }
            user.signature.params = user.params.clone();
            if user.ret_stmt().is_some_and(|r| !r.returns.is_empty()) {
                user.signature.ret_type = crate::ir::Type::int();
            }
            user.promoted = true;
        }
    }

    /// Saves every recovered high-level indirect transfer with the decoder,
    /// keyed by address, so the coming redecode replays them.
    fn save_decoded_icts(&self, prog: &mut Program, project: &mut Project, proc: ProcId) {
        let mut saved: Vec<(crate::ir::Address, crate::ir::Rtl)> = Vec::new();
        if let Some(user) = prog.user_proc(proc) {
            for block in user.cfg.blocks() {
                let Some(last) = block.last_statement() else {
                    continue;
                };
                if !last.is_hl_transfer() {
                    continue;
                }
                if let Some(rtl) = block.rtls.last() {
                    if project.settings.debug_switch {
                        log::info!("Saving high level switch statement: {rtl}");
                    }
                    // Strip SSA subscripts: the redecoded procedure gets a
                    // fresh numbering and the old definitions are gone
                    let mut rtl = rtl.clone();
                    for stmt in &mut rtl.statements {
                        stmt.map_uses(&mut |e| e.strip_subscripts());
                    }
                    saved.push((rtl.addr, rtl));
                }
            }
        }
        for (addr, rtl) in saved {
            project.decoder_mut().save_decoded_rtl(addr, rtl);
        }
    }

    fn print_call_stack(&self, prog: &Program) {
        log::info!("Call stack (most recent procedure last):");
        for &p in &self.call_stack {
            if let Some(proc) = prog.proc(p) {
                log::info!("    {}", proc.name());
            }
        }
    }
}

impl Default for ProcDecompiler {
    fn default() -> Self {
        Self::new()
    }
}
