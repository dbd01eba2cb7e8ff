//! Named transformation passes over a single procedure.
//!
//! Every pass implements [`Pass`]: a pure-by-convention transformation of one
//! [`UserProc`] returning whether anything changed. The [`PassManager`] is a
//! registry keyed by the stable [`PassId`] identifiers; the driver composes
//! its early/middle/late sequences from this registry by id.
//!
//! Passes are idempotent at fixpoint: running a pass twice in a row returns
//! `false` the second time.

mod branch;
mod call;
mod cleanup;
mod dataflow;
mod globals;
mod init;
mod parameters;
mod preservation;
mod propagate;
mod types;

use rustc_hash::FxHashMap;

pub use preservation::{update_modifieds, update_returns};

use crate::analysis::cfg::Cfg;
use crate::ir::{Exp, ExpRewrite, SharedExp, StatementId, StatementKind};
use crate::program::{ProcId, Procedure, Program, UserProc};
use crate::project::Settings;
use crate::Result;

/// Stable identifiers of the registered passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    /// Number fresh statements and canonicalize them.
    StatementInit,
    /// Resolve constant branch conditions and drop dead edges.
    BBSimplify,
    /// (Re)compute dominators and dominance frontiers.
    Dominators,
    /// Insert phi statements at dominance frontiers.
    PhiPlacement,
    /// SSA-rename variable uses over the dominator tree.
    BlockVarRename,
    /// Inline definitions into their uses.
    StatementPropagation,
    /// Refresh call defines from callee information.
    CallDefineUpdate,
    /// Refresh call arguments from callee parameters.
    CallArgumentUpdate,
    /// Bypass preserved locations across calls; collapse degenerate phis.
    CallAndPhiFix,
    /// Fold loads from read-only data into constants.
    GlobalConstReplace,
    /// Prove the stack pointer preserved.
    SPPreservation,
    /// Prove and subtract preserved locations from returns.
    PreservationAnalysis,
    /// Drop dead copy assignments (readability cleanup).
    AssignRemoval,
    /// Rewrite compiler strength reduction back to multiplies.
    StrengthReductionReversal,
    /// Local bidirectional type inference.
    LocalTypeAnalysis,
    /// Remove statements with no remaining uses.
    UnusedStatementRemoval,
    /// Drop locals no statement references.
    UnusedLocalRemoval,
    /// Turn implicit uses into final parameters.
    FinalParameterSearch,
    /// Remove duplicate call arguments.
    DuplicateArgsRemoval,
    /// Give parameters symbolic names.
    ParameterSymbolMap,
    /// Map stack slots to named locals and parameters.
    LocalAndParamMap,
    /// Fuse branch chains into short-circuit conditions.
    BranchAnalysis,
}

/// Everything a pass may see: the procedure (exclusively borrowed) and a
/// read-only view of the rest of the program.
///
/// The procedure is detached from the program's arena while the pass runs,
/// so `prog` never aliases `proc`; a callee lookup that resolves to the
/// procedure itself reports `None` (the call is treated as childless, which
/// is exactly the recursion-group semantics).
pub struct PassContext<'a> {
    /// Id of the procedure being transformed.
    pub proc_id: ProcId,
    /// The procedure being transformed.
    pub proc: &'a mut UserProc,
    /// The rest of the program (this procedure's slot is empty).
    pub prog: &'a Program,
    /// Read-only settings.
    pub settings: &'a Settings,
}

impl PassContext<'_> {
    /// Resolves a callee, treating self-calls as childless.
    #[must_use]
    pub fn callee(&self, id: ProcId) -> Option<&Procedure> {
        if id == self.proc_id {
            None
        } else {
            self.prog.proc(id)
        }
    }
}

/// A named transformation of one procedure.
pub trait Pass {
    /// The registry identifier.
    fn id(&self) -> PassId;
    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
    /// Runs the pass. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// An `Error::Invariant` aborts the procedure (it is marked undecoded
    /// and the pipeline moves on); other errors propagate.
    fn execute(&self, ctx: &mut PassContext) -> Result<bool>;
}

/// Registry of all passes, keyed by [`PassId`].
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    /// Builds the registry with every pass registered.
    #[must_use]
    pub fn new() -> PassManager {
        let passes: Vec<Box<dyn Pass>> = vec![
            Box::new(init::StatementInitPass),
            Box::new(init::BBSimplifyPass),
            Box::new(dataflow::DominatorsPass),
            Box::new(dataflow::PhiPlacementPass),
            Box::new(dataflow::BlockVarRenamePass),
            Box::new(propagate::StatementPropagationPass),
            Box::new(call::CallDefineUpdatePass),
            Box::new(call::CallArgumentUpdatePass),
            Box::new(call::CallAndPhiFixPass),
            Box::new(globals::GlobalConstReplacePass),
            Box::new(preservation::SpPreservationPass),
            Box::new(preservation::PreservationAnalysisPass),
            Box::new(propagate::AssignRemovalPass),
            Box::new(propagate::StrengthReductionReversalPass),
            Box::new(types::LocalTypeAnalysisPass),
            Box::new(cleanup::UnusedStatementRemovalPass),
            Box::new(cleanup::UnusedLocalRemovalPass),
            Box::new(parameters::FinalParameterSearchPass),
            Box::new(call::DuplicateArgsRemovalPass),
            Box::new(parameters::ParameterSymbolMapPass),
            Box::new(parameters::LocalAndParamMapPass),
            Box::new(branch::BranchAnalysisPass),
        ];
        PassManager { passes }
    }

    /// Looks up a pass by id.
    #[must_use]
    pub fn pass(&self, id: PassId) -> &dyn Pass {
        self.passes
            .iter()
            .find(|p| p.id() == id)
            .expect("every PassId is registered")
            .as_ref()
    }

    /// Executes the pass with the given id.
    ///
    /// # Errors
    ///
    /// Propagates the pass's failure.
    pub fn execute(&self, id: PassId, ctx: &mut PassContext) -> Result<bool> {
        let pass = self.pass(id);
        let changed = pass.execute(ctx)?;
        log::debug!(
            "pass {} on '{}': {}",
            pass.name(),
            ctx.proc.name,
            if changed { "changed" } else { "no change" }
        );
        Ok(changed)
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Shared dataflow helpers
// ---------------------------------------------------------------------------

/// What kind of statement a definition id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DefKind {
    Assign,
    Phi,
    Implicit,
    Call,
    Other,
}

/// Index of definitions: id to (kind, lhs base, rhs for assigns).
pub(crate) fn def_index(
    cfg: &Cfg,
) -> FxHashMap<StatementId, (DefKind, SharedExp, Option<SharedExp>)> {
    let mut index = FxHashMap::default();
    cfg.for_each_statement(&mut |_, stmt| {
        let entry = match &stmt.kind {
            StatementKind::Assign(a) => {
                Some((DefKind::Assign, a.lhs.strip_subscripts(), Some(a.rhs.clone())))
            }
            StatementKind::PhiAssign(p) => {
                Some((DefKind::Phi, p.lhs.strip_subscripts(), None))
            }
            StatementKind::ImplicitAssign(i) => {
                Some((DefKind::Implicit, i.lhs.strip_subscripts(), None))
            }
            StatementKind::Call(_) => Some((
                DefKind::Call,
                Exp::terminal(crate::ir::Operator::DefineAll),
                None,
            )),
            _ => None,
        };
        if let Some(entry) = entry {
            index.insert(stmt.id, entry);
        }
    });
    index
}

/// Counts how many times each definition is used: SSA subscripts in use
/// positions plus phi incomings.
///
/// Reaching-definition collectors are deliberately not counted: they are
/// bookkeeping snapshots, and argument materialization re-validates its
/// collector entries against the live definition index.
pub(crate) fn use_counts(cfg: &Cfg) -> FxHashMap<StatementId, usize> {
    let mut counts: FxHashMap<StatementId, usize> = FxHashMap::default();
    cfg.for_each_statement(&mut |_, stmt| {
        for use_exp in stmt.uses() {
            if let Exp::Subscript(_, Some(def)) = &*use_exp {
                *counts.entry(*def).or_insert(0) += 1;
            }
        }
        if let StatementKind::PhiAssign(p) = &stmt.kind {
            for def in p.incoming.values().flatten() {
                *counts.entry(*def).or_insert(0) += 1;
            }
        }
    });
    counts
}
