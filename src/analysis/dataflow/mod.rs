//! Dominators, dominance frontiers, and SSA construction.

mod dominators;
mod ssa;

pub use dominators::{
    compute_dominance_frontiers, compute_dominators, DominatorTree, FlowGraph, ReverseGraph,
};
pub use ssa::{place_phis, rename_variables, update_dominators};

use rustc_hash::FxHashSet;

use crate::analysis::cfg::BlockId;

/// Per-procedure dataflow side-structure, owned by the CFG.
///
/// Populated by the `Dominators`, `PhiPlacement` and `BlockVarRename` passes;
/// cleared wholesale when the indirect-transfer restart protocol redecodes
/// the procedure.
#[derive(Debug, Clone, Default)]
pub struct DataFlow {
    /// Dominator tree, when computed.
    pub dom: Option<DominatorTree>,
    /// Dominance frontier per block, parallel to the block table.
    pub frontiers: Vec<FxHashSet<BlockId>>,
    /// Whether memory locations participate in SSA renaming yet.
    ///
    /// Off until the middle-decompile fixpoint has stabilized address
    /// expressions; renaming memofs earlier links uses to the wrong
    /// definitions when propagation later rewrites the addresses.
    pub rename_locals_params: bool,
}

impl DataFlow {
    /// Enables or disables renaming of memory locations.
    pub fn set_rename_locals_params(&mut self, enable: bool) {
        self.rename_locals_params = enable;
    }
}
