//! Dataflow passes: dominators, phi placement, and SSA rename.

use crate::analysis::dataflow::{place_phis, rename_variables, update_dominators};
use crate::passes::{Pass, PassContext, PassId};
use crate::Result;

/// Recomputes the dominator tree and dominance frontiers.
pub struct DominatorsPass;

impl Pass for DominatorsPass {
    fn id(&self) -> PassId {
        PassId::Dominators
    }

    fn name(&self) -> &'static str {
        "Dominators"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        update_dominators(&mut ctx.proc.cfg);
        Ok(false)
    }
}

/// Inserts phi statements at the iterated dominance frontiers of every
/// renamed variable's definition sites.
pub struct PhiPlacementPass;

impl Pass for PhiPlacementPass {
    fn id(&self) -> PassId {
        PassId::PhiPlacement
    }

    fn name(&self) -> &'static str {
        "PhiPlacement"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let proc = &mut *ctx.proc;
        proc.sync_statement_ids();
        let mut counter = *proc.statement_counter_mut();
        let changed = place_phis(&mut proc.cfg, &mut counter);
        *proc.statement_counter_mut() = counter;
        Ok(changed)
    }
}

/// Renames variable uses to refer to their unique reaching definitions.
pub struct BlockVarRenamePass;

impl Pass for BlockVarRenamePass {
    fn id(&self) -> PassId {
        PassId::BlockVarRename
    }

    fn name(&self) -> &'static str {
        "BlockVarRename"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        // A phi fed by a block that is not a predecessor means an edge update
        // lost its incoming maintenance; renaming on top of that would link
        // uses to definitions on paths that do not exist
        let cfg = &ctx.proc.cfg;
        let mut violation = None;
        cfg.for_each_statement(&mut |bb, stmt| {
            if let crate::ir::StatementKind::PhiAssign(phi) = &stmt.kind {
                let preds = cfg.block(bb).map(|b| b.predecessors().to_vec()).unwrap_or_default();
                for pred in phi.incoming.keys() {
                    if !preds.contains(pred) {
                        violation = Some((stmt.id, *pred, bb));
                    }
                }
            }
        });
        if let Some((id, pred, bb)) = violation {
            return Err(invariant_error!(
                "phi {} in {} has an incoming from {}, which is not a predecessor",
                id,
                bb,
                pred
            ));
        }

        Ok(rename_variables(&mut ctx.proc.cfg))
    }
}
