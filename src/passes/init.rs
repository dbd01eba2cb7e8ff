//! Initialization passes: statement numbering and constant-branch cleanup.

use crate::analysis::cfg::BlockType;
use crate::ir::{GotoStatement, StatementKind};
use crate::passes::{Pass, PassContext, PassId};
use crate::Result;

/// Numbers freshly decoded statements and canonicalizes them.
///
/// Decoded statements arrive with the placeholder id 0; this pass hands out
/// monotonic ids and runs one simplification sweep. Statements that already
/// carry an id keep it, which makes the pass idempotent and safe to re-run
/// after the indirect-transfer restart merges newly decoded blocks in.
pub struct StatementInitPass;

impl Pass for StatementInitPass {
    fn id(&self) -> PassId {
        PassId::StatementInit
    }

    fn name(&self) -> &'static str {
        "StatementInit"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        ctx.proc.sync_statement_ids();
        let mut changed = false;

        // Two phases to keep the borrow on the counter local
        let mut pending = 0usize;
        ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
            if stmt.id.value() == 0 {
                pending += 1;
            }
        });

        if pending > 0 {
            let counter = ctx.proc.statement_counter_mut();
            let mut next = *counter;
            // Re-borrow the CFG after the counter copy
            let proc = &mut *ctx.proc;
            proc.cfg.for_each_statement_mut(&mut |_, stmt| {
                if stmt.id.value() == 0 {
                    next += 1;
                    stmt.id = crate::ir::StatementId(next);
                }
            });
            *proc.statement_counter_mut() = next;
            changed = true;
        }

        ctx.proc.cfg.for_each_statement_mut(&mut |_, stmt| {
            changed |= stmt.simplify();
        });

        Ok(changed)
    }
}

/// Resolves branches whose condition simplified to a constant.
///
/// A constant-true branch becomes an unconditional goto and loses its
/// fall-through edge; a constant-false branch is deleted and the block falls
/// through. Dead edges take their phi incomings with them.
pub struct BBSimplifyPass;

impl Pass for BBSimplifyPass {
    fn id(&self) -> PassId {
        PassId::BBSimplify
    }

    fn name(&self) -> &'static str {
        "BBSimplify"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let mut changed = false;
        let cfg = &mut ctx.proc.cfg;

        for bb in cfg.block_ids().collect::<Vec<_>>() {
            let block = cfg.block(bb).expect("iterating live ids");
            if block.kind != BlockType::TwoWay {
                continue;
            }
            let Some(stmt) = block.last_statement() else {
                continue;
            };
            let StatementKind::Branch(branch) = &stmt.kind else {
                continue;
            };
            let Some(cond_val) = branch.cond.as_ref().and_then(|c| c.int_value()) else {
                continue;
            };
            let dest = branch.dest;
            let taken = block.successor(crate::analysis::cfg::BTHEN);
            let fallthrough = block.successor(crate::analysis::cfg::BELSE);

            if cond_val != 0 {
                // Always taken: drop the fall-through edge
                if let (Some(_), Some(ft)) = (taken, fallthrough) {
                    cfg.remove_edge(bb, ft);
                }
                let block = cfg.block_mut(bb).expect("iterating live ids");
                block.kind = BlockType::OneWay;
                if let Some(stmt) = block.last_statement_mut() {
                    stmt.kind = StatementKind::Goto(GotoStatement {
                        dest: crate::ir::Exp::addr(dest),
                    });
                }
            } else {
                // Never taken: drop the branch and the taken edge
                if let Some(t) = taken {
                    cfg.remove_edge(bb, t);
                }
                let block = cfg.block_mut(bb).expect("iterating live ids");
                block.kind = BlockType::Fall;
                if let Some(rtl) = block.rtls.last_mut() {
                    rtl.statements.pop();
                }
            }
            changed = true;
        }

        Ok(changed)
    }
}
