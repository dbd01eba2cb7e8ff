//! Branch analysis: fusing branch chains into short-circuit conditions.

use crate::analysis::cfg::{BlockId, BlockType, BELSE, BTHEN};
use crate::ir::{simplify, Exp, Operator, StatementKind};
use crate::passes::{Pass, PassContext, PassId};
use crate::Result;

/// Whether `bb` consists of nothing but its branch statement.
fn is_bare_branch(cfg: &crate::analysis::cfg::Cfg, bb: BlockId) -> bool {
    let Some(block) = cfg.block(bb) else {
        return false;
    };
    if block.kind != BlockType::TwoWay {
        return false;
    }
    let mut count = 0;
    block.for_each_statement(&mut |_| count += 1);
    count == 1 && matches!(block.last_statement().map(|s| &s.kind), Some(StatementKind::Branch(_)))
}

/// The (taken, fall-through) targets of `bb` when it is a bare branch whose
/// only predecessor is `pred`.
fn bare_branch_targets(
    cfg: &crate::analysis::cfg::Cfg,
    bb: BlockId,
    pred: BlockId,
) -> Option<(BlockId, BlockId)> {
    if bb == pred || !is_bare_branch(cfg, bb) {
        return None;
    }
    let block = cfg.block(bb)?;
    if block.predecessors() != [pred] {
        return None;
    }
    Some((block.successor(BTHEN)?, block.successor(BELSE)?))
}

/// Fuses two-way chains into `&&`/`||` conditions.
///
/// The two compiler shapes:
///
/// ```text
///   if (c1) goto X            if (c1) goto B2
///   if (c2) goto X     and    B2: if (c2) goto X, else goto Y
///   ...                       ... where B1's else is also Y
/// ```
///
/// become `if (c1 || c2) goto X` and `if (c1 && c2) goto X` respectively,
/// when the middle block holds nothing but its branch and has no other
/// predecessors. Phi incomings follow the retargeted edges.
pub struct BranchAnalysisPass;

impl Pass for BranchAnalysisPass {
    fn id(&self) -> PassId {
        PassId::BranchAnalysis
    }

    fn name(&self) -> &'static str {
        "BranchAnalysis"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let cfg = &mut ctx.proc.cfg;
        let mut changed = false;

        // One candidate per sweep; fusing invalidates the scan
        loop {
            let mut fused = false;

            for b1 in cfg.block_ids().collect::<Vec<_>>() {
                let Some(block1) = cfg.block(b1) else {
                    continue;
                };
                if block1.kind != BlockType::TwoWay {
                    continue;
                }
                let Some(cond1) = block1.condition() else {
                    continue;
                };
                let Some(taken1) = block1.successor(BTHEN) else {
                    continue;
                };
                let Some(else1) = block1.successor(BELSE) else {
                    continue;
                };

                // Or-shape: fall through into a bare branch with the same
                // target. And-shape: taken edge into a bare branch that
                // falls back out to the same fall-through.
                let or_shape = bare_branch_targets(cfg, else1, b1)
                    .filter(|&(t, _)| t == taken1)
                    .map(|targets| (else1, Operator::Or, targets));
                let and_shape = bare_branch_targets(cfg, taken1, b1)
                    .filter(|&(_, e)| e == else1)
                    .map(|targets| (taken1, Operator::And, targets));

                let Some((middle, op, (new_taken, new_else))) = or_shape.or(and_shape) else {
                    continue;
                };
                let Some(cond2) = cfg.block(middle).and_then(|b| b.condition()) else {
                    continue;
                };

                // Snapshot the middle block's phi contributions before the
                // edge surgery prunes them
                let fused_cond = simplify(&Exp::binary(op, cond1, cond2));
                let mut carried: Vec<(BlockId, crate::ir::StatementId, crate::ir::StatementId)> =
                    Vec::new();
                for succ in [new_taken, new_else] {
                    let Some(block) = cfg.block(succ) else {
                        continue;
                    };
                    block.for_each_statement(&mut |stmt| {
                        if let StatementKind::PhiAssign(phi) = &stmt.kind {
                            if let Some(Some(def)) = phi.incoming.get(&middle).copied() {
                                carried.push((succ, stmt.id, def));
                            }
                        }
                    });
                }

                cfg.remove_edge(b1, taken1);
                cfg.remove_edge(b1, else1);
                cfg.remove_edge(middle, new_taken);
                cfg.remove_edge(middle, new_else);
                cfg.add_edge(b1, new_taken);
                cfg.add_edge(b1, new_else);

                // The fused block now contributes what the middle block did
                for (succ, phi_id, def) in carried {
                    if let Some(block) = cfg.block_mut(succ) {
                        block.for_each_statement_mut(&mut |stmt| {
                            if stmt.id == phi_id {
                                if let StatementKind::PhiAssign(phi) = &mut stmt.kind {
                                    phi.incoming.insert(b1, Some(def));
                                }
                            }
                        });
                    }
                }

                let dest = cfg
                    .block(new_taken)
                    .map_or(crate::ir::Address::INVALID, |b| b.low_addr());
                if let Some(stmt) = cfg.block_mut(b1).and_then(|b| b.last_statement_mut()) {
                    if let StatementKind::Branch(branch) = &mut stmt.kind {
                        branch.cond = Some(fused_cond);
                        branch.dest = dest;
                    }
                }
                // The middle block is now unreachable; empty it out
                if let Some(block) = cfg.block_mut(middle) {
                    block.rtls.clear();
                    block.kind = BlockType::Invalid;
                }

                fused = true;
                changed = true;
                break;
            }

            if !fused {
                break;
            }
        }

        Ok(changed)
    }
}
