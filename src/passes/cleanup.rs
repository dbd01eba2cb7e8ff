//! Dead-code cleanups: unused statements and unused locals.

use rustc_hash::FxHashSet;

use crate::ir::{Exp, ExpRewrite, StatementKind};
use crate::passes::{use_counts, Pass, PassContext, PassId};
use crate::Result;

/// Removes definitions with no remaining uses.
///
/// Runs to a local fixpoint: removing one dead definition can kill the uses
/// that kept another alive. Memory and global writes are observable and
/// never removed; calls stay for their side effects even when their results
/// are dead.
pub struct UnusedStatementRemovalPass;

impl Pass for UnusedStatementRemovalPass {
    fn id(&self) -> PassId {
        PassId::UnusedStatementRemoval
    }

    fn name(&self) -> &'static str {
        "UnusedStatementRemoval"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let cfg = &mut ctx.proc.cfg;
        let mut changed = false;

        loop {
            let counts = use_counts(cfg);
            let mut removed = false;

            for bb in cfg.block_ids().collect::<Vec<_>>() {
                let block = cfg.block_mut(bb).expect("iterating live ids");
                for rtl in &mut block.rtls {
                    rtl.statements.retain(|stmt| {
                        let removable = match &stmt.kind {
                            StatementKind::Assign(a) => {
                                let base = a.lhs.strip_subscripts();
                                !base.is_mem_of()
                                    && base.oper() != crate::ir::Operator::Global
                                    && base.is_location()
                            }
                            StatementKind::PhiAssign(_) | StatementKind::ImplicitAssign(_) => true,
                            _ => false,
                        };
                        if !removable {
                            return true;
                        }
                        if counts.get(&stmt.id).copied().unwrap_or(0) > 0 {
                            return true;
                        }
                        removed = true;
                        false
                    });
                }
            }

            changed |= removed;
            if !removed {
                break;
            }
        }

        Ok(changed)
    }
}

/// Drops locals that no statement references any more.
pub struct UnusedLocalRemovalPass;

impl Pass for UnusedLocalRemovalPass {
    fn id(&self) -> PassId {
        PassId::UnusedLocalRemoval
    }

    fn name(&self) -> &'static str {
        "UnusedLocalRemoval"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let mut referenced: FxHashSet<String> = FxHashSet::default();
        ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
            let mut record = |e: &crate::ir::SharedExp| {
                e.visit_pre(&mut |sub| {
                    if let Exp::Unary(crate::ir::Operator::Local, name) = &**sub {
                        if let Exp::Const(crate::ir::Value::Str(name)) = &**name {
                            referenced.insert(name.clone());
                        }
                    }
                    true
                });
            };
            stmt.for_each_use(&mut record);
            for def in stmt.defines() {
                record(&def);
            }
        });

        // Symbol-mapped expressions keep their locals alive as well: the
        // back end prints the name wherever the expression occurs
        for (exp, name) in &ctx.proc.symbols {
            if ctx.proc.locals.contains_key(name) {
                let mut found = false;
                ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
                    if found {
                        return;
                    }
                    stmt.for_each_use(&mut |e| {
                        if e.strip_subscripts().search(&exp.strip_subscripts()) {
                            found = true;
                        }
                    });
                    for def in stmt.defines() {
                        if def.strip_subscripts().search(&exp.strip_subscripts()) {
                            found = true;
                        }
                    }
                });
                if found {
                    referenced.insert(name.clone());
                }
            }
        }

        let before = ctx.proc.locals.len();
        ctx.proc.locals.retain(|name, _| referenced.contains(name));
        Ok(ctx.proc.locals.len() != before)
    }
}
