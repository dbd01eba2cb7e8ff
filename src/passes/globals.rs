//! Read-only data folding.

use crate::ir::{Exp, ExpRewrite, Operator};
use crate::passes::{Pass, PassContext, PassId};
use crate::Result;

/// Replaces loads from read-only sections with the loaded constant.
///
/// A `m[K]` whose address lands in a readable, non-writable section cannot
/// change at runtime, so the load folds to the image's word at `K`. Writable
/// data is never folded.
pub struct GlobalConstReplacePass;

impl Pass for GlobalConstReplacePass {
    fn id(&self) -> PassId {
        PassId::GlobalConstReplace
    }

    fn name(&self) -> &'static str {
        "GlobalConstReplace"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let image = ctx.prog.image();
        let mut changed = false;

        ctx.proc.cfg.for_each_statement_mut(&mut |_, stmt| {
            let ch = stmt.map_uses(&mut |e| {
                e.map_post(&mut |sub| {
                    // Match m[K] and m[K]{-} (never a real definition's value)
                    let mem = match &**sub {
                        Exp::Subscript(base, None) if base.is_mem_of() => base,
                        Exp::Unary(Operator::MemOf, _) => sub,
                        _ => return sub.clone(),
                    };
                    let Some(addr) = mem.sub1().addr_value() else {
                        return sub.clone();
                    };
                    let Some(section) = image.section_by_addr(addr) else {
                        return sub.clone();
                    };
                    if !section.readable || section.writable {
                        return sub.clone();
                    }
                    match image.read_native4(addr) {
                        Some(word) => Exp::int(i64::from(word as i32)),
                        None => sub.clone(),
                    }
                })
            });
            if ch {
                stmt.simplify();
                changed = true;
            }
        });

        Ok(changed)
    }
}
