//! Indirect jump and call recovery.
//!
//! After SSA and propagation, a computed jump's destination expression has
//! collapsed far enough to pattern-match the compiler's switch idioms: an
//! indexed load from a constant table, bounded by a dominating guard branch.
//! On a match the jump is rewritten to a high-level `Case` statement carrying
//! the decoded table; the driver then restarts the procedure so the new
//! targets get decoded into the CFG.
//!
//! An unrecognized transfer is left as a computed jump; the back end prints
//! it as a `goto <dest-expr>` comment.

use crate::analysis::cfg::{BlockType, BELSE, BTHEN};
use crate::ir::{
    Address, CaseStatement, Exp, ExpRewrite, Operator, SharedExp, StatementKind, SwitchInfo,
    SwitchKind,
};
use crate::program::{Program, UserProc};
use crate::project::Settings;

/// Sanity cap on recovered table sizes.
const MAX_SWITCH_CASES: usize = 512;

/// A matched table access: the switched expression, the table base, and the
/// table layout.
struct TableMatch {
    index: SharedExp,
    table: Address,
    kind: SwitchKind,
}

/// Matches the destination expression (in stripped form) against the known
/// switch-table idioms.
fn match_table_expr(dest: &SharedExp, word_bytes: u8) -> Option<TableMatch> {
    // Offset table: m[idx * w + T] + T
    if let Exp::Binary(Operator::Plus, mem, base) = &**dest {
        if let (Some(inner), Some(base_addr)) = (match_indexed_load(mem, word_bytes), base.addr_value())
        {
            if inner.1 == base_addr {
                return Some(TableMatch {
                    index: inner.0,
                    table: inner.1,
                    kind: SwitchKind::Offset,
                });
            }
        }
    }
    // Fortran-style: m[m[idx * w + T]]
    if let Exp::Unary(Operator::MemOf, inner) = &**dest {
        if let Some((index, table)) = match_indexed_load(inner, word_bytes) {
            return Some(TableMatch {
                index,
                table,
                kind: SwitchKind::Fortran,
            });
        }
    }
    // Uniform table of addresses: m[idx * w + T]
    if let Some((index, table)) = match_indexed_load(dest, word_bytes) {
        return Some(TableMatch {
            index,
            table,
            kind: SwitchKind::Uniform,
        });
    }
    None
}

/// Matches `m[idx * w + T]`, the indexed load shared by all idioms.
fn match_indexed_load(e: &SharedExp, word_bytes: u8) -> Option<(SharedExp, Address)> {
    let Exp::Unary(Operator::MemOf, addr) = &**e else {
        return None;
    };
    let Exp::Binary(Operator::Plus, scaled, table) = &**addr else {
        return None;
    };
    let table = table.addr_value()?;
    let Exp::Binary(Operator::Mult, index, stride) = &**scaled else {
        return None;
    };
    if stride.int_value()? != i64::from(word_bytes) {
        return None;
    }
    Some((index.clone(), table))
}

/// A guard branch bounding the switched expression: the number of cases and
/// the default target, when one exists.
struct Guard {
    num_cases: usize,
    default: Option<Address>,
}

/// Finds a two-way block whose condition bounds `index`.
fn find_guard(proc: &UserProc, index: &SharedExp) -> Option<Guard> {
    for block in proc.cfg.blocks() {
        if block.kind != BlockType::TwoWay {
            continue;
        }
        let Some(cond) = block.condition() else {
            continue;
        };
        let stripped = cond.strip_subscripts();
        let Exp::Binary(op, lhs, bound) = &*stripped else {
            continue;
        };
        if lhs.strip_subscripts() != *index {
            continue;
        }
        let Some(k) = bound.int_value() else {
            continue;
        };
        if k < 0 {
            continue;
        }

        // `idx > K` jumps to the default; `idx <= K` jumps into the switch
        let (num_cases, default_succ) = match op {
            Operator::GtrUns | Operator::Gtr => (k as usize + 1, block.successor(BTHEN)),
            Operator::GtrEqUns | Operator::GtrEq => (k as usize, block.successor(BTHEN)),
            Operator::LessEqUns | Operator::LessEq => (k as usize + 1, block.successor(BELSE)),
            Operator::LessUns | Operator::Less => (k as usize, block.successor(BELSE)),
            _ => continue,
        };
        let default = default_succ
            .and_then(|bb| proc.cfg.block(bb))
            .map(|b| b.low_addr());
        return Some(Guard { num_cases, default });
    }
    None
}

/// Scans every computed jump and call in `proc`, rewriting the recognizable
/// ones to high-level transfers.
///
/// Returns whether anything was rewritten; the caller must then restart
/// decompilation of the procedure, because the recovered targets are not in
/// the CFG yet.
pub fn decode_indirect_transfers(
    proc: &mut UserProc,
    prog: &Program,
    settings: &Settings,
) -> bool {
    let mut changed = false;

    for bb in proc.cfg.block_ids().collect::<Vec<_>>() {
        let kind = proc.cfg.block(bb).map(|b| b.kind);
        match kind {
            Some(BlockType::CompJump) => changed |= decode_switch(proc, prog, settings, bb),
            Some(BlockType::Call) => resolve_computed_call(proc, prog, bb),
            _ => {}
        }
    }

    changed
}

fn decode_switch(
    proc: &mut UserProc,
    prog: &Program,
    settings: &Settings,
    bb: crate::analysis::cfg::BlockId,
) -> bool {
    let Some(block) = proc.cfg.block(bb) else {
        return false;
    };
    let Some(stmt) = block.last_statement() else {
        return false;
    };
    let dest = match &stmt.kind {
        StatementKind::Goto(g) => g.dest.clone(),
        StatementKind::Case(c) if c.info.is_none() => c.dest.clone(),
        _ => return false,
    };

    let stripped = dest.strip_subscripts();
    let Some(matched) = match_table_expr(&stripped, prog.word_bytes) else {
        log::debug!(
            "unrecognized indirect transfer in '{}': {}",
            proc.name,
            stripped
        );
        return false;
    };
    let Some(guard) = find_guard(proc, &matched.index) else {
        log::debug!(
            "no bounding guard for indirect transfer in '{}': {}",
            proc.name,
            stripped
        );
        return false;
    };
    if guard.num_cases == 0 || guard.num_cases > MAX_SWITCH_CASES {
        return false;
    }

    // Decode the table entries
    let word = u64::from(prog.word_bytes);
    let mut targets = Vec::with_capacity(guard.num_cases);
    for i in 0..guard.num_cases {
        let entry_addr = matched.table.offset_by(i as u64 * word);
        let Some(entry) = prog.image().read_native_word(entry_addr, prog.word_bytes) else {
            return false;
        };
        let target = match matched.kind {
            SwitchKind::Uniform | SwitchKind::Fortran => Address(entry),
            SwitchKind::Offset => matched.table.offset_by(entry),
        };
        if prog.image().section_by_addr(target).is_none() {
            return false; // not a table of code addresses after all
        }
        targets.push(target);
    }

    if settings.debug_switch {
        log::info!(
            "recovered {:?} switch in '{}': table {} with {} cases, default {:?}",
            matched.kind,
            proc.name,
            matched.table,
            targets.len(),
            guard.default
        );
    }

    let info = SwitchInfo {
        exp: matched.index.clone(),
        kind: matched.kind,
        table_addr: matched.table,
        lower: 0,
        upper: guard.num_cases as i64 - 1,
        num_cases: guard.num_cases,
        targets,
        default: guard.default,
    };

    let block = proc.cfg.block_mut(bb).expect("checked above");
    block.kind = BlockType::Nway;
    if let Some(stmt) = block.last_statement_mut() {
        stmt.kind = StatementKind::Case(CaseStatement {
            dest,
            info: Some(info),
        });
    }
    true
}

/// Resolves a computed call through an import slot: `call m[K]` where the
/// image knows the symbol loaded at `K`.
fn resolve_computed_call(proc: &mut UserProc, prog: &Program, bb: crate::analysis::cfg::BlockId) {
    let Some(block) = proc.cfg.block(bb) else {
        return;
    };
    let Some(stmt) = block.last_statement() else {
        return;
    };
    let StatementKind::Call(call) = &stmt.kind else {
        return;
    };
    if call.dest_proc.is_some() || !call.is_computed() {
        return;
    }
    let stripped = call.dest.strip_subscripts();
    let Exp::Unary(Operator::MemOf, slot) = &*stripped else {
        return;
    };
    let Some(slot_addr) = slot.addr_value() else {
        return;
    };
    let Some(name) = prog.image().symbol_at(slot_addr) else {
        return;
    };

    let resolved = prog
        .proc_ids()
        .find(|&id| prog.proc(id).is_some_and(|p| p.name() == name));
    if let Some(id) = resolved {
        let block = proc.cfg.block_mut(bb).expect("checked above");
        if let Some(stmt) = block.last_statement_mut() {
            if let StatementKind::Call(call) = &mut stmt.kind {
                call.dest_proc = Some(id);
                call.dest = Exp::func(&name);
            }
        }
    }
}
