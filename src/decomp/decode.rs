//! CFG construction from the decoder capability.
//!
//! Pulls lifted RTLs one address at a time from the [`Decoder`], follows the
//! control flow, partitions the result into basic blocks, and resolves direct
//! call destinations to procedures (creating newly discovered ones). This is
//! the seam the indirect-transfer restart protocol re-enters: a redecode
//! yields the saved high-level switch RTLs and therefore the recovered
//! n-way blocks and their successor edges.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

use crate::analysis::cfg::BlockType;
use crate::ir::{Address, Rtl, StatementKind};
use crate::program::{ProcId, ProcStatus, Program, Signature};
use crate::project::Project;
use crate::Result;

/// Upper bound on decoded instructions per procedure, a runaway guard.
const MAX_INSTRUCTIONS: usize = 0x10000;

/// Where control goes after an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Flow {
    Fall(Address),
    Jump(Address),
    Branch { taken: Address, fall: Address },
    NWay(Vec<Address>),
    CompJump,
    CompCall(Address),
    Call(Address),
    Ret,
    Invalid,
}

/// (Re)decodes `proc_id`'s CFG from its entry address.
///
/// Returns `false` when not a single block could be built. On success the
/// procedure's status is at least `Decoded`.
///
/// # Errors
///
/// Propagates decoder failures other than plain undecodable bytes.
pub fn decode_proc(program: &mut Program, project: &mut Project, proc_id: ProcId) -> Result<bool> {
    let entry = match program.user_proc(proc_id) {
        Some(p) => p.entry,
        None => return Ok(false),
    };

    // Phase 1: follow the flow, decoding each reachable address once
    let mut decoded: BTreeMap<Address, (Rtl, Flow)> = BTreeMap::new();
    let mut worklist = vec![entry];
    let mut fuel = MAX_INSTRUCTIONS;

    while let Some(addr) = worklist.pop() {
        if decoded.contains_key(&addr) {
            continue;
        }
        if fuel == 0 {
            log::warn!("instruction limit exhausted decoding {}", addr);
            break;
        }
        fuel -= 1;

        let insn = project.decoder_mut().decode_instruction(addr)?;
        if !insn.valid {
            log::warn!("undecodable instruction at {addr}");
            decoded.insert(addr, (Rtl::new(addr), Flow::Invalid));
            continue;
        }
        let next = addr.offset_by(u64::from(insn.size));
        let flow = flow_of(&insn.rtl, next);

        match &flow {
            Flow::Fall(n) | Flow::Call(n) | Flow::CompCall(n) => worklist.push(*n),
            Flow::Jump(t) => worklist.push(*t),
            Flow::Branch { taken, fall } => {
                worklist.push(*taken);
                worklist.push(*fall);
            }
            Flow::NWay(targets) => worklist.extend(targets.iter().copied()),
            Flow::CompJump | Flow::Ret | Flow::Invalid => {}
        }
        decoded.insert(addr, (insn.rtl, flow));
    }

    if decoded.is_empty() {
        return Ok(false);
    }

    // Phase 2: block leaders are the entry, every transfer target, and
    // every instruction following a non-fall-through
    let mut leaders: FxHashSet<Address> = FxHashSet::default();
    leaders.insert(entry);
    for (addr, (_, flow)) in &decoded {
        match flow {
            Flow::Jump(t) => {
                leaders.insert(*t);
            }
            Flow::Branch { taken, fall } => {
                leaders.insert(*taken);
                leaders.insert(*fall);
            }
            Flow::NWay(targets) => leaders.extend(targets.iter().copied()),
            Flow::Call(n) | Flow::CompCall(n) => {
                leaders.insert(*n);
            }
            Flow::CompJump | Flow::Ret | Flow::Invalid => {
                if let Some((&next, _)) = decoded.range(addr.offset_by(1)..).next() {
                    leaders.insert(next);
                }
            }
            Flow::Fall(_) => {}
        }
    }

    // Phase 3: group the decoded RTLs into blocks
    let proc = program.user_proc_mut(proc_id).expect("checked above");
    proc.cfg.clear();

    let mut block_rtls: Vec<Rtl> = Vec::new();
    let mut block_flow = Flow::Ret;
    let mut pending: Vec<(Address, Vec<Rtl>, Flow)> = Vec::new();
    let mut block_start: Option<Address> = None;

    let addrs: Vec<Address> = decoded.keys().copied().collect();
    for (i, addr) in addrs.iter().enumerate() {
        let (rtl, flow) = decoded.get(addr).expect("key from the same map").clone();
        if block_start.is_none() {
            block_start = Some(*addr);
        }
        block_rtls.push(rtl);
        block_flow = flow.clone();

        let next_is_leader = addrs
            .get(i + 1)
            .is_some_and(|next| leaders.contains(next));
        let flow_breaks = !matches!(flow, Flow::Fall(_));
        let contiguous = matches!(&flow, Flow::Fall(n)
            if addrs.get(i + 1) == Some(n));

        if flow_breaks || next_is_leader || !contiguous {
            // A fall-through into a leader (or a gap) becomes an edge
            if !flow_breaks {
                block_flow = Flow::Fall(match &flow {
                    Flow::Fall(n) => *n,
                    _ => unreachable!(),
                });
            }
            pending.push((
                block_start.expect("set at block start"),
                std::mem::take(&mut block_rtls),
                block_flow.clone(),
            ));
            block_start = None;
        }
    }
    if let Some(start) = block_start {
        pending.push((start, block_rtls, block_flow));
    }

    let mut starts: Vec<Address> = Vec::new();
    for (start, rtls, flow) in &pending {
        let kind = match flow {
            Flow::Fall(_) => BlockType::Fall,
            Flow::Jump(_) => BlockType::OneWay,
            Flow::Branch { .. } => BlockType::TwoWay,
            Flow::NWay(_) => BlockType::Nway,
            Flow::Call(_) => BlockType::Call,
            Flow::CompCall(_) => BlockType::Call,
            Flow::CompJump => BlockType::CompJump,
            Flow::Ret => BlockType::Ret,
            Flow::Invalid => BlockType::Invalid,
        };
        proc.cfg.add_block(kind, rtls.clone());
        starts.push(*start);
    }

    // Phase 4: edges, in successor-order (taken before fall-through)
    let find_block = |starts: &[Address], addr: Address| {
        starts
            .iter()
            .position(|&s| s == addr)
            .map(crate::analysis::cfg::BlockId::new)
    };
    for (i, (_, _, flow)) in pending.iter().enumerate() {
        let from = crate::analysis::cfg::BlockId::new(i);
        let targets: Vec<Address> = match flow {
            Flow::Fall(n) | Flow::Call(n) | Flow::CompCall(n) => vec![*n],
            Flow::Jump(t) => vec![*t],
            Flow::Branch { taken, fall } => vec![*taken, *fall],
            Flow::NWay(targets) => targets.clone(),
            Flow::CompJump | Flow::Ret | Flow::Invalid => Vec::new(),
        };
        for target in targets {
            if let Some(to) = find_block(&starts, target) {
                proc.cfg.add_edge(from, to);
            } else {
                log::warn!("transfer target {target} is not a decoded leader");
            }
        }
    }

    if proc.status < ProcStatus::Decoded {
        proc.status = ProcStatus::Decoded;
    }

    resolve_call_destinations(program, project, proc_id);
    Ok(true)
}

/// Derives the control flow of one RTL.
fn flow_of(rtl: &Rtl, next: Address) -> Flow {
    match rtl.last().map(|s| &s.kind) {
        Some(StatementKind::Goto(g)) => match g.dest.addr_value() {
            Some(t) => Flow::Jump(t),
            None => Flow::CompJump,
        },
        Some(StatementKind::Branch(b)) => Flow::Branch {
            taken: b.dest,
            fall: next,
        },
        Some(StatementKind::Case(c)) => match &c.info {
            Some(info) => {
                // Saved high-level switch: targets come from the table
                let mut targets: Vec<Address> = Vec::new();
                for i in 0..info.num_cases {
                    if let Some(t) = case_target(info, i) {
                        targets.push(t);
                    }
                }
                if let Some(d) = info.default {
                    targets.push(d);
                }
                Flow::NWay(targets)
            }
            None => Flow::CompJump,
        },
        Some(StatementKind::Call(c)) => match c.dest.addr_value() {
            Some(_) => Flow::Call(next),
            None => Flow::CompCall(next),
        },
        Some(StatementKind::Return(_)) => Flow::Ret,
        _ => Flow::Fall(next),
    }
}

/// The decoded target of case `i`, resolvable only for switch kinds whose
/// info caches the targets (the recovery pass stores absolute targets).
fn case_target(info: &crate::ir::SwitchInfo, index: usize) -> Option<Address> {
    info.targets.get(index).copied()
}

/// Binds direct calls to their destination procedures, creating newly
/// discovered ones in the caller's module.
fn resolve_call_destinations(program: &mut Program, project: &mut Project, proc_id: ProcId) {
    let module = match program.user_proc(proc_id) {
        Some(p) => p.module,
        None => return,
    };

    // Collect unresolved destinations first; creating procedures needs the
    // program mutable
    let mut dests: Vec<Address> = Vec::new();
    if let Some(proc) = program.user_proc(proc_id) {
        proc.cfg.for_each_statement(&mut |_, stmt| {
            if let StatementKind::Call(call) = &stmt.kind {
                if call.dest_proc.is_none() {
                    if let Some(addr) = call.dest.addr_value() {
                        dests.push(addr);
                    }
                }
            }
        });
    }

    let mut resolved: Vec<(Address, ProcId)> = Vec::new();
    for addr in dests {
        let id = match program.proc_by_addr(addr) {
            Some(id) => id,
            None => {
                let name = program
                    .image()
                    .symbol_at(addr)
                    .unwrap_or_else(|| format!("proc_{:#x}", addr.value()));
                if let Some(sig) = project.decoder_mut().lib_signature(&name) {
                    program.create_lib_proc(&name, sig)
                } else if program.image().section_by_addr(addr).is_some() {
                    log::debug!("discovered procedure '{name}' at {addr}");
                    program.create_user_proc(module, &name, addr)
                } else {
                    // Outside the image: treat as an unknown external
                    program.create_lib_proc(&name, Signature::unknown(&name))
                }
            }
        };
        resolved.push((addr, id));
    }

    if let Some(proc) = program.user_proc_mut(proc_id) {
        proc.cfg.for_each_statement_mut(&mut |_, stmt| {
            if let StatementKind::Call(call) = &mut stmt.kind {
                if call.dest_proc.is_none() {
                    if let Some(addr) = call.dest.addr_value() {
                        if let Some((_, id)) = resolved.iter().find(|(a, _)| *a == addr) {
                            call.dest_proc = Some(*id);
                        }
                    }
                }
            }
        });
    }
}
