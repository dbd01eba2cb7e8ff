//! SSA construction: phi placement and variable renaming.
//!
//! Follows the classic algorithm:
//!
//! > Cytron et al., "Efficiently Computing Static Single Assignment Form and
//! > the Control Dependence Graph", ACM TOPLAS 1991
//!
//! Phi statements are inserted at the iterated dominance frontier of each
//! variable's definition sites; renaming then walks the dominator tree with a
//! definition stack per variable, wrapping every use in an SSA subscript
//! pointing at its unique reaching definition (`None` for the value on
//! procedure entry).
//!
//! The renamed-variable universe is configurable: registers, temporaries and
//! machine flags are always renamed; memory locations join once
//! `DataFlow::rename_locals_params` is set, after their address expressions
//! have stabilized.
//!
//! Both operations are idempotent: a block that already carries a phi for a
//! variable does not get another one, and a use that already carries a
//! subscript is left alone.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::cfg::{BlockId, Cfg};
use crate::analysis::dataflow::{compute_dominators, compute_dominance_frontiers};
use crate::ir::{
    Exp, ExpRewrite, Operator, PhiAssign, Rtl, SharedExp, Statement, StatementId, StatementKind,
};

/// Whether `loc` participates in SSA renaming.
///
/// Named locals/params/globals are created after SSA and stay unrenamed.
fn is_renamable(loc: &Exp, rename_memofs: bool) -> bool {
    match loc.oper() {
        Operator::RegOf | Operator::Temp => true,
        Operator::Flags
        | Operator::Fflags
        | Operator::ZF
        | Operator::CF
        | Operator::NF
        | Operator::OF
        | Operator::DF
        | Operator::FZF
        | Operator::FLF
        | Operator::FGF => true,
        Operator::MemOf => rename_memofs,
        _ => false,
    }
}

/// Recomputes the dominator tree and dominance frontiers for `cfg`.
pub fn update_dominators(cfg: &mut Cfg) {
    let dom = compute_dominators(cfg);
    let frontiers = compute_dominance_frontiers(cfg, &dom);
    cfg.dataflow.dom = Some(dom);
    cfg.dataflow.frontiers = frontiers;
}

/// Places phi statements at the iterated dominance frontier of every
/// renamed variable's definition sites.
///
/// New statements are numbered from `next_id`. Returns whether any phi was
/// inserted.
pub fn place_phis(cfg: &mut Cfg, next_id: &mut u32) -> bool {
    if cfg.dataflow.dom.is_none() {
        update_dominators(cfg);
    }
    let rename_memofs = cfg.dataflow.rename_locals_params;

    // Definition sites per variable, keyed by the stripped base location
    let mut def_sites: FxHashMap<SharedExp, FxHashSet<BlockId>> = FxHashMap::default();
    cfg.for_each_statement(&mut |bb, stmt| {
        for def in stmt.defines() {
            let base = def.strip_subscripts();
            if is_renamable(&base, rename_memofs) {
                def_sites.entry(base).or_default().insert(bb);
            }
        }
    });

    // Deterministic processing order
    let mut variables: Vec<SharedExp> = def_sites.keys().cloned().collect();
    variables.sort_by_key(|v| v.to_string());

    let frontiers = cfg.dataflow.frontiers.clone();
    let mut changed = false;

    for var in variables {
        let sites = &def_sites[&var];
        let mut worklist: Vec<BlockId> = sites.iter().copied().collect();
        let mut has_phi: FxHashSet<BlockId> = FxHashSet::default();

        // Blocks that already carry a phi for this variable keep it
        for bb in cfg.block_ids() {
            let mut present = false;
            cfg.block(bb).unwrap().for_each_statement(&mut |stmt| {
                if let StatementKind::PhiAssign(phi) = &stmt.kind {
                    if phi.lhs.strip_subscripts() == var {
                        present = true;
                    }
                }
            });
            if present {
                has_phi.insert(bb);
            }
        }

        while let Some(site) = worklist.pop() {
            for &frontier_bb in &frontiers[site.index()] {
                if has_phi.contains(&frontier_bb) {
                    continue;
                }
                has_phi.insert(frontier_bb);
                insert_phi(cfg, frontier_bb, &var, next_id);
                changed = true;
                if !sites.contains(&frontier_bb) {
                    worklist.push(frontier_bb);
                }
            }
        }
    }

    changed
}

fn insert_phi(cfg: &mut Cfg, bb: BlockId, var: &SharedExp, next_id: &mut u32) {
    let block = cfg.block_mut(bb).expect("frontier block exists");
    let incoming: BTreeMap<BlockId, Option<StatementId>> =
        block.preds.iter().map(|&p| (p, None)).collect();

    *next_id += 1;
    let phi = Statement::new(
        StatementId(*next_id),
        StatementKind::PhiAssign(PhiAssign {
            lhs: var.clone(),
            incoming,
        }),
    );

    let addr = block.low_addr();
    if let Some(first) = block.rtls.first_mut() {
        first.statements.insert(0, phi);
    } else {
        block.rtls.push(Rtl::with_statements(addr, vec![phi]));
    }
}

/// Per-variable definition stacks for the rename walk.
struct RenameState {
    stacks: FxHashMap<SharedExp, Vec<Option<StatementId>>>,
    rename_memofs: bool,
    changed: bool,
}

impl RenameState {
    fn current(&self, var: &SharedExp) -> Option<StatementId> {
        self.stacks
            .get(var)
            .and_then(|s| s.last())
            .copied()
            .flatten()
    }

    /// Wraps every bare renamable location in `e` with its reaching
    /// definition. Existing subscripts are left untouched (only their
    /// sub-location children are processed).
    fn rename_exp(&self, e: &SharedExp) -> SharedExp {
        if let Exp::Subscript(base, def) = &**e {
            // Already renamed; rename inside the base only
            let new_base = base.map_children(|c| self.rename_exp(c));
            return if std::rc::Rc::ptr_eq(&new_base, base) {
                e.clone()
            } else {
                Exp::subscript(new_base, *def)
            };
        }
        let rebuilt = e.map_children(|c| self.rename_exp(c));
        if is_renamable(&rebuilt, self.rename_memofs) {
            let key = rebuilt.strip_subscripts();
            Exp::subscript(rebuilt, self.current(&key))
        } else {
            rebuilt
        }
    }
}

/// Renames variable uses over the dominator tree, filling phi incomings and
/// the definition collectors of calls and returns.
///
/// Returns whether anything changed.
pub fn rename_variables(cfg: &mut Cfg) -> bool {
    if cfg.dataflow.dom.is_none() {
        update_dominators(cfg);
    }
    let Some(entry) = cfg.entry() else {
        return false;
    };
    let dom = cfg.dataflow.dom.clone().expect("dominators computed above");

    let mut state = RenameState {
        stacks: FxHashMap::default(),
        rename_memofs: cfg.dataflow.rename_locals_params,
        changed: false,
    };

    rename_block(cfg, &dom, entry, &mut state);
    state.changed
}

fn rename_block(
    cfg: &mut Cfg,
    dom: &crate::analysis::dataflow::DominatorTree,
    bb: BlockId,
    state: &mut RenameState,
) {
    let mut pushed: Vec<SharedExp> = Vec::new();

    // Rename uses and push definitions, in statement order
    let block = cfg.block_mut(bb).expect("walk stays inside the graph");
    for rtl in &mut block.rtls {
        for stmt in &mut rtl.statements {
            if !stmt.is_phi() {
                let changed = stmt.map_uses(&mut |e| state.rename_exp(e));
                state.changed |= changed;
            }

            // Calls and returns snapshot the reaching definitions
            match &mut stmt.kind {
                StatementKind::Call(call) => {
                    for (var, stack) in &state.stacks {
                        if let Some(def) = stack.last() {
                            call.collector.insert(var.clone(), *def);
                        }
                    }
                }
                StatementKind::Return(ret) => {
                    for (var, stack) in &state.stacks {
                        if let Some(def) = stack.last() {
                            ret.collector.insert(var.clone(), *def);
                        }
                    }
                }
                _ => {}
            }

            let id = stmt.id;
            for def in stmt.defines() {
                let base = def.strip_subscripts();
                if is_renamable(&base, state.rename_memofs) {
                    state.stacks.entry(base.clone()).or_default().push(Some(id));
                    pushed.push(base);
                }
            }
        }
    }

    // Fill phi incomings of the successors
    let succs: Vec<BlockId> = cfg.block(bb).unwrap().successors().to_vec();
    for succ in succs {
        let block = cfg.block_mut(succ).expect("edge endpoints are in the graph");
        for rtl in &mut block.rtls {
            for stmt in &mut rtl.statements {
                if let StatementKind::PhiAssign(phi) = &mut stmt.kind {
                    let key = phi.lhs.strip_subscripts();
                    let reaching = state
                        .stacks
                        .get(&key)
                        .and_then(|s| s.last())
                        .copied()
                        .flatten();
                    let slot = phi.incoming.entry(bb).or_insert(None);
                    if *slot != reaching {
                        *slot = reaching;
                        state.changed = true;
                    }
                }
            }
        }
    }

    for child in dom.children(bb) {
        rename_block(cfg, dom, child, state);
    }

    for var in pushed.into_iter().rev() {
        state
            .stacks
            .get_mut(&var)
            .expect("pushed entries have stacks")
            .pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::BlockType;
    use crate::ir::{Address, Assign};

    fn assign(id: u32, lhs: SharedExp, rhs: SharedExp) -> Statement {
        Statement::new(StatementId(id), StatementKind::Assign(Assign::new(lhs, rhs)))
    }

    /// Diamond where both arms define r24 and the join reads it.
    fn diamond_with_defs() -> (Cfg, BlockId) {
        let mut cfg = Cfg::new();
        let entry = cfg.add_block(
            BlockType::TwoWay,
            vec![Rtl::with_statements(Address(0x1000), vec![])],
        );
        let left = cfg.add_block(
            BlockType::Fall,
            vec![Rtl::with_statements(
                Address(0x1010),
                vec![assign(1, Exp::reg(24), Exp::int(1))],
            )],
        );
        let right = cfg.add_block(
            BlockType::Fall,
            vec![Rtl::with_statements(
                Address(0x1020),
                vec![assign(2, Exp::reg(24), Exp::int(2))],
            )],
        );
        let join = cfg.add_block(
            BlockType::Ret,
            vec![Rtl::with_statements(
                Address(0x1030),
                vec![assign(3, Exp::reg(25), Exp::reg(24))],
            )],
        );
        cfg.add_edge(entry, left);
        cfg.add_edge(entry, right);
        cfg.add_edge(left, join);
        cfg.add_edge(right, join);
        (cfg, join)
    }

    #[test]
    fn test_phi_placed_at_join() {
        let (mut cfg, join) = diamond_with_defs();
        let mut next_id = 100;
        assert!(place_phis(&mut cfg, &mut next_id));

        let first = cfg.block(join).unwrap().rtls[0].statements.first().unwrap();
        assert!(first.is_phi());

        // Idempotent: a second run inserts nothing
        assert!(!place_phis(&mut cfg, &mut next_id));
    }

    #[test]
    fn test_rename_gives_unique_reaching_defs() {
        let (mut cfg, join) = diamond_with_defs();
        let mut next_id = 100;
        place_phis(&mut cfg, &mut next_id);
        assert!(rename_variables(&mut cfg));

        // The phi has one incoming per predecessor, pointing at the arm defs
        let block = cfg.block(join).unwrap();
        let phi = block.rtls[0].statements.first().unwrap();
        if let StatementKind::PhiAssign(p) = &phi.kind {
            assert_eq!(p.incoming.len(), 2);
            let defs: Vec<_> = p.incoming.values().copied().collect();
            assert!(defs.contains(&Some(StatementId(1))));
            assert!(defs.contains(&Some(StatementId(2))));
        } else {
            panic!("expected phi");
        }

        // The join's use of r24 refers to the phi
        let use_stmt = block.rtls[0].statements.last().unwrap();
        if let StatementKind::Assign(a) = &use_stmt.kind {
            assert_eq!(a.rhs, Exp::subscript(Exp::reg(24), Some(phi.id)));
        } else {
            panic!("expected assign");
        }

        // Idempotent: renaming again changes nothing
        assert!(!rename_variables(&mut cfg));
    }

    #[test]
    fn test_use_before_def_gets_implicit() {
        let mut cfg = Cfg::new();
        cfg.add_block(
            BlockType::Ret,
            vec![Rtl::with_statements(
                Address(0x1000),
                vec![assign(
                    1,
                    Exp::reg(24),
                    Exp::binary(Operator::Plus, Exp::reg(24), Exp::int(1)),
                )],
            )],
        );
        rename_variables(&mut cfg);

        let stmt = cfg.block(BlockId::new(0)).unwrap().last_statement().unwrap();
        if let StatementKind::Assign(a) = &stmt.kind {
            // The use is subscripted with the implicit (entry) definition
            assert_eq!(
                a.rhs,
                Exp::binary(
                    Operator::Plus,
                    Exp::subscript(Exp::reg(24), None),
                    Exp::int(1)
                )
            );
        } else {
            panic!("expected assign");
        }
    }

    #[test]
    fn test_memofs_only_renamed_when_enabled() {
        let mut cfg = Cfg::new();
        let loc = Exp::mem_of(Exp::binary(Operator::Minus, Exp::reg(28), Exp::int(4)));
        cfg.add_block(
            BlockType::Ret,
            vec![Rtl::with_statements(
                Address(0x1000),
                vec![assign(1, Exp::reg(24), loc.clone())],
            )],
        );

        let mut without = cfg.clone();
        rename_variables(&mut without);
        let stmt = without.block(BlockId::new(0)).unwrap().last_statement().unwrap();
        if let StatementKind::Assign(a) = &stmt.kind {
            // Only the register inside the address got a subscript
            assert!(!a.rhs.is_subscript());
            assert!(a.rhs.is_mem_of());
        } else {
            panic!("expected assign");
        }

        cfg.dataflow.rename_locals_params = true;
        rename_variables(&mut cfg);
        let stmt = cfg.block(BlockId::new(0)).unwrap().last_statement().unwrap();
        if let StatementKind::Assign(a) = &stmt.kind {
            assert!(a.rhs.is_subscript());
        } else {
            panic!("expected assign");
        }
    }
}
