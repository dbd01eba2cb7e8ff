//! Control Flow Graph implementation.
//!
//! The [`Cfg`] owns a procedure's basic blocks and their edge lists, plus the
//! dataflow side-structure (dominator tree, dominance frontiers, rename
//! configuration) that the analysis passes populate.
//!
//! # Invariants
//!
//! - Every edge's endpoints reference blocks in this graph
//! - Exactly one block is the entry
//! - A `Ret` block has zero successors
//! - A `Call` block has one successor, or zero when the callee never returns
//! - Removing a predecessor edge removes the matching phi incomings in the
//!   successor

use crate::analysis::cfg::{BasicBlock, BlockId, BlockType};
use crate::analysis::dataflow::DataFlow;
use crate::ir::{Address, Rtl, Statement, StatementId, StatementKind};

/// Location of a statement inside a CFG: block, RTL index, statement index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtRef {
    /// The containing block.
    pub block: BlockId,
    /// Index of the RTL within the block.
    pub rtl: usize,
    /// Index of the statement within the RTL.
    pub stmt: usize,
}

/// A procedure's control flow graph.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    blocks: Vec<BasicBlock>,
    entry: Option<BlockId>,
    /// Dominators, frontiers, and SSA rename configuration.
    pub dataflow: DataFlow,
}

impl Cfg {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Cfg {
        Cfg::default()
    }

    /// Removes all blocks, edges and dataflow results. Used by the
    /// indirect-transfer restart protocol before redecoding.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.entry = None;
        self.dataflow = DataFlow::default();
    }

    /// Adds a block of the given type holding `rtls`, returning its id.
    /// The first block added becomes the entry.
    pub fn add_block(&mut self, kind: BlockType, rtls: Vec<Rtl>) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        let mut block = BasicBlock::new(id, kind);
        block.rtls = rtls;
        self.blocks.push(block);
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        id
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the graph has no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The entry block id.
    #[must_use]
    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    /// Overrides the entry block.
    pub fn set_entry(&mut self, entry: BlockId) {
        self.entry = Some(entry);
    }

    /// The block with the given id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Mutable access to the block with the given id.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index())
    }

    /// Iterates over all blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    /// Iterates mutably over all blocks in id order.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BasicBlock> {
        self.blocks.iter_mut()
    }

    /// All block ids in id order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::new)
    }

    /// The block starting at the given address, if any.
    #[must_use]
    pub fn block_by_addr(&self, addr: Address) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|b| b.low_addr() == addr)
            .map(|b| b.id)
    }

    /// Adds the edge `from -> to`. Parallel edges are allowed (a two-way
    /// branch whose arms coincide).
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succs.push(to);
        self.blocks[to.index()].preds.push(from);
    }

    /// Removes one `from -> to` edge and the matching phi incomings in `to`
    /// when this was the last parallel edge.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        if let Some(pos) = self.blocks[from.index()].succs.iter().position(|&s| s == to) {
            self.blocks[from.index()].succs.remove(pos);
        }
        if let Some(pos) = self.blocks[to.index()].preds.iter().position(|&p| p == from) {
            self.blocks[to.index()].preds.remove(pos);
        }
        if !self.blocks[to.index()].preds.contains(&from) {
            self.blocks[to.index()].for_each_statement_mut(&mut |stmt| {
                if let StatementKind::PhiAssign(phi) = &mut stmt.kind {
                    phi.incoming.remove(&from);
                }
            });
        }
    }

    /// Splits `id` at the RTL starting at `addr`, returning the new block
    /// holding the tail. The original keeps the head and falls through to
    /// the tail, which inherits the original terminator and successors.
    pub fn split_block(&mut self, id: BlockId, addr: Address) -> Option<BlockId> {
        let split_at = self.blocks[id.index()]
            .rtls
            .iter()
            .position(|rtl| rtl.addr == addr)?;
        if split_at == 0 {
            return None;
        }

        let tail_rtls = self.blocks[id.index()].rtls.split_off(split_at);
        let old_kind = self.blocks[id.index()].kind;
        let old_succs = std::mem::take(&mut self.blocks[id.index()].succs);

        let tail = self.add_block(old_kind, tail_rtls);
        self.blocks[tail.index()].succs = old_succs.clone();
        for succ in old_succs {
            let preds = &mut self.blocks[succ.index()].preds;
            for p in preds.iter_mut() {
                if *p == id {
                    *p = tail;
                }
            }
        }

        self.blocks[id.index()].kind = BlockType::Fall;
        self.add_edge(id, tail);
        Some(tail)
    }

    /// Blocks in reverse postorder from the entry. Unreachable blocks are
    /// appended in id order so per-block tables stay total.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::with_capacity(self.blocks.len());

        if let Some(entry) = self.entry {
            // Iterative DFS; the second stack entry marks post-visit
            let mut stack = vec![(entry, false)];
            while let Some((node, processed)) = stack.pop() {
                if processed {
                    postorder.push(node);
                    continue;
                }
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;
                stack.push((node, true));
                for &succ in self.blocks[node.index()].successors() {
                    if !visited[succ.index()] {
                        stack.push((succ, false));
                    }
                }
            }
        }

        postorder.reverse();
        for (i, seen) in visited.iter().enumerate() {
            if !seen {
                postorder.push(BlockId::new(i));
            }
        }
        postorder
    }

    /// Finds a statement by id.
    #[must_use]
    pub fn find_statement(&self, id: StatementId) -> Option<StmtRef> {
        for block in &self.blocks {
            for (ri, rtl) in block.rtls.iter().enumerate() {
                for (si, stmt) in rtl.statements.iter().enumerate() {
                    if stmt.id == id {
                        return Some(StmtRef {
                            block: block.id,
                            rtl: ri,
                            stmt: si,
                        });
                    }
                }
            }
        }
        None
    }

    /// The statement at a [`StmtRef`].
    #[must_use]
    pub fn statement(&self, at: StmtRef) -> Option<&Statement> {
        self.blocks
            .get(at.block.index())?
            .rtls
            .get(at.rtl)?
            .statements
            .get(at.stmt)
    }

    /// Mutable access to the statement at a [`StmtRef`].
    pub fn statement_mut(&mut self, at: StmtRef) -> Option<&mut Statement> {
        self.blocks
            .get_mut(at.block.index())?
            .rtls
            .get_mut(at.rtl)?
            .statements
            .get_mut(at.stmt)
    }

    /// Visits every statement of every block, in block-id then address order.
    pub fn for_each_statement(&self, f: &mut impl FnMut(BlockId, &Statement)) {
        for block in &self.blocks {
            for rtl in &block.rtls {
                for stmt in &rtl.statements {
                    f(block.id, stmt);
                }
            }
        }
    }

    /// Visits every statement mutably.
    pub fn for_each_statement_mut(&mut self, f: &mut impl FnMut(BlockId, &mut Statement)) {
        for block in &mut self.blocks {
            for rtl in &mut block.rtls {
                for stmt in &mut rtl.statements {
                    f(block.id, stmt);
                }
            }
        }
    }

    /// The highest statement id currently in the graph, for numbering.
    #[must_use]
    pub fn max_statement_id(&self) -> u32 {
        let mut max = 0;
        self.for_each_statement(&mut |_, stmt| {
            max = max.max(stmt.id.value());
        });
        max
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::ir::{Exp, PhiAssign, Statement, StatementKind};

    fn rtl_at(addr: u64) -> Rtl {
        Rtl::new(Address(addr))
    }

    fn diamond() -> Cfg {
        let mut cfg = Cfg::new();
        let entry = cfg.add_block(BlockType::TwoWay, vec![rtl_at(0x1000)]);
        let left = cfg.add_block(BlockType::Fall, vec![rtl_at(0x1010)]);
        let right = cfg.add_block(BlockType::Fall, vec![rtl_at(0x1020)]);
        let join = cfg.add_block(BlockType::Ret, vec![rtl_at(0x1030)]);
        cfg.add_edge(entry, left);
        cfg.add_edge(entry, right);
        cfg.add_edge(left, join);
        cfg.add_edge(right, join);
        cfg
    }

    #[test]
    fn test_entry_is_first_block() {
        let cfg = diamond();
        assert_eq!(cfg.entry(), Some(BlockId::new(0)));
        assert_eq!(cfg.block_count(), 4);
    }

    #[test]
    fn test_edges() {
        let cfg = diamond();
        let entry = cfg.block(BlockId::new(0)).unwrap();
        assert_eq!(entry.successors(), &[BlockId::new(1), BlockId::new(2)]);
        let join = cfg.block(BlockId::new(3)).unwrap();
        assert_eq!(join.predecessors(), &[BlockId::new(1), BlockId::new(2)]);
    }

    #[test]
    fn test_reverse_postorder_starts_at_entry() {
        let cfg = diamond();
        let rpo = cfg.reverse_postorder();
        assert_eq!(rpo.len(), 4);
        assert_eq!(rpo[0], BlockId::new(0));
        // The join comes after both arms
        let join_pos = rpo.iter().position(|&b| b == BlockId::new(3)).unwrap();
        assert_eq!(join_pos, 3);
    }

    #[test]
    fn test_remove_edge_prunes_phi_incoming() {
        let mut cfg = diamond();
        let join = BlockId::new(3);
        let mut incoming = BTreeMap::new();
        incoming.insert(BlockId::new(1), None);
        incoming.insert(BlockId::new(2), None);
        cfg.block_mut(join).unwrap().rtls[0].statements.push(Statement::new(
            crate::ir::StatementId(1),
            StatementKind::PhiAssign(PhiAssign {
                lhs: Exp::reg(24),
                incoming,
            }),
        ));

        cfg.remove_edge(BlockId::new(1), join);

        let phi = cfg.block(join).unwrap().last_statement().unwrap();
        if let StatementKind::PhiAssign(p) = &phi.kind {
            assert_eq!(p.incoming.len(), 1);
            assert!(p.incoming.contains_key(&BlockId::new(2)));
        } else {
            panic!("expected phi");
        }
    }

    #[test]
    fn test_split_block() {
        let mut cfg = Cfg::new();
        let b = cfg.add_block(BlockType::Ret, vec![rtl_at(0x1000), rtl_at(0x1004)]);
        let tail = cfg.split_block(b, Address(0x1004)).unwrap();

        assert_eq!(cfg.block(b).unwrap().kind, BlockType::Fall);
        assert_eq!(cfg.block(b).unwrap().successors(), &[tail]);
        assert_eq!(cfg.block(tail).unwrap().kind, BlockType::Ret);
        assert_eq!(cfg.block(tail).unwrap().low_addr(), Address(0x1004));
    }
}
