//! Basic blocks and block identifiers.

use std::fmt;

use crate::ir::{Address, Rtl, SharedExp, Statement, StatementKind};

/// A strongly-typed identifier for basic blocks within one CFG.
///
/// Wraps a dense index assigned when the block is added to its graph, usable
/// directly as a vector index for per-block analysis tables.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Creates a `BlockId` from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the raw index value.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Classification of a basic block by its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Ends with an unconditional jump.
    OneWay,
    /// Ends with a conditional branch (taken successor first).
    TwoWay,
    /// Ends with a recovered switch dispatch.
    Nway,
    /// Ends with a call; one fall-through successor unless the callee
    /// does not return.
    Call,
    /// Ends with a return; no successors.
    Ret,
    /// Falls through to the next address.
    Fall,
    /// Ends with a computed jump, not yet recovered.
    CompJump,
    /// Ends with a computed call, not yet recovered.
    CompCall,
    /// Could not be decoded.
    Invalid,
}

/// Index of the taken successor of a two-way block.
pub const BTHEN: usize = 0;
/// Index of the fall-through successor of a two-way block.
pub const BELSE: usize = 1;

/// A basic block: straight-line RTLs with a single entry and terminator.
///
/// Edge lists are maintained by the owning [`Cfg`](crate::analysis::cfg::Cfg);
/// both endpoints of every edge reference blocks in the same graph.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// This block's id in its CFG.
    pub id: BlockId,
    /// Terminator classification.
    pub kind: BlockType,
    /// The block's RTLs, ordered by address.
    pub rtls: Vec<Rtl>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId, kind: BlockType) -> BasicBlock {
        BasicBlock {
            id,
            kind,
            rtls: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// The lowest source address of this block.
    #[must_use]
    pub fn low_addr(&self) -> Address {
        self.rtls.first().map_or(Address::INVALID, |r| r.addr)
    }

    /// The highest source address of this block.
    #[must_use]
    pub fn high_addr(&self) -> Address {
        self.rtls.last().map_or(Address::INVALID, |r| r.addr)
    }

    /// Predecessor blocks.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.preds
    }

    /// Successor blocks. For two-way blocks the taken target comes first.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.succs
    }

    /// Number of successors.
    #[must_use]
    pub fn num_successors(&self) -> usize {
        self.succs.len()
    }

    /// Successor `i`, if present.
    #[must_use]
    pub fn successor(&self, i: usize) -> Option<BlockId> {
        self.succs.get(i).copied()
    }

    /// The last statement of the block, carrying its terminator semantics.
    #[must_use]
    pub fn last_statement(&self) -> Option<&Statement> {
        self.rtls.iter().rev().find_map(|rtl| rtl.statements.last())
    }

    /// Mutable access to the last statement.
    pub fn last_statement_mut(&mut self) -> Option<&mut Statement> {
        self.rtls
            .iter_mut()
            .rev()
            .find_map(|rtl| rtl.statements.last_mut())
    }

    /// The branch condition if this is a two-way block with a recovered
    /// condition.
    #[must_use]
    pub fn condition(&self) -> Option<SharedExp> {
        match self.last_statement().map(|s| &s.kind) {
            Some(StatementKind::Branch(b)) => b.cond.clone(),
            _ => None,
        }
    }

    /// Visits every statement in order.
    pub fn for_each_statement(&self, f: &mut impl FnMut(&Statement)) {
        for rtl in &self.rtls {
            for stmt in &rtl.statements {
                f(stmt);
            }
        }
    }

    /// Visits every statement mutably, in order.
    pub fn for_each_statement_mut(&mut self, f: &mut impl FnMut(&mut Statement)) {
        for rtl in &mut self.rtls {
            for stmt in &mut rtl.statements {
                f(stmt);
            }
        }
    }
}
