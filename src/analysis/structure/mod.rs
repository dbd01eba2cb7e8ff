//! Structural analysis: loops, conditionals and switches over a stable CFG.
//!
//! Runs after the procedure is fully decompiled, immediately before code
//! generation. Produces per-block annotations the C emitter walks:
//!
//! - natural loops from back-edges (an edge `a -> b` is a back-edge iff `b`
//!   dominates `a`), classified pre-tested / post-tested / endless
//! - two-way conditionals classified if-then / if-else / if-then-else with
//!   their follow at the immediate post-dominator
//! - n-way blocks classified as switches with the common post-dominator of
//!   the arms as follow
//! - unstructured branches that jump into or out of loop and case bodies,
//!   which the emitter renders as gotos

use rustc_hash::FxHashSet;

use crate::analysis::cfg::{BlockId, BlockType, Cfg, BELSE, BTHEN};
use crate::analysis::dataflow::{compute_dominators, DominatorTree, ReverseGraph};

/// Structured statement kind of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructType {
    /// Loop header.
    Loop,
    /// Loop header that is also a conditional inside the loop body.
    LoopCond,
    /// Two-way or n-way conditional header.
    Cond,
    /// Sequential block.
    #[default]
    Seq,
}

/// Loop classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopType {
    /// `while (cond) { body }`: exit test at the header.
    PreTested,
    /// `do { body } while (cond)`: exit test at the latch.
    PostTested,
    /// `for (;;) { body }`: no structured exit.
    Endless,
}

/// Conditional classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondType {
    /// Taken branch is the body, fall-through reaches the follow.
    IfThen,
    /// Fall-through is the body (condition printed negated).
    IfElse,
    /// Both arms have bodies.
    IfThenElse,
    /// N-way switch.
    Case,
}

/// Unstructured-branch classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnstructType {
    /// Fully structured.
    #[default]
    Structured,
    /// Branches into or out of a loop body.
    JumpInOutLoop,
    /// Branches into the middle of a case body.
    JumpIntoCase,
}

/// Structural annotations of one block.
#[derive(Debug, Clone, Default)]
pub struct BlockAnnotations {
    /// Structured kind.
    pub struct_type: StructType,
    /// Loop classification, set on loop headers.
    pub loop_type: Option<LoopType>,
    /// Conditional classification, set on conditional headers.
    pub cond_type: Option<CondType>,
    /// Unstructured-branch classification.
    pub unstruct_type: UnstructType,
    /// Innermost enclosing loop header (including the header itself).
    pub loop_head: Option<BlockId>,
    /// For a loop header: first block after the loop.
    pub loop_follow: Option<BlockId>,
    /// For a loop header: its latch block.
    pub latch: Option<BlockId>,
    /// Innermost enclosing case header.
    pub case_head: Option<BlockId>,
    /// For a conditional header: the join the arms meet at.
    pub cond_follow: Option<BlockId>,
    /// Whether this block is the latch of its loop.
    pub is_latch: bool,
}

/// The structural analysis result for one CFG.
#[derive(Debug)]
pub struct StructuringInfo {
    ann: Vec<BlockAnnotations>,
    back_edges: Vec<(BlockId, BlockId)>,
}

impl StructuringInfo {
    /// The annotations of `bb`.
    #[must_use]
    pub fn annotations(&self, bb: BlockId) -> &BlockAnnotations {
        &self.ann[bb.index()]
    }

    /// The structured kind of `bb`.
    #[must_use]
    pub fn struct_type(&self, bb: BlockId) -> StructType {
        self.ann[bb.index()].struct_type
    }

    /// Overrides the structured kind (the emitter demotes `LoopCond` headers
    /// to `Cond` for the body pass).
    pub fn set_struct_type(&mut self, bb: BlockId, ty: StructType) {
        self.ann[bb.index()].struct_type = ty;
    }

    /// Loop classification of a header.
    #[must_use]
    pub fn loop_type(&self, bb: BlockId) -> Option<LoopType> {
        self.ann[bb.index()].loop_type
    }

    /// Conditional classification of a header.
    #[must_use]
    pub fn cond_type(&self, bb: BlockId) -> Option<CondType> {
        self.ann[bb.index()].cond_type
    }

    /// Unstructured classification of `bb`.
    #[must_use]
    pub fn unstruct_type(&self, bb: BlockId) -> UnstructType {
        self.ann[bb.index()].unstruct_type
    }

    /// Innermost enclosing loop header of `bb`.
    #[must_use]
    pub fn loop_head(&self, bb: BlockId) -> Option<BlockId> {
        self.ann[bb.index()].loop_head
    }

    /// Follow of the loop headed at `bb`.
    #[must_use]
    pub fn loop_follow(&self, bb: BlockId) -> Option<BlockId> {
        self.ann[bb.index()].loop_follow
    }

    /// Latch of the loop headed at `bb`.
    #[must_use]
    pub fn latch_node(&self, bb: BlockId) -> Option<BlockId> {
        self.ann[bb.index()].latch
    }

    /// Innermost enclosing case header of `bb`.
    #[must_use]
    pub fn case_head(&self, bb: BlockId) -> Option<BlockId> {
        self.ann[bb.index()].case_head
    }

    /// Follow of the conditional headed at `bb`.
    #[must_use]
    pub fn cond_follow(&self, bb: BlockId) -> Option<BlockId> {
        self.ann[bb.index()].cond_follow
    }

    /// Whether `bb` is a loop latch.
    #[must_use]
    pub fn is_latch_node(&self, bb: BlockId) -> bool {
        self.ann[bb.index()].is_latch
    }

    /// Whether `bb` is inside a case arm (it has a case head and is not
    /// that header's follow).
    #[must_use]
    pub fn is_case_option(&self, bb: BlockId) -> bool {
        match self.case_head(bb) {
            Some(head) => self.cond_follow(head) != Some(bb),
            None => false,
        }
    }

    /// Whether `pred -> bb` is a back edge.
    #[must_use]
    pub fn is_back_edge(&self, pred: BlockId, bb: BlockId) -> bool {
        self.back_edges.contains(&(pred, bb))
    }
}

/// One natural loop during construction.
struct NaturalLoop {
    header: BlockId,
    latch: BlockId,
    body: FxHashSet<BlockId>,
}

/// Structures `cfg`, producing the annotations the emitter consumes.
#[must_use]
pub fn structure_cfg(cfg: &Cfg) -> StructuringInfo {
    let n = cfg.block_count();
    let mut info = StructuringInfo {
        ann: vec![BlockAnnotations::default(); n],
        back_edges: Vec::new(),
    };
    if n == 0 {
        return info;
    }

    let dom = compute_dominators(cfg);
    let rev = ReverseGraph::of(cfg);
    let pdom = compute_dominators(&rev);
    let sink = rev.sink();

    // Back edges and natural loops
    for block in cfg.blocks() {
        for &succ in block.successors() {
            if dom.dominates(succ, block.id) {
                info.back_edges.push((block.id, succ));
            }
        }
    }

    let mut loops: Vec<NaturalLoop> = Vec::new();
    for &(latch, header) in &info.back_edges {
        if let Some(existing) = loops.iter_mut().find(|l| l.header == header) {
            existing.body.extend(natural_loop_body(cfg, header, latch));
            // Keep the latest latch; with one back edge per header this is
            // simply the latch
            existing.latch = existing.latch.max(latch);
        } else {
            loops.push(NaturalLoop {
                header,
                latch,
                body: natural_loop_body(cfg, header, latch),
            });
        }
    }

    // Outer loops first so inner assignments overwrite: innermost wins
    loops.sort_by_key(|l| std::cmp::Reverse(l.body.len()));
    for l in &loops {
        for &member in &l.body {
            info.ann[member.index()].loop_head = Some(l.header);
        }
        info.ann[l.latch.index()].is_latch = true;
        info.ann[l.header.index()].latch = Some(l.latch);
        info.ann[l.header.index()].struct_type = StructType::Loop;
    }

    // Loop classification and follow determination
    for l in &loops {
        let header_block = cfg.block(l.header).expect("loop header in graph");
        let latch_block = cfg.block(l.latch).expect("latch in graph");

        let header_exits = header_block.kind == BlockType::TwoWay
            && header_block
                .successors()
                .iter()
                .any(|s| !l.body.contains(s));
        let latch_exits = latch_block.kind == BlockType::TwoWay
            && latch_block.successors().iter().any(|s| !l.body.contains(s));

        let loop_type = if latch_exits && (!header_exits || l.header == l.latch) {
            LoopType::PostTested
        } else if header_exits {
            LoopType::PreTested
        } else {
            LoopType::Endless
        };
        info.ann[l.header.index()].loop_type = Some(loop_type);

        let follow = match loop_type {
            LoopType::PreTested => header_block
                .successors()
                .iter()
                .find(|s| !l.body.contains(s))
                .copied(),
            LoopType::PostTested => latch_block
                .successors()
                .iter()
                .find(|s| !l.body.contains(s))
                .copied(),
            LoopType::Endless => {
                // Earliest post-dominator outside the loop body
                let mut candidate = pdom.immediate_dominator(l.header);
                while let Some(c) = candidate {
                    if c == sink {
                        candidate = None;
                        break;
                    }
                    if !l.body.contains(&c) {
                        break;
                    }
                    candidate = pdom.immediate_dominator(c);
                }
                candidate
            }
        };
        info.ann[l.header.index()].loop_follow = follow;
    }

    // Conditionals
    for block in cfg.blocks() {
        let bb = block.id;
        match block.kind {
            BlockType::TwoWay => {
                let is_loop_header = info.ann[bb.index()].struct_type == StructType::Loop;
                let loop_type = info.ann[bb.index()].loop_type;
                if is_loop_header {
                    // A pre-tested header's condition is the loop test, and
                    // so is a single-block loop's; only a header with a
                    // separate latch keeps a real conditional inside the body
                    if loop_type != Some(LoopType::PreTested)
                        && info.ann[bb.index()].latch != Some(bb)
                    {
                        info.ann[bb.index()].struct_type = StructType::LoopCond;
                        classify_two_way(cfg, &mut info, &pdom, sink, bb);
                    }
                    continue;
                }
                // A latch whose branch closes the loop is not a conditional
                if info.ann[bb.index()].is_latch {
                    continue;
                }
                info.ann[bb.index()].struct_type = StructType::Cond;
                classify_two_way(cfg, &mut info, &pdom, sink, bb);
            }
            BlockType::Nway => {
                info.ann[bb.index()].struct_type = StructType::Cond;
                info.ann[bb.index()].cond_type = Some(CondType::Case);
                let follow = pdom.immediate_dominator(bb).filter(|&f| f != sink);
                info.ann[bb.index()].cond_follow = follow;
            }
            _ => {}
        }
    }

    // Case heads: every block dominated by an n-way header, short of its
    // follow, belongs to that case; nearer headers win
    let rpo = cfg.reverse_postorder();
    for &head in &rpo {
        if info.ann[head.index()].cond_type != Some(CondType::Case) {
            continue;
        }
        let follow = info.ann[head.index()].cond_follow;
        for block in cfg.blocks() {
            let bb = block.id;
            if bb == head || Some(bb) == follow {
                continue;
            }
            if dom.strictly_dominates(head, bb) {
                info.ann[bb.index()].case_head = Some(head);
            }
        }
    }

    // Unstructured jumps, now that loop and case extents are known
    for block in cfg.blocks() {
        let bb = block.id;
        if info.ann[bb.index()].struct_type != StructType::Cond
            && info.ann[bb.index()].struct_type != StructType::LoopCond
        {
            continue;
        }
        if info.ann[bb.index()].cond_type == Some(CondType::Case) {
            continue;
        }
        let my_loop = info.ann[bb.index()].loop_head;
        let my_case = info.ann[bb.index()].case_head;

        for &succ in block.successors() {
            let succ_loop = info.ann[succ.index()].loop_head;
            if succ_loop != my_loop {
                let exits_to_follow = my_loop
                    .is_some_and(|head| info.ann[head.index()].loop_follow == Some(succ));
                if !exits_to_follow {
                    info.ann[bb.index()].unstruct_type = UnstructType::JumpInOutLoop;
                    break;
                }
            }
            let succ_case = info.ann[succ.index()].case_head;
            if succ_case != my_case && succ_case.is_some() {
                let is_arm_entry = succ_case.is_some_and(|head| {
                    cfg.block(head)
                        .is_some_and(|h| h.successors().contains(&succ))
                });
                if !is_arm_entry {
                    info.ann[bb.index()].unstruct_type = UnstructType::JumpIntoCase;
                    break;
                }
            }
        }
    }

    info
}

/// Classifies a two-way conditional and finds its follow.
fn classify_two_way(
    cfg: &Cfg,
    info: &mut StructuringInfo,
    pdom: &DominatorTree,
    sink: BlockId,
    bb: BlockId,
) {
    let block = cfg.block(bb).expect("caller checked");
    let follow = pdom.immediate_dominator(bb).filter(|&f| f != sink);
    info.ann[bb.index()].cond_follow = follow;

    let taken = block.successor(BTHEN);
    let fall = block.successor(BELSE);
    let cond_type = if follow.is_some() && fall == follow {
        CondType::IfThen
    } else if follow.is_some() && taken == follow {
        CondType::IfElse
    } else {
        CondType::IfThenElse
    };
    info.ann[bb.index()].cond_type = Some(cond_type);
}

/// The body of the natural loop of back edge `latch -> header`: the header
/// plus everything that reaches the latch without passing through the header.
fn natural_loop_body(cfg: &Cfg, header: BlockId, latch: BlockId) -> FxHashSet<BlockId> {
    let mut body: FxHashSet<BlockId> = FxHashSet::default();
    body.insert(header);
    body.insert(latch);

    let mut worklist = vec![latch];
    while let Some(node) = worklist.pop() {
        if node == header {
            continue;
        }
        let preds: Vec<BlockId> = cfg
            .block(node)
            .map(|b| b.predecessors().to_vec())
            .unwrap_or_default();
        for pred in preds {
            if body.insert(pred) {
                worklist.push(pred);
            }
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Address, Rtl};

    fn block(cfg: &mut Cfg, kind: BlockType, addr: u64) -> BlockId {
        cfg.add_block(kind, vec![Rtl::new(Address(addr))])
    }

    /// Pre-tested loop: A -> B(cond), B -> C(body), C -> B(back), B -> D(exit)
    fn pretested() -> (Cfg, BlockId, BlockId, BlockId, BlockId) {
        let mut cfg = Cfg::new();
        let a = block(&mut cfg, BlockType::Fall, 0x1000);
        let b = block(&mut cfg, BlockType::TwoWay, 0x1004);
        let c = block(&mut cfg, BlockType::Fall, 0x1008);
        let d = block(&mut cfg, BlockType::Ret, 0x100c);
        cfg.add_edge(a, b);
        cfg.add_edge(b, c); // taken: body
        cfg.add_edge(b, d); // fall: exit
        cfg.add_edge(c, b); // back edge
        (cfg, a, b, c, d)
    }

    #[test]
    fn test_pretested_loop_detection() {
        let (cfg, _a, b, c, d) = pretested();
        let info = structure_cfg(&cfg);

        assert_eq!(info.struct_type(b), StructType::Loop);
        assert_eq!(info.loop_type(b), Some(LoopType::PreTested));
        assert_eq!(info.latch_node(b), Some(c));
        assert_eq!(info.loop_follow(b), Some(d));
        assert!(info.is_latch_node(c));
        assert!(info.is_back_edge(c, b));
        assert_eq!(info.loop_head(c), Some(b));
        // The exit is outside the loop
        assert_eq!(info.loop_head(d), None);
    }

    #[test]
    fn test_post_tested_loop() {
        // A -> B(body), B(cond) -> B(back) / C(exit)
        let mut cfg = Cfg::new();
        let a = block(&mut cfg, BlockType::Fall, 0x1000);
        let b = block(&mut cfg, BlockType::TwoWay, 0x1004);
        let c = block(&mut cfg, BlockType::Ret, 0x1008);
        cfg.add_edge(a, b);
        cfg.add_edge(b, b); // taken: back edge
        cfg.add_edge(b, c); // fall: exit
        let info = structure_cfg(&cfg);

        assert_eq!(info.loop_type(b), Some(LoopType::PostTested));
        assert_eq!(info.latch_node(b), Some(b));
        assert_eq!(info.loop_follow(b), Some(c));
    }

    #[test]
    fn test_endless_loop() {
        let mut cfg = Cfg::new();
        let a = block(&mut cfg, BlockType::Fall, 0x1000);
        let b = block(&mut cfg, BlockType::Fall, 0x1004);
        let c = block(&mut cfg, BlockType::OneWay, 0x1008);
        cfg.add_edge(a, b);
        cfg.add_edge(b, c);
        cfg.add_edge(c, b);
        let info = structure_cfg(&cfg);

        assert_eq!(info.struct_type(b), StructType::Loop);
        assert_eq!(info.loop_type(b), Some(LoopType::Endless));
        assert_eq!(info.loop_follow(b), None);
    }

    #[test]
    fn test_if_then_else_classification() {
        // cond -> {then, else} -> join
        let mut cfg = Cfg::new();
        let cond = block(&mut cfg, BlockType::TwoWay, 0x1000);
        let then_b = block(&mut cfg, BlockType::Fall, 0x1004);
        let else_b = block(&mut cfg, BlockType::Fall, 0x1008);
        let join = block(&mut cfg, BlockType::Ret, 0x100c);
        cfg.add_edge(cond, then_b);
        cfg.add_edge(cond, else_b);
        cfg.add_edge(then_b, join);
        cfg.add_edge(else_b, join);
        let info = structure_cfg(&cfg);

        assert_eq!(info.struct_type(cond), StructType::Cond);
        assert_eq!(info.cond_type(cond), Some(CondType::IfThenElse));
        assert_eq!(info.cond_follow(cond), Some(join));
        assert_eq!(info.unstruct_type(cond), UnstructType::Structured);
    }

    #[test]
    fn test_if_then_classification() {
        // cond -> {then, join}, then -> join
        let mut cfg = Cfg::new();
        let cond = block(&mut cfg, BlockType::TwoWay, 0x1000);
        let then_b = block(&mut cfg, BlockType::Fall, 0x1004);
        let join = block(&mut cfg, BlockType::Ret, 0x1008);
        cfg.add_edge(cond, then_b);
        cfg.add_edge(cond, join);
        cfg.add_edge(then_b, join);
        let info = structure_cfg(&cfg);

        assert_eq!(info.cond_type(cond), Some(CondType::IfThen));
        assert_eq!(info.cond_follow(cond), Some(join));
    }

    #[test]
    fn test_case_structure() {
        // nway -> {c0, c1, c2} -> join
        let mut cfg = Cfg::new();
        let head = block(&mut cfg, BlockType::Nway, 0x1000);
        let c0 = block(&mut cfg, BlockType::Fall, 0x1004);
        let c1 = block(&mut cfg, BlockType::Fall, 0x1008);
        let c2 = block(&mut cfg, BlockType::Fall, 0x100c);
        let join = block(&mut cfg, BlockType::Ret, 0x1010);
        for c in [c0, c1, c2] {
            cfg.add_edge(head, c);
            cfg.add_edge(c, join);
        }
        let info = structure_cfg(&cfg);

        assert_eq!(info.struct_type(head), StructType::Cond);
        assert_eq!(info.cond_type(head), Some(CondType::Case));
        assert_eq!(info.cond_follow(head), Some(join));
        for c in [c0, c1, c2] {
            assert_eq!(info.case_head(c), Some(head));
            assert!(info.is_case_option(c));
        }
        assert_eq!(info.case_head(join), None);
    }

    #[test]
    fn test_every_block_has_exactly_one_struct_type() {
        let (cfg, ..) = pretested();
        let info = structure_cfg(&cfg);
        for bb in cfg.block_ids() {
            // The accessor always yields exactly one kind; spot-check that
            // non-headers stay sequential
            let st = info.struct_type(bb);
            if info.loop_type(bb).is_none() && info.cond_type(bb).is_none() {
                assert_eq!(st, StructType::Seq);
            }
        }
    }

    #[test]
    fn test_latch_dominated_by_header() {
        let (cfg, _a, b, c, _d) = pretested();
        let info = structure_cfg(&cfg);
        let dom = compute_dominators(&cfg);
        // The latch belongs to the loop: the header dominates it
        assert!(dom.dominates(b, c));
        assert_eq!(info.latch_node(b), Some(c));
    }
}
