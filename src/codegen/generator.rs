//! Structured C code generation for one procedure.
//!
//! Walks the structured CFG from the entry, guided by the annotations of the
//! structural analyzer and two stacks:
//!
//! - `follow_set`: follows of the enclosing conditionals and loops; reaching
//!   one means the construct is done and a goto (or nothing) is emitted
//!   rather than recursing
//! - `goto_set`: targets that must be reached by goto because an
//!   unstructured branch jumps into or out of a loop or case body
//!
//! Statement-level output goes through the emitter callback surface
//! (`add_assignment_statement`, `add_goto`, `add_if_cond_header`, ...) into a
//! [`CodeBuffer`]; unused labels are pruned after the walk.

use rustc_hash::FxHashSet;

use crate::analysis::cfg::{BlockId, BlockType, BELSE, BTHEN};
use crate::analysis::structure::{
    structure_cfg, CondType, LoopType, StructType, StructuringInfo, UnstructType,
};
use crate::codegen::buffer::CodeBuffer;
use crate::codegen::ctype::{append_type, append_type_ident};
use crate::codegen::exp::{ExpPrinter, Prec};
use crate::ir::{
    simplify, Assign, CallStatement, Exp, ExpRewrite, Operator, ReturnStatement, SharedExp,
    StatementKind, SwitchInfo, SwitchKind, Type,
};
use crate::program::{Global, Program, UserProc};
use crate::project::Settings;
use crate::Result;

/// Generates the C rendition of one procedure.
pub struct CodeGenerator<'a> {
    prog: &'a Program,
    settings: &'a Settings,
    proc: &'a UserProc,
    analysis: StructuringInfo,
    buf: CodeBuffer,
    generated: FxHashSet<BlockId>,
}

impl<'a> CodeGenerator<'a> {
    /// Structures and emits `proc`, returning the generated lines.
    ///
    /// # Errors
    ///
    /// Returns an error when the CFG has no entry.
    pub fn generate_proc(
        prog: &'a Program,
        settings: &'a Settings,
        proc: &'a UserProc,
    ) -> Result<Vec<String>> {
        let analysis = structure_cfg(&proc.cfg);
        let mut gen = CodeGenerator {
            prog,
            settings,
            proc,
            analysis,
            buf: CodeBuffer::new(),
            generated: FxHashSet::default(),
        };
        gen.emit_proc()?;
        Ok(gen.buf.into_lines())
    }

    /// Renders the one-line prototype of `proc`.
    #[must_use]
    pub fn prototype(prog: &Program, settings: &Settings, proc: &UserProc) -> String {
        let mut s = signature_text(prog, settings, proc);
        s.push(';');
        s
    }

    /// Renders a global declaration line.
    #[must_use]
    pub fn global_line(prog: &Program, global: &Global) -> String {
        let mut s = String::new();
        match global.ty.resolved() {
            Type::Array { base, length } => {
                append_type(&mut s, base);
                s.push(' ');
                s.push_str(&global.name);
                s.push('[');
                if let Some(n) = length {
                    s.push_str(&n.to_string());
                }
                s.push(']');
            }
            Type::Pointer(pointee) if pointee.resolves_to_func() => {
                append_type_ident(&mut s, &global.ty, &global.name);
            }
            _ => {
                append_type(&mut s, &global.ty);
                s.push(' ');
                s.push_str(&global.name);
            }
        }
        if let Some(init) = &global.init {
            if !init.is_nil() {
                s.push_str(" = ");
                let printer = ExpPrinter::new(prog, None);
                printer.append_exp(&mut s, init, Prec::Assign, global.ty.is_unsigned());
            }
        }
        s.push(';');
        if let Type::Size(bits) = global.ty.resolved() {
            s.push_str(&format!(" // {} bytes", bits / 8));
        }
        s
    }

    fn printer(&self) -> ExpPrinter<'a> {
        ExpPrinter::new(self.prog, Some(self.proc))
    }

    fn exp_text(&self, exp: &SharedExp, cur: Prec, uns: bool) -> String {
        let mut s = String::new();
        self.printer().append_exp(&mut s, exp, cur, uns);
        s
    }

    // ------------------------------------------------------------------
    // Whole-procedure emission
    // ------------------------------------------------------------------

    fn emit_proc(&mut self) -> Result<()> {
        let Some(entry) = self.proc.cfg.entry() else {
            return Err(crate::Error::Codegen(format!(
                "procedure '{}' has no entry block",
                self.proc.name
            )));
        };

        if self.settings.print_rtls {
            for block in self.proc.cfg.blocks() {
                for rtl in &block.rtls {
                    log::debug!("{rtl}");
                }
            }
        }

        self.add_proc_start();

        // Declare everything in the locals map
        let locals: Vec<(String, Type)> = self
            .proc
            .locals
            .iter()
            .map(|(n, t)| (n.clone(), t.clone()))
            .collect();
        let count = locals.len();
        for (i, (name, ty)) in locals.into_iter().enumerate() {
            let ty = if ty.resolves_to_void() {
                Type::int()
            } else {
                ty
            };
            self.add_local(&name, &ty, i + 1 == count);
        }

        let mut follow_set: Vec<BlockId> = Vec::new();
        let mut goto_set: Vec<BlockId> = Vec::new();
        self.generate_code(entry, None, &mut follow_set, &mut goto_set);

        self.add_proc_end();

        if self.settings.remove_labels {
            self.buf.remove_unused_labels();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structured traversal
    // ------------------------------------------------------------------

    fn generate_code(
        &mut self,
        bb: BlockId,
        latch: Option<BlockId>,
        follow_set: &mut Vec<BlockId>,
        goto_set: &mut Vec<BlockId>,
    ) {
        let encl_follow = follow_set.last().copied();

        // A goto-set member still waiting on unemitted parents (or sitting
        // at the enclosing loop's exit) is only reachable by goto here
        let latch_follow = latch
            .and_then(|l| self.analysis.loop_head(l))
            .and_then(|head| self.analysis.loop_follow(head));
        if goto_set.contains(&bb)
            && !self.analysis.is_latch_node(bb)
            && (latch_follow == Some(bb) || !self.is_all_parents_generated(bb))
        {
            self.emit_goto_and_label(bb, bb);
            return;
        }
        if follow_set.contains(&bb) {
            if Some(bb) != encl_follow {
                self.emit_goto_and_label(bb, bb);
            }
            return;
        }

        // Only a loop over a single block revisits an emitted block
        if self.generated.contains(&bb) {
            return;
        }
        self.generated.insert(bb);

        // A latch is written inline at its place in the loop body, unless it
        // doubles as the loop header (single-block loop) and must dispatch
        // as a loop
        if self.analysis.is_latch_node(bb)
            && self.analysis.struct_type(bb) == StructType::Seq
        {
            self.write_bb(bb, true);
            return;
        }

        match self.analysis.struct_type(bb) {
            StructType::Loop | StructType::LoopCond => {
                self.generate_loop(bb, latch, follow_set, goto_set);
            }
            StructType::Cond => self.generate_branch(bb, latch, follow_set, goto_set),
            StructType::Seq => self.generate_seq(bb, latch, follow_set, goto_set),
        }
    }

    fn generate_loop(
        &mut self,
        bb: BlockId,
        latch: Option<BlockId>,
        follow_set: &mut Vec<BlockId>,
        goto_set: &mut Vec<BlockId>,
    ) {
        let loop_follow = self.analysis.loop_follow(bb);
        let loop_latch = self.analysis.latch_node(bb);
        if let Some(follow) = loop_follow {
            follow_set.push(follow);
        }

        let loop_type = self.analysis.loop_type(bb).unwrap_or(LoopType::Endless);
        match loop_type {
            LoopType::PreTested => {
                // Header body first (excluding the predicate)
                self.write_bb(bb, true);

                let mut cond = self
                    .block_condition(bb)
                    .unwrap_or_else(|| Exp::terminal(Operator::True));
                let taken = self.successor(bb, BTHEN);
                if taken == loop_follow {
                    cond = simplify(&Exp::unary(Operator::LNot, cond));
                }
                self.add_pretested_loop_header(&cond);

                let body = if self.successor(bb, BELSE) == loop_follow {
                    self.successor(bb, BTHEN)
                } else {
                    self.successor(bb, BELSE)
                };
                if let Some(body) = body {
                    self.generate_code(body, loop_latch, follow_set, goto_set);
                }

                if let Some(l) = loop_latch {
                    if !self.generated.contains(&l) {
                        self.generated.insert(l);
                        self.write_bb(l, true);
                    }
                }

                // Re-emit the header body so the retest sees updated values
                self.write_bb(bb, false);
                self.add_pretested_loop_end();
            }
            LoopType::PostTested | LoopType::Endless => {
                if loop_type == LoopType::Endless {
                    self.add_endless_loop_header();
                } else {
                    self.add_post_tested_loop_header();
                }

                if self.analysis.struct_type(bb) == StructType::LoopCond {
                    // The header doubles as a conditional: re-enter the
                    // dispatch with the conditional view
                    self.analysis.set_struct_type(bb, StructType::Cond);
                    self.generated.remove(&bb);
                    self.generate_code(bb, loop_latch, follow_set, goto_set);
                } else {
                    self.write_bb(bb, true);
                    if let Some(body) = self.successor(bb, 0) {
                        self.generate_code(body, loop_latch, follow_set, goto_set);
                    }
                }

                if let Some(l) = loop_latch {
                    if !self.generated.contains(&l) {
                        self.generated.insert(l);
                        self.write_bb(l, true);
                    }
                }
                if loop_type == LoopType::PostTested {
                    let cond = loop_latch
                        .and_then(|l| self.block_condition(l))
                        .unwrap_or_else(|| Exp::terminal(Operator::True));
                    self.add_post_tested_loop_end(&cond);
                } else {
                    self.add_endless_loop_end();
                }
            }
        }

        if let Some(follow) = loop_follow {
            follow_set.pop();
            if self.generated.contains(&follow) {
                self.emit_goto_and_label(bb, follow);
            } else {
                self.generate_code(follow, latch, follow_set, goto_set);
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn generate_branch(
        &mut self,
        bb: BlockId,
        latch: Option<BlockId>,
        follow_set: &mut Vec<BlockId>,
        goto_set: &mut Vec<BlockId>,
    ) {
        // Restore the loop view for headers the loop pass demoted
        if self.analysis.latch_node(bb).is_some() {
            self.analysis.set_struct_type(bb, StructType::LoopCond);
        }

        let cond_type = self.analysis.cond_type(bb);
        let cond_follow = self.analysis.cond_follow(bb);
        let unstruct = self.analysis.unstruct_type(bb);

        // Jumps into or out of a body need a temporary follow and goto-set
        // entries so the targets are forced to labels
        let mut tmp_cond_follow: Option<BlockId> = None;
        let mut goto_total = 0;
        let mut follows_pushed = 0;

        if cond_type == Some(CondType::Case) {
            if let Some(follow) = cond_follow {
                follow_set.push(follow);
                follows_pushed += 1;
            }
        } else if let Some(follow) = cond_follow {
            if unstruct == UnstructType::Structured {
                follow_set.push(follow);
                follows_pushed += 1;
            } else {
                if unstruct == UnstructType::JumpInOutLoop {
                    goto_set.push(follow);
                    goto_total += 1;
                    if let Some(l) = latch {
                        goto_set.push(l);
                        goto_total += 1;
                    }
                    let my_loop_head = if self.analysis.struct_type(bb) == StructType::LoopCond {
                        Some(bb)
                    } else {
                        self.analysis.loop_head(bb)
                    };
                    if let Some(follow_loop) = self.analysis.loop_head(follow) {
                        if Some(follow_loop) != my_loop_head {
                            goto_set.push(follow_loop);
                            goto_total += 1;
                        }
                    }
                }

                tmp_cond_follow = self.successor(
                    bb,
                    if cond_type == Some(CondType::IfThen) {
                        BELSE
                    } else {
                        BTHEN
                    },
                );
                if unstruct == UnstructType::JumpIntoCase {
                    if let Some(tmp) = tmp_cond_follow {
                        follow_set.push(tmp);
                        follows_pushed += 1;
                    }
                }
            }
        }

        // The block body, excluding the conditional itself
        self.write_bb(bb, true);

        if cond_type == Some(CondType::Case) {
            let info = self.switch_info(bb);
            let Some(info) = info else {
                // Unrecognized n-way; degrade to a comment
                let dest = self.block_dest_text(bb);
                self.add_line_comment(&format!("goto {dest}"));
                for _ in 0..follows_pushed {
                    follow_set.pop();
                }
                return;
            };

            let switch_text = self.exp_text(&info.exp, Prec::None, false);
            self.add_case_cond_header(&switch_text);

            for i in 0..info.num_cases {
                let case_val = match info.kind {
                    SwitchKind::Fortran => {
                        // The table value itself is the case label
                        let entry = info
                            .table_addr
                            .offset_by(i as u64 * u64::from(self.prog.word_bytes));
                        self.prog
                            .image()
                            .read_native_word(entry, self.prog.word_bytes)
                            .map_or(0, |v| v as i64)
                    }
                    _ => info.lower + i as i64,
                };
                self.add_case_cond_option(case_val);
                if let Some(succ) = self.successor(bb, i) {
                    if self.generated.contains(&succ) {
                        self.emit_goto_and_label(bb, succ);
                    } else {
                        self.generate_code(succ, latch, follow_set, goto_set);
                    }
                }
            }
            if info.default.is_some() {
                self.add_case_cond_else();
                if let Some(succ) = self.successor(bb, info.num_cases) {
                    if self.generated.contains(&succ) {
                        self.emit_goto_and_label(bb, succ);
                    } else {
                        self.generate_code(succ, latch, follow_set, goto_set);
                    }
                }
            }
            self.add_case_cond_end();
        } else {
            let mut cond = self
                .block_condition(bb)
                .unwrap_or_else(|| Exp::addr(crate::ir::Address(0xfeed_face)));
            if cond_type == Some(CondType::IfElse) {
                cond = simplify(&Exp::unary(Operator::LNot, cond));
            }
            if cond_type == Some(CondType::IfThenElse) {
                self.add_if_else_cond_header(&cond);
            } else {
                self.add_if_cond_header(&cond);
            }

            let first_arm = self.successor(
                bb,
                if cond_type == Some(CondType::IfElse) {
                    BELSE
                } else {
                    BTHEN
                },
            );
            if let Some(succ) = first_arm {
                let loop_exit = self
                    .analysis
                    .loop_head(bb)
                    .and_then(|h| self.analysis.loop_follow(h));
                if self.generated.contains(&succ) || loop_exit == Some(succ) {
                    self.emit_goto_and_label(bb, succ);
                } else {
                    self.generate_code(succ, latch, follow_set, goto_set);
                }
            }

            if cond_type == Some(CondType::IfThenElse) {
                self.add_if_else_cond_option();
                if let Some(succ) = self.successor(bb, BELSE) {
                    if self.generated.contains(&succ) {
                        self.emit_goto_and_label(bb, succ);
                    } else {
                        self.generate_code(succ, latch, follow_set, goto_set);
                    }
                }
                self.add_if_else_cond_end();
            } else {
                self.add_if_cond_end();
            }
        }

        // The follow, via whichever set it was parked on
        if let Some(follow) = cond_follow {
            for _ in 0..follows_pushed {
                follow_set.pop();
            }
            for _ in 0..goto_total {
                goto_set.pop();
            }

            let target = tmp_cond_follow.unwrap_or(follow);
            if self.generated.contains(&target) {
                self.emit_goto_and_label(bb, target);
            } else {
                self.generate_code(target, latch, follow_set, goto_set);
            }
        }
    }

    fn generate_seq(
        &mut self,
        bb: BlockId,
        latch: Option<BlockId>,
        follow_set: &mut Vec<BlockId>,
        goto_set: &mut Vec<BlockId>,
    ) {
        self.write_bb(bb, true);

        let block_kind = self.proc.cfg.block(bb).map(|b| b.kind);
        if block_kind == Some(BlockType::Ret) {
            return;
        }

        let num_succs = self
            .proc
            .cfg
            .block(bb)
            .map_or(0, crate::analysis::cfg::BasicBlock::num_successors);
        if num_succs == 0 {
            if block_kind == Some(BlockType::CompJump) {
                let dest = self.block_dest_text(bb);
                self.add_line_comment(&format!("goto {dest}"));
            } else {
                log::warn!(
                    "no out edge for block {bb} in procedure '{}'",
                    self.proc.name
                );
            }
            return;
        }

        let mut child = self.successor(bb, 0);
        if num_succs > 1 {
            // A two-way that stayed sequential: emit a one-arm if around the
            // taken side and continue with the fall-through
            let taken = self.successor(bb, BTHEN);
            child = self.successor(bb, BELSE);
            if let Some(cond) = self.block_condition(bb) {
                self.add_if_cond_header(&cond);
                if let Some(other) = taken {
                    if self.generated.contains(&other) {
                        self.emit_goto_and_label(bb, other);
                    } else {
                        self.generate_code(other, latch, follow_set, goto_set);
                    }
                }
                self.add_if_cond_end();
            } else {
                log::warn!("two-way block {bb} without a condition");
            }
        }

        let Some(child) = child else {
            return;
        };

        // Generate the successor inline only when it is in the same
        // loop/case scope and is not the enclosing latch; everything else
        // is a goto
        let latch_follow = latch
            .and_then(|l| self.analysis.loop_head(l))
            .and_then(|h| self.analysis.loop_follow(h));

        if self.generated.contains(&child) {
            self.emit_goto_and_label(bb, child);
        } else if self.analysis.loop_head(child) != self.analysis.loop_head(bb)
            && (!self.is_all_parents_generated(child) || follow_set.contains(&child))
        {
            self.emit_goto_and_label(bb, child);
        } else if latch_follow == Some(child) {
            self.emit_goto_and_label(bb, child);
        } else if self.analysis.case_head(bb) != self.analysis.case_head(child)
            && self
                .analysis
                .case_head(bb)
                .is_some_and(|h| self.analysis.cond_follow(h).is_some())
        {
            self.emit_goto_and_label(bb, child);
        } else if self.analysis.case_head(bb).is_some()
            && self.analysis.case_head(bb).and_then(|h| self.analysis.cond_follow(h))
                == Some(child)
        {
            // End of a case arm
            self.add_case_cond_option_end();
        } else if self.analysis.case_head(bb).is_none()
            || self.analysis.case_head(bb) != self.analysis.case_head(child)
            || !self.analysis.is_case_option(child)
        {
            self.generate_code(child, latch, follow_set, goto_set);
        }
    }

    fn emit_goto_and_label(&mut self, bb: BlockId, dest: BlockId) {
        let my_loop = self.analysis.loop_head(bb);
        if let Some(head) = my_loop {
            if head == dest {
                self.add_continue();
                return;
            }
            if self.analysis.loop_follow(head) == Some(dest) {
                self.add_break();
                return;
            }
        }
        if self.proc.cfg.block(dest).map(|b| b.kind) == Some(BlockType::Ret) {
            // A goto to a return reads better as the return itself
            self.write_bb(dest, false);
            return;
        }
        self.add_goto(dest);
    }

    fn write_bb(&mut self, bb: BlockId, with_label: bool) {
        if self.settings.debug_gen {
            log::debug!("generating code for block {bb}");
        }
        if self.proc.cfg.block(bb).is_none() {
            return;
        }
        if with_label {
            self.add_label(bb);
        }

        // Control-transfer statements are rendered by the structure walk;
        // only value-level statements print here
        let mut stmts: Vec<crate::ir::Statement> = Vec::new();
        self.proc
            .cfg
            .block(bb)
            .expect("checked above")
            .for_each_statement(&mut |s| stmts.push(s.clone()));
        for stmt in stmts {
            match &stmt.kind {
                StatementKind::Assign(a) => self.add_assignment_statement(a),
                StatementKind::Call(c) => {
                    if c.is_computed() {
                        self.add_ind_call_statement(c);
                    } else {
                        self.add_call_statement(c);
                    }
                }
                StatementKind::Return(r) => self.add_return_statement(r),
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Emitter callback surface
    // ------------------------------------------------------------------

    fn add_assignment_statement(&mut self, asgn: &Assign) {
        // Assignments to the program counter carry no source meaning
        if asgn.lhs.oper() == Operator::Pc
            || asgn.rhs.search(&Exp::Terminal(Operator::Pc))
        {
            return;
        }
        let lhs_stripped = asgn.lhs.strip_subscripts();
        if lhs_stripped == asgn.rhs.strip_subscripts() {
            return; // never emit a = a;
        }

        let mut line = String::new();
        if asgn.lhs.oper() == Operator::Global && asgn.ty.resolves_to_array() {
            self.printer().append_exp(
                &mut line,
                &Exp::binary(Operator::ArrayIndex, asgn.lhs.clone(), Exp::int(0)),
                Prec::Assign,
                false,
            );
        } else {
            self.printer()
                .append_exp(&mut line, &asgn.lhs, Prec::Assign, false);
        }

        // a = a + b has shorter spellings
        let mut use_increment = false;
        let mut use_short_form = false;
        if let Exp::Binary(op @ (Operator::Plus | Operator::Minus), base, amount) = &*asgn.rhs
        {
            if base.strip_subscripts() == lhs_stripped {
                use_short_form = true;
                if let Some(k) = amount.int_value() {
                    if k == 1 {
                        use_increment = true;
                    } else if asgn.ty.resolves_to_pointer()
                        && k == i64::from(self.prog.word_bytes)
                    {
                        // Pointer stride: ptr += word is ptr++
                        use_increment = true;
                    }
                }
                if use_increment {
                    line.push_str(if *op == Operator::Plus { "++;" } else { "--;" });
                } else {
                    line.push_str(if *op == Operator::Plus { " += " } else { " -= " });
                    self.printer()
                        .append_exp(&mut line, amount, Prec::Assign, false);
                    line.push(';');
                }
            }
        }
        if !use_short_form {
            line.push_str(" = ");
            self.printer()
                .append_exp(&mut line, &asgn.rhs, Prec::Assign, asgn.ty.is_unsigned());
            line.push(';');
        }
        self.buf.append_indented(line);
    }

    fn add_call_statement(&mut self, call: &CallStatement) {
        let sp = Exp::reg(self.prog.stack_reg);
        let results: Vec<&(Type, SharedExp)> = call
            .defines
            .iter()
            .filter(|(_, loc)| loc.strip_subscripts() != sp)
            .collect();

        let mut line = String::new();
        if let Some((_, first)) = results.first() {
            self.printer().append_exp(&mut line, first, Prec::Assign, false);
            line.push_str(" = ");
        }

        let callee_name = call
            .dest_proc
            .and_then(|id| self.prog.proc(id))
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| self.exp_text(&call.dest, Prec::None, false));
        line.push_str(&callee_name);
        line.push('(');
        for (i, arg) in call.args.iter().enumerate() {
            if i > 0 {
                line.push_str(", ");
            }
            // A constant argument that names a procedure prints its name
            let named_proc = arg
                .rhs
                .strip_subscripts()
                .addr_value()
                .and_then(|a| self.prog.proc_by_addr(a))
                .and_then(|id| self.prog.proc(id))
                .filter(|_| arg.ty.pointee().is_some_and(Type::resolves_to_func));
            match named_proc {
                Some(p) => line.push_str(p.name()),
                None => {
                    self.printer().append_exp(&mut line, &arg.rhs, Prec::Comma, false);
                }
            }
        }
        line.push_str(");");

        if results.len() > 1 {
            line.push_str(" /* Warning: also results in ");
            for (i, (_, loc)) in results.iter().skip(1).enumerate() {
                if i > 0 {
                    line.push_str(", ");
                }
                self.printer().append_exp(&mut line, loc, Prec::Comma, false);
            }
            line.push_str(" */");
        }
        self.buf.append_indented(line);
    }

    fn add_ind_call_statement(&mut self, call: &CallStatement) {
        let mut line = String::from("(*");
        self.printer()
            .append_exp(&mut line, &call.dest, Prec::None, false);
        line.push_str(")(");
        for (i, arg) in call.args.iter().enumerate() {
            if i > 0 {
                line.push_str(", ");
            }
            self.printer().append_exp(&mut line, &arg.rhs, Prec::Comma, false);
        }
        line.push_str(");");
        self.buf.append_indented(line);
    }

    fn add_return_statement(&mut self, ret: &ReturnStatement) {
        let sp = Exp::reg(self.prog.stack_reg);
        let returns: Vec<&Assign> = ret
            .returns
            .iter()
            .filter(|a| a.lhs.strip_subscripts() != sp)
            .collect();

        let mut line = String::from("return");
        if let Some(first) = returns.first() {
            line.push(' ');
            self.printer()
                .append_exp(&mut line, &first.rhs, Prec::None, false);
        }
        line.push(';');

        if returns.len() > 1 {
            line.push_str(" /* WARNING: Also returning: ");
            for (i, r) in returns.iter().skip(1).enumerate() {
                if i > 0 {
                    line.push_str(", ");
                }
                self.printer().append_exp(&mut line, &r.lhs, Prec::None, false);
                line.push_str(" := ");
                self.printer().append_exp(&mut line, &r.rhs, Prec::None, false);
            }
            line.push_str(" */");
        }
        self.buf.append_indented(line);
    }

    fn add_label(&mut self, bb: BlockId) {
        if let Some(block) = self.proc.cfg.block(bb) {
            self.buf
                .append_line(format!("bb0x{:x}:", block.low_addr().value()));
        }
    }

    fn add_goto(&mut self, dest: BlockId) {
        if let Some(block) = self.proc.cfg.block(dest) {
            let addr = block.low_addr().value();
            self.buf.append_indented(format!("goto bb0x{addr:x};"));
            self.buf.use_label(addr);
        }
    }

    fn add_continue(&mut self) {
        self.buf.append_indented("continue;");
    }

    fn add_break(&mut self) {
        self.buf.append_indented("break;");
    }

    fn add_line_comment(&mut self, comment: &str) {
        self.buf.append_indented(format!("/* {comment} */"));
    }

    fn add_if_cond_header(&mut self, cond: &SharedExp) {
        let text = self.exp_text(cond, Prec::None, false);
        self.buf.append_indented(format!("if ({text}) {{"));
        self.buf.indent();
    }

    fn add_if_cond_end(&mut self) {
        self.buf.dedent();
        self.buf.append_indented("}");
    }

    fn add_if_else_cond_header(&mut self, cond: &SharedExp) {
        let text = self.exp_text(cond, Prec::None, false);
        self.buf.append_indented(format!("if ({text}) {{"));
        self.buf.indent();
    }

    fn add_if_else_cond_option(&mut self) {
        self.buf.dedent();
        self.buf.append_indented("}");
        self.buf.append_indented("else {");
        self.buf.indent();
    }

    fn add_if_else_cond_end(&mut self) {
        self.buf.dedent();
        self.buf.append_indented("}");
    }

    fn add_case_cond_header(&mut self, switch_text: &str) {
        self.buf.append_indented(format!("switch({switch_text}) {{"));
        self.buf.indent();
    }

    fn add_case_cond_option(&mut self, value: i64) {
        self.buf.dedent();
        self.buf.append_indented(format!("case {value}:"));
        self.buf.indent();
    }

    fn add_case_cond_option_end(&mut self) {
        self.buf.append_indented("break;");
    }

    fn add_case_cond_else(&mut self) {
        self.buf.dedent();
        self.buf.append_indented("default:");
        self.buf.indent();
    }

    fn add_case_cond_end(&mut self) {
        self.buf.dedent();
        self.buf.append_indented("}");
    }

    fn add_pretested_loop_header(&mut self, cond: &SharedExp) {
        let text = self.exp_text(cond, Prec::None, false);
        self.buf.append_indented(format!("while ({text}) {{"));
        self.buf.indent();
    }

    fn add_pretested_loop_end(&mut self) {
        self.buf.dedent();
        self.buf.append_indented("}");
    }

    fn add_post_tested_loop_header(&mut self) {
        self.buf.append_indented("do {");
        self.buf.indent();
    }

    fn add_post_tested_loop_end(&mut self, cond: &SharedExp) {
        self.buf.dedent();
        let text = self.exp_text(cond, Prec::None, false);
        self.buf.append_indented(format!("}} while ({text});"));
    }

    fn add_endless_loop_header(&mut self) {
        self.buf.append_indented("for(;;) {");
        self.buf.indent();
    }

    fn add_endless_loop_end(&mut self) {
        self.buf.dedent();
        self.buf.append_indented("}");
    }

    fn add_local(&mut self, name: &str, ty: &Type, last: bool) {
        let mut line = String::new();
        append_type_ident(&mut line, ty, name);
        // The mapped expression documents where the local lives
        let mapped = self
            .proc
            .symbols
            .iter()
            .find(|(_, n)| n == name)
            .map(|(e, _)| e.clone());
        match mapped {
            Some(exp) => line.push_str(&format!("; \t\t// {exp}")),
            None => line.push(';'),
        }
        self.buf.indent();
        self.buf.append_indented(line);
        self.buf.dedent();
        if last {
            self.buf.append_line("");
        }
    }

    fn add_proc_start(&mut self) {
        self.buf
            .append_line(format!("/** address: {} */", self.proc.entry));
        let sig = signature_text(self.prog, self.settings, self.proc);
        self.buf.append_line(sig);
        self.buf.append_line("{");
        self.buf.indent();
    }

    fn add_proc_end(&mut self) {
        self.buf.dedent();
        self.buf.append_line("}");
        self.buf.append_line("");
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    fn successor(&self, bb: BlockId, i: usize) -> Option<BlockId> {
        self.proc.cfg.block(bb).and_then(|b| b.successor(i))
    }

    fn block_condition(&self, bb: BlockId) -> Option<SharedExp> {
        self.proc.cfg.block(bb).and_then(|b| b.condition())
    }

    fn switch_info(&self, bb: BlockId) -> Option<SwitchInfo> {
        let block = self.proc.cfg.block(bb)?;
        match &block.last_statement()?.kind {
            StatementKind::Case(c) => c.info.clone(),
            _ => None,
        }
    }

    fn block_dest_text(&self, bb: BlockId) -> String {
        let dest = self.proc.cfg.block(bb).and_then(|b| {
            b.last_statement().and_then(|s| match &s.kind {
                StatementKind::Goto(g) => Some(g.dest.clone()),
                StatementKind::Case(c) => Some(c.dest.clone()),
                _ => None,
            })
        });
        match dest {
            Some(d) => self.exp_text(&d, Prec::None, false),
            None => "<unknown>".to_string(),
        }
    }

    fn is_all_parents_generated(&self, bb: BlockId) -> bool {
        let Some(block) = self.proc.cfg.block(bb) else {
            return true;
        };
        block
            .predecessors()
            .iter()
            .all(|&p| self.analysis.is_back_edge(p, bb) || self.generated.contains(&p))
    }
}

/// Renders the signature line of `proc` (no trailing `;` or `{`).
///
/// The return type comes from the return statement: no returns means
/// `void`, an untyped first return defaults to `int`. Parameters print from
/// a forced or promoted signature, or from the discovered parameters when
/// parameter naming is on; otherwise the list is empty and the body refers
/// to locations directly.
fn signature_text(prog: &Program, settings: &Settings, proc: &UserProc) -> String {
    let mut s = String::new();

    let ret_ty = if proc.signature.forced {
        proc.signature.ret_type.clone()
    } else {
        let sp = Exp::reg(prog.stack_reg);
        match proc.ret_stmt() {
            Some(ret) => {
                let real: Vec<&Assign> = ret
                    .returns
                    .iter()
                    .filter(|a| a.lhs.strip_subscripts() != sp)
                    .collect();
                match real.first() {
                    Some(first) if !first.ty.resolves_to_void() => first.ty.clone(),
                    Some(_) => Type::int(),
                    None => Type::Void,
                }
            }
            None => Type::Void,
        }
    };
    if ret_ty.resolves_to_void() {
        s.push_str("void ");
    } else {
        append_type(&mut s, &ret_ty);
        if !ret_ty.resolves_to_pointer() {
            s.push(' ');
        }
    }

    s.push_str(&proc.name);
    s.push('(');

    let params: Vec<(String, Type)> = if proc.signature.forced || proc.promoted {
        proc.signature
            .params
            .iter()
            .map(|p| (p.name.clone(), p.ty.clone()))
            .collect()
    } else if settings.name_parameters {
        proc.params
            .iter()
            .map(|p| (p.name.clone(), p.ty.clone()))
            .collect()
    } else {
        Vec::new()
    };
    if params.len() > 10 {
        log::warn!("procedure '{}' has {} parameters", proc.name, params.len());
    }
    for (i, (name, ty)) in params.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        let ty = if ty.resolves_to_void() {
            Type::int()
        } else {
            ty.clone()
        };
        append_type_ident(&mut s, &ty, name);
    }
    s.push(')');
    s
}
