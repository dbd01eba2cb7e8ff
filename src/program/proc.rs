//! Procedures: decoded user procedures and opaque library procedures.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::analysis::cfg::{BlockId, Cfg, StmtRef};
use crate::ir::{Address, Exp, ReturnStatement, SharedExp, StatementId, StatementKind, Type};
use crate::program::{ProcId, Signature};

/// Analysis progress of a user procedure.
///
/// Transitions are monotonic, with one deliberate exception: the
/// indirect-transfer restart resets a procedure back to `Visited` after
/// clearing and redecoding its CFG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcStatus {
    /// Not yet decoded (or decoding failed).
    Undecoded,
    /// CFG built, no analysis yet.
    Decoded,
    /// Seen by the driver on the way down.
    Visited,
    /// Part of a recursion group pending group analysis.
    InCycle,
    /// Early and middle decompilation done.
    EarlyDone,
    /// Preservation analysis complete.
    Preserveds,
    /// Fully decompiled.
    Final,
    /// C code has been generated.
    CodeGenerated,
}

/// Shared handle to a recursion group.
///
/// The driver's registry owns the canonical map; every member holds the same
/// handle, so group union replaces the handles atomically without implying
/// ownership between procedures.
pub type ProcSet = BTreeSet<ProcId>;
/// Shared, mutable recursion-group handle.
pub type ProcSetRef = Rc<RefCell<ProcSet>>;

/// An opaque library procedure: signature only, never decoded.
#[derive(Debug, Clone)]
pub struct LibProc {
    /// Name, as resolved from the symbol table or signature catalog.
    pub name: String,
    /// Catalog signature.
    pub signature: Signature,
}

/// A decoded user procedure and all of its per-procedure analysis state.
#[derive(Debug, Clone)]
pub struct UserProc {
    /// Procedure name.
    pub name: String,
    /// Entry address.
    pub entry: Address,
    /// Owning module index.
    pub module: usize,
    /// Analysis progress.
    pub status: ProcStatus,
    /// The control flow graph.
    pub cfg: Cfg,
    /// Signature (inferred unless forced).
    pub signature: Signature,
    /// Final parameters, in discovery order.
    pub params: Vec<crate::program::Parameter>,
    /// Local variables: name to type, in a stable order for emission.
    pub locals: BTreeMap<String, Type>,
    /// Symbol map: expression to symbolic name, consulted by the back end.
    pub symbols: Vec<(SharedExp, String)>,
    /// Locations proven preserved across this procedure.
    pub preserved: Vec<SharedExp>,
    /// The recursion group this procedure belongs to, if any.
    pub recursion_group: Option<ProcSetRef>,
    /// Whether the signature has been promoted.
    pub promoted: bool,
    next_stmt_id: u32,
}

impl UserProc {
    /// A fresh, undecoded user procedure.
    #[must_use]
    pub fn new(name: &str, entry: Address, module: usize) -> UserProc {
        UserProc {
            name: name.to_string(),
            entry,
            module,
            status: ProcStatus::Undecoded,
            cfg: Cfg::new(),
            signature: Signature::unknown(name),
            params: Vec::new(),
            locals: BTreeMap::new(),
            symbols: Vec::new(),
            preserved: Vec::new(),
            recursion_group: None,
            promoted: false,
            next_stmt_id: 0,
        }
    }

    /// A fresh statement id, strictly greater than any id handed out so far.
    pub fn new_statement_id(&mut self) -> StatementId {
        self.next_stmt_id += 1;
        StatementId(self.next_stmt_id)
    }

    /// Bumps the id counter past everything currently in the CFG.
    pub fn sync_statement_ids(&mut self) {
        self.next_stmt_id = self.next_stmt_id.max(self.cfg.max_statement_id());
    }

    /// Raw access to the id counter for passes that number in bulk.
    pub fn statement_counter_mut(&mut self) -> &mut u32 {
        &mut self.next_stmt_id
    }

    /// The block holding the return statement, if any.
    #[must_use]
    pub fn ret_block(&self) -> Option<BlockId> {
        self.cfg
            .blocks()
            .find(|b| {
                b.last_statement()
                    .is_some_and(|s| matches!(s.kind, StatementKind::Return(_)))
            })
            .map(|b| b.id)
    }

    /// Locates the return statement.
    #[must_use]
    pub fn ret_stmt_ref(&self) -> Option<StmtRef> {
        let bb = self.ret_block()?;
        let block = self.cfg.block(bb)?;
        let rtl = block.rtls.len().checked_sub(1)?;
        let stmt = block.rtls[rtl].statements.len().checked_sub(1)?;
        Some(StmtRef { block: bb, rtl, stmt })
    }

    /// The return statement, if any.
    #[must_use]
    pub fn ret_stmt(&self) -> Option<&ReturnStatement> {
        let at = self.ret_stmt_ref()?;
        match &self.cfg.statement(at)?.kind {
            StatementKind::Return(r) => Some(r),
            _ => None,
        }
    }

    /// The return statement's id, handed to callers as `callee_return`.
    #[must_use]
    pub fn ret_stmt_id(&self) -> Option<StatementId> {
        let at = self.ret_stmt_ref()?;
        Some(self.cfg.statement(at)?.id)
    }

    /// Mutable access to the return statement.
    pub fn ret_stmt_mut(&mut self) -> Option<&mut ReturnStatement> {
        let at = self.ret_stmt_ref()?;
        match &mut self.cfg.statement_mut(at)?.kind {
            StatementKind::Return(r) => Some(r),
            _ => None,
        }
    }

    /// Drops the return statement (the restart protocol redecodes from
    /// scratch and must not keep a stale return).
    pub fn remove_ret_stmt(&mut self) {
        if let Some(at) = self.ret_stmt_ref() {
            if let Some(block) = self.cfg.block_mut(at.block) {
                block.rtls[at.rtl].statements.remove(at.stmt);
            }
        }
    }

    /// The symbolic name registered for `e`, if any.
    #[must_use]
    pub fn lookup_sym(&self, e: &Exp) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(exp, _)| &**exp == e)
            .map(|(_, name)| name.as_str())
    }

    /// Registers (or re-registers) a symbolic name for `e`.
    pub fn map_symbol(&mut self, e: SharedExp, name: &str) {
        if let Some(slot) = self.symbols.iter_mut().find(|(exp, _)| *exp == e) {
            slot.1 = name.to_string();
        } else {
            self.symbols.push((e, name.to_string()));
        }
    }

    /// Whether `loc` is proven preserved by this procedure.
    #[must_use]
    pub fn is_preserved(&self, loc: &Exp) -> bool {
        self.preserved.iter().any(|p| &**p == loc)
    }

    /// Records `loc` as preserved.
    pub fn set_preserved(&mut self, loc: SharedExp) {
        if !self.is_preserved(&loc) {
            self.preserved.push(loc);
        }
    }
}

/// A procedure: opaque library stub or decoded user procedure.
#[derive(Debug, Clone)]
pub enum Procedure {
    /// Library procedure (signature only).
    Lib(LibProc),
    /// Decoded user procedure.
    User(UserProc),
}

impl Procedure {
    /// The procedure name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Procedure::Lib(p) => &p.name,
            Procedure::User(p) => &p.name,
        }
    }

    /// Whether this is a library procedure.
    #[must_use]
    pub fn is_lib(&self) -> bool {
        matches!(self, Procedure::Lib(_))
    }

    /// Downcast to a user procedure.
    #[must_use]
    pub fn as_user(&self) -> Option<&UserProc> {
        match self {
            Procedure::User(p) => Some(p),
            Procedure::Lib(_) => None,
        }
    }

    /// Mutable downcast to a user procedure.
    pub fn as_user_mut(&mut self) -> Option<&mut UserProc> {
        match self {
            Procedure::User(p) => Some(p),
            Procedure::Lib(_) => None,
        }
    }
}
