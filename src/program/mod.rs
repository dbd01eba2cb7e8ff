//! The program model: modules, procedures, globals, and the binary image.
//!
//! Ownership is strictly hierarchical: the [`Program`] owns its [`Module`]s
//! and the procedure arena; modules reference their procedures by [`ProcId`];
//! procedures own their CFGs and statements. Expressions are shared values
//! and recursion groups are shared handles; neither implies ownership.

mod proc;
mod signature;

use std::fmt;

use rustc_hash::FxHashMap;

pub use proc::{LibProc, ProcSet, ProcSetRef, ProcStatus, Procedure, UserProc};
pub use signature::{Parameter, Signature};

use crate::ir::{Address, RegId, SharedExp, Type};
use crate::project::BinaryImage;

/// Index of a procedure in the program's arena.
///
/// Statements and modules refer to procedures through this id; the arena
/// never shrinks, so ids stay valid for the life of the program.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcId(pub usize);

impl ProcId {
    /// Returns the raw index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcId({})", self.0)
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A directory-like grouping of procedures, mapped to one output `.c` file.
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name; also the output file stem.
    pub name: String,
    /// Parent module index; `None` for the root.
    pub parent: Option<usize>,
    /// Procedures in this module, in creation order.
    pub procs: Vec<ProcId>,
}

/// A global variable: name, type, and optional initial value.
#[derive(Debug, Clone)]
pub struct Global {
    /// Global name.
    pub name: String,
    /// Declared or inferred type.
    pub ty: Type,
    /// Initial value expression, if known.
    pub init: Option<SharedExp>,
}

/// The decompiled program: modules, procedures, globals, and the image.
pub struct Program {
    /// Program name (the binary's name).
    pub name: String,
    modules: Vec<Module>,
    procs: Vec<Option<Procedure>>,
    globals: Vec<Global>,
    image: Box<dyn BinaryImage>,
    addr_index: FxHashMap<Address, ProcId>,
    /// Pointer/word size of the target, in bytes. Switch-table readers and
    /// pointer-stride rendering depend on it.
    pub word_bytes: u8,
    /// The stack pointer register.
    pub stack_reg: RegId,
    /// Integer return register(s) of the target ABI, first is primary.
    pub return_regs: Vec<RegId>,
}

impl Program {
    /// A fresh program over the given binary image, with one root module.
    ///
    /// Defaults describe a 32-bit target with `r28` as the stack pointer and
    /// `r24` as the integer return register.
    #[must_use]
    pub fn new(name: &str, image: Box<dyn BinaryImage>) -> Program {
        Program {
            name: name.to_string(),
            modules: vec![Module {
                name: name.to_string(),
                parent: None,
                procs: Vec::new(),
            }],
            procs: Vec::new(),
            globals: Vec::new(),
            image,
            addr_index: FxHashMap::default(),
            word_bytes: 4,
            stack_reg: 28,
            return_regs: vec![24],
        }
    }

    /// The binary image.
    #[must_use]
    pub fn image(&self) -> &dyn BinaryImage {
        &*self.image
    }

    /// The root module.
    #[must_use]
    pub fn root_module(&self) -> usize {
        0
    }

    /// All modules.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Creates a child module under `parent`, returning its index.
    pub fn create_module(&mut self, name: &str, parent: usize) -> usize {
        self.modules.push(Module {
            name: name.to_string(),
            parent: Some(parent),
            procs: Vec::new(),
        });
        self.modules.len() - 1
    }

    /// The path of a module relative to the output directory, ending in the
    /// module's `.c` file.
    #[must_use]
    pub fn module_output_path(&self, module: usize) -> std::path::PathBuf {
        let mut parts = Vec::new();
        let mut current = Some(module);
        while let Some(idx) = current {
            parts.push(self.modules[idx].name.clone());
            current = self.modules[idx].parent;
        }
        parts.reverse();
        let mut path = std::path::PathBuf::new();
        for part in &parts[..parts.len() - 1] {
            path.push(part);
        }
        path.push(format!("{}.c", parts.last().expect("at least the module")));
        path
    }

    /// Creates a user procedure in `module`, indexed by entry address.
    pub fn create_user_proc(&mut self, module: usize, name: &str, entry: Address) -> ProcId {
        let id = ProcId(self.procs.len());
        self.procs
            .push(Some(Procedure::User(UserProc::new(name, entry, module))));
        self.modules[module].procs.push(id);
        self.addr_index.insert(entry, id);
        id
    }

    /// Creates a library procedure (not bound to an address or module).
    pub fn create_lib_proc(&mut self, name: &str, signature: Signature) -> ProcId {
        let id = ProcId(self.procs.len());
        self.procs.push(Some(Procedure::Lib(LibProc {
            name: name.to_string(),
            signature,
        })));
        id
    }

    /// Number of procedures (including detached slots).
    #[must_use]
    pub fn proc_count(&self) -> usize {
        self.procs.len()
    }

    /// All procedure ids.
    pub fn proc_ids(&self) -> impl Iterator<Item = ProcId> {
        (0..self.procs.len()).map(ProcId)
    }

    /// The procedure with the given id; `None` while detached for a pass.
    #[must_use]
    pub fn proc(&self, id: ProcId) -> Option<&Procedure> {
        self.procs.get(id.index()).and_then(|p| p.as_ref())
    }

    /// Mutable access to a procedure.
    pub fn proc_mut(&mut self, id: ProcId) -> Option<&mut Procedure> {
        self.procs.get_mut(id.index()).and_then(|p| p.as_mut())
    }

    /// The user procedure with the given id, if it is one.
    #[must_use]
    pub fn user_proc(&self, id: ProcId) -> Option<&UserProc> {
        self.proc(id).and_then(Procedure::as_user)
    }

    /// Mutable access to a user procedure.
    pub fn user_proc_mut(&mut self, id: ProcId) -> Option<&mut UserProc> {
        self.proc_mut(id).and_then(Procedure::as_user_mut)
    }

    /// Takes a user procedure out of the arena for exclusive pass access.
    ///
    /// The pass context then borrows the rest of the program immutably;
    /// [`Program::attach_proc`] puts the procedure back afterwards.
    pub fn detach_proc(&mut self, id: ProcId) -> Option<UserProc> {
        match self.procs.get_mut(id.index())?.take() {
            Some(Procedure::User(p)) => Some(p),
            Some(other) => {
                // Not a user proc; put it straight back
                self.procs[id.index()] = Some(other);
                None
            }
            None => None,
        }
    }

    /// Returns a detached procedure to its slot.
    pub fn attach_proc(&mut self, id: ProcId, proc: UserProc) {
        self.procs[id.index()] = Some(Procedure::User(proc));
    }

    /// The procedure starting at `addr`, if known.
    #[must_use]
    pub fn proc_by_addr(&self, addr: Address) -> Option<ProcId> {
        self.addr_index.get(&addr).copied()
    }

    /// All globals, in creation order.
    #[must_use]
    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    /// Registers a global variable.
    pub fn add_global(&mut self, name: &str, ty: Type, init: Option<SharedExp>) {
        self.globals.push(Global {
            name: name.to_string(),
            ty,
            init,
        });
    }

    /// The type of a global, by name.
    #[must_use]
    pub fn global_type(&self, name: &str) -> Option<&Type> {
        self.globals.iter().find(|g| g.name == name).map(|g| &g.ty)
    }

    /// The name a register prints as. Registers without a symbolic name in
    /// the target description print as `rN`.
    #[must_use]
    pub fn reg_name(&self, reg: RegId) -> String {
        format!("r{reg}")
    }

    /// Dumps a raw data section as globals: `start_<name>` and `<name>_size`
    /// markers plus a byte-array global holding the section contents.
    ///
    /// Bytes the image cannot provide truncate the dump.
    pub fn add_data_section_globals(&mut self, section_name: &str, start: Address, size: u32) {
        use crate::ir::{Exp, Sign};

        self.add_global(
            &format!("start_{section_name}"),
            Type::Integer {
                size: 32,
                sign: Sign::Unsigned,
            },
            Some(Exp::int(start.value() as i64)),
        );
        self.add_global(
            &format!("{section_name}_size"),
            Type::Integer {
                size: 32,
                sign: Sign::Unsigned,
            },
            Some(Exp::int(if size == 0 { -1 } else { i64::from(size) })),
        );

        let mut bytes = Vec::with_capacity(size as usize);
        for i in 0..u64::from(size) {
            match self.image.read_native1(start.offset_by(i)) {
                Some(b) => bytes.push(Exp::int(i64::from(b))),
                None => break,
            }
        }
        let len = bytes.len() as u64;
        self.add_global(
            section_name,
            Type::Array {
                base: Box::new(Type::Integer {
                    size: 8,
                    sign: Sign::Unsigned,
                }),
                length: Some(len),
            },
            Some(Exp::list(bytes)),
        );
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("modules", &self.modules.len())
            .field("procs", &self.procs.len())
            .field("globals", &self.globals.len())
            .finish_non_exhaustive()
    }
}
