//! Convenient re-exports of the most commonly used types.
//!
//! ```rust,ignore
//! use relift::prelude::*;
//! ```

pub use crate::analysis::cfg::{BasicBlock, BlockId, BlockType, Cfg};
pub use crate::ir::{
    Address, Exp, ExpRewrite, Operator, Rtl, SharedExp, Statement, StatementId, StatementKind,
    Type,
};
pub use crate::program::{ProcId, ProcStatus, Procedure, Program, Signature, UserProc};
pub use crate::project::{
    BinaryImage, DecodedInstruction, Decoder, DecompileWatcher, Project, Section, Settings,
};
pub use crate::{Error, Result};
