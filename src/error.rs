use thiserror::Error;

use crate::program::ProcId;

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Invariant {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Invariant {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure modes of the decompilation pipeline: decoding a procedure,
/// running analysis passes, recovering indirect transfers, structuring the CFG, and writing
/// the generated C source.
///
/// # Error Categories
///
/// ## Decoding Errors
/// - [`Error::Undecodable`] - An instruction could not be decoded at a given address
/// - [`Error::Undecoded`] - A procedure could not be decoded at all
///
/// ## Analysis Errors
/// - [`Error::Invariant`] - A pass detected a violated IR invariant (fatal for the procedure)
/// - [`Error::Analysis`] - General dataflow/structuring failure
/// - [`Error::Type`] - Type lattice operation failure
///
/// ## Output Errors
/// - [`Error::Codegen`] - Code generation failure
/// - [`Error::FileError`] - Filesystem I/O errors while writing output
#[derive(Error, Debug)]
pub enum Error {
    /// An instruction at the given address could not be decoded.
    ///
    /// The containing basic block is marked invalid; the procedure stays
    /// undecoded only if no blocks could be built at all.
    #[error("Undecodable instruction at {0:#x}")]
    Undecodable(u64),

    /// A procedure could not be decoded.
    ///
    /// The associated [`ProcId`] identifies the procedure. The pipeline skips
    /// the procedure and continues with the next one.
    #[error("Procedure {0} could not be decoded")]
    Undecoded(ProcId),

    /// A pass detected a violated IR invariant.
    ///
    /// This is fatal for the current procedure: the pipeline aborts it, marks
    /// it undecoded, and continues with the next procedure. The error includes
    /// the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Invariant violation - {file}:{line}: {message}")]
    Invariant {
        /// The message to be printed for the invariant violation
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// General dataflow or structuring failure.
    ///
    /// Covers dominator computation on malformed graphs, SSA rename
    /// inconsistencies, and structural analysis on unstabilized CFGs.
    #[error("{0}")]
    Analysis(String),

    /// Type lattice operation failure.
    ///
    /// Raised when a type query is performed on a type that cannot answer it,
    /// e.g. taking the pointee of a non-pointer.
    #[error("{0}")]
    Type(String),

    /// Code generation failure.
    ///
    /// Structural analysis produced annotations the emitter cannot honor,
    /// or a statement kind reached the back end that should have been
    /// removed by earlier passes.
    #[error("{0}")]
    Codegen(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that occur while writing the generated
    /// `.c` files. These are propagated to the caller unchanged.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
