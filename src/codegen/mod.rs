//! The C back end: precedence-aware printing of structured procedures.

mod buffer;
mod ctype;
mod exp;
mod generator;
mod writer;

pub use buffer::CodeBuffer;
pub use exp::{ExpPrinter, Prec};
pub use generator::CodeGenerator;
pub use writer::CodeWriter;
pub use ctype::{append_type, append_type_ident};
