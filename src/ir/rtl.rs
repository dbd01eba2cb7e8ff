//! Register transfer lists.
//!
//! An [`Rtl`] is one source address's worth of ordered statements: the
//! semantics of a single machine instruction, or a synthetic list (phi
//! statements get an RTL at their block's start address). A basic block's
//! RTLs are ordered by address.

use std::fmt;

use crate::ir::{Address, Statement};

/// An ordered statement sequence annotated with a single source address.
#[derive(Debug, Clone, PartialEq)]
pub struct Rtl {
    /// The source address these statements were lifted from.
    pub addr: Address,
    /// The statements, in execution order.
    pub statements: Vec<Statement>,
}

impl Rtl {
    /// New RTL at the given address.
    #[must_use]
    pub fn new(addr: Address) -> Rtl {
        Rtl {
            addr,
            statements: Vec::new(),
        }
    }

    /// New RTL at the given address holding the statements.
    #[must_use]
    pub fn with_statements(addr: Address, statements: Vec<Statement>) -> Rtl {
        Rtl { addr, statements }
    }

    /// Whether this RTL holds no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The last statement, which carries the control-flow semantics of the
    /// instruction when there are any.
    #[must_use]
    pub fn last(&self) -> Option<&Statement> {
        self.statements.last()
    }

    /// Mutable access to the last statement.
    pub fn last_mut(&mut self) -> Option<&mut Statement> {
        self.statements.last_mut()
    }
}

impl fmt::Display for Rtl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.addr)?;
        for stmt in &self.statements {
            writeln!(f, "  {stmt}")?;
        }
        Ok(())
    }
}
