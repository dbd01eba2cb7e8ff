//! Procedure signatures and parameters.

use crate::ir::{SharedExp, Type};

/// A named, typed parameter bound to the location it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name as emitted.
    pub name: String,
    /// Parameter type.
    pub ty: Type,
    /// The location the parameter arrives in (a register or stack slot).
    pub exp: SharedExp,
}

/// Declared or inferred calling interface of a procedure.
///
/// Library procedures carry a forced signature from the signature catalog;
/// user procedures grow one during parameter search and promotion.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Procedure name.
    pub name: String,
    /// Parameters in call order.
    pub params: Vec<Parameter>,
    /// Return type; `Void` for none.
    pub ret_type: Type,
    /// Whether the parameter list is open-ended.
    pub variadic: bool,
    /// Whether this signature is authoritative (from a catalog or debug
    /// info) rather than inferred, and must not be changed by analysis.
    pub forced: bool,
}

impl Signature {
    /// A fresh unknown signature for the given name.
    #[must_use]
    pub fn unknown(name: &str) -> Signature {
        Signature {
            name: name.to_string(),
            params: Vec::new(),
            ret_type: Type::Void,
            variadic: false,
            forced: false,
        }
    }
}
