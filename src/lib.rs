// Copyright 2024-2026 The relift contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # relift
//!
//! The core decompilation pipeline of a native-binary decompiler: given a
//! program already parsed into procedures, basic blocks and register-transfer
//! lists, `relift` turns each procedure into a well-typed, structured body
//! and serializes it as readable C.
//!
//! # Architecture
//!
//! The crate is organized into layers that mirror the data flow:
//!
//! - **IR Layer**: the operator-tagged expression tree, the type lattice,
//!   statements, and per-address RTLs
//! - **Analysis Layer**: basic blocks and the CFG, dominators and dominance
//!   frontiers, SSA construction, structural analysis
//! - **Pass Layer**: the registry of named transformation passes the driver
//!   composes into its early/middle/late sequences
//! - **Driver Layer**: the recursive, cycle-aware procedure pipeline with
//!   recursion-group analysis and the indirect-transfer restart protocol
//! - **Back End**: precedence-aware C pretty-printing of the structured CFG
//!
//! ## Key Components
//!
//! - [`Project`] - Entry point: settings, collaborators, decompile + generate
//! - [`Program`] - The program model: modules, procedures, globals
//! - [`ir`] - Expressions ([`ir::Exp`]), types ([`ir::Type`]), statements
//! - [`analysis`] - CFG, dataflow and structuring
//! - [`passes`] - The pass registry ([`passes::PassManager`])
//! - [`decomp`] - The recursive driver ([`decomp::ProcDecompiler`])
//! - [`codegen`] - The C emitter
//! - [`Error`] and [`Result`] - Crate-wide error handling
//!
//! # External collaborators
//!
//! The core never parses file formats or decodes raw bytes. It consumes two
//! capabilities provided by the embedding front end:
//!
//! - [`project::Decoder`] - address to lifted instruction semantics
//! - [`project::BinaryImage`] - byte, section and symbol queries
//!
//! Progress is observable through [`project::DecompileWatcher`] callbacks;
//! they are synchronous and must not re-enter the driver.
//!
//! # Usage
//!
//! ```rust,ignore
//! use relift::prelude::*;
//!
//! let mut program = Program::new("example", Box::new(image));
//! program.create_user_proc(program.root_module(), "main", Address(0x1000));
//!
//! let mut project = Project::new(Box::new(decoder), Settings::default());
//! project.decompile(&mut program)?;
//!
//! // One .c file per module, keyed by relative output path
//! let files = project.generate_code(&mut program)?;
//! # Ok::<(), relift::Error>(())
//! ```
//!
//! The expression layer is usable on its own:
//!
//! ```rust
//! use relift::ir::{simplify, Exp, Operator};
//!
//! let e = Exp::binary(Operator::Plus, Exp::reg(24), Exp::int(0));
//! assert_eq!(simplify(&e), Exp::reg(24));
//! ```
//!
//! # Concurrency
//!
//! The core is single-threaded cooperative: the driver holds an exclusive
//! logical lock on the procedure it is processing (each procedure appears at
//! most once on the call stack), and shared state is limited to the
//! recursion-group registry.

#[macro_use]
mod error;

pub mod analysis;
pub mod codegen;
pub mod decomp;
pub mod ir;
pub mod passes;
pub mod prelude;
pub mod program;
pub mod project;

pub use error::Error;
pub use ir::Address;
pub use program::Program;
pub use project::{Project, Settings};

/// Crate-wide result alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
