//! Per-module output assembly.
//!
//! One `.c` file per module: the root module additionally carries the global
//! declarations and the prototypes of every user procedure (so mutually
//! recursive definitions compile in any order); each module then carries the
//! definitions of its own procedures.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::codegen::generator::CodeGenerator;
use crate::passes::{PassContext, PassId, PassManager};
use crate::program::{ProcStatus, Procedure, Program};
use crate::project::Project;
use crate::Result;

/// Assembles the generated C text per module output path.
#[derive(Default)]
pub struct CodeWriter {
    files: BTreeMap<PathBuf, Vec<String>>,
}

impl CodeWriter {
    /// An empty writer.
    #[must_use]
    pub fn new() -> CodeWriter {
        CodeWriter::default()
    }

    /// Generates code for every decoded user procedure of `program`.
    ///
    /// # Errors
    ///
    /// Propagates emission failures; a procedure without an entry block is
    /// skipped with a diagnostic rather than failing the module.
    pub fn generate(&mut self, program: &mut Program, project: &Project) -> Result<()> {
        let passes = PassManager::new();
        let root_path = program.module_output_path(program.root_module());

        // Globals first, then prototypes, into the root module
        let root = self.files.entry(root_path.clone()).or_default();
        for global in program.globals() {
            root.push(CodeGenerator::global_line(program, global));
        }
        if !program.globals().is_empty() {
            root.push(String::new());
        }

        let mut any_protos = false;
        for id in program.proc_ids().collect::<Vec<_>>() {
            if let Some(Procedure::User(user)) = program.proc(id) {
                if user.status >= ProcStatus::Decoded {
                    let proto = CodeGenerator::prototype(program, &project.settings, user);
                    self.files
                        .entry(root_path.clone())
                        .or_default()
                        .push(proto);
                    any_protos = true;
                }
            }
        }
        if any_protos {
            self.files
                .entry(root_path.clone())
                .or_default()
                .push(String::new());
        }

        // Definitions, each into its module's file
        for id in program.proc_ids().collect::<Vec<_>>() {
            let decoded = program
                .user_proc(id)
                .is_some_and(|p| p.status >= ProcStatus::Decoded);
            if !decoded {
                continue;
            }

            // Locals that survived to the back end but lost every reference
            // would otherwise be declared unused
            if let Some(mut user) = program.detach_proc(id) {
                let result = {
                    let mut ctx = PassContext {
                        proc_id: id,
                        proc: &mut user,
                        prog: program,
                        settings: &project.settings,
                    };
                    passes.execute(PassId::UnusedLocalRemoval, &mut ctx)
                };
                program.attach_proc(id, user);
                result?;
            }

            let user = program.user_proc(id).expect("checked above");
            let name = user.name.clone();
            let module_path = program.module_output_path(user.module);
            let result = CodeGenerator::generate_proc(program, &project.settings, user);
            match result {
                Ok(lines) => {
                    self.files.entry(module_path).or_default().extend(lines);
                    if let Some(user) = program.user_proc_mut(id) {
                        user.status = ProcStatus::CodeGenerated;
                    }
                }
                Err(e) => {
                    log::error!("code generation for '{name}' failed: {e}");
                }
            }
        }

        Ok(())
    }

    /// The generated files as text, keyed by relative output path.
    #[must_use]
    pub fn into_files(self) -> BTreeMap<PathBuf, String> {
        self.files
            .into_iter()
            .map(|(path, lines)| {
                let mut text = lines.join("\n");
                text.push('\n');
                (path, text)
            })
            .collect()
    }
}
