//! The project context: settings, collaborators, and progress alerts.
//!
//! A [`Project`] bundles everything that is not the program itself: the
//! read-only [`Settings`], the [`Decoder`] capability, and the registered
//! [`DecompileWatcher`]s. The driver and the back end receive the project
//! explicitly; there is no global state.

mod capabilities;
mod settings;

use std::collections::BTreeMap;
use std::path::PathBuf;

pub use capabilities::{BinaryImage, DecodedInstruction, Decoder, Section};
pub use settings::Settings;

use crate::codegen::CodeWriter;
use crate::decomp::ProcDecompiler;
use crate::program::Program;
use crate::Result;

/// Progress notifications, delivered synchronously.
///
/// Implementations MUST NOT re-enter the driver; they observe, they do not
/// steer. All methods default to no-ops.
pub trait DecompileWatcher {
    /// A procedure has been discovered (about to be visited).
    fn alert_discovered(&self, _proc: &str) {}
    /// A procedure's decompilation has started.
    fn alert_decompiling(&self, _proc: &str) {}
    /// A procedure's decompilation has finished.
    fn alert_end_decompile(&self, _proc: &str) {}
    /// A named point in the pipeline was reached for a procedure.
    fn alert_decompile_debug_point(&self, _proc: &str, _description: &str) {}
}

/// The explicit context threaded through the pipeline.
pub struct Project {
    /// Read-only configuration.
    pub settings: Settings,
    decoder: Box<dyn Decoder>,
    watchers: Vec<Box<dyn DecompileWatcher>>,
}

impl Project {
    /// A project over the given decoder with the given settings.
    #[must_use]
    pub fn new(decoder: Box<dyn Decoder>, settings: Settings) -> Project {
        Project {
            settings,
            decoder,
            watchers: Vec::new(),
        }
    }

    /// Registers a progress watcher.
    pub fn add_watcher(&mut self, watcher: Box<dyn DecompileWatcher>) {
        self.watchers.push(watcher);
    }

    /// The decoder capability.
    pub fn decoder_mut(&mut self) -> &mut dyn Decoder {
        &mut *self.decoder
    }

    pub(crate) fn alert_discovered(&self, proc: &str) {
        for w in &self.watchers {
            w.alert_discovered(proc);
        }
    }

    pub(crate) fn alert_decompiling(&self, proc: &str) {
        for w in &self.watchers {
            w.alert_decompiling(proc);
        }
    }

    pub(crate) fn alert_end_decompile(&self, proc: &str) {
        for w in &self.watchers {
            w.alert_end_decompile(proc);
        }
    }

    pub(crate) fn alert_decompile_debug_point(&self, proc: &str, description: &str) {
        for w in &self.watchers {
            w.alert_decompile_debug_point(proc, description);
        }
    }

    /// Decompiles every user procedure of `program` to `Final` status.
    ///
    /// Individual procedure failures are logged and skipped; the pipeline
    /// never aborts the whole program for one procedure.
    ///
    /// # Errors
    ///
    /// Only fatal, program-wide failures are returned.
    pub fn decompile(&mut self, program: &mut Program) -> Result<()> {
        let mut driver = ProcDecompiler::new();
        let mut attempted: Vec<crate::program::ProcId> = Vec::new();
        // Decoding can discover new procedures; keep going until the list
        // is stable
        loop {
            let pending: Vec<_> = program
                .proc_ids()
                .filter(|&id| {
                    !attempted.contains(&id)
                        && program
                            .user_proc(id)
                            .is_some_and(|p| p.status < crate::program::ProcStatus::Final)
                })
                .collect();
            if pending.is_empty() {
                break;
            }
            for id in pending {
                attempted.push(id);
                let needs_work = program
                    .user_proc(id)
                    .is_some_and(|p| p.status < crate::program::ProcStatus::Final);
                if needs_work {
                    driver.decompile(program, self, id);
                }
            }
        }
        Ok(())
    }

    /// Generates C source for every module, returning the text keyed by the
    /// module's relative output path.
    ///
    /// # Errors
    ///
    /// Returns structural or emission failures.
    pub fn generate_code(&mut self, program: &mut Program) -> Result<BTreeMap<PathBuf, String>> {
        let mut writer = CodeWriter::new();
        writer.generate(program, self)?;
        Ok(writer.into_files())
    }

    /// Generates C source and writes one `.c` file per module under
    /// `settings.output_directory`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors to the caller, alongside emission failures.
    pub fn write_output(&mut self, program: &mut Program) -> Result<()> {
        let files = self.generate_code(program)?;
        for (rel_path, text) in files {
            let path = self.settings.output_directory.join(rel_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text)?;
        }
        Ok(())
    }
}
