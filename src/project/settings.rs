//! Decompilation settings.

use std::path::PathBuf;

/// Read-only configuration of the pipeline and the back end.
///
/// Constructed once by the embedding tool and passed into the
/// [`Project`](crate::project::Project); nothing in the core mutates it.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Log every procedure's RTLs before code generation.
    pub print_rtls: bool,
    /// Prune labels that no emitted goto references.
    pub remove_labels: bool,
    /// Verbose progress output (call stacks, pass-by-pass prints).
    pub verbose_output: bool,
    /// Recurse into callees before decompiling the caller.
    pub decode_children: bool,
    /// Promote signatures to known calling conventions.
    pub use_promotion: bool,
    /// Let analysis adjust signatures (the update-returns loop).
    pub change_signatures: bool,
    /// Give parameters symbolic names instead of location names.
    pub name_parameters: bool,
    /// Log each basic block as it is emitted.
    pub debug_gen: bool,
    /// Log recovered switch tables.
    pub debug_switch: bool,
    /// Directory the generated `.c` files are written to.
    pub output_directory: PathBuf,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            print_rtls: false,
            remove_labels: true,
            verbose_output: false,
            decode_children: true,
            use_promotion: false,
            change_signatures: false,
            name_parameters: false,
            debug_gen: false,
            debug_switch: false,
            output_directory: PathBuf::from("output"),
        }
    }
}
