//! The output line buffer.
//!
//! A [`CodeBuffer`] accumulates generated lines with an indent level and
//! tracks which block labels were actually referenced by an emitted goto;
//! unreferenced labels are pruned in a final pass over the text.

use rustc_hash::FxHashSet;

/// Indented line accumulation plus label bookkeeping.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    lines: Vec<String>,
    indent: usize,
    used_labels: FxHashSet<u64>,
}

impl CodeBuffer {
    /// A fresh, empty buffer.
    #[must_use]
    pub fn new() -> CodeBuffer {
        CodeBuffer::default()
    }

    /// Appends a raw line (no indentation applied).
    pub fn append_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Appends a line at the current indent level.
    pub fn append_indented(&mut self, line: impl AsRef<str>) {
        let mut text = String::with_capacity(4 * self.indent + line.as_ref().len());
        for _ in 0..self.indent {
            text.push_str("    ");
        }
        text.push_str(line.as_ref());
        self.lines.push(text);
    }

    /// Increases the indent level.
    pub fn indent(&mut self) {
        self.indent += 1;
    }

    /// Decreases the indent level.
    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Records that a goto referenced the label at `addr`.
    pub fn use_label(&mut self, addr: u64) {
        self.used_labels.insert(addr);
    }

    /// Removes label lines no emitted goto references.
    pub fn remove_unused_labels(&mut self) {
        let used = std::mem::take(&mut self.used_labels);
        self.lines.retain(|line| {
            let Some(rest) = line.strip_prefix("bb0x") else {
                return true;
            };
            let Some(colon) = rest.find(':') else {
                return true;
            };
            match u64::from_str_radix(&rest[..colon], 16) {
                Ok(addr) => used.contains(&addr),
                Err(_) => true,
            }
        });
        self.used_labels = used;
    }

    /// The accumulated lines.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Consumes the buffer into its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indentation() {
        let mut buf = CodeBuffer::new();
        buf.append_indented("a;");
        buf.indent();
        buf.append_indented("b;");
        buf.dedent();
        buf.append_indented("c;");
        assert_eq!(buf.lines(), ["a;", "    b;", "c;"]);
    }

    #[test]
    fn test_unused_label_pruning() {
        let mut buf = CodeBuffer::new();
        buf.append_line("bb0x1000:");
        buf.append_indented("x = 1;");
        buf.append_line("bb0x1010:");
        buf.append_indented("goto bb0x1010;");
        buf.use_label(0x1010);
        buf.remove_unused_labels();
        assert_eq!(buf.lines(), ["x = 1;", "bb0x1010:", "    goto bb0x1010;"]);
    }
}
