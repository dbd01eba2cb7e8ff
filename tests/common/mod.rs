//! Shared mocks for the end-to-end pipeline tests: an in-memory decoder
//! keyed by address and a byte-table binary image.

#![allow(dead_code)]

use std::collections::HashMap;

use relift::ir::Rtl;
use relift::prelude::*;

/// A decoder over a fixed address-to-statements table. Every instruction is
/// 4 bytes. Saved high-level RTLs replay on redecode, duplicates ignored.
pub struct MockDecoder {
    insns: HashMap<u64, Vec<StatementKind>>,
    saved: HashMap<u64, Rtl>,
    libs: HashMap<String, Signature>,
}

impl MockDecoder {
    pub fn new() -> MockDecoder {
        MockDecoder {
            insns: HashMap::new(),
            saved: HashMap::new(),
            libs: HashMap::new(),
        }
    }

    /// Registers the statements of the 4-byte instruction at `addr`.
    pub fn insn(&mut self, addr: u64, stmts: Vec<StatementKind>) -> &mut Self {
        self.insns.insert(addr, stmts);
        self
    }

    /// Registers a library signature.
    pub fn lib(&mut self, name: &str, signature: Signature) -> &mut Self {
        self.libs.insert(name.to_string(), signature);
        self
    }
}

impl Decoder for MockDecoder {
    fn decode_instruction(&mut self, addr: Address) -> Result<DecodedInstruction> {
        if let Some(rtl) = self.saved.get(&addr.value()) {
            return Ok(DecodedInstruction {
                rtl: rtl.clone(),
                size: 4,
                valid: true,
            });
        }
        match self.insns.get(&addr.value()) {
            Some(stmts) => {
                let statements = stmts
                    .iter()
                    .cloned()
                    .map(|kind| Statement::new(StatementId(0), kind))
                    .collect();
                Ok(DecodedInstruction {
                    rtl: Rtl::with_statements(addr, statements),
                    size: 4,
                    valid: true,
                })
            }
            None => Ok(DecodedInstruction {
                rtl: Rtl::new(addr),
                size: 4,
                valid: false,
            }),
        }
    }

    fn save_decoded_rtl(&mut self, addr: Address, rtl: Rtl) {
        self.saved.entry(addr.value()).or_insert(rtl);
    }

    fn lib_signature(&self, name: &str) -> Option<Signature> {
        self.libs.get(name).cloned()
    }
}

/// A binary image over explicit sections and little-endian words.
pub struct MockImage {
    sections: Vec<Section>,
    bytes: HashMap<u64, u8>,
    symbols: HashMap<u64, String>,
}

impl MockImage {
    /// An image with one executable section covering `0x1000..0x2000` and a
    /// read-only data section covering `0x2000..0x3000`.
    pub fn new() -> MockImage {
        MockImage {
            sections: vec![
                Section {
                    base: Address(0x1000),
                    size: 0x1000,
                    readable: true,
                    writable: false,
                },
                Section {
                    base: Address(0x2000),
                    size: 0x1000,
                    readable: true,
                    writable: false,
                },
            ],
            bytes: HashMap::new(),
            symbols: HashMap::new(),
        }
    }

    /// Stores a little-endian 32-bit word at `addr`.
    pub fn word(&mut self, addr: u64, value: u32) -> &mut Self {
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.bytes.insert(addr + i as u64, *b);
        }
        self
    }

    /// Binds a symbol name to `addr`.
    pub fn symbol(&mut self, addr: u64, name: &str) -> &mut Self {
        self.symbols.insert(addr, name.to_string());
        self
    }
}

impl BinaryImage for MockImage {
    fn read_native1(&self, addr: Address) -> Option<u8> {
        self.bytes.get(&addr.value()).copied()
    }

    fn read_native4(&self, addr: Address) -> Option<u32> {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.bytes.get(&(addr.value() + i as u64)).copied()?;
        }
        Some(u32::from_le_bytes(bytes))
    }

    fn section_by_addr(&self, addr: Address) -> Option<Section> {
        self.sections
            .iter()
            .find(|s| addr.value() >= s.base.value() && addr.value() < s.base.value() + s.size)
            .copied()
    }

    fn entry_points(&self) -> Vec<Address> {
        vec![Address(0x1000)]
    }

    fn symbol_at(&self, addr: Address) -> Option<String> {
        self.symbols.get(&addr.value()).cloned()
    }
}

/// Runs the full pipeline over the mocks and returns the generated root
/// module text plus the program for post-hoc assertions.
pub fn decompile_to_c(
    decoder: MockDecoder,
    image: MockImage,
    procs: &[(&str, u64)],
) -> (String, Program) {
    let mut program = Program::new("test", Box::new(image));
    for (name, entry) in procs {
        program.create_user_proc(program.root_module(), name, Address(*entry));
    }
    let mut project = Project::new(Box::new(decoder), Settings::default());
    project.decompile(&mut program).expect("decompile");
    let files = project.generate_code(&mut program).expect("generate");
    let text = files
        .into_iter()
        .map(|(_, t)| t)
        .next()
        .unwrap_or_default();
    (text, program)
}
