//! External collaborator capabilities.
//!
//! The core never touches raw bytes or file formats itself: instruction
//! semantics come from a [`Decoder`] and byte/section/symbol queries go to a
//! [`BinaryImage`]. Both are synchronous; neither may re-enter the driver.

use crate::ir::{Address, Rtl};
use crate::program::Signature;
use crate::Result;

/// One decoded instruction: its lifted semantics and its extent.
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    /// The lifted statements.
    pub rtl: Rtl,
    /// Instruction length in bytes.
    pub size: u32,
    /// Whether the bytes decoded to a valid instruction.
    pub valid: bool,
}

/// Address-to-semantics capability, provided by the front end.
pub trait Decoder {
    /// Decodes the instruction at `addr` into an RTL.
    ///
    /// # Errors
    ///
    /// Returns an error when the address is outside the image. An in-image
    /// undecodable instruction is reported via `valid == false` instead.
    fn decode_instruction(&mut self, addr: Address) -> Result<DecodedInstruction>;

    /// Saves a recovered high-level indirect-transfer RTL, keyed by address.
    ///
    /// Called before an indirect-transfer restart; duplicate addresses are
    /// ignored. Subsequent decodes of `addr` must yield the saved RTL so the
    /// recovery survives the redecode.
    fn save_decoded_rtl(&mut self, addr: Address, rtl: Rtl);

    /// The catalog signature for a library procedure, if known.
    fn lib_signature(&self, name: &str) -> Option<Signature>;

    /// Whether the binary is a Win32 image (changes some recovery idioms).
    fn is_win32(&self) -> bool {
        false
    }
}

/// A section of the binary image.
#[derive(Debug, Clone, Copy)]
pub struct Section {
    /// Section base address.
    pub base: Address,
    /// Section size in bytes.
    pub size: u64,
    /// Whether the section is readable.
    pub readable: bool,
    /// Whether the section is writable. Constant propagation only folds
    /// loads from read-only sections.
    pub writable: bool,
}

/// Byte-level view of the loaded binary.
pub trait BinaryImage {
    /// Reads one byte, if mapped.
    fn read_native1(&self, addr: Address) -> Option<u8>;

    /// Reads a 32-bit little-endian word, if mapped.
    fn read_native4(&self, addr: Address) -> Option<u32>;

    /// Reads a word of the target's pointer size.
    fn read_native_word(&self, addr: Address, word_bytes: u8) -> Option<u64> {
        match word_bytes {
            4 => self.read_native4(addr).map(u64::from),
            8 => {
                let lo = self.read_native4(addr)?;
                let hi = self.read_native4(addr.offset_by(4))?;
                Some(u64::from(lo) | (u64::from(hi) << 32))
            }
            _ => None,
        }
    }

    /// The section containing `addr`, if any.
    fn section_by_addr(&self, addr: Address) -> Option<Section>;

    /// The program's entry points.
    fn entry_points(&self) -> Vec<Address>;

    /// The symbol bound to `addr`, if any.
    fn symbol_at(&self, addr: Address) -> Option<String>;
}
