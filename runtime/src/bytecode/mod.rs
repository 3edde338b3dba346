mod instruction;
mod opcode;
pub mod disasm;
pub mod format;

pub use instruction::{Decoded, Instruction, Instructions};
pub use opcode::OpCode;
pub use format::{load, read_program, save, write_program, FormatError, FORMAT_VERSION, MAGIC};

use serde::{Deserialize, Serialize};
use crate::vm::Value;

/// One word of the flat code array
pub type Word = u64;

/// Half-open `[begin, end)` range of a block inside the code array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub begin: usize,
    pub end: usize,
}

impl Block {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    /// Number of code words covered by the block
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A resolved program: flat code, constant pool and block table.
///
/// `blocks[0]` is always the entry block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramData {
    pub code: Vec<Word>,
    pub constants: Vec<Value>,
    pub blocks: Vec<Block>,
}

impl ProgramData {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry block, if the block table is not empty
    pub fn entry(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// Decode the code words of a block into instructions
    pub fn instructions(&self, block: &Block) -> Instructions<'_> {
        Instructions::new(&self.code, block.begin, block.end.min(self.code.len()))
    }
}
