//! Two-pass translation of flat blocks into a resolved `ProgramData`.
//!
//! Pass 1 (`layout`) assigns code offsets to every block and local mark and
//! builds the block table. Pass 2 (`emit`) walks the blocks in source order
//! and writes code words, resolving jumps, calls and constants against the
//! layout. Forward references need no backpatching.

use crate::lexer::Mnemonic;
use crate::parser::{FlatBlock, Instruction};
use koala_vm::bytecode::{Block, ProgramData, Word};
use koala_vm::{OpCode, Value};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("No entry point found: no block is labelled '{0}'")]
    NoEntryPoint(String),

    #[error("Label '{name}' doesn't exist in current context ({block}::{name}) at line {line}")]
    UndefinedLocalLabel { block: String, name: String, line: usize },

    #[error("Block '{name}' doesn't exist (called at line {line})")]
    UndefinedBlock { name: String, line: usize },

    #[error("Instruction '{instruction}' in block '{block}' cannot be assembled (line {line})")]
    InvalidInstruction { block: String, instruction: String, line: usize },
}

/// Result of pass 1
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layout {
    /// Code range of every block, in source order
    pub ranges: Vec<Block>,
    /// The block table as stored in bytecode: entry block first, the rest in source order
    pub table: Vec<Block>,
    /// Table slot of every block, in source order
    pub slots: Vec<usize>,
    /// Block label to table slot; the first block with a label owns it
    pub labels: FxHashMap<String, usize>,
    /// (source block index, mark name) to code offset
    pub marks: FxHashMap<(usize, String), usize>,
    /// Total number of code words pass 2 will emit
    pub code_len: usize,
}

impl Layout {
    /// Offset of mark `name` local to the block at source index `block`
    pub fn mark(&self, block: usize, name: &str) -> Option<usize> {
        self.marks.get(&(block, name.to_string())).copied()
    }

    /// Table slot of the block labelled `label`
    pub fn slot(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }
}

/// The opcode an instruction assembles to, `None` for `MARK`
fn opcode_of(block: &FlatBlock, instruction: &Instruction) -> Result<Option<OpCode>, TranslateError> {
    if instruction.mnemonic == Mnemonic::Mark {
        return Ok(None);
    }

    let opcode = instruction.mnemonic.opcode();
    let operand_ok = match (opcode.map(|op| op.num_operands()), &instruction.operand) {
        (Some(0), None) => true,
        (Some(1), Some(Value::Integer(_))) => matches!(instruction.mnemonic, Mnemonic::Push | Mnemonic::PopN),
        (Some(1), Some(Value::Label(_))) => !matches!(instruction.mnemonic, Mnemonic::Push | Mnemonic::PopN),
        _ => false,
    };

    match opcode {
        Some(op) if operand_ok => Ok(Some(op)),
        _ => Err(TranslateError::InvalidInstruction {
            block: block.label.clone(),
            instruction: instruction.to_string(),
            line: instruction.line,
        }),
    }
}

/// Pass 1: compute block ranges, the block table and every label
pub fn layout(blocks: &[FlatBlock], entry: &str) -> Result<Layout, TranslateError> {
    let mut layout = Layout::default();
    let mut offset = 0;

    for (index, block) in blocks.iter().enumerate() {
        let begin = offset;

        for instruction in &block.instructions {
            match opcode_of(block, instruction)? {
                Some(opcode) => offset += 1 + opcode.num_operands(),
                // MARK is zero-width: it names the offset of the next instruction.
                // Marking a name again in the same block moves it.
                None => {
                    let name = instruction.label().unwrap_or_default().to_string();
                    layout.marks.insert((index, name), offset);
                }
            }
        }

        layout.ranges.push(Block::new(begin, offset));
    }
    layout.code_len = offset;

    let entry_index = blocks
        .iter()
        .position(|b| b.label == entry)
        .ok_or_else(|| TranslateError::NoEntryPoint(entry.to_string()))?;

    // Entry goes to slot 0, everything else keeps its relative order
    let order = std::iter::once(entry_index).chain((0..blocks.len()).filter(|&i| i != entry_index));
    layout.slots = vec![0; blocks.len()];
    for (slot, index) in order.enumerate() {
        layout.slots[index] = slot;
        layout.table.push(layout.ranges[index]);
    }

    for (index, block) in blocks.iter().enumerate() {
        layout.labels.entry(block.label.clone()).or_insert(layout.slots[index]);
    }

    debug!(
        entry,
        blocks = blocks.len(),
        code_len = layout.code_len,
        table = ?layout.table,
        "computed block layout"
    );
    Ok(layout)
}

/// Code and constant pool under construction during pass 2
struct Emitter {
    code: Vec<Word>,
    constants: Vec<Value>,
    constant_index: FxHashMap<i32, Word>,
}

impl Emitter {
    fn new(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
            constants: Vec::new(),
            constant_index: FxHashMap::default(),
        }
    }

    fn emit(&mut self, word: Word) {
        self.code.push(word);
    }

    /// Pool index of `value`, appending it on first use
    fn intern(&mut self, value: i32) -> Word {
        let constants = &mut self.constants;
        *self.constant_index.entry(value).or_insert_with(|| {
            constants.push(Value::Integer(value));
            (constants.len() - 1) as Word
        })
    }
}

/// Pass 2: emit code words in source order against a computed layout
pub fn emit(blocks: &[FlatBlock], layout: &Layout) -> Result<ProgramData, TranslateError> {
    let mut emitter = Emitter::new(layout.code_len);

    for (index, block) in blocks.iter().enumerate() {
        for instruction in &block.instructions {
            let Some(opcode) = opcode_of(block, instruction)? else {
                continue;
            };
            emitter.emit(opcode.to_word());

            match (opcode, &instruction.operand) {
                (OpCode::Jmp | OpCode::Jez | OpCode::Jnz, Some(Value::Label(name))) => {
                    let target = layout.mark(index, name).ok_or_else(|| TranslateError::UndefinedLocalLabel {
                        block: block.label.clone(),
                        name: name.clone(),
                        line: instruction.line,
                    })?;
                    emitter.emit(target as Word);
                }
                (OpCode::Call, Some(Value::Label(name))) => {
                    let slot = layout.slot(name).ok_or_else(|| TranslateError::UndefinedBlock {
                        name: name.clone(),
                        line: instruction.line,
                    })?;
                    emitter.emit(slot as Word);
                }
                (_, Some(Value::Integer(value))) => {
                    let index = emitter.intern(*value);
                    emitter.emit(index);
                }
                _ => {}
            }
        }
    }

    debug!(
        code = emitter.code.len(),
        constants = emitter.constants.len(),
        "emitted bytecode"
    );

    Ok(ProgramData {
        code: emitter.code,
        constants: emitter.constants,
        blocks: layout.table.clone(),
    })
}

/// Run both passes
pub fn translate(blocks: &[FlatBlock], entry: &str) -> Result<ProgramData, TranslateError> {
    let layout = layout(blocks, entry)?;
    emit(blocks, &layout)
}
