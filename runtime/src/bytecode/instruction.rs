use crate::bytecode::{OpCode, Word};

/// A single decoded bytecode instruction with its operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: OpCode,
    pub operand: Option<Word>,
}

impl Instruction {
    pub fn new(offset: usize, opcode: OpCode) -> Self {
        Self {
            offset,
            opcode,
            operand: None,
        }
    }

    pub fn with_operand(mut self, operand: Word) -> Self {
        self.operand = Some(operand);
        self
    }

    /// Number of code words the instruction occupies
    pub fn width(&self) -> usize {
        1 + self.opcode.num_operands()
    }
}

/// Result of decoding one position of the code array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Instruction(Instruction),
    /// A word that is not a known opcode
    Unknown { offset: usize, word: Word },
    /// An opcode whose operand lies past the end of the range
    Truncated { offset: usize, opcode: OpCode },
}

/// Iterator decoding a `[begin, end)` range of code words
pub struct Instructions<'a> {
    code: &'a [Word],
    pos: usize,
    end: usize,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [Word], begin: usize, end: usize) -> Self {
        Self { code, pos: begin, end }
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Decoded;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }

        let offset = self.pos;
        let word = self.code[offset];
        self.pos += 1;

        let Some(opcode) = OpCode::from_word(word) else {
            return Some(Decoded::Unknown { offset, word });
        };

        let mut instruction = Instruction::new(offset, opcode);
        for _ in 0..opcode.num_operands() {
            if self.pos >= self.end {
                return Some(Decoded::Truncated { offset, opcode });
            }
            instruction = instruction.with_operand(self.code[self.pos]);
            self.pos += 1;
        }

        Some(Decoded::Instruction(instruction))
    }
}
