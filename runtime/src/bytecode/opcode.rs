use std::fmt;

/// Opcodes for the VM
///
/// Every opcode occupies one code word; `num_operands` more words follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // Control operations
    Ret = 0x00,        // Pop the return value and leave the current block
    Call = 0x01,       // Execute another block (1 operand: block index)

    // Stack manipulation
    Push = 0x02,       // Push constant onto stack (1 operand: constant index)
    Pop = 0x03,        // Pop top value from stack
    PopN = 0x04,       // Pop n values, n taken from the constant pool (1 operand)

    // Control flow
    Jmp = 0x05,        // Jump to code offset (1 operand)
    Jez = 0x06,        // Jump if top of stack is zero (1 operand)
    Jnz = 0x07,        // Jump if top of stack is non-zero (1 operand)

    Dup = 0x08,        // Duplicate top value

    // Arithmetic operations
    Inc = 0x09,        // Increment top value in place
    Dec = 0x0A,        // Decrement top value in place
    Add = 0x0B,        // Add top two values
    Sub = 0x0C,        // Subtract top value from second top value
    Mul = 0x0D,        // Multiply top two values
    Div = 0x0E,        // Divide second top value by top value

    // Logical operations
    And = 0x0F,        // Logical AND
    Or = 0x10,         // Logical OR
    Xor = 0x11,        // 1 when the operands differ
    Not = 0x12,        // Logical NOT
}

const RET: u64 = OpCode::Ret as u64;
const CALL: u64 = OpCode::Call as u64;

const PUSH: u64 = OpCode::Push as u64;
const POP: u64 = OpCode::Pop as u64;
const POP_N: u64 = OpCode::PopN as u64;

const JMP: u64 = OpCode::Jmp as u64;
const JEZ: u64 = OpCode::Jez as u64;
const JNZ: u64 = OpCode::Jnz as u64;

const DUP: u64 = OpCode::Dup as u64;

const INC: u64 = OpCode::Inc as u64;
const DEC: u64 = OpCode::Dec as u64;
const ADD: u64 = OpCode::Add as u64;
const SUB: u64 = OpCode::Sub as u64;
const MUL: u64 = OpCode::Mul as u64;
const DIV: u64 = OpCode::Div as u64;

const AND: u64 = OpCode::And as u64;
const OR: u64 = OpCode::Or as u64;
const XOR: u64 = OpCode::Xor as u64;
const NOT: u64 = OpCode::Not as u64;

impl OpCode {
    /// Number of opcodes the VM dispatches on
    pub const COUNT: usize = 19;

    /// Convert a code word to an opcode
    pub fn from_word(word: u64) -> Option<Self> {
        match word {
            RET => Some(OpCode::Ret),
            CALL => Some(OpCode::Call),

            PUSH => Some(OpCode::Push),
            POP => Some(OpCode::Pop),
            POP_N => Some(OpCode::PopN),

            JMP => Some(OpCode::Jmp),
            JEZ => Some(OpCode::Jez),
            JNZ => Some(OpCode::Jnz),

            DUP => Some(OpCode::Dup),

            INC => Some(OpCode::Inc),
            DEC => Some(OpCode::Dec),
            ADD => Some(OpCode::Add),
            SUB => Some(OpCode::Sub),
            MUL => Some(OpCode::Mul),
            DIV => Some(OpCode::Div),

            AND => Some(OpCode::And),
            OR => Some(OpCode::Or),
            XOR => Some(OpCode::Xor),
            NOT => Some(OpCode::Not),

            _ => None,
        }
    }

    /// Convert an opcode to its code word
    pub fn to_word(&self) -> u64 {
        *self as u64
    }

    /// Get the number of operand words following the opcode
    pub fn num_operands(&self) -> usize {
        match self {
            OpCode::Call |
            OpCode::Push | OpCode::PopN |
            OpCode::Jmp | OpCode::Jez | OpCode::Jnz => 1,

            _ => 0,
        }
    }

    /// Assembly mnemonic for the opcode
    pub fn mnemonic(&self) -> &'static str {
        match self {
            OpCode::Ret => "RET",
            OpCode::Call => "CALL",
            OpCode::Push => "PUSH",
            OpCode::Pop => "POP",
            OpCode::PopN => "POP_N",
            OpCode::Jmp => "JMP",
            OpCode::Jez => "JEZ",
            OpCode::Jnz => "JNZ",
            OpCode::Dup => "DUP",
            OpCode::Inc => "INC",
            OpCode::Dec => "DEC",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Xor => "XOR",
            OpCode::Not => "NOT",
        }
    }
}

impl From<OpCode> for u64 {
    fn from(opcode: OpCode) -> Self {
        opcode.to_word()
    }
}

impl TryFrom<u64> for OpCode {
    type Error = u64;

    fn try_from(word: u64) -> Result<Self, Self::Error> {
        OpCode::from_word(word).ok_or(word)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
