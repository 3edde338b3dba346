//! Human-readable listing of a loaded program.

use std::fmt::Write;
use crate::bytecode::{Decoded, Instruction, OpCode, ProgramData};

/// Render the constant pool followed by every block's instructions
pub fn disassemble(program: &ProgramData) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "constants ({}):", program.constants.len());
    for (index, constant) in program.constants.iter().enumerate() {
        let _ = writeln!(out, "  [{}] {}", index, constant);
    }

    for (index, block) in program.blocks.iter().enumerate() {
        let entry = if index == 0 { " (entry)" } else { "" };
        let _ = writeln!(out);
        let _ = writeln!(out, "block[{}]{} [{}, {}):", index, entry, block.begin, block.end);

        for decoded in program.instructions(block) {
            match decoded {
                Decoded::Instruction(instruction) => {
                    let _ = writeln!(out, "  {:04}  {}", instruction.offset, render(program, &instruction));
                }
                Decoded::Unknown { offset, word } => {
                    let _ = writeln!(out, "  {:04}  .word {:#x}", offset, word);
                }
                Decoded::Truncated { offset, opcode } => {
                    let _ = writeln!(out, "  {:04}  {} <missing operand>", offset, opcode);
                }
            }
        }
    }

    out
}

fn render(program: &ProgramData, instruction: &Instruction) -> String {
    let Some(operand) = instruction.operand else {
        return instruction.opcode.mnemonic().to_string();
    };

    let note = match instruction.opcode {
        OpCode::Push | OpCode::PopN => usize::try_from(operand)
            .ok()
            .and_then(|i| program.constants.get(i))
            .map(|value| format!("  ; {}", value)),
        OpCode::Call => usize::try_from(operand)
            .ok()
            .and_then(|i| program.blocks.get(i))
            .map(|block| format!("  ; [{}, {})", block.begin, block.end)),
        _ => None,
    };

    format!("{} {}{}", instruction.opcode, operand, note.unwrap_or_default())
}
