// Koala - Bytecode format and stack-based virtual machine for Koala assembly programs

pub mod bytecode;
pub mod vm;
pub mod runtime;

pub use bytecode::{Block, Instruction, OpCode, ProgramData};
pub use vm::{run, ExecutionContext, Value, VMError, VMResult, VmConfig, VM};
pub use runtime::Runtime;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
