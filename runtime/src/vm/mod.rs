mod interpreter;
mod execution_context;
mod value;
mod error;

pub use interpreter::{VmConfig, DEFAULT_MAX_CALL_DEPTH, VM};
pub use execution_context::{ExecutionContext, DEFAULT_STACK_CAPACITY};
pub use value::Value;
pub use error::{VMError, VMResult};

use crate::bytecode::ProgramData;

/// Run a program's entry block with the default configuration
pub fn run(program: ProgramData) -> VMResult<Option<Value>> {
    VM::new(program).run()
}
