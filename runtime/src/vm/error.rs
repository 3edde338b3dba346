use thiserror::Error;

/// Error type for VM operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VMError {
    #[error("Stack overflow: capacity of {0} values exceeded")]
    StackOverflow(usize),

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Unknown or unimplemented opcode {0:#x} at offset {1}")]
    UnknownOpcode(u64, usize),

    #[error("Invalid program counter: {0}")]
    InvalidProgramCounter(usize),

    #[error("Invalid constant index: {0}")]
    InvalidConstantIndex(u64),

    #[error("Invalid block index: {0}")]
    InvalidBlockIndex(u64),

    #[error("Invalid block range: [{0}, {1})")]
    InvalidBlockRange(usize, usize),

    #[error("Program has no entry block")]
    NoEntryBlock,

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    #[error("POP_N argument {requested} exceeds stack size {depth}")]
    PopCountExceedsStack { requested: i64, depth: usize },

    #[error("Call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),
}

/// Result type for VM operations
pub type VMResult<T> = Result<T, VMError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_error_display() {
        assert_eq!(VMError::StackUnderflow.to_string(), "Stack underflow");
        assert_eq!(VMError::DivisionByZero.to_string(), "Division by zero");
        assert_eq!(
            VMError::StackOverflow(16).to_string(),
            "Stack overflow: capacity of 16 values exceeded"
        );
        assert_eq!(
            VMError::UnknownOpcode(0x13, 4).to_string(),
            "Unknown or unimplemented opcode 0x13 at offset 4"
        );
        assert_eq!(VMError::InvalidBlockRange(4, 2).to_string(), "Invalid block range: [4, 2)");
        assert_eq!(
            VMError::PopCountExceedsStack { requested: 3, depth: 1 }.to_string(),
            "POP_N argument 3 exceeds stack size 1"
        );
    }

    #[test]
    fn test_vm_error_message_payloads() {
        let error = VMError::TypeError("Cannot add label and integer".to_string());
        assert_eq!(error.to_string(), "Type error: Cannot add label and integer");

        let error = VMError::ArithmeticOverflow("2147483647 + 1".to_string());
        assert!(error.to_string().contains("2147483647 + 1"));
    }

    #[test]
    fn test_vm_result_error() {
        let result: VMResult<i32> = Err(VMError::CallDepthExceeded(8));
        assert_eq!(result, Err(VMError::CallDepthExceeded(8)));
    }
}
