use std::path::Path;
use tracing::info;
use crate::bytecode::{self, ProgramData};
use crate::vm::{Value, VM};
use crate::runtime::{RuntimeConfig, RuntimeError, RuntimeResult};

/// The Runtime is the main entry point for loading and running `.kbc` programs
#[derive(Clone, Debug)]
pub struct Runtime {
    config: RuntimeConfig,
}

impl Runtime {
    /// Create a new runtime with default configuration
    pub fn new() -> RuntimeResult<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> RuntimeResult<Self> {
        if config.stack_capacity == 0 {
            return Err(RuntimeError::ConfigError("stack capacity must be at least 1".to_string()));
        }
        if config.max_call_depth == 0 {
            return Err(RuntimeError::ConfigError("max call depth must be at least 1".to_string()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Load a bytecode file and run its entry block
    pub fn execute_file<P: AsRef<Path>>(&self, path: P) -> RuntimeResult<Option<Value>> {
        let program = bytecode::load(path)?;
        self.execute(program)
    }

    /// Run an already loaded program
    pub fn execute(&self, program: ProgramData) -> RuntimeResult<Option<Value>> {
        if self.config.debug_mode {
            info!(
                blocks = program.blocks.len(),
                constants = program.constants.len(),
                code = program.code.len(),
                "executing program"
            );
        }

        let mut vm = VM::with_config(program, self.config.vm_config());
        let result = vm.run()?;

        if self.config.debug_mode {
            info!(result = ?result, "execution completed");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use crate::bytecode::{Block, OpCode};
    use crate::vm::VMError;

    /// Helper function to create a test runtime with default config
    fn create_test_runtime() -> Runtime {
        Runtime::new().expect("Failed to create test runtime")
    }

    /// Helper function to create a simple program: PUSH 42, RET
    fn create_simple_program() -> ProgramData {
        ProgramData {
            code: vec![OpCode::Push.to_word(), 0, OpCode::Ret.to_word()],
            constants: vec![Value::Integer(42)],
            blocks: vec![Block::new(0, 3)],
        }
    }

    /// Helper function to create a temporary bytecode file with valid content
    fn create_valid_bytecode_file() -> NamedTempFile {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        bytecode::save(&create_simple_program(), temp_file.path()).expect("Failed to write bytecode");
        temp_file
    }

    #[test]
    fn test_execute_file_valid_bytecode() {
        let runtime = create_test_runtime();
        let temp_file = create_valid_bytecode_file();

        let result = runtime.execute_file(temp_file.path()).unwrap();
        assert_eq!(result, Some(Value::Integer(42)));
    }

    #[test]
    fn test_execute_file_nonexistent_file() {
        let runtime = create_test_runtime();
        match runtime.execute_file("/this/path/does/not/exist.kbc") {
            Err(RuntimeError::FormatError(_)) => {}
            other => panic!("Expected FormatError, got {:?}", other),
        }
    }

    #[test]
    fn test_execute_file_invalid_bytecode() {
        let runtime = create_test_runtime();
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file.write_all(&[0x00, 0x01, 0x02, 0x03]).unwrap();
        temp_file.flush().unwrap();

        assert!(runtime.execute_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_execute_reports_vm_errors() {
        let runtime = create_test_runtime();
        let program = ProgramData {
            code: vec![OpCode::Pop.to_word()],
            constants: vec![],
            blocks: vec![Block::new(0, 1)],
        };

        match runtime.execute(program) {
            Err(RuntimeError::VMError(VMError::StackUnderflow)) => {}
            other => panic!("Expected StackUnderflow, got {:?}", other),
        }
    }

    #[test]
    fn test_config_limits_reach_vm() {
        let runtime = Runtime::with_config(RuntimeConfig::default().with_stack_capacity(1)).unwrap();
        let program = ProgramData {
            code: vec![OpCode::Push.to_word(), 0, OpCode::Push.to_word(), 0],
            constants: vec![Value::Integer(1)],
            blocks: vec![Block::new(0, 4)],
        };

        match runtime.execute(program) {
            Err(RuntimeError::VMError(VMError::StackOverflow(1))) => {}
            other => panic!("Expected StackOverflow, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Runtime::with_config(RuntimeConfig::default().with_stack_capacity(0));
        assert!(matches!(result, Err(RuntimeError::ConfigError(_))));

        let result = Runtime::with_config(RuntimeConfig::default().with_max_call_depth(0));
        assert!(matches!(result, Err(RuntimeError::ConfigError(_))));
    }

    #[test]
    fn test_execute_file_with_debug_and_trace() {
        let config = RuntimeConfig::default()
            .with_debug_mode(true)
            .with_trace_execution(true);
        let runtime = Runtime::with_config(config).unwrap();
        let temp_file = create_valid_bytecode_file();

        assert_eq!(runtime.execute_file(temp_file.path()).unwrap(), Some(Value::Integer(42)));
    }

    #[test]
    fn test_multiple_file_executions() {
        let runtime = create_test_runtime();
        let temp_file = create_valid_bytecode_file();

        for i in 0..3 {
            let result = runtime.execute_file(temp_file.path());
            assert_eq!(result.unwrap(), Some(Value::Integer(42)), "iteration {}", i);
        }
    }
}
