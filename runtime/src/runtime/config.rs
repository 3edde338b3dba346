//! Runtime configuration options

use crate::vm::{VmConfig, DEFAULT_MAX_CALL_DEPTH, DEFAULT_STACK_CAPACITY};

/// Configuration options for the Koala runtime
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub debug_mode: bool,
    pub trace_execution: bool,
    pub stack_capacity: usize,
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            trace_execution: false,
            stack_capacity: DEFAULT_STACK_CAPACITY,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl RuntimeConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable debug mode (program summaries at info level)
    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    /// Enable or disable per-instruction tracing
    pub fn with_trace_execution(mut self, trace_execution: bool) -> Self {
        self.trace_execution = trace_execution;
        self
    }

    /// Set the operand stack capacity
    pub fn with_stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    /// Set the maximum nesting of `CALL`
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// The settings the VM itself consumes
    pub fn vm_config(&self) -> VmConfig {
        VmConfig {
            stack_capacity: self.stack_capacity,
            max_call_depth: self.max_call_depth,
            trace_execution: self.trace_execution,
        }
    }
}

impl From<&RuntimeConfig> for VmConfig {
    fn from(config: &RuntimeConfig) -> Self {
        config.vm_config()
    }
}
