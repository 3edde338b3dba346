use tracing::trace;
use crate::vm::{Value, VMError, VMResult};

/// Default number of values the operand stack can hold
pub const DEFAULT_STACK_CAPACITY: usize = 1024;

/// The operand stack shared by every block invocation of a run.
///
/// Capacity is fixed at construction; pushing past it is a
/// `StackOverflow` instead of growing.
pub struct ExecutionContext {
    stack: Vec<Value>,
    capacity: usize,
    stack_trace_enabled: bool,
}

impl ExecutionContext {
    pub fn new(capacity: usize) -> Self {
        Self {
            stack: Vec::with_capacity(capacity.min(DEFAULT_STACK_CAPACITY)),
            capacity,
            stack_trace_enabled: false,
        }
    }

    /// Enable or disable per-operation stack tracing
    pub fn set_stack_trace(&mut self, enabled: bool) {
        self.stack_trace_enabled = enabled;
    }

    /// Maximum number of values the stack can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of values on the stack
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Values currently on the stack, bottom first
    pub fn values(&self) -> &[Value] {
        &self.stack
    }

    /// Push a value onto the stack
    pub fn push(&mut self, value: Value) -> VMResult<()> {
        if self.stack.len() >= self.capacity {
            return Err(VMError::StackOverflow(self.capacity));
        }
        if self.stack_trace_enabled {
            trace!(%value, depth = self.stack.len() + 1, "push");
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop a value from the stack
    pub fn pop(&mut self) -> VMResult<Value> {
        let value = self.stack.pop().ok_or(VMError::StackUnderflow)?;
        if self.stack_trace_enabled {
            trace!(%value, depth = self.stack.len(), "pop");
        }
        Ok(value)
    }

    /// Pop an integer, failing with a type error naming `op` otherwise
    pub fn pop_integer(&mut self, op: &str) -> VMResult<i32> {
        let value = self.pop()?;
        value.as_integer().ok_or_else(|| {
            VMError::TypeError(format!("{} expects an integer operand, found {}", op, value.type_name()))
        })
    }

    /// Pop `count` values at once
    pub fn pop_n(&mut self, count: usize) -> VMResult<()> {
        if count > self.stack.len() {
            return Err(VMError::PopCountExceedsStack {
                requested: count as i64,
                depth: self.stack.len(),
            });
        }
        let new_len = self.stack.len() - count;
        self.stack.truncate(new_len);
        if self.stack_trace_enabled {
            trace!(count, depth = new_len, "pop_n");
        }
        Ok(())
    }

    /// Peek at the top value on the stack without removing it
    pub fn peek(&self) -> VMResult<&Value> {
        self.stack.last().ok_or(VMError::StackUnderflow)
    }

    /// Mutable access to the top value
    pub fn peek_mut(&mut self) -> VMResult<&mut Value> {
        self.stack.last_mut().ok_or(VMError::StackUnderflow)
    }

    /// Drop every value
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
