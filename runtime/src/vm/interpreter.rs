use tracing::{debug, trace};
use crate::bytecode::{Block, OpCode, ProgramData, Word};
use crate::vm::execution_context::DEFAULT_STACK_CAPACITY;
use crate::vm::{ExecutionContext, Value, VMError, VMResult};

/// Default limit on nested `CALL`s
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Limits and diagnostics for one VM instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    pub stack_capacity: usize,
    /// Maximum number of live call frames, the entry block included
    pub max_call_depth: usize,
    pub trace_execution: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            trace_execution: false,
        }
    }
}

/// What the dispatch loop does after a handler ran
enum Step {
    Continue,
    Call(Block),
    Return(Value),
}

/// One activation of a block on the call stack
#[derive(Clone, Copy, Debug)]
struct Frame {
    ip: usize,
    block: Block,
}

impl Frame {
    fn new(block: Block) -> Self {
        Self { ip: block.begin, block }
    }
}

/// The Virtual Machine that executes a resolved program
pub struct VM {
    program: ProgramData,
    context: ExecutionContext,
    config: VmConfig,
}

impl VM {
    pub fn new(program: ProgramData) -> Self {
        Self::with_config(program, VmConfig::default())
    }

    pub fn with_config(program: ProgramData, config: VmConfig) -> Self {
        let mut context = ExecutionContext::new(config.stack_capacity);
        context.set_stack_trace(config.trace_execution);
        Self {
            program,
            context,
            config,
        }
    }

    /// The loaded program
    pub fn program(&self) -> &ProgramData {
        &self.program
    }

    /// Operand stack contents, bottom first
    pub fn stack(&self) -> &[Value] {
        self.context.values()
    }

    /// Run the entry block (`blocks[0]`) on a fresh stack
    pub fn run(&mut self) -> VMResult<Option<Value>> {
        let entry = *self.program.entry().ok_or(VMError::NoEntryBlock)?;
        self.context.clear();

        debug!(begin = entry.begin, end = entry.end, "running entry block");
        let result = self.execute(entry.begin, entry.end)?;
        debug!(result = ?result, stack_depth = self.context.depth(), "run finished");
        Ok(result)
    }

    /// Execute the code range `[begin, end)`, returning the value of `RET` if one ran
    pub fn execute(&mut self, begin: usize, end: usize) -> VMResult<Option<Value>> {
        let block = self.checked_block(begin, end)?;
        if self.config.max_call_depth == 0 {
            return Err(VMError::CallDepthExceeded(0));
        }
        self.execute_frames(block)
    }

    /// Each `CALL` pushes a frame; the number of live frames is capped by `max_call_depth`
    fn execute_frames(&mut self, entry: Block) -> VMResult<Option<Value>> {
        let mut frames = vec![Frame::new(entry)];

        loop {
            let depth = frames.len();
            let Some(frame) = frames.last_mut() else {
                return Ok(None);
            };

            // Running off the end of a block returns nothing to the caller
            if frame.ip >= frame.block.end {
                frames.pop();
                continue;
            }

            let offset = frame.ip;
            let word = self.program.code[offset];
            frame.ip += 1;

            let opcode = OpCode::from_word(word).ok_or(VMError::UnknownOpcode(word, offset))?;

            if self.config.trace_execution {
                trace!(
                    offset,
                    op = %opcode,
                    depth,
                    stack = ?self.context.values(),
                    "execute"
                );
            }

            let block = frame.block;
            match self.dispatch(opcode, &mut frame.ip, block)? {
                Step::Continue => {}
                Step::Call(callee) => {
                    if depth >= self.config.max_call_depth {
                        return Err(VMError::CallDepthExceeded(self.config.max_call_depth));
                    }
                    debug!(begin = callee.begin, end = callee.end, depth, "call");
                    frames.push(Frame::new(callee));
                }
                Step::Return(value) => {
                    frames.pop();
                    if frames.is_empty() {
                        return Ok(Some(value));
                    }
                    self.context.push(value)?;
                }
            }
        }
    }

    fn dispatch(&mut self, opcode: OpCode, ip: &mut usize, frame: Block) -> VMResult<Step> {
        match opcode {
            OpCode::Push => {
                let index = self.read_operand(ip, frame)?;
                let value = self.constant(index)?.clone();
                self.context.push(value)?;
            }

            OpCode::Pop => {
                self.context.pop()?;
            }

            OpCode::PopN => {
                let index = self.read_operand(ip, frame)?;
                let count = match self.constant(index)? {
                    Value::Integer(n) => *n,
                    other => {
                        return Err(VMError::TypeError(format!(
                            "Expected integer constant for POP_N, found {}",
                            other.type_name()
                        )))
                    }
                };
                let count = usize::try_from(count).map_err(|_| VMError::PopCountExceedsStack {
                    requested: count as i64,
                    depth: self.context.depth(),
                })?;
                self.context.pop_n(count)?;
            }

            OpCode::Dup => {
                let value = self.context.peek()?.clone();
                self.context.push(value)?;
            }

            OpCode::Ret => {
                let value = self.context.pop()?;
                return Ok(Step::Return(value));
            }

            OpCode::Jmp => {
                let target = self.read_operand(ip, frame)?;
                *ip = Self::jump_target(target, frame)?;
            }

            // The tested value stays on the stack whether or not the jump is taken
            OpCode::Jez => {
                let target = self.read_operand(ip, frame)?;
                if self.context.peek()?.as_integer() == Some(0) {
                    *ip = Self::jump_target(target, frame)?;
                }
            }

            OpCode::Jnz => {
                let target = self.read_operand(ip, frame)?;
                if matches!(self.context.peek()?.as_integer(), Some(n) if n != 0) {
                    *ip = Self::jump_target(target, frame)?;
                }
            }

            OpCode::Call => {
                let index = self.read_operand(ip, frame)?;
                let block = *usize::try_from(index)
                    .ok()
                    .and_then(|i| self.program.blocks.get(i))
                    .ok_or(VMError::InvalidBlockIndex(index))?;
                return Ok(Step::Call(self.checked_block(block.begin, block.end)?));
            }

            // Labels are left untouched by INC/DEC
            OpCode::Inc | OpCode::Dec => {
                if let Value::Integer(n) = self.context.peek_mut()? {
                    let current = *n;
                    let (result, symbol) = if opcode == OpCode::Inc {
                        (current.checked_add(1), "+")
                    } else {
                        (current.checked_sub(1), "-")
                    };
                    *n = result.ok_or_else(|| VMError::ArithmeticOverflow(format!("{} {} 1", current, symbol)))?;
                }
            }

            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                let b = self.context.pop_integer(opcode.mnemonic())?;
                let a = self.context.pop_integer(opcode.mnemonic())?;
                let (result, symbol) = match opcode {
                    OpCode::Add => (a.checked_add(b), "+"),
                    OpCode::Sub => (a.checked_sub(b), "-"),
                    OpCode::Mul => (a.checked_mul(b), "*"),
                    _ => {
                        if b == 0 {
                            return Err(VMError::DivisionByZero);
                        }
                        (a.checked_div(b), "/")
                    }
                };
                let value = result.ok_or_else(|| VMError::ArithmeticOverflow(format!("{} {} {}", a, symbol, b)))?;
                self.context.push(Value::Integer(value))?;
            }

            OpCode::And | OpCode::Or | OpCode::Xor => {
                let b = self.context.pop_integer(opcode.mnemonic())?;
                let a = self.context.pop_integer(opcode.mnemonic())?;
                let result = match opcode {
                    OpCode::And => a != 0 && b != 0,
                    OpCode::Or => a != 0 || b != 0,
                    _ => a != b,
                };
                self.context.push(Value::from(result))?;
            }

            OpCode::Not => {
                let a = self.context.pop_integer(opcode.mnemonic())?;
                self.context.push(Value::from(a == 0))?;
            }
        }

        Ok(Step::Continue)
    }

    fn checked_block(&self, begin: usize, end: usize) -> VMResult<Block> {
        if begin > end || end > self.program.code.len() {
            return Err(VMError::InvalidBlockRange(begin, end));
        }
        Ok(Block::new(begin, end))
    }

    fn read_operand(&self, ip: &mut usize, frame: Block) -> VMResult<Word> {
        if *ip >= frame.end {
            return Err(VMError::InvalidProgramCounter(*ip));
        }
        let word = self.program.code[*ip];
        *ip += 1;
        Ok(word)
    }

    fn constant(&self, index: Word) -> VMResult<&Value> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.program.constants.get(i))
            .ok_or(VMError::InvalidConstantIndex(index))
    }

    /// Jumps may land anywhere in the current block, including its end
    fn jump_target(target: Word, frame: Block) -> VMResult<usize> {
        match usize::try_from(target) {
            Ok(t) if t >= frame.begin && t <= frame.end => Ok(t),
            _ => Err(VMError::InvalidProgramCounter(target as usize)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(opcode: OpCode) -> Word {
        opcode.to_word()
    }

    /// Helper function to build a program with a single entry block covering all code
    fn single_block(code: Vec<Word>, constants: Vec<i32>) -> ProgramData {
        let len = code.len();
        ProgramData {
            code,
            constants: constants.into_iter().map(Value::Integer).collect(),
            blocks: vec![Block::new(0, len)],
        }
    }

    fn run_program(program: ProgramData) -> VMResult<Option<Value>> {
        VM::new(program).run()
    }

    fn binary_op(opcode: OpCode, a: i32, b: i32) -> VMResult<Option<Value>> {
        let code = vec![op(OpCode::Push), 0, op(OpCode::Push), 1, op(opcode), op(OpCode::Ret)];
        run_program(single_block(code, vec![a, b]))
    }

    #[test]
    fn test_push_add_ret() {
        assert_eq!(binary_op(OpCode::Add, 2, 3), Ok(Some(Value::Integer(5))));
    }

    #[test]
    fn test_arithmetic_operand_order() {
        assert_eq!(binary_op(OpCode::Sub, 10, 4), Ok(Some(Value::Integer(6))));
        assert_eq!(binary_op(OpCode::Mul, -6, 7), Ok(Some(Value::Integer(-42))));
        assert_eq!(binary_op(OpCode::Div, 17, 5), Ok(Some(Value::Integer(3))));
        assert_eq!(binary_op(OpCode::Div, -17, 5), Ok(Some(Value::Integer(-3))));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(binary_op(OpCode::Div, 1, 0), Err(VMError::DivisionByZero));
    }

    #[test]
    fn test_arithmetic_overflow() {
        assert!(matches!(binary_op(OpCode::Add, i32::MAX, 1), Err(VMError::ArithmeticOverflow(_))));
        assert!(matches!(binary_op(OpCode::Mul, i32::MIN, -1), Err(VMError::ArithmeticOverflow(_))));
        assert!(matches!(binary_op(OpCode::Div, i32::MIN, -1), Err(VMError::ArithmeticOverflow(_))));
    }

    #[test]
    fn test_logical_ops() {
        assert_eq!(binary_op(OpCode::And, 2, 3), Ok(Some(Value::Integer(1))));
        assert_eq!(binary_op(OpCode::And, 2, 0), Ok(Some(Value::Integer(0))));
        assert_eq!(binary_op(OpCode::Or, 0, 0), Ok(Some(Value::Integer(0))));
        assert_eq!(binary_op(OpCode::Or, 0, 5), Ok(Some(Value::Integer(1))));
        assert_eq!(binary_op(OpCode::Xor, 2, 3), Ok(Some(Value::Integer(1))));
        assert_eq!(binary_op(OpCode::Xor, 4, 4), Ok(Some(Value::Integer(0))));
    }

    #[test]
    fn test_not() {
        let code = vec![op(OpCode::Push), 0, op(OpCode::Not), op(OpCode::Ret)];
        assert_eq!(run_program(single_block(code.clone(), vec![0])), Ok(Some(Value::Integer(1))));
        assert_eq!(run_program(single_block(code, vec![9])), Ok(Some(Value::Integer(0))));
    }

    #[test]
    fn test_arithmetic_on_label_is_type_error() {
        let program = ProgramData {
            code: vec![op(OpCode::Push), 0, op(OpCode::Push), 1, op(OpCode::Add), op(OpCode::Ret)],
            constants: vec![Value::Integer(1), Value::Label("f".to_string())],
            blocks: vec![Block::new(0, 6)],
        };
        assert!(matches!(run_program(program), Err(VMError::TypeError(_))));
    }

    #[test]
    fn test_inc_dec() {
        let code = vec![
            op(OpCode::Push), 0,
            op(OpCode::Inc), op(OpCode::Inc), op(OpCode::Dec),
            op(OpCode::Ret),
        ];
        assert_eq!(run_program(single_block(code, vec![40])), Ok(Some(Value::Integer(41))));
    }

    #[test]
    fn test_inc_on_label_is_noop() {
        let program = ProgramData {
            code: vec![op(OpCode::Push), 0, op(OpCode::Inc), op(OpCode::Ret)],
            constants: vec![Value::Label("f".to_string())],
            blocks: vec![Block::new(0, 4)],
        };
        assert_eq!(run_program(program), Ok(Some(Value::Label("f".to_string()))));
    }

    #[test]
    fn test_inc_overflow() {
        let code = vec![op(OpCode::Push), 0, op(OpCode::Inc), op(OpCode::Ret)];
        assert!(matches!(
            run_program(single_block(code, vec![i32::MAX])),
            Err(VMError::ArithmeticOverflow(_))
        ));
    }

    #[test]
    fn test_dup_and_pop() {
        let code = vec![
            op(OpCode::Push), 0,
            op(OpCode::Dup),
            op(OpCode::Add),
            op(OpCode::Push), 1,
            op(OpCode::Pop),
            op(OpCode::Ret),
        ];
        assert_eq!(run_program(single_block(code, vec![21, 99])), Ok(Some(Value::Integer(42))));
    }

    #[test]
    fn test_pop_n() {
        let code = vec![
            op(OpCode::Push), 0,
            op(OpCode::Push), 1,
            op(OpCode::Push), 1,
            op(OpCode::PopN), 2,
            op(OpCode::Ret),
        ];
        assert_eq!(run_program(single_block(code, vec![7, 8, 2])), Ok(Some(Value::Integer(7))));
    }

    #[test]
    fn test_pop_n_exceeding_stack() {
        let code = vec![op(OpCode::Push), 0, op(OpCode::PopN), 1, op(OpCode::Ret)];
        assert_eq!(
            run_program(single_block(code, vec![1, 5])),
            Err(VMError::PopCountExceedsStack { requested: 5, depth: 1 })
        );
    }

    #[test]
    fn test_pop_n_negative_count() {
        let code = vec![op(OpCode::PopN), 0];
        assert!(matches!(
            run_program(single_block(code, vec![-1])),
            Err(VMError::PopCountExceedsStack { requested: -1, .. })
        ));
    }

    #[test]
    fn test_call_returns_onto_caller_stack() {
        // double: PUSH 2, MUL, RET    _start: PUSH 21, CALL double, RET
        let program = ProgramData {
            code: vec![
                op(OpCode::Push), 1, op(OpCode::Mul), op(OpCode::Ret),
                op(OpCode::Push), 0, op(OpCode::Call), 1, op(OpCode::Ret),
            ],
            constants: vec![Value::Integer(21), Value::Integer(2)],
            blocks: vec![Block::new(4, 9), Block::new(0, 4)],
        };
        assert_eq!(run_program(program), Ok(Some(Value::Integer(42))));
    }

    #[test]
    fn test_call_without_ret_pushes_nothing() {
        // callee: PUSH 3, POP    _start: CALL callee, RET
        let program = ProgramData {
            code: vec![
                op(OpCode::Push), 0, op(OpCode::Pop),
                op(OpCode::Call), 1, op(OpCode::Ret),
            ],
            constants: vec![Value::Integer(3)],
            blocks: vec![Block::new(3, 6), Block::new(0, 3)],
        };

        let mut vm = VM::new(program);
        assert_eq!(vm.run(), Err(VMError::StackUnderflow));
    }

    #[test]
    fn test_block_without_ret_returns_none() {
        let code = vec![op(OpCode::Push), 0];
        let mut vm = VM::new(single_block(code, vec![1]));
        assert_eq!(vm.run(), Ok(None));
        assert_eq!(vm.stack(), &[Value::Integer(1)]);
    }

    #[test]
    fn test_countdown_loop() {
        // PUSH 3; loop: DEC; JNZ loop; RET
        let code = vec![op(OpCode::Push), 0, op(OpCode::Dec), op(OpCode::Jnz), 2, op(OpCode::Ret)];
        assert_eq!(run_program(single_block(code, vec![3])), Ok(Some(Value::Integer(0))));
    }

    #[test]
    fn test_conditional_jump_keeps_tested_value() {
        // PUSH 7; PUSH 0; JEZ done; PUSH 9; done: POP; RET
        let code = vec![
            op(OpCode::Push), 0,
            op(OpCode::Push), 1,
            op(OpCode::Jez), 8,
            op(OpCode::Push), 2,
            op(OpCode::Pop),
            op(OpCode::Ret),
        ];
        assert_eq!(run_program(single_block(code, vec![7, 0, 9])), Ok(Some(Value::Integer(7))));
    }

    #[test]
    fn test_jnz_not_taken_falls_through() {
        // PUSH 0; JNZ end; INC; end: RET
        let code = vec![op(OpCode::Push), 0, op(OpCode::Jnz), 5, op(OpCode::Inc), op(OpCode::Ret)];
        assert_eq!(run_program(single_block(code, vec![0])), Ok(Some(Value::Integer(1))));
    }

    #[test]
    fn test_jump_to_block_end_finishes_block() {
        let code = vec![op(OpCode::Push), 0, op(OpCode::Jmp), 5, op(OpCode::Ret)];
        let mut vm = VM::new(single_block(code, vec![4]));
        assert_eq!(vm.run(), Ok(None));
    }

    #[test]
    fn test_jump_outside_block() {
        let code = vec![op(OpCode::Jmp), 100];
        assert_eq!(run_program(single_block(code, vec![])), Err(VMError::InvalidProgramCounter(100)));
    }

    #[test]
    fn test_missing_operand() {
        let code = vec![op(OpCode::Push)];
        assert_eq!(run_program(single_block(code, vec![])), Err(VMError::InvalidProgramCounter(1)));
    }

    #[test]
    fn test_unknown_opcode() {
        let code = vec![op(OpCode::Push), 0, 0x13];
        assert_eq!(run_program(single_block(code, vec![1])), Err(VMError::UnknownOpcode(0x13, 2)));
    }

    #[test]
    fn test_invalid_constant_index() {
        let code = vec![op(OpCode::Push), 3, op(OpCode::Ret)];
        assert_eq!(run_program(single_block(code, vec![1])), Err(VMError::InvalidConstantIndex(3)));
    }

    #[test]
    fn test_invalid_block_index() {
        let code = vec![op(OpCode::Call), 9];
        assert_eq!(run_program(single_block(code, vec![])), Err(VMError::InvalidBlockIndex(9)));
    }

    #[test]
    fn test_invalid_block_range() {
        let program = ProgramData {
            code: vec![op(OpCode::Ret)],
            constants: vec![],
            blocks: vec![Block::new(0, 5)],
        };
        assert_eq!(run_program(program), Err(VMError::InvalidBlockRange(0, 5)));
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(run_program(ProgramData::new()), Err(VMError::NoEntryBlock));
    }

    #[test]
    fn test_stack_overflow() {
        // loop: PUSH 0; JMP loop
        let code = vec![op(OpCode::Push), 0, op(OpCode::Jmp), 0];
        let config = VmConfig { stack_capacity: 8, ..VmConfig::default() };
        let mut vm = VM::with_config(single_block(code, vec![1]), config);
        assert_eq!(vm.run(), Err(VMError::StackOverflow(8)));
    }

    #[test]
    fn test_unbounded_recursion_hits_call_depth() {
        // f: CALL f
        let code = vec![op(OpCode::Call), 0];
        let config = VmConfig { max_call_depth: 32, ..VmConfig::default() };
        let mut vm = VM::with_config(single_block(code, vec![]), config);
        assert_eq!(vm.run(), Err(VMError::CallDepthExceeded(32)));
    }

    #[test]
    fn test_run_resets_stack() {
        let code = vec![op(OpCode::Push), 0];
        let mut vm = VM::new(single_block(code, vec![1]));
        vm.run().unwrap();
        vm.run().unwrap();
        assert_eq!(vm.stack().len(), 1);
    }

    #[test]
    fn test_recursion_to_default_depth_limit() {
        // _start: CALL _start, run on an ordinary test thread
        let code = vec![op(OpCode::Call), 0];
        assert_eq!(
            run_program(single_block(code, vec![])),
            Err(VMError::CallDepthExceeded(DEFAULT_MAX_CALL_DEPTH))
        );
    }

    #[test]
    fn test_deep_call_depth_does_not_use_host_stack() {
        let code = vec![op(OpCode::Call), 0];
        let config = VmConfig { max_call_depth: 200_000, ..VmConfig::default() };
        let mut vm = VM::with_config(single_block(code, vec![]), config);
        assert_eq!(vm.run(), Err(VMError::CallDepthExceeded(200_000)));
    }

    #[test]
    fn test_recursive_countdown_below_limit() {
        // f: DEC; JEZ done; CALL f; done: RET    _start: PUSH 400; CALL f; RET
        let program = ProgramData {
            code: vec![
                op(OpCode::Dec), op(OpCode::Jez), 5, op(OpCode::Call), 1, op(OpCode::Ret),
                op(OpCode::Push), 0, op(OpCode::Call), 1, op(OpCode::Ret),
            ],
            constants: vec![Value::Integer(400)],
            blocks: vec![Block::new(6, 11), Block::new(0, 6)],
        };
        assert_eq!(run_program(program), Ok(Some(Value::Integer(0))));
    }

    #[test]
    fn test_entry_counts_toward_call_depth() {
        // f: PUSH 1; RET    _start: CALL f; RET
        let program = ProgramData {
            code: vec![op(OpCode::Push), 0, op(OpCode::Ret), op(OpCode::Call), 1, op(OpCode::Ret)],
            constants: vec![Value::Integer(1)],
            blocks: vec![Block::new(3, 6), Block::new(0, 3)],
        };

        let config = VmConfig { max_call_depth: 1, ..VmConfig::default() };
        assert_eq!(VM::with_config(program.clone(), config).run(), Err(VMError::CallDepthExceeded(1)));

        let config = VmConfig { max_call_depth: 2, ..VmConfig::default() };
        assert_eq!(VM::with_config(program, config).run(), Ok(Some(Value::Integer(1))));
    }

    #[test]
    fn test_call_into_invalid_block_range() {
        let program = ProgramData {
            code: vec![op(OpCode::Call), 1],
            constants: vec![],
            blocks: vec![Block::new(0, 2), Block::new(1, 9)],
        };
        assert_eq!(run_program(program), Err(VMError::InvalidBlockRange(1, 9)));
    }
}
