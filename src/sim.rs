//! Interpreting Mima programs.
//!
//! This module is focused on executing compiled programs (i.e., [`Program`]).
//!
//! This module consists of:
//! - [`Interpreter`]: The struct that executes a program's token tree.
//! - [`word`]: The fixed-width machine word.
//! - [`mem`]: The module handling the Mima's memory.
//! - [`alu`]: The arithmetic logic unit.
//! - [`instr`]: The module defining instructions and instruction sets.
//! - [`env`]: The module handling scopes and their bindings.
//! - [`frame`]: The module handling the return stack.
//! - [`debug`]: The module handling breakpoints and the threaded debug controller.
//!
//! # Usage
//!
//! To execute some code, compile it and create an interpreter for it:
//!
//! ```
//! use mima::compile::{compile, CompileOptions};
//! use mima::sim::{ExitCondition, Interpreter};
//!
//! let src = "
//!     §define a = 0;
//!     LDC(5); STV(a); ADD(a); HALT();
//! ";
//! let program = compile(src, &CompileOptions::default()).into_program().unwrap();
//!
//! let mut interp = Interpreter::new(&program, Default::default()).unwrap();
//! assert_eq!(interp.run().unwrap(), ExitCondition::Halt);
//! assert_eq!(interp.mima.accumulator.int_value(), 10);
//! ```
//!
//! ## Execution
//!
//! Beyond the basic [`Interpreter::run`] (which runs until the program ends),
//! there are also:
//! - [`Interpreter::step_in`], [`Interpreter::step_out`], [`Interpreter::step_over`]: manual step-by-step execution
//! - [`Interpreter::run_while`], [`Interpreter::run_with_limit`], [`Interpreter::run_with`]: more advanced programmatic execution
//!
//! Execution never recurses on the host stack: the interpreter's position is an
//! explicit (environment, statement index) pair, which jumps and returns replace.
pub mod word;
pub mod mem;
pub mod alu;
pub mod instr;
pub mod env;
pub mod frame;
pub mod observer;
pub mod debug;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::ControlFlow;

use crate::ast::{Token, TokenType};
use crate::compile::Program;

use self::alu::ArithmeticLogicUnit;
use self::debug::{DebugHook, MachineSnapshot};
use self::env::{EnvId, Environments};
use self::frame::{Frame, FrameStack};
use self::instr::{Instruction, InstructionSet};
use self::mem::MemoryMap;
use self::observer::{AccessObserver, AccessSet};
use self::word::MachineWord;

/// Errors that can occur during execution.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum SimErr {
    /// A call named something that is not an instruction.
    UnknownInstruction(String),
    /// An identifier was not bound in any enclosing scope.
    UndefinedIdentifier(String),
    /// An instruction was called with the wrong number of arguments.
    ArgumentCount {
        /// The instruction called.
        instr: Instruction,
        /// The number of arguments it takes.
        expected: usize,
        /// The number of arguments it was given.
        found: usize
    },
    /// An instruction was given an argument of the wrong kind.
    InvalidArgument {
        /// The instruction called.
        instr: Instruction,
        /// What kind of argument was expected.
        expected: &'static str
    },
    /// A negative value was passed as a constant which is shorter than a word.
    NegativeConstant(Instruction),
    /// A negative address was computed where only non-negative addresses are allowed.
    IllegalAddress(i64),
    /// A relative address (`a + o`) does not fit in an address.
    AddressOverflow {
        /// The base address.
        base: i64,
        /// The offset added to it.
        offset: i64
    },
    /// A definition referred to a negative address.
    NegativeReference(String),
    /// A constant was defined without a value.
    ConstantWithoutValue(String),
    /// A name was bound twice in the same scope.
    AlreadyDefined(String),
    /// `RET` was executed outside of any call.
    EmptyReturnStack,
    /// The operands of an ALU operation had different word lengths.
    WordLengthMismatch {
        /// The word length of the ALU.
        expected: usize,
        /// The word length of the operand.
        found: usize
    },
    /// Memory holds as many addresses as a word can address.
    MemoryExhausted,
    /// A binary literal has more digits than a constant has bits.
    BinaryTooLong(String),
    /// Something which does not produce a value was used as a value.
    NotAValue(String),
    /// A node which cannot be executed was executed.
    UnexpectedToken(String),
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimErr::UnknownInstruction(s)   => write!(f, "unknown instruction {s}"),
            SimErr::UndefinedIdentifier(s)  => write!(f, "undefined identification {s}"),
            SimErr::ArgumentCount { instr, expected, found } => write!(f, "invalid number of arguments for {instr} (expected {expected}, found {found})"),
            SimErr::InvalidArgument { instr, expected } => write!(f, "{instr} expects {expected} as its argument"),
            SimErr::NegativeConstant(instr) => write!(f, "can't pass negative values to {instr}"),
            SimErr::IllegalAddress(a)       => write!(f, "illegal memory address {a}"),
            SimErr::AddressOverflow { base, offset } => write!(f, "address {base} + {offset} is out of range"),
            SimErr::NegativeReference(s)    => write!(f, "{s} refers to a negative address"),
            SimErr::ConstantWithoutValue(s) => write!(f, "constant {s} has no value"),
            SimErr::AlreadyDefined(s)       => write!(f, "{s} is already defined in this scope"),
            SimErr::EmptyReturnStack        => f.write_str("nowhere to return to"),
            SimErr::WordLengthMismatch { expected, found } => write!(f, "word length mismatch (expected {expected} bits, found {found} bits)"),
            SimErr::MemoryExhausted         => f.write_str("out of memory"),
            SimErr::BinaryTooLong(s)        => write!(f, "binary value ~{s} is too long"),
            SimErr::NotAValue(s)            => write!(f, "{s} does not have a value"),
            SimErr::UnexpectedToken(s)      => write!(f, "cannot execute {s}"),
        }
    }
}
impl std::error::Error for SimErr {}
impl crate::err::Error for SimErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            SimErr::UnknownInstruction(_) => Some("instruction names are case-sensitive, and MimaX instructions need a .mimax file".into()),
            SimErr::UndefinedIdentifier(s) => Some(format!("define {s} with `§define {s};` or label a statement with `{s}:`").into()),
            SimErr::NegativeConstant(_) => Some("constants are shorter than a word, so negative values would change sign".into()),
            SimErr::ConstantWithoutValue(s) => Some(format!("give the constant a value, like `§const {s} = 1;`").into()),
            SimErr::EmptyReturnStack => Some("RET can only be used after a CALL".into()),
            SimErr::BinaryTooLong(_) => Some("constants have 20 bits (or 24 bits on the MimaX)".into()),
            _ => None
        }
    }
}

/// The reason execution stopped without an error.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ExitCondition {
    /// `HALT` was executed.
    Halt,
    /// The last statement of the program was executed.
    EndOfProgram,
    /// Execution was stopped before the program ended (by a hook, a step, or a step limit).
    Interrupted
}

/// Configuration flags for [`Interpreter`].
///
/// Read the field descriptions for more details.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SimFlags {
    /// The number of addresses which are filled with zero before execution.
    ///
    /// Any other address is created when it is first accessed.
    ///
    /// By default, this is `100`.
    pub memory_capacity: usize
}

#[allow(clippy::derivable_impls)]
impl Default for SimFlags {
    fn default() -> Self {
        Self {
            memory_capacity: 100
        }
    }
}

/// The registers and memory of the machine.
#[derive(Debug, Clone)]
pub struct Mima {
    /// The accumulator.
    pub accumulator: MachineWord,
    /// The stack pointer (only used by the MimaX).
    pub stack_pointer: MachineWord,
    /// The memory.
    pub memory: MemoryMap
}
impl Mima {
    fn new(word_length: usize, flags: &SimFlags) -> Self {
        Self {
            accumulator: MachineWord::zero(word_length),
            stack_pointer: MachineWord::zero(word_length),
            memory: MemoryMap::new(word_length, flags.memory_capacity)
        }
    }
}

/// What an argument evaluated to.
#[derive(Debug, Clone, Copy)]
enum Value {
    /// A number literal.
    Number(i64),
    /// A constant word (a binary literal, constant, or instruction result).
    Word(MachineWord),
    /// The address of a variable.
    Reference(i64),
    /// A labelled statement.
    Label(EnvId, usize)
}

/// What should happen after a statement has executed.
enum Effect {
    Continue,
    Jump(EnvId, usize),
    Call(EnvId, usize),
    Return,
    Halt
}

/// Stops [`Interpreter::run_while`] once the tripwire returns false.
struct Tripwire<F>(F);
impl<F: FnMut(&Interpreter<'_>) -> bool> DebugHook for Tripwire<F> {
    fn before_statement(&mut self, _stmt: &Token, interp: &Interpreter<'_>) -> ControlFlow<()> {
        match (self.0)(interp) {
            true  => ControlFlow::Continue(()),
            false => ControlFlow::Break(()),
        }
    }
}

/// Executes a [`Program`].
#[derive(Debug)]
pub struct Interpreter<'p> {
    program: &'p Program,

    /// The machine state.
    pub mima: Mima,
    alu: ArithmeticLogicUnit,
    envs: Environments<'p>,
    frames: FrameStack,

    flags: SimFlags,
    exit: Option<ExitCondition>,

    /// The number of statements executed.
    pub instructions_run: u64,

    /// Tracks the accesses made by the last executed statement.
    pub observer: AccessObserver
}
impl<'p> Interpreter<'p> {
    /// Creates a new interpreter for a program.
    ///
    /// This fails if the top scope of the program declares a label twice.
    pub fn new(program: &'p Program, flags: SimFlags) -> Result<Self, SimErr> {
        let iset = program.instruction_set();
        Ok(Self {
            program,
            mima: Mima::new(iset.word_length(), &flags),
            alu: ArithmeticLogicUnit::new(iset.word_length()),
            envs: Environments::new(program.token(), iset)?,
            frames: FrameStack::new(),
            flags,
            exit: None,
            instructions_run: 0,
            observer: AccessObserver::new()
        })
    }

    /// Resets the interpreter, clearing the machine state and restarting the program.
    pub fn reset(&mut self) -> Result<(), SimErr> {
        let iset = self.instruction_set();
        self.envs = Environments::new(self.program.token(), iset)?;
        self.mima = Mima::new(iset.word_length(), &self.flags);
        self.frames = FrameStack::new();
        self.exit = None;
        self.instructions_run = 0;
        self.observer.clear();
        Ok(())
    }

    /// The program being executed.
    pub fn program(&self) -> &'p Program {
        self.program
    }
    /// The instruction set of the program.
    pub fn instruction_set(&self) -> InstructionSet {
        self.program.instruction_set()
    }
    /// The flags this interpreter was created with.
    pub fn flags(&self) -> &SimFlags {
        &self.flags
    }
    /// The return stack.
    pub fn frames(&self) -> &FrameStack {
        &self.frames
    }
    /// The scopes being executed.
    pub fn environments(&self) -> &Environments<'p> {
        &self.envs
    }
    /// How the program ended, if it has ended.
    pub fn exit_condition(&self) -> Option<ExitCondition> {
        self.exit
    }
    /// Whether the program can still execute statements.
    pub fn is_running(&self) -> bool {
        self.exit.is_none()
    }

    /// The statement the current scope is positioned at.
    ///
    /// Between steps, this is the statement which executes next.
    pub fn current_statement(&self) -> Option<&'p Token> {
        let env = self.envs.current_env();
        env.program().get(env.cursor())
    }

    /// Captures the current machine state.
    pub fn snapshot(&self) -> MachineSnapshot {
        let stmt = self.current_statement();
        MachineSnapshot {
            accumulator: self.mima.accumulator,
            stack_pointer: self.mima.stack_pointer,
            memory: self.mima.memory.iter().collect::<BTreeMap<_, _>>(),
            accesses: self.observer.mem_accesses().collect(),
            offset: stmt.map(Token::offset),
            line: stmt.and_then(Token::line),
            instructions_run: self.instructions_run,
            exit: self.exit
        }
    }

    /// Runs with a hook, which is called before every executed statement.
    ///
    /// This runs until:
    /// - `HALT` is executed ([`ExitCondition::Halt`]),
    /// - the last statement is executed ([`ExitCondition::EndOfProgram`]),
    /// - the hook breaks ([`ExitCondition::Interrupted`]),
    /// - or a statement fails.
    ///
    /// If the program has already ended, this returns how it ended without executing anything.
    pub fn run_with(&mut self, hook: &mut impl DebugHook) -> Result<ExitCondition, SimErr> {
        loop {
            if let Some(exit) = self.exit {
                return Ok(exit);
            }

            let Some(stmt) = self.settle()? else {
                self.exit = Some(ExitCondition::EndOfProgram);
                continue;
            };

            if hook.before_statement(stmt, self).is_break() {
                return Ok(ExitCondition::Interrupted);
            }

            self.step_statement(stmt)?;
            if self.exit == Some(ExitCondition::Halt) {
                hook.on_halt(self.mima.accumulator);
            }
        }
    }

    /// Runs until the tripwire condition returns false (or the program ends).
    ///
    /// The tripwire is checked before every statement.
    pub fn run_while(&mut self, tripwire: impl FnMut(&Interpreter<'_>) -> bool) -> Result<ExitCondition, SimErr> {
        self.run_with(&mut Tripwire(tripwire))
    }

    /// Executes the program.
    ///
    /// This blocks until the program ends.
    /// If you would like to limit the maximum number of statements to execute, consider [`Interpreter::run_with_limit`].
    pub fn run(&mut self) -> Result<ExitCondition, SimErr> {
        self.run_while(|_| true)
    }

    /// Executes the program with a limit on how many statements to execute.
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<ExitCondition, SimErr> {
        let i = self.instructions_run;
        self.run_while(|interp| interp.instructions_run.wrapping_sub(i) < max_steps)
    }

    /// Executes one statement.
    pub fn step_in(&mut self) -> Result<ExitCondition, SimErr> {
        let mut first = Some(());
        self.run_while(|_| first.take().is_some())
    }

    /// Executes one statement, running through entire calls as a single step.
    pub fn step_over(&mut self) -> Result<ExitCondition, SimErr> {
        let depth = self.frames.len();
        let mut first = Some(());

        // do at least one step, then run until we land back in the same frame
        self.run_while(|interp| first.take().is_some() || depth < interp.frames.len())
    }

    /// Executes until the current call returns.
    ///
    /// Outside of a call, this does nothing.
    pub fn step_out(&mut self) -> Result<ExitCondition, SimErr> {
        let depth = self.frames.len();
        let mut first = Some(());

        match depth {
            0 => Ok(self.exit.unwrap_or(ExitCondition::Interrupted)),
            _ => self.run_while(|interp| first.take().is_some() || depth <= interp.frames.len())
        }
    }

    /// Moves to the next statement which can be executed,
    /// entering and exiting scopes as necessary.
    ///
    /// This returns `None` once the program has no more statements.
    fn settle(&mut self) -> Result<Option<&'p Token>, SimErr> {
        loop {
            let env = self.envs.current_env();
            let Some(stmt) = env.program().get(env.cursor()) else {
                match self.envs.exit_scope() {
                    true  => continue,
                    false => return Ok(None),
                }
            };

            match unlabel(stmt) {
                Token::Program(p) => { self.envs.enter(p)?; },
                Token::Empty(_) => self.envs.advance(),
                _ => return Ok(Some(stmt)),
            }
        }
    }

    /// Executes a statement and moves to the next statement.
    fn step_statement(&mut self, stmt: &'p Token) -> Result<(), SimErr> {
        self.observer.clear();

        let effect = self.execute(unlabel(stmt)).map_err(|e| {
            log::error!("runtime error on line {}: {e}", stmt.line().map_or(0, |l| l + 1));
            e
        })?;
        self.instructions_run += 1;

        match effect {
            Effect::Continue => self.envs.advance(),
            Effect::Jump(env, index) => {
                log::trace!("jumping to statement {index}");
                self.envs.jump(env, index);
            },
            Effect::Call(env, index) => {
                let current = self.envs.current();
                let return_index = self.envs.current_env().cursor() + 1;
                log::trace!("calling statement {index} (depth {})", self.frames.len() + 1);

                self.envs.retain(current);
                self.frames.push_frame(Frame { return_index, env: current });
                self.envs.jump(env, index);
            },
            Effect::Return => {
                let Some(frame) = self.frames.pop_frame() else {
                    log::error!("runtime error on line {}: {}", stmt.line().map_or(0, |l| l + 1), SimErr::EmptyReturnStack);
                    return Err(SimErr::EmptyReturnStack);
                };
                log::trace!("returning to statement {}", frame.return_index);

                self.envs.jump(frame.env, frame.return_index);
                self.envs.release(frame.env);
            },
            Effect::Halt => self.exit = Some(ExitCondition::Halt),
        }

        Ok(())
    }

    fn execute(&mut self, stmt: &'p Token) -> Result<Effect, SimErr> {
        match stmt {
            Token::Array(defs) => {
                defs.elements()
                    .iter()
                    .try_for_each(|d| self.define(d))?;
                Ok(Effect::Continue)
            },
            Token::Binary(b) if b.ty() == TokenType::Call => {
                let (instr, args) = self.resolve_call(stmt)?;
                self.call(instr, args)
            },
            Token::Binary(b) if matches!(b.ty(), TokenType::Definition | TokenType::Constant) => {
                self.define(stmt)?;
                Ok(Effect::Continue)
            },
            Token::Atom(_) => {
                // a lone value, which only needs to be resolvable
                self.value(stmt)?;
                Ok(Effect::Continue)
            },
            Token::Empty(_) => Ok(Effect::Continue),
            t => Err(SimErr::UnexpectedToken(t.to_string())),
        }
    }

    /// Binds a definition or constant in the current scope.
    fn define(&mut self, def: &'p Token) -> Result<(), SimErr> {
        let Some(b) = def.as_binary() else {
            return Err(SimErr::UnexpectedToken(def.to_string()));
        };
        let Some(name) = b.name() else {
            return Err(SimErr::UnexpectedToken(def.to_string()));
        };
        let value = match b.second() {
            Token::Empty(_) => None,
            t => Some(self.value(t)?),
        };

        match (b.ty(), value) {
            (TokenType::Constant, None) => Err(SimErr::ConstantWithoutValue(name.to_string())),
            (TokenType::Constant, Some(v)) => {
                let word = match v {
                    Value::Number(n) => MachineWord::from_value(n, self.instruction_set().const_word_length()),
                    Value::Word(w) => w,
                    Value::Reference(_) | Value::Label(..) => return Err(SimErr::NotAValue(b.second().to_string())),
                };
                self.envs.current_env_mut().define_constant(name, word)
            },
            (_, None) => {
                let address = self.envs.reserve();
                self.envs.current_env_mut().define_variable(name, address)
            },
            (_, Some(v)) => {
                let address = match v {
                    Value::Number(n) => n,
                    Value::Word(w) => w.int_value(),
                    Value::Reference(a) => a,
                    Value::Label(..) => return Err(SimErr::NotAValue(b.second().to_string())),
                };
                if address < 0 {
                    return Err(SimErr::NegativeReference(name.to_string()));
                }
                self.envs.current_env_mut().define_variable(name, address)
            },
        }
    }

    /// Evaluates an expression.
    fn value(&mut self, expr: &'p Token) -> Result<Value, SimErr> {
        match expr {
            Token::Atom(a) => match a.ty() {
                TokenType::Number => a.number()
                    .map(Value::Number)
                    .ok_or_else(|| SimErr::NotAValue(a.value().to_string())),
                TokenType::Binary => {
                    let len = self.instruction_set().const_word_length();
                    MachineWord::from_binary_str(a.value(), len)
                        .map(Value::Word)
                        .ok_or_else(|| SimErr::BinaryTooLong(a.value().to_string()))
                },
                TokenType::Identification => {
                    let name = a.value();
                    if let Some(addr) = self.envs.lookup_variable(name) {
                        Ok(Value::Reference(addr))
                    } else if let Some(word) = self.envs.lookup_constant(name) {
                        Ok(Value::Word(word))
                    } else if let Some((env, index)) = self.envs.lookup_jump(name) {
                        Ok(Value::Label(env, index))
                    } else {
                        Err(SimErr::UndefinedIdentifier(name.to_string()))
                    }
                },
                _ => Err(SimErr::NotAValue(a.value().to_string())),
            },
            Token::Binary(b) if b.ty() == TokenType::Call => {
                let (instr, args) = self.resolve_call(expr)?;
                if !instr.returns_value() {
                    return Err(SimErr::NotAValue(instr.to_string()));
                }
                self.call(instr, args)?;
                Ok(Value::Word(self.mima.stack_pointer))
            },
            t => Err(SimErr::NotAValue(t.to_string())),
        }
    }

    fn resolve_call(&self, call: &'p Token) -> Result<(Instruction, &'p [Token]), SimErr> {
        let Some(b) = call.as_binary() else {
            return Err(SimErr::UnexpectedToken(call.to_string()));
        };
        let name = b.name().unwrap_or_default();
        let instr = self.envs.lookup_function(name)
            .ok_or_else(|| SimErr::UnknownInstruction(name.to_string()))?;

        let args = b.args();
        if args.len() != instr.arg_count() {
            return Err(SimErr::ArgumentCount { instr, expected: instr.arg_count(), found: args.len() });
        }
        Ok((instr, args))
    }

    fn load(&mut self, addr: i64) -> MachineWord {
        self.observer.update_mem_accesses(addr, AccessSet::READ);
        self.mima.memory.load(addr)
    }
    fn store(&mut self, addr: i64, word: MachineWord) -> Result<(), SimErr> {
        let mut set = AccessSet::WRITTEN;
        if self.mima.memory.get(addr).map_or(true, |old| old.int_value() != word.int_value()) {
            set |= AccessSet::MODIFIED;
        }
        self.observer.update_mem_accesses(addr, set);
        self.mima.memory.store(addr, word)
    }
    fn set_accumulator(&mut self, word: MachineWord) {
        let mut set = AccessSet::WRITTEN;
        if self.mima.accumulator != word {
            set |= AccessSet::MODIFIED;
        }
        self.observer.update_accumulator(set);
        self.mima.accumulator = word;
    }

    /// Evaluates an argument which must be a constant, converted to a full word.
    fn constant_arg(&mut self, instr: Instruction, arg: &'p Token) -> Result<MachineWord, SimErr> {
        let iset = self.instruction_set();
        let shorter = iset.const_word_length() != iset.word_length();

        let word = match self.value(arg)? {
            Value::Number(n) if n < 0 && shorter => return Err(SimErr::NegativeConstant(instr)),
            Value::Number(n) => MachineWord::from_value(n, iset.const_word_length()),
            Value::Word(w) if w.msb() && w.word_length() < iset.word_length() => return Err(SimErr::NegativeConstant(instr)),
            Value::Word(w) => w,
            _ => return Err(SimErr::InvalidArgument { instr, expected: "a constant" }),
        };
        Ok(MachineWord::cast(word, iset.word_length()))
    }

    /// Evaluates an argument which must be an address.
    fn address_arg(&mut self, instr: Instruction, arg: &'p Token) -> Result<i64, SimErr> {
        let addr = match self.value(arg)? {
            Value::Reference(a) => return Ok(a),
            Value::Number(n) => n,
            Value::Word(w) => w.int_value(),
            Value::Label(..) => return Err(SimErr::InvalidArgument { instr, expected: "an address" }),
        };
        match addr >= 0 {
            true  => Ok(addr),
            false => Err(SimErr::IllegalAddress(addr)),
        }
    }

    /// Evaluates an argument which must be a label.
    fn label_arg(&mut self, instr: Instruction, arg: &'p Token) -> Result<(EnvId, usize), SimErr> {
        match self.value(arg)? {
            Value::Label(env, index) => Ok((env, index)),
            _ => Err(SimErr::InvalidArgument { instr, expected: "a label" }),
        }
    }

    /// Evaluates an argument as a plain integer.
    fn int_arg(&mut self, instr: Instruction, arg: &'p Token) -> Result<i64, SimErr> {
        match self.value(arg)? {
            Value::Number(n) => Ok(n),
            Value::Word(w) => Ok(w.int_value()),
            Value::Reference(a) => Ok(a),
            Value::Label(..) => Err(SimErr::InvalidArgument { instr, expected: "a value" }),
        }
    }

    /// Evaluates the `a + o` address of `STVR`/`LDVR`.
    fn relative_arg(&mut self, instr: Instruction, args: &'p [Token]) -> Result<i64, SimErr> {
        let base = self.int_arg(instr, &args[0])?;
        let offset = self.int_arg(instr, &args[1])?;
        match base.checked_add(offset) {
            Some(addr) if addr >= 0 => Ok(addr),
            Some(addr) => Err(SimErr::IllegalAddress(addr)),
            None => Err(SimErr::AddressOverflow { base, offset }),
        }
    }

    /// Applies an ALU operation to the accumulator and the word at an address.
    fn alu_op(
        &mut self,
        instr: Instruction,
        arg: &'p Token,
        op: fn(&ArithmeticLogicUnit, MachineWord, MachineWord) -> Result<MachineWord, SimErr>
    ) -> Result<Effect, SimErr> {
        let addr = self.address_arg(instr, arg)?;
        let operand = self.load(addr);
        let result = op(&self.alu, self.mima.accumulator, operand)?;
        self.set_accumulator(result);
        Ok(Effect::Continue)
    }

    /// Executes an instruction whose arguments have already been counted.
    fn call(&mut self, instr: Instruction, args: &'p [Token]) -> Result<Effect, SimErr> {
        use Instruction as I;

        match instr {
            I::LDC => {
                let word = self.constant_arg(instr, &args[0])?;
                self.set_accumulator(word);
            },
            I::LDV => {
                let addr = self.address_arg(instr, &args[0])?;
                let word = self.load(addr);
                self.set_accumulator(word);
            },
            I::STV => {
                let addr = self.address_arg(instr, &args[0])?;
                self.store(addr, self.mima.accumulator)?;
            },
            I::LDIV => {
                let ptr = self.address_arg(instr, &args[0])?;
                let addr = self.load(ptr).int_value();
                let word = self.load(addr);
                self.set_accumulator(word);
            },
            I::STIV => {
                let ptr = self.address_arg(instr, &args[0])?;
                let addr = self.load(ptr).int_value();
                self.store(addr, self.mima.accumulator)?;
            },
            I::ADD => return self.alu_op(instr, &args[0], ArithmeticLogicUnit::add),
            I::AND => return self.alu_op(instr, &args[0], ArithmeticLogicUnit::and),
            I::OR  => return self.alu_op(instr, &args[0], ArithmeticLogicUnit::or),
            I::XOR => return self.alu_op(instr, &args[0], ArithmeticLogicUnit::xor),
            I::EQL => return self.alu_op(instr, &args[0], ArithmeticLogicUnit::negative_if_equals),
            I::NOT => {
                let word = self.mima.accumulator.invert();
                self.set_accumulator(word);
            },
            I::RAR => {
                let word = self.alu.rar(self.mima.accumulator)?;
                self.set_accumulator(word);
            },
            I::JMP => {
                let (env, index) = self.label_arg(instr, &args[0])?;
                return Ok(Effect::Jump(env, index));
            },
            I::JMN => {
                let (env, index) = self.label_arg(instr, &args[0])?;
                if self.mima.accumulator.msb() {
                    return Ok(Effect::Jump(env, index));
                }
            },
            I::HALT => return Ok(Effect::Halt),
            I::ADC => {
                let word = self.constant_arg(instr, &args[0])?;
                let sum = self.alu.add(self.mima.accumulator, word)?;
                self.set_accumulator(sum);
            },
            I::LDSP => {
                self.observer.update_stack_pointer(AccessSet::READ);
                self.set_accumulator(self.mima.stack_pointer);
            },
            I::STSP => {
                let mut set = AccessSet::WRITTEN;
                if self.mima.stack_pointer != self.mima.accumulator {
                    set |= AccessSet::MODIFIED;
                }
                self.observer.update_stack_pointer(set);
                self.observer.update_accumulator(AccessSet::READ);
                self.mima.stack_pointer = self.mima.accumulator;
            },
            I::SP => self.observer.update_stack_pointer(AccessSet::READ),
            I::STVR => {
                let addr = self.relative_arg(instr, args)?;
                self.store(addr, self.mima.accumulator)?;
            },
            I::LDVR => {
                let addr = self.relative_arg(instr, args)?;
                let word = self.load(addr);
                self.set_accumulator(word);
            },
            I::CALL => {
                let (env, index) = self.label_arg(instr, &args[0])?;
                return Ok(Effect::Call(env, index));
            },
            I::RET => return Ok(Effect::Return),
        }

        Ok(Effect::Continue)
    }
}

/// Strips the labels off of a statement.
fn unlabel(mut stmt: &Token) -> &Token {
    while let Token::Binary(b) = stmt {
        if b.ty() != TokenType::JumpPoint { break; }
        stmt = b.second();
    }
    stmt
}

#[cfg(test)]
mod tests {
    use crate::compile::{compile, CompileOptions, Program};
    use crate::sim::instr::InstructionSet;

    use super::{ExitCondition, Interpreter, SimErr};

    fn program(src: &str, iset: InstructionSet) -> Program {
        let opts = CompileOptions { instruction_set: iset, preprocess: false, ..Default::default() };
        compile(src, &opts).into_program().unwrap()
    }

    fn run(src: &str) -> (Result<ExitCondition, SimErr>, i64) {
        let program = program(src, InstructionSet::Mima);
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();
        let result = interp.run();
        (result, interp.mima.accumulator.int_value())
    }
    fn run_x(src: &str) -> (Result<ExitCondition, SimErr>, i64) {
        let program = program(src, InstructionSet::MimaX);
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();
        let result = interp.run();
        (result, interp.mima.accumulator.int_value())
    }

    #[test]
    fn test_basic() {
        assert_eq!(run("LDC(5); HALT()"), (Ok(ExitCondition::Halt), 5));
        assert_eq!(run("LDC(5)"), (Ok(ExitCondition::EndOfProgram), 5));
        assert_eq!(run("LDC(5); HALT(); LDC(6)"), (Ok(ExitCondition::Halt), 5));
        assert_eq!(run(""), (Ok(ExitCondition::EndOfProgram), 0));
    }

    #[test]
    fn test_memory() {
        let src = "
            §define a, b = 10;
            LDC(7); STV(a);
            LDC(3); STV(b);
            LDV(a); ADD(b);
            HALT();
        ";
        assert_eq!(run(src), (Ok(ExitCondition::Halt), 10));

        let src = "
            §define ptr = 1;
            LDC(50); STV(ptr);
            LDC(9); STIV(ptr);
            LDC(0); LDIV(ptr);
        ";
        assert_eq!(run(src), (Ok(ExitCondition::EndOfProgram), 9));
    }

    #[test]
    fn test_reserved_addresses() {
        let src = "§define a, b; LDC(1); STV(a); LDC(2); STV(b); LDV(a)";
        let program = program(src, InstructionSet::Mima);
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();
        interp.run().unwrap();

        assert_eq!(interp.mima.accumulator.int_value(), 1);
        assert_eq!(interp.mima.memory.get(-1).map(|w| w.int_value()), Some(1));
        assert_eq!(interp.mima.memory.get(-2).map(|w| w.int_value()), Some(2));
    }

    #[test]
    fn test_reserved_addresses_across_calls() {
        let src = "
            { §define t; LDC(5); STV(t); CALL(f); LDV(t); HALT() }
            f: { §define u; LDC(9); STV(u); RET() }
        ";
        let program = program(src, InstructionSet::MimaX);
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();
        assert_eq!(interp.run(), Ok(ExitCondition::Halt));

        assert_eq!(interp.mima.accumulator.int_value(), 5);
        assert_eq!(interp.mima.memory.get(-1).map(|w| w.int_value()), Some(5));
        assert_eq!(interp.mima.memory.get(-2).map(|w| w.int_value()), Some(9));
    }

    #[test]
    fn test_alu_instructions() {
        let src = "
            §define x = 0;
            LDC(6); STV(x);
            LDC(3); AND(x);
        ";
        assert_eq!(run(src).1, 2);
        assert_eq!(run("§define x = 0; LDC(6); STV(x); LDC(3); OR(x)").1, 7);
        assert_eq!(run("§define x = 0; LDC(6); STV(x); LDC(3); XOR(x)").1, 5);
        assert_eq!(run("§define x = 0; LDC(6); STV(x); EQL(x)").1, -1);
        assert_eq!(run("§define x = 0; LDC(6); STV(x); LDC(5); EQL(x)").1, 0);
        assert_eq!(run("LDC(0); NOT()").1, -1);
        assert_eq!(run("LDC(1); RAR()").1, -(1 << 23));
    }

    #[test]
    fn test_loop() {
        // sums 5 + 4 + 3 + 2 + 1
        let src = "
            §define i = 0, sum = 1, minus_one = 2;
            §const count = 5;
            LDC(0); NOT(); STV(minus_one);
            LDC(count); STV(i);
            loop: LDV(sum); ADD(i); STV(sum);
                  LDV(i); ADD(minus_one); STV(i);
                  JMN(done);
                  JMP(loop);
            done: LDV(sum);
                  HALT();
        ";
        assert_eq!(run(src), (Ok(ExitCondition::Halt), 15));
    }

    #[test]
    fn test_jumps_between_scopes() {
        let src = "
            LDC(1);
            {
                §define x = 0;
                LDC(2);
                JMP(out);
                LDC(3);
            }
            LDC(4);
            out: HALT();
        ";
        let program = program(src, InstructionSet::Mima);
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();
        assert_eq!(interp.run(), Ok(ExitCondition::Halt));
        assert_eq!(interp.mima.accumulator.int_value(), 2);
        assert_eq!(interp.environments().live(), 1);

        // scopes are exited when they run out of statements
        assert_eq!(run("{ LDC(1); { LDC(2) } } LDC(3)"), (Ok(ExitCondition::EndOfProgram), 3));
    }

    #[test]
    fn test_call_and_return() {
        let src = "
            LDC(3);
            CALL(double);
            CALL(double);
            HALT();
            double: {
                §define t = 0;
                STV(t); ADD(t);
                RET();
            }
        ";
        let program = program(src, InstructionSet::MimaX);
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();
        assert_eq!(interp.run(), Ok(ExitCondition::Halt));
        assert_eq!(interp.mima.accumulator.int_value(), 12);
        assert!(interp.frames().is_empty());
        assert_eq!(interp.environments().live(), 1);
    }

    #[test]
    fn test_stack_pointer() {
        let src = "
            LDC(50); STSP();
            LDC(7); STVR(1, SP());
            LDC(0); LDVR(SP(), 1);
        ";
        assert_eq!(run_x(src), (Ok(ExitCondition::EndOfProgram), 7));
        assert_eq!(run_x("LDC(9); STSP(); LDC(0); LDSP()").1, 9);
        assert_eq!(run_x("LDC(9); ADC(-10)").1, -1);
    }

    #[test]
    fn test_errors() {
        assert_eq!(run("FOO()").0, Err(SimErr::UnknownInstruction("FOO".to_string())));
        assert_eq!(run("CALL(a); a: HALT()").0, Err(SimErr::UnknownInstruction("CALL".to_string())));
        assert!(matches!(run("LDC(1, 2)").0, Err(SimErr::ArgumentCount { expected: 1, found: 2, .. })));
        assert_eq!(run("LDV(x)").0, Err(SimErr::UndefinedIdentifier("x".to_string())));
        assert!(matches!(run("LDC(-1)").0, Err(SimErr::NegativeConstant(_))));
        assert_eq!(run("LDV(-1)").0, Err(SimErr::IllegalAddress(-1)));
        assert_eq!(run_x("LDC(1); STVR(5, -6)").0, Err(SimErr::IllegalAddress(-1)));
        assert_eq!(
            run_x("LDC(1); STVR(9223372036854775807, 1)").0,
            Err(SimErr::AddressOverflow { base: i64::MAX, offset: 1 })
        );
        assert!(matches!(run("a: JMP(5)").0, Err(SimErr::InvalidArgument { expected: "a label", .. })));
        assert_eq!(run("§define a; §define a; HALT()").0, Err(SimErr::AlreadyDefined("a".to_string())));
        assert_eq!(run("{ a: HALT(); a: HALT() }").0, Err(SimErr::AlreadyDefined("a".to_string())));
        assert_eq!(run_x("RET()").0, Err(SimErr::EmptyReturnStack));
        assert!(matches!(run_x("LDC(HALT())").0, Err(SimErr::NotAValue(_))));

        // negative constants are fine when constants are full words
        assert_eq!(run_x("LDC(-1)"), (Ok(ExitCondition::EndOfProgram), -1));
    }

    #[test]
    fn test_binary_literals() {
        assert_eq!(run("LDC(~1010)").1, 10);
        assert_eq!(run("§const m = ~11; LDC(m)").1, 3);
        assert_eq!(run("LDC(~111111111111111111111)").0, Err(SimErr::BinaryTooLong("111111111111111111111".to_string())));
    }

    #[test]
    fn test_stepping() {
        let src = "
            LDC(1);
            CALL(f);
            LDC(3);
            HALT();
            f: LDC(2);
               RET();
        ";
        let program = program(src, InstructionSet::MimaX);
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();

        assert_eq!(interp.step_in(), Ok(ExitCondition::Interrupted));
        assert_eq!(interp.mima.accumulator.int_value(), 1);

        // step over the whole call
        assert_eq!(interp.step_over(), Ok(ExitCondition::Interrupted));
        assert_eq!(interp.mima.accumulator.int_value(), 2);
        assert_eq!(interp.instructions_run, 4);
        assert!(interp.frames().is_empty());

        interp.reset().unwrap();
        interp.run_with_limit(2).unwrap();
        assert_eq!(interp.frames().len(), 1);
        assert_eq!(interp.step_out(), Ok(ExitCondition::Interrupted));
        assert!(interp.frames().is_empty());
        assert_eq!(interp.current_statement().map(|t| t.to_string()), Some("LDC(3)".to_string()));

        assert_eq!(interp.run(), Ok(ExitCondition::Halt));
        assert_eq!(interp.run(), Ok(ExitCondition::Halt));
        assert_eq!(interp.instructions_run, 6);
    }

    #[test]
    fn test_observer() {
        let program = program("§define a = 3; LDC(4); STV(a); LDV(a)", InstructionSet::Mima);
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();
        interp.run_with_limit(3).unwrap();

        assert!(interp.observer.get_mem_accesses(3).modified());
        interp.step_in().unwrap();
        let set = interp.observer.get_mem_accesses(3);
        assert!(set.read() && !set.written());

        let snapshot = interp.snapshot();
        assert_eq!(snapshot.accumulator.int_value(), 4);
        assert_eq!(snapshot.memory.get(&3).map(|w| w.int_value()), Some(4));
        assert_eq!(snapshot.exit, Some(ExitCondition::EndOfProgram));
    }
}
