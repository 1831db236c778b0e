//! Utilities to debug execution.
//!
//! This module consists of:
//! - [`DebugHook`]: A hook called by the [`Interpreter`] before every statement.
//! - [`Breakpoint`]: Conditions which cause execution to pause.
//! - [`DebugController`]: Runs a program on a worker thread, which can be paused, resumed, and stopped.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mima::compile::{compile, CompileOptions};
//! use mima::sim::ExitCondition;
//! use mima::sim::debug::{Breakpoint, ControllerState, DebugController};
//!
//! let program = compile("LDC(1); LDC(2); HALT()", &CompileOptions::default())
//!     .into_program()
//!     .unwrap();
//! let mut controller = DebugController::new(Arc::new(program), Default::default());
//!
//! controller.add_breakpoint(Breakpoint::Offset(8));
//! controller.start();
//! assert_eq!(controller.wait_idle(Some(Duration::from_secs(5))), ControllerState::Paused);
//! assert_eq!(controller.snapshot().unwrap().accumulator.int_value(), 1);
//!
//! controller.resume();
//! assert_eq!(controller.stop(), Some(Ok(ExitCondition::Halt)));
//! ```
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;
use std::ops::ControlFlow;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as cbc;

use crate::ast::{Token, TokenType};
use crate::compile::Program;

use super::observer::AccessSet;
use super::word::MachineWord;
use super::{ExitCondition, Interpreter, SimErr, SimFlags};

/// A hook into the [`Interpreter`]'s execution loop.
///
/// See [`Interpreter::run_with`].
pub trait DebugHook {
    /// Called before a statement is executed.
    ///
    /// If this breaks, execution stops before the statement
    /// (and [`ExitCondition::Interrupted`] is returned).
    fn before_statement(&mut self, stmt: &Token, interp: &Interpreter<'_>) -> ControlFlow<()>;

    /// Called after `HALT` is executed, with the value of the accumulator.
    fn on_halt(&mut self, _accumulator: MachineWord) {}
}

/// The state of the machine at a point in execution.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MachineSnapshot {
    /// The accumulator.
    pub accumulator: MachineWord,
    /// The stack pointer.
    pub stack_pointer: MachineWord,
    /// Every address in memory.
    pub memory: BTreeMap<i64, MachineWord>,
    /// The addresses accessed by the last executed statement.
    pub accesses: Vec<(i64, AccessSet)>,
    /// The offset of the next statement.
    pub offset: Option<usize>,
    /// The line (zero-based) of the next statement.
    pub line: Option<usize>,
    /// The number of statements executed.
    pub instructions_run: u64,
    /// How the program ended, if it has ended.
    pub exit: Option<ExitCondition>
}

/// Common breakpoints.
#[derive(PartialEq, Eq, Hash, Clone)]
pub enum Breakpoint {
    /// Break before the statement starting at the given offset.
    ///
    /// A labelled statement can be matched with the offset of its first label
    /// or the offset of the statement itself.
    Offset(usize),

    /// Break before any statement starting on the given line (zero-based).
    Line(usize),

    /// Break when the accumulator holds a given value.
    Accumulator(Comparator),

    /// Break when the provided memory address holds a given value.
    Mem {
        /// Address to check.
        addr: i64,
        /// Predicate to break against.
        value: Comparator
    },
}

impl Breakpoint where Breakpoint: Send + Sync { /* assert Breakpoint is send/sync */ }

impl Breakpoint {
    /// Checks if a break should occur before the given statement.
    pub fn check(&self, stmt: &Token, interp: &Interpreter<'_>) -> bool {
        match self {
            Breakpoint::Offset(offset) => {
                std::iter::successors(Some(stmt), |t| match t {
                    Token::Binary(b) if b.ty() == TokenType::JumpPoint => Some(b.second()),
                    _ => None
                })
                .any(|t| t.offset() == *offset)
            },
            Breakpoint::Line(line) => stmt.line() == Some(*line),
            Breakpoint::Accumulator(cmp) => cmp.check(interp.mima.accumulator.int_value()),
            Breakpoint::Mem { addr, value: cmp } => {
                // reading would create the address, so missing addresses read as zero
                let word = interp.mima.memory.get(*addr).map_or(0, |w| w.int_value());
                cmp.check(word)
            },
        }
    }

    fn fmt_bp(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Offset(offset) => write!(f, "offset == {offset}"),
            Self::Line(line) => write!(f, "line == {}", line + 1),
            Self::Accumulator(value) => {
                f.write_str("accumulator ")?;
                value.fmt_cmp(f)
            },
            Self::Mem { addr, value } => {
                write!(f, "mem[{addr}] ")?;
                value.fmt_cmp(f)
            },
        }
    }
}
impl std::fmt::Debug for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Breakpoint(")?;
        self.fmt_bp(f)?;
        f.write_char(')')
    }
}

/// Predicate checking a value against a fixed operand.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum Comparator {
    /// Never breaks.
    Never,
    /// Break if the value is less than the provided value.
    Lt(i64),
    /// Break if the value is equal to the provided value.
    Eq(i64),
    /// Break if the value is less than or equal to the provided value.
    Le(i64),
    /// Break if the value is greater than the provided value.
    Gt(i64),
    /// Break if the value is not equal to the provided value.
    Ne(i64),
    /// Break if the value is greater than or equal to the provided value.
    Ge(i64),
    /// Always breaks.
    Always
}
impl Comparator {
    /// Checks if the operand passes the comparator.
    pub fn check(&self, operand: i64) -> bool {
        match *self {
            Comparator::Never  => false,
            Comparator::Lt(r)  => operand < r,
            Comparator::Eq(r)  => operand == r,
            Comparator::Le(r)  => operand <= r,
            Comparator::Gt(r)  => operand > r,
            Comparator::Ne(r)  => operand != r,
            Comparator::Ge(r)  => operand >= r,
            Comparator::Always => true,
        }
    }

    fn fmt_cmp(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparator::Never  => f.write_str("never"),
            Comparator::Lt(r)  => write!(f, "< {r}"),
            Comparator::Eq(r)  => write!(f, "== {r}"),
            Comparator::Le(r)  => write!(f, "<= {r}"),
            Comparator::Gt(r)  => write!(f, "> {r}"),
            Comparator::Ne(r)  => write!(f, "!= {r}"),
            Comparator::Ge(r)  => write!(f, ">= {r}"),
            Comparator::Always => f.write_str("always"),
        }
    }
}

/// The state of a [`DebugController`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ControllerState {
    /// No program is executing.
    Stopped,
    /// The worker thread is executing the program.
    Running,
    /// The worker thread is waiting to be resumed.
    Paused
}

/// Messages sent from the worker thread.
///
/// Events are queued until they are received, so a long session should drain
/// [`DebugController::events`] regularly. The full machine state at a pause is
/// available through [`DebugController::snapshot`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DebugEvent {
    /// Execution paused before a statement.
    Paused {
        /// The offset of the statement about to execute.
        offset: usize,
        /// The line of the statement about to execute.
        line: Option<usize>
    },
    /// `HALT` was executed, with the final value of the accumulator.
    Halted(MachineWord),
    /// The worker finished without an error.
    Finished(ExitCondition),
    /// The worker stopped because of a runtime error.
    Failed(SimErr)
}

#[derive(Debug)]
struct Control {
    state: ControllerState,
    should_terminate: bool,
    auto_pause: bool,
    pause_requested: bool,
    breakpoints: HashSet<Breakpoint>,
    snapshot: Option<MachineSnapshot>
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    cvar: Condvar
}
impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
    fn wait<'g>(&self, guard: MutexGuard<'g, Control>) -> MutexGuard<'g, Control> {
        self.cvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

/// The hook the worker thread runs with.
struct WorkerHook {
    shared: Arc<Shared>,
    events: cbc::Sender<DebugEvent>
}
impl DebugHook for WorkerHook {
    fn before_statement(&mut self, stmt: &Token, interp: &Interpreter<'_>) -> ControlFlow<()> {
        let mut ctrl = self.shared.lock();
        if ctrl.should_terminate {
            return ControlFlow::Break(());
        }

        let hit = std::mem::take(&mut ctrl.pause_requested)
            || ctrl.auto_pause
            || ctrl.breakpoints.iter().any(|bp| bp.check(stmt, interp));

        if hit {
            log::debug!("pausing before statement at offset {}", stmt.offset());
            ctrl.state = ControllerState::Paused;
            ctrl.snapshot = Some(interp.snapshot());
            self.shared.cvar.notify_all();
            // the receiver may be gone, which is fine
            let _ = self.events.send(DebugEvent::Paused { offset: stmt.offset(), line: stmt.line() });

            while ctrl.state == ControllerState::Paused {
                ctrl = self.shared.wait(ctrl);
            }
            if ctrl.should_terminate {
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    fn on_halt(&mut self, accumulator: MachineWord) {
        let _ = self.events.send(DebugEvent::Halted(accumulator));
    }
}

/// Executes a program on a worker thread, allowing it to be paused and resumed.
///
/// The worker checks for pauses and termination before every statement.
/// A statement in progress is never interrupted.
#[derive(Debug)]
pub struct DebugController {
    program: Arc<Program>,
    flags: SimFlags,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Result<ExitCondition, SimErr>>>,
    events_tx: cbc::Sender<DebugEvent>,
    events_rx: cbc::Receiver<DebugEvent>
}
impl DebugController {
    /// Creates a new controller for the given program.
    ///
    /// The program does not start until [`DebugController::start`] is called.
    pub fn new(program: Arc<Program>, flags: SimFlags) -> Self {
        let (events_tx, events_rx) = cbc::unbounded();
        let control = Control {
            state: ControllerState::Stopped,
            should_terminate: false,
            auto_pause: false,
            pause_requested: false,
            breakpoints: HashSet::new(),
            snapshot: None
        };

        Self {
            program,
            flags,
            shared: Arc::new(Shared { control: Mutex::new(control), cvar: Condvar::new() }),
            worker: None,
            events_tx,
            events_rx
        }
    }

    /// The program being debugged.
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// The current state.
    pub fn state(&self) -> ControllerState {
        self.shared.lock().state
    }

    /// A receiver for the events sent by the worker thread.
    ///
    /// The channel is unbounded and shared by every receiver,
    /// so events stay queued until one of them receives them.
    pub fn events(&self) -> cbc::Receiver<DebugEvent> {
        self.events_rx.clone()
    }

    /// The machine state at the last pause, or at the end of the last execution.
    pub fn snapshot(&self) -> Option<MachineSnapshot> {
        self.shared.lock().snapshot.clone()
    }

    /// Adds a breakpoint, returning whether it was newly added.
    ///
    /// Breakpoints can be changed in any state.
    pub fn add_breakpoint(&self, bp: Breakpoint) -> bool {
        self.shared.lock().breakpoints.insert(bp)
    }
    /// Removes a breakpoint, returning whether it was present.
    pub fn remove_breakpoint(&self, bp: &Breakpoint) -> bool {
        self.shared.lock().breakpoints.remove(bp)
    }
    /// Replaces every breakpoint.
    pub fn set_breakpoints(&self, bps: impl IntoIterator<Item=Breakpoint>) {
        self.shared.lock().breakpoints = bps.into_iter().collect();
    }
    /// Removes every breakpoint.
    pub fn clear_breakpoints(&self) {
        self.shared.lock().breakpoints.clear();
    }
    /// The current breakpoints.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.shared.lock().breakpoints.iter().cloned().collect()
    }

    /// Sets whether execution pauses before every statement.
    pub fn set_auto_pause(&self, auto_pause: bool) {
        self.shared.lock().auto_pause = auto_pause;
    }

    /// Starts executing the program from the beginning on a new worker thread.
    ///
    /// This returns false (and does nothing) if a worker is already running or paused.
    pub fn start(&mut self) -> bool {
        {
            let mut ctrl = self.shared.lock();
            if ctrl.state != ControllerState::Stopped {
                return false;
            }
            ctrl.state = ControllerState::Running;
            ctrl.should_terminate = false;
            ctrl.pause_requested = false;
            ctrl.snapshot = None;
        }
        // a previous worker has already finished, so this does not block
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        let program = Arc::clone(&self.program);
        let flags = self.flags;
        let shared = Arc::clone(&self.shared);
        let events = self.events_tx.clone();

        log::debug!("starting debug worker");
        let handle = std::thread::spawn(move || {
            let mut hook = WorkerHook { shared: Arc::clone(&shared), events: events.clone() };

            let result = Interpreter::new(&program, flags).and_then(|mut interp| {
                let result = interp.run_with(&mut hook);
                shared.lock().snapshot = Some(interp.snapshot());
                result
            });

            let _ = match &result {
                Ok(exit) => events.send(DebugEvent::Finished(*exit)),
                Err(e) => events.send(DebugEvent::Failed(e.clone())),
            };

            let mut ctrl = shared.lock();
            ctrl.state = ControllerState::Stopped;
            shared.cvar.notify_all();
            log::debug!("debug worker finished: {result:?}");

            result
        });
        self.worker = Some(handle);

        true
    }

    /// Resumes a paused worker.
    ///
    /// This returns false (and does nothing) if the worker is not paused.
    pub fn resume(&self) -> bool {
        let mut ctrl = self.shared.lock();
        if ctrl.state != ControllerState::Paused {
            return false;
        }
        ctrl.state = ControllerState::Running;
        self.shared.cvar.notify_all();
        true
    }

    /// Resumes a paused worker for exactly one statement.
    ///
    /// This returns false (and does nothing) if the worker is not paused.
    pub fn step(&self) -> bool {
        let mut ctrl = self.shared.lock();
        if ctrl.state != ControllerState::Paused {
            return false;
        }
        ctrl.pause_requested = true;
        ctrl.state = ControllerState::Running;
        self.shared.cvar.notify_all();
        true
    }

    /// Asks a running worker to pause before its next statement.
    ///
    /// This returns false (and does nothing) if the worker is not running.
    pub fn request_pause(&self) -> bool {
        let mut ctrl = self.shared.lock();
        if ctrl.state != ControllerState::Running {
            return false;
        }
        ctrl.pause_requested = true;
        true
    }

    /// Blocks while the worker is running, returning the state once it pauses or stops.
    ///
    /// If a timeout is provided, this returns after at most that long (possibly still [`ControllerState::Running`]).
    pub fn wait_idle(&self, timeout: Option<Duration>) -> ControllerState {
        let ctrl = self.shared.lock();
        let running = |c: &mut Control| c.state == ControllerState::Running;

        let ctrl = match timeout {
            Some(t) => self.shared.cvar.wait_timeout_while(ctrl, t, running)
                .unwrap_or_else(PoisonError::into_inner)
                .0,
            None => self.shared.cvar.wait_while(ctrl, running)
                .unwrap_or_else(PoisonError::into_inner),
        };
        ctrl.state
    }

    /// Stops the worker, blocking until it finishes.
    ///
    /// A paused worker is resumed so that it can observe the stop.
    /// This returns the result of the worker, or `None` if there was no worker to stop.
    pub fn stop(&mut self) -> Option<Result<ExitCondition, SimErr>> {
        let handle = self.worker.take()?;
        {
            let mut ctrl = self.shared.lock();
            ctrl.should_terminate = true;
            ctrl.auto_pause = false;
            if ctrl.state == ControllerState::Paused {
                ctrl.state = ControllerState::Running;
            }
            self.shared.cvar.notify_all();
        }

        log::debug!("stopping debug worker");
        match handle.join() {
            Ok(result) => Some(result),
            Err(_) => {
                log::error!("debug worker panicked");
                self.shared.lock().state = ControllerState::Stopped;
                None
            }
        }
    }
}
impl Drop for DebugController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::compile::{compile, CompileOptions, Program};
    use crate::sim::instr::InstructionSet;
    use crate::sim::{ExitCondition, SimErr};

    use super::{Breakpoint, Comparator, ControllerState, DebugController, DebugEvent};

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

    fn program(src: &str) -> Arc<Program> {
        let opts = CompileOptions { instruction_set: InstructionSet::MimaX, preprocess: false, ..Default::default() };
        Arc::new(compile(src, &opts).into_program().unwrap())
    }

    #[test]
    fn test_breakpoint_on_third_statement() {
        let program = program("LDC(1); LDC(2); LDC(3); LDC(4); HALT()");
        let third = program.token().get(2).unwrap().offset();

        let mut controller = DebugController::new(Arc::clone(&program), Default::default());
        controller.add_breakpoint(Breakpoint::Offset(third));
        assert!(controller.start());

        assert_eq!(controller.wait_idle(TIMEOUT), ControllerState::Paused);
        let snapshot = controller.snapshot().unwrap();
        assert_eq!(snapshot.instructions_run, 2);
        assert_eq!(snapshot.accumulator.int_value(), 2);
        assert_eq!(snapshot.offset, Some(third));

        assert!(controller.resume());
        assert_eq!(controller.stop(), Some(Ok(ExitCondition::Halt)));
        assert_eq!(controller.state(), ControllerState::Stopped);

        let events: Vec<_> = controller.events().try_iter().collect();
        assert_eq!(events[0], DebugEvent::Paused { offset: third, line: Some(0) });
        assert!(matches!(events[1], DebugEvent::Halted(w) if w.int_value() == 4));
        assert!(matches!(events[2], DebugEvent::Finished(ExitCondition::Halt)));
    }

    #[test]
    fn test_stepping() {
        let program = program("LDC(1); LDC(2); LDC(3)");
        let mut controller = DebugController::new(program, Default::default());
        controller.set_auto_pause(true);
        controller.start();

        assert_eq!(controller.wait_idle(TIMEOUT), ControllerState::Paused);
        assert_eq!(controller.snapshot().unwrap().instructions_run, 0);

        controller.set_auto_pause(false);
        assert!(controller.step());
        assert_eq!(controller.wait_idle(TIMEOUT), ControllerState::Paused);
        assert_eq!(controller.snapshot().unwrap().instructions_run, 1);

        // stopping a paused worker interrupts it
        assert_eq!(controller.stop(), Some(Ok(ExitCondition::Interrupted)));
    }

    #[test]
    fn test_pause_infinite_loop() {
        let program = program("loop: JMP(loop)");
        let mut controller = DebugController::new(program, Default::default());
        controller.start();
        assert!(!controller.start());

        assert_eq!(controller.wait_idle(Some(Duration::from_millis(20))), ControllerState::Running);
        assert!(controller.request_pause());
        assert_eq!(controller.wait_idle(TIMEOUT), ControllerState::Paused);

        assert!(controller.resume());
        assert_eq!(controller.stop(), Some(Ok(ExitCondition::Interrupted)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut controller = DebugController::new(program("HALT()"), Default::default());
        assert_eq!(controller.stop(), None);

        controller.start();
        assert_eq!(controller.wait_idle(TIMEOUT), ControllerState::Stopped);
        assert_eq!(controller.stop(), Some(Ok(ExitCondition::Halt)));
        assert_eq!(controller.stop(), None);

        // and it can be restarted
        assert!(controller.start());
        assert_eq!(controller.stop().map(|r| r.is_ok()), Some(true));
    }

    #[test]
    fn test_failure() {
        let mut controller = DebugController::new(program("LDC(1); RET()"), Default::default());
        controller.start();
        assert_eq!(controller.wait_idle(TIMEOUT), ControllerState::Stopped);

        let events: Vec<_> = controller.events().try_iter().collect();
        assert!(matches!(events.last(), Some(DebugEvent::Failed(SimErr::EmptyReturnStack))));
        assert_eq!(controller.stop(), Some(Err(SimErr::EmptyReturnStack)));
        assert_eq!(controller.snapshot().map(|s| s.accumulator.int_value()), Some(1));
    }

    #[test]
    fn test_value_breakpoints() {
        let program = program("
            LDC(1);
            LDC(5);
            STV(0);
            LDC(7);
            HALT()
        ");
        let mut controller = DebugController::new(program, Default::default());
        controller.set_breakpoints([
            Breakpoint::Mem { addr: 0, value: Comparator::Eq(5) },
            Breakpoint::Line(99)
        ]);
        assert_eq!(controller.breakpoints().len(), 2);
        controller.start();

        assert_eq!(controller.wait_idle(TIMEOUT), ControllerState::Paused);
        assert_eq!(controller.snapshot().unwrap().line, Some(4));

        controller.clear_breakpoints();
        controller.add_breakpoint(Breakpoint::Accumulator(Comparator::Gt(100)));
        controller.resume();
        assert_eq!(controller.wait_idle(TIMEOUT), ControllerState::Stopped);
        assert_eq!(controller.stop(), Some(Ok(ExitCondition::Halt)));
    }
}
