//! Scopes of the interpreter.
//!
//! Every lexical scope being executed has an [`Environment`], which binds
//! the names declared in that scope and tracks which statement is executed next.
//!
//! Environments are stored in an arena ([`Environments`]) and refer to each other
//! by [`EnvId`]. A child refers to its parent, but a parent never refers to its children.
//! Each environment is reference counted: it is kept alive by
//!
//! - being the current environment,
//! - being the parent of a live environment,
//! - being the target of a return frame.
//!
//! When the last reference is released, the environment is released as well
//! (which in turn releases its parent's reference).

use std::collections::HashMap;

use crate::ast::ProgramToken;

use super::instr::{Instruction, InstructionSet};
use super::word::MachineWord;
use super::SimErr;

/// A handle to an environment inside of [`Environments`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct EnvId(usize);

/// The bindings and execution position of one scope.
#[derive(Debug)]
pub struct Environment<'p> {
    program: &'p ProgramToken,
    parent: Option<EnvId>,
    cursor: usize,
    variables: HashMap<String, i64>,
    constants: HashMap<String, MachineWord>,
    jumps: HashMap<String, usize>,
    functions: HashMap<String, Instruction>,
    refs: usize
}
impl<'p> Environment<'p> {
    fn new(program: &'p ProgramToken, parent: Option<EnvId>) -> Result<Self, SimErr> {
        let mut jumps = HashMap::with_capacity(program.jumps().len());
        for (label, index) in program.jumps() {
            if jumps.insert(label.clone(), *index).is_some() {
                return Err(SimErr::AlreadyDefined(label.clone()));
            }
        }

        Ok(Self {
            program,
            parent,
            cursor: 0,
            variables: HashMap::new(),
            constants: HashMap::new(),
            jumps,
            functions: HashMap::new(),
            refs: 1
        })
    }

    /// The scope this environment executes.
    pub fn program(&self) -> &'p ProgramToken {
        self.program
    }
    /// The enclosing environment.
    pub fn parent(&self) -> Option<EnvId> {
        self.parent
    }
    /// The index of the next statement to execute.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether a name is bound in this scope (ignoring the parents).
    fn is_bound(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.constants.contains_key(name)
    }

    /// Binds a variable to an address.
    pub fn define_variable(&mut self, name: &str, address: i64) -> Result<(), SimErr> {
        if self.is_bound(name) {
            return Err(SimErr::AlreadyDefined(name.to_string()));
        }
        self.variables.insert(name.to_string(), address);
        Ok(())
    }

    /// Binds a constant to a value.
    pub fn define_constant(&mut self, name: &str, value: MachineWord) -> Result<(), SimErr> {
        if self.is_bound(name) {
            return Err(SimErr::AlreadyDefined(name.to_string()));
        }
        self.constants.insert(name.to_string(), value);
        Ok(())
    }
}

/// The arena holding every live environment.
///
/// The arena also hands out the negative addresses of variables defined without a value.
/// These are shared by every scope and never reused, so a scope's variables
/// cannot alias the variables of any other scope (including a caller's).
///
/// ```
/// use mima::parse::parse_program;
/// use mima::sim::env::Environments;
/// use mima::sim::instr::InstructionSet;
///
/// let (program, _) = parse_program("a: LDC(1); { b: HALT() }");
/// let mut envs = Environments::new(&program, InstructionSet::Mima).unwrap();
/// let root = envs.current();
///
/// let Some(inner) = program.get(1).and_then(|t| t.as_program()) else { unreachable!() };
/// envs.enter(inner).unwrap();
/// assert_eq!(envs.lookup_jump("a"), Some((root, 0)));
/// assert_eq!(envs.live(), 2);
///
/// envs.exit_scope();
/// assert_eq!(envs.current(), root);
/// assert_eq!(envs.live(), 1);
/// ```
#[derive(Debug)]
pub struct Environments<'p> {
    slots: Vec<Option<Environment<'p>>>,
    free: Vec<usize>,
    current: EnvId,
    /// The last automatically reserved address.
    reserved: i64
}
impl<'p> Environments<'p> {
    /// Creates the root environment of a program.
    ///
    /// The root environment holds the instructions of the given instruction set.
    pub fn new(program: &'p ProgramToken, iset: InstructionSet) -> Result<Self, SimErr> {
        let mut root = Environment::new(program, None)?;
        root.functions = iset.instructions()
            .iter()
            .map(|&i| (i.name().to_string(), i))
            .collect();

        Ok(Self { slots: vec![Some(root)], free: vec![], current: EnvId(0), reserved: 0 })
    }

    fn alloc(&mut self, env: Environment<'p>) -> EnvId {
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(env);
                EnvId(i)
            },
            None => {
                self.slots.push(Some(env));
                EnvId(self.slots.len() - 1)
            }
        }
    }

    /// Gets an environment, if it is still live.
    pub fn get(&self, id: EnvId) -> Option<&Environment<'p>> {
        self.slots.get(id.0)?.as_ref()
    }
    fn get_mut(&mut self, id: EnvId) -> Option<&mut Environment<'p>> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    /// The handle of the current environment.
    pub fn current(&self) -> EnvId {
        self.current
    }
    /// The current environment.
    pub fn current_env(&self) -> &Environment<'p> {
        &self[self.current]
    }
    /// The current environment, mutably.
    pub fn current_env_mut(&mut self) -> &mut Environment<'p> {
        let id = self.current;
        &mut self[id]
    }

    /// The number of live environments.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Adds a reference to an environment.
    pub fn retain(&mut self, id: EnvId) {
        if let Some(env) = self.get_mut(id) {
            env.refs += 1;
        }
    }

    /// Removes a reference from an environment,
    /// releasing it (and possibly its ancestors) once nothing refers to it.
    pub fn release(&mut self, id: EnvId) {
        let mut next = Some(id);
        while let Some(id) = next.take() {
            let Some(env) = self.get_mut(id) else { break };
            env.refs -= 1;
            if env.refs == 0 {
                next = env.parent;
                self.slots[id.0] = None;
                self.free.push(id.0);
            }
        }
    }

    /// Enters a nested scope, making a new child of the current environment current.
    pub fn enter(&mut self, program: &'p ProgramToken) -> Result<EnvId, SimErr> {
        let parent = self.current;
        let child = Environment::new(program, Some(parent))?;

        // the child's reference to the parent replaces the current reference
        let id = self.alloc(child);
        self.current = id;
        Ok(id)
    }

    /// Exits the current scope, continuing after the scope's statement in the parent.
    ///
    /// This returns false (and does nothing) if the current environment is the root.
    pub fn exit_scope(&mut self) -> bool {
        let child = self.current;
        let Some(parent) = self[child].parent else { return false };

        self.retain(parent);
        self.current = parent;
        self.release(child);
        self.advance();
        true
    }

    /// Reserves the next free negative address (`-1`, `-2`, ...).
    pub fn reserve(&mut self) -> i64 {
        self.reserved -= 1;
        self.reserved
    }

    /// Moves the current cursor to the next statement.
    pub fn advance(&mut self) {
        self.current_env_mut().cursor += 1;
    }

    /// Continues execution at the given statement of the given environment.
    pub fn jump(&mut self, target: EnvId, index: usize) {
        self.retain(target);
        let old = std::mem::replace(&mut self.current, target);
        self.release(old);

        self.current_env_mut().cursor = index;
    }

    /// Walks up from the current environment, returning the first result of `f`.
    fn find<T>(&self, mut f: impl FnMut(EnvId, &Environment<'p>) -> Option<T>) -> Option<T> {
        let mut next = Some(self.current);
        while let Some(id) = next {
            let env = self.get(id)?;
            if let Some(t) = f(id, env) {
                return Some(t);
            }
            next = env.parent;
        }
        None
    }

    /// Finds a label, returning the environment declaring it and the index of the labelled statement.
    pub fn lookup_jump(&self, name: &str) -> Option<(EnvId, usize)> {
        self.find(|id, env| env.jumps.get(name).map(|&i| (id, i)))
    }
    /// Finds the address bound to a variable.
    pub fn lookup_variable(&self, name: &str) -> Option<i64> {
        self.find(|_, env| env.variables.get(name).copied())
    }
    /// Finds the value bound to a constant.
    pub fn lookup_constant(&self, name: &str) -> Option<MachineWord> {
        self.find(|_, env| env.constants.get(name).copied())
    }
    /// Finds an instruction by name.
    pub fn lookup_function(&self, name: &str) -> Option<Instruction> {
        self.find(|_, env| env.functions.get(name).copied())
    }
}
impl<'p> std::ops::Index<EnvId> for Environments<'p> {
    type Output = Environment<'p>;

    /// # Panics
    ///
    /// This panics if the environment has been released.
    fn index(&self, id: EnvId) -> &Self::Output {
        match self.get(id) {
            Some(env) => env,
            None => panic!("environment {} was released", id.0),
        }
    }
}
impl<'p> std::ops::IndexMut<EnvId> for Environments<'p> {
    fn index_mut(&mut self, id: EnvId) -> &mut Self::Output {
        match self.get_mut(id) {
            Some(env) => env,
            None => panic!("environment {} was released", id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::ProgramToken;
    use crate::parse::parse_program;
    use crate::sim::instr::{Instruction, InstructionSet};
    use crate::sim::word::MachineWord;
    use crate::sim::SimErr;

    use super::Environments;

    fn scope(program: &ProgramToken, index: usize) -> &ProgramToken {
        program.get(index).and_then(|t| t.as_program()).unwrap()
    }

    #[test]
    fn test_lookup_through_parents() {
        let (program, errors) = parse_program("outer: LDC(1); { inner: HALT() }");
        assert!(errors.is_empty());

        let mut envs = Environments::new(&program, InstructionSet::Mima).unwrap();
        let root = envs.current();
        envs.current_env_mut().define_variable("x", 5).unwrap();
        envs.current_env_mut().define_constant("c", MachineWord::from_value(3, 20)).unwrap();

        envs.advance();
        let child = envs.enter(scope(&program, 1)).unwrap();
        envs.current_env_mut().define_variable("y", 6).unwrap();

        assert_eq!(envs.lookup_jump("outer"), Some((root, 0)));
        assert_eq!(envs.lookup_jump("inner"), Some((child, 0)));
        assert_eq!(envs.lookup_variable("x"), Some(5));
        assert_eq!(envs.lookup_variable("y"), Some(6));
        assert_eq!(envs.lookup_constant("c").map(|w| w.int_value()), Some(3));
        assert_eq!(envs.lookup_function("HALT"), Some(Instruction::HALT));
        assert_eq!(envs.lookup_function("CALL"), None);

        envs.exit_scope();
        assert_eq!(envs.lookup_variable("y"), None);
        assert_eq!(envs.lookup_jump("inner"), None);
        assert_eq!(envs.current_env().cursor(), 2);
    }

    #[test]
    fn test_reservation() {
        let (program, _) = parse_program("{ HALT() } { HALT() }");
        let mut envs = Environments::new(&program, InstructionSet::Mima).unwrap();
        assert_eq!(envs.reserve(), -1);
        assert_eq!(envs.reserve(), -2);

        envs.enter(scope(&program, 0)).unwrap();
        assert_eq!(envs.reserve(), -3);
        envs.exit_scope();

        // sibling scopes never reuse an address
        envs.enter(scope(&program, 1)).unwrap();
        assert_eq!(envs.reserve(), -4);
    }

    #[test]
    fn test_duplicates() {
        let (program, _) = parse_program("a: LDC(1); a: HALT()");
        let err = Environments::new(&program, InstructionSet::Mima).unwrap_err();
        assert_eq!(err, SimErr::AlreadyDefined("a".to_string()));

        let (program, _) = parse_program("HALT()");
        let mut envs = Environments::new(&program, InstructionSet::Mima).unwrap();
        envs.current_env_mut().define_variable("a", 1).unwrap();
        assert!(envs.current_env_mut().define_constant("a", MachineWord::zero(20)).is_err());
    }

    #[test]
    fn test_release() {
        let (program, _) = parse_program("{ { HALT() } }");
        let mut envs = Environments::new(&program, InstructionSet::MimaX).unwrap();
        let root = envs.current();

        let a = envs.enter(scope(&program, 0)).unwrap();
        let b = envs.enter(scope(envs[a].program(), 0)).unwrap();
        assert_eq!(envs.live(), 3);

        // a return frame keeps the innermost scope alive
        envs.retain(b);
        envs.jump(root, 1);
        assert_eq!(envs.live(), 3);

        envs.release(b);
        assert_eq!(envs.live(), 1);
        assert_eq!(envs.current(), root);
        assert!(envs.get(a).is_none());
    }
}
