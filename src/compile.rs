//! Compiling Mima source code into a runnable [`Program`].
//!
//! Compilation runs the whole front end:
//! 1. `!input` directives are expanded ([`crate::parse::preprocess`]),
//! 2. the text is parsed ([`crate::parse::parse_program`]),
//! 3. the code checker looks for probable mistakes ([`crate::check`]).
//!
//! Errors never stop a stage early, so a [`Compilation`] reports every error in the source at once.
//!
//! ```
//! use mima::compile::{compile, CompileOptions};
//!
//! let compilation = compile("LDC(1); LDC(; HALT()", &CompileOptions::default());
//! assert_eq!(compilation.errors.len(), 1);
//! assert!(compilation.into_program().is_err());
//!
//! let program = compile("LDC(1); HALT()", &CompileOptions::default())
//!     .into_program()
//!     .unwrap();
//! assert_eq!(program.token().len(), 2);
//! ```

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::ast::ProgramToken;
use crate::check::{check_code, Warning};
use crate::parse::preprocess::{default_home_dir, preprocess, PreprocessOptions};
use crate::parse::{parse_program, ParseErr};
use crate::sim::instr::InstructionSet;

/// Configuration for [`compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// The instruction set the program is compiled for.
    ///
    /// By default, this is [`InstructionSet::Mima`].
    pub instruction_set: InstructionSet,

    /// The file the source was read from.
    ///
    /// Errors in this file are tagged with this path,
    /// and the file cannot include itself.
    ///
    /// By default, this is `None`.
    pub source_path: Option<PathBuf>,

    /// The directory `!input` paths are first resolved against.
    ///
    /// By default, this is the current directory.
    pub working_dir: PathBuf,

    /// The directory `!input` paths are resolved against when not found in the working directory.
    ///
    /// By default, this is `$HOME/.mima`.
    pub home_dir: PathBuf,

    /// Whether `!input` directives are expanded.
    ///
    /// By default, this is `true`.
    pub preprocess: bool,

    /// Whether the code checker runs.
    ///
    /// By default, this is `true`.
    pub check: bool
}
impl CompileOptions {
    /// Creates options for compiling the file at the given path.
    ///
    /// The instruction set is picked from the file's extension
    /// and `!input` paths are resolved relative to the file's directory.
    ///
    /// ```
    /// use mima::compile::CompileOptions;
    /// use mima::sim::instr::InstructionSet;
    ///
    /// let opts = CompileOptions::for_file("lib/stack.mimax");
    /// assert_eq!(opts.instruction_set, InstructionSet::MimaX);
    /// assert_eq!(opts.working_dir, std::path::Path::new("lib"));
    /// ```
    pub fn for_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let working_dir = path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        Self {
            instruction_set: InstructionSet::for_file(path).unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
            working_dir,
            ..Default::default()
        }
    }
}
impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            instruction_set: InstructionSet::default(),
            source_path: None,
            working_dir: PathBuf::from("."),
            home_dir: default_home_dir(),
            preprocess: true,
            check: true
        }
    }
}

/// A parsed program, ready to be run by an [`Interpreter`].
///
/// [`Interpreter`]: crate::sim::Interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    token: ProgramToken,
    instruction_set: InstructionSet
}
impl Program {
    /// Creates a program from an already parsed token tree.
    pub fn new(token: ProgramToken, instruction_set: InstructionSet) -> Self {
        Self { token, instruction_set }
    }
    /// The top scope of the program.
    pub fn token(&self) -> &ProgramToken {
        &self.token
    }
    /// The instruction set the program runs on.
    pub fn instruction_set(&self) -> InstructionSet {
        self.instruction_set
    }
}

/// The result of [`compile`].
#[derive(Debug, Clone)]
pub struct Compilation {
    /// The program, as far as it could be parsed.
    pub program: Program,
    /// The preprocessed source text, which positions in errors and warnings refer to.
    pub source: String,
    /// Every preprocessing and parsing error.
    pub errors: Vec<ParseErr>,
    /// Every warning from the code checker.
    pub warnings: Vec<Warning>
}
impl Compilation {
    /// Whether the source compiled without errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Gets the program, failing if any errors occurred.
    ///
    /// Warnings do not cause failure.
    pub fn into_program(self) -> Result<Program, CompileErr> {
        match self.errors.is_empty() {
            true  => Ok(self.program),
            false => Err(CompileErr(self.errors)),
        }
    }
}

/// The errors which stopped a compilation from producing a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileErr(pub Vec<ParseErr>);
impl CompileErr {
    /// The errors, in the order they were found.
    pub fn errors(&self) -> &[ParseErr] {
        &self.0
    }
}
impl std::fmt::Display for CompileErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.len() {
            1 => f.write_str("compilation failed with 1 error")?,
            n => write!(f, "compilation failed with {n} errors")?,
        }
        for e in &self.0 {
            write!(f, "\n  {e}")?;
        }
        Ok(())
    }
}
impl std::error::Error for CompileErr {}
impl crate::err::Error for CompileErr {
    fn help(&self) -> Option<Cow<str>> {
        use crate::err::Error;

        self.0.first().and_then(|e| e.help())
    }
}

/// Preprocesses, parses, and checks source code.
pub fn compile(src: &str, opts: &CompileOptions) -> Compilation {
    let (source, mut errors) = match opts.preprocess {
        true => {
            let pp_opts = PreprocessOptions {
                working_dir: opts.working_dir.clone(),
                home_dir: opts.home_dir.clone(),
                recursive: true
            };
            preprocess(src, opts.source_path.as_deref(), &pp_opts)
        },
        false => (src.to_string(), vec![]),
    };

    let (token, parse_errors) = parse_program(&source);
    errors.extend(parse_errors.into_iter().map(|e| match &opts.source_path {
        Some(path) => e.in_file(path),
        None => e,
    }));

    let warnings = match opts.check {
        true  => check_code(&token, &source),
        false => vec![],
    };

    log::debug!(
        "compiled {} ({} statements, {} errors, {} warnings)",
        opts.source_path.as_deref().map_or(Cow::Borrowed("<source>"), |p| p.to_string_lossy()),
        token.len(),
        errors.len(),
        warnings.len()
    );

    Compilation {
        program: Program::new(token, opts.instruction_set),
        source,
        errors,
        warnings
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::sim::instr::InstructionSet;
    use crate::sim::{ExitCondition, Interpreter};

    use super::{compile, CompileOptions};

    #[test]
    fn test_errors_and_warnings() {
        let compilation = compile("a: LDC(1); a: HALT(); LDC(", &CompileOptions::default());
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.warnings.len(), 1);

        let err = compilation.into_program().unwrap_err();
        assert!(err.to_string().starts_with("compilation failed with 1 error"));
    }

    #[test]
    fn test_options() {
        let opts = CompileOptions { check: false, ..Default::default() };
        let compilation = compile("a: LDC(1); a: HALT()", &opts);
        assert!(compilation.is_ok());
        assert!(compilation.warnings.is_empty());

        let opts = CompileOptions { preprocess: false, ..Default::default() };
        let compilation = compile("!input 'x';", &opts);
        assert!(!compilation.is_ok());
    }

    #[test]
    fn test_compile_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/double.mimax"), "double: { STV(0); ADD(0); RET() }").unwrap();
        fs::write(dir.path().join("main.mimax"), "JMP(main);\n!input 'lib.double';\nmain: LDC(21); CALL(double); HALT();").unwrap();

        let path = dir.path().join("main.mimax");
        let src = fs::read_to_string(&path).unwrap();
        let opts = CompileOptions { home_dir: dir.path().join("home"), ..CompileOptions::for_file(&path) };
        assert_eq!(opts.instruction_set, InstructionSet::MimaX);

        let compilation = compile(&src, &opts);
        assert_eq!(compilation.errors, []);
        assert!(compilation.source.contains("#<<File = "));

        let program = compilation.into_program().unwrap();
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();
        assert_eq!(interp.run(), Ok(ExitCondition::Halt));
        assert_eq!(interp.mima.accumulator.int_value(), 42);
    }

    #[test]
    fn test_errors_in_file_are_tagged() {
        let opts = CompileOptions { preprocess: false, ..CompileOptions::for_file("prog.mima") };
        let compilation = compile("LDC(", &opts);
        assert_eq!(compilation.errors[0].file.as_deref(), Some(std::path::Path::new("prog.mima")));

        let program = compile("LDC(2); HALT()", &opts).into_program().unwrap();
        let mut interp = Interpreter::new(&program, Default::default()).unwrap();
        assert_eq!(interp.run(), Ok(ExitCondition::Halt));
    }
}
