//! A parser, code checker, interpreter, and debugger for the Mima.
//!
//! The Mima ("minimal machine") is an educational accumulator machine.
//! Its programs are written as a list of instruction calls (`LDC(5);`),
//! which can be labelled (`loop: JMP(loop);`), grouped into scopes (`{ ... }`),
//! and given variables and constants (`§define a, b = 3;`, `§const N = 10;`).
//!
//! # Usage
//!
//! To run Mima source code, it must first be compiled into a [`Program`]:
//! ```
//! use mima::compile::{compile, CompileOptions};
//!
//! let code = "
//!     §define sum = 0;
//!     LDC(20);
//!     STV(sum);
//!     LDC(22);
//!     ADD(sum);
//!     HALT();
//! ";
//! let compilation = compile(code, &CompileOptions::default());
//! assert!(compilation.warnings.is_empty());
//!
//! let program = compilation.into_program().unwrap();
//! ```
//!
//! Once a program has been compiled, it can be executed with the interpreter:
//! ```
//! # use mima::compile::{compile, CompileOptions};
//! # let program = compile("LDC(20); HALT()", &CompileOptions::default()).into_program().unwrap();
//! use mima::sim::Interpreter;
//!
//! let mut interp = Interpreter::new(&program, Default::default()).unwrap();
//! interp.run().unwrap(); // <-- Result can be handled accordingly
//! ```
//!
//! If more granularity is needed, there are also step-in and step-out functions,
//! and a [`DebugController`] which runs a program on a separate thread.
//! See the [`sim`] module for more details.
//!
//! [`Program`]: compile::Program
//! [`DebugController`]: sim::debug::DebugController
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod check;
pub mod compile;
pub mod sim;
pub mod err;
