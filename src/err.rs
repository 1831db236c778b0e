//! Error interface for this crate.
//!
//! Every error type in this crate implements [`Error`], which adds
//! a user-facing hint on top of [`std::error::Error`].
//!
//! This module also holds [`Position`], the location attached to every
//! diagnostic produced while reading source text.
use std::borrow::Cow;
use std::fmt::Write;

pub use crate::parse::lex::LexErr;
pub use crate::parse::{ParseErr, ParseErrKind};
pub use crate::compile::CompileErr;
pub use crate::sim::SimErr;

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// A clarifying message to help aid someone in how to fix the message.
    ///
    /// By default, this is `None`.
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

/// A location in source text.
///
/// Lines and columns are zero-based. The offset is the byte offset
/// from the start of the text.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Default)]
pub struct Position {
    /// The line (zero-based).
    pub line: usize,
    /// The column within the line, counted in characters (zero-based).
    pub column: usize,
    /// The byte offset from the start of the text.
    pub offset: usize
}
impl Position {
    /// Computes the line and column of a byte offset in the given text.
    ///
    /// Offsets past the end of the text are clamped to the end.
    ///
    /// ```
    /// use mima::err::Position;
    ///
    /// let pos = Position::locate("ab\ncd", 4);
    /// assert_eq!((pos.line, pos.column), (1, 1));
    /// ```
    pub fn locate(src: &str, offset: usize) -> Self {
        let offset = offset.min(src.len());
        let before = src.get(..offset).unwrap_or(src);
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);

        Self {
            line: before.matches('\n').count(),
            column: before[line_start..].chars().count(),
            offset
        }
    }
}
impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// Formats an error with its help message (if one exists) for display to the user.
///
/// ```
/// use mima::err::{report, LexErr};
///
/// let report = report(&LexErr::UnclosedStrLit);
/// assert!(report.starts_with("unclosed string literal"));
/// assert!(report.contains("help:"));
/// ```
pub fn report(err: &dyn Error) -> String {
    let mut out = err.to_string();
    if let Some(help) = err.help() {
        // writing to a String cannot fail
        let _ = write!(out, "\nhelp: {help}");
    }
    out
}
