//! Lints for parsed programs.
//!
//! The code checker looks for code which parses and can run, but is probably a mistake.
//! Its findings are [`Warning`]s: they are logged (with [`log::warn!`]) and returned,
//! but never stop a program from compiling or running.
//!
//! ```
//! use mima::check::check_code;
//! use mima::parse::parse_program;
//!
//! let src = "loop: LDC(1); loop: HALT()";
//! let (program, _) = parse_program(src);
//! let warnings = check_code(&program, src);
//!
//! assert_eq!(warnings.len(), 1);
//! assert!(warnings[0].message.contains("loop"));
//! ```

use std::collections::HashSet;

use crate::ast::query::ProgramQuery;
use crate::ast::{ProgramToken, Token, TokenType};
use crate::err::Position;

/// An advisory diagnostic.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Warning {
    /// A message describing the problem.
    pub message: String,
    /// Where the problem is.
    pub pos: Position
}
impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: warning: {}", self.pos, self.message)
    }
}

/// Checks a program for probable mistakes.
///
/// `src` is the text the program was parsed from, which is used to locate warnings.
pub fn check_code(program: &ProgramToken, src: &str) -> Vec<Warning> {
    let mut warnings = vec![];

    let labels = ProgramQuery::new(program)
        .where_equal(Token::ty, TokenType::JumpPoint)
        .get(true);
    warnings.extend(duplicates(&labels, "labels", src));

    let definitions = ProgramQuery::new(program)
        .where_equal(Token::ty, TokenType::Definition)
        .or()
        .where_equal(Token::ty, TokenType::Constant)
        .get(true);
    warnings.extend(duplicates(&definitions, "definitions", src));

    let stray = ProgramQuery::new(program)
        .where_(|t| !matches!(t.ty(),
            | TokenType::Call
            | TokenType::JumpPoint
            | TokenType::Definition
            | TokenType::Constant
            | TokenType::Program
            | TokenType::Empty
        ))
        .get(true);
    warnings.extend(stray.into_iter().map(|t| Warning {
        message: format!("{t} is not an instruction call"),
        pos: Position::locate(src, t.offset())
    }));

    for w in &warnings {
        log::warn!("{w}");
    }
    warnings
}

/// Produces one warning listing every name bound more than once, if there are any.
fn duplicates(tokens: &[&Token], kind: &str, src: &str) -> Option<Warning> {
    let mut seen = HashSet::new();
    let mut dupes: Vec<(&str, &Token)> = vec![];

    for &t in tokens {
        let Some(name) = t.name() else { continue };
        if !seen.insert(name) && !dupes.iter().any(|&(n, _)| n == name) {
            dupes.push((name, t));
        }
    }

    let &(_, first) = dupes.first()?;
    let names: Vec<_> = dupes.iter().map(|&(n, _)| n).collect();
    Some(Warning {
        message: format!("Multiple definitions of {kind}: \"{}\"", names.join(", ")),
        pos: Position::locate(src, first.offset())
    })
}

#[cfg(test)]
mod tests {
    use crate::parse::parse_program;

    use super::check_code;

    #[test]
    fn test_duplicate_labels() {
        let src = "
            loop: LDC(1);
            loop: LDC(2);
            end: HALT();
            { end: HALT() }
        ";
        let (program, errors) = parse_program(src);
        assert!(errors.is_empty());

        let warnings = check_code(&program, src);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("loop, end"));
        assert_eq!(warnings[0].pos.line, 2);
    }

    #[test]
    fn test_duplicate_definitions() {
        let src = "§define a, b; §const a = 1, c = 2; §define c, d";
        let (program, _) = parse_program(src);

        let warnings = check_code(&program, src);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("\"a, c\""));
    }

    #[test]
    fn test_stray_values() {
        let src = "LDC(1);\n5;\nx: y";
        let (program, errors) = parse_program(src);
        assert!(errors.is_empty());

        let warnings = check_code(&program, src);
        let lines: Vec<_> = warnings.iter().map(|w| w.pos.line).collect();
        assert_eq!(lines, [1, 2]);
        assert!(warnings.iter().all(|w| w.message.contains("not an instruction call")));
    }

    #[test]
    fn test_clean() {
        let src = "§define a; start: LDC(1); STV(a); { inner: HALT() }";
        let (program, _) = parse_program(src);
        assert!(check_code(&program, src).is_empty());
    }
}
