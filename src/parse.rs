//! Parsing Mima source code into a token tree.
//!
//! This module is used to convert strings (which represent Mima source code)
//! into a [`ProgramToken`] tree.
//!
//! The parser is recursive-descent and recovers from errors:
//! when a statement fails to parse, the error is recorded and parsing restarts
//! one character after the point of failure. This allows every independent error
//! in a file to be reported from one call.
//!
//! The key function of this module is [`parse_program`]:
//! ```
//! use mima::parse::parse_program;
//!
//! let (program, errors) = parse_program("
//!     §define counter;
//!     start: LDC(1);
//!            STV(counter);
//!            HALT();
//! ");
//! assert!(errors.is_empty());
//! assert_eq!(program.len(), 4);
//! ```
//!
//! Before parsing, `!input` directives can be expanded with the [`preprocess`] module.
pub mod chars;
pub mod lex;
pub mod preprocess;

use std::borrow::Cow;
use std::path::PathBuf;

use crate::ast::{ArrayToken, AtomToken, BinaryToken, ProgramToken, Token, TokenType};
use crate::err::Position;

use lex::{Ident, LexErr, Lexeme, TokenStream};

/// Any error raised while preprocessing or parsing source code.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseErr {
    /// The cause of this error.
    pub kind: ParseErrKind,
    /// Where the error occurred.
    pub pos: Position,
    /// The included file this error occurred in,
    /// or `None` if it occurred in the top-level source.
    pub file: Option<PathBuf>
}
impl ParseErr {
    /// Creates a new error at the given position.
    pub fn new(kind: ParseErrKind, pos: Position) -> Self {
        Self { kind, pos, file: None }
    }
    /// Marks this error as having occurred in the given file
    /// (unless it already knows which file it occurred in).
    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file.get_or_insert_with(|| file.into());
        self
    }
    /// The line the error occurred on (zero-based).
    pub fn line(&self) -> usize {
        self.pos.line
    }
    /// The column the error occurred on (zero-based).
    pub fn column(&self) -> usize {
        self.pos.column
    }
    /// The byte offset the error occurred at.
    pub fn offset(&self) -> usize {
        self.pos.offset
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file.display())?;
        }
        write!(f, "{}: {}", self.pos, self.kind)
    }
}
impl std::error::Error for ParseErr {}
impl crate::err::Error for ParseErr {
    fn help(&self) -> Option<Cow<str>> {
        self.kind.help()
    }
}

/// The kinds of errors which can occur while preprocessing or parsing.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParseErrKind {
    /// A token could not be read.
    Lex(LexErr),
    /// A token occurred where it cannot be used.
    Unexpected(String),
    /// The input ended in the middle of a statement.
    UnexpectedEof,
    /// A specific punctuation character was expected.
    ExpectedPunct(char),
    /// `§` was not followed by `define` or `const`.
    ExpectedDefinitionKind,
    /// A name was expected (e.g., in a definition).
    ExpectedName,
    /// A label was not a name.
    InvalidLabel(String),
    /// A constant was declared without a value.
    MissingConstValue(String),
    /// A `}` occurred outside of any scope.
    UnmatchedScopeEnd,
    /// A `{` was never closed.
    UnclosedScope,
    /// `!` was followed by something other than `input`.
    UnknownDirective(String),
    /// `!input` was not followed by a string literal.
    ExpectedInputPath,
    /// No candidate path of an `!input` directive could be loaded.
    FileNotFound(String),
    /// Every candidate path of an `!input` directive had already been included.
    AlreadyIncluded(String),
    /// `!input` directives were nested too deeply.
    IncludeTooDeep(String),
    /// The included file had errors of its own (which are reported separately).
    IncludedFileErrors(String),
}
impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lex(e)                => write!(f, "{e}"),
            Self::Unexpected(s)         => write!(f, "unexpected token '{s}'"),
            Self::UnexpectedEof         => f.write_str("unexpected end of input"),
            Self::ExpectedPunct(c)      => write!(f, "expected '{c}'"),
            Self::ExpectedDefinitionKind => f.write_str("expected 'define' or 'const'"),
            Self::ExpectedName          => f.write_str("expected a name"),
            Self::InvalidLabel(s)       => write!(f, "invalid label '{s}'"),
            Self::MissingConstValue(s)  => write!(f, "constant \"{s}\" has no value"),
            Self::UnmatchedScopeEnd     => f.write_str("unmatched '}'"),
            Self::UnclosedScope         => f.write_str("unclosed scope"),
            Self::UnknownDirective(s)   => write!(f, "unknown preprocessor directive '{s}'"),
            Self::ExpectedInputPath     => f.write_str("expected a file path"),
            Self::FileNotFound(p)       => write!(f, "can't find/load file: {p}"),
            Self::AlreadyIncluded(p)    => write!(f, "file was already included: {p}"),
            Self::IncludeTooDeep(p)     => write!(f, "inputs are nested too deeply at: {p}"),
            Self::IncludedFileErrors(p) => write!(f, "errors in included file: {p}"),
        }
    }
}
impl ParseErrKind {
    fn help(&self) -> Option<Cow<str>> {
        use crate::err::Error;

        match self {
            Self::Lex(e)                 => e.help(),
            Self::Unexpected(_)          => None,
            Self::UnexpectedEof          => Some("the statement is incomplete".into()),
            Self::ExpectedPunct(';')     => Some("statements are separated by ';'".into()),
            Self::ExpectedPunct(_)       => None,
            Self::ExpectedDefinitionKind => Some("definitions are written '§define name' or '§const name = value'".into()),
            Self::ExpectedName           => Some("names start with a letter and consist of letters, digits, and '_'".into()),
            Self::InvalidLabel(_)        => Some("a label is a name followed by ':'".into()),
            Self::MissingConstValue(_)   => Some("constants must be initialized, as in '§const name = value'".into()),
            Self::UnmatchedScopeEnd      => Some("remove this '}' or add a matching '{'".into()),
            Self::UnclosedScope          => Some("add a '}' to close the scope".into()),
            Self::UnknownDirective(_)    => Some("the only directive is '!input'".into()),
            Self::ExpectedInputPath      => Some("write the path as a quoted, dotted path, as in !input 'lib.math';".into()),
            Self::FileNotFound(_)        => Some("paths are looked up in the working directory, then the home directory, then as written".into()),
            Self::AlreadyIncluded(_)     => Some("a file is only included once".into()),
            Self::IncludeTooDeep(_)      => Some("check for files which include each other".into()),
            Self::IncludedFileErrors(_)  => None,
        }
    }
}

/// Parses source code into a token tree.
///
/// This always produces a tree. Statements which failed to parse are left out of it,
/// and the errors are returned alongside it.
pub fn parse_program(src: &str) -> (ProgramToken, Vec<ParseErr>) {
    let mut parser = Parser::new(src);
    let statements = parser.parse_top_level();
    (ProgramToken::new(statements, 0..src.len(), 0), parser.errors)
}

struct Parser<'s> {
    src: &'s str,
    stream: TokenStream<'s>,
    errors: Vec<ParseErr>,
    depth: usize
}
impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, stream: TokenStream::new(src), errors: vec![], depth: 0 }
    }

    /// Creates an error at the next lexeme.
    ///
    /// If that lexeme could not be read, the lexer's error is reported instead of `kind`.
    fn expected(&mut self, kind: ParseErrKind) -> ParseErr {
        let kind = match self.stream.peek() {
            Some(Lexeme { token: Err(e), .. }) => ParseErrKind::Lex(*e),
            _ => kind
        };
        ParseErr::new(kind, self.stream.position())
    }

    /// Creates an error for a lexeme which cannot occur at this point.
    fn unexpected(&mut self) -> ParseErr {
        let kind = match self.stream.peek() {
            Some(l) => ParseErrKind::Unexpected(self.src[l.span.clone()].to_string()),
            None => ParseErrKind::UnexpectedEof
        };
        self.expected(kind)
    }

    fn expect_punct(&mut self, c: char) -> Result<Lexeme, ParseErr> {
        match self.stream.is_punct(c) {
            true => self.stream.next().ok_or_else(|| self.expected(ParseErrKind::ExpectedPunct(c))),
            false => Err(self.expected(ParseErrKind::ExpectedPunct(c))),
        }
    }

    /// Parses statements until the end of input or the end of the current scope.
    ///
    /// The closing `}` of a nested scope is consumed.
    fn parse_top_level(&mut self) -> Vec<Token> {
        let mut statements = vec![];

        loop {
            if self.stream.is_empty() {
                if self.depth > 0 {
                    let err = ParseErr::new(ParseErrKind::UnclosedScope, self.stream.position());
                    self.errors.push(err);
                }
                break;
            }
            if self.stream.is_punct(';') {
                self.stream.next();
                continue;
            }

            match self.parse_statement() {
                Ok(Token::Atom(end)) if end.ty() == TokenType::ScopeEnd => {
                    if self.depth > 0 {
                        self.stream.next();
                        break;
                    }
                    let err = ParseErr::new(ParseErrKind::UnmatchedScopeEnd, self.stream.position());
                    self.errors.push(err);
                    self.stream.skip_char();
                },
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.stream.skip_char();
                }
            }
        }

        statements
    }

    fn parse_statement(&mut self) -> Result<Token, ParseErr> {
        let stmt = self.parse_labelled()?;

        // scopes need no separator, and a separator is optional before '}' or the end of input
        if !matches!(stmt.ty(), TokenType::Program | TokenType::ScopeEnd) {
            if self.stream.is_punct(';') {
                self.stream.next();
            } else if !self.stream.is_empty() && !self.stream.is_punct('}') {
                let err = self.expected(ParseErrKind::ExpectedPunct(';'));
                self.errors.push(err);
            }
        }

        Ok(stmt)
    }

    /// Parses a statement with any number of `label:` prefixes.
    fn parse_labelled(&mut self) -> Result<Token, ParseErr> {
        let start = self.stream.position();
        let expr = self.parse_expression()?;
        if !self.stream.is_punct(':') {
            return Ok(expr);
        }

        match &expr {
            Token::Atom(a) if a.ty() == TokenType::Identification => {},
            e => return Err(ParseErr::new(ParseErrKind::InvalidLabel(e.to_string()), start)),
        }
        self.stream.next();

        let stmt = self.parse_labelled()?;
        let span = expr.offset()..stmt.span().end;
        Ok(Token::Binary(BinaryToken::new(TokenType::JumpPoint, expr, stmt, span, start.line)))
    }

    /// Parses an atomic expression, and a call if the expression is followed by `(`.
    fn parse_expression(&mut self) -> Result<Token, ParseErr> {
        let atom = self.parse_atomic()?;

        let is_name = atom.ty() == TokenType::Identification;
        if !(is_name && self.stream.is_punct('(')) {
            return Ok(atom);
        }

        let line = atom.line().unwrap_or_default();
        let args = self.parse_args()?;
        let span = atom.offset()..args.span().end;
        Ok(Token::Binary(BinaryToken::new(TokenType::Call, atom, Token::Array(args), span, line)))
    }

    fn parse_atomic(&mut self) -> Result<Token, ParseErr> {
        let Some(lexeme) = self.stream.peek().cloned() else {
            return Err(self.expected(ParseErrKind::UnexpectedEof));
        };
        let Ok(token) = lexeme.token.clone() else {
            return Err(self.unexpected());
        };
        let atom = |ty, value: String| Token::Atom(AtomToken::new(ty, value, lexeme.span.clone(), lexeme.pos.line));

        use lex::Token as Lx;
        match token {
            // not consumed, the scope's parser consumes it
            Lx::Punct('}') => Ok(atom(TokenType::ScopeEnd, "}".to_string())),
            Lx::Punct('{') => {
                self.stream.next();
                self.parse_scope(&lexeme)
            },
            Lx::Punct('(') => {
                self.stream.next();
                let expr = self.parse_expression()?;
                self.expect_punct(')')?;
                Ok(expr)
            },
            Lx::Punct('§') => {
                self.stream.next();
                self.parse_definition(&lexeme)
            },
            Lx::Number(n) => {
                self.stream.next();
                Ok(atom(TokenType::Number, n.to_string()))
            },
            Lx::Binary(b) => {
                self.stream.next();
                Ok(atom(TokenType::Binary, b))
            },
            Lx::Ident(Ident::Name(name)) => {
                self.stream.next();
                Ok(atom(TokenType::Identification, name))
            },
            _ => Err(self.unexpected())
        }
    }

    fn parse_scope(&mut self, open: &Lexeme) -> Result<Token, ParseErr> {
        self.depth += 1;
        let statements = self.parse_top_level();
        self.depth -= 1;

        let span = open.span.start..self.stream.consumed_offset();
        Ok(Token::Program(ProgramToken::new(statements, span, open.pos.line)))
    }

    /// Parses a definition block, starting after the `§`.
    fn parse_definition(&mut self, section: &Lexeme) -> Result<Token, ParseErr> {
        let ty = match self.stream.peek_token() {
            Some(lex::Token::Ident(Ident::Define)) => Some(TokenType::Definition),
            Some(lex::Token::Ident(Ident::Const))  => Some(TokenType::Constant),
            _ => None,
        };
        let Some(ty) = ty else {
            return Err(self.expected(ParseErrKind::ExpectedDefinitionKind));
        };
        self.stream.next();

        let mut items = vec![self.parse_definition_item(ty)?];
        while self.stream.is_punct(',') {
            self.stream.next();
            items.push(self.parse_definition_item(ty)?);
        }

        let span = section.span.start..self.stream.consumed_offset();
        Ok(Token::Array(ArrayToken::new(items, span, section.pos.line)))
    }

    fn parse_definition_item(&mut self, ty: TokenType) -> Result<Token, ParseErr> {
        let is_name = matches!(self.stream.peek_token(), Some(lex::Token::Ident(Ident::Name(_))));
        let lexeme = match is_name {
            true => self.stream.next(),
            false => None,
        };
        let Some(lexeme) = lexeme else {
            return Err(self.expected(ParseErrKind::ExpectedName));
        };

        let name = AtomToken::new(TokenType::Identification, &self.src[lexeme.span.clone()], lexeme.span.clone(), lexeme.pos.line);
        let value = if self.stream.is_punct('=') {
            self.stream.next();
            self.parse_expression()?
        } else if ty == TokenType::Constant {
            return Err(ParseErr::new(ParseErrKind::MissingConstValue(name.value().to_string()), lexeme.pos));
        } else {
            Token::Empty(self.stream.consumed_offset())
        };

        let span = lexeme.span.start..self.stream.consumed_offset();
        Ok(Token::Binary(BinaryToken::new(ty, Token::Atom(name), value, span, lexeme.pos.line)))
    }

    /// Parses a parenthesized, comma-separated argument list.
    fn parse_args(&mut self) -> Result<ArrayToken, ParseErr> {
        let open = self.expect_punct('(')?;

        let mut args = vec![];
        if !self.stream.is_punct(')') {
            args.push(self.parse_expression()?);
            while self.stream.is_punct(',') {
                self.stream.next();
                args.push(self.parse_expression()?);
            }
        }
        self.expect_punct(')')?;

        let span = open.span.start..self.stream.consumed_offset();
        Ok(ArrayToken::new(args, span, open.pos.line))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Token, TokenType};

    use super::{parse_program, ParseErrKind};

    fn names(stmts: &[Token]) -> Vec<&str> {
        stmts.iter().filter_map(Token::name).collect()
    }

    #[test]
    fn test_basic() {
        let (program, errors) = parse_program("LDC(5); STV(3); HALT()");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(names(program.statements()), ["LDC", "STV", "HALT"]);

        let ldc = program.statements()[0].as_binary().unwrap();
        assert_eq!(ldc.ty(), TokenType::Call);
        assert_eq!(ldc.args().len(), 1);
        assert_eq!(ldc.args()[0].as_atom().and_then(|a| a.number()), Some(5));
        assert_eq!(program.statements()[1].offset(), 8);
    }

    #[test]
    fn test_recovery_single_error() {
        let (program, errors) = parse_program("A(); B(; C()");
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(names(program.statements()), ["A", "C"]);
        assert_eq!(errors[0].kind, ParseErrKind::Unexpected(";".to_string()));
        assert_eq!(errors[0].offset(), 7);
    }

    #[test]
    fn test_recovery_multiple_errors() {
        let (program, errors) = parse_program("A(;\nB(;\nC();");
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert_eq!(names(program.statements()), ["C"]);
        assert_eq!((errors[0].line(), errors[0].column()), (0, 2));
        assert_eq!((errors[1].line(), errors[1].column()), (1, 2));
    }

    #[test]
    fn test_missing_separator() {
        let (program, errors) = parse_program("A() B();");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrKind::ExpectedPunct(';'));
        assert_eq!(names(program.statements()), ["A", "B"]);
    }

    #[test]
    fn test_labels() {
        let (program, errors) = parse_program("a: b: NOT(); JMP(a);");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(program.jumps(), &[("a".to_string(), 0), ("b".to_string(), 0)]);

        let (_, errors) = parse_program("5: NOT();");
        assert!(matches!(errors[0].kind, ParseErrKind::InvalidLabel(_)));
    }

    #[test]
    fn test_definitions() {
        let (program, errors) = parse_program("§define a, b = 3; §const PI = 3;");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(program.len(), 2);

        let defs = program.statements()[0].as_array().unwrap().elements();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].ty(), TokenType::Definition);
        assert_eq!(defs[0].name(), Some("a"));
        assert_eq!(defs[0].as_binary().unwrap().second().ty(), TokenType::Empty);
        assert_eq!(defs[1].as_binary().unwrap().second().value(), Some("3"));

        let consts = program.statements()[1].as_array().unwrap().elements();
        assert_eq!(consts[0].ty(), TokenType::Constant);

        let (_, errors) = parse_program("§const X;");
        assert_eq!(errors[0].kind, ParseErrKind::MissingConstValue("X".to_string()));
        let (_, errors) = parse_program("§input x;");
        assert_eq!(errors[0].kind, ParseErrKind::ExpectedDefinitionKind);
    }

    #[test]
    fn test_scopes() {
        let (program, errors) = parse_program("{ LDC(1); { NOT() } }; HALT()");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(program.len(), 2);

        let outer = program.statements()[0].as_program().unwrap();
        assert_eq!(outer.len(), 2);
        assert_eq!(outer.statements()[1].as_program().map(|p| p.len()), Some(1));

        let (_, errors) = parse_program("NOT(); }");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrKind::UnmatchedScopeEnd);

        let (program, errors) = parse_program("{ NOT()");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrKind::UnclosedScope);
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn test_nested_expressions() {
        let (program, errors) = parse_program("LDVR(SP(), (1)); LDC(~101);");
        assert!(errors.is_empty(), "{errors:?}");

        let args = program.statements()[0].as_binary().unwrap().args();
        assert_eq!(args[0].ty(), TokenType::Call);
        assert_eq!(args[1].value(), Some("1"));

        let args = program.statements()[1].as_binary().unwrap().args();
        assert_eq!(args[0].ty(), TokenType::Binary);
        assert_eq!(args[0].value(), Some("101"));
    }

    #[test]
    fn test_lex_error_reported() {
        let (program, errors) = parse_program("LDC(@); HALT();");
        assert!(!errors.is_empty());
        assert!(matches!(errors[0].kind, ParseErrKind::Lex(_)));
        assert_eq!(names(program.statements()), ["HALT"]);
    }
}
