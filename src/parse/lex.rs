//! Tokenizing Mima source code.
//!
//! This module holds the tokens that characterize Mima source code ([`Token`]).
//! This module is used by the preprocessor and the parser to facilitate the
//! conversion of source code into a token tree.
//!
//! The module's key data structures are the [`Token`] enum,
//! which lists all of the atomic tokens of the language, and [`TokenStream`],
//! which reads [`Lexeme`]s one at a time and attaches line/column information to them.

use std::num::IntErrorKind;
use std::ops::Range;

use logos::{Lexer, Logos, Skip};

use crate::err::Position;

use super::chars::CharStream;

/// A unit of information in Mima source code.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t\r\n\f]+", error = LexErr)]
pub enum Token {
    // Note, the number regexes span over tokens that are technically invalid
    // (e.g., 23trst matches even though it shouldn't).
    // This is intended.
    // These regexes collect what would be considered one discernable unit
    // and validates it using the validator function.

    /// A decimal numeric value (e.g., `9`, `-14`)
    #[regex(r"\d\w*", lex_number)]
    #[regex(r"-\w*", lex_number)]
    Number(i64),

    /// A binary literal (e.g., `~1010`), holding its digits as written.
    #[regex(r"~[01]*", |lx| lx.slice()[1..].to_string())]
    Binary(String),

    /// A string literal (e.g., `'lib.math'`)
    #[token("'", lex_str_literal)]
    String(String),

    /// An identifier.
    ///
    /// This can refer to either:
    /// - a keyword (`define`, `const`, `input`)
    /// - a name (an instruction, label, variable, or constant)
    #[regex(r"[A-Za-z]\w*", |lx| lx.slice().parse::<Ident>().unwrap_or_else(|e| match e {}))]
    Ident(Ident),

    /// A punctuation character (one of `!§=:(){};,`)
    #[regex(r"[!=:(){};,]", lex_punct)]
    #[token("§", lex_punct)]
    Punct(char),

    /// A comment.
    ///
    /// Comments are skipped by the lexer, so this token is never produced.
    /// A `#` starts a line comment, and `#*` starts a block comment which ends
    /// at the next `#` that is not preceded by a backslash.
    #[token("#", lex_comment)]
    Comment
}

macro_rules! keyword_enum {
    ($($kw:ident => $lit:literal),+ $(,)?) => {
        /// An identifier.
        ///
        /// This can refer to either:
        /// - a keyword (e.g., `define`, `const`)
        /// - a name (e.g., `LDC`, `loop`, `counter`)
        ///
        /// This token type is case sensitive.
        #[derive(Debug, PartialEq, Eq, Hash, Clone)]
        pub enum Ident {
            $(
                #[doc = concat!("The `", $lit, "` keyword.")]
                $kw
            ),+,
            /// Any other identifier.
            Name(String)
        }

        impl Ident {
            /// Whether this identifier is a reserved keyword.
            pub fn is_keyword(&self) -> bool {
                !matches!(self, Self::Name(_))
            }

            /// The identifier as written in source.
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$kw => $lit),*,
                    Self::Name(id) => id
                }
            }
        }

        impl std::str::FromStr for Ident {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($lit => Ok(Self::$kw)),*,
                    _ => Ok(Self::Name(s.to_string()))
                }
            }
        }

        impl std::fmt::Display for Ident {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
keyword_enum! {
    Define => "define",
    Const => "const",
    Input => "input",
}

/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal cannot fit within the range of a i64
    DoesNotFit,
    /// Numeric literal could not be parsed as a decimal literal because it has invalid digits (i.e., not 0-9)
    InvalidNumeric,
    /// Numeric literal could not be parsed because there are no digits in it (it's just `-`)
    InvalidDecEmpty,
    /// Int parsing failed but the reason why is unknown
    UnknownIntErr,
    /// String literal is missing an end quotation mark.
    UnclosedStrLit,
    /// A symbol was used which is not allowed in Mima source files
    #[default]
    InvalidSymbol
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::DoesNotFit      => f.write_str("numeric token does not fit 64-bit signed integer"),
            LexErr::InvalidNumeric  => f.write_str("invalid decimal literal"),
            LexErr::InvalidDecEmpty => f.write_str("invalid decimal literal"),
            LexErr::UnknownIntErr   => f.write_str("could not parse integer"),
            LexErr::UnclosedStrLit  => f.write_str("unclosed string literal"),
            LexErr::InvalidSymbol   => f.write_str("can't handle character"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::DoesNotFit      => Some(format!("the range for a 64-bit signed integer is [{}, {}]", i64::MIN, i64::MAX).into()),
            LexErr::InvalidNumeric  => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::InvalidDecEmpty => Some("there should be digits (0-9) here".into()),
            LexErr::UnknownIntErr   => None,
            LexErr::UnclosedStrLit  => Some("add a quote to the end of the string literal".into()),
            LexErr::InvalidSymbol   => Some("this char does not occur in any token in Mima source code".into()),
        }
    }
}
/// Helper that converts an int error kind to its corresponding LexErr, based on the provided inputs.
fn convert_int_error(
    e: &std::num::IntErrorKind,
    invalid_digits_err: LexErr,
    empty_err: LexErr,
    overflow_err: LexErr,
    src: &str
) -> LexErr {
    match e {
        IntErrorKind::Empty        => empty_err,
        IntErrorKind::InvalidDigit if src == "-" => empty_err,
        IntErrorKind::InvalidDigit => invalid_digits_err,
        IntErrorKind::PosOverflow  => overflow_err,
        IntErrorKind::NegOverflow  => overflow_err,
        _ => LexErr::UnknownIntErr,
    }
}
fn lex_number(lx: &Lexer<'_, Token>) -> Result<i64, LexErr> {
    let string = lx.slice();

    string.parse::<i64>()
        .map_err(|e| convert_int_error(e.kind(), LexErr::InvalidNumeric, LexErr::InvalidDecEmpty, LexErr::DoesNotFit, string))
}
fn lex_punct(lx: &Lexer<'_, Token>) -> Option<char> {
    lx.slice().chars().next()
}
fn lex_str_literal(lx: &mut Lexer<'_, Token>) -> Result<String, LexErr> {
    // string literals cannot span lines
    let rem = lx.remainder()
        .lines()
        .next()
        .unwrap_or("");

    match rem.find('\'') {
        Some(len) => {
            lx.bump(len + 1);
            Ok(rem[..len].to_string())
        },
        None => {
            lx.bump(rem.len());
            Err(LexErr::UnclosedStrLit)
        }
    }
}
fn lex_comment(lx: &mut Lexer<'_, Token>) -> Skip {
    let rem = lx.remainder();

    let len = match rem.strip_prefix('*') {
        // block comment: up to and including the next unescaped '#'
        Some(body) => body.match_indices('#')
            .map(|(n, _)| n)
            .find(|&n| !body[..n].ends_with('\\'))
            .map_or(rem.len(), |n| n + 2),
        // line comment: up to (but excluding) the newline
        None => rem.find('\n').unwrap_or(rem.len()),
    };
    lx.bump(len);

    Skip
}

/// A token along with where it occurs in the source.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Lexeme {
    /// The token, or the error raised while reading it.
    ///
    /// An erroneous lexeme does not stop the stream,
    /// so the caller can continue scanning after it.
    pub token: Result<Token, LexErr>,
    /// The byte range of this lexeme in the source.
    pub span: Range<usize>,
    /// The position of the start of this lexeme.
    pub pos: Position
}

/// A stream of [`Lexeme`]s over source text.
///
/// Unlike a plain [`logos::Lexer`], this stream tracks lines and columns,
/// supports one lexeme of lookahead, and can resume lexing from an arbitrary
/// character (see [`TokenStream::skip_char`]).
///
/// ```
/// use mima::parse::lex::{Ident, Token, TokenStream};
///
/// let mut stream = TokenStream::new("LDC(1);\nHALT();");
/// assert_eq!(stream.next().unwrap().token, Ok(Token::Ident(Ident::Name("LDC".into()))));
/// assert!(stream.is_punct('('));
///
/// let halt = stream.nth_lexeme(4).unwrap();
/// assert_eq!((halt.pos.line, halt.pos.column), (1, 0));
/// ```
#[derive(Debug)]
pub struct TokenStream<'s> {
    src: &'s str,
    chars: CharStream<'s>,
    offset: usize,
    consumed: usize,
    peeked: Option<Lexeme>
}
impl<'s> TokenStream<'s> {
    /// Creates a new token stream over the given text.
    pub fn new(src: &'s str) -> Self {
        Self {
            src,
            chars: CharStream::new(src),
            offset: 0,
            consumed: 0,
            peeked: None
        }
    }

    fn read_next(&mut self) -> Option<Lexeme> {
        let rest = self.src.get(self.offset..)?;
        let mut lx = Token::lexer(rest);
        let token = lx.next()?;

        let span = (self.offset + lx.span().start)..(self.offset + lx.span().end);
        self.offset = span.end;
        self.chars.seek(span.start);

        Some(Lexeme { token, span, pos: self.chars.position() })
    }

    /// Returns the next lexeme without consuming it.
    pub fn peek(&mut self) -> Option<&Lexeme> {
        if self.peeked.is_none() {
            self.peeked = self.read_next();
        }
        self.peeked.as_ref()
    }

    /// Returns the next token without consuming it,
    /// or `None` if the stream is exhausted or the next lexeme is erroneous.
    pub fn peek_token(&mut self) -> Option<&Token> {
        self.peek().and_then(|l| l.token.as_ref().ok())
    }

    /// Consumes and returns the next lexeme.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Lexeme> {
        let lexeme = match self.peeked.take() {
            Some(l) => l,
            None => self.read_next()?,
        };
        self.consumed = lexeme.span.end;
        Some(lexeme)
    }

    /// Consumes `n` lexemes and returns the next one.
    pub fn nth_lexeme(&mut self, n: usize) -> Option<Lexeme> {
        for _ in 0..n {
            self.next()?;
        }
        self.next()
    }

    /// Whether there are no more lexemes in this stream.
    pub fn is_empty(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Discards the next lexeme and resumes lexing one character after its start.
    pub fn skip_char(&mut self) {
        let start = match self.peeked.take() {
            Some(l) => l.span.start,
            None => self.offset,
        };
        let width = self.src.get(start..)
            .and_then(|s| s.chars().next())
            .map_or(0, char::len_utf8);

        self.offset = start + width;
        self.consumed = self.consumed.max(self.offset);
    }

    /// The position of the next lexeme, or the end of input if there is none.
    pub fn position(&mut self) -> Position {
        if let Some(l) = self.peek() {
            return l.pos;
        }
        self.chars.seek(self.src.len());
        self.chars.position()
    }

    /// The byte offset right after the last consumed lexeme.
    pub fn consumed_offset(&self) -> usize {
        self.consumed
    }

    /// Whether the next token is the given punctuation character.
    pub fn is_punct(&mut self, c: char) -> bool {
        matches!(self.peek_token(), Some(Token::Punct(p)) if *p == c)
    }

    /// Whether the next token is the given keyword.
    pub fn is_keyword(&mut self, kw: &Ident) -> bool {
        matches!(self.peek_token(), Some(Token::Ident(id)) if id.is_keyword() && id == kw)
    }
}
