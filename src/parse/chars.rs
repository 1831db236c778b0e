//! Character-level reading of source text.
//!
//! [`CharStream`] walks a string one character at a time and keeps track
//! of the line and column of the next unread character.

use crate::err::Position;

/// The value returned by [`CharStream::next`] and [`CharStream::peek`] once the input is exhausted.
pub const EMPTY_CHAR: char = '\0';

/// A position-tracking character reader over a string.
///
/// ```
/// use mima::parse::chars::{CharStream, EMPTY_CHAR};
///
/// let mut chars = CharStream::new("a\nb");
/// assert_eq!(chars.next(), 'a');
/// assert_eq!(chars.next(), '\n');
/// assert_eq!((chars.line(), chars.column()), (1, 0));
/// assert_eq!(chars.next(), 'b');
/// assert_eq!(chars.next(), EMPTY_CHAR);
/// assert!(chars.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct CharStream<'s> {
    src: &'s str,
    offset: usize,
    line: usize,
    column: usize
}
impl<'s> CharStream<'s> {
    /// Creates a new stream at the start of the given text.
    pub fn new(src: &'s str) -> Self {
        Self { src, offset: 0, line: 0, column: 0 }
    }

    /// Consumes and returns the next character,
    /// or [`EMPTY_CHAR`] if the end of input has been reached.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> char {
        let Some(c) = self.src[self.offset..].chars().next() else {
            return EMPTY_CHAR;
        };

        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        c
    }

    /// Returns the next character without consuming it,
    /// or [`EMPTY_CHAR`] if the end of input has been reached.
    pub fn peek(&self) -> char {
        self.src[self.offset..].chars().next().unwrap_or(EMPTY_CHAR)
    }

    /// Whether every character has been consumed.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.src.len()
    }

    /// Consumes characters until the byte offset `offset` is reached.
    ///
    /// Seeking backwards is a no-op, and seeking past the end stops at the end.
    pub fn seek(&mut self, offset: usize) {
        while self.offset < offset && !self.is_empty() {
            self.next();
        }
    }

    /// The line of the next character (zero-based).
    pub fn line(&self) -> usize {
        self.line
    }
    /// The column of the next character (zero-based).
    pub fn column(&self) -> usize {
        self.column
    }
    /// The byte offset of the next character.
    pub fn offset(&self) -> usize {
        self.offset
    }
    /// The full position of the next character.
    pub fn position(&self) -> Position {
        Position { line: self.line, column: self.column, offset: self.offset }
    }
}

#[cfg(test)]
mod tests {
    use super::{CharStream, EMPTY_CHAR};

    #[test]
    fn test_peek_does_not_consume() {
        let mut chars = CharStream::new("xy");
        assert_eq!(chars.peek(), 'x');
        assert_eq!(chars.peek(), 'x');
        assert_eq!(chars.next(), 'x');
        assert_eq!(chars.peek(), 'y');
        assert_eq!(chars.next(), 'y');
        assert_eq!(chars.peek(), EMPTY_CHAR);
        assert_eq!(chars.next(), EMPTY_CHAR);
    }

    #[test]
    fn test_line_column_tracking() {
        let mut chars = CharStream::new("ab\ncd\n\ne");
        chars.seek(4);
        assert_eq!((chars.line(), chars.column(), chars.offset()), (1, 1, 4));
        chars.seek(7);
        assert_eq!((chars.line(), chars.column()), (3, 0));
        assert_eq!(chars.next(), 'e');
        assert!(chars.is_empty());

        // seeking backwards does nothing
        chars.seek(0);
        assert_eq!(chars.offset(), 8);
    }

    #[test]
    fn test_multibyte() {
        let mut chars = CharStream::new("§a");
        assert_eq!(chars.next(), '§');
        assert_eq!(chars.column(), 1);
        assert_eq!(chars.offset(), '§'.len_utf8());
        assert_eq!(chars.next(), 'a');
    }
}
