//! Components relating to the token tree produced by the parser.
//!
//! The tree is made of four node shapes:
//! - [`AtomToken`]: a single value (a number, a name, a binary literal, ...),
//! - [`BinaryToken`]: an ordered pair (`label: statement`, `NAME(args)`, `name = value`),
//! - [`ArrayToken`]: an ordered list (call arguments, the names of one definition block),
//! - [`ProgramToken`]: the statements of one lexical scope.
//!
//! Every node carries a [`TokenType`] tag, its byte span in the source, and its source line.
//! The tree is immutable once built. Nested scopes are owned by the statement list of
//! their parent scope.
//!
//! To search a tree, see the [`query`] module.

pub mod query;

use std::fmt::Write as _;
use std::ops::Range;

/// The kind of a node in the token tree.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum TokenType {
    /// A decimal number literal.
    Number,
    /// A binary literal (`~1010`).
    Binary,
    /// A string literal (`'lib.math'`).
    String,
    /// A name (instruction, label, variable or constant).
    Identification,
    /// A keyword (`define`, `const`, `input`).
    Keyword,
    /// A punctuation character.
    Punctuation,
    /// A labelled statement (`label: statement`).
    JumpPoint,
    /// An instruction call (`NAME(args)`).
    Call,
    /// A variable definition (`§define name = value`).
    Definition,
    /// A constant definition (`§const name = value`).
    Constant,
    /// The end of a nested scope (`}`).
    ScopeEnd,
    /// A lexical scope.
    Program,
    /// A list of nodes.
    Array,
    /// The absence of a node (e.g., a definition without a value).
    Empty,
}
impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenType::Number         => "NUMBER",
            TokenType::Binary         => "BINARY",
            TokenType::String         => "STRING",
            TokenType::Identification => "IDENTIFICATION",
            TokenType::Keyword        => "KEYWORD",
            TokenType::Punctuation    => "PUNCTUATION",
            TokenType::JumpPoint      => "JUMP_POINT",
            TokenType::Call           => "CALL",
            TokenType::Definition     => "DEFINITION",
            TokenType::Constant       => "CONSTANT",
            TokenType::ScopeEnd       => "SCOPE_END",
            TokenType::Program        => "PROGRAM",
            TokenType::Array          => "ARRAY",
            TokenType::Empty          => "EMPTY",
        };
        f.write_str(name)
    }
}

/// A node holding a single value.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct AtomToken {
    ty: TokenType,
    value: String,
    span: Range<usize>,
    line: usize
}
impl AtomToken {
    /// Creates a new atom.
    pub fn new(ty: TokenType, value: impl Into<String>, span: Range<usize>, line: usize) -> Self {
        Self { ty, value: value.into(), span, line }
    }
    /// The kind of this atom.
    pub fn ty(&self) -> TokenType {
        self.ty
    }
    /// The value of this atom as written in source
    /// (without the `~` of binary literals or the quotes of strings).
    pub fn value(&self) -> &str {
        &self.value
    }
    /// The value of this atom as a number, if it is a number literal.
    pub fn number(&self) -> Option<i64> {
        match self.ty {
            TokenType::Number => self.value.parse().ok(),
            _ => None
        }
    }
    /// The byte span of this atom.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }
    /// The source line of this atom (zero-based).
    pub fn line(&self) -> usize {
        self.line
    }
}

/// A node holding an ordered pair of nodes.
///
/// | type         | first          | second                      |
/// |--------------|----------------|-----------------------------|
/// | `JumpPoint`  | label name     | labelled statement          |
/// | `Call`       | instruction    | arguments ([`ArrayToken`])  |
/// | `Definition` | variable name  | value, or [`Token::Empty`]  |
/// | `Constant`   | constant name  | value                       |
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct BinaryToken {
    ty: TokenType,
    first: Box<Token>,
    second: Box<Token>,
    span: Range<usize>,
    line: usize
}
impl BinaryToken {
    /// Creates a new pair.
    pub fn new(ty: TokenType, first: Token, second: Token, span: Range<usize>, line: usize) -> Self {
        Self { ty, first: Box::new(first), second: Box::new(second), span, line }
    }
    /// The kind of this pair.
    pub fn ty(&self) -> TokenType {
        self.ty
    }
    /// The first element.
    pub fn first(&self) -> &Token {
        &self.first
    }
    /// The second element.
    pub fn second(&self) -> &Token {
        &self.second
    }
    /// The name held by the first element, if it is an atom.
    ///
    /// This is the label of a jump point, the instruction of a call,
    /// and the name bound by a definition.
    pub fn name(&self) -> Option<&str> {
        self.first.as_atom().map(AtomToken::value)
    }
    /// The arguments of a call.
    pub fn args(&self) -> &[Token] {
        match &*self.second {
            Token::Array(a) => a.elements(),
            _ => &[]
        }
    }
    /// The byte span of this pair.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }
    /// The source line of this pair (zero-based).
    pub fn line(&self) -> usize {
        self.line
    }
}

/// A node holding a list of nodes.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ArrayToken {
    elements: Vec<Token>,
    span: Range<usize>,
    line: usize
}
impl ArrayToken {
    /// Creates a new list.
    pub fn new(elements: Vec<Token>, span: Range<usize>, line: usize) -> Self {
        Self { elements, span, line }
    }
    /// The elements of this list.
    pub fn elements(&self) -> &[Token] {
        &self.elements
    }
    /// The byte span of this list.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }
    /// The source line of this list (zero-based).
    pub fn line(&self) -> usize {
        self.line
    }
}

/// The statements of one lexical scope.
///
/// Along with its statements, a scope knows which of its statements are labelled.
/// Chained labels (`a: b: NOT();`) all point to the same statement.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct ProgramToken {
    statements: Vec<Token>,
    jumps: Vec<(String, usize)>,
    span: Range<usize>,
    line: usize
}
impl ProgramToken {
    /// Creates a new scope from its statements, computing the labels it declares.
    pub fn new(statements: Vec<Token>, span: Range<usize>, line: usize) -> Self {
        let mut jumps = vec![];
        for (i, stmt) in statements.iter().enumerate() {
            let mut current = stmt;
            while let Token::Binary(b) = current {
                if b.ty() != TokenType::JumpPoint { break; }
                if let Some(label) = b.name() {
                    jumps.push((label.to_string(), i));
                }
                current = b.second();
            }
        }

        Self { statements, jumps, span, line }
    }
    /// The statements of this scope.
    pub fn statements(&self) -> &[Token] {
        &self.statements
    }
    /// Gets the statement at the given index.
    pub fn get(&self, index: usize) -> Option<&Token> {
        self.statements.get(index)
    }
    /// The number of statements in this scope.
    pub fn len(&self) -> usize {
        self.statements.len()
    }
    /// Whether this scope has no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
    /// The labels declared in this scope, in source order, along with the index of the statement they label.
    pub fn jumps(&self) -> &[(String, usize)] {
        &self.jumps
    }
    /// The byte span of this scope.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }
    /// The source line where this scope starts (zero-based).
    pub fn line(&self) -> usize {
        self.line
    }

    /// Flattens this scope into a stream of nodes.
    ///
    /// - Labelled statements produce themselves, followed by the statement they label.
    /// - Lists (like definition blocks) produce their elements.
    /// - Nested scopes produce their statements if `recursive` is true,
    ///   and themselves otherwise.
    /// - All other nodes (including calls) produce themselves.
    pub fn stream(&self, recursive: bool) -> Flatten<'_> {
        Flatten {
            stack: self.statements.iter().rev().collect(),
            recursive
        }
    }
}

/// A node in the token tree.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Token {
    /// A single value.
    Atom(AtomToken),
    /// An ordered pair.
    Binary(BinaryToken),
    /// A list.
    Array(ArrayToken),
    /// A nested scope.
    Program(ProgramToken),
    /// No value, located at the given offset.
    Empty(usize)
}
impl Token {
    /// The kind of this node.
    pub fn ty(&self) -> TokenType {
        match self {
            Token::Atom(t)    => t.ty(),
            Token::Binary(t)  => t.ty(),
            Token::Array(_)   => TokenType::Array,
            Token::Program(_) => TokenType::Program,
            Token::Empty(_)   => TokenType::Empty,
        }
    }
    /// The byte span of this node.
    pub fn span(&self) -> Range<usize> {
        match self {
            Token::Atom(t)    => t.span(),
            Token::Binary(t)  => t.span(),
            Token::Array(t)   => t.span(),
            Token::Program(t) => t.span(),
            &Token::Empty(o)  => o..o,
        }
    }
    /// The byte offset of the start of this node.
    pub fn offset(&self) -> usize {
        self.span().start
    }
    /// The source line of this node (zero-based), if it has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Token::Atom(t)    => Some(t.line()),
            Token::Binary(t)  => Some(t.line()),
            Token::Array(t)   => Some(t.line()),
            Token::Program(t) => Some(t.line()),
            Token::Empty(_)   => None,
        }
    }
    /// The value of this node, if it is an atom.
    pub fn value(&self) -> Option<&str> {
        self.as_atom().map(AtomToken::value)
    }
    /// The name of this node, if it is a pair whose first element is an atom.
    pub fn name(&self) -> Option<&str> {
        self.as_binary().and_then(BinaryToken::name)
    }
    /// This node as an atom.
    pub fn as_atom(&self) -> Option<&AtomToken> {
        match self {
            Token::Atom(t) => Some(t),
            _ => None
        }
    }
    /// This node as a pair.
    pub fn as_binary(&self) -> Option<&BinaryToken> {
        match self {
            Token::Binary(t) => Some(t),
            _ => None
        }
    }
    /// This node as a list.
    pub fn as_array(&self) -> Option<&ArrayToken> {
        match self {
            Token::Array(t) => Some(t),
            _ => None
        }
    }
    /// This node as a scope.
    pub fn as_program(&self) -> Option<&ProgramToken> {
        match self {
            Token::Program(t) => Some(t),
            _ => None
        }
    }
}
impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Atom(t) => match t.ty() {
                TokenType::Binary   => write!(f, "~{}", t.value()),
                TokenType::String   => write!(f, "'{}'", t.value()),
                TokenType::ScopeEnd => f.write_char('}'),
                _ => f.write_str(t.value()),
            },
            Token::Binary(t) => match t.ty() {
                TokenType::JumpPoint  => write!(f, "{}: {}", t.first(), t.second()),
                TokenType::Call       => write!(f, "{}{}", t.first(), t.second()),
                TokenType::Definition | TokenType::Constant => {
                    write!(f, "{}", t.first())?;
                    match t.second() {
                        Token::Empty(_) => Ok(()),
                        value => write!(f, " = {value}")
                    }
                },
                _ => write!(f, "({}, {})", t.first(), t.second()),
            },
            Token::Array(t) => {
                // definition blocks print with their keyword, argument lists with parentheses
                match t.elements().first().map(Token::ty) {
                    Some(TokenType::Definition) => f.write_str("§define ")?,
                    Some(TokenType::Constant)   => f.write_str("§const ")?,
                    _ => f.write_char('(')?,
                }
                let mut iter = t.elements().iter();
                if let Some(first) = iter.next() {
                    write!(f, "{first}")?;
                }
                for el in iter {
                    write!(f, ", {el}")?;
                }
                match t.elements().first().map(Token::ty) {
                    Some(TokenType::Definition | TokenType::Constant) => Ok(()),
                    _ => f.write_char(')'),
                }
            },
            Token::Program(t) => {
                f.write_str("{ ")?;
                for stmt in t.statements() {
                    write!(f, "{stmt}; ")?;
                }
                f.write_char('}')
            },
            Token::Empty(_) => Ok(()),
        }
    }
}

/// A depth-first stream over a flattened scope.
///
/// Created by [`ProgramToken::stream`].
#[derive(Debug, Clone)]
pub struct Flatten<'t> {
    stack: Vec<&'t Token>,
    recursive: bool
}
impl<'t> Iterator for Flatten<'t> {
    type Item = &'t Token;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(tok) = self.stack.pop() {
            match tok {
                Token::Program(p) if self.recursive => self.stack.extend(p.statements().iter().rev()),
                Token::Array(a) => self.stack.extend(a.elements().iter().rev()),
                Token::Binary(b) if b.ty() == TokenType::JumpPoint => {
                    self.stack.push(b.second());
                    return Some(tok);
                },
                _ => return Some(tok),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{AtomToken, ArrayToken, BinaryToken, ProgramToken, Token, TokenType};

    fn ident(s: &str) -> Token {
        Token::Atom(AtomToken::new(TokenType::Identification, s, 0..0, 0))
    }
    fn call(name: &str) -> Token {
        Token::Binary(BinaryToken::new(TokenType::Call, ident(name), Token::Array(ArrayToken::new(vec![], 0..0, 0)), 0..0, 0))
    }
    fn label(name: &str, stmt: Token) -> Token {
        Token::Binary(BinaryToken::new(TokenType::JumpPoint, ident(name), stmt, 0..0, 0))
    }

    #[test]
    fn test_chained_labels() {
        let program = ProgramToken::new(vec![
            call("A"),
            label("a", label("b", call("B"))),
        ], 0..0, 0);

        assert_eq!(program.jumps(), &[("a".to_string(), 1), ("b".to_string(), 1)]);
    }

    #[test]
    fn test_stream() {
        let inner = ProgramToken::new(vec![call("C")], 0..0, 0);
        let program = ProgramToken::new(vec![
            label("a", call("A")),
            Token::Program(inner),
            call("B"),
        ], 0..0, 0);

        let shallow: Vec<_> = program.stream(false).map(Token::ty).collect();
        assert_eq!(shallow, [TokenType::JumpPoint, TokenType::Call, TokenType::Program, TokenType::Call]);

        let deep: Vec<_> = program.stream(true)
            .filter(|t| t.ty() == TokenType::Call)
            .filter_map(Token::name)
            .collect();
        assert_eq!(deep, ["A", "C", "B"]);
    }

    #[test]
    fn test_display() {
        let stmt = label("loop", call("HALT"));
        assert_eq!(stmt.to_string(), "loop: HALT()");
    }
}
