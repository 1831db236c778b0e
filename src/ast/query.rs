//! Filtered views over a token tree.
//!
//! A [`ProgramQuery`] flattens a [`ProgramToken`] (see [`ProgramToken::stream`])
//! and keeps the nodes that satisfy a chain of predicates.
//! Predicates are joined left to right with [`QueryResult::and`] and [`QueryResult::or`].
//!
//! ```
//! use mima::ast::TokenType;
//! use mima::ast::query::ProgramQuery;
//! use mima::parse::parse_program;
//!
//! let (program, _) = parse_program("a: LDC(1); §define x; b: HALT();");
//!
//! let labels: Vec<_> = ProgramQuery::new(&program)
//!     .where_equal(|t| t.ty(), TokenType::JumpPoint)
//!     .get(true)
//!     .into_iter()
//!     .filter_map(|t| t.name())
//!     .collect();
//! assert_eq!(labels, ["a", "b"]);
//!
//! let has_defs = ProgramQuery::new(&program)
//!     .where_equal(|t| t.ty(), TokenType::Definition)
//!     .or()
//!     .where_equal(|t| t.ty(), TokenType::Constant)
//!     .any_match(true);
//! assert!(has_defs);
//! ```

use super::{ProgramToken, Token};

type Predicate<'t> = Box<dyn Fn(&'t Token) -> bool + 't>;

enum Join {
    And,
    Or
}

/// A query over a scope which is waiting for its next predicate.
pub struct ProgramQuery<'t> {
    program: &'t ProgramToken,
    filter: Option<Predicate<'t>>,
    join: Join
}
impl<'t> ProgramQuery<'t> {
    /// Creates a query over the given scope.
    pub fn new(program: &'t ProgramToken) -> Self {
        Self { program, filter: None, join: Join::And }
    }

    fn push(self, pred: Predicate<'t>) -> QueryResult<'t> {
        let filter: Predicate<'t> = match (self.filter, self.join) {
            (None, _) => pred,
            (Some(prev), Join::And) => Box::new(move |t| prev(t) && pred(t)),
            (Some(prev), Join::Or)  => Box::new(move |t| prev(t) || pred(t)),
        };
        QueryResult { program: self.program, filter }
    }

    /// Keeps nodes whose projection equals `value`.
    pub fn where_equal<K, F>(self, projection: F, value: K) -> QueryResult<'t>
        where K: PartialEq + 't,
              F: Fn(&'t Token) -> K + 't
    {
        self.push(Box::new(move |t| projection(t) == value))
    }

    /// Keeps nodes whose projection does not equal `value`.
    pub fn where_not_equal<K, F>(self, projection: F, value: K) -> QueryResult<'t>
        where K: PartialEq + 't,
              F: Fn(&'t Token) -> K + 't
    {
        self.push(Box::new(move |t| projection(t) != value))
    }

    /// Keeps nodes which satisfy `pred`.
    pub fn where_(self, pred: impl Fn(&'t Token) -> bool + 't) -> QueryResult<'t> {
        self.push(Box::new(pred))
    }

    /// Keeps nodes which do not satisfy `pred`.
    pub fn where_not(self, pred: impl Fn(&'t Token) -> bool + 't) -> QueryResult<'t> {
        self.push(Box::new(move |t| !pred(t)))
    }
}

/// A query with a complete filter, which can either be evaluated
/// or extended with another predicate.
pub struct QueryResult<'t> {
    program: &'t ProgramToken,
    filter: Predicate<'t>
}
impl<'t> QueryResult<'t> {
    /// Requires the next predicate to hold as well.
    pub fn and(self) -> ProgramQuery<'t> {
        ProgramQuery { program: self.program, filter: Some(self.filter), join: Join::And }
    }

    /// Accepts nodes which satisfy the next predicate instead.
    pub fn or(self) -> ProgramQuery<'t> {
        ProgramQuery { program: self.program, filter: Some(self.filter), join: Join::Or }
    }

    /// All matching nodes, in source order.
    ///
    /// If `recursive` is true, nested scopes are searched too.
    pub fn get(&self, recursive: bool) -> Vec<&'t Token> {
        self.program.stream(recursive)
            .filter(|t| (self.filter)(t))
            .collect()
    }

    /// The first matching node.
    pub fn find_first(&self, recursive: bool) -> Option<&'t Token> {
        self.program.stream(recursive).find(|t| (self.filter)(t))
    }

    /// Whether any node matches.
    pub fn any_match(&self, recursive: bool) -> bool {
        self.find_first(recursive).is_some()
    }

    /// Whether no node matches.
    pub fn is_empty(&self, recursive: bool) -> bool {
        !self.any_match(recursive)
    }
}
