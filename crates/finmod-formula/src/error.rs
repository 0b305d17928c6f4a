//! Formula error types

use std::fmt;

use finmod_core::{CellError, ErrorKind};
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Something the parser was looking for when it gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expected {
    /// Literal text such as `)` or `then`
    Token(&'static str),
    /// Named construct such as "number" or "expression"
    Construct(&'static str),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Token(text) => write!(f, "'{text}'"),
            Expected::Construct(name) => f.write_str(name),
        }
    }
}

/// Positioned parse failure: the furthest byte offset reached and what
/// would have been accepted there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub expected: Vec<Expected>,
    pub found: Option<char>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at byte {}: expected ", self.offset)?;
        match self.expected.split_last() {
            None => f.write_str("nothing")?,
            Some((last, [])) => write!(f, "{last}")?,
            Some((last, rest)) => {
                for (i, item) in rest.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, " or {last}")?;
            }
        }
        match self.found {
            Some(c) => write!(f, ", found '{c}'"),
            None => f.write_str(", found end of formula"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for CellError {
    fn from(e: ParseError) -> Self {
        CellError::new(ErrorKind::Parse, e.to_string())
    }
}

/// Errors that can occur during formula parsing or evaluation
#[derive(Debug, Error)]
pub enum FormulaError {
    /// Formula parse error
    #[error("Parse error {0}")]
    Parse(#[from] ParseError),

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Reference that cannot be resolved
    #[error("Invalid reference: {0}")]
    InvalidReference(String),
}

impl From<FormulaError> for CellError {
    fn from(e: FormulaError) -> Self {
        match e {
            FormulaError::Parse(p) => p.into(),
            FormulaError::InvalidReference(msg) => CellError::reference(msg),
            other => CellError::value(other.to_string()),
        }
    }
}
