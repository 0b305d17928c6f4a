//! Error types for finmod-core

use thiserror::Error;

use crate::board::BoardId;
use crate::tile::TileId;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by structural operations on the model
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Board lookup failed
    #[error("Board not found: {0}")]
    BoardNotFound(BoardId),

    /// Tile lookup by id failed
    #[error("Tile not found: {0}")]
    TileNotFound(TileId),

    /// Tile lookup by name failed
    #[error("Tile name not found: {0}")]
    TileNameNotFound(String),

    /// Row index out of bounds
    #[error("Row index {0} out of bounds (rows: {1})")]
    RowOutOfBounds(u32, u32),

    /// Column index out of bounds
    #[error("Column index {0} out of bounds (columns: {1})")]
    ColumnOutOfBounds(u32, u32),

    /// Operation needs a table tile
    #[error("Tile {tile} is a {actual} tile, expected a table tile")]
    NotATable { tile: TileId, actual: &'static str },

    /// A label override is empty or collides with another label on the axis
    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    /// A tile cannot shrink below one row or column
    #[error("Tile {0} cannot shrink further")]
    CannotShrink(TileId),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
