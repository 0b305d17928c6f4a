//! Engine error types

use finmod_core::{CellError, CellId};
use finmod_formula::ParseError;
use thiserror::Error;

/// Result type for engine and service operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors surfaced to the caller of an engine operation
///
/// Evaluation problems are not in here: they end up as error values in the
/// affected cells and the operation itself succeeds.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structural error from the model
    #[error(transparent)]
    Core(#[from] finmod_core::Error),

    /// Formula text did not parse; the cell keeps its previous formula
    #[error("Formula rejected at {cell}: {error}")]
    Parse { cell: CellId, error: ParseError },

    /// No cell at the given position
    #[error("Cell not found: {0}")]
    CellNotFound(CellId),

    /// No board with the given name
    #[error("Board not found: {0}")]
    BoardNameNotFound(String),

    /// The copied formula cannot be moved to the target cell
    #[error("Cannot copy {from} to {to}: {error}")]
    Copy {
        from: CellId,
        to: CellId,
        error: CellError,
    },

    /// A previous edit panicked while holding the service lock
    #[error("Board state is poisoned")]
    Poisoned,
}
