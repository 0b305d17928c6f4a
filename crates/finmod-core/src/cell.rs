//! Cells and cell identity

use std::collections::BTreeSet;
use std::fmt;

use crate::board::BoardId;
use crate::tile::{GridPos, TileId};
use crate::value::{CellError, ErrorKind, Value};

/// Identity of a cell: owning board and tile plus its grid position
///
/// Ordering is (board, tile, row, col), which is the tie-break order used
/// when recalculating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    pub board: BoardId,
    pub tile: TileId,
    pub row: u32,
    pub col: u32,
}

impl CellId {
    /// Create a new cell id
    pub fn new(board: BoardId, tile: TileId, row: u32, col: u32) -> Self {
        Self {
            board,
            tile,
            row,
            col,
        }
    }

    /// Grid position within the owning tile
    pub fn pos(&self) -> GridPos {
        GridPos::new(self.row, self.col)
    }

    /// Same tile, different position
    pub fn at(&self, pos: GridPos) -> Self {
        Self::new(self.board, self.tile, pos.row, pos.col)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[{},{}]", self.board, self.tile, self.row, self.col)
    }
}

/// Lifecycle state of a cell's formula
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellStatus {
    /// No formula has been parsed yet
    #[default]
    Unparsed,
    /// Formula parsed and edges recorded, not yet evaluated
    Parsed,
    /// Value is current
    Evaluated,
    /// Rejected, unresolvable, cyclic or ill-typed
    Errored(CellError),
}

impl CellStatus {
    /// Error kind when errored
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CellStatus::Errored(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Edit history and dependency set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellMeta {
    /// Past values, oldest first; only ever appended
    pub history: Vec<Value>,
    /// Cells this cell's formula reads
    pub dependencies: BTreeSet<CellId>,
}

/// A single cell in a table tile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub value: Value,
    /// Source text of the formula (empty for a blank cell)
    pub formula: String,
    /// Opaque style string, passed through to the presentation layer
    pub style: String,
    pub status: CellStatus,
    pub meta: CellMeta,
}

impl Cell {
    /// Create a blank cell
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the cell has neither formula nor value
    pub fn is_blank(&self) -> bool {
        self.formula.trim().is_empty() && self.value.is_empty()
    }

    /// Check if the cell is in the errored state
    pub fn is_errored(&self) -> bool {
        matches!(self.status, CellStatus::Errored(_))
    }

    /// Replace the value, appending the previous one to history
    ///
    /// Returns `false` when the value did not change; nothing is appended then.
    pub fn record_value(&mut self, value: Value, keep_history: bool) -> bool {
        if self.value == value {
            return false;
        }
        let previous = std::mem::replace(&mut self.value, value);
        if keep_history {
            self.meta.history.push(previous);
        }
        true
    }
}
