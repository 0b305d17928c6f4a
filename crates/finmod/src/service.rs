//! Remote operations on one board
//!
//! [`BoardService`] is the surface a presentation layer talks to. Every
//! operation takes the service lock, runs to completion (including the
//! recalculation cascade) and answers with a fresh [`BoardSnapshot`].
//! Positions arrive as `[column, row]`, the order a grid UI reports them in.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use finmod_core::{BoardId, BoardSnapshot, CellId, TileId};
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, EngineOptions};
use crate::error::{EngineError, EngineResult};

/// Name of the board a new service starts with
pub const DEFAULT_BOARD: &str = "Main";

/// A remote operation, tagged by `op`
///
/// ```json
/// {"op": "update_cell", "tag": 0, "pos": [1, 0], "value": "=[0,0] * 2"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Board,
    AddTile,
    AddRow {
        tag: u32,
    },
    AddColumn {
        tag: u32,
    },
    RemoveRow {
        tag: u32,
    },
    RemoveColumn {
        tag: u32,
    },
    RemoveTile {
        tag: u32,
    },
    UpdateCell {
        tag: u32,
        /// `[column, row]`
        pos: [u32; 2],
        value: String,
    },
    CopyCell {
        tag: u32,
        from: [u32; 2],
        to: [u32; 2],
    },
    SetRowLabel {
        tag: u32,
        index: u32,
        #[serde(default)]
        label: Option<String>,
    },
    SetColLabel {
        tag: u32,
        index: u32,
        #[serde(default)]
        label: Option<String>,
    },
}

/// Serialized access to one board of an engine
#[derive(Debug)]
pub struct BoardService {
    engine: RwLock<Engine>,
    board: BoardId,
}

impl Default for BoardService {
    fn default() -> Self {
        Self::new()
    }
}

fn cell_at(board: BoardId, tag: u32, [col, row]: [u32; 2]) -> CellId {
    CellId::new(board, TileId(tag), row, col)
}

impl BoardService {
    /// Service over a fresh model with one empty board
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let mut engine = Engine::new(options);
        let board = engine.add_board(DEFAULT_BOARD);
        Self::from_engine(engine, board)
    }

    /// Serve `board` of an existing engine
    pub fn from_engine(engine: Engine, board: BoardId) -> Self {
        Self {
            engine: RwLock::new(engine),
            board,
        }
    }

    pub fn board_id(&self) -> BoardId {
        self.board
    }

    /// Read access to the engine, for inspection
    pub fn engine(&self) -> EngineResult<RwLockReadGuard<'_, Engine>> {
        self.engine.read().map_err(|_| EngineError::Poisoned)
    }

    fn engine_mut(&self) -> EngineResult<RwLockWriteGuard<'_, Engine>> {
        self.engine.write().map_err(|_| EngineError::Poisoned)
    }

    /// Run one edit under the lock and snapshot the result
    fn edit<F>(&self, f: F) -> EngineResult<BoardSnapshot>
    where
        F: FnOnce(&mut Engine, BoardId) -> EngineResult<()>,
    {
        let mut engine = self.engine_mut()?;
        f(&mut engine, self.board)?;
        engine.snapshot(self.board)
    }

    /// Current board
    pub fn board(&self) -> EngineResult<BoardSnapshot> {
        self.engine()?.snapshot(self.board)
    }

    /// Append a default table tile
    pub fn add_tile(&self) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.add_tile(board).map(drop))
    }

    pub fn add_row(&self, tag: u32) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.add_row(board, TileId(tag)))
    }

    pub fn add_column(&self, tag: u32) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.add_column(board, TileId(tag)))
    }

    pub fn remove_row(&self, tag: u32) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.remove_row(board, TileId(tag)))
    }

    pub fn remove_column(&self, tag: u32) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.remove_column(board, TileId(tag)))
    }

    pub fn remove_tile(&self, tag: u32) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.remove_tile(board, TileId(tag)))
    }

    /// Set a cell's formula; `pos` is `[column, row]`
    pub fn update_cell(&self, tag: u32, pos: [u32; 2], value: &str) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.update_cell(cell_at(board, tag, pos), value))
    }

    /// Copy a cell within a tile, rebasing its formula
    pub fn copy_cell(&self, tag: u32, from: [u32; 2], to: [u32; 2]) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.copy_cell(cell_at(board, tag, from), cell_at(board, tag, to)))
    }

    pub fn set_row_label(&self, tag: u32, row: u32, label: Option<String>) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.set_row_label(board, TileId(tag), row, label))
    }

    pub fn set_col_label(&self, tag: u32, col: u32, label: Option<String>) -> EngineResult<BoardSnapshot> {
        self.edit(|engine, board| engine.set_col_label(board, TileId(tag), col, label))
    }

    /// Transport-neutral entry point
    pub fn dispatch(&self, request: Request) -> EngineResult<BoardSnapshot> {
        tracing::debug!(?request, "dispatch");
        match request {
            Request::Board => self.board(),
            Request::AddTile => self.add_tile(),
            Request::AddRow { tag } => self.add_row(tag),
            Request::AddColumn { tag } => self.add_column(tag),
            Request::RemoveRow { tag } => self.remove_row(tag),
            Request::RemoveColumn { tag } => self.remove_column(tag),
            Request::RemoveTile { tag } => self.remove_tile(tag),
            Request::UpdateCell { tag, pos, value } => self.update_cell(tag, pos, &value),
            Request::CopyCell { tag, from, to } => self.copy_cell(tag, from, to),
            Request::SetRowLabel { tag, index, label } => self.set_row_label(tag, index, label),
            Request::SetColLabel { tag, index, label } => self.set_col_label(tag, index, label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_service_has_empty_board() {
        let service = BoardService::new();
        assert!(service.board().unwrap().tiles.is_empty());
        assert_eq!(service.engine().unwrap().board_id(DEFAULT_BOARD).unwrap(), service.board_id());
    }

    #[test]
    fn test_positions_are_column_first() {
        let service = BoardService::new();
        service.add_tile().unwrap();
        let snapshot = service.update_cell(0, [1, 0], "7").unwrap();

        // row 0, column 1 is the second cell in row-major order
        assert_eq!(snapshot.tiles[0].cells[1].formula, "7");
    }

    #[test]
    fn test_request_tags() {
        let request: Request =
            serde_json::from_str(r#"{"op":"update_cell","tag":0,"pos":[1,0],"value":"1+1"}"#).unwrap();
        assert_eq!(
            request,
            Request::UpdateCell {
                tag: 0,
                pos: [1, 0],
                value: "1+1".into()
            }
        );
        let request: Request = serde_json::from_str(r#"{"op":"set_col_label","tag":0,"index":1}"#).unwrap();
        assert_eq!(
            request,
            Request::SetColLabel {
                tag: 0,
                index: 1,
                label: None
            }
        );
        assert_eq!(serde_json::to_string(&Request::AddTile).unwrap(), r#"{"op":"add_tile"}"#);
    }
}
