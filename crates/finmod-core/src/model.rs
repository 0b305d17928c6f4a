//! The model: top-level container of boards

use std::collections::BTreeMap;

use crate::board::{Board, BoardId};
use crate::cell::{Cell, CellId};
use crate::error::{Error, Result};
use crate::tile::Tile;

/// Owns every board; has no behavior of its own beyond lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    boards: BTreeMap<BoardId, Board>,
    next_board: u32,
}

impl Model {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty board
    pub fn add_board(&mut self, name: impl Into<String>) -> BoardId {
        let id = BoardId(self.next_board);
        self.next_board += 1;
        self.boards.insert(id, Board::new(id, name));
        id
    }

    pub fn board(&self, id: BoardId) -> Option<&Board> {
        self.boards.get(&id)
    }

    pub fn board_mut(&mut self, id: BoardId) -> Result<&mut Board> {
        self.boards.get_mut(&id).ok_or(Error::BoardNotFound(id))
    }

    /// Find a board by name
    pub fn board_by_name(&self, name: &str) -> Option<&Board> {
        self.boards.values().find(|board| board.name == name)
    }

    pub fn boards(&self) -> impl Iterator<Item = &Board> + '_ {
        self.boards.values()
    }

    /// Tile owning a cell
    pub fn tile_of(&self, id: CellId) -> Option<&Tile> {
        self.board(id.board)?.tile(id.tile)
    }

    /// Look up a cell by id
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.tile_of(id)?.as_table()?.cell(id.pos())
    }

    /// Look up a mutable cell by id
    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.boards
            .get_mut(&id.board)?
            .tile_mut(id.tile)
            .ok()?
            .as_table_mut()?
            .cell_mut(id.pos())
    }

    /// Ids of every cell on a board, ascending
    pub fn cell_ids(&self, board: BoardId) -> Vec<CellId> {
        let Some(board) = self.board(board) else {
            return Vec::new();
        };
        board
            .tiles()
            .filter_map(|tile| tile.as_table().map(|table| (tile.id, table)))
            .flat_map(|(tile, table)| {
                table
                    .cells()
                    .map(move |(pos, _)| CellId::new(board.id, tile, pos.row, pos.col))
            })
            .collect()
    }
}
