//! Boards: named containers of tiles

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::tile::{Tile, TileId, TileKind};

/// Board identifier, unique within a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoardId(pub u32);

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A board owns tiles keyed by id, in creation order
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub id: BoardId,
    /// Name used by `#'Name'` selectors
    pub name: String,
    tiles: BTreeMap<TileId, Tile>,
    next_tile: u32,
}

impl Board {
    /// Create an empty board
    pub fn new(id: BoardId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            tiles: BTreeMap::new(),
            next_tile: 0,
        }
    }

    /// Add a table tile named `t<id>`
    pub fn add_table(&mut self, rows: u32, cols: u32) -> TileId {
        let id = self.allocate();
        self.tiles
            .insert(id, Tile::table(id, format!("t{}", id.0), rows, cols));
        id
    }

    /// Add a tile of another variant
    pub fn add_tile(&mut self, name: impl Into<String>, kind: TileKind) -> TileId {
        let id = self.allocate();
        self.tiles.insert(id, Tile::with_kind(id, name, kind));
        id
    }

    fn allocate(&mut self) -> TileId {
        let id = TileId(self.next_tile);
        self.next_tile += 1;
        id
    }

    /// Remove a tile
    pub fn remove_tile(&mut self, id: TileId) -> Result<Tile> {
        self.tiles.remove(&id).ok_or(Error::TileNotFound(id))
    }

    /// Get a tile by id
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    /// Get a mutable tile by id
    pub fn tile_mut(&mut self, id: TileId) -> Result<&mut Tile> {
        self.tiles.get_mut(&id).ok_or(Error::TileNotFound(id))
    }

    /// Find a tile by name
    pub fn tile_by_name(&self, name: &str) -> Option<&Tile> {
        self.tiles.values().find(|tile| tile.name == name)
    }

    /// Iterate over tiles in id order
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> + '_ {
        self.tiles.values()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}
