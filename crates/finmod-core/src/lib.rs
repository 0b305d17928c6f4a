//! # finmod-core
//!
//! Core data structures for the finmod financial-modeling engine.
//!
//! This crate provides the fundamental types used throughout finmod:
//! - [`Model`], [`Board`], [`Tile`] - The containers, outermost first
//! - [`Cell`] and [`CellId`] - Addressable units holding a value and a formula
//! - [`Value`] - Typed values (exact decimals, lists, arrays, records, errors)
//! - [`BoardSnapshot`] - The wire shape handed to the presentation layer
//!
//! ## Example
//!
//! ```rust
//! use finmod_core::{CellId, Model, Value};
//!
//! let mut model = Model::new();
//! let board = model.add_board("Main");
//! let tile = model.board_mut(board).unwrap().add_table(2, 2);
//!
//! let id = CellId::new(board, tile, 0, 0);
//! model.cell_mut(id).unwrap().value = Value::number(42);
//!
//! let snapshot = model.board(board).unwrap().snapshot();
//! assert_eq!(snapshot.tiles[0].cells.len(), 4);
//! ```

pub mod board;
pub mod cell;
pub mod error;
pub mod label;
pub mod model;
pub mod snapshot;
pub mod tile;
pub mod value;

// Re-exports for convenience
pub use board::{Board, BoardId};
pub use cell::{Cell, CellId, CellMeta, CellStatus};
pub use error::{Error, Result};
pub use label::{index_to_label, label_to_index, Axis};
pub use model::Model;
pub use snapshot::{BoardSnapshot, CellSnapshot, TileSnapshot, ValueSnapshot};
pub use tile::{
    ChartKind, Extent, GraphTile, GridPos, PivotTile, Placement, QueryTile, TableTile, Tile,
    TileId, TileKind,
};
pub use value::{CellError, ErrorKind, Value, ValueKind};

/// Rows of a freshly added table tile
pub const DEFAULT_ROWS: u32 = 2;

/// Columns of a freshly added table tile
pub const DEFAULT_COLS: u32 = 2;

pub use rust_decimal::Decimal;
