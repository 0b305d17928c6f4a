//! # finmod
//!
//! A recalculating financial-modeling engine.
//!
//! A [`Model`] holds boards, a board holds tiles and a table tile holds a
//! grid of cells. Each cell carries a formula; the [`Engine`] parses it,
//! tracks which cells it reads and keeps every value current as cells
//! change. [`BoardService`] wraps an engine behind a lock and answers each
//! operation with a [`BoardSnapshot`] for the presentation layer.
//!
//! ## Example
//!
//! ```rust
//! use finmod::prelude::*;
//!
//! let service = BoardService::new();
//! service.add_tile().unwrap();
//! service.update_cell(0, [0, 0], "1+1").unwrap();
//! let board = service.update_cell(0, [0, 1], "[0,0] * 10").unwrap();
//!
//! assert_eq!(board.tiles[0].cells[2].formula, "[0,0] * 10");
//! let engine = service.engine().unwrap();
//! let id = CellId::new(service.board_id(), TileId(0), 1, 0);
//! assert_eq!(engine.value(id).map(Value::to_string), Some("20".to_string()));
//! ```

pub mod engine;
pub mod error;
pub mod prelude;
pub mod service;

pub use engine::{Engine, EngineOptions};
pub use error::{EngineError, EngineResult};
pub use service::{BoardService, Request, DEFAULT_BOARD};

// Re-export core types
pub use finmod_core::{
    Board, BoardId, BoardSnapshot, Cell, CellError, CellId, CellSnapshot, CellStatus, ErrorKind,
    Model, TableTile, Tile, TileId, TileSnapshot, Value, ValueKind, ValueSnapshot, DEFAULT_COLS,
    DEFAULT_ROWS,
};

// Re-export formula types
pub use finmod_formula::{
    evaluate, parse_formula, render, DependencyGraph, EmptyPolicy, EvalOptions, Formula,
    ParseError,
};
