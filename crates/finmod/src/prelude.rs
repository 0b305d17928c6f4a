//! Prelude module - common imports for finmod users
//!
//! ```rust
//! use finmod::prelude::*;
//! ```

pub use crate::{
    // Service
    BoardService,
    BoardSnapshot,
    // Cells and values
    CellError,
    CellId,
    CellStatus,
    EmptyPolicy,
    // Engine
    Engine,
    EngineError,
    EngineOptions,
    EngineResult,
    ErrorKind,
    Request,
    TileId,
    Value,
    ValueKind,
};
