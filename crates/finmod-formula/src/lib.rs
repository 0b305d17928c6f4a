//! # finmod-formula
//!
//! Formula parser and evaluator for finmod.
//!
//! This crate provides:
//! - Formula parsing (text -> token, node and value arenas)
//! - Reference resolution for the Position, Address, Relative and
//!   Shorthand styles, with board and tile selectors
//! - Formula evaluation against capability traits
//! - Dependency tracking for recalculation
//! - Rendering and copy rebasing of formulas
//!
//! ## Example
//!
//! ```rust
//! use finmod_core::{CellId, Model, Value};
//! use finmod_formula::{evaluate, parse_formula, EvalOptions};
//!
//! let mut model = Model::new();
//! let board = model.add_board("Main");
//! let tile = model.board_mut(board).unwrap().add_table(2, 2);
//! model.cell_mut(CellId::new(board, tile, 0, 0)).unwrap().value = Value::Int(2);
//!
//! let formula = parse_formula("=[0,0] * 3").unwrap();
//! let caller = CellId::new(board, tile, 1, 0);
//! let value = evaluate(&formula, &model, caller, formula.root(), EvalOptions::default());
//! assert_eq!(value.to_string(), "6");
//! ```

pub mod ast;
pub mod context;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod ops;
pub mod parser;
pub mod reference;
pub mod render;
pub mod token;

pub use ast::{BinaryOperator, Formula, Node, NodeId, RefStyle, UnaryOperator, ValId};
pub use context::{BoardContext, ModelContext, ObjectContext, TileContext, TokenContext};
pub use dependency::{DependencyGraph, EdgeDiff};
pub use error::{Expected, FormulaError, FormulaResult, ParseError};
pub use evaluator::{evaluate, EmptyPolicy, EvalOptions};
pub use parser::{parse_formula, ParseState, Parser};
pub use reference::{dependencies, read, resolve, CellRange, Span};
pub use render::{rebase, render, Shift};
pub use token::{Token, TokenId, TokenTag};
