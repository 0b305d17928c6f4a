//! Recalculation engine
//!
//! The engine owns the [`Model`], the parsed formula of every cell that has
//! one, and the [`DependencyGraph`] between them. Every mutation goes
//! through it, and each one returns only after the recalculation cascade
//! it triggers has finished.
//!
//! # Example
//!
//! ```rust
//! use finmod::{CellId, Engine, EngineOptions, Value};
//!
//! let mut engine = Engine::new(EngineOptions::default());
//! let board = engine.add_board("Main");
//! let tile = engine.add_tile(board).unwrap();
//! let a = CellId::new(board, tile, 0, 0);
//! let b = CellId::new(board, tile, 1, 0);
//!
//! engine.update_cell(a, "1+1").unwrap();
//! engine.update_cell(b, "-[-1,0]*2").unwrap();
//! engine.update_cell(a, "3").unwrap();
//!
//! assert_eq!(engine.value(b).map(Value::to_string), Some("6".to_string()));
//! ```

use std::collections::BTreeSet;

use ahash::AHashMap;
use finmod_core::{
    BoardId, BoardSnapshot, Cell, CellError, CellId, CellStatus, ErrorKind, Model, TableTile, TileId,
    Value, DEFAULT_COLS, DEFAULT_ROWS,
};
use finmod_formula::{
    dependencies, evaluate, parse_formula, rebase, DependencyGraph, EmptyPolicy, EvalOptions, Formula,
    Shift,
};

use crate::error::{EngineError, EngineResult};

/// Options for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Treatment of `()`, `List()` and other untyped empty collections
    pub empty_policy: EmptyPolicy,
    /// Append replaced values to each cell's history
    pub record_history: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            empty_policy: EmptyPolicy::RequireExplicit,
            record_history: true,
        }
    }
}

/// The recalculation engine
#[derive(Debug, Default)]
pub struct Engine {
    model: Model,
    /// Parsed formulas, keyed by the cell that holds them
    formulas: AHashMap<CellId, Formula>,
    graph: DependencyGraph,
    options: EngineOptions,
}

impl Engine {
    /// Create an engine over an empty model
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Take over an existing model, parsing and evaluating every formula in it
    pub fn with_model(model: Model, options: EngineOptions) -> Self {
        let mut engine = Self {
            model,
            options,
            ..Self::default()
        };

        let boards: Vec<BoardId> = engine.model.boards().map(|b| b.id).collect();
        for board in boards {
            for id in engine.model.cell_ids(board) {
                let Some(cell) = engine.model.cell_mut(id) else {
                    continue;
                };
                if cell.formula.trim().is_empty() {
                    continue;
                }
                match parse_formula(&cell.formula) {
                    Ok(formula) => {
                        cell.status = CellStatus::Parsed;
                        engine.formulas.insert(id, formula);
                    }
                    Err(error) => {
                        tracing::warn!(cell = %id, %error, "formula rejected");
                        cell.status = CellStatus::Errored(error.into());
                    }
                }
            }
        }

        engine.recalculate_all();
        engine
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Parsed formula of a cell
    pub fn formula(&self, id: CellId) -> Option<&Formula> {
        self.formulas.get(&id)
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.model.cell(id)
    }

    pub fn value(&self, id: CellId) -> Option<&Value> {
        self.model.cell(id).map(|cell| &cell.value)
    }

    /// Values a cell held before its current one, oldest first
    pub fn history(&self, id: CellId) -> Option<&[Value]> {
        self.model.cell(id).map(|cell| cell.meta.history.as_slice())
    }

    /// Find a board by name
    pub fn board_id(&self, name: &str) -> EngineResult<BoardId> {
        self.model
            .board_by_name(name)
            .map(|board| board.id)
            .ok_or_else(|| EngineError::BoardNameNotFound(name.to_string()))
    }

    /// Render a board for the presentation layer
    pub fn snapshot(&self, board: BoardId) -> EngineResult<BoardSnapshot> {
        self.model
            .board(board)
            .map(|board| board.snapshot())
            .ok_or_else(|| finmod_core::Error::BoardNotFound(board).into())
    }

    fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            empty_policy: self.options.empty_policy,
        }
    }

    fn cell_mut(&mut self, id: CellId) -> EngineResult<&mut Cell> {
        self.model.cell_mut(id).ok_or(EngineError::CellNotFound(id))
    }

    fn table_mut(&mut self, board: BoardId, tile: TileId) -> EngineResult<&mut TableTile> {
        Ok(self.model.board_mut(board)?.tile_mut(tile)?.table_mut()?)
    }

    // === Cell edits ===

    /// Replace the formula of a cell and recalculate everything downstream
    ///
    /// A formula that does not parse marks the cell errored, keeps its
    /// previous formula, value and edges, and is returned as
    /// [`EngineError::Parse`]. A formula that closes a cycle is accepted;
    /// every cell on the cycle is marked errored and keeps its value.
    pub fn update_cell(&mut self, id: CellId, text: &str) -> EngineResult<()> {
        if self.model.cell(id).is_none() {
            return Err(EngineError::CellNotFound(id));
        }
        if text.trim().is_empty() {
            self.clear_cell(id);
            return Ok(());
        }

        let formula = match parse_formula(text) {
            Ok(formula) => formula,
            Err(error) => {
                tracing::warn!(cell = %id, %error, "formula rejected");
                self.cell_mut(id)?.status = CellStatus::Errored(error.clone().into());
                return Err(EngineError::Parse { cell: id, error });
            }
        };
        tracing::debug!(cell = %id, nodes = formula.nodes().len(), "formula parsed");

        let cell = self.cell_mut(id)?;
        cell.formula = text.to_string();
        cell.status = CellStatus::Parsed;
        self.formulas.insert(id, formula);
        self.link(id);

        if !self.flag_cycle(id) {
            self.recalculate_from(&[id]);
        }
        Ok(())
    }

    /// Blank a cell: no formula, no edges, an empty value
    fn clear_cell(&mut self, id: CellId) {
        self.formulas.remove(&id);
        self.graph.clear_dependencies(id);
        let keep = self.options.record_history;
        if let Some(cell) = self.model.cell_mut(id) {
            cell.formula.clear();
            cell.status = CellStatus::Unparsed;
            cell.meta.dependencies.clear();
            cell.record_value(Value::Empty(None), keep);
        }
        self.recalculate_from(&[id]);
    }

    /// Copy a cell's formula and style, moving unpinned references along
    pub fn copy_cell(&mut self, from: CellId, to: CellId) -> EngineResult<()> {
        let source = self.model.cell(from).ok_or(EngineError::CellNotFound(from))?;
        let style = source.style.clone();
        let text = match self.formulas.get(&from) {
            None => source.formula.clone(),
            Some(formula) => {
                let origin_board = if from.board == to.board {
                    None
                } else {
                    self.model.board(from.board).map(|board| board.name.clone())
                };
                let shift = Shift {
                    rows: i64::from(to.row) - i64::from(from.row),
                    cols: i64::from(to.col) - i64::from(from.col),
                    origin_board,
                };
                rebase(formula, &shift).map_err(|error| EngineError::Copy { from, to, error })?
            }
        };
        tracing::debug!(%from, %to, formula = %text, "copying cell");

        self.cell_mut(to)?.style = style;
        self.update_cell(to, &text)
    }

    // === Structure ===

    /// Add an empty board
    pub fn add_board(&mut self, name: impl Into<String>) -> BoardId {
        self.model.add_board(name)
    }

    /// Append a default table tile to a board
    pub fn add_tile(&mut self, board: BoardId) -> EngineResult<TileId> {
        let tile = self.model.board_mut(board)?.add_table(DEFAULT_ROWS, DEFAULT_COLS);
        tracing::debug!(%board, %tile, "tile added");
        self.recalculate_all();
        Ok(tile)
    }

    /// Remove a tile and every cell in it
    pub fn remove_tile(&mut self, board: BoardId, tile: TileId) -> EngineResult<()> {
        let removed = self.model.board_mut(board)?.remove_tile(tile)?;
        if let Some(table) = removed.as_table() {
            self.forget(table.cells().map(|(pos, _)| CellId::new(board, tile, pos.row, pos.col)));
        }
        tracing::debug!(%board, %tile, "tile removed");
        self.recalculate_all();
        Ok(())
    }

    pub fn add_row(&mut self, board: BoardId, tile: TileId) -> EngineResult<()> {
        self.table_mut(board, tile)?.push_row();
        self.recalculate_all();
        Ok(())
    }

    pub fn add_column(&mut self, board: BoardId, tile: TileId) -> EngineResult<()> {
        self.table_mut(board, tile)?.push_col();
        self.recalculate_all();
        Ok(())
    }

    /// Remove the last row of a tile
    pub fn remove_row(&mut self, board: BoardId, tile: TileId) -> EngineResult<()> {
        let removed = self
            .table_mut(board, tile)?
            .pop_row()
            .ok_or(finmod_core::Error::CannotShrink(tile))?;
        self.forget(removed.into_iter().map(|pos| CellId::new(board, tile, pos.row, pos.col)));
        self.recalculate_all();
        Ok(())
    }

    /// Remove the last column of a tile
    pub fn remove_column(&mut self, board: BoardId, tile: TileId) -> EngineResult<()> {
        let removed = self
            .table_mut(board, tile)?
            .pop_col()
            .ok_or(finmod_core::Error::CannotShrink(tile))?;
        self.forget(removed.into_iter().map(|pos| CellId::new(board, tile, pos.row, pos.col)));
        self.recalculate_all();
        Ok(())
    }

    /// Override a row label; `None` restores the generated one
    pub fn set_row_label(
        &mut self,
        board: BoardId,
        tile: TileId,
        row: u32,
        label: Option<String>,
    ) -> EngineResult<()> {
        self.table_mut(board, tile)?.set_row_label(row, label)?;
        self.recalculate_all();
        Ok(())
    }

    /// Override a column label; `None` restores the generated one
    pub fn set_col_label(
        &mut self,
        board: BoardId,
        tile: TileId,
        col: u32,
        label: Option<String>,
    ) -> EngineResult<()> {
        self.table_mut(board, tile)?.set_col_label(col, label)?;
        self.recalculate_all();
        Ok(())
    }

    /// Drop destroyed cells from the graph and the formula table
    fn forget(&mut self, cells: impl IntoIterator<Item = CellId>) {
        for id in cells {
            self.graph.remove_cell(id);
            self.formulas.remove(&id);
        }
    }

    // === Recalculation ===

    /// Rebuild every edge and re-evaluate every formula in dependency order
    pub fn recalculate_all(&mut self) {
        let ids: BTreeSet<CellId> = self.formulas.keys().copied().collect();
        for &id in &ids {
            self.link(id);
        }

        let (order, blocked) = self.graph.topological_order(&ids);
        tracing::debug!(cells = order.len(), blocked = blocked.len(), "full recalculation");
        for id in order {
            self.evaluate_cell(id);
        }
        for id in blocked {
            self.flag_cycle(id);
        }
    }

    /// Record the cells a formula reads as its incoming edges
    fn link(&mut self, id: CellId) {
        let reads = match self.formulas.get(&id) {
            Some(formula) => dependencies(formula, &formula.references(), &self.model, id),
            None => Vec::new(),
        };
        self.graph.set_precedents(id, reads.iter().copied());
        if let Some(cell) = self.model.cell_mut(id) {
            cell.meta.dependencies = reads.into_iter().collect();
        }
    }

    /// Mark every cell on a cycle through `id` as errored
    fn flag_cycle(&mut self, id: CellId) -> bool {
        let Some(cycle) = self.graph.find_cycle(id) else {
            return false;
        };
        let members = cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        tracing::warn!(cell = %id, cells = cycle.len(), "circular reference");
        let error = CellError::cycle(format!("circular reference through {members}"));
        for member in cycle {
            if let Some(cell) = self.model.cell_mut(member).filter(|cell| !rejected(cell)) {
                cell.status = CellStatus::Errored(error.clone());
            }
        }
        true
    }

    /// Evaluate the changed cells and everything downstream of them
    fn recalculate_from(&mut self, changed: &[CellId]) {
        let order = self.graph.recalc_order(changed);
        tracing::debug!(cells = order.len(), "recalculating");
        for id in order {
            self.evaluate_cell(id);
        }
    }

    fn evaluate_cell(&mut self, id: CellId) {
        let Some(formula) = self.formulas.get(&id) else {
            return;
        };
        let value = evaluate(formula, &self.model, id, formula.root(), self.eval_options());
        let keep = self.options.record_history;
        if let Some(cell) = self.model.cell_mut(id) {
            if !rejected(cell) {
                cell.status = match value.as_error() {
                    Some(error) => CellStatus::Errored(error.clone()),
                    None => CellStatus::Evaluated,
                };
            }
            if cell.record_value(value, keep) {
                tracing::trace!(cell = %id, value = %cell.value, "value changed");
            }
        }
    }
}

/// The last edit to the cell failed to parse; its previous formula still
/// drives the value until an edit is accepted
fn rejected(cell: &Cell) -> bool {
    cell.status.error_kind() == Some(ErrorKind::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn engine() -> (Engine, BoardId, TileId) {
        let mut engine = Engine::new(EngineOptions::default());
        let board = engine.add_board("Main");
        let tile = engine.add_tile(board).unwrap();
        (engine, board, tile)
    }

    #[test]
    fn test_update_records_edges() {
        let (mut engine, board, tile) = engine();
        let a = CellId::new(board, tile, 0, 0);
        let b = CellId::new(board, tile, 1, 1);

        engine.update_cell(b, "[0,0] + [0,1]").unwrap();
        assert!(engine.graph().has_edge(a, b));
        assert_eq!(engine.cell(b).unwrap().meta.dependencies.len(), 2);

        engine.update_cell(b, "5").unwrap();
        assert!(!engine.graph().has_edge(a, b));
        assert!(engine.cell(b).unwrap().meta.dependencies.is_empty());
    }

    #[test]
    fn test_parse_failure_keeps_previous_state() {
        let (mut engine, board, tile) = engine();
        let a = CellId::new(board, tile, 0, 0);
        let b = CellId::new(board, tile, 0, 1);
        engine.update_cell(b, "[0,0] + 1").unwrap();

        let err = engine.update_cell(b, "1 +").unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));

        let cell = engine.cell(b).unwrap();
        assert_eq!(cell.formula, "[0,0] + 1");
        assert_eq!(cell.value.to_string(), "1");
        assert_eq!(cell.status.error_kind(), Some(ErrorKind::Parse));
        assert!(engine.graph().has_edge(a, b));
    }

    #[test]
    fn test_parse_error_outlives_recalculation() {
        let (mut engine, board, tile) = engine();
        let a = CellId::new(board, tile, 0, 0);
        let b = CellId::new(board, tile, 0, 1);
        engine.update_cell(b, "[0,0] + 1").unwrap();
        assert!(engine.update_cell(b, "5 +").is_err());

        engine.add_row(board, tile).unwrap();
        assert_eq!(engine.cell(b).unwrap().status.error_kind(), Some(ErrorKind::Parse));

        // the previous formula keeps tracking its inputs
        engine.update_cell(a, "4").unwrap();
        assert_eq!(engine.value(b).map(ToString::to_string), Some("5".into()));
        assert_eq!(engine.cell(b).unwrap().status.error_kind(), Some(ErrorKind::Parse));

        engine.update_cell(b, "5 + 1").unwrap();
        assert_eq!(engine.cell(b).unwrap().status, CellStatus::Evaluated);
    }

    #[test]
    fn test_deeply_nested_formula_is_rejected() {
        let (mut engine, board, tile) = engine();
        let a = CellId::new(board, tile, 0, 0);
        let nested = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));

        let err = engine.update_cell(a, &nested).unwrap_err();
        assert!(err.to_string().contains("shallower nesting"));
        assert_eq!(engine.cell(a).unwrap().status.error_kind(), Some(ErrorKind::Parse));
    }

    #[test]
    fn test_long_sum_chain_evaluates() {
        let (mut engine, board, tile) = engine();
        let a = CellId::new(board, tile, 0, 0);
        let b = CellId::new(board, tile, 1, 0);

        engine.update_cell(a, &vec!["1"; 5000].join("+")).unwrap();
        assert_eq!(engine.value(a).map(ToString::to_string), Some("5000".into()));

        engine.copy_cell(a, b).unwrap();
        assert_eq!(engine.value(b).map(ToString::to_string), Some("5000".into()));
    }

    #[test]
    fn test_blank_text_clears_cell() {
        let (mut engine, board, tile) = engine();
        let a = CellId::new(board, tile, 0, 0);
        let b = CellId::new(board, tile, 1, 0);
        engine.update_cell(a, "2").unwrap();
        engine.update_cell(b, "[0,0] * 2").unwrap();

        engine.update_cell(a, "  ").unwrap();

        assert_eq!(engine.value(a), Some(&Value::Empty(None)));
        assert_eq!(engine.cell(a).unwrap().status, CellStatus::Unparsed);
        assert_eq!(engine.value(b).map(ToString::to_string), Some("0".into()));
    }

    #[test]
    fn test_history_can_be_disabled() {
        let mut engine = Engine::new(EngineOptions {
            record_history: false,
            ..EngineOptions::default()
        });
        let board = engine.add_board("Main");
        let tile = engine.add_tile(board).unwrap();
        let a = CellId::new(board, tile, 0, 0);

        engine.update_cell(a, "1").unwrap();
        engine.update_cell(a, "2").unwrap();
        assert_eq!(engine.history(a), Some(&[][..]));
    }

    #[test]
    fn test_unknown_cell() {
        let (mut engine, board, tile) = engine();
        let outside = CellId::new(board, tile, 9, 9);
        assert!(matches!(
            engine.update_cell(outside, "1"),
            Err(EngineError::CellNotFound(_))
        ));
    }

    #[test]
    fn test_with_model_evaluates_existing_formulas() {
        let mut model = Model::new();
        let board = model.add_board("Main");
        let tile = model.board_mut(board).unwrap().add_table(2, 1);
        let a = CellId::new(board, tile, 0, 0);
        let b = CellId::new(board, tile, 1, 0);
        model.cell_mut(b).unwrap().formula = "[0,0] + 1".into();
        model.cell_mut(a).unwrap().formula = "41".into();

        let engine = Engine::with_model(model, EngineOptions::default());
        assert_eq!(engine.value(b).map(ToString::to_string), Some("42".into()));
        assert_eq!(engine.cell(a).unwrap().status, CellStatus::Evaluated);
    }
}
