//! Tiles: polymorphic mini-sheets placed on a board
//!
//! Every tile shares the same identity and placement; only [`TableTile`]
//! owns a cell grid. The other variants carry the configuration the
//! presentation layer needs and address no cells.

use std::fmt;

use crate::cell::Cell;
use crate::error::{Error, Result};
use crate::label::{index_to_label, Axis};

/// Tile identifier, unique within a board (the wire `tag`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileId(pub u32);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}", self.0)
    }
}

/// 0-based grid position within a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub row: u32,
    pub col: u32,
}

impl GridPos {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// Number of rows and columns of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub rows: u32,
    pub cols: u32,
}

impl Extent {
    pub fn contains(&self, pos: GridPos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }
}

/// Where a tile sits on its board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Chart style of a graph tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartKind {
    #[default]
    Line,
    Bar,
    Scatter,
}

/// Chart over a reference range
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphTile {
    pub chart: ChartKind,
    /// Reference text of the plotted range
    pub series: String,
}

/// Saved query text
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryTile {
    pub query: String,
}

/// Grouped aggregation over a source range
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PivotTile {
    pub source: String,
    pub group_by: Vec<String>,
    pub measures: Vec<String>,
}

/// Row-major grid of cells with overridable labels
#[derive(Debug, Clone, PartialEq)]
pub struct TableTile {
    rows: u32,
    cols: u32,
    cells: Vec<Cell>,
    row_labels: Vec<Option<String>>,
    col_labels: Vec<Option<String>>,
}

impl TableTile {
    /// Create a grid of blank cells
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::new(); rows as usize * cols as usize],
            row_labels: vec![None; rows as usize],
            col_labels: vec![None; cols as usize],
        }
    }

    pub fn extent(&self) -> Extent {
        Extent {
            rows: self.rows,
            cols: self.cols,
        }
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        if self.extent().contains(pos) {
            Some(pos.row as usize * self.cols as usize + pos.col as usize)
        } else {
            None
        }
    }

    /// Get a cell by position
    pub fn cell(&self, pos: GridPos) -> Option<&Cell> {
        self.index(pos).map(|i| &self.cells[i])
    }

    /// Get a mutable cell by position
    pub fn cell_mut(&mut self, pos: GridPos) -> Option<&mut Cell> {
        self.index(pos).map(move |i| &mut self.cells[i])
    }

    /// Iterate over all cells in row-major order with their positions
    pub fn cells(&self) -> impl Iterator<Item = (GridPos, &Cell)> + '_ {
        let cols = self.cols.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (GridPos::new(i as u32 / cols, i as u32 % cols), cell))
    }

    /// Append a row of blank cells
    pub fn push_row(&mut self) {
        self.cells
            .extend(std::iter::repeat_with(Cell::new).take(self.cols as usize));
        self.row_labels.push(None);
        self.rows += 1;
    }

    /// Append a column of blank cells
    pub fn push_col(&mut self) {
        let cols = self.cols as usize;
        let mut cells = Vec::with_capacity(self.rows as usize * (cols + 1));
        for row in self.cells.chunks(cols.max(1)).take(self.rows as usize) {
            cells.extend(row.iter().cloned());
            cells.push(Cell::new());
        }
        if cols == 0 {
            cells = vec![Cell::new(); self.rows as usize];
        }
        self.cells = cells;
        self.col_labels.push(None);
        self.cols += 1;
    }

    /// Remove the last row, returning the positions that were destroyed
    pub fn pop_row(&mut self) -> Option<Vec<GridPos>> {
        if self.rows <= 1 {
            return None;
        }
        let row = self.rows - 1;
        self.cells.truncate(row as usize * self.cols as usize);
        self.row_labels.pop();
        self.rows = row;
        Some((0..self.cols).map(|col| GridPos::new(row, col)).collect())
    }

    /// Remove the last column, returning the positions that were destroyed
    pub fn pop_col(&mut self) -> Option<Vec<GridPos>> {
        if self.cols <= 1 {
            return None;
        }
        let col = self.cols - 1;
        let cols = self.cols as usize;
        self.cells = self
            .cells
            .chunks(cols)
            .flat_map(|row| row[..cols - 1].iter().cloned())
            .collect();
        self.col_labels.pop();
        self.cols = col;
        Some((0..self.rows).map(|row| GridPos::new(row, col)).collect())
    }

    /// Label of a row: the override or the generated lowercase letters
    pub fn row_label(&self, row: u32) -> String {
        match self.row_labels.get(row as usize) {
            Some(Some(label)) => label.clone(),
            _ => index_to_label(row, Axis::Row),
        }
    }

    /// Label of a column: the override or the generated uppercase letters
    pub fn col_label(&self, col: u32) -> String {
        match self.col_labels.get(col as usize) {
            Some(Some(label)) => label.clone(),
            _ => index_to_label(col, Axis::Column),
        }
    }

    pub fn row_labels(&self) -> Vec<String> {
        (0..self.rows).map(|r| self.row_label(r)).collect()
    }

    pub fn col_labels(&self) -> Vec<String> {
        (0..self.cols).map(|c| self.col_label(c)).collect()
    }

    /// Find the row carrying `label`
    pub fn row_index(&self, label: &str) -> Option<u32> {
        (0..self.rows).find(|&r| self.row_label(r) == label)
    }

    /// Find the column carrying `label`
    pub fn col_index(&self, label: &str) -> Option<u32> {
        (0..self.cols).find(|&c| self.col_label(c) == label)
    }

    /// Override a row label; `None` restores the generated label
    pub fn set_row_label(&mut self, row: u32, label: Option<String>) -> Result<()> {
        if row >= self.rows {
            return Err(Error::RowOutOfBounds(row, self.rows));
        }
        if let Some(text) = &label {
            check_label(text, (0..self.rows).filter(|&r| r != row).map(|r| self.row_label(r)))?;
        }
        self.row_labels[row as usize] = label;
        Ok(())
    }

    /// Override a column label; `None` restores the generated label
    pub fn set_col_label(&mut self, col: u32, label: Option<String>) -> Result<()> {
        if col >= self.cols {
            return Err(Error::ColumnOutOfBounds(col, self.cols));
        }
        if let Some(text) = &label {
            check_label(text, (0..self.cols).filter(|&c| c != col).map(|c| self.col_label(c)))?;
        }
        self.col_labels[col as usize] = label;
        Ok(())
    }
}

fn check_label(label: &str, mut others: impl Iterator<Item = String>) -> Result<()> {
    if label.trim().is_empty() {
        return Err(Error::InvalidLabel("label must not be empty".into()));
    }
    if others.any(|other| other == label) {
        return Err(Error::InvalidLabel(format!("'{label}' is already used")));
    }
    Ok(())
}

/// Variant data of a tile
#[derive(Debug, Clone, PartialEq)]
pub enum TileKind {
    Table(TableTile),
    Graph(GraphTile),
    Query(QueryTile),
    Pivot(PivotTile),
}

impl TileKind {
    /// Lowercase variant name
    pub fn name(&self) -> &'static str {
        match self {
            TileKind::Table(_) => "table",
            TileKind::Graph(_) => "graph",
            TileKind::Query(_) => "query",
            TileKind::Pivot(_) => "pivot",
        }
    }
}

/// A tile on a board
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub id: TileId,
    /// Name used by `&Name` selectors
    pub name: String,
    pub placement: Placement,
    pub kind: TileKind,
}

impl Tile {
    /// Create a table tile
    pub fn table(id: TileId, name: impl Into<String>, rows: u32, cols: u32) -> Self {
        Self {
            id,
            name: name.into(),
            placement: Placement::default(),
            kind: TileKind::Table(TableTile::new(rows, cols)),
        }
    }

    /// Create a tile of any other variant
    pub fn with_kind(id: TileId, name: impl Into<String>, kind: TileKind) -> Self {
        Self {
            id,
            name: name.into(),
            placement: Placement::default(),
            kind,
        }
    }

    /// Table data, if this is a table tile
    pub fn as_table(&self) -> Option<&TableTile> {
        match &self.kind {
            TileKind::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut TableTile> {
        match &mut self.kind {
            TileKind::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Table data or [`Error::NotATable`]
    pub fn table_mut(&mut self) -> Result<&mut TableTile> {
        let (id, actual) = (self.id, self.kind.name());
        self.as_table_mut()
            .ok_or(Error::NotATable { tile: id, actual })
    }

    /// Extent of the cell grid; non-table tiles have none
    pub fn extent(&self) -> Extent {
        self.as_table().map(TableTile::extent).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_col_keeps_row_major_layout() {
        let mut table = TableTile::new(2, 2);
        table.cell_mut(GridPos::new(0, 1)).unwrap().value = Value::Int(1);
        table.cell_mut(GridPos::new(1, 0)).unwrap().value = Value::Int(2);

        table.push_col();

        assert_eq!(table.extent(), Extent { rows: 2, cols: 3 });
        assert_eq!(table.cell(GridPos::new(0, 1)).unwrap().value, Value::Int(1));
        assert_eq!(table.cell(GridPos::new(1, 0)).unwrap().value, Value::Int(2));
        assert!(table.cell(GridPos::new(1, 2)).unwrap().is_blank());
    }

    #[test]
    fn test_pop_col_returns_destroyed_positions() {
        let mut table = TableTile::new(2, 3);
        table.cell_mut(GridPos::new(1, 1)).unwrap().value = Value::Int(7);

        let removed = table.pop_col().unwrap();

        assert_eq!(removed, vec![GridPos::new(0, 2), GridPos::new(1, 2)]);
        assert_eq!(table.cell(GridPos::new(1, 1)).unwrap().value, Value::Int(7));
        assert!(table.cell(GridPos::new(0, 2)).is_none());
    }

    #[test]
    fn test_labels() {
        let mut table = TableTile::new(3, 2);
        assert_eq!(table.row_labels(), vec!["a", "b", "c"]);
        assert_eq!(table.col_labels(), vec!["A", "B"]);

        table.set_col_label(1, Some("Price".into())).unwrap();
        assert_eq!(table.col_index("Price"), Some(1));
        assert_eq!(table.col_index("B"), None);

        assert!(table.set_col_label(0, Some("Price".into())).is_err());
        assert!(table.set_row_label(5, Some("x".into())).is_err());
    }

    #[test]
    fn test_non_table_has_no_extent() {
        let tile = Tile::with_kind(TileId(3), "chart", TileKind::Graph(GraphTile::default()));
        assert_eq!(tile.extent(), Extent::default());
        assert!(tile.as_table().is_none());
    }
}
