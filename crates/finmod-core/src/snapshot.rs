//! Wire snapshots handed to the presentation layer
//!
//! Every payload crosses as a string; numbers are never serialized as JSON
//! numbers so no precision is lost on the way out.

use crate::board::Board;
use crate::cell::{Cell, CellStatus};
use crate::tile::{Tile, TileKind};
use crate::value::{Value, ValueKind};

/// `Board{tiles}`
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoardSnapshot {
    pub tiles: Vec<TileSnapshot>,
}

/// `Tile{tag, rows, cells, rowLabels, colLabels}`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TileSnapshot {
    pub tag: u32,
    pub name: String,
    pub kind: String,
    pub rows: u32,
    pub cols: u32,
    /// Row-major
    pub cells: Vec<CellSnapshot>,
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
}

/// `Cell{value, formula, style}` plus the error indicator
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellSnapshot {
    pub value: ValueSnapshot,
    pub formula: String,
    pub style: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub error: Option<String>,
}

/// Tagged union of value shapes
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "shape"))]
pub enum ValueSnapshot {
    Scalar {
        kind: ValueKind,
        value: String,
    },
    List {
        kind: ValueKind,
        value: Vec<String>,
    },
    Array {
        kind: ValueKind,
        value: Vec<String>,
        dims: Vec<u32>,
    },
    Record {
        kind: ValueKind,
        /// Flattened `[key, value, key, value, ...]`
        value: Vec<String>,
        #[cfg_attr(feature = "serde", serde(rename = "fieldCount"))]
        field_count: u32,
    },
}

impl From<&Value> for ValueSnapshot {
    fn from(value: &Value) -> Self {
        let kind = value.element_kind().unwrap_or(ValueKind::Empty);
        match value {
            Value::List(items) => ValueSnapshot::List {
                kind,
                value: items.iter().map(Value::to_string).collect(),
            },
            Value::Array { items, dims } => ValueSnapshot::Array {
                kind,
                value: items.iter().map(Value::to_string).collect(),
                dims: dims.clone(),
            },
            Value::Record(fields) => ValueSnapshot::Record {
                kind,
                value: fields
                    .iter()
                    .flat_map(|(k, v)| [k.clone(), v.to_string()])
                    .collect(),
                field_count: fields.len() as u32,
            },
            Value::Empty(_) => ValueSnapshot::Scalar {
                kind: ValueKind::Empty,
                value: String::new(),
            },
            scalar => ValueSnapshot::Scalar {
                kind: scalar.kind(),
                value: scalar.to_string(),
            },
        }
    }
}

impl From<&Cell> for CellSnapshot {
    fn from(cell: &Cell) -> Self {
        let error = match &cell.status {
            CellStatus::Errored(e) => Some(e.to_string()),
            _ => None,
        };
        CellSnapshot {
            value: ValueSnapshot::from(&cell.value),
            formula: cell.formula.clone(),
            style: cell.style.clone(),
            error,
        }
    }
}

impl From<&Tile> for TileSnapshot {
    fn from(tile: &Tile) -> Self {
        let (rows, cols, cells, row_labels, col_labels) = match &tile.kind {
            TileKind::Table(table) => {
                let extent = table.extent();
                (
                    extent.rows,
                    extent.cols,
                    table.cells().map(|(_, cell)| CellSnapshot::from(cell)).collect(),
                    table.row_labels(),
                    table.col_labels(),
                )
            }
            _ => (0, 0, Vec::new(), Vec::new(), Vec::new()),
        };
        TileSnapshot {
            tag: tile.id.0,
            name: tile.name.clone(),
            kind: tile.kind.name().to_string(),
            rows,
            cols,
            cells,
            row_labels,
            col_labels,
        }
    }
}

impl Board {
    /// Render the board for the presentation layer
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            tiles: self.tiles().map(TileSnapshot::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardId;
    use crate::tile::GridPos;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_snapshot_shapes() {
        assert_eq!(
            ValueSnapshot::from(&Value::number(2)),
            ValueSnapshot::Scalar {
                kind: ValueKind::Number,
                value: "2".into()
            }
        );
        assert_eq!(
            ValueSnapshot::from(&Value::Record(vec![
                ("a".into(), Value::Int(1)),
                ("b".into(), Value::Int(2)),
            ])),
            ValueSnapshot::Record {
                kind: ValueKind::Int,
                value: vec!["a".into(), "1".into(), "b".into(), "2".into()],
                field_count: 2,
            }
        );
        assert_eq!(
            ValueSnapshot::from(&Value::Array {
                items: vec![Value::Boolean(true), Value::Boolean(false)],
                dims: vec![1, 2],
            }),
            ValueSnapshot::Array {
                kind: ValueKind::Boolean,
                value: vec!["true".into(), "false".into()],
                dims: vec![1, 2],
            }
        );
    }

    #[test]
    fn test_board_snapshot_is_row_major() {
        let mut board = Board::new(BoardId(0), "Main");
        let tile = board.add_table(2, 2);
        let table = board.tile_mut(tile).unwrap().table_mut().unwrap();
        table.cell_mut(GridPos::new(0, 1)).unwrap().value = Value::Int(1);
        table.cell_mut(GridPos::new(1, 0)).unwrap().value = Value::Int(2);

        let snapshot = board.snapshot();
        let tile = &snapshot.tiles[0];

        assert_eq!(tile.rows, 2);
        assert_eq!(tile.row_labels, vec!["a", "b"]);
        assert_eq!(tile.col_labels, vec!["A", "B"]);
        assert_eq!(
            tile.cells[1].value,
            ValueSnapshot::Scalar { kind: ValueKind::Int, value: "1".into() }
        );
        assert_eq!(
            tile.cells[2].value,
            ValueSnapshot::Scalar { kind: ValueKind::Int, value: "2".into() }
        );
    }
}
