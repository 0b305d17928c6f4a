//! Reference resolution
//!
//! Turns a reference node into a [`CellRange`]: the board and tile it lands
//! in plus one [`Span`] per axis. Each axis node is interpreted according
//! to the style it was written in:
//!
//! | Node      | Position / Shorthand          | Address           | Relative            |
//! |-----------|-------------------------------|-------------------|---------------------|
//! | `Index`   | absolute, negative from end   | same as Position  | offset from caller  |
//! | `Slice`   | `start:stop`, stop exclusive  | same as Position  | -                   |
//! | `Label`   | label lookup                  | label lookup      | -                   |
//! | `Omitted` | index 0                       | index 0           | offset 0            |
//!
//! Relative offsets are stored negated by the parser (they sit under the
//! leading minus), so reading negates them back.

use finmod_core::{BoardId, CellError, CellId, Extent, TileId, Value};

use crate::ast::{Node, NodeId, RefStyle, ValId};
use crate::context::{BoardContext, ModelContext, ObjectContext, TileContext};

/// Cells covered along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub len: u32,
    /// Written as a slice; keeps its axis in the result shape even at length 1
    pub ranged: bool,
}

impl Span {
    fn single(index: u32) -> Self {
        Self {
            start: index,
            len: 1,
            ranged: false,
        }
    }

    fn indices(&self) -> std::ops::Range<u32> {
        self.start..self.start + self.len
    }
}

/// Resolved reference target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub board: BoardId,
    pub tile: TileId,
    pub rows: Span,
    pub cols: Span,
}

impl CellRange {
    /// Every covered cell, row-major
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.rows.indices().flat_map(move |row| {
            self.cols
                .indices()
                .map(move |col| CellId::new(self.board, self.tile, row, col))
        })
    }

    /// `[]` for a single cell, `[len]` for one ranged axis, `[rows, cols]` for two
    pub fn shape(&self) -> Vec<u32> {
        match (self.rows.ranged, self.cols.ranged) {
            (false, false) => Vec::new(),
            (true, false) => vec![self.rows.len],
            (false, true) => vec![self.cols.len],
            (true, true) => vec![self.rows.len, self.cols.len],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisKind {
    Row,
    Column,
}

/// Board and tile a reference is being resolved in
struct Scope<'m, B: BoardContext> {
    board: &'m B,
    tile: &'m B::Tile,
}

/// Resolve the reference rooted at `node` as seen from `caller`
pub fn resolve<O, M>(objects: &O, model: &M, caller: CellId, node: NodeId) -> Result<CellRange, CellError>
where
    O: ObjectContext + ?Sized,
    M: ModelContext + ?Sized,
{
    let board = model
        .board_by_id(caller.board)
        .ok_or_else(|| CellError::reference(format!("board {} no longer exists", caller.board)))?;
    let tile = board
        .tile_by_id(caller.tile)
        .ok_or_else(|| CellError::reference(format!("tile {} no longer exists", caller.tile)))?;
    resolve_in(objects, model, caller, node, Scope { board, tile })
}

fn resolve_in<'m, O, M>(
    objects: &O,
    model: &'m M,
    caller: CellId,
    node: NodeId,
    scope: Scope<'m, M::Board>,
) -> Result<CellRange, CellError>
where
    O: ObjectContext + ?Sized,
    M: ModelContext + ?Sized,
{
    match objects.node(node) {
        Node::Board { name, target, .. } => {
            let name = string_at(objects, name)?;
            let board = model
                .board_by_name(name)
                .ok_or_else(|| CellError::reference(format!("unknown board '{name}'")))?;
            let tile = board
                .first_tile()
                .ok_or_else(|| CellError::reference(format!("board '{name}' has no tiles")))?;
            resolve_in(objects, model, caller, target, Scope { board, tile })
        }
        Node::Tile {
            selector,
            by_id,
            target,
            ..
        } => {
            let tile = if by_id {
                let id = objects
                    .value(selector)
                    .as_index()
                    .and_then(|i| u32::try_from(i).ok())
                    .ok_or_else(|| CellError::reference("tile id out of range"))?;
                scope
                    .board
                    .tile_by_id(TileId(id))
                    .ok_or_else(|| CellError::reference(format!("unknown tile {}", TileId(id))))?
            } else {
                let name = string_at(objects, selector)?;
                scope
                    .board
                    .tile_by_name(name)
                    .ok_or_else(|| CellError::reference(format!("unknown tile '{name}'")))?
            };
            let scope = Scope {
                board: scope.board,
                tile,
            };
            resolve_in(objects, model, caller, target, scope)
        }
        Node::Cell { style, row, col } => {
            let extent = scope.tile.extent();
            if extent.rows == 0 || extent.cols == 0 {
                return Err(CellError::reference(format!(
                    "{} has no cells to reference",
                    scope.tile.tile_id()
                )));
            }
            let axes = Axes {
                objects,
                tile: scope.tile,
                extent,
                caller,
                style,
            };
            let rows = axes.span(row, AxisKind::Row)?;
            let cols = axes.span(col, AxisKind::Column)?;
            let range = CellRange {
                board: scope.board.board_id(),
                tile: scope.tile.tile_id(),
                rows,
                cols,
            };
            tracing::trace!(%caller, ?range, "resolved reference");
            Ok(range)
        }
        other => Err(CellError::reference(format!("{other:?} is not a reference"))),
    }
}

fn string_at<O: ObjectContext + ?Sized>(objects: &O, id: ValId) -> Result<&str, CellError> {
    match objects.value(id) {
        Value::String(s) => Ok(s),
        other => Err(CellError::reference(format!("selector {other} is not a name"))),
    }
}

/// Axis interpretation for one reference
struct Axes<'a, O: ?Sized, T> {
    objects: &'a O,
    tile: &'a T,
    extent: Extent,
    caller: CellId,
    style: RefStyle,
}

impl<O: ObjectContext + ?Sized, T: TileContext> Axes<'_, O, T> {
    fn bound(&self, axis: AxisKind) -> u32 {
        match axis {
            AxisKind::Row => self.extent.rows,
            AxisKind::Column => self.extent.cols,
        }
    }

    fn span(&self, node: NodeId, axis: AxisKind) -> Result<Span, CellError> {
        let bound = self.bound(axis);
        match self.objects.node(node) {
            Node::Omitted if self.style == RefStyle::Relative => self.offset(0, axis),
            Node::Omitted => self.absolute(0, axis),
            Node::Index { at, .. } => {
                let n = self.int_at(at)?;
                if self.style == RefStyle::Relative {
                    let offset = n.checked_neg().ok_or_else(|| CellError::reference("offset out of range"))?;
                    self.offset(offset, axis)
                } else {
                    self.absolute(from_end(n, bound), axis)
                }
            }
            Node::Slice { start, stop, .. } => {
                let start = match self.objects.value(start) {
                    Value::Empty(_) => 0,
                    _ => from_end(self.int_at(start)?, bound),
                };
                let stop = match self.objects.value(stop) {
                    Value::Empty(_) => bound as i64,
                    _ => from_end(self.int_at(stop)?, bound),
                };
                if start < 0 || stop > bound as i64 || start >= stop {
                    return Err(CellError::reference(format!(
                        "slice {start}:{stop} is outside 0:{bound}"
                    )));
                }
                Ok(Span {
                    start: start as u32,
                    len: (stop - start) as u32,
                    ranged: true,
                })
            }
            Node::Label { name, .. } => {
                let label = match self.objects.value(name) {
                    Value::String(s) => s.as_str(),
                    other => return Err(CellError::reference(format!("label {other} is not text"))),
                };
                let index = match axis {
                    AxisKind::Row => self.tile.row_index(label),
                    AxisKind::Column => self.tile.col_index(label),
                };
                index.map(Span::single).ok_or_else(|| {
                    CellError::reference(format!(
                        "no {} labelled '{label}' in {}",
                        axis_name(axis),
                        self.tile.tile_id()
                    ))
                })
            }
            other => Err(CellError::reference(format!("{other:?} is not a reference axis"))),
        }
    }

    fn int_at(&self, id: ValId) -> Result<i64, CellError> {
        self.objects
            .value(id)
            .as_index()
            .ok_or_else(|| CellError::reference("reference index must be an integer"))
    }

    fn absolute(&self, index: i64, axis: AxisKind) -> Result<Span, CellError> {
        let bound = self.bound(axis);
        if (0..bound as i64).contains(&index) {
            Ok(Span::single(index as u32))
        } else {
            Err(CellError::reference(format!(
                "{} {index} is outside {} (0..{bound})",
                axis_name(axis),
                self.tile.tile_id()
            )))
        }
    }

    fn offset(&self, offset: i64, axis: AxisKind) -> Result<Span, CellError> {
        let origin = match axis {
            AxisKind::Row => self.caller.row,
            AxisKind::Column => self.caller.col,
        };
        self.absolute(origin as i64 + offset, axis)
    }
}

/// Negative indices count from the end
fn from_end(n: i64, bound: u32) -> i64 {
    if n < 0 {
        n + bound as i64
    } else {
        n
    }
}

fn axis_name(axis: AxisKind) -> &'static str {
    match axis {
        AxisKind::Row => "row",
        AxisKind::Column => "column",
    }
}

/// Read the values of a resolved range
///
/// One cell yields its value, one ranged axis a `List`, two an `Array`
/// with `dims = [rows, cols]`.
pub fn read<M: ModelContext + ?Sized>(model: &M, caller: CellId, range: &CellRange) -> Value {
    let Some(tile) = model
        .board_by_id(range.board)
        .and_then(|board| board.tile_by_id(range.tile))
    else {
        return Value::Error(CellError::reference(format!("{} no longer exists", range.tile)));
    };
    let mut values = range.cells().map(|id| tile.value_at(caller, id.pos()));
    let result = match range.shape().as_slice() {
        [] => return values.next().unwrap_or_default(),
        [_] => Value::list(values.collect()),
        dims => Value::array(values.collect(), dims.to_vec()),
    };
    result.unwrap_or_else(Value::Error)
}

/// Every cell the formula's references cover, as seen from `caller`
///
/// References that fail to resolve contribute nothing; they surface as
/// errors when the formula is evaluated.
pub fn dependencies<O, M>(objects: &O, references: &[NodeId], model: &M, caller: CellId) -> Vec<CellId>
where
    O: ObjectContext + ?Sized,
    M: ModelContext + ?Sized,
{
    let mut cells: Vec<CellId> = references
        .iter()
        .filter_map(|&node| resolve(objects, model, caller, node).ok())
        .flat_map(|range| range.cells().collect::<Vec<_>>())
        .collect();
    cells.sort();
    cells.dedup();
    cells
}
