//! Capability traits threaded into evaluation
//!
//! Evaluation never reaches for global state. Each function takes the
//! narrow capabilities it needs as arguments and drops them when it returns:
//!
//! - [`ObjectContext`]: node and value arenas of one parsed formula
//! - [`TokenContext`]: token arena and source text
//! - [`TileContext`]: cells and labels of one table tile
//! - [`BoardContext`] / [`ModelContext`]: tile and board lookup
//!
//! The core containers implement these directly; tests can supply fakes
//! that implement only what a formula exercises.

use finmod_core::{Board, BoardId, Cell, CellId, CellError, Extent, GridPos, Model, Tile, TileId, Value};

use crate::ast::{Formula, Node, NodeId, ValId};
use crate::token::{Token, TokenId};

/// Read access to the node and value arenas
pub trait ObjectContext {
    fn node(&self, id: NodeId) -> Node;
    fn value(&self, id: ValId) -> &Value;
}

/// Read access to the token arena and the text behind it
pub trait TokenContext {
    fn token(&self, id: TokenId) -> Option<Token>;
    fn token_text(&self, token: Token) -> &str;
    fn char_at(&self, offset: u32) -> Option<char>;
}

/// Read access to one table tile
pub trait TileContext {
    fn tile_id(&self) -> TileId;

    /// Grid size; zero for tiles without cells
    fn extent(&self) -> Extent;

    fn row_index(&self, label: &str) -> Option<u32>;

    fn col_index(&self, label: &str) -> Option<u32>;

    /// Cell at `pos` as seen from `caller`
    fn cell_at(&self, caller: CellId, pos: GridPos) -> Option<&Cell>;

    /// Value at `pos`; a missing cell reads as a reference error
    fn value_at(&self, caller: CellId, pos: GridPos) -> Value {
        match self.cell_at(caller, pos) {
            Some(cell) => cell.value.clone(),
            None => Value::Error(CellError::reference(format!(
                "no cell [{}, {}] in {}",
                pos.row,
                pos.col,
                self.tile_id()
            ))),
        }
    }

    /// Cell addressed by row and column labels
    fn cell_by_label(&self, caller: CellId, row: &str, col: &str) -> Option<&Cell> {
        let pos = GridPos::new(self.row_index(row)?, self.col_index(col)?);
        self.cell_at(caller, pos)
    }

    /// Value addressed by row and column labels
    fn value_by_label(&self, caller: CellId, row: &str, col: &str) -> Value {
        match self.cell_by_label(caller, row, col) {
            Some(cell) => cell.value.clone(),
            None => Value::Error(CellError::reference(format!(
                "no cell {{{row}, {col}}} in {}",
                self.tile_id()
            ))),
        }
    }
}

/// Tile lookup within one board
pub trait BoardContext {
    type Tile: TileContext;

    fn board_id(&self) -> BoardId;

    fn tile_by_id(&self, id: TileId) -> Option<&Self::Tile>;

    fn tile_by_name(&self, name: &str) -> Option<&Self::Tile>;

    /// Tile used when a reference names a board but no tile
    fn first_tile(&self) -> Option<&Self::Tile>;

    /// Cell at `pos` in tile `tile`, with its id
    fn cell_at(&self, caller: CellId, tile: TileId, pos: GridPos) -> Option<(CellId, &Cell)> {
        let cell = self.tile_by_id(tile)?.cell_at(caller, pos)?;
        Some((CellId::new(self.board_id(), tile, pos.row, pos.col), cell))
    }
}

/// Board lookup within one model
pub trait ModelContext {
    type Board: BoardContext;

    fn board_by_id(&self, id: BoardId) -> Option<&Self::Board>;

    fn board_by_name(&self, name: &str) -> Option<&Self::Board>;
}

impl ObjectContext for Formula {
    fn node(&self, id: NodeId) -> Node {
        self.nodes[id.index()]
    }

    fn value(&self, id: ValId) -> &Value {
        &self.values[id.index()]
    }
}

impl TokenContext for Formula {
    fn token(&self, id: TokenId) -> Option<Token> {
        self.tokens.get(id.index()).copied()
    }

    fn token_text(&self, token: Token) -> &str {
        self.source
            .get(token.start as usize..token.end())
            .unwrap_or_default()
    }

    fn char_at(&self, offset: u32) -> Option<char> {
        self.source.get(offset as usize..)?.chars().next()
    }
}

impl TileContext for Tile {
    fn tile_id(&self) -> TileId {
        self.id
    }

    fn extent(&self) -> Extent {
        Tile::extent(self)
    }

    fn row_index(&self, label: &str) -> Option<u32> {
        self.as_table()?.row_index(label)
    }

    fn col_index(&self, label: &str) -> Option<u32> {
        self.as_table()?.col_index(label)
    }

    fn cell_at(&self, caller: CellId, pos: GridPos) -> Option<&Cell> {
        tracing::trace!(%caller, tile = %self.id, row = pos.row, col = pos.col, "cell lookup");
        self.as_table()?.cell(pos)
    }
}

impl BoardContext for Board {
    type Tile = Tile;

    fn board_id(&self) -> BoardId {
        self.id
    }

    fn tile_by_id(&self, id: TileId) -> Option<&Tile> {
        self.tile(id)
    }

    fn tile_by_name(&self, name: &str) -> Option<&Tile> {
        Board::tile_by_name(self, name)
    }

    fn first_tile(&self) -> Option<&Tile> {
        self.tiles().next()
    }
}

impl ModelContext for Model {
    type Board = Board;

    fn board_by_id(&self, id: BoardId) -> Option<&Board> {
        self.board(id)
    }

    fn board_by_name(&self, name: &str) -> Option<&Board> {
        Model::board_by_name(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_formula_token_access() {
        let f = parse_formula("sum(1, 2)").unwrap();
        let first = f.token(TokenId(0)).unwrap();
        assert_eq!(f.token_text(first), "sum");
        assert_eq!(f.char_at(3), Some('('));
        assert_eq!(f.char_at(99), None);
        assert!(f.token(TokenId(99)).is_none());
    }

    #[test]
    fn test_tile_value_lookup() {
        let mut model = Model::new();
        let board = model.add_board("Main");
        let tile = model.board_mut(board).unwrap().add_table(2, 2);
        let id = CellId::new(board, tile, 1, 0);
        model.cell_mut(id).unwrap().value = Value::Int(7);

        let caller = CellId::new(board, tile, 0, 0);
        let board = model.board_by_id(board).unwrap();
        let tile = board.tile_by_name("t0").unwrap();

        assert_eq!(tile.value_at(caller, GridPos::new(1, 0)), Value::Int(7));
        assert_eq!(tile.value_by_label(caller, "b", "A"), Value::Int(7));
        assert!(tile.value_at(caller, GridPos::new(5, 0)).is_error());
        assert_eq!(
            board.cell_at(caller, tile.tile_id(), GridPos::new(1, 0)).map(|(id, _)| id),
            Some(id)
        );
    }

    /// A single column of cells standing in for a whole model
    struct Column(Vec<Cell>);

    impl TileContext for Column {
        fn tile_id(&self) -> TileId {
            TileId(0)
        }

        fn extent(&self) -> Extent {
            Extent {
                rows: self.0.len() as u32,
                cols: 1,
            }
        }

        fn row_index(&self, _: &str) -> Option<u32> {
            None
        }

        fn col_index(&self, _: &str) -> Option<u32> {
            None
        }

        fn cell_at(&self, _: CellId, pos: GridPos) -> Option<&Cell> {
            if pos.col != 0 {
                return None;
            }
            self.0.get(pos.row as usize)
        }
    }

    impl BoardContext for Column {
        type Tile = Self;

        fn board_id(&self) -> BoardId {
            BoardId(0)
        }

        fn tile_by_id(&self, id: TileId) -> Option<&Self> {
            (id == TileId(0)).then_some(self)
        }

        fn tile_by_name(&self, _: &str) -> Option<&Self> {
            None
        }

        fn first_tile(&self) -> Option<&Self> {
            Some(self)
        }
    }

    impl ModelContext for Column {
        type Board = Self;

        fn board_by_id(&self, id: BoardId) -> Option<&Self> {
            (id == BoardId(0)).then_some(self)
        }

        fn board_by_name(&self, _: &str) -> Option<&Self> {
            None
        }
    }

    #[test]
    fn test_evaluate_against_a_fake_model() {
        let cells = (1..=3)
            .map(|n| {
                let mut cell = Cell::new();
                cell.value = Value::Int(n);
                cell
            })
            .collect();
        let column = Column(cells);
        let caller = CellId::new(BoardId(0), TileId(0), 0, 1);

        let f = parse_formula("sum([:, 0]) * [-1]").unwrap();
        let value = crate::evaluator::evaluate(&f, &column, caller, f.root(), Default::default());
        assert_eq!(value.to_string(), "18");

        let f = parse_formula("{a, A}").unwrap();
        let value = crate::evaluator::evaluate(&f, &column, caller, f.root(), Default::default());
        assert!(value.is_error());
    }
}
