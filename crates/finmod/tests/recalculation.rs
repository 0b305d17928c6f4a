//! Recalculation through the engine: cascades, cycles, history and
//! structural edits

use finmod::prelude::*;
use finmod::BoardId;
use pretty_assertions::assert_eq;

fn setup() -> (Engine, BoardId, TileId) {
    let mut engine = Engine::new(EngineOptions::default());
    let board = engine.add_board("Main");
    let tile = engine.add_tile(board).unwrap();
    (engine, board, tile)
}

fn shown(engine: &Engine, id: CellId) -> String {
    engine.value(id).map(Value::to_string).unwrap_or_default()
}

/// Edit, cascade, then close a cycle without disturbing the other cells
#[test]
fn test_edit_cascade_and_cycle() {
    let (mut engine, board, tile) = setup();
    let a = CellId::new(board, tile, 0, 0);
    let b = CellId::new(board, tile, 1, 0);
    let c = CellId::new(board, tile, 0, 1);

    engine.update_cell(a, "1+1").unwrap();
    assert_eq!(shown(&engine, a), "2");

    engine.update_cell(b, "-[-1,0]*2").unwrap();
    assert_eq!(shown(&engine, b), "4");

    engine.update_cell(a, "3").unwrap();
    assert_eq!(shown(&engine, b), "6");

    // `=(0,1)+1` typed into (0,1) itself: a one-cell cycle
    engine.update_cell(c, "[0,1]+1").unwrap();
    let cell = engine.cell(c).unwrap();
    assert_eq!(cell.status.error_kind(), Some(ErrorKind::Cycle));
    assert_eq!(cell.value, Value::Empty(None));

    assert_eq!(shown(&engine, a), "3");
    assert_eq!(shown(&engine, b), "6");
    assert_eq!(engine.cell(b).unwrap().status, CellStatus::Evaluated);
}

#[test]
fn test_history_keeps_replaced_values() {
    let (mut engine, board, tile) = setup();
    let a = CellId::new(board, tile, 0, 0);

    for text in ["1", "2", "2", "3"] {
        engine.update_cell(a, text).unwrap();
    }

    let history: Vec<String> = engine.history(a).unwrap().iter().map(Value::to_string).collect();
    // The unchanged "2" appends nothing
    assert_eq!(history, vec!["".to_string(), "1".into(), "2".into()]);
}

#[test]
fn test_two_cell_cycle_recovers_when_broken() {
    let (mut engine, board, tile) = setup();
    let a = CellId::new(board, tile, 0, 0);
    let b = CellId::new(board, tile, 0, 1);

    engine.update_cell(a, "[0,1] + 1").unwrap();
    engine.update_cell(b, "[0,0] + 1").unwrap();
    for id in [a, b] {
        assert_eq!(engine.cell(id).unwrap().status.error_kind(), Some(ErrorKind::Cycle));
    }
    assert!(engine.graph().has_circular_reference(a));

    engine.update_cell(a, "10").unwrap();
    assert_eq!(shown(&engine, a), "10");
    assert_eq!(shown(&engine, b), "11");
    assert_eq!(engine.cell(b).unwrap().status, CellStatus::Evaluated);
    assert!(!engine.graph().has_circular_reference(a));
}

#[test]
fn test_diamond_evaluates_each_cell_once_in_order() {
    let (mut engine, board, tile) = setup();
    engine.add_row(board, tile).unwrap();
    let top = CellId::new(board, tile, 0, 0);
    let left = CellId::new(board, tile, 1, 0);
    let right = CellId::new(board, tile, 1, 1);
    let bottom = CellId::new(board, tile, 2, 0);

    engine.update_cell(left, "[0,0] * 2").unwrap();
    engine.update_cell(right, "[0,0] * 3").unwrap();
    engine.update_cell(bottom, "[1,0] + [1,1]").unwrap();
    engine.update_cell(top, "1").unwrap();

    assert_eq!(shown(&engine, bottom), "5");
    // bottom went from 0 straight to 5 without a stale intermediate
    let history = engine.history(bottom).unwrap();
    assert_eq!(history.last().map(Value::to_string), Some("0".to_string()));
}

#[test]
fn test_errors_propagate_and_clear() {
    let (mut engine, board, tile) = setup();
    let a = CellId::new(board, tile, 0, 0);
    let b = CellId::new(board, tile, 1, 0);

    engine.update_cell(a, "1 / 0").unwrap();
    engine.update_cell(b, "[0,0] + 1").unwrap();
    assert_eq!(engine.cell(a).unwrap().status.error_kind(), Some(ErrorKind::DivideByZero));
    assert_eq!(engine.cell(b).unwrap().status.error_kind(), Some(ErrorKind::DivideByZero));

    engine.update_cell(a, "1 / 4").unwrap();
    assert_eq!(shown(&engine, b), "1.25");
    assert_eq!(engine.cell(b).unwrap().status, CellStatus::Evaluated);
}

#[test]
fn test_parse_error_is_reported_and_state_kept() {
    let (mut engine, board, tile) = setup();
    let a = CellId::new(board, tile, 0, 0);
    engine.update_cell(a, "5").unwrap();

    let err = engine.update_cell(a, "5 +").unwrap_err();
    assert!(matches!(err, EngineError::Parse { cell, .. } if cell == a));
    assert_eq!(engine.cell(a).unwrap().formula, "5");
    assert_eq!(shown(&engine, a), "5");
    assert_eq!(engine.cell(a).unwrap().status.error_kind(), Some(ErrorKind::Parse));
}

#[test]
fn test_structural_edits_rebuild_edges() {
    let (mut engine, board, tile) = setup();
    let total = CellId::new(board, tile, 0, 1);

    engine.add_row(board, tile).unwrap();
    engine.update_cell(CellId::new(board, tile, 0, 0), "1").unwrap();
    engine.update_cell(CellId::new(board, tile, 1, 0), "2").unwrap();
    engine.update_cell(CellId::new(board, tile, 2, 0), "3").unwrap();
    engine.update_cell(total, "sum([:, 0])").unwrap();
    assert_eq!(shown(&engine, total), "6");

    // The open slice follows the extent
    engine.remove_row(board, tile).unwrap();
    assert_eq!(shown(&engine, total), "3");
    assert_eq!(engine.graph().precedents(total).count(), 2);

    // A pinned reference to the removed row now fails
    engine.update_cell(total, "[2, 0]").unwrap();
    assert_eq!(engine.cell(total).unwrap().status.error_kind(), Some(ErrorKind::Reference));

    engine.add_row(board, tile).unwrap();
    engine.update_cell(CellId::new(board, tile, 2, 0), "7").unwrap();
    assert_eq!(shown(&engine, total), "7");
}

#[test]
fn test_removed_tile_errors_its_readers() {
    let (mut engine, board, first) = setup();
    let second = engine.add_tile(board).unwrap();
    let source = CellId::new(board, second, 0, 0);
    let reader = CellId::new(board, first, 0, 0);

    engine.update_cell(source, "4").unwrap();
    engine.update_cell(reader, "&t1[0,0] * 2").unwrap();
    assert_eq!(shown(&engine, reader), "8");

    engine.remove_tile(board, second).unwrap();
    assert_eq!(engine.cell(reader).unwrap().status.error_kind(), Some(ErrorKind::Reference));
    assert!(engine.formula(source).is_none());
}

#[test]
fn test_cannot_shrink_below_one_row() {
    let (mut engine, board, tile) = setup();
    engine.remove_row(board, tile).unwrap();
    assert!(matches!(
        engine.remove_row(board, tile),
        Err(EngineError::Core(finmod_core::Error::CannotShrink(_)))
    ));
}

#[test]
fn test_labels_feed_addresses() {
    let (mut engine, board, tile) = setup();
    let price = CellId::new(board, tile, 0, 1);
    let reader = CellId::new(board, tile, 1, 0);

    engine.update_cell(price, "12").unwrap();
    engine.update_cell(reader, "{a, B} + 1").unwrap();
    assert_eq!(shown(&engine, reader), "13");

    engine.set_col_label(board, tile, 1, Some("Price".into())).unwrap();
    assert_eq!(engine.cell(reader).unwrap().status.error_kind(), Some(ErrorKind::Reference));

    engine.update_cell(reader, "{a, Price} + 1").unwrap();
    assert_eq!(shown(&engine, reader), "13");

    engine.set_col_label(board, tile, 1, None).unwrap();
    assert_eq!(engine.cell(reader).unwrap().status.error_kind(), Some(ErrorKind::Reference));
}

#[test]
fn test_copy_rebases_formula() {
    let (mut engine, board, tile) = setup();
    engine.update_cell(CellId::new(board, tile, 0, 0), "1").unwrap();
    engine.update_cell(CellId::new(board, tile, 0, 1), "5").unwrap();
    let from = CellId::new(board, tile, 1, 0);
    let to = CellId::new(board, tile, 1, 1);

    engine.update_cell(from, "[0,0] * 2 + [$0,$0]").unwrap();
    engine.copy_cell(from, to).unwrap();

    assert_eq!(engine.cell(to).unwrap().formula, "[0, 1] * 2 + [$0, $0]");
    assert_eq!(shown(&engine, to), "11");

    let err = engine.copy_cell(to, CellId::new(board, tile, 0, 0)).unwrap_err();
    assert!(matches!(err, EngineError::Copy { .. }));
}

#[test]
fn test_unknown_cell_is_rejected() {
    let (mut engine, board, tile) = setup();
    let missing = CellId::new(board, tile, 5, 5);
    assert!(matches!(engine.update_cell(missing, "1"), Err(EngineError::CellNotFound(id)) if id == missing));
}

mod chains {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Edit {
        Constant(u32, i64),
        FromAbove(u32, i64),
    }

    fn edit() -> impl Strategy<Value = Edit> {
        prop_oneof![
            (0..4u32, -50..50i64).prop_map(|(row, c)| Edit::Constant(row, c)),
            (1..4u32, -50..50i64).prop_map(|(row, c)| Edit::FromAbove(row, c)),
        ]
    }

    proptest! {
        /// Any acyclic edit sequence leaves every cell equal to a from-scratch evaluation
        #[test]
        fn incremental_matches_from_scratch(edits in prop::collection::vec(edit(), 1..24)) {
            let (mut engine, board, tile) = setup();
            engine.add_row(board, tile).unwrap();
            engine.add_row(board, tile).unwrap();

            let mut rules = [Edit::Constant(0, 0); 4];
            for row in 0..4u32 {
                engine.update_cell(CellId::new(board, tile, row, 0), "0").unwrap();
                rules[row as usize] = Edit::Constant(row, 0);
            }

            for edit in edits {
                let (row, text) = match edit {
                    Edit::Constant(row, c) => (row, c.to_string()),
                    Edit::FromAbove(row, c) => (row, format!("-[-1,0] + {c}")),
                };
                engine.update_cell(CellId::new(board, tile, row, 0), &text).unwrap();
                rules[row as usize] = edit;
            }

            let mut expected = 0i64;
            for row in 0..4u32 {
                expected = match rules[row as usize] {
                    Edit::Constant(_, c) => c,
                    Edit::FromAbove(_, c) => expected + c,
                };
                prop_assert_eq!(shown(&engine, CellId::new(board, tile, row, 0)), expected.to_string());
            }
        }
    }
}
