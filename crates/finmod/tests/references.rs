//! Reference forms evaluated through the engine

use finmod::prelude::*;
use finmod::BoardId;
use pretty_assertions::assert_eq;

/// 3x3 tile on "Main" holding `row * 10 + col`, with column 1 labelled
/// `Price`, and a second board "Plan" with one tile
fn setup() -> (Engine, BoardId, TileId) {
    let mut engine = Engine::new(EngineOptions::default());
    let board = engine.add_board("Main");
    let tile = engine.add_tile(board).unwrap();
    engine.add_row(board, tile).unwrap();
    engine.add_column(board, tile).unwrap();
    engine.set_col_label(board, tile, 1, Some("Price".into())).unwrap();
    for row in 0..3 {
        for col in 0..3 {
            let text = format!("{}", row * 10 + col);
            engine.update_cell(CellId::new(board, tile, row, col), &text).unwrap();
        }
    }
    let plan = engine.add_board("Plan");
    engine.add_tile(plan).unwrap();
    (engine, board, tile)
}

/// Evaluate `text` in a scratch cell of a fourth row
fn eval(engine: &mut Engine, board: BoardId, tile: TileId, text: &str) -> String {
    let rows = engine.snapshot(board).unwrap().tiles[0].rows;
    if rows < 4 {
        engine.add_row(board, tile).unwrap();
    }
    let scratch = CellId::new(board, tile, 3, 2);
    engine.update_cell(scratch, text).unwrap();
    engine.value(scratch).map(Value::to_string).unwrap_or_default()
}

#[test]
fn test_equivalent_forms_agree() {
    let (mut engine, board, tile) = setup();
    let mut check = |left: &str, right: &str| {
        let a = eval(&mut engine, board, tile, left);
        let b = eval(&mut engine, board, tile, right);
        assert_eq!(a, b, "{left} vs {right}");
        a
    };

    assert_eq!(check("[1]", "[1,0]"), "10");
    assert_eq!(check("[,1]", "[0,1]"), "1");
    assert_eq!(check("sum({[:3], Price})", "sum(@[{Price}, 0:3])"), "33");
    assert_eq!(check("@aA", "[0,0]"), "0");
    assert_eq!(check("@A1", "@1A"), "0");
    assert_eq!(check("@Aa", "@aA"), "0");
    assert_eq!(check("{c, Price}", "[2,1]"), "21");
}

#[test]
fn test_whole_column_matches_bounded_slice_on_two_rows() {
    let mut engine = Engine::new(EngineOptions::default());
    let board = engine.add_board("Main");
    let tile = engine.add_tile(board).unwrap();
    engine.set_col_label(board, tile, 1, Some("Price".into())).unwrap();
    engine.update_cell(CellId::new(board, tile, 0, 1), "3").unwrap();
    engine.update_cell(CellId::new(board, tile, 1, 1), "4").unwrap();

    let whole = CellId::new(board, tile, 0, 0);
    let slice = CellId::new(board, tile, 1, 0);
    engine.update_cell(whole, "sum({[:], Price})").unwrap();
    engine.update_cell(slice, "sum(@[{Price}, 0:2])").unwrap();

    assert_eq!(engine.value(whole).map(Value::to_string), Some("7".into()));
    assert_eq!(engine.value(slice).map(Value::to_string), Some("7".into()));
}

#[test]
fn test_relative_forms_follow_the_caller() {
    let (mut engine, board, tile) = setup();
    // The scratch cell sits at row 3, column 2
    assert_eq!(eval(&mut engine, board, tile, "-[-1,0]"), "22");
    assert_eq!(eval(&mut engine, board, tile, "-[-3,-2]"), "0");
}

#[test]
fn test_slices_build_lists_and_arrays() {
    let (mut engine, board, tile) = setup();
    assert_eq!(eval(&mut engine, board, tile, "len([0, :])"), "3");
    assert_eq!(eval(&mut engine, board, tile, "dims([0:2, 0:3])"), "2,3");
    assert_eq!(eval(&mut engine, board, tile, "[0, -2:]"), "1,2");
}

#[test]
fn test_bad_references_are_reference_errors() {
    let (mut engine, board, tile) = setup();
    let scratch = CellId::new(board, tile, 3, 2);
    for text in ["[9,9]", "{z}", "&missing[0,0]", "#'Nowhere'[0,0]"] {
        eval(&mut engine, board, tile, text);
        assert_eq!(
            engine.cell(scratch).unwrap().status.error_kind(),
            Some(ErrorKind::Reference),
            "{text}"
        );
    }
}

#[test]
fn test_cross_board_edges() {
    let (mut engine, board, tile) = setup();
    let plan = engine.board_id("Plan").unwrap();
    let source = CellId::new(plan, TileId(0), 0, 0);
    let reader = CellId::new(board, tile, 0, 0);

    engine.update_cell(source, "7").unwrap();
    engine.update_cell(reader, "#'Plan'[0,0] * 2").unwrap();
    assert_eq!(engine.value(reader).map(Value::to_string), Some("14".to_string()));
    assert!(engine.graph().has_edge(source, reader));

    engine.update_cell(source, "8").unwrap();
    assert_eq!(engine.value(reader).map(Value::to_string), Some("16".to_string()));
}

#[test]
fn test_cross_board_copy_keeps_tile_selectors_home() {
    let (mut engine, board, tile) = setup();
    let plan = engine.board_id("Plan").unwrap();
    let from = CellId::new(board, tile, 0, 0);
    let to = CellId::new(plan, TileId(0), 0, 0);

    engine.update_cell(from, "&t0[1,1] + 1").unwrap();
    engine.copy_cell(from, to).unwrap();

    assert_eq!(engine.cell(to).unwrap().formula, "#'Main'&t0[1, 1] + 1");
    assert_eq!(engine.value(to).map(Value::to_string), Some("12".to_string()));
}
