//! Board service operations and their wire snapshots

use finmod::prelude::*;
use finmod::{TileSnapshot, ValueSnapshot};
use pretty_assertions::assert_eq;

fn tile(board: &BoardSnapshot) -> &TileSnapshot {
    &board.tiles[0]
}

#[test]
fn test_add_tile_seeds_a_default_table() {
    let service = BoardService::new();
    let board = service.add_tile().unwrap();

    let t = tile(&board);
    assert_eq!(t.tag, 0);
    assert_eq!(t.name, "t0");
    assert_eq!(t.kind, "table");
    assert_eq!((t.rows, t.cols), (2, 2));
    assert_eq!(t.cells.len(), 4);
    assert_eq!(t.row_labels, vec!["a", "b"]);
    assert_eq!(t.col_labels, vec!["A", "B"]);
}

#[test]
fn test_update_cell_returns_recalculated_board() {
    let service = BoardService::new();
    service.add_tile().unwrap();
    service.update_cell(0, [0, 0], "1+1").unwrap();
    let board = service.update_cell(0, [0, 1], "[0,0] * 10").unwrap();

    let cells = &tile(&board).cells;
    assert_eq!(
        cells[0].value,
        ValueSnapshot::Scalar {
            kind: ValueKind::Number,
            value: "2".into()
        }
    );
    assert_eq!(cells[2].formula, "[0,0] * 10");
    assert_eq!(
        cells[2].value,
        ValueSnapshot::Scalar {
            kind: ValueKind::Number,
            value: "20".into()
        }
    );
    assert_eq!(cells[2].error, None);
}

#[test]
fn test_errored_cells_carry_a_message() {
    let service = BoardService::new();
    service.add_tile().unwrap();
    let board = service.update_cell(0, [0, 0], "1 / 0").unwrap();

    let error = tile(&board).cells[0].error.clone().unwrap();
    assert!(error.starts_with("#DIV/0!"), "{error}");
}

#[test]
fn test_failed_operations_leave_the_board_alone() {
    let service = BoardService::new();
    service.add_tile().unwrap();
    service.update_cell(0, [0, 0], "5").unwrap();

    assert!(matches!(service.update_cell(0, [0, 0], "5 *"), Err(EngineError::Parse { .. })));
    assert!(service.add_row(9).is_err());
    assert!(service.update_cell(0, [7, 7], "1").is_err());

    let board = service.board().unwrap();
    assert_eq!(tile(&board).rows, 2);
    assert_eq!(tile(&board).cells[0].formula, "5");
}

#[test]
fn test_structure_operations() {
    let service = BoardService::new();
    service.add_tile().unwrap();

    let board = service.add_row(0).unwrap();
    assert_eq!(tile(&board).rows, 3);
    let board = service.add_column(0).unwrap();
    assert_eq!(tile(&board).cols, 3);
    assert_eq!(tile(&board).cells.len(), 9);

    let board = service.set_row_label(0, 1, Some("Revenue".into())).unwrap();
    assert_eq!(tile(&board).row_labels, vec!["a", "Revenue", "c"]);

    let board = service.remove_column(0).unwrap();
    assert_eq!(tile(&board).cols, 2);
    let board = service.remove_row(0).unwrap();
    assert_eq!(tile(&board).rows, 2);

    let board = service.remove_tile(0).unwrap();
    assert!(board.tiles.is_empty());
}

#[test]
fn test_copy_cell_through_service() {
    let service = BoardService::new();
    service.add_tile().unwrap();
    service.update_cell(0, [0, 0], "3").unwrap();
    service.update_cell(0, [1, 0], "4").unwrap();
    service.update_cell(0, [0, 1], "[0,0] * 2").unwrap();

    let board = service.copy_cell(0, [0, 1], [1, 1]).unwrap();
    let copied = &tile(&board).cells[3];
    assert_eq!(copied.formula, "[0, 1] * 2");
    assert_eq!(
        copied.value,
        ValueSnapshot::Scalar {
            kind: ValueKind::Number,
            value: "8".into()
        }
    );
}

#[test]
fn test_dispatch_replays_json_requests() {
    let service = BoardService::new();
    let script = [
        r#"{"op":"add_tile"}"#,
        r#"{"op":"add_row","tag":0}"#,
        r#"{"op":"update_cell","tag":0,"pos":[0,0],"value":"2"}"#,
        r#"{"op":"update_cell","tag":0,"pos":[0,1],"value":"-[-1,0] ^ 2"}"#,
        r#"{"op":"set_col_label","tag":0,"index":0,"label":"Units"}"#,
        r#"{"op":"board"}"#,
    ];

    let mut last = None;
    for line in script {
        let request: Request = serde_json::from_str(line).unwrap();
        last = Some(service.dispatch(request).unwrap());
    }
    let board = last.unwrap();
    let t = tile(&board);
    assert_eq!(t.rows, 3);
    assert_eq!(t.col_labels, vec!["Units", "B"]);
    assert_eq!(
        t.cells[2].value,
        ValueSnapshot::Scalar {
            kind: ValueKind::Number,
            value: "4".into()
        }
    );
}

#[test]
fn test_snapshot_json_shape() {
    let service = BoardService::new();
    service.add_tile().unwrap();
    service.update_cell(0, [0, 0], "List(1, 2)").unwrap();
    let board = service.update_cell(0, [1, 0], "[9,9]").unwrap();

    let json = serde_json::to_value(&board).unwrap();
    let t = &json["tiles"][0];
    assert_eq!(t["rowLabels"], serde_json::json!(["a", "b"]));
    assert_eq!(t["kind"], "table");

    let list = &t["cells"][0];
    assert_eq!(list["value"]["shape"], "List");
    assert_eq!(list["value"]["kind"], "number");
    assert_eq!(list["value"]["value"], serde_json::json!(["1", "2"]));
    assert!(list.get("error").is_none());

    let broken = &t["cells"][1];
    assert!(broken["error"].as_str().unwrap().starts_with("#REF!"));
}

#[test]
fn test_service_is_shared_across_threads() {
    let service = std::sync::Arc::new(BoardService::new());
    service.add_tile().unwrap();
    service.add_row(0).unwrap();

    let handles: Vec<_> = (0..3u32)
        .map(|row| {
            let service = service.clone();
            std::thread::spawn(move || {
                service.update_cell(0, [0, row], &(row + 1).to_string()).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let board = service.update_cell(0, [1, 0], "sum([:, 0])").unwrap();
    assert_eq!(
        tile(&board).cells[1].value,
        ValueSnapshot::Scalar {
            kind: ValueKind::Number,
            value: "6".into()
        }
    );
}
