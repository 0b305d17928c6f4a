use criterion::{black_box, criterion_group, criterion_main, Criterion};
use finmod_core::{CellId, Model};
use finmod_formula::{evaluate, parse_formula, EvalOptions, Parser};

const ARITHMETIC: &str = "1+1+23+17*(78+892/39)+1+1+23+17*(78+892039)+1+1+23+17*(78+8/92039)";
const REFERENCES: &str = "sum([:, 0]) + {a, Price} * @Bb - -[1, 0] + #'Main'&t0[$1, $0]";

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse arithmetic", |b| b.iter(|| Parser::new(black_box(ARITHMETIC)).parse()));
    c.bench_function("parse references", |b| b.iter(|| Parser::new(black_box(REFERENCES)).parse()));
}

fn bench_evaluate(c: &mut Criterion) {
    let mut model = Model::new();
    let board = model.add_board("Main");
    let tile = model.board_mut(board).unwrap().add_table(8, 8);
    let caller = CellId::new(board, tile, 7, 7);
    let formula = parse_formula(ARITHMETIC).unwrap();

    c.bench_function("evaluate arithmetic", |b| {
        b.iter(|| evaluate(&formula, &model, caller, formula.root(), EvalOptions::default()))
    });
}

criterion_group!(benches, bench_parse, bench_evaluate);
criterion_main!(benches);
