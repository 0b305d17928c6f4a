//! finmod CLI - evaluate formulas and replay board scripts

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use finmod::prelude::*;
use finmod_formula::parse_formula;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "finmod")]
#[command(author, version, about = "Financial model formula tool")]
struct Cli {
    /// Log engine activity to stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula in an empty tile and print its value
    Eval {
        formula: String,
    },

    /// Print the token stream of a formula
    Tokens {
        formula: String,
    },

    /// Replay JSON-lines requests and print the final board as JSON
    Run {
        /// Script file (default: stdin)
        script: Option<PathBuf>,

        /// Print the board after every request
        #[arg(long)]
        each: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut stdout = io::stdout().lock();
    match cli.command {
        Commands::Eval { formula } => {
            let value = eval_formula(&formula)?;
            writeln!(stdout, "{value}")?;
        }
        Commands::Tokens { formula } => {
            stdout.write_all(token_listing(&formula)?.as_bytes())?;
        }
        Commands::Run { script, each } => match script {
            Some(path) => {
                let file = File::open(&path).with_context(|| format!("Failed to open '{}'", path.display()))?;
                run_script(BufReader::new(file), Some(&path), each, &mut stdout)?;
            }
            None => run_script(io::stdin().lock(), None, each, &mut stdout)?,
        },
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise warnings, or more with `-v`
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn eval_formula(text: &str) -> Result<String> {
    let mut engine = Engine::new(EngineOptions::default());
    let board = engine.add_board(finmod::DEFAULT_BOARD);
    let tile = engine.add_tile(board)?;
    let cell = CellId::new(board, tile, 0, 0);

    engine.update_cell(cell, text)?;
    match engine.cell(cell).map(|c| &c.status) {
        Some(CellStatus::Errored(error)) => bail!("{error}"),
        _ => Ok(engine.value(cell).map(Value::to_string).unwrap_or_default()),
    }
}

/// One token per line: offset, category, text
fn token_listing(text: &str) -> Result<String> {
    let formula = parse_formula(text).with_context(|| format!("Failed to parse '{text}'"))?;
    let source = formula.source();
    let mut out = String::new();
    for token in formula.tokens() {
        let lexeme = source.get(token.start as usize..token.end()).unwrap_or_default();
        out.push_str(&format!("{}\t{:?}\t{}\n", token.start, token.tag, lexeme));
    }
    Ok(out)
}

fn run_script<R: BufRead, W: Write>(input: R, path: Option<&Path>, each: bool, out: &mut W) -> Result<()> {
    let name = path.map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());
    let service = BoardService::new();
    let mut board = service.board()?;

    for (index, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {name}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let lineno = index + 1;
        let request: Request =
            serde_json::from_str(&line).with_context(|| format!("{name}:{lineno}: malformed request"))?;
        board = service
            .dispatch(request)
            .with_context(|| format!("{name}:{lineno}: request failed"))?;
        if each {
            serde_json::to_writer(&mut *out, &board)?;
            writeln!(out)?;
        }
    }
    tracing::debug!(script = %name, tiles = board.tiles.len(), "script finished");

    if !each {
        serde_json::to_writer_pretty(&mut *out, &board)?;
        writeln!(out)?;
    }
    Ok(())
}
