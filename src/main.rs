//! Self-play training runner.
//!
//! Plays Honeycomb against itself to warm the shared transposition table,
//! then persists the table for later sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use honeycomb_core::{Cell, GameState, Player};
use honeycomb_engine::{
    PersistError, SearchConstraints, SearchMode, Searcher, TranspositionTable,
};

#[derive(Debug, Parser)]
#[command(name = "trainer", about = "Honeycomb self-play training runner")]
struct Args {
    /// Number of self-play games.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    game_count: u32,

    /// Maximum iterative-deepening depth per move.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    max_depth: u32,

    /// Wall-clock budget per move in milliseconds; 0 means unbounded.
    time_limit_ms: u64,

    /// Optional depth override (min'd with max_depth) and/or table path.
    #[arg(value_name = "DEPTH_OVERRIDE|TABLE")]
    rest: Vec<String>,

    /// Minimum think time per move in milliseconds.
    #[arg(long = "minThinkMillis", value_name = "N")]
    min_think_millis: Option<u64>,

    /// Path of the persisted transposition table.
    #[arg(long = "table", value_name = "PATH")]
    table: Option<PathBuf>,

    /// Log the principal variation of every completed iteration.
    #[arg(long = "tracePVS")]
    trace_pvs: bool,
}

struct Options {
    depth_override: Option<u32>,
    table: Option<PathBuf>,
}

/// Disambiguate the trailing positionals: a number is the depth override,
/// anything else is the table path.
fn interpret_rest(args: &Args) -> Result<Options> {
    let mut depth_override = None;
    let mut table = args.table.clone();

    for raw in &args.rest {
        if let Ok(depth) = raw.parse::<u32>() {
            if depth == 0 {
                bail!("depth override must be at least 1");
            }
            if depth_override.replace(depth).is_some() {
                bail!("duplicate depth override: {raw}");
            }
        } else if table.is_none() {
            table = Some(PathBuf::from(raw));
        } else {
            bail!("unexpected argument: {raw}");
        }
    }

    Ok(Options {
        depth_override,
        table,
    })
}

fn format_pv(pv: &[Cell]) -> String {
    pv.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let options = interpret_rest(&args)?;

    let table = Arc::new(match options.table {
        Some(path) => TranspositionTable::with_path(path),
        None => TranspositionTable::new(),
    });

    // A missing or unreadable file just means a cold table; a corrupt one
    // (or no resolvable path at all) is fatal.
    match table.load_async().wait() {
        Ok(count) => info!(count, "transposition table loaded"),
        Err(PersistError::Io { message }) => warn!(%message, "starting with a cold table"),
        Err(err) => return Err(err).context("loading the transposition table"),
    }

    let depth = options
        .depth_override
        .map_or(args.max_depth, |depth| depth.min(args.max_depth));
    let constraints = SearchConstraints {
        depth_limit: depth,
        time_limit: Duration::from_millis(args.time_limit_ms),
        mode: SearchMode::Parallel,
    };

    let mut searcher = Searcher::new(Arc::clone(&table));
    if let Some(millis) = args.min_think_millis {
        searcher = searcher.with_min_think_time(Duration::from_millis(millis));
    }

    for game in 1..=args.game_count {
        let mut state = GameState::new();

        while !state.is_game_over() {
            let result = searcher
                .search(&state, constraints)
                .context("searching for a move")?;

            for warning in &result.telemetry.warnings {
                warn!(game, %warning, "search warning");
            }
            if args.trace_pvs {
                for iteration in &result.telemetry.iterations {
                    info!(
                        game,
                        depth = iteration.depth,
                        nodes = iteration.nodes,
                        researches = iteration.pv_researches,
                        pv = %format_pv(&iteration.principal_variation),
                        "iteration"
                    );
                }
            }

            state = state
                .apply_move(result.best_move)
                .context("applying the searched move")?;
        }

        info!(
            game,
            moves = state.move_number(),
            first = state.score(Player::First),
            second = state.score(Player::Second),
            "game finished"
        );
    }

    let saved = table
        .save_async()
        .wait()
        .context("saving the transposition table")?;
    info!(entries = saved, "transposition table saved");

    Ok(())
}
