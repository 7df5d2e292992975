//! Search orchestration: iterative deepening, constraints, and telemetry.

pub mod control;
pub mod negamax;
pub mod parallel;
pub mod persist;
pub mod stack;
pub mod tt;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use honeycomb_core::{BoardError, Cell, GameState};
use tracing::{debug, warn};

use control::SearchControl;
use negamax::{CounterSnapshot, SearchContext, SearchCounters};
use stack::SearchStack;
use tt::TranspositionTable;

/// Depth used by [`Searcher::find_best_move`] when the caller does not
/// override it.
pub const DEFAULT_DEPTH: u32 = 6;

/// Errors from the search API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// The requested depth limit is below 1.
    #[error("search depth must be at least 1")]
    DepthTooLow,
    /// The position has no playable cell left.
    #[error("cannot search a terminal position")]
    TerminalPosition,
    /// The search stack was popped at the root.
    #[error("cannot pop the root of the search stack")]
    PopAtRoot,
    /// A board operation failed.
    #[error(transparent)]
    Board(#[from] BoardError),
}

/// Which searcher runs the iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Single-threaded negamax on the caller's thread.
    Sequential,
    /// Fork-join principal-variation splitting on the rayon pool.
    Parallel,
}

/// Caller-supplied search limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConstraints {
    /// Maximum iterative-deepening depth; bounded by the remaining playable
    /// cells at dispatch.
    pub depth_limit: u32,
    /// Wall-clock budget; [`Duration::ZERO`] means unbounded.
    pub time_limit: Duration,
    /// Sequential or parallel execution.
    pub mode: SearchMode,
}

impl SearchConstraints {
    /// Unbounded sequential search to `depth_limit`.
    pub fn sequential(depth_limit: u32) -> Self {
        Self {
            depth_limit,
            time_limit: Duration::ZERO,
            mode: SearchMode::Sequential,
        }
    }

    /// Unbounded parallel search to `depth_limit`.
    pub fn parallel(depth_limit: u32) -> Self {
        Self {
            depth_limit,
            time_limit: Duration::ZERO,
            mode: SearchMode::Parallel,
        }
    }

    /// Same constraints with a wall-clock budget.
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }
}

/// Telemetry of one completed iterative-deepening iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationStats {
    /// Depth of this iteration.
    pub depth: u32,
    /// Nodes visited during this iteration.
    pub nodes: u64,
    /// Beta cutoffs during this iteration.
    pub cutoffs: u64,
    /// Transposition-table hits during this iteration.
    pub tt_hits: u64,
    /// Transposition-table stores during this iteration.
    pub tt_stores: u64,
    /// Scout re-searches during this iteration (parallel mode).
    pub pv_researches: u64,
    /// High-water mark of concurrently running tasks so far.
    pub max_active_tasks: u64,
    /// Wall time of this iteration.
    pub elapsed: Duration,
    /// Principal variation from the transposition-table best-move chain;
    /// best-effort under parallel search.
    pub principal_variation: Vec<Cell>,
}

/// Full telemetry of one search call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchTelemetry {
    /// One record per completed iteration.
    pub iterations: Vec<IterationStats>,
    /// Non-fatal conditions surfaced to the caller (e.g. parallel fallback).
    pub warnings: Vec<String>,
}

/// Outcome of one search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Best move found. Always legal in the searched position.
    pub best_move: Cell,
    /// Negamax value of the best move from the side to move.
    pub score: i32,
    /// Deepest fully completed iteration (0 when the deadline fired first).
    pub depth: u32,
    /// Total nodes visited.
    pub nodes: u64,
    /// Whether the deadline or an external stop ended the search early.
    pub timed_out: bool,
    /// Per-iteration records and warnings.
    pub telemetry: SearchTelemetry,
}

/// Iterative-deepening searcher over a shared transposition table.
///
/// Owns one reusable [`SearchStack`]; parallel iterations borrow additional
/// stacks from a thread-local pool.
pub struct Searcher {
    tt: Arc<TranspositionTable>,
    threads: usize,
    pool: Option<rayon::ThreadPool>,
    min_think_time: Duration,
    stop: Arc<AtomicBool>,
    stack: SearchStack,
}

impl Searcher {
    /// Create a searcher with as many worker threads as logical CPUs.
    pub fn new(tt: Arc<TranspositionTable>) -> Self {
        Self {
            tt,
            threads: num_cpus::get(),
            pool: None,
            min_think_time: Duration::ZERO,
            stop: Arc::new(AtomicBool::new(false)),
            stack: SearchStack::new(),
        }
    }

    /// Set the parallel worker-thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self.pool = None;
        self
    }

    /// Set the minimum wall time a non-timed-out search must take.
    pub fn with_min_think_time(mut self, min_think_time: Duration) -> Self {
        self.min_think_time = min_think_time;
        self
    }

    /// The shared transposition table.
    pub fn table(&self) -> &Arc<TranspositionTable> {
        &self.tt
    }

    /// Flag that aborts an in-flight search when set.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Abort the in-flight search at its next poll.
    pub fn request_stop(&self) {
        self.stop.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Search `state` under `constraints`.
    ///
    /// Fails with [`SearchError::TerminalPosition`] on a finished game and
    /// [`SearchError::DepthTooLow`] for a zero depth limit. On timeout the
    /// result carries the best move found so far and `timed_out = true`.
    pub fn search(
        &mut self,
        state: &GameState,
        constraints: SearchConstraints,
    ) -> Result<SearchResult, SearchError> {
        if state.is_game_over() {
            return Err(SearchError::TerminalPosition);
        }
        if constraints.depth_limit < 1 {
            return Err(SearchError::DepthTooLow);
        }

        let start = Instant::now();
        let remaining = state.board().playable_count();
        let bounded_depth = constraints.depth_limit.min(remaining);

        let control = SearchControl::from_budget(Arc::clone(&self.stop), constraints.time_limit);
        control.clear();

        let mut telemetry = SearchTelemetry::default();
        let pool = match constraints.mode {
            SearchMode::Sequential => None,
            SearchMode::Parallel if self.threads <= 1 => {
                warn!("parallel search requested with a single thread");
                telemetry.warnings.push(
                    "parallel search unavailable with a single worker thread; ran sequentially"
                        .into(),
                );
                None
            }
            SearchMode::Parallel => match self.ensure_pool() {
                Ok(()) => self.pool.as_ref(),
                Err(err) => {
                    warn!(%err, "parallel pool unavailable");
                    telemetry
                        .warnings
                        .push(format!("parallel pool unavailable ({err}); ran sequentially"));
                    None
                }
            },
        };

        let stack = &mut self.stack;
        stack.reset(state);

        let counters = SearchCounters::default();
        let ctx = SearchContext {
            tt: &self.tt,
            control: control.clone(),
            counters: &counters,
        };

        let mut completed: Option<(i32, i32)> = None;
        let mut partial: Option<(i32, i32)> = None;
        let mut completed_depth = 0u32;
        let mut previous = CounterSnapshot::default();

        for depth in 1..=bounded_depth {
            if control.should_abort() {
                break;
            }
            let iteration_start = Instant::now();

            let (mv, score) = match pool {
                Some(pool) => parallel::search_root(stack, depth as i32, &ctx, pool),
                None => negamax::search_root(stack, depth as i32, &ctx),
            };

            if control.should_abort() {
                if mv >= 0 {
                    partial = Some((mv, score));
                }
                break;
            }

            completed = Some((mv, score));
            completed_depth = depth;

            let snapshot = counters.snapshot();
            telemetry.iterations.push(IterationStats {
                depth,
                nodes: snapshot.nodes - previous.nodes,
                cutoffs: snapshot.cutoffs - previous.cutoffs,
                tt_hits: snapshot.tt_hits - previous.tt_hits,
                tt_stores: snapshot.tt_stores - previous.tt_stores,
                pv_researches: snapshot.pv_researches - previous.pv_researches,
                max_active_tasks: snapshot.max_active_tasks,
                elapsed: iteration_start.elapsed(),
                principal_variation: extract_pv(stack, &self.tt, depth as usize),
            });
            previous = snapshot;
            debug!(depth, score, move_ = mv, "iteration complete");
        }

        let timed_out = control.is_stopped();

        let (raw_move, score) = completed.or(partial).unwrap_or_else(|| {
            // Deadline fired before the first child reported; any playable
            // cell is a legal answer.
            (first_playable(state).index() as i32, stack.evaluate_current())
        });
        let best_move = Cell::from_index(raw_move as u8)
            .filter(|cell| state.board().is_empty(*cell))
            .unwrap_or_else(|| first_playable(state));

        if !timed_out && remaining <= 1 {
            debug!("last playable move searched; scheduling table save");
            let _task = self.tt.save_async();
        }

        if !timed_out {
            let elapsed = start.elapsed();
            if elapsed < self.min_think_time {
                control.interruptible_sleep(self.min_think_time - elapsed);
            }
        }

        Ok(SearchResult {
            best_move,
            score,
            depth: completed_depth,
            nodes: counters.nodes.load(std::sync::atomic::Ordering::Relaxed),
            timed_out,
            telemetry,
        })
    }

    /// Best move under the default sequential constraints.
    pub fn find_best_move(&mut self, state: &GameState) -> Result<Cell, SearchError> {
        self.find_best_move_with_depth(state, DEFAULT_DEPTH)
    }

    /// Best move at the given depth, sequential and unbounded.
    pub fn find_best_move_with_depth(
        &mut self,
        state: &GameState,
        depth_limit: u32,
    ) -> Result<Cell, SearchError> {
        self.search(state, SearchConstraints::sequential(depth_limit))
            .map(|result| result.best_move)
    }

    fn ensure_pool(&mut self) -> Result<(), rayon::ThreadPoolBuildError> {
        if self.pool.is_none() {
            self.pool = Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.threads)
                    .thread_name(|index| format!("honeycomb-search-{index}"))
                    .build()?,
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field("tt", &self.tt)
            .field("threads", &self.threads)
            .field("min_think_time", &self.min_think_time)
            .finish()
    }
}

fn first_playable(state: &GameState) -> Cell {
    state
        .playable_cells()
        .next()
        .expect("search validated a non-terminal position")
}

/// Walk the transposition-table best-move chain from the stack's current
/// position, restoring the stack before returning.
fn extract_pv(stack: &mut SearchStack, tt: &TranspositionTable, max_len: usize) -> Vec<Cell> {
    let mut pv = Vec::new();

    for _ in 0..max_len {
        let Some(entry) = tt.get(stack.canonical_key()) else {
            break;
        };
        if entry.best_move < 0 {
            break;
        }
        let Some(cell) = Cell::from_index(entry.best_move as u8) else {
            break;
        };
        if stack.occupancy().contains(cell) {
            break;
        }
        pv.push(cell);
        stack.push(cell);
    }

    for _ in 0..pv.len() {
        stack.unwind();
    }

    pv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Arc<TranspositionTable> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(TranspositionTable::with_path(dir.path().join("table.bin")))
    }

    fn cell(index: u8) -> Cell {
        Cell::from_index(index).unwrap()
    }

    #[test]
    fn terminal_position_is_rejected() {
        let mut state = GameState::unblocked();
        for c in Cell::all() {
            state = state.apply_move(c).unwrap();
        }
        let mut searcher = Searcher::new(table());
        assert_eq!(
            searcher.search(&state, SearchConstraints::sequential(3)),
            Err(SearchError::TerminalPosition)
        );
    }

    #[test]
    fn zero_depth_is_rejected() {
        let mut searcher = Searcher::new(table());
        assert_eq!(
            searcher.search(&GameState::unblocked(), SearchConstraints::sequential(0)),
            Err(SearchError::DepthTooLow)
        );
    }

    #[test]
    fn telemetry_has_one_record_per_depth() {
        let mut searcher = Searcher::new(table());
        let result = searcher
            .search(&GameState::unblocked(), SearchConstraints::sequential(3))
            .unwrap();
        let depths: Vec<u32> = result.telemetry.iterations.iter().map(|i| i.depth).collect();
        assert_eq!(depths, vec![1, 2, 3]);
        assert_eq!(result.depth, 3);
        assert!(!result.timed_out);
    }

    #[test]
    fn depth_is_bounded_by_remaining_cells() {
        // Three playable cells left; a depth-10 request completes at 3.
        let mut state = GameState::unblocked();
        for index in 0..52u8 {
            state = state.apply_move(cell(index)).unwrap();
        }
        let mut searcher = Searcher::new(table());
        let result = searcher
            .search(&state, SearchConstraints::sequential(10))
            .unwrap();
        assert_eq!(result.depth, 3);
    }

    #[test]
    fn single_thread_parallel_falls_back_with_warning() {
        let mut searcher = Searcher::new(table()).with_threads(1);
        let result = searcher
            .search(&GameState::unblocked(), SearchConstraints::parallel(2))
            .unwrap();
        assert_eq!(result.telemetry.warnings.len(), 1);
        assert!(result.telemetry.warnings[0].contains("sequentially"));
    }

    #[test]
    fn empty_board_depth_two_takes_the_apex() {
        let mut searcher = Searcher::new(table());
        let constraints =
            SearchConstraints::sequential(2).with_time_limit(Duration::from_millis(10_000));
        let result = searcher.search(&GameState::unblocked(), constraints).unwrap();
        assert_eq!(result.best_move, cell(0));
    }

    #[test]
    fn nanosecond_budget_times_out_with_a_legal_move() {
        let mut searcher = Searcher::new(table());
        let constraints =
            SearchConstraints::sequential(8).with_time_limit(Duration::from_nanos(1));
        let result = searcher.search(&GameState::unblocked(), constraints).unwrap();
        assert!(result.timed_out);
        assert!(result.best_move.index() < 55);
    }

    #[test]
    fn min_think_time_is_enforced() {
        let mut searcher = Searcher::new(table())
            .with_min_think_time(Duration::from_millis(30));
        let start = Instant::now();
        let result = searcher
            .search(&GameState::unblocked(), SearchConstraints::sequential(1))
            .unwrap();
        assert!(!result.timed_out);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn min_think_time_is_skipped_on_timeout() {
        let mut searcher = Searcher::new(table())
            .with_min_think_time(Duration::from_secs(30));
        let constraints =
            SearchConstraints::sequential(8).with_time_limit(Duration::from_nanos(1));
        let start = Instant::now();
        let result = searcher.search(&GameState::unblocked(), constraints).unwrap();
        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn principal_variation_starts_with_the_best_move() {
        let mut searcher = Searcher::new(table());
        let result = searcher
            .search(&GameState::unblocked(), SearchConstraints::sequential(3))
            .unwrap();
        let last = result.telemetry.iterations.last().unwrap();
        assert_eq!(last.principal_variation.first(), Some(&result.best_move));
        assert!(last.principal_variation.len() <= 3);
    }

    #[test]
    fn find_best_move_returns_a_playable_cell() {
        let state = GameState::new();
        let mut searcher = Searcher::new(table());
        let best = searcher.find_best_move_with_depth(&state, 2).unwrap();
        assert!(state.board().is_empty(best));
    }

    #[test]
    fn external_stop_flags_the_result_as_timed_out() {
        let mut searcher = Searcher::new(table());
        let stop = searcher.stop_flag();
        let waker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            stop.store(true, std::sync::atomic::Ordering::Release);
        });
        let result = searcher
            .search(&GameState::unblocked(), SearchConstraints::sequential(54))
            .unwrap();
        waker.join().unwrap();
        assert!(result.timed_out);
        assert!(GameState::unblocked().board().is_empty(result.best_move));
    }
}
