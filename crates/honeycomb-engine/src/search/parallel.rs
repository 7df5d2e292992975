//! Fork-join parallel negamax.
//!
//! The root and every principal-variation node split: the first move is
//! searched sequentially to establish a bound, the remaining moves run as
//! null-window scout tasks on the rayon pool, and scouts that beat the
//! bound are re-searched sequentially with the full window (Young Brothers
//! Wait). Joins happen in submission order; a cutoff cancels the unjoined
//! siblings, whose results are swallowed as "no information".
//!
//! Each task borrows a `SearchStack` from a thread-local free list and
//! returns it on every exit path, unwinds included.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::bounded;
use rayon::ThreadPool;

use crate::search::negamax::{INF, SearchContext, negamax};
use crate::search::stack::{SearchStack, StackSnapshot};
use crate::search::tt::{Flag, TtEntry};

thread_local! {
    static STACK_POOL: RefCell<Vec<Box<SearchStack>>> = const { RefCell::new(Vec::new()) };
}

/// A pooled stack that returns itself to the free list on drop.
struct PooledStack {
    stack: Option<Box<SearchStack>>,
}

impl PooledStack {
    fn acquire(snapshot: &StackSnapshot) -> PooledStack {
        let mut stack = STACK_POOL
            .with(|pool| pool.borrow_mut().pop())
            .unwrap_or_default();
        stack.load(snapshot);
        PooledStack { stack: Some(stack) }
    }

    fn get(&mut self) -> &mut SearchStack {
        self.stack.as_mut().expect("stack present until drop")
    }
}

impl Drop for PooledStack {
    fn drop(&mut self) {
        if let Some(stack) = self.stack.take() {
            STACK_POOL.with(|pool| pool.borrow_mut().push(stack));
        }
    }
}

/// Null-window scout of one sibling move on a pooled stack.
///
/// Returns `None` when the task was cancelled or the search aborted while
/// it ran, so the joiner treats it as carrying no information.
fn scout(
    snapshot: &StackSnapshot,
    cell: u8,
    depth: i32,
    alpha: i32,
    ctx: &SearchContext<'_>,
) -> Option<i32> {
    if ctx.control.should_abort() {
        return None;
    }

    ctx.counters.task_started();
    let mut pooled = PooledStack::acquire(snapshot);
    let stack = pooled.get();
    stack.push(honeycomb_core::Cell::from_index(cell).expect("generated cell in range"));
    let score = -negamax(stack, depth - 1, -alpha - 1, -alpha, ctx);
    drop(pooled);
    ctx.counters.task_finished();

    if ctx.control.should_abort() {
        None
    } else {
        Some(score)
    }
}

/// Split the current node's moves 1..count across the pool after move 0 has
/// raised `alpha`. Returns the node's `(best_move, best_value)` given the
/// bound from move 0.
#[allow(clippy::too_many_arguments)]
fn split_siblings(
    stack: &mut SearchStack,
    depth: i32,
    mut alpha: i32,
    beta: i32,
    mut best_value: i32,
    mut best_move: i32,
    count: usize,
    ctx: &SearchContext<'_>,
    pool: &ThreadPool,
) -> (i32, i32) {
    let alpha0 = alpha;
    let snapshot = stack.snapshot();
    let cancel = Arc::new(AtomicBool::new(false));
    let scout_ctx = ctx.with_cancel(Arc::clone(&cancel));

    pool.in_place_scope(|scope| {
        let mut receivers = Vec::with_capacity(count - 1);
        for index in 1..count {
            let entry = stack.move_at(index);
            let (sender, receiver) = bounded(1);
            receivers.push(receiver);

            let scout_ctx = &scout_ctx;
            let cancel = &cancel;
            scope.spawn(move |_| {
                let result = scout(&snapshot, entry.cell, depth, alpha0, scout_ctx);
                // A scout that already refutes the whole node retires its
                // siblings without waiting for the joiner.
                if let Some(score) = result
                    && score >= beta
                {
                    cancel.store(true, Ordering::Release);
                }
                let _ = sender.send(result);
            });
        }

        for (offset, receiver) in receivers.iter().enumerate() {
            let index = offset + 1;
            let Ok(result) = receiver.recv() else {
                continue;
            };
            let Some(scouted) = result else {
                continue;
            };

            let mut score = scouted;
            if scouted > alpha0 {
                // Fail high against the scout window: re-search sequentially
                // with the full window and the current bound.
                ctx.counters.pv_researches.fetch_add(1, Ordering::Relaxed);
                stack.push_generated(index);
                score = -negamax(stack, depth - 1, -beta, -alpha, ctx);
                stack.unwind();
            }

            if score > best_value {
                best_value = score;
                best_move = stack.move_at(index).cell as i32;
            }
            alpha = alpha.max(score);
            if alpha >= beta {
                ctx.counters.cutoffs.fetch_add(1, Ordering::Relaxed);
                cancel.store(true, Ordering::Release);
                break;
            }
            if ctx.control.should_abort() {
                cancel.store(true, Ordering::Release);
                break;
            }
        }
    });

    (best_move, best_value)
}

/// Parallel negamax node. Splits at principal-variation nodes deep enough
/// to be worth forking; everything narrower runs the sequential node.
pub(crate) fn par_negamax(
    stack: &mut SearchStack,
    depth: i32,
    mut alpha: i32,
    mut beta: i32,
    ctx: &SearchContext<'_>,
    pool: &ThreadPool,
) -> i32 {
    if beta - alpha <= 1 || depth < 2 {
        return negamax(stack, depth, alpha, beta, ctx);
    }

    if ctx.control.should_abort() {
        return stack.evaluate_current();
    }

    ctx.counters.nodes.fetch_add(1, Ordering::Relaxed);

    let key = stack.canonical_key();
    let original_alpha = alpha;

    let mut tt_hint = TtEntry::NO_MOVE;
    if let Some(entry) = ctx.tt.get(key) {
        ctx.counters.tt_hits.fetch_add(1, Ordering::Relaxed);
        if entry.depth >= depth {
            match entry.flag {
                Flag::Exact => return entry.value,
                Flag::LowerBound => alpha = alpha.max(entry.value),
                Flag::UpperBound => beta = beta.min(entry.value),
            }
            if alpha >= beta {
                return entry.value;
            }
        }
        tt_hint = entry.best_move;
    }

    if stack.is_terminal() {
        let value = stack.evaluate_current();
        ctx.counters.tt_stores.fetch_add(1, Ordering::Relaxed);
        ctx.tt.put(
            key,
            TtEntry {
                value,
                depth,
                flag: Flag::Exact,
                best_move: TtEntry::NO_MOVE,
            },
        );
        return value;
    }

    let count = stack.generate_moves(tt_hint);

    // Move 0 establishes the bound through the parallel PV recursion.
    let first = stack.move_at(0);
    stack.push_generated(0);
    let first_score = -par_negamax(stack, depth - 1, -beta, -alpha, ctx, pool);
    stack.unwind();

    let mut best_value = first_score;
    let mut best_move = first.cell as i32;
    alpha = alpha.max(first_score);

    if alpha >= beta {
        ctx.counters.cutoffs.fetch_add(1, Ordering::Relaxed);
    } else if !ctx.control.should_abort() && count > 1 {
        (best_move, best_value) = split_siblings(
            stack, depth, alpha, beta, best_value, best_move, count, ctx, pool,
        );
    }

    if !ctx.control.should_abort() {
        let flag = if best_value <= original_alpha {
            Flag::UpperBound
        } else if best_value >= beta {
            Flag::LowerBound
        } else {
            Flag::Exact
        };
        ctx.counters.tt_stores.fetch_add(1, Ordering::Relaxed);
        ctx.tt.put(
            key,
            TtEntry {
                value: best_value,
                depth,
                flag,
                best_move,
            },
        );
    }

    best_value
}

/// Parallel root search: `(best_cell, value)` for one iterative-deepening
/// iteration.
pub(crate) fn search_root(
    stack: &mut SearchStack,
    depth: i32,
    ctx: &SearchContext<'_>,
    pool: &ThreadPool,
) -> (i32, i32) {
    ctx.counters.nodes.fetch_add(1, Ordering::Relaxed);

    let key = stack.canonical_key();
    let mut tt_hint = TtEntry::NO_MOVE;
    if let Some(entry) = ctx.tt.get(key) {
        ctx.counters.tt_hits.fetch_add(1, Ordering::Relaxed);
        if entry.depth >= depth && entry.flag == Flag::Exact && entry.best_move >= 0 {
            return (entry.best_move, entry.value);
        }
        tt_hint = entry.best_move;
    }

    let count = stack.generate_moves(tt_hint);
    debug_assert!(count > 0, "root search on a terminal position");

    let first = stack.move_at(0);
    stack.push_generated(0);
    let first_score = -par_negamax(stack, depth - 1, -INF, INF, ctx, pool);
    stack.unwind();

    let mut best_move = first.cell as i32;
    let mut best_value = first_score;

    if !ctx.control.should_abort() && count > 1 {
        (best_move, best_value) = split_siblings(
            stack, depth, first_score, INF, best_value, best_move, count, ctx, pool,
        );
    }

    if !ctx.control.should_abort() {
        ctx.counters.tt_stores.fetch_add(1, Ordering::Relaxed);
        ctx.tt.put(
            key,
            TtEntry {
                value: best_value,
                depth,
                flag: Flag::Exact,
                best_move,
            },
        );
    }

    (best_move, best_value)
}
