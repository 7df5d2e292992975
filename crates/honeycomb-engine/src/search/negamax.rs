//! Sequential negamax alpha-beta search.
//!
//! One recursive node procedure walking a [`SearchStack`], with
//! transposition-table probes and stores, principal-variation detection,
//! and late-move reductions. The iterative-deepening drivers in the parent
//! module call [`search_root`] once per depth.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::search::control::SearchControl;
use crate::search::stack::SearchStack;
use crate::search::tt::{Flag, TranspositionTable, TtEntry};

/// Score sentinel no real evaluation can reach.
pub const INF: i32 = i32::MAX / 2;

/// Shared search statistics. Plain atomics so parallel tasks can bump them
/// without coordination.
#[derive(Debug, Default)]
pub struct SearchCounters {
    /// Nodes entered.
    pub nodes: AtomicU64,
    /// Beta cutoffs taken.
    pub cutoffs: AtomicU64,
    /// Transposition-table probe hits.
    pub tt_hits: AtomicU64,
    /// Transposition-table stores attempted.
    pub tt_stores: AtomicU64,
    /// Scout results re-searched with the full window.
    pub pv_researches: AtomicU64,
    /// Currently running parallel tasks.
    pub active_tasks: AtomicU64,
    /// High-water mark of `active_tasks`.
    pub max_active_tasks: AtomicU64,
}

/// Point-in-time copy of the counters, used for per-iteration telemetry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub nodes: u64,
    pub cutoffs: u64,
    pub tt_hits: u64,
    pub tt_stores: u64,
    pub pv_researches: u64,
    pub max_active_tasks: u64,
}

impl SearchCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            nodes: self.nodes.load(Ordering::Relaxed),
            cutoffs: self.cutoffs.load(Ordering::Relaxed),
            tt_hits: self.tt_hits.load(Ordering::Relaxed),
            tt_stores: self.tt_stores.load(Ordering::Relaxed),
            pv_researches: self.pv_researches.load(Ordering::Relaxed),
            max_active_tasks: self.max_active_tasks.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn task_started(&self) {
        let running = self.active_tasks.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_active_tasks.fetch_max(running, Ordering::Relaxed);
    }

    pub(crate) fn task_finished(&self) {
        self.active_tasks.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Immutable search environment threaded through the recursion.
pub(crate) struct SearchContext<'a> {
    pub tt: &'a TranspositionTable,
    pub control: SearchControl,
    pub counters: &'a SearchCounters,
}

impl SearchContext<'_> {
    /// Derive a context whose aborts additionally honour `cancel`.
    pub(crate) fn with_cancel(
        &self,
        cancel: std::sync::Arc<std::sync::atomic::AtomicBool>,
    ) -> SearchContext<'_> {
        SearchContext {
            tt: self.tt,
            control: self.control.with_cancel(cancel),
            counters: self.counters,
        }
    }
}

fn store(ctx: &SearchContext<'_>, key: u64, entry: TtEntry) {
    ctx.counters.tt_stores.fetch_add(1, Ordering::Relaxed);
    ctx.tt.put(key, entry);
}

/// Search one node to `depth` plies, returning its negamax value.
pub(crate) fn negamax(
    stack: &mut SearchStack,
    depth: i32,
    mut alpha: i32,
    mut beta: i32,
    ctx: &SearchContext<'_>,
) -> i32 {
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

    if depth <= 0 || stack.is_terminal() {
        let value = stack.evaluate_current();
        store(
            ctx,
            key,
            TtEntry {
                value,
                depth: depth.max(0),
                flag: Flag::Exact,
                best_move: TtEntry::NO_MOVE,
            },
        );
        return value;
    }

    let count = stack.generate_moves(tt_hint);
    if count == 0 {
        let value = stack.evaluate_current();
        store(
            ctx,
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

    let mut best_value = -INF;
    let mut best_move = TtEntry::NO_MOVE;

    for index in 0..count {
        let is_pv_node = beta - alpha > 1;
        let entry = stack.move_at(index);

        // Late-move reduction: quiet non-first moves at scout nodes search
        // one ply shallower first.
        let reduce =
            !is_pv_node && depth > 2 && index > 0 && entry.delta == 0;

        stack.push_generated(index);
        let score = if reduce {
            let reduced = -negamax(stack, depth - 2, -alpha - 1, -alpha, ctx);
            if reduced > alpha {
                -negamax(stack, depth - 1, -beta, -alpha, ctx)
            } else {
                reduced
            }
        } else {
            -negamax(stack, depth - 1, -beta, -alpha, ctx)
        };
        stack.unwind();

        if score > best_value {
            best_value = score;
            best_move = entry.cell as i32;
        }
        alpha = alpha.max(score);
        if alpha >= beta {
            ctx.counters.cutoffs.fetch_add(1, Ordering::Relaxed);
            break;
        }
        if ctx.control.should_abort() {
            break;
        }
    }

    if !ctx.control.should_abort() {
        let flag = if best_value <= original_alpha {
            Flag::UpperBound
        } else if best_value >= beta {
            Flag::LowerBound
        } else {
            Flag::Exact
        };
        store(
            ctx,
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

/// Search the root to `depth` plies, returning `(best_cell, value)`.
///
/// Same node contract as [`negamax`] with a full-width window, plus explicit
/// best-move tracking; stores the root entry on completion. The returned
/// cell is always a legal move once at least one child has reported, even
/// when the deadline fires mid-iteration.
pub(crate) fn search_root(stack: &mut SearchStack, depth: i32, ctx: &SearchContext<'_>) -> (i32, i32) {
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

    let mut alpha = -INF;
    let beta = INF;
    let mut best_value = -INF;
    let mut best_move = TtEntry::NO_MOVE;

    for index in 0..count {
        let entry = stack.move_at(index);
        stack.push_generated(index);
        let score = -negamax(stack, depth - 1, -beta, -alpha, ctx);
        stack.unwind();

        if score > best_value {
            best_value = score;
            best_move = entry.cell as i32;
        }
        alpha = alpha.max(score);
        if ctx.control.should_abort() {
            break;
        }
    }

    if !ctx.control.should_abort() {
        store(
            ctx,
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
