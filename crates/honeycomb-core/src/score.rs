//! Incremental scoring: line completions caused by a single placement.

use crate::bitboard::Bitboard;
use crate::cell::Cell;
use crate::lines::{LINES, lines_for_cell};

/// Total length of the lines through `cell` that are incomplete in `prev`
/// and complete in `next`.
///
/// Only the three lines through the played cell can change, so the result
/// lies in 0..=27 (at most 10 + 9 + 8). Allocation-free.
#[inline]
pub fn score_delta(prev: Bitboard, next: Bitboard, cell: Cell) -> u32 {
    let mut delta = 0u32;
    for index in lines_for_cell(cell) {
        let line = LINES[index as usize];
        if !prev.covers(line.mask) && next.covers(line.mask) {
            delta += line.length as u32;
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::score_delta;
    use crate::bitboard::Bitboard;
    use crate::cell::Cell;
    use crate::lines::LINES;

    fn cell(index: u8) -> Cell {
        Cell::from_index(index).unwrap()
    }

    #[test]
    fn apex_placement_scores_the_single_cell_row() {
        // Cell 0 alone completes the length-1 row 0; its two diagonals need
        // ten stones each.
        let next = Bitboard::EMPTY.with(cell(0));
        assert_eq!(score_delta(Bitboard::EMPTY, next, cell(0)), 1);
    }

    #[test]
    fn non_completing_placement_scores_zero() {
        let next = Bitboard::EMPTY.with(cell(1));
        assert_eq!(score_delta(Bitboard::EMPTY, next, cell(1)), 0);
    }

    #[test]
    fn completing_the_two_cell_row() {
        let prev = Bitboard::EMPTY.with(cell(1));
        let next = prev.with(cell(2));
        assert_eq!(score_delta(prev, next, cell(2)), 2);
    }

    #[test]
    fn already_complete_lines_do_not_rescore() {
        // With row 1 already complete, replaying its last cell against the
        // same mask must not double count.
        let row1 = LINES[1].mask;
        assert_eq!(score_delta(row1, row1, cell(2)), 0);
    }

    #[test]
    fn last_cell_on_the_board_completes_three_lines() {
        // Cell 54 closes row 9, the long down-right diagonal, and its own
        // length-1 down-left diagonal: 10 + 10 + 1.
        let prev = !Bitboard::EMPTY.with(cell(54));
        let next = Bitboard::FULL;
        assert_eq!(score_delta(prev, next, cell(54)), 21);
    }

    #[test]
    fn delta_is_bounded() {
        // Exhaustive single-placement sweep from a board missing one cell.
        for c in Cell::all() {
            let prev = Bitboard::FULL.without(c);
            let delta = score_delta(prev, Bitboard::FULL, c);
            assert!(delta <= 27, "delta {delta} for {c}");
            assert!(delta >= 3, "filling the last gap completes all three lines of {c}");
        }
    }
}
