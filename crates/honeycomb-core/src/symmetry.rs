//! The dihedral symmetry group of the triangular board.
//!
//! Each cell (row r, col c) maps to cube coordinates (x, y, z) =
//! (9-r, c, r-c) with x + y + z = 9; the six axis permutations of (x, y, z)
//! are exactly the rotations and reflections of the triangle. The permutation
//! tables are verified to be bijections at construction; a broken table is a
//! compile-time panic.

use crate::bitboard::Bitboard;
use crate::cell::Cell;

/// Number of board symmetries.
pub const SYMMETRY_COUNT: usize = 6;

/// Axis permutations of the cube coordinates, identity first.
const AXIS_PERMS: [[usize; 3]; SYMMETRY_COUNT] = [
    [0, 1, 2],
    [1, 2, 0],
    [2, 0, 1],
    [0, 2, 1],
    [2, 1, 0],
    [1, 0, 2],
];

const fn compute_permutations() -> [[u8; Cell::COUNT]; SYMMETRY_COUNT] {
    let mut table = [[0u8; Cell::COUNT]; SYMMETRY_COUNT];

    let mut s = 0usize;
    while s < SYMMETRY_COUNT {
        let perm = AXIS_PERMS[s];
        let mut seen = [false; Cell::COUNT];

        let mut row = 0i64;
        let mut index = 0usize;
        while row < 10 {
            let mut col = 0i64;
            while col <= row {
                let coords = [9 - row, col, row - col];
                let y = coords[perm[1]];
                let z = coords[perm[2]];
                let new_row = y + z;
                let new_col = y;
                let target = new_row * (new_row + 1) / 2 + new_col;
                if target < 0 || target >= Cell::COUNT as i64 {
                    panic!("symmetry image out of range");
                }
                if seen[target as usize] {
                    panic!("symmetry permutation is not a bijection");
                }
                seen[target as usize] = true;
                table[s][index] = target as u8;
                col += 1;
                index += 1;
            }
            row += 1;
        }

        s += 1;
    }

    table
}

/// Cell-index permutations for the six symmetries; `SYMMETRIES[0]` is the
/// identity.
pub const SYMMETRIES: [[u8; Cell::COUNT]; SYMMETRY_COUNT] = compute_permutations();

/// Map a bitboard through symmetry `s`.
///
/// # Panics
///
/// Panics if `s >= SYMMETRY_COUNT`; use [`try_apply_symmetry`] at the API
/// boundary.
#[inline]
pub fn apply_symmetry(board: Bitboard, s: usize) -> Bitboard {
    let perm = &SYMMETRIES[s];
    let mut bits = board.inner();
    let mut out = 0u64;
    while bits != 0 {
        let index = bits.trailing_zeros() as usize;
        out |= 1u64 << perm[index];
        bits &= bits - 1;
    }
    Bitboard::new(out)
}

/// Checked variant of [`apply_symmetry`] for callers holding an untrusted
/// symmetry index.
pub fn try_apply_symmetry(board: Bitboard, s: usize) -> Result<Bitboard, crate::BoardError> {
    if s >= SYMMETRY_COUNT {
        return Err(crate::BoardError::InvalidSymmetry { index: s });
    }
    Ok(apply_symmetry(board, s))
}

/// The canonical image of a bitboard: the minimum of its six symmetry
/// images, as a raw `u64`.
#[inline]
pub fn canonical(board: Bitboard) -> u64 {
    let mut min = board.inner();
    for s in 1..SYMMETRY_COUNT {
        let image = apply_symmetry(board, s).inner();
        if image < min {
            min = image;
        }
    }
    min
}

#[cfg(test)]
mod tests {
    use super::{SYMMETRIES, SYMMETRY_COUNT, apply_symmetry, canonical, try_apply_symmetry};
    use crate::bitboard::Bitboard;
    use crate::cell::Cell;

    fn cell(index: u8) -> Cell {
        Cell::from_index(index).unwrap()
    }

    #[test]
    fn identity_is_first() {
        for index in 0..55u8 {
            assert_eq!(SYMMETRIES[0][index as usize], index);
        }
    }

    #[test]
    fn each_permutation_is_a_bijection() {
        for perm in SYMMETRIES {
            let mut seen = [false; 55];
            for target in perm {
                assert!(!seen[target as usize]);
                seen[target as usize] = true;
            }
        }
    }

    #[test]
    fn popcount_is_preserved() {
        let board = Bitboard::EMPTY.with(cell(0)).with(cell(17)).with(cell(31));
        for s in 0..SYMMETRY_COUNT {
            assert_eq!(apply_symmetry(board, s).count(), board.count());
        }
    }

    #[test]
    fn full_and_empty_are_fixed_points() {
        for s in 0..SYMMETRY_COUNT {
            assert_eq!(apply_symmetry(Bitboard::FULL, s), Bitboard::FULL);
            assert_eq!(apply_symmetry(Bitboard::EMPTY, s), Bitboard::EMPTY);
        }
    }

    #[test]
    fn corners_map_to_corners() {
        for s in 0..SYMMETRY_COUNT {
            for corner in Cell::CORNERS {
                let image = apply_symmetry(corner.bitboard(), s);
                let target = image.into_iter().next().unwrap();
                assert!(target.is_corner(), "symmetry {s} sent {corner} to {target}");
            }
        }
    }

    #[test]
    fn canonical_is_symmetry_invariant() {
        let board = Bitboard::EMPTY.with(cell(3)).with(cell(12)).with(cell(40));
        let expected = canonical(board);
        for s in 0..SYMMETRY_COUNT {
            assert_eq!(canonical(apply_symmetry(board, s)), expected);
        }
    }

    #[test]
    fn canonical_never_exceeds_input() {
        let board = Bitboard::EMPTY.with(cell(54)).with(cell(48));
        assert!(canonical(board) <= board.inner());
    }

    #[test]
    fn canonical_of_single_corner_is_one() {
        for corner in Cell::CORNERS {
            assert_eq!(canonical(corner.bitboard()), 1);
        }
    }

    #[test]
    fn checked_apply_rejects_out_of_range() {
        assert!(try_apply_symmetry(Bitboard::EMPTY, SYMMETRY_COUNT).is_err());
        assert!(try_apply_symmetry(Bitboard::EMPTY, 5).is_ok());
    }
}
