//! Board state: occupancy, blocked cell, and side to move.

use crate::bitboard::Bitboard;
use crate::cell::Cell;
use crate::error::BoardError;
use crate::player::Player;

/// An immutable board snapshot.
///
/// The blocked cell (if any) is occupied from creation and owned by neither
/// player; occupancy only ever grows as stones are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    occupancy: Bitboard,
    blocked: Bitboard,
    side_to_move: Player,
}

impl Board {
    /// Create a board with an optional blocked corner.
    ///
    /// A blocked cell outside [`Cell::CORNERS`] is rejected.
    pub fn new(blocked: Option<Cell>) -> Result<Board, BoardError> {
        let blocked = match blocked {
            Some(cell) if !cell.is_corner() => return Err(BoardError::InvalidCorner { cell }),
            Some(cell) => cell.bitboard(),
            None => Bitboard::EMPTY,
        };
        Ok(Board {
            occupancy: blocked,
            blocked,
            side_to_move: Player::First,
        })
    }

    /// The occupancy bitboard, blocked cell included.
    #[inline]
    pub const fn occupancy(self) -> Bitboard {
        self.occupancy
    }

    /// The blocked-cell mask (empty in the unblocked variant).
    #[inline]
    pub const fn blocked(self) -> Bitboard {
        self.blocked
    }

    /// The player who places the next stone.
    #[inline]
    pub const fn side_to_move(self) -> Player {
        self.side_to_move
    }

    /// Return `true` if the given cell holds no stone and is not blocked.
    #[inline]
    pub const fn is_empty(self, cell: Cell) -> bool {
        !self.occupancy.contains(cell)
    }

    /// Return `true` if the given cell is blocked.
    #[inline]
    pub const fn is_blocked(self, cell: Cell) -> bool {
        self.blocked.contains(cell)
    }

    /// Number of occupied cells, blocked cell included.
    #[inline]
    pub const fn count_occupied(self) -> u32 {
        self.occupancy.count()
    }

    /// Number of cells still playable.
    #[inline]
    pub const fn playable_count(self) -> u32 {
        Cell::COUNT as u32 - self.occupancy.count()
    }

    /// Return `true` when every cell is occupied.
    #[inline]
    pub const fn is_full(self) -> bool {
        self.occupancy.is_full()
    }

    /// Place a stone for the side to move, returning the successor board.
    ///
    /// Fails with [`BoardError::Blocked`] or [`BoardError::Occupied`] when
    /// the cell is not playable.
    pub fn place(self, cell: Cell) -> Result<Board, BoardError> {
        if self.is_blocked(cell) {
            return Err(BoardError::Blocked { cell });
        }
        if !self.is_empty(cell) {
            return Err(BoardError::Occupied { cell });
        }
        Ok(Board {
            occupancy: self.occupancy.with(cell),
            blocked: self.blocked,
            side_to_move: self.side_to_move.flip(),
        })
    }
}
