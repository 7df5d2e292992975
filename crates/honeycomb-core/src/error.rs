//! Error types for board construction and move application.

use crate::cell::Cell;

/// Errors from board construction and move validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The requested blocked cell is not one of the three corners.
    #[error("blocked cell must be a corner, got {cell}")]
    InvalidCorner {
        /// The rejected cell.
        cell: Cell,
    },
    /// A stone was placed on an occupied cell.
    #[error("cell {cell} is already occupied")]
    Occupied {
        /// The occupied cell.
        cell: Cell,
    },
    /// A stone was placed on the blocked cell.
    #[error("cell {cell} is blocked")]
    Blocked {
        /// The blocked cell.
        cell: Cell,
    },
    /// A move was applied to a finished game.
    #[error("the game is already over")]
    GameOver,
    /// A symmetry index outside 0..6 was supplied.
    #[error("symmetry index {index} out of range")]
    InvalidSymmetry {
        /// The rejected index.
        index: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::BoardError;
    use crate::cell::Cell;

    #[test]
    fn display_messages() {
        let cell = Cell::from_index(7).unwrap();
        assert_eq!(
            format!("{}", BoardError::Occupied { cell }),
            "cell r3c1 is already occupied"
        );
        assert_eq!(format!("{}", BoardError::GameOver), "the game is already over");
    }
}
