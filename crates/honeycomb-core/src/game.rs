//! Game state: board plus cumulative scores and move counter.

use rand::seq::SliceRandom;
use tracing::debug;

use crate::board::Board;
use crate::cell::Cell;
use crate::error::BoardError;
use crate::player::Player;
use crate::score::score_delta;

/// A full game snapshot. Value type: applying a move yields a new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameState {
    board: Board,
    scores: [u32; 2],
    move_number: u32,
}

impl GameState {
    /// Start a game with a randomly chosen blocked corner.
    pub fn new() -> GameState {
        let corner = *Cell::CORNERS
            .choose(&mut rand::thread_rng())
            .expect("corner list is non-empty");
        debug!(%corner, "starting game with blocked corner");
        GameState::with_blocked_cell(corner).expect("corners are valid blocked cells")
    }

    /// Start a game with the given blocked corner.
    pub fn with_blocked_cell(cell: Cell) -> Result<GameState, BoardError> {
        Ok(GameState {
            board: Board::new(Some(cell))?,
            scores: [0, 0],
            move_number: 0,
        })
    }

    /// Start a game on the variant without a blocked cell.
    pub fn unblocked() -> GameState {
        GameState {
            board: Board::new(None).expect("empty blocked set is valid"),
            scores: [0, 0],
            move_number: 0,
        }
    }

    /// The current board.
    #[inline]
    pub const fn board(&self) -> Board {
        self.board
    }

    /// The player who places the next stone.
    #[inline]
    pub const fn side_to_move(&self) -> Player {
        self.board.side_to_move()
    }

    /// Number of stones placed so far (the blocked cell does not count).
    #[inline]
    pub const fn move_number(&self) -> u32 {
        self.move_number
    }

    /// Cumulative score of the given player.
    #[inline]
    pub const fn score(&self, player: Player) -> u32 {
        self.scores[player.index()]
    }

    /// Both scores, indexed by [`Player::index`].
    #[inline]
    pub const fn scores(&self) -> [u32; 2] {
        self.scores
    }

    /// Return `true` when no playable cell remains.
    #[inline]
    pub const fn is_game_over(&self) -> bool {
        self.board.is_full()
    }

    /// Iterate the playable cells in ascending index order.
    pub fn playable_cells(&self) -> impl Iterator<Item = Cell> {
        !self.board.occupancy()
    }

    /// Place a stone for the side to move, crediting any completed lines.
    ///
    /// Fails with [`BoardError::GameOver`] on a finished game and with the
    /// placement errors of [`Board::place`] otherwise.
    pub fn apply_move(&self, cell: Cell) -> Result<GameState, BoardError> {
        if self.is_game_over() {
            return Err(BoardError::GameOver);
        }

        let mover = self.board.side_to_move();
        let board = self.board.place(cell)?;
        let delta = score_delta(self.board.occupancy(), board.occupancy(), cell);

        let mut scores = self.scores;
        scores[mover.index()] += delta;

        Ok(GameState {
            board,
            scores,
            move_number: self.move_number + 1,
        })
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
