//! Core Honeycomb types: the triangular board, scoring lines, symmetries,
//! and game state.

mod bitboard;
mod board;
mod cell;
mod error;
mod game;
mod lines;
mod player;
mod score;
mod symmetry;

pub use bitboard::Bitboard;
pub use board::Board;
pub use cell::Cell;
pub use error::BoardError;
pub use game::GameState;
pub use lines::{LINE_COUNT, LINES, LINES_BY_CELL, Line, lines_for_cell};
pub use player::Player;
pub use score::score_delta;
pub use symmetry::{SYMMETRIES, SYMMETRY_COUNT, apply_symmetry, canonical, try_apply_symmetry};
