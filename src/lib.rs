//! A perfect-information solver for the board game 'Connect 4'
//!
//! The solver runs an iteratively refined alpha-beta search over bitboard
//! positions, backed by a shared transposition table and a pool of worker
//! threads racing on the same window.
//!
//! # Basic Usage
//!
//! ```
//! use dropfour_ai::{Position, Settings, Solver};
//!
//!# use std::error::Error;
//!# fn main() -> Result<(), Box<dyn Error>> {
//! let mut solver = Solver::new(Settings::default().num_table_entries(1_048_583))?;
//!
//! let pos = Position::from_moves("112233")?;
//! let score = solver.solve_strong(&pos).expect("not cancelled");
//!
//! assert_eq!(score, 18);
//! assert_eq!(solver.get_best_move(&pos, score), Some(3));
//!# Ok(())
//!# }
//! ```

use static_assertions::*;
pub use anyhow;

pub mod bits;

pub mod position;

pub mod transposition_table;

pub mod move_order;

pub mod search;

pub mod pool;

pub mod stats;

pub mod progress;

pub mod writer;

pub mod settings;

pub mod solver;

pub mod opening_book;

mod test;

pub use position::Position;
pub use settings::Settings;
pub use solver::{CancelHandle, Solver};
pub use stats::Stats;

/// The width of the game board in tiles
pub const WIDTH: usize = 7;

/// The height of the game board in tiles
pub const HEIGHT: usize = 6;

// ensure that the given dimensions fit in the board integer, including the
// sentinel row above each column
const_assert!(WIDTH * (HEIGHT + 1) <= 8 * std::mem::size_of::<bits::Bits>());
