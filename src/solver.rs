//! The public solving API and its iterative refinement driver
//!
//! # Notes
//! A `Solver` owns the transposition table and the worker pool; both live
//! for the life of the solver, so repeated calls benefit from every earlier
//! search. Scores follow the convention described in [`position`].
//!
//! Every solve method returns `None` when the search was cancelled through
//! a [`CancelHandle`]; a cancelled search never reports a score.
//!
//! [`position`]: ../position/index.html
//! [`CancelHandle`]: ../pool/struct.CancelHandle.html

use std::fmt::Write;
use std::sync::Arc;

use anyhow::Result;

use crate::opening_book::OpeningBook;
use crate::pool::Pool;
use crate::position::Position;
use crate::progress::Progress;
use crate::settings::Settings;
use crate::stats::Stats;
use crate::transposition_table::TranspositionTable;
use crate::{HEIGHT, WIDTH};

pub use crate::pool::CancelHandle;

/// A multithreaded agent solving positions exactly
pub struct Solver {
    settings: Settings,
    table: TranspositionTable,
    progress: Arc<Progress>,
    pool: Pool,
}

impl Solver {
    /// Allocates the transposition table and spawns the worker threads
    ///
    /// Fails when the table cannot be allocated with the requested entry
    /// count (see [`TranspositionTable::new`]).
    ///
    /// [`TranspositionTable::new`]: ../transposition_table/struct.TranspositionTable.html#method.new
    pub fn new(settings: Settings) -> Result<Self> {
        let table =
            TranspositionTable::new(settings.num_table_entries, settings.enable_huge_pages)?;
        Ok(Self::new_with_table(settings, table))
    }

    /// Creates a solver reusing an existing table
    ///
    /// Lets several solvers share one table, as the opening book generator
    /// does when it parallelises across positions.
    pub fn new_with_table(settings: Settings, table: TranspositionTable) -> Self {
        let progress = Arc::new(Progress::new(false));
        let pool = Pool::new(&settings, &table, Arc::clone(&progress), None);

        Self {
            settings,
            table,
            progress,
            pool,
        }
    }

    /// Attaches an opening book consulted at its recorded depth
    pub fn with_opening_book(mut self, opening_book: OpeningBook) -> Self {
        // the workers hold their book handle from birth, so respawn them
        self.pool = Pool::new(
            &self.settings,
            &self.table,
            Arc::clone(&self.progress),
            Some(Arc::new(opening_book)),
        );
        self
    }

    /// Prints search progress and breakthroughs to stdout from now on
    pub fn print_progress(&self) {
        self.progress.print_progress();
    }

    /// Determines which side wins under optimal play
    ///
    /// Returns +1 when the current player can force a win, -1 when the
    /// opponent can, and 0 for a draw.
    pub fn solve_weak(&mut self, pos: &Position) -> Option<i32> {
        if let Some(score) = trivial_score(pos) {
            return Some(score.signum());
        }

        // a null window below zero separates losses from the rest
        let result = self.window_probe(pos, -1, 0)?;
        if result < 0 {
            return Some(-1);
        }
        if result > 0 {
            return Some(1);
        }

        // zero only tells us the score is an upper or lower bound of the
        // window, so probe the other side of zero
        let result = self.window_probe(pos, 0, 1)?;
        Some(result.signum())
    }

    /// Determines the exact score of the position under optimal play
    pub fn solve_strong(&mut self, pos: &Position) -> Option<i32> {
        if let Some(score) = trivial_score(pos) {
            return Some(score);
        }

        let mut min = pos.score_loss(0);
        let mut max = pos.score_win(0);

        // iteratively narrow the window with null-window probes
        while min < max {
            let mut mid = min + (max - min) / 2;
            // probe near zero first, where most scores live
            if mid <= 0 && min / 2 < mid {
                mid = min / 2;
            } else if mid >= 0 && max / 2 > mid {
                mid = max / 2;
            }

            // the result indicates whether the true score is above or below
            // the probe target
            let result = self.window_probe(pos, mid, mid + 1)?;
            if result <= mid {
                max = result;
            } else {
                min = result;
            }
        }

        Some(min)
    }

    /// Searches the position inside `(alpha, beta)`
    ///
    /// An aspiration helper for callers refining their own windows: the
    /// returned score is exact inside the window and otherwise a bound of
    /// the same side as the window edge it crossed.
    pub fn solve(&mut self, pos: &Position, alpha: i32, beta: i32) -> Option<i32> {
        if let Some(score) = trivial_score(pos) {
            return Some(score);
        }

        self.window_probe(pos, alpha, beta)
    }

    /// Finds a column achieving `score`, the exact score of the position
    ///
    /// Plays each legal column and verifies the child with a null window;
    /// the first column whose child matches is returned. `None` is only
    /// returned for cancelled searches or terminal positions.
    pub fn get_best_move(&mut self, pos: &Position, score: i32) -> Option<usize> {
        if pos.is_game_over() {
            return None;
        }

        // winning this move always matches the exact score
        let wins = pos.wins_this_move(pos.find_player_threats());
        if wins != 0 {
            let first_win = wins & wins.wrapping_neg();
            return Some(crate::bits::column_from_move(first_win));
        }

        for column in 0..WIDTH {
            if !pos.playable(column) {
                continue;
            }

            let mut child = *pos;
            child.play(column);

            let child_score = self.solve(&child, -score, -score + 1)?;
            if child_score <= -score {
                return Some(column);
            }
        }

        // the exact score always has a matching child
        None
    }

    /// Returns the score and the optimal line of play from `pos`
    pub fn get_principal_variation(&mut self, pos: &Position) -> Option<(i32, Vec<usize>)> {
        let score = self.solve_strong(pos)?;

        let mut line = Vec::new();
        let mut current = *pos;
        let mut current_score = score;

        while !current.is_game_over() {
            let column = self.get_best_move(&current, current_score)?;
            line.push(column);
            current.play(column);
            // the child sees the same game from the other side
            current_score = -current_score;
        }

        Some((score, line))
    }

    /// Predicts the move on which the game ends under optimal play
    pub fn get_num_moves_prediction(&self, pos: &Position, score: i32) -> usize {
        pos.score_to_last_move(score)
    }

    /// A clonable handle for cancelling searches from other threads
    pub fn cancel_handle(&self) -> CancelHandle {
        self.pool.cancel_handle()
    }

    /// Asynchronously requests that the in-flight search stops
    pub fn cancel(&self) {
        self.pool.cancel();
    }

    /// The combined stats of every search since the last reset
    pub fn get_merged_stats(&self) -> &Stats {
        self.pool.get_merged_stats()
    }

    /// Zeroes the combined stats
    pub fn reset_stats(&mut self) {
        self.pool.reset_stats();
    }

    /// Formats the build-time and start-up configuration as a report
    pub fn get_settings_string(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "Board            = {} x {}", WIDTH, HEIGHT);
        let _ = writeln!(out, "Threads          = {}", self.pool.num_workers());
        let _ = writeln!(
            out,
            "Table entries    = {} ({})",
            self.table.len(),
            self.table.size_string()
        );
        let _ = writeln!(
            out,
            "Huge pages       = {}",
            if self.settings.enable_huge_pages { "enabled" } else { "disabled" }
        );
        let _ = writeln!(
            out,
            "Thread affinity  = {}",
            if self.settings.enable_affinity { "enabled" } else { "disabled" }
        );
        let _ = write!(out, "Move jitter      = {:.2}", self.settings.move_score_jitter);

        out
    }

    // Clamps the window to the scores reachable from `pos` before searching.
    // A collapsed window already decides the probe.
    fn window_probe(&mut self, pos: &Position, alpha: i32, beta: i32) -> Option<i32> {
        let alpha = alpha.max(pos.score_loss(0));
        let beta = beta.min(pos.score_win(0));

        if alpha >= beta {
            return Some(alpha);
        }

        self.pool.search(pos, alpha, beta)
    }
}

// Scores the positions cheap checks can decide without a search: finished
// games and immediate wins.
fn trivial_score(pos: &Position) -> Option<i32> {
    if pos.has_player_won() {
        Some(pos.score_win(0))
    } else if pos.has_opponent_won() {
        Some(-pos.score_win(0))
    } else if pos.is_draw() {
        Some(0)
    } else if pos.wins_this_move(pos.find_player_threats()) != 0 {
        Some(pos.score_win(1))
    } else {
        None
    }
}
