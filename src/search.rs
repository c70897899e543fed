//! The single-threaded game tree search
//!
//! Each worker thread owns one `Search`. The search shares the underlying
//! transposition table storage with every other worker but keeps its own
//! stats, so the hot path never synchronises beyond the table's relaxed
//! atomics and one cancellation flag probe per node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::move_order::order_moves;
use crate::opening_book::OpeningBook;
use crate::position::Position;
use crate::progress::Progress;
use crate::stats::Stats;
use crate::transposition_table::{Lookup, NodeType, TranspositionTable};

// Sentinel score propagated up the tree when the search is cancelled.
// Outside the magnitude of any real score.
const SEARCH_STOPPED: i32 = 1000;

const INF_SCORE: i32 = 10_000;

fn get_node_type(value: i32, alpha: i32, beta: i32) -> NodeType {
    if value <= alpha {
        NodeType::Upper
    } else if value >= beta {
        NodeType::Lower
    } else {
        NodeType::Exact
    }
}

/// A cancellable alpha-beta search bound to one thread
pub struct Search {
    table: TranspositionTable,
    stats: Stats,
    progress: Arc<Progress>,
    opening_book: Option<Arc<OpeningBook>>,
    stop_search: Arc<AtomicBool>,
}

impl Search {
    /// Creates a search sharing `table` storage and reporting to `progress`
    pub fn new(
        table: TranspositionTable,
        progress: Arc<Progress>,
        opening_book: Option<Arc<OpeningBook>>,
    ) -> Self {
        Self {
            table,
            stats: Stats::new(),
            progress,
            opening_book,
            stop_search: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle other threads use to cancel this search
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_search)
    }

    /// Clears the cancellation flag before a new search
    pub fn start(&self) {
        self.stop_search.store(false, Ordering::Relaxed);
    }

    /// Requests that an in-flight search unwinds as soon as possible
    pub fn stop(&self) {
        self.stop_search.store(true, Ordering::Relaxed);
    }

    /// The counters of the most recent search
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Zeroes the search counters
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Searches `pos` inside the window `(alpha, beta)`
    ///
    /// Returns `None` when the search was cancelled before completing. The
    /// position must not be terminal and must not have an immediate win for
    /// the current player; the solver driver handles those cheaply.
    pub fn search(
        &mut self,
        pos: &mut Position,
        alpha: i32,
        beta: i32,
        move_offset: usize,
    ) -> Option<i32> {
        let score = self.negamax(pos, alpha, beta, move_offset);

        if score == SEARCH_STOPPED {
            None
        } else {
            Some(score)
        }
    }

    fn negamax(&mut self, pos: &mut Position, mut alpha: i32, mut beta: i32, move_offset: usize) -> i32 {
        debug_assert!(alpha < beta);
        debug_assert!(!pos.has_player_won());
        debug_assert!(!pos.has_opponent_won());
        debug_assert!(!pos.is_draw());
        debug_assert_eq!(pos.wins_this_move(pos.find_player_threats()), 0);

        self.stats.new_node();
        let nodes_at_entry = self.stats.get_num_nodes();

        // if another thread found the result we are looking for, unwind
        if self.stop_search.load(Ordering::Relaxed) {
            return SEARCH_STOPPED;
        }

        let original_alpha = alpha;
        let original_beta = beta;

        // prefetch the position's table entry while this node works
        let (hash, is_mirrored) = pos.hash();
        self.table.prefetch(hash);

        // if there are too few empty spaces left on the board for the player
        // to win, then the best score possible is a draw
        if !pos.can_player_win() {
            beta = beta.min(0);
        }
        if alpha >= beta {
            return 0;
        }

        // find the opponent's threats, and any moves directly below a
        // threat. These moves will not be played.
        let opponent_threats = pos.find_opponent_threats();
        let non_losing_moves = pos.find_non_losing_moves(opponent_threats);

        // if the player can only move below the opponent's threats, the
        // player will lose
        if non_losing_moves == 0 {
            return pos.score_loss(0);
        }

        // check if the opponent could win next move
        let opponent_wins = pos.wins_this_move(opponent_threats);
        if opponent_wins != 0 {
            // multiple threats cannot all be blocked
            if opponent_wins & (opponent_wins - 1) != 0 {
                return pos.score_loss(0);
            }

            // two threats on top of each other lose as well
            if opponent_wins & non_losing_moves == 0 {
                return pos.score_loss(0);
            }
        }

        // at this point neither side can win in the next two plies, so
        // tighten the bounds
        alpha = alpha.max(pos.score_loss(2));
        if alpha >= beta {
            return alpha;
        }
        beta = beta.min(pos.score_win(2));
        if alpha >= beta {
            return beta;
        }

        // the opponent has exactly one threat, which must be blocked now
        if opponent_wins != 0 {
            let before_move = pos.play_bit(opponent_wins);
            let score = -self.negamax(pos, -beta, -alpha, move_offset);
            pos.unplay(before_move);

            // if the child aborted the search, propagate the signal upwards
            if score == -SEARCH_STOPPED {
                return SEARCH_STOPPED;
            }

            return score;
        }

        // consult the opening book at its exact depth
        if let Some(book) = &self.opening_book {
            if pos.num_moves() == book.depth() {
                if let Some((_, score)) = book.get(hash, is_mirrored) {
                    return score;
                }
            }
        }

        // check if this position has already been seen
        let mut table_move = None;
        match self.table.get(hash) {
            Lookup::Hit(entry) => {
                self.stats.lookup_success();

                let lookup_value = entry.get_score();
                match entry.get_type() {
                    NodeType::Exact => return lookup_value,
                    NodeType::Lower => alpha = alpha.max(lookup_value),
                    NodeType::Upper => beta = beta.min(lookup_value),
                }

                if alpha >= beta {
                    return lookup_value;
                }

                table_move = Some(entry.get_move(is_mirrored));
            }
            Lookup::Collision => self.stats.lookup_collision(),
            Lookup::Miss => self.stats.lookup_miss(),
        }

        // none of the cheap checks passed, so this is an interior node and
        // the children decide its score
        let mut value = -INF_SCORE;
        let mut best_move_index = 0;
        let mut best_move_col = 0;

        let moves = order_moves(pos, non_losing_moves, table_move, move_offset);
        debug_assert!(!moves.is_empty());

        for (i, col) in moves.enumerate() {
            if alpha >= beta {
                break;
            }

            // table moves do not respect the move offset, so pass it on to
            // the table-move child
            let child_move_offset = if table_move == Some(col) { move_offset } else { 0 };

            let before_move = pos.play(col);
            let child_score = -self.negamax(pos, -beta, -alpha, child_move_offset);
            pos.unplay(before_move);

            if child_score == -SEARCH_STOPPED {
                return SEARCH_STOPPED;
            }

            if child_score > value {
                value = child_score;
                best_move_index = i;
                best_move_col = col;
            }

            alpha = alpha.max(child_score);
        }

        debug_assert!(value != -INF_SCORE);

        // store the result in the transposition table
        let node_type = get_node_type(value, original_alpha, original_beta);
        let subtree_nodes = self.stats.get_num_nodes() - nodes_at_entry + 1;
        let store = self
            .table
            .put(hash, is_mirrored, best_move_col, node_type, value, subtree_nodes);
        self.stats.stored(store);

        // update statistics
        self.stats.new_interior_node(node_type);
        if best_move_index == 0 {
            self.stats.best_move_guessed();
        }
        self.progress.completed_node(pos.num_moves());

        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::score_loss_at;

    // Fills columns 0, 1, 2, 5 and 6 with an alignment-free pattern, leaving
    // a twelve-cell endgame in the two remaining columns.
    const SIDE_COLUMNS_FULL: &str = "132761327613276132761327613276";

    fn make_search() -> Search {
        let table = TranspositionTable::new(131_101, false).unwrap();
        Search::new(table, Arc::new(Progress::new(false)), None)
    }

    #[test]
    fn forced_loss_is_found_without_recursion() {
        // the opponent holds a double threat, so every reply loses
        let mut pos = Position::from_moves("27374").unwrap();
        let mut search = make_search();

        let score = search.search(&mut pos, Position::MIN_SCORE, Position::MAX_SCORE, 0);
        assert_eq!(score, Some(score_loss_at(5)));
        assert_eq!(search.stats().get_num_nodes(), 1);
    }

    #[test]
    fn blocking_a_single_threat_is_forced() {
        // three stacked stones in column 3 threaten a vertical four; the
        // reply has to block on top of them
        let moves = format!("{}45454", SIDE_COLUMNS_FULL);
        let mut pos = Position::from_moves(&moves).unwrap();

        let opponent_wins = pos.wins_this_move(pos.find_opponent_threats());
        assert_eq!(opponent_wins.count_ones(), 1);

        let mut search = make_search();
        let score = search.search(&mut pos, Position::MIN_SCORE, Position::MAX_SCORE, 0);
        assert!(score.is_some());
        assert!(search.stats().get_num_nodes() > 1);
    }

    #[test]
    fn exhausted_boards_score_zero() {
        // two cells left, neither player can align four anywhere
        let draw_line = "132457613245761324576132457613245761324576";
        let mut pos = Position::from_moves(&draw_line[..40]).unwrap();
        assert!(!pos.can_player_win());

        let mut search = make_search();
        let score = search.search(&mut pos, -1, 1, 0);
        assert_eq!(score, Some(0));
    }

    #[test]
    fn stopped_searches_return_none() {
        let mut pos = Position::from_moves(SIDE_COLUMNS_FULL).unwrap();
        let mut search = make_search();
        search.stop();

        let score = search.search(&mut pos, -1, 0, 0);
        assert_eq!(score, None);

        // clearing the flag lets the next search run
        search.start();
        assert!(search.search(&mut pos, -1, 0, 0).is_some());
    }

    #[test]
    fn results_are_replayed_from_the_table() {
        let mut pos = Position::from_moves(SIDE_COLUMNS_FULL).unwrap();
        let mut search = make_search();

        let first = search.search(&mut pos, Position::MIN_SCORE, Position::MAX_SCORE, 0);
        let nodes_first = search.stats().get_num_nodes();

        search.reset_stats();
        let second = search.search(&mut pos, Position::MIN_SCORE, Position::MAX_SCORE, 0);
        let nodes_second = search.stats().get_num_nodes();

        assert_eq!(first, second);
        assert!(nodes_second < nodes_first);
    }

    #[test]
    fn move_offsets_do_not_change_the_score() {
        let mut pos = Position::from_moves(SIDE_COLUMNS_FULL).unwrap();

        let mut plain = make_search();
        let mut offset = make_search();

        let a = plain.search(&mut pos, Position::MIN_SCORE, Position::MAX_SCORE, 0);
        let b = offset.search(&mut pos, Position::MIN_SCORE, Position::MAX_SCORE, 3);
        assert_eq!(a, b);
    }
}
