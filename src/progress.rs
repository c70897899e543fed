//! Publishes the start, breakthroughs and completion of a search
//!
//! During a long search the workers report each fully evaluated node; the
//! progress tracker watches for new minimum depths (positions solved closer
//! to the root) and prints a running update once console output is enabled.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::stats::Stats;
use crate::{HEIGHT, WIDTH};

struct ProgressState {
    search_running: bool,
    search_start_time: Instant,
    num_positions_at_min: usize,
}

/// Tracks and optionally prints search progress. Shared by every worker.
pub struct Progress {
    print_progress_enabled: AtomicBool,

    // the shallowest ply fully solved so far, readable without the lock so
    // the hot path can skip uninteresting nodes
    min_num_moves: AtomicUsize,
    state: Mutex<ProgressState>,
}

impl Progress {
    /// Creates a silent progress tracker
    pub fn new(print_progress_enabled: bool) -> Self {
        Self {
            print_progress_enabled: AtomicBool::new(print_progress_enabled),
            min_num_moves: AtomicUsize::new(WIDTH * HEIGHT),
            state: Mutex::new(ProgressState {
                search_running: false,
                search_start_time: Instant::now(),
                num_positions_at_min: 0,
            }),
        }
    }

    /// Turns console output on for all future searches
    pub fn print_progress(&self) {
        self.print_progress_enabled.store(true, Ordering::Relaxed);
    }

    fn is_printing(&self) -> bool {
        self.print_progress_enabled.load(Ordering::Relaxed)
    }

    /// Marks the start of a search over the given window
    pub fn started_search(&self, alpha: i32, beta: i32, search_start_time: Instant) {
        let mut state = self.state.lock().unwrap();

        debug_assert!(!state.search_running);
        state.search_running = true;
        state.search_start_time = search_start_time;
        state.num_positions_at_min = 0;
        self.min_num_moves.store(WIDTH * HEIGHT, Ordering::Relaxed);

        if self.is_printing() {
            println!("Searching in range [{}, {}] . . .", alpha, beta);
        }
    }

    /// Reports a fully evaluated position at the given ply
    pub fn completed_node(&self, num_moves: usize) {
        if num_moves > self.min_num_moves.load(Ordering::Relaxed) {
            return;
        }

        let mut state = self.state.lock().unwrap();
        if !state.search_running {
            return;
        }

        // check again now that we hold the lock
        let min_num_moves = self.min_num_moves.load(Ordering::Relaxed);
        if num_moves > min_num_moves {
            return;
        }

        if num_moves < min_num_moves {
            self.min_num_moves.store(num_moves, Ordering::Relaxed);
            state.num_positions_at_min = 1;
        } else {
            state.num_positions_at_min += 1;
        }

        // only print once enough time has passed to solve all trivial positions
        let run_time_ms = state.search_start_time.elapsed().as_millis();
        if self.is_printing() && run_time_ms > 1000 {
            println!(
                "  Solved {} positions with {} moves after {:.2} s.",
                state.num_positions_at_min,
                num_moves,
                run_time_ms as f64 / 1000.0
            );
        }
    }

    /// Marks the end of a search and prints its merged stats
    ///
    /// A score of `None` records a cancelled search.
    pub fn completed_search(&self, score: Option<i32>, stats: &Stats) {
        let mut state = self.state.lock().unwrap();

        debug_assert!(state.search_running);
        state.search_running = false;

        if self.is_printing() {
            println!(
                "Search took {:.2} s and explored {} nodes ({} nodes per ms).",
                stats.get_search_time_ms() as f64 / 1000.0,
                stats.get_num_nodes(),
                stats.get_nodes_per_ms()
            );
            match score {
                Some(score) => println!("Score is {}.", score),
                None => println!("Search cancelled."),
            }
        }
    }
}
