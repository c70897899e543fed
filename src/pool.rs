//! A pool of worker threads racing each other on the same search window
//!
//! Every worker shares the transposition table but owns its stats and its
//! search. The workers receive slightly different move orderings so they
//! explore divergent subtrees; the first worker to complete publishes the
//! score and the rest are told to stop. Work the losers already saved in
//! the shared table is kept and benefits future searches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::opening_book::OpeningBook;
use crate::position::Position;
use crate::progress::Progress;
use crate::search::Search;
use crate::settings::Settings;
use crate::stats::Stats;
use crate::transposition_table::TranspositionTable;

// Published to the result slot by cancel requests. Never a real score, and
// never returned to a caller.
const SEARCH_CANCELLED: i32 = 1001;

// Per-worker move ordering offsets. Narrow windows (late endgame probes)
// benefit from more desync than wide ones; worker 0 always searches in the
// plain order.
fn get_score_jitter(window_step: f64, i: usize) -> usize {
    if window_step < 0.1 {
        return (i % 4) * 10000 + (i % 5) * 1000 + (i % 6) * 100 + (i % 7) * 10 + (i % 8);
    }

    if window_step < 1.0 {
        return (i % 2) * 100 + (i % 3) * 10 + (i % 4);
    }

    (i % 3) * 10 + (i % 5)
}

struct ResultState {
    score: i32,
    found: bool,
}

/// A thread safe, first-writer-wins slot for the score of a search
pub struct SearchResult {
    state: Mutex<ResultState>,
    cond: Condvar,
}

impl SearchResult {
    fn new() -> Self {
        Self {
            state: Mutex::new(ResultState {
                score: SEARCH_CANCELLED,
                found: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();

        state.score = SEARCH_CANCELLED;
        state.found = false;
    }

    fn notify_result(&self, result: i32) -> bool {
        let mut state = self.state.lock().unwrap();

        // do nothing if another thread already found the solution
        if state.found {
            return false;
        }

        state.score = result;
        state.found = true;

        drop(state);
        self.cond.notify_all();

        true
    }

    fn wait_for_result(&self) -> i32 {
        let mut state = self.state.lock().unwrap();

        while !state.found {
            state = self.cond.wait(state).unwrap();
        }

        state.score
    }
}

/// Asynchronously cancels an in-flight [`Pool::search`] from another thread
///
/// [`Pool::search`]: struct.Pool.html#method.search
#[derive(Clone)]
pub struct CancelHandle {
    result: Arc<SearchResult>,
}

impl CancelHandle {
    /// Requests that the current (or next) search stops without a score
    pub fn cancel(&self) {
        self.result.notify_result(SEARCH_CANCELLED);
    }
}

struct Job {
    pos: Position,
    alpha: i32,
    beta: i32,
    move_offset: usize,
}

struct WorkerState {
    job: Option<Job>,
    is_searching: bool,
    is_exiting: bool,
    // stats snapshot of the last completed search on this worker
    stats: Stats,
}

struct WorkerShared {
    state: Mutex<WorkerState>,
    cond: Condvar,
}

struct Worker {
    shared: Arc<WorkerShared>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(
        table: TranspositionTable,
        result: Arc<SearchResult>,
        progress: Arc<Progress>,
        opening_book: Option<Arc<OpeningBook>>,
    ) -> Self {
        let shared = Arc::new(WorkerShared {
            state: Mutex::new(WorkerState {
                job: None,
                is_searching: false,
                is_exiting: false,
                stats: Stats::new(),
            }),
            cond: Condvar::new(),
        });

        // the search shares the table storage but owns its stats
        let search = Search::new(table, progress, opening_book);
        let stop_flag = search.stop_flag();

        let thread_shared = Arc::clone(&shared);
        let thread = thread::spawn(move || Worker::work(thread_shared, result, search));

        Self {
            shared,
            stop_flag,
            thread: Some(thread),
        }
    }

    /// Hands the worker a new search and wakes its thread
    fn start(&self, pos: &Position, alpha: i32, beta: i32, move_offset: usize) {
        debug_assert!(alpha < beta);

        let mut state = self.shared.state.lock().unwrap();

        // never start a search while another one is running
        debug_assert!(!state.is_searching);
        debug_assert!(!state.is_exiting);

        state.job = Some(Job {
            pos: *pos,
            alpha,
            beta,
            move_offset,
        });
        state.is_searching = true;
        self.stop_flag.store(false, Ordering::Relaxed);

        drop(state);
        self.shared.cond.notify_all();
    }

    /// Blocks until the worker has gone back to sleep
    fn wait(&self) {
        let mut state = self.shared.state.lock().unwrap();

        while state.is_searching {
            state = self.shared.cond.wait(state).unwrap();
        }
    }

    /// Asks the worker's in-flight search to unwind
    fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// The stats of the last completed search
    fn stats(&self) -> Stats {
        self.shared.state.lock().unwrap().stats.clone()
    }

    fn work(shared: Arc<WorkerShared>, result: Arc<SearchResult>, mut search: Search) {
        let mut state = shared.state.lock().unwrap();

        loop {
            // sleep until we have something to do
            while !state.is_searching && !state.is_exiting {
                state = shared.cond.wait(state).unwrap();
            }

            if state.is_exiting {
                return;
            }

            let Job {
                mut pos,
                alpha,
                beta,
                move_offset,
            } = state.job.take().expect("a searching worker always has a job");
            drop(state);

            search.reset_stats();
            let score = search.search(&mut pos, alpha, beta, move_offset);

            state = shared.state.lock().unwrap();
            state.stats = search.stats().clone();
            state.is_searching = false;

            // tell the main thread we solved the position; stopped searches
            // have nothing to report
            if let Some(score) = score {
                result.notify_result(score);
            }

            shared.cond.notify_all();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            debug_assert!(!state.is_searching);
            state.is_exiting = true;
        }
        self.shared.cond.notify_all();

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Drives a set of workers through searches of shared windows
pub struct Pool {
    workers: Vec<Worker>,
    result: Arc<SearchResult>,
    progress: Arc<Progress>,
    move_score_jitter: f32,

    // the combined stats of every search since the last reset; useful when
    // multiple searches probe a single position
    merged_stats: Stats,
}

impl Pool {
    /// Spawns the workers; they sleep until the first search
    pub fn new(
        settings: &Settings,
        table: &TranspositionTable,
        progress: Arc<Progress>,
        opening_book: Option<Arc<OpeningBook>>,
    ) -> Self {
        if settings.enable_affinity {
            log::warn!("thread affinity requested but not implemented, workers stay unpinned");
        }

        let result = Arc::new(SearchResult::new());
        let workers = (0..settings.num_threads.max(1))
            .map(|_| {
                Worker::new(
                    table.clone(),
                    Arc::clone(&result),
                    Arc::clone(&progress),
                    opening_book.clone(),
                )
            })
            .collect();

        Self {
            workers,
            result,
            progress,
            move_score_jitter: settings.move_score_jitter,
            merged_stats: Stats::new(),
        }
    }

    /// Searches `pos` inside `(alpha, beta)` on every worker at once
    ///
    /// Returns `None` when the search was cancelled. The position must not
    /// be terminal and must not have an immediate win for the current
    /// player.
    pub fn search(&mut self, pos: &Position, alpha: i32, beta: i32) -> Option<i32> {
        debug_assert!(alpha < beta);
        debug_assert!(pos.score_loss(0) <= alpha);
        debug_assert!(beta <= pos.score_win(0));
        debug_assert!(!pos.is_game_over());
        debug_assert_eq!(pos.wins_this_move(pos.find_player_threats()), 0);

        self.result.reset();

        // start the clock
        let search_start_time = Instant::now();
        self.progress.started_search(alpha, beta, search_start_time);

        // pass the position to the workers and start searching
        let window_step = (beta - alpha) as f64 / self.workers.len() as f64;
        for (i, worker) in self.workers.iter().enumerate() {
            let move_offset = if self.move_score_jitter > 0.0 {
                get_score_jitter(window_step, i)
            } else {
                0
            };

            worker.start(pos, alpha, beta, move_offset);
        }

        // block until any of the workers find the solution
        let score = self.result.wait_for_result();

        // no need for the other workers to do anything else
        self.stop_all();
        self.wait_all();

        // merge the per-worker stats into the stats of this search
        let mut search_stats = Stats::new();
        search_stats.completed_search(search_start_time);
        for worker in &self.workers {
            search_stats.merge(&worker.stats());
        }
        self.merged_stats.merge(&search_stats);

        let result = if score == SEARCH_CANCELLED {
            None
        } else {
            Some(score)
        };
        self.progress.completed_search(result, &search_stats);

        result
    }

    /// Cancels the in-flight search, if any
    pub fn cancel(&self) {
        self.result.notify_result(SEARCH_CANCELLED);
    }

    /// A clonable handle for cancelling searches from other threads
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            result: Arc::clone(&self.result),
        }
    }

    /// The combined stats of every search since the last reset
    pub fn get_merged_stats(&self) -> &Stats {
        &self.merged_stats
    }

    /// Zeroes the combined stats
    pub fn reset_stats(&mut self) {
        self.merged_stats.reset();
    }

    /// The number of workers in the pool
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    fn stop_all(&self) {
        for worker in &self.workers {
            worker.stop();
        }
    }

    fn wait_all(&self) {
        for worker in &self.workers {
            worker.wait();
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // ensure each worker is idle so the threads can be joined
        self.stop_all();
        self.wait_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SIDE_COLUMNS_FULL: &str = "132761327613276132761327613276";

    fn make_pool(num_threads: usize) -> Pool {
        let settings = Settings::default()
            .num_threads(num_threads)
            .num_table_entries(131_101);
        let table = TranspositionTable::new(settings.num_table_entries, false).unwrap();
        Pool::new(&settings, &table, Arc::new(Progress::new(false)), None)
    }

    #[test]
    fn every_thread_count_agrees_on_the_score() {
        let pos = Position::from_moves(SIDE_COLUMNS_FULL).unwrap();

        let scores: Vec<Option<i32>> = [1, 2, 4, 8]
            .iter()
            .map(|&n| {
                let mut pool = make_pool(n);
                let score = pool.search(&pos, pos.score_loss(0), pos.score_win(0));
                assert!(pool.get_merged_stats().get_num_nodes() > 0);
                score
            })
            .collect();

        assert!(scores[0].is_some());
        assert!(scores.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn shared_table_speeds_up_the_second_search() {
        let pos = Position::from_moves(SIDE_COLUMNS_FULL).unwrap();
        let mut pool = make_pool(2);

        let first = pool.search(&pos, pos.score_loss(0), pos.score_win(0));
        let first_hit_rate = pool.get_merged_stats().get_hit_rate();

        pool.reset_stats();
        let second = pool.search(&pos, pos.score_loss(0), pos.score_win(0));
        let second_hit_rate = pool.get_merged_stats().get_hit_rate();

        assert_eq!(first, second);
        assert!(second_hit_rate > first_hit_rate);
    }

    #[test]
    fn cancellation_unwinds_the_search() {
        // an opening probe runs long enough that the cancel always lands
        let pos = Position::new();
        let mut pool = make_pool(2);

        let handle = pool.cancel_handle();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            handle.cancel();
        });

        let score = pool.search(&pos, -1, 0);
        assert_eq!(score, None);

        canceller.join().unwrap();

        // the pool stays usable after a cancelled search
        let endgame = Position::from_moves(SIDE_COLUMNS_FULL).unwrap();
        assert!(pool.search(&endgame, -1, 1).is_some());
    }

    #[test]
    fn the_result_slot_is_first_writer_wins() {
        let result = SearchResult::new();
        result.reset();

        assert!(result.notify_result(3));
        assert!(!result.notify_result(7));
        assert_eq!(result.wait_for_result(), 3);
    }
}
