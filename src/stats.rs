//! Counters tracking the performance of a search
//!
//! Each worker thread owns its own `Stats`, so none of the increments need
//! synchronisation; the pool merges the per-worker counters after a search
//! completes.

use std::fmt::Write;
use std::time::Instant;

use crate::transposition_table::{NodeType, Store};

/// Performance counters for one search thread, or the merged counters of a
/// whole search. Not thread safe.
#[derive(Clone, Default, Debug)]
pub struct Stats {
    // search stats
    search_time_ms: u64,
    num_nodes: u64,
    num_best_moves_guessed: u64,

    // node type stats
    num_exact_nodes: u64,
    num_lower_nodes: u64,
    num_upper_nodes: u64,

    // lookup stats
    num_lookup_success: u64,
    num_lookup_miss: u64,
    num_lookup_collision: u64,

    // store stats
    num_store_entries: u64,
    num_store_rewrites: u64,
    num_store_overwrites: u64,
    num_store_skips: u64,
}

impl Stats {
    /// Creates a zeroed set of counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds another set of counters into this one
    pub fn merge(&mut self, other: &Stats) {
        self.search_time_ms += other.search_time_ms;
        self.num_nodes += other.num_nodes;
        self.num_best_moves_guessed += other.num_best_moves_guessed;

        self.num_exact_nodes += other.num_exact_nodes;
        self.num_lower_nodes += other.num_lower_nodes;
        self.num_upper_nodes += other.num_upper_nodes;

        self.num_lookup_success += other.num_lookup_success;
        self.num_lookup_miss += other.num_lookup_miss;
        self.num_lookup_collision += other.num_lookup_collision;

        self.num_store_entries += other.num_store_entries;
        self.num_store_rewrites += other.num_store_rewrites;
        self.num_store_overwrites += other.num_store_overwrites;
        self.num_store_skips += other.num_store_skips;
    }

    /// Zeroes every counter
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // Search stats increments.

    /// Records the wall time of a completed search
    pub fn completed_search(&mut self, search_start_time: Instant) {
        self.search_time_ms += search_start_time.elapsed().as_millis() as u64;
    }

    /// Counts a visited node
    pub fn new_node(&mut self) {
        self.num_nodes += 1;
    }

    /// Counts a fully evaluated interior node by its node type
    pub fn new_interior_node(&mut self, node_type: NodeType) {
        match node_type {
            NodeType::Exact => self.num_exact_nodes += 1,
            NodeType::Lower => self.num_lower_nodes += 1,
            NodeType::Upper => self.num_upper_nodes += 1,
        }
    }

    /// Counts an interior node whose first ordered move was the best move
    pub fn best_move_guessed(&mut self) {
        self.num_best_moves_guessed += 1;
    }

    // Lookup stats increments.

    /// Counts a successful table probe
    pub fn lookup_success(&mut self) {
        self.num_lookup_success += 1;
    }

    /// Counts a table probe which found an empty slot
    pub fn lookup_miss(&mut self) {
        self.num_lookup_miss += 1;
    }

    /// Counts a table probe which found a different position
    pub fn lookup_collision(&mut self) {
        self.num_lookup_collision += 1;
    }

    /// Counts a table store by its effect
    pub fn stored(&mut self, store: Store) {
        match store {
            Store::New => self.num_store_entries += 1,
            Store::Rewrite => self.num_store_rewrites += 1,
            Store::Overwrite => self.num_store_overwrites += 1,
            Store::Skipped => self.num_store_skips += 1,
        }
    }

    // Search stats getters.

    /// Total wall time of the merged searches in milliseconds
    pub fn get_search_time_ms(&self) -> u64 {
        self.search_time_ms
    }

    /// Search speed over the merged searches
    pub fn get_nodes_per_ms(&self) -> u64 {
        self.num_nodes / self.search_time_ms.max(1)
    }

    /// The number of nodes visited
    pub fn get_num_nodes(&self) -> u64 {
        self.num_nodes
    }

    /// The number of fully evaluated interior nodes
    pub fn get_num_interior_nodes(&self) -> u64 {
        self.num_exact_nodes + self.num_lower_nodes + self.num_upper_nodes
    }

    /// The number of interior nodes with an exact score
    pub fn get_num_exact_nodes(&self) -> u64 {
        self.num_exact_nodes
    }

    /// The number of interior nodes with a lower-bound score
    pub fn get_num_lower_nodes(&self) -> u64 {
        self.num_lower_nodes
    }

    /// The number of interior nodes with an upper-bound score
    pub fn get_num_upper_nodes(&self) -> u64 {
        self.num_upper_nodes
    }

    /// The share of interior nodes whose first ordered move proved best
    pub fn get_best_move_guess_rate(&self) -> f64 {
        self.num_best_moves_guessed as f64 / self.get_num_interior_nodes().max(1) as f64
    }

    // Lookup stats getters.

    /// The share of table probes returning a usable entry
    pub fn get_hit_rate(&self) -> f64 {
        let probes = self.num_lookup_success + self.num_lookup_miss + self.num_lookup_collision;
        self.num_lookup_success as f64 / probes.max(1) as f64
    }

    /// The share of table probes landing on a different position
    pub fn get_collision_rate(&self) -> f64 {
        let probes = self.num_lookup_success + self.num_lookup_miss + self.num_lookup_collision;
        self.num_lookup_collision as f64 / probes.max(1) as f64
    }

    // Store stats getters.

    fn get_num_stores(&self) -> u64 {
        self.num_store_entries + self.num_store_rewrites + self.num_store_overwrites
            + self.num_store_skips
    }

    /// The share of stores filling an empty slot
    pub fn get_new_write_rate(&self) -> f64 {
        self.num_store_entries as f64 / self.get_num_stores().max(1) as f64
    }

    /// The share of stores replacing the same position
    pub fn get_rewrite_rate(&self) -> f64 {
        self.num_store_rewrites as f64 / self.get_num_stores().max(1) as f64
    }

    /// The share of stores evicting a different position
    pub fn get_overwrite_rate(&self) -> f64 {
        self.num_store_overwrites as f64 / self.get_num_stores().max(1) as f64
    }

    /// Formats every counter and rate as a multiline report
    pub fn display_all_stats(&self) -> String {
        let mut out = String::new();

        // writing to a String cannot fail
        let _ = writeln!(out, "Time to solve        = {:.2} s", self.search_time_ms as f64 / 1000.0);
        let _ = writeln!(out, "Nodes per ms         = {}", self.get_nodes_per_ms());
        let _ = writeln!(out, "Nodes:");
        let _ = writeln!(out, "    Exact            = {}", self.num_exact_nodes);
        let _ = writeln!(out, "    Lower            = {}", self.num_lower_nodes);
        let _ = writeln!(out, "    Upper            = {}", self.num_upper_nodes);
        let _ = writeln!(out, "    Total            = {}", self.num_nodes);
        let _ = writeln!(out, "Table:");
        let _ = writeln!(out, "    Hit rate         = {:6.2}%", self.get_hit_rate() * 100.0);
        let _ = writeln!(out, "    Collision rate   = {:6.2}%", self.get_collision_rate() * 100.0);
        let _ = writeln!(out, "    New write rate   = {:6.2}%", self.get_new_write_rate() * 100.0);
        let _ = writeln!(out, "    Rewrite rate     = {:6.2}%", self.get_rewrite_rate() * 100.0);
        let _ = writeln!(out, "    Overwrite rate   = {:6.2}%", self.get_overwrite_rate() * 100.0);
        let _ = write!(out, "Best moves guessed   = {:6.2}%", self.get_best_move_guess_rate() * 100.0);

        out
    }
}
