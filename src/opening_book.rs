//! Generation and lookup of an opening book
//!
//! The book holds the exact score and best move of every unique position at
//! one fixed depth. Generation enumerates all move sequences of that depth
//! by base-width counting, deduplicates transposed and mirrored positions
//! through the canonical hash, and solves each survivor exactly. Rows are
//! appended to a CSV file through the asynchronous [`Writer`].
//!
//! # File format
//! A header line starting with `hash,move,score`, then one row per
//! position. On boards hashed into 128 bits the hash is emitted as two
//! 64-bit words, high word first.
//!
//! [`Writer`]: ../writer/struct.Writer.html

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, ensure, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::bits::{Bits, COLUMN_STRIDE};
use crate::position::Position;
use crate::settings::Settings;
use crate::solver::Solver;
use crate::transposition_table::TranspositionTable;
use crate::writer::Writer;
use crate::WIDTH;

const BOOK_HEADER: &str = "hash,move,score";

/// An in-memory opening book keyed by canonical position hash
pub struct OpeningBook {
    depth: usize,
    entries: HashMap<Bits, (usize, i32)>,
}

impl OpeningBook {
    /// Parses a book file into memory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path).with_context(|| format!("could not open book {}", path.display()))?,
        );

        let mut lines = file.lines();
        let header = lines.next().ok_or_else(|| anyhow!("empty book file"))??;
        ensure!(
            header.starts_with(BOOK_HEADER),
            "book file has an invalid header: {}",
            header
        );

        let mut depth = None;
        let mut entries = HashMap::new();
        for line in lines {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            let (hash, column, score) = parse_row(&line)?;
            depth.get_or_insert_with(|| stones_in_hash(hash));
            entries.insert(hash, (column, score));
        }

        Ok(Self {
            depth: depth.ok_or_else(|| anyhow!("book file has no positions"))?,
            entries,
        })
    }

    /// The ply at which every book position sits
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The number of positions in the book
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the book holds no positions
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a canonical hash, mirroring the best move back when the
    /// lookup was made with a mirrored hash
    pub fn get(&self, hash: Bits, is_mirrored: bool) -> Option<(usize, i32)> {
        self.entries.get(&hash).map(|&(column, score)| {
            let column = if is_mirrored {
                WIDTH - column - 1
            } else {
                column
            };
            (column, score)
        })
    }

    /// Solves every unique position at `depth` plies and appends the rows
    /// to the book file
    ///
    /// Positions are solved in parallel, one rayon task per position, so
    /// each solver runs single threaded with affinity disabled; all solvers
    /// share one transposition table.
    pub fn generate<P: AsRef<Path>>(settings: &Settings, depth: usize, path: P) -> Result<()> {
        let positions = enumerate_positions(depth);

        // parallelism comes from solving many positions at once
        let solver_settings = (*settings).num_threads(1).enable_affinity(false);
        let table = TranspositionTable::new(
            solver_settings.num_table_entries,
            solver_settings.enable_huge_pages,
        )?;

        let is_new_book = !path.as_ref().exists();
        let writer = Writer::new(path);
        if is_new_book {
            writer.add_line(BOOK_HEADER);
        }

        let bar = ProgressBar::new(positions.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar().template("{pos}/{len} positions solved [{elapsed}]"),
        );

        positions.par_iter().try_for_each_init(
            || Solver::new_with_table(solver_settings, table.clone()),
            |solver, pos| -> Result<()> {
                let score = solver
                    .solve_strong(pos)
                    .ok_or_else(|| anyhow!("book generation was cancelled"))?;
                let best_move = solver
                    .get_best_move(pos, score)
                    .ok_or_else(|| anyhow!("book generation was cancelled"))?;

                // rows hold the canonical orientation, like the table does
                let (hash, is_mirrored) = pos.hash();
                let column = if is_mirrored {
                    WIDTH - best_move - 1
                } else {
                    best_move
                };

                writer.add_line(&format_row(hash, column, score));
                bar.inc(1);
                Ok(())
            },
        )?;

        bar.finish();
        Ok(())
    }
}

// Enumerates every unique, undecided position reachable in exactly `depth`
// moves by counting in base WIDTH.
fn enumerate_positions(depth: usize) -> Vec<Position> {
    let mut seen = HashSet::new();
    let mut positions = Vec::new();

    let mut moves = vec![0usize; depth];
    for mut counter in 0..WIDTH.pow(depth as u32) {
        for digit in moves.iter_mut() {
            *digit = counter % WIDTH;
            counter /= WIDTH;
        }

        // skip illegal sequences and positions won along the way
        if let Ok(pos) = Position::from_slice(&moves) {
            let (hash, _) = pos.hash();
            if seen.insert(hash) {
                positions.push(pos);
            }
        }
    }

    positions
}

// Counts the stones encoded in a hash: the header bit is always the highest
// bit of its column segment, at an index equal to the column's stone count.
fn stones_in_hash(hash: Bits) -> usize {
    let segment_mask = ((1 as Bits) << COLUMN_STRIDE) - 1;

    let mut total = 0;
    for column in 0..WIDTH {
        let segment = (hash >> (column * COLUMN_STRIDE)) & segment_mask;
        debug_assert!(segment != 0);

        let bits = std::mem::size_of::<Bits>() * 8;
        total += bits - 1 - segment.leading_zeros() as usize;
    }
    total
}

#[cfg(not(feature = "wide-board"))]
fn format_row(hash: Bits, column: usize, score: i32) -> String {
    format!("{},{},{}", hash, column, score)
}

#[cfg(feature = "wide-board")]
fn format_row(hash: Bits, column: usize, score: i32) -> String {
    format!("{},{},{},{}", (hash >> 64) as u64, hash as u64, column, score)
}

#[cfg(not(feature = "wide-board"))]
fn parse_row(line: &str) -> Result<(Bits, usize, i32)> {
    let mut fields = line.split(',');
    let hash = next_field(&mut fields, line)?.parse::<u64>()?;
    let column = next_field(&mut fields, line)?.parse::<usize>()?;
    let score = next_field(&mut fields, line)?.parse::<i32>()?;

    ensure!(column < WIDTH, "book move out of range: {}", line);
    Ok((hash as Bits, column, score))
}

#[cfg(feature = "wide-board")]
fn parse_row(line: &str) -> Result<(Bits, usize, i32)> {
    let mut fields = line.split(',');
    let high = next_field(&mut fields, line)?.parse::<u64>()?;
    let low = next_field(&mut fields, line)?.parse::<u64>()?;
    let column = next_field(&mut fields, line)?.parse::<usize>()?;
    let score = next_field(&mut fields, line)?.parse::<i32>()?;

    ensure!(column < WIDTH, "book move out of range: {}", line);
    Ok(((high as Bits) << 64 | low as Bits, column, score))
}

fn next_field<'a>(fields: &mut impl Iterator<Item = &'a str>, line: &str) -> Result<&'a str> {
    fields
        .next()
        .ok_or_else(|| anyhow!("malformed book row: {}", line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("dropfour_book_{}_{}", std::process::id(), name));
        path
    }

    #[test]
    fn loads_rows_and_mirrors_moves_back() {
        let pos = Position::from_moves("12").unwrap();
        let (hash, is_mirrored) = pos.hash();

        // write the canonical row by hand
        let canonical_column = if is_mirrored { WIDTH - 1 - 4 } else { 4 };
        let path = temp_path("load");
        fs::write(
            &path,
            format!("{}\n{}\n", BOOK_HEADER, format_row(hash, canonical_column, 2)),
        )
        .unwrap();

        let book = OpeningBook::load(&path).unwrap();
        assert_eq!(book.depth(), 2);
        assert_eq!(book.len(), 1);
        assert_eq!(book.get(hash, is_mirrored), Some((4, 2)));

        // the mirrored twin finds the same entry with the move flipped
        let mirror = pos.mirrored();
        let (mirror_hash, mirror_is_mirrored) = mirror.hash();
        assert_eq!(mirror_hash, hash);
        assert_eq!(book.get(mirror_hash, mirror_is_mirrored), Some((WIDTH - 1 - 4, 2)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rejects_files_without_the_header() {
        let path = temp_path("badheader");
        fs::write(&path, "1,2,3\n").unwrap();

        assert!(OpeningBook::load(&path).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn enumeration_deduplicates_transpositions() {
        // 49 sequences of two moves collapse into at most 28 unique
        // positions once mirrors are merged
        let positions = enumerate_positions(2);
        assert!(!positions.is_empty());
        assert!(positions.len() <= 28);

        for pos in &positions {
            assert_eq!(pos.num_moves(), 2);
        }
    }

    #[test]
    fn hash_stone_counts_recover_the_depth() {
        for moves in &["", "4", "44", "1234567", "132761327613276"] {
            let pos = Position::from_moves(moves).unwrap();
            let (hash, _) = pos.hash();
            assert_eq!(stones_in_hash(hash), moves.len());
        }
    }

    // Solving opening positions takes minutes, so the full generation path
    // only runs on demand.
    #[test]
    #[ignore]
    fn generates_and_reloads_a_shallow_book() {
        let path = temp_path("generate");
        let _ = fs::remove_file(&path);

        let settings = Settings::default().num_table_entries(8_388_617);
        OpeningBook::generate(&settings, 2, &path).unwrap();

        let book = OpeningBook::load(&path).unwrap();
        assert_eq!(book.depth(), 2);
        assert!(!book.is_empty());

        let pos = Position::from_moves("44").unwrap();
        let (hash, is_mirrored) = pos.hash();
        let (_, score) = book.get(hash, is_mirrored).unwrap();

        let mut solver = Solver::new(settings.num_threads(1)).unwrap();
        assert_eq!(solver.solve_strong(&pos), Some(score));

        let _ = fs::remove_file(&path);
    }
}
