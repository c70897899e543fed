//! The fixed-width board integer and the static bit masks built from it
//!
//! # Notes
//! Storing the state of the board in the bits of an integer allows parallel
//! computation of game conditions with bitwise operations. A 7x6 board fits
//! into the bits of a `u64` like so:
//!
//! ```comment
//! Column:  0  1  2  3  4  5  6
//!
//!          6  13 20 27 34 41 48
//!          ____________________
//!       5 |05 12 19 26 33 40 47|
//!       4 |04 11 18 25 32 39 46|
//!       3 |03 10 17 24 31 38 45|
//!       2 |02 09 16 23 30 37 44|
//!       1 |01 08 15 22 29 36 43|
//! Rows: 0 |00 07 14 21 28 35 42|
//! ```
//! Where bit index 00 is the least significant bit. The extra row of bits on
//! top of the board identifies full columns and prevents shifted patterns
//! overflowing into the next column. Wider boards enable the `wide-board`
//! feature to switch the integer to a `u128`.

use crate::{HEIGHT, WIDTH};

/// The board integer: one bit per cell plus one sentinel bit per column
#[cfg(not(feature = "wide-board"))]
pub type Bits = u64;

/// The board integer: one bit per cell plus one sentinel bit per column
#[cfg(feature = "wide-board")]
pub type Bits = u128;

/// The number of bits between adjacent columns
pub const COLUMN_STRIDE: usize = HEIGHT + 1;

/// Shift distance of a vertical step
pub const DIR_VERTICAL: usize = 1;
/// Shift distance of a negative-diagonal step
pub const DIR_DIAGONAL_NEG: usize = HEIGHT;
/// Shift distance of a horizontal step
pub const DIR_HORIZONTAL: usize = HEIGHT + 1;
/// Shift distance of a positive-diagonal step
pub const DIR_DIAGONAL_POS: usize = HEIGHT + 2;

/// The four alignment directions
pub const DIRECTIONS: [usize; 4] = [
    DIR_VERTICAL,
    DIR_DIAGONAL_NEG,
    DIR_HORIZONTAL,
    DIR_DIAGONAL_POS,
];

/// Returns a mask with one bit set in the bottom cell of every column
pub const fn bottom_row() -> Bits {
    let mut mask = 0;
    let mut column = 0;
    while column < WIDTH {
        mask |= 1 << (column * COLUMN_STRIDE);
        column += 1;
    }
    mask
}

/// Returns a mask with one bit set in the sentinel cell of every column
pub const fn column_headers() -> Bits {
    bottom_row() << HEIGHT
}

/// Returns a mask of every playable cell on the board
pub const fn valid_cells() -> Bits {
    column_headers() - bottom_row()
}

/// Returns a mask of the playable cells of the given column
pub const fn column_mask(column: usize) -> Bits {
    (((1 as Bits) << HEIGHT) - 1) << (column * COLUMN_STRIDE)
}

/// Returns a mask of the playable cells and the sentinel of the given column
pub const fn full_column_mask(column: usize) -> Bits {
    (((1 as Bits) << COLUMN_STRIDE) - 1) << (column * COLUMN_STRIDE)
}

/// Returns a mask of the bottom cell of the given column
pub const fn bottom_mask(column: usize) -> Bits {
    (1 as Bits) << (column * COLUMN_STRIDE)
}

/// Returns the column containing a single-bit move mask, or [`WIDTH`] if the
/// mask is empty
///
/// [`WIDTH`]: ../constant.WIDTH.html
pub fn column_from_move(move_bitmap: Bits) -> usize {
    for column in 0..WIDTH {
        if move_bitmap & full_column_mask(column) != 0 {
            return column;
        }
    }
    // WIDTH is always an invalid column
    WIDTH
}

/// Reflects a board mask about the middle column, sentinel bits included
pub fn mirror(b: Bits) -> Bits {
    let mut mirrored = 0;

    for column in 0..=(WIDTH - 1) / 2 {
        let shift = (WIDTH - 2 * column - 1) * COLUMN_STRIDE;

        let left_mask = full_column_mask(column);
        let right_mask = full_column_mask(WIDTH - column - 1);

        mirrored |= (b & left_mask) << shift;
        mirrored |= (b & right_mask) >> shift;
    }

    mirrored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_are_disjoint_per_column() {
        let mut seen: Bits = 0;
        for column in 0..WIDTH {
            assert_eq!(seen & full_column_mask(column), 0);
            seen |= full_column_mask(column);
        }
        assert_eq!(seen.count_ones() as usize, WIDTH * COLUMN_STRIDE);
    }

    #[test]
    fn bottom_row_has_one_bit_per_column() {
        assert_eq!(bottom_row().count_ones() as usize, WIDTH);
        for column in 0..WIDTH {
            assert_eq!(bottom_row() & column_mask(column), bottom_mask(column));
        }
    }

    #[test]
    fn valid_cells_excludes_sentinels() {
        assert_eq!(valid_cells() & column_headers(), 0);
        assert_eq!(valid_cells().count_ones() as usize, WIDTH * HEIGHT);
    }

    #[test]
    fn mirror_is_an_involution() {
        let b = bottom_mask(0) | column_mask(2) | bottom_mask(WIDTH - 1) << 3;
        assert_eq!(mirror(mirror(b)), b);
    }

    #[test]
    fn mirror_swaps_edge_columns() {
        assert_eq!(mirror(column_mask(0)), column_mask(WIDTH - 1));
        assert_eq!(mirror(bottom_mask(1)), bottom_mask(WIDTH - 2));
    }

    #[test]
    fn column_from_move_finds_the_column() {
        assert_eq!(column_from_move(bottom_mask(4)), 4);
        assert_eq!(column_from_move(0), WIDTH);
    }
}
