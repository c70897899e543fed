//! A compact, computationally efficient bit array representation of a board position
//!
//! # Position Scoring
//! A position is scored by how far a forced win is from the start of the
//! game. If the game ends with the final stone of the board the score is 1
//! (or -1 when the second player places it); earlier wins have scores
//! further from 0, up to the win with a player's 4th stone. A drawn position
//! has a score of 0.

use std::fmt;

use anyhow::{anyhow, Result};

use crate::bits::{self, Bits, DIRECTIONS};
use crate::{HEIGHT, WIDTH};

/// The score of a game won by the current player with the stone played at
/// the given ply
pub const fn score_win_at(ply: usize) -> i32 {
    // signed arithmetic: lookahead bounds ask about plies past a full board
    ((WIDTH * HEIGHT) as i32 - ply as i32 + 1) / 2
}

/// The score of a game lost by the current player when the opponent wins at
/// the given ply
pub const fn score_loss_at(ply: usize) -> i32 {
    -score_win_at(ply + 1)
}

fn find_threats_in_direction(b: Bits, dir: usize) -> Bits {
    let doubles = b & (b << dir);
    let triples = doubles & (doubles << dir);

    ((b >> dir) & (doubles << dir))
        | ((b << dir) & (doubles >> (2 * dir)))
        | (triples << dir)
        | (triples >> (3 * dir))
}

/// Returns a 1 in any open cell which would complete an alignment of four
fn find_threats(b: Bits) -> Bits {
    let mut threats = 0;
    for &dir in DIRECTIONS.iter() {
        threats |= find_threats_in_direction(b, dir);
    }
    threats
}

/// Returns a 1 in any cell too close to the edge of the board to take part
/// in an alignment along the given direction
fn too_short(dir: usize) -> Bits {
    let valid = bits::valid_cells();

    let pairs = (valid >> dir) & valid;
    let triples = (pairs >> dir) & valid;
    let quads = (triples >> dir) & valid;

    let quads_shifted = quads | (quads << dir);
    let possible_wins = quads_shifted | (quads_shifted << (2 * dir));

    valid & !possible_wins
}

fn border_stones_in_direction(dir: usize) -> Bits {
    let valid = bits::valid_cells();

    let stones_right_of_border = (valid << dir) & valid;
    let stones_left_of_border = (valid >> dir) & valid;

    !(stones_right_of_border & stones_left_of_border)
}

fn dead_stones_in_direction(me: Bits, them: Bits, dir: usize) -> Bits {
    let played_positions = me | them;
    let empty_positions = bits::valid_cells() & !played_positions;

    // . = empty
    // | = edge of the board
    // O = current player
    // X = opponent
    // # = either player
    // _ = empty or either player
    // ^ = position of the 1s in the mask

    // Os and Xs can be swapped in all patterns.

    // Detect the patterns #. and .#
    //                     ^       ^
    let uncovered = ((empty_positions >> dir) & played_positions)
        | ((empty_positions << dir) & played_positions);

    // Detect the patterns ##. and .##
    //                     ^         ^
    let covered_by_1 =
        ((uncovered >> dir) & played_positions) | ((uncovered << dir) & played_positions);

    // Detect the patterns #XX. and .XX#
    //                     ^           ^
    let pairs = ((me >> dir) & me) | ((them >> dir) & them);
    let covered_by_pair = ((covered_by_1 >> dir) & (pairs >> dir))
        | ((covered_by_1 << dir) & (pairs << (2 * dir)));

    // Any stone covered by enough other stones is dead.
    let covered_stones = played_positions & !uncovered & !covered_by_1 & !covered_by_pair;

    // Detect the patterns |___|, |__|, and |_|
    //                      ^^^    ^^        ^
    // These patterns occur at the corners of the board when checking the
    // diagonals. All stones in these positions are dead.
    let excluded_stones = too_short(dir);

    // Detect the patterns O_X and X_O
    //                      ^       ^
    let between = ((me >> dir) & (them << dir)) | ((them >> dir) & (me << dir));

    // Detect the patterns |#X_O and O_X#|
    //                      ^           ^
    let pinned = border_stones_in_direction(dir)
        & played_positions
        & ((between >> (2 * dir)) | (between << (2 * dir)));

    covered_stones | excluded_stones | pinned
}

fn find_winning_stones_in_direction(b: Bits, dir: usize) -> Bits {
    let pairs = b & (b << (2 * dir));
    let quads = pairs & (pairs << dir);

    let winning_pairs = quads | (quads >> dir);

    winning_pairs | (winning_pairs >> (2 * dir))
}

/// Returns a 1 in any cell which is part of an alignment of four
fn find_winning_stones(b: Bits) -> Bits {
    let mut stones = 0;
    for &dir in DIRECTIONS.iter() {
        stones |= find_winning_stones_in_direction(b, dir);
    }
    stones
}

fn has_won_in_direction(b: Bits, dir: usize) -> Bits {
    let pairs = b & (b << (2 * dir));

    pairs & (pairs << dir)
}

fn has_won(b: Bits) -> bool {
    for &dir in DIRECTIONS.iter() {
        if has_won_in_direction(b, dir) != 0 {
            return true;
        }
    }
    false
}

/// A game position encoded as two bitboards plus a ply counter
///
/// `me` holds the stones of the player whose turn it is; `them` holds the
/// opponent's stones. [`Position::play`] swaps the two masks, so after any
/// move `them` is always the side which placed the last stone.
///
/// [`Position::play`]: #method.play
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct Position {
    // mask of the current player's stones
    me: Bits,
    // mask of the opponent's stones
    them: Bits,
    ply: usize,
}

impl Position {
    /// The score of winning as early as possible. The earliest possible win
    /// places its final stone on the 7th ply.
    pub const MAX_SCORE: i32 = score_win_at(7);

    /// The score of losing as early as possible
    pub const MIN_SCORE: i32 = score_loss_at(7);

    /// Creates a new, empty position
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a position from a string of 1-indexed moves
    ///
    /// # Notes
    /// The move string is a sequence of columns played, indexed from 1
    /// (meaning `"0"` is an invalid move).
    ///
    /// Returns `Err` if the move string represents an invalid position.
    /// Invalid positions can contain moves outside the column range,
    /// overfilled columns and positions already won by either player.
    ///
    /// # Example
    /// ```
    /// # use std::error::Error;
    /// # fn main() -> Result<(), Box<dyn Error>> {
    /// use dropfour_ai::Position;
    ///
    /// // columns in move strings are 1-indexed
    /// let pos = Position::from_moves("112233")?;
    ///
    /// // columns as integers are 0-indexed
    /// assert!(pos.wins_this_move(pos.find_player_threats()) != 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_moves<S: AsRef<str>>(moves: S) -> Result<Self> {
        let mut pos = Self::new();

        for column_char in moves.as_ref().chars() {
            match column_char.to_digit(10).map(|c| c as usize) {
                Some(column @ 1..=WIDTH) => {
                    let column = column - 1;
                    if !pos.playable(column) {
                        return Err(anyhow!("Invalid move, column {} full", column + 1));
                    }
                    pos.play(column);
                    // abort if the position is won at any point
                    if pos.has_opponent_won() {
                        return Err(anyhow!("Invalid position, game is over"));
                    }
                }
                _ => return Err(anyhow!("could not parse '{}' as a valid move", column_char)),
            }
        }
        Ok(pos)
    }

    /// Creates a position from a slice of 0-indexed moves
    ///
    /// Significantly faster than [`Position::from_moves`] but provides less
    /// informative errors. Returns `Err` if the position is invalid.
    ///
    /// [`Position::from_moves`]: #method.from_moves
    pub fn from_slice(moves: &[usize]) -> Result<Self, ()> {
        let mut pos = Self::new();
        for &column in moves.iter() {
            if column >= WIDTH || !pos.playable(column) {
                return Err(());
            }
            pos.play(column);
            if pos.has_opponent_won() {
                return Err(());
            }
        }
        Ok(pos)
    }

    /// Accesses the internal move counter
    pub fn num_moves(&self) -> usize {
        self.ply
    }

    /// Returns whether a column is a legal move
    pub fn playable(&self, column: usize) -> bool {
        (self.me | self.them) & (bits::bottom_mask(column) << (HEIGHT - 1)) == 0
    }

    /// Advances the game by dropping a stone in the given column and
    /// switching players
    ///
    /// Returns the prior mask of the mover's stones, which [`Position::unplay`]
    /// takes to undo the move. Must not be called on a full column; this is
    /// checked on debug builds only.
    ///
    /// [`Position::unplay`]: #method.unplay
    pub fn play(&mut self, column: usize) -> Bits {
        debug_assert!(column < WIDTH);
        debug_assert!(self.playable(column));

        let next_valid_moves = (self.me | self.them) + bits::bottom_row();
        let move_bitmap = next_valid_moves & bits::column_mask(column);

        self.play_bit(move_bitmap)
    }

    /// Advances the game by applying a single-bit move mask and switching
    /// players
    ///
    /// The mask must be the next empty cell of its column; this is checked
    /// on debug builds only.
    pub fn play_bit(&mut self, move_bitmap: Bits) -> Bits {
        debug_assert!(move_bitmap != 0 && move_bitmap & (move_bitmap - 1) == 0);
        debug_assert!(move_bitmap & (self.me | self.them) == 0);
        debug_assert!(move_bitmap & ((self.me | self.them) + bits::bottom_row()) != 0);

        let before_move = self.me;

        self.me = self.them;
        self.them = before_move | move_bitmap;
        self.ply += 1;

        before_move
    }

    /// Undoes the last move, given the mask returned by that [`Position::play`]
    ///
    /// [`Position::play`]: #method.play
    pub fn unplay(&mut self, before_move: Bits) {
        self.them = self.me;
        self.me = before_move;
        self.ply -= 1;

        debug_assert!(self.me & self.them == 0);
    }

    /// Returns whether the current player holds four aligned stones
    ///
    /// Playing swaps roles, so immediately after a move this asks about the
    /// player who did *not* place the last stone.
    pub fn has_player_won(&self) -> bool {
        has_won(self.me)
    }

    /// Returns whether the opponent holds four aligned stones
    pub fn has_opponent_won(&self) -> bool {
        has_won(self.them)
    }

    /// Returns whether the board is full with neither side winning
    pub fn is_draw(&self) -> bool {
        (self.me | self.them) == bits::valid_cells()
            && !self.has_player_won()
            && !self.has_opponent_won()
    }

    /// Returns whether either side has won or the board is full
    pub fn is_game_over(&self) -> bool {
        self.has_player_won() || self.has_opponent_won() || (self.me | self.them) == bits::valid_cells()
    }

    /// Returns whether the current player could still complete four in a
    /// row given the empty cells left
    pub fn can_player_win(&self) -> bool {
        let empty_positions = bits::valid_cells() & !(self.me | self.them);

        has_won(self.me | empty_positions)
    }

    /// Returns whether the opponent could still complete four in a row
    /// given the empty cells left
    pub fn can_opponent_win(&self) -> bool {
        let empty_positions = bits::valid_cells() & !(self.me | self.them);

        has_won(self.them | empty_positions)
    }

    /// Returns a 1 in any cell in which the current player threatens a win,
    /// even if the threat cannot be played this turn
    pub fn find_player_threats(&self) -> Bits {
        // exclude any threats which the opponent already blocked
        find_threats(self.me) & !self.them & bits::valid_cells()
    }

    /// Returns a 1 in any cell in which the opponent threatens a win
    pub fn find_opponent_threats(&self) -> Bits {
        find_threats(self.them) & !self.me & bits::valid_cells()
    }

    /// Filters threats down to those on the 1st/3rd/5th rows, which carry a
    /// zugzwang advantage for the first player
    ///
    /// Returns zero when it is the second player's turn, as the parity
    /// advantage belongs to the first player.
    pub fn find_odd_even_threats(&self, threats: Bits) -> Bits {
        if self.ply & 1 == 1 {
            return 0;
        }

        let mut rows = 0;
        let mut row = 0;
        while row < HEIGHT {
            rows |= bits::bottom_row() << row;
            row += 2;
        }
        threats & rows
    }

    /// Filters threats down to those which are playable right now
    pub fn wins_this_move(&self, threats: Bits) -> Bits {
        let next_valid_moves = (self.me | self.them) + bits::bottom_row();

        // exclude any threat which cannot be played immediately
        threats & next_valid_moves
    }

    /// Returns a 1 in any cell in which the current player can move without
    /// losing next turn
    pub fn find_non_losing_moves(&self, opponent_threats: Bits) -> Bits {
        let below_threats = opponent_threats >> 1;
        let next_valid_moves = (self.me | self.them) + bits::bottom_row();

        next_valid_moves & !below_threats & bits::valid_cells()
    }

    /// Returns whether the current player can play this column without
    /// losing next turn
    pub fn is_non_losing_move(&self, non_losing_moves: Bits, column: usize) -> bool {
        self.playable(column) && bits::column_mask(column) & non_losing_moves != 0
    }

    /// Returns the score if the game were won by the current player after
    /// the given number of turns
    pub fn score_win(&self, turns: usize) -> i32 {
        score_win_at(self.ply + turns)
    }

    /// Returns the score if the game were lost by the current player after
    /// the given number of turns
    pub fn score_loss(&self, turns: usize) -> i32 {
        score_loss_at(self.ply + turns)
    }

    /// Decodes a score into the ply of the game-ending move. The inverse of
    /// [`Position::score_win`] and [`Position::score_loss`].
    ///
    /// [`Position::score_win`]: #method.score_win
    /// [`Position::score_loss`]: #method.score_loss
    pub fn score_to_last_move(&self, score: i32) -> usize {
        if score == 0 {
            return WIDTH * HEIGHT;
        }

        let last_move = WIDTH * HEIGHT + 1 - 2 * score.abs() as usize;

        // Integer division loses the parity of the ending ply: the winner's
        // stones land on every other ply, so snap to the winner's parity.
        let winner_parity = if score > 0 {
            (self.ply + 1) & 1
        } else {
            self.ply & 1
        };

        if last_move & 1 == winner_parity {
            last_move
        } else {
            last_move - 1
        }
    }

    /// Returns a 1 in any stone which provably has no impact on the rest of
    /// the game
    ///
    /// Every reported stone is dead; some truly dead stones may be missed.
    pub fn find_dead_stones(&self) -> Bits {
        let mut dead = !0;
        for &dir in DIRECTIONS.iter() {
            dead &= dead_stones_in_direction(self.me, self.them, dir);
        }
        dead & (self.me | self.them)
    }

    /// Returns true only if every dead stone found cannot impact the rest
    /// of the game. Only used for testing.
    pub fn are_dead_stones_valid(&self) -> bool {
        let dead_stones = self.find_dead_stones();
        let empty_positions = bits::valid_cells() & !(self.me | self.them);

        let me_wins = find_winning_stones(self.me | empty_positions) & empty_positions;
        let them_wins = find_winning_stones(self.them | empty_positions) & empty_positions;

        let me_wins_minus_dead =
            find_winning_stones((self.me & !dead_stones) | empty_positions) & empty_positions;
        let them_wins_minus_dead =
            find_winning_stones((self.them & !dead_stones) | empty_positions) & empty_positions;

        let me_wins_plus_dead =
            find_winning_stones(self.me | dead_stones | empty_positions) & empty_positions;
        let them_wins_plus_dead =
            find_winning_stones(self.them | dead_stones | empty_positions) & empty_positions;

        // All dead stones must pass the following conditions:
        //   1. Flipping a dead stone to a player's color cannot allow that
        //      player more possible wins.
        //   2. Flipping a dead stone to the opponent's color cannot take
        //      possible wins away from the player.
        me_wins == me_wins_minus_dead
            && them_wins == them_wins_minus_dead
            && me_wins == me_wins_plus_dead
            && them_wins == them_wins_plus_dead
    }

    /// Returns the canonical hash of the position and whether the canonical
    /// form is the mirrored one
    ///
    /// The hash is a 1 on every cell held by the current player or by a
    /// dead stone, plus a 1 on top of each column. The column-header bit
    /// fixes how many stones each column holds, so this single value
    /// uniquely identifies the position; assigning dead stones to the
    /// current player collapses positions which differ only in stones that
    /// no longer matter.
    pub fn hash(&self) -> (Bits, bool) {
        let dead_stones = self.find_dead_stones();

        let column_headers = (self.me | self.them | dead_stones) + bits::bottom_row();
        let hash = self.me | dead_stones | column_headers;

        // return the same hash for mirrored positions
        let mirrored = bits::mirror(hash);
        if mirrored < hash {
            (mirrored, true)
        } else {
            (hash, false)
        }
    }

    /// Returns the reflection of this position about the middle column
    pub fn mirrored(&self) -> Self {
        Self {
            me: bits::mirror(self.me),
            them: bits::mirror(self.them),
            ply: self.ply,
        }
    }

    /// Accesses the internal mask of the current player's stones
    pub fn player_mask(&self) -> Bits {
        self.me
    }

    /// Accesses the internal mask of all played stones
    pub fn board_mask(&self) -> Bits {
        self.me | self.them
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let border: String = std::iter::repeat('-').take(WIDTH).collect();
        writeln!(f, "+{}+", border)?;

        for row in (0..HEIGHT).rev() {
            write!(f, "|")?;
            for column in 0..WIDTH {
                let shift = row + column * (HEIGHT + 1);

                if (self.me >> shift) & 1 != 0 {
                    write!(f, "O")?;
                } else if (self.them >> shift) & 1 != 0 {
                    write!(f, "X")?;
                } else {
                    write!(f, ".")?;
                }
            }
            writeln!(f, "|")?;
        }

        write!(f, "+{}+", border)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A 42-move sequence filling the board with no alignment of four for
    // either player; every prefix is a legal, undecided position.
    pub const DRAW_LINE: &str = "132457613245761324576132457613245761324576";

    #[test]
    fn play_and_unplay_are_inverses() {
        let mut pos = Position::from_moves("4453").unwrap();
        let copy = pos;

        for column in 0..WIDTH {
            if pos.playable(column) {
                let before_move = pos.play(column);
                assert_ne!(pos, copy);
                pos.unplay(before_move);
                assert_eq!(pos, copy);
            }
        }
    }

    #[test]
    fn stone_counts_match_ply() {
        let mut pos = Position::new();
        for (i, c) in DRAW_LINE.chars().enumerate() {
            let column = c.to_digit(10).unwrap() as usize - 1;
            pos.play(column);

            let (me, all) = (pos.player_mask(), pos.board_mask());
            assert_eq!(all.count_ones() as usize, i + 1);
            assert_eq!(
                me.count_ones() as usize,
                (i + 1) / 2,
                "current player owns the stones of the side to move"
            );
        }
    }

    #[test]
    fn vertical_win_is_detected() {
        let pos = Position::from_moves("1212121").unwrap_err();
        // the 7th move completes four in column 1, so parsing fails
        assert!(pos.to_string().contains("game is over"));

        let mut pos = Position::from_moves("121212").unwrap();
        assert!(!pos.has_player_won());
        let threats = pos.find_player_threats();
        assert_ne!(pos.wins_this_move(threats), 0);

        pos.play(0);
        assert!(pos.has_opponent_won());
    }

    #[test]
    fn horizontal_and_diagonal_wins_are_detected() {
        // the 7th stone completes 1-2-3-4 on the bottom row
        assert!(Position::from_moves("1727374").is_err());
        let pos = Position::from_moves("172737").unwrap();
        assert_ne!(pos.wins_this_move(pos.find_player_threats()), 0);

        // the 11th stone completes a positive-diagonal staircase
        assert!(Position::from_moves("23345445575").is_err());
        let pos = Position::from_moves("2334544557").unwrap();
        assert_ne!(pos.wins_this_move(pos.find_player_threats()), 0);
    }

    #[test]
    fn draw_line_fills_the_board() {
        let pos = Position::from_moves(DRAW_LINE).unwrap();
        assert!(pos.is_draw());
        assert!(pos.is_game_over());
        assert!(!pos.can_player_win());
        assert!(!pos.can_opponent_win());
    }

    #[test]
    fn double_threat_is_two_winning_cells() {
        // first player holds columns 2, 3, 4 on the bottom row
        let pos = Position::from_moves("27374").unwrap();
        let opponent_threats = pos.find_opponent_threats();
        let opponent_wins = pos.wins_this_move(opponent_threats);
        assert_eq!(opponent_wins.count_ones(), 2);

        // blocking one threat still loses to the other
        assert_ne!(opponent_wins & (opponent_wins - 1), 0);
    }

    #[test]
    fn non_losing_moves_avoid_cells_below_threats() {
        // the opponent holds row 1 of columns 2..=4, threatening both row-1
        // ends; dropping into column 1 or 5 would hand over the win
        let pos = Position::from_moves("34531415").unwrap();
        let opponent_threats = pos.find_opponent_threats();
        assert_eq!(pos.wins_this_move(opponent_threats), 0);

        let non_losing = pos.find_non_losing_moves(opponent_threats);
        assert_eq!(non_losing & bits::bottom_mask(1), 0);
        assert_eq!(non_losing & bits::bottom_mask(5), 0);
        assert!(pos.is_non_losing_move(non_losing, 0));
        assert!(pos.is_non_losing_move(non_losing, 3));
    }

    #[test]
    fn odd_even_threats_belong_to_the_first_player() {
        let even_ply = Position::from_moves("1234").unwrap();
        let odd_ply = Position::from_moves("123").unwrap();

        let all_cells = bits::valid_cells();
        assert_eq!(odd_ply.find_odd_even_threats(all_cells), 0);

        // rows 0, 2 and 4 survive the filter on even plies
        let expected =
            bits::bottom_row() | (bits::bottom_row() << 2) | (bits::bottom_row() << 4);
        assert_eq!(even_ply.find_odd_even_threats(all_cells), expected);
    }

    #[test]
    fn dead_stones_are_sound() {
        for end in 0..=DRAW_LINE.len() {
            let pos = Position::from_moves(&DRAW_LINE[..end]).unwrap();
            assert!(pos.are_dead_stones_valid(), "after {} moves", end);
        }
    }

    #[test]
    fn hash_matches_mirror() {
        let pos = Position::from_moves("1324576132457613245761").unwrap();
        let mirror = pos.mirrored();

        let (hash, is_mirrored) = pos.hash();
        let (mirror_hash, mirror_is_mirrored) = mirror.hash();

        assert_eq!(hash, mirror_hash);
        assert_ne!(is_mirrored, mirror_is_mirrored);
    }

    #[test]
    fn symmetric_position_is_its_own_mirror() {
        let pos = Position::from_moves("44").unwrap();
        let (_, is_mirrored) = pos.hash();
        assert!(!is_mirrored);
    }

    #[test]
    fn score_codec_roundtrips() {
        // immediate win with the 7th stone of the game
        let pos = Position::from_moves("112233").unwrap();
        assert_eq!(pos.score_win(1), 18);
        assert_eq!(pos.score_to_last_move(18), 7);

        // loss two turns out: block at ply 6, opponent wins at ply 7
        let pos = Position::from_moves("27374").unwrap();
        assert_eq!(pos.score_loss(0), -18);
        assert_eq!(pos.score_to_last_move(-18), 7);

        let pos = Position::new();
        assert_eq!(pos.score_to_last_move(0), WIDTH * HEIGHT);
        assert_eq!(pos.score_to_last_move(1), 41);
    }

    #[test]
    fn display_shows_the_last_mover_as_opponent() {
        let pos = Position::from_moves("4").unwrap();
        let rendered = pos.to_string();
        // single stone in the center column, rendered as the opponent's
        assert!(rendered.contains("|...X...|"));
    }
}
