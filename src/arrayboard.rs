use anyhow::{anyhow, Result};
use crossterm::{
    cursor::MoveTo,
    style::{style, Attribute, Color, PrintStyledContent},
    QueueableCommand,
};

use std::io::{stdout, Write};

use dropfour_ai::bits;
use dropfour_ai::{Position, HEIGHT, WIDTH};

#[derive(Copy, Clone, Debug)]
pub enum GameState {
    Playing,
    PlayerOneWin,
    PlayerTwoWin,
    Draw,
}

/// The interactive game wrapper: a position plus its move history and state
#[derive(Clone)]
pub struct ArrayBoard {
    pos: Position,
    pub game: String,
    pub state: GameState,
}

impl ArrayBoard {
    pub fn new() -> Self {
        Self {
            pos: Position::new(),
            game: String::new(),
            state: GameState::Playing,
        }
    }

    /// The position reached by the moves played so far
    pub fn position(&self) -> &Position {
        &self.pos
    }

    /// Whether the first player is to move
    pub fn player_one(&self) -> bool {
        self.pos.num_moves() % 2 == 0
    }

    /// Plays a 1-indexed column, validating it first
    pub fn play_checked(&mut self, column_one_indexed: usize) -> Result<GameState> {
        if column_one_indexed < 1 || column_one_indexed > WIDTH {
            return Err(anyhow!(
                "Invalid move, column {} out of range. Columns must be between 1 and {}",
                column_one_indexed,
                WIDTH
            ));
        }
        let column = column_one_indexed - 1;
        if !self.pos.playable(column) {
            return Err(anyhow!("Invalid move, column {} full", column_one_indexed));
        }

        let wins = self.pos.wins_this_move(self.pos.find_player_threats());
        let is_winning_move = wins & bits::column_mask(column) != 0;
        let was_player_one = self.player_one();

        self.pos.play(column);
        self.game.push_str(&column_one_indexed.to_string());

        self.state = if is_winning_move {
            if was_player_one {
                GameState::PlayerOneWin
            } else {
                GameState::PlayerTwoWin
            }
        } else if self.pos.is_draw() {
            GameState::Draw
        } else {
            GameState::Playing
        };

        Ok(self.state)
    }

    /// Draws the board in place with one colored cell per tile
    pub fn display(&self) -> Result<()> {
        let mut stdout = stdout();

        let cols: String = (1..=WIDTH).map(|x| x.to_string()).collect();
        stdout.queue(PrintStyledContent(style(cols + "\n")))?;
        for _ in 0..HEIGHT {
            stdout.queue(PrintStyledContent(style("\n")))?;
        }
        stdout.flush()?;

        let (origin_x, origin_y) = crossterm::cursor::position()?;

        // the first player's stones sit in `me` on even plies only
        let first_player_mask = if self.player_one() {
            self.pos.player_mask()
        } else {
            self.pos.board_mask() ^ self.pos.player_mask()
        };
        let board_mask = self.pos.board_mask();

        for row in 0..HEIGHT {
            for column in 0..WIDTH {
                let cell = bits::bottom_mask(column) << row;
                let (pos_x, pos_y) = (origin_x + column as u16, origin_y - row as u16);

                stdout
                    .queue(MoveTo(pos_x, pos_y))?
                    .queue(PrintStyledContent(
                        style("O")
                            .attribute(Attribute::Bold)
                            .on(Color::DarkBlue)
                            .with(if first_player_mask & cell != 0 {
                                Color::Red
                            } else if board_mask & cell != 0 {
                                Color::Yellow
                            } else {
                                Color::DarkBlue
                            }),
                    ))?;
            }
        }
        stdout
            .queue(MoveTo(origin_x + WIDTH as u16, origin_y))?
            .queue(PrintStyledContent(style("\n")))?;
        stdout.flush()?;
        Ok(())
    }
}

impl Default for ArrayBoard {
    fn default() -> Self {
        Self::new()
    }
}
