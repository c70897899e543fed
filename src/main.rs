use anyhow::Result;

use std::cmp::Ordering;
use std::io::{stdin, stdout, Write};

use dropfour_ai::opening_book::OpeningBook;
use dropfour_ai::{Position, Settings, Solver};

mod arrayboard;
use arrayboard::*;

const BOOK_PATH: &str = "opening_book.csv";
const BOOK_DEPTH: usize = 8;

fn main() -> Result<()> {
    env_logger::init();

    let settings = Settings::default();

    // solve a position handed over on the command line and exit
    if let Some(moves) = std::env::args().nth(1) {
        return solve_position(settings, &moves);
    }

    let mut board = ArrayBoard::new();
    // keep the solver out here so its table is re-used between moves
    let mut solver = Solver::new(settings)?;

    let stdin = stdin();

    println!("Welcome to Connect 4\n");

    // check for an opening book
    let mut opening_book = None;
    match OpeningBook::load(BOOK_PATH) {
        Ok(book) => opening_book = Some(book),
        Err(err) => match err.root_cause().downcast_ref::<std::io::Error>() {
            Some(io_error) if io_error.kind() == std::io::ErrorKind::NotFound => loop {
                print!(
                    "Opening book not found, would you like to generate one? (takes a LONG time)\ny/n: "
                );
                stdout().flush().expect("failed to flush to stdout!");

                let mut buffer = String::new();
                stdin.read_line(&mut buffer)?;

                match buffer.to_lowercase().chars().next() {
                    Some('y') => {
                        OpeningBook::generate(&settings, BOOK_DEPTH, BOOK_PATH)?;
                        return Ok(());
                    }
                    Some('n') => {
                        println!("Skipping book generation, expect early AI moves to be slow");
                        break;
                    }
                    _ => println!("Unknown answer given"),
                }
            },
            _ => println!("Error reading opening book: {}", err.root_cause()),
        },
    }

    if let Some(book) = opening_book {
        solver = solver.with_opening_book(book);
    }

    let mut ai_players = (false, false);

    // choose AI control of player 1
    loop {
        let mut buffer = String::new();
        print!("Is player 1 AI controlled? y/n: ");
        stdout().flush().expect("failed to flush to stdout!");
        stdin.read_line(&mut buffer)?;
        match buffer.to_lowercase().chars().next() {
            Some('y') => {
                ai_players.0 = true;
                break;
            }
            Some('n') => break,
            _ => println!("Unknown answer given"),
        }
    }

    // choose AI control of player 2
    loop {
        let mut buffer = String::new();
        print!("Is player 2 AI controlled? y/n: ");
        stdout().flush().expect("failed to flush to stdout!");
        stdin.read_line(&mut buffer)?;
        match buffer.to_lowercase().chars().next() {
            Some('y') => {
                ai_players.1 = true;
                break;
            }
            Some('n') => break,
            _ => println!("Unknown answer given"),
        }
    }

    // game loop
    loop {
        board.display().expect("Failed to draw board!");

        match board.state {
            GameState::Playing => {
                let next_move =
                    // AI player
                    if (board.player_one() && ai_players.0) || (!board.player_one() && ai_players.1) {
                        println!("AI is thinking...");
                        stdout().flush().expect("Failed to flush to stdout!");

                        // slow down play if both players are AI
                        if ai_players == (true, true) {
                            std::thread::sleep(std::time::Duration::new(3, 0));
                        }

                        let pos = *board.position();
                        let score = solver.solve_strong(&pos).expect("search was cancelled");
                        let best_move = solver
                            .get_best_move(&pos, score)
                            .expect("no move matches the score");

                        let last_move = solver.get_num_moves_prediction(&pos, score);
                        match score.cmp(&0) {
                            Ordering::Greater => {
                                let player = if board.player_one() { 1 } else { 2 };
                                println!("Player {} can force a win on move {}.", player, last_move);
                            }
                            Ordering::Less => {
                                let player = if board.player_one() { 2 } else { 1 };
                                println!("Player {} can force a win on move {}.", player, last_move);
                            }
                            Ordering::Equal => {
                                println!("Optimal play from here is a draw.");
                            }
                        }

                        println!("Best move: {}", best_move + 1);
                        best_move + 1

                    // human player
                    } else {
                        print!("Move input > ");
                        stdout().flush().expect("Failed to flush to stdout!");
                        let mut input_str = String::new();
                        stdin.read_line(&mut input_str)?;

                        match input_str.trim().parse::<usize>() {
                            Err(_) => {
                                println!("Invalid number: {}", input_str);
                                continue;
                            }
                            Ok(column) => column,
                        }
                    };

                if let Err(err) = board.play_checked(next_move) {
                    println!("{}", err);
                    // try the move again
                    continue;
                }
            }

            // end states
            GameState::PlayerOneWin => {
                println!("Player 1 wins!");
                break;
            }
            GameState::PlayerTwoWin => {
                println!("Player 2 wins!");
                break;
            }
            GameState::Draw => {
                println!("Draw!");
                break;
            }
        }
    }

    println!("Game: {}", board.game);
    Ok(())
}

// Solves one position and prints the full report.
fn solve_position(settings: Settings, moves: &str) -> Result<()> {
    let pos = Position::from_moves(moves)?;
    let mut solver = Solver::new(settings)?;
    solver.print_progress();

    println!("{}", solver.get_settings_string());
    println!("\nSolving:\n{}\n", pos);

    let score = match solver.solve_strong(&pos) {
        Some(score) => score,
        None => {
            println!("Search cancelled.");
            return Ok(());
        }
    };

    print!("Score is {} ", score);
    match score.cmp(&0) {
        Ordering::Greater => println!("(win on move {}).", solver.get_num_moves_prediction(&pos, score)),
        Ordering::Less => println!("(loss on move {}).", solver.get_num_moves_prediction(&pos, score)),
        Ordering::Equal => println!("(draw)."),
    }

    if let Some(best_move) = solver.get_best_move(&pos, score) {
        println!("Best move: {}", best_move + 1);
    }

    println!("\n{}", solver.get_merged_stats().display_all_stats());
    Ok(())
}
