#[cfg(test)]
pub mod test {
    use anyhow::{anyhow, Result};
    use std::fs::File;
    use std::io::{BufRead, BufReader};
    use std::path::Path;
    use std::time::{Duration, Instant};

    use crate::{Position, Settings, Solver};

    fn make_solver() -> Result<Solver> {
        Solver::new(Settings::default().num_threads(2).num_table_entries(1_048_583))
    }

    // Runs a benchmark file of `moves score` lines. In strong mode the exact
    // score must match; in weak mode only the sign.
    fn run_benchmark(name: &str, path: &str, strong: bool) -> Result<()> {
        if !Path::new(path).exists() {
            eprintln!("skipping {}: {} not found", name, path);
            return Ok(());
        }

        let file = BufReader::new(File::open(path)?);
        let mut solver = make_solver()?;

        let mut times = vec![];
        let mut posis = vec![];

        for line in file.lines() {
            let buf = line?;
            if buf.is_empty() {
                continue;
            }

            let mut test_data = buf.split_whitespace();
            let moves = test_data
                .next()
                .ok_or_else(|| anyhow!("invalid test data: {}", buf))?;
            let score = test_data
                .next()
                .ok_or_else(|| anyhow!("invalid test data: {}", buf))?
                .parse::<i32>()?;

            let pos = Position::from_moves(moves)?;
            solver.reset_stats();

            let start_time = Instant::now();
            let calc = if strong {
                solver.solve_strong(&pos)
            } else {
                solver.solve_weak(&pos)
            }
            .ok_or_else(|| anyhow!("search was cancelled"))?;
            let elapsed = start_time.elapsed();

            let expected = if strong { score } else { score.signum() };
            assert_eq!(calc, expected, "position {}", moves);

            times.push(elapsed);
            posis.push(solver.get_merged_stats().get_num_nodes());
        }

        println!(
            "{}:\nMean time: {:.6}ms, Mean no. of positions: {}, kpos/s: {}",
            name,
            (times.iter().sum::<Duration>() / times.len() as u32).as_secs_f64() * 1000.0,
            posis.iter().sum::<u64>() as f64 / posis.len() as f64,
            posis
                .iter()
                .zip(times.iter())
                .map(|(p, t)| *p as f64 / t.as_secs_f64())
                .sum::<f64>()
                / (1000.0 * posis.len() as f64)
        );
        Ok(())
    }

    #[test]
    pub fn endgame_quick_strong() -> Result<()> {
        run_benchmark("Endgame-quick strong", "test_data/endgame_quick.txt", true)
    }

    #[test]
    pub fn endgame_quick_weak() -> Result<()> {
        run_benchmark("Endgame-quick weak", "test_data/endgame_quick.txt", false)
    }

    // The public benchmark sets are not redistributed with the crate; drop
    // them into test_data/ to run these.
    #[test]
    pub fn end_easy() -> Result<()> {
        run_benchmark("End-easy", "test_data/Test_L3_R1", true)
    }

    #[test]
    pub fn middle_easy() -> Result<()> {
        run_benchmark("Middle-easy", "test_data/Test_L2_R1", true)
    }

    #[test]
    pub fn middle_medium() -> Result<()> {
        run_benchmark("Middle-medium", "test_data/Test_L2_R2", true)
    }

    #[test]
    #[ignore]
    pub fn begin_hard() -> Result<()> {
        run_benchmark("Beginning-hard", "test_data/Test_L1_R3", true)
    }

    #[test]
    pub fn drawn_endings_score_zero() -> Result<()> {
        // every remaining line of play fills the board without a winner
        let draw_line = "132457613245761324576132457613245761324576";
        let mut solver = make_solver()?;

        let pos = Position::from_moves(&draw_line[..40])?;
        assert_eq!(solver.solve_weak(&pos), Some(0));

        let full = Position::from_moves(draw_line)?;
        assert!(full.is_draw());
        assert_eq!(solver.solve_strong(&full), Some(0));
        Ok(())
    }

    #[test]
    pub fn deciding_moves_are_consistent() -> Result<()> {
        // the defender's best reply maximises the length of a lost game
        let mut solver = make_solver()?;
        let pos = Position::from_moves("27374")?;

        let score = solver.solve_strong(&pos).unwrap();
        let best = solver.get_best_move(&pos, score).unwrap();

        let mut child = pos;
        child.play(best);
        assert_eq!(solver.solve_strong(&child), Some(-score));
        Ok(())
    }

    // Whole-game searches take minutes even with four threads; run with
    // --ignored to reproduce the published results.
    #[test]
    #[ignore]
    pub fn full_search() -> Result<()> {
        let mut solver = Solver::new(Settings::default())?;
        let pos = Position::new();

        let start_time = Instant::now();
        let calc = solver.solve_strong(&pos).unwrap();
        let time = start_time.elapsed();
        let posis = solver.get_merged_stats().get_num_nodes();

        println!(
            "Full game search\n Time: {:.6}s, No. of positions: {}, kpos/s: {}",
            time.as_secs_f64(),
            posis,
            posis as f64 / (1000.0 * time.as_secs_f64())
        );

        // the first player forces a win with the final stone of the game
        assert_eq!(calc, 1);
        assert_eq!(solver.get_best_move(&pos, calc), Some(3));
        Ok(())
    }

    #[test]
    #[ignore]
    pub fn center_openings_win() -> Result<()> {
        let mut solver = Solver::new(Settings::default())?;

        let pos = Position::from_moves("44")?;
        assert_eq!(solver.solve_weak(&pos), Some(1));
        Ok(())
    }
}
