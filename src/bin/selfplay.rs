use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use duel_2048::agent::{Agent, AgentConfig};
use duel_2048::clock::SystemClock;
use duel_2048::engine::{GridEngine, Status, Variant};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "selfplay", about = "Run AI games in parallel and report score statistics")]
struct Args {
    /// Number of games to play
    #[arg(long, default_value_t = 16)]
    games: u64,

    /// Play the 6x6 bomb variant instead of classic
    #[arg(long)]
    bomb: bool,

    /// Search depth (plies)
    #[arg(long)]
    depth: Option<u32>,

    /// Stop each game after this many moves
    #[arg(long)]
    steps: Option<u64>,

    /// Base seed; game i uses seed + i
    #[arg(long)]
    seed: Option<u64>,

    /// Suppress the spinner status line
    #[arg(long)]
    quiet: bool,
}

struct GameResult {
    score: u64,
    highest_tile: u32,
    moves: u64,
    status: Status,
}

fn play_one(engine: &GridEngine, cfg: &AgentConfig, seed: u64, steps: Option<u64>, moves: &AtomicU64) -> GameResult {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut agent = Agent::with_config(engine.clone(), cfg.clone());
    let mut state = engine.new_game(&mut rng);
    let mut move_count: u64 = 0;
    while !state.is_over() {
        let dir = agent.best_move(&state.grid, &mut rng);
        state = engine.apply_move(state, dir, &mut rng);
        move_count += 1;
        moves.fetch_add(1, Ordering::Relaxed);
        if steps.is_some_and(|limit| move_count >= limit) {
            break;
        }
    }
    GameResult { score: state.score, highest_tile: state.grid.highest_value(), moves: move_count, status: state.status }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let variant = if args.bomb { Variant::Bomb } else { Variant::Classic };
    let engine = GridEngine::new(variant, Arc::new(SystemClock));
    let mut cfg = AgentConfig::default();
    if let Some(depth) = args.depth {
        cfg.depth = depth;
    }
    let base_seed = args.seed.unwrap_or_else(rand::random);

    let start = Instant::now();
    let moves = AtomicU64::new(0);
    let pb = if !args.quiet {
        let pb = ProgressBar::new(args.games);
        pb.set_style(
            ProgressStyle::with_template("{spinner} {elapsed_precise} | Games: {pos}/{len} | {msg}")?
                .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let results: Vec<GameResult> = (0..args.games)
        .into_par_iter()
        .map(|i| {
            let result = play_one(&engine, &cfg, base_seed.wrapping_add(i), args.steps, &moves);
            if let Some(pb) = &pb {
                pb.inc(1);
                let m = moves.load(Ordering::Relaxed);
                let rate = m as f64 / start.elapsed().as_secs_f64().max(1e-6);
                pb.set_message(format!("moves/sec: {:.1}", rate));
            }
            result
        })
        .collect();
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if results.is_empty() {
        println!("No games played");
        return Ok(());
    }
    let n = results.len() as f64;
    let mean_score = results.iter().map(|r| r.score as f64).sum::<f64>() / n;
    let best_score = results.iter().map(|r| r.score).max().unwrap_or(0);
    let total_moves: u64 = results.iter().map(|r| r.moves).sum();
    let wins = results.iter().filter(|r| r.status == Status::Won).count();
    let mut tiles: Vec<u32> = results.iter().map(|r| r.highest_tile).collect();
    tiles.sort_unstable();
    tiles.dedup();

    println!(
        "Games: {} | mean score: {:.1} | best score: {} | moves: {} | wins: {} | elapsed: {:.1}s",
        results.len(),
        mean_score,
        best_score,
        total_moves,
        wins,
        start.elapsed().as_secs_f64()
    );
    for tile in tiles.iter().rev() {
        let reached = results.iter().filter(|r| r.highest_tile >= *tile).count();
        println!("  reached {:>6}: {:>5.1}%", tile, 100.0 * reached as f64 / n);
    }
    Ok(())
}
