//! Heuristic move selection for an autonomous opponent.
//!
//! Two policy implementations share one surface:
//! - [`Agent`]: single-threaded search.
//! - [`AgentParallel`]: rayon-based, root branches searched concurrently.
//!
//! Notes
//! - The search is max-only. Each simulated step is a full ply (shift plus
//!   random tile), so the random insertion stands in for a chance layer.
//! - Randomness comes from the caller's RNG; a seeded RNG gives repeatable
//!   choices.
//!
//! Quick start
//! ```
//! use duel_2048::agent::Agent;
//! use duel_2048::engine::GridEngine;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let engine = GridEngine::classic();
//! let mut rng = StdRng::seed_from_u64(123);
//! let state = engine.new_game(&mut rng);
//!
//! let mut agent = Agent::new(engine.clone());
//! let dir = agent.best_move(&state.grid, &mut rng);
//! let next = engine.apply_move(state, dir, &mut rng);
//! assert!(next.grid.count_empty() <= 14);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::{Direction, Grid, GridEngine};

mod heuristic;
mod search_par;
mod search_seq;

pub use search_par::AgentParallel;
pub use search_seq::Agent;

/// Configurable knobs for the agent. Defaults match the web opponent.
///
/// - `depth`: plies searched from the root (root ply included).
/// - `empty_bonus`: leaf bonus per empty cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub depth: u32,
    pub empty_bonus: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { depth: 2, empty_bonus: 1000.0 }
    }
}

/// Per-branch value at the root.
///
/// - `score` is the best leaf value reachable after playing `dir`.
/// - `legal` is false when the move is a no-op for the current grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchEval {
    pub dir: Direction,
    pub score: f64,
    pub legal: bool,
}

/// Basic search stats for a single evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub nodes: u64,
    pub peak_nodes: u64,
}

impl SearchStats {
    fn record(&mut self, nodes: u64) {
        self.nodes = nodes;
        self.peak_nodes = self.peak_nodes.max(nodes);
    }
}

/// One full ply on a scratch copy: shift, then a random tile if anything moved.
///
/// `None` when `dir` does not change the grid.
pub(crate) fn simulate_ply<R: Rng + ?Sized>(
    engine: &GridEngine,
    grid: &Grid,
    dir: Direction,
    rng: &mut R,
) -> Option<Grid> {
    let (moved, _) = engine.shift(grid, dir, rng);
    if moved == *grid {
        return None;
    }
    Some(moved.with_random_tile(rng))
}

/// Max-only search below a root ply.
pub(crate) fn search<R: Rng + ?Sized>(
    engine: &GridEngine,
    cfg: &AgentConfig,
    grid: &Grid,
    depth: u32,
    rng: &mut R,
    nodes: &mut u64,
) -> f64 {
    *nodes += 1;
    if depth == 0 {
        return heuristic::evaluate(grid, cfg.empty_bonus);
    }
    let mut best: Option<f64> = None;
    for dir in Direction::ALL {
        if let Some(child) = simulate_ply(engine, grid, dir, rng) {
            let score = search(engine, cfg, &child, depth - 1, rng, nodes);
            best = Some(best.map_or(score, |b: f64| b.max(score)));
        }
    }
    best.unwrap_or_else(|| heuristic::evaluate(grid, cfg.empty_bonus))
}

/// First legal branch with the strictly highest score, in [`Direction::ALL`] order.
pub(crate) fn pick_best(branches: &[BranchEval; 4]) -> Option<Direction> {
    let mut best: Option<BranchEval> = None;
    for branch in branches.iter().filter(|b| b.legal) {
        if best.map_or(true, |b| branch.score > b.score) {
            best = Some(*branch);
        }
    }
    best.map(|b| b.dir)
}

/// Fallback when every direction is a no-op.
pub(crate) fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Direction {
    Direction::ALL[rng.gen_range(0..Direction::ALL.len())]
}

fn illegal_branches() -> [BranchEval; 4] {
    Direction::ALL.map(|dir| BranchEval { dir, score: 0.0, legal: false })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_breaks_ties_by_fixed_order() {
        let mut branches = illegal_branches();
        branches[1] = BranchEval { dir: Direction::Right, score: 10.0, legal: true };
        branches[3] = BranchEval { dir: Direction::Down, score: 10.0, legal: true };
        assert_eq!(pick_best(&branches), Some(Direction::Right));
        branches[2] = BranchEval { dir: Direction::Up, score: 11.0, legal: true };
        assert_eq!(pick_best(&branches), Some(Direction::Up));
    }

    #[test]
    fn it_ignores_illegal_branches() {
        let mut branches = illegal_branches();
        branches[0].score = 1e9;
        assert_eq!(pick_best(&branches), None);
    }
}
