use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::engine::{Direction, Grid, GridEngine};

use super::{pick_best, random_direction, search, simulate_ply, AgentConfig, BranchEval, SearchStats};

/// Parallel search: the four root branches run on rayon.
///
/// Each branch gets its own `StdRng` seeded from the caller's RNG before the
/// fan-out, so a seeded caller still gets repeatable choices.
pub struct AgentParallel {
    engine: GridEngine,
    cfg: AgentConfig,
    stats: SearchStats,
}

impl AgentParallel {
    pub fn new(engine: GridEngine) -> Self {
        Self::with_config(engine, AgentConfig::default())
    }

    pub fn with_config(engine: GridEngine, cfg: AgentConfig) -> Self {
        Self { engine, cfg, stats: SearchStats::default() }
    }

    /// Pick a direction for `grid`, random when every direction is a no-op.
    pub fn best_move<R: Rng + ?Sized>(&mut self, grid: &Grid, rng: &mut R) -> Direction {
        let branches = self.branch_evals(grid, rng);
        pick_best(&branches).unwrap_or_else(|| random_direction(rng))
    }

    /// Score each direction in parallel, in [`Direction::ALL`] order.
    pub fn branch_evals<R: Rng + ?Sized>(&mut self, grid: &Grid, rng: &mut R) -> [BranchEval; 4] {
        let seeds: [u64; 4] = [rng.gen(), rng.gen(), rng.gen(), rng.gen()];
        let below = self.cfg.depth.saturating_sub(1);
        let engine = &self.engine;
        let cfg = &self.cfg;
        let evals: Vec<(BranchEval, u64)> = Direction::ALL
            .par_iter()
            .zip(seeds.par_iter())
            .map(|(&dir, &seed)| {
                let mut branch_rng = StdRng::seed_from_u64(seed);
                let mut nodes = 0u64;
                match simulate_ply(engine, grid, dir, &mut branch_rng) {
                    Some(child) => {
                        let score = search(engine, cfg, &child, below, &mut branch_rng, &mut nodes);
                        (BranchEval { dir, score, legal: true }, nodes)
                    }
                    None => (BranchEval { dir, score: 0.0, legal: false }, nodes),
                }
            })
            .collect();
        let mut out = super::illegal_branches();
        let mut nodes = 0;
        for (i, (eval, n)) in evals.into_iter().enumerate() {
            out[i] = eval;
            nodes += n;
        }
        self.stats.record(nodes);
        out
    }

    #[inline]
    pub fn last_stats(&self) -> SearchStats {
        self.stats
    }

    #[inline]
    pub fn reset_stats(&mut self) {
        self.stats = SearchStats::default();
    }
}
