use rand::Rng;

use crate::engine::{Direction, Grid, GridEngine};

use super::{illegal_branches, pick_best, random_direction, search, simulate_ply, AgentConfig, BranchEval, SearchStats};

/// Single-threaded search policy.
pub struct Agent {
    engine: GridEngine,
    cfg: AgentConfig,
    stats: SearchStats,
}

impl Agent {
    pub fn new(engine: GridEngine) -> Self {
        Self::with_config(engine, AgentConfig::default())
    }

    pub fn with_config(engine: GridEngine, cfg: AgentConfig) -> Self {
        Self { engine, cfg, stats: SearchStats::default() }
    }

    /// Pick a direction for `grid`.
    ///
    /// When no direction changes the grid a random one is returned; callers
    /// are expected to stop asking once the game is over.
    pub fn best_move<R: Rng + ?Sized>(&mut self, grid: &Grid, rng: &mut R) -> Direction {
        let branches = self.branch_evals(grid, rng);
        pick_best(&branches).unwrap_or_else(|| random_direction(rng))
    }

    /// Score each direction, in [`Direction::ALL`] order.
    pub fn branch_evals<R: Rng + ?Sized>(&mut self, grid: &Grid, rng: &mut R) -> [BranchEval; 4] {
        let mut out = illegal_branches();
        let mut nodes = 0u64;
        let below = self.cfg.depth.saturating_sub(1);
        for (i, dir) in Direction::ALL.into_iter().enumerate() {
            if let Some(child) = simulate_ply(&self.engine, grid, dir, rng) {
                let score = search(&self.engine, &self.cfg, &child, below, rng, &mut nodes);
                out[i] = BranchEval { dir, score, legal: true };
            }
        }
        self.stats.record(nodes);
        out
    }

    /// Statistics from the last call to [`Self::best_move`] or [`Self::branch_evals`].
    #[inline]
    pub fn last_stats(&self) -> SearchStats {
        self.stats
    }

    #[inline]
    pub fn reset_stats(&mut self) {
        self.stats = SearchStats::default();
    }
}
