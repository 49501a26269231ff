use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::display::{self, DisplayGrid};
use super::grid::{Fuse, Grid, Tile};
use super::Direction;
use crate::clock::{Clock, SystemClock};

pub const CLASSIC_SIZE: usize = 4;
pub const BOMB_SIZE: usize = 6;

/// Tile that wins a classic game. Detected by coordinators, not the engine.
pub const CLASSIC_TARGET: u32 = 2048;
/// Tile that wins a bomb game. Detected by the engine.
pub const BOMB_TARGET: u32 = 65536;

const BOMB_CHANCE: f64 = 0.5;
const BOMB_MIN_VALUE: u32 = 16;
const BOMB_MAX_VALUE: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// 4×4, no engine-level win.
    Classic,
    /// 6×6 with timed bomb tiles, wins at [`BOMB_TARGET`].
    Bomb,
}

impl Variant {
    #[inline]
    pub fn size(self) -> usize {
        match self {
            Variant::Classic => CLASSIC_SIZE,
            Variant::Bomb => BOMB_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Continue,
    Won,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReason {
    GridFull,
    BombExploded,
}

/// Grid, score and derived status of one board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub grid: Grid,
    pub score: u64,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<LossReason>,
}

impl EngineState {
    #[inline]
    pub fn is_over(&self) -> bool {
        self.status != Status::Continue
    }
}

/// Stateless rule set for one variant.
///
/// Cloning is cheap; the clock is shared.
#[derive(Clone)]
pub struct GridEngine {
    variant: Variant,
    clock: Arc<dyn Clock>,
}

impl GridEngine {
    pub fn new(variant: Variant, clock: Arc<dyn Clock>) -> Self {
        GridEngine { variant, clock }
    }

    /// Classic 4×4 rules. The clock is never consulted.
    pub fn classic() -> Self {
        Self::new(Variant::Classic, Arc::new(SystemClock))
    }

    /// 6×6 bomb rules reading time from `clock`.
    pub fn bomb(clock: Arc<dyn Clock>) -> Self {
        Self::new(Variant::Bomb, clock)
    }

    #[inline]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Empty grid with two random tiles, score 0.
    pub fn new_game<R: Rng + ?Sized>(&self, rng: &mut R) -> EngineState {
        let grid = Grid::empty(self.variant.size())
            .with_random_tile(rng)
            .with_random_tile(rng);
        EngineState { grid, score: 0, status: Status::Continue, reason: None }
    }

    /// Rebuild a state from a persisted grid/score pair, recomputing status.
    pub fn resume(&self, grid: Grid, score: u64) -> EngineState {
        self.settle(EngineState { grid, score, status: Status::Continue, reason: None })
    }

    /// Slide/merge tiles in `dir` without inserting a new tile.
    ///
    /// Returns the shifted grid and the sum of merged values. In the bomb
    /// variant `rng` decides which merges become bombs.
    pub fn shift<R: Rng + ?Sized>(&self, grid: &Grid, dir: Direction, rng: &mut R) -> (Grid, u64) {
        let (transpose, mirror) = dir.transform();
        let mut work = if transpose { grid.transposed() } else { grid.clone() };
        if mirror {
            work = work.mirrored();
        }
        let (mut out, gained) = match self.variant {
            Variant::Classic => work.slide_left(&mut Tile::new),
            Variant::Bomb => {
                let now_ms = self.clock.now_ms();
                work.slide_left(&mut |value| merge_tile(value, now_ms, rng))
            }
        };
        if mirror {
            out = out.mirrored();
        }
        if transpose {
            out = out.transposed();
        }
        (out, gained)
    }

    /// Apply one ply: shift, and if anything moved add one random tile.
    ///
    /// A no-op move returns grid and score untouched, only status is
    /// recomputed. In the bomb variant an already expired bomb ends the game
    /// before the move is applied.
    pub fn apply_move<R: Rng + ?Sized>(&self, mut state: EngineState, dir: Direction, rng: &mut R) -> EngineState {
        if self.variant == Variant::Bomb && state.grid.has_expired_bomb(self.clock.now_ms()) {
            state.status = Status::Lost;
            state.reason = Some(LossReason::BombExploded);
            return state;
        }
        let (moved, gained) = self.shift(&state.grid, dir, rng);
        if moved != state.grid {
            state.grid = moved.with_random_tile(rng);
            state.score += gained;
        }
        self.settle(state)
    }

    /// Recompute status and loss reason for the current grid.
    pub fn settle(&self, mut state: EngineState) -> EngineState {
        let (status, reason) = match self.variant {
            Variant::Classic => {
                if state.grid.is_stuck() { (Status::Lost, None) } else { (Status::Continue, None) }
            }
            Variant::Bomb => {
                if state.grid.has_expired_bomb(self.clock.now_ms()) {
                    (Status::Lost, Some(LossReason::BombExploded))
                } else if state.grid.is_stuck() {
                    (Status::Lost, Some(LossReason::GridFull))
                } else if state.grid.contains_value(BOMB_TARGET) {
                    (Status::Won, None)
                } else {
                    (Status::Continue, None)
                }
            }
        };
        state.status = status;
        state.reason = reason;
        state
    }

    /// Display projection of `grid` at the current time.
    pub fn display(&self, grid: &Grid) -> DisplayGrid {
        match self.variant {
            Variant::Classic => display::plain(grid),
            Variant::Bomb => display::with_countdowns(grid, self.clock.now_ms()),
        }
    }
}

fn merge_tile<R: Rng + ?Sized>(value: u32, now_ms: u64, rng: &mut R) -> Tile {
    if (BOMB_MIN_VALUE..=BOMB_MAX_VALUE).contains(&value) && rng.gen_bool(BOMB_CHANCE) {
        Tile::bomb(value, Fuse::for_value(value, now_ms))
    } else {
        Tile::new(value)
    }
}
