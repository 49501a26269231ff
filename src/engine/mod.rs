//! Grid engine: tiles, the canonical slide/merge primitive and the two rule
//! variants (classic 4×4 and the 6×6 bomb variant).
//!
//! Every operation takes the state explicitly and returns the next one; the
//! engine holds no game state of its own. Randomness is passed in by the
//! caller so seeded RNGs give reproducible games.
//!
//! Quick start:
//! ```
//! use duel_2048::engine::{Direction, GridEngine, Status};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let engine = GridEngine::classic();
//! let mut rng = StdRng::seed_from_u64(42);
//! let s0 = engine.new_game(&mut rng);
//! assert_eq!(s0.grid.count_empty(), 14);
//! let s1 = engine.apply_move(s0, Direction::Left, &mut rng);
//! assert_eq!(s1.status, Status::Continue);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod display;
mod grid;
mod rules;

pub use display::{DisplayCell, DisplayGrid};
pub use grid::{Cell, Fuse, Grid, GridError, Tile, TileKind, MAX_TILE_VALUE, SUPPORTED_SIZES};
pub use rules::{
    EngineState, GridEngine, LossReason, Status, Variant, BOMB_SIZE, BOMB_TARGET, CLASSIC_SIZE,
    CLASSIC_TARGET,
};

/// A direction to move/merge tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Fixed search and tie-break order.
    pub const ALL: [Direction; 4] = [Direction::Left, Direction::Right, Direction::Up, Direction::Down];

    /// Grid transforms that turn this move into a left move: (transpose, mirror).
    #[inline]
    pub(crate) fn transform(self) -> (bool, bool) {
        match self {
            Direction::Left => (false, false),
            Direction::Right => (false, true),
            Direction::Up => (true, false),
            Direction::Down => (true, true),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized direction {0:?}")]
pub struct ParseDirectionError(pub String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(ParseDirectionError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_direction_tokens() {
        for dir in Direction::ALL {
            assert_eq!(dir.as_str().parse::<Direction>(), Ok(dir));
        }
        assert_eq!("diagonal".parse::<Direction>(), Err(ParseDirectionError("diagonal".into())));
        assert!("Left".parse::<Direction>().is_err());
    }
}
