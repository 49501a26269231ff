use serde::{Deserialize, Serialize};

use super::grid::{Grid, TileKind};

/// One cell as sent to clients.
///
/// Classic boards use plain values (`0` = empty). Bomb-variant tiles carry a
/// countdown relative to the moment of projection; the stored grid keeps the
/// absolute deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayCell {
    Value(u32),
    Tile {
        value: u32,
        kind: TileKind,
        #[serde(rename = "remainingMs")]
        remaining_ms: u64,
        #[serde(rename = "maxMs")]
        max_ms: u64,
    },
}

pub type DisplayGrid = Vec<Vec<DisplayCell>>;

pub(crate) fn plain(grid: &Grid) -> DisplayGrid {
    grid.rows()
        .map(|row| row.iter().map(|c| DisplayCell::Value(c.map_or(0, |t| t.value()))).collect())
        .collect()
}

pub(crate) fn with_countdowns(grid: &Grid, now_ms: u64) -> DisplayGrid {
    grid.rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    None => DisplayCell::Value(0),
                    Some(tile) => {
                        let (remaining_ms, max_ms) = tile
                            .fuse()
                            .map_or((0, 0), |f| (f.remaining_ms(now_ms), f.max_ms));
                        DisplayCell::Tile { value: tile.value(), kind: tile.kind(), remaining_ms, max_ms }
                    }
                })
                .collect()
        })
        .collect()
}
