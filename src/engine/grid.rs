use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Grid sizes the engine knows how to play.
pub const SUPPORTED_SIZES: [usize; 2] = [4, 6];

/// Seconds of fuse granted per doubling above 8 (16 -> 30s, 32 -> 60s, ...).
const FUSE_STEP_MS: u64 = 30_000;

/// Largest tile a grid may hold. Two tiles of this value do not merge, so
/// merged values always fit in a `u32`.
pub const MAX_TILE_VALUE: u32 = 1 << 30;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("unsupported grid size {0}")]
    UnsupportedSize(usize),
    #[error("row {row} has {len} cells, expected {size}")]
    NotSquare { row: usize, len: usize, size: usize },
    #[error("invalid tile value {0}")]
    InvalidValue(u32),
    #[error("bomb tile without a deadline")]
    MissingFuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileKind {
    Normal,
    Bomb,
}

/// Absolute expiry of a bomb tile, in Unix milliseconds.
///
/// `max_ms` is the full lifetime granted at creation and only feeds countdown
/// displays; expiry is decided by `deadline_ms` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fuse {
    pub deadline_ms: u64,
    pub max_ms: u64,
}

impl Fuse {
    /// Fuse for a freshly merged tile of `value` created at `now_ms`.
    pub fn for_value(value: u32, now_ms: u64) -> Self {
        let factor = (value.trailing_zeros() as u64).saturating_sub(3);
        let max_ms = FUSE_STEP_MS * factor;
        Fuse { deadline_ms: now_ms + max_ms, max_ms }
    }

    #[inline]
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.deadline_ms.saturating_sub(now_ms)
    }

    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }
}

/// A non-empty cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    value: u32,
    fuse: Option<Fuse>,
}

impl Tile {
    #[inline]
    pub fn new(value: u32) -> Self {
        Tile { value, fuse: None }
    }

    #[inline]
    pub fn bomb(value: u32, fuse: Fuse) -> Self {
        Tile { value, fuse: Some(fuse) }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }

    #[inline]
    pub fn fuse(&self) -> Option<Fuse> {
        self.fuse
    }

    #[inline]
    pub fn kind(&self) -> TileKind {
        if self.fuse.is_some() { TileKind::Bomb } else { TileKind::Normal }
    }
}

pub type Cell = Option<Tile>;

/// Square grid of cells stored row-major.
///
/// Persisted form is a JSON matrix: normal tiles are plain integers (`0` for an
/// empty cell) and bomb tiles are objects carrying their absolute deadline, so
/// a reload never loses the countdown origin.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<StoredCell>>", into = "Vec<Vec<StoredCell>>")]
pub struct Grid {
    size: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// An empty `size`×`size` grid. Panics on a size outside [`SUPPORTED_SIZES`].
    pub fn empty(size: usize) -> Self {
        assert!(SUPPORTED_SIZES.contains(&size), "unsupported grid size {size}");
        Grid { size, cells: vec![None; size * size] }
    }

    /// Build a grid of normal tiles from a value matrix (`0` = empty).
    ///
    /// ```
    /// use duel_2048::engine::Grid;
    /// let g = Grid::from_rows(&[
    ///     vec![2, 0, 0, 0],
    ///     vec![2, 0, 0, 0],
    ///     vec![0, 0, 0, 0],
    ///     vec![0, 0, 0, 4],
    /// ]).unwrap();
    /// assert_eq!(g.count_empty(), 13);
    /// ```
    pub fn from_rows(rows: &[Vec<u32>]) -> Result<Self, GridError> {
        let stored = rows
            .iter()
            .map(|row| row.iter().map(|&v| StoredCell::Value(v)).collect())
            .collect::<Vec<Vec<_>>>();
        Grid::try_from(stored)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.cells[row * self.size + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        self.cells[row * self.size + col] = cell;
    }

    /// Tile value at a position, `0` when empty.
    #[inline]
    pub fn value_at(&self, row: usize, col: usize) -> u32 {
        self.get(row, col).map_or(0, |t| t.value())
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.size)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.cells.iter().flatten()
    }

    /// Value matrix (`0` = empty), dropping tile kinds.
    pub fn values(&self) -> Vec<Vec<u32>> {
        self.rows()
            .map(|row| row.iter().map(|c| c.map_or(0, |t| t.value())).collect())
            .collect()
    }

    pub fn count_empty(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    pub fn highest_value(&self) -> u32 {
        self.tiles().map(Tile::value).max().unwrap_or(0)
    }

    pub fn contains_value(&self, value: u32) -> bool {
        self.tiles().any(|t| t.value() == value)
    }

    /// True if any two horizontally or vertically adjacent tiles share a value.
    pub fn has_adjacent_pair(&self) -> bool {
        let n = self.size;
        for r in 0..n {
            for c in 0..n {
                let v = self.value_at(r, c);
                if v == 0 || v >= MAX_TILE_VALUE {
                    continue;
                }
                if c + 1 < n && self.value_at(r, c + 1) == v {
                    return true;
                }
                if r + 1 < n && self.value_at(r + 1, c) == v {
                    return true;
                }
            }
        }
        false
    }

    /// No empty cell and no merge available: no move can change this grid.
    pub fn is_stuck(&self) -> bool {
        self.count_empty() == 0 && !self.has_adjacent_pair()
    }

    /// True if some bomb's deadline has been reached at `now_ms`.
    pub fn has_expired_bomb(&self, now_ms: u64) -> bool {
        self.tiles().filter_map(Tile::fuse).any(|f| f.is_expired(now_ms))
    }

    /// Place a 2 (90%) or 4 (10%) uniformly among the empty cells.
    ///
    /// A full grid is returned unchanged.
    pub fn with_random_tile<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        let empty = self.count_empty();
        if empty == 0 {
            return self;
        }
        let index = rng.gen_range(0..empty);
        let value = generate_random_value(rng);
        if let Some(slot) = self.cells.iter_mut().filter(|c| c.is_none()).nth(index) {
            *slot = Some(Tile::new(value));
        }
        self
    }

    pub(crate) fn transposed(&self) -> Self {
        let n = self.size;
        let mut out = self.clone();
        for r in 0..n {
            for c in 0..n {
                out.cells[c * n + r] = self.cells[r * n + c];
            }
        }
        out
    }

    pub(crate) fn mirrored(&self) -> Self {
        let mut out = self.clone();
        for row in out.cells.chunks_mut(self.size) {
            row.reverse();
        }
        out
    }

    /// Canonical left move on every row: compress, merge, compress.
    ///
    /// `merged` builds the tile for each merge result and lets callers decide
    /// its kind. Returns the new grid and the sum of merged values.
    pub(crate) fn slide_left(&self, merged: &mut dyn FnMut(u32) -> Tile) -> (Self, u64) {
        let mut out = self.clone();
        let mut gained = 0;
        for row in out.cells.chunks_mut(self.size) {
            gained += slide_row_left(row, merged);
        }
        (out, gained)
    }
}

fn generate_random_value<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    if rng.gen_range(0..10) < 9 { 2 } else { 4 }
}

fn compress(row: &mut [Cell]) {
    let mut pos = 0;
    for idx in 0..row.len() {
        if let Some(tile) = row[idx].take() {
            row[pos] = Some(tile);
            pos += 1;
        }
    }
}

fn slide_row_left(row: &mut [Cell], merged: &mut dyn FnMut(u32) -> Tile) -> u64 {
    compress(row);
    let mut gained = 0;
    for idx in 0..row.len().saturating_sub(1) {
        if let (Some(a), Some(b)) = (row[idx], row[idx + 1]) {
            if a.value() == b.value() && a.value() < MAX_TILE_VALUE {
                let value = a.value() * 2;
                row[idx] = Some(merged(value));
                row[idx + 1] = None;
                gained += value as u64;
            }
        }
    }
    compress(row);
    gained
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid{:?}", self.values())
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(self.size * 8);
        writeln!(f)?;
        for (i, row) in self.rows().enumerate() {
            if i > 0 {
                writeln!(f, "{rule}")?;
            }
            let line: Vec<String> = row.iter().map(format_cell).collect();
            writeln!(f, "{}", line.join("|"))?;
        }
        Ok(())
    }
}

fn format_cell(cell: &Cell) -> String {
    match cell {
        None => " ".repeat(7),
        Some(tile) => {
            let mark = if tile.kind() == TileKind::Bomb { "*" } else { "" };
            format!("{:^7}", format!("{}{}", tile.value(), mark))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredCell {
    Value(u32),
    Tile(StoredTile),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTile {
    value: u32,
    kind: TileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deadline_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_ms: Option<u64>,
}

fn check_value(value: u32) -> Result<u32, GridError> {
    if value == 1 || value > MAX_TILE_VALUE || !(value == 0 || value.is_power_of_two()) {
        return Err(GridError::InvalidValue(value));
    }
    Ok(value)
}

impl TryFrom<Vec<Vec<StoredCell>>> for Grid {
    type Error = GridError;

    fn try_from(rows: Vec<Vec<StoredCell>>) -> Result<Self, Self::Error> {
        let size = rows.len();
        if !SUPPORTED_SIZES.contains(&size) {
            return Err(GridError::UnsupportedSize(size));
        }
        let mut cells = Vec::with_capacity(size * size);
        for (row, stored) in rows.into_iter().enumerate() {
            if stored.len() != size {
                return Err(GridError::NotSquare { row, len: stored.len(), size });
            }
            for cell in stored {
                let cell = match cell {
                    StoredCell::Value(v) => match check_value(v)? {
                        0 => None,
                        v => Some(Tile::new(v)),
                    },
                    StoredCell::Tile(t) => {
                        let value = check_value(t.value)?;
                        if value == 0 {
                            return Err(GridError::InvalidValue(0));
                        }
                        match t.kind {
                            TileKind::Normal => Some(Tile::new(value)),
                            TileKind::Bomb => {
                                let deadline_ms = t.deadline_ms.ok_or(GridError::MissingFuse)?;
                                let max_ms = t.max_ms.unwrap_or(0);
                                Some(Tile::bomb(value, Fuse { deadline_ms, max_ms }))
                            }
                        }
                    }
                };
                cells.push(cell);
            }
        }
        Ok(Grid { size, cells })
    }
}

impl From<Grid> for Vec<Vec<StoredCell>> {
    fn from(grid: Grid) -> Self {
        grid.rows()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        None => StoredCell::Value(0),
                        Some(t) => match t.fuse() {
                            None => StoredCell::Value(t.value()),
                            Some(f) => StoredCell::Tile(StoredTile {
                                value: t.value(),
                                kind: TileKind::Bomb,
                                deadline_ms: Some(f.deadline_ms),
                                max_ms: Some(f.max_ms),
                            }),
                        },
                    })
                    .collect()
            })
            .collect()
    }
}
