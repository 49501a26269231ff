use crate::engine::Grid;

/// Gradient that rewards stacking large tiles in the top-left corner.
const WEIGHTS: [[f64; 4]; 4] = [
    [4096.0, 1024.0, 256.0, 64.0],
    [16.0, 32.0, 64.0, 128.0],
    [8.0, 4.0, 2.0, 1.0],
    [0.0, 0.0, 0.0, 0.0],
];

/// Positional weighted sum plus a bonus per empty cell.
///
/// Only the top-left 4×4 block is weighted; empty cells count across the
/// whole grid.
pub(crate) fn evaluate(grid: &Grid, empty_bonus: f64) -> f64 {
    let span = grid.size().min(4);
    let mut score = 0.0;
    for (r, weights) in WEIGHTS.iter().enumerate().take(span) {
        for (c, &w) in weights.iter().enumerate().take(span) {
            score += grid.value_at(r, c) as f64 * w;
        }
    }
    score + grid.count_empty() as f64 * empty_bonus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_weights_corner_and_empties() {
        let g = Grid::from_rows(&[vec![2, 0, 0, 0], vec![0; 4], vec![0; 4], vec![0, 0, 0, 4]]).unwrap();
        assert_eq!(evaluate(&g, 1000.0), 2.0 * 4096.0 + 14.0 * 1000.0);
        let g = Grid::from_rows(&[vec![0, 0, 0, 2], vec![0; 4], vec![0; 4], vec![0, 0, 0, 4]]).unwrap();
        assert_eq!(evaluate(&g, 0.0), 2.0 * 64.0);
    }
}
