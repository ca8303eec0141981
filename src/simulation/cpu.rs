//! CPU reference stepper
//!
//! Single-threaded full-grid pass. This is the semantic reference the
//! compute kernel must match bit-for-bit: 8-neighborhood counts on a finite
//! board, neighbors outside the grid count as dead (zero padding, never
//! wrapping), next state looked up in the rule set.

use std::time::Instant;

use crate::grid::{Grid, DEAD};
use crate::rules::RuleSet;
use crate::simulation::stepper::StepReport;

/// The single-threaded stepper.
///
/// `step` is a pure function of the read grid and the rules; the struct
/// exists so the controller can hold it as one arm of its stepper selection.
#[derive(Debug, Default)]
pub struct CpuStepper;

impl CpuStepper {
    pub fn new() -> Self {
        Self
    }

    /// Advance one generation from `read` into `write`.
    ///
    /// The two grids must have identical dimensions and must be distinct
    /// buffers (the borrow checker enforces the latter). Every cell of
    /// `write` is produced from `read` alone, so the step is atomic with
    /// respect to the generation it produces.
    pub fn step(&mut self, read: &Grid, write: &mut Grid, rules: &RuleSet) -> StepReport {
        debug_assert_eq!(read.width(), write.width());
        debug_assert_eq!(read.height(), write.height());

        let start = Instant::now();
        let (w, h) = (read.width(), read.height());
        for y in 0..h {
            for x in 0..w {
                let n = live_neighbors(read, x, y);
                write.set(x, y, rules.next_state(read.get(x, y), n));
            }
        }
        StepReport::host(start.elapsed().as_secs_f64() * 1e3)
    }
}

/// Count live cells in the 8-neighborhood of (x, y).
///
/// Boundary cells have fewer than 8 in-grid neighbors; the missing ones
/// count as dead. Some earlier revisions of this demo skipped the edge
/// rows entirely, which is not standard finite-board Life and is not
/// reproduced here.
#[inline]
fn live_neighbors(grid: &Grid, x: u32, y: u32) -> u8 {
    let (w, h) = (grid.width() as i64, grid.height() as i64);
    let mut count = 0u8;
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx >= 0 && ny >= 0 && nx < w && ny < h && grid.get(nx as u32, ny as u32) != DEAD {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ALIVE;

    fn grid_from(rows: &[&str]) -> Grid {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        let mut grid = Grid::new(w, h).unwrap();
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == 'o' {
                    grid.set(x as u32, y as u32, ALIVE);
                }
            }
        }
        grid
    }

    fn step_once(grid: &Grid) -> Grid {
        let mut next = Grid::new(grid.width(), grid.height()).unwrap();
        CpuStepper::new().step(grid, &mut next, &RuleSet::conway());
        next
    }

    #[test]
    fn dead_grid_stays_dead() {
        let grid = Grid::new(16, 16).unwrap();
        let next = step_once(&grid);
        assert_eq!(next.population(), 0);
    }

    #[test]
    fn block_is_a_still_life() {
        let grid = grid_from(&[
            "....", //
            ".oo.", //
            ".oo.", //
            "....",
        ]);
        assert_eq!(step_once(&grid), grid);
    }

    #[test]
    fn blinker_oscillates_with_period_two() {
        let horizontal = grid_from(&[
            ".....", //
            ".....", //
            ".ooo.", //
            ".....", //
            ".....",
        ]);
        let vertical = grid_from(&[
            ".....", //
            "..o..", //
            "..o..", //
            "..o..", //
            ".....",
        ]);
        let after_one = step_once(&horizontal);
        assert_eq!(after_one, vertical);
        assert_eq!(step_once(&after_one), horizontal);
    }

    #[test]
    fn glider_translates_by_one_one_after_four_generations() {
        let mut grid = grid_from(&[
            ".o........", //
            "..o.......", //
            "ooo.......", //
            "..........", //
            "..........", //
            "..........", //
            "..........", //
            "..........", //
            "..........", //
            "..........",
        ]);
        let start = grid.clone();
        for _ in 0..4 {
            grid = step_once(&grid);
        }
        // Same shape shifted by (1, 1).
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                let expected = if x >= 1 && y >= 1 {
                    start.get(x - 1, y - 1)
                } else {
                    DEAD
                };
                assert_eq!(grid.get(x, y), expected, "cell ({x}, {y})");
            }
        }
    }

    #[test]
    fn boundary_neighbors_count_as_dead() {
        // A corner cell with two live in-grid neighbors survives under zero
        // padding; its off-grid neighbors never count.
        let grid = grid_from(&[
            "oo..", //
            "o...", //
            "....", //
            "....",
        ]);
        assert_eq!(live_neighbors(&grid, 0, 0), 2);
        let next = step_once(&grid);
        assert_eq!(next.get(0, 0), ALIVE);
        // The trio closes into a 2x2 block: (1,1) is born.
        assert_eq!(next.get(1, 1), ALIVE);
    }

    #[test]
    fn edge_row_is_updated_not_skipped() {
        // A blinker lying on the top edge must still toggle; revisions that
        // skipped edge rows would leave it frozen.
        let grid = grid_from(&[
            "ooo..", //
            ".....", //
            ".....",
        ]);
        let next = step_once(&grid);
        assert_eq!(next.get(1, 0), ALIVE);
        assert_eq!(next.get(1, 1), ALIVE);
        assert_eq!(next.get(0, 0), DEAD);
        assert_eq!(next.get(2, 0), DEAD);
        assert_eq!(next.population(), 2);
    }

    #[test]
    fn step_is_deterministic() {
        let mut grid = Grid::new(32, 32).unwrap();
        grid.seed_random(0.4, 99);
        let a = step_once(&grid);
        let b = step_once(&grid);
        assert_eq!(a, b);
    }
}
