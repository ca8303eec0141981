//! Cell-state grid and seeding
//!
//! A fixed-size 2-D byte grid, row-major. Cells are two-valued during
//! simulation ([`DEAD`] or [`ALIVE`]); the byte representation doubles as an
//! intensity channel when the display expands cells to RGBA.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ConfigError, SizeError};
use crate::pattern::Pattern;

/// Byte value of a dead cell.
pub const DEAD: u8 = 0;
/// Byte value of a live cell.
pub const ALIVE: u8 = 255;

/// A width x height cell-state container.
///
/// Dimensions are fixed for the lifetime of the simulation. A generation
/// step never mutates a grid in place; the stepper writes a complete next
/// generation into a second grid and the owner swaps roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<u8>,
}

impl Grid {
    /// Create an all-dead grid. Zero dimensions are rejected.
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroDimension { width, height });
        }
        Ok(Self {
            width,
            height,
            cells: vec![DEAD; width as usize * height as usize],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells (width * height).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y * self.width + x) as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.cells[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, state: u8) {
        let i = self.index(x, y);
        self.cells[i] = state;
    }

    /// Raw cell bytes, row-major.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Mutable cell bytes, for bulk writes (device readback, steppers).
    pub fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    /// Overwrite every cell from a slice of the same length.
    pub fn copy_from_slice(&mut self, src: &[u8]) {
        self.cells.copy_from_slice(src);
    }

    /// Kill every cell.
    pub fn clear(&mut self) {
        self.cells.fill(DEAD);
    }

    /// Count of live cells, for logging and tests.
    pub fn population(&self) -> usize {
        self.cells.iter().filter(|&&c| c != DEAD).count()
    }

    /// Fill every cell ALIVE with independent probability `density`.
    ///
    /// The RNG is seeded explicitly so `reset` can reproduce the initial
    /// population bit-identically.
    pub fn seed_random(&mut self, density: f64, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for cell in self.cells.iter_mut() {
            *cell = if rng.random_bool(density) { ALIVE } else { DEAD };
        }
    }

    /// Place a parsed pattern, clearing everything else.
    ///
    /// With `origin == None` the pattern is centered. Fails with
    /// [`SizeError`] when the pattern's bounding box exceeds the board;
    /// nothing is written in that case.
    pub fn seed_pattern(
        &mut self,
        pattern: &Pattern,
        origin: Option<(u32, u32)>,
    ) -> Result<(), SizeError> {
        let (pw, ph) = (pattern.width(), pattern.height());
        if pw > self.width || ph > self.height {
            return Err(SizeError {
                pattern: (pw, ph),
                board: (self.width, self.height),
            });
        }
        let (ox, oy) = origin.unwrap_or(((self.width - pw) / 2, (self.height - ph) / 2));
        if ox + pw > self.width || oy + ph > self.height {
            return Err(SizeError {
                pattern: (pw, ph),
                board: (self.width, self.height),
            });
        }

        self.clear();
        for y in 0..ph {
            for x in 0..pw {
                self.set(ox + x, oy + y, pattern.get(x, y));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            Grid::new(0, 10),
            Err(ConfigError::ZeroDimension { .. })
        ));
        assert!(matches!(
            Grid::new(10, 0),
            Err(ConfigError::ZeroDimension { .. })
        ));
    }

    #[test]
    fn starts_dead() {
        let grid = Grid::new(4, 3).unwrap();
        assert_eq!(grid.len(), 12);
        assert_eq!(grid.population(), 0);
    }

    #[test]
    fn random_seed_is_reproducible() {
        let mut a = Grid::new(64, 64).unwrap();
        let mut b = Grid::new(64, 64).unwrap();
        a.seed_random(0.3, 123);
        b.seed_random(0.3, 123);
        assert_eq!(a, b);
        assert!(a.population() > 0);

        b.seed_random(0.3, 124);
        assert_ne!(a, b);
    }

    #[test]
    fn density_extremes() {
        let mut grid = Grid::new(16, 16).unwrap();
        grid.seed_random(1.0, 7);
        assert_eq!(grid.population(), grid.len());
        grid.seed_random(0.0, 7);
        assert_eq!(grid.population(), 0);
    }

    #[test]
    fn pattern_is_centered() {
        let pattern = Pattern::from_cells(2, 2, vec![ALIVE, ALIVE, ALIVE, ALIVE]);
        let mut grid = Grid::new(6, 6).unwrap();
        grid.seed_pattern(&pattern, None).unwrap();
        assert_eq!(grid.population(), 4);
        assert_eq!(grid.get(2, 2), ALIVE);
        assert_eq!(grid.get(3, 3), ALIVE);
        assert_eq!(grid.get(1, 1), DEAD);
    }

    #[test]
    fn oversized_pattern_is_rejected_without_truncation() {
        let pattern = Pattern::from_cells(8, 8, vec![ALIVE; 64]);
        let mut grid = Grid::new(6, 6).unwrap();
        grid.set(0, 0, ALIVE);
        let err = grid.seed_pattern(&pattern, None).unwrap_err();
        assert_eq!(err.pattern, (8, 8));
        assert_eq!(err.board, (6, 6));
        // The failed seeding wrote nothing.
        assert_eq!(grid.get(0, 0), ALIVE);
        assert_eq!(grid.population(), 1);
    }

    #[test]
    fn offset_past_edge_is_rejected() {
        let pattern = Pattern::from_cells(3, 3, vec![ALIVE; 9]);
        let mut grid = Grid::new(8, 8).unwrap();
        assert!(grid.seed_pattern(&pattern, Some((6, 0))).is_err());
        assert!(grid.seed_pattern(&pattern, Some((5, 5))).is_ok());
    }
}
