use serde::{Deserialize, Serialize};

/// A flattened 2D matrix of squared per-type-pair cutoffs.
/// Access is O(1) via `index = i * N + j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutoffGrid {
    num_types: usize,
    /// Stores (cut_ij + skin)^2.
    /// We store squared values to avoid sqrt() calls inside pair loops.
    cut_sq: Vec<f64>,
    max_cut: f64,
}

impl CutoffGrid {
    /// Builds the grid from a symmetric cutoff lookup.
    /// `skin`: extra distance added on top of each cutoff (0 for force cutoffs).
    pub fn new<F>(num_types: usize, skin: f64, cutoff: F) -> Self
    where
        F: Fn(usize, usize) -> f64,
    {
        let mut grid = vec![0.0; num_types * num_types];
        let mut max_cut: f64 = 0.0;

        for i in 0..num_types {
            for j in 0..num_types {
                let cut = cutoff(i, j) + skin;
                max_cut = max_cut.max(cut);
                grid[i * num_types + j] = cut * cut;
            }
        }

        Self {
            num_types,
            cut_sq: grid,
            max_cut,
        }
    }

    /// Same cutoff for every type pair.
    pub fn uniform(num_types: usize, cut: f64) -> Self {
        Self::new(num_types, 0.0, |_, _| cut)
    }

    pub fn num_types(&self) -> usize {
        self.num_types
    }

    /// Returns the squared distance at or below which two types interact.
    #[inline(always)]
    pub fn get_cut_sq(&self, type_a: usize, type_b: usize) -> f64 {
        self.cut_sq[type_a * self.num_types + type_b]
    }

    /// Largest (unsquared) cutoff in the grid.
    pub fn max_cut(&self) -> f64 {
        self.max_cut
    }

    /// Same grid with `skin` added to every cutoff.
    pub fn with_skin(&self, skin: f64) -> Self {
        Self::new(self.num_types, skin, |i, j| self.get_cut_sq(i, j).sqrt())
    }
}
