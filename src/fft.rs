//! Planned, unnormalized 2D FFT over square grids stored row-major in flat
//! buffers.

use std::sync::Arc;

use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::types::{Real, C};

/// Forward (`e^{-2πi…}`) and inverse (`e^{+2πi…}`) transforms of an `n × n`
/// grid. Neither direction is normalized, so `inverse(forward(x)) = n² x`.
#[derive(Clone)]
pub struct Fft2<T: Real> {
    n: usize,
    forward: Arc<dyn Fft<T>>,
    inverse: Arc<dyn Fft<T>>,
}

impl<T: Real> std::fmt::Debug for Fft2<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2").field("n", &self.n).finish()
    }
}

impl<T: Real> Fft2<T> {

    pub fn new(n: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);
        Self { n, forward, inverse }
    }

    pub fn size(&self) -> usize { self.n }

    pub fn forward(&self, grid: &mut [C<T>]) { self.transform(&*self.forward, grid) }
    pub fn inverse(&self, grid: &mut [C<T>]) { self.transform(&*self.inverse, grid) }

    fn transform(&self, fft: &dyn Fft<T>, grid: &mut [C<T>]) {
        debug_assert_eq!(grid.len(), self.n * self.n);
        self.rows(fft, grid);
        transpose(grid, self.n);
        self.rows(fft, grid);
        transpose(grid, self.n);
    }

    fn rows(&self, fft: &dyn Fft<T>, grid: &mut [C<T>]) {
        let scratch_len = fft.get_inplace_scratch_len();
        grid.par_chunks_mut(self.n)
            .for_each_init(
                || vec![C::new(T::zero(), T::zero()); scratch_len],
                |scratch, row| fft.process_with_scratch(row, scratch),
            );
    }
}

/// In-place transpose of a square `n × n` row-major matrix
fn transpose<T: Copy>(grid: &mut [T], n: usize) {
    for row in 0..n {
        for col in row + 1..n {
            grid.swap(row * n + col, col * n + row);
        }
    }
}
