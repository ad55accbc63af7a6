//! Gridding: the sparse convolution structure linking non-uniform k-space
//! samples to an oversampled Cartesian grid, and the non-uniform FFT built on
//! top of it.
//!
//! Conventions:
//!
//! + The image is `N × N`, indexed `[iy, ix]`, with its centre (pixel `N/2`)
//!   at the origin.
//!
//! + The grid is `G × G`, `G ≥ N` even, stored flat and row-major (`gy * G +
//!   gx`) in DFT order: zero frequency at index 0, negative frequencies
//!   wrapped to the end. `kx` runs along grid columns, `ky` along rows.
//!
//! + A sample at normalized position `k` sits at `G k` grid cells from the
//!   origin.
//!
//! With these conventions `forward` evaluates, to within the kernel's
//! interpolation error, the non-uniform DFT `y_j = Σ_n x_n e^{-2πi k_j·n}`,
//! and `adjoint` is its exact adjoint.

use itertools::iproduct;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{ConfigError, ReconError};
use crate::fft::Fft2;
use crate::index::{image_to_grid, index2_to_1, wrap};
use crate::kernel::KaiserBessel;
use crate::trajectory::Trajectory;
use crate::types::{count, ImageData, Real, C};

/// Sizes of the final image and of the oversampled grid
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridGeometry {
    pub image_dim: usize,
    pub grid_dim: usize,
    pub overgridding: f64,
}

impl GridGeometry {

    /// The grid has `ceil(image_dim * overgridding)` cells per side, rounded up
    /// to the next even number.
    pub fn new(image_dim: usize, overgridding: f64) -> Result<Self, ConfigError> {
        if image_dim < 2 { return Err(ConfigError::ImageTooSmall(image_dim)) }
        if !overgridding.is_finite() || overgridding < 1.0 {
            return Err(ConfigError::InvalidOvergridding(overgridding))
        }
        let grid_dim = (image_dim as f64 * overgridding).ceil() as usize;
        let grid_dim = grid_dim + grid_dim % 2;
        Ok(Self { image_dim, grid_dim, overgridding })
    }

    pub fn image_shape(&self) -> (usize, usize) { (self.image_dim, self.image_dim) }
    pub fn grid_len   (&self) -> usize          { self.grid_dim * self.grid_dim }

    /// Flat grid index of image pixel `[iy, ix]`
    #[inline]
    pub fn grid_index(&self, [iy, ix]: [usize; 2]) -> usize {
        let [n, g] = [self.image_dim, self.grid_dim];
        index2_to_1([image_to_grid(iy, n, g), image_to_grid(ix, n, g)], [g, g])
    }
}

/// Precomputed gridding structure for one trajectory. Immutable once built:
/// shared by reference between all coils and all solver iterations.
#[derive(Clone, Debug)]
pub struct Gridding<T: Real> {
    geometry: GridGeometry,
    fft: Fft2<T>,
    // Compressed sparse rows: the neighbourhood of sample `j` is
    // `cells[offsets[j]..offsets[j+1]]`, with matching `weights`
    offsets: Vec<usize>,
    cells: Vec<usize>,
    weights: Vec<T>,
    deapodization: Array2<T>,
}

impl<T: Real> Gridding<T> {

    pub fn new(trajectory: &Trajectory<T>, geometry: GridGeometry, kernel_width: usize) -> Result<Self, ReconError> {
        let g = geometry.grid_dim;
        if kernel_width == 0 || kernel_width > g {
            return Err(ConfigError::InvalidKernelWidth { width: kernel_width, max: g }.into())
        }
        let kernel = KaiserBessel::new(kernel_width, geometry.overgridding);
        let mut offsets = Vec::with_capacity(trajectory.len() + 1);
        let mut cells   = Vec::with_capacity(trajectory.len() * (kernel_width + 1).pow(2));
        let mut weights = Vec::with_capacity(cells.capacity());
        offsets.push(0);
        for [kx, ky] in trajectory.points() {
            neighbourhood(&kernel, g, [kx, ky], |cell, w| { cells.push(cell); weights.push(w) });
            offsets.push(cells.len());
        }
        let fft = Fft2::new(g);
        let deapodization = deapodization(&kernel, &fft, geometry)?;
        debug!("gridding: {} samples, {} grid, {} kernel entries, β = {}",
               trajectory.len(), g, cells.len(), kernel.beta());
        Ok(Self { geometry, fft, offsets, cells, weights, deapodization })
    }

    pub fn geometry(&self) -> GridGeometry { self.geometry }
    pub fn samples (&self) -> usize { self.offsets.len() - 1 }

    /// Per-pixel rolloff of the kernel over the cropped image
    pub fn deapodization(&self) -> ArrayView2<T> { self.deapodization.view() }

    #[inline]
    fn neighbours(&self, j: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.offsets[j]..self.offsets[j + 1];
        self.cells[range.clone()].iter().copied().zip(self.weights[range].iter().copied())
    }

    /// Accumulate `samples` (in trajectory order) onto `grid`
    pub fn spread(&self, samples: impl IntoIterator<Item = C<T>>, grid: &mut [C<T>]) {
        debug_assert_eq!(grid.len(), self.geometry.grid_len());
        for (j, sample) in samples.into_iter().enumerate() {
            for (cell, w) in self.neighbours(j) {
                grid[cell] = grid[cell] + sample * w;
            }
        }
    }

    /// Interpolate `grid` at every sample position, in trajectory order
    pub fn interpolate<'g>(&'g self, grid: &'g [C<T>]) -> impl Iterator<Item = C<T>> + 'g {
        (0..self.samples()).map(move |j| {
            self.neighbours(j).fold(C::new(T::zero(), T::zero()), |acc, (cell, w)| acc + grid[cell] * w)
        })
    }

    /// Real-valued spreading, parallelized over samples with one grid per
    /// thread
    pub fn spread_real(&self, values: &[T]) -> Vec<T> {
        let len = self.geometry.grid_len();
        let empty_grid = || vec![T::zero(); len];
        let add_grids = |mut a: Vec<T>, b: Vec<T>| {
            a.iter_mut().zip(b.iter()).for_each(|(a, &b)| *a = *a + b);
            a
        };
        values.par_iter()
            .enumerate()
            .fold(empty_grid, |mut grid, (j, &v)| {
                for (cell, w) in self.neighbours(j) { grid[cell] = grid[cell] + v * w }
                grid
            })
            .reduce(empty_grid, add_grids)
    }

    pub fn interpolate_real(&self, grid: &[T]) -> Vec<T> {
        (0..self.samples()).into_par_iter()
            .map(|j| self.neighbours(j).fold(T::zero(), |acc, (cell, w)| acc + grid[cell] * w))
            .collect()
    }

    /// Non-uniform FFT: `image → samples`, in trajectory order.
    pub fn forward(&self, image: ArrayView2<C<T>>) -> Vec<C<T>> {
        let mut grid = vec![C::new(T::zero(), T::zero()); self.geometry.grid_len()];
        // ---- deapodize and zero-pad --------------------------------------
        for ((iy, ix), &v) in image.indexed_iter() {
            grid[self.geometry.grid_index([iy, ix])] = v / self.deapodization[[iy, ix]];
        }
        self.fft.forward(&mut grid);
        self.interpolate(&grid).collect()
    }

    /// Adjoint non-uniform FFT: `samples → image`.
    pub fn adjoint(&self, samples: impl IntoIterator<Item = C<T>>) -> ImageData<T> {
        let mut grid = vec![C::new(T::zero(), T::zero()); self.geometry.grid_len()];
        self.spread(samples, &mut grid);
        self.fft.inverse(&mut grid);
        // ---- crop and deapodize ------------------------------------------
        ImageData::from_shape_fn(self.geometry.image_shape(), |(iy, ix)| {
            grid[self.geometry.grid_index([iy, ix])] / self.deapodization[[iy, ix]]
        })
    }
}

/// Visit the grid cells (wrapped, flat) within the kernel footprint of the
/// sample at `[kx, ky]`, together with the separable kernel weight.
fn neighbourhood<T: Real>(kernel: &KaiserBessel<T>, g: usize, [kx, ky]: [T; 2], mut visit: impl FnMut(usize, T)) {
    let gt = count::<T>(g);
    let xs: Vec<_> = kernel.footprint(gt * kx).collect();
    for ((my, wy), &(mx, wx)) in iproduct!(kernel.footprint(gt * ky), &xs) {
        visit(index2_to_1([wrap(my, g), wrap(mx, g)], [g, g]), wy * wx);
    }
}

/// The kernel's rolloff over the image, obtained by gridding a unit sample at
/// the k-space origin and inverse-transforming it with the very same FFT that
/// the adjoint uses. This makes on-grid samples exact.
fn deapodization<T: Real>(kernel: &KaiserBessel<T>, fft: &Fft2<T>, geometry: GridGeometry) -> Result<Array2<T>, ConfigError> {
    let mut grid = vec![C::new(T::zero(), T::zero()); geometry.grid_len()];
    neighbourhood(kernel, geometry.grid_dim, [T::zero(), T::zero()], |cell, w| grid[cell].re = grid[cell].re + w);
    fft.inverse(&mut grid);
    let d = Array2::from_shape_fn(geometry.image_shape(), |(iy, ix)| grid[geometry.grid_index([iy, ix])].re);
    let min = d.iter().copied().fold(T::infinity(), T::min);
    if !(min > T::zero()) {
        return Err(ConfigError::DegenerateDeapodization(min.to_f64().unwrap_or(f64::NAN)))
    }
    Ok(d)
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::SpokeOrdering;
    use crate::types::Coordinates;
    use float_eq::assert_float_eq;
    use rand::{Rng, SeedableRng};
    use rand_isaac::IsaacRng;
    use rstest::rstest;

    #[rstest(/**/ image_dim, overgridding, grid_dim,
             case(8  , 2.0  , 16),
             case(8  , 1.0  ,  8),
             case(7  , 1.0  ,  8),
             case(10 , 1.25 , 14),
             case(300, 1.706, 512),
    )]
    fn grid_geometry(image_dim: usize, overgridding: f64, grid_dim: usize) {
        assert_eq!(GridGeometry::new(image_dim, overgridding).unwrap().grid_dim, grid_dim);
    }

    #[test]
    fn geometry_rejects_bad_input() {
        assert!(matches!(GridGeometry::new(1, 2.0), Err(ConfigError::ImageTooSmall(1))));
        assert!(matches!(GridGeometry::new(8, 0.9), Err(ConfigError::InvalidOvergridding(_))));
    }

    #[test]
    fn image_centre_maps_to_grid_origin() {
        let g = GridGeometry::new(8, 2.0).unwrap();
        assert_eq!(g.grid_index([4, 4]), 0);
        assert_eq!(g.grid_index([4, 5]), 1);
        assert_eq!(g.grid_index([3, 4]), 15 * 16);
    }

    #[test]
    fn kernel_wider_than_grid_is_rejected() {
        let t = Trajectory::<f64>::radial(2, 4, SpokeOrdering::Uniform).unwrap();
        let geometry = GridGeometry::new(2, 1.0).unwrap();
        let result = Gridding::new(&t, geometry, 3);
        assert!(matches!(result, Err(ReconError::Config(ConfigError::InvalidKernelWidth { width: 3, max: 2 }))));
    }

    fn random_samples(n: usize, rng: &mut IsaacRng) -> Vec<C<f64>> {
        (0..n).map(|_| C::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))).collect()
    }

    #[test]
    fn forward_and_adjoint_are_adjoint() {
        let mut rng = IsaacRng::seed_from_u64(1);
        let t = Trajectory::<f64>::radial(13, 24, SpokeOrdering::GoldenAngle).unwrap();
        let gridding = Gridding::new(&t, GridGeometry::new(12, 1.5).unwrap(), 4).unwrap();
        let x = ImageData::from_shape_vec((12, 12), random_samples(144, &mut rng)).unwrap();
        let y = random_samples(t.len(), &mut rng);
        let ax = gridding.forward(x.view());
        let ahy = gridding.adjoint(y.iter().copied());
        let lhs = numeric::dot(&ax, &y);
        let rhs = numeric::dot(x.as_slice().unwrap(), ahy.as_slice().unwrap());
        let scale = numeric::norm_sqr(&ax).sqrt() * numeric::norm_sqr(&y).sqrt();
        assert_float_eq!((lhs - rhs).norm() / scale, 0.0, abs <= 1e-12);
    }

    #[test]
    fn on_grid_samples_are_exact() {
        // Samples exactly on grid nodes (k = m/G): the gridding error vanishes
        // because deapodization is the discrete transform of the same kernel
        let (n, g) = (6, 12);
        let mut k = Coordinates::<f64>::zeros((3, 1, 2));
        for (p, [mx, my]) in [[0, 0], [1, -2], [-5, 3]].into_iter().enumerate() {
            k[[p, 0, 0]] = mx as f64 / g as f64;
            k[[p, 0, 1]] = my as f64 / g as f64;
        }
        let t = Trajectory::new(k).unwrap();
        let gridding = Gridding::new(&t, GridGeometry::new(n, 2.0).unwrap(), 5).unwrap();
        let mut rng = IsaacRng::seed_from_u64(2);
        let x = ImageData::from_shape_vec((n, n), random_samples(n * n, &mut rng)).unwrap();
        let y = gridding.forward(x.view());
        for (j, [kx, ky]) in t.points().enumerate() {
            let mut want = C::new(0.0, 0.0);
            for ((iy, ix), &v) in x.indexed_iter() {
                let [dy, dx] = [iy as f64 - (n / 2) as f64, ix as f64 - (n / 2) as f64];
                want += v * C::from_polar(1.0, -2.0 * std::f64::consts::PI * (kx * dx + ky * dy));
            }
            assert_float_eq!(y[j].re, want.re, abs <= 1e-10);
            assert_float_eq!(y[j].im, want.im, abs <= 1e-10);
        }
    }

    #[test]
    fn deapodization_is_positive_and_peaks_at_centre() {
        let t = Trajectory::<f32>::radial(4, 16, SpokeOrdering::Uniform).unwrap();
        let gridding = Gridding::new(&t, GridGeometry::new(8, 2.0).unwrap(), 5).unwrap();
        let d = gridding.deapodization();
        assert!(d.iter().all(|&v| v > 0.0));
        let centre = d[[4, 4]];
        assert!(d.iter().all(|&v| v <= centre));
    }

    #[test]
    fn real_spreading_agrees_with_complex() {
        let t = Trajectory::<f64>::radial(5, 10, SpokeOrdering::GoldenAngle).unwrap();
        let gridding = Gridding::new(&t, GridGeometry::new(5, 2.0).unwrap(), 3).unwrap();
        let values: Vec<f64> = (0..t.len()).map(|j| j as f64 * 0.1).collect();
        let real = gridding.spread_real(&values);
        let mut complex = vec![C::new(0.0, 0.0); real.len()];
        gridding.spread(values.iter().map(|&v| C::new(v, 0.0)), &mut complex);
        for (r, c) in real.iter().zip(&complex) {
            assert_float_eq!(*r, c.re, abs <= 1e-12);
        }
        let back = gridding.interpolate_real(&real);
        let back_c: Vec<_> = gridding.interpolate(&complex).collect();
        for (r, c) in back.iter().zip(&back_c) {
            assert_float_eq!(*r, c.re, abs <= 1e-12);
        }
    }
}
