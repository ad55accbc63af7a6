//! Synthetic acquisitions: exact non-uniform DFT, numerical phantoms and
//! smooth coil profiles.

use ndarray::{Array3, ArrayView2, Axis};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use crate::error::ReconError;
use crate::index::centred;
use crate::sensitivity::CoilSensitivityMaps;
use crate::trajectory::{RawData, Trajectory};
use crate::types::{lit, Float, ImageData, KspaceData, Real, C};

/// `y_c(k) = Σ_n S_c(n) x(n) e^{-2πi k·n}`, evaluated directly (no gridding),
/// with pixel positions `n` measured from the image centre.
pub fn nudft<T: Real>(image: ArrayView2<C<T>>, maps: &CoilSensitivityMaps<T>, trajectory: &Trajectory<T>) -> Result<RawData<T>, ReconError> {
    let (ny, nx) = image.dim();
    let n = maps.image_dim();
    if (ny, nx) != (n, n) {
        return Err(ReconError::shape_mismatch("phantom vs sensitivity maps", (n, n), (ny, nx)));
    }
    // Only pixels with signal contribute: point sources are cheap
    let pixels: Vec<(T, T, Vec<C<T>>)> = image.indexed_iter()
        .filter(|(_, v)| **v != C::new(T::zero(), T::zero()))
        .map(|((iy, ix), &v)| {
            let coil_values = (0..maps.coils()).map(|c| maps.coil(c)[[iy, ix]] * v).collect();
            (lit(centred(ix, n) as f64), lit(centred(iy, n) as f64), coil_values)
        })
        .collect();
    let two_pi = lit::<T>(2.0) * T::PI();
    let points: Vec<[T; 2]> = trajectory.points().collect();
    let per_sample: Vec<Vec<C<T>>> = points.par_iter()
        .map(|&[kx, ky]| {
            let mut sums = vec![C::new(T::zero(), T::zero()); maps.coils()];
            for (x, y, values) in &pixels {
                let phase = C::from_polar(T::one(), -two_pi * (kx * *x + ky * *y));
                for (sum, &v) in sums.iter_mut().zip(values) { *sum = *sum + v * phase }
            }
            sums
        })
        .collect();
    let mut samples = KspaceData::zeros((maps.coils(), trajectory.projections(), trajectory.reads()));
    for (c, mut coil) in samples.outer_iter_mut().enumerate() {
        coil.iter_mut().zip(&per_sample).for_each(|(y, sums)| *y = sums[c]);
    }
    Ok(RawData::new(samples))
}

/// A single bright pixel at `[iy, ix]`
pub fn point_source<T: Real>(n: usize, [iy, ix]: [usize; 2], amplitude: T) -> ImageData<T> {
    let mut image = ImageData::zeros((n, n));
    image[[iy, ix]] = C::new(amplitude, T::zero());
    image
}

/// Uniform disc of `radius` pixels about the image centre
pub fn disc<T: Real>(n: usize, radius: f64) -> ImageData<T> {
    ImageData::from_shape_fn((n, n), |(iy, ix)| {
        let r = (centred(ix, n) as f64).hypot(centred(iy, n) as f64);
        if r <= radius { C::new(T::one(), T::zero()) } else { C::new(T::zero(), T::zero()) }
    })
}

/// Gaussian receive profiles centred around a ring outside the middle of the
/// image, each with its own constant phase plus a gentle phase ramp.
pub fn coil_profiles<T: Real>(coils: usize, n: usize) -> Array3<C<T>> {
    let ring  = 0.6 * n as f64 / 2.0;
    let sigma = n as f64 / 2.0;
    let mut maps = Array3::zeros((coils, n, n));
    for (c, mut map) in maps.axis_iter_mut(Axis(0)).enumerate() {
        let angle = 2.0 * std::f64::consts::PI * c as f64 / coils as f64;
        let (cx, cy) = (ring * angle.cos(), ring * angle.sin());
        for ((iy, ix), s) in map.indexed_iter_mut() {
            let (x, y) = (centred(ix, n) as f64, centred(iy, n) as f64);
            let d2 = (x - cx).powi(2) + (y - cy).powi(2);
            let magnitude = (-d2 / (2.0 * sigma * sigma)).exp();
            let phase = angle + 0.05 * (x + y);
            *s = C::from_polar(lit(magnitude), lit(phase));
        }
    }
    maps
}

/// Add white complex Gaussian noise of standard deviation `sigma` (per real
/// component), reproducibly.
pub fn add_noise<T: Real>(raw: RawData<T>, sigma: f64, seed: u64) -> RawData<T> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let Ok(normal) = Normal::new(0.0, sigma) else { return raw };
    let mut samples = raw.into_inner();
    samples.mapv_inplace(|z| z + C::new(lit(normal.sample(&mut rng)), lit(normal.sample(&mut rng))));
    RawData::new(samples)
}

/// Relative L2 error `‖a - b‖ / ‖b‖`
pub fn relative_error<T: Real>(a: ArrayView2<C<T>>, b: ArrayView2<C<T>>) -> T {
    let diff: T = a.iter().zip(b.iter()).map(|(x, y)| (x - y).norm_sqr()).sum();
    let norm: T = b.iter().map(|y| y.norm_sqr()).sum();
    Float::sqrt(diff / norm)
}
