//! Density compensation: per-sample weights correcting for the uneven
//! sampling density of non-Cartesian trajectories.

use ndarray::{Array2, ArrayView2, Zip};
use tracing::{debug, warn};

use crate::config::reco::DensityMethod;
use crate::error::ReconError;
use crate::gridding::Gridding;
use crate::trajectory::{RawData, Trajectory};
use crate::types::{count, lit, Float, KspaceData, Real, C};

/// Square roots of the density compensation weights, `[projection, read]`.
///
/// The square root is applied once to the data (`prescale`) and once inside
/// each direction of the imaging operator, which keeps the operator
/// self-adjoint.
#[derive(Clone, Debug)]
pub struct DensityWeights<T: Real> {
    sqrt_weights: Array2<T>,
}

/// Raw data which has been multiplied by the square root of the density
/// weights exactly once. Only `DensityWeights::prescale` can make one.
#[derive(Clone, Debug)]
pub struct WeightedKspace<T: Real>(KspaceData<T>);

impl<T: Real> WeightedKspace<T> {
    pub fn view(&self) -> ndarray::ArrayView3<C<T>> { self.0.view() }
    pub fn into_inner(self) -> KspaceData<T> { self.0 }
}

/// Settings of the density compensation step
#[derive(Clone, Copy, Debug)]
pub struct DensityCompensator {
    pub enabled: bool,
    pub method: DensityMethod,
    pub iterations: usize,
    pub floor: f64,
}

impl From<&crate::config::Config> for DensityCompensator {
    fn from(config: &crate::config::Config) -> Self {
        let d = config.density;
        Self { enabled: config.density_compensation, method: d.method, iterations: d.iterations, floor: d.floor }
    }
}

impl DensityCompensator {

    /// Weights depend on the trajectory alone. `gridding` is only used by the
    /// iterative method.
    pub fn weights<T: Real>(&self, trajectory: &Trajectory<T>, gridding: &Gridding<T>) -> Result<DensityWeights<T>, ReconError> {
        let shape = (trajectory.projections(), trajectory.reads());
        if !self.enabled {
            return Ok(DensityWeights { sqrt_weights: Array2::ones(shape) })
        }
        let raw = match self.method {
            DensityMethod::Analytic  => analytic(trajectory),
            DensityMethod::Iterative => iterative(gridding, self.iterations),
        };
        let weights = finalize(raw, lit(self.floor));
        let found = weights.len();
        let sqrt_weights = Array2::from_shape_vec(shape, weights)
            .map_err(|_| ReconError::shape_mismatch("gridding samples vs trajectory", shape, found))?;
        Ok(DensityWeights { sqrt_weights })
    }
}

/// Ramp filter for radial spokes, `w(k) = |k|`, except at the spoke centre
/// which gets the area of the disc of radius `Δ/2` shared by all spokes
/// instead of zero, `Δ = 1/reads` being the sample spacing along the spoke.
fn analytic<T: Real>(trajectory: &Trajectory<T>) -> Vec<T> {
    let spacing = T::one() / count(trajectory.reads());
    let half = spacing / lit(2.0);
    trajectory.radii()
        .map(|r| if r < half { spacing / lit(4.0) } else { r })
        .collect()
}

/// Fixed-point iteration `w ← w / |C Cᵀ w|` where `Cᵀ` spreads samples onto
/// the grid and `C` interpolates them back: at convergence the weighted
/// samples, convolved with the kernel, are flat.
fn iterative<T: Real>(gridding: &Gridding<T>, iterations: usize) -> Vec<T> {
    let tolerance: T = lit(1e-6);
    let mut w = vec![T::one(); gridding.samples()];
    for iteration in 1..=iterations {
        let grid = gridding.spread_real(&w);
        let density = gridding.interpolate_real(&grid);
        let mut change = T::zero();
        for (w, &d) in w.iter_mut().zip(density.iter()) {
            let d = Float::abs(d);
            if d > T::zero() {
                let next = *w / d;
                change = change.max(Float::abs(next - *w) / next);
                *w = next;
            }
        }
        debug!("density iteration {iteration}: max relative change {change}");
        if change < tolerance { break }
    }
    w
}

/// Normalize to a maximum of 1, clamp to `floor`, take square roots
fn finalize<T: Real>(mut weights: Vec<T>, floor: T) -> Vec<T> {
    let max = weights.iter().copied().filter(|w| w.is_finite()).fold(T::zero(), T::max);
    if max > T::zero() {
        weights.iter_mut().for_each(|w| *w = *w / max);
    }
    let mut clamped = 0;
    for w in weights.iter_mut() {
        if !(*w >= floor) { *w = floor; clamped += 1 }
    }
    if clamped > 0 {
        warn!("{clamped} density weights clamped to {floor}");
    }
    weights.into_iter().map(Float::sqrt).collect()
}

impl<T: Real> DensityWeights<T> {

    /// Uniform weights: no density compensation
    pub fn uniform(projections: usize, reads: usize) -> Self {
        Self { sqrt_weights: Array2::ones((projections, reads)) }
    }

    pub fn sqrt_weights(&self) -> ArrayView2<T> { self.sqrt_weights.view() }

    /// The weights themselves, `(√w)²`
    pub fn weights(&self) -> Array2<T> { self.sqrt_weights.mapv(|s| s * s) }

    /// Multiply `raw` by the square-root weights. This is the only place where
    /// data fed to the solver gets weighted.
    pub fn prescale(&self, raw: &RawData<T>) -> Result<WeightedKspace<T>, ReconError> {
        let expected = self.sqrt_weights.dim();
        let found = (raw.projections(), raw.reads());
        if expected != found {
            return Err(ReconError::shape_mismatch("density weights vs raw data", expected, found));
        }
        let mut data = raw.view().to_owned();
        for mut coil in data.outer_iter_mut() {
            Zip::from(&mut coil).and(&self.sqrt_weights).for_each(|d, &s| *d = *d * s);
        }
        Ok(WeightedKspace(data))
    }
}
