//! Coil sensitivity estimation from the acquisition itself, without a
//! separate calibration scan.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use rayon::prelude::*;
use tracing::debug;

use crate::density::DensityWeights;
use crate::error::{NumericalError, ReconError};
use crate::gridding::Gridding;
use crate::trajectory::{RawData, Trajectory};
use crate::types::{lit, Float, ImageData, Real, C};

/// One complex map per coil, `[coil, iy, ix]`. Frozen once estimated.
#[derive(Clone, Debug)]
pub struct CoilSensitivityMaps<T: Real> {
    maps: Array3<C<T>>,
}

impl<T: Real> CoilSensitivityMaps<T> {

    /// Wrap externally provided maps (simulations, calibration scans)
    pub fn new(maps: Array3<C<T>>) -> Result<Self, ReconError> {
        let (coils, ny, nx) = maps.dim();
        if ny != nx { return Err(ReconError::shape_mismatch("sensitivity maps (square)", (coils, ny, ny), maps.dim())) }
        for (coil, map) in maps.outer_iter().enumerate() {
            if !map.iter().all(|z| z.re.is_finite() && z.im.is_finite()) {
                return Err(NumericalError::NonFiniteSensitivity { coil }.into())
            }
        }
        Ok(Self { maps })
    }

    pub fn coils    (&self) -> usize { self.maps.len_of(Axis(0)) }
    pub fn image_dim(&self) -> usize { self.maps.len_of(Axis(1)) }

    pub fn coil(&self, c: usize) -> ArrayView2<C<T>> { self.maps.index_axis(Axis(0), c) }
    pub fn view(&self) -> ArrayView3<C<T>> { self.maps.view() }

    /// `Σ_c |S_c|²` at every pixel
    pub fn sum_of_squares(&self) -> Array2<T> {
        self.maps.map_axis(Axis(0), |lane| lane.iter().map(|z| z.norm_sqr()).sum())
    }
}

/// Settings of the sensitivity estimation
#[derive(Clone, Copy, Debug)]
pub struct CoilSensitivityEstimator {
    /// Radius of the Hann window applied to k-space, in normalized units
    pub low_pass: f64,
    /// RSS threshold, relative to the maximum RSS, below which pixels get zero
    /// sensitivity in every coil
    pub noise_floor: f64,
    /// Normalize each pixel to unit RSS (`true`) or all pixels by the global
    /// maximum RSS (`false`)
    pub intensity_scaling: bool,
}

impl From<&crate::config::Config> for CoilSensitivityEstimator {
    fn from(config: &crate::config::Config) -> Self {
        let s = config.sensitivity;
        Self { low_pass: s.low_pass, noise_floor: s.noise_floor, intensity_scaling: config.intensity_scaling }
    }
}

impl CoilSensitivityEstimator {

    /// Low-resolution coil images, normalized by their root-sum-of-squares.
    pub fn estimate<T: Real>(
        &self,
        raw: &RawData<T>,
        trajectory: &Trajectory<T>,
        gridding: &Gridding<T>,
        weights: &DensityWeights<T>,
    ) -> Result<CoilSensitivityMaps<T>, ReconError> {

        // -------- density-weighted, low-pass filtered k-space filter -------
        let window = hann(trajectory, lit(self.low_pass));
        let filter = &weights.weights() * &window;

        // -------- one low-resolution image per coil --------------------------
        let images: Vec<ImageData<T>> = (0..raw.coils()).into_par_iter()
            .map(|c| gridding.adjoint(raw.coil(c).iter().zip(filter.iter()).map(|(&z, &f)| z * f)))
            .collect();
        let n = gridding.geometry().image_dim;
        let mut maps = Array3::zeros((images.len(), n, n));
        for (mut map, image) in maps.outer_iter_mut().zip(images) { map.assign(&image) }

        // -------- normalize by root-sum-of-squares ---------------------------
        let rss = maps.map_axis(Axis(0), |lane| lane.iter().map(|z| z.norm_sqr()).sum::<T>().sqrt());
        let max = rss.iter().copied().fold(T::zero(), T::max);
        let threshold = lit::<T>(self.noise_floor) * max;
        let mut kept = 0;
        for (coil, mut map) in maps.outer_iter_mut().enumerate() {
            Zip::from(&mut map).and(&rss).for_each(|s, &r| {
                *s = if r > threshold && r > T::zero() {
                    if self.intensity_scaling { *s / r } else { *s / max }
                } else {
                    C::new(T::zero(), T::zero())
                }
            });
            if !map.iter().all(|z| z.re.is_finite() && z.im.is_finite()) {
                return Err(NumericalError::NonFiniteSensitivity { coil }.into())
            }
        }
        for &r in rss.iter() { if r > threshold && r > T::zero() { kept += 1 } }
        debug!("sensitivity maps: {kept} of {} pixels above noise floor", rss.len());
        Ok(CoilSensitivityMaps { maps })
    }
}

/// `cos²(π r / 2L)` inside radius `L`, zero outside
fn hann<T: Real>(trajectory: &Trajectory<T>, radius: T) -> Array2<T> {
    let k = trajectory.view();
    Array2::from_shape_fn((trajectory.projections(), trajectory.reads()), |(p, r)| {
        let r = k[[p, r, 0]].hypot(k[[p, r, 1]]);
        if r < radius {
            let c = Float::cos(T::PI() * r / (lit::<T>(2.0) * radius));
            c * c
        } else { T::zero() }
    })
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::DensityCompensator;
    use crate::config::reco::DensityMethod;
    use crate::gridding::GridGeometry;
    use crate::simulate;
    use crate::trajectory::SpokeOrdering;
    use crate::types::KspaceData;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    fn setup(intensity_scaling: bool, noise_floor: f64) -> (CoilSensitivityMaps<f64>, ImageData<f64>) {
        let (reads, n) = (32, 16);
        let t = Trajectory::radial(24, reads, SpokeOrdering::GoldenAngle).unwrap();
        let gridding = Gridding::new(&t, GridGeometry::new(n, 2.0).unwrap(), 4).unwrap();
        let phantom = simulate::disc(n, 5.0);
        let profiles = CoilSensitivityMaps::new(simulate::coil_profiles(3, n)).unwrap();
        let raw = simulate::nudft(phantom.view(), &profiles, &t).unwrap();
        let weights = DensityCompensator { enabled: true, method: DensityMethod::Analytic, iterations: 0, floor: 1e-6 }
            .weights(&t, &gridding).unwrap();
        let estimator = CoilSensitivityEstimator { low_pass: 0.25, noise_floor, intensity_scaling };
        (estimator.estimate(&raw, &t, &gridding, &weights).unwrap(), phantom)
    }

    #[rstest(noise_floor, case(0.05), case(0.3))]
    fn unit_sum_of_squares_or_zero(noise_floor: f64) {
        let (maps, _) = setup(true, noise_floor);
        let ss = maps.sum_of_squares();
        let mut kept = 0;
        for ((iy, ix), &s) in ss.indexed_iter() {
            if s == 0.0 {
                for c in 0..maps.coils() { assert_eq!(maps.coil(c)[[iy, ix]], C::new(0.0, 0.0)) }
            } else {
                assert_float_eq!(s, 1.0, rmax <= 1e-12);
                kept += 1;
            }
        }
        // The disc, at least, has signal
        assert!(kept > 20);
    }

    #[test]
    fn without_intensity_scaling_maps_keep_their_profile() {
        let (maps, _) = setup(false, 0.05);
        let ss = maps.sum_of_squares();
        let max = ss.iter().copied().fold(0.0, f64::max);
        assert_float_eq!(max, 1.0, rmax <= 1e-12);
        assert!(ss.iter().any(|&s| s > 0.0 && s < 0.9));
    }

    #[test]
    fn zero_data_gives_zero_maps() {
        let t = Trajectory::<f32>::radial(8, 16, SpokeOrdering::Uniform).unwrap();
        let gridding = Gridding::new(&t, GridGeometry::new(8, 2.0).unwrap(), 4).unwrap();
        let raw = RawData::new(KspaceData::zeros((2, 8, 16)));
        let weights = DensityWeights::uniform(8, 16);
        let estimator = CoilSensitivityEstimator { low_pass: 0.25, noise_floor: 0.05, intensity_scaling: true };
        let maps = estimator.estimate(&raw, &t, &gridding, &weights).unwrap();
        assert!(maps.view().iter().all(|z| *z == C::new(0.0, 0.0)));
    }

    #[test]
    fn non_finite_maps_are_rejected() {
        let mut maps = Array3::<C<f64>>::zeros((2, 4, 4));
        maps[[1, 2, 3]] = C::new(f64::NAN, 0.0);
        let result = CoilSensitivityMaps::new(maps);
        assert!(matches!(result, Err(ReconError::Numerical(NumericalError::NonFiniteSensitivity { coil: 1 }))));
    }

    #[test]
    fn infinite_imaginary_part_is_rejected_in_single_precision() {
        let mut maps = Array3::<C<f32>>::from_elem((3, 2, 2), C::new(1.0, 0.0));
        maps[[0, 1, 0]] = C::new(0.5, f32::INFINITY);
        let result = CoilSensitivityMaps::new(maps);
        assert!(matches!(result, Err(ReconError::Numerical(NumericalError::NonFiniteSensitivity { coil: 0 }))));
    }
}
