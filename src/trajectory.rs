//! Input containers: k-space trajectory, multi-coil raw samples, and the
//! acquisition pairing the two.
//!
//! Shapes are checked on construction and are fixed from then on, so every
//! downstream component can rely on `raw.shape() == [coils, projections, reads]`
//! agreeing with `trajectory.shape() == [projections, reads, 2]`.

use ndarray::{ArrayView2, ArrayView3, Axis};
use tracing::debug;

use crate::config::reco::Sampling;
use crate::error::{ConfigError, ReconError};
use crate::types::{lit, Coordinates, Float, KspaceData, Real, C};

/// Normalized k-space positions of every sample, `[projection, read, kx|ky]`,
/// with each component in `[-0.5, 0.5]` (cycles per pixel of the final image).
#[derive(Clone, Debug)]
pub struct Trajectory<T: Real> {
    coordinates: Coordinates<T>,
}

/// How successive spokes of a radial trajectory are oriented
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpokeOrdering {
    /// Spoke `p` at angle `p π / P`
    Uniform,
    /// Spoke `p` at angle `p π / φ`, `φ` being the golden ratio
    GoldenAngle,
}

impl<T: Real> Trajectory<T> {

    /// Accept already-normalized coordinates. Fails if the last axis does not
    /// have length 2, or if any component lies outside `[-0.5, 0.5]` (up to a
    /// few ULPs, to tolerate the rounding in `from_raw`).
    pub fn new(coordinates: Coordinates<T>) -> Result<Self, ReconError> {
        let (projections, reads, components) = coordinates.dim();
        if components != 2 {
            return Err(ReconError::shape_mismatch("trajectory components", 2, components));
        }
        if projections == 0 || reads == 0 { return Err(ConfigError::EmptyAcquisition.into()) }
        let limit = lit::<T>(0.5) + T::epsilon() * lit(8.0);
        for ((projection, read, _), &k) in coordinates.indexed_iter() {
            if !(Float::abs(k) <= limit) {
                let value = k.to_f64().unwrap_or(f64::NAN);
                return Err(ConfigError::TrajectoryOutOfRange { projection, read, value }.into())
            }
        }
        Ok(Self { coordinates })
    }

    /// Rescale coordinates given in arbitrary units so that the largest
    /// absolute component becomes 0.5.
    pub fn from_raw(mut coordinates: Coordinates<T>) -> Result<Self, ReconError> {
        let extent = coordinates.iter().fold(T::zero(), |m, &k| m.max(Float::abs(k)));
        if !(extent > T::zero() && extent.is_finite()) { return Err(ConfigError::DegenerateTrajectory.into()) }
        let scale = lit::<T>(2.0) * extent;
        coordinates.mapv_inplace(|k| k / scale);
        debug!("trajectory rescaled by 1/{scale}");
        Self::new(coordinates)
    }

    /// Radial trajectory of `projections` spokes through the centre of
    /// k-space, each with `reads` equidistant samples `k_r = (r - reads/2) / reads`.
    pub fn radial(projections: usize, reads: usize, ordering: SpokeOrdering) -> Result<Self, ReconError> {
        let golden_ratio = (1.0 + 5.0_f64.sqrt()) / 2.0;
        let mut coordinates = Coordinates::<T>::zeros((projections, reads, 2));
        for ((p, r, c), k) in coordinates.indexed_iter_mut() {
            let angle = match ordering {
                SpokeOrdering::Uniform     => p as f64 * std::f64::consts::PI / projections as f64,
                SpokeOrdering::GoldenAngle => p as f64 * std::f64::consts::PI / golden_ratio,
            };
            let kr = (r as f64 - (reads / 2) as f64) / reads as f64;
            *k = lit(if c == 0 { kr * angle.cos() } else { kr * angle.sin() });
        }
        Self::new(coordinates)
    }

    pub fn projections(&self) -> usize { self.coordinates.len_of(Axis(0)) }
    pub fn reads      (&self) -> usize { self.coordinates.len_of(Axis(1)) }
    pub fn len        (&self) -> usize { self.projections() * self.reads() }
    pub fn is_empty   (&self) -> bool  { self.len() == 0 }

    pub fn view(&self) -> ArrayView3<T> { self.coordinates.view() }

    /// `[kx, ky]` of every sample, in `[projection, read]` row-major order
    pub fn points(&self) -> impl Iterator<Item = [T; 2]> + '_ {
        self.coordinates.rows().into_iter().map(|k| [k[0], k[1]])
    }

    /// Distance of every sample from the k-space centre, in `points` order
    pub fn radii(&self) -> impl Iterator<Item = T> + '_ {
        self.points().map(|[kx, ky]| kx.hypot(ky))
    }

    fn select(&self, keep: &[usize]) -> Self {
        Self { coordinates: self.coordinates.select(Axis(0), keep) }
    }
}

/// Multi-coil complex samples `[coil, projection, read]`
#[derive(Clone, Debug)]
pub struct RawData<T: Real> {
    samples: KspaceData<T>,
}

impl<T: Real> RawData<T> {
    pub fn new(samples: KspaceData<T>) -> Self { Self { samples } }

    pub fn coils      (&self) -> usize { self.samples.len_of(Axis(0)) }
    pub fn projections(&self) -> usize { self.samples.len_of(Axis(1)) }
    pub fn reads      (&self) -> usize { self.samples.len_of(Axis(2)) }

    pub fn view(&self) -> ArrayView3<C<T>> { self.samples.view() }
    pub fn into_inner(self) -> KspaceData<T> { self.samples }

    /// Samples of a single coil, `[projection, read]`
    pub fn coil(&self, c: usize) -> ArrayView2<C<T>> { self.samples.index_axis(Axis(0), c) }

    pub(crate) fn samples_mut(&mut self) -> &mut KspaceData<T> { &mut self.samples }
}

/// Which projections to keep from a (possibly over-complete) acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProjectionSelection {
    pub stride: usize,
    pub count: Option<usize>,
}

impl From<Sampling> for ProjectionSelection {
    fn from(Sampling { stride, projections }: Sampling) -> Self {
        Self { stride: stride.unwrap_or(1), count: projections }
    }
}

impl ProjectionSelection {
    pub fn indices(&self, projections: usize) -> Result<Vec<usize>, ConfigError> {
        if self.stride == 0 { return Err(ConfigError::ZeroStride) }
        let keep = (0..projections)
            .step_by(self.stride)
            .take(self.count.unwrap_or(usize::MAX))
            .collect::<Vec<_>>();
        if keep.is_empty() { return Err(ConfigError::EmptyAcquisition) }
        Ok(keep)
    }
}

/// Raw data together with the trajectory it was sampled on
#[derive(Clone, Debug)]
pub struct Acquisition<T: Real> {
    pub raw: RawData<T>,
    pub trajectory: Trajectory<T>,
}

impl<T: Real> Acquisition<T> {

    pub fn new(raw: RawData<T>, trajectory: Trajectory<T>) -> Result<Self, ReconError> {
        let expected = [trajectory.projections(), trajectory.reads()];
        let found    = [raw.projections(), raw.reads()];
        if expected != found {
            return Err(ReconError::shape_mismatch("raw data [projections, reads]", expected, found));
        }
        if raw.coils() == 0 { return Err(ConfigError::EmptyAcquisition.into()) }
        Ok(Self { raw, trajectory })
    }

    pub fn coils(&self) -> usize { self.raw.coils() }

    /// Keep only the projections picked by `selection`, in raw data and
    /// trajectory alike.
    pub fn select(self, selection: ProjectionSelection) -> Result<Self, ReconError> {
        let keep = selection.indices(self.trajectory.projections())?;
        if keep.len() == self.trajectory.projections() { return Ok(self) }
        debug!("keeping {} of {} projections", keep.len(), self.trajectory.projections());
        let raw = RawData::new(self.raw.samples.select(Axis(1), &keep));
        let trajectory = self.trajectory.select(&keep);
        Ok(Self { raw, trajectory })
    }

    /// Apply noise decorrelation in place: see `prewhiten`
    pub fn decorrelate(mut self, noise: ArrayView2<C<T>>) -> Result<Self, ReconError> {
        crate::prewhiten::prewhiten(self.raw.samples_mut(), noise)?;
        Ok(self)
    }
}
