//! End-to-end reconstruction: everything between an acquisition and the
//! solver's output image.
//!
//! `Reconstruction::prepare` runs the one-off stages (projection selection,
//! gridding structure, density weights, sensitivity maps, data prescaling) and
//! keeps their results; `run` then solves for the image. The precomputed parts
//! are immutable, so several solves (different solver settings, initial
//! guesses) can share them.

use ndarray::ArrayView2;
use tracing::{info, warn};

use crate::config::Config;
use crate::density::{DensityCompensator, DensityWeights, WeightedKspace};
use crate::error::ReconError;
use crate::gridding::{GridGeometry, Gridding};
use crate::operator::ImagingOperator;
use crate::sensitivity::{CoilSensitivityEstimator, CoilSensitivityMaps};
use crate::solver::{CgSolver, IterationReport, Outcome, Termination};
use crate::trajectory::{Acquisition, ProjectionSelection};
use crate::types::{Real, C};
use crate::utils::group_digits;

#[derive(Debug)]
pub struct Reconstruction<T: Real> {
    config: Config,
    acquisition: Acquisition<T>,
    gridding: Gridding<T>,
    weights: DensityWeights<T>,
    maps: CoilSensitivityMaps<T>,
    data: WeightedKspace<T>,
}

impl<T: Real> Reconstruction<T> {

    pub fn prepare(config: &Config, acquisition: Acquisition<T>) -> Result<Self, ReconError> {
        config.validate()?;

        let acquisition = acquisition.select(ProjectionSelection::from(config.sampling))?;
        let trajectory = &acquisition.trajectory;
        info!("acquisition: {} coils, {} projections × {} reads",
              acquisition.coils(), trajectory.projections(), trajectory.reads());

        let geometry = GridGeometry::new(config.image_dim_for(trajectory.reads()), config.overgridding)?;
        info!("image {0} × {0}, grid {1} × {1}", geometry.image_dim, geometry.grid_dim);
        let gridding = Gridding::new(trajectory, geometry, config.kernel.width)?;

        let weights = DensityCompensator::from(config).weights(trajectory, &gridding)?;
        info!("density compensation: {}", if config.density_compensation { "on" } else { "off" });

        let maps = CoilSensitivityEstimator::from(config)
            .estimate(&acquisition.raw, trajectory, &gridding, &weights)?;
        info!("estimated sensitivities of {} coils", maps.coils());

        let data = weights.prescale(&acquisition.raw)?;

        Ok(Self { config: config.clone(), acquisition, gridding, weights, maps, data })
    }

    pub fn config     (&self) -> &Config                 { &self.config }
    pub fn acquisition(&self) -> &Acquisition<T>         { &self.acquisition }
    pub fn gridding   (&self) -> &Gridding<T>            { &self.gridding }
    pub fn weights    (&self) -> &DensityWeights<T>      { &self.weights }
    pub fn maps       (&self) -> &CoilSensitivityMaps<T> { &self.maps }
    pub fn data       (&self) -> &WeightedKspace<T>      { &self.data }

    pub fn operator(&self) -> Result<ImagingOperator<'_, T>, ReconError> {
        ImagingOperator::new(&self.gridding, &self.maps, &self.weights)
    }

    /// Solve with the configured solver settings, starting from zero
    pub fn run(&self, callback: impl FnMut(&IterationReport<T>)) -> Result<Outcome<T>, ReconError> {
        self.run_from(None, callback)
    }

    pub fn run_from(
        &self,
        initial: Option<ArrayView2<C<T>>>,
        callback: impl FnMut(&IterationReport<T>),
    ) -> Result<Outcome<T>, ReconError> {
        let solver = CgSolver::<T>::from(self.config.solver);
        let operator = self.operator()?;
        info!("solving for {} unknowns from {} samples",
              group_digits(self.gridding.geometry().image_dim.pow(2)),
              group_digits(self.data.view().len()));
        let outcome = solver.solve(&operator, self.data.view(), initial, callback)?;
        match &outcome.termination {
            Termination::Converged => info!("converged after {} iterations, relative residual {}",
                                            outcome.iterations, outcome.relative_residual),
            Termination::IterationLimit => warn!("no convergence within {} iterations, relative residual {}",
                                                 outcome.iterations, outcome.relative_residual),
            Termination::Breakdown(e) => warn!("solver stopped after {} iterations: {e}", outcome.iterations),
        }
        Ok(outcome)
    }
}

/// `prepare` and `run` in one go, treating numerical breakdown as an error
pub fn reconstruct<T: Real>(config: &Config, acquisition: Acquisition<T>) -> Result<Outcome<T>, ReconError> {
    Reconstruction::prepare(config, acquisition)?.run(|_| {})?.into_result()
}
