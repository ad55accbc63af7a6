//! Error taxonomy of the reconstruction.
//!
//! + Construction-time problems (`ShapeMismatch`, `Config`) abort before any
//!   iteration begins.
//!
//! + `Numerical` problems found inside the CG loop do not surface as `Err`
//!   from the solver: they are reported as a `Termination::Breakdown` flag,
//!   next to the last valid iterate. See `solver::Outcome::into_result`.
//!
//! + Reaching the iteration limit is not an error at all.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("numerical error: {0}")]
    Numerical(#[from] NumericalError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl ReconError {
    pub fn shape_mismatch(what: &'static str, expected: impl std::fmt::Debug, found: impl std::fmt::Debug) -> Self {
        Self::ShapeMismatch { what, expected: format!("{expected:?}"), found: format!("{found:?}") }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid ratio `{0}`: expected a number, `a/b` or a sum of those")]
    InvalidRatio(String),
    #[error("regularization must be non-negative, got {0}")]
    NegativeRegularization(f64),
    #[error("solver tolerance must be positive, got {0}")]
    NonPositiveTolerance(f64),
    #[error("maximum number of iterations must be positive")]
    ZeroIterations,
    #[error("overgridding factor must be finite and at least 1, got {0}")]
    InvalidOvergridding(f64),
    #[error("kernel width must lie in 1..={max} grid cells, got {width}")]
    InvalidKernelWidth { width: usize, max: usize },
    #[error("gridding kernel has a non-positive deapodization value ({0}) inside the image")]
    DegenerateDeapodization(f64),
    #[error("density weight floor must be positive and finite, got {0}")]
    InvalidDensityFloor(f64),
    #[error("sensitivity noise floor must lie in [0, 1), got {0}")]
    InvalidNoiseFloor(f64),
    #[error("sensitivity low-pass radius must lie in (0, 0.5], got {0}")]
    InvalidLowPass(f64),
    #[error("projection stride must be at least 1")]
    ZeroStride,
    #[error("trajectory point (projection {projection}, read {read}) has component {value} outside [-0.5, 0.5]")]
    TrajectoryOutOfRange { projection: usize, read: usize, value: f64 },
    #[error("trajectory has zero extent: cannot normalize it")]
    DegenerateTrajectory,
    #[error("acquisition contains no samples")]
    EmptyAcquisition,
    #[error("image must be at least 2x2 pixels, got {0}")]
    ImageTooSmall(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericalError {
    #[error("CG iteration {iteration}: search direction is degenerate (⟨p, Ap⟩ = {value})")]
    DegenerateDirection { iteration: usize, value: f64 },
    #[error("CG iteration {iteration}: residual is not finite")]
    NonFiniteResidual { iteration: usize },
    #[error("sensitivity normalization of coil {coil} produced non-finite values")]
    NonFiniteSensitivity { coil: usize },
    #[error("noise covariance is not positive definite (pivot {pivot})")]
    NoiseCovarianceNotPositiveDefinite { pivot: usize },
}
