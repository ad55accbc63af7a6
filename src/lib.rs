pub mod types;
pub mod index;
pub mod error;
pub mod config;
pub mod utils;
pub mod io;

pub mod trajectory;
pub mod kernel;
pub mod fft;
pub mod gridding;
pub mod density;
pub mod sensitivity;
pub mod operator;
pub mod solver;
pub mod prewhiten;
pub mod simulate;
pub mod image;
pub mod reco;

pub use error::{ConfigError, NumericalError, ReconError};
pub use config::Config;
pub use trajectory::{Acquisition, RawData, Trajectory};
pub use image::Image;
pub use operator::{ImagingOperator, LinearOperator};
pub use solver::{CgSolver, Outcome, Termination};
pub use reco::{reconstruct, Reconstruction};
