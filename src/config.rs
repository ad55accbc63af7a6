pub mod reco;

pub use reco::{Config, Precision, DensityMethod, read_config_file, parse_config};
