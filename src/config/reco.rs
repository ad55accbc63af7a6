//! Configuration file parser for CG-SENSE reconstruction

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, de};

use crate::error::{ConfigError, ReconError};
use crate::utils::parse_ratio;

/// Accept ratios both as TOML numbers and as strings such as `"1+1/3"`
fn deserialize_ratio<'d, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'d>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText { Number(f64), Text(String) }

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(x) => Ok(x),
        NumberOrText::Text(s)   => parse_ratio(&s).map_err(de::Error::custom),
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Single,
    Double,
}

impl std::str::FromStr for Precision {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "double" => Ok(Self::Double),
            _ => Err(format!("unknown precision `{s}` (expected `single` or `double`)")),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Floating point precision of the whole reconstruction
    #[serde(default)]
    pub precision: Precision,

    /// Ratio of oversampled grid size to image size
    #[serde(default = "default_overgridding")]
    #[serde(deserialize_with = "deserialize_ratio")]
    pub overgridding: f64,

    /// Image side length in pixels. Default: `floor(reads / overgridding)`
    #[serde(default)]
    pub image_dim: Option<usize>,

    /// Compensate for non-uniform sampling density
    #[serde(default = "yes")]
    pub density_compensation: bool,

    /// Normalize coil sensitivities per pixel (see `sensitivity`)
    #[serde(default = "yes")]
    pub intensity_scaling: bool,

    #[serde(default)]
    pub kernel: Kernel,

    #[serde(default)]
    pub density: Density,

    #[serde(default)]
    pub sensitivity: Sensitivity,

    #[serde(default)]
    pub solver: Solver,

    #[serde(default)]
    pub sampling: Sampling,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Kernel {
    /// Footprint of the Kaiser-Bessel interpolation kernel, in grid cells
    pub width: usize,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DensityMethod {
    /// Closed form for radial spokes through the k-space centre
    #[default]
    Analytic,
    /// Fixed-point iteration of gridding and degridding
    Iterative,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Density {
    pub method: DensityMethod,
    pub iterations: usize,
    /// Lower bound applied to the max-normalized weights
    pub floor: f64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Sensitivity {
    /// Radius (in normalized k-space units) of the Hann window applied to the
    /// data before estimating coil images
    pub low_pass: f64,
    /// Pixels with root-sum-of-squares below this fraction of the maximum get
    /// zero sensitivity
    pub noise_floor: f64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Solver {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub regularization: f64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Sampling {
    /// Keep every `stride`-th projection. Default: all of them
    pub stride: Option<usize>,
    /// After striding, keep only the first `projections` projections
    pub projections: Option<usize>,
}

fn yes() -> bool { true }
fn default_overgridding() -> f64 { 2.0 }

impl Default for Kernel { fn default() -> Self { Self { width: 5 } } }

impl Default for Density {
    fn default() -> Self { Self { method: DensityMethod::default(), iterations: 10, floor: 1e-6 } }
}

impl Default for Sensitivity {
    fn default() -> Self { Self { low_pass: 0.25, noise_floor: 0.05 } }
}

impl Default for Solver {
    fn default() -> Self { Self { tolerance: 1e-6, max_iterations: 50, regularization: 0.0 } }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            overgridding: default_overgridding(),
            image_dim: None,
            density_compensation: true,
            intensity_scaling: true,
            kernel: Kernel::default(),
            density: Density::default(),
            sensitivity: Sensitivity::default(),
            solver: Solver::default(),
            sampling: Sampling::default(),
        }
    }
}

impl Config {

    /// Reject values which would make the reconstruction meaningless. Called
    /// before any numerical work is done.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use ConfigError::*;
        let Config { overgridding, image_dim, kernel, density, sensitivity, solver, sampling, .. } = *self;
        if !overgridding.is_finite() || overgridding < 1.0 { return Err(InvalidOvergridding(overgridding)) }
        if let Some(n) = image_dim { if n < 2 { return Err(ImageTooSmall(n)) } }
        if kernel.width == 0 { return Err(InvalidKernelWidth { width: 0, max: usize::MAX }) }
        if !(density.floor.is_finite() && density.floor > 0.0) { return Err(InvalidDensityFloor(density.floor)) }
        if !(0.0..1.0).contains(&sensitivity.noise_floor) { return Err(InvalidNoiseFloor(sensitivity.noise_floor)) }
        if !(sensitivity.low_pass > 0.0 && sensitivity.low_pass <= 0.5) { return Err(InvalidLowPass(sensitivity.low_pass)) }
        if !(solver.tolerance.is_finite() && solver.tolerance > 0.0) { return Err(NonPositiveTolerance(solver.tolerance)) }
        if solver.max_iterations == 0 { return Err(ZeroIterations) }
        if !(solver.regularization >= 0.0) { return Err(NegativeRegularization(solver.regularization)) }
        if sampling.stride == Some(0) { return Err(ZeroStride) }
        Ok(())
    }

    /// Image side length for an acquisition with `reads` samples per
    /// projection
    pub fn image_dim_for(&self, reads: usize) -> usize {
        self.image_dim.unwrap_or_else(|| (reads as f64 / self.overgridding).floor() as usize)
    }
}

pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

pub fn read_config_file(path: &Path) -> Result<Config, ReconError> {
    let text: String = fs::read_to_string(path)?;
    Ok(parse_config(&text)?)
}



#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    // ----- Some helpers to make the tests more concise ---------------------------------
    //  ---  Parse string as TOML  -------------------------
    fn parse<'d, D: Deserialize<'d>>(input: &'d str) -> D {
        toml::from_str(input).unwrap()
    }
    //  ---  Macro for concise assertions about values of parsed fields -------------------
    macro_rules! check {
        ($type:ident($text:expr).$field:ident = $expected:expr) => {
            let config: $type = parse::<$type>($text);
            println!("DESERIALIZED: {config:?}");
            assert_eq!(config.$field, $expected);
        };
        ($type:ident($text:expr) fields: $($field:ident = $expected:expr);+$(;)?) => {
            let config: $type = parse::<$type>($text);
            println!("DESERIALIZED: {config:?}");
            $(assert_eq!(config.$field, $expected);)*
        }
    }

    // ----- Test an example config file on disk -----------------------------------------
    #[test]
    fn test_config_file() -> Result<(), Box<dyn std::error::Error>> {
        use std::io::Write;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("reco.toml");
        write!(std::fs::File::create(&path)?, r#"
            precision = "double"
            overgridding = "1+1/3"
            [solver]
            max_iterations = 20
            regularization = 0.5
        "#)?;
        let config = read_config_file(&path)?;
        assert_eq!(config.precision, Precision::Double);
        assert_eq!(config.solver.max_iterations, 20);
        assert_eq!(config.solver.regularization, 0.5);
        assert!((config.overgridding - 4.0 / 3.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let result = read_config_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ReconError::Io(_))));
    }

    // ----- Test deserializing of individual aspects of the Config type ----------------
    #[test]
    fn config_defaults() {
        let config: Config = parse("");
        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_top_level() {
        check!{Config(r#"
                 precision = "double"
                 overgridding = 1.706
                 image_dim = 128
                 density_compensation = false
               "#) fields:
               precision = Precision::Double;
               overgridding = 1.706;
               image_dim = Some(128);
               density_compensation = false;
               intensity_scaling = true;
        }
        check!(Config("overgridding = 2").overgridding = 2.0);
        check!(Config(r#"overgridding = "3/2""#).overgridding = 1.5);
    }

    #[test]
    fn config_sections() {
        let c: Config = parse(r#"
                 [kernel]
                 width = 4
                 [density]
                 method = "iterative"
                 iterations = 7
                 [sensitivity]
                 noise_floor = 0.1
                 [solver]
                 tolerance = 1e-4
                 [sampling]
                 stride = 2
                 projections = 33
              "#);
        assert_eq!(c.kernel.width, 4);
        assert_eq!(c.density.method, DensityMethod::Iterative);
        assert_eq!(c.density.iterations, 7);
        assert_eq!(c.density.floor, Density::default().floor);
        assert_eq!(c.sensitivity.noise_floor, 0.1);
        assert_eq!(c.sensitivity.low_pass, Sensitivity::default().low_pass);
        assert_eq!(c.solver.tolerance, 1e-4);
        assert_eq!(c.solver.max_iterations, Solver::default().max_iterations);
        assert_eq!(c.sampling, Sampling { stride: Some(2), projections: Some(33) });
    }

    // ----- Make sure that unknown fields and values are not accepted -------------------
    #[test]
    #[should_panic]
    fn config_reject_unknown_field() {
        parse::<Config>("unknown_field = 666");
    }

    #[test]
    #[should_panic]
    fn config_reject_unknown_nested_field() {
        parse::<Config>("[solver]\nmaxiter = 3");
    }

    #[test]
    fn invalid_precision_is_config_error() {
        assert!(matches!(parse_config(r#"precision = "half""#), Err(ConfigError::Parse(_))));
        assert_eq!("double".parse::<Precision>(), Ok(Precision::Double));
        assert!("quad".parse::<Precision>().is_err());
    }

    // ----- Validation -----------------------------------------------------------------
    #[test]
    fn validation() {
        use ConfigError::*;
        let bad = |text: &str| parse_config(text).unwrap_err();
        assert!(matches!(bad("[solver]\nregularization = -1.0"), NegativeRegularization(_)));
        assert!(matches!(bad("[solver]\ntolerance = 0.0")      , NonPositiveTolerance(_)));
        assert!(matches!(bad("[solver]\nmax_iterations = 0")   , ZeroIterations));
        assert!(matches!(bad("overgridding = 0.5")             , InvalidOvergridding(_)));
        assert!(matches!(bad("image_dim = 1")                  , ImageTooSmall(1)));
        assert!(matches!(bad("[kernel]\nwidth = 0")            , InvalidKernelWidth { .. }));
        assert!(matches!(bad("[density]\nfloor = 0.0")         , InvalidDensityFloor(_)));
        assert!(matches!(bad("[sensitivity]\nnoise_floor = 1.0"), InvalidNoiseFloor(_)));
        assert!(matches!(bad("[sensitivity]\nlow_pass = 0.0")  , InvalidLowPass(_)));
        assert!(matches!(bad("[sampling]\nstride = 0")         , ZeroStride));
    }

    #[test]
    fn image_dim_follows_overgridding() {
        let mut config = Config { overgridding: 1.706, ..Config::default() };
        assert_eq!(config.image_dim_for(512), 300);
        config.image_dim = Some(64);
        assert_eq!(config.image_dim_for(512), 64);
    }
}
