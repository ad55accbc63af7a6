// ----------------------------------- CLI -----------------------------------
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "cgsense-phantom", about = "Simulate a radial multi-coil scan of a disc phantom and reconstruct it")]
pub struct Cli {

    /// Reconstruction settings (TOML). Built-in defaults if not given
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Where to write the reconstructed image (raw complex values)
    #[clap(short, long, default_value = "phantom.raw")]
    pub output: PathBuf,

    /// Samples per projection
    #[clap(short, long, default_value = "64")]
    pub reads: usize,

    /// Number of golden-angle projections
    #[clap(short = 'P', long, default_value = "48")]
    pub projections: usize,

    /// Number of receive coils
    #[clap(long, default_value = "4")]
    pub coils: usize,

    /// Standard deviation of the complex Gaussian noise added to the samples
    #[clap(long, default_value = "0")]
    pub noise: f64,

    /// Seed of the noise generator
    #[clap(long, default_value = "0")]
    pub seed: u64,

    /// Override the configured precision: `single` or `double`
    #[clap(short, long)]
    pub precision: Option<Precision>,

    /// Maximum number of rayon threads
    #[clap(short = 'j', long, default_value = "4")]
    pub threads: usize,

}

fn main() -> Result<(), Box<dyn Error>> {

    let args = Cli::parse();
    init_tracing();
    let mut progress = Progress::new();

    let mut config = match &args.config {
        Some(path) => read_config_file(path)?,
        None       => Config::default(),
    };
    if let Some(precision) = args.precision { config.precision = precision }
    config.validate()?;

    match rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global() {
        Err(e) => warn!("{e}"),
        Ok(_)  => info!("Using up to {} threads.", args.threads),
    }

    match config.precision {
        Precision::Single => run::<f32>(&args, &config, &mut progress),
        Precision::Double => run::<f64>(&args, &config, &mut progress),
    }
}

fn run<T: RawFloat>(args: &Cli, config: &Config, progress: &mut Progress) -> Result<(), Box<dyn Error>> {

    let &Cli { reads, projections, coils, noise, seed, .. } = args;
    let n = config.image_dim_for(reads);

    progress.start(&format!("Simulating {coils} coils × {projections} projections × {reads} reads of a {n} × {n} disc"));
    let phantom = simulate::disc::<T>(n, n as f64 / 3.0);
    let true_maps = CoilSensitivityMaps::new(simulate::coil_profiles(coils, n))?;
    let trajectory = Trajectory::radial(projections, reads, SpokeOrdering::GoldenAngle)?;
    let raw = simulate::nudft(phantom.view(), &true_maps, &trajectory)?;
    let raw = if noise > 0.0 { simulate::add_noise(raw, noise, seed) } else { raw };
    progress.done();

    progress.start("Preparing reconstruction");
    let reconstruction = Reconstruction::prepare(config, Acquisition::new(raw, trajectory)?)?;
    progress.done();

    let bar = ProgressBar::new(config.solver.max_iterations as u64);
    bar.set_style(ProgressStyle::default_bar()
                  .template("CG [{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")?);
    let outcome = reconstruction.run(|report| {
        bar.set_position(report.iteration as u64);
        bar.set_message(format!("residual {:.2e}", report.relative_residual.to_f64().unwrap_or(f64::NAN)));
    })?;
    bar.finish_and_clear();
    progress.done_with_message(&format!("{} CG iterations", outcome.iterations));
    let outcome = outcome.into_result()?;

    // With normalized sensitivities the recoverable image is the phantom
    // weighted by the root-sum-of-squares of the true coil profiles
    let rss = true_maps.sum_of_squares().mapv(Float::sqrt);
    let expected = &phantom * &rss.mapv(|s| C::new(s, T::zero()));
    let error = simulate::relative_error(outcome.image.view(), expected.view());
    info!("relative error: {:.4}", error.to_f64().unwrap_or(f64::NAN));

    let image = Image::from(outcome.image);
    image.write_to_raw_file(&args.output)?;
    progress.done_with_message(&format!("Wrote {}", args.output.display()));
    Ok(())
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::{
    error::Error,
    path::PathBuf,
};

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use cgsense::{
    config::{read_config_file, Config, Precision},
    image::Image,
    io::raw::RawFloat,
    reco::Reconstruction,
    sensitivity::CoilSensitivityMaps,
    simulate,
    trajectory::{Acquisition, SpokeOrdering, Trajectory},
    types::{Float, C},
};
use cgsense::utils::{init_tracing, timing::Progress};
