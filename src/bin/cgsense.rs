// ----------------------------------- CLI -----------------------------------
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "cgsense", about = "Iterative CG-SENSE reconstruction of radial multi-coil MRI data")]
pub struct Cli {

    /// HDF5 file with datasets `rawdata`, `trajectory` and optionally `noise`
    pub data: PathBuf,

    /// Reconstruction settings (TOML). Built-in defaults if not given
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Directory in which to write the reconstructed image
    #[clap(short, long, default_value = "output")]
    pub output: PathBuf,

    /// Override the configured precision: `single` or `double`
    #[clap(short, long)]
    pub precision: Option<Precision>,

    /// Override the configured maximum number of CG iterations
    #[clap(short = 'n', long)]
    pub iterations: Option<usize>,

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
    if let Some(precision) = args.precision  { config.precision = precision }
    if let Some(n)         = args.iterations { config.solver.max_iterations = n }
    config.validate()?;
    progress.done_with_message("Startup");

    // Set the maximum number of threads used by rayon for parallel iteration
    match rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global() {
        Err(e) => warn!("{e}"),
        Ok(_)  => info!("Using up to {} threads.", args.threads),
    }

    match config.precision {
        Precision::Single => run::<f32>(&args, &config, &mut progress),
        Precision::Double => run::<f64>(&args, &config, &mut progress),
    }
}

fn run<T: Hdf5Float>(args: &Cli, config: &Config, progress: &mut Progress) -> Result<(), Box<dyn Error>> {

    progress.start(&format!("Reading {}", args.data.display()));
    let Input { acquisition, noise } = read_input::<T>(&args.data)?;
    progress.done();

    let acquisition = match noise {
        Some(noise) => {
            progress.start("Decorrelating coil noise");
            let whitened = acquisition.decorrelate(noise.view())?;
            progress.done();
            whitened
        },
        None => acquisition,
    };

    progress.start("Preparing gridding, density compensation and coil sensitivities");
    let reconstruction = Reconstruction::prepare(config, acquisition)?;
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

    // If the directory where results will be written does not exist yet, make it
    create_dir_all(&args.output)?;
    let path = args.output.join(output_filename(config));
    write_image(&path, outcome.image.view())?;
    progress.done_with_message(&format!("Wrote {}", path.display()));
    Ok(())
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::{
    error::Error,
    fs::create_dir_all,
    path::PathBuf,
};

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use cgsense::{
    config::{read_config_file, Config, Precision},
    io::hdf5::{output_filename, read_input, write_image, Hdf5Float, Input},
    reco::Reconstruction,
    utils::{init_tracing, timing::Progress},
};
