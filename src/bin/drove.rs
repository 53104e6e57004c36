//! Command-line driver for the `drove` engine.
//!
//! Loads a CSV dataset (or generates a synthetic one), runs the
//! distributed fit, and writes `point,membership` rows to the output
//! sink. Exits non-zero on any fatal error without writing partial
//! output.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use drove::{io, Engine, InitMethod, Point};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input CSV file, one point per row. Omit to generate a synthetic
    /// dataset instead (see --gen-num).
    input: Option<PathBuf>,

    /// Output CSV file: each row is the point followed by its cluster.
    output: Option<PathBuf>,

    /// Number of clusters.
    #[arg(short = 'k', long, default_value_t = 5)]
    num_clusters: usize,

    /// Maximum number of epochs.
    #[arg(long, default_value_t = 100)]
    num_epochs: u32,

    /// Centroid initialization method.
    #[arg(long, value_enum, default_value = "random")]
    init_method: Init,

    /// Absolute loss-delta convergence tolerance.
    #[arg(long, default_value_t = 1e-4)]
    tolerance: f32,

    /// Number of distributed workers.
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Number of threads per worker.
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// RNG seed for seeding and synthetic generation.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of synthetic points to generate (when no input is given).
    #[arg(long, default_value_t = 1000)]
    gen_num: usize,

    /// Dimension of synthetic points.
    #[arg(long, default_value_t = 2)]
    gen_dim: usize,

    /// Dimension of input rows; lets the reader ignore a trailing
    /// non-coordinate column. Inferred from the first row if omitted.
    #[arg(long)]
    input_dim: Option<usize>,

    /// Report per-epoch loss on stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Init {
    Random,
    Furthest,
}

impl From<Init> for InitMethod {
    fn from(init: Init) -> Self {
        match init {
            Init::Random => InitMethod::Random,
            Init::Furthest => InitMethod::Furthest,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "drove=debug" } else { "drove=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> drove::Result<()> {
    let data: Vec<Point> = match &args.input {
        Some(path) => io::read_points_csv(path, args.input_dim)?,
        None => io::generate_blobs(args.gen_num, args.num_clusters, args.gen_dim, args.seed)?,
    };
    info!(points = data.len(), dim = data[0].dim(), "dataset ready");

    let fit = Engine::new(args.num_clusters)
        .with_workers(args.workers)
        .with_threads(args.threads)
        .with_max_epochs(args.num_epochs)
        .with_tolerance(args.tolerance)
        .with_init(args.init_method.into())
        .with_seed(args.seed)
        .fit(&data)?;

    if fit.converged {
        info!(epochs = fit.epochs, loss = fit.loss, "converged");
    } else {
        info!(epochs = fit.epochs, loss = fit.loss, "stopped at epoch budget");
    }

    if let Some(path) = &args.output {
        io::write_points_csv(path, &data, &fit.memberships)?;
        info!(path = %path.display(), "results written");
    }

    Ok(())
}
