//! `train-matrix` CLI - launch every combination of a training matrix.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palette_infer::matrix::{run_matrix, CommandLauncher, ConfigMatrix, DryRunLauncher};

/// Run a training command once per combination of a configuration matrix.
#[derive(Parser, Debug)]
#[command(name = "train-matrix")]
#[command(version, about, long_about = None)]
struct Args {
    /// Matrix description (base options, axes, exclusions).
    #[arg(value_name = "MATRIX_JSON")]
    matrix: PathBuf,

    /// Dataset root; checkpoints are written to its parent directory.
    #[arg(long, value_name = "PATH")]
    dataroot: PathBuf,

    /// Training command and its leading arguments.
    #[arg(
        long,
        num_args = 1..,
        allow_hyphen_values = true,
        required_unless_present = "dry_run",
        value_name = "CMD"
    )]
    launcher: Vec<String>,

    /// Print the configurations instead of training.
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("palette_infer={log_level},train_matrix={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    let matrix = ConfigMatrix::from_file(&args.matrix)
        .context("Failed to load matrix description")?
        .with_dataroot(&args.dataroot);

    let report = if args.dry_run {
        let mut launcher = DryRunLauncher::default();
        run_matrix(&matrix, &mut launcher)?
    } else {
        let (program, rest) = args
            .launcher
            .split_first()
            .context("No launcher command given")?;
        let mut launcher = CommandLauncher::new(program.clone(), rest.to_vec())
            .context("Failed to prepare launcher")?;
        run_matrix(&matrix, &mut launcher)?
    };

    println!(
        "Launched {} training run(s), skipped {}",
        report.launched, report.skipped
    );

    Ok(())
}
