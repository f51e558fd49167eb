use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueHint};
use log::info;
use neurite_fill::batch::{load_config, run_batch, BatchConfig};

/// Fill traced neurites of every image in a folder and write binary masks
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON batch configuration; flags below override its fields
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Folder searched recursively for images
    #[arg(long, short, value_hint = ValueHint::DirPath)]
    input: Option<PathBuf>,

    /// Folder receiving the masks
    #[arg(long, short, value_hint = ValueHint::DirPath)]
    output: Option<PathBuf>,

    /// Image file name suffix (default ".nd2")
    #[arg(long)]
    suffix: Option<String>,

    /// Maximum accumulated cost of a filled voxel (default 0.01)
    #[arg(long, short)]
    threshold: Option<f64>,

    /// Fill worker threads; 0 uses every CPU
    #[arg(long, short)]
    workers: Option<usize>,

    /// Write uncompressed .nii instead of .nii.gz
    #[arg(long = "no-compress", action = ArgAction::SetFalse, default_value_t = true)]
    compress: bool,

    /// Also write the per-voxel minimum cost map
    #[arg(long)]
    cost_map: bool,

    /// Also write source intensities inside the mask
    #[arg(long)]
    masked_intensity: bool,

    /// Destination for the JSON batch report
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match try_main() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every processed file completed.
fn try_main() -> Result<bool, String> {
    let cli = Cli::parse();
    let config = build_config(cli)?;

    let report = run_batch(&config).map_err(|e| e.to_string())?;
    if let Some(path) = &config.report_json {
        report.write_json(path)?;
        info!("Report written to {}", path.display());
    }

    let s = report.summary();
    println!(
        "{} images: {} completed, {} partially failed, {} skipped, {} failed, {} cancelled",
        s.total, s.completed, s.partially_failed, s.skipped, s.failed, s.cancelled
    );
    Ok(s.failed == 0 && s.partially_failed == 0 && s.cancelled == 0)
}

fn build_config(cli: Cli) -> Result<BatchConfig, String> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BatchConfig::default(),
    };

    if let Some(input) = cli.input {
        config.input_root = input;
    }
    if let Some(output) = cli.output {
        config.output_root = output;
    }
    if let Some(suffix) = cli.suffix {
        config.suffix = suffix;
    }
    if let Some(threshold) = cli.threshold {
        config.fill.threshold = threshold;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if !cli.compress {
        config.compress = false;
    }
    config.write_cost_map |= cli.cost_map;
    config.write_masked_intensity |= cli.masked_intensity;
    if cli.report.is_some() {
        config.report_json = cli.report;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}
