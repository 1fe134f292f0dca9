use anyhow::{bail, Context as AnyhowContext, Result};
use clap::Parser;
use std::{fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use mot_tracking::config::Config;
use mot_tracking::evaluation::{BenchmarkSelection, EvaluationConfig, Evaluator, NetworkKind};
use mot_tracking::mot::{MotDirectoryProvider, MotResultWriter, PublicDetections};

/// Tracks the public detections of a MOT Challenge benchmark and writes one
/// result file per sequence.
#[derive(Parser)]
pub struct Args {
    /// Directory holding one `<sequence>/det/det.txt` per sequence.
    #[clap(long)]
    pub data_dir: PathBuf,
    /// Evaluation config as JSON. Command-line flags below override it.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(long)]
    pub output_dir: Option<PathBuf>,
    /// e.g. `MOT17-train` or `KITTI-Car-test`.
    #[clap(long)]
    pub benchmark: Option<String>,
    #[clap(long)]
    pub seed: Option<u64>,
    #[clap(long)]
    pub no_interpolate: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = resolve_config(&args)?;
    if config.network != NetworkKind::Public {
        bail!(
            "network {:?} needs an external detector; only public detections are supported here",
            config.network
        );
    }

    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("cannot create {}", config.output_dir.display()))?;
    config.save_to(&config.output_dir.join("config.json"))?;
    info!(seed = config.seed, benchmark = ?config.benchmark, "[*] Beginning evaluation...");

    let sequences = config.benchmark.sequences();
    let mut evaluator = Evaluator::new(&config.tracker)?;
    let mut provider = MotDirectoryProvider::new(&args.data_dir);
    let mut writer = MotResultWriter::new(&config.output_dir);
    let report = evaluator.run(
        &sequences,
        &mut provider,
        &mut PublicDetections,
        None,
        &mut writer,
    );

    info!(
        sequences = report.sequences.len(),
        elapsed_sec = report.total_elapsed().as_secs_f64(),
        "[*] Evaluation for all sets"
    );
    let failures: Vec<&str> = report
        .failures()
        .map(|failure| failure.sequence.as_str())
        .collect();
    if !failures.is_empty() {
        bail!("{} sequence(s) failed: {}", failures.len(), failures.join(", "));
    }
    Ok(())
}

/// Loads the configuration and applies the command-line overrides. Every
/// value is checked here, before any sequence is opened.
fn resolve_config(args: &Args) -> Result<EvaluationConfig> {
    let mut config = match &args.config {
        Some(path) => EvaluationConfig::from_json_file(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => EvaluationConfig {
            seed: 0,
            network: NetworkKind::Public,
            benchmark: "MOT17-train".parse()?,
            output_dir: PathBuf::from("output"),
            tracker: Config::default(),
        },
    };

    if let Some(benchmark) = &args.benchmark {
        config.benchmark = benchmark.parse::<BenchmarkSelection>()?;
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.no_interpolate {
        config.tracker.interpolate = false;
    }
    config.tracker.validate()?;
    Ok(config)
}
