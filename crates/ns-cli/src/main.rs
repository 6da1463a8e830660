//! NextStat rare-event simulation CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use ns_simulation::QuantileConfidence;
use std::path::PathBuf;

mod study;

#[derive(Parser)]
#[command(name = "nextstat-sim")]
#[command(about = "NextStat - Adaptive rare-event Monte-Carlo simulation")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation study (JSON)
    Run {
        /// Input study file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto). Results do not depend on it.
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Order-statistics sample sizes and ranks for a quantile bound
    QuantileConfidence {
        /// Quantile level
        #[arg(long)]
        alpha: f64,

        /// Confidence level
        #[arg(long)]
        beta: f64,

        /// Rank of the bounding order statistic, counted from the relevant end
        #[arg(long, default_value = "0")]
        rank: usize,

        /// Bound the quantile from below instead of from above
        #[arg(long)]
        tail: bool,

        /// Also report the ranks usable with a sample of this size
        #[arg(long)]
        sample_size: Option<usize>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Run { input, output, threads } => cmd_run(&input, output.as_ref(), threads),
        Commands::QuantileConfidence { alpha, beta, rank, tail, sample_size, output } => {
            cmd_quantile_confidence(alpha, beta, rank, tail, sample_size, output.as_ref())
        }
        Commands::Version => {
            println!("nextstat-sim {}", ns_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_run(input: &PathBuf, output: Option<&PathBuf>, threads: usize) -> Result<()> {
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }

    tracing::info!(path = %input.display(), "loading study");
    let spec = study::read_study(input)?;
    let report = study::run_study(spec)?;
    write_json(output, report)
}

fn cmd_quantile_confidence(
    alpha: f64,
    beta: f64,
    rank: usize,
    tail: bool,
    sample_size: Option<usize>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let qc = QuantileConfidence::new(alpha, beta)?;
    let mut output_json = serde_json::json!({
        "alpha": alpha,
        "beta": beta,
        "rank": rank,
        "tail": tail,
        "unilateral_minimum_sample_size": qc.unilateral_minimum_sample_size(rank, tail)?,
        "bilateral_minimum_sample_size": qc.bilateral_minimum_sample_size()?,
    });
    if let Some(n) = sample_size {
        output_json["sample_size"] = serde_json::json!(n);
        output_json["unilateral_rank"] = serde_json::json!(qc.unilateral_rank(n, tail)?);
        output_json["bilateral_rank"] = serde_json::json!(qc.bilateral_rank(n)?);
    }
    write_json(output, output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
