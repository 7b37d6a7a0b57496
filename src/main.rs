//! CohortLens: customer cohort retention heatmaps from invoice data
//!
//! This is the main entrypoint: it parses arguments, sets up logging and
//! runs the cohort pipeline once.

use anyhow::Result;
use clap::Parser;
use cohortlens::{run_pipeline, Args, PipelineOutcome};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    if args.verbose {
        println!("CohortLens - Customer Retention Analysis");
        println!("========================================\n");
    }

    let config = args.to_config();
    match run_pipeline(&config) {
        PipelineOutcome::Completed {
            report: Some(report),
            ..
        } => {
            println!("\n=== Pipeline Complete ===");
            for path in report.written() {
                println!("Heatmap saved to: {}", path.display());
            }
            if !report.all_written() {
                println!(
                    "{} heatmap(s) could not be written",
                    report.failures().len()
                );
            }
        }
        PipelineOutcome::Completed { report: None, .. } => {
            println!("\n=== Pipeline Complete (plots skipped) ===");
        }
        PipelineOutcome::Halted { stage, .. } => {
            println!("Pipeline stopped during {stage}; no figures were written");
        }
    }

    Ok(())
}

/// Diagnostics go to stdout; `RUST_LOG` overrides the default level
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stdout)
        .init();
}
