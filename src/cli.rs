//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::pipeline::PipelineConfig;

pub const DEFAULT_INPUT: &str = "../data/processed/cleaned-data.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "../figures/customer-retention";

/// Customer cohort retention analysis with heatmap reports
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the cleaned invoice CSV
    #[arg(short, long, default_value = DEFAULT_INPUT)]
    pub input: PathBuf,

    /// Existing directory the heatmaps are written to
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Compute and summarise cohorts without rendering heatmaps
    #[arg(long)]
    pub skip_plots: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Pipeline settings for these arguments
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            input: self.input.clone(),
            output_dir: self.output_dir.clone(),
            render: !self.skip_plots,
            verbose: self.verbose,
        }
    }
}
