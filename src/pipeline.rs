//! Sequential cohort pipeline: each stage runs only when the previous one succeeded

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use crate::cli::{DEFAULT_INPUT, DEFAULT_OUTPUT_DIR};
use crate::cohort::{
    add_invoice_month, compute_cohort_tables, customer_first_purchase, merge_first_purchase,
    retention_rates,
};
use crate::data::load_invoices;
use crate::error::CohortError;
use crate::model::{CohortMatrix, CohortSummary, CohortTables};
use crate::viz::{print_cohort_summary, render_report, RenderReport};

/// Settings for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Render heatmaps after the tables are computed
    pub render: bool,
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            render: true,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    MonthTag,
    FirstPurchase,
    Merge,
    Aggregate,
    Retention,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::MonthTag => "month tagging",
            Stage::FirstPurchase => "first purchase",
            Stage::Merge => "merge",
            Stage::Aggregate => "cohort aggregation",
            Stage::Retention => "retention",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum HaltReason {
    /// The stage failed
    Error(CohortError),
    /// The stage succeeded but produced nothing to carry forward
    Empty,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Halted {
        stage: Stage,
        reason: HaltReason,
    },
    Completed {
        tables: CohortTables,
        retention: CohortMatrix,
        /// `None` when rendering was skipped
        report: Option<RenderReport>,
    },
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineOutcome::Completed { .. })
    }

    pub fn halted_at(&self) -> Option<Stage> {
        match self {
            PipelineOutcome::Halted { stage, .. } => Some(*stage),
            PipelineOutcome::Completed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&CohortError> {
        match self {
            PipelineOutcome::Halted {
                reason: HaltReason::Error(e),
                ..
            } => Some(e),
            _ => None,
        }
    }
}

fn halt(stage: Stage, error: CohortError) -> PipelineOutcome {
    log::error!("Error during {stage}: {error}");
    PipelineOutcome::Halted {
        stage,
        reason: HaltReason::Error(error),
    }
}

fn halt_empty(stage: Stage, what: &str) -> PipelineOutcome {
    log::warn!("No {what} after {stage}; nothing to plot");
    PipelineOutcome::Halted {
        stage,
        reason: HaltReason::Empty,
    }
}

macro_rules! try_stage {
    ($stage:expr, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => return halt($stage, e),
        }
    };
}

/// Run load → month tag → first purchase → merge → aggregate → retention → render.
///
/// Failures never propagate: they are logged and reported as
/// [`PipelineOutcome::Halted`], in which case no image is written.
pub fn run_pipeline(config: &PipelineConfig) -> PipelineOutcome {
    let start_time = Instant::now();

    if config.verbose {
        println!("Step 1: Loading invoices");
        println!("  Input file: {}", config.input.display());
    }
    let invoices = try_stage!(Stage::Load, load_invoices(&config.input));
    log::info!("Loaded {} invoice rows", invoices.height());

    if config.verbose {
        println!("Step 2: Building cohorts");
    }
    let tagged = try_stage!(Stage::MonthTag, add_invoice_month(invoices));
    let customers = try_stage!(Stage::FirstPurchase, customer_first_purchase(&tagged));
    if customers.height() == 0 {
        return halt_empty(Stage::FirstPurchase, "customers");
    }

    let merged = try_stage!(Stage::Merge, merge_first_purchase(tagged, &customers));
    let tables = try_stage!(Stage::Aggregate, compute_cohort_tables(&merged));
    if tables.counts.is_empty() {
        return halt_empty(Stage::Aggregate, "cohorts");
    }
    log::info!(
        "Built {} cohorts over {} cohort indices",
        tables.counts.nrows(),
        tables.counts.ncols()
    );

    let retention = try_stage!(Stage::Retention, retention_rates(&tables.counts));
    if config.verbose {
        println!(
            "  Processing time: {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
    }

    print_cohort_summary(&CohortSummary::new(&tables, &retention));

    let report = if config.render {
        if config.verbose {
            println!("\nStep 3: Generating heatmaps");
            println!("  Output directory: {}", config.output_dir.display());
        }
        Some(render_report(&retention, &tables, &config.output_dir))
    } else {
        None
    };

    if config.verbose {
        println!(
            "Total processing time: {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
    }

    PipelineOutcome::Completed {
        tables,
        retention,
        report,
    }
}
