//! CohortLens: customer cohort retention analysis over invoice data
//!
//! Invoices are loaded with Polars, bucketed into first-purchase cohorts,
//! pivoted into cohort matrices and rendered as heatmaps with Plotters.

pub mod cli;
pub mod cohort;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use cohort::{
    add_invoice_month, compute_cohort_tables, customer_first_purchase, merge_first_purchase,
    retention_rates,
};
pub use data::load_invoices;
pub use error::{CohortError, CohortResult};
pub use model::{
    CohortAggregate, CohortMatrix, CohortSummary, CohortTables, OffsetRetention, YearMonth,
};
pub use pipeline::{run_pipeline, HaltReason, PipelineConfig, PipelineOutcome, Stage};
pub use viz::{render_report, ChartKind, RenderReport};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
