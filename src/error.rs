//! Typed failure reasons for every pipeline stage

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CohortError {
    #[error("input file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("input file is empty: {}", path.display())]
    EmptyFile { path: PathBuf },

    #[error("could not parse {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing expected column '{column}'")]
    MissingColumn { column: String },

    #[error("column '{column}' has unexpected type: {reason}")]
    Schema { column: String, reason: String },

    #[error("cohort table is empty or incorrectly indexed: {0}")]
    Shape(String),

    #[error("output directory does not exist: {}", path.display())]
    OutputDirMissing { path: PathBuf },

    #[error("failed to render {}: {reason}", path.display())]
    Render { path: PathBuf, reason: String },

    #[error("dataframe error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

pub type CohortResult<T> = Result<T, CohortError>;
