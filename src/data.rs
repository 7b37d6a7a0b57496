//! Invoice loading using Polars

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

use crate::error::{CohortError, CohortResult};

pub const CUSTOMER_ID: &str = "CustomerID";
pub const INVOICE_NO: &str = "InvoiceNo";
pub const INVOICE_DATE: &str = "InvoiceDate";
pub const TOTAL_PRICE: &str = "TotalPrice";
pub const INVOICE_MONTH: &str = "InvoiceMonth";
pub const FIRST_PURCHASE_MONTH: &str = "FirstPurchaseMonth";
pub const COHORT_INDEX: &str = "CohortIndex";

/// Timestamp layouts accepted for `InvoiceDate`, after RFC 3339
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Load the invoice CSV and parse `InvoiceDate` into a millisecond `Datetime` column
///
/// # Arguments
/// * `file_path` - Path to the CSV file
///
/// # Returns
/// * The invoice table, or the reason it could not be read. A header-only
///   file is a valid zero-row table.
pub fn load_invoices(file_path: impl AsRef<Path>) -> CohortResult<DataFrame> {
    let path = file_path.as_ref();

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CohortError::MissingFile {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(CohortError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if metadata.len() == 0 {
        return Err(CohortError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    // Identifier columns mix digits and letters (cancellations are `C536379`)
    // anywhere in the file, so types are inferred from every row.
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| classify_read_error(path, e))?;

    parse_invoice_dates(&mut df).map_err(|e| match e {
        CohortError::Malformed { reason, .. } => CohortError::Malformed {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })?;

    log::debug!(
        "Loaded {} invoice rows ({} columns) from {}",
        df.height(),
        df.width(),
        path.display()
    );

    Ok(df)
}

/// Map a reader failure onto the loader's failure kinds
fn classify_read_error(path: &Path, err: PolarsError) -> CohortError {
    match err {
        PolarsError::NoData(_) => CohortError::EmptyFile {
            path: path.to_path_buf(),
        },
        PolarsError::IO { error, .. } => CohortError::Read {
            path: path.to_path_buf(),
            source: io::Error::new(error.kind(), error.to_string()),
        },
        other => CohortError::Malformed {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Replace the `InvoiceDate` column with a `Datetime(ms)` column.
///
/// Nulls are kept; a non-null value that matches no known layout is an error.
pub fn parse_invoice_dates(df: &mut DataFrame) -> CohortResult<()> {
    let column = df
        .column(INVOICE_DATE)
        .map_err(|_| missing_column(INVOICE_DATE))?;

    let dtype = column.dtype().clone();
    let millis: Vec<Option<i64>> = match dtype {
        DataType::Datetime(_, _) => return Ok(()),
        DataType::Date => {
            let converted = column.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            df.with_column(converted)?;
            return Ok(());
        }
        DataType::String => {
            let strings = column.str()?;
            let mut millis = Vec::with_capacity(strings.len());
            for (row, value) in strings.into_iter().enumerate() {
                let parsed = match value {
                    None => None,
                    Some(raw) => Some(
                        parse_timestamp(raw)
                            .ok_or_else(|| CohortError::Malformed {
                                path: Default::default(),
                                reason: format!(
                                    "row {}: unrecognised {} value '{}'",
                                    row + 1,
                                    INVOICE_DATE,
                                    raw
                                ),
                            })?
                            .and_utc()
                            .timestamp_millis(),
                    ),
                };
                millis.push(parsed);
            }
            millis
        }
        other => {
            return Err(CohortError::Schema {
                column: INVOICE_DATE.to_string(),
                reason: format!("expected text or datetime, found {other}"),
            })
        }
    };

    let parsed = Series::new(INVOICE_DATE.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    df.with_column(parsed)?;

    Ok(())
}

/// Parse an invoice timestamp. Any UTC offset is discarded.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Fail with the first of `columns` missing from `df`
pub fn require_columns(df: &DataFrame, columns: &[&str]) -> CohortResult<()> {
    match columns.iter().find(|name| df.column(name).is_err()) {
        Some(name) => Err(missing_column(name)),
        None => Ok(()),
    }
}

fn missing_column(name: &str) -> CohortError {
    CohortError::MissingColumn {
        column: name.to_string(),
    }
}
