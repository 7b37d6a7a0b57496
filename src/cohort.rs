//! Cohort stages: month tagging, first purchase, merge, aggregation and retention

use polars::prelude::*;

use crate::data::{
    require_columns, COHORT_INDEX, CUSTOMER_ID, FIRST_PURCHASE_MONTH,
    INVOICE_DATE, INVOICE_MONTH, INVOICE_NO, TOTAL_PRICE,
};
use crate::error::{CohortError, CohortResult};
use crate::model::{CohortAggregate, CohortMatrix, CohortTables, YearMonth};

const CUSTOMER_COUNT: &str = "CustomerCount";
const ORDER_COUNT: &str = "OrderCount";
const MONETARY_VALUE: &str = "MonetaryValue";

/// Add `InvoiceMonth`: `InvoiceDate` truncated to its calendar month.
///
/// The month is stored as a [`YearMonth::ordinal`] (`Int32`); a null date
/// gives a null month.
pub fn add_invoice_month(df: DataFrame) -> CohortResult<DataFrame> {
    let column = df
        .column(INVOICE_DATE)
        .map_err(|_| CohortError::MissingColumn {
            column: INVOICE_DATE.to_string(),
        })?;

    if !matches!(column.dtype(), DataType::Datetime(_, _)) {
        return Err(CohortError::Schema {
            column: INVOICE_DATE.to_string(),
            reason: format!("expected datetime, found {}", column.dtype()),
        });
    }

    let year = col(INVOICE_DATE).dt().year().cast(DataType::Int32);
    let month = col(INVOICE_DATE).dt().month().cast(DataType::Int32);

    let tagged = df
        .lazy()
        .with_column((year * lit(12) + month - lit(1)).alias(INVOICE_MONTH))
        .collect()?;

    Ok(tagged)
}

/// One row per customer with the earliest `InvoiceMonth` seen for them
pub fn customer_first_purchase(df: &DataFrame) -> CohortResult<DataFrame> {
    require_columns(df, &[CUSTOMER_ID, INVOICE_MONTH])?;

    let customers = df
        .clone()
        .lazy()
        .filter(col(CUSTOMER_ID).is_not_null())
        .group_by([col(CUSTOMER_ID)])
        .agg([col(INVOICE_MONTH).min().alias(FIRST_PURCHASE_MONTH)])
        .collect()?;

    log::debug!("Resolved first purchase month for {} customers", customers.height());
    Ok(customers)
}

/// Inner-join invoices with their customer's first purchase month and add `CohortIndex`.
///
/// Invoices whose customer has no first-purchase entry are dropped.
pub fn merge_first_purchase(df: DataFrame, customers: &DataFrame) -> CohortResult<DataFrame> {
    require_columns(&df, &[CUSTOMER_ID, INVOICE_MONTH])?;
    require_columns(customers, &[CUSTOMER_ID, FIRST_PURCHASE_MONTH])?;

    let merged = df
        .lazy()
        .join(
            customers.clone().lazy(),
            [col(CUSTOMER_ID)],
            [col(CUSTOMER_ID)],
            JoinArgs::new(JoinType::Inner),
        )
        .with_column((col(INVOICE_MONTH) - col(FIRST_PURCHASE_MONTH)).alias(COHORT_INDEX))
        .collect()?;

    Ok(merged)
}

/// Group merged invoices by (first purchase month, cohort index) and pivot the
/// customer counts and monetary sums into matrices.
pub fn compute_cohort_tables(df: &DataFrame) -> CohortResult<CohortTables> {
    require_columns(
        df,
        &[FIRST_PURCHASE_MONTH, COHORT_INDEX, CUSTOMER_ID, INVOICE_NO, TOTAL_PRICE],
    )?;

    let price_dtype = df.column(TOTAL_PRICE)?.dtype();
    let numeric = matches!(
        price_dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Null
    );
    if !numeric {
        return Err(CohortError::Schema {
            column: TOTAL_PRICE.to_string(),
            reason: format!("expected numeric values, found {price_dtype}"),
        });
    }

    let grouped = df
        .clone()
        .lazy()
        .group_by([col(FIRST_PURCHASE_MONTH), col(COHORT_INDEX)])
        .agg([
            col(CUSTOMER_ID).n_unique().alias(CUSTOMER_COUNT),
            col(INVOICE_NO).n_unique().alias(ORDER_COUNT),
            col(TOTAL_PRICE)
                .cast(DataType::Float64)
                .sum()
                .alias(MONETARY_VALUE),
        ])
        .collect()?;

    let month_col = grouped.column(FIRST_PURCHASE_MONTH)?.cast(&DataType::Int32)?;
    let offset_col = grouped.column(COHORT_INDEX)?.cast(&DataType::Int32)?;
    let customer_col = grouped.column(CUSTOMER_COUNT)?.cast(&DataType::UInt32)?;
    let order_col = grouped.column(ORDER_COUNT)?.cast(&DataType::UInt32)?;
    let monetary_col = grouped.column(MONETARY_VALUE)?.cast(&DataType::Float64)?;

    let months = month_col.i32()?;
    let offsets = offset_col.i32()?;
    let customer_counts = customer_col.u32()?;
    let order_counts = order_col.u32()?;
    let monetary = monetary_col.f64()?;

    let mut aggregates = Vec::with_capacity(grouped.height());
    for row in 0..grouped.height() {
        let (Some(month), Some(offset)) = (months.get(row), offsets.get(row)) else {
            continue;
        };
        let first_purchase_month = YearMonth::from_ordinal(month);
        let cohort_index = u32::try_from(offset).map_err(|_| {
            CohortError::Shape(format!(
                "negative cohort index {offset} in cohort {first_purchase_month}"
            ))
        })?;

        aggregates.push(CohortAggregate {
            first_purchase_month,
            cohort_index,
            customer_count: customer_counts.get(row).unwrap_or(0),
            order_count: order_counts.get(row).unwrap_or(0),
            monetary_value: monetary.get(row).unwrap_or(0.0),
        });
    }
    aggregates.sort_by_key(|a| (a.first_purchase_month, a.cohort_index));

    Ok(CohortTables::from_aggregates(aggregates))
}

/// Divide every row of the count matrix by its cohort index 0 value.
///
/// A row whose initial size is absent or zero is undefined and comes back
/// entirely absent.
pub fn retention_rates(counts: &CohortMatrix) -> CohortResult<CohortMatrix> {
    if counts.is_empty() {
        return Err(CohortError::Shape("cohort count matrix is empty".to_string()));
    }
    let base_col = counts
        .column_of(0)
        .ok_or_else(|| CohortError::Shape("no column for cohort index 0".to_string()))?;

    let mut values = counts.values().clone();
    for (row_idx, mut row) in values.outer_iter_mut().enumerate() {
        let base = row[base_col];
        match base {
            Some(base) if base != 0.0 => row.mapv_inplace(|cell| cell.map(|c| c / base)),
            _ => {
                log::warn!(
                    "Cohort {} has no initial customers; retention is undefined",
                    counts.months()[row_idx]
                );
                row.fill(None);
            }
        }
    }

    CohortMatrix::new(counts.months().to_vec(), counts.offsets().to_vec(), values)
}
