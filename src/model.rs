//! Cohort data structures: calendar months, aggregate rows and pivoted matrices

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use ndarray::Array2;

use crate::error::{CohortError, CohortResult};

/// A calendar month with no day or time component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Build a month; `month` is 1-based
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Inverse of [`YearMonth::ordinal`]
    pub fn from_ordinal(ordinal: i32) -> Self {
        Self {
            year: ordinal.div_euclid(12),
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    /// Months since year 0, so that month arithmetic is integer subtraction.
    /// This is the representation stored in the `InvoiceMonth` column.
    pub fn ordinal(&self) -> i32 {
        self.year * 12 + self.month as i32 - 1
    }

    /// Whole months elapsed from `earlier` to `self`
    pub fn months_since(&self, earlier: YearMonth) -> i32 {
        self.ordinal() - earlier.ordinal()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One grouped row of the cohort aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct CohortAggregate {
    pub first_purchase_month: YearMonth,
    pub cohort_index: u32,
    /// Distinct customers active at this offset
    pub customer_count: u32,
    /// Distinct invoices at this offset
    pub order_count: u32,
    pub monetary_value: f64,
}

/// 2-D table keyed by first-purchase month (rows) and cohort offset (columns).
///
/// Cells are `None` when no customer of that cohort reached the offset.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortMatrix {
    months: Vec<YearMonth>,
    offsets: Vec<u32>,
    values: Array2<Option<f64>>,
}

impl CohortMatrix {
    pub fn empty() -> Self {
        Self {
            months: Vec::new(),
            offsets: Vec::new(),
            values: Array2::from_elem((0, 0), None),
        }
    }

    /// Build a matrix from explicit axes; `values` must be `months x offsets`
    pub fn new(
        months: Vec<YearMonth>,
        offsets: Vec<u32>,
        values: Array2<Option<f64>>,
    ) -> CohortResult<Self> {
        if values.dim() != (months.len(), offsets.len()) {
            return Err(CohortError::Shape(format!(
                "values are {:?} but axes are {}x{}",
                values.dim(),
                months.len(),
                offsets.len()
            )));
        }
        Ok(Self {
            months,
            offsets,
            values,
        })
    }

    /// Pivot `(month, offset, value)` cells into a matrix.
    ///
    /// Rows and columns are sorted ascending; combinations never seen stay absent.
    pub fn pivot<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (YearMonth, u32, f64)>,
    {
        let cells: Vec<(YearMonth, u32, f64)> = cells.into_iter().collect();

        let months: Vec<YearMonth> = cells
            .iter()
            .map(|(m, _, _)| *m)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let offsets: Vec<u32> = cells
            .iter()
            .map(|(_, o, _)| *o)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let row_of: HashMap<YearMonth, usize> =
            months.iter().enumerate().map(|(i, m)| (*m, i)).collect();
        let col_of: HashMap<u32, usize> =
            offsets.iter().enumerate().map(|(i, o)| (*o, i)).collect();

        let mut values = Array2::from_elem((months.len(), offsets.len()), None);
        for (month, offset, value) in cells {
            values[[row_of[&month], col_of[&offset]]] = Some(value);
        }

        Self {
            months,
            offsets,
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn months(&self) -> &[YearMonth] {
        &self.months
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn values(&self) -> &Array2<Option<f64>> {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.months.len()
    }

    pub fn ncols(&self) -> usize {
        self.offsets.len()
    }

    /// Column position of a cohort offset
    pub fn column_of(&self, offset: u32) -> Option<usize> {
        self.offsets.iter().position(|&o| o == offset)
    }

    pub fn get(&self, month: YearMonth, offset: u32) -> Option<f64> {
        let row = self.months.iter().position(|&m| m == month)?;
        let col = self.column_of(offset)?;
        self.values[[row, col]]
    }

    /// True when both matrices are indexed by the same months and offsets
    pub fn same_axes(&self, other: &CohortMatrix) -> bool {
        self.months == other.months && self.offsets == other.offsets
    }

    /// Finite (min, max) over present cells, used for colour scaling
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .flatten()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Output of the cohort aggregator
#[derive(Debug, Clone)]
pub struct CohortTables {
    pub aggregates: Vec<CohortAggregate>,
    /// Distinct customers per (cohort, offset)
    pub counts: CohortMatrix,
    /// Summed `TotalPrice` per (cohort, offset)
    pub monetary: CohortMatrix,
}

impl CohortTables {
    pub fn empty() -> Self {
        Self {
            aggregates: Vec::new(),
            counts: CohortMatrix::empty(),
            monetary: CohortMatrix::empty(),
        }
    }

    pub fn from_aggregates(aggregates: Vec<CohortAggregate>) -> Self {
        let counts = CohortMatrix::pivot(aggregates.iter().map(|a| {
            (a.first_purchase_month, a.cohort_index, a.customer_count as f64)
        }));
        let monetary = CohortMatrix::pivot(
            aggregates
                .iter()
                .map(|a| (a.first_purchase_month, a.cohort_index, a.monetary_value)),
        );

        Self {
            aggregates,
            counts,
            monetary,
        }
    }
}

/// Highest cohort index reported in the retention summary
pub const SUMMARY_MAX_OFFSET: u32 = 12;

/// Mean retention at one cohort index
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetRetention {
    pub cohort_index: u32,
    /// Cohorts that reached this index
    pub cohorts: usize,
    pub mean: f64,
}

/// Headline statistics over a set of cohorts
#[derive(Debug, Clone, PartialEq)]
pub struct CohortSummary {
    pub cohort_count: usize,
    /// Sum of initial (index 0) cohort sizes
    pub total_customers: f64,
    pub largest_cohort: Option<(YearMonth, f64)>,
    /// Months between the first and the last cohort
    pub span_months: i32,
    pub mean_retention: Vec<OffsetRetention>,
}

impl CohortSummary {
    pub fn new(tables: &CohortTables, retention: &CohortMatrix) -> Self {
        let counts = &tables.counts;
        let initial_sizes: Vec<(YearMonth, f64)> = match counts.column_of(0) {
            Some(col) => counts
                .months()
                .iter()
                .zip(counts.values().column(col))
                .map(|(month, size)| (*month, size.unwrap_or(0.0)))
                .collect(),
            None => Vec::new(),
        };

        let largest_cohort = initial_sizes
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let span_months = match (counts.months().first(), counts.months().last()) {
            (Some(first), Some(last)) => last.months_since(*first),
            _ => 0,
        };

        let mean_retention = retention
            .offsets()
            .iter()
            .enumerate()
            .filter(|(_, offset)| **offset <= SUMMARY_MAX_OFFSET)
            .filter_map(|(col, offset)| {
                let rates: Vec<f64> = retention
                    .values()
                    .column(col)
                    .iter()
                    .flatten()
                    .copied()
                    .collect();
                if rates.is_empty() {
                    return None;
                }
                Some(OffsetRetention {
                    cohort_index: *offset,
                    cohorts: rates.len(),
                    mean: rates.iter().sum::<f64>() / rates.len() as f64,
                })
            })
            .collect();

        Self {
            cohort_count: counts.nrows(),
            total_customers: initial_sizes.iter().map(|(_, size)| size).sum(),
            largest_cohort,
            span_months,
            mean_retention,
        }
    }
}
