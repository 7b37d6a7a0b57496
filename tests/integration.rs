//! Integration tests for CohortLens

use cohortlens::{
    add_invoice_month, compute_cohort_tables, customer_first_purchase, load_invoices,
    merge_first_purchase, retention_rates, run_pipeline, ChartKind, CohortError,
    PipelineConfig, PipelineOutcome, Stage, YearMonth,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, NamedTempFile};

/// Create a test CSV file from data rows under the standard header
fn create_test_csv(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "InvoiceNo,StockCode,Quantity,InvoiceDate,UnitPrice,CustomerID,Country,TotalPrice").unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    file
}

fn retail_csv() -> NamedTempFile {
    create_test_csv(&[
        // Customer 17850 - December cohort, returns in February
        "536365,85123A,6,12/1/2010 8:26,2.55,17850,United Kingdom,15.30",
        "536365,71053,6,12/1/2010 8:26,3.39,17850,United Kingdom,20.34",
        "539993,22633,6,2/4/2011 10:00,1.85,17850,United Kingdom,11.10",
        // Customer 13047 - December cohort, returns in January
        "536367,84406B,8,12/1/2010 8:34,2.75,13047,United Kingdom,22.00",
        "538000,22752,2,1/10/2011 10:15,7.65,13047,United Kingdom,15.30",
        // Customer 12345 - January cohort, single purchase
        "538500,21730,12,1/20/2011 9:00,1.25,12345,United Kingdom,15.00",
    ])
}

fn ym(year: i32, month: u32) -> YearMonth {
    YearMonth::new(year, month).unwrap()
}

fn config(input: &Path, output_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        input: input.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        render: true,
        verbose: false,
    }
}

fn images_in(dir: &Path) -> Vec<PathBuf> {
    ChartKind::ALL
        .iter()
        .map(|kind| dir.join(kind.file_name()))
        .filter(|path| path.exists())
        .collect()
}

#[test]
fn test_synthetic_tables_match_hand_computation() {
    // 2 customers, 3 invoices spanning 2 months
    let test_file = create_test_csv(&[
        "A1,X,1,2011-01-05 10:00:00,10.00,1,UK,10.00",
        "A2,X,1,2011-02-07 12:30:00,5.00,1,UK,5.00",
        "B1,X,1,2011-01-20 09:00:00,7.50,2,UK,7.50",
    ]);

    let invoices = load_invoices(test_file.path()).unwrap();
    let tagged = add_invoice_month(invoices).unwrap();
    let customers = customer_first_purchase(&tagged).unwrap();
    assert_eq!(customers.height(), 2);

    let merged = merge_first_purchase(tagged, &customers).unwrap();
    let tables = compute_cohort_tables(&merged).unwrap();
    let retention = retention_rates(&tables.counts).unwrap();
    let jan = ym(2011, 1);

    assert_eq!(tables.counts.months(), &[jan]);
    assert_eq!(tables.counts.offsets(), &[0, 1]);
    assert_eq!(tables.counts.get(jan, 0), Some(2.0));
    assert_eq!(tables.counts.get(jan, 1), Some(1.0));
    assert_eq!(tables.monetary.get(jan, 0), Some(17.5));
    assert_eq!(tables.monetary.get(jan, 1), Some(5.0));
    assert_eq!(retention.get(jan, 0), Some(1.0));
    assert_eq!(retention.get(jan, 1), Some(0.5));

    let orders: Vec<u32> = tables.aggregates.iter().map(|a| a.order_count).collect();
    assert_eq!(orders, vec![2, 1]);
}

#[test]
fn test_skipped_month_leaves_gap() {
    // Invoices in months M, M and M+2
    let test_file = create_test_csv(&[
        "1,X,1,3/2/2011 10:00,1.0,42,UK,1.00",
        "2,X,1,3/28/2011 15:45,1.0,42,UK,2.00",
        "3,X,1,5/1/2011 8:00,1.0,42,UK,3.00",
    ]);
    let dir = tempdir().unwrap();
    let mut cfg = config(test_file.path(), dir.path());
    cfg.render = false;

    match run_pipeline(&cfg) {
        PipelineOutcome::Completed { tables, .. } => {
            let march = ym(2011, 3);
            assert_eq!(tables.counts.months(), &[march]);
            assert_eq!(tables.counts.offsets(), &[0, 2]);
            assert_eq!(tables.counts.get(march, 0), Some(1.0));
            assert_eq!(tables.counts.get(march, 1), None);
            assert_eq!(tables.counts.get(march, 2), Some(1.0));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = retail_csv();
    let output_dir = tempdir().unwrap();

    let outcome = run_pipeline(&config(test_file.path(), output_dir.path()));
    let PipelineOutcome::Completed {
        tables,
        retention,
        report,
    } = outcome
    else {
        panic!("pipeline did not complete");
    };

    let dec = ym(2010, 12);
    let jan = ym(2011, 1);
    assert_eq!(tables.counts.months(), &[dec, jan]);
    assert!(tables.counts.same_axes(&tables.monetary));
    assert!(retention.same_axes(&tables.counts));
    assert_eq!(tables.counts.get(dec, 0), Some(2.0));
    assert_eq!(retention.get(dec, 1), Some(0.5));
    assert_eq!(retention.get(dec, 2), Some(0.5));
    assert_eq!(retention.get(jan, 0), Some(1.0));
    assert_eq!(retention.get(jan, 1), None);

    let dec_value = tables.monetary.get(dec, 0).unwrap();
    assert!((dec_value - (15.30 + 20.34 + 22.00)).abs() < 1e-9);

    let report = report.expect("rendering was enabled");
    assert!(report.all_written(), "{:?}", report.failures());
    assert_eq!(images_in(output_dir.path()).len(), 3);
}

#[test]
fn test_cancellation_invoice_late_in_large_file() {
    let rows: Vec<String> = (0..10_500)
        .map(|row| {
            let invoice_no = if row == 10_200 {
                "C540001".to_string()
            } else {
                (536_365 + row).to_string()
            };
            // Customers with an even ID return in February after row 5000
            let date = if row >= 5_000 && row % 2 == 0 {
                "2/9/2011 14:30"
            } else {
                "1/4/2011 10:00"
            };
            format!("{},X,1,{},2.5,{},UK,2.50", invoice_no, date, 12_000 + row % 100)
        })
        .collect();
    let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    let test_file = create_test_csv(&row_refs);
    let dir = tempdir().unwrap();
    let mut cfg = config(test_file.path(), dir.path());
    cfg.render = false;

    match run_pipeline(&cfg) {
        PipelineOutcome::Completed { tables, retention, .. } => {
            let jan = ym(2011, 1);
            assert_eq!(tables.counts.months(), &[jan]);
            assert_eq!(tables.counts.get(jan, 0), Some(100.0));
            assert_eq!(retention.get(jan, 1), Some(0.5));
            let orders: u32 = tables.aggregates.iter().map(|a| a.order_count).sum();
            assert_eq!(orders, 10_500);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn test_missing_input_writes_nothing() {
    let output_dir = tempdir().unwrap();
    let missing = output_dir.path().join("cleaned-data.csv");

    let outcome = run_pipeline(&config(&missing, output_dir.path()));
    assert_eq!(outcome.halted_at(), Some(Stage::Load));
    assert!(matches!(outcome.error(), Some(CohortError::MissingFile { .. })));
    assert!(images_in(output_dir.path()).is_empty());
}

#[test]
fn test_empty_file_halts_at_load() {
    let test_file = NamedTempFile::new().unwrap();
    let output_dir = tempdir().unwrap();

    let outcome = run_pipeline(&config(test_file.path(), output_dir.path()));
    assert_eq!(outcome.halted_at(), Some(Stage::Load));
    assert!(matches!(outcome.error(), Some(CohortError::EmptyFile { .. })));
    assert!(images_in(output_dir.path()).is_empty());
}

#[test]
fn test_header_only_halts_before_plotting() {
    let test_file = create_test_csv(&[]);
    let output_dir = tempdir().unwrap();

    let outcome = run_pipeline(&config(test_file.path(), output_dir.path()));
    assert!(!outcome.is_completed());
    assert!(outcome.halted_at().is_some());
    assert!(images_in(output_dir.path()).is_empty());
}

#[test]
fn test_missing_output_dir_is_reported_per_chart() {
    let test_file = retail_csv();
    let root = tempdir().unwrap();
    let output_dir = root.path().join("figures").join("customer-retention");

    let outcome = run_pipeline(&config(test_file.path(), &output_dir));
    let PipelineOutcome::Completed {
        report: Some(report),
        ..
    } = outcome
    else {
        panic!("pipeline did not complete");
    };

    let failures = report.failures();
    assert_eq!(failures.len(), 3);
    assert!(failures
        .iter()
        .all(|(_, e)| matches!(e, CohortError::OutputDirMissing { .. })));
    assert!(!output_dir.exists());
}
