//! Heatmap rendering of cohort matrices using Plotters

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::{CohortError, CohortResult};
use crate::model::{CohortMatrix, CohortSummary, CohortTables};

pub const RETENTION_FILE: &str = "retention-rates.jpg";
pub const CUSTOMERS_FILE: &str = "number-of-customers.jpg";
pub const MONETARY_FILE: &str = "monetary-value.jpg";

/// Diverging blue to red ramp
const COOLWARM: [RGBColor; 3] = [
    RGBColor(59, 76, 192),
    RGBColor(221, 221, 221),
    RGBColor(180, 4, 38),
];

/// Sequential blue-purple ramp
const BLUE_PURPLE: [RGBColor; 3] = [
    RGBColor(247, 252, 253),
    RGBColor(140, 150, 198),
    RGBColor(77, 0, 75),
];

/// The three heatmaps of a retention report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Retention,
    Customers,
    Monetary,
}

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Retention, ChartKind::Customers, ChartKind::Monetary];

    pub fn file_name(&self) -> &'static str {
        match self {
            ChartKind::Retention => RETENTION_FILE,
            ChartKind::Customers => CUSTOMERS_FILE,
            ChartKind::Monetary => MONETARY_FILE,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ChartKind::Retention => "Monthly Customer Retention Rates",
            ChartKind::Customers => "Number of Customers",
            ChartKind::Monetary => "Monetary Value",
        }
    }

    fn size(&self) -> (u32, u32) {
        match self {
            ChartKind::Monetary => (1400, 1000),
            _ => (1000, 600),
        }
    }

    fn palette(&self) -> &'static [RGBColor] {
        match self {
            ChartKind::Customers => &BLUE_PURPLE,
            _ => &COOLWARM,
        }
    }

    fn annotation_size(&self) -> f64 {
        match self {
            ChartKind::Monetary => 11.0,
            _ => 14.0,
        }
    }

    /// Cell annotation text
    pub fn format_cell(&self, value: f64) -> String {
        match self {
            ChartKind::Retention => format!("{:.0}%", value * 100.0),
            ChartKind::Customers => format!("{:.0}", value),
            ChartKind::Monetary => format!("{:.2}", value),
        }
    }
}

/// Outcome of each chart of a [`render_report`] call
#[derive(Debug)]
pub struct RenderReport {
    pub results: Vec<(ChartKind, CohortResult<PathBuf>)>,
}

impl RenderReport {
    pub fn written(&self) -> Vec<&Path> {
        self.results
            .iter()
            .filter_map(|(_, result)| result.as_ref().ok().map(PathBuf::as_path))
            .collect()
    }

    pub fn failures(&self) -> Vec<(ChartKind, &CohortError)> {
        self.results
            .iter()
            .filter_map(|(kind, result)| result.as_ref().err().map(|e| (*kind, e)))
            .collect()
    }

    pub fn all_written(&self) -> bool {
        self.results.iter().all(|(_, result)| result.is_ok())
    }
}

/// Render the retention, customer count and monetary heatmaps into `output_dir`.
///
/// A chart that fails is logged and the remaining charts are still attempted.
pub fn render_report(
    retention: &CohortMatrix,
    tables: &CohortTables,
    output_dir: &Path,
) -> RenderReport {
    let charts = [
        (ChartKind::Retention, retention),
        (ChartKind::Customers, &tables.counts),
        (ChartKind::Monetary, &tables.monetary),
    ];

    let results = charts
        .into_iter()
        .map(|(kind, matrix)| {
            let result = render_heatmap(matrix, kind, output_dir);
            if let Err(ref e) = result {
                log::error!("{} chart not written: {}", kind.title(), e);
            }
            (kind, result)
        })
        .collect();

    RenderReport { results }
}

/// Render one heatmap to `output_dir/<kind file name>`; the directory must exist
pub fn render_heatmap(
    matrix: &CohortMatrix,
    kind: ChartKind,
    output_dir: &Path,
) -> CohortResult<PathBuf> {
    if !output_dir.is_dir() {
        return Err(CohortError::OutputDirMissing {
            path: output_dir.to_path_buf(),
        });
    }

    let output_path = output_dir.join(kind.file_name());
    draw_heatmap(matrix, kind, &output_path).map_err(|e| CohortError::Render {
        path: output_path.clone(),
        reason: format!("{e:#}"),
    })?;

    log::info!("{} saved to: {}", kind.title(), output_path.display());
    Ok(output_path)
}

/// Draw the chart. The drawing area is owned by this call and released on return.
fn draw_heatmap(matrix: &CohortMatrix, kind: ChartKind, output_path: &Path) -> crate::Result<()> {
    if matrix.is_empty() {
        anyhow::bail!("nothing to plot, the matrix is empty");
    }

    let rows = matrix.nrows() as i32;
    let cols = matrix.ncols() as i32;
    let months = matrix.months();
    let offsets = matrix.offsets();

    let (lo, hi) = matrix.value_range().unwrap_or((0.0, 1.0));
    let span = if hi > lo { hi - lo } else { 1.0 };

    let root = BitMapBackend::new(output_path, kind.size()).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(kind.title(), ("sans-serif", 24.0))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d((0..cols).into_segmented(), (0..rows).into_segmented())?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(cols as usize + 1)
        .y_labels(rows as usize + 1)
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(c) => offsets
                .get(*c as usize)
                .map(|o| o.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .y_label_formatter(&|v| match v {
            // Earliest cohort is drawn at the top
            SegmentValue::CenterOf(y) => months
                .get((rows - 1 - *y) as usize)
                .map(|m| m.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .x_desc("Cohort Index")
        .y_desc("First Purchase Month")
        .axis_desc_style(("sans-serif", 15.0))
        .draw()?;

    let mut cells = Vec::new();
    let mut borders = Vec::new();
    let mut labels = Vec::new();

    for (r, row) in matrix.values().outer_iter().enumerate() {
        let y = rows - 1 - r as i32;
        for (c, cell) in row.iter().enumerate() {
            let Some(value) = cell else { continue };
            let x = c as i32;
            let corners = [
                (edge(x, cols), edge(y, rows)),
                (edge(x + 1, cols), edge(y + 1, rows)),
            ];
            let fill = interpolate(kind.palette(), (value - lo) / span);

            cells.push(Rectangle::new(corners.clone(), fill.filled()));
            borders.push(Rectangle::new(corners, WHITE.stroke_width(1)));

            let style = ("sans-serif", kind.annotation_size())
                .into_font()
                .color(&contrast_color(&fill))
                .pos(Pos::new(HPos::Center, VPos::Center));
            labels.push(Text::new(
                kind.format_cell(*value),
                (SegmentValue::CenterOf(x), SegmentValue::CenterOf(y)),
                style,
            ));
        }
    }

    chart.draw_series(cells)?;
    chart.draw_series(borders)?;
    chart.draw_series(labels)?;

    root.present()?;
    Ok(())
}

/// Segment boundary `i` of an axis with `n` segments
fn edge(i: i32, n: i32) -> SegmentValue<i32> {
    if i < n {
        SegmentValue::Exact(i)
    } else {
        SegmentValue::Last
    }
}

/// Linear interpolation along a colour ramp, `t` in [0, 1]
fn interpolate(palette: &[RGBColor], t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    if palette.len() < 2 {
        return palette.first().copied().unwrap_or(BLACK);
    }

    let scaled = t * (palette.len() - 1) as f64;
    let idx = (scaled.floor() as usize).min(palette.len() - 2);
    let frac = scaled - idx as f64;
    let (a, b) = (palette[idx], palette[idx + 1]);
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;

    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Black text on light cells, white on dark ones
fn contrast_color(fill: &RGBColor) -> RGBColor {
    let luminance = 0.299 * fill.0 as f64 + 0.587 * fill.1 as f64 + 0.114 * fill.2 as f64;
    if luminance > 140.0 {
        BLACK
    } else {
        WHITE
    }
}

/// Print cohort statistics to console
pub fn print_cohort_summary(summary: &CohortSummary) {
    println!("\n=== Cohort Statistics ===");
    println!("Number of cohorts: {}", summary.cohort_count);
    println!("Customers across all cohorts: {:.0}", summary.total_customers);
    if let Some((month, size)) = summary.largest_cohort {
        println!("Largest cohort: {} ({:.0} customers)", month, size);
    }
    println!("Months covered: {}", summary.span_months + 1);

    println!("\nMean retention by cohort index:");
    println!("  Index | Cohorts | Retention");
    println!("  ------|---------|----------");
    for row in &summary.mean_retention {
        println!(
            "  {:5} | {:7} | {:8.1}%",
            row.cohort_index,
            row.cohorts,
            row.mean * 100.0
        );
    }
}
