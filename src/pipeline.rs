//! The four dashboard pages as batch pipelines.
//!
//! Each function takes already-loaded tables, runs the page's table operations, and
//! returns a serializable report. `Display` renders the plain-text form.

use crate::features::engineer_features;
use crate::filter::{RowFilter, REGION_COLUMN, RESOURCE_COLUMN};
use crate::insights::{
    self, HolidayImpact, InsightKpis, OverviewKpis, Peak, PeakKpis, CPU_COLUMN, STORAGE_COLUMN,
    USERS_COLUMN,
};
use crate::ops::{
    basic_stats, forward_fill, group_by_key_sum, join_on_date_with, normalize_dates,
    unique_values, BasicStats, GroupKey, JoinKind, DATE_COLUMN,
};
use crate::table::{Row, Table, TableError};
use crate::value::Value;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Columns summed into the EDA daily series when present.
pub const EDA_METRICS: [&str; 3] = [CPU_COLUMN, STORAGE_COLUMN, USERS_COLUMN];

/// Columns correlated with each other in the analytics report when present.
pub const CORRELATION_COLUMNS: [&str; 5] = [
    CPU_COLUMN,
    STORAGE_COLUMN,
    USERS_COLUMN,
    "economic_index",
    "cloud_market_demand",
];

/// Default file the feature dataset is written to.
pub const FEATURES_OUTPUT: &str = "featured_dataset.csv";

/// Rows of each table shown in text reports.
const TEXT_ROWS: usize = 12;

#[derive(Debug, Clone, Serialize)]
pub struct OverviewReport {
    #[serde(flatten)]
    pub kpis: OverviewKpis,
    /// Total CPU per resource type.
    pub cpu_by_resource: Table,
}

pub fn overview(usage: &Table) -> OverviewReport {
    OverviewReport {
        kpis: insights::overview(usage),
        cpu_by_resource: group_by_key_sum(
            usage,
            &GroupKey::Column(RESOURCE_COLUMN.to_string()),
            &[CPU_COLUMN],
        ),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EdaReport {
    pub records: usize,
    pub regions: Vec<Value>,
    pub cpu: BasicStats,
    pub storage: BasicStats,
    /// Per-date sums of the metric columns.
    pub daily: Table,
    pub cpu_by_region: Table,
}

/// Normalize dates, filter, then summarize. `metrics` absent from the table are left out
/// of the daily series.
pub fn eda<S: AsRef<str>>(
    usage: &Table,
    filter: &RowFilter,
    metrics: &[S],
) -> Result<EdaReport, TableError> {
    usage.require_columns(&[DATE_COLUMN])?;
    let rows = filter.apply(&normalize_dates(usage, DATE_COLUMN));
    let metrics: Vec<&str> = metrics
        .iter()
        .map(AsRef::as_ref)
        .filter(|m| rows.column_index(m).is_some())
        .collect();
    Ok(EdaReport {
        records: rows.row_count(),
        regions: unique_values(&rows, REGION_COLUMN),
        cpu: basic_stats(&rows, CPU_COLUMN),
        storage: basic_stats(&rows, STORAGE_COLUMN),
        daily: group_by_key_sum(&rows, &GroupKey::Date, &metrics),
        cpu_by_region: group_by_key_sum(
            &rows,
            &GroupKey::Column(REGION_COLUMN.to_string()),
            &[CPU_COLUMN],
        ),
    })
}

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub fill_column: String,
    pub fill_group: Option<String>,
    pub join: JoinKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub usage_rows: usize,
    pub external_rows: usize,
    pub merged_rows: usize,
    pub fill_column: String,
    pub fill_group: Option<String>,
    pub join: JoinKind,
    /// Values the forward-fill supplied.
    pub filled: usize,
    /// Per-date sums of the fill column before and after filling.
    pub comparison: Table,
    /// The joined table, written out by the caller.
    #[serde(skip)]
    pub merged: Table,
}

/// Normalize dates in both inputs, forward-fill the usage table, and join it with the
/// external factors on `date`.
pub fn merge(
    usage: &Table,
    external: &Table,
    options: &MergeOptions,
) -> Result<MergeReport, TableError> {
    usage.require_columns(&[DATE_COLUMN, options.fill_column.as_str()])?;
    external.require_columns(&[DATE_COLUMN])?;
    if let Some(group) = &options.fill_group {
        usage.require_columns(&[group.as_str()])?;
    }

    let usage = normalize_dates(usage, DATE_COLUMN);
    let external = normalize_dates(external, DATE_COLUMN);
    let filled_table = forward_fill(
        &usage,
        &options.fill_column,
        options.fill_group.as_deref(),
    );
    let filled = usage
        .column_values(&options.fill_column)
        .zip(filled_table.column_values(&options.fill_column))
        .filter(|(before, after)| before.is_missing() && !after.is_missing())
        .count();
    let merged = join_on_date_with(&filled_table, &external, options.join);
    debug!(
        usage_rows = usage.row_count(),
        external_rows = external.row_count(),
        merged_rows = merged.row_count(),
        filled,
        "merge"
    );

    Ok(MergeReport {
        usage_rows: usage.row_count(),
        external_rows: external.row_count(),
        merged_rows: merged.row_count(),
        fill_column: options.fill_column.clone(),
        fill_group: options.fill_group.clone(),
        join: options.join,
        filled,
        comparison: fill_comparison(&usage, &filled_table, &options.fill_column),
        merged,
    })
}

fn fill_comparison(before: &Table, after: &Table, column: &str) -> Table {
    let before = group_by_key_sum(before, &GroupKey::Date, &[column]);
    let after = group_by_key_sum(after, &GroupKey::Date, &[column]);
    let columns = vec![
        DATE_COLUMN.to_string(),
        format!("{column}_before"),
        format!("{column}_after"),
    ];
    // Filling never changes dates, so both sides have the same keys in the same order.
    let rows = before
        .rows()
        .iter()
        .zip(after.rows())
        .map(|(b, a)| {
            Row(vec![
                b.0[0].clone(),
                b.get(1).cloned().unwrap_or_default(),
                a.get(1).cloned().unwrap_or_default(),
            ])
        })
        .collect();
    Table::from_parts_unchecked(columns, rows)
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightsReport {
    pub records: usize,
    pub metric: String,
    #[serde(flatten)]
    pub kpis: InsightKpis,
    /// Per-date sums of the metric.
    pub trend: Table,
    /// Total CPU per region.
    pub by_region: Table,
    /// Total CPU per month (`YYYY-MM`).
    pub monthly: Table,
    /// Total CPU per weekday, Sun..Sat.
    pub weekday: Table,
}

pub fn insights(
    features: &Table,
    filter: &RowFilter,
    metric: &str,
) -> Result<InsightsReport, TableError> {
    features.require_columns(&[DATE_COLUMN, metric])?;
    let rows = filter.apply(&normalize_dates(features, DATE_COLUMN));
    Ok(InsightsReport {
        records: rows.row_count(),
        metric: metric.to_string(),
        kpis: insights::insights(&rows),
        trend: group_by_key_sum(&rows, &GroupKey::Date, &[metric]),
        by_region: group_by_key_sum(
            &rows,
            &GroupKey::Column(REGION_COLUMN.to_string()),
            &[CPU_COLUMN],
        ),
        monthly: group_by_key_sum(&rows, &GroupKey::Month, &[CPU_COLUMN]),
        weekday: group_by_key_sum(&rows, &GroupKey::Weekday, &[CPU_COLUMN]),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub records: usize,
    pub holiday_impact: Option<HolidayImpact>,
    pub peaks: PeakKpis,
    /// Mean usage and per-user ratios per resource type.
    pub resource_efficiency: Table,
    /// Pairwise correlations of the [`CORRELATION_COLUMNS`] the table has.
    pub correlations: Table,
}

/// Holiday impact, peaks, resource efficiency and correlations over a merged table.
pub fn analytics(merged: &Table, filter: &RowFilter) -> Result<AnalyticsReport, TableError> {
    merged.require_columns(&[DATE_COLUMN, CPU_COLUMN])?;
    let rows = filter.apply(&normalize_dates(merged, DATE_COLUMN));
    let present: Vec<&str> = CORRELATION_COLUMNS
        .iter()
        .copied()
        .filter(|c| rows.column_index(c).is_some())
        .collect();
    Ok(AnalyticsReport {
        records: rows.row_count(),
        holiday_impact: insights::holiday_impact(&rows),
        peaks: insights::peaks(&rows),
        resource_efficiency: insights::resource_efficiency(&rows),
        correlations: insights::correlation_matrix(&rows, &present),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FeaturesReport {
    pub records: usize,
    /// Columns the feature dataset has beyond its input.
    pub added: Vec<String>,
    /// The feature dataset, written out by the caller.
    #[serde(skip)]
    pub features: Table,
}

/// Derive the feature dataset from a merged table.
pub fn features(merged: &Table) -> Result<FeaturesReport, TableError> {
    let features = engineer_features(merged)?;
    let added = features
        .columns()
        .iter()
        .filter(|c| merged.column_index(c).is_none())
        .cloned()
        .collect();
    Ok(FeaturesReport {
        records: features.row_count(),
        added,
        features,
    })
}

/// Render up to `max_rows` rows as an aligned text grid, noting how many were left out.
pub fn render_table(table: &Table, max_rows: usize) -> String {
    if table.columns().is_empty() {
        return "(no columns)\n".to_string();
    }
    let shown: Vec<Vec<String>> = table
        .rows()
        .iter()
        .take(max_rows)
        .map(|row| row.values().iter().map(render_cell).collect())
        .collect();
    let mut widths: Vec<usize> = table.columns().iter().map(|c| c.chars().count()).collect();
    for row in &shown {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, table.columns().iter().map(String::as_str), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in &shown {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    if table.row_count() > max_rows {
        out.push_str(&format!("... {} more rows\n", table.row_count() - max_rows));
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect();
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Number(n) if n.fract() != 0.0 => format!("{n:.2}"),
        other => other.key_string(),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}"))
}

fn fmt_label(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("n/a")
}

fn fmt_stats(stats: &BasicStats) -> String {
    format!(
        "n={} mean={} min={} max={}",
        stats.n,
        fmt_opt(stats.mean),
        fmt_opt(stats.min),
        fmt_opt(stats.max)
    )
}

impl fmt::Display for OverviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records:    {}", self.kpis.records)?;
        writeln!(f, "Regions:    {}", self.kpis.regions)?;
        writeln!(f, "Avg CPU:    {}", fmt_opt(self.kpis.avg_cpu))?;
        writeln!(
            f,
            "Date range: {} to {}",
            fmt_label(&self.kpis.date_start),
            fmt_label(&self.kpis.date_end)
        )?;
        writeln!(f)?;
        writeln!(f, "CPU by resource type")?;
        write!(f, "{}", render_table(&self.cpu_by_resource, TEXT_ROWS))
    }
}

impl fmt::Display for EdaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let regions: Vec<String> = self.regions.iter().map(Value::key_string).collect();
        writeln!(f, "Records: {}", self.records)?;
        writeln!(f, "Regions: {} ({})", regions.len(), regions.join(", "))?;
        writeln!(f, "CPU:     {}", fmt_stats(&self.cpu))?;
        writeln!(f, "Storage: {}", fmt_stats(&self.storage))?;
        writeln!(f)?;
        writeln!(f, "Daily totals")?;
        write!(f, "{}", render_table(&self.daily, TEXT_ROWS))?;
        writeln!(f)?;
        writeln!(f, "CPU by region")?;
        write!(f, "{}", render_table(&self.cpu_by_region, TEXT_ROWS))
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = match self.join {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
        };
        writeln!(
            f,
            "Merged: {} rows ({} usage, {} external, {} join on date)",
            self.merged_rows, self.usage_rows, self.external_rows, join
        )?;
        match &self.fill_group {
            Some(group) => writeln!(
                f,
                "Forward-filled {} values of {} by {}",
                self.filled, self.fill_column, group
            )?,
            None => writeln!(
                f,
                "Forward-filled {} values of {}",
                self.filled, self.fill_column
            )?,
        }
        writeln!(f)?;
        write!(f, "{}", render_table(&self.merged, TEXT_ROWS))
    }
}

impl fmt::Display for InsightsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records:         {}", self.records)?;
        writeln!(f, "Busiest weekday: {}", fmt_label(&self.kpis.busiest_weekday))?;
        writeln!(f, "Highest region:  {}", fmt_label(&self.kpis.highest_region))?;
        writeln!(f, "Peak month:      {}", fmt_label(&self.kpis.peak_month))?;
        writeln!(f)?;
        writeln!(f, "{} by date", self.metric)?;
        write!(f, "{}", render_table(&self.trend, TEXT_ROWS))?;
        writeln!(f)?;
        writeln!(f, "CPU by region")?;
        write!(f, "{}", render_table(&self.by_region, TEXT_ROWS))?;
        writeln!(f)?;
        writeln!(f, "CPU by month")?;
        write!(f, "{}", render_table(&self.monthly, TEXT_ROWS))?;
        writeln!(f)?;
        writeln!(f, "CPU by weekday")?;
        write!(f, "{}", render_table(&self.weekday, TEXT_ROWS))
    }
}

fn fmt_peak(peak: &Option<Peak>) -> String {
    match peak {
        Some(p) => format!(
            "{} on {} ({}, {})",
            render_cell(&Value::Number(p.value)),
            fmt_label(&p.date),
            fmt_label(&p.region),
            fmt_label(&p.resource_type)
        ),
        None => "n/a".to_string(),
    }
}

impl fmt::Display for AnalyticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records:        {}", self.records)?;
        match &self.holiday_impact {
            Some(impact) => writeln!(
                f,
                "Holiday impact: {} (holiday avg CPU {:.1}, regular {:.1})",
                impact
                    .percentage
                    .map_or_else(|| "n/a".to_string(), |p| format!("{p:+.1}%")),
                impact.holiday_avg_cpu,
                impact.regular_avg_cpu
            )?,
            None => writeln!(f, "Holiday impact: n/a")?,
        }
        writeln!(f, "Peak CPU:       {}", fmt_peak(&self.peaks.cpu))?;
        writeln!(f, "Peak storage:   {}", fmt_peak(&self.peaks.storage))?;
        writeln!(f, "Peak users:     {}", fmt_peak(&self.peaks.users))?;
        writeln!(f)?;
        writeln!(f, "Resource efficiency")?;
        write!(f, "{}", render_table(&self.resource_efficiency, TEXT_ROWS))?;
        writeln!(f)?;
        writeln!(f, "Correlations")?;
        write!(f, "{}", render_table(&self.correlations, TEXT_ROWS * 2))
    }
}

impl fmt::Display for FeaturesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Feature dataset: {} rows, {} added columns",
            self.records,
            self.added.len()
        )?;
        writeln!(f, "Added: {}", self.added.join(", "))?;
        writeln!(f)?;
        write!(f, "{}", render_table(&self.features, TEXT_ROWS))
    }
}
