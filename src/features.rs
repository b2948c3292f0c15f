//! Derived columns for the feature dataset the Insights page reads.
//!
//! A series is one `(region, resource_type)` pair. Lags and rolling windows walk each
//! series in table order; rows are not re-sorted by date.

use crate::filter::{REGION_COLUMN, RESOURCE_COLUMN};
use crate::insights::{CPU_COLUMN, STORAGE_COLUMN};
use crate::ops::{normalize_dates, parse_day, DATE_COLUMN};
use crate::table::{Table, TableError};
use crate::value::{coerce_number, NumericPolicy, Value, ValueKey};
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use tracing::debug;

/// Row offsets of the CPU lag columns.
pub const LAG_PERIODS: [usize; 3] = [1, 3, 7];

/// Window sizes, in rows, of the rolling CPU columns.
pub const ROLLING_WINDOWS: [usize; 2] = [7, 30];

/// Columns that identify one series.
pub const SERIES_COLUMNS: [&str; 2] = [REGION_COLUMN, RESOURCE_COLUMN];

/// Statistic computed over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingStat {
    Mean,
    Max,
    Min,
}

impl RollingStat {
    pub const ALL: [RollingStat; 3] = [RollingStat::Mean, RollingStat::Max, RollingStat::Min];

    pub fn name(self) -> &'static str {
        match self {
            RollingStat::Mean => "mean",
            RollingStat::Max => "max",
            RollingStat::Min => "min",
        }
    }

    fn apply(self, window: &[f64]) -> Option<f64> {
        if window.is_empty() {
            return None;
        }
        match self {
            RollingStat::Mean => Some(window.iter().sum::<f64>() / window.len() as f64),
            RollingStat::Max => window.iter().copied().reduce(f64::max),
            RollingStat::Min => window.iter().copied().reduce(f64::min),
        }
    }
}

/// Add `month` (1-12), `day_of_week` (Monday is 0), `is_weekend` (1 on Saturday and
/// Sunday, else 0) and `quarter` (1-4), all derived from `date`.
///
/// Rows without a parseable date get `Null` in every calendar column.
pub fn add_calendar_features(table: &Table) -> Table {
    let days: Vec<Option<NaiveDate>> = table
        .column_values(DATE_COLUMN)
        .map(|v| {
            if v.is_missing() {
                None
            } else {
                parse_day(&v.key_string())
            }
        })
        .collect();
    let mut out = table.clone();
    out.set_column("month", calendar_field(&days, |d| d.month()));
    out.set_column(
        "day_of_week",
        calendar_field(&days, |d| d.weekday().num_days_from_monday()),
    );
    out.set_column(
        "is_weekend",
        calendar_field(&days, |d| u32::from(d.weekday().num_days_from_monday() >= 5)),
    );
    out.set_column("quarter", calendar_field(&days, |d| (d.month() - 1) / 3 + 1));
    out
}

fn calendar_field(days: &[Option<NaiveDate>], field: impl Fn(NaiveDate) -> u32) -> Vec<Value> {
    days.iter()
        .map(|d| d.map_or(Value::Null, |d| Value::Number(f64::from(field(d)))))
        .collect()
}

fn group_key(table: &Table, row: usize, column: &str) -> ValueKey {
    let v = table.value(row, column);
    if v.is_missing() {
        ValueKey::Null
    } else {
        v.key()
    }
}

/// Row indices of each series in table order. Rows missing a series value are
/// grouped with the other rows missing it.
fn series_rows(table: &Table, series: &[&str]) -> Vec<Vec<usize>> {
    let mut index: HashMap<Vec<ValueKey>, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for row in 0..table.row_count() {
        let key: Vec<ValueKey> = series.iter().map(|c| group_key(table, row, c)).collect();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }
    groups
}

/// `column` shifted down `periods` rows within each series. The first `periods` rows
/// of a series get `Null`.
pub fn lag(table: &Table, column: &str, series: &[&str], periods: usize) -> Vec<Value> {
    let mut out = vec![Value::Null; table.row_count()];
    for rows in series_rows(table, series) {
        for (pos, &row) in rows.iter().enumerate().skip(periods) {
            out[row] = table.value(rows[pos - periods], column).clone();
        }
    }
    out
}

/// `stat` of `column` over each row and up to `window - 1` earlier rows of its series.
///
/// Values that are not numbers are left out of the window; a window with no numbers
/// gives `Null`.
pub fn rolling(
    table: &Table,
    column: &str,
    series: &[&str],
    window: usize,
    stat: RollingStat,
) -> Vec<Value> {
    let window = window.max(1);
    let mut out = vec![Value::Null; table.row_count()];
    for rows in series_rows(table, series) {
        let values: Vec<Option<f64>> = rows
            .iter()
            .map(|&r| coerce_number(table.value(r, column), NumericPolicy::Exclude))
            .collect();
        for (pos, &row) in rows.iter().enumerate() {
            let start = (pos + 1).saturating_sub(window);
            let numbers: Vec<f64> = values[start..=pos].iter().flatten().copied().collect();
            out[row] = stat.apply(&numbers).map_or(Value::Null, Value::Number);
        }
    }
    out
}

/// `column` divided by the largest value of `column` among rows with the same `group`.
///
/// `Null` where the value is not a number or the group maximum is zero.
pub fn ratio_to_group_max(table: &Table, column: &str, group: &str) -> Vec<Value> {
    let number = |row: usize| coerce_number(table.value(row, column), NumericPolicy::Exclude);
    let mut max: HashMap<ValueKey, f64> = HashMap::new();
    for row in 0..table.row_count() {
        if let Some(x) = number(row) {
            max.entry(group_key(table, row, group))
                .and_modify(|m| *m = m.max(x))
                .or_insert(x);
        }
    }
    (0..table.row_count())
        .map(|row| {
            let x = number(row)?;
            let m = max
                .get(&group_key(table, row, group))
                .copied()
                .filter(|m| *m != 0.0)?;
            Some(x / m)
        })
        .map(|ratio| ratio.map_or(Value::Null, Value::Number))
        .collect()
}

/// Build the feature dataset from a merged usage table.
///
/// Adds the calendar columns, `usage_cpu_lag{n}` for each of [`LAG_PERIODS`],
/// `cpu_roll_{mean,max,min}_{n}` for each of [`ROLLING_WINDOWS`], and
/// `cpu_utilization` and `storage_efficiency` relative to the maximum per resource type.
pub fn engineer_features(merged: &Table) -> Result<Table, TableError> {
    merged.require_columns(&[DATE_COLUMN, CPU_COLUMN])?;
    let mut out = add_calendar_features(&normalize_dates(merged, DATE_COLUMN));

    for periods in LAG_PERIODS {
        let values = lag(&out, CPU_COLUMN, &SERIES_COLUMNS, periods);
        out.set_column(&format!("usage_cpu_lag{periods}"), values);
    }
    for window in ROLLING_WINDOWS {
        for stat in RollingStat::ALL {
            let values = rolling(&out, CPU_COLUMN, &SERIES_COLUMNS, window, stat);
            out.set_column(&format!("cpu_roll_{}_{window}", stat.name()), values);
        }
    }

    let utilization = ratio_to_group_max(&out, CPU_COLUMN, RESOURCE_COLUMN);
    out.set_column("cpu_utilization", utilization);
    if out.column_index(STORAGE_COLUMN).is_some() {
        let efficiency = ratio_to_group_max(&out, STORAGE_COLUMN, RESOURCE_COLUMN);
        out.set_column("storage_efficiency", efficiency);
    }

    debug!(
        rows = out.row_count(),
        columns = out.columns().len(),
        added = out.columns().len().saturating_sub(merged.columns().len()),
        "engineered features"
    );
    Ok(out)
}
