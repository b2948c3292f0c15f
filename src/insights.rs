//! KPI summaries for the Overview and Insights pages.

use crate::filter::{REGION_COLUMN, RESOURCE_COLUMN};
use crate::ops::{basic_stats, group_by_key_sum, unique_values, GroupKey, DATE_COLUMN};
use crate::table::{Row, Table};
use crate::value::{coerce_number, NumericPolicy, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const CPU_COLUMN: &str = "usage_cpu";
pub const STORAGE_COLUMN: &str = "usage_storage";
pub const USERS_COLUMN: &str = "active_users";
pub const HOLIDAY_COLUMN: &str = "holiday";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewKpis {
    pub records: usize,
    pub regions: usize,
    pub avg_cpu: Option<f64>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
}

/// Headline numbers for a usage table.
///
/// The date range is the first and last present `date` in table order, not the
/// minimum and maximum.
pub fn overview(table: &Table) -> OverviewKpis {
    let dates: Vec<String> = table
        .column_values(DATE_COLUMN)
        .filter(|v| !v.is_missing())
        .map(|v| v.key_string().chars().take(10).collect())
        .collect();
    OverviewKpis {
        records: table.row_count(),
        regions: unique_values(table, REGION_COLUMN).len(),
        avg_cpu: basic_stats(table, CPU_COLUMN).mean,
        date_start: dates.first().cloned(),
        date_end: dates.last().cloned(),
    }
}

/// Sum of `column` per key, sorted by key (weekday keys in Sun..Sat order).
pub fn totals_by(table: &Table, key: &GroupKey, column: &str) -> Vec<(String, f64)> {
    let sums = group_by_key_sum(table, key, &[column]);
    sums.rows()
        .iter()
        .map(|row| {
            let label = row.0[0].key_string();
            let total = row
                .get(1)
                .and_then(|v| coerce_number(v, NumericPolicy::Zero))
                .unwrap_or(0.0);
            (label, total)
        })
        .collect()
}

/// Mean of `column` per key over rows where it is a finite number, sorted by key.
/// Keys with no such rows are omitted.
pub fn mean_by(table: &Table, key: &GroupKey, column: &str) -> Vec<(String, f64)> {
    let mut acc: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (i, value) in table.column_values(column).enumerate() {
        let Some(k) = key.key_of(table, i) else {
            continue;
        };
        if let Some(v) = coerce_number(value, NumericPolicy::Exclude) {
            let entry = acc.entry(k).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    acc.into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect()
}

/// First entry with the largest value.
pub fn argmax(entries: &[(String, f64)]) -> Option<&(String, f64)> {
    entries
        .iter()
        .fold(None, |best: Option<&(String, f64)>, entry| match best {
            Some(b) if b.1 >= entry.1 => Some(b),
            _ => Some(entry),
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightKpis {
    /// Weekday with the largest total CPU.
    pub busiest_weekday: Option<String>,
    /// Region with the largest mean CPU.
    pub highest_region: Option<String>,
    /// Month (`YYYY-MM`) with the largest total CPU.
    pub peak_month: Option<String>,
}

pub fn insights(table: &Table) -> InsightKpis {
    if table.is_empty() {
        return InsightKpis {
            busiest_weekday: None,
            highest_region: None,
            peak_month: None,
        };
    }
    // A dense weekday axis would name Sunday even with no dated rows; only count real days.
    let weekdays: Vec<(String, f64)> = totals_by(table, &GroupKey::Weekday, CPU_COLUMN);
    let has_weekdays = (0..table.row_count()).any(|i| GroupKey::Weekday.key_of(table, i).is_some());
    let busiest_weekday = if has_weekdays {
        argmax(&weekdays).map(|(k, _)| k.clone())
    } else {
        None
    };
    let regions = mean_by(table, &GroupKey::Column(REGION_COLUMN.to_string()), CPU_COLUMN);
    let months = totals_by(table, &GroupKey::Month, CPU_COLUMN);
    InsightKpis {
        busiest_weekday,
        highest_region: argmax(&regions).map(|(k, _)| k.clone()),
        peak_month: argmax(&months).map(|(k, _)| k.clone()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HolidayImpact {
    pub holiday_avg_cpu: f64,
    pub regular_avg_cpu: f64,
    /// Holiday mean relative to the regular mean, in percent. `None` when the regular
    /// mean is zero.
    pub percentage: Option<f64>,
}

/// Read a `holiday` cell: 1/0 or true/false. Anything else is neither kind of day.
fn holiday_flag(value: &Value) -> Option<bool> {
    match coerce_number(value, NumericPolicy::Exclude) {
        Some(n) if n == 1.0 => Some(true),
        Some(n) if n == 0.0 => Some(false),
        Some(_) => None,
        None => match value.as_str()?.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
    }
}

/// Mean CPU on holidays against other days.
///
/// `None` unless both holidays and regular days have CPU readings.
pub fn holiday_impact(table: &Table) -> Option<HolidayImpact> {
    let mean_cpu = |holiday: bool| {
        let days =
            table.filter_rows(|t, i| holiday_flag(t.value(i, HOLIDAY_COLUMN)) == Some(holiday));
        basic_stats(&days, CPU_COLUMN).mean
    };
    let holiday_avg_cpu = mean_cpu(true)?;
    let regular_avg_cpu = mean_cpu(false)?;
    let percentage = (regular_avg_cpu != 0.0)
        .then(|| (holiday_avg_cpu - regular_avg_cpu) / regular_avg_cpu * 100.0);
    Some(HolidayImpact {
        holiday_avg_cpu,
        regular_avg_cpu,
        percentage,
    })
}

/// Largest value of a column and the row it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peak {
    pub value: f64,
    pub date: Option<String>,
    pub region: Option<String>,
    pub resource_type: Option<String>,
}

/// Largest finite value of `column`, located at the first row holding it.
pub fn peak(table: &Table, column: &str) -> Option<Peak> {
    let max = basic_stats(table, column).max?;
    let row = table
        .column_values(column)
        .position(|v| coerce_number(v, NumericPolicy::Exclude) == Some(max))?;
    let label = |name: &str| {
        let v = table.value(row, name);
        (!v.is_missing()).then(|| v.key_string())
    };
    Some(Peak {
        value: max,
        date: label(DATE_COLUMN),
        region: label(REGION_COLUMN),
        resource_type: label(RESOURCE_COLUMN),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakKpis {
    pub cpu: Option<Peak>,
    pub storage: Option<Peak>,
    pub users: Option<Peak>,
}

pub fn peaks(table: &Table) -> PeakKpis {
    PeakKpis {
        cpu: peak(table, CPU_COLUMN),
        storage: peak(table, STORAGE_COLUMN),
        users: peak(table, USERS_COLUMN),
    }
}

/// Mean CPU, storage and active users per resource type, with `cpu_per_user` and
/// `storage_per_user` derived from those means. Sorted by resource type.
///
/// A ratio is `Null` when either mean is missing or the user mean is zero.
pub fn resource_efficiency(table: &Table) -> Table {
    let key = GroupKey::Column(RESOURCE_COLUMN.to_string());
    let means: Vec<HashMap<String, f64>> = [CPU_COLUMN, STORAGE_COLUMN, USERS_COLUMN]
        .iter()
        .map(|column| mean_by(table, &key, column).into_iter().collect())
        .collect();
    let types: BTreeSet<String> = (0..table.row_count())
        .filter_map(|i| key.key_of(table, i))
        .collect();

    let columns = [
        RESOURCE_COLUMN,
        CPU_COLUMN,
        STORAGE_COLUMN,
        USERS_COLUMN,
        "cpu_per_user",
        "storage_per_user",
    ]
    .map(String::from)
    .to_vec();
    let rows = types
        .into_iter()
        .map(|resource| {
            let [cpu, storage, users] = [0, 1, 2].map(|i| means[i].get(&resource).copied());
            let per_user = |x: Option<f64>| match (x, users) {
                (Some(x), Some(u)) if u != 0.0 => Value::Number(x / u),
                _ => Value::Null,
            };
            Row(vec![
                Value::Text(resource),
                cpu.into(),
                storage.into(),
                users.into(),
                per_user(cpu),
                per_user(storage),
            ])
        })
        .collect();
    Table::from_parts_unchecked(columns, rows)
}

/// Pearson correlation of every ordered pair of `columns`, as `row`, `column`,
/// `correlation` records.
///
/// Each pair uses the rows where both values are numbers. Pairs with fewer than two
/// such rows, or where either side is constant, get `Null`.
pub fn correlation_matrix<S: AsRef<str>>(table: &Table, columns: &[S]) -> Table {
    let series: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|c| {
            table
                .column_values(c.as_ref())
                .map(|v| coerce_number(v, NumericPolicy::Exclude))
                .collect()
        })
        .collect();
    let mut rows = Vec::with_capacity(columns.len() * columns.len());
    for (a, xs) in columns.iter().zip(&series) {
        for (b, ys) in columns.iter().zip(&series) {
            rows.push(Row(vec![
                Value::from(a.as_ref()),
                Value::from(b.as_ref()),
                pearson(xs, ys).into(),
            ]));
        }
    }
    let names = ["row", "column", "correlation"].map(String::from).to_vec();
    Table::from_parts_unchecked(names, rows)
}

fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}
