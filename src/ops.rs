//! Table operations behind every dashboard page: statistics, distinct values,
//! forward-fill, joins on `date`, and keyed sums.
//!
//! None of these fail. Unknown columns read as missing, values that are not
//! numbers are excluded or counted as zero (see [`NumericPolicy`]), and every
//! operation accepts the empty table.

use crate::table::{Row, Table};
use crate::value::{coerce_number, NumericPolicy, Value, ValueKey};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Column every join and date-derived key reads.
pub const DATE_COLUMN: &str = "date";

/// Weekday labels in output order; index is days since Sunday.
pub const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Count, mean, min and max of the finite values in one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BasicStats {
    pub n: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

pub fn basic_stats(table: &Table, column: &str) -> BasicStats {
    let mut n = 0usize;
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in table
        .column_values(column)
        .filter_map(|v| coerce_number(v, NumericPolicy::Exclude))
    {
        n += 1;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }
    if n == 0 {
        return BasicStats {
            n: 0,
            mean: None,
            min: None,
            max: None,
        };
    }
    BasicStats {
        n,
        mean: Some(sum / n as f64),
        min: Some(min),
        max: Some(max),
    }
}

/// Distinct non-missing values of `column` in first-occurrence order.
pub fn unique_values(table: &Table, column: &str) -> Vec<Value> {
    let mut seen: HashSet<ValueKey> = HashSet::new();
    table
        .column_values(column)
        .filter(|v| !v.is_missing())
        .filter(|v| seen.insert(v.key()))
        .cloned()
        .collect()
}

/// Forward-fill `column`, returning a new table. The input is left as it was.
///
/// See [`forward_fill_in_place`] for the fill rules.
pub fn forward_fill(table: &Table, column: &str, group_by: Option<&str>) -> Table {
    let mut out = table.clone();
    forward_fill_in_place(&mut out, column, group_by);
    out
}

/// Forward-fill `column` in place.
///
/// Rows are walked in order. Each group (the value of `group_by`, or the whole table
/// when `None`) remembers its last non-missing value of `column`; a missing value is
/// replaced by that memory when there is one and left alone otherwise. Rows whose
/// group value is itself missing form one shared group.
pub fn forward_fill_in_place(table: &mut Table, column: &str, group_by: Option<&str>) {
    let Some(ci) = table.column_index(column) else {
        warn!(column, "forward-fill column not found; table left unchanged");
        return;
    };
    let gi = match group_by {
        Some(name) => match table.column_index(name) {
            Some(gi) => Some(gi),
            None => {
                warn!(group_by = name, "forward-fill group column not found");
                None
            }
        },
        None => None,
    };
    let mut last: HashMap<ValueKey, Value> = HashMap::new();
    let mut filled = 0usize;
    for row in table.rows_mut() {
        // An unknown group column reads as missing in every row: one shared group.
        let key = gi.map_or(ValueKey::Null, |gi| row.0[gi].key());
        let cell = &mut row.0[ci];
        if cell.is_missing() {
            if let Some(prev) = last.get(&key) {
                *cell = prev.clone();
                filled += 1;
            }
        } else {
            last.insert(key, cell.clone());
        }
    }
    debug!(column, ?group_by, filled, groups = last.len(), "forward-fill");
}

/// How rows of the left table without a matching date are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Drop them.
    #[default]
    Inner,
    /// Keep them; columns only the right table has are `Null`.
    Left,
}

impl JoinKind {
    /// Pick the join from the `--left`/`--inner` flags, falling back to the configured
    /// default when neither is given.
    pub fn resolve(left: bool, inner: bool, default_left: bool) -> Self {
        match (left, inner) {
            (true, _) => JoinKind::Left,
            (false, true) => JoinKind::Inner,
            (false, false) if default_left => JoinKind::Left,
            (false, false) => JoinKind::Inner,
        }
    }
}

/// Inner join on `date`. See [`join_on_date_with`].
pub fn join_on_date(left: &Table, right: &Table) -> Table {
    join_on_date_with(left, right, JoinKind::Inner)
}

/// Left join on `date`. See [`join_on_date_with`].
pub fn left_join_on_date(left: &Table, right: &Table) -> Table {
    join_on_date_with(left, right, JoinKind::Left)
}

/// Join two tables on the string form of their `date` columns.
///
/// The right table is indexed first; when it repeats a date, its last row for that
/// date wins. Output columns are the left columns followed by right-only columns, and
/// on a shared column name the right value takes precedence. Output order follows
/// the left table.
pub fn join_on_date_with(left: &Table, right: &Table, kind: JoinKind) -> Table {
    let mut columns: Vec<String> = left.columns().to_vec();
    // For each right column: its position in the output row.
    let right_targets: Vec<usize> = right
        .columns()
        .iter()
        .map(|name| match columns.iter().position(|c| c == name) {
            Some(pos) => pos,
            None => {
                columns.push(name.clone());
                columns.len() - 1
            }
        })
        .collect();

    let mut lookup: HashMap<String, &Row> = HashMap::new();
    if let Some(ri) = right.column_index(DATE_COLUMN) {
        for row in right.rows() {
            let date = &row.0[ri];
            if !date.is_missing() {
                lookup.insert(date.key_string(), row);
            }
        }
    }

    let li = left.column_index(DATE_COLUMN);
    let width = columns.len();
    let mut rows = Vec::with_capacity(left.row_count());
    for row in left.rows() {
        let matched = li
            .map(|li| &row.0[li])
            .filter(|date| !date.is_missing())
            .and_then(|date| lookup.get(&date.key_string()));
        if matched.is_none() && kind == JoinKind::Inner {
            continue;
        }
        let mut values = row.0.clone();
        values.resize(width, Value::Null);
        if let Some(right_row) = matched {
            for (value, &target) in right_row.0.iter().zip(&right_targets) {
                values[target] = value.clone();
            }
        }
        rows.push(Row(values));
    }
    debug!(
        ?kind,
        left_rows = left.row_count(),
        right_keys = lookup.len(),
        output_rows = rows.len(),
        "join on date"
    );
    Table::from_parts_unchecked(columns, rows)
}

/// How rows are bucketed before summing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    /// The `date` value.
    Date,
    /// First 7 characters of `date` (`YYYY-MM`).
    Month,
    /// Weekday of `date` as a 3-letter label; always emits all seven days.
    Weekday,
    /// The value of an arbitrary column, e.g. `region`.
    Column(String),
}

impl GroupKey {
    /// Parse a CLI/config spelling: `date`, `month`, `weekday`, anything else is a column.
    pub fn parse(s: &str) -> Self {
        match s {
            "date" => GroupKey::Date,
            "month" => GroupKey::Month,
            "weekday" => GroupKey::Weekday,
            other => GroupKey::Column(other.to_string()),
        }
    }

    /// Name of the label column in aggregated output.
    pub fn label(&self) -> &str {
        match self {
            GroupKey::Date => "date",
            GroupKey::Month => "month",
            GroupKey::Weekday => "weekday",
            GroupKey::Column(name) => name,
        }
    }

    /// Derive the key of one row, or `None` when it has none.
    pub fn key_of(&self, table: &Table, row: usize) -> Option<String> {
        let source = match self {
            GroupKey::Column(name) => table.value(row, name),
            _ => table.value(row, DATE_COLUMN),
        };
        if source.is_missing() {
            return None;
        }
        let text = source.key_string();
        match self {
            GroupKey::Date | GroupKey::Column(_) => Some(text),
            GroupKey::Month => Some(text.chars().take(7).collect()),
            GroupKey::Weekday => weekday_label(&text).map(str::to_string),
        }
    }
}

/// Weekday label of an ISO date (`YYYY-MM-DD`, anything after the 10th character ignored).
///
/// The date is a plain calendar date; no time zone is involved.
pub fn weekday_label(date: &str) -> Option<&'static str> {
    let parsed = parse_day(date)?;
    Some(WEEKDAYS[parsed.weekday().num_days_from_sunday() as usize])
}

/// Parse the `YYYY-MM-DD` prefix of a date or timestamp.
pub fn parse_day(date: &str) -> Option<NaiveDate> {
    let day: String = date.chars().take(10).collect();
    NaiveDate::parse_from_str(&day, "%Y-%m-%d").ok()
}

/// Sum `sum_columns` per key.
///
/// Missing and non-numeric values count as 0. Output has the key label column
/// followed by the sums, one row per key, sorted by key; weekday output instead has
/// exactly seven rows in Sun..Sat order.
pub fn group_by_key_sum<S: AsRef<str>>(table: &Table, key: &GroupKey, sum_columns: &[S]) -> Table {
    let sums = group_by_sum_with(table, key.label(), |t, row| key.key_of(t, row), sum_columns);
    if *key != GroupKey::Weekday {
        return sums;
    }

    let width = sums.columns().len() - 1;
    let mut by_day: HashMap<&str, &Row> = HashMap::new();
    for row in sums.rows() {
        if let Some(label) = row.0[0].as_str() {
            if let Some(day) = WEEKDAYS.iter().find(|d| **d == label) {
                by_day.insert(*day, row);
            }
        }
    }
    let rows = WEEKDAYS
        .iter()
        .map(|day| match by_day.get(day) {
            Some(row) => (*row).clone(),
            None => {
                let mut values = Vec::with_capacity(width + 1);
                values.push(Value::from(*day));
                values.extend(std::iter::repeat(Value::Number(0.0)).take(width));
                Row(values)
            }
        })
        .collect();
    Table::from_parts_unchecked(sums.columns().to_vec(), rows)
}

/// Sum `sum_columns` per key derived by `key_fn`, labelling the key column `label`.
///
/// Rows for which `key_fn` returns `None` are skipped. Output is sorted by key.
/// A sum column named like the label, or named twice, is kept once so the output has
/// unique columns.
pub fn group_by_sum_with<F, S>(
    table: &Table,
    label: &str,
    mut key_fn: F,
    sum_columns: &[S],
) -> Table
where
    F: FnMut(&Table, usize) -> Option<String>,
    S: AsRef<str>,
{
    let mut seen: HashSet<&str> = HashSet::from([label]);
    let sum_columns: Vec<&str> = sum_columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| seen.insert(*c))
        .collect();
    for name in &sum_columns {
        if table.column_index(name).is_none() {
            warn!(column = *name, "sum column not found; it will sum to 0");
        }
    }
    let indices: Vec<Option<usize>> = sum_columns.iter().map(|c| table.column_index(c)).collect();

    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut skipped = 0usize;
    for (i, row) in table.rows().iter().enumerate() {
        let Some(key) = key_fn(table, i) else {
            skipped += 1;
            continue;
        };
        let totals = groups
            .entry(key)
            .or_insert_with(|| vec![0.0; indices.len()]);
        for (total, ci) in totals.iter_mut().zip(&indices) {
            if let Some(ci) = ci {
                *total += coerce_number(&row.0[*ci], NumericPolicy::Zero).unwrap_or(0.0);
            }
        }
    }
    debug!(label, groups = groups.len(), skipped, "group by key sum");

    let mut columns = Vec::with_capacity(sum_columns.len() + 1);
    columns.push(label.to_string());
    columns.extend(sum_columns.iter().map(|c| c.to_string()));
    let rows = groups
        .into_iter()
        .map(|(key, totals)| {
            let mut values = Vec::with_capacity(totals.len() + 1);
            values.push(Value::Text(key));
            values.extend(totals.into_iter().map(Value::Number));
            Row(values)
        })
        .collect();
    Table::from_parts_unchecked(columns, rows)
}

/// Truncate every present value of `column` to its first 10 characters (`YYYY-MM-DD`),
/// turning timestamps like `2024-01-01 00:00:00` into plain dates.
pub fn normalize_dates(table: &Table, column: &str) -> Table {
    let mut out = table.clone();
    let Some(ci) = out.column_index(column) else {
        return out;
    };
    for row in out.rows_mut() {
        let cell = &mut row.0[ci];
        if !cell.is_missing() {
            let day: String = cell.key_string().chars().take(10).collect();
            *cell = Value::Text(day);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table;

    #[test]
    fn test_basic_stats_skips_non_finite() {
        let t = table!["v"; [10], ["x"], [Option::<f64>::None], [""], [f64::NAN], [30]];
        let s = basic_stats(&t, "v");
        assert_eq!(s.n, 2);
        assert_eq!(s.mean, Some(20.0));
        assert_eq!(s.min, Some(10.0));
        assert_eq!(s.max, Some(30.0));
    }

    #[test]
    fn test_basic_stats_unknown_column() {
        let t = table!["v"; [1]];
        assert_eq!(basic_stats(&t, "w").n, 0);
    }

    #[test]
    fn test_unique_values_type_tagged() {
        let t = table!["v"; [1], ["1"], [1], [""]];
        assert_eq!(unique_values(&t, "v"), vec![Value::from(1), Value::from("1")]);
    }

    #[test]
    fn test_forward_fill_without_group() {
        let t = table!["g", "v"; ["A", 1], ["B", ""], ["A", Option::<f64>::None]];
        let out = forward_fill(&t, "v", None);
        assert_eq!(out.value(1, "v"), &Value::from(1));
        assert_eq!(out.value(2, "v"), &Value::from(1));
    }

    #[test]
    fn test_forward_fill_groups_are_independent() {
        let t = table!["g", "v";
            ["A", 1],
            ["B", Option::<f64>::None],
            ["B", 2],
            ["A", Option::<f64>::None],
        ];
        let out = forward_fill(&t, "v", Some("g"));
        assert_eq!(out.value(1, "v"), &Value::Null);
        assert_eq!(out.value(3, "v"), &Value::from(1));
    }

    #[test]
    fn test_forward_fill_unknown_column_is_noop() {
        let t = table!["g", "v"; ["A", Option::<f64>::None]];
        assert_eq!(forward_fill(&t, "w", Some("g")), t);
    }

    #[test]
    fn test_join_collision_right_wins() {
        let left = table!["date", "x", "note"; ["d", 1, "left"]];
        let right = table!["note", "date", "y"; ["right", "d", 2]];
        let out = join_on_date(&left, &right);
        assert_eq!(out.columns(), &["date", "x", "note", "y"]);
        assert_eq!(out.value(0, "note"), &Value::from("right"));
        assert_eq!(out.value(0, "y"), &Value::from(2));
    }

    #[test]
    fn test_join_numeric_and_text_dates_match() {
        let left = table!["date", "x"; [2024, 1]];
        let right = table!["date", "y"; ["2024", 2]];
        assert_eq!(join_on_date(&left, &right).row_count(), 1);
    }

    #[test]
    fn test_join_without_date_column() {
        let left = table!["x"; [1]];
        let right = table!["date", "y"; ["d", 2]];
        assert!(join_on_date(&left, &right).is_empty());
        assert_eq!(left_join_on_date(&left, &right).row_count(), 1);
    }

    #[test]
    fn test_weekday_label() {
        assert_eq!(weekday_label("2024-01-01"), Some("Mon"));
        assert_eq!(weekday_label("2024-01-07 23:59:59"), Some("Sun"));
        assert_eq!(weekday_label("2024-13-01"), None);
        assert_eq!(weekday_label("yesterday"), None);
    }

    #[test]
    fn test_month_key_and_sorting() {
        let t = table!["date", "v"; ["2024-02-10", 1], ["2024-01-31", 2], ["2024-02-01", "x"]];
        let out = group_by_key_sum(&t, &GroupKey::Month, &["v"]);
        assert_eq!(out.columns(), &["month", "v"]);
        assert_eq!(out.value(0, "month"), &Value::from("2024-01"));
        assert_eq!(out.value(0, "v"), &Value::from(2.0));
        assert_eq!(out.value(1, "month"), &Value::from("2024-02"));
        assert_eq!(out.value(1, "v"), &Value::from(1.0));
    }

    #[test]
    fn test_group_skips_missing_keys() {
        let t = table!["region", "v"; ["East", 1], ["", 5], ["West", 2], ["East", 3]];
        let out = group_by_key_sum(&t, &GroupKey::parse("region"), &["v"]);
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.value(0, "v"), &Value::from(4.0));
        assert_eq!(out.value(1, "region"), &Value::from("West"));
    }

    #[test]
    fn test_group_label_not_duplicated() {
        let t = table!["region", "v"; ["East", 1]];
        let out = group_by_key_sum(&t, &GroupKey::Column("region".into()), &["region", "v"]);
        assert_eq!(out.columns(), &["region", "v"]);
    }

    #[test]
    fn test_group_repeated_sum_column_kept_once() {
        let t = table!["date", "v"; ["2024-01-01", 1], ["2024-01-01", 2]];
        let out = group_by_key_sum(&t, &GroupKey::Date, &["v", "v"]);
        assert_eq!(out.columns(), &["date", "v"]);
        assert_eq!(out.value(0, "v"), &Value::from(3.0));
        assert!(Table::new(out.columns().to_vec(), out.rows().to_vec()).is_ok());
    }

    #[test]
    fn test_join_kind_resolve() {
        assert_eq!(JoinKind::resolve(false, false, false), JoinKind::Inner);
        assert_eq!(JoinKind::resolve(false, false, true), JoinKind::Left);
        assert_eq!(JoinKind::resolve(true, false, false), JoinKind::Left);
        assert_eq!(JoinKind::resolve(false, true, true), JoinKind::Inner);
    }

    #[test]
    fn test_normalize_dates() {
        let t = table!["date"; ["2024-01-01 00:00:00"], [""], [20240101]];
        let out = normalize_dates(&t, "date");
        assert_eq!(out.value(0, "date"), &Value::from("2024-01-01"));
        assert_eq!(out.value(1, "date"), &Value::from(""));
        assert_eq!(out.value(2, "date"), &Value::from("20240101"));
    }
}
