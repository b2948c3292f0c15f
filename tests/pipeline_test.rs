use color_eyre::Result;
use usagedash::insights::CPU_COLUMN;
use usagedash::pipeline::{self, MergeOptions, EDA_METRICS, FEATURES_OUTPUT};
use usagedash::{
    load_table, write_csv, ExportOptions, JoinKind, OpenOptions, RowFilter, TableError, Value,
};

mod common;

use common::{write_sample, EXTERNAL_CSV, USAGE_CSV};

fn load_usage() -> Result<usagedash::Table> {
    let (_dir, path) = write_sample("azure_usage.csv", USAGE_CSV);
    load_table(&path, &OpenOptions::default())
}

fn load_external() -> Result<usagedash::Table> {
    let (_dir, path) = write_sample("external_factors.csv", EXTERNAL_CSV);
    load_table(&path, &OpenOptions::default())
}

#[test]
fn test_overview_pipeline() -> Result<()> {
    let report = pipeline::overview(&load_usage()?);
    assert_eq!(report.kpis.records, 5);
    assert_eq!(report.kpis.regions, 2);
    assert_eq!(report.kpis.avg_cpu, Some(25.0));
    assert_eq!(report.kpis.date_start.as_deref(), Some("2024-01-01"));
    assert_eq!(report.kpis.date_end.as_deref(), Some("2024-02-03"));
    assert_eq!(
        report.cpu_by_resource.value(0, "resource_type"),
        &Value::from("Storage")
    );
    assert_eq!(report.cpu_by_resource.value(0, "usage_cpu"), &Value::from(20.0));
    assert_eq!(report.cpu_by_resource.value(1, "usage_cpu"), &Value::from(80.0));
    Ok(())
}

#[test]
fn test_eda_pipeline_with_date_filter() -> Result<()> {
    let usage = load_usage()?;
    let filter = RowFilter::new().with_start("2024-01-01").with_end("2024-01-31");
    let report = pipeline::eda(&usage, &filter, &EDA_METRICS)?;

    assert_eq!(report.records, 4);
    assert_eq!(report.cpu.n, 4);
    assert_eq!(report.storage.n, 2);
    assert_eq!(
        report.daily.columns(),
        &["date", "usage_cpu", "usage_storage", "active_users"]
    );
    assert_eq!(report.daily.row_count(), 3);
    assert_eq!(report.daily.value(0, "usage_cpu"), &Value::from(30.0));
    assert_eq!(report.daily.value(0, "active_users"), &Value::from(12.0));
    Ok(())
}

#[test]
fn test_merge_pipeline_exports_joined_rows() -> Result<()> {
    let usage = load_usage()?;
    let external = load_external()?;
    let options = MergeOptions {
        fill_column: "usage_storage".to_string(),
        fill_group: Some("region".to_string()),
        join: JoinKind::Inner,
    };
    let report = pipeline::merge(&usage, &external, &options)?;

    // 2024-01-06 has no external row
    assert_eq!(report.merged_rows, 4);
    assert_eq!(report.filled, 1);
    let merged = &report.merged;
    assert_eq!(merged.value(2, "date"), &Value::from("2024-01-02"));
    assert_eq!(merged.value(2, "usage_storage"), &Value::from(100));
    // Last external row for a repeated date wins
    assert_eq!(merged.value(2, "temperature"), &Value::from(8));
    assert_eq!(merged.columns().last().map(String::as_str), Some("holiday"));

    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("cleaned_merged.csv");
    write_csv(merged, &path, &ExportOptions::default())?;
    let reloaded = load_table(&path, &OpenOptions::default())?;
    assert_eq!(reloaded.row_count(), 4);
    assert_eq!(reloaded.columns(), merged.columns());
    Ok(())
}

#[test]
fn test_merge_pipeline_left_join() -> Result<()> {
    let options = MergeOptions {
        fill_column: "usage_storage".to_string(),
        fill_group: Some("region".to_string()),
        join: JoinKind::Left,
    };
    let report = pipeline::merge(&load_usage()?, &load_external()?, &options)?;
    assert_eq!(report.merged_rows, 5);
    assert_eq!(report.merged.value(3, "temperature"), &Value::Null);
    Ok(())
}

#[test]
fn test_merge_pipeline_requires_date() -> Result<()> {
    let external = usagedash::table!["temperature"; [1]];
    let options = MergeOptions {
        fill_column: "usage_storage".to_string(),
        ..Default::default()
    };
    let err = pipeline::merge(&load_usage()?, &external, &options).unwrap_err();
    assert_eq!(err, TableError::UnknownColumn("date".to_string()));
    Ok(())
}

#[test]
fn test_insights_pipeline() -> Result<()> {
    let report = pipeline::insights(&load_usage()?, &RowFilter::new(), CPU_COLUMN)?;
    assert_eq!(report.records, 5);
    // Saturday 2024-01-06 carries 40 of the CPU total
    assert_eq!(report.kpis.busiest_weekday.as_deref(), Some("Sat"));
    assert_eq!(report.kpis.highest_region.as_deref(), Some("West US"));
    assert_eq!(report.kpis.peak_month.as_deref(), Some("2024-01"));
    assert_eq!(report.weekday.row_count(), 7);
    assert_eq!(report.monthly.row_count(), 2);
    Ok(())
}

#[test]
fn test_insights_pipeline_empty_after_filter() -> Result<()> {
    let filter = RowFilter::new().with_region("Nowhere");
    let report = pipeline::insights(&load_usage()?, &filter, CPU_COLUMN)?;
    assert_eq!(report.records, 0);
    assert_eq!(report.kpis.busiest_weekday, None);
    assert_eq!(report.kpis.highest_region, None);
    assert_eq!(report.weekday.row_count(), 7);
    Ok(())
}

fn merged_sample() -> Result<usagedash::Table> {
    let options = MergeOptions {
        fill_column: "usage_storage".to_string(),
        fill_group: Some("region".to_string()),
        join: JoinKind::Inner,
    };
    Ok(pipeline::merge(&load_usage()?, &load_external()?, &options)?.merged)
}

#[test]
fn test_analytics_on_merged_output() -> Result<()> {
    let report = pipeline::analytics(&merged_sample()?, &RowFilter::new())?;
    assert_eq!(report.records, 4);

    // 2024-01-01 is the only holiday: CPU 10 and 20 against 30 on regular days
    let impact = report.holiday_impact.expect("holiday impact");
    assert_eq!(impact.holiday_avg_cpu, 15.0);
    assert_eq!(impact.regular_avg_cpu, 30.0);
    assert_eq!(impact.percentage, Some(-50.0));

    let cpu = report.peaks.cpu.expect("cpu peak");
    assert_eq!(cpu.value, 30.0);
    assert_eq!(cpu.date.as_deref(), Some("2024-01-02"));
    assert_eq!(cpu.resource_type.as_deref(), Some("VM"));
    let storage = report.peaks.storage.expect("storage peak");
    assert_eq!(storage.date.as_deref(), Some("2024-01-01"));

    let efficiency = &report.resource_efficiency;
    assert_eq!(efficiency.value(1, "resource_type"), &Value::from("VM"));
    assert_eq!(efficiency.value(1, "active_users"), &Value::from(7.0));
    assert_eq!(efficiency.value(0, "active_users"), &Value::from(4.5));
    assert_eq!(efficiency.value(1, "storage_per_user"), &Value::from(100.0 / 7.0));

    // usage_cpu, usage_storage and active_users, every ordered pair
    assert_eq!(report.correlations.row_count(), 9);
    Ok(())
}

#[test]
fn test_features_export_feeds_insights() -> Result<()> {
    let report = pipeline::features(&merged_sample()?)?;
    let features = &report.features;
    assert_eq!(features.value(0, "day_of_week"), &Value::from(0));
    assert_eq!(features.value(2, "usage_cpu_lag1"), &Value::from(10));
    assert_eq!(features.value(2, "cpu_roll_max_7"), &Value::from(30.0));
    assert_eq!(features.value(1, "cpu_utilization"), &Value::from(1.0));

    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join(FEATURES_OUTPUT);
    write_csv(features, &path, &ExportOptions::default())?;
    let reloaded = load_table(&path, &OpenOptions::default())?;
    assert_eq!(reloaded.columns(), features.columns());

    let insights = pipeline::insights(&reloaded, &RowFilter::new(), CPU_COLUMN)?;
    assert_eq!(insights.records, 4);
    assert_eq!(insights.kpis.peak_month.as_deref(), Some("2024-01"));
    Ok(())
}

#[test]
fn test_reports_render_as_json_and_text() -> Result<()> {
    let report = pipeline::insights(&load_usage()?, &RowFilter::new(), CPU_COLUMN)?;
    let json = serde_json::to_value(&report)?;
    assert_eq!(json["busiest_weekday"], "Sat");
    assert_eq!(json["weekday"].as_array().map(Vec::len), Some(7));

    let text = report.to_string();
    assert!(text.contains("Busiest weekday: Sat"));
    assert!(text.contains("CPU by weekday"));
    Ok(())
}
