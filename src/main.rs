use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use usagedash::config::{AppConfig, ConfigManager};
use usagedash::insights::CPU_COLUMN;
use usagedash::pipeline::{self, render_table, MergeOptions, EDA_METRICS, FEATURES_OUTPUT};
use usagedash::{
    basic_stats, group_by_key_sum, load_table, unique_values, write_csv, Args, Command,
    ExportOptions, FilterArgs, GroupKey, JoinKind, OpenOptions, RowFilter, Table, APP_NAME,
};

fn init_logging(config: &AppConfig, debug: bool) {
    let level = if debug {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    // RUST_LOG wins over the config and --debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn row_filter(args: &FilterArgs) -> RowFilter {
    RowFilter {
        region: args.region.clone(),
        resource_type: args.resource.clone(),
        start: args.from.clone(),
        end: args.to.clone(),
    }
}

fn emit<T: Serialize + Display>(report: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

fn emit_table(table: &Table, max_rows: usize, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&table.head(max_rows))?);
    } else {
        print!("{}", render_table(table, max_rows));
    }
    Ok(())
}

fn load(path: &Path, opts: &OpenOptions) -> Result<Table> {
    let table = load_table(path, opts)?;
    info!(path = %path.display(), rows = table.row_count(), "loaded");
    Ok(table)
}

fn run(args: Args, config: AppConfig) -> Result<()> {
    let opts = OpenOptions::from_args_and_config(&args.load, &config);
    let json = args.json || config.display.output == "json";

    match args.command {
        Command::Overview { path } => {
            let usage = load(&path, &opts)?;
            emit(&pipeline::overview(&usage), json)
        }
        Command::Eda { path, filter } => {
            let usage = load(&path, &opts)?;
            let report = pipeline::eda(&usage, &row_filter(&filter), &EDA_METRICS)
                .wrap_err_with(|| format!("Cannot run EDA on {}", path.display()))?;
            emit(&report, json)
        }
        Command::Merge {
            usage,
            external,
            fill_column,
            fill_group,
            left,
            inner,
            output,
            output_compression,
        } => {
            let usage_table = load(&usage, &opts)?;
            let external_table = load(&external, &opts)?;
            let options = MergeOptions {
                fill_column: fill_column.unwrap_or(config.merge.fill_column),
                // An empty group in the config means "fill across all rows"
                fill_group: fill_group
                    .or(config.merge.fill_group)
                    .filter(|g| !g.is_empty()),
                join: JoinKind::resolve(left, inner, config.merge.left_join),
            };
            let report = pipeline::merge(&usage_table, &external_table, &options)
                .wrap_err("Cannot merge usage with external factors")?;

            let output = output.unwrap_or_else(|| PathBuf::from(&config.merge.output));
            let export = ExportOptions::default().with_compression(output_compression);
            write_csv(&report.merged, &output, &export)?;
            emit(&report, json)?;
            if !json {
                println!("\nWrote {}", output.display());
            }
            Ok(())
        }
        Command::Insights {
            path,
            filter,
            metric,
        } => {
            let features = load(&path, &opts)?;
            let metric = metric.unwrap_or_else(|| CPU_COLUMN.to_string());
            let report = pipeline::insights(&features, &row_filter(&filter), &metric)
                .wrap_err_with(|| format!("Cannot compute insights for {}", path.display()))?;
            emit(&report, json)
        }
        Command::Analytics { path, filter } => {
            let merged = load(&path, &opts)?;
            let report = pipeline::analytics(&merged, &row_filter(&filter))
                .wrap_err_with(|| format!("Cannot compute analytics for {}", path.display()))?;
            emit(&report, json)
        }
        Command::Features {
            path,
            output,
            output_compression,
        } => {
            let merged = load(&path, &opts)?;
            let report = pipeline::features(&merged)
                .wrap_err_with(|| format!("Cannot derive features from {}", path.display()))?;

            let output = output.unwrap_or_else(|| PathBuf::from(FEATURES_OUTPUT));
            let export = ExportOptions::default().with_compression(output_compression);
            write_csv(&report.features, &output, &export)?;
            emit(&report, json)?;
            if !json {
                println!("\nWrote {}", output.display());
            }
            Ok(())
        }
        Command::Stats { path, column } => {
            let table = load(&path, &opts)?;
            table.require_columns(&[column.as_str()])?;
            let stats = basic_stats(&table, &column);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                let show = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| v.to_string());
                println!("column: {column}");
                println!("n:      {}", stats.n);
                println!("mean:   {}", show(stats.mean));
                println!("min:    {}", show(stats.min));
                println!("max:    {}", show(stats.max));
            }
            Ok(())
        }
        Command::Unique { path, column } => {
            let table = load(&path, &opts)?;
            table.require_columns(&[column.as_str()])?;
            let values = unique_values(&table, &column);
            if json {
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else {
                for value in &values {
                    println!("{value}");
                }
            }
            Ok(())
        }
        Command::Aggregate {
            path,
            by,
            sum,
            filter,
            output,
        } => {
            let table = load(&path, &opts)?;
            let key = GroupKey::parse(&by);
            if let GroupKey::Column(name) = &key {
                table.require_columns(&[name.as_str()])?;
            }
            table.require_columns(sum.as_slice())?;
            let rows = row_filter(&filter).apply(&table);
            let sums = group_by_key_sum(&rows, &key, sum.as_slice());
            match output {
                Some(output) => {
                    write_csv(&sums, &output, &ExportOptions::default())?;
                    info!(path = %output.display(), rows = sums.row_count(), "wrote aggregate");
                    Ok(())
                }
                None => emit_table(&sums, sums.row_count(), json),
            }
        }
        Command::Preview { path, rows } => {
            let table = load(&path, &opts)?;
            let rows = rows.unwrap_or(config.display.preview_rows);
            emit_table(&table, rows, json)
        }
        // Handled before the config is loaded
        Command::GenerateConfig { .. } => Ok(()),
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // Runs before loading so a broken config file can be replaced
    if let Command::GenerateConfig { force } = args.command {
        let manager = ConfigManager::new(APP_NAME)?;
        let path = manager.write_default_config(force)?;
        println!("Configuration file written to {}", path.display());
        return Ok(());
    }

    let config = AppConfig::load(APP_NAME)?;
    init_logging(&config, args.debug);
    run(args, config)
}
