//! Shared CLI definitions for usagedash.
//!
//! Used by the main application and by the build script (manpage) and
//! gen_docs binary (command-line-options markdown).

use clap::{Args as ClapArgs, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// File format for data files (used to bypass extension-based detection).
/// When `--format` is not specified, format is auto-detected from the file extension.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
    /// Pipe-separated values
    Psv,
    /// JSON array of objects
    Json,
}

impl FileFormat {
    /// Detect file format from path extension, looking through a compression suffix
    /// (`usage.csv.gz` is CSV). Returns None when the extension is missing or unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        if CompressionFormat::from_extension(path).is_some() {
            let stem = Path::new(path.file_stem()?);
            return Self::from_path(stem);
        }
        Self::from_extension(ext)
    }

    /// Parse format from extension string (e.g. "csv", "json").
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "psv" => Some(Self::Psv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Field delimiter for the delimited text formats.
    pub fn delimiter(&self) -> Option<u8> {
        match self {
            Self::Csv => Some(b','),
            Self::Tsv => Some(b'\t'),
            Self::Psv => Some(b'|'),
            Self::Json => None,
        }
    }
}

/// Compression format for data files
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Gzip compression (.gz) - Most common, good balance of speed and compression
    Gzip,
    /// Zstandard compression (.zst) - Modern, fast compression with good ratios
    Zstd,
    /// Bzip2 compression (.bz2) - Good compression ratio, slower than gzip
    Bzip2,
    /// XZ compression (.xz) - Excellent compression ratio, slower than bzip2
    Xz,
}

impl CompressionFormat {
    /// Detect compression format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            match ext.to_lowercase().as_str() {
                "gz" => Some(Self::Gzip),
                "zst" | "zstd" => Some(Self::Zstd),
                "bz2" | "bz" => Some(Self::Bzip2),
                "xz" => Some(Self::Xz),
                _ => None,
            }
        } else {
            None
        }
    }

    /// Get file extension for this compression format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Zstd => "zst",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
        }
    }

    /// Parse a config-file value ("gzip", "zstd", ...). Unknown names yield None.
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Command-line arguments for usagedash
#[derive(Clone, Parser, Debug)]
#[command(
    name = "usagedash",
    version,
    about = "Data preparation for cloud usage dashboards",
    long_about = include_str!("../long_about.txt")
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub load: LoadArgs,

    /// Print reports as JSON instead of text
    #[arg(long = "json", global = true, action)]
    pub json: bool,

    /// Enable debug logging on stderr (RUST_LOG still takes precedence)
    #[arg(long = "debug", global = true, action)]
    pub debug: bool,
}

/// Options that control how input files are read. Shared by every command.
#[derive(Clone, ClapArgs, Debug, Default)]
pub struct LoadArgs {
    /// Specify the delimiter to use when reading a delimited text file
    #[arg(long = "delimiter", global = true)]
    pub delimiter: Option<u8>,

    /// Specify that the file has no header
    #[arg(long = "no-header", global = true)]
    pub no_header: Option<bool>,

    /// Skip this many rows when reading a file
    #[arg(long = "skip-rows", global = true)]
    pub skip_rows: Option<usize>,

    /// Number of rows to use when inferring CSV column types (default: 1000)
    #[arg(long = "infer-schema-length", value_name = "N", global = true)]
    pub infer_schema_length: Option<usize>,

    /// Specify the compression format explicitly (gzip, zstd, bzip2, xz)
    /// If not specified, compression is auto-detected from file extension.
    #[arg(long = "compression", value_enum, global = true)]
    pub compression: Option<CompressionFormat>,

    /// Force file format (csv, tsv, psv, json).
    /// By default format is auto-detected from the file extension.
    #[arg(long = "format", value_enum, global = true)]
    pub format: Option<FileFormat>,
}

/// Row selection shared by the pages that expose filters.
#[derive(Clone, ClapArgs, Debug, Default)]
pub struct FilterArgs {
    /// Keep only rows for this region
    #[arg(long = "region", value_name = "REGION")]
    pub region: Option<String>,

    /// Keep only rows for this resource type
    #[arg(long = "resource", value_name = "TYPE")]
    pub resource: Option<String>,

    /// First date to include (YYYY-MM-DD, inclusive)
    #[arg(long = "from", value_name = "DATE")]
    pub from: Option<String>,

    /// Last date to include (YYYY-MM-DD, inclusive)
    #[arg(long = "to", value_name = "DATE")]
    pub to: Option<String>,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Command {
    /// Headline KPIs for a usage file: records, regions, average CPU, date range
    Overview {
        /// Usage data file
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Filtered statistics, daily usage series and CPU by region
    Eda {
        /// Usage data file
        #[arg(value_name = "PATH")]
        path: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Forward-fill usage, join it with external factors by date, and export the result
    Merge {
        /// Usage data file (left side of the join)
        #[arg(value_name = "USAGE")]
        usage: PathBuf,

        /// External factors file (right side of the join)
        #[arg(value_name = "EXTERNAL")]
        external: PathBuf,

        /// Column to forward-fill before joining (default: usage_storage)
        #[arg(long = "fill-column", value_name = "COL")]
        fill_column: Option<String>,

        /// Column that groups the forward-fill (default: region)
        #[arg(long = "fill-group", value_name = "COL")]
        fill_group: Option<String>,

        /// Keep usage rows without a matching date (left join) instead of dropping them
        #[arg(long = "left", action, conflicts_with = "inner")]
        left: bool,

        /// Drop usage rows without a matching date, overriding `left_join` in the config
        #[arg(long = "inner", action)]
        inner: bool,

        /// Where to write the merged table (default: cleaned_merged.csv)
        #[arg(long = "output", short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Compress the exported file
        #[arg(long = "output-compression", value_enum)]
        output_compression: Option<CompressionFormat>,
    },
    /// Trends by date and region plus monthly and weekday seasonality
    Insights {
        /// Feature dataset file
        #[arg(value_name = "PATH")]
        path: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Metric column for the date trend (default: usage_cpu)
        #[arg(long = "metric", value_name = "COL")]
        metric: Option<String>,
    },
    /// Holiday impact, usage peaks, resource efficiency and correlations of a merged file
    Analytics {
        /// Merged usage file (output of `merge`)
        #[arg(value_name = "PATH")]
        path: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Add calendar, lag, rolling-window and utilization columns to a merged file
    Features {
        /// Merged usage file (output of `merge`)
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Where to write the feature dataset (default: featured_dataset.csv)
        #[arg(long = "output", short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Compress the exported file
        #[arg(long = "output-compression", value_enum)]
        output_compression: Option<CompressionFormat>,
    },
    /// Count, mean, min and max of one numeric column
    Stats {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Column to summarize
        #[arg(long = "column", short = 'c', value_name = "COL")]
        column: String,
    },
    /// Distinct values of one column in first-seen order
    Unique {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Column to list
        #[arg(long = "column", short = 'c', value_name = "COL")]
        column: String,
    },
    /// Sum columns grouped by date, month, weekday, or any column
    Aggregate {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Grouping key: date, month, weekday, or a column name such as region
        #[arg(long = "by", value_name = "KEY")]
        by: String,

        /// Columns to sum (comma separated)
        #[arg(long = "sum", value_name = "COLS", value_delimiter = ',', required = true)]
        sum: Vec<String>,

        #[command(flatten)]
        filter: FilterArgs,

        /// Write the aggregated table as CSV instead of printing it
        #[arg(long = "output", short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the first rows of a file
    Preview {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Number of rows to show (default: from config, 10)
        #[arg(long = "rows", short = 'n', value_name = "N")]
        rows: Option<usize>,
    },
    /// Generate default configuration file at ~/.config/usagedash/config.toml
    GenerateConfig {
        /// Force overwrite existing config file
        #[arg(long = "force", action)]
        force: bool,
    },
}

/// Escape `|` and newlines for use in markdown table cells.
fn escape_table_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn value_placeholder(arg: &clap::Arg) -> String {
    arg.get_value_names()
        .map(|names| {
            names
                .iter()
                .map(|n: &clap::builder::Str| format!("<{}>", n.as_ref() as &str))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

fn render_argument_rows(cmd: &clap::Command, out: &mut String) {
    out.push_str("| Option | Description |\n");
    out.push_str("|--------|-------------|\n");

    for arg in cmd.get_arguments() {
        let id = arg.get_id().as_ref().to_string();
        if id == "help" || id == "version" {
            continue;
        }

        let option_str = if arg.is_positional() {
            let placeholder = value_placeholder(arg);
            if arg.is_required_set() {
                placeholder
            } else {
                format!("[{placeholder}]")
            }
        } else {
            let mut parts = Vec::new();
            if let Some(s) = arg.get_short() {
                parts.push(format!("-{s}"));
            }
            if let Some(l) = arg.get_long() {
                parts.push(format!("--{l}"));
            }
            let op = parts.join(", ");
            let placeholder = if arg.get_action().takes_values() {
                value_placeholder(arg)
            } else {
                String::new()
            };
            if placeholder.is_empty() {
                op
            } else {
                format!("{op} {placeholder}")
            }
        };

        let help = arg
            .get_help()
            .map(|h| escape_table_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!("| `{option_str}` | {help} |\n"));
    }
}

/// Render command-line options as markdown.
///
/// Used by the gen_docs binary; the global options come first, then one
/// section per command.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();

    let mut out = String::from("# Command Line Options\n\n");

    out.push_str("## Usage\n\n```\n");
    let usage = cmd.render_usage();
    out.push_str(&usage.to_string());
    out.push_str("\n```\n\n");

    out.push_str("## Global Options\n\n");
    render_argument_rows(&cmd, &mut out);

    for sub in cmd.get_subcommands() {
        if sub.get_name() == "help" {
            continue;
        }
        out.push_str(&format!("\n## `{}`\n\n", sub.get_name()));
        if let Some(about) = sub.get_about() {
            out.push_str(&format!("{about}\n\n"));
        }
        render_argument_rows(sub, &mut out);
    }

    out
}
