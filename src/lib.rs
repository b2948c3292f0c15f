//! Data preparation for cloud usage dashboards.
//!
//! Loads usage, external-factor and feature files into [`Table`]s, runs the table
//! operations in [`ops`] (statistics, forward-fill, joins on `date`, keyed sums), and
//! builds the reports behind each dashboard page in [`pipeline`].

pub mod config;
pub mod export;
pub mod features;
pub mod filter;
pub mod insights;
pub mod ops;
pub mod pipeline;
pub mod source;
pub mod table;
pub mod value;

pub use config::{AppConfig, ConfigManager};
pub use export::{to_csv_string, to_dataframe, write_csv, ExportOptions};
pub use features::{engineer_features, RollingStat};
pub use filter::RowFilter;
pub use ops::{
    basic_stats, forward_fill, forward_fill_in_place, group_by_key_sum, group_by_sum_with,
    join_on_date, join_on_date_with, left_join_on_date, normalize_dates, unique_values,
    BasicStats, GroupKey, JoinKind,
};
pub use source::{load_table, table_from_dataframe};
pub use table::{Row, Table, TableError};
pub use usagedash_cli::{Args, Command, CompressionFormat, FileFormat, FilterArgs, LoadArgs};
pub use value::{coerce_number, NumericPolicy, Value, ValueKey};

/// Application name used for the config directory
pub const APP_NAME: &str = "usagedash";

/// How input files are read. Unset fields fall back to format defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub delimiter: Option<u8>,
    pub has_header: Option<bool>,
    pub skip_rows: Option<usize>,
    pub infer_schema_length: Option<usize>,
    pub compression: Option<CompressionFormat>,
    pub format: Option<FileFormat>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    pub fn with_skip_rows(mut self, skip_rows: usize) -> Self {
        self.skip_rows = Some(skip_rows);
        self
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = Some(rows);
        self
    }

    pub fn with_compression(mut self, compression: CompressionFormat) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Combine command-line flags with the config file; flags win.
    pub fn from_args_and_config(args: &LoadArgs, config: &AppConfig) -> Self {
        let loading = &config.file_loading;
        OpenOptions {
            delimiter: args.delimiter.or(loading.delimiter),
            // --no-header overrides the config's has_header
            has_header: match args.no_header {
                Some(no_header) => Some(!no_header),
                None => loading.has_header,
            },
            skip_rows: args.skip_rows.or(loading.skip_rows),
            infer_schema_length: args.infer_schema_length.or(loading.infer_schema_length),
            compression: args.compression.or_else(|| {
                loading
                    .compression
                    .as_deref()
                    .and_then(CompressionFormat::from_name)
            }),
            format: args.format,
        }
    }
}

impl From<&LoadArgs> for OpenOptions {
    fn from(args: &LoadArgs) -> Self {
        Self::from_args_and_config(args, &AppConfig::default())
    }
}
