//! Writing tables back out as delimited text.

use crate::table::Table;
use crate::value::{format_number, Value};
use crate::CompressionFormat;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use polars::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Options for CSV export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub delimiter: u8,
    pub include_header: bool,
    pub compression: Option<CompressionFormat>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            include_header: true,
            compression: None,
        }
    }
}

impl ExportOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }

    pub fn with_compression(mut self, compression: Option<CompressionFormat>) -> Self {
        self.compression = compression;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

fn column_kind(table: &Table, name: &str) -> ColumnKind {
    let mut kind = ColumnKind::Int;
    for value in table.column_values(name) {
        match value {
            Value::Null => {}
            Value::Text(s) if s.is_empty() => {}
            Value::Text(_) => return ColumnKind::Text,
            Value::Number(n) => {
                let integral = n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64;
                if !integral {
                    kind = ColumnKind::Float;
                }
            }
        }
    }
    kind
}

/// Build a polars frame with one typed column per table column.
///
/// Columns holding only integral numbers become `Int64`, only numbers `Float64`, and
/// anything with text becomes `String` with numbers in display form.
pub fn to_dataframe(table: &Table) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(table.columns().len());
    for name in table.columns() {
        let values = table.column_values(name);
        let column = match column_kind(table, name) {
            ColumnKind::Int => {
                let data: Vec<Option<i64>> = values
                    .map(|v| match v {
                        Value::Number(n) => Some(*n as i64),
                        _ => None,
                    })
                    .collect();
                Column::new(name.as_str().into(), data)
            }
            ColumnKind::Float => {
                let data: Vec<Option<f64>> = values
                    .map(|v| match v {
                        Value::Number(n) => Some(*n),
                        _ => None,
                    })
                    .collect();
                Column::new(name.as_str().into(), data)
            }
            ColumnKind::Text => {
                let data: Vec<Option<String>> = values
                    .map(|v| match v {
                        Value::Null => None,
                        Value::Number(n) => Some(format_number(*n)),
                        Value::Text(s) => Some(s.clone()),
                    })
                    .collect();
                Column::new(name.as_str().into(), data)
            }
        };
        columns.push(column);
    }
    Ok(DataFrame::new(columns)?)
}

fn write_frame<W: Write>(table: &Table, writer: W, options: &ExportOptions) -> Result<()> {
    let mut df = to_dataframe(table)?;
    CsvWriter::new(writer)
        .with_separator(options.delimiter)
        .include_header(options.include_header)
        .finish(&mut df)?;
    Ok(())
}

/// Write `table` as CSV to `path`, compressing when `options.compression` is set.
///
/// A table without columns produces an empty file.
pub fn write_csv(table: &Table, path: &Path, options: &ExportOptions) -> Result<()> {
    let file = File::create(path)
        .wrap_err_with(|| format!("Failed to create {}", path.display()))?;
    if table.columns().is_empty() {
        return Ok(());
    }
    match options.compression {
        Some(compression) => {
            let writer: Box<dyn Write> = match compression {
                CompressionFormat::Gzip => Box::new(flate2::write::GzEncoder::new(
                    file,
                    flate2::Compression::default(),
                )),
                CompressionFormat::Zstd => Box::new(zstd::Encoder::new(file, 0)?.auto_finish()),
                CompressionFormat::Bzip2 => Box::new(bzip2::write::BzEncoder::new(
                    file,
                    bzip2::Compression::default(),
                )),
                CompressionFormat::Xz => Box::new(xz2::write::XzEncoder::new(file, 6)),
            };
            write_frame(table, writer, options)
        }
        None => write_frame(table, file, options),
    }
    .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    debug!(
        path = %path.display(),
        rows = table.row_count(),
        compression = ?options.compression,
        "exported table"
    );
    Ok(())
}

/// Render `table` as CSV text.
pub fn to_csv_string(table: &Table, options: &ExportOptions) -> Result<String> {
    if table.columns().is_empty() {
        return Ok(String::new());
    }
    let mut buf = Vec::new();
    write_frame(table, &mut buf, options)?;
    Ok(String::from_utf8(buf)?)
}
