//! Loading data files into [`Table`]s.
//!
//! Delimited text goes through the polars CSV reader (header row, type inference);
//! JSON record arrays go through serde_json. Compressed inputs are decompressed into
//! memory first.

use crate::table::{Row, Table};
use crate::value::Value;
use crate::{CompressionFormat, FileFormat, OpenOptions};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use polars::prelude::*;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Default number of rows polars looks at to infer CSV column types.
pub const DEFAULT_INFER_SCHEMA_LENGTH: usize = 1000;

/// Load a file, detecting format and compression from the options or the path.
pub fn load_table(path: &Path, options: &OpenOptions) -> Result<Table> {
    let format = options
        .format
        .or_else(|| FileFormat::from_path(path))
        .unwrap_or(FileFormat::Csv);
    let bytes = read_bytes(path, options.compression)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let table = match format {
        FileFormat::Json => parse_json_records(&bytes),
        _ => parse_delimited(bytes, format, options),
    }
    .wrap_err_with(|| format!("Failed to load {}", path.display()))?;
    debug!(
        path = %path.display(),
        ?format,
        rows = table.row_count(),
        columns = table.columns().len(),
        "loaded table"
    );
    Ok(table)
}

/// Read a file fully, decompressing when `compression` is given or the extension says so.
pub fn read_bytes(path: &Path, compression: Option<CompressionFormat>) -> Result<Vec<u8>> {
    let compression = compression.or_else(|| CompressionFormat::from_extension(path));
    let file = BufReader::new(File::open(path)?);
    let mut reader: Box<dyn Read> = match compression {
        None => Box::new(file),
        Some(CompressionFormat::Gzip) => Box::new(flate2::read::MultiGzDecoder::new(file)),
        Some(CompressionFormat::Zstd) => Box::new(zstd::Decoder::new(file)?),
        Some(CompressionFormat::Bzip2) => Box::new(bzip2::read::BzDecoder::new(file)),
        Some(CompressionFormat::Xz) => Box::new(xz2::read::XzDecoder::new(file)),
    };
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Parse delimited text (CSV/TSV/PSV) from memory.
///
/// Blank lines are dropped before parsing. An input with no non-blank lines is an
/// empty table.
pub fn parse_delimited(bytes: Vec<u8>, format: FileFormat, options: &OpenOptions) -> Result<Table> {
    let bytes = strip_blank_lines(bytes);
    if bytes.is_empty() {
        return Ok(Table::default());
    }

    let separator = options
        .delimiter
        .or_else(|| format.delimiter())
        .unwrap_or(b',');
    let mut read_options = CsvReadOptions::default();
    if let Some(skip_rows) = options.skip_rows {
        read_options.skip_rows = skip_rows;
    }
    if let Some(has_header) = options.has_header {
        read_options.has_header = has_header;
    }
    read_options.infer_schema_length = Some(
        options
            .infer_schema_length
            .unwrap_or(DEFAULT_INFER_SCHEMA_LENGTH),
    );
    read_options = read_options.map_parse_options(|opts| opts.with_separator(separator));

    let df = CsvReader::new(std::io::Cursor::new(bytes))
        .with_options(read_options)
        .finish()?;
    table_from_dataframe(&df)
}

fn strip_blank_lines(bytes: Vec<u8>) -> Vec<u8> {
    let has_blank = bytes
        .split(|b| *b == b'\n')
        .any(|line| line.iter().all(u8::is_ascii_whitespace));
    if !has_blank {
        return bytes;
    }
    let mut out = Vec::with_capacity(bytes.len());
    for line in bytes.split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out
}

/// Convert a polars frame into a table, cell by cell.
///
/// Integers and floats become numbers, strings stay text, booleans become
/// `"true"`/`"false"`, nulls are `Null`, and anything else keeps its display form.
pub fn table_from_dataframe(df: &DataFrame) -> Result<Table> {
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let height = df.height();
    let mut rows: Vec<Vec<Value>> = (0..height)
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();
    for column in df.get_columns() {
        for (i, row) in rows.iter_mut().enumerate() {
            row.push(value_from_any(column.get(i)?));
        }
    }
    Ok(Table::new(columns, rows.into_iter().map(Row).collect())?)
}

fn value_from_any(av: AnyValue<'_>) -> Value {
    match av {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Text(b.to_string()),
        AnyValue::String(s) => Value::Text(s.to_string()),
        AnyValue::StringOwned(s) => Value::Text(s.to_string()),
        AnyValue::Float64(f) => Value::Number(f),
        AnyValue::Float32(f) => Value::Number(f64::from(f)),
        AnyValue::Int64(i) => Value::Number(i as f64),
        AnyValue::Int32(i) => Value::Number(f64::from(i)),
        AnyValue::UInt64(u) => Value::Number(u as f64),
        AnyValue::UInt32(u) => Value::Number(f64::from(u)),
        other => match other.extract::<f64>() {
            Some(n) => Value::Number(n),
            None => Value::Text(other.to_string()),
        },
    }
}

/// Parse a JSON array of objects into a table.
///
/// Columns appear in first-seen key order. Booleans become `"true"`/`"false"`;
/// nested arrays and objects are kept as their JSON text.
pub fn parse_json_records(bytes: &[u8]) -> Result<Table> {
    let parsed: serde_json::Value = serde_json::from_slice(bytes)?;
    let serde_json::Value::Array(items) = parsed else {
        return Err(eyre!("Expected a JSON array of objects"));
    };
    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let serde_json::Value::Object(map) = item else {
            return Err(eyre!("Element {} of the JSON array is not an object", i));
        };
        let record: Vec<(String, Value)> = map
            .into_iter()
            .map(|(key, v)| (key, value_from_json(v)))
            .collect();
        records.push(record);
    }
    Ok(Table::from_records(records))
}

fn value_from_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Text(b.to_string()),
        serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
        serde_json::Value::String(s) => Value::Text(s),
        nested => Value::Text(nested.to_string()),
    }
}
