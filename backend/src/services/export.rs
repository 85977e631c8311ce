//! CSV and JSON writers for the assembled progress table.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use polars::prelude::*;

use super::table::ProgressTable;
use crate::config::OutputFormat;

/// File stem of the progress outputs.
pub const PROGRESS_FILE_STEM: &str = "progress";

fn create_output_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

/// Write `table` as CSV with a header row and every field quoted.
pub fn write_csv(table: &ProgressTable, path: &Path) -> Result<()> {
    let mut df = table
        .to_dataframe()
        .context("Failed to build progress data frame")?;
    let mut file = create_output_file(path)?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .with_quote_style(QuoteStyle::Always)
        .finish(&mut df)
        .with_context(|| format!("Failed to write CSV to {}", path.display()))?;

    info!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Write `table` as a JSON array of row objects.
pub fn write_json(table: &ProgressTable, path: &Path) -> Result<()> {
    let mut df = table
        .to_dataframe()
        .context("Failed to build progress data frame")?;
    let mut file = create_output_file(path)?;

    JsonWriter::new(&mut file)
        .with_json_format(JsonFormat::Json)
        .finish(&mut df)
        .with_context(|| format!("Failed to write JSON to {}", path.display()))?;

    info!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Write `table` in each of `formats` under `dir` as `progress.<ext>`.
///
/// Returns the written paths in the order of `formats`.
pub fn write_outputs(
    table: &ProgressTable,
    dir: &Path,
    formats: &[OutputFormat],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(formats.len());
    for format in formats {
        let path = dir.join(format!("{}.{}", PROGRESS_FILE_STEM, format.extension()));
        match format {
            OutputFormat::Csv => write_csv(table, &path)?,
            OutputFormat::Json => write_json(table, &path)?,
        }
        written.push(path);
    }
    Ok(written)
}
