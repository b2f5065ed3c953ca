use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use engine_logging::{engine_debug, engine_warn};
use harvester_core::{ItemError, MetricsRow};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Append-only CSV of batch outcomes; `max(end)` over all rows is the resume offset.
///
/// Rows written by older versions may lack columns. New columns are appended
/// after the existing header instead of rewriting the file, and readers look
/// columns up by name.
#[derive(Debug, Clone)]
pub struct MetricsLedger {
    path: PathBuf,
}

impl MetricsLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, row: &MetricsRow) -> Result<(), MetricsError> {
        let existing = self.header();
        let columns = row.columns();

        let fieldnames: Vec<String> = match &existing {
            Some(header) => {
                let mut merged = header.clone();
                for (name, _) in &columns {
                    if !merged.iter().any(|h| h == name) {
                        merged.push((*name).to_string());
                    }
                }
                merged
            }
            None => columns.iter().map(|(name, _)| (*name).to_string()).collect(),
        };

        let values: Vec<&str> = fieldnames
            .iter()
            .map(|field| {
                columns
                    .iter()
                    .find(|(name, _)| name == field)
                    .map_or("", |(_, value)| value.as_str())
            })
            .collect();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        if existing.is_none() {
            writer.write_record(&fieldnames)?;
        }
        writer.write_record(&values)?;
        writer.flush()?;
        engine_debug!("Appended batch {} to {:?}", row.batch_idx, self.path);
        Ok(())
    }

    /// Largest `end` ever recorded; 0 when the ledger is absent, empty or unreadable.
    pub fn resume_offset(&self) -> usize {
        self.read_column("end")
            .into_iter()
            .filter_map(|value| value.trim().parse::<usize>().ok())
            .max()
            .unwrap_or(0)
    }

    /// Number of batch rows recorded.
    pub fn row_count(&self) -> usize {
        match self.reader() {
            Some(mut reader) => reader.records().filter(Result::is_ok).count(),
            None => 0,
        }
    }

    /// Values of one named column, skipping rows that lack it.
    pub fn read_column(&self, column: &str) -> Vec<String> {
        let Some(mut reader) = self.reader() else {
            return Vec::new();
        };
        let index = match reader.headers() {
            Ok(headers) => headers.iter().position(|h| clean_header(h) == column),
            Err(err) => {
                engine_warn!("Failed to read metrics header {:?}: {}", self.path, err);
                None
            }
        };
        let Some(index) = index else {
            return Vec::new();
        };
        reader
            .records()
            .filter_map(Result::ok)
            .filter_map(|record| record.get(index).map(ToOwned::to_owned))
            .collect()
    }

    fn header(&self) -> Option<Vec<String>> {
        let mut reader = self.reader()?;
        let headers = reader.headers().ok()?;
        let names: Vec<String> = headers.iter().map(|h| clean_header(h).to_string()).collect();
        if names.iter().all(|h| h.is_empty()) {
            return None;
        }
        Some(names)
    }

    fn reader(&self) -> Option<csv::Reader<fs::File>> {
        match csv::ReaderBuilder::new().flexible(true).from_path(&self.path) {
            Ok(reader) => Some(reader),
            Err(err) => {
                if !is_not_found(&err) {
                    engine_warn!("Failed to open metrics ledger {:?}: {}", self.path, err);
                }
                None
            }
        }
    }
}

fn clean_header(header: &str) -> &str {
    header.trim_start_matches('\u{feff}').trim()
}

fn is_not_found(err: &csv::Error) -> bool {
    matches!(err.kind(), csv::ErrorKind::Io(e) if e.kind() == io::ErrorKind::NotFound)
}

/// Writes one batch's per-item failures as `<label_key>,error`.
pub fn write_error_listing(
    path: &Path,
    label_key: &str,
    errors: &[ItemError],
) -> Result<(), MetricsError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([label_key, "error"])?;
    for error in errors {
        writer.write_record([error.label.as_str(), error.error.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// One failed item read back from an error listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedError {
    pub label: String,
    pub error: String,
    pub source_file: String,
}

/// Reads every `batch_<idx>_errors.csv` in `dir`, ordered by batch index.
pub fn read_error_listings(dir: &Path, label_key: &str) -> Vec<ListedError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            engine_warn!("Failed to list error listings in {:?}: {}", dir, err);
            return Vec::new();
        }
    };

    let mut listings: Vec<(usize, PathBuf, String)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            let idx = name
                .strip_prefix("batch_")?
                .strip_suffix("_errors.csv")?
                .parse::<usize>()
                .ok()?;
            Some((idx, entry.path(), name))
        })
        .collect();
    listings.sort_by_key(|(idx, _, _)| *idx);

    let mut rows = Vec::new();
    for (_, path, name) in listings {
        let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(&path) {
            Ok(reader) => reader,
            Err(err) => {
                engine_warn!("Failed to read error listing {:?}: {}", path, err);
                continue;
            }
        };
        let (label_idx, error_idx) = match reader.headers() {
            Ok(headers) => (
                headers.iter().position(|h| clean_header(h) == label_key),
                headers.iter().position(|h| clean_header(h) == "error"),
            ),
            Err(_) => (None, None),
        };
        let Some(label_idx) = label_idx else {
            engine_warn!("Error listing {:?} has no `{}` column", path, label_key);
            continue;
        };
        for record in reader.records().filter_map(Result::ok) {
            let label = record.get(label_idx).unwrap_or("").trim();
            if label.is_empty() {
                continue;
            }
            let error = error_idx
                .and_then(|idx| record.get(idx))
                .unwrap_or("")
                .trim();
            rows.push(ListedError {
                label: label.to_string(),
                error: error.to_string(),
                source_file: name.clone(),
            });
        }
    }
    rows
}
