//! Collects per-post JSON sidecars from a directory into one CSV table.

use glob::{glob, Pattern};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AggregateError, MalformedRecord, Result};
use crate::metadata::{SIDECAR_EXTENSION, SIDECAR_PREFIX};
use crate::table::{ListFormat, Table};

/// Suffix of the per-post directories written by the downloader.
pub const PROFILE_DIR_SUFFIX: &str = "_UTC";

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub file_prefix: String,
    pub file_extension: String,
    pub include_profile_dirs: bool,
    pub list_format: ListFormat,
    pub delimiter: u8,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            file_prefix: SIDECAR_PREFIX.to_string(),
            file_extension: SIDECAR_EXTENSION.to_string(),
            include_profile_dirs: true,
            list_format: ListFormat::Json,
            delimiter: b',',
        }
    }
}

impl AggregateOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn include_profile_dirs(mut self, include: bool) -> Self {
        self.include_profile_dirs = include;
        self
    }

    pub fn with_list_format(mut self, list_format: ListFormat) -> Self {
        self.list_format = list_format;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: MalformedRecord,
}

/// Discovered sidecars plus the directories that could not be listed while searching.
#[derive(Debug, Default)]
pub struct SidecarFiles {
    pub files: Vec<PathBuf>,
    pub unreadable: Vec<SkippedFile>,
}

#[derive(Debug)]
pub struct AggregateReport {
    pub output_path: PathBuf,
    /// Sidecars parsed into records, including ones without any keys.
    pub records_parsed: usize,
    pub rows_written: usize,
    pub columns: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

pub struct Aggregator {
    options: AggregateOptions,
    progress: ProgressBar,
}

impl Aggregator {
    pub fn new(options: AggregateOptions) -> Self {
        Self { options, progress: ProgressBar::hidden() }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Sidecar files under `directory` in lexicographic path order.
    pub fn find_sidecar_files(&self, directory: &Path) -> Result<SidecarFiles> {
        fs::read_dir(directory).map_err(|source| AggregateError::DirectoryNotFound {
            path: directory.to_path_buf(),
            source,
        })?;

        let root = PathBuf::from(Pattern::escape(&directory.to_string_lossy()));
        let file_glob = format!(
            "{}*.{}",
            Pattern::escape(&self.options.file_prefix),
            Pattern::escape(&self.options.file_extension)
        );
        let mut patterns = vec![root.join(&file_glob)];
        if self.options.include_profile_dirs {
            patterns.push(root.join(format!("*{}", PROFILE_DIR_SUFFIX)).join(&file_glob));
        }

        let mut found = SidecarFiles::default();
        for pattern in patterns {
            let pattern_str = pattern.to_string_lossy().into_owned();
            debug!("Searching for sidecar files matching pattern: {}", pattern_str);
            let matches = glob(&pattern_str)
                .map_err(|source| AggregateError::Pattern { pattern: pattern_str.clone(), source })?;
            for entry in matches {
                match entry {
                    Ok(path) if path.is_file() => found.files.push(path),
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Cannot read {} while searching for sidecars: {}", e.path().display(), e.error());
                        found.unreadable.push(SkippedFile {
                            path: e.path().to_path_buf(),
                            reason: MalformedRecord::Unreadable(e.into_error()),
                        });
                    }
                }
            }
        }
        found.files.sort();
        found.files.dedup();
        found.unreadable.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    pub fn aggregate(
        &self,
        directory: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
    ) -> Result<AggregateReport> {
        let directory = directory.as_ref();
        let output_path = output_path.as_ref();

        let SidecarFiles { files, unreadable: mut skipped } = self.find_sidecar_files(directory)?;
        if files.is_empty() {
            warn!("No sidecar files found in {}", directory.display());
        } else {
            info!("Found {} sidecar files in {}", files.len(), directory.display());
        }

        self.progress.set_length(files.len() as u64);
        let mut table = Table::new();
        for path in files {
            match read_record(&path) {
                Ok(record) => {
                    debug!("Parsed {} ({} keys)", path.display(), record.len());
                    table.push(record);
                }
                Err(reason) => {
                    warn!("Skipping malformed sidecar {}: {}", path.display(), reason);
                    skipped.push(SkippedFile { path, reason });
                }
            }
            self.progress.inc(1);
        }

        if table.columns().is_empty() && !table.is_empty() {
            warn!("{} records carried no keys; nothing to tabulate", table.len());
        }

        let rows_written = self.write_table(&table, output_path)?;
        self.progress.finish_with_message(format!("{} rows, {} skipped", rows_written, skipped.len()));
        info!("Wrote {} rows x {} columns to {}", rows_written, table.columns().len(), output_path.display());

        Ok(AggregateReport {
            output_path: output_path.to_path_buf(),
            records_parsed: table.len(),
            rows_written,
            columns: table.columns().to_vec(),
            skipped,
        })
    }

    /// Writes to a temporary file beside the destination, then renames it into place.
    fn write_table(&self, table: &Table, output_path: &Path) -> Result<usize> {
        let fail = |source: csv::Error| AggregateError::WriteFailure {
            path: output_path.to_path_buf(),
            source,
        };
        let parent = match output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".aggregate-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| fail(e.into()))?;
        let rows = table
            .write_csv(tmp.as_file_mut(), self.options.delimiter, &self.options.list_format)
            .map_err(fail)?;
        tmp.as_file().sync_all().map_err(|e| fail(e.into()))?;
        set_output_permissions(tmp.as_file(), output_path).map_err(|e| fail(e.into()))?;
        tmp.persist(output_path).map_err(|e| fail(e.error.into()))?;
        Ok(rows)
    }
}

/// Aggregates with default options.
pub fn aggregate(
    directory: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> Result<AggregateReport> {
    Aggregator::new(AggregateOptions::default()).aggregate(directory, output_path)
}

fn read_record(path: &Path) -> std::result::Result<Map<String, Value>, MalformedRecord> {
    let text = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(text.trim_start_matches('\u{feff}'))? {
        Value::Object(map) => Ok(map),
        other => Err(MalformedRecord::NotAnObject(json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Temp files are created owner-only; keep an existing destination's mode, else use 0644.
#[cfg(unix)]
fn set_output_permissions(file: &fs::File, output_path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = match fs::metadata(output_path) {
        Ok(meta) => meta.permissions(),
        Err(_) => fs::Permissions::from_mode(0o644),
    };
    file.set_permissions(permissions)
}

#[cfg(not(unix))]
fn set_output_permissions(_file: &fs::File, _output_path: &Path) -> std::io::Result<()> {
    Ok(())
}
