use crate::{
    error::{Error, Result},
    mirror::create_dir_all,
};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// JSON report of one run.
#[derive(Debug, Serialize)]
pub(crate) struct RunReport {
    /// Generation timestamp
    pub generated_at: String,

    /// Input root
    pub input_directory: String,

    /// Output root
    pub output_directory: String,

    /// Model used
    pub model: String,

    /// Files discovered for translation
    pub total_files: usize,

    /// Files newly translated
    pub translated: usize,

    /// Files whose output already existed
    pub skipped: usize,

    /// Files that failed
    pub failed: usize,

    /// Translated files saved as the raw reply
    pub fallbacks: usize,

    /// Execution duration in seconds
    pub duration_secs: f64,

    /// Per-file outcomes in completion order
    pub outcomes: Vec<OutcomeRecord>,
}

/// One line of the report.
#[derive(Debug, Serialize)]
pub(crate) struct OutcomeRecord {
    /// Completion index (1-based)
    pub index: usize,

    /// Relative path with `/` separators
    pub path: String,

    /// `success`, `skipped` or `failed`
    pub status: &'static str,

    /// Whether the raw reply was saved
    pub fallback: bool,

    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Writes `content` to `path` via a hidden sibling temp file and a rename.
///
/// Parent directories are created as needed. A failed write removes the temp
/// file, so no partial output is ever visible at `path`.
///
/// # Errors
///
/// Returns [`Error::FileWrite`] if any step fails.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(|e| match e {
            Error::Io { path, message } => Error::FileWrite { path, message },
            other => other,
        })?;
    }

    let temp_path = temp_path_for(path)?;
    let result = write_then_rename(&temp_path, path, content);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_then_rename(temp_path: &Path, path: &Path, content: &str) -> Result<()> {
    let mut temp_file = fs::File::create(temp_path).map_err(|e| Error::write(temp_path, e))?;

    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| Error::write(temp_path, e))?;

    // Ensure data is flushed to disk
    temp_file.sync_all().map_err(|e| Error::write(temp_path, e))?;

    drop(temp_file);

    fs::rename(temp_path, path).map_err(|e| Error::write(path, e))?;

    debug!("Wrote {}", path.display());
    Ok(())
}

/// `.<name>.partial` next to the destination.
fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| Error::FileWrite {
        path: path.to_path_buf(),
        message: "destination has no file name".to_string(),
    })?;

    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(name);
    temp_name.push(".partial");
    Ok(path.with_file_name(temp_name))
}

/// Serializes the run report as pretty JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub(crate) fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    write_atomic(path, &json)?;
    info!("Wrote report to {}", path.display());
    Ok(())
}
