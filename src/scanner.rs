use crate::{
    config::Config,
    error::{Error, Result},
    file::{ExtensionSet, WorkItem},
};
use std::path::PathBuf;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Statistics collected during scanning.
#[derive(Debug, Default, Clone)]
pub(crate) struct ScanStats {
    /// Files visited
    pub total_files: usize,

    /// Files with a translatable suffix
    pub matched_files: usize,

    /// Entries that could not be read
    pub errors: usize,
}

/// Discovers translatable files under the input root.
pub(crate) struct Scanner {
    root_dir: PathBuf,
    extensions: ExtensionSet,
}

impl Scanner {
    /// Creates a new scanner from configuration.
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            root_dir: config.input_dir.clone(),
            extensions: config.extensions.clone(),
        }
    }

    /// Walks the whole tree and returns every matching file, sorted by relative path.
    ///
    /// The walk completes before returning; the length of the result is the
    /// `total` used for progress reporting. Unreadable entries below the root
    /// are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryNotFound`] if the root is missing or not a directory.
    pub(crate) fn scan(&self) -> Result<Vec<WorkItem>> {
        if !self.root_dir.is_dir() {
            return Err(Error::directory_not_found(&self.root_dir));
        }

        debug!("Scanning {} for {}", self.root_dir.display(), self.extensions);

        let mut stats = ScanStats::default();
        let mut items = Vec::new();

        // Symlinks are followed so a linked file or directory is scanned like
        // the real thing; a link loop surfaces as a walk error.
        for entry in WalkDir::new(&self.root_dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Walk error: {}", e);
                    stats.errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            stats.total_files += 1;

            if self.extensions.matches(entry.path()) {
                trace!("Queued {}", entry.path().display());
                stats.matched_files += 1;
                items.push(WorkItem::new(entry.into_path(), &self.root_dir));
            }
        }

        if stats.errors > 0 {
            warn!(
                "Encountered {} errors during scanning (non-fatal)",
                stats.errors
            );
        }

        debug!(
            "Scan complete: {} files, {} translatable, {} errors",
            stats.total_files, stats.matched_files, stats.errors
        );

        // Sort for deterministic ordering
        items.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(items)
    }
}
