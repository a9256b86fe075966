//! Replicates the input tree's layout and untranslated files into the output tree.

use crate::{
    config::Config,
    error::{Error, Result},
    file::ExtensionSet,
};
use serde::Serialize;
use std::{fs, io, path::PathBuf};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// What a synchronization pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MirrorStats {
    /// Directories present in the output tree after the pass
    pub directories: usize,

    /// Files copied because the destination was absent
    pub copied_files: usize,

    /// Files left alone because the destination already existed
    pub existing_files: usize,

    /// Translatable files left for the workers
    pub deferred_files: usize,
}

/// Copies directory structure and non-translatable files, never overwriting.
pub(crate) struct Mirror {
    src_dir: PathBuf,
    dst_dir: PathBuf,
    extensions: ExtensionSet,
}

impl Mirror {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            src_dir: config.input_dir.clone(),
            dst_dir: config.output_dir.clone(),
            extensions: config.extensions.clone(),
        }
    }

    /// Runs one full pass over the input tree.
    ///
    /// Directories are created if absent. Files whose name matches the
    /// translatable suffixes are skipped; every other file is copied only when
    /// nothing exists at the destination yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the input root is missing or an output directory or
    /// file cannot be created.
    pub(crate) fn sync(&self) -> Result<MirrorStats> {
        if !self.src_dir.is_dir() {
            return Err(Error::directory_not_found(&self.src_dir));
        }

        info!(
            "Synchronizing directory structure from '{}' to '{}'",
            self.src_dir.display(),
            self.dst_dir.display()
        );

        let mut stats = MirrorStats::default();

        // Same traversal as the scanner, so both agree on what a file is.
        for entry in WalkDir::new(&self.src_dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Walk error: {}", e);
                    continue;
                }
            };

            let relative = entry
                .path()
                .strip_prefix(&self.src_dir)
                .unwrap_or_else(|_| entry.path());
            let dst_path = self.dst_dir.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                create_dir_all(&dst_path)?;
                stats.directories += 1;
            } else if file_type.is_file() {
                if self.extensions.matches(entry.path()) {
                    stats.deferred_files += 1;
                } else if dst_path.exists() {
                    trace!("Keeping existing {}", dst_path.display());
                    stats.existing_files += 1;
                } else {
                    if let Some(parent) = dst_path.parent() {
                        create_dir_all(parent)?;
                    }
                    fs::copy(entry.path(), &dst_path).map_err(|e| Error::io(&dst_path, e))?;
                    trace!("Copied {}", dst_path.display());
                    stats.copied_files += 1;
                }
            }
        }

        debug!(
            "Mirror complete: {} dirs, {} copied, {} existing, {} deferred to translation",
            stats.directories, stats.copied_files, stats.existing_files, stats.deferred_files
        );

        Ok(stats)
    }
}

/// `fs::create_dir_all` that tolerates another thread creating the same path first.
pub(crate) fn create_dir_all(path: &std::path::Path) -> Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn create_test_config(input: &std::path::Path, output: &std::path::Path) -> Config {
        Config::builder()
            .input_dir(input)
            .output_dir(output)
            .dry_run(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_mirror_copies_untranslated_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("in");
        input.child("docs/guide.md").write_str("# Guide").unwrap();
        input.child("docs/img/logo.png").write_binary(&[1, 2, 3, 0, 255]).unwrap();
        input.child("conf.py").write_str("project = 'x'").unwrap();
        input.child("empty/dir").create_dir_all().unwrap();
        let output = temp.child("out");

        let config = create_test_config(input.path(), output.path());
        let stats = Mirror::new(&config).sync().unwrap();

        assert_eq!(stats.copied_files, 2);
        assert_eq!(stats.deferred_files, 1);
        output.child("conf.py").assert("project = 'x'");
        assert_eq!(
            fs::read(output.child("docs/img/logo.png").path()).unwrap(),
            vec![1, 2, 3, 0, 255]
        );
        assert!(!output.child("docs/guide.md").exists());
        assert!(output.child("empty/dir").path().is_dir());
    }

    #[test]
    fn test_mirror_never_overwrites() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("in");
        input.child("conf.py").write_str("new").unwrap();
        let output = temp.child("out");
        output.child("conf.py").write_str("existing").unwrap();

        let config = create_test_config(input.path(), output.path());
        let stats = Mirror::new(&config).sync().unwrap();

        assert_eq!(stats.copied_files, 0);
        assert_eq!(stats.existing_files, 1);
        output.child("conf.py").assert("existing");
    }

    #[test]
    fn test_mirror_is_idempotent() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("in");
        input.child("a/b/c.txt").write_str("c").unwrap();
        let output = temp.child("out");

        let config = create_test_config(input.path(), output.path());
        let mirror = Mirror::new(&config);
        let first = mirror.sync().unwrap();
        let second = mirror.sync().unwrap();

        assert_eq!(first.copied_files, 1);
        assert_eq!(second.copied_files, 0);
        assert_eq!(second.existing_files, 1);
        assert_eq!(first.directories, second.directories);
    }

    #[test]
    fn test_create_dir_all_concurrent() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.path().join("x/y/z");

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| create_dir_all(&target).unwrap());
            }
        });

        assert!(target.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_mirror_follows_symlinks() {
        let temp = assert_fs::TempDir::new().unwrap();
        let shared = temp.child("shared");
        shared.child("logo.svg").write_str("<svg/>").unwrap();
        shared.child("guide.md").write_str("# Guide").unwrap();
        shared.child("assets/icon.png").write_binary(&[7, 7]).unwrap();
        let input = temp.child("in");
        input.create_dir_all().unwrap();
        input.child("logo.svg").symlink_to_file(shared.child("logo.svg").path()).unwrap();
        input.child("guide.md").symlink_to_file(shared.child("guide.md").path()).unwrap();
        input.child("assets").symlink_to_dir(shared.child("assets").path()).unwrap();
        let output = temp.child("out");

        let config = create_test_config(input.path(), output.path());
        let stats = Mirror::new(&config).sync().unwrap();

        assert_eq!(stats.copied_files, 2);
        assert_eq!(stats.deferred_files, 1);
        output.child("logo.svg").assert("<svg/>");
        assert!(!output.child("logo.svg").path().is_symlink());
        assert_eq!(fs::read(output.child("assets/icon.png").path()).unwrap(), vec![7, 7]);
        assert!(!output.child("guide.md").exists());
    }
}
