use once_cell::sync::Lazy;
use std::fmt;
use std::path::{Component, Path, PathBuf};

static DEFAULT_EXTENSIONS: Lazy<ExtensionSet> = Lazy::new(|| ExtensionSet::new([".md", ".rst"]));

/// Set of filename suffixes that mark a file as translatable.
///
/// Matching is a plain suffix test on the file name, so `.md` matches
/// `README.md` and a suffix such as `.en.md` can be used to narrow the set.
/// Suffixes given without a leading dot are normalised to have one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSet {
    suffixes: Vec<String>,
}

impl ExtensionSet {
    /// Creates a set from the given suffixes, dropping empty and duplicate entries.
    #[must_use]
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for suffix in suffixes {
            let suffix = suffix.as_ref().trim();
            if suffix.is_empty() || suffix == "." {
                continue;
            }
            let suffix = if suffix.starts_with('.') {
                suffix.to_string()
            } else {
                format!(".{suffix}")
            };
            if !normalized.contains(&suffix) {
                normalized.push(suffix);
            }
        }
        Self {
            suffixes: normalized,
        }
    }

    /// Returns true if the file name of `path` ends with one of the suffixes.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.suffixes.iter().any(|s| name.ends_with(s.as_str())))
    }

    /// Iterates over the normalised suffixes.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.suffixes.iter().map(String::as_str)
    }

    /// Returns true if the set has no suffixes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}

impl Default for ExtensionSet {
    fn default() -> Self {
        DEFAULT_EXTENSIONS.clone()
    }
}

impl fmt::Display for ExtensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.suffixes.join(", "))
    }
}

/// One discovered file queued for translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Path to the source file
    pub source_path: PathBuf,

    /// Path relative to the input root
    pub relative_path: PathBuf,
}

impl WorkItem {
    /// Creates a work item from an absolute source path and the input root.
    ///
    /// Falls back to the source path itself when it does not live under `root`.
    #[must_use]
    pub fn new(source_path: impl Into<PathBuf>, root: &Path) -> Self {
        let source_path = source_path.into();
        let relative_path =
            pathdiff::diff_paths(&source_path, root).unwrap_or_else(|| source_path.clone());
        Self {
            source_path,
            relative_path,
        }
    }

    /// Where this item's translation lives under `output_root`.
    #[must_use]
    pub fn output_path(&self, output_root: &Path) -> PathBuf {
        output_root.join(&self.relative_path)
    }

    /// Relative path rendered with `/` separators on every platform.
    #[must_use]
    pub fn posix_path(&self) -> String {
        to_posix(&self.relative_path)
    }

    /// File name for log lines.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.source_path
            .file_name()
            .map_or_else(|| self.posix_path(), |n| n.to_string_lossy().into_owned())
    }
}

/// Renders a relative path with `/` separators.
#[must_use]
pub(crate) fn to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            Component::ParentDir => Some("..".into()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
