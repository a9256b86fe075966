use crate::error::{Error, Result};
use crate::file::ExtensionSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// API key value that stands for "not configured" and is rejected at startup.
pub const PLACEHOLDER_API_KEY: &str = "...";

const DEFAULT_THREADS: usize = 10;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TARGET_LANGUAGE: &str = "Simplified Chinese";

/// Connection settings for the chat-completion endpoint.
#[derive(Clone)]
pub struct ApiConfig {
    /// Bearer token sent with every request
    pub api_key: String,

    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    /// Model name
    pub model: String,

    /// Upper bound for one whole request, stream included. Also the longest
    /// the HTTP client waits on a single read.
    pub timeout: Duration,

    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
}

impl ApiConfig {
    /// Full URL of the chat completions endpoint.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn has_credential(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != PLACEHOLDER_API_KEY
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: PLACEHOLDER_API_KEY.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// Keeps the key out of logs.
impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Configuration for a translation run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Root of the tree to translate
    pub input_dir: PathBuf,

    /// Root of the mirrored output tree
    pub output_dir: PathBuf,

    /// Suffixes of files that are sent for translation
    pub extensions: ExtensionSet,

    /// Number of files translated concurrently
    pub threads: usize,

    /// Endpoint settings
    pub api: ApiConfig,

    /// Language the documents are translated into
    pub target_language: String,

    /// Tera file replacing the built-in system prompt
    pub prompt_template: Option<PathBuf>,

    /// Report what would happen without touching the output tree or the API
    pub dry_run: bool,

    /// Where to write a JSON report of the run
    pub report_path: Option<PathBuf>,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use doc_translate::Config;
    ///
    /// let config = Config::builder()
    ///     .input_dir("./docs")
    ///     .output_dir("./docs-zh")
    ///     .api_key("sk-...")
    ///     .threads(4)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The API key is missing or still the placeholder (unless dry run)
    /// - The input directory doesn't exist or isn't a directory
    /// - The output directory is the input directory or lies inside it
    /// - Thread count, extensions, endpoint or timeouts are invalid
    pub fn validate(&self) -> Result<()> {
        if !self.dry_run && !self.api.has_credential() {
            return Err(Error::missing_credential(
                "no API key provided; pass --api-key or set OPENAI_API_KEY",
            ));
        }

        if !self.input_dir.is_dir() {
            return Err(Error::directory_not_found(&self.input_dir));
        }

        if is_within(&self.output_dir, &self.input_dir) {
            return Err(Error::config(format!(
                "Output directory {} must not be inside input directory {}",
                self.output_dir.display(),
                self.input_dir.display()
            )));
        }

        if self.threads == 0 {
            return Err(Error::config("threads must be greater than 0"));
        }

        if self.extensions.is_empty() {
            return Err(Error::config("at least one extension is required"));
        }

        let base_url = self.api.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }

        if self.api.model.trim().is_empty() {
            return Err(Error::config("model name must not be empty"));
        }

        if self.api.timeout.is_zero() || self.api.connect_timeout.is_zero() {
            return Err(Error::config("timeouts must be greater than 0"));
        }

        if let Some(ref template) = self.prompt_template {
            if !template.is_file() {
                return Err(Error::config(format!(
                    "Prompt template is not a file: {}",
                    template.display()
                )));
            }
        }

        Ok(())
    }
}

/// True if `path` equals `root` or lies beneath it, compared on absolute paths.
fn is_within(path: &Path, root: &Path) -> bool {
    let absolute = |p: &Path| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf());
    absolute(path).starts_with(absolute(root))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("out"),
            extensions: ExtensionSet::default(),
            threads: DEFAULT_THREADS,
            api: ApiConfig::default(),
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
            prompt_template: None,
            dry_run: false,
            report_path: None,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    input_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    extensions: Option<ExtensionSet>,
    threads: Option<usize>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    target_language: Option<String>,
    prompt_template: Option<PathBuf>,
    dry_run: bool,
    report_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Sets the directory to translate.
    #[must_use]
    pub fn input_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_dir = Some(path.into());
        self
    }

    /// Sets the directory the mirrored tree is written to.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the translatable suffixes.
    #[must_use]
    pub fn extensions<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = Some(ExtensionSet::new(suffixes));
        self
    }

    /// Sets the number of concurrent workers.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the per-request timeout, stream included.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the language documents are translated into.
    #[must_use]
    pub fn target_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    /// Sets a Tera file that replaces the built-in system prompt.
    ///
    /// The template receives `target_language` in its context.
    #[must_use]
    pub fn prompt_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompt_template = Some(path.into());
        self
    }

    /// Enables dry run mode (no API calls, no writes).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Sets where the JSON run report is written.
    #[must_use]
    pub fn report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let defaults = ApiConfig::default();
        let config = Config {
            input_dir: self.input_dir.unwrap_or_else(|| PathBuf::from(".")),
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("out")),
            extensions: self.extensions.unwrap_or_default(),
            threads: self.threads.unwrap_or(DEFAULT_THREADS),
            api: ApiConfig {
                api_key: self.api_key.unwrap_or(defaults.api_key),
                base_url: self.base_url.unwrap_or(defaults.base_url),
                model: self.model.unwrap_or(defaults.model),
                timeout: self.timeout.unwrap_or(defaults.timeout),
                connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            },
            target_language: self
                .target_language
                .unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_string()),
            prompt_template: self.prompt_template,
            dry_run: self.dry_run,
            report_path: self.report_path,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn builder_for(temp: &assert_fs::TempDir) -> ConfigBuilder {
        let input = temp.child("in");
        input.create_dir_all().unwrap();
        Config::builder()
            .input_dir(input.path())
            .output_dir(temp.child("out").path())
            .api_key("sk-test")
    }

    #[test]
    fn test_default_config() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder_for(&temp).build().unwrap();

        assert_eq!(config.threads, DEFAULT_THREADS);
        assert_eq!(config.extensions, ExtensionSet::default());
        assert_eq!(config.api.model, DEFAULT_MODEL);
        assert_eq!(config.api.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.target_language, "Simplified Chinese");
    }

    #[test]
    fn test_placeholder_key_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = builder_for(&temp)
            .api_key(PLACEHOLDER_API_KEY)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredential { .. }));

        let err = builder_for(&temp).api_key("  ").build().unwrap_err();
        assert!(matches!(err, Error::MissingCredential { .. }));
    }

    #[test]
    fn test_dry_run_needs_no_key() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder_for(&temp)
            .api_key(PLACEHOLDER_API_KEY)
            .dry_run(true)
            .build();
        assert!(config.is_ok());
    }

    #[test]
    fn test_missing_input_dir() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = builder_for(&temp)
            .input_dir(temp.child("missing").path())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DirectoryNotFound { .. }));
    }

    #[test]
    fn test_input_is_a_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("file.md");
        file.write_str("# hi").unwrap();

        let err = builder_for(&temp).input_dir(file.path()).build().unwrap_err();
        assert!(matches!(err, Error::DirectoryNotFound { .. }));
    }

    #[test]
    fn test_output_inside_input_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = builder_for(&temp)
            .output_dir(temp.child("in/translated").path())
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = builder_for(&temp).threads(0).build().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = builder_for(&temp).base_url("localhost:8080").build().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_completions_url() {
        let api = ApiConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..ApiConfig::default()
        };
        assert_eq!(api.completions_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let api = ApiConfig {
            api_key: "sk-secret".to_string(),
            ..ApiConfig::default()
        };
        let debug = format!("{api:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
