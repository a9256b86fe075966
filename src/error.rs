use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the doc-translate library.
///
/// Variants split into two groups. Fatal conditions (see [`Error::is_fatal`])
/// are detected before any work is dispatched and stop the whole run.
/// Everything else is scoped to a single file and is reported as a failed
/// outcome for that file only.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Input root is missing or is not a directory.
    #[error("Input directory '{path}' does not exist or is not a directory")]
    DirectoryNotFound {
        /// Path that was expected to be a directory
        path: PathBuf,
    },

    /// API key was not provided or is still the placeholder value.
    #[error("Missing API credential: {message}")]
    MissingCredential {
        /// Error message
        message: String,
    },

    /// The chat client could not be constructed.
    #[error("Failed to initialize API client: {message}")]
    ClientInit {
        /// Error message
        message: String,
    },

    /// Source file could not be read.
    #[error("Failed to read '{path}': {message}")]
    FileRead {
        /// Path of the source file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Source file is not valid UTF-8.
    #[error("Invalid UTF-8 encoding in file '{path}'. File may be binary or use unsupported encoding.")]
    InvalidUtf8 {
        /// Path to file with encoding issues
        path: PathBuf,
    },

    /// The API rejected the request or could not be reached.
    #[error("API request failed{}: {message}", status_suffix(.status))]
    Api {
        /// HTTP status, when a response was received
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// The response stream broke off or carried an unreadable event.
    #[error("Response stream error: {message}")]
    Stream {
        /// Error message
        message: String,
    },

    /// The model reply does not follow the `FILE_PATH:` / `---` envelope.
    #[error("Malformed response envelope: {reason}")]
    MalformedEnvelope {
        /// What was wrong with the reply
        reason: String,
    },

    /// Translated output could not be persisted.
    #[error("Failed to write '{path}': {message}")]
    FileWrite {
        /// Destination path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// A worker failed in a way none of the other variants describe.
    #[error("Unexpected worker failure: {message}")]
    Worker {
        /// Error message
        message: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a read error, mapping undecodable content to [`Error::InvalidUtf8`].
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::InvalidData {
            Self::InvalidUtf8 { path: path.into() }
        } else {
            Self::FileRead {
                path: path.into(),
                message: source.to_string(),
            }
        }
    }

    /// Creates a write error with path context.
    #[must_use]
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a directory-not-found error.
    #[must_use]
    pub fn directory_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DirectoryNotFound { path: path.into() }
    }

    /// Creates a missing-credential error.
    #[must_use]
    pub fn missing_credential(message: impl Into<String>) -> Self {
        Self::MissingCredential {
            message: message.into(),
        }
    }

    /// Creates a client initialization error.
    #[must_use]
    pub fn client_init(message: impl Into<String>) -> Self {
        Self::ClientInit {
            message: message.into(),
        }
    }

    /// Creates an API error.
    #[must_use]
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a stream error.
    #[must_use]
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Creates a malformed envelope error.
    #[must_use]
    pub fn malformed_envelope(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            reason: reason.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        Self::Template {
            template: template.into(),
            message: source.to_string(),
        }
    }

    /// Creates an unclassified worker error.
    #[must_use]
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Returns true if this error must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DirectoryNotFound { .. }
                | Self::MissingCredential { .. }
                | Self::ClientInit { .. }
                | Self::Config { .. }
                | Self::Template { .. }
        )
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::client_init(e.to_string())
        } else if e.is_timeout() {
            Self::api(None, format!("request timed out: {e}"))
        } else if e.is_body() || e.is_decode() {
            Self::stream(e.to_string())
        } else {
            Self::api(e.status().map(|s| s.as_u16()), e.to_string())
        }
    }
}
