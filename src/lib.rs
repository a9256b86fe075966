//! # doc-translate
//!
//! Mirrors a documentation tree and translates its markup files through an
//! OpenAI-compatible chat-completion service.
//!
//! ## Features
//!
//! - Concurrent translation with a fixed-size worker pool
//! - Resumable runs: files already present in the output are never re-sent
//! - Streaming responses over server-sent events
//! - Atomic output writes
//! - Configurable target language and system prompt (Tera)
//!
//! ## Quick Start
//!
//! ```no_run
//! use doc_translate::{Config, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .input_dir("./docs")
//!     .output_dir("./docs-zh")
//!     .extensions([".md", ".rst"])
//!     .api_key(std::env::var("OPENAI_API_KEY")?)
//!     .threads(10)
//!     .build()?;
//!
//! let stats = Pipeline::new(config)?.run()?;
//! stats.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Mirror**: Recreates the input tree and copies untranslated files
//! 2. **Scanner**: Collects files with a translatable extension
//! 3. **Worker**: Wraps each file in an envelope, streams the reply and decodes it
//! 4. **Writer**: Persists translations atomically

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod error;
mod file;
mod mirror;
mod pipeline;
mod progress;
mod prompt;
mod scanner;
mod worker;
mod writer;

pub mod envelope;

pub use client::{ChatClient, ChatMessage, ChatRequest, FragmentStream, OpenAiClient, Role};
pub use config::{ApiConfig, Config, ConfigBuilder, PLACEHOLDER_API_KEY};
pub use envelope::Decoded;
pub use error::{Error, Result};
pub use file::{ExtensionSet, WorkItem};
pub use mirror::MirrorStats;
pub use pipeline::{CompletedItem, Pipeline, PipelineStats};
pub use progress::ProgressCounter;
pub use worker::{Status, TranslationOutcome};

/// Runs the complete translation pipeline with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid or the API key is missing
/// - Input directory doesn't exist or is not a directory
/// - Output directory tree cannot be created
/// - The HTTP client cannot be built
///
/// Failures of individual files are reported in the returned
/// [`PipelineStats`] instead.
///
/// # Examples
///
/// ```no_run
/// use doc_translate::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .input_dir("docs")
///     .output_dir("docs-zh")
///     .api_key("sk-...")
///     .build()?;
///
/// let stats = run(config)?;
/// println!("{} files translated", stats.translated);
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<PipelineStats> {
    Pipeline::new(config)?.run()
}
