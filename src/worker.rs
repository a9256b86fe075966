//! Per-file translation.
//!
//! Each file moves through `Pending -> Skipped`, or
//! `Pending -> Requesting -> Decoding -> Written`, or ends in `Failed` from
//! any step. A file whose output already exists is never sent to the API and
//! never overwritten.

use crate::{
    client::{ChatClient, ChatRequest},
    envelope::{self, Decoded},
    error::{Error, Result},
    file::WorkItem,
    writer,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{trace, warn};

/// Terminal state of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Translation written
    Success,
    /// Output existed already; nothing was sent
    Skipped,
    /// Processing aborted; see the outcome's error
    Failed,
}

impl Status {
    /// Lowercase name used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Result of processing one work item.
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    /// The item processed
    pub item: WorkItem,

    /// Terminal state
    pub status: Status,

    /// True if the raw reply was saved because it did not follow the envelope
    pub fallback: bool,

    /// Cause of a failure
    pub error: Option<Error>,
}

impl TranslationOutcome {
    fn success(item: WorkItem, fallback: bool) -> Self {
        Self {
            item,
            status: Status::Success,
            fallback,
            error: None,
        }
    }

    pub(crate) fn skipped(item: WorkItem) -> Self {
        Self {
            item,
            status: Status::Skipped,
            fallback: false,
            error: None,
        }
    }

    pub(crate) fn failed(item: WorkItem, error: Error) -> Self {
        Self {
            item,
            status: Status::Failed,
            fallback: false,
            error: Some(error),
        }
    }

    /// The human-readable part of the `[i/total]` progress line.
    #[must_use]
    pub fn message(&self, output_dir: &Path) -> String {
        match self.status {
            Status::Success if self.fallback => {
                format!("Translated {} (raw response saved)", self.item.display_name())
            }
            Status::Success => format!("Translated {}", self.item.display_name()),
            Status::Skipped => format!(
                "Skipping existing file: {}",
                self.item.output_path(output_dir).display()
            ),
            Status::Failed => format!(
                "Failed to translate {}: {}",
                self.item.display_name(),
                self.error
                    .as_ref()
                    .map_or_else(|| "unknown error".to_string(), ToString::to_string)
            ),
        }
    }
}

/// Translates single files against a shared client.
pub(crate) struct Translator {
    client: Arc<dyn ChatClient>,
    model: String,
    system_prompt: String,
    output_dir: PathBuf,
    timeout: Duration,
}

impl Translator {
    pub(crate) fn new(
        client: Arc<dyn ChatClient>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: system_prompt.into(),
            output_dir: output_dir.into(),
            timeout,
        }
    }

    /// Runs one item to a terminal outcome. Errors never escape.
    pub(crate) fn process(&self, item: WorkItem) -> TranslationOutcome {
        let output_path = item.output_path(&self.output_dir);

        if output_path.exists() {
            return TranslationOutcome::skipped(item);
        }

        match self.translate(&item, &output_path) {
            Ok(fallback) => TranslationOutcome::success(item, fallback),
            Err(e) => TranslationOutcome::failed(item, e),
        }
    }

    /// Read, request, decode, write. Returns whether the fallback was used.
    fn translate(&self, item: &WorkItem, output_path: &Path) -> Result<bool> {
        let content =
            fs::read_to_string(&item.source_path).map_err(|e| Error::read(&item.source_path, e))?;

        let request = ChatRequest::translation(
            self.model.as_str(),
            self.system_prompt.as_str(),
            envelope::encode(&item.posix_path(), &content),
        );

        let reply = self.collect_reply(&request, item)?;

        let decoded = envelope::decode(reply);
        if let Decoded::Fallback { ref reason, .. } = decoded {
            warn!(
                "Could not parse the reply for {} as expected ({}); saving the full raw response",
                item.display_name(),
                reason
            );
        }
        let fallback = decoded.is_fallback();

        writer::write_atomic(output_path, &decoded.into_text())?;
        Ok(fallback)
    }

    /// Concatenates the streamed reply. The whole exchange, from sending the
    /// request to the last fragment, must finish within `timeout`.
    fn collect_reply(&self, request: &ChatRequest, item: &WorkItem) -> Result<String> {
        let deadline = Instant::now().checked_add(self.timeout);
        let mut reply = String::new();

        for fragment in self.client.stream_chat(request)? {
            let fragment = fragment?;
            if deadline.is_some_and(|deadline| Instant::now() > deadline) {
                return Err(Error::stream(format!(
                    "reply not complete within {:.1}s",
                    self.timeout.as_secs_f64()
                )));
            }
            trace!("Received {} bytes for {}", fragment.len(), item.posix_path());
            reply.push_str(&fragment);
        }

        // An empty output file would be skipped on every later run.
        if reply.trim().is_empty() {
            return Err(Error::stream("model returned an empty response"));
        }

        Ok(reply)
    }
}
