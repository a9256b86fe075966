//! Request/response envelope shared with the model.
//!
//! A request is a single string:
//!
//! ```text
//! FILE_PATH: docs/quickstart.md
//! ---
//! <raw file content>
//! ```
//!
//! The model is instructed to reply in the same shape. Replies drift from
//! that shape in practice (wrapped in a code fence, header dropped), so
//! decoding never discards text: anything that cannot be unwrapped comes back
//! as [`Decoded::Fallback`] carrying the raw reply.

use crate::error::{Error, Result};

/// Header prefix carrying the file's relative path.
pub const HEADER_PREFIX: &str = "FILE_PATH: ";

/// Line separating the header from the body.
pub const SEPARATOR: &str = "\n---\n";

const FENCE: &str = "```";

/// Outcome of decoding a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Body extracted from a well-formed envelope
    Content(String),

    /// Reply kept verbatim because it did not follow the envelope
    Fallback {
        /// The untouched reply
        raw: String,
        /// Why unwrapping failed
        reason: String,
    },
}

impl Decoded {
    /// Text to persist, whichever variant this is.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Content(text) | Self::Fallback { raw: text, .. } => text,
        }
    }

    /// Returns true if the raw reply was kept.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Builds the request payload for one file.
///
/// `posix_path` is written as-is; content is not transformed.
#[must_use]
pub fn encode(posix_path: &str, content: &str) -> String {
    let mut out =
        String::with_capacity(HEADER_PREFIX.len() + posix_path.len() + SEPARATOR.len() + content.len());
    out.push_str(HEADER_PREFIX);
    out.push_str(posix_path);
    out.push_str(SEPARATOR);
    out.push_str(content);
    out
}

/// Extracts the translated body from a reply.
///
/// 1. Trims surrounding whitespace.
/// 2. If the text both starts and ends with a code fence, drops the first line
///    (fence plus optional language tag) and the last line (closing fence).
/// 3. Returns everything after the first `\n---\n`.
///
/// # Errors
///
/// Returns [`Error::MalformedEnvelope`] if the fence cannot be stripped or no
/// separator is present.
pub fn try_decode(raw: &str) -> Result<&str> {
    let mut text = raw.trim();

    if text.starts_with(FENCE) && text.ends_with(FENCE) {
        let (_, rest) = text
            .split_once('\n')
            .ok_or_else(|| Error::malformed_envelope("code fence without a body"))?;
        let (inner, _) = rest
            .rsplit_once('\n')
            .ok_or_else(|| Error::malformed_envelope("code fence without a closing line"))?;
        text = inner;
    }

    text.split_once(SEPARATOR)
        .map(|(_, body)| body)
        .ok_or_else(|| Error::malformed_envelope("no '---' separator after the FILE_PATH header"))
}

/// Decodes a reply, falling back to the raw text when it is malformed.
#[must_use]
pub fn decode(raw: String) -> Decoded {
    match try_decode(&raw) {
        Ok(body) => Decoded::Content(body.to_string()),
        Err(e) => Decoded::Fallback {
            reason: e.to_string(),
            raw,
        },
    }
}
