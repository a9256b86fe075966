//! Service boundary to the chat-completion endpoint.
//!
//! Workers only see [`ChatClient`]: hand it a [`ChatRequest`], get back a lazy,
//! finite, non-restartable sequence of text fragments. [`OpenAiClient`] is the
//! production implementation speaking the OpenAI-compatible streaming protocol.

use crate::{
    config::ApiConfig,
    error::{Error, Result},
};
use reqwest::header::{ACCEPT, HeaderValue};
use serde::{Deserialize, Serialize};
use std::{
    io::{BufRead, BufReader},
    time::{Duration, Instant},
};
use tracing::debug;

const MAX_ERROR_BODY: usize = 2_048;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction setting the model's behavior
    System,
    /// Content to act on
    User,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Author of the message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Body of a streaming chat-completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model name
    pub model: String,
    /// Conversation, system instruction first
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Whether the reply is streamed
    pub stream: bool,
}

impl ChatRequest {
    /// Deterministic streaming request with one system and one user message.
    #[must_use]
    pub fn translation(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: 0.0,
            stream: true,
        }
    }
}

/// Text fragments of a reply, in arrival order.
pub type FragmentStream<'a> = Box<dyn Iterator<Item = Result<String>> + Send + 'a>;

/// A chat endpoint that answers with a stream of text fragments.
///
/// Implementations must be usable from many worker threads at once.
pub trait ChatClient: Send + Sync {
    /// Sends `request` and returns the reply as it arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or is rejected. Errors
    /// after the stream has started surface as `Err` items of the stream.
    fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream<'_>>;
}

/// Blocking client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// Builds the HTTP client with the configured timeouts.
    ///
    /// reqwest applies the timeout to each read, so a server that keeps
    /// trickling events would never trip it. The stream returned by
    /// [`ChatClient::stream_chat`] therefore also carries a deadline of
    /// `timeout` past the moment the request was sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientInit`] if the HTTP client cannot be constructed.
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(api.timeout)
            .connect_timeout(api.connect_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::client_init(e.to_string()))?;

        Ok(Self {
            http,
            url: api.completions_url(),
            api_key: api.api_key.clone(),
            timeout: api.timeout,
        })
    }
}

impl ChatClient for OpenAiClient {
    fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream<'_>> {
        debug!("POST {} (model {})", self.url, request.model);
        let deadline = Instant::now().checked_add(self.timeout);

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::api(Some(status.as_u16()), truncate(&body, MAX_ERROR_BODY)));
        }

        let mut fragments = SseFragments::new(BufReader::new(response));
        if let Some(deadline) = deadline {
            fragments = fragments.with_deadline(deadline);
        }
        Ok(Box::new(fragments))
    }
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

/// Iterator over the text deltas of a server-sent-events body.
///
/// Events are separated by blank lines; `data:` lines of one event are joined
/// with `\n`. The stream ends at `data: [DONE]` or at end of input. Chunks
/// without text (role announcements, usage reports, empty deltas) are skipped.
/// Once a deadline is set, passing it ends the stream with an error, even if
/// the server is still sending keep-alive comments.
pub(crate) struct SseFragments<R> {
    reader: R,
    line: String,
    data: String,
    done: bool,
    deadline: Option<Instant>,
}

impl<R: BufRead> SseFragments<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            data: String::new(),
            done: false,
            deadline: None,
        }
    }

    pub(crate) fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Reads lines until one event's data is complete. `None` at end of input.
    fn next_event(&mut self) -> Option<Result<String>> {
        loop {
            if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Some(Err(Error::stream("request timed out while streaming the reply")));
            }

            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    return (!self.data.is_empty()).then(|| Ok(std::mem::take(&mut self.data)));
                }
                Ok(_) => {}
                Err(e) => return Some(Err(Error::stream(e.to_string()))),
            }

            let line = self.line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    return Some(Ok(std::mem::take(&mut self.data)));
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value.strip_prefix(' ').unwrap_or(value));
            }
            // `event:`, `id:`, `retry:` and `:` comments carry nothing we use.
        }
    }

    fn parse(data: &str) -> Result<Option<String>> {
        let chunk: CompletionChunk = serde_json::from_str(data)
            .map_err(|e| Error::stream(format!("unreadable event '{}': {e}", truncate(data, 200))))?;

        if let Some(error) = chunk.error {
            return Err(Error::api(None, error.message));
        }

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty()))
    }
}

impl<R: BufRead> Iterator for SseFragments<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let data = match self.next_event() {
                Some(Ok(data)) => data,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            };

            if data.trim() == "[DONE]" {
                self.done = true;
                return None;
            }

            match Self::parse(&data) {
                Ok(Some(text)) => return Some(Ok(text)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fragments(body: &str) -> Vec<Result<String>> {
        SseFragments::new(Cursor::new(body.to_string())).collect()
    }

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest::translation("gpt-4o-mini", "policy", "FILE_PATH: a.md\n---\nhi");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "policy");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "FILE_PATH: a.md\n---\nhi");
    }

    #[test]
    fn test_sse_concatenates_deltas_in_order() {
        let body = format!(
            "data: {}\n\n{}{}{}data: [DONE]\n\n",
            serde_json::json!({"choices": [{"delta": {"role": "assistant"}}]}),
            chunk("FILE_PATH: a.md\n"),
            chunk(""),
            chunk("---\n你好"),
        );

        let text: String = fragments(&body).into_iter().map(Result::unwrap).collect();
        assert_eq!(text, "FILE_PATH: a.md\n---\n你好");
    }

    #[test]
    fn test_sse_stops_at_done() {
        let body = format!("{}data: [DONE]\n\n{}", chunk("a"), chunk("ignored"));
        let items = fragments(&body);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "a");
    }

    #[test]
    fn test_sse_ends_without_done() {
        let body = format!("{}{}", chunk("a"), chunk("b").trim_end());
        let text: String = fragments(&body).into_iter().map(Result::unwrap).collect();
        assert_eq!(text, "ab");
    }

    #[test]
    fn test_sse_ignores_comments_and_crlf() {
        let body = ": keep-alive\r\n\r\nevent: message\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\n";
        let text: String = fragments(body).into_iter().map(Result::unwrap).collect();
        assert_eq!(text, "x");
    }

    #[test]
    fn test_sse_skips_usage_chunks() {
        let body = format!(
            "{}data: {}\n\n",
            chunk("a"),
            serde_json::json!({"choices": [], "usage": {"total_tokens": 3}})
        );
        let text: String = fragments(&body).into_iter().map(Result::unwrap).collect();
        assert_eq!(text, "a");
    }

    #[test]
    fn test_sse_error_event() {
        let body = format!(
            "{}data: {}\n\n{}",
            chunk("a"),
            serde_json::json!({"error": {"message": "overloaded"}}),
            chunk("b")
        );
        let items = fragments(&body);

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(Error::Api { message, .. }) if message == "overloaded"));
    }

    #[test]
    fn test_sse_invalid_json() {
        let items = fragments("data: {not json\n\n");
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Stream { .. })));
    }

    fn local_client(base_url: String, timeout: Duration) -> OpenAiClient {
        OpenAiClient::new(&ApiConfig {
            api_key: "sk-test".to_string(),
            base_url,
            model: "test-model".to_string(),
            timeout,
            connect_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_stream_from_local_server() {
        let events = vec![chunk("Hel"), chunk("lo"), "data: [DONE]\n\n".to_string()];
        let url = fake::trickle_server(events, Duration::from_millis(10));
        let client = local_client(url, Duration::from_secs(10));
        let request = ChatRequest::translation("test-model", "system", "user");

        let items: Vec<_> = client.stream_chat(&request).unwrap().collect();

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(text) if text == "Hel"));
        assert!(matches!(&items[1], Ok(text) if text == "lo"));
    }

    #[test]
    fn test_keepalive_trickle_hits_deadline() {
        let events = vec![": keep-alive\n\n".to_string(); 40];
        let url = fake::trickle_server(events, Duration::from_millis(100));
        let client = local_client(url, Duration::from_millis(500));
        let request = ChatRequest::translation("test-model", "system", "user");

        let started = Instant::now();
        let items: Vec<_> = client.stream_chat(&request).unwrap().collect();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(Error::Stream { message }) if message.contains("timed out")));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("  short  ", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::{
        io::{Read, Write},
        net::{TcpListener, TcpStream},
        sync::atomic::{AtomicUsize, Ordering},
    };

    type Respond = dyn Fn(&ChatRequest) -> Result<Vec<Result<String>>> + Send + Sync;

    /// In-process client answering from a closure and counting calls.
    pub(crate) struct FakeClient {
        calls: AtomicUsize,
        respond: Box<Respond>,
    }

    impl FakeClient {
        pub(crate) fn new(
            respond: impl Fn(&ChatRequest) -> Result<Vec<Result<String>>> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                respond: Box::new(respond),
            }
        }

        /// Echoes the user envelope back with the body prefixed by `[zh] `,
        /// split into small fragments.
        pub(crate) fn echo() -> Self {
            Self::new(|request| {
                let user = &request.messages[1].content;
                let (header, body) = user.split_once("\n---\n").unwrap_or(("", user));
                let reply = format!("{header}\n---\n[zh] {body}");
                Ok(split_fragments(&reply, 3).into_iter().map(Ok).collect())
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ChatClient for FakeClient {
        fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream<'_>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fragments = (self.respond)(request)?;
            Ok(Box::new(fragments.into_iter()))
        }
    }

    pub(crate) fn split_fragments(text: &str, size: usize) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.chunks(size).map(|c| c.iter().collect()).collect()
    }

    /// Serves one streaming response on a local port, writing `events` one at
    /// a time with `interval` between them. Returns the base URL.
    pub(crate) fn trickle_server(events: Vec<String>, interval: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            read_request(&mut stream);

            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
            if stream.write_all(head.as_bytes()).is_err() {
                return;
            }
            for event in events {
                std::thread::sleep(interval);
                if stream.write_all(event.as_bytes()).and_then(|()| stream.flush()).is_err() {
                    return;
                }
            }
        });

        format!("http://{addr}/v1")
    }

    fn read_request(stream: &mut TcpStream) {
        let mut reader = BufReader::new(stream);
        let mut content_length = 0;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            let header = line.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }
        let mut body = vec![0u8; content_length];
        let _ = reader.read_exact(&mut body);
    }
}
