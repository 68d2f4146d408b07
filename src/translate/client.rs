use crate::config::Credentials;
use crate::error::{Result, TranslateError};
use crate::translate::prompt::ChatRequest;
use crate::translate::{ChatBackend, FrameStream};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::Stream;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Name of the SSE event a server uses to report a failure mid-stream.
const ERROR_EVENT: &str = "error";

/// Sends chat requests with `stream: true` and yields each event's data.
pub struct OpenAiChatClient {
    client: reqwest::Client,
}

impl OpenAiChatClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Client whose requests fail after `timeout`, streaming included.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Default for OpenAiChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl ChatBackend for OpenAiChatClient {
    async fn open_stream(
        &self,
        credentials: &Credentials,
        request: &ChatRequest,
    ) -> Result<FrameStream> {
        let response = self
            .client
            .post(&credentials.endpoint_url)
            .header("api-key", &credentials.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        debug!("Chat API response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Api(format!(
                "Chat API error ({}): {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        Ok(event_data_stream(response.bytes_stream()))
    }

    fn name(&self) -> &'static str {
        "openai-chat"
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Dispatch a trailing event the server never terminated with a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).into_owned();
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

/// Turn a response byte stream into a stream of event data strings.
///
/// An `error` event or a transport failure becomes an `Err` item, after
/// which the stream ends.
pub fn event_data_stream<S, B, E>(bytes: S) -> FrameStream
where
    S: Stream<Item = std::result::Result<B, E>> + 'static,
    B: AsRef<[u8]> + 'static,
    E: Into<TranslateError> + 'static,
{
    let state = (Box::pin(bytes), SseDecoder::new(), VecDeque::<Result<String>>::new(), false);

    stream::unfold(
        state,
        |(mut bytes, mut decoder, mut ready, mut finished)| async move {
            loop {
                if let Some(item) = ready.pop_front() {
                    if item.is_err() {
                        finished = true;
                        ready.clear();
                    }
                    return Some((item, (bytes, decoder, ready, finished)));
                }
                if finished {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        ready.extend(decoder.push(chunk.as_ref()).into_iter().map(event_data));
                    }
                    Some(Err(e)) => {
                        finished = true;
                        ready.push_back(Err(e.into()));
                    }
                    None => {
                        finished = true;
                        ready.extend(decoder.finish().map(event_data));
                    }
                }
            }
        },
    )
    .boxed_local()
}

fn event_data(event: SseEvent) -> Result<String> {
    if event.event.as_deref() == Some(ERROR_EVENT) {
        return Err(TranslateError::Api(format!(
            "Server reported stream error: {}",
            event.data
        )));
    }
    Ok(event.data)
}
