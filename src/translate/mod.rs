pub mod batch;
pub mod client;
pub mod prompt;
pub mod stream;

pub use batch::{batch, batch_default, DEFAULT_BATCH_SIZE};
pub use client::OpenAiChatClient;
pub use prompt::{encode_batch, ChatRequest, SYSTEM_PROMPT};
pub use stream::{consume, parse_line, Frame, LineAccumulator, ParsedLine, StreamSummary};

use crate::config::Credentials;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::LocalBoxStream;

/// Event data strings of one streamed completion, in arrival order.
pub type FrameStream = LocalBoxStream<'static, Result<String>>;

/// A remote chat endpoint that answers one request with a stream of frames.
///
/// Everything runs on a single thread, so implementations need not be `Send`.
#[async_trait(?Send)]
pub trait ChatBackend {
    async fn open_stream(
        &self,
        credentials: &Credentials,
        request: &ChatRequest,
    ) -> Result<FrameStream>;
    fn name(&self) -> &'static str;
}
