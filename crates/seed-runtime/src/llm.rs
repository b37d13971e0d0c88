//! The LLM adapter boundary. `seed-runtime` ships only the trait and a
//! fixture implementation for tests; a concrete HTTP-backed provider is an
//! external collaborator.

use async_trait::async_trait;
use parking_lot::Mutex;
use seed_domain::error::{Error, Result};
use seed_domain::stream::{BoxStream, StreamEvent, Usage};
use seed_domain::tool::{Message, ToolCall, ToolDefinition};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream that never yields anything. `NullProvider` has nothing to
/// stream since it never talks to a network.
struct EmptyStream;

impl futures_core::Stream for EmptyStream {
    type Item = StreamEvent;
    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(None)
    }
}

/// A completed LLM turn: text, optional reasoning trace, and any tool calls
/// the model wants executed.
#[derive(Debug, Clone, Default)]
pub struct LlmReply {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmReply>;

    fn stream(&self, messages: &[Message], tools: &[ToolDefinition]) -> BoxStream<'static, StreamEvent>;
}

/// A scripted provider for tests: returns queued replies in order, erroring
/// once exhausted. Never talks to a network.
pub struct NullProvider {
    replies: Mutex<VecDeque<LlmReply>>,
}

impl NullProvider {
    pub fn new(replies: Vec<LlmReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }

    pub fn single_text(text: impl Into<String>) -> Self {
        Self::new(vec![LlmReply {
            content: Some(text.into()),
            ..Default::default()
        }])
    }
}

#[async_trait]
impl LlmProvider for NullProvider {
    async fn complete(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<LlmReply> {
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Other("NullProvider exhausted: no queued reply".into()))
    }

    fn stream(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> BoxStream<'static, StreamEvent> {
        Box::pin(EmptyStream)
    }
}
