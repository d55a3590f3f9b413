//! Scripted provider for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use async_trait::async_trait;
use futures_util::stream;
use parley_shared::{Message, TokenUsage};

use super::{AiProvider, FragmentStream, Generation, ProviderError};

#[derive(Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fragments: Vec<String>,
    stream_error: Option<String>,
    unavailable: Option<String>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    /// Each `generate` call answers with the next reply in order.
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// Streams `fragments`, then completes.
    pub fn streaming<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Every call fails before producing anything.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            unavailable: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Err(message.into()));
        self
    }

    /// After the scripted fragments, the stream yields an error instead of ending.
    pub fn fail_after_fragments(mut self, message: impl Into<String>) -> Self {
        self.stream_error = Some(message.into());
        self
    }

    /// Histories received so far, one entry per call.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, messages: &[Message]) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        match &self.unavailable {
            Some(message) => Err(ProviderError::InvalidResponse(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    async fn generate(&self, messages: &[Message]) -> Result<Generation, ProviderError> {
        self.record(messages)?;

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Ok(content)) => Ok(Generation {
                usage: TokenUsage {
                    prompt_tokens: messages.len() as u32,
                    response_tokens: 1,
                    total_tokens: messages.len() as u32 + 1,
                },
                content,
            }),
            Some(Err(message)) => Err(ProviderError::InvalidResponse(message)),
            None => Err(ProviderError::Empty),
        }
    }

    async fn stream_fragments(&self, messages: &[Message]) -> Result<FragmentStream, ProviderError> {
        self.record(messages)?;

        let mut items: Vec<Result<String, ProviderError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.stream_error {
            items.push(Err(ProviderError::InvalidResponse(message.clone())));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}
