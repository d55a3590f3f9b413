//! Text generation backends.
//!
//! The relay and the chat handlers only see [`AiProvider`]; Gemini is the
//! production implementation.

pub mod gemini;
#[cfg(test)]
pub mod mock;

use std::pin::Pin;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use parley_shared::{Message, TokenUsage};
use thiserror::Error;

pub use gemini::GeminiProvider;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Empty response from model")]
    Empty,

    #[error("generation cancelled")]
    Cancelled,
}

/// A complete, non-incremental reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: String,
    pub usage: TokenUsage,
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Generate one full reply for `messages`, oldest first.
    async fn generate(&self, messages: &[Message]) -> Result<Generation, ProviderError>;

    /// Start an incremental reply. Fragments are yielded in provider order.
    async fn stream_fragments(&self, messages: &[Message]) -> Result<FragmentStream, ProviderError>;

    /// Drive a streamed reply, handing each non-empty fragment to `on_fragment`.
    ///
    /// When `on_fragment` returns `false` the consumer is gone: reading stops
    /// and `ProviderError::Cancelled` is returned.
    async fn generate_streaming(
        &self,
        messages: &[Message],
        on_fragment: &mut (dyn FnMut(String) -> bool + Send),
    ) -> Result<(), ProviderError> {
        let mut fragments = self.stream_fragments(messages).await?;

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            if !on_fragment(fragment) {
                return Err(ProviderError::Cancelled);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockProvider;
    use super::*;

    #[tokio::test]
    async fn streaming_skips_empty_fragments_in_order() {
        let provider = MockProvider::streaming(["Sure, ", "", "X is ...", ""]);
        let mut seen = Vec::new();

        provider
            .generate_streaming(&[Message::user("Explain X")], &mut |f: String| {
                seen.push(f);
                true
            })
            .await
            .unwrap();

        assert_eq!(seen, ["Sure, ", "X is ..."]);
    }

    #[tokio::test]
    async fn refusing_a_fragment_cancels() {
        let provider = MockProvider::streaming(["a", "b", "c"]);
        let mut seen = 0;

        let result = provider
            .generate_streaming(&[Message::user("go")], &mut |_: String| {
                seen += 1;
                false
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn mid_stream_failure_surfaces() {
        let provider = MockProvider::streaming(["partial"]).fail_after_fragments("quota exceeded");

        let mut seen = Vec::new();
        let result = provider
            .generate_streaming(&[Message::user("go")], &mut |f: String| {
                seen.push(f);
                true
            })
            .await;

        assert_eq!(seen, ["partial"]);
        assert!(matches!(result, Err(ProviderError::InvalidResponse(msg)) if msg == "quota exceeded"));
    }
}
