use std::time::Duration;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use parley_shared::sse::{data_payload, SseLineBuffer};
use parley_shared::{Message, Role, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AiProvider, FragmentStream, Generation, ProviderError};
use crate::config::GeminiConfig;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    /// A reply with no text is an error, whether the prompt was blocked, the
    /// candidate was cut off (`finishReason: SAFETY`) or nothing came back.
    fn into_generation(self) -> Result<Generation, ProviderError> {
        let content = self.text();
        if !content.trim().is_empty() {
            return Ok(Generation { content, usage: self.usage() });
        }

        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::InvalidResponse(format!("prompt blocked: {}", reason)));
        }
        match self.candidates.into_iter().next().and_then(|c| c.finish_reason) {
            Some(reason) if reason != "STOP" => {
                Err(ProviderError::InvalidResponse(format!("no text returned (finish reason {})", reason)))
            }
            _ => Err(ProviderError::Empty),
        }
    }

    fn usage(&self) -> TokenUsage {
        self.usage_metadata
            .as_ref()
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count.unwrap_or(0),
                response_tokens: u.candidates_token_count.unwrap_or(0),
                total_tokens: u.total_token_count.unwrap_or(0),
            })
            .unwrap_or_default()
    }
}

/// Conversation history in Gemini's vocabulary. Consecutive turns by the same
/// side are folded into one content with several parts.
fn to_contents(messages: &[Message]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::new();

    for message in messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        let part = Part { text: message.content.clone() };

        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => last.parts.push(part),
            _ => contents.push(Content {
                role: Some(role.to_string()),
                parts: vec![part],
            }),
        }
    }

    contents
}

pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        if config.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; generation requests will fail");
        }

        Ok(Self { client, config })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config.api_key.as_deref().ok_or(ProviderError::MissingApiKey)
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.config.base_url, self.config.model, method)
    }

    fn request(&self, messages: &[Message]) -> GenerateRequest {
        GenerateRequest {
            contents: to_contents(messages),
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_output_tokens,
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
            },
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api { status: status.as_u16(), body })
}

/// Text fragments out of a `streamGenerateContent?alt=sse` body.
fn fragments<S, B, E>(mut bytes: S) -> impl Stream<Item = Result<String, ProviderError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: Send,
    ProviderError: From<E>,
{
    try_stream! {
        let mut lines = SseLineBuffer::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for line in lines.push(chunk.as_ref()) {
                let Some(data) = data_payload(&line).map(str::trim) else {
                    continue;
                };
                if data.is_empty() {
                    continue;
                }

                let response: GenerateResponse = serde_json::from_str(data)
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
                let text = response.text();
                if !text.is_empty() {
                    yield text;
                }
            }
        }

        if lines.pending() > 0 {
            tracing::warn!(bytes = lines.pending(), "Gemini stream ended mid-event; dropping the tail");
        }
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    async fn generate(&self, messages: &[Message]) -> Result<Generation, ProviderError> {
        let api_key = self.api_key()?;
        tracing::debug!(model = %self.config.model, turns = messages.len(), "Gemini generateContent");

        let response = self
            .client
            .post(self.endpoint("generateContent"))
            .header("x-goog-api-key", api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&self.request(messages))
            .send()
            .await?;

        let response: GenerateResponse = check_status(response).await?.json().await?;
        response.into_generation()
    }

    async fn stream_fragments(&self, messages: &[Message]) -> Result<FragmentStream, ProviderError> {
        let api_key = self.api_key()?;
        tracing::debug!(model = %self.config.model, turns = messages.len(), "Gemini streamGenerateContent");

        let response = self
            .client
            .post(self.endpoint("streamGenerateContent"))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", api_key)
            .json(&self.request(messages))
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(Box::pin(fragments(Box::pin(response.bytes_stream()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn roles_map_to_gemini_vocabulary() {
        let contents = to_contents(&[
            Message::user("Hello"),
            Message::assistant("Hi there"),
            Message::user("Explain X"),
        ]);

        let roles: Vec<_> = contents.iter().map(|c| c.role.as_deref().unwrap()).collect();
        assert_eq!(roles, ["user", "model", "user"]);
        assert_eq!(contents[1].parts[0].text, "Hi there");
    }

    #[test]
    fn consecutive_turns_are_folded() {
        // A failed generation leaves two user turns back to back.
        let contents = to_contents(&[Message::user("first"), Message::user("retry")]);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].parts.len(), 2);
    }

    #[test]
    fn request_body_uses_camel_case() {
        let provider = GeminiProvider::new(GeminiConfig::default()).unwrap();
        let body = serde_json::to_value(provider.request(&[Message::user("Hi")])).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hi");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(body["generationConfig"]["topK"], 40);
    }

    #[test]
    fn usage_metadata_is_optional() {
        let with: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hi "},{"text":"there"}]}}],
                "usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":2,"totalTokenCount":5}}"#,
        )
        .unwrap();
        assert_eq!(with.text(), "Hi there");
        assert_eq!(with.usage(), TokenUsage { prompt_tokens: 3, response_tokens: 2, total_tokens: 5 });

        let without: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"ok"}]}}]}"#).unwrap();
        assert_eq!(without.usage(), TokenUsage::default());
    }

    #[test]
    fn textless_candidates_are_not_a_reply() {
        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(matches!(
            blocked.into_generation(),
            Err(ProviderError::InvalidResponse(msg)) if msg.contains("SAFETY")
        ));

        let prompt_blocked: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#).unwrap();
        assert!(matches!(
            prompt_blocked.into_generation(),
            Err(ProviderError::InvalidResponse(msg)) if msg.contains("OTHER")
        ));

        let blank: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"  "}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert!(matches!(blank.into_generation(), Err(ProviderError::Empty)));

        let nothing: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(nothing.into_generation(), Err(ProviderError::Empty)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let provider = GeminiProvider::new(GeminiConfig::default()).unwrap();
        let result = provider.generate(&[Message::user("Hi")]).await;
        assert!(matches!(result, Err(ProviderError::MissingApiKey)));
    }

    #[tokio::test]
    async fn sse_body_split_mid_line_yields_each_fragment_once() {
        let body: &[&[u8]] = &[
            b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Sure, \"}]}}]}\r\n\r\nda",
            b"ta: {\"candidates\":[{\"content\":{\"parts\":[{\"te",
            b"xt\":\"X is ...\"}]}}]}\r\n\r\n",
            b"data: {\"candidates\":[{\"content\":{\"parts\":[]}}],\"usageMetadata\":{}}\r\n\r\n",
        ];
        let bytes = stream::iter(body.iter().map(|b| Ok::<_, ProviderError>(*b)));

        let out: Vec<String> = fragments(bytes)
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(out, ["Sure, ", "X is ..."]);
    }

    #[tokio::test]
    async fn unterminated_tail_is_dropped() {
        let body: &[&[u8]] = &[
            b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"whole\"}]}}]}\n\n",
            b"data: {\"candidates\":[{\"content\":{\"par",
        ];
        let bytes = stream::iter(body.iter().map(|b| Ok::<_, ProviderError>(*b)));

        let out: Vec<String> = fragments(bytes).map(|r| r.unwrap()).collect().await;

        assert_eq!(out, ["whole"]);
    }

    #[tokio::test]
    async fn unparseable_event_is_an_error() {
        let body: &[&[u8]] = &[b"data: {broken\n\n"];
        let bytes = stream::iter(body.iter().map(|b| Ok::<_, ProviderError>(*b)));

        let out: Vec<_> = fragments(bytes).collect().await;
        assert!(matches!(out.as_slice(), [Err(ProviderError::InvalidResponse(_))]));
    }
}
