use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use parley_shared::{Chat, ChatSummary, TokenUsage, User};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::state::ChatState;
use crate::stream::{StreamConsumer, StreamOutcome};

#[derive(Serialize)]
struct MessageRequest<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct TitleRequest<'a> {
    title: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct RegisterResponse {
    pub user: User,
    pub token: String,
}

#[derive(Deserialize, Debug)]
struct ChatListResponse {
    chats: Vec<ChatSummary>,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    chat: Chat,
}

#[derive(Deserialize, Debug)]
pub struct CreateChatResponse {
    pub chat: Chat,
    pub ai_response: Option<String>,
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct SendMessageResponse {
    pub message: String,
    pub usage: TokenUsage,
}

#[derive(Deserialize, Debug)]
struct UpdateTitleResponse {
    chat: Chat,
}

#[derive(Deserialize, Debug)]
pub struct PublicChatResponse {
    pub response: String,
    pub usage: TokenUsage,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.authed(builder).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from(response).await)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        Ok(self.send(builder).await?.json::<T>().await?)
    }

    pub async fn register(&self, username: &str) -> Result<RegisterResponse> {
        let builder = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&serde_json::json!({ "username": username }));
        self.send_json(builder).await
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        let builder = self.client.get(self.url("/api/chat"));
        Ok(self.send_json::<ChatListResponse>(builder).await?.chats)
    }

    pub async fn get_chat(&self, chat_id: i64) -> Result<Chat> {
        let builder = self.client.get(self.url(&format!("/api/chat/{}", chat_id)));
        Ok(self.send_json::<ChatResponse>(builder).await?.chat)
    }

    pub async fn create_chat(&self, message: &str) -> Result<CreateChatResponse> {
        let builder = self
            .client
            .post(self.url("/api/chat"))
            .json(&MessageRequest { message });
        self.send_json(builder).await
    }

    pub async fn send_message(&self, chat_id: i64, message: &str) -> Result<SendMessageResponse> {
        let builder = self
            .client
            .post(self.url(&format!("/api/chat/{}/messages", chat_id)))
            .json(&MessageRequest { message });
        self.send_json(builder).await
    }

    /// Send `message` to the open chat and stream the reply into `state`.
    ///
    /// The user message shows up in `state` before the request goes out. The
    /// assistant reply is only committed once the server signals completion.
    pub async fn stream_message(
        &self,
        state: &mut ChatState,
        message: &str,
        mut on_chunk: impl FnMut(&str),
    ) -> Result<StreamOutcome> {
        let chat_id = state
            .current_id()
            .ok_or_else(|| anyhow!("No chat is open"))?;

        state.begin_turn(message);

        let builder = self
            .client
            .post(self.url(&format!("/api/chat/{}/stream", chat_id)))
            .json(&MessageRequest { message });
        let response = match self.send(builder).await {
            Ok(response) => response,
            Err(e) => {
                // Refused before the server stored anything.
                state.rollback_turn(message);
                return Err(e);
            }
        };

        let mut stream = response.bytes_stream();
        let mut consumer = StreamConsumer::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    state.abort();
                    return Err(e.into());
                }
            };
            if consumer.feed(state, &bytes, &mut on_chunk).is_some() {
                break;
            }
        }

        Ok(consumer.finish(state))
    }

    pub async fn update_title(&self, chat_id: i64, title: &str) -> Result<Chat> {
        let builder = self
            .client
            .put(self.url(&format!("/api/chat/{}/title", chat_id)))
            .json(&TitleRequest { title });
        Ok(self.send_json::<UpdateTitleResponse>(builder).await?.chat)
    }

    pub async fn delete_chat(&self, chat_id: i64) -> Result<()> {
        let builder = self.client.delete(self.url(&format!("/api/chat/{}", chat_id)));
        self.send(builder).await?;
        Ok(())
    }

    pub async fn public_chat(&self, message: &str) -> Result<PublicChatResponse> {
        let builder = self
            .client
            .post(self.url("/api/public/chat"))
            .json(&MessageRequest { message });
        self.send_json(builder).await
    }
}

async fn error_from(response: Response) -> anyhow::Error {
    let status = response.status();
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };

    if status == StatusCode::UNAUTHORIZED {
        return anyhow!("{} - try `parley-cli config set-user <name>` to register again", message);
    }
    anyhow!("{} ({})", message, status.as_u16())
}
