use serde::{Deserialize, Serialize};
use parley_shared::{Chat, ChatSummary, TokenUsage, User};

// Missing string fields deserialize as empty so they fail validation with a
// 400 instead of an extractor rejection.

// Registration
#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub token: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user: User,
}

// Chat endpoints
#[derive(Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
pub struct TitleRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatSummary>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub chat: Chat,
}

#[derive(Serialize)]
pub struct CreateChatResponse {
    pub chat: Chat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub message: String,
    pub usage: TokenUsage,
}

#[derive(Serialize)]
pub struct UpdateTitleResponse {
    pub message: &'static str,
    pub chat: Chat,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub message: &'static str,
}

// Public chat
#[derive(Serialize)]
pub struct PublicChatResponse {
    pub response: String,
    pub usage: TokenUsage,
}
