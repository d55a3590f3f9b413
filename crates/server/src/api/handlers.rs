use std::convert::Infallible;
use std::sync::Arc;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures_util::stream::{Stream, StreamExt};
use parley_shared::User;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::extract::{Json, Path};
use super::types::*;
use crate::conversation::{self, relay, CHAT_NOT_FOUND};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn health_check() -> &'static str {
    "Parley is running"
}

pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::Validation("Username is required"));
    }

    let (user, token) = state
        .db
        .create_user(username)?
        .ok_or(ApiError::Conflict("Username already taken"))?;

    tracing::info!(user_id = user.id, "Registered user {}", user.username);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user, token })))
}

pub async fn handle_not_found() -> ApiError {
    ApiError::NotFound("Route not found")
}

pub async fn handle_me(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse { user })
}

pub async fn handle_list_chats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<ChatListResponse>> {
    let chats = state.db.find_active_chats(user.id)?;
    Ok(Json(ChatListResponse { chats }))
}

pub async fn handle_get_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(chat_id): Path<i64>,
) -> ApiResult<Json<ChatResponse>> {
    let chat = conversation::active_chat(&state, &user, chat_id)?;
    Ok(Json(ChatResponse { chat }))
}

pub async fn handle_create_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<MessageRequest>,
) -> ApiResult<(StatusCode, Json<CreateChatResponse>)> {
    let turn = conversation::start_chat(&state, &user, &req.message).await?;

    let response = match turn.reply {
        Ok(generation) => CreateChatResponse {
            chat: turn.chat,
            ai_response: Some(generation.content),
            usage: Some(generation.usage),
            error: None,
        },
        Err(e) => CreateChatResponse {
            chat: turn.chat,
            ai_response: None,
            usage: None,
            error: Some(e.to_string()),
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn handle_send_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(chat_id): Path<i64>,
    Json(req): Json<MessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    let reply = conversation::send_message(&state, &user, chat_id, &req.message).await?;
    Ok(Json(SendMessageResponse {
        message: reply.content,
        usage: reply.usage,
    }))
}

pub async fn handle_stream_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(chat_id): Path<i64>,
    Json(req): Json<MessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let rx = relay::open_stream(&state, &user, chat_id, &req.message)?;

    let stream = UnboundedReceiverStream::new(rx)
        .map(|frame| Ok(Event::default().data(frame.to_json())));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn handle_update_title(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(chat_id): Path<i64>,
    Json(req): Json<TitleRequest>,
) -> ApiResult<Json<UpdateTitleResponse>> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("Title is required"));
    }

    let chat = state
        .db
        .set_title(chat_id, user.id, title)?
        .ok_or(ApiError::NotFound(CHAT_NOT_FOUND))?;

    Ok(Json(UpdateTitleResponse {
        message: "Title updated successfully",
        chat,
    }))
}

pub async fn handle_delete_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(chat_id): Path<i64>,
) -> ApiResult<Json<StatusResponse>> {
    if !state.db.soft_delete(chat_id, user.id)? {
        return Err(ApiError::NotFound(CHAT_NOT_FOUND));
    }

    tracing::info!(chat_id, user_id = user.id, "Deleted chat");
    Ok(Json(StatusResponse {
        message: "Chat deleted successfully",
    }))
}

pub async fn handle_public_chat(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<User>>,
    Json(req): Json<MessageRequest>,
) -> ApiResult<Json<PublicChatResponse>> {
    if let Some(Extension(user)) = &user {
        tracing::debug!(user_id = user.id, "Public chat from signed-in user");
    }

    let reply = conversation::public_chat(&state, &req.message).await?;
    Ok(Json(PublicChatResponse {
        response: reply.content,
        usage: reply.usage,
    }))
}
