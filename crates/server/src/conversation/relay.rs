//! Streaming turn: forwards provider fragments to the client as SSE frames
//! and stores the assembled reply once generation succeeds.

use std::sync::Arc;
use parley_shared::db::Db;
use parley_shared::{Chat, Role, User};
use tokio::sync::mpsc;

use super::{active_chat, validate_message};
use crate::error::ApiResult;
use crate::events::{self, StreamFrame, StreamSession};
use crate::provider::{AiProvider, ProviderError};
use crate::state::AppState;

/// Validate the request, persist the user message, and start relaying.
///
/// Errors here happen before any frame is produced and become plain HTTP
/// errors. Once this returns, the receiver yields frames until exactly one
/// terminal frame.
pub fn open_stream(
    state: &AppState,
    user: &User,
    chat_id: i64,
    message: &str,
) -> ApiResult<mpsc::UnboundedReceiver<StreamFrame>> {
    let message = validate_message(message)?;
    let mut chat = active_chat(state, user, chat_id)?;
    chat.push(state.db.append_message(chat.id, Role::User, message)?);

    let (session, rx) = events::channel();
    tokio::spawn(relay(state.db.clone(), state.provider.clone(), chat, session));
    Ok(rx)
}

/// Run one generation for `chat` (whose last message is the new user turn).
pub async fn relay(db: Db, provider: Arc<dyn AiProvider>, chat: Chat, session: StreamSession) {
    if !session.is_connected() {
        tracing::info!(chat_id = chat.id, "Client left before generation started");
        return;
    }

    let mut assembled = String::new();

    let result = provider
        .generate_streaming(&chat.messages, &mut |fragment: String| {
            assembled.push_str(&fragment);
            session.chunk(fragment)
        })
        .await;

    match result {
        Ok(()) if assembled.trim().is_empty() => {
            tracing::warn!(chat_id = chat.id, "Provider finished without any text");
            session.fail("Empty response from model");
        }
        Ok(()) => match db.append_message(chat.id, Role::Assistant, &assembled) {
            Ok(_) => {
                tracing::debug!(chat_id = chat.id, chars = assembled.len(), "Stream complete");
                session.complete();
            }
            Err(e) => {
                tracing::error!(chat_id = chat.id, "Failed to save assistant message: {:#}", e);
                session.fail("Failed to save response");
            }
        },
        Err(ProviderError::Cancelled) => {
            tracing::info!(chat_id = chat.id, "Client disconnected mid-stream; reply discarded");
        }
        Err(e) => {
            tracing::warn!(chat_id = chat.id, "Stream generation failed: {}", e);
            session.fail(e.to_string());
        }
    }
}
