pub mod relay;
pub mod title;

use parley_shared::{Chat, Message, Role, User};

use crate::error::{ApiError, ApiResult};
use crate::provider::{Generation, ProviderError};
use crate::state::AppState;

pub const CHAT_NOT_FOUND: &str = "Chat not found";

/// Reject blank input before anything is written.
pub fn validate_message(message: &str) -> ApiResult<&str> {
    if message.trim().is_empty() {
        return Err(ApiError::Validation("Message is required"));
    }
    Ok(message)
}

/// Load an active chat owned by `user`, or fail with not-found.
pub fn active_chat(state: &AppState, user: &User, chat_id: i64) -> ApiResult<Chat> {
    state
        .db
        .find_active_chat(chat_id, user.id)?
        .ok_or(ApiError::NotFound(CHAT_NOT_FOUND))
}

/// Ask the provider for a reply, treating blank text as a failure so it is
/// never stored.
async fn generate_reply(state: &AppState, messages: &[Message]) -> Result<Generation, ProviderError> {
    let reply = state.provider.generate(messages).await?;
    if reply.content.trim().is_empty() {
        return Err(ProviderError::Empty);
    }
    Ok(reply)
}

/// Result of the first turn of a new chat. The chat exists even when the
/// reply failed.
pub struct FirstTurn {
    pub chat: Chat,
    pub reply: Result<Generation, ProviderError>,
}

/// Create a chat from its opening message, answer it, and title it.
pub async fn start_chat(state: &AppState, user: &User, message: &str) -> ApiResult<FirstTurn> {
    let message = validate_message(message)?;
    let mut chat = state.db.create_chat(user.id, message)?;
    tracing::info!(chat_id = chat.id, user_id = user.id, "Created chat");

    let reply = match generate_reply(state, &chat.messages).await {
        Ok(generation) => generation,
        Err(e) => {
            tracing::warn!(chat_id = chat.id, "Generation failed for new chat: {}", e);
            return Ok(FirstTurn { chat, reply: Err(e) });
        }
    };

    chat.push(state.db.append_message(chat.id, Role::Assistant, &reply.content)?);

    let title = title::generate_title(state.provider.as_ref(), &chat.messages).await;
    if let Some(titled) = state.db.set_title(chat.id, user.id, &title)? {
        chat.title = titled.title;
    }

    Ok(FirstTurn { chat, reply: Ok(reply) })
}

/// One non-streaming turn on an existing chat.
///
/// The user message is stored before the provider is called and stays
/// stored if generation fails.
pub async fn send_message(
    state: &AppState,
    user: &User,
    chat_id: i64,
    message: &str,
) -> ApiResult<Generation> {
    let message = validate_message(message)?;
    let mut chat = active_chat(state, user, chat_id)?;
    chat.push(state.db.append_message(chat.id, Role::User, message)?);

    let reply = generate_reply(state, &chat.messages).await.map_err(|e| {
        tracing::warn!(chat_id, "Generation failed: {}", e);
        ApiError::Provider(e)
    })?;

    state.db.append_message(chat.id, Role::Assistant, &reply.content)?;
    Ok(reply)
}

/// Stateless single-turn exchange for anonymous visitors.
pub async fn public_chat(state: &AppState, message: &str) -> ApiResult<Generation> {
    let message = validate_message(message)?;
    let reply = generate_reply(state, &[Message::user(message)]).await?;
    Ok(reply)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use parley_shared::db::Db;
    use parley_shared::User;

    use crate::provider::mock::MockProvider;
    use crate::state::AppState;

    pub fn setup(provider: MockProvider) -> (Arc<AppState>, Arc<MockProvider>, User, String) {
        let db = Db::in_memory().unwrap();
        let (user, token) = db.create_user("ada").unwrap().unwrap();
        let provider = Arc::new(provider);
        let state = AppState::new(db, provider.clone());
        (state, provider, user, token)
    }
}
