use parley_shared::{Chat, ChatSummary, Message, Role};

/// Client-side view of the signed-in user's chats.
///
/// Owned by the UI loop and passed by `&mut` to whatever needs it.
#[derive(Debug, Default)]
pub struct ChatState {
    pub chats: Vec<ChatSummary>,
    pub current: Option<Chat>,
    /// Text of the assistant reply still being streamed.
    pub live: String,
    pub streaming: bool,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_chats(&mut self, chats: Vec<ChatSummary>) {
        self.chats = chats;
    }

    /// Replace the open chat, dropping any unfinished reply.
    pub fn open(&mut self, chat: Chat) {
        self.current = Some(chat);
        self.live.clear();
        self.streaming = false;
    }

    pub fn current_id(&self) -> Option<i64> {
        self.current.as_ref().map(|c| c.id)
    }

    /// Show the user's message right away and start a live reply.
    pub fn begin_turn(&mut self, content: &str) {
        if let Some(chat) = self.current.as_mut() {
            chat.push(Message::user(content));
        }
        self.live.clear();
        self.streaming = true;
    }

    pub fn push_chunk(&mut self, chunk: &str) {
        self.live.push_str(chunk);
    }

    /// Move the live buffer into the open chat as the assistant reply.
    pub fn commit(&mut self) -> Message {
        let message = Message::assistant(std::mem::take(&mut self.live));
        if let Some(chat) = self.current.as_mut() {
            chat.push(message.clone());
            // Most recent activity first, as the server lists them.
            self.chats.retain(|c| c.id != chat.id);
            self.chats.insert(0, chat.summary());
        }
        self.streaming = false;
        message
    }

    /// Drop the live buffer without touching the chat.
    pub fn abort(&mut self) {
        self.live.clear();
        self.streaming = false;
    }

    /// Undo `begin_turn` when the server refused the message before storing it.
    pub fn rollback_turn(&mut self, content: &str) {
        self.abort();
        let Some(chat) = self.current.as_mut() else {
            return;
        };
        let pending = chat
            .messages
            .last()
            .is_some_and(|m| m.role == Role::User && m.content == content);
        if pending {
            chat.messages.pop();
            chat.last_message_at = chat.messages.last().map_or(chat.created_at, |m| m.timestamp);
        }
    }

    pub fn forget(&mut self, chat_id: i64) {
        self.chats.retain(|c| c.id != chat_id);
        if self.current_id() == Some(chat_id) {
            self.current = None;
            self.abort();
        }
    }
}
