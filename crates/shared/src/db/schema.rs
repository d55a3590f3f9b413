use rusqlite::Connection;
use anyhow::Result;

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        -- Accounts
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            token TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_token ON users(token);

        -- Chats (user-owned, soft deleted through status)
        CREATE TABLE IF NOT EXISTS chats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            title TEXT NOT NULL DEFAULT 'New Chat',
            status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'deleted')),
            created_at INTEGER NOT NULL,
            last_message_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
                ON DELETE CASCADE
                ON UPDATE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_chats_owner ON chats(user_id, status, last_message_at DESC);

        -- Messages (append-only, ordered by position within a chat)
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id INTEGER NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
            content TEXT NOT NULL,
            position INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (chat_id) REFERENCES chats(id)
                ON DELETE CASCADE
                ON UPDATE CASCADE,
            UNIQUE(chat_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, position);
    ")?;
    Ok(())
}
