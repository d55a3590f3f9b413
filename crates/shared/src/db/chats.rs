use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};

use super::{from_millis, query_row_optional, to_millis, Db};
use crate::models::{Chat, ChatStatus, ChatSummary, Message, Role, DEFAULT_TITLE};

impl Db {
    /// Create a chat owned by `user_id` whose history starts with `first_message`.
    pub fn create_chat(&self, user_id: i64, first_message: &str) -> Result<Chat> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = to_millis(Utc::now());

        tx.execute(
            "INSERT INTO chats (user_id, title, status, created_at, last_message_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user_id, DEFAULT_TITLE, ChatStatus::Active, now],
        )?;
        let chat_id = tx.last_insert_rowid();
        append(&tx, chat_id, Role::User, first_message)?;
        tx.commit()?;

        load_chat(&conn, chat_id, user_id)?
            .context("chat vanished right after creation")
    }

    /// Active chats of a user, most recently used first.
    pub fn find_active_chats(&self, user_id: i64) -> Result<Vec<ChatSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, last_message_at FROM chats
             WHERE user_id = ?1 AND status = ?2
             ORDER BY last_message_at DESC, id DESC",
        )?;

        let chats = stmt.query_map(params![user_id, ChatStatus::Active], |row| {
            Ok(ChatSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: from_millis(row.get(2)?),
                last_message_at: from_millis(row.get(3)?),
            })
        })?;

        chats.collect::<Result<Vec<_>, _>>().map_err(|e| e.into())
    }

    /// A chat with its full history, if it exists, belongs to `user_id` and
    /// has not been deleted.
    pub fn find_active_chat(&self, chat_id: i64, user_id: i64) -> Result<Option<Chat>> {
        let conn = self.lock()?;
        load_chat(&conn, chat_id, user_id)
    }

    /// Append one message and bump the chat's `last_message_at` in a single
    /// transaction.
    pub fn append_message(&self, chat_id: i64, role: Role, content: &str) -> Result<Message> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let message = append(&tx, chat_id, role, content)?;
        tx.commit()?;
        Ok(message)
    }

    pub fn set_title(&self, chat_id: i64, user_id: i64, title: &str) -> Result<Option<Chat>> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE chats SET title = ?1 WHERE id = ?2 AND user_id = ?3 AND status = ?4",
            params![title, chat_id, user_id, ChatStatus::Active],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        load_chat(&conn, chat_id, user_id)
    }

    /// Mark a chat deleted. Returns `false` when there was no active chat to delete.
    pub fn soft_delete(&self, chat_id: i64, user_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE chats SET status = ?1 WHERE id = ?2 AND user_id = ?3 AND status = ?4",
            params![ChatStatus::Deleted, chat_id, user_id, ChatStatus::Active],
        )?;
        Ok(updated > 0)
    }
}

fn append(conn: &Connection, chat_id: i64, role: Role, content: &str) -> Result<Message> {
    let (position, last_message_at): (i64, i64) = conn
        .query_row(
            "SELECT COALESCE((SELECT MAX(position) + 1 FROM messages WHERE chat_id = ?1), 0),
                    last_message_at
             FROM chats WHERE id = ?1",
            params![chat_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .with_context(|| format!("chat {} not found", chat_id))?;

    // Keep timestamps monotonic in append order even if the clock steps back.
    let created_at = to_millis(Utc::now()).max(last_message_at);

    conn.execute(
        "INSERT INTO messages (chat_id, role, content, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![chat_id, role, content, position, created_at],
    )?;
    conn.execute(
        "UPDATE chats SET last_message_at = ?1 WHERE id = ?2",
        params![created_at, chat_id],
    )?;

    Ok(Message {
        role,
        content: content.to_string(),
        timestamp: from_millis(created_at),
    })
}

fn load_chat(conn: &Connection, chat_id: i64, user_id: i64) -> Result<Option<Chat>> {
    let chat = query_row_optional(
        conn,
        "SELECT id, user_id, title, status, created_at, last_message_at FROM chats
         WHERE id = ?1 AND user_id = ?2 AND status = ?3",
        params![chat_id, user_id, ChatStatus::Active],
        |row| {
            Ok(Chat {
                id: row.get(0)?,
                user_id: row.get(1)?,
                title: row.get(2)?,
                status: row.get(3)?,
                created_at: from_millis(row.get(4)?),
                last_message_at: from_millis(row.get(5)?),
                messages: Vec::new(),
            })
        },
    )?;

    let Some(mut chat) = chat else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT role, content, created_at FROM messages
         WHERE chat_id = ?1
         ORDER BY position",
    )?;
    let messages = stmt.query_map(params![chat_id], |row| {
        Ok(Message {
            role: row.get(0)?,
            content: row.get(1)?,
            timestamp: from_millis(row.get(2)?),
        })
    })?;
    chat.messages = messages.collect::<Result<Vec<_>, _>>()?;

    Ok(Some(chat))
}
