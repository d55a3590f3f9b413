use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use super::{from_millis, to_millis, Db};
use crate::models::User;

fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: from_millis(row.get(2)?),
    })
}

impl Db {
    /// Register a new account and mint its bearer token.
    /// Returns `None` when the username is already taken.
    pub fn create_user(&self, username: &str) -> Result<Option<(User, String)>> {
        let conn = self.lock()?;

        let exists = conn.query_row(
            "SELECT 1 FROM users WHERE username = ?1",
            params![username],
            |_| Ok(true),
        );
        match exists {
            Ok(_) => return Ok(None),
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }

        let token = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO users (username, token, created_at) VALUES (?1, ?2, ?3)",
            params![username, token, to_millis(now)],
        )?;

        let user = User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            created_at: from_millis(to_millis(now)),
        };
        Ok(Some((user, token)))
    }

    pub fn user_by_token(&self, token: &str) -> Result<Option<User>> {
        self.query_row_optional(
            "SELECT id, username, created_at FROM users WHERE token = ?1",
            params![token],
            user_from_row,
        )
    }
}
