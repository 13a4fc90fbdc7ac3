use anyhow::{Context, Result};

use super::MemoryStore;

/// A temporary admin grant in one chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempAdmin {
    pub user_id: String,
    pub nickname: String,
}

impl MemoryStore {
    /// Grant temporary admin in `chat_id`. Re-granting an existing pair is a no-op.
    pub async fn grant(&self, chat_id: &str, user_id: &str, nickname: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO temp_admins (chat_id, user_id, user_nickname)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![chat_id, user_id, nickname],
        )
        .context("Failed to grant temporary admin")?;
        Ok(())
    }

    /// Remove a grant. Returns whether one existed.
    pub async fn revoke(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute(
                "DELETE FROM temp_admins WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id],
            )
            .context("Failed to revoke temporary admin")?;
        Ok(rows > 0)
    }

    pub async fn is_granted(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let granted: bool = conn
            .query_row(
                "SELECT count(*) > 0 FROM temp_admins WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id],
                |row| row.get(0),
            )
            .context("Failed to check temporary admin")?;
        Ok(granted)
    }

    /// All grants in a chat. Order is not significant.
    pub async fn list_admins(&self, chat_id: &str) -> Result<Vec<TempAdmin>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT user_id, user_nickname FROM temp_admins
             WHERE chat_id = ?1
             ORDER BY granted_at ASC, user_id ASC",
        )?;

        let admins = stmt
            .query_map(rusqlite::params![chat_id], |row| {
                Ok(TempAdmin {
                    user_id: row.get(0)?,
                    nickname: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list temporary admins")?;

        Ok(admins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_then_revoke() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.grant("chat-1", "user-1", "alice").await.unwrap();
        assert!(store.is_granted("chat-1", "user-1").await.unwrap());

        assert!(store.revoke("chat-1", "user-1").await.unwrap());
        assert!(!store.is_granted("chat-1", "user-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.grant("chat-1", "user-1", "alice").await.unwrap();
        store.grant("chat-1", "user-1", "alice again").await.unwrap();

        let admins = store.list_admins("chat-1").await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].nickname, "alice");
    }

    #[tokio::test]
    async fn test_revoke_missing_is_not_an_error() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert!(!store.revoke("chat-1", "ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_grants_are_chat_scoped() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.grant("chat-1", "user-1", "alice").await.unwrap();
        store.grant("chat-2", "user-2", "bob").await.unwrap();

        assert!(!store.is_granted("chat-2", "user-1").await.unwrap());
        let admins = store.list_admins("chat-2").await.unwrap();
        assert_eq!(
            admins,
            vec![TempAdmin {
                user_id: "user-2".to_string(),
                nickname: "bob".to_string(),
            }]
        );
    }
}
