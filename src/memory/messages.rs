use anyhow::{Context, Result};
#[cfg(test)]
use rusqlite::OptionalExtension;
use tracing::warn;

use super::MemoryStore;

/// One inbound message as seen by the bot
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub msg_id: String,
    pub chat_id: String,
    pub user_id: String,
    pub user_name: String,
    /// Serialized message content object
    pub content: String,
    /// Epoch milliseconds reported by the platform
    pub send_time: i64,
}

impl MemoryStore {
    /// Append a message to the log. Failures (duplicate id, storage errors)
    /// are logged and swallowed so command handling is never blocked.
    pub async fn record(&self, record: &MessageRecord) {
        if let Err(e) = self.try_record(record).await {
            warn!("Failed to record message {}: {:#}", record.msg_id, e);
        }
    }

    pub async fn try_record(&self, record: &MessageRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages (msg_id, chat_id, user_id, user_name, content, send_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                &record.msg_id,
                &record.chat_id,
                &record.user_id,
                &record.user_name,
                &record.content,
                record.send_time,
            ],
        )
        .context("Failed to insert message")?;
        Ok(())
    }

    /// Most-recent-first ids of the messages `user_id` sent in `chat_id`,
    /// at most `limit` of them. Recency is arrival order in the log.
    pub async fn recent_message_ids(
        &self,
        chat_id: &str,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT msg_id FROM messages
             WHERE chat_id = ?1 AND user_id = ?2
             ORDER BY rowid DESC
             LIMIT ?3",
        )?;

        let ids = stmt
            .query_map(rusqlite::params![chat_id, user_id, limit], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to load recent messages")?;

        Ok(ids)
    }

    /// Look up a single record by message id
    #[cfg(test)]
    pub async fn message(&self, msg_id: &str) -> Result<Option<MessageRecord>> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                "SELECT msg_id, chat_id, user_id, user_name, content, send_time
                 FROM messages WHERE msg_id = ?1",
                rusqlite::params![msg_id],
                |row| {
                    Ok(MessageRecord {
                        msg_id: row.get(0)?,
                        chat_id: row.get(1)?,
                        user_id: row.get(2)?,
                        user_name: row.get(3)?,
                        content: row.get(4)?,
                        send_time: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("Failed to load message")?;
        Ok(record)
    }
}

#[cfg(test)]
pub(crate) fn make_record(msg_id: &str, chat_id: &str, user_id: &str) -> MessageRecord {
    MessageRecord {
        msg_id: msg_id.to_string(),
        chat_id: chat_id.to_string(),
        user_id: user_id.to_string(),
        user_name: format!("name-{}", user_id),
        content: r#"{"text":"hello"}"#.to_string(),
        send_time: 1_700_000_000_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recent_ids_most_recent_first() {
        let store = MemoryStore::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .try_record(&make_record(&format!("m{}", i), "chat-1", "user-1"))
                .await
                .unwrap();
        }

        let ids = store.recent_message_ids("chat-1", "user-1", 3).await.unwrap();
        assert_eq!(ids, vec!["m4", "m3", "m2"]);
    }

    #[tokio::test]
    async fn test_recent_ids_scoped_to_chat_and_user() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.try_record(&make_record("a", "chat-1", "user-1")).await.unwrap();
        store.try_record(&make_record("b", "chat-1", "user-2")).await.unwrap();
        store.try_record(&make_record("c", "chat-2", "user-1")).await.unwrap();
        store.try_record(&make_record("d", "chat-1", "user-1")).await.unwrap();

        let ids = store.recent_message_ids("chat-1", "user-1", 10).await.unwrap();
        assert_eq!(ids, vec!["d", "a"]);
    }

    #[tokio::test]
    async fn test_recent_ids_empty_when_unknown() {
        let store = MemoryStore::open_in_memory().unwrap();
        let ids = store.recent_message_ids("chat-1", "nobody", 5).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_message_id_rejected_but_record_swallows() {
        let store = MemoryStore::open_in_memory().unwrap();
        let record = make_record("dup", "chat-1", "user-1");
        store.try_record(&record).await.unwrap();
        assert!(store.try_record(&record).await.is_err());

        // The swallowing variant must not panic or surface the error
        store.record(&record).await;
        let ids = store.recent_message_ids("chat-1", "user-1", 10).await.unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_message_lookup() {
        let store = MemoryStore::open_in_memory().unwrap();
        let record = make_record("m1", "chat-1", "user-1");
        store.try_record(&record).await.unwrap();

        assert_eq!(store.message("m1").await.unwrap(), Some(record));
        assert_eq!(store.message("missing").await.unwrap(), None);
    }
}
