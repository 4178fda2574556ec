//! SQLite-backed `ConversationStore`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use petvet_core::error::PetVetError;
use petvet_core::types::{Conversation, Message, Role};

use crate::db::Database;
use crate::store::ConversationStore;

const CONVERSATION_COLUMNS: &str =
    "id, user_id, title, title_generated, auto_reply_attempted, created_at, updated_at";

/// Conversation and message persistence over a shared `Database`.
pub struct SqliteConversationStore {
    db: Arc<Database>,
}

impl SqliteConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn conversation_exists(
        conn: &rusqlite::Connection,
        conversation_id: Uuid,
    ) -> Result<bool, PetVetError> {
        conn.query_row(
            "SELECT 1 FROM conversations WHERE id = ?1",
            rusqlite::params![conversation_id.to_string()],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| PetVetError::Storage(e.to_string()))
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<Conversation, PetVetError> {
        let now = now_millis();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            title_generated: false,
            auto_reply_attempted: false,
            created_at: millis_to_datetime(now)?,
            updated_at: millis_to_datetime(now)?,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, title_generated, auto_reply_attempted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, 0, ?4, ?4)",
                rusqlite::params![conversation.id.to_string(), user_id, title, now],
            )
            .map_err(|e| PetVetError::Storage(format!("Failed to create conversation: {}", e)))?;
            Ok(())
        })?;

        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, PetVetError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS);
            let result = conn
                .query_row(&sql, rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_conversation(row))
                })
                .optional()
                .map_err(|e| PetVetError::Storage(e.to_string()))?;

            match result {
                Some(conversation) => Ok(Some(conversation?)),
                None => Ok(None),
            }
        })
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, PetVetError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversations WHERE user_id = ?1 ORDER BY updated_at DESC, created_at DESC",
                CONVERSATION_COLUMNS
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| PetVetError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![user_id], |row| Ok(row_to_conversation(row)))
                .map_err(|e| PetVetError::Storage(e.to_string()))?;

            let mut conversations = Vec::new();
            for row in rows {
                let conversation = row.map_err(|e| PetVetError::Storage(e.to_string()))??;
                conversations.push(conversation);
            }
            Ok(conversations)
        })
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool, PetVetError> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM conversations WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(|e| PetVetError::Storage(format!("Failed to delete conversation: {}", e)))?;
            Ok(deleted > 0)
        })
    }

    async fn append(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<Message, PetVetError> {
        if !role.is_persistable() {
            return Err(PetVetError::Storage(format!(
                "{} messages are never persisted",
                role
            )));
        }

        let now = now_millis();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.to_string(),
            created_at: millis_to_datetime(now)?,
        };

        self.db.with_conn(|conn| {
            if !Self::conversation_exists(conn, conversation_id)? {
                return Err(PetVetError::ConversationNotFound(conversation_id));
            }
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    message.id.to_string(),
                    conversation_id.to_string(),
                    role.as_str(),
                    content,
                    now,
                ],
            )
            .map_err(|e| PetVetError::Storage(format!("Failed to append message: {}", e)))?;
            Ok(())
        })?;

        Ok(message)
    }

    async fn list(&self, conversation_id: Uuid) -> Result<Vec<Message>, PetVetError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, role, content, created_at
                     FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY seq ASC",
                )
                .map_err(|e| PetVetError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![conversation_id.to_string()], |row| {
                    Ok(row_to_message(row))
                })
                .map_err(|e| PetVetError::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                let message = row.map_err(|e| PetVetError::Storage(e.to_string()))??;
                messages.push(message);
            }
            Ok(messages)
        })
    }

    async fn touch_conversation(
        &self,
        conversation_id: Uuid,
        title: Option<&str>,
    ) -> Result<(), PetVetError> {
        let now = now_millis();
        self.db.with_conn(|conn| {
            let updated = match title {
                Some(title) => conn.execute(
                    "UPDATE conversations SET title = ?2, title_generated = 1, updated_at = ?3
                     WHERE id = ?1",
                    rusqlite::params![conversation_id.to_string(), title, now],
                ),
                None => conn.execute(
                    "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                    rusqlite::params![conversation_id.to_string(), now],
                ),
            }
            .map_err(|e| PetVetError::Storage(format!("Failed to update conversation: {}", e)))?;

            if updated == 0 {
                return Err(PetVetError::ConversationNotFound(conversation_id));
            }
            Ok(())
        })
    }

    async fn mark_auto_reply_attempted(&self, conversation_id: Uuid) -> Result<(), PetVetError> {
        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE conversations SET auto_reply_attempted = 1 WHERE id = ?1",
                    rusqlite::params![conversation_id.to_string()],
                )
                .map_err(|e| PetVetError::Storage(format!("Failed to update conversation: {}", e)))?;

            if updated == 0 {
                return Err(PetVetError::ConversationNotFound(conversation_id));
            }
            Ok(())
        })
    }
}

// =============================================================================
// Row mapping helpers
// =============================================================================

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, PetVetError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| PetVetError::Storage(format!("Invalid timestamp: {}", millis)))
}

fn parse_uuid(raw: &str) -> Result<Uuid, PetVetError> {
    Uuid::parse_str(raw).map_err(|e| PetVetError::Storage(format!("Invalid UUID '{}': {}", raw, e)))
}

fn row_to_conversation(row: &rusqlite::Row) -> Result<Conversation, PetVetError> {
    let read = |e: rusqlite::Error| PetVetError::Storage(e.to_string());

    let id: String = row.get(0).map_err(read)?;
    let title_generated: i64 = row.get(3).map_err(read)?;
    let auto_reply_attempted: i64 = row.get(4).map_err(read)?;
    let created_at: i64 = row.get(5).map_err(read)?;
    let updated_at: i64 = row.get(6).map_err(read)?;

    Ok(Conversation {
        id: parse_uuid(&id)?,
        user_id: row.get(1).map_err(read)?,
        title: row.get(2).map_err(read)?,
        title_generated: title_generated != 0,
        auto_reply_attempted: auto_reply_attempted != 0,
        created_at: millis_to_datetime(created_at)?,
        updated_at: millis_to_datetime(updated_at)?,
    })
}

fn row_to_message(row: &rusqlite::Row) -> Result<Message, PetVetError> {
    let read = |e: rusqlite::Error| PetVetError::Storage(e.to_string());

    let id: String = row.get(0).map_err(read)?;
    let conversation_id: String = row.get(1).map_err(read)?;
    let role: String = row.get(2).map_err(read)?;
    let created_at: i64 = row.get(4).map_err(read)?;

    Ok(Message {
        id: parse_uuid(&id)?,
        conversation_id: parse_uuid(&conversation_id)?,
        role: role.parse()?,
        content: row.get(3).map_err(read)?,
        created_at: millis_to_datetime(created_at)?,
    })
}
