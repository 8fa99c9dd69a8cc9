//! SQLite-backed chat history: the durable side of best-effort persistence.
//!
//! Upsert semantics follow the savechat contract: rows are keyed by
//! `(user_id, chat_id, panel_id)`. When a row exists, the incoming turn is
//! appended to its stored conversation array and `content`/`response` are
//! refreshed; otherwise a new row is created. A save without an authenticated
//! user id is rejected with `Unauthorized`, a payload missing required fields
//! with `BadRequest` — the 401/400 split of the original endpoint.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ArenaError;
use crate::panels::ConversationTurn;
use crate::persist::{PanelRef, SavePayload, SaveSink, UserSession};

/// Seconds in one UTC calendar day, the grouping bucket.
const DAY_SECS: i64 = 86_400;

/// Current Unix epoch in seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One persisted chat row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub user_id: String,
    pub chat_id: String,
    pub panel_id: u32,
    pub parent_model: String,
    pub selected_model: Option<String>,
    /// Most recent question, mirrored from the last appended turn.
    pub content: String,
    /// Most recent response, mirrored from the last appended turn.
    pub response: String,
    pub conversation: Vec<ConversationTurn>,
    pub updated_at: i64,
}

/// Chat rows bucketed by UTC calendar day for the sidebar listing.
#[derive(Debug, Default)]
pub struct GroupedChats {
    pub today: Vec<ChatRecord>,
    pub yesterday: Vec<ChatRecord>,
    pub older: Vec<ChatRecord>,
}

pub struct ChatHistory {
    conn: Mutex<Connection>,
}

impl ChatHistory {
    pub fn open(path: &Path) -> Result<Self, ArenaError> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(ChatHistory {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, ArenaError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(ChatHistory {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<(), ArenaError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chats (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL,
                chat_id        TEXT NOT NULL,
                panel_id       INTEGER NOT NULL,
                parent_model   TEXT NOT NULL,
                selected_model TEXT,
                content        TEXT NOT NULL,
                response       TEXT NOT NULL,
                conversation   TEXT NOT NULL,
                updated_at     INTEGER NOT NULL,
                UNIQUE (user_id, chat_id, panel_id)
            );",
        )?;
        Ok(())
    }

    /// Apply one save payload, returning the saved records.
    pub fn apply(
        &self,
        user: &UserSession,
        payload: &SavePayload,
    ) -> Result<Vec<ChatRecord>, ArenaError> {
        if user.id.is_empty() {
            return Err(ArenaError::Unauthorized);
        }
        match payload {
            SavePayload::Batch {
                panels,
                content_to_submit,
                completion_text,
            } => {
                if panels.is_empty() {
                    return Err(ArenaError::BadRequest("panels"));
                }
                if content_to_submit.is_empty() {
                    return Err(ArenaError::BadRequest("contentToSubmit"));
                }
                if completion_text.is_empty() {
                    return Err(ArenaError::BadRequest("completionText"));
                }
                let mut saved = Vec::new();
                for panel in panels {
                    // Skip panels missing their identity, as the endpoint does.
                    if panel.chat_id.is_empty() {
                        continue;
                    }
                    saved.push(self.upsert_turn(
                        &user.id,
                        panel,
                        content_to_submit,
                        completion_text,
                    )?);
                }
                if saved.is_empty() {
                    return Err(ArenaError::BadRequest("panels"));
                }
                Ok(saved)
            }
            SavePayload::Edit {
                panel,
                question,
                completion_text,
            } => {
                if panel.chat_id.is_empty() {
                    return Err(ArenaError::BadRequest("panel"));
                }
                if question.is_empty() {
                    return Err(ArenaError::BadRequest("question"));
                }
                if completion_text.is_empty() {
                    return Err(ArenaError::BadRequest("completionText"));
                }
                Ok(vec![self.upsert_turn(
                    &user.id,
                    panel,
                    question,
                    completion_text,
                )?])
            }
        }
    }

    fn upsert_turn(
        &self,
        user_id: &str,
        panel: &PanelRef,
        question: &str,
        response: &str,
    ) -> Result<ChatRecord, ArenaError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ArenaError::Config("history lock poisoned".to_string()))?;
        let now = now_unix();

        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT id, conversation FROM chats
                 WHERE user_id = ?1 AND chat_id = ?2 AND panel_id = ?3",
                params![user_id, panel.chat_id, panel.panel_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (row_id, mut conversation) = match existing {
            Some((id, raw)) => {
                let turns: Vec<ConversationTurn> = serde_json::from_str(&raw)?;
                (id, turns)
            }
            None => (Uuid::new_v4().to_string(), Vec::new()),
        };
        conversation.push(ConversationTurn {
            question: question.to_string(),
            response: response.to_string(),
        });
        let raw = serde_json::to_string(&conversation)?;

        conn.execute(
            "INSERT INTO chats
                (id, user_id, chat_id, panel_id, parent_model, selected_model,
                 content, response, conversation, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (user_id, chat_id, panel_id) DO UPDATE SET
                 content = excluded.content,
                 response = excluded.response,
                 conversation = excluded.conversation,
                 updated_at = excluded.updated_at",
            params![
                row_id,
                user_id,
                panel.chat_id,
                panel.panel_id,
                panel.parent_model,
                panel.selected_model,
                question,
                response,
                raw,
                now,
            ],
        )?;

        Ok(ChatRecord {
            id: row_id,
            user_id: user_id.to_string(),
            chat_id: panel.chat_id.clone(),
            panel_id: panel.panel_id,
            parent_model: panel.parent_model.clone(),
            selected_model: panel.selected_model.clone(),
            content: question.to_string(),
            response: response.to_string(),
            conversation,
            updated_at: now,
        })
    }

    /// All chat rows owned by one user, most recent first.
    pub fn list_chats(&self, user_id: &str) -> Result<Vec<ChatRecord>, ArenaError> {
        if user_id.is_empty() {
            return Err(ArenaError::Unauthorized);
        }
        let conn = self
            .conn
            .lock()
            .map_err(|_| ArenaError::Config("history lock poisoned".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, chat_id, panel_id, parent_model, selected_model,
                    content, response, conversation, updated_at
             FROM chats WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let raw_rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, i64>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(raw_rows.len());
        for row in raw_rows {
            records.push(ChatRecord {
                id: row.0,
                user_id: row.1,
                chat_id: row.2,
                panel_id: row.3,
                parent_model: row.4,
                selected_model: row.5,
                content: row.6,
                response: row.7,
                conversation: serde_json::from_str(&row.8)?,
                updated_at: row.9,
            });
        }
        Ok(records)
    }

    /// Bucket the user's chats into Today / Yesterday / Older relative to
    /// `now` (Unix seconds), by UTC calendar day.
    pub fn grouped(&self, user_id: &str, now: i64) -> Result<GroupedChats, ArenaError> {
        let today = now.div_euclid(DAY_SECS);
        let mut groups = GroupedChats::default();
        for record in self.list_chats(user_id)? {
            let day = record.updated_at.div_euclid(DAY_SECS);
            if day == today {
                groups.today.push(record);
            } else if day == today - 1 {
                groups.yesterday.push(record);
            } else {
                groups.older.push(record);
            }
        }
        Ok(groups)
    }
}

/// `SaveSink` writing straight into the local history store.
pub struct HistorySink {
    history: Arc<ChatHistory>,
}

impl HistorySink {
    pub fn new(history: Arc<ChatHistory>) -> Self {
        HistorySink { history }
    }
}

#[async_trait]
impl SaveSink for HistorySink {
    async fn save(&self, user: &UserSession, payload: &SavePayload) -> Result<(), ArenaError> {
        self.history.apply(user, payload).map(|_| ())
    }
}
