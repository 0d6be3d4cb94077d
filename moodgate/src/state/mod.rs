use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Timelike};
use common::consts::{CONVERSATION_TITLE_MAX_CHARS, DEFAULT_CONVERSATION_TITLE};
use common::mood::Mood;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::router::FlowLabel;

pub mod flat_file;
pub mod memory;
pub mod postgresql;

/// Wall-clock format used for stored and reported timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A recognised mood observed for a user at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodEvent {
    pub user_id: String,
    pub mood: Mood,
    #[serde(with = "timestamp_format")]
    pub occurred_at: NaiveDateTime,
}

impl MoodEvent {
    /// Timestamps are kept at whole-second precision so every backend stores
    /// the same instant.
    pub fn new(user_id: impl Into<String>, mood: Mood, occurred_at: NaiveDateTime) -> Self {
        Self {
            user_id: user_id.into(),
            mood,
            occurred_at: occurred_at.with_nanosecond(0).unwrap_or(occurred_at),
        }
    }

    pub fn now(user_id: impl Into<String>, mood: Mood) -> Self {
        Self::new(user_id, mood, Local::now().naive_local())
    }
}

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub conversation_id: i64,
    pub user_message: String,
    pub bot_response: String,
    pub flow_label: FlowLabel,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub created_at: NaiveDateTime,
}

/// Error types for state storage operations
#[derive(Debug, Error)]
pub enum StateStorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Append-only log of mood events.
#[async_trait]
pub trait MoodEventLog: Send + Sync {
    async fn append(&self, event: MoodEvent) -> Result<(), StateStorageError>;

    /// Every event for `user_id` with `occurred_at >= since`, oldest first.
    async fn events_since(
        &self,
        user_id: &str,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<MoodEvent>, StateStorageError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends a turn to `conversation_id` when it exists and belongs to
    /// `user_id`; otherwise starts a new conversation. Returns the id used.
    async fn record_turn(
        &self,
        user_id: &str,
        conversation_id: Option<i64>,
        message: &str,
        response: &str,
        flow_label: FlowLabel,
    ) -> Result<i64, StateStorageError>;

    async fn turns(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Vec<ConversationTurn>, StateStorageError>;
}

/// Write side used by the request pipeline. Both calls are best effort.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// `Ok(None)` when the turn was not recorded because the user is anonymous.
    async fn record_turn(
        &self,
        user_id: Option<&str>,
        conversation_id: Option<i64>,
        message: &str,
        response: &str,
        flow_label: FlowLabel,
    ) -> Result<Option<i64>, StateStorageError>;

    async fn record_mood_event(&self, user_id: &str, mood: Mood) -> Result<(), StateStorageError>;
}

pub struct StateGateway {
    conversations: Arc<dyn ConversationStore>,
    mood_log: Arc<dyn MoodEventLog>,
}

impl StateGateway {
    pub fn new(conversations: Arc<dyn ConversationStore>, mood_log: Arc<dyn MoodEventLog>) -> Self {
        Self {
            conversations,
            mood_log,
        }
    }
}

#[async_trait]
impl PersistenceGateway for StateGateway {
    async fn record_turn(
        &self,
        user_id: Option<&str>,
        conversation_id: Option<i64>,
        message: &str,
        response: &str,
        flow_label: FlowLabel,
    ) -> Result<Option<i64>, StateStorageError> {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            debug!(flow = %flow_label, "anonymous turn, not recorded");
            return Ok(None);
        };

        let id = self
            .conversations
            .record_turn(user_id, conversation_id, message, response, flow_label)
            .await?;
        Ok(Some(id))
    }

    async fn record_mood_event(&self, user_id: &str, mood: Mood) -> Result<(), StateStorageError> {
        self.mood_log.append(MoodEvent::now(user_id, mood)).await
    }
}

/// First characters of the opening message, or the default title when it is
/// blank.
pub fn conversation_title(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return DEFAULT_CONVERSATION_TITLE.to_string();
    }
    trimmed.chars().take(CONVERSATION_TITLE_MAX_CHARS).collect()
}
