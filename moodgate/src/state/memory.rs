use super::{
    conversation_title, Conversation, ConversationStore, ConversationTurn, MoodEvent, MoodEventLog,
    StateStorageError,
};
use crate::router::FlowLabel;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory mood log. Events are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryMoodLog {
    events: Arc<RwLock<Vec<MoodEvent>>>,
}

impl MemoryMoodLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MoodEventLog for MemoryMoodLog {
    async fn append(&self, event: MoodEvent) -> Result<(), StateStorageError> {
        debug!(user_id = %event.user_id, mood = %event.mood, "appending mood event");
        self.events.write().await.push(event);
        Ok(())
    }

    async fn events_since(
        &self,
        user_id: &str,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<MoodEvent>, StateStorageError> {
        let events = self.events.read().await;
        let mut matching: Vec<MoodEvent> = events
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter(|e| since.map_or(true, |since| e.occurred_at >= since))
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.occurred_at);
        Ok(matching)
    }
}

#[derive(Default)]
struct ConversationTables {
    next_id: i64,
    conversations: HashMap<i64, Conversation>,
    turns: Vec<ConversationTurn>,
}

/// In-memory conversation store. Uses a HashMap wrapped in Arc<RwLock<>> for
/// thread-safe access.
#[derive(Clone, Default)]
pub struct MemoryConversationStore {
    tables: Arc<RwLock<ConversationTables>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn record_turn(
        &self,
        user_id: &str,
        conversation_id: Option<i64>,
        message: &str,
        response: &str,
        flow_label: FlowLabel,
    ) -> Result<i64, StateStorageError> {
        let mut tables = self.tables.write().await;
        let now = Local::now().naive_local();

        let existing = conversation_id.filter(|id| {
            tables
                .conversations
                .get(id)
                .is_some_and(|c| c.user_id == user_id)
        });

        let id = match existing {
            Some(id) => id,
            None => {
                tables.next_id += 1;
                let id = tables.next_id;
                tables.conversations.insert(
                    id,
                    Conversation {
                        id,
                        user_id: user_id.to_string(),
                        title: conversation_title(message),
                        created_at: now,
                    },
                );
                debug!(conversation_id = id, user_id = %user_id, "started conversation");
                id
            }
        };

        tables.turns.push(ConversationTurn {
            conversation_id: id,
            user_message: message.to_string(),
            bot_response: response.to_string(),
            flow_label,
            created_at: now,
        });
        Ok(id)
    }

    async fn turns(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Vec<ConversationTurn>, StateStorageError> {
        let tables = self.tables.read().await;
        match tables.conversations.get(&conversation_id) {
            Some(conversation) if conversation.user_id == user_id => Ok(tables
                .turns
                .iter()
                .filter(|t| t.conversation_id == conversation_id)
                .cloned()
                .collect()),
            _ => Err(StateStorageError::NotFound(format!(
                "conversation {} for user {}",
                conversation_id, user_id
            ))),
        }
    }
}
