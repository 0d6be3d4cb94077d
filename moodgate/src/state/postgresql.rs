use super::{
    conversation_title, ConversationStore, ConversationTurn, MoodEvent, MoodEventLog,
    StateStorageError,
};
use crate::router::FlowLabel;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use common::mood::Mood;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

const SCHEMA_SQL: &str = include_str!("../../../docs/db_setup/moodgate.sql");

/// Maps `mood_events` rows `(user_id, mood, occurred_at)` to events, in
/// row order. Rows whose label is not canonical are skipped.
fn decode_mood_rows<I>(rows: I) -> Vec<MoodEvent>
where
    I: IntoIterator<Item = (String, String, NaiveDateTime)>,
{
    rows.into_iter()
        .filter_map(|(user, label, occurred_at)| match Mood::from_label(&label) {
            Some(mood) => Some(MoodEvent::new(user, mood, occurred_at)),
            None => {
                warn!(user_id = %user, mood = %label, "skipping stored event with unknown mood");
                None
            }
        })
        .collect()
}

/// PostgreSQL backend for both the mood log and conversation history.
#[derive(Clone)]
pub struct PostgreSQLStateStorage {
    client: Arc<Client>,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgreSQLStateStorage {
    pub async fn new(connection_string: &str) -> Result<Self, StateStorageError> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!("Failed to connect to database: {}", e))
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Database connection error: {}", e);
            }
        });

        Ok(Self {
            client: Arc::new(client),
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    /// Creates missing tables once per process.
    async fn ensure_ready(&self) -> Result<(), StateStorageError> {
        self.schema_ready
            .get_or_try_init(|| async {
                self.client.batch_execute(SCHEMA_SQL).await.map_err(|e| {
                    StateStorageError::StorageError(format!(
                        "Failed to prepare schema from docs/db_setup/moodgate.sql: {}",
                        e
                    ))
                })?;
                info!("moodgate state tables ready");
                Ok::<(), StateStorageError>(())
            })
            .await?;
        Ok(())
    }

    async fn owned_conversation(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<bool, StateStorageError> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = $1 AND user_id = $2)",
                &[&conversation_id, &user_id],
            )
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to look up conversation {}: {}",
                    conversation_id, e
                ))
            })?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl MoodEventLog for PostgreSQLStateStorage {
    async fn append(&self, event: MoodEvent) -> Result<(), StateStorageError> {
        self.ensure_ready().await?;

        self.client
            .execute(
                "INSERT INTO mood_events (user_id, mood, occurred_at) VALUES ($1, $2, $3)",
                &[&event.user_id, &event.mood.label(), &event.occurred_at],
            )
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to store mood event for {}: {}",
                    event.user_id, e
                ))
            })?;

        debug!(user_id = %event.user_id, mood = %event.mood, "stored mood event");
        Ok(())
    }

    async fn events_since(
        &self,
        user_id: &str,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<MoodEvent>, StateStorageError> {
        self.ensure_ready().await?;

        let rows = match since {
            Some(since) => {
                self.client
                    .query(
                        "SELECT user_id, mood, occurred_at FROM mood_events
                         WHERE user_id = $1 AND occurred_at >= $2
                         ORDER BY occurred_at, id",
                        &[&user_id, &since],
                    )
                    .await
            }
            None => {
                self.client
                    .query(
                        "SELECT user_id, mood, occurred_at FROM mood_events
                         WHERE user_id = $1
                         ORDER BY occurred_at, id",
                        &[&user_id],
                    )
                    .await
            }
        }
        .map_err(|e| {
            StateStorageError::StorageError(format!(
                "Failed to fetch mood events for {}: {}",
                user_id, e
            ))
        })?;

        Ok(decode_mood_rows(rows.iter().map(|row| {
            (row.get("user_id"), row.get("mood"), row.get("occurred_at"))
        })))
    }
}

#[async_trait]
impl ConversationStore for PostgreSQLStateStorage {
    async fn record_turn(
        &self,
        user_id: &str,
        conversation_id: Option<i64>,
        message: &str,
        response: &str,
        flow_label: FlowLabel,
    ) -> Result<i64, StateStorageError> {
        self.ensure_ready().await?;
        let now = Local::now().naive_local();

        let existing = match conversation_id {
            Some(id) => self.owned_conversation(user_id, id).await?.then_some(id),
            None => None,
        };

        let id = match existing {
            Some(id) => id,
            None => {
                let row = self
                    .client
                    .query_one(
                        "INSERT INTO conversations (user_id, title, created_at)
                         VALUES ($1, $2, $3) RETURNING id",
                        &[&user_id, &conversation_title(message), &now],
                    )
                    .await
                    .map_err(|e| {
                        StateStorageError::StorageError(format!(
                            "Failed to create conversation for {}: {}",
                            user_id, e
                        ))
                    })?;
                let id: i64 = row.get(0);
                debug!(conversation_id = id, user_id = %user_id, "started conversation");
                id
            }
        };

        self.client
            .execute(
                "INSERT INTO conversation_turns
                     (conversation_id, user_message, bot_response, flow_type, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
                &[&id, &message, &response, &flow_label.token(), &now],
            )
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to store turn for conversation {}: {}",
                    id, e
                ))
            })?;

        Ok(id)
    }

    async fn turns(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Vec<ConversationTurn>, StateStorageError> {
        self.ensure_ready().await?;

        if !self.owned_conversation(user_id, conversation_id).await? {
            return Err(StateStorageError::NotFound(format!(
                "conversation {} for user {}",
                conversation_id, user_id
            )));
        }

        let rows = self
            .client
            .query(
                "SELECT conversation_id, user_message, bot_response, flow_type, created_at
                 FROM conversation_turns
                 WHERE conversation_id = $1
                 ORDER BY created_at, id",
                &[&conversation_id],
            )
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to fetch turns for conversation {}: {}",
                    conversation_id, e
                ))
            })?;

        rows.into_iter()
            .map(|row| {
                let flow_type: String = row.get("flow_type");
                let flow_label = FlowLabel::from_token(&flow_type).ok_or_else(|| {
                    StateStorageError::SerializationError(format!(
                        "unknown flow_type '{}'",
                        flow_type
                    ))
                })?;
                Ok(ConversationTurn {
                    conversation_id: row.get("conversation_id"),
                    user_message: row.get("user_message"),
                    bot_response: row.get("bot_response"),
                    flow_label,
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}
