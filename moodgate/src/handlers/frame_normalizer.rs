//! Turns a [`FrameProducer`] into the client-facing frame sequence.
//!
//! Order on the wire: one `metadata`, any number of `chunk`s, then exactly
//! one `done` or `error`. The turn is persisted once, after the last chunk and
//! before `done`, and only when the producer finished cleanly with some text.

use common::consts::DEFAULT_STREAM_BUFFER_SIZE;
use framewire::StreamFrame;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn, Instrument};

use crate::generator::{FrameProducer, GeneratorError};
use crate::router::FlowLabel;
use crate::state::PersistenceGateway;

/// Sent to the client in place of the generator's own error text.
pub const STREAM_ERROR_MESSAGE: &str = "response generation failed";

/// Everything needed to record a turn once its response text is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    pub user_id: Option<String>,
    pub conversation_id: Option<i64>,
    pub message: String,
    pub flow_label: FlowLabel,
}

impl PendingTurn {
    /// Best effort. Failures are logged and reported as "not saved".
    pub async fn persist(&self, persistence: &dyn PersistenceGateway, response: &str) -> Option<i64> {
        match persistence
            .record_turn(
                self.user_id.as_deref(),
                self.conversation_id,
                &self.message,
                response,
                self.flow_label,
            )
            .await
        {
            Ok(conversation_id) => conversation_id,
            Err(err) => {
                warn!(
                    user_id = ?self.user_id,
                    flow = %self.flow_label,
                    error = %err,
                    "failed to record conversation turn"
                );
                None
            }
        }
    }
}

fn fragments(producer: FrameProducer) -> BoxStream<'static, Result<String, GeneratorError>> {
    match producer {
        FrameProducer::WholeText(text) => stream::once(async move { Ok(text) }).boxed(),
        FrameProducer::SyncFragments(iter) => stream::iter(iter).boxed(),
        FrameProducer::AsyncFragments(fragments) => fragments,
    }
}

/// Drains a producer into one string, for turns that were not asked to stream.
pub async fn collect(producer: FrameProducer) -> Result<String, GeneratorError> {
    let mut fragments = fragments(producer);
    let mut text = String::new();
    while let Some(fragment) = fragments.next().await {
        text.push_str(&fragment?);
    }
    Ok(text.trim().to_string())
}

/// Spawns the task that feeds frames into the returned stream.
///
/// Dropping the stream stops the task; nothing is persisted in that case.
pub fn normalize_stream(
    producer: FrameProducer,
    metadata: Map<String, Value>,
    pending: PendingTurn,
    persistence: Arc<dyn PersistenceGateway>,
) -> ReceiverStream<StreamFrame> {
    let (tx, rx) = mpsc::channel::<StreamFrame>(DEFAULT_STREAM_BUFFER_SIZE);

    let task = async move {
        let started = Instant::now();
        if tx.send(StreamFrame::metadata(metadata)).await.is_err() {
            warn!("receiver dropped before metadata");
            return;
        }

        let mut fragments = fragments(producer);
        let mut response = String::new();
        let mut chunk_count: usize = 0;

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) if fragment.is_empty() => continue,
                Ok(fragment) => {
                    response.push_str(&fragment);
                    chunk_count += 1;
                    if tx.send(StreamFrame::chunk(fragment)).await.is_err() {
                        warn!(chunks = chunk_count, "receiver dropped mid-stream, turn not recorded");
                        return;
                    }
                }
                Err(err) => {
                    warn!(chunks = chunk_count, error = %err, "producer failed mid-stream, turn not recorded");
                    let _ = tx.send(StreamFrame::error(STREAM_ERROR_MESSAGE)).await;
                    return;
                }
            }
        }

        let mut done = Map::new();
        if response.trim().is_empty() {
            debug!("empty streamed response, turn not recorded");
        } else if let Some(conversation_id) = pending.persist(persistence.as_ref(), &response).await {
            done.insert("conversation_id".to_string(), Value::from(conversation_id));
        }

        if tx.send(StreamFrame::done(done)).await.is_err() {
            warn!("receiver dropped before done");
            return;
        }
        info!(
            flow = %pending.flow_label,
            chunks = chunk_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stream completed"
        );
    };

    tokio::spawn(task.instrument(tracing::Span::current()));
    ReceiverStream::new(rx)
}
