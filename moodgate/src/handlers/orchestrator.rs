use framewire::StreamFrame;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::frame_normalizer::{self, PendingTurn};
use crate::flows::{FlowHandler, HandlerOutput, HandlerResult, TurnContext};
use crate::router::{FlowLabel, IntentClassifier};
use crate::state::PersistenceGateway;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: Option<String>,
    pub conversation_id: Option<i64>,
    pub stream: bool,
}

pub enum ChatReply {
    /// JSON body: `response`, `flow_type`, the flow's extra fields and
    /// `conversation_id` when the turn was saved.
    Complete(Map<String, Value>),
    Stream(ReceiverStream<StreamFrame>),
}

impl std::fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatReply::Complete(body) => f.debug_tuple("Complete").field(body).finish(),
            ChatReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no handler registered for flow {0}")]
    UnhandledFlow(FlowLabel),
}

/// Classifies each message, runs the matching flow and records the turn.
pub struct Orchestrator {
    classifier: IntentClassifier,
    handlers: HashMap<FlowLabel, Arc<dyn FlowHandler>>,
    persistence: Arc<dyn PersistenceGateway>,
    handler_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        classifier: IntentClassifier,
        persistence: Arc<dyn PersistenceGateway>,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            handlers: HashMap::new(),
            persistence,
            handler_timeout,
        }
    }

    /// Registers `handler` under its own label, replacing any previous one.
    pub fn with_handler(mut self, handler: Arc<dyn FlowHandler>) -> Self {
        self.handlers.insert(handler.label(), handler);
        self
    }

    fn handler(&self, label: FlowLabel) -> Result<&Arc<dyn FlowHandler>, OrchestratorError> {
        self.handlers
            .get(&label)
            .ok_or(OrchestratorError::UnhandledFlow(label))
    }

    async fn run(&self, label: FlowLabel, turn: &TurnContext) -> Result<HandlerOutput, OrchestratorError> {
        let handler = self.handler(label)?;
        let started = Instant::now();
        match tokio::time::timeout(self.handler_timeout, handler.handle(turn)).await {
            Ok(output) => {
                debug!(flow = %label, elapsed_ms = started.elapsed().as_millis() as u64, "handler finished");
                Ok(output)
            }
            Err(_) => {
                warn!(flow = %label, timeout_ms = self.handler_timeout.as_millis() as u64, "handler timed out");
                Ok(HandlerOutput::Complete(HandlerResult::new(handler.apology())))
            }
        }
    }

    /// Runs the classified flow, falling back to HELP when it has no answer.
    async fn dispatch(
        &self,
        label: FlowLabel,
        turn: &TurnContext,
    ) -> Result<(FlowLabel, HandlerOutput), OrchestratorError> {
        match self.run(label, turn).await? {
            HandlerOutput::NoAnswer if label != FlowLabel::Help => {
                info!(flow = %label, "no answer, falling back to help");
                let output = self.run(FlowLabel::Help, turn).await?;
                Ok((FlowLabel::Help, output))
            }
            HandlerOutput::NoAnswer => {
                let apology = self.handler(FlowLabel::Help)?.apology();
                Ok((label, HandlerOutput::Complete(HandlerResult::new(apology))))
            }
            output => Ok((label, output)),
        }
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply, OrchestratorError> {
        let label = self.classifier.classify(&request.message).await;
        let turn = TurnContext::new(request.message.clone(), request.user_id.clone(), request.stream);
        let (label, output) = self.dispatch(label, &turn).await?;

        let pending = PendingTurn {
            user_id: turn.user_id.clone(),
            conversation_id: request.conversation_id,
            message: turn.message.clone(),
            flow_label: label,
        };

        let result = match output {
            HandlerOutput::Stream {
                mut extra_fields,
                producer,
            } if turn.stream => {
                extra_fields.insert("flow_type".to_string(), Value::from(label.token()));
                return Ok(ChatReply::Stream(frame_normalizer::normalize_stream(
                    producer,
                    extra_fields,
                    pending,
                    self.persistence.clone(),
                )));
            }
            HandlerOutput::Stream {
                extra_fields,
                producer,
            } => match frame_normalizer::collect(producer).await {
                Ok(text) if !text.is_empty() => HandlerResult {
                    response: text,
                    extra_fields,
                },
                Ok(_) | Err(_) => {
                    warn!(flow = %label, "incremental answer could not be collected");
                    HandlerResult {
                        response: self.handler(label)?.apology().to_string(),
                        extra_fields,
                    }
                }
            },
            HandlerOutput::Complete(result) => result,
            // dispatch never returns NoAnswer
            HandlerOutput::NoAnswer => HandlerResult::new(self.handler(FlowLabel::Help)?.apology()),
        };

        let conversation_id = pending.persist(self.persistence.as_ref(), &result.response).await;
        Ok(ChatReply::Complete(complete_body(label, result, conversation_id)))
    }
}

fn complete_body(label: FlowLabel, result: HandlerResult, conversation_id: Option<i64>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("response".to_string(), Value::from(result.response));
    body.insert("flow_type".to_string(), Value::from(label.token()));
    for (key, value) in result.extra_fields {
        body.entry(key).or_insert(value);
    }
    if let Some(conversation_id) = conversation_id {
        body.insert("conversation_id".to_string(), Value::from(conversation_id));
    }
    body
}
