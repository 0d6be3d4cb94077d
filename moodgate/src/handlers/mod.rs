use bytes::Bytes;
use common::consts::{ANALYTICS_PATH, CHAT_PATH, CONVERSATIONS_PATH, HEALTH_PATH};
use common::errors::MoodGateError;
use http_body_util::combinators::BoxBody;
use hyper::body::Body;
use hyper::{Method, Request, Response};
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

use crate::analytics::MoodAnalytics;
use crate::generator::ReadinessGate;
use crate::state::ConversationStore;

pub mod chat;
pub mod frame_normalizer;
pub mod orchestrator;
pub mod response_handler;


use orchestrator::Orchestrator;
use response_handler::ResponseHandler;

/// Shared by every connection.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub analytics: Arc<MoodAnalytics>,
    pub conversations: Arc<dyn ConversationStore>,
    pub companion_ready: ReadinessGate,
    pub max_message_length: usize,
}

pub async fn route<B>(
    request: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    match (request.method(), request.uri().path()) {
        (&Method::POST, CHAT_PATH) => chat::chat(request, state).await,
        (&Method::GET, ANALYTICS_PATH) => chat::analytics(request, state).await,
        (&Method::GET, HEALTH_PATH) => chat::health(state).await,
        (&Method::GET, path) if path.starts_with(CONVERSATIONS_PATH) => {
            chat::conversation(request, state).await
        }
        (method, path) => {
            debug!(method = %method, path = %path, "no route found");
            Ok(ResponseHandler::create_error_response(MoodGateError::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            }))
        }
    }
}
