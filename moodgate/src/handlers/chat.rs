use bytes::Bytes;
use common::consts::{CONVERSATIONS_PATH, USER_ID_HEADER};
use common::errors::MoodGateError;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode, Uri};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::orchestrator::{ChatReply, ChatRequest};
use super::response_handler::ResponseHandler;
use super::AppState;
use crate::analytics::Period;
use crate::state::{ConversationTurn, StateStorageError, TIMESTAMP_FORMAT};

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: String,
    #[serde(default)]
    stream: Option<bool>,
    #[serde(default)]
    conversation_id: Option<i64>,
}

/// Caller identity from the `x-user-id` header; blank means anonymous.
pub fn user_id<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn validate_message(message: &str, max: usize) -> Result<(), MoodGateError> {
    let actual = message.trim().chars().count();
    if actual == 0 || actual > max {
        return Err(MoodGateError::MessageLength { max, actual });
    }
    Ok(())
}

async fn parse_chat_request<B>(request: Request<B>, max_message_length: usize) -> Result<ChatRequest, MoodGateError>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let user_id = user_id(&request);
    let stream_query = query_param(request.uri(), "stream").is_some_and(|v| is_truthy(&v));

    let body_bytes = request
        .into_body()
        .collect()
        .await
        .map_err(|err| MoodGateError::InvalidRequest(format!("failed to read body: {}", err)))?
        .to_bytes();

    let body: ChatBody = serde_json::from_slice(&body_bytes)
        .map_err(|err| MoodGateError::InvalidRequest(err.to_string()))?;
    validate_message(&body.message, max_message_length)?;

    Ok(ChatRequest {
        message: body.message.trim().to_string(),
        user_id,
        conversation_id: body.conversation_id,
        stream: stream_query || body.stream.unwrap_or(false),
    })
}

/// `POST /chat`
pub async fn chat<B>(
    request: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let chat_request = match parse_chat_request(request, state.max_message_length).await {
        Ok(chat_request) => chat_request,
        Err(err) => {
            warn!(error = %err, "rejected chat request");
            return Ok(ResponseHandler::create_error_response(err));
        }
    };

    info!(
        user_id = ?chat_request.user_id,
        stream = chat_request.stream,
        message_chars = chat_request.message.chars().count(),
        "chat request"
    );

    let response = match state.orchestrator.handle(chat_request).await {
        Ok(ChatReply::Complete(body)) => {
            ResponseHandler::create_json_response(StatusCode::OK, &Value::Object(body))
        }
        Ok(ChatReply::Stream(frames)) => ResponseHandler::create_sse_response(frames),
        Err(err) => Err(MoodGateError::InternalServerError(err.to_string())),
    };

    Ok(response.unwrap_or_else(|err| {
        warn!(error = %err, "chat request failed");
        ResponseHandler::create_error_response(err)
    }))
}

/// `GET /v1/analytics?period=all|today&mood=...`
pub async fn analytics<B>(
    request: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let Some(user_id) = user_id(&request) else {
        debug!("analytics requested without a user id");
        return Ok(ResponseHandler::create_error_response(MoodGateError::Unidentified));
    };

    let period = Period::from_param(query_param(request.uri(), "period").as_deref());
    let mood = query_param(request.uri(), "mood");

    let response = match state.analytics.compute(&user_id, period, mood.as_deref()).await {
        Ok(snapshot) => serde_json::to_value(&snapshot)
            .map_err(|err| MoodGateError::InternalServerError(err.to_string()))
            .and_then(|body| ResponseHandler::create_json_response(StatusCode::OK, &body)),
        Err(err) => Err(MoodGateError::InternalServerError(err.to_string())),
    };

    Ok(response.unwrap_or_else(|err| {
        warn!(user_id = %user_id, error = %err, "analytics request failed");
        ResponseHandler::create_error_response(err)
    }))
}

fn turn_json(turn: &ConversationTurn) -> Value {
    json!({
        "user_message": turn.user_message,
        "bot_response": turn.bot_response,
        "flow_type": turn.flow_label.token(),
        "created_at": turn.created_at.format(TIMESTAMP_FORMAT).to_string(),
    })
}

/// `GET /v1/conversations/{id}`: the caller's own turns, oldest first.
pub async fn conversation<B>(
    request: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let Some(user_id) = user_id(&request) else {
        debug!("conversation requested without a user id");
        return Ok(ResponseHandler::create_error_response(MoodGateError::Unidentified));
    };

    let raw_id = request
        .uri()
        .path()
        .strip_prefix(CONVERSATIONS_PATH)
        .unwrap_or_default();
    let Ok(conversation_id) = raw_id.parse::<i64>() else {
        return Ok(ResponseHandler::create_error_response(MoodGateError::InvalidRequest(
            format!("invalid conversation id '{}'", raw_id),
        )));
    };

    let response = match state.conversations.turns(&user_id, conversation_id).await {
        Ok(turns) => {
            let body = json!({
                "conversation_id": conversation_id,
                "turns": turns.iter().map(turn_json).collect::<Vec<_>>(),
            });
            ResponseHandler::create_json_response(StatusCode::OK, &body)
        }
        Err(StateStorageError::NotFound(_)) => Err(MoodGateError::ConversationNotFound(conversation_id)),
        Err(err) => Err(MoodGateError::InternalServerError(err.to_string())),
    };

    Ok(response.unwrap_or_else(|err| {
        warn!(user_id = %user_id, conversation_id, error = %err, "conversation request failed");
        ResponseHandler::create_error_response(err)
    }))
}

/// `GET /healthz`
pub async fn health(state: Arc<AppState>) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let body = json!({
        "status": "ok",
        "companion_ready": state.companion_ready.is_ready(),
    });
    Ok(ResponseHandler::create_json_response(StatusCode::OK, &body)
        .unwrap_or_else(ResponseHandler::create_error_response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_decodes() {
        let uri: Uri = "/v1/analytics?period=today&mood=%C3%9Czg%C3%BCn".parse().unwrap();
        assert_eq!(query_param(&uri, "mood").as_deref(), Some("Üzgün"));
        assert_eq!(query_param(&uri, "period").as_deref(), Some("today"));
        assert_eq!(query_param(&uri, "missing"), None);
        assert_eq!(query_param(&"/chat".parse().unwrap(), "stream"), None);
    }

    #[test]
    fn test_validate_message_bounds() {
        assert!(validate_message("merhaba", 10).is_ok());
        assert!(matches!(
            validate_message("   ", 10),
            Err(MoodGateError::MessageLength { actual: 0, .. })
        ));
        assert!(matches!(
            validate_message("çok uzun bir mesaj", 5),
            Err(MoodGateError::MessageLength { max: 5, actual: 18 })
        ));
    }

    #[test]
    fn test_user_id_header() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "  u1 ")
            .body(())
            .unwrap();
        assert_eq!(user_id(&request).as_deref(), Some("u1"));

        let blank = Request::builder().header(USER_ID_HEADER, " ").body(()).unwrap();
        assert_eq!(user_id(&blank), None);
    }
}
