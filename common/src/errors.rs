use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{Error as HyperError, Response, StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::consts::JSON_CONTENT_TYPE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// -----------------------------------------------------------------------------
// HTTP-facing errors
// -----------------------------------------------------------------------------
#[derive(Debug, Error)]
pub enum MoodGateError {
    #[error("Invalid request")]
    InvalidRequest(String),

    #[error("Message must be between 1 and {max} characters")]
    MessageLength { max: usize, actual: usize },

    #[error("A user identifier is required for this operation")]
    Unidentified,

    #[error("Conversation {0} not found")]
    ConversationNotFound(i64),

    #[error("No route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Internal server error")]
    InternalServerError(String),

    #[error("Failed to create response: {0}")]
    ResponseCreationFailed(#[from] hyper::http::Error),
}

impl MoodGateError {
    pub fn status(&self) -> StatusCode {
        match self {
            MoodGateError::InvalidRequest(_)
            | MoodGateError::MessageLength { .. }
            | MoodGateError::Unidentified => StatusCode::BAD_REQUEST,
            MoodGateError::RouteNotFound { .. } | MoodGateError::ConversationNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            MoodGateError::InternalServerError(_) | MoodGateError::ResponseCreationFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn into_response(self) -> Response<BoxBody<Bytes, HyperError>> {
        let (code, details) = match &self {
            MoodGateError::InvalidRequest(reason) => ("InvalidRequest", json!({ "reason": reason })),
            MoodGateError::MessageLength { max, actual } => (
                "MessageLength",
                json!({ "max_length": max, "length": actual }),
            ),
            MoodGateError::Unidentified => ("Unidentified", json!({})),
            MoodGateError::ConversationNotFound(id) => {
                ("ConversationNotFound", json!({ "conversation_id": id }))
            }
            MoodGateError::RouteNotFound { method, path } => (
                "RouteNotFound",
                json!({ "method": method, "path": path }),
            ),
            MoodGateError::InternalServerError(reason) => {
                ("InternalServerError", json!({ "reason": reason }))
            }
            MoodGateError::ResponseCreationFailed(reason) => (
                "ResponseCreationFailed",
                json!({ "reason": reason.to_string() }),
            ),
        };

        let body_json = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
                "details": details
            }
        });

        let boxed_body = Full::new(Bytes::from(body_json.to_string()))
            .map_err(|never| match never {})
            .boxed();

        Response::builder()
            .status(self.status())
            .header("content-type", JSON_CONTENT_TYPE)
            .body(boxed_body)
            .unwrap_or_else(|_| {
                Response::new(
                    Full::new(Bytes::from("Internal Error"))
                        .map_err(|never| match never {})
                        .boxed(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<BoxBody<Bytes, HyperError>>) -> serde_json::Value {
        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body_bytes).unwrap()
    }

    #[tokio::test]
    async fn test_message_length_is_bad_request() {
        let response = MoodGateError::MessageLength {
            max: 2000,
            actual: 2500,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "MessageLength");
        assert_eq!(body["error"]["details"]["max_length"], 2000);
        assert!(body["error"]["message"].as_str().unwrap().contains("2000"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = MoodGateError::RouteNotFound {
            method: "GET".to_string(),
            path: "/nope".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["details"]["path"], "/nope");
    }

    #[tokio::test]
    async fn test_unidentified_has_empty_details() {
        let response = MoodGateError::Unidentified.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["details"], json!({}));
    }
}
