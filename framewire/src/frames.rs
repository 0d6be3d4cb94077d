use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

use crate::DATA_PREFIX;

/// One unit of the client-facing event stream.
///
/// A stream is at most one `Metadata` frame, then any number of `Chunk`
/// frames, then exactly one terminal `Done` or `Error` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    Metadata(Map<String, Value>),
    Chunk { content: String },
    Done(Map<String, Value>),
    Error { error: String },
}

#[derive(Debug, Error)]
pub enum FrameParseError {
    #[error("line does not start with 'data: '")]
    MissingPrefix,
    #[error("invalid frame payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl StreamFrame {
    pub fn metadata(fields: Map<String, Value>) -> Self {
        StreamFrame::Metadata(without_type_key(fields))
    }

    pub fn chunk(content: impl Into<String>) -> Self {
        StreamFrame::Chunk {
            content: content.into(),
        }
    }

    pub fn done(fields: Map<String, Value>) -> Self {
        StreamFrame::Done(without_type_key(fields))
    }

    pub fn error(error: impl Into<String>) -> Self {
        StreamFrame::Error {
            error: error.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Done(_) | StreamFrame::Error { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamFrame::Metadata(_) => "metadata",
            StreamFrame::Chunk { .. } => "chunk",
            StreamFrame::Done(_) => "done",
            StreamFrame::Error { .. } => "error",
        }
    }

    /// `data: {json}` followed by the blank line that ends an SSE event.
    pub fn to_sse_line(&self) -> String {
        // serializing a map of json values cannot fail
        let payload = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","error":"frame serialization failed"}"#.to_string()
        });
        format!("{}{}\n\n", DATA_PREFIX, payload)
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_sse_line())
    }
}

impl FromStr for StreamFrame {
    type Err = FrameParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let payload = line
            .trim_end()
            .strip_prefix(DATA_PREFIX)
            .ok_or(FrameParseError::MissingPrefix)?;
        Ok(serde_json::from_str(payload)?)
    }
}

// the tag owns the "type" key
fn without_type_key(mut fields: Map<String, Value>) -> Map<String, Value> {
    fields.remove("type");
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_metadata_fields_are_flattened() {
        let frame = StreamFrame::metadata(map(json!({
            "rag": true,
            "rag_source": "pdf-cats",
            "rag_emoji": "🐱",
        })));
        assert_eq!(
            frame.to_sse_line(),
            "data: {\"type\":\"metadata\",\"rag\":true,\"rag_source\":\"pdf-cats\",\"rag_emoji\":\"🐱\"}\n\n"
        );
    }

    #[test]
    fn test_chunk_and_error_shapes() {
        assert_eq!(
            StreamFrame::chunk("Merhaba").to_sse_line(),
            "data: {\"type\":\"chunk\",\"content\":\"Merhaba\"}\n\n"
        );
        assert_eq!(
            StreamFrame::error("upstream closed").to_sse_line(),
            "data: {\"type\":\"error\",\"error\":\"upstream closed\"}\n\n"
        );
    }

    #[test]
    fn test_done_with_empty_fields() {
        assert_eq!(
            StreamFrame::done(Map::new()).to_sse_line(),
            "data: {\"type\":\"done\"}\n\n"
        );
    }

    #[test]
    fn test_caller_cannot_override_type() {
        let frame = StreamFrame::metadata(map(json!({"type": "done", "flow_type": "RAG"})));
        let line = frame.to_sse_line();
        assert!(line.starts_with("data: {\"type\":\"metadata\""));
        assert_eq!(line.matches("\"type\"").count(), 1);
    }

    #[test]
    fn test_parse_line_back_into_frame() {
        let frame: StreamFrame = "data: {\"type\":\"done\",\"conversation_id\":42}\n\n"
            .parse()
            .unwrap();
        assert_eq!(frame, StreamFrame::done(map(json!({"conversation_id": 42}))));
        assert!(frame.is_terminal());
        assert_eq!(frame.kind(), "done");

        assert!(matches!(
            "event: ping".parse::<StreamFrame>(),
            Err(FrameParseError::MissingPrefix)
        ));
        assert!(matches!(
            "data: {\"type\":\"unknown\"}".parse::<StreamFrame>(),
            Err(FrameParseError::Payload(_))
        ));
    }
}
