use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{DATA_PREFIX, DONE_MARKER};

/// A single `data:` or `event:` line from an SSE body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub data: Option<String>,
    pub event: Option<String>,
}

impl SseEvent {
    pub fn is_done(&self) -> bool {
        self.data.as_deref() == Some(DONE_MARKER)
    }

    /// Keep-alive pings carry no content.
    pub fn should_skip(&self) -> bool {
        matches!(
            self.data.as_deref(),
            Some(r#"{"type": "ping"}"#) | Some(r#"{"type":"ping"}"#)
        )
    }

    pub fn is_event_only(&self) -> bool {
        self.event.is_some() && self.data.is_none()
    }
}

#[derive(Debug, Error)]
#[error("SSE parse error: {message}")]
pub struct SseParseError {
    pub message: String,
}

impl FromStr for SseEvent {
    type Err = SseParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(data) = line.strip_prefix(DATA_PREFIX).or(line.strip_prefix("data:")) {
            let data = data.trim_start();
            if data.is_empty() {
                return Err(SseParseError {
                    message: "Empty data field is not a valid SSE event".to_string(),
                });
            }
            Ok(SseEvent {
                data: Some(data.to_string()),
                event: None,
            })
        } else if let Some(event_type) = line.strip_prefix("event:") {
            let event_type = event_type.trim();
            if event_type.is_empty() {
                return Err(SseParseError {
                    message: "Empty event field is not a valid SSE event".to_string(),
                });
            }
            Ok(SseEvent {
                data: None,
                event: Some(event_type.to_string()),
            })
        } else {
            Err(SseParseError {
                message: format!("Line does not start with 'data:' or 'event:': {}", line),
            })
        }
    }
}

impl fmt::Display for SseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.event, &self.data) {
            (_, Some(data)) => write!(f, "{}{}", DATA_PREFIX, data),
            (Some(event), None) => write!(f, "event: {}", event),
            (None, None) => Ok(()),
        }
    }
}

/// Incremental line splitter for SSE bodies that arrive in arbitrary byte
/// chunks. Partial lines, including split UTF-8 sequences, are held until the
/// terminating newline arrives.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    pending: Vec<u8>,
    done_seen: bool,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every complete event it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done_seen {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(event) = self.accept(&line) {
                events.push(event);
            }
            if self.done_seen {
                self.pending.clear();
                break;
            }
        }
        events
    }

    /// Flushes a final unterminated line, if any.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.done_seen || self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        self.accept(&line)
    }

    pub fn is_done(&self) -> bool {
        self.done_seen
    }

    pub fn has_buffered_data(&self) -> bool {
        !self.pending.is_empty()
    }

    fn accept(&mut self, line: &[u8]) -> Option<SseEvent> {
        let text = String::from_utf8_lossy(line);
        let event = text.trim().parse::<SseEvent>().ok()?;
        if event.is_done() {
            self.done_seen = true;
        }
        if event.should_skip() {
            return None;
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_data_and_event_lines() {
        let event: SseEvent = "data: {\"a\":1}".parse().unwrap();
        assert_eq!(event.data.as_deref(), Some("{\"a\":1}"));
        assert!(!event.is_done());

        let event: SseEvent = "data:[DONE]".parse().unwrap();
        assert!(event.is_done());

        let event: SseEvent = "event: message_start".parse().unwrap();
        assert!(event.is_event_only());

        assert!("data: ".parse::<SseEvent>().is_err());
        assert!(": comment".parse::<SseEvent>().is_err());
    }

    #[test]
    fn test_decoder_joins_lines_split_across_chunks() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"content\":\"Mer").is_empty());
        assert!(decoder.has_buffered_data());

        let events = decoder.push(b"haba\"}\n\ndata: [DO");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_deref(), Some("{\"content\":\"Merhaba\"}"));

        let events = decoder.push(b"NE]\n\ndata: ignored\n");
        assert_eq!(events.len(), 1);
        assert!(events[0].is_done());
        assert!(decoder.is_done());
        assert!(decoder.push(b"data: more\n").is_empty());
    }

    #[test]
    fn test_decoder_handles_split_utf8() {
        let line = "data: kedi 🐱\n".as_bytes();
        // split inside the four-byte emoji
        let split = line.len() - 3;
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(&line[..split]).is_empty());
        let events = decoder.push(&line[split..]);
        assert_eq!(events[0].data.as_deref(), Some("kedi 🐱"));
    }

    #[test]
    fn test_decoder_flushes_unterminated_line() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().unwrap().data.as_deref(), Some("tail"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_crlf_lines() {
        let mut decoder = SseLineDecoder::new();
        let events = decoder.push(b"data: one\r\n\r\ndata: two\r\n");
        let data: Vec<&str> = events.iter().filter_map(|e| e.data.as_deref()).collect();
        assert_eq!(data, vec!["one", "two"]);
    }
}
