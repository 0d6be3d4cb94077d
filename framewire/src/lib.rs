//! framewire: the server-sent event wire protocol spoken to chat clients,
//! plus the OpenAI-compatible payload shapes used to talk to generators.

pub mod frames;
pub mod openai;
pub mod sse;

pub use frames::{FrameParseError, StreamFrame};
pub use sse::{SseEvent, SseLineDecoder, SseParseError};

pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
pub const DATA_PREFIX: &str = "data: ";
pub const DONE_MARKER: &str = "[DONE]";
