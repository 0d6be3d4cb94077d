pub const CHAT_PATH: &str = "/chat";
pub const ANALYTICS_PATH: &str = "/v1/analytics";
pub const HEALTH_PATH: &str = "/healthz";
/// Followed by the numeric conversation id.
pub const CONVERSATIONS_PATH: &str = "/v1/conversations/";

pub const USER_ID_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_PARENT_HEADER: &str = "traceparent";

pub const SSE_CONTENT_TYPE: &str = "text/event-stream";
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9091";
pub const DEFAULT_CONFIG_PATH: &str = "./moodgate_config.yaml";
pub const CONFIG_PATH_ENV: &str = "MOODGATE_CONFIG_PATH";

pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 2000;
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 6;
pub const DEFAULT_INTENT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READINESS_WAIT_SECS: u64 = 10;
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 16;

/// Title given to a conversation whose first message is blank.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New chat";
pub const CONVERSATION_TITLE_MAX_CHARS: usize = 50;
