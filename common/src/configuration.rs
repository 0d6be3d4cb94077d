use duration_string::DurationString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;

use crate::consts::{
    DEFAULT_BIND_ADDRESS, DEFAULT_HANDLER_TIMEOUT_SECS, DEFAULT_INTENT_TIMEOUT_SECS,
    DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_READINESS_WAIT_SECS, DEFAULT_RETRIEVAL_TOP_K,
};
use crate::errors::ConfigError;
use crate::mood::Mood;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub version: String,
    pub listener: Option<Listener>,
    pub generators: Generators,
    pub intent: Option<IntentConfig>,
    pub handlers: Option<HandlersConfig>,
    pub mood_log: Option<StateStorageConfig>,
    pub conversation_store: Option<StateStorageConfig>,
    pub retrieval: Option<RetrievalConfig>,
    pub sources: Option<Vec<SourceConfig>>,
    pub animals: Option<Vec<AnimalConfig>>,
    pub mood_emojis: Option<HashMap<Mood, Vec<String>>>,
    pub limits: Option<Limits>,
    pub tracing: Option<Tracing>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Listener {
    pub address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generators {
    /// Classifies messages into flow labels.
    pub router: GeneratorConfig,
    /// Answers animal and factual questions over retrieved context.
    pub responder: GeneratorConfig,
    /// Chats and tags mood; may need warming up before first use.
    pub companion: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub timeout: Option<DurationString>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub stream: Option<bool>,
    pub warm_up: Option<bool>,
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.clone().map(Duration::from)
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntentConfig {
    pub timeout: Option<DurationString>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HandlersConfig {
    pub timeout: Option<DurationString>,
    pub readiness_wait: Option<DurationString>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStorageConfig {
    #[serde(rename = "type")]
    pub storage_type: StateStorageType,
    pub connection_string: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateStorageType {
    Memory,
    Postgres,
    FlatFile,
}

impl Display for StateStorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateStorageType::Memory => write!(f, "memory"),
            StateStorageType::Postgres => write!(f, "postgres"),
            StateStorageType::FlatFile => write!(f, "flat_file"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetrievalConfig {
    pub top_k: Option<usize>,
    #[serde(default)]
    pub documents: Vec<DocumentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Source identifier attached to every chunk of this document.
    pub source: String,
    pub path: String,
}

/// A retrievable source that can be named in factual answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    pub id: String,
    pub emoji: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimalConfig {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub emoji: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Limits {
    pub max_message_length: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Tracing {
    pub random_sampling: Option<u32>,
    pub opentracing_grpc_endpoint: Option<String>,
}

fn duration_or(value: Option<&DurationString>, default_secs: u64) -> Duration {
    value
        .cloned()
        .map(Duration::from)
        .unwrap_or(Duration::from_secs(default_secs))
}

impl Configuration {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Configuration = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for storage in [&self.mood_log, &self.conversation_store].into_iter().flatten() {
            match storage.storage_type {
                StateStorageType::Postgres if storage.connection_string.is_none() => {
                    return Err(ConfigError::Invalid(
                        "postgres storage requires connection_string".to_string(),
                    ));
                }
                StateStorageType::FlatFile if storage.path.is_none() => {
                    return Err(ConfigError::Invalid(
                        "flat_file storage requires path".to_string(),
                    ));
                }
                _ => {}
            }
        }

        if let Some(StateStorageType::FlatFile) =
            self.conversation_store.as_ref().map(|s| &s.storage_type)
        {
            return Err(ConfigError::Invalid(
                "conversation_store supports memory or postgres".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        match &self.listener {
            Some(Listener {
                address: Some(address),
                port: Some(port),
            }) => format!("{}:{}", address, port),
            Some(Listener {
                address: None,
                port: Some(port),
            }) => format!("0.0.0.0:{}", port),
            _ => DEFAULT_BIND_ADDRESS.to_string(),
        }
    }

    pub fn intent_timeout(&self) -> Duration {
        duration_or(
            self.intent.as_ref().and_then(|i| i.timeout.as_ref()),
            DEFAULT_INTENT_TIMEOUT_SECS,
        )
    }

    pub fn handler_timeout(&self) -> Duration {
        duration_or(
            self.handlers.as_ref().and_then(|h| h.timeout.as_ref()),
            DEFAULT_HANDLER_TIMEOUT_SECS,
        )
    }

    pub fn readiness_wait(&self) -> Duration {
        duration_or(
            self.handlers.as_ref().and_then(|h| h.readiness_wait.as_ref()),
            DEFAULT_READINESS_WAIT_SECS,
        )
    }

    pub fn max_message_length(&self) -> usize {
        self.limits
            .as_ref()
            .and_then(|l| l.max_message_length)
            .unwrap_or(DEFAULT_MAX_MESSAGE_LENGTH)
    }

    pub fn retrieval_top_k(&self) -> usize {
        self.retrieval
            .as_ref()
            .and_then(|r| r.top_k)
            .unwrap_or(DEFAULT_RETRIEVAL_TOP_K)
    }
}
