use common::configuration::{Configuration, StateStorageConfig, StateStorageType};
use common::consts::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use moodgate::analytics::MoodAnalytics;
use moodgate::flows::animal::AnimalCatalog;
use moodgate::flows::context::{ContextAnswerer, SourceCatalog};
use moodgate::flows::mood::default_mood_emojis;
use moodgate::flows::{AnalyticsHandler, AnimalHandler, FactualHandler, HelpHandler, MoodHandler};
use moodgate::generator::{Generator, HttpGenerator, ReadinessGate};
use moodgate::handlers::orchestrator::Orchestrator;
use moodgate::handlers::AppState;
use moodgate::retrieval::keyword::KeywordRetriever;
use moodgate::retrieval::ContextRetriever;
use moodgate::router::IntentClassifier;
use moodgate::server::serve;
use moodgate::state::flat_file::FlatFileMoodLog;
use moodgate::state::memory::{MemoryConversationStore, MemoryMoodLog};
use moodgate::state::postgresql::PostgreSQLStateStorage;
use moodgate::state::{ConversationStore, MoodEventLog, StateGateway, StateStorageError};
use moodgate::utils::tracing::init_tracer;
use std::env;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

async fn connect_postgres(config: &StateStorageConfig) -> Result<Arc<PostgreSQLStateStorage>, StateStorageError> {
    let connection_string = config.connection_string.as_deref().ok_or_else(|| {
        StateStorageError::StorageError("connection_string is required for postgres".to_string())
    })?;
    Ok(Arc::new(PostgreSQLStateStorage::new(connection_string).await?))
}

async fn build_mood_log(config: Option<&StateStorageConfig>) -> Result<Arc<dyn MoodEventLog>, StateStorageError> {
    let Some(config) = config else {
        info!(storage_type = "memory", "no mood_log configured, using memory");
        return Ok(Arc::new(MemoryMoodLog::new()));
    };

    let log: Arc<dyn MoodEventLog> = match config.storage_type {
        StateStorageType::Memory => Arc::new(MemoryMoodLog::new()),
        StateStorageType::FlatFile => {
            let path = config.path.as_deref().ok_or_else(|| {
                StateStorageError::StorageError("path is required for flat_file".to_string())
            })?;
            Arc::new(FlatFileMoodLog::open(path).await?)
        }
        StateStorageType::Postgres => connect_postgres(config).await?,
    };
    info!(storage_type = %config.storage_type, "initialized mood log");
    Ok(log)
}

async fn build_conversation_store(
    config: Option<&StateStorageConfig>,
) -> Result<Arc<dyn ConversationStore>, StateStorageError> {
    let Some(config) = config else {
        info!(storage_type = "memory", "no conversation_store configured, using memory");
        return Ok(Arc::new(MemoryConversationStore::new()));
    };

    let store: Arc<dyn ConversationStore> = match config.storage_type {
        StateStorageType::Memory => Arc::new(MemoryConversationStore::new()),
        StateStorageType::Postgres => connect_postgres(config).await?,
        StateStorageType::FlatFile => {
            return Err(StateStorageError::StorageError(
                "conversation_store supports memory or postgres".to_string(),
            ))
        }
    };
    info!(storage_type = %config.storage_type, "initialized conversation store");
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    eprintln!("loading moodgate config from {}", config_path);
    let config = Configuration::load(&config_path)?;

    let _tracer_provider = init_tracer(config.tracing.as_ref());
    info!(path = %config_path, "loaded moodgate config");

    let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| config.bind_address());

    let router: Arc<dyn Generator> = Arc::new(HttpGenerator::new("router", &config.generators.router));
    let responder: Arc<dyn Generator> =
        Arc::new(HttpGenerator::new("responder", &config.generators.responder));
    let companion: Arc<dyn Generator> =
        Arc::new(HttpGenerator::new("companion", &config.generators.companion));
    let companion_ready = ReadinessGate::spawn_warm_up(companion.clone());

    let mood_log = build_mood_log(config.mood_log.as_ref()).await?;
    let conversations = build_conversation_store(config.conversation_store.as_ref()).await?;
    let gateway = Arc::new(StateGateway::new(conversations.clone(), mood_log.clone()));

    let documents = config
        .retrieval
        .as_ref()
        .map(|r| r.documents.clone())
        .unwrap_or_default();
    let retriever: Arc<dyn ContextRetriever> = Arc::new(KeywordRetriever::from_documents(&documents).await?);
    let top_k = config.retrieval_top_k();

    let analytics = Arc::new(MoodAnalytics::new(mood_log));
    let mood_handler = MoodHandler::new(companion, responder.clone(), gateway.clone())
        .with_readiness(companion_ready.clone(), config.readiness_wait())
        .with_emojis(config.mood_emojis.clone().unwrap_or_else(default_mood_emojis));

    let orchestrator = Orchestrator::new(
        IntentClassifier::new(router, config.intent_timeout()),
        gateway,
        config.handler_timeout(),
    )
    .with_handler(Arc::new(AnimalHandler::new(
        ContextAnswerer::new(responder.clone(), retriever.clone(), top_k),
        AnimalCatalog::new(config.animals.clone().unwrap_or_default()),
    )))
    .with_handler(Arc::new(FactualHandler::new(
        ContextAnswerer::new(responder, retriever, top_k),
        SourceCatalog::new(config.sources.clone().unwrap_or_default()),
    )))
    .with_handler(Arc::new(mood_handler))
    .with_handler(Arc::new(AnalyticsHandler::new(analytics.clone())))
    .with_handler(Arc::new(HelpHandler));

    let state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        analytics,
        conversations,
        companion_ready,
        max_message_length: config.max_message_length(),
    });

    let listener = TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "moodgate listening");

    serve(listener, state).await;
    Ok(())
}
