use common::consts::REQUEST_ID_HEADER;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use opentelemetry::trace::FutureExt;
use opentelemetry::{global, Context};
use opentelemetry_http::HeaderExtractor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::handlers::{route, AppState};

// Utility function to extract the context from the incoming request headers
fn extract_context_from_request(req: &Request<Incoming>) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(req.headers()))
    })
}

fn request_id(req: &Request<Incoming>) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Accepts connections forever, one task per connection. A failed accept is
/// logged and skipped.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "failed to accept connection");
                continue;
            }
        };
        let io = TokioIo::new(stream);

        let state = state.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let state = state.clone();
            let parent_cx = extract_context_from_request(&req);
            let span = info_span!(
                "request",
                request_id = %request_id(&req),
                method = %req.method(),
                path = %req.uri().path()
            );

            async move {
                route(req, state).instrument(span).with_context(parent_cx).await
            }
        });

        tokio::task::spawn(async move {
            debug!(peer = ?peer_addr, "accepted connection");
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(error = ?err, "error serving connection");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::MoodAnalytics;
    use crate::generator::scripted::ScriptedGenerator;
    use crate::generator::ReadinessGate;
    use crate::handlers::orchestrator::Orchestrator;
    use crate::router::IntentClassifier;
    use crate::state::memory::{MemoryConversationStore, MemoryMoodLog};
    use crate::state::StateGateway;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn state() -> Arc<AppState> {
        let conversations = Arc::new(MemoryConversationStore::new());
        let mood_log = Arc::new(MemoryMoodLog::new());
        let gateway = Arc::new(StateGateway::new(conversations.clone(), mood_log.clone()));
        let classifier = IntentClassifier::new(
            Arc::new(ScriptedGenerator::always("router", "HELP")),
            Duration::from_secs(1),
        );
        Arc::new(AppState {
            orchestrator: Arc::new(Orchestrator::new(classifier, gateway, Duration::from_secs(1))),
            analytics: Arc::new(MoodAnalytics::new(mood_log)),
            conversations,
            companion_ready: ReadinessGate::ready(),
            max_message_length: 100,
        })
    }

    async fn health_status_line(addr: std::net::SocketAddr) -> String {
        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket
            .write_all(b"GET /healthz HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        socket.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8(response).unwrap();
        response.lines().next().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_server_outlives_dropped_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state()));

        for _ in 0..3 {
            let socket = TcpStream::connect(addr).await.unwrap();
            drop(socket);
        }

        let status = tokio::time::timeout(Duration::from_secs(5), health_status_line(addr))
            .await
            .unwrap();
        assert_eq!(status, "HTTP/1.1 200 OK");
    }
}
