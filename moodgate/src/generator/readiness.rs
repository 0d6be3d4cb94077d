use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

use super::Generator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Loading,
    Ready,
    Failed(String),
}

/// Single-assignment readiness signal for a generator that warms up in the
/// background. Waiters never block past their own bound.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    rx: watch::Receiver<Readiness>,
}

impl ReadinessGate {
    /// A gate that is open from the start.
    pub fn ready() -> Self {
        let (_tx, rx) = watch::channel(Readiness::Ready);
        Self { rx }
    }

    /// Runs `generator.warm_up()` on a background task and resolves the gate
    /// when it finishes, successfully or not.
    pub fn spawn_warm_up(generator: Arc<dyn Generator>) -> Self {
        let (tx, rx) = watch::channel(Readiness::Loading);

        tokio::spawn(async move {
            let started = Instant::now();
            let state = match generator.warm_up().await {
                Ok(()) => {
                    info!(
                        generator = generator.name(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "generator ready"
                    );
                    Readiness::Ready
                }
                Err(err) => {
                    warn!(generator = generator.name(), error = %err, "generator warm-up failed");
                    Readiness::Failed(err.to_string())
                }
            };
            let _ = tx.send(state);
        });

        Self { rx }
    }

    pub fn state(&self) -> Readiness {
        self.rx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.rx.borrow(), Readiness::Ready)
    }

    /// Waits up to `limit` for warm-up to settle and returns the state seen.
    /// `Loading` means the bound expired; callers proceed anyway.
    pub async fn wait(&self, limit: Duration) -> Readiness {
        let mut rx = self.rx.clone();
        let state = match tokio::time::timeout(limit, rx.wait_for(|s| *s != Readiness::Loading)).await {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => Readiness::Failed("warm-up task ended without a result".to_string()),
            Err(_) => Readiness::Loading,
        };
        state
    }
}
