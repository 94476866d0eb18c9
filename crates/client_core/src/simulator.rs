//! What-if scoring: debounced `POST /ai/simulate` as the user edits a profile.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::protocol::{LeadProfile, ShapContribution, SimulationResult};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{error::ClientResult, notice::Notifier, scope::ViewScope, SimulationBackend};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum Debounced<T> {
    Ready(T),
    /// A newer submission arrived during the quiet period or the request.
    Superseded,
    Cancelled,
}

/// Coalesces bursts of submissions: each submission takes a new generation and
/// only the latest one still standing after the quiet period gets to run.
#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    generation: AtomicU64,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            generation: AtomicU64::new(0),
        }
    }

    pub fn submit(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Waits out the quiet period; `true` if `generation` is still the latest.
    pub async fn settle(&self, generation: u64) -> bool {
        tokio::time::sleep(self.quiet).await;
        self.is_current(generation)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatorSnapshot {
    pub profile: LeadProfile,
    pub result: Option<SimulationResult>,
    pub loading: bool,
}

impl SimulatorSnapshot {
    pub fn top_factors(&self, n: usize) -> Vec<ShapContribution> {
        self.result
            .as_ref()
            .and_then(|result| result.explanation.as_ref())
            .map(|explanation| explanation.strongest(n).into_iter().cloned().collect())
            .unwrap_or_default()
    }
}

pub struct SimulatorController {
    backend: Arc<dyn SimulationBackend>,
    notifier: Notifier,
    scope: ViewScope,
    debouncer: Debouncer,
    state: Mutex<SimulatorSnapshot>,
}

impl SimulatorController {
    pub fn new(backend: Arc<dyn SimulationBackend>, notifier: Notifier) -> Arc<Self> {
        Self::with_quiet_period(backend, notifier, DEFAULT_QUIET_PERIOD)
    }

    pub fn with_quiet_period(
        backend: Arc<dyn SimulationBackend>,
        notifier: Notifier,
        quiet: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            notifier,
            scope: ViewScope::new(),
            debouncer: Debouncer::new(quiet),
            state: Mutex::new(SimulatorSnapshot::default()),
        })
    }

    /// Records the edited profile and scores it once input has been quiet.
    pub async fn update(&self, profile: LeadProfile) -> Debounced<ClientResult<SimulationResult>> {
        if self.scope.is_cancelled() {
            return Debounced::Cancelled;
        }
        let generation = {
            let mut state = self.state.lock().await;
            state.profile = profile.clone();
            state.loading = true;
            self.debouncer.submit()
        };

        if !self.debouncer.settle(generation).await {
            return Debounced::Superseded;
        }
        if self.scope.is_cancelled() {
            return Debounced::Cancelled;
        }

        debug!(generation, "simulator: scoring profile");
        let result = self.backend.simulate(&profile).await;

        if self.scope.is_cancelled() {
            return Debounced::Cancelled;
        }
        let mut state = self.state.lock().await;
        if !self.debouncer.is_current(generation) {
            debug!(generation, "simulator: discarding stale score");
            return Debounced::Superseded;
        }
        state.loading = false;
        match result {
            Ok(scored) => {
                info!(score = scored.score, label = %scored.label, "simulator: scored");
                state.result = Some(scored.clone());
                Debounced::Ready(Ok(scored))
            }
            Err(err) => {
                warn!(%err, "simulator: scoring failed");
                if !err.is_unauthorized() {
                    self.notifier.error(format!("Simulation failed: {err}"));
                }
                Debounced::Ready(Err(err))
            }
        }
    }

    pub async fn snapshot(&self) -> SimulatorSnapshot {
        self.state.lock().await.clone()
    }

    pub fn unmount(&self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
#[path = "tests/simulator_tests.rs"]
mod tests;
