use super::*;

use async_trait::async_trait;
use shared::{
    domain::PredictionLabel,
    protocol::Explanation,
};
use tokio::time::{sleep, Instant};

use crate::{error::ClientError, notice::NoticeKind};

/// Scores a profile as `age / 100` after `latency`.
struct FakeScorer {
    latency: Duration,
    calls: Mutex<Vec<u32>>,
    fail: bool,
}

impl FakeScorer {
    fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            calls: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            latency: Duration::from_millis(10),
            calls: Mutex::new(Vec::new()),
            fail: true,
        })
    }
}

#[async_trait]
impl SimulationBackend for FakeScorer {
    async fn simulate(&self, profile: &LeadProfile) -> ClientResult<SimulationResult> {
        self.calls.lock().await.push(profile.age);
        sleep(self.latency).await;
        if self.fail {
            return Err(ClientError::rejected(500, r#"{"detail":"model not loaded"}"#));
        }
        Ok(SimulationResult {
            score: f64::from(profile.age) / 100.0,
            label: PredictionLabel::Medium,
            explanation: Some(Explanation {
                shap_values: vec![
                    ShapContribution {
                        feature: "age".into(),
                        impact: 0.05,
                    },
                    ShapContribution {
                        feature: "euribor3m".into(),
                        impact: -0.3,
                    },
                ],
                recommendation: None,
            }),
        })
    }
}

fn aged(age: u32) -> LeadProfile {
    LeadProfile {
        age,
        ..LeadProfile::default()
    }
}

fn controller(backend: &Arc<FakeScorer>) -> (Arc<SimulatorController>, Notifier) {
    let notifier = Notifier::new();
    let backend: Arc<dyn SimulationBackend> = backend.clone();
    (
        SimulatorController::new(backend, notifier.clone()),
        notifier,
    )
}

#[tokio::test(start_paused = true)]
async fn debouncer_settles_only_the_last_of_a_burst() {
    let debouncer = Arc::new(Debouncer::default());

    let mut handles = Vec::new();
    for _ in 0..3 {
        let debouncer = debouncer.clone();
        handles.push(tokio::spawn(async move {
            let generation = debouncer.submit();
            debouncer.settle(generation).await
        }));
        sleep(Duration::from_millis(100)).await;
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("join"));
    }
    assert_eq!(outcomes, vec![false, false, true]);
}

#[tokio::test(start_paused = true)]
async fn quiet_period_elapses_before_the_request() {
    let backend = FakeScorer::new(Duration::from_millis(10));
    let notifier = Notifier::new();
    let scorer: Arc<dyn SimulationBackend> = backend.clone();
    let controller =
        SimulatorController::with_quiet_period(scorer, notifier, Duration::from_millis(500));

    let started = Instant::now();
    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.update(aged(30)).await }
    });

    sleep(Duration::from_millis(499)).await;
    assert!(backend.calls.lock().await.is_empty());
    assert!(controller.snapshot().await.loading);

    assert!(matches!(pending.await.expect("join"), Debounced::Ready(Ok(_))));
    assert_eq!(*backend.calls.lock().await, vec![30]);
    assert!(Instant::now() - started >= Duration::from_millis(510));
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_issues_one_request_for_latest_profile() {
    let backend = FakeScorer::new(Duration::from_millis(50));
    let (controller, _) = controller(&backend);

    let mut handles = Vec::new();
    for age in [31, 32, 33] {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move { controller.update(aged(age)).await }));
        sleep(Duration::from_millis(120)).await;
    }
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("join"));
    }

    assert!(matches!(outcomes[0], Debounced::Superseded));
    assert!(matches!(outcomes[1], Debounced::Superseded));
    assert!(matches!(outcomes[2], Debounced::Ready(Ok(_))));
    assert_eq!(*backend.calls.lock().await, vec![33]);

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.profile.age, 33);
    assert_eq!(snapshot.result.as_ref().map(|r| r.score), Some(0.33));
    assert!(!snapshot.loading);
}

#[tokio::test(start_paused = true)]
async fn slow_stale_score_is_discarded() {
    let backend = FakeScorer::new(Duration::from_millis(1_000));
    let (controller, _) = controller(&backend);

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.update(aged(40)).await }
    });
    // Past the first quiet period, while its request is still running.
    sleep(Duration::from_millis(700)).await;
    assert!(controller.snapshot().await.loading);
    let second = tokio::spawn({
        let controller = controller.clone();
        async move { controller.update(aged(55)).await }
    });

    assert!(matches!(first.await.expect("join"), Debounced::Superseded));
    let snapshot = controller.snapshot().await;
    assert!(snapshot.result.is_none());
    assert!(snapshot.loading);

    assert!(matches!(second.await.expect("join"), Debounced::Ready(Ok(_))));
    assert_eq!(*backend.calls.lock().await, vec![40, 55]);
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.result.as_ref().map(|r| r.score), Some(0.55));
    assert!(!snapshot.loading);
}

#[tokio::test(start_paused = true)]
async fn top_factors_rank_by_absolute_impact() {
    let backend = FakeScorer::new(Duration::from_millis(10));
    let (controller, _) = controller(&backend);
    controller.update(aged(30)).await;

    let factors = controller.snapshot().await.top_factors(1);
    assert_eq!(factors.len(), 1);
    assert_eq!(factors[0].feature, "euribor3m");
}

#[tokio::test(start_paused = true)]
async fn failure_clears_loading_and_keeps_previous_result() {
    let backend = FakeScorer::failing();
    let (controller, notifier) = controller(&backend);
    let mut notices = notifier.subscribe();

    let outcome = controller.update(aged(45)).await;
    assert!(matches!(outcome, Debounced::Ready(Err(_))));

    let snapshot = controller.snapshot().await;
    assert!(!snapshot.loading);
    assert!(snapshot.result.is_none());
    let notice = notices.try_recv().expect("error notice");
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.message, "Simulation failed: model not loaded");
}

#[tokio::test(start_paused = true)]
async fn unmounted_simulator_does_not_score() {
    let backend = FakeScorer::new(Duration::from_millis(10));
    let (controller, _) = controller(&backend);
    controller.unmount();

    assert!(matches!(controller.update(aged(30)).await, Debounced::Cancelled));
    assert!(backend.calls.lock().await.is_empty());
}
