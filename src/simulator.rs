// file: src/simulator.rs
// description: client-side state machine driving the server-side sensor simulator

use crate::{error::TelemetryError, store::StateStore};
use async_trait::async_trait;
use std::sync::{
    Arc, Mutex as StdMutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Storage key for the optimistic running flag. Best-effort cache of server
/// state; it is persisted on every transition and trusted on startup without
/// reconciliation (the backend exposes no simulator-status endpoint).
pub const SIMULATOR_STATE_KEY: &str = "simulator_running_state";

/// Period of the client-side anomaly re-injection timer.
pub const ANOMALY_INJECTION_PERIOD: Duration = Duration::from_secs(5);

/// The three REST transitions the controller coordinates. Split out as a
/// trait so the state machine is testable against a recording fake.
#[async_trait]
pub trait SimulatorApi: Send + Sync {
    async fn start_normal(&self) -> Result<(), TelemetryError>;
    async fn start_anomaly(&self, machine_id: &str) -> Result<(), TelemetryError>;
    async fn stop(&self) -> Result<(), TelemetryError>;
}

/// Coordinates the three mutually exclusive simulator transitions.
///
/// Each transition bumps a generation counter; a response only applies its
/// state change when no newer transition started while it was in flight, so a
/// slow `start` response cannot resurrect the running flag after a `stop`.
/// The anomaly timer handle is owned here and cancelled synchronously at the
/// start of any transition, before the REST call is awaited.
pub struct SimulatorController {
    api: Arc<dyn SimulatorApi>,
    store: Arc<StateStore>,
    running: AtomicBool,
    start_normal_loading: AtomicBool,
    start_anomaly_loading: AtomicBool,
    stop_loading: AtomicBool,
    anomaly_task: StdMutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    anomaly_period: Duration,
}

impl SimulatorController {
    pub fn new(api: Arc<dyn SimulatorApi>, store: Arc<StateStore>, anomaly_period: Duration) -> Self {
        let running = store
            .get(SIMULATOR_STATE_KEY)
            .map(|v| v == "true")
            .unwrap_or(false);

        Self {
            api,
            store,
            running: AtomicBool::new(running),
            start_normal_loading: AtomicBool::new(false),
            start_anomaly_loading: AtomicBool::new(false),
            stop_loading: AtomicBool::new(false),
            anomaly_task: StdMutex::new(None),
            generation: AtomicU64::new(0),
            anomaly_period,
        }
    }

    /// Optimistic running flag (last known, persisted across runs).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_start_normal_loading(&self) -> bool {
        self.start_normal_loading.load(Ordering::SeqCst)
    }

    pub fn is_start_anomaly_loading(&self) -> bool {
        self.start_anomaly_loading.load(Ordering::SeqCst)
    }

    pub fn is_stop_loading(&self) -> bool {
        self.stop_loading.load(Ordering::SeqCst)
    }

    pub async fn start_normal(&self) -> Result<(), TelemetryError> {
        let generation = self.begin_transition();
        self.start_normal_loading.store(true, Ordering::SeqCst);

        let result = self.api.start_normal().await;
        self.start_normal_loading.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                if self.is_current(generation) {
                    self.set_running(true);
                    info!("Simulator running in normal mode");
                } else {
                    debug!("Stale start-normal response discarded");
                }
                Ok(())
            }
            Err(e) => {
                // No retry; state stays as it was
                error!("Error starting normal simulator: {}", e);
                Err(e)
            }
        }
    }

    pub async fn start_anomaly(&self, machine_id: &str) -> Result<(), TelemetryError> {
        let generation = self.begin_transition();
        self.start_anomaly_loading.store(true, Ordering::SeqCst);

        let result = self.api.start_anomaly(machine_id).await;
        self.start_anomaly_loading.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                if !self.is_current(generation) {
                    debug!("Stale start-anomaly response discarded");
                    return Ok(());
                }
                self.set_running(true);
                self.arm_anomaly_timer(machine_id);
                info!(
                    "Simulator running in anomaly mode for {} (re-injecting every {:?})",
                    machine_id, self.anomaly_period
                );
                Ok(())
            }
            Err(e) => {
                error!("Error starting anomaly simulator: {}", e);
                Err(e)
            }
        }
    }

    pub async fn stop(&self) -> Result<(), TelemetryError> {
        let generation = self.begin_transition();
        self.stop_loading.store(true, Ordering::SeqCst);

        let result = self.api.stop().await;
        self.stop_loading.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                if self.is_current(generation) {
                    self.set_running(false);
                    info!("Simulator stopped");
                }
                Ok(())
            }
            Err(e) => {
                // The optimistic flag is intentionally left set; the server
                // may still be generating data.
                error!("Error stopping simulator: {}", e);
                Err(e)
            }
        }
    }

    /// Every transition starts here: invalidate in-flight responses and kill
    /// the anomaly timer before any REST call is awaited, so no tick can fire
    /// once the transition begins.
    fn begin_transition(&self) -> u64 {
        self.clear_anomaly_timer();
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn clear_anomaly_timer(&self) {
        let handle = self
            .anomaly_task
            .lock()
            .expect("anomaly task lock poisoned")
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Anomaly injection timer cancelled");
        }
    }

    fn arm_anomaly_timer(&self, machine_id: &str) {
        let api = Arc::clone(&self.api);
        let machine_id = machine_id.to_string();
        let period = self.anomaly_period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The initial injection already went out; skip the immediate tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!("Anomaly injection tick for machine {}", machine_id);
                if let Err(e) = api.start_anomaly(&machine_id).await {
                    // Best-effort continuous injection: keep ticking
                    error!("Anomaly injection tick failed: {}", e);
                }
            }
        });

        *self
            .anomaly_task
            .lock()
            .expect("anomaly task lock poisoned") = Some(handle);
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if let Err(e) = self.store.set(SIMULATOR_STATE_KEY, &running.to_string()) {
            warn!("Failed to persist simulator state: {}", e);
        }
    }
}

impl Drop for SimulatorController {
    fn drop(&mut self) {
        self.clear_anomaly_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingApi {
        calls: StdMutex<Vec<String>>,
        fail_stop: bool,
        fail_anomaly_ticks: bool,
        hold_start_normal: Option<Arc<Notify>>,
    }

    impl RecordingApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> usize {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len()
        }
    }

    #[async_trait]
    impl SimulatorApi for RecordingApi {
        async fn start_normal(&self) -> Result<(), TelemetryError> {
            if let Some(gate) = &self.hold_start_normal {
                gate.notified().await;
            }
            self.record("start_normal".to_string());
            Ok(())
        }

        async fn start_anomaly(&self, machine_id: &str) -> Result<(), TelemetryError> {
            let anomaly_calls = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(format!("anomaly:{machine_id}"));
                calls.iter().filter(|c| c.starts_with("anomaly:")).count()
            };
            if self.fail_anomaly_ticks && anomaly_calls > 1 {
                return Err(TelemetryError::ApiError {
                    status: 500,
                    message: "injector unavailable".to_string(),
                });
            }
            Ok(())
        }

        async fn stop(&self) -> Result<(), TelemetryError> {
            self.record("stop".to_string());
            if self.fail_stop {
                return Err(TelemetryError::ApiError {
                    status: 502,
                    message: "bad gateway".to_string(),
                });
            }
            Ok(())
        }
    }

    fn temp_store() -> Arc<StateStore> {
        let path = std::env::temp_dir().join(format!(
            "machine-console-simulator-test-{}.json",
            uuid::Uuid::new_v4()
        ));
        Arc::new(StateStore::load(path))
    }

    fn controller(api: Arc<RecordingApi>, period_ms: u64) -> SimulatorController {
        SimulatorController::new(api, temp_store(), Duration::from_millis(period_ms))
    }

    #[tokio::test]
    async fn stop_cancels_anomaly_timer_before_any_tick() {
        let api = Arc::new(RecordingApi::default());
        let controller = controller(Arc::clone(&api), 25);

        controller.start_anomaly("m1").await.unwrap();
        controller.stop().await.unwrap();

        // Long enough for several ticks to have fired had the timer survived
        sleep(Duration::from_millis(120)).await;
        assert_eq!(api.calls(), vec!["anomaly:m1", "stop"]);
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn anomaly_timer_repeats_and_survives_tick_failures() {
        let api = Arc::new(RecordingApi {
            fail_anomaly_ticks: true,
            ..Default::default()
        });
        let controller = controller(Arc::clone(&api), 20);

        controller.start_anomaly("m1").await.unwrap();
        sleep(Duration::from_millis(110)).await;

        let anomaly_calls = api
            .calls()
            .iter()
            .filter(|c| c.as_str() == "anomaly:m1")
            .count();
        // Initial call plus several ticks; failing ticks must not stop it
        assert!(anomaly_calls >= 3, "expected >=3 calls, got {anomaly_calls}");
        assert!(controller.is_running());
    }

    #[tokio::test]
    async fn start_normal_cancels_pending_anomaly_timer() {
        let api = Arc::new(RecordingApi::default());
        let controller = controller(Arc::clone(&api), 20);

        controller.start_anomaly("m1").await.unwrap();
        controller.start_normal().await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let calls = api.calls();
        let normal_at = calls
            .iter()
            .position(|c| c == "start_normal")
            .expect("start_normal call recorded");
        assert!(
            calls[normal_at..].iter().all(|c| !c.starts_with("anomaly:")),
            "anomaly call interleaved after start_normal: {calls:?}"
        );
    }

    #[tokio::test]
    async fn stop_failure_leaves_optimistic_flag_running() {
        let api = Arc::new(RecordingApi {
            fail_stop: true,
            ..Default::default()
        });
        let controller = controller(Arc::clone(&api), 20);

        controller.start_normal().await.unwrap();
        assert!(controller.is_running());

        let err = controller.stop().await.unwrap_err();
        assert!(matches!(err, TelemetryError::ApiError { status: 502, .. }));
        assert!(controller.is_running());
    }

    #[tokio::test]
    async fn stale_start_response_cannot_override_a_newer_stop() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(RecordingApi {
            hold_start_normal: Some(Arc::clone(&gate)),
            ..Default::default()
        });
        let controller = Arc::new(controller(Arc::clone(&api), 20));

        let slow_start = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.start_normal().await })
        };
        // Let the start call get in flight, then stop while it is stalled
        sleep(Duration::from_millis(20)).await;
        controller.stop().await.unwrap();
        assert!(!controller.is_running());

        gate.notify_one();
        slow_start.await.unwrap().unwrap();

        // The late start response resolved after the stop and must not apply
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn running_flag_is_persisted_across_controllers() {
        let api = Arc::new(RecordingApi::default());
        let store = temp_store();
        let first = SimulatorController::new(
            Arc::clone(&api) as Arc<dyn SimulatorApi>,
            Arc::clone(&store),
            Duration::from_millis(20),
        );
        first.start_normal().await.unwrap();
        drop(first);

        let second = SimulatorController::new(api, store, Duration::from_millis(20));
        assert!(second.is_running());
    }
}
