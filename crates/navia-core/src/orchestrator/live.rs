//! Live hazard monitoring: capture → describe → arbitrate, back to back.
//!
//! The delay between cycles starts when the previous cycle finishes, so a slow
//! inference call stretches the period instead of stacking requests. Every awaited
//! result is checked against the cancellation token before it is acted on.

use crate::alert::{AlertDecision, AlertPipeline};
use crate::collaborators::{CameraCapture, VisionInferenceClient};
use crate::config::LiveConfig;
use crate::error::NaviaError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How one capture/describe/arbitrate cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Decided(AlertDecision),
    CaptureFailed,
    /// Inference failed, timed out or hit its quota; no alert this cycle.
    InferenceFailed,
    Cancelled,
    /// No camera or vision client, or live monitoring already owns the camera.
    Unavailable,
}

/// The pieces one vision cycle needs.
#[derive(Clone)]
pub struct VisionCycle {
    pub camera: Arc<dyn CameraCapture>,
    pub vision: Arc<dyn VisionInferenceClient>,
    pub alerts: Arc<AlertPipeline>,
    pub config: LiveConfig,
}

impl VisionCycle {
    /// Run one cycle. `token` gates every continuation.
    pub async fn run(&self, token: &CancellationToken) -> CycleOutcome {
        let capture = tokio::select! {
            biased;
            _ = token.cancelled() => return CycleOutcome::Cancelled,
            r = tokio::time::timeout(self.config.capture_timeout(), self.camera.capture()) => r,
        };
        let frame = match capture {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                warn!(target: "navia::live", error = %e, "capture failed");
                return CycleOutcome::CaptureFailed;
            }
            Err(_) => {
                warn!(
                    target: "navia::live",
                    timeout_ms = self.config.capture_timeout_ms,
                    "capture timed out"
                );
                return CycleOutcome::CaptureFailed;
            }
        };

        let inference = tokio::select! {
            biased;
            _ = token.cancelled() => return CycleOutcome::Cancelled,
            r = tokio::time::timeout(
                self.config.inference_timeout(),
                self.vision.describe_scene(&frame),
            ) => r,
        };
        let guidance = match inference {
            Ok(Ok(text)) => text,
            Ok(Err(NaviaError::QuotaExceeded)) => {
                debug!(target: "navia::live", "inference quota exceeded, skipping cycle");
                return CycleOutcome::InferenceFailed;
            }
            Ok(Err(e)) => {
                warn!(target: "navia::live", error = %e, "scene description failed");
                return CycleOutcome::InferenceFailed;
            }
            Err(_) => {
                warn!(
                    target: "navia::live",
                    timeout_ms = self.config.inference_timeout_ms,
                    "scene description timed out"
                );
                return CycleOutcome::InferenceFailed;
            }
        };

        // a result that lands after stop must not speak
        if token.is_cancelled() {
            return CycleOutcome::Cancelled;
        }
        let now_ms = chrono::Utc::now().timestamp_millis();
        CycleOutcome::Decided(self.alerts.handle(&guidance, now_ms).await)
    }
}

/// Handle to a running live loop. Dropping it without `stop` leaves the task running
/// until its token is cancelled.
pub struct LiveMonitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl LiveMonitor {
    pub fn spawn(cycle: VisionCycle) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(cycle, token.clone()));
        Self { token, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }

    /// Cancel and wait for the loop to wind down.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(target: "navia::live", error = %e, "live loop ended abnormally");
        }
    }
}

async fn run_loop(cycle: VisionCycle, token: CancellationToken) {
    info!(
        target: "navia::live",
        interval_ms = cycle.config.interval_ms,
        "live monitoring started"
    );
    let mut cycles: u64 = 0;
    loop {
        let outcome = cycle.run(&token).await;
        cycles += 1;
        if outcome == CycleOutcome::Cancelled {
            break;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(cycle.config.interval()) => {}
        }
    }
    info!(target: "navia::live", cycles, "live monitoring stopped");
}
