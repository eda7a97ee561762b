//! Liveness session lifecycle and the camera poll task
//!
//! A kiosk runs at most one liveness session at a time. `activate`
//! spawns a poll task that wakes on the configured cadence, takes the
//! newest frame available, runs landmark extraction with a deadline,
//! and feeds the detections into a fresh `LivenessSession`; the latest
//! verdict is published through a watch channel. Deactivating cancels
//! the task, and re-activating starts over from a blank session - a
//! subject stepping away loses their partial challenge progress.

use crate::infra::{Config, Metrics};
use crate::io::extractor::LandmarkExtractor;
use crate::services::liveness::{LivenessSession, LivenessSnapshot};
use crate::domain::types::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

pub struct CameraController {
    extractor: Arc<dyn LandmarkExtractor>,
    config: Config,
    metrics: Arc<Metrics>,
    generation: AtomicU64,
    shutdown_rx: watch::Receiver<bool>,
}

/// Handle to one running liveness session
pub struct CameraSession {
    generation: u64,
    snapshot_rx: watch::Receiver<LivenessSnapshot>,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CameraSession {
    /// Latest published verdict
    pub fn snapshot(&self) -> LivenessSnapshot {
        *self.snapshot_rx.borrow()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel the poll task and wait for it to wind down
    pub async fn deactivate(self) {
        let _ = self.cancel_tx.send(true);
        let _ = self.handle.await;
    }
}

impl CameraController {
    pub fn new(
        config: &Config,
        extractor: Arc<dyn LandmarkExtractor>,
        metrics: Arc<Metrics>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            extractor,
            config: config.clone(),
            metrics,
            generation: AtomicU64::new(0),
            shutdown_rx,
        }
    }

    /// Start a new liveness session over the given frame stream.
    ///
    /// Any previous session must be deactivated first; each activation
    /// gets a fresh session and a new generation number.
    pub fn activate(&self, frame_rx: mpsc::Receiver<Frame>) -> CameraSession {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (snapshot_tx, snapshot_rx) = watch::channel(LivenessSnapshot::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        self.metrics.record_session_started();
        info!(generation = %generation, "liveness_session_started");

        let handle = tokio::spawn(run_poll_task(
            generation,
            LivenessSession::new(&self.config),
            self.extractor.clone(),
            self.metrics.clone(),
            Duration::from_millis(self.config.poll_interval_ms()),
            Duration::from_millis(self.config.extract_timeout_ms()),
            frame_rx,
            snapshot_tx,
            cancel_rx,
            self.shutdown_rx.clone(),
        ));

        CameraSession { generation, snapshot_rx, cancel_tx, handle }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_poll_task(
    generation: u64,
    mut session: LivenessSession,
    extractor: Arc<dyn LandmarkExtractor>,
    metrics: Arc<Metrics>,
    poll_interval: Duration,
    extract_timeout: Duration,
    mut frame_rx: mpsc::Receiver<Frame>,
    snapshot_tx: watch::Sender<LivenessSnapshot>,
    mut cancel_rx: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut poll_timer = interval(poll_interval);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = cancel_rx.changed() => {
                if *cancel_rx.borrow() {
                    break;
                }
            }
            _ = poll_timer.tick() => {}
        }

        // Only the newest frame matters; stale ones are skipped
        let mut latest = None;
        while let Ok(frame) = frame_rx.try_recv() {
            latest = Some(frame);
        }
        let Some(frame) = latest else {
            continue;
        };

        let extract_start = Instant::now();
        match tokio::time::timeout(extract_timeout, extractor.extract(&frame)).await {
            Ok(Ok(faces)) => {
                let latency_us = extract_start.elapsed().as_micros() as u64;
                metrics.record_frame_observed(latency_us);

                let before = session.snapshot();
                session.observe(&faces);
                let after = session.snapshot();

                if after.blink_detected && !before.blink_detected {
                    metrics.record_blink();
                    info!(generation = %generation, frame = %frame.seq, "blink_detected");
                }
                if after.movement_detected && !before.movement_detected {
                    metrics.record_movement();
                    info!(generation = %generation, frame = %frame.seq, "head_movement_detected");
                }

                let _ = snapshot_tx.send(after);
            }
            Ok(Err(e)) => {
                warn!(generation = %generation, frame = %frame.seq, error = %e, "landmark_extract_failed");
            }
            Err(_) => {
                metrics.record_extract_timeout();
                warn!(
                    generation = %generation,
                    frame = %frame.seq,
                    timeout_ms = %extract_timeout.as_millis(),
                    "landmark_extract_timeout"
                );
            }
        }
    }

    metrics.record_session_ended();
    info!(generation = %generation, "liveness_session_ended");
}
