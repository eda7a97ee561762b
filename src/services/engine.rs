//! Clock-in verification engine
//!
//! Runs one kiosk's verification pipeline end to end: extract landmarks
//! from the capture frame, check the liveness evidence, fetch the enrolled
//! descriptor, score the match and drive the attendance ledger. Decision,
//! persist and commit happen inside a single critical section with no await
//! points, so concurrent requests for the same employee serialize and the
//! state read by the decision cannot move underneath the commit. The event
//! is appended to the log before the ledger advances; an append failure
//! leaves the state untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::domain::types::{CapturedSample, EnrolledIdentity, Frame};
use crate::domain::{
    AttendanceState, ClockEvent, ClockEventType, DetectedFace, EmployeeId, RejectReason,
    VerifyError, VerifyResult,
};
use crate::infra::{Config, Metrics};
use crate::io::{EnrollmentStore, EventLog, LandmarkExtractor, ShiftProvider};
use crate::services::liveness::LivenessSnapshot;
use crate::services::matcher;
use crate::services::sequencer::{minutes_late, Decision, Sequencer};

/// One kiosk's verification pipeline behind trait seams for the landmark
/// extractor, enrollment store and shift source.
pub struct VerificationEngine {
    extractor: Arc<dyn LandmarkExtractor>,
    store: Arc<dyn EnrollmentStore>,
    shifts: Arc<dyn ShiftProvider>,
    event_log: EventLog,
    sequencer: Mutex<Sequencer>,
    metrics: Arc<Metrics>,
    extract_timeout: Duration,
    extract_attempts: u32,
    fetch_timeout: Duration,
    fetch_attempts: u32,
    utc_offset_minutes: i32,
    location: Option<String>,
}

impl VerificationEngine {
    pub fn new(
        config: &Config,
        extractor: Arc<dyn LandmarkExtractor>,
        store: Arc<dyn EnrollmentStore>,
        shifts: Arc<dyn ShiftProvider>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            extractor,
            store,
            shifts,
            event_log: EventLog::new(config.event_log()),
            sequencer: Mutex::new(Sequencer::new(config)),
            metrics,
            extract_timeout: Duration::from_millis(config.extract_timeout_ms()),
            extract_attempts: config.extract_retries() + 1,
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms()),
            fetch_attempts: config.fetch_retries() + 1,
            utc_offset_minutes: config.utc_offset_minutes(),
            location: config.location().map(str::to_string),
        }
    }

    /// Run one clock request end to end and return the resulting event.
    ///
    /// Rejections the employee can act on (failed liveness, not enrolled,
    /// low confidence, wrong state) come back as `Ok` carrying a rejected
    /// event that has already been written to the log. `Err` means the
    /// attempt could not be evaluated at all (no usable subject in the
    /// capture frame, or an upstream that stayed broken through the retry
    /// budget); nothing is persisted for those.
    ///
    /// The event timestamp is the capture frame's timestamp, not the time
    /// this call completes.
    pub async fn request_clock_event(
        &self,
        employee_id: &EmployeeId,
        event_type: ClockEventType,
        frame: &Frame,
        liveness: LivenessSnapshot,
    ) -> VerifyResult<ClockEvent> {
        self.metrics.record_capture_attempt();

        let mut faces = self.extract_with_retry(frame).await?;
        let sample = match faces.len() {
            0 => {
                self.metrics.record_no_face();
                return Err(VerifyError::NoFaceDetected);
            }
            1 => CapturedSample {
                embedding: faces.swap_remove(0).embedding,
                captured_at: frame.captured_at,
            },
            count => {
                self.metrics.record_multiple_faces();
                return Err(VerifyError::MultipleFacesDetected { count });
            }
        };

        // The capture frame settles the single-subject requirement at the
        // capture moment; the session snapshot carries the blink and head
        // movement evidence accumulated before it.
        if !(liveness.blink_detected && liveness.movement_detected) {
            return self.persist_rejected(
                employee_id,
                event_type,
                sample.captured_at,
                0.0,
                RejectReason::LivenessFailed,
            );
        }

        let identity = match self.fetch_with_retry(employee_id).await? {
            Some(identity) => identity,
            None => {
                return self.persist_rejected(
                    employee_id,
                    event_type,
                    sample.captured_at,
                    0.0,
                    RejectReason::NotEnrolled,
                );
            }
        };

        let confidence = matcher::confidence(&sample.embedding, &identity.descriptor);
        self.metrics.record_match_attempt();

        let mut sequencer = self.sequencer.lock();
        let date = sequencer.day_key(sample.captured_at);
        match sequencer.evaluate(employee_id, event_type, confidence, sample.captured_at) {
            Decision::Rejected { state, reason } => {
                let event = ClockEvent::rejected(
                    employee_id.clone(),
                    event_type,
                    sample.captured_at,
                    confidence,
                    reason,
                );
                self.event_log.append(&event)?;
                self.metrics.record_rejected(reason);
                info!(
                    employee_id = %employee_id,
                    event_type = %event_type.as_str(),
                    state = %state.as_str(),
                    reason = %reason.as_str(),
                    confidence = %format!("{confidence:.3}"),
                    "clock_event_rejected"
                );
                Ok(event)
            }
            Decision::Accepted { previous, next } => {
                let mut event = ClockEvent::accepted(
                    employee_id.clone(),
                    event_type,
                    sample.captured_at,
                    confidence,
                );
                if event_type == ClockEventType::Arrival {
                    if let Some(window) = self.shifts.shift_window(employee_id, date) {
                        let late =
                            minutes_late(&window, sample.captured_at, self.utc_offset_minutes);
                        if late > 0 {
                            self.metrics.record_late_arrival(late as u64);
                        }
                        event = event.with_minutes_late(late);
                    }
                }
                if let Some(location) = &self.location {
                    event = event.with_location(location);
                }
                self.event_log.append(&event)?;
                sequencer.commit(employee_id.clone(), date, next);
                self.metrics.set_ledger_entries(sequencer.ledger_len() as u64);
                drop(sequencer);
                self.metrics.record_accepted();
                info!(
                    employee_id = %employee_id,
                    event_type = %event_type.as_str(),
                    from = %previous.as_str(),
                    to = %next.as_str(),
                    confidence = %format!("{confidence:.3}"),
                    "clock_event_accepted"
                );
                Ok(event)
            }
        }
    }

    /// Ledger state for one employee on one working day
    pub fn current_state(&self, employee_id: &EmployeeId, date: NaiveDate) -> AttendanceState {
        self.sequencer.lock().state_for(employee_id, date)
    }

    /// Working-day key for a timestamp at this kiosk's UTC offset
    pub fn day_key(&self, timestamp_ms: u64) -> NaiveDate {
        self.sequencer.lock().day_key(timestamp_ms)
    }

    /// Rebuild today's ledger from the event log. Called once at startup,
    /// before any clock request is served.
    pub fn restore_from_log(&self) -> std::io::Result<usize> {
        let mut sequencer = self.sequencer.lock();
        let today = sequencer.day_key(crate::domain::epoch_ms());
        let events = self.event_log.replay_day(today, self.utc_offset_minutes)?;
        let applied = sequencer.replay(&events);
        self.metrics.set_ledger_entries(sequencer.ledger_len() as u64);
        info!(date = %today, applied = %applied, "attendance_ledger_restored");
        Ok(applied)
    }

    fn persist_rejected(
        &self,
        employee_id: &EmployeeId,
        event_type: ClockEventType,
        timestamp_ms: u64,
        confidence: f32,
        reason: RejectReason,
    ) -> VerifyResult<ClockEvent> {
        let event = ClockEvent::rejected(
            employee_id.clone(),
            event_type,
            timestamp_ms,
            confidence,
            reason,
        );
        self.event_log.append(&event)?;
        self.metrics.record_rejected(reason);
        info!(
            employee_id = %employee_id,
            event_type = %event_type.as_str(),
            reason = %reason.as_str(),
            "clock_event_rejected"
        );
        Ok(event)
    }

    async fn extract_with_retry(&self, frame: &Frame) -> VerifyResult<Vec<DetectedFace>> {
        for attempt in 1..=self.extract_attempts {
            match timeout(self.extract_timeout, self.extractor.extract(frame)).await {
                Ok(Ok(faces)) => return Ok(faces),
                Ok(Err(e)) => return Err(VerifyError::Extractor(e)),
                Err(_) => {
                    self.metrics.record_extract_timeout();
                    warn!(
                        attempt = %attempt,
                        timeout_ms = %self.extract_timeout.as_millis(),
                        "landmark_extract_timeout"
                    );
                }
            }
        }
        Err(VerifyError::UpstreamTimeout {
            operation: "landmark_extractor",
            timeout_ms: self.extract_timeout.as_millis() as u64,
            attempts: self.extract_attempts,
        })
    }

    async fn fetch_with_retry(
        &self,
        employee_id: &EmployeeId,
    ) -> VerifyResult<Option<EnrolledIdentity>> {
        for attempt in 1..=self.fetch_attempts {
            let fetch_start = Instant::now();
            match timeout(self.fetch_timeout, self.store.fetch(employee_id)).await {
                Ok(Ok(identity)) => {
                    self.metrics
                        .record_store_fetch(fetch_start.elapsed().as_micros() as u64);
                    return Ok(identity);
                }
                Ok(Err(e)) => return Err(VerifyError::Store(e)),
                Err(_) => {
                    self.metrics.record_store_timeout();
                    warn!(
                        employee_id = %employee_id,
                        attempt = %attempt,
                        timeout_ms = %self.fetch_timeout.as_millis(),
                        "enrollment_fetch_timeout"
                    );
                    if attempt < self.fetch_attempts {
                        self.metrics.record_store_retry();
                    }
                }
            }
        }
        Err(VerifyError::UpstreamTimeout {
            operation: "enrollment_store",
            timeout_ms: self.fetch_timeout.as_millis() as u64,
            attempts: self.fetch_attempts,
        })
    }
}
