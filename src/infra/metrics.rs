//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::RejectReason;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total camera frames observed by liveness sessions (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Sum of extraction latencies in microseconds (reset on report)
    extract_latency_sum_us: AtomicU64,
    /// Max extraction latency in microseconds (reset on report)
    extract_latency_max_us: AtomicU64,
    /// Extraction latency histogram buckets (reset on report)
    extract_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Extraction calls that hit the deadline (monotonic)
    extract_timeouts_total: AtomicU64,
    /// Blinks detected across all sessions (monotonic)
    blinks_total: AtomicU64,
    /// Head movements detected across all sessions (monotonic)
    movements_total: AtomicU64,
    /// Liveness sessions started (monotonic)
    liveness_sessions_total: AtomicU64,
    /// Whether a liveness session is currently running (0 or 1)
    session_active: AtomicU64,
    /// Clock-in capture attempts (monotonic)
    capture_attempts_total: AtomicU64,
    /// Captures with no face in frame (monotonic)
    no_face_total: AtomicU64,
    /// Captures with more than one face in frame (monotonic)
    multiple_faces_total: AtomicU64,
    /// Sum of enrollment store fetch latencies (reset on report)
    store_latency_sum_us: AtomicU64,
    /// Max enrollment store fetch latency (reset on report)
    store_latency_max_us: AtomicU64,
    /// Enrollment store fetch latency histogram buckets (reset on report)
    store_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Store calls that hit the deadline (monotonic)
    store_timeouts_total: AtomicU64,
    /// Store calls retried after a timeout (monotonic)
    store_retries_total: AtomicU64,
    /// Descriptor comparisons performed (monotonic)
    match_attempts_total: AtomicU64,
    /// Clock events accepted (monotonic)
    events_accepted_total: AtomicU64,
    /// Clock events rejected, any reason (monotonic)
    events_rejected_total: AtomicU64,
    /// Rejections broken down by reason (monotonic)
    rejected_liveness_failed: AtomicU64,
    rejected_not_enrolled: AtomicU64,
    rejected_low_confidence: AtomicU64,
    rejected_invalid_transition: AtomicU64,
    /// Accepted arrivals that were late (monotonic)
    late_arrivals_total: AtomicU64,
    /// Total late minutes across accepted arrivals (monotonic)
    minutes_late_sum: AtomicU64,
    /// Enrollments performed (monotonic)
    enrollments_total: AtomicU64,
    /// Revocations performed (monotonic)
    revocations_total: AtomicU64,
    /// Current in-memory attendance ledger size (gauge)
    ledger_entries: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            extract_latency_sum_us: AtomicU64::new(0),
            extract_latency_max_us: AtomicU64::new(0),
            extract_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            extract_timeouts_total: AtomicU64::new(0),
            blinks_total: AtomicU64::new(0),
            movements_total: AtomicU64::new(0),
            liveness_sessions_total: AtomicU64::new(0),
            session_active: AtomicU64::new(0),
            capture_attempts_total: AtomicU64::new(0),
            no_face_total: AtomicU64::new(0),
            multiple_faces_total: AtomicU64::new(0),
            store_latency_sum_us: AtomicU64::new(0),
            store_latency_max_us: AtomicU64::new(0),
            store_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            store_timeouts_total: AtomicU64::new(0),
            store_retries_total: AtomicU64::new(0),
            match_attempts_total: AtomicU64::new(0),
            events_accepted_total: AtomicU64::new(0),
            events_rejected_total: AtomicU64::new(0),
            rejected_liveness_failed: AtomicU64::new(0),
            rejected_not_enrolled: AtomicU64::new(0),
            rejected_low_confidence: AtomicU64::new(0),
            rejected_invalid_transition: AtomicU64::new(0),
            late_arrivals_total: AtomicU64::new(0),
            minutes_late_sum: AtomicU64::new(0),
            enrollments_total: AtomicU64::new(0),
            revocations_total: AtomicU64::new(0),
            ledger_entries: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one observed frame with its extraction latency (lock-free)
    #[inline]
    pub fn record_frame_observed(&self, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.extract_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.extract_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.extract_latency_max_us, latency_us);
    }

    /// Record an extraction call that hit its deadline (lock-free)
    #[inline]
    pub fn record_extract_timeout(&self) {
        self.extract_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a detected blink (lock-free)
    #[inline]
    pub fn record_blink(&self) {
        self.blinks_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a detected head movement (lock-free)
    #[inline]
    pub fn record_movement(&self) {
        self.movements_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a liveness session start and flip the active gauge
    #[inline]
    pub fn record_session_started(&self) {
        self.liveness_sessions_total.fetch_add(1, Ordering::Relaxed);
        self.session_active.store(1, Ordering::Relaxed);
    }

    /// Flip the active gauge off when a session ends
    #[inline]
    pub fn record_session_ended(&self) {
        self.session_active.store(0, Ordering::Relaxed);
    }

    /// Record a clock-in capture attempt (lock-free)
    #[inline]
    pub fn record_capture_attempt(&self) {
        self.capture_attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a capture that found no face (lock-free)
    #[inline]
    pub fn record_no_face(&self) {
        self.no_face_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a capture that found more than one face (lock-free)
    #[inline]
    pub fn record_multiple_faces(&self) {
        self.multiple_faces_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an enrollment store fetch with its latency (lock-free)
    #[inline]
    pub fn record_store_fetch(&self, latency_us: u64) {
        self.store_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.store_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.store_latency_max_us, latency_us);
    }

    /// Record a store call that hit its deadline (lock-free)
    #[inline]
    pub fn record_store_timeout(&self) {
        self.store_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a store call retried after a timeout (lock-free)
    #[inline]
    pub fn record_store_retry(&self) {
        self.store_retries_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a descriptor comparison (lock-free)
    #[inline]
    pub fn record_match_attempt(&self) {
        self.match_attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted clock event (lock-free)
    #[inline]
    pub fn record_accepted(&self) {
        self.events_accepted_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected clock event with its reason (lock-free)
    #[inline]
    pub fn record_rejected(&self, reason: RejectReason) {
        self.events_rejected_total.fetch_add(1, Ordering::Relaxed);
        let counter = match reason {
            RejectReason::LivenessFailed => &self.rejected_liveness_failed,
            RejectReason::NotEnrolled => &self.rejected_not_enrolled,
            RejectReason::LowConfidence => &self.rejected_low_confidence,
            RejectReason::InvalidTransition => &self.rejected_invalid_transition,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a late arrival and its minutes late (lock-free)
    #[inline]
    pub fn record_late_arrival(&self, minutes_late: u64) {
        self.late_arrivals_total.fetch_add(1, Ordering::Relaxed);
        self.minutes_late_sum.fetch_add(minutes_late, Ordering::Relaxed);
    }

    /// Record an enrollment (lock-free)
    #[inline]
    pub fn record_enrollment(&self) {
        self.enrollments_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a revocation (lock-free)
    #[inline]
    pub fn record_revocation(&self) {
        self.revocations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the current attendance ledger size (called after commits and sweeps)
    #[inline]
    pub fn set_ledger_entries(&self, entries: u64) {
        self.ledger_entries.store(entries, Ordering::Relaxed);
    }

    /// Get total frames observed
    #[inline]
    #[allow(dead_code)]
    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    /// Get total accepted clock events
    #[inline]
    #[allow(dead_code)]
    pub fn events_accepted_total(&self) -> u64 {
        self.events_accepted_total.load(Ordering::Relaxed)
    }

    /// Get total rejected clock events
    #[inline]
    #[allow(dead_code)]
    pub fn events_rejected_total(&self) -> u64 {
        self.events_rejected_total.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        // Swap periodic counters to zero and get their values
        let frames_count = self.frames_since_report.swap(0, Ordering::Relaxed);
        let extract_sum = self.extract_latency_sum_us.swap(0, Ordering::Relaxed);
        let extract_max = self.extract_latency_max_us.swap(0, Ordering::Relaxed);
        let extract_buckets = swap_buckets(&self.extract_latency_buckets);

        let store_sum = self.store_latency_sum_us.swap(0, Ordering::Relaxed);
        let store_max = self.store_latency_max_us.swap(0, Ordering::Relaxed);
        let store_buckets = swap_buckets(&self.store_latency_buckets);

        // Calculate elapsed time and reset
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let extract_avg = if frames_count > 0 { extract_sum / frames_count } else { 0 };
        let extract_p50 = percentile_from_buckets(&extract_buckets, 0.50);
        let extract_p95 = percentile_from_buckets(&extract_buckets, 0.95);
        let extract_p99 = percentile_from_buckets(&extract_buckets, 0.99);

        let store_count: u64 = store_buckets.iter().sum();
        let store_avg = if store_count > 0 { store_sum / store_count } else { 0 };
        let store_p99 = percentile_from_buckets(&store_buckets, 0.99);

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_per_sec,
            extract_avg_us: extract_avg,
            extract_max_us: extract_max,
            extract_buckets,
            extract_p50_us: extract_p50,
            extract_p95_us: extract_p95,
            extract_p99_us: extract_p99,
            extract_timeouts_total: self.extract_timeouts_total.load(Ordering::Relaxed),
            blinks_total: self.blinks_total.load(Ordering::Relaxed),
            movements_total: self.movements_total.load(Ordering::Relaxed),
            liveness_sessions_total: self.liveness_sessions_total.load(Ordering::Relaxed),
            session_active: self.session_active.load(Ordering::Relaxed),
            capture_attempts_total: self.capture_attempts_total.load(Ordering::Relaxed),
            no_face_total: self.no_face_total.load(Ordering::Relaxed),
            multiple_faces_total: self.multiple_faces_total.load(Ordering::Relaxed),
            store_buckets,
            store_avg_us: store_avg,
            store_max_us: store_max,
            store_p99_us: store_p99,
            store_timeouts_total: self.store_timeouts_total.load(Ordering::Relaxed),
            store_retries_total: self.store_retries_total.load(Ordering::Relaxed),
            match_attempts_total: self.match_attempts_total.load(Ordering::Relaxed),
            events_accepted_total: self.events_accepted_total.load(Ordering::Relaxed),
            events_rejected_total: self.events_rejected_total.load(Ordering::Relaxed),
            rejected_liveness_failed: self.rejected_liveness_failed.load(Ordering::Relaxed),
            rejected_not_enrolled: self.rejected_not_enrolled.load(Ordering::Relaxed),
            rejected_low_confidence: self.rejected_low_confidence.load(Ordering::Relaxed),
            rejected_invalid_transition: self.rejected_invalid_transition.load(Ordering::Relaxed),
            late_arrivals_total: self.late_arrivals_total.load(Ordering::Relaxed),
            minutes_late_sum: self.minutes_late_sum.load(Ordering::Relaxed),
            enrollments_total: self.enrollments_total.load(Ordering::Relaxed),
            revocations_total: self.revocations_total.load(Ordering::Relaxed),
            ledger_entries: self.ledger_entries.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for the metrics endpoint)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
#[allow(dead_code)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_per_sec: f64,
    /// Average landmark extraction latency (µs)
    pub extract_avg_us: u64,
    /// Max landmark extraction latency (µs)
    pub extract_max_us: u64,
    /// Extraction latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub extract_buckets: [u64; NUM_BUCKETS],
    pub extract_p50_us: u64,
    pub extract_p95_us: u64,
    pub extract_p99_us: u64,
    pub extract_timeouts_total: u64,
    pub blinks_total: u64,
    pub movements_total: u64,
    pub liveness_sessions_total: u64,
    /// 1 while a liveness session is running, else 0
    pub session_active: u64,
    pub capture_attempts_total: u64,
    pub no_face_total: u64,
    pub multiple_faces_total: u64,
    /// Enrollment store fetch latency histogram buckets (same bounds)
    pub store_buckets: [u64; NUM_BUCKETS],
    pub store_avg_us: u64,
    pub store_max_us: u64,
    pub store_p99_us: u64,
    pub store_timeouts_total: u64,
    pub store_retries_total: u64,
    pub match_attempts_total: u64,
    pub events_accepted_total: u64,
    pub events_rejected_total: u64,
    pub rejected_liveness_failed: u64,
    pub rejected_not_enrolled: u64,
    pub rejected_low_confidence: u64,
    pub rejected_invalid_transition: u64,
    pub late_arrivals_total: u64,
    pub minutes_late_sum: u64,
    pub enrollments_total: u64,
    pub revocations_total: u64,
    /// Current attendance ledger size (snapshot)
    pub ledger_entries: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_total = %self.frames_total,
            frames_per_sec = format!("{:.1}", self.frames_per_sec),
            extract_avg_us = %self.extract_avg_us,
            extract_p99_us = %self.extract_p99_us,
            extract_timeouts = %self.extract_timeouts_total,
            captures = %self.capture_attempts_total,
            accepted = %self.events_accepted_total,
            rejected = %self.events_rejected_total,
            store_p99_us = %self.store_p99_us,
            ledger_entries = %self.ledger_entries,
            "metrics"
        );
    }
}
