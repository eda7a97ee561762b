//! Attendance day sequencing
//!
//! Tracks each employee's position in the working day:
//!
//! ```text
//! NotStarted --arrival--> Working --break_start--> OnBreak
//!     Working <--break_end-- OnBreak
//!     Working --departure--> Finished
//! ```
//!
//! Every transition is additionally guarded by match confidence, and
//! anything off the table is rejected without touching state - a second
//! arrival, a break before arriving, anything after departure. Days are
//! keyed by employee and local calendar date, so just after midnight
//! everyone is back at `NotStarted` and yesterday's ledger entries can
//! age out.

use crate::domain::event::{local_date, local_datetime};
use crate::domain::types::{AttendanceState, ClockEventType, EmployeeId, ShiftWindow};
use crate::domain::{ClockEvent, RejectReason};
use crate::infra::Config;
use chrono::{Duration, NaiveDate};
use rustc_hash::FxHashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Minimum spacing between retention sweeps
const SWEEP_INTERVAL_SECS: u64 = 3600;

/// The day transition table. Returns the next state for a legal
/// request, None for everything else.
pub fn apply_event(state: AttendanceState, event: ClockEventType) -> Option<AttendanceState> {
    match (state, event) {
        (AttendanceState::NotStarted, ClockEventType::Arrival) => Some(AttendanceState::Working),
        (AttendanceState::Working, ClockEventType::BreakStart) => Some(AttendanceState::OnBreak),
        (AttendanceState::OnBreak, ClockEventType::BreakEnd) => Some(AttendanceState::Working),
        (AttendanceState::Working, ClockEventType::Departure) => Some(AttendanceState::Finished),
        _ => None,
    }
}

/// Verdict for one clock request against the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accepted { previous: AttendanceState, next: AttendanceState },
    Rejected { state: AttendanceState, reason: RejectReason },
}

/// Per-employee, per-day attendance ledger
pub struct Sequencer {
    days: FxHashMap<(EmployeeId, NaiveDate), AttendanceState>,
    accept_threshold: f32,
    utc_offset_minutes: i32,
    retention_days: u32,
    last_sweep: Instant,
}

impl Sequencer {
    pub fn new(config: &Config) -> Self {
        Self {
            days: FxHashMap::default(),
            accept_threshold: config.accept_threshold(),
            utc_offset_minutes: config.utc_offset_minutes(),
            retention_days: config.retention_days(),
            last_sweep: Instant::now(),
        }
    }

    /// The working day a timestamp belongs to at this kiosk
    pub fn day_key(&self, timestamp_ms: u64) -> NaiveDate {
        local_date(timestamp_ms, self.utc_offset_minutes)
    }

    /// Current state for an employee on a given day
    pub fn state_for(&self, employee_id: &EmployeeId, date: NaiveDate) -> AttendanceState {
        self.days.get(&(employee_id.clone(), date)).copied().unwrap_or(AttendanceState::NotStarted)
    }

    /// Judge a clock request without changing anything.
    ///
    /// Off-table requests are invalid regardless of confidence; on-table
    /// requests still need confidence at or above the accept threshold.
    pub fn evaluate(
        &self,
        employee_id: &EmployeeId,
        event_type: ClockEventType,
        confidence: f32,
        timestamp_ms: u64,
    ) -> Decision {
        let date = self.day_key(timestamp_ms);
        let state = self.state_for(employee_id, date);

        match apply_event(state, event_type) {
            None => Decision::Rejected { state, reason: RejectReason::InvalidTransition },
            Some(next) => {
                if confidence < self.accept_threshold {
                    Decision::Rejected { state, reason: RejectReason::LowConfidence }
                } else {
                    Decision::Accepted { previous: state, next }
                }
            }
        }
    }

    /// Advance the ledger after the event has been persisted
    pub fn commit(&mut self, employee_id: EmployeeId, date: NaiveDate, next: AttendanceState) {
        self.days.insert((employee_id, date), next);
        self.maybe_sweep(date);
    }

    /// Rebuild ledger state from previously accepted events (startup
    /// replay). Events that no longer form a legal sequence are skipped
    /// with a warning. Returns the number applied.
    pub fn replay(&mut self, events: &[ClockEvent]) -> usize {
        let mut applied = 0;
        for event in events {
            let date = self.day_key(event.timestamp);
            let state = self.state_for(&event.employee_id, date);
            match apply_event(state, event.event_type) {
                Some(next) => {
                    self.days.insert((event.employee_id.clone(), date), next);
                    applied += 1;
                }
                None => {
                    warn!(
                        employee_id = %event.employee_id,
                        event_type = %event.event_type.as_str(),
                        state = %state.as_str(),
                        "replay_skipped_illegal_transition"
                    );
                }
            }
        }
        applied
    }

    pub fn ledger_len(&self) -> usize {
        self.days.len()
    }

    /// Drop ledger entries older than the retention window
    pub fn sweep(&mut self, today: NaiveDate) {
        let cutoff = today - Duration::days(self.retention_days as i64);
        let before = self.days.len();
        self.days.retain(|(_, date), _| *date >= cutoff);
        if self.days.len() < before {
            debug!(removed = %(before - self.days.len()), "ledger_swept");
        }
        self.last_sweep = Instant::now();
    }

    fn maybe_sweep(&mut self, today: NaiveDate) {
        if self.last_sweep.elapsed().as_secs() >= SWEEP_INTERVAL_SECS {
            self.sweep(today);
        }
    }
}

/// Minutes past the shift's tolerated entry window, floored at zero.
/// Annotation only: lateness never blocks an arrival.
pub fn minutes_late(window: &ShiftWindow, timestamp_ms: u64, utc_offset_minutes: i32) -> i64 {
    let local = local_datetime(timestamp_ms, utc_offset_minutes);
    let deadline = local.date_naive().and_time(window.expected_entry)
        + Duration::minutes(window.tolerance_minutes);
    (local.naive_local() - deadline).num_minutes().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Utc};

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> u64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp_millis() as u64
    }

    fn emp(id: &str) -> EmployeeId {
        EmployeeId::new(id)
    }

    fn sequencer() -> Sequencer {
        Sequencer::new(&Config::default())
    }

    #[test]
    fn test_transition_table() {
        use AttendanceState::*;
        use ClockEventType::*;

        assert_eq!(apply_event(NotStarted, Arrival), Some(Working));
        assert_eq!(apply_event(Working, BreakStart), Some(OnBreak));
        assert_eq!(apply_event(OnBreak, BreakEnd), Some(Working));
        assert_eq!(apply_event(Working, Departure), Some(Finished));
    }

    #[test]
    fn test_everything_off_the_table_is_none() {
        let legal = [
            (AttendanceState::NotStarted, ClockEventType::Arrival),
            (AttendanceState::Working, ClockEventType::BreakStart),
            (AttendanceState::OnBreak, ClockEventType::BreakEnd),
            (AttendanceState::Working, ClockEventType::Departure),
        ];
        for state in AttendanceState::ALL {
            for event in ClockEventType::ALL {
                if legal.contains(&(state, event)) {
                    assert!(apply_event(state, event).is_some());
                } else {
                    assert_eq!(apply_event(state, event), None, "{state:?} + {event:?}");
                }
            }
        }
    }

    #[test]
    fn test_accept_and_commit_full_day() {
        let mut seq = sequencer();
        let employee = emp("emp-001");
        let day = [
            (ClockEventType::Arrival, ts(2024, 3, 4, 9, 0)),
            (ClockEventType::BreakStart, ts(2024, 3, 4, 12, 0)),
            (ClockEventType::BreakEnd, ts(2024, 3, 4, 12, 30)),
            (ClockEventType::Departure, ts(2024, 3, 4, 17, 0)),
        ];

        for (event_type, when) in day {
            let decision = seq.evaluate(&employee, event_type, 0.95, when);
            let Decision::Accepted { next, .. } = decision else {
                panic!("expected acceptance for {event_type:?}");
            };
            seq.commit(employee.clone(), seq.day_key(when), next);
        }

        let date = seq.day_key(ts(2024, 3, 4, 17, 0));
        assert_eq!(seq.state_for(&employee, date), AttendanceState::Finished);
    }

    #[test]
    fn test_duplicate_arrival_rejected_without_state_change() {
        let mut seq = sequencer();
        let employee = emp("emp-001");
        let when = ts(2024, 3, 4, 9, 0);
        let date = seq.day_key(when);

        seq.commit(employee.clone(), date, AttendanceState::Working);

        let decision = seq.evaluate(&employee, ClockEventType::Arrival, 0.95, ts(2024, 3, 4, 9, 5));
        assert_eq!(
            decision,
            Decision::Rejected {
                state: AttendanceState::Working,
                reason: RejectReason::InvalidTransition
            }
        );
        assert_eq!(seq.state_for(&employee, date), AttendanceState::Working);
    }

    #[test]
    fn test_arrival_while_on_break_rejected() {
        let mut seq = sequencer();
        let employee = emp("emp-001");
        let date = seq.day_key(ts(2024, 3, 4, 12, 0));
        seq.commit(employee.clone(), date, AttendanceState::OnBreak);

        let decision = seq.evaluate(&employee, ClockEventType::Arrival, 0.99, ts(2024, 3, 4, 12, 5));
        assert!(matches!(
            decision,
            Decision::Rejected { reason: RejectReason::InvalidTransition, .. }
        ));
    }

    #[test]
    fn test_low_confidence_rejected_on_valid_transition() {
        let mut seq = sequencer();
        let employee = emp("emp-001");
        let date = seq.day_key(ts(2024, 3, 4, 12, 0));
        seq.commit(employee.clone(), date, AttendanceState::Working);

        let decision =
            seq.evaluate(&employee, ClockEventType::BreakStart, 0.40, ts(2024, 3, 4, 12, 5));
        assert_eq!(
            decision,
            Decision::Rejected {
                state: AttendanceState::Working,
                reason: RejectReason::LowConfidence
            }
        );
        assert_eq!(seq.state_for(&employee, date), AttendanceState::Working);
    }

    #[test]
    fn test_confidence_exactly_at_threshold_accepted() {
        let config = Config::default().with_accept_threshold(0.5);
        let seq = Sequencer::new(&config);
        let decision =
            seq.evaluate(&emp("emp-001"), ClockEventType::Arrival, 0.5, ts(2024, 3, 4, 9, 0));
        assert!(matches!(decision, Decision::Accepted { .. }));
    }

    #[test]
    fn test_repeated_break_cycles_allowed() {
        let mut seq = sequencer();
        let employee = emp("emp-001");
        let date = seq.day_key(ts(2024, 3, 4, 9, 0));
        seq.commit(employee.clone(), date, AttendanceState::Working);

        for hour in [10, 14] {
            let start = seq.evaluate(
                &employee,
                ClockEventType::BreakStart,
                0.9,
                ts(2024, 3, 4, hour, 0),
            );
            assert!(matches!(start, Decision::Accepted { .. }));
            seq.commit(employee.clone(), date, AttendanceState::OnBreak);

            let end = seq.evaluate(
                &employee,
                ClockEventType::BreakEnd,
                0.9,
                ts(2024, 3, 4, hour, 30),
            );
            assert!(matches!(end, Decision::Accepted { .. }));
            seq.commit(employee.clone(), date, AttendanceState::Working);
        }
    }

    #[test]
    fn test_midnight_rolls_into_a_fresh_day() {
        let mut seq = sequencer();
        let employee = emp("emp-001");
        let late_night = ts(2024, 3, 4, 23, 50);
        seq.commit(employee.clone(), seq.day_key(late_night), AttendanceState::Working);

        // Half past midnight is a new working day: arrival is legal again
        let after_midnight = ts(2024, 3, 5, 0, 30);
        let decision = seq.evaluate(&employee, ClockEventType::Arrival, 0.95, after_midnight);
        assert!(matches!(
            decision,
            Decision::Accepted { previous: AttendanceState::NotStarted, .. }
        ));
        assert_eq!(seq.ledger_len(), 1);
    }

    #[test]
    fn test_day_key_follows_kiosk_offset() {
        let config = Config::default().with_utc_offset_minutes(120);
        let seq = Sequencer::new(&config);

        // 23:30 UTC is 01:30 the next day at UTC+2
        let late = ts(2024, 3, 4, 23, 30);
        assert_eq!(seq.day_key(late), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn test_replay_rebuilds_state() {
        let mut seq = sequencer();
        let employee = emp("emp-001");
        let events = vec![
            ClockEvent::accepted(employee.clone(), ClockEventType::Arrival, ts(2024, 3, 4, 9, 0), 0.9),
            ClockEvent::accepted(
                employee.clone(),
                ClockEventType::BreakStart,
                ts(2024, 3, 4, 12, 0),
                0.9,
            ),
        ];

        assert_eq!(seq.replay(&events), 2);
        let date = seq.day_key(ts(2024, 3, 4, 12, 0));
        assert_eq!(seq.state_for(&employee, date), AttendanceState::OnBreak);
    }

    #[test]
    fn test_replay_skips_illegal_history() {
        let mut seq = sequencer();
        let employee = emp("emp-001");
        let events = vec![
            // Break end with no arrival on record
            ClockEvent::accepted(
                employee.clone(),
                ClockEventType::BreakEnd,
                ts(2024, 3, 4, 12, 0),
                0.9,
            ),
            ClockEvent::accepted(employee.clone(), ClockEventType::Arrival, ts(2024, 3, 4, 13, 0), 0.9),
        ];

        assert_eq!(seq.replay(&events), 1);
        let date = seq.day_key(ts(2024, 3, 4, 13, 0));
        assert_eq!(seq.state_for(&employee, date), AttendanceState::Working);
    }

    #[test]
    fn test_sweep_drops_old_days() {
        let config = Config::default().with_retention_days(1);
        let mut seq = Sequencer::new(&config);
        let employee = emp("emp-001");

        let old_date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        seq.commit(employee.clone(), old_date, AttendanceState::Finished);
        seq.commit(employee.clone(), today, AttendanceState::Working);
        assert_eq!(seq.ledger_len(), 2);

        seq.sweep(today);
        assert_eq!(seq.ledger_len(), 1);
        assert_eq!(seq.state_for(&employee, today), AttendanceState::Working);
    }

    #[test]
    fn test_minutes_late() {
        let window = ShiftWindow {
            expected_entry: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            tolerance_minutes: 5,
        };

        // Ten past nine with five minutes of grace: five minutes late
        assert_eq!(minutes_late(&window, ts(2024, 3, 4, 9, 10), 0), 5);
        // Inside the grace window
        assert_eq!(minutes_late(&window, ts(2024, 3, 4, 9, 4), 0), 0);
        // Exactly on the deadline
        assert_eq!(minutes_late(&window, ts(2024, 3, 4, 9, 5), 0), 0);
        // Early is never negative
        assert_eq!(minutes_late(&window, ts(2024, 3, 4, 8, 0), 0), 0);
    }

    #[test]
    fn test_minutes_late_uses_kiosk_clock() {
        let window = ShiftWindow {
            expected_entry: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            tolerance_minutes: 5,
        };

        // 07:10 UTC is 09:10 at UTC+2
        assert_eq!(minutes_late(&window, ts(2024, 3, 4, 7, 10), 120), 5);
        assert_eq!(minutes_late(&window, ts(2024, 3, 4, 7, 10), 0), 0);
    }
}
