//! Clock event records and kiosk-local time handling

use crate::domain::errors::RejectReason;
use crate::domain::types::{ClockEventType, EmployeeId, EventStatus};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_event_id() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Convert an epoch-ms timestamp to the kiosk's local wall clock.
///
/// The kiosk time zone is a fixed UTC offset in minutes from config;
/// out-of-range offsets fall back to UTC.
pub fn local_datetime(timestamp_ms: u64, utc_offset_minutes: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
        .unwrap_or_else(|| Utc.fix());
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms as i64)
        .unwrap_or_default()
        .with_timezone(&offset)
}

/// The working-day key for an event: its local calendar date at the kiosk
#[inline]
pub fn local_date(timestamp_ms: u64, utc_offset_minutes: i32) -> NaiveDate {
    local_datetime(timestamp_ms, utc_offset_minutes).date_naive()
}

/// One clock request and its outcome. Immutable once persisted; rejected
/// requests are persisted too, for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockEvent {
    /// UUIDv7 event ID
    pub event_id: String,
    pub employee_id: EmployeeId,
    pub event_type: ClockEventType,
    /// Epoch ms, taken from the capture frame
    pub timestamp: u64,
    /// Match confidence in [0,1]; 0.0 when the matcher never ran
    pub confidence: f32,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<RejectReason>,
    /// Arrival only: minutes past the shift tolerance window; 0 = on time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_late: Option<i64>,
    /// Kiosk site label from config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ClockEvent {
    pub fn accepted(
        employee_id: EmployeeId,
        event_type: ClockEventType,
        timestamp: u64,
        confidence: f32,
    ) -> Self {
        Self {
            event_id: new_event_id(),
            employee_id,
            event_type,
            timestamp,
            confidence,
            status: EventStatus::Accepted,
            reject_reason: None,
            minutes_late: None,
            location: None,
        }
    }

    pub fn rejected(
        employee_id: EmployeeId,
        event_type: ClockEventType,
        timestamp: u64,
        confidence: f32,
        reason: RejectReason,
    ) -> Self {
        Self {
            event_id: new_event_id(),
            employee_id,
            event_type,
            timestamp,
            confidence,
            status: EventStatus::Rejected,
            reject_reason: Some(reason),
            minutes_late: None,
            location: None,
        }
    }

    pub fn with_minutes_late(mut self, minutes: i64) -> Self {
        self.minutes_late = Some(minutes);
        self
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn is_accepted(&self) -> bool {
        self.status == EventStatus::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_generation() {
        let a = new_event_id();
        let b = new_event_id();
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }

    #[test]
    fn test_local_date_offsets() {
        // 2024-03-04 23:16:40 UTC
        let ts: u64 = 1_709_594_200_000;
        assert_eq!(local_date(ts, 0), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        // +2h pushes it past midnight
        assert_eq!(local_date(ts, 120), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        // -60min keeps the same date
        assert_eq!(local_date(ts, -60), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[test]
    fn test_local_date_invalid_offset_falls_back_to_utc() {
        let ts: u64 = 1_709_594_200_000;
        assert_eq!(local_date(ts, 99_999), local_date(ts, 0));
    }

    #[test]
    fn test_accepted_event_roundtrip() {
        let event = ClockEvent::accepted(
            EmployeeId::new("emp-1"),
            ClockEventType::Arrival,
            1_709_541_000_000,
            0.92,
        )
        .with_minutes_late(5)
        .with_location("HQ Lobby");

        let json = serde_json::to_string(&event).unwrap();
        let back: ClockEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(back.employee_id, EmployeeId::new("emp-1"));
        assert_eq!(back.event_type, ClockEventType::Arrival);
        assert_eq!(back.status, EventStatus::Accepted);
        assert_eq!(back.minutes_late, Some(5));
        assert_eq!(back.location.as_deref(), Some("HQ Lobby"));
        assert!(back.reject_reason.is_none());
    }

    #[test]
    fn test_rejected_event_carries_reason() {
        let event = ClockEvent::rejected(
            EmployeeId::new("emp-2"),
            ClockEventType::BreakStart,
            1_709_541_000_000,
            0.40,
            RejectReason::LowConfidence,
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"reject_reason\":\"low_confidence\""));
        // Absent annotations are omitted from the persisted line
        assert!(!json.contains("minutes_late"));
        assert!(!json.contains("location"));
    }
}
