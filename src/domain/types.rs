//! Shared types for the verification engine

use bytes::Bytes;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Newtype wrapper for employee IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clock event kinds requestable at the kiosk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockEventType {
    Arrival,
    BreakStart,
    BreakEnd,
    Departure,
}

impl ClockEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockEventType::Arrival => "arrival",
            ClockEventType::BreakStart => "break_start",
            ClockEventType::BreakEnd => "break_end",
            ClockEventType::Departure => "departure",
        }
    }

    /// All event types, in legal daily order
    pub const ALL: [ClockEventType; 4] = [
        ClockEventType::Arrival,
        ClockEventType::BreakStart,
        ClockEventType::BreakEnd,
        ClockEventType::Departure,
    ];
}

/// Outcome of a clock request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Accepted,
    Rejected,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Accepted => "accepted",
            EventStatus::Rejected => "rejected",
        }
    }
}

/// Attendance state for one employee on one working day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    NotStarted,
    Working,
    OnBreak,
    Finished,
}

impl AttendanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceState::NotStarted => "not_started",
            AttendanceState::Working => "working",
            AttendanceState::OnBreak => "on_break",
            AttendanceState::Finished => "finished",
        }
    }

    pub const ALL: [AttendanceState; 4] = [
        AttendanceState::NotStarted,
        AttendanceState::Working,
        AttendanceState::OnBreak,
        AttendanceState::Finished,
    ];
}

/// A 2D facial landmark point in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another landmark (pixels)
    pub fn distance(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// The landmark points the liveness checks consume.
///
/// Each eye is the standard six-point contour: outer corner, two upper lid
/// points, inner corner, two lower lid points, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub left_eye: [Landmark; 6],
    pub right_eye: [Landmark; 6],
    pub nose_tip: Landmark,
}

/// One face found in a frame: landmark geometry plus the embedding vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    pub landmarks: FaceLandmarks,
    pub embedding: Vec<f32>,
}

/// A raw camera frame handed to the landmark extractor.
///
/// `captured_at` (epoch ms) is the event time for any clock request made
/// from this frame: it drives both the working-day key and lateness.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
    pub captured_at: u64,
}

impl Frame {
    pub fn new(seq: u64, width: u32, height: u32, pixels: Bytes, captured_at: u64) -> Self {
        Self { seq, width, height, pixels, captured_at }
    }

    /// Pixel-less placeholder frame stamped with the current time.
    /// Used by the synthetic frame source and in tests; scripted
    /// extractors ignore pixel data entirely.
    pub fn synthetic(seq: u64) -> Self {
        Self {
            seq,
            width: 640,
            height: 480,
            pixels: Bytes::new(),
            captured_at: crate::domain::event::epoch_ms(),
        }
    }
}

/// Embedding captured from a single frame for one match attempt
#[derive(Debug, Clone)]
pub struct CapturedSample {
    pub embedding: Vec<f32>,
    pub captured_at: u64,
}

/// The single active descriptor stored per employee
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledIdentity {
    pub employee_id: EmployeeId,
    pub descriptor: Vec<f32>,
    pub enrolled_at: u64,
}

/// Expected entry time and grace period for one employee/day.
/// Consumed read-only from the shift data provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftWindow {
    pub expected_entry: NaiveTime,
    pub tolerance_minutes: i64,
}
