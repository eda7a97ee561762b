//! Domain models - core business types for biometric clock-in
//!
//! This module contains the canonical data types used throughout the system:
//! - `ClockEvent` - the immutable attendance record, accepted or rejected
//! - `AttendanceState` / `ClockEventType` - the per-day state machine alphabet
//! - `DetectedFace` / `FaceLandmarks` - landmark extractor output
//! - `EnrolledIdentity` / `CapturedSample` - the matcher's two inputs
//! - `RejectReason` / `VerifyError` - the user-facing error taxonomy

pub mod errors;
pub mod event;
pub mod types;

// Re-export commonly used types at module level
pub use errors::{EnrollError, ExtractError, RejectReason, StoreError, VerifyError, VerifyResult};
pub use event::{epoch_ms, local_date, ClockEvent};
pub use types::{AttendanceState, ClockEventType, DetectedFace, EmployeeId, EventStatus};
