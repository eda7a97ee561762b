//! Error taxonomy for the verification pipeline
//!
//! Two layers:
//! - `RejectReason` - a clock request was evaluated and turned down; the
//!   rejection is persisted as a `ClockEvent` for the audit trail.
//! - `VerifyError` - the attempt could not be evaluated at all (bad capture
//!   frame, upstream timeout, persistence failure); nothing is persisted.
//!
//! Every variant is a recoverable, user-facing condition: `instruction()`
//! yields the message shown on the kiosk display and the session stays
//! active for a retry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an evaluated clock request was rejected.
///
/// Carried on the persisted rejected `ClockEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("liveness evidence incomplete")]
    LivenessFailed,
    #[error("no enrolled descriptor for employee")]
    NotEnrolled,
    #[error("match confidence below accept threshold")]
    LowConfidence,
    #[error("event not legal in current attendance state")]
    InvalidTransition,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::LivenessFailed => "liveness_failed",
            RejectReason::NotEnrolled => "not_enrolled",
            RejectReason::LowConfidence => "low_confidence",
            RejectReason::InvalidTransition => "invalid_transition",
        }
    }

    /// Message shown to the employee on the kiosk display
    pub fn instruction(&self) -> &'static str {
        match self {
            RejectReason::LivenessFailed => "Blink and move your head slightly, then try again.",
            RejectReason::NotEnrolled => "No face enrolled for this employee. Contact HR to enroll.",
            RejectReason::LowConfidence => "Face not recognized. Step closer and try again.",
            RejectReason::InvalidTransition => "That clock action is not available right now.",
        }
    }
}

/// Enrollment store adapter failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("descriptor document malformed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("http: {0}")]
    Http(String),
    #[error("employee id {0:?} not usable as a store key")]
    InvalidId(String),
}

/// Landmark extractor backend failures
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ExtractError(pub String);

/// Enrollment workflow failures
#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("descriptor has {got} dimensions, expected {expected}")]
    WrongDimension { got: usize, expected: usize },
    #[error("descriptor magnitude is zero")]
    ZeroMagnitude,
    #[error("enrollment store: {0}")]
    Store(#[from] StoreError),
    #[error("audit sink: {0}")]
    Audit(#[from] std::io::Error),
}

/// An attempt that could not be evaluated.
///
/// Distinct from `RejectReason`: no `ClockEvent` is written for these.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("no face detected in capture frame")]
    NoFaceDetected,
    #[error("{count} faces detected in capture frame")]
    MultipleFacesDetected { count: usize },
    #[error("{operation} did not respond within {timeout_ms}ms ({attempts} attempts)")]
    UpstreamTimeout { operation: &'static str, timeout_ms: u64, attempts: u32 },
    #[error("enrollment store: {0}")]
    Store(#[from] StoreError),
    #[error("landmark extractor: {0}")]
    Extractor(#[from] ExtractError),
    #[error("event log append failed: {0}")]
    EventLog(#[from] std::io::Error),
}

impl VerifyError {
    /// Message shown to the employee on the kiosk display
    pub fn instruction(&self) -> &'static str {
        match self {
            VerifyError::NoFaceDetected => "Look straight at the camera.",
            VerifyError::MultipleFacesDetected { .. } => "Only one person in frame, please.",
            VerifyError::UpstreamTimeout { .. } => "Service is slow right now. Try again later.",
            VerifyError::Store(_) | VerifyError::Extractor(_) | VerifyError::EventLog(_) => {
                "Something went wrong. Try again later."
            }
        }
    }
}

pub type VerifyResult<T> = Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_serde_snake_case() {
        let json = serde_json::to_string(&RejectReason::LowConfidence).unwrap();
        assert_eq!(json, "\"low_confidence\"");

        let back: RejectReason = serde_json::from_str("\"invalid_transition\"").unwrap();
        assert_eq!(back, RejectReason::InvalidTransition);
    }

    #[test]
    fn test_every_reject_reason_has_instruction() {
        let reasons = [
            RejectReason::LivenessFailed,
            RejectReason::NotEnrolled,
            RejectReason::LowConfidence,
            RejectReason::InvalidTransition,
        ];
        for reason in reasons {
            assert!(!reason.instruction().is_empty());
        }
    }

    #[test]
    fn test_verify_error_display() {
        let err = VerifyError::MultipleFacesDetected { count: 3 };
        assert_eq!(err.to_string(), "3 faces detected in capture frame");

        let err = VerifyError::UpstreamTimeout {
            operation: "enrollment_store",
            timeout_ms: 2000,
            attempts: 3,
        };
        assert!(err.to_string().contains("enrollment_store"));
        assert!(err.to_string().contains("2000ms"));
        assert!(!err.instruction().is_empty());
    }
}
