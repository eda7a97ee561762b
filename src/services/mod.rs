//! Services - verification pipeline and attendance state management
//!
//! This module contains the core business logic services:
//! - `engine` - End-to-end clock request verification
//! - `sequencer` - Per-employee, per-day attendance state machine
//! - `liveness` - Blink and head movement evidence over a frame stream
//! - `liveness_worker` - Cancellable camera poll task feeding liveness
//! - `matcher` - Descriptor distance and confidence scoring
//! - `enrollment` - Enroll/revoke workflow with audit side effects

pub mod engine;
pub mod enrollment;
pub mod liveness;
pub mod liveness_worker;
pub mod matcher;
pub mod sequencer;

// Re-export commonly used types
pub use engine::VerificationEngine;
pub use enrollment::EnrollmentManager;
pub use liveness::{LivenessSession, LivenessSnapshot};
pub use liveness_worker::{CameraController, CameraSession};
pub use sequencer::{apply_event, minutes_late, Decision, Sequencer};
