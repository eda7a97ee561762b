//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `extractor` - Facial landmark extraction boundary (trusted model)
//! - `enrollment` - Descriptor stores (memory, file, HTTP)
//! - `event_log` - Clock event output to file (JSONL format)
//! - `audit` - Enrollment audit trail
//! - `shifts` - Shift schedule lookup
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod audit;
pub mod enrollment;
pub mod event_log;
pub mod extractor;
pub mod prometheus;
pub mod shifts;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEntry, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use enrollment::{
    EnrollmentStore, FileEnrollmentStore, HttpEnrollmentStore, MemoryEnrollmentStore,
};
pub use event_log::EventLog;
pub use extractor::{synthetic_face, LandmarkExtractor, ScriptedExtractor};
pub use shifts::{ShiftProvider, StaticShiftProvider};
