//! Integration tests for the full verification pipeline: scripted frames
//! through the liveness poll task, then clock requests through the engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;

use faceclock::domain::types::Frame;
use faceclock::domain::{AttendanceState, ClockEventType, EmployeeId, RejectReason};
use faceclock::infra::{Config, Metrics};
use faceclock::io::{
    synthetic_face, FileEnrollmentStore, JsonlAuditSink, MemoryEnrollmentStore, ScriptedExtractor,
    StaticShiftProvider,
};
use faceclock::services::{
    CameraController, CameraSession, EnrollmentManager, LivenessSnapshot, VerificationEngine,
};

const DESCRIPTOR_LEN: usize = 8;

fn test_config(dir: &tempfile::TempDir) -> Config {
    let toml = format!(
        r#"
[camera]
poll_interval_ms = 10
extract_timeout_ms = 500

[matching]
accept_threshold = 0.85
descriptor_len = 8

[attendance]
event_log = {log:?}

[audit]
file = {audit:?}

[metrics]
prometheus_port = 0
"#,
        log = dir.path().join("events.jsonl"),
        audit = dir.path().join("audit.jsonl"),
    );
    Config::from_toml_str(&toml).unwrap()
}

fn descriptor() -> Vec<f32> {
    let mut d = vec![0.0; DESCRIPTOR_LEN];
    d[0] = 1.0;
    d
}

/// Open, blink (two closed frames), recover, then a 12px head shift.
/// Every face carries the enrolled embedding.
fn liveness_script() -> Vec<Vec<faceclock::domain::DetectedFace>> {
    vec![
        vec![synthetic_face(0.32, 320.0, 240.0, descriptor())],
        vec![synthetic_face(0.05, 320.0, 240.0, descriptor())],
        vec![synthetic_face(0.05, 320.0, 240.0, descriptor())],
        vec![synthetic_face(0.32, 320.0, 240.0, descriptor())],
        vec![synthetic_face(0.32, 332.0, 240.0, descriptor())],
    ]
}

fn spawn_frame_feed(frame_tx: mpsc::Sender<Frame>, count: u64) {
    tokio::spawn(async move {
        for seq in 0..count {
            if frame_tx.send(Frame::synthetic(seq)).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    });
}

async fn wait_live(session: &CameraSession) -> LivenessSnapshot {
    for _ in 0..100 {
        let snapshot = session.snapshot();
        if snapshot.is_live() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    session.snapshot()
}

fn live_snapshot() -> LivenessSnapshot {
    LivenessSnapshot {
        blink_detected: true,
        movement_detected: true,
        face_count: 1,
        frames_observed: 10,
    }
}

#[tokio::test]
async fn test_full_working_day_through_live_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let metrics = Arc::new(Metrics::new());
    let extractor = Arc::new(ScriptedExtractor::with_script(liveness_script()).with_hold_last());
    let store = Arc::new(MemoryEnrollmentStore::new());
    let audit = Arc::new(JsonlAuditSink::new(dir.path().join("audit.jsonl").to_str().unwrap()));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let manager =
        EnrollmentManager::new(&config, store.clone(), audit.clone(), metrics.clone());
    let employee = EmployeeId::new("emp-42");
    manager.enroll("hr-admin", employee.clone(), descriptor()).await.unwrap();

    let engine = VerificationEngine::new(
        &config,
        extractor.clone(),
        store.clone(),
        Arc::new(StaticShiftProvider::from_config(&config)),
        metrics.clone(),
    );

    let camera = CameraController::new(&config, extractor, metrics, shutdown_rx);
    let (frame_tx, frame_rx) = mpsc::channel(16);
    let session = camera.activate(frame_rx);
    spawn_frame_feed(frame_tx, 8);

    let snapshot = wait_live(&session).await;
    assert!(snapshot.is_live(), "scripted blink and head shift should go live");

    // a full legal day: arrival, break, back, departure
    for event_type in ClockEventType::ALL {
        let event = engine
            .request_clock_event(&employee, event_type, &Frame::synthetic(0), session.snapshot())
            .await
            .unwrap();
        assert!(event.is_accepted(), "{:?} should be accepted", event_type);
    }

    let today = engine.day_key(faceclock::domain::epoch_ms());
    assert_eq!(engine.current_state(&employee, today), AttendanceState::Finished);

    // nothing is legal after departure
    let event = engine
        .request_clock_event(
            &employee,
            ClockEventType::Arrival,
            &Frame::synthetic(0),
            session.snapshot(),
        )
        .await
        .unwrap();
    assert_eq!(event.reject_reason, Some(RejectReason::InvalidTransition));

    session.deactivate().await;
}

#[tokio::test]
async fn test_reactivated_session_starts_without_prior_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let metrics = Arc::new(Metrics::new());
    let extractor = Arc::new(ScriptedExtractor::with_script(liveness_script()).with_hold_last());
    let store = Arc::new(MemoryEnrollmentStore::new());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let engine = VerificationEngine::new(
        &config,
        extractor.clone(),
        store.clone(),
        Arc::new(StaticShiftProvider::from_config(&config)),
        metrics.clone(),
    );

    let camera = CameraController::new(&config, extractor, metrics, shutdown_rx);
    let (frame_tx, frame_rx) = mpsc::channel(16);
    let first = camera.activate(frame_rx);
    spawn_frame_feed(frame_tx, 8);
    assert!(wait_live(&first).await.is_live());
    first.deactivate().await;

    // walking away and back means starting over
    let (_tx, frame_rx) = mpsc::channel(16);
    let second = camera.activate(frame_rx);
    assert!(second.generation() > 1);
    let stale = second.snapshot();
    assert!(!stale.is_live());

    // the engine refuses to clock on the blank session
    let employee = EmployeeId::new("emp-42");
    let event = engine
        .request_clock_event(&employee, ClockEventType::Arrival, &Frame::synthetic(0), stale)
        .await
        .unwrap();
    assert_eq!(event.reject_reason, Some(RejectReason::LivenessFailed));

    second.deactivate().await;
}

#[tokio::test]
async fn test_restart_resumes_from_event_log_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store_dir = dir.path().join("descriptors");
    let employee = EmployeeId::new("emp-7");

    {
        let metrics = Arc::new(Metrics::new());
        let store = Arc::new(FileEnrollmentStore::new(&store_dir));
        let audit =
            Arc::new(JsonlAuditSink::new(dir.path().join("audit.jsonl").to_str().unwrap()));
        let manager = EnrollmentManager::new(&config, store.clone(), audit, metrics.clone());
        manager.enroll("hr-admin", employee.clone(), descriptor()).await.unwrap();

        let extractor = Arc::new(ScriptedExtractor::new());
        extractor.push(vec![synthetic_face(0.32, 320.0, 240.0, descriptor())]);
        let engine = VerificationEngine::new(
            &config,
            extractor,
            store,
            Arc::new(StaticShiftProvider::from_config(&config)),
            metrics,
        );
        let event = engine
            .request_clock_event(
                &employee,
                ClockEventType::Arrival,
                &Frame::synthetic(0),
                live_snapshot(),
            )
            .await
            .unwrap();
        assert!(event.is_accepted());
    }

    // new process: fresh engine over the same log and descriptor directory
    let metrics = Arc::new(Metrics::new());
    let extractor = Arc::new(ScriptedExtractor::new());
    extractor.push(vec![synthetic_face(0.32, 320.0, 240.0, descriptor())]);
    let engine = VerificationEngine::new(
        &config,
        extractor,
        Arc::new(FileEnrollmentStore::new(&store_dir)),
        Arc::new(StaticShiftProvider::from_config(&config)),
        metrics,
    );
    let applied = engine.restore_from_log().unwrap();
    assert_eq!(applied, 1);

    let event = engine
        .request_clock_event(
            &employee,
            ClockEventType::Arrival,
            &Frame::synthetic(0),
            live_snapshot(),
        )
        .await
        .unwrap();
    assert_eq!(event.reject_reason, Some(RejectReason::InvalidTransition));
}

#[tokio::test]
async fn test_enroll_and_revoke_leave_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let audit_path = dir.path().join("audit.jsonl");
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(MemoryEnrollmentStore::new());
    let audit = Arc::new(JsonlAuditSink::new(audit_path.to_str().unwrap()));
    let manager = EnrollmentManager::new(&config, store, audit, metrics);

    let employee = EmployeeId::new("emp-13");
    manager.enroll("hr-admin", employee.clone(), descriptor()).await.unwrap();
    // overwrite with a fresh capture
    manager.enroll("hr-admin", employee.clone(), descriptor()).await.unwrap();
    assert!(manager.revoke("hr-admin", &employee).await.unwrap());

    let text = std::fs::read_to_string(&audit_path).unwrap();
    let entries: Vec<serde_json::Value> =
        text.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["action"], "enroll");
    assert_eq!(entries[0]["metadata"]["replaced"], false);
    assert_eq!(entries[1]["metadata"]["replaced"], true);
    assert_eq!(entries[2]["action"], "revoke");
    assert_eq!(entries[2]["metadata"]["removed"], true);
    assert_eq!(entries[2]["actor"], "hr-admin");
}
