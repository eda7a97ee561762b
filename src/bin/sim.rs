//! Kiosk simulation - scripted clock-in scenario driver
//!
//! Drives the verification engine with a synthetic blink-and-move frame
//! script against the in-memory enrollment store and prints every resulting
//! event as JSON. The development harness: no camera, no HR backend, no
//! kiosk UI.
//!
//! Usage:
//!   cargo run --bin sim -- --config config/dev.toml

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use faceclock::domain::types::Frame;
use faceclock::domain::{ClockEventType, EmployeeId};
use faceclock::infra::{Config, Metrics};
use faceclock::io::{
    synthetic_face, JsonlAuditSink, MemoryEnrollmentStore, ScriptedExtractor, StaticShiftProvider,
};
use faceclock::services::{CameraController, CameraSession, EnrollmentManager, VerificationEngine};

#[derive(Parser, Debug)]
#[command(name = "sim")]
#[command(about = "Scripted clock-in scenario for local testing")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(MemoryEnrollmentStore::new());
    let audit = Arc::new(JsonlAuditSink::new(config.audit_file()));
    let extractor = Arc::new(ScriptedExtractor::new().with_hold_last());

    let engine = VerificationEngine::new(
        &config,
        extractor.clone(),
        store.clone(),
        Arc::new(StaticShiftProvider::from_config(&config)),
        metrics.clone(),
    );
    let enrollment = EnrollmentManager::new(&config, store, audit, metrics.clone());

    let employee = EmployeeId::new("emp-demo");
    let mut descriptor = vec![0.0f32; config.descriptor_len()];
    descriptor[0] = 1.0;
    enrollment.enroll("sim-operator", employee.clone(), descriptor.clone()).await?;

    // Two closed frames then recovery latch the blink; the 12px nose
    // shift on the last frame latches head movement. hold_last keeps
    // that frame for every later poll and capture.
    extractor.push(vec![synthetic_face(0.32, 320.0, 240.0, descriptor.clone())]);
    extractor.push(vec![synthetic_face(0.05, 320.0, 240.0, descriptor.clone())]);
    extractor.push(vec![synthetic_face(0.05, 320.0, 240.0, descriptor.clone())]);
    extractor.push(vec![synthetic_face(0.32, 320.0, 240.0, descriptor.clone())]);
    extractor.push(vec![synthetic_face(0.32, 332.0, 240.0, descriptor)]);

    let (frame_tx, frame_rx) = mpsc::channel(16);
    let poll_ms = config.poll_interval_ms();
    tokio::spawn(async move {
        let mut seq = 0u64;
        loop {
            seq += 1;
            if frame_tx.send(Frame::synthetic(seq)).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(poll_ms)).await;
        }
    });

    let camera = CameraController::new(&config, extractor.clone(), metrics, shutdown_rx);
    let session = camera.activate(frame_rx);

    for _ in 0..100 {
        if session.snapshot().is_live() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let snapshot = session.snapshot();
    info!(
        blink = %snapshot.blink_detected,
        movement = %snapshot.movement_detected,
        faces = %snapshot.face_count,
        "liveness_state"
    );

    // One full working day, then a post-revocation attempt that shows
    // the not-enrolled rejection.
    for event_type in ClockEventType::ALL {
        clock_once(&engine, &employee, event_type, &session).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    enrollment.revoke("sim-operator", &employee).await?;
    clock_once(&engine, &employee, ClockEventType::Arrival, &session).await;

    let _ = shutdown_tx.send(true);
    session.deactivate().await;
    Ok(())
}

async fn clock_once(
    engine: &VerificationEngine,
    employee: &EmployeeId,
    event_type: ClockEventType,
    session: &CameraSession,
) {
    let frame = Frame::synthetic(0);
    match engine.request_clock_event(employee, event_type, &frame, session.snapshot()).await {
        Ok(event) => {
            match serde_json::to_string(&event) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(error = %e, "event_serialize_failed"),
            }
            if let Some(reason) = event.reject_reason {
                info!(
                    event_type = %event_type.as_str(),
                    instruction = %reason.instruction(),
                    "kiosk_instruction"
                );
            }
        }
        Err(e) => {
            warn!(
                event_type = %event_type.as_str(),
                error = %e,
                instruction = %e.instruction(),
                "attempt_failed"
            );
        }
    }
}
