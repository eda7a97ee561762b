//! kioskd - biometric clock-in verification daemon for one attendance kiosk
//!
//! Wires the capture pipeline together: a frame source feeding the liveness
//! poll task, the verification engine over the configured enrollment store,
//! and the Prometheus metrics endpoint. Clock requests and enrollment come
//! in through the library API; the `sim` binary drives a scripted day for
//! development.
//!
//! Module structure:
//! - `domain/` - Core business types (ClockEvent, AttendanceState, errors)
//! - `io/` - External interfaces (extractor, enrollment store, event log, audit)
//! - `services/` - Business logic (engine, sequencer, liveness, enrollment)
//! - `infra/` - Infrastructure (Config, Metrics)

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use faceclock::domain::types::Frame;
use faceclock::infra::{Config, EnrollmentMode, Metrics};
use faceclock::io::{
    EnrollmentStore, FileEnrollmentStore, HttpEnrollmentStore, MemoryEnrollmentStore,
    ScriptedExtractor, StaticShiftProvider,
};
use faceclock::services::{CameraController, VerificationEngine};

/// kioskd - employee attendance kiosk verification daemon
#[derive(Parser, Debug)]
#[command(name = "kioskd", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("kioskd starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    let mode_str = match config.enrollment_mode() {
        EnrollmentMode::Memory => "memory",
        EnrollmentMode::File => "file",
        EnrollmentMode::Http => "http",
    };
    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        enrollment_mode = %mode_str,
        accept_threshold = %config.accept_threshold(),
        poll_interval_ms = %config.poll_interval_ms(),
        utc_offset_minutes = %config.utc_offset_minutes(),
        event_log = %config.event_log(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared components behind the trait seams
    let store: Arc<dyn EnrollmentStore> = match config.enrollment_mode() {
        EnrollmentMode::Memory => Arc::new(MemoryEnrollmentStore::new()),
        EnrollmentMode::File => Arc::new(FileEnrollmentStore::new(config.enrollment_dir())),
        EnrollmentMode::Http => Arc::new(HttpEnrollmentStore::new(
            config.enrollment_url(),
            config.fetch_timeout_ms(),
        )),
    };
    let shifts = Arc::new(StaticShiftProvider::from_config(&config));
    let metrics = Arc::new(Metrics::new());

    // Stand-in landmark backend; a production extractor implements
    // LandmarkExtractor behind the same seam.
    let extractor = Arc::new(ScriptedExtractor::new());

    let engine = VerificationEngine::new(
        &config,
        extractor.clone(),
        store,
        shifts,
        metrics.clone(),
    );
    let restored = engine.restore_from_log()?;
    if restored > 0 {
        info!(events = %restored, "resumed_from_event_log");
    }

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = faceclock::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let summary = metrics_clone.report();
            summary.log();
        }
    });

    // Frame source at the camera poll cadence. Pixel payloads are empty;
    // the scripted extractor never reads them.
    let (frame_tx, frame_rx) = mpsc::channel(16);
    let poll_ms = config.poll_interval_ms();
    let mut frame_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(poll_ms));
        let mut seq = 0u64;
        loop {
            tokio::select! {
                _ = frame_shutdown.changed() => {
                    if *frame_shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    seq += 1;
                    if frame_tx.send(Frame::synthetic(seq)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let camera = CameraController::new(&config, extractor, metrics, shutdown_rx);
    let session = camera.activate(frame_rx);
    info!(generation = %session.generation(), "camera_session_active");

    // Handle shutdown on Ctrl+C
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    session.deactivate().await;
    info!("kioskd shutdown complete");
    Ok(())
}
