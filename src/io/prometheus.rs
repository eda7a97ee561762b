//! Prometheus metrics HTTP endpoint
//!
//! Exposes kiosk metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{
    Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS,
};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(8192);

    write_frame_metrics(&mut output, site_id, &summary);
    write_liveness_metrics(&mut output, site_id, &summary);
    write_capture_metrics(&mut output, site_id, &summary);
    write_store_metrics(&mut output, site_id, &summary);
    write_decision_metrics(&mut output, site_id, &summary);
    write_enrollment_metrics(&mut output, site_id, &summary);

    output
}

fn write_frame_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "faceclock_frames_total",
        "Total camera frames observed",
        MetricType::Counter,
        site,
        summary.frames_total,
    );
    let _ = writeln!(output, "# HELP faceclock_frames_per_sec Frames observed per second");
    let _ = writeln!(output, "# TYPE faceclock_frames_per_sec gauge");
    let _ =
        writeln!(output, "faceclock_frames_per_sec{{site=\"{site}\"}} {:.2}", summary.frames_per_sec);

    write_histogram(
        output,
        "faceclock_extract_latency_us",
        "Landmark extraction latency in microseconds",
        site,
        &summary.extract_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.extract_avg_us,
    );
    write_metric(
        output,
        "faceclock_extract_latency_p50_us",
        "50th percentile extraction latency",
        MetricType::Gauge,
        site,
        summary.extract_p50_us,
    );
    write_metric(
        output,
        "faceclock_extract_latency_p95_us",
        "95th percentile extraction latency",
        MetricType::Gauge,
        site,
        summary.extract_p95_us,
    );
    write_metric(
        output,
        "faceclock_extract_latency_p99_us",
        "99th percentile extraction latency",
        MetricType::Gauge,
        site,
        summary.extract_p99_us,
    );
    write_metric(
        output,
        "faceclock_extract_timeouts_total",
        "Extraction calls that hit the deadline",
        MetricType::Counter,
        site,
        summary.extract_timeouts_total,
    );
}

fn write_liveness_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "faceclock_blinks_total",
        "Blinks detected across all sessions",
        MetricType::Counter,
        site,
        summary.blinks_total,
    );
    write_metric(
        output,
        "faceclock_movements_total",
        "Head movements detected across all sessions",
        MetricType::Counter,
        site,
        summary.movements_total,
    );
    write_metric(
        output,
        "faceclock_liveness_sessions_total",
        "Liveness sessions started",
        MetricType::Counter,
        site,
        summary.liveness_sessions_total,
    );
    write_metric(
        output,
        "faceclock_session_active",
        "Whether a liveness session is currently running",
        MetricType::Gauge,
        site,
        summary.session_active,
    );
}

fn write_capture_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "faceclock_capture_attempts_total",
        "Clock-in capture attempts",
        MetricType::Counter,
        site,
        summary.capture_attempts_total,
    );
    write_metric(
        output,
        "faceclock_no_face_total",
        "Captures with no face in frame",
        MetricType::Counter,
        site,
        summary.no_face_total,
    );
    write_metric(
        output,
        "faceclock_multiple_faces_total",
        "Captures with more than one face in frame",
        MetricType::Counter,
        site,
        summary.multiple_faces_total,
    );
}

fn write_store_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_histogram(
        output,
        "faceclock_store_fetch_us",
        "Enrollment store fetch latency in microseconds",
        site,
        &summary.store_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.store_avg_us,
    );
    write_metric(
        output,
        "faceclock_store_fetch_p99_us",
        "99th percentile store fetch latency",
        MetricType::Gauge,
        site,
        summary.store_p99_us,
    );
    write_metric(
        output,
        "faceclock_store_timeouts_total",
        "Store calls that hit the deadline",
        MetricType::Counter,
        site,
        summary.store_timeouts_total,
    );
    write_metric(
        output,
        "faceclock_store_retries_total",
        "Store calls retried after a timeout",
        MetricType::Counter,
        site,
        summary.store_retries_total,
    );
}

fn write_decision_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "faceclock_match_attempts_total",
        "Descriptor comparisons performed",
        MetricType::Counter,
        site,
        summary.match_attempts_total,
    );
    write_metric(
        output,
        "faceclock_events_accepted_total",
        "Clock events accepted",
        MetricType::Counter,
        site,
        summary.events_accepted_total,
    );

    let _ = writeln!(output, "# HELP faceclock_events_rejected_total Clock events rejected by reason");
    let _ = writeln!(output, "# TYPE faceclock_events_rejected_total counter");
    for (reason, count) in [
        ("liveness_failed", summary.rejected_liveness_failed),
        ("not_enrolled", summary.rejected_not_enrolled),
        ("low_confidence", summary.rejected_low_confidence),
        ("invalid_transition", summary.rejected_invalid_transition),
    ] {
        let _ = writeln!(
            output,
            "faceclock_events_rejected_total{{site=\"{site}\",reason=\"{reason}\"}} {count}"
        );
    }

    write_metric(
        output,
        "faceclock_late_arrivals_total",
        "Accepted arrivals past the tolerance window",
        MetricType::Counter,
        site,
        summary.late_arrivals_total,
    );
    write_metric(
        output,
        "faceclock_minutes_late_sum",
        "Total late minutes across accepted arrivals",
        MetricType::Counter,
        site,
        summary.minutes_late_sum,
    );
    write_metric(
        output,
        "faceclock_ledger_entries",
        "Current attendance ledger size",
        MetricType::Gauge,
        site,
        summary.ledger_entries,
    );
}

fn write_enrollment_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "faceclock_enrollments_total",
        "Enrollments performed",
        MetricType::Counter,
        site,
        summary.enrollments_total,
    );
    write_metric(
        output,
        "faceclock_revocations_total",
        "Revocations performed",
        MetricType::Counter,
        site,
        summary.revocations_total,
    );
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RejectReason;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();

        metrics.record_frame_observed(150);
        metrics.record_frame_observed(250);
        metrics.record_store_fetch(100);
        metrics.record_accepted();
        metrics.record_rejected(RejectReason::LowConfidence);
        metrics.set_ledger_entries(3);

        let output = format_prometheus_metrics(&metrics, "hq-lobby");

        assert!(output.contains("faceclock_frames_total{site=\"hq-lobby\"} 2"));
        assert!(output.contains("faceclock_extract_latency_us_bucket{site=\"hq-lobby\""));
        assert!(output.contains("faceclock_events_accepted_total{site=\"hq-lobby\"} 1"));
        assert!(output.contains(
            "faceclock_events_rejected_total{site=\"hq-lobby\",reason=\"low_confidence\"} 1"
        ));
        assert!(output.contains(
            "faceclock_events_rejected_total{site=\"hq-lobby\",reason=\"not_enrolled\"} 0"
        ));
        assert!(output.contains("faceclock_ledger_entries{site=\"hq-lobby\"} 3"));
        assert!(output.contains("faceclock_store_fetch_us_count{site=\"hq-lobby\"} 1"));
    }
}
