//! Clock event log - append-only JSONL audit record
//!
//! Every clock event, accepted or rejected, is written here as one JSON
//! object per line before the attendance ledger advances. On startup the
//! current working day is replayed from this file so a kiosk restart
//! mid-day does not forget who is already working.

use crate::domain::event::local_date;
use crate::domain::ClockEvent;
use chrono::NaiveDate;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct EventLog {
    file_path: String,
}

impl EventLog {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "event_log_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append one clock event. The caller must not advance any state the
    /// event records until this returns Ok.
    pub fn append(&self, event: &ClockEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)?;
        self.append_line(&json)?;
        info!(
            event_id = %event.event_id,
            employee_id = %event.employee_id,
            event_type = %event.event_type.as_str(),
            status = %event.status.as_str(),
            "clock_event_logged"
        );
        Ok(())
    }

    /// Append a line to the log file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "event_log_written");

        Ok(())
    }

    /// Read back the accepted events whose local calendar date matches
    /// `date`. Rejected events are audit-only and never replayed;
    /// malformed lines are skipped with a warning.
    pub fn replay_day(
        &self,
        date: NaiveDate,
        utc_offset_minutes: i32,
    ) -> std::io::Result<Vec<ClockEvent>> {
        let content = match std::fs::read_to_string(&self.file_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut events = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ClockEvent>(line) {
                Ok(event) => {
                    if event.is_accepted() && local_date(event.timestamp, utc_offset_minutes) == date
                    {
                        events.push(event);
                    }
                }
                Err(e) => {
                    warn!(
                        file = %self.file_path,
                        line = %(line_no + 1),
                        error = %e,
                        "event_log_line_skipped"
                    );
                }
            }
        }
        Ok(events)
    }
}
