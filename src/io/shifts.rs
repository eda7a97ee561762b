//! Shift schedule lookup
//!
//! Lateness annotation needs to know when an employee was expected.
//! The `ShiftProvider` seam keeps the kiosk independent of where
//! schedules actually live; the static provider serves one site-wide
//! shift from config, which is how single-shift sites run.

use crate::domain::types::{EmployeeId, ShiftWindow};
use crate::infra::Config;
use chrono::{Datelike, NaiveDate, NaiveTime};

pub trait ShiftProvider: Send + Sync {
    /// The employee's shift for that date, or None when they are not
    /// scheduled (arrivals then carry no lateness annotation)
    fn shift_window(&self, employee_id: &EmployeeId, date: NaiveDate) -> Option<ShiftWindow>;
}

/// One shift for everyone, on the configured weekdays
pub struct StaticShiftProvider {
    expected_entry: NaiveTime,
    tolerance_minutes: i64,
    workdays: Vec<u32>,
}

impl StaticShiftProvider {
    pub fn new(expected_entry: NaiveTime, tolerance_minutes: i64, workdays: Vec<u32>) -> Self {
        Self { expected_entry, tolerance_minutes, workdays }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.shift_expected_entry(),
            config.shift_tolerance_minutes(),
            config.shift_workdays().to_vec(),
        )
    }
}

impl ShiftProvider for StaticShiftProvider {
    fn shift_window(&self, _employee_id: &EmployeeId, date: NaiveDate) -> Option<ShiftWindow> {
        if !self.workdays.contains(&date.weekday().number_from_monday()) {
            return None;
        }
        Some(ShiftWindow {
            expected_entry: self.expected_entry,
            tolerance_minutes: self.tolerance_minutes,
        })
    }
}
