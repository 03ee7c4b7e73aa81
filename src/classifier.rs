//! Present/late classification of accepted submissions.

use crate::types::AttendanceStatus;
use chrono::{DateTime, Duration, Utc};

/// Maps proximity and arrival time onto a status.
///
/// An off-site submission is always late. An on-site submission is present
/// while `recorded_at <= window_start + grace`, where grace is
/// `grace_fraction` of the window length, and late afterwards.
#[derive(Debug, Clone, Copy)]
pub struct StatusClassifier {
    grace_fraction: f64,
}

impl StatusClassifier {
    pub fn new(grace_fraction: f64) -> Self {
        Self { grace_fraction }
    }

    /// Grace period for a window. Empty or inverted windows get none.
    pub fn grace_period(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Duration {
        let window_ms = (window_end - window_start).num_milliseconds().max(0);
        Duration::milliseconds((window_ms as f64 * self.grace_fraction).floor() as i64)
    }

    pub fn classify(
        &self,
        within_radius: bool,
        recorded_at: DateTime<Utc>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> AttendanceStatus {
        if !within_radius {
            return AttendanceStatus::Late;
        }
        if recorded_at <= window_start + self.grace_period(window_start, window_end) {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Late
        }
    }
}
