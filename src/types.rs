//! Shared data model for attendance verification.

use crate::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of the person marking attendance.
    SubjectId
);
string_id!(
    /// Identifier of a scheduled class session.
    SessionId
);
string_id!(
    /// Parent group (program) a session belongs to.
    GroupId
);
string_id!(
    /// Sub-group (stream) inside a parent group.
    CohortId
);

/// Read-only view of a session, fetched from the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub group_id: GroupId,
    /// `None` means every subject of `group_id` is targeted.
    pub cohort_target_id: Option<CohortId>,
    pub anchor_latitude: f64,
    pub anchor_longitude: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub is_cancelled: bool,
}

/// Read-only view of a subject's eligibility, fetched from the accounts collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectEligibilitySnapshot {
    pub subject_id: SubjectId,
    pub group_id: GroupId,
    pub cohort_id: Option<CohortId>,
    pub is_active: bool,
    /// Canonical physical ID (e.g. `BCS/234344`) the scanned value must equal.
    pub bound_identity: String,
}

/// Final attendance status. Absence is the lack of a record, not a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted attendance record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    record_id: Uuid,
    subject_id: SubjectId,
    session_id: SessionId,
    recorded_at: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    status: AttendanceStatus,
    is_within_radius: bool,
}

impl AttendanceRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        subject_id: SubjectId,
        session_id: SessionId,
        recorded_at: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        status: AttendanceStatus,
        is_within_radius: bool,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            subject_id,
            session_id,
            recorded_at,
            latitude,
            longitude,
            status,
            is_within_radius,
        }
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn status(&self) -> AttendanceStatus {
        self.status
    }

    pub fn is_within_radius(&self) -> bool {
        self.is_within_radius
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            record_id: self.record_id,
            status: self.status,
            recorded_at: self.recorded_at,
        }
    }
}

/// Short description of an existing record, returned on duplicate submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub record_id: Uuid,
    pub status: AttendanceStatus,
    pub recorded_at: DateTime<Utc>,
}

/// Inbound "mark attendance" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceRequest {
    pub raw_token: String,
    pub scanned_identity: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Outcome of one verification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AttendanceDecision {
    Accepted {
        record_id: Uuid,
        status: AttendanceStatus,
        is_within_radius: bool,
        recorded_at: DateTime<Utc>,
        distance_meters: f64,
    },
    Rejected {
        failure_kind: FailureKind,
        detail: String,
    },
}

impl AttendanceDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AttendanceDecision::Accepted { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AttendanceDecision::Accepted { .. } => None,
            AttendanceDecision::Rejected { failure_kind, .. } => Some(*failure_kind),
        }
    }

    pub fn status(&self) -> Option<AttendanceStatus> {
        match self {
            AttendanceDecision::Accepted { status, .. } => Some(*status),
            AttendanceDecision::Rejected { .. } => None,
        }
    }
}
