//! Error types for attendance verification.
//!
//! Every pipeline stage has its own error enum. Each one collapses onto a
//! single [`FailureKind`], which is the stable identifier handed to callers.

use crate::types::RecordSummary;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable failure identifiers surfaced in a rejected decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedToken,
    InvalidSignature,
    ExpiredToken,
    MissingClaims,
    IdentityFormatInvalid,
    IdentityMismatch,
    SessionNotFound,
    SessionNotStarted,
    SessionEnded,
    SessionCancelled,
    SubjectNotFound,
    SubjectInactive,
    CohortMismatch,
    InvalidCoordinates,
    DuplicateAttendance,
    TransientFailure,
}

impl FailureKind {
    /// Machine-readable identifier, stable across releases.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed_token",
            Self::InvalidSignature => "invalid_signature",
            Self::ExpiredToken => "expired_token",
            Self::MissingClaims => "missing_claims",
            Self::IdentityFormatInvalid => "identity_format_invalid",
            Self::IdentityMismatch => "identity_mismatch",
            Self::SessionNotFound => "session_not_found",
            Self::SessionNotStarted => "session_not_started",
            Self::SessionEnded => "session_ended",
            Self::SessionCancelled => "session_cancelled",
            Self::SubjectNotFound => "subject_not_found",
            Self::SubjectInactive => "subject_inactive",
            Self::CohortMismatch => "cohort_mismatch",
            Self::InvalidCoordinates => "invalid_coordinates",
            Self::DuplicateAttendance => "duplicate_attendance",
            Self::TransientFailure => "transient_failure",
        }
    }

    /// Default end-user text. Never contains internal details.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MalformedToken => "This attendance link is not valid.",
            Self::InvalidSignature => "This attendance link has been altered and cannot be used.",
            Self::ExpiredToken => "This attendance link has expired. Request a new one.",
            Self::MissingClaims => "This attendance link is incomplete.",
            Self::IdentityFormatInvalid => {
                "The scanned ID is not in the expected format (e.g. ABC/123456). Scan again."
            }
            Self::IdentityMismatch => "The scanned ID does not match the owner of this link.",
            Self::SessionNotFound => "This class session does not exist.",
            Self::SessionNotStarted => "This class session has not started yet.",
            Self::SessionEnded => "This class session has already ended.",
            Self::SessionCancelled => "This class session was cancelled.",
            Self::SubjectNotFound => "No student record matches this link.",
            Self::SubjectInactive => "Your student account is not active.",
            Self::CohortMismatch => "You are not enrolled in the group this session targets.",
            Self::InvalidCoordinates => "Your location could not be read. Enable location and retry.",
            Self::DuplicateAttendance => "Attendance for this session is already recorded.",
            Self::TransientFailure => "The service is temporarily unavailable. Please retry.",
        }
    }

    /// Potential fraud or abuse signals that must reach the audit trail.
    pub fn is_audit_worthy(&self) -> bool {
        matches!(self, Self::IdentityMismatch | Self::DuplicateAttendance)
    }

    /// Whether resubmitting the identical request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token verification failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token expired at {expired_at}")]
    Expired { expired_at: i64 },

    #[error("Token is missing required claim: {claim}")]
    MissingClaims { claim: &'static str },
}

impl TokenError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Malformed(_) => FailureKind::MalformedToken,
            Self::InvalidSignature => FailureKind::InvalidSignature,
            Self::Expired { .. } => FailureKind::ExpiredToken,
            Self::MissingClaims { .. } => FailureKind::MissingClaims,
        }
    }
}

/// Physical identity check failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Scanned identity does not match the required format")]
    FormatInvalid,

    #[error("Scanned identity does not match the identity bound to the token")]
    Mismatch,
}

impl IdentityError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::FormatInvalid => FailureKind::IdentityFormatInvalid,
            Self::Mismatch => FailureKind::IdentityMismatch,
        }
    }
}

/// Session state failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("Session opens at {starts_at}")]
    NotStarted { starts_at: String },

    #[error("Session closed at {ended_at}")]
    Ended { ended_at: String },

    #[error("Session has been cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound { .. } => FailureKind::SessionNotFound,
            Self::NotStarted { .. } => FailureKind::SessionNotStarted,
            Self::Ended { .. } => FailureKind::SessionEnded,
            Self::Cancelled => FailureKind::SessionCancelled,
        }
    }
}

/// Subject eligibility failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EligibilityError {
    #[error("Subject not found: {subject_id}")]
    SubjectNotFound { subject_id: String },

    #[error("Subject is not active")]
    SubjectInactive,

    #[error("Subject is not in the group targeted by the session: {reason}")]
    CohortMismatch { reason: String },
}

impl EligibilityError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SubjectNotFound { .. } => FailureKind::SubjectNotFound,
            Self::SubjectInactive => FailureKind::SubjectInactive,
            Self::CohortMismatch { .. } => FailureKind::CohortMismatch,
        }
    }
}

/// Reported position failures.
#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("Coordinates are not finite numbers")]
    NotFinite,

    #[error("Coordinates out of range: latitude {latitude}, longitude {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },

    #[error("Coordinates (0, 0) are a default value, not a real position")]
    Sentinel,
}

impl CoordinateError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::InvalidCoordinates
    }
}

/// Errors from the attendance record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis operation failed: {0}")]
    RedisError(String),

    #[error("Record serialization failed: {0}")]
    SerializationError(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::RedisError(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

/// Duplicate guard failures.
#[derive(Debug, Error)]
pub enum DuplicateError {
    #[error("Attendance already recorded as {} at {}", .0.status, .0.recorded_at)]
    AlreadyRecorded(RecordSummary),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DuplicateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AlreadyRecorded(_) => FailureKind::DuplicateAttendance,
            Self::Store(_) => FailureKind::TransientFailure,
        }
    }
}

/// Errors from the read-only session and subject collaborators.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Terminal state of a rejected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: FailureKind,
    pub detail: String,
}

impl Rejection {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Infrastructure failure. The cause stays in the log.
    pub fn transient() -> Self {
        Self::new(
            FailureKind::TransientFailure,
            "temporary failure while verifying attendance",
        )
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl From<TokenError> for Rejection {
    fn from(e: TokenError) -> Self {
        Rejection::new(e.kind(), e.to_string())
    }
}

impl From<IdentityError> for Rejection {
    fn from(e: IdentityError) -> Self {
        Rejection::new(e.kind(), e.to_string())
    }
}

impl From<SessionError> for Rejection {
    fn from(e: SessionError) -> Self {
        Rejection::new(e.kind(), e.to_string())
    }
}

impl From<EligibilityError> for Rejection {
    fn from(e: EligibilityError) -> Self {
        Rejection::new(e.kind(), e.to_string())
    }
}

impl From<CoordinateError> for Rejection {
    fn from(e: CoordinateError) -> Self {
        Rejection::new(e.kind(), e.to_string())
    }
}
