//! Attendance verification core.
//!
//! Decides whether a "mark attendance" submission is genuine and, if so,
//! records exactly one attendance record for the (subject, session) pair.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌────────────────────┐
//! │TokenVerifier │──▶│ IdentityMatcher │──▶│ EligibilityChecker │
//! │   (HS256)    │   │  (ABC/123456)   │   │ (window + cohort)  │
//! └──────────────┘   └─────────────────┘   └────────────────────┘
//!                                                    │
//!        ┌───────────────────────────────────────────┘
//!        ▼
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │DuplicateGuard│──▶│ ProximityChecker │──▶│ StatusClassifier │
//! │ (pre-check)  │   │   (haversine)    │   │ (present / late) │
//! └──────────────┘   └──────────────────┘   └──────────────────┘
//!        │                                           │
//!        ▼                                           ▼
//! ┌───────────────────────┐                 ┌─────────────────┐
//! │ AttendanceStore       │◀────────────────│ DuplicateGuard  │
//! │ (memory / redis)      │   insert-if-    │   (commit)      │
//! └───────────────────────┘   absent        └─────────────────┘
//! ```
//!
//! [`AttendanceOrchestrator`] drives the stages in that order. Sessions and
//! subjects come from read-only collaborators ([`SessionDirectory`],
//! [`SubjectDirectory`]); decisions and fraud signals go to an [`AuditSink`].
//!
//! # Usage
//!
//! ```ignore
//! use attendance_core::*;
//!
//! let config = AttendanceConfig::from_env()?;
//! let audit = Arc::new(AuditTrail::from_config(&config).await);
//! let store = Arc::new(RedisAttendanceStore::open(&config.redis_url)?);
//!
//! let orchestrator = AttendanceOrchestrator::new(
//!     &config,
//!     sessions,
//!     subjects,
//!     store,
//!     audit,
//!     Arc::new(SystemClock),
//! )?;
//!
//! let decision = orchestrator.mark_attendance(&request).await;
//! ```

pub mod audit;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod directory;
pub mod eligibility;
pub mod error;
pub mod geo;
pub mod identity;
pub mod orchestrator;
pub mod proximity;
pub mod store;
pub mod token;
pub mod types;

pub use audit::{AuditEvent, AuditSink, AuditTrail, RecordingAuditSink, RequestTimer};
pub use classifier::StatusClassifier;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AttendanceConfig;
pub use directory::{InMemoryDirectory, SessionDirectory, SubjectDirectory};
pub use eligibility::EligibilityChecker;
pub use error::{
    ConfigError, CoordinateError, DirectoryError, DuplicateError, EligibilityError, FailureKind,
    IdentityError, Rejection, SessionError, StoreError, TokenError,
};
pub use geo::{distance_meters, Coordinates};
pub use identity::{IdentityMatcher, ScannedIdentity};
pub use orchestrator::{AttendanceOrchestrator, Stage};
pub use proximity::{ProximityChecker, ProximityResult};
pub use store::{
    AttendanceStore, DuplicateGuard, InsertOutcome, MemoryAttendanceStore, RedisAttendanceStore,
    Reservation,
};
pub use token::{token_fingerprint, ClaimSet, TokenVerifier};
pub use types::{
    AttendanceDecision, AttendanceRecord, AttendanceStatus, CohortId, GroupId,
    MarkAttendanceRequest, RecordSummary, SessionId, SessionSnapshot, SubjectEligibilitySnapshot,
    SubjectId,
};
