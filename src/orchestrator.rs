//! The "mark attendance" pipeline.
//!
//! A request moves through a fixed sequence of stages:
//!
//! ```text
//! TokenCheck -> IdentityCheck -> SessionCheck -> EligibilityCheck -> DuplicateCheck
//!   -> CoordinateValidation -> ProximityCheck -> Classify -> Persist
//! ```
//!
//! The first failing stage produces a `Rejected` decision and no later stage
//! runs. Only `Persist` writes, so a rejection never leaves a record behind.
//! Directory lookups, the duplicate pre-check and audit emission share one
//! deadline per request. The final write is only started while time remains,
//! and once started its outcome is awaited so the decision matches the store.

use crate::audit::{AuditEvent, AuditSink, RequestTimer};
use crate::classifier::StatusClassifier;
use crate::clock::Clock;
use crate::config::AttendanceConfig;
use crate::directory::{SessionDirectory, SubjectDirectory};
use crate::eligibility::EligibilityChecker;
use crate::error::{
    ConfigError, DuplicateError, EligibilityError, FailureKind, IdentityError, Rejection,
    StoreError,
};
use crate::geo::Coordinates;
use crate::identity::{IdentityMatcher, ScannedIdentity};
use crate::proximity::ProximityChecker;
use crate::store::{AttendanceStore, DuplicateGuard};
use crate::token::{token_fingerprint, TokenVerifier};
use crate::types::{
    AttendanceDecision, AttendanceRecord, AttendanceStatus, MarkAttendanceRequest,
    RecordSummary, SessionId, SubjectId,
};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Floor for audit emission when the request budget is already spent.
const MIN_AUDIT_BUDGET: Duration = Duration::from_millis(50);

/// Pipeline stage, used in logs and audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TokenCheck,
    IdentityCheck,
    SessionCheck,
    EligibilityCheck,
    DuplicateCheck,
    CoordinateValidation,
    ProximityCheck,
    Classify,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TokenCheck => "token_check",
            Stage::IdentityCheck => "identity_check",
            Stage::SessionCheck => "session_check",
            Stage::EligibilityCheck => "eligibility_check",
            Stage::DuplicateCheck => "duplicate_check",
            Stage::CoordinateValidation => "coordinate_validation",
            Stage::ProximityCheck => "proximity_check",
            Stage::Classify => "classify",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    rejection: Rejection,
}

impl StageFailure {
    fn new(stage: Stage, rejection: impl Into<Rejection>) -> Self {
        Self {
            stage,
            rejection: rejection.into(),
        }
    }

    fn transient(stage: Stage) -> Self {
        Self::new(stage, Rejection::transient())
    }
}

/// What is known about the request so far, for logs and audit events.
#[derive(Debug, Default)]
struct Trace {
    subject_id: Option<SubjectId>,
    session_id: Option<SessionId>,
}

struct Accepted {
    summary: RecordSummary,
    is_within_radius: bool,
    distance_meters: f64,
}

/// Runs attendance verification requests.
///
/// Holds only read-only configuration and shared collaborators, so one
/// instance can serve any number of concurrent requests.
pub struct AttendanceOrchestrator {
    verifier: TokenVerifier,
    identity: IdentityMatcher,
    eligibility: EligibilityChecker,
    proximity: ProximityChecker,
    classifier: StatusClassifier,
    guard: DuplicateGuard,
    sessions: Arc<dyn SessionDirectory>,
    subjects: Arc<dyn SubjectDirectory>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
}

impl AttendanceOrchestrator {
    pub fn new(
        config: &AttendanceConfig,
        sessions: Arc<dyn SessionDirectory>,
        subjects: Arc<dyn SubjectDirectory>,
        store: Arc<dyn AttendanceStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            verifier: TokenVerifier::new(&config.signing_secret),
            identity: IdentityMatcher::new(),
            eligibility: EligibilityChecker::new(),
            proximity: ProximityChecker::new(config.radius_meters),
            classifier: StatusClassifier::new(config.grace_fraction),
            guard: DuplicateGuard::new(store),
            sessions,
            subjects,
            audit,
            clock,
            request_timeout: config.request_timeout,
        })
    }

    /// Verify a submission and, if every check passes, persist one record.
    pub async fn mark_attendance(&self, request: &MarkAttendanceRequest) -> AttendanceDecision {
        let timer = RequestTimer::start();
        let now = self.clock.now();
        let deadline = Instant::now() + self.request_timeout;
        let fingerprint = token_fingerprint(&request.raw_token);
        let mut trace = Trace::default();

        let outcome = self
            .run(request, now, deadline, &fingerprint, &mut trace)
            .await;
        let latency_ms = timer.latency_ms();

        match outcome {
            Ok(accepted) => {
                let subject_id = trace.subject_id.map(|s| s.to_string()).unwrap_or_default();
                let session_id = trace.session_id.map(|s| s.to_string()).unwrap_or_default();
                info!(
                    "Attendance accepted: subject={} session={} status={} within_radius={} distance_m={:.1} latency_ms={}",
                    subject_id,
                    session_id,
                    accepted.summary.status,
                    accepted.is_within_radius,
                    accepted.distance_meters,
                    latency_ms
                );
                self.emit(
                    AuditEvent::AttendanceRecorded {
                        record_id: accepted.summary.record_id,
                        subject_id,
                        session_id,
                        status: accepted.summary.status,
                        is_within_radius: accepted.is_within_radius,
                        distance_meters: accepted.distance_meters,
                        latency_ms,
                        timestamp: now.timestamp(),
                    },
                    deadline,
                )
                .await;

                AttendanceDecision::Accepted {
                    record_id: accepted.summary.record_id,
                    status: accepted.summary.status,
                    is_within_radius: accepted.is_within_radius,
                    recorded_at: accepted.summary.recorded_at,
                    distance_meters: accepted.distance_meters,
                }
            }
            Err(StageFailure { stage, rejection }) => {
                warn!(
                    "Attendance rejected at {}: kind={} token={} detail={} latency_ms={}",
                    stage, rejection.kind, fingerprint, rejection.detail, latency_ms
                );
                self.emit(
                    AuditEvent::AttendanceRejected {
                        subject_id: trace.subject_id.map(|s| s.to_string()),
                        session_id: trace.session_id.map(|s| s.to_string()),
                        failure_kind: rejection.kind,
                        stage: stage.to_string(),
                        latency_ms,
                        timestamp: now.timestamp(),
                    },
                    deadline,
                )
                .await;

                AttendanceDecision::Rejected {
                    failure_kind: rejection.kind,
                    detail: rejection.detail,
                }
            }
        }
    }

    async fn run(
        &self,
        request: &MarkAttendanceRequest,
        now: DateTime<Utc>,
        deadline: Instant,
        fingerprint: &str,
        trace: &mut Trace,
    ) -> Result<Accepted, StageFailure> {
        // TokenCheck
        let claims = self
            .verifier
            .verify(&request.raw_token, now)
            .map_err(|e| StageFailure::new(Stage::TokenCheck, e))?;
        trace.subject_id = Some(claims.subject_id.clone());
        trace.session_id = Some(claims.session_id.clone());

        // IdentityCheck: format first, then the bound identity of the token's subject.
        let scanned = ScannedIdentity::parse(&request.scanned_identity)
            .map_err(|e| StageFailure::new(Stage::IdentityCheck, e))?;
        let subject = bounded(
            deadline,
            Stage::IdentityCheck,
            self.subjects.subject(&claims.subject_id),
        )
        .await?
        .map_err(|e| {
            error!("Subject lookup for {} failed: {}", claims.subject_id, e);
            StageFailure::transient(Stage::IdentityCheck)
        })?
        .ok_or_else(|| {
            StageFailure::new(
                Stage::IdentityCheck,
                EligibilityError::SubjectNotFound {
                    subject_id: claims.subject_id.to_string(),
                },
            )
        })?;
        if let Err(e) = self.identity.match_bound(&scanned, &subject.bound_identity) {
            if e == IdentityError::Mismatch {
                self.emit(
                    AuditEvent::IdentityMismatch {
                        subject_id: claims.subject_id.to_string(),
                        session_id: claims.session_id.to_string(),
                        scanned_identity: scanned.to_string(),
                        token_fingerprint: fingerprint.to_string(),
                        timestamp: now.timestamp(),
                    },
                    deadline,
                )
                .await;
            }
            return Err(StageFailure::new(Stage::IdentityCheck, e));
        }

        // SessionCheck
        let session = bounded(
            deadline,
            Stage::SessionCheck,
            self.sessions.session(&claims.session_id),
        )
        .await?
        .map_err(|e| {
            error!("Session lookup for {} failed: {}", claims.session_id, e);
            StageFailure::transient(Stage::SessionCheck)
        })?;
        let session = self
            .eligibility
            .check_session(&claims.session_id, session.as_ref(), now)
            .map_err(|e| StageFailure::new(Stage::SessionCheck, e))?;

        // EligibilityCheck
        self.eligibility
            .check_subject(&subject, session)
            .map_err(|e| StageFailure::new(Stage::EligibilityCheck, e))?;

        // DuplicateCheck
        let reservation = match bounded(
            deadline,
            Stage::DuplicateCheck,
            self.guard
                .check_and_reserve(&claims.subject_id, &claims.session_id),
        )
        .await?
        {
            Ok(reservation) => reservation,
            Err(e) => {
                return Err(self
                    .duplicate_failure(Stage::DuplicateCheck, e, trace, now, deadline)
                    .await)
            }
        };

        // CoordinateValidation
        let position = Coordinates::new(request.latitude, request.longitude)
            .map_err(|e| StageFailure::new(Stage::CoordinateValidation, e))?;
        let anchor = Coordinates::new(session.anchor_latitude, session.anchor_longitude)
            .map_err(|e| {
                error!(
                    "Session {} has an unusable anchor position: {}",
                    session.session_id, e
                );
                StageFailure::new(
                    Stage::CoordinateValidation,
                    Rejection::new(
                        FailureKind::InvalidCoordinates,
                        "session anchor position is not configured",
                    ),
                )
            })?;

        // ProximityCheck
        let proximity = self.proximity.check(&position, &anchor);
        debug!(
            "Subject {} is {:.1} m from the anchor of session {} (radius {} m)",
            claims.subject_id,
            proximity.distance_meters,
            session.session_id,
            self.proximity.radius_meters()
        );

        // Classify
        let status: AttendanceStatus = self.classifier.classify(
            proximity.within_radius,
            now,
            session.window_start,
            session.window_end,
        );

        // Persist
        let record = reservation.into_record(
            now,
            position.latitude(),
            position.longitude(),
            status,
            proximity.within_radius,
        );
        // The write is atomic once issued, so its outcome is awaited rather than timed out.
        ensure_budget(deadline, Stage::Persist)?;
        let summary = match self.guard.commit(record).await {
            Ok(summary) => summary,
            Err(e) => {
                return Err(self
                    .duplicate_failure(Stage::Persist, e, trace, now, deadline)
                    .await)
            }
        };

        Ok(Accepted {
            summary,
            is_within_radius: proximity.within_radius,
            distance_meters: proximity.distance_meters,
        })
    }

    async fn duplicate_failure(
        &self,
        stage: Stage,
        error: DuplicateError,
        trace: &Trace,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> StageFailure {
        match error {
            DuplicateError::AlreadyRecorded(existing) => {
                self.emit(
                    AuditEvent::DuplicateAttendance {
                        subject_id: trace
                            .subject_id
                            .as_ref()
                            .map(|s| s.to_string())
                            .unwrap_or_default(),
                        session_id: trace
                            .session_id
                            .as_ref()
                            .map(|s| s.to_string())
                            .unwrap_or_default(),
                        existing_record_id: existing.record_id,
                        existing_status: existing.status,
                        timestamp: now.timestamp(),
                    },
                    deadline,
                )
                .await;
                StageFailure::new(
                    stage,
                    Rejection::new(
                        FailureKind::DuplicateAttendance,
                        DuplicateError::AlreadyRecorded(existing).to_string(),
                    ),
                )
            }
            DuplicateError::Store(e) => {
                error!("Attendance store failed during {}: {}", stage, e);
                StageFailure::transient(stage)
            }
        }
    }

    /// Hand `event` to the sink within the remaining budget, never less than
    /// `MIN_AUDIT_BUDGET`. A sink that does not finish in time loses the event.
    async fn emit(&self, event: AuditEvent, deadline: Instant) {
        let event_type = event.event_type();
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .max(MIN_AUDIT_BUDGET);
        if tokio::time::timeout(budget, self.audit.record(event))
            .await
            .is_err()
        {
            error!(
                "Audit sink did not accept {} event within {} ms",
                event_type,
                budget.as_millis()
            );
        }
    }

    /// Existing record for a pair, if any.
    pub async fn find_record(
        &self,
        subject_id: &SubjectId,
        session_id: &SessionId,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        self.guard.store().find(subject_id, session_id).await
    }

    /// Every record of a session, oldest first.
    pub async fn records_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.guard.store().records_for_session(session_id).await
    }
}

/// Fail with a transient error if `deadline` has already passed.
fn ensure_budget(deadline: Instant, stage: Stage) -> Result<(), StageFailure> {
    if Instant::now() >= deadline {
        warn!("Request deadline exceeded before {}", stage);
        return Err(StageFailure::transient(stage));
    }
    Ok(())
}

/// Await `fut` until `deadline`. Running out of time is a transient failure.
async fn bounded<F: Future>(
    deadline: Instant,
    stage: Stage,
    fut: F,
) -> Result<F::Output, StageFailure> {
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(output) => Ok(output),
        Err(_) => {
            warn!("Request deadline exceeded during {}", stage);
            Err(StageFailure::transient(stage))
        }
    }
}
