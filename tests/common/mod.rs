#![allow(dead_code)]

use attendance_core::{
    AttendanceConfig, AttendanceOrchestrator, AttendanceStore, CohortId, FixedClock, GroupId,
    InMemoryDirectory, MarkAttendanceRequest, MemoryAttendanceStore, RecordingAuditSink,
    SessionId, SessionSnapshot, SubjectEligibilitySnapshot, SubjectId,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use std::sync::Arc;

pub const SECRET: &str = "integration-test-signing-secret";
pub const ANCHOR_LAT: f64 = -1.2921;
pub const ANCHOR_LON: f64 = 36.8219;

pub const SESSION: &str = "lec-77";
pub const CANCELLED_SESSION: &str = "lec-78";
pub const TARGETED_SESSION: &str = "lab-12";

pub const SUBJECT_A: &str = "1024";
pub const SUBJECT_A_ID: &str = "BCS/234344";
pub const SUBJECT_B: &str = "2048";
pub const SUBJECT_B_ID: &str = "MIT/123456";
pub const INACTIVE_SUBJECT: &str = "3072";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn window_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
}

pub fn window_end() -> DateTime<Utc> {
    window_start() + Duration::hours(2)
}

/// Position `meters` due north of the session anchor.
pub fn north_of_anchor(meters: f64) -> (f64, f64) {
    let delta = (meters / attendance_core::geo::EARTH_RADIUS_METERS).to_degrees();
    (ANCHOR_LAT + delta, ANCHOR_LON)
}

pub fn sign_token(subject: &str, session: &str, expires_at: DateTime<Utc>) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "sub": subject,
            "session_id": session,
            "iat": (window_start() - Duration::hours(1)).timestamp(),
            "exp": expires_at.timestamp(),
        }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn valid_token(subject: &str, session: &str) -> String {
    sign_token(subject, session, window_end() + Duration::hours(1))
}

pub fn request(token: String, scanned: &str, position: (f64, f64)) -> MarkAttendanceRequest {
    MarkAttendanceRequest {
        raw_token: token,
        scanned_identity: scanned.to_string(),
        latitude: position.0,
        longitude: position.1,
    }
}

pub struct Harness {
    pub orchestrator: Arc<AttendanceOrchestrator>,
    pub directory: Arc<InMemoryDirectory>,
    pub audit: Arc<RecordingAuditSink>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryAttendanceStore::new())).await
    }

    pub async fn with_store(store: Arc<dyn AttendanceStore>) -> Self {
        Self::with_store_and_sessions(store, &[SESSION, CANCELLED_SESSION, TARGETED_SESSION]).await
    }

    /// Harness whose regular sessions use the given ids.
    pub async fn with_store_and_sessions(store: Arc<dyn AttendanceStore>, sessions: &[&str]) -> Self {
        init_logging();

        let directory = Arc::new(InMemoryDirectory::new());
        for session_id in sessions {
            let cohort_target_id = if *session_id == TARGETED_SESSION {
                Some(CohortId::new("stream-b"))
            } else {
                None
            };
            directory
                .put_session(SessionSnapshot {
                    session_id: SessionId::new(*session_id),
                    group_id: GroupId::new("BSC-CS"),
                    cohort_target_id,
                    anchor_latitude: ANCHOR_LAT,
                    anchor_longitude: ANCHOR_LON,
                    window_start: window_start(),
                    window_end: window_end(),
                    is_cancelled: *session_id == CANCELLED_SESSION,
                })
                .await;
        }

        for (subject_id, bound_identity, is_active) in [
            (SUBJECT_A, SUBJECT_A_ID, true),
            (SUBJECT_B, SUBJECT_B_ID, true),
            (INACTIVE_SUBJECT, "BCS/100001", false),
        ] {
            directory
                .put_subject(SubjectEligibilitySnapshot {
                    subject_id: SubjectId::new(subject_id),
                    group_id: GroupId::new("BSC-CS"),
                    cohort_id: Some(CohortId::new("stream-a")),
                    is_active,
                    bound_identity: bound_identity.to_string(),
                })
                .await;
        }

        let audit = Arc::new(RecordingAuditSink::new());
        let clock = Arc::new(FixedClock::new(window_start()));
        let orchestrator = AttendanceOrchestrator::new(
            &AttendanceConfig::new(SECRET),
            directory.clone(),
            directory.clone(),
            store,
            audit.clone(),
            clock.clone(),
        )
        .unwrap();

        Self {
            orchestrator: Arc::new(orchestrator),
            directory,
            audit,
            clock,
        }
    }

    pub async fn record_count(&self, session: &str) -> usize {
        self.orchestrator
            .records_for_session(&SessionId::new(session))
            .await
            .unwrap()
            .len()
    }
}
