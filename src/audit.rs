//! Audit trail for attendance decisions.
//!
//! Identity mismatches and duplicate submissions are potential fraud and are
//! recorded as their own event types. Every event is logged; when a NATS
//! client is configured it is also published as JSON on
//! `{audit_subject}.{event_type}`.

use crate::config::AttendanceConfig;
use crate::error::FailureKind;
use crate::types::AttendanceStatus;
use async_nats::Client as NatsClient;
use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    IdentityMismatch {
        subject_id: String,
        session_id: String,
        /// The value that was scanned, not the identity it was compared with.
        scanned_identity: String,
        token_fingerprint: String,
        timestamp: i64,
    },
    DuplicateAttendance {
        subject_id: String,
        session_id: String,
        existing_record_id: Uuid,
        existing_status: AttendanceStatus,
        timestamp: i64,
    },
    AttendanceRecorded {
        record_id: Uuid,
        subject_id: String,
        session_id: String,
        status: AttendanceStatus,
        is_within_radius: bool,
        distance_meters: f64,
        latency_ms: u64,
        timestamp: i64,
    },
    AttendanceRejected {
        subject_id: Option<String>,
        session_id: Option<String>,
        failure_kind: FailureKind,
        stage: String,
        latency_ms: u64,
        timestamp: i64,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IdentityMismatch { .. } => "identity_mismatch",
            Self::DuplicateAttendance { .. } => "duplicate_attendance",
            Self::AttendanceRecorded { .. } => "attendance_recorded",
            Self::AttendanceRejected { .. } => "attendance_rejected",
        }
    }

    /// Fraud signals, as opposed to ordinary decision records.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            Self::IdentityMismatch { .. } | Self::DuplicateAttendance { .. }
        )
    }
}

/// Destination for audit events. Recording never fails the request.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Logs every event and optionally publishes it to NATS.
pub struct AuditTrail {
    nats_client: Option<NatsClient>,
    audit_subject: String,
}

impl AuditTrail {
    pub fn new(nats_client: Option<NatsClient>, audit_subject: impl Into<String>) -> Self {
        Self {
            nats_client,
            audit_subject: audit_subject.into(),
        }
    }

    /// Log-only trail.
    pub fn log_only(audit_subject: impl Into<String>) -> Self {
        Self::new(None, audit_subject)
    }

    /// Connect to NATS when `nats_url` is configured. A failed connection
    /// degrades to a log-only trail.
    pub async fn from_config(config: &AttendanceConfig) -> Self {
        let Some(url) = config.nats_url.as_deref() else {
            return Self::log_only(config.audit_subject.clone());
        };

        match async_nats::connect(url).await {
            Ok(client) => {
                info!("Audit events will be published to NATS at {}", url);
                Self::new(Some(client), config.audit_subject.clone())
            }
            Err(e) => {
                warn!(
                    "Failed to connect to NATS at {}: {}. Audit events are logged only",
                    url, e
                );
                Self::log_only(config.audit_subject.clone())
            }
        }
    }

    pub fn subject_for(&self, event: &AuditEvent) -> String {
        format!("{}.{}", self.audit_subject, event.event_type())
    }

    pub async fn publish_event(&self, event: &AuditEvent) {
        if let Some(ref client) = self.nats_client {
            match serde_json::to_vec(event) {
                Ok(payload) => {
                    if let Err(e) = client.publish(self.subject_for(event), payload.into()).await {
                        error!("Failed to publish audit event: {}", e);
                    }
                }
                Err(e) => error!("Failed to serialize audit event: {}", e),
            }
        }
    }

    pub fn log_event(&self, event: &AuditEvent) {
        match event {
            AuditEvent::IdentityMismatch {
                subject_id,
                session_id,
                scanned_identity,
                token_fingerprint,
                ..
            } => {
                warn!(
                    "IDENTITY_MISMATCH subject={} session={} scanned={} token={}",
                    subject_id, session_id, scanned_identity, token_fingerprint
                );
            }
            AuditEvent::DuplicateAttendance {
                subject_id,
                session_id,
                existing_record_id,
                existing_status,
                ..
            } => {
                warn!(
                    "DUPLICATE_ATTENDANCE subject={} session={} existing_record={} existing_status={}",
                    subject_id, session_id, existing_record_id, existing_status
                );
            }
            AuditEvent::AttendanceRecorded {
                record_id,
                subject_id,
                session_id,
                status,
                is_within_radius,
                distance_meters,
                latency_ms,
                ..
            } => {
                info!(
                    "ATTENDANCE_RECORDED record={} subject={} session={} status={} within_radius={} distance_m={:.1} latency_ms={}",
                    record_id, subject_id, session_id, status, is_within_radius, distance_meters, latency_ms
                );
            }
            AuditEvent::AttendanceRejected {
                subject_id,
                session_id,
                failure_kind,
                stage,
                latency_ms,
                ..
            } => {
                info!(
                    "ATTENDANCE_REJECTED subject={} session={} kind={} stage={} latency_ms={}",
                    subject_id.as_deref().unwrap_or("-"),
                    session_id.as_deref().unwrap_or("-"),
                    failure_kind,
                    stage,
                    latency_ms
                );
            }
        }
    }
}

#[async_trait]
impl AuditSink for AuditTrail {
    async fn record(&self, event: AuditEvent) {
        self.log_event(&event);
        self.publish_event(&event).await;
    }
}

/// Keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    pub async fn events_of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().await.push(event);
    }
}

/// Wall-clock latency of one verification pass, reported in audit events.
pub struct RequestTimer(Instant);

impl RequestTimer {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Milliseconds since `start`, saturating at `u64::MAX`.
    pub fn latency_ms(&self) -> u64 {
        u64::try_from(self.0.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
