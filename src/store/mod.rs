//! Attendance record persistence and duplicate prevention.
//!
//! At most one record exists per (subject, session) pair. The pre-check in
//! [`DuplicateGuard::check_and_reserve`] only short-circuits obvious repeats;
//! the guarantee comes from [`AttendanceStore::insert_if_absent`], which every
//! backend implements as a single atomic conditional write.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryAttendanceStore;
pub use redis_store::RedisAttendanceStore;

use crate::error::{DuplicateError, StoreError};
use crate::types::{
    AttendanceRecord, AttendanceStatus, RecordSummary, SessionId, SubjectId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::sync::Arc;

/// Result of a conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(RecordSummary),
    /// Another record for the pair already exists; nothing was written.
    AlreadyExists(RecordSummary),
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find(
        &self,
        subject_id: &SubjectId,
        session_id: &SessionId,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Persist `record` unless a record for its pair exists. Must be atomic
    /// with respect to concurrent callers.
    async fn insert_if_absent(&self, record: AttendanceRecord)
        -> Result<InsertOutcome, StoreError>;

    /// All records of a session, oldest first.
    async fn records_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
}

/// Proof that a pair had no record at pre-check time.
///
/// Not a lock. A concurrent request can still win the write; [`DuplicateGuard::commit`]
/// reports that as a duplicate.
#[derive(Debug)]
pub struct Reservation {
    subject_id: SubjectId,
    session_id: SessionId,
}

impl Reservation {
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Build the record for the reserved pair.
    pub fn into_record(
        self,
        recorded_at: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        status: AttendanceStatus,
        is_within_radius: bool,
    ) -> AttendanceRecord {
        AttendanceRecord::new(
            self.subject_id,
            self.session_id,
            recorded_at,
            latitude,
            longitude,
            status,
            is_within_radius,
        )
    }
}

/// Duplicate pre-check and atomic commit on top of an [`AttendanceStore`].
#[derive(Clone)]
pub struct DuplicateGuard {
    store: Arc<dyn AttendanceStore>,
}

impl DuplicateGuard {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AttendanceStore> {
        &self.store
    }

    pub async fn check_and_reserve(
        &self,
        subject_id: &SubjectId,
        session_id: &SessionId,
    ) -> Result<Reservation, DuplicateError> {
        if let Some(existing) = self.store.find(subject_id, session_id).await? {
            debug!(
                "Pre-check found record {} for subject {} in session {}",
                existing.record_id(),
                subject_id,
                session_id
            );
            return Err(DuplicateError::AlreadyRecorded(existing.summary()));
        }

        Ok(Reservation {
            subject_id: subject_id.clone(),
            session_id: session_id.clone(),
        })
    }

    /// Write `record`. Losing a race to a concurrent request is a duplicate.
    pub async fn commit(&self, record: AttendanceRecord) -> Result<RecordSummary, DuplicateError> {
        let subject_id = record.subject_id().clone();
        let session_id = record.session_id().clone();

        match self.store.insert_if_absent(record).await? {
            InsertOutcome::Inserted(summary) => Ok(summary),
            InsertOutcome::AlreadyExists(existing) => {
                warn!(
                    "Concurrent submission lost the write for subject {} in session {}",
                    subject_id, session_id
                );
                Err(DuplicateError::AlreadyRecorded(existing))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn guard() -> DuplicateGuard {
        DuplicateGuard::new(Arc::new(MemoryAttendanceStore::new()))
    }

    fn reserve_record(reservation: Reservation) -> AttendanceRecord {
        reservation.into_record(Utc::now(), -1.2921, 36.8219, AttendanceStatus::Present, true)
    }

    #[tokio::test]
    async fn test_reserve_then_commit() {
        let guard = guard();
        let subject = SubjectId::new("1024");
        let session = SessionId::new("lec-77");

        let reservation = guard.check_and_reserve(&subject, &session).await.unwrap();
        assert_eq!(reservation.subject_id(), &subject);
        let summary = guard.commit(reserve_record(reservation)).await.unwrap();

        let err = guard.check_and_reserve(&subject, &session).await.unwrap_err();
        match err {
            DuplicateError::AlreadyRecorded(existing) => {
                assert_eq!(existing.record_id, summary.record_id)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lost_race_is_duplicate() {
        let guard = guard();
        let subject = SubjectId::new("1024");
        let session = SessionId::new("lec-77");

        let first = guard.check_and_reserve(&subject, &session).await.unwrap();
        let second = guard.check_and_reserve(&subject, &session).await.unwrap();

        guard.commit(reserve_record(first)).await.unwrap();
        let err = guard.commit(reserve_record(second)).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::DuplicateAttendance);

        let records = guard.store().records_for_session(&session).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_other_pairs_are_independent() {
        let guard = guard();
        let session = SessionId::new("lec-77");

        for subject in ["1", "2", "3"] {
            let reservation = guard
                .check_and_reserve(&SubjectId::new(subject), &session)
                .await
                .unwrap();
            guard.commit(reserve_record(reservation)).await.unwrap();
        }
        let reservation = guard
            .check_and_reserve(&SubjectId::new("1"), &SessionId::new("lec-78"))
            .await
            .unwrap();
        guard.commit(reserve_record(reservation)).await.unwrap();

        assert_eq!(
            guard.store().records_for_session(&session).await.unwrap().len(),
            3
        );
    }
}
