//! In-process attendance store keyed by (session, subject).

use super::{AttendanceStore, InsertOutcome};
use crate::error::StoreError;
use crate::types::{AttendanceRecord, SessionId, SubjectId};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;

type PairKey = (SessionId, SubjectId);

/// In-process store. The write lock makes `insert_if_absent` atomic.
#[derive(Debug, Default)]
pub struct MemoryAttendanceStore {
    records: RwLock<HashMap<PairKey, AttendanceRecord>>,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn find(
        &self,
        subject_id: &SubjectId,
        session_id: &SessionId,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(&(session_id.clone(), subject_id.clone()))
            .cloned())
    }

    async fn insert_if_absent(
        &self,
        record: AttendanceRecord,
    ) -> Result<InsertOutcome, StoreError> {
        let key = (record.session_id().clone(), record.subject_id().clone());
        let mut records = self.records.write().await;
        match records.entry(key) {
            Entry::Occupied(existing) => Ok(InsertOutcome::AlreadyExists(existing.get().summary())),
            Entry::Vacant(slot) => {
                let summary = record.summary();
                slot.insert(record);
                Ok(InsertOutcome::Inserted(summary))
            }
        }
    }

    async fn records_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let records = self.records.read().await;
        let mut found: Vec<AttendanceRecord> = records
            .iter()
            .filter(|((session, _), _)| session == session_id)
            .map(|(_, record)| record.clone())
            .collect();
        found.sort_by_key(|r| r.recorded_at());
        Ok(found)
    }
}
