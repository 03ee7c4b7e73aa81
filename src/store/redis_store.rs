//! Redis-backed attendance store.
//!
//! Layout:
//! - `attendance:record:{session}:{subject}` holds the record as JSON.
//! - `attendance:session:{session}:subjects` is a set of subjects with a record.
//!
//! Insertion runs as one server-side script so the record and its index entry
//! are written together, and only when the record key is absent.

use super::{AttendanceStore, InsertOutcome};
use crate::error::StoreError;
use crate::types::{AttendanceRecord, SessionId, SubjectId};
use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use redis::AsyncCommands;
use std::sync::Arc;

pub const RECORD_KEY_PREFIX: &str = "attendance:record:";
pub const SESSION_INDEX_PREFIX: &str = "attendance:session:";

/// Returns nil when the record was written, the stored JSON otherwise.
static INSERT_IF_ABSENT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
  redis.call('SADD', KEYS[2], ARGV[2])
  return nil
end
return redis.call('GET', KEYS[1])
",
    )
});

/// Escape `:` so that ids cannot collide across key segments.
fn key_part(id: &str) -> String {
    id.replace('%', "%25").replace(':', "%3A")
}

fn record_key(session_id: &SessionId, subject_id: &SubjectId) -> String {
    format!(
        "{}{}:{}",
        RECORD_KEY_PREFIX,
        key_part(session_id.as_str()),
        key_part(subject_id.as_str())
    )
}

fn session_index_key(session_id: &SessionId) -> String {
    format!(
        "{}{}:subjects",
        SESSION_INDEX_PREFIX,
        key_part(session_id.as_str())
    )
}

#[derive(Clone)]
pub struct RedisAttendanceStore {
    redis_client: Arc<redis::Client>,
}

impl RedisAttendanceStore {
    pub fn new(redis_client: Arc<redis::Client>) -> Self {
        Self { redis_client }
    }

    /// Open a client for `redis_url`. No connection is made until first use.
    pub fn open(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(Arc::new(client)))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self
            .redis_client
            .get_multiplexed_async_connection()
            .await?)
    }
}

#[async_trait]
impl AttendanceStore for RedisAttendanceStore {
    async fn find(
        &self,
        subject_id: &SubjectId,
        session_id: &SessionId,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let json: Option<String> = conn.get(record_key(session_id, subject_id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn insert_if_absent(
        &self,
        record: AttendanceRecord,
    ) -> Result<InsertOutcome, StoreError> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(&record)?;

        let existing: Option<String> = INSERT_IF_ABSENT
            .key(record_key(record.session_id(), record.subject_id()))
            .key(session_index_key(record.session_id()))
            .arg(json)
            .arg(record.subject_id().as_str())
            .invoke_async(&mut conn)
            .await?;

        match existing {
            None => {
                debug!(
                    "Stored record {} for subject {} in session {}",
                    record.record_id(),
                    record.subject_id(),
                    record.session_id()
                );
                Ok(InsertOutcome::Inserted(record.summary()))
            }
            Some(json) => {
                let existing: AttendanceRecord = serde_json::from_str(&json)?;
                Ok(InsertOutcome::AlreadyExists(existing.summary()))
            }
        }
    }

    async fn records_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let subjects: Vec<String> = conn.smembers(session_index_key(session_id)).await?;

        let mut records = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let key = record_key(session_id, &SubjectId::new(subject));
            let json: Option<String> = conn.get(&key).await?;
            if let Some(json) = json {
                records.push(serde_json::from_str::<AttendanceRecord>(&json)?);
            }
        }
        records.sort_by_key(|r| r.recorded_at());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttendanceStatus;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_key_layout() {
        let session = SessionId::new("lec-77");
        let subject = SubjectId::new("1024");
        assert_eq!(
            record_key(&session, &subject),
            "attendance:record:lec-77:1024"
        );
        assert_eq!(
            session_index_key(&session),
            "attendance:session:lec-77:subjects"
        );
    }

    #[test]
    fn test_key_parts_cannot_collide() {
        let a = record_key(&SessionId::new("a:b"), &SubjectId::new("c"));
        let b = record_key(&SessionId::new("a"), &SubjectId::new("b:c"));
        assert_ne!(a, b);
        assert_eq!(key_part("50%:x"), "50%25%3Ax");
    }

    fn redis_store() -> Option<RedisAttendanceStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        RedisAttendanceStore::open(&url).ok()
    }

    #[tokio::test]
    async fn test_insert_if_absent_against_redis() {
        let Some(store) = redis_store() else {
            eprintln!("REDIS_URL not set, skipping");
            return;
        };

        let session = SessionId::new(format!("test-{}", Uuid::new_v4()));
        let subject = SubjectId::new("1024");
        let record = AttendanceRecord::new(
            subject.clone(),
            session.clone(),
            Utc::now(),
            -1.2921,
            36.8219,
            AttendanceStatus::Present,
            true,
        );
        let first_id = record.record_id();

        assert!(matches!(
            store.insert_if_absent(record.clone()).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));

        let again = AttendanceRecord::new(
            subject.clone(),
            session.clone(),
            Utc::now(),
            -1.2921,
            36.8219,
            AttendanceStatus::Late,
            false,
        );
        match store.insert_if_absent(again).await.unwrap() {
            InsertOutcome::AlreadyExists(existing) => assert_eq!(existing.record_id, first_id),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let found = store.find(&subject, &session).await.unwrap().unwrap();
        assert_eq!(found, record);
        let all = store.records_for_session(&session).await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
