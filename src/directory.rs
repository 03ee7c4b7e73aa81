//! Read-only collaborators that own sessions and subject accounts.
//!
//! The core never writes through these traits. Implementations wrap whatever
//! catalog and accounts services the deployment provides.

use crate::error::DirectoryError;
use crate::types::{SessionId, SessionSnapshot, SubjectEligibilitySnapshot, SubjectId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Source of session snapshots.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// `Ok(None)` when the session does not exist.
    async fn session(&self, session_id: &SessionId)
        -> Result<Option<SessionSnapshot>, DirectoryError>;
}

/// Source of subject eligibility snapshots.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    /// `Ok(None)` when the subject does not exist.
    async fn subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Option<SubjectEligibilitySnapshot>, DirectoryError>;
}

/// In-process directory for tests and local setups.
///
/// Can simulate an outage or a slow backend.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    sessions: RwLock<HashMap<SessionId, SessionSnapshot>>,
    subjects: RwLock<HashMap<SubjectId, SubjectEligibilitySnapshot>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_session(&self, session: SessionSnapshot) {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
    }

    pub async fn put_subject(&self, subject: SubjectEligibilitySnapshot) {
        self.subjects
            .write()
            .await
            .insert(subject.subject_id.clone(), subject);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every lookup by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn simulate_backend(&self) -> Result<(), DirectoryError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable(
                "in-memory directory marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionDirectory for InMemoryDirectory {
    async fn session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionSnapshot>, DirectoryError> {
        self.simulate_backend().await?;
        Ok(self.sessions.read().await.get(session_id).cloned())
    }
}

#[async_trait]
impl SubjectDirectory for InMemoryDirectory {
    async fn subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Option<SubjectEligibilitySnapshot>, DirectoryError> {
        self.simulate_backend().await?;
        Ok(self.subjects.read().await.get(subject_id).cloned())
    }
}
