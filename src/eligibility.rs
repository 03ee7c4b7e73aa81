//! Session state and subject eligibility checks.

use crate::error::{EligibilityError, SessionError};
use crate::types::{SessionId, SessionSnapshot, SubjectEligibilitySnapshot};
use chrono::{DateTime, Utc};
use log::debug;

/// Validates that a session is open and that a subject may attend it.
#[derive(Debug, Default, Clone, Copy)]
pub struct EligibilityChecker;

impl EligibilityChecker {
    pub fn new() -> Self {
        Self
    }

    /// Check the session state at `now`.
    ///
    /// The window is half-open: `window_start` is accepted, `window_end` is not.
    /// A cancelled session is reported as cancelled regardless of its window.
    pub fn check_session<'a>(
        &self,
        session_id: &SessionId,
        session: Option<&'a SessionSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<&'a SessionSnapshot, SessionError> {
        let session = session.ok_or_else(|| SessionError::NotFound {
            session_id: session_id.to_string(),
        })?;

        if session.is_cancelled {
            return Err(SessionError::Cancelled);
        }
        if now < session.window_start {
            return Err(SessionError::NotStarted {
                starts_at: session.window_start.to_rfc3339(),
            });
        }
        if now >= session.window_end {
            return Err(SessionError::Ended {
                ended_at: session.window_end.to_rfc3339(),
            });
        }

        Ok(session)
    }

    /// Check that `subject` is active and targeted by `session`.
    ///
    /// A session without a cohort target admits every subject of its group;
    /// with a target, the subject's cohort must equal it.
    pub fn check_subject(
        &self,
        subject: &SubjectEligibilitySnapshot,
        session: &SessionSnapshot,
    ) -> Result<(), EligibilityError> {
        if !subject.is_active {
            return Err(EligibilityError::SubjectInactive);
        }

        if subject.group_id != session.group_id {
            debug!(
                "Subject {} is in group {}, session {} targets group {}",
                subject.subject_id, subject.group_id, session.session_id, session.group_id
            );
            return Err(EligibilityError::CohortMismatch {
                reason: "subject is not in the session's group".to_string(),
            });
        }

        if let Some(target) = &session.cohort_target_id {
            if subject.cohort_id.as_ref() != Some(target) {
                debug!(
                    "Subject {} cohort {:?} does not match session {} target {}",
                    subject.subject_id, subject.cohort_id, session.session_id, target
                );
                return Err(EligibilityError::CohortMismatch {
                    reason: "subject is not in the cohort targeted by the session".to_string(),
                });
            }
        }

        Ok(())
    }
}
