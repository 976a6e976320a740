//! Attempt persistence.
//!
//! The engine talks to storage only through [`AttemptStore`]; hosts plug in
//! their own database. [`MemoryStore`] keeps everything in a `Vec` and is
//! what the CLI and the tests use.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::evaluate::apply_feedback;
use crate::model::{Attempt, Feedback, PageId, UserId};

/// Storage for learner attempts.
pub trait AttemptStore: Send {
    /// Persist a new attempt.
    fn record(&mut self, attempt: Attempt) -> Result<(), StoreError>;

    /// Attempts by `user` on `page` during `retry`, oldest first.
    fn attempts_for(&self, user: UserId, page: PageId, retry: u32) -> Vec<&Attempt>;

    /// Every attempt by `user` during `retry`, oldest first.
    fn attempts_by_user(&self, user: UserId, retry: u32) -> Vec<&Attempt>;

    fn all(&self) -> &[Attempt];

    /// Grade a stored attempt. Grading again replaces the earlier verdict.
    fn attach_feedback(&mut self, attempt: Uuid, feedback: Feedback)
        -> Result<&Attempt, StoreError>;
}

/// In-memory attempt store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    attempts: Vec<Attempt>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn into_attempts(self) -> Vec<Attempt> {
        self.attempts
    }
}

impl From<Vec<Attempt>> for MemoryStore {
    fn from(attempts: Vec<Attempt>) -> Self {
        Self { attempts }
    }
}

impl AttemptStore for MemoryStore {
    fn record(&mut self, attempt: Attempt) -> Result<(), StoreError> {
        if self.attempts.iter().any(|a| a.id == attempt.id) {
            return Err(StoreError::DuplicateAttempt(attempt.id));
        }
        tracing::debug!(
            attempt = %attempt.id,
            page = %attempt.page,
            user = %attempt.user,
            correct = attempt.correct,
            "recorded attempt"
        );
        self.attempts.push(attempt);
        Ok(())
    }

    fn attempts_for(&self, user: UserId, page: PageId, retry: u32) -> Vec<&Attempt> {
        self.attempts
            .iter()
            .filter(|a| a.user == user && a.page == page && a.retry == retry)
            .collect()
    }

    fn attempts_by_user(&self, user: UserId, retry: u32) -> Vec<&Attempt> {
        self.attempts
            .iter()
            .filter(|a| a.user == user && a.retry == retry)
            .collect()
    }

    fn all(&self) -> &[Attempt] {
        &self.attempts
    }

    fn attach_feedback(
        &mut self,
        attempt: Uuid,
        feedback: Feedback,
    ) -> Result<&Attempt, StoreError> {
        let stored = self
            .attempts
            .iter_mut()
            .find(|a| a.id == attempt)
            .ok_or(StoreError::UnknownAttempt(attempt))?;
        apply_feedback(stored, feedback);
        Ok(stored)
    }
}
