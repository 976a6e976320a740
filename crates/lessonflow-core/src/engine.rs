//! Request orchestration: one learner moving through one lesson.
//!
//! [`LessonEngine`] is stateless apart from the lesson it borrows. All
//! per-learner state lives in a [`Session`] that the caller keeps between
//! requests, so sessions can be persisted or moved freely.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::evaluate::{AttemptContext, Evaluation, Evaluator, Submission};
use crate::model::{Attempt, Destination, Lesson, LessonId, Page, PageId, UserId};
use crate::navigation::{LearnerContext, Navigator};
use crate::statistics::{lesson_grade, Grade};
use crate::store::AttemptStore;

/// A learner's position in a lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub lesson: LessonId,
    pub learner: LearnerContext,
    /// `None` once the end of the lesson was reached.
    current: Option<PageId>,
    /// Pages displayed, in order, repeats included.
    pub path: Vec<PageId>,
}

impl Session {
    pub fn current(&self) -> Option<PageId> {
        self.current
    }

    pub fn is_finished(&self) -> bool {
        self.current.is_none()
    }
}

/// Result of one submission.
#[derive(Debug, Clone)]
pub struct Step {
    pub evaluation: Evaluation,
    pub destination: Destination,
    /// The attempt recorded for this submission, if the page records them.
    pub attempt: Option<Uuid>,
}

pub struct LessonEngine<'l> {
    lesson: &'l Lesson,
}

impl<'l> LessonEngine<'l> {
    pub fn new(lesson: &'l Lesson) -> Self {
        Self { lesson }
    }

    pub fn lesson(&self) -> &'l Lesson {
        self.lesson
    }

    /// Open a session on the lesson's first page.
    pub fn start(&self, user: UserId, retry: u32, is_manager: bool) -> Session {
        let head = self.lesson.graph.head().id;
        let mut learner = LearnerContext::new(user, retry).with_manager(is_manager);
        learner.mark_seen(head);
        tracing::debug!(lesson = %self.lesson.id, %user, retry, "session started");
        Session {
            id: Uuid::new_v4(),
            lesson: self.lesson.id,
            learner,
            current: Some(head),
            path: vec![head],
        }
    }

    /// The page the session is currently on.
    pub fn current_page(&self, session: &Session) -> Result<&'l Page, EngineError> {
        let id = session.current.ok_or(EngineError::Finished)?;
        Ok(self.lesson.graph.page(id)?)
    }

    /// Evaluate `submission` against the current page, record the attempt
    /// and move the session to wherever the answer leads.
    ///
    /// On any error the session stays where it is and nothing is recorded.
    pub fn submit<S, R>(
        &self,
        session: &mut Session,
        submission: &Submission,
        store: &mut S,
        rng: &mut R,
    ) -> Result<Step, EngineError>
    where
        S: AttemptStore + ?Sized,
        R: Rng + ?Sized,
    {
        let page = self.current_page(session)?;
        let caps = page.kind.capabilities();
        let user = session.learner.user;
        let retry = session.learner.retry;

        let retry_count = if caps.records_attempt {
            store.attempts_for(user, page.id, retry).len() as u32
        } else {
            0
        };
        let ctx = AttemptContext::new(&self.lesson.settings, retry_count);
        let evaluation = Evaluator::new(&self.lesson.graph).evaluate(page, submission, &ctx)?;

        // Navigate on a copy so a broken jump leaves no trace in the
        // session or the store.
        let mut learner = session.learner.clone();
        let destination = Navigator::new(&self.lesson.graph).resolve_jump(
            evaluation.jump(),
            page.id,
            &mut learner,
            rng,
        )?;

        let mut attempt_id = None;
        if let (Evaluation::Scored(outcome), true) = (&evaluation, caps.records_attempt) {
            let attempt = Attempt {
                id: Uuid::new_v4(),
                lesson: self.lesson.id,
                page: page.id,
                user,
                answer: outcome.answer,
                user_answer: outcome.user_answer.clone(),
                correct: outcome.correct,
                score: outcome.score,
                retry,
                time_seen: Utc::now(),
                graded: outcome.graded,
                feedback: None,
            };
            attempt_id = Some(attempt.id);
            store.record(attempt)?;
        }

        session.learner = learner;
        session.current = destination.page();
        if let Destination::Page(next) = destination {
            session.path.push(next);
        }
        tracing::debug!(
            page = %page.id,
            jump = %evaluation.jump(),
            %destination,
            "submission handled"
        );

        Ok(Step {
            evaluation,
            destination,
            attempt: attempt_id,
        })
    }

    /// The learner's grade so far for the session's retry.
    pub fn grade<S: AttemptStore + ?Sized>(&self, session: &Session, store: &S) -> Grade {
        lesson_grade(
            self.lesson,
            store.all(),
            session.learner.user,
            session.learner.retry,
        )
    }
}
