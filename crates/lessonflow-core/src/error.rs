//! Error types for lesson graphs, answer evaluation and the lesson engine.
//!
//! Graph integrity failures make a lesson unplayable; evaluation errors are
//! recoverable and leave the learner on the current page.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::model::{AnswerId, PageId, PageKind};

/// Which neighbour link of a page is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Prev,
    Next,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Prev => write!(f, "prev"),
            LinkKind::Next => write!(f, "next"),
        }
    }
}

/// The page chain of a lesson is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphIntegrityError {
    #[error("lesson has no pages")]
    Empty,

    #[error("duplicate page id {0}")]
    DuplicatePage(PageId),

    #[error("no head page: every page has a previous page")]
    NoHead,

    #[error("multiple head pages: {0:?}")]
    MultipleHeads(Vec<PageId>),

    #[error("page {page} has a dangling {link} link to {target}")]
    DanglingLink {
        page: PageId,
        link: LinkKind,
        target: PageId,
    },

    #[error("page {page} links to {next} but {next} links back to {back:?}")]
    AsymmetricLink {
        page: PageId,
        next: PageId,
        back: Option<PageId>,
    },

    #[error("cycle in page chain at page {0}")]
    Cycle(PageId),

    #[error("pages not reachable from the head: {0:?}")]
    Unreachable(Vec<PageId>),

    #[error("branch table {0} has no answers")]
    EmptyBranchTable(PageId),

    #[error("unknown page {0}")]
    UnknownPage(PageId),

    #[error("page {page} jumps to missing page {target}")]
    DanglingJump { page: PageId, target: PageId },

    #[error("no branch table with resolvable arms reachable from page {0}")]
    NoBranchArms(PageId),
}

/// A submission could not be evaluated against a page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// Nothing usable was submitted; the page should be shown again.
    #[error("no answer submitted for page {0}")]
    NoAnswer(PageId),

    #[error("answer {answer} does not belong to page {page}")]
    UnknownAnswer { page: PageId, answer: AnswerId },

    #[error("page {page} ({kind}) does not accept a {submitted} submission")]
    WrongSubmissionKind {
        page: PageId,
        kind: PageKind,
        submitted: &'static str,
    },

    #[error("{0} pages cannot be evaluated")]
    Unsupported(PageKind),
}

impl EvaluationError {
    /// Returns `true` when the caller should simply redisplay the page.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EvaluationError::NoAnswer(_) | EvaluationError::UnknownAnswer { .. }
        )
    }
}

/// Attempt persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("attempt {0} already recorded")]
    DuplicateAttempt(Uuid),

    #[error("attempt {0} not found")]
    UnknownAttempt(Uuid),
}

/// Errors raised while driving a learner through a lesson.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphIntegrityError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session has already reached the end of the lesson")]
    Finished,
}
