//! Session reports with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::Session;
use crate::model::{Attempt, Lesson, LessonId, PageId, UserId};
use crate::statistics::{lesson_grade, page_statistics, Grade, PageStats};

/// Everything that happened in one play-through of a lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Unique report identifier.
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub lesson: LessonSummary,
    pub user: UserId,
    pub retry: u32,
    /// Pages displayed, in order, repeats included.
    pub path: Vec<PageId>,
    pub attempts: Vec<Attempt>,
    pub grade: Grade,
    pub pages: Vec<PageStats>,
    /// The learner reached the end of the lesson.
    pub finished: bool,
}

/// Summary of a lesson (without its pages).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonSummary {
    pub id: LessonId,
    pub name: String,
    pub page_count: usize,
}

impl SessionReport {
    /// Build a report for `session` from the attempts it produced.
    pub fn from_session(lesson: &Lesson, session: &Session, attempts: &[Attempt]) -> Self {
        let user = session.learner.user;
        let retry = session.learner.retry;
        let own: Vec<Attempt> = attempts
            .iter()
            .filter(|a| a.user == user && a.retry == retry && a.lesson == lesson.id)
            .cloned()
            .collect();
        Self {
            id: session.id,
            created_at: Utc::now(),
            lesson: LessonSummary {
                id: lesson.id,
                name: lesson.name.clone(),
                page_count: lesson.graph.len(),
            },
            user,
            retry,
            path: session.path.clone(),
            grade: lesson_grade(lesson, &own, user, retry),
            pages: page_statistics(lesson, &own),
            attempts: own,
            finished: session.is_finished(),
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SessionReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}
