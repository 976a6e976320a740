//! Lesson grading and per-page answer statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{AnswerId, Attempt, Lesson, Page, PageId, PageKind, ScoringMode, UserId};

/// A learner's grade for one retry of a lesson.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub earned: f64,
    pub possible: f64,
    /// `earned / possible` as a percentage, `0.0` when nothing is possible.
    pub percent: f64,
    pub questions_answered: u32,
    pub correct: u32,
    /// Manually graded pages still waiting for a grader.
    pub pending_manual: u32,
}

/// Highest score a single attempt on `page` can earn under custom scoring.
pub fn best_score(page: &Page) -> f64 {
    let positive = page.answers.iter().map(|a| a.score).filter(|s| *s > 0.0);
    let summed = match page.kind {
        PageKind::Cloze => true,
        PageKind::MultiChoice => page.options.multi_answer,
        _ => false,
    };
    if summed {
        positive.sum()
    } else {
        positive.fold(0.0, f64::max)
    }
}

/// Compute the grade of `user` for `retry`.
///
/// Only the last attempt per question page counts. Under standard scoring
/// every answered page is worth one point and `min_questions` raises the
/// denominator when fewer pages were answered.
pub fn lesson_grade(lesson: &Lesson, attempts: &[Attempt], user: UserId, retry: u32) -> Grade {
    let mut last: BTreeMap<PageId, &Attempt> = BTreeMap::new();
    for attempt in attempts
        .iter()
        .filter(|a| a.user == user && a.retry == retry)
    {
        last.insert(attempt.page, attempt);
    }

    let scoring = lesson.settings.scoring;
    let mut grade = Grade::default();
    for page in lesson.graph.iter() {
        let caps = page.kind.capabilities();
        if !caps.records_attempt {
            continue;
        }
        let Some(attempt) = last.get(&page.id) else {
            continue;
        };
        grade.questions_answered += 1;
        grade.possible += match scoring {
            ScoringMode::Custom => best_score(page),
            ScoringMode::Standard => 1.0,
        };

        if caps.manual_graded && !attempt.graded {
            grade.pending_manual += 1;
            continue;
        }
        if attempt.correct {
            grade.correct += 1;
        }
        grade.earned += match scoring {
            ScoringMode::Custom => attempt.score,
            ScoringMode::Standard if attempt.correct => 1.0,
            ScoringMode::Standard => 0.0,
        };
    }

    if scoring == ScoringMode::Standard {
        grade.possible = grade.possible.max(f64::from(lesson.settings.min_questions));
    }
    if grade.possible > 0.0 {
        grade.percent = grade.earned / grade.possible * 100.0;
    }
    grade
}

/// Answer statistics for one question page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageStats {
    pub page: PageId,
    pub title: String,
    pub kind: PageKind,
    pub attempts: usize,
    pub correct: usize,
    pub average_score: f64,
    /// How often each answer record decided an attempt.
    pub answer_counts: BTreeMap<AnswerId, usize>,
}

impl PageStats {
    pub fn correct_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.correct as f64 / self.attempts as f64
        }
    }
}

/// Statistics for every question page, in chain order.
pub fn page_statistics(lesson: &Lesson, attempts: &[Attempt]) -> Vec<PageStats> {
    lesson
        .graph
        .iter()
        .filter(|p| p.kind.capabilities().records_attempt)
        .map(|page| {
            let on_page: Vec<&Attempt> = attempts.iter().filter(|a| a.page == page.id).collect();
            let mut answer_counts = BTreeMap::new();
            for answer in on_page.iter().filter_map(|a| a.answer) {
                *answer_counts.entry(answer).or_insert(0) += 1;
            }
            let total: f64 = on_page.iter().map(|a| a.score).sum();
            PageStats {
                page: page.id,
                title: page.title.clone(),
                kind: page.kind,
                attempts: on_page.len(),
                correct: on_page.iter().filter(|a| a.correct).count(),
                average_score: if on_page.is_empty() {
                    0.0
                } else {
                    total / on_page.len() as f64
                },
                answer_counts,
            }
        })
        .collect()
}
