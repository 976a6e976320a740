//! Answer evaluation per page kind.
//!
//! The evaluator turns a learner's submission into an [`Outcome`]: whether it
//! was correct, the score earned, the response text to show and the jump to
//! follow. It never resolves jumps itself; that is the navigator's job.

use serde::{Deserialize, Serialize};

use crate::cloze;
use crate::error::EvaluationError;
use crate::graph::PageGraph;
use crate::model::{
    Answer, AnswerId, Attempt, Feedback, Jump, LessonSettings, Page, PageKind, ScoringMode,
};

const RESPONSE_SEPARATOR: &str = "\n";

/// An uploaded recording or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// What the learner sent for a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    Choice(AnswerId),
    Choices(Vec<AnswerId>),
    Fills(Vec<String>),
    Text(String),
    Media(MediaRef),
    Continue,
}

impl Submission {
    fn label(&self) -> &'static str {
        match self {
            Submission::Choice(_) => "choice",
            Submission::Choices(_) => "choices",
            Submission::Fills(_) => "fills",
            Submission::Text(_) => "text",
            Submission::Media(_) => "media",
            Submission::Continue => "continue",
        }
    }
}

/// Per-request evaluation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    /// Attempts already recorded on this page during the current retry.
    pub retry_count: u32,
    pub max_attempts: u32,
    pub scoring: ScoringMode,
    pub partial_credit: bool,
}

impl AttemptContext {
    pub fn new(settings: &LessonSettings, retry_count: u32) -> Self {
        Self {
            retry_count,
            max_attempts: settings.max_attempts,
            scoring: settings.scoring,
            partial_credit: settings.partial_credit,
        }
    }

    pub fn max_attempts_reached(&self) -> bool {
        self.max_attempts > 0 && self.retry_count >= self.max_attempts
    }
}

/// The scored result of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub correct: bool,
    pub score: f64,
    pub response: String,
    pub jump: Jump,
    /// The answer record that decided the outcome.
    pub answer: Option<AnswerId>,
    /// Raw submission kept for review or manual grading.
    pub user_answer: Option<String>,
    /// `false` until a grader has looked at a manually graded submission.
    pub graded: bool,
}

impl Outcome {
    fn structural(jump: Jump, answer: Option<AnswerId>) -> Self {
        Self {
            correct: false,
            score: 0.0,
            response: String::new(),
            jump,
            answer,
            user_answer: None,
            graded: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Evaluation {
    Scored(Outcome),
    /// The learner used up the page's attempts; continue to the next page
    /// without scoring.
    MaxAttemptsReached { jump: Jump },
}

impl Evaluation {
    pub fn jump(&self) -> Jump {
        match self {
            Evaluation::Scored(outcome) => outcome.jump,
            Evaluation::MaxAttemptsReached { jump } => *jump,
        }
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Evaluation::Scored(outcome) => Some(outcome),
            Evaluation::MaxAttemptsReached { .. } => None,
        }
    }
}

pub struct Evaluator<'g> {
    graph: &'g PageGraph,
}

impl<'g> Evaluator<'g> {
    pub fn new(graph: &'g PageGraph) -> Self {
        Self { graph }
    }

    pub fn evaluate(
        &self,
        page: &Page,
        submission: &Submission,
        ctx: &AttemptContext,
    ) -> Result<Evaluation, EvaluationError> {
        let caps = page.kind.capabilities();
        if caps.records_attempt && ctx.max_attempts_reached() {
            tracing::debug!(page = %page.id, retries = ctx.retry_count, "max attempts reached");
            let jump = page.next.map_or(Jump::EndOfLesson, Jump::Page);
            return Ok(Evaluation::MaxAttemptsReached { jump });
        }

        let outcome = if caps.is_marker {
            structural(page, submission, caps.takes_choice)?
        } else {
            match page.kind {
                PageKind::TrueFalse => self.single_choice(page, submission, ctx)?,
                PageKind::MultiChoice if page.options.multi_answer => {
                    self.multi_choice(page, submission, ctx)?
                }
                PageKind::MultiChoice => self.single_choice(page, submission, ctx)?,
                PageKind::Cloze => self.cloze(page, submission, ctx)?,
                _ if caps.manual_graded => self.manual(page, submission)?,
                _ => return Err(EvaluationError::Unsupported(page.kind)),
            }
        };
        Ok(Evaluation::Scored(outcome))
    }

    /// Whether choosing `answer` counts as correct.
    pub fn is_correct(&self, page: &Page, answer: &Answer, scoring: ScoringMode) -> bool {
        match scoring {
            ScoringMode::Custom => answer.score > 0.0,
            ScoringMode::Standard => match answer.jump {
                Jump::ThisPage | Jump::PreviousPage | Jump::RandomBranch => false,
                Jump::NextPage
                | Jump::EndOfLesson
                | Jump::UnseenPageInBranch
                | Jump::RandomPageInBranch
                | Jump::ClusterJump => true,
                Jump::Page(target) => self.graph.is_forward(page.id, target),
            },
        }
    }

    fn points(&self, page: &Page, answer: &Answer, scoring: ScoringMode) -> f64 {
        match scoring {
            ScoringMode::Custom => answer.score,
            ScoringMode::Standard => pass_fail(self.is_correct(page, answer, scoring)),
        }
    }

    fn single_choice(
        &self,
        page: &Page,
        submission: &Submission,
        ctx: &AttemptContext,
    ) -> Result<Outcome, EvaluationError> {
        let id = match submission {
            Submission::Choice(id) => *id,
            Submission::Continue => return Err(EvaluationError::NoAnswer(page.id)),
            other => return Err(wrong_kind(page, other)),
        };
        let answer = answer_of(page, id)?;
        Ok(Outcome {
            correct: self.is_correct(page, answer, ctx.scoring),
            score: self.points(page, answer, ctx.scoring),
            response: answer.response.clone(),
            jump: answer.jump,
            answer: Some(answer.id),
            user_answer: None,
            graded: true,
        })
    }

    fn multi_choice(
        &self,
        page: &Page,
        submission: &Submission,
        ctx: &AttemptContext,
    ) -> Result<Outcome, EvaluationError> {
        let submitted: Vec<AnswerId> = match submission {
            Submission::Choices(ids) => ids.clone(),
            Submission::Choice(id) => vec![*id],
            Submission::Continue => Vec::new(),
            other => return Err(wrong_kind(page, other)),
        };
        let mut selected: Vec<&Answer> = Vec::with_capacity(submitted.len());
        for id in submitted {
            let answer = answer_of(page, id)?;
            if !selected.iter().any(|a| a.id == id) {
                selected.push(answer);
            }
        }
        if selected.is_empty() {
            return Err(EvaluationError::NoAnswer(page.id));
        }

        let is_correct = |a: &Answer| self.is_correct(page, a, ctx.scoring);
        let correct: Vec<&Answer> = page.answers.iter().filter(|a| is_correct(a)).collect();
        let first_wrong = page.answers.iter().find(|a| !is_correct(a));
        let hits: Vec<&Answer> = selected.iter().copied().filter(|a| is_correct(a)).collect();
        let user_answer = selected
            .iter()
            .map(|a| a.id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let wrong_jump = first_wrong.map_or(Jump::ThisPage, |a| a.jump);
        let wrong_id = first_wrong.map(|a| a.id);

        let exact = !correct.is_empty()
            && hits.len() == correct.len()
            && selected.len() == correct.len();
        if exact {
            let score = match ctx.scoring {
                ScoringMode::Custom => hits.iter().map(|a| a.score).sum::<f64>(),
                ScoringMode::Standard => 1.0,
            };
            // Exact matches list responses in answer order.
            let response = join_responses(correct.iter().copied());
            return Ok(Outcome {
                correct: true,
                score,
                response,
                jump: correct[0].jump,
                answer: Some(correct[0].id),
                user_answer: Some(user_answer),
                graded: true,
            });
        }

        let (score, response) = if hits.is_empty() {
            let response = first_wrong.map(|a| a.response.clone()).unwrap_or_default();
            (0.0, response)
        } else {
            let score = if ctx.partial_credit && ctx.scoring == ScoringMode::Custom {
                selected.iter().map(|a| a.score).filter(|s| *s > 0.0).sum::<f64>()
            } else {
                0.0
            };
            // Partial matches list responses in the order they were submitted.
            (score, join_responses(hits.iter().copied()))
        };
        Ok(Outcome {
            correct: false,
            score,
            response,
            jump: wrong_jump,
            answer: wrong_id,
            user_answer: Some(user_answer),
            graded: true,
        })
    }

    fn cloze(
        &self,
        page: &Page,
        submission: &Submission,
        ctx: &AttemptContext,
    ) -> Result<Outcome, EvaluationError> {
        let values: &[String] = match submission {
            Submission::Fills(values) => values,
            Submission::Continue => &[],
            other => return Err(wrong_kind(page, other)),
        };
        if values.iter().all(|v| v.trim().is_empty()) {
            return Err(EvaluationError::NoAnswer(page.id));
        }

        let gaps = cloze::match_gaps(page, values);
        let all_matched = !gaps.is_empty() && gaps.iter().all(|g| g.matched);
        let score = match ctx.scoring {
            ScoringMode::Custom => gaps
                .iter()
                .filter(|g| g.matched)
                .filter_map(|g| g.answer)
                .map(|a| a.score)
                .sum::<f64>(),
            ScoringMode::Standard => pass_fail(all_matched),
        };

        let deciding = if all_matched {
            gaps.first()
        } else {
            gaps.iter().find(|g| !g.matched)
        };
        let deciding = deciding.and_then(|g| g.answer);
        let fallback = if all_matched {
            Jump::NextPage
        } else {
            Jump::ThisPage
        };

        Ok(Outcome {
            correct: all_matched,
            score,
            response: deciding.map(|a| a.response.clone()).unwrap_or_default(),
            jump: deciding.map_or(fallback, |a| a.jump),
            answer: deciding.map(|a| a.id),
            user_answer: serde_json::to_string(values).ok(),
            graded: true,
        })
    }

    fn manual(&self, page: &Page, submission: &Submission) -> Result<Outcome, EvaluationError> {
        let stored = match (page.kind, submission) {
            (PageKind::Audio, Submission::Media(media)) => media.file_name.trim().to_string(),
            (PageKind::Essay | PageKind::Description, Submission::Text(text)) => {
                text.trim().to_string()
            }
            (_, Submission::Continue) => String::new(),
            (_, other) => return Err(wrong_kind(page, other)),
        };
        if stored.is_empty() {
            return Err(EvaluationError::NoAnswer(page.id));
        }
        let first = page.answers.first();
        Ok(Outcome {
            correct: false,
            score: 0.0,
            response: first.map(|a| a.response.clone()).unwrap_or_default(),
            jump: first.map_or(Jump::NextPage, |a| a.jump),
            answer: first.map(|a| a.id),
            user_answer: Some(stored),
            graded: false,
        })
    }
}

/// Record a grader's verdict on a manually graded attempt. Grading again
/// replaces the previous verdict.
pub fn apply_feedback(attempt: &mut Attempt, feedback: Feedback) {
    attempt.score = feedback.score;
    attempt.correct = feedback.score > 0.0;
    attempt.graded = true;
    attempt.feedback = Some(feedback);
}

/// Structural pages grade nothing. Choice pages follow the picked answer,
/// the rest follow their first answer or fall through to the next page.
fn structural(
    page: &Page,
    submission: &Submission,
    takes_choice: bool,
) -> Result<Outcome, EvaluationError> {
    match submission {
        Submission::Choice(id) if takes_choice => {
            let arm = answer_of(page, *id)?;
            Ok(Outcome::structural(arm.jump, Some(arm.id)))
        }
        Submission::Continue if !takes_choice => {
            let first = page.answers.first();
            Ok(Outcome::structural(
                first.map_or(Jump::NextPage, |a| a.jump),
                first.map(|a| a.id),
            ))
        }
        other => Err(wrong_kind(page, other)),
    }
}

fn answer_of(page: &Page, id: AnswerId) -> Result<&Answer, EvaluationError> {
    page.answer(id).ok_or(EvaluationError::UnknownAnswer {
        page: page.id,
        answer: id,
    })
}

fn wrong_kind(page: &Page, submission: &Submission) -> EvaluationError {
    EvaluationError::WrongSubmissionKind {
        page: page.id,
        kind: page.kind,
        submitted: submission.label(),
    }
}

fn pass_fail(correct: bool) -> f64 {
    if correct {
        1.0
    } else {
        0.0
    }
}

fn join_responses<'a>(answers: impl Iterator<Item = &'a Answer>) -> String {
    answers
        .map(|a| a.response.as_str())
        .filter(|r| !r.is_empty())
        .collect::<Vec<_>>()
        .join(RESPONSE_SEPARATOR)
}
