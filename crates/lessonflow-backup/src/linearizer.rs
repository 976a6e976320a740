//! Turns the flat page stream of a legacy backup into a linked page chain.
//!
//! Legacy pages carry no neighbour links, so a page can only be written once
//! the page after it has been read. The first two pages are held until a
//! third arrives; after that every new page releases its predecessor, and
//! [`Linearizer::finish`] writes whatever is still pending with a `0` next
//! link.

use std::collections::{HashSet, VecDeque};

use lessonflow_core::model::{Jump, PageKind};
use serde::Serialize;

use crate::error::{BackupError, LegacyFormatAnomaly};
use crate::legacy::{LegacyAttempt, LegacyPage};
use crate::writer::TagWriter;

/// Type code used by old backups for essay pages.
const OBSOLETE_ESSAY_CODE: u32 = 10;

/// What a conversion produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionReport {
    pub lesson_name: Option<String>,
    pub pages: usize,
    pub answers: usize,
    pub attempts: usize,
    pub feedback: usize,
    pub anomalies: Vec<LegacyFormatAnomaly>,
}

pub struct Linearizer<W: TagWriter> {
    writer: W,
    pending: VecDeque<LegacyPage>,
    ids: HashSet<u64>,
    last_written: Option<u64>,
    report: ConversionReport,
}

impl<W: TagWriter> Linearizer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pending: VecDeque::with_capacity(2),
            ids: HashSet::new(),
            last_written: None,
            report: ConversionReport::default(),
        }
    }

    /// Patch a page's quirks and queue it, writing whatever now has both
    /// neighbours known.
    pub fn push(&mut self, mut page: LegacyPage) -> Result<(), BackupError> {
        if page.id == 0 {
            return Err(BackupError::Integrity(format!(
                "page without PAGEID after page {}",
                self.last_seen().unwrap_or(0)
            )));
        }
        if !self.ids.insert(page.id) {
            return Err(BackupError::Integrity(format!("duplicate page id {}", page.id)));
        }
        for anomaly in patch_quirks(&mut page) {
            tracing::warn!("{anomaly}");
            self.report.anomalies.push(anomaly);
        }

        if self.last_written.is_none() {
            if self.pending.len() == 2 {
                let first = self.pop()?;
                let second = self.pop()?;
                self.write_page(&first, None, Some(second.id))?;
                self.write_page(&second, Some(first.id), Some(page.id))?;
            }
        } else {
            let previous = self.pop()?;
            self.write_page(&previous, self.last_written, Some(page.id))?;
        }
        self.pending.push_back(page);
        Ok(())
    }

    /// Write the pages still pending and return the writer and report.
    pub fn finish(mut self) -> Result<(W, ConversionReport), BackupError> {
        while let Some(page) = self.pending.pop_front() {
            let next = self.pending.front().map(|p| p.id);
            self.write_page(&page, self.last_written, next)?;
        }
        Ok((self.writer, self.report))
    }

    pub fn report(&self) -> &ConversionReport {
        &self.report
    }

    fn last_seen(&self) -> Option<u64> {
        self.pending.back().map(|p| p.id).or(self.last_written)
    }

    fn pop(&mut self) -> Result<LegacyPage, BackupError> {
        self.pending
            .pop_front()
            .ok_or_else(|| BackupError::Integrity("page buffer underflow".into()))
    }

    fn write_page(
        &mut self,
        page: &LegacyPage,
        prev: Option<u64>,
        next: Option<u64>,
    ) -> Result<(), BackupError> {
        let w = &mut self.writer;
        let id = page.id.to_string();
        w.begin_tag("page", &[("id", &id)])?;
        w.full_tag("prevpageid", &prev.unwrap_or(0).to_string())?;
        w.full_tag("nextpageid", &next.unwrap_or(0).to_string())?;
        w.full_tag("qtype", &page.qtype.to_string())?;
        w.full_tag("qoption", flag(page.qoption))?;
        w.full_tag("layout", flag(page.layout))?;
        w.full_tag("display", flag(page.display))?;
        w.full_tag("title", &page.title)?;
        w.full_tag("contents", &page.contents)?;

        w.begin_tag("answers", &[])?;
        for answer in &page.answers {
            let answer_id = answer.id.to_string();
            w.begin_tag("answer", &[("id", &answer_id)])?;
            w.full_tag("jumpto", &answer.jump_to.to_string())?;
            w.full_tag("score", &answer.score.to_string())?;
            w.full_tag("answer_text", &answer.text)?;
            w.full_tag("response", &answer.response)?;
            write_attempts(w, &answer.attempts)?;
            w.end_tag("answer")?;
        }
        w.end_tag("answers")?;
        if !page.attempts.is_empty() {
            write_attempts(w, &page.attempts)?;
        }
        w.end_tag("page")?;

        self.report.pages += 1;
        self.report.answers += page.answers.len();
        self.report.attempts += page.attempt_count();
        self.report.feedback += page.feedback_count();
        self.last_written = Some(page.id);
        tracing::debug!(page = page.id, ?prev, ?next, "wrote page");
        Ok(())
    }
}

fn write_attempts<W: TagWriter>(w: &mut W, attempts: &[LegacyAttempt]) -> Result<(), BackupError> {
    w.begin_tag("attempts", &[])?;
    for attempt in attempts {
        let id = attempt.id.to_string();
        w.begin_tag("attempt", &[("id", &id)])?;
        w.full_tag("userid", &attempt.user_id.to_string())?;
        w.full_tag("retry", &attempt.retry.to_string())?;
        w.full_tag("correct", flag(attempt.correct))?;
        w.full_tag("useranswer", &attempt.user_answer)?;
        w.full_tag("timeseen", &attempt.time_seen.to_string())?;
        if let Some(feedback) = &attempt.feedback {
            w.begin_tag("feedback", &[])?;
            w.full_tag("teacherid", &feedback.teacher_id.to_string())?;
            w.full_tag("text", &feedback.text)?;
            w.full_tag("score", &feedback.score.to_string())?;
            w.full_tag("timegraded", &feedback.time_graded.to_string())?;
            w.full_tag("file", feedback.file.as_deref().unwrap_or(""))?;
            w.end_tag("feedback")?;
        }
        w.end_tag("attempt")?;
    }
    w.end_tag("attempts")
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Fix the historical format quirks of one page in place.
pub fn patch_quirks(page: &mut LegacyPage) -> Vec<LegacyFormatAnomaly> {
    let mut anomalies = Vec::new();

    if page.qtype == OBSOLETE_ESSAY_CODE {
        let to = PageKind::Essay.type_code();
        anomalies.push(LegacyFormatAnomaly::ObsoleteTypeCode {
            page: page.id,
            from: page.qtype,
            to,
        });
        page.qtype = to;
    }

    match PageKind::from_type_code(page.qtype) {
        None => anomalies.push(LegacyFormatAnomaly::UnknownTypeCode {
            page: page.id,
            code: page.qtype,
        }),
        Some(PageKind::Cloze) => {
            for answer in &mut page.answers {
                if let Some(text) = legacy_cloze_text(&answer.text) {
                    answer.text = text;
                    anomalies.push(LegacyFormatAnomaly::LegacyClozeEncoding {
                        page: page.id,
                        answer: answer.id,
                    });
                }
            }
        }
        // Old matching pages stored the correct/wrong jumps on answers 3
        // and 4; current pages read them from answers 1 and 2.
        Some(PageKind::Matching) if page.answers.len() > 3 => {
            for (to, from) in [(0, 2), (1, 3)] {
                page.answers[to].jump_to = page.answers[from].jump_to;
                page.answers[to].score = page.answers[from].score;
                page.answers[from].jump_to = Jump::THIS_PAGE;
            }
            anomalies.push(LegacyFormatAnomaly::MatchingJumpSlots {
                page: page.id,
                answers: page.answers.len(),
            });
        }
        Some(_) => {}
    }
    anomalies
}

/// Rewrite `a|b|=c` (with `=` possibly written as `&#61;`) as `a, b, =c`.
fn legacy_cloze_text(text: &str) -> Option<String> {
    if !text.contains('|') && !text.contains("&#61;") {
        return None;
    }
    let decoded = text.replace("&#61;", "=");
    Some(
        decoded
            .split('|')
            .map(str::trim)
            .filter(|choice| !choice.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::{LegacyAnswer, LegacyFeedback};

    #[derive(Debug, Clone, PartialEq)]
    enum Tag {
        Begin(String, Vec<(String, String)>),
        End(String),
        Full(String, String),
    }

    #[derive(Default)]
    struct Recorder {
        tags: Vec<Tag>,
    }

    impl TagWriter for Recorder {
        fn begin_tag(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), BackupError> {
            let attributes = attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.tags.push(Tag::Begin(name.into(), attributes));
            Ok(())
        }

        fn end_tag(&mut self, name: &str) -> Result<(), BackupError> {
            self.tags.push(Tag::End(name.into()));
            Ok(())
        }

        fn full_tag(&mut self, name: &str, value: &str) -> Result<(), BackupError> {
            self.tags.push(Tag::Full(name.into(), value.into()));
            Ok(())
        }
    }

    impl Recorder {
        /// `(id, prev, next)` of every written page, in output order.
        fn links(&self) -> Vec<(String, String, String)> {
            let mut links = Vec::new();
            for (i, tag) in self.tags.iter().enumerate() {
                if let Tag::Begin(name, attributes) = tag {
                    if name == "page" {
                        let field = |offset: usize| match &self.tags[i + offset] {
                            Tag::Full(_, value) => value.clone(),
                            other => panic!("expected a field, got {other:?}"),
                        };
                        links.push((attributes[0].1.clone(), field(1), field(2)));
                    }
                }
            }
            links
        }

        fn page_count(&self) -> usize {
            self.tags
                .iter()
                .filter(|t| matches!(t, Tag::End(name) if name == "page"))
                .count()
        }
    }

    fn page(id: u64, qtype: u32, answers: usize) -> LegacyPage {
        LegacyPage {
            id,
            qtype,
            title: format!("Page {id}"),
            answers: (0..answers as u64)
                .map(|i| LegacyAnswer {
                    id: id * 10 + i,
                    jump_to: -(i as i64) - 1,
                    score: i as f64,
                    text: format!("answer {i}"),
                    ..LegacyAnswer::default()
                })
                .collect(),
            ..LegacyPage::default()
        }
    }

    fn link(id: u64, prev: u64, next: u64) -> (String, String, String) {
        (id.to_string(), prev.to_string(), next.to_string())
    }

    #[test]
    fn writes_only_once_both_neighbours_are_known() {
        let mut linearizer = Linearizer::new(Recorder::default());
        linearizer.push(page(1, 3, 2)).unwrap();
        linearizer.push(page(2, 20, 5)).unwrap();
        assert_eq!(linearizer.writer.page_count(), 0);
        linearizer.push(page(3, 3, 2)).unwrap();
        assert_eq!(linearizer.writer.page_count(), 2);
        linearizer.push(page(4, 3, 2)).unwrap();
        assert_eq!(linearizer.writer.page_count(), 3);
        assert!(linearizer.pending.len() <= 2);

        let (recorder, report) = linearizer.finish().unwrap();
        assert_eq!(
            recorder.links(),
            vec![link(1, 0, 2), link(2, 1, 3), link(3, 2, 4), link(4, 3, 0)]
        );
        assert_eq!(report.pages, 4);
        assert_eq!(report.answers, 11);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn branch_table_answers_are_left_alone() {
        let mut linearizer = Linearizer::new(Recorder::default());
        for p in [page(1, 3, 2), page(2, 20, 5), page(3, 3, 2), page(4, 3, 2)] {
            linearizer.push(p).unwrap();
        }
        let (recorder, _) = linearizer.finish().unwrap();
        let jumps: Vec<String> = recorder
            .tags
            .iter()
            .skip_while(|t| !matches!(t, Tag::Begin(name, a) if name == "page" && a[0].1 == "2"))
            .take_while(|t| !matches!(t, Tag::End(name) if name == "page"))
            .filter_map(|t| match t {
                Tag::Full(name, value) if name == "jumpto" => Some(value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(jumps, vec!["-1", "-2", "-3", "-4", "-5"]);
    }

    #[test]
    fn short_lessons() {
        let (recorder, _) = Linearizer::new(Recorder::default()).finish().unwrap();
        assert!(recorder.tags.is_empty());

        let mut one = Linearizer::new(Recorder::default());
        one.push(page(7, 9, 1)).unwrap();
        let (recorder, _) = one.finish().unwrap();
        assert_eq!(recorder.links(), vec![link(7, 0, 0)]);

        let mut two = Linearizer::new(Recorder::default());
        two.push(page(7, 9, 1)).unwrap();
        two.push(page(8, 9, 1)).unwrap();
        let (recorder, _) = two.finish().unwrap();
        assert_eq!(recorder.links(), vec![link(7, 0, 8), link(8, 7, 0)]);

        let mut three = Linearizer::new(Recorder::default());
        for id in [1, 2, 3] {
            three.push(page(id, 9, 1)).unwrap();
        }
        let (recorder, _) = three.finish().unwrap();
        assert_eq!(
            recorder.links(),
            vec![link(1, 0, 2), link(2, 1, 3), link(3, 2, 0)]
        );
    }

    #[test]
    fn duplicate_and_missing_ids_abort() {
        let mut linearizer = Linearizer::new(Recorder::default());
        linearizer.push(page(1, 3, 1)).unwrap();
        let err = linearizer.push(page(1, 3, 1)).unwrap_err();
        assert!(matches!(err, BackupError::Integrity(msg) if msg.contains("duplicate page id 1")));
        assert!(matches!(
            linearizer.push(page(0, 3, 1)),
            Err(BackupError::Integrity(_))
        ));
    }

    #[test]
    fn matching_jump_slots_move_up() {
        let mut p = page(5, 5, 4);
        let anomalies = patch_quirks(&mut p);
        assert_eq!(
            anomalies,
            vec![LegacyFormatAnomaly::MatchingJumpSlots { page: 5, answers: 4 }]
        );
        let jumps: Vec<i64> = p.answers.iter().map(|a| a.jump_to).collect();
        assert_eq!(jumps, vec![-3, -4, 0, 0]);
        assert_eq!(p.answers[0].score, 2.0);
        assert_eq!(p.answers[1].score, 3.0);

        let mut small = page(6, 5, 3);
        assert!(patch_quirks(&mut small).is_empty());
        assert_eq!(small.answers[0].jump_to, -1);
    }

    #[test]
    fn obsolete_essay_code_is_remapped() {
        let mut p = page(5, 10, 1);
        let anomalies = patch_quirks(&mut p);
        assert_eq!(p.qtype, 9);
        assert_eq!(
            anomalies,
            vec![LegacyFormatAnomaly::ObsoleteTypeCode { page: 5, from: 10, to: 9 }]
        );
    }

    #[test]
    fn unknown_codes_are_kept_and_reported() {
        let mut p = page(5, 42, 0);
        let anomalies = patch_quirks(&mut p);
        assert_eq!(p.qtype, 42);
        assert_eq!(anomalies[0].page(), 5);
        assert!(matches!(anomalies[0], LegacyFormatAnomaly::UnknownTypeCode { code: 42, .. }));
    }

    #[test]
    fn legacy_cloze_answers_are_rewritten() {
        let mut p = page(5, 13, 2);
        p.answers[0].text = "red|blue|&#61;green".into();
        p.answers[1].text = "=cat, dog".into();
        let anomalies = patch_quirks(&mut p);
        assert_eq!(p.answers[0].text, "red, blue, =green");
        assert_eq!(p.answers[1].text, "=cat, dog");
        assert_eq!(
            anomalies,
            vec![LegacyFormatAnomaly::LegacyClozeEncoding { page: 5, answer: 50 }]
        );
    }

    #[test]
    fn attempts_and_feedback_are_counted() {
        let mut p = page(1, 9, 1);
        p.attempts.push(LegacyAttempt {
            id: 3,
            user_id: 4,
            feedback: Some(LegacyFeedback {
                teacher_id: 2,
                score: 1.0,
                ..LegacyFeedback::default()
            }),
            ..LegacyAttempt::default()
        });
        p.answers[0].attempts.push(LegacyAttempt::default());

        let mut linearizer = Linearizer::new(Recorder::default());
        linearizer.push(p).unwrap();
        let (recorder, report) = linearizer.finish().unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.feedback, 1);
        assert!(recorder
            .tags
            .contains(&Tag::Full("teacherid".into(), "2".into())));
    }
}
