//! TOML lesson parser.
//!
//! Loads lessons from TOML files and directories, and validates them.
//!
//! ```toml
//! [lesson]
//! id = 1
//! name = "Photosynthesis"
//! scoring = "custom"
//! max_attempts = 2
//!
//! [[pages]]
//! id = 1
//! kind = "truefalse"
//! title = "Plants need light"
//!
//! [[pages.answers]]
//! text = "True"
//! score = 1
//! jump = "next"
//! ```
//!
//! Pages are chained in listing order unless some page sets `prev` or `next`,
//! in which case the explicit links are used as written.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cloze;
use crate::evaluate::Evaluator;
use crate::graph::PageGraph;
use crate::model::{
    Answer, AnswerId, Jump, Lesson, LessonId, LessonSettings, Page, PageId, PageKind,
    PageOptions, ScoringMode,
};

/// Intermediate TOML structure for parsing lesson files.
#[derive(Debug, Deserialize)]
struct TomlLessonFile {
    lesson: TomlLessonHeader,
    #[serde(default)]
    pages: Vec<TomlPage>,
}

#[derive(Debug, Deserialize)]
struct TomlLessonHeader {
    #[serde(default = "default_lesson_id")]
    id: u64,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    scoring: Option<String>,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    partial_credit: Option<bool>,
    #[serde(default)]
    min_questions: Option<u32>,
}

fn default_lesson_id() -> u64 {
    1
}

/// A value given either by name or by numeric code.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameOrCode {
    Code(i64),
    Name(String),
}

#[derive(Debug, Deserialize)]
struct TomlPage {
    id: u64,
    kind: NameOrCode,
    #[serde(default)]
    title: String,
    #[serde(default)]
    contents: String,
    #[serde(default)]
    prev: Option<u64>,
    #[serde(default)]
    next: Option<u64>,
    #[serde(default)]
    multi_answer: bool,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default)]
    layout: bool,
    #[serde(default)]
    display_in_menu: bool,
    #[serde(default)]
    answers: Vec<TomlAnswer>,
}

#[derive(Debug, Deserialize)]
struct TomlAnswer {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    jump: Option<NameOrCode>,
}

fn parse_kind(kind: NameOrCode) -> Result<PageKind> {
    match kind {
        NameOrCode::Name(name) => name.parse().map_err(|e: String| anyhow::anyhow!("{}", e)),
        NameOrCode::Code(code) => u32::try_from(code)
            .ok()
            .and_then(PageKind::from_type_code)
            .ok_or_else(|| anyhow::anyhow!("unknown page type code: {code}")),
    }
}

fn parse_jump(jump: Option<NameOrCode>) -> Result<Jump> {
    match jump {
        None => Ok(Jump::NextPage),
        Some(NameOrCode::Code(code)) => {
            Jump::try_from(code).map_err(|e: String| anyhow::anyhow!("{}", e))
        }
        Some(NameOrCode::Name(name)) => name.parse().map_err(|e: String| anyhow::anyhow!("{}", e)),
    }
}

fn link(id: Option<u64>) -> Option<PageId> {
    id.filter(|&id| id != 0).map(PageId)
}

/// Parse a single TOML file into a `Lesson`.
pub fn parse_lesson(path: &Path) -> Result<Lesson> {
    parse_lesson_with(path, &LessonSettings::default())
}

/// Like [`parse_lesson`], taking settings the file does not set from
/// `defaults`.
pub fn parse_lesson_with(path: &Path, defaults: &LessonSettings) -> Result<Lesson> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read lesson file: {}", path.display()))?;

    parse_lesson_str_with(&content, path, defaults)
}

/// Parse a TOML string into a `Lesson` (useful for testing).
pub fn parse_lesson_str(content: &str, source_path: &Path) -> Result<Lesson> {
    parse_lesson_str_with(content, source_path, &LessonSettings::default())
}

pub fn parse_lesson_str_with(
    content: &str,
    source_path: &Path,
    defaults: &LessonSettings,
) -> Result<Lesson> {
    let parsed: TomlLessonFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let header = parsed.lesson;
    let scoring = match header.scoring {
        Some(s) => s
            .parse::<ScoringMode>()
            .map_err(|e: String| anyhow::anyhow!("{}", e))?,
        None => defaults.scoring,
    };
    let settings = LessonSettings {
        scoring,
        max_attempts: header.max_attempts.unwrap_or(defaults.max_attempts),
        partial_credit: header.partial_credit.unwrap_or(defaults.partial_credit),
        min_questions: header.min_questions.unwrap_or(defaults.min_questions),
    };

    let explicit_links = parsed
        .pages
        .iter()
        .any(|p| p.prev.is_some() || p.next.is_some());

    let pages = parsed
        .pages
        .into_iter()
        .map(|p| {
            let kind = parse_kind(p.kind).with_context(|| format!("page {}", p.id))?;
            let answers = p
                .answers
                .into_iter()
                .enumerate()
                .map(|(i, a)| {
                    let jump = parse_jump(a.jump)
                        .with_context(|| format!("page {} answer {}", p.id, i + 1))?;
                    let id = match a.id {
                        Some(id) => id,
                        None => p
                            .id
                            .checked_mul(1000)
                            .and_then(|base| base.checked_add(i as u64 + 1))
                            .ok_or_else(|| {
                                anyhow::anyhow!(
                                    "page {} answer {}: page id too large to derive an answer id, set one explicitly",
                                    p.id,
                                    i + 1
                                )
                            })?,
                    };
                    Ok(Answer {
                        id: AnswerId(id),
                        text: a.text,
                        response: a.response,
                        score: a.score,
                        jump,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Page {
                id: PageId(p.id),
                kind,
                title: p.title,
                contents: p.contents,
                prev: link(p.prev),
                next: link(p.next),
                options: PageOptions {
                    multi_answer: p.multi_answer,
                    case_sensitive: p.case_sensitive,
                    layout: p.layout,
                    display_in_menu: p.display_in_menu,
                },
                answers,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let graph = if explicit_links {
        PageGraph::build(pages)
    } else {
        PageGraph::from_sequence(pages)
    }
    .with_context(|| format!("invalid page chain in {}", source_path.display()))?;

    Ok(Lesson {
        id: LessonId(header.id),
        name: header.name,
        description: header.description,
        settings,
        graph,
    })
}

/// Recursively load all `.toml` lesson files from a directory.
pub fn load_lesson_directory(dir: &Path) -> Result<Vec<Lesson>> {
    load_lesson_directory_with(dir, &LessonSettings::default())
}

pub fn load_lesson_directory_with(dir: &Path, defaults: &LessonSettings) -> Result<Vec<Lesson>> {
    let mut lessons = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            lessons.extend(load_lesson_directory_with(&path, defaults)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_lesson_with(&path, defaults) {
                Ok(lesson) => lessons.push(lesson),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(lessons)
}

/// A warning from lesson validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The page concerned (if applicable).
    pub page: Option<PageId>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn page(page: PageId, message: impl Into<String>) -> Self {
        Self {
            page: Some(page),
            message: message.into(),
        }
    }
}

/// Validate a lesson for problems that do not break the page chain but
/// make pages behave unexpectedly.
pub fn validate_lesson(lesson: &Lesson) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let graph = &lesson.graph;
    let evaluator = Evaluator::new(graph);

    let mut answer_ids = HashSet::new();
    for page in graph.iter() {
        for answer in &page.answers {
            if !answer_ids.insert(answer.id) {
                warnings.push(ValidationWarning::page(
                    page.id,
                    format!("duplicate answer id {}", answer.id),
                ));
            }
            if let Jump::Page(target) = answer.jump {
                if !graph.contains(target) {
                    warnings.push(ValidationWarning::page(
                        page.id,
                        format!("answer {} jumps to missing page {target}", answer.id),
                    ));
                }
            }
        }

        let caps = page.kind.capabilities();
        if caps.auto_graded && page.answers.is_empty() {
            warnings.push(ValidationWarning::page(page.id, "question page has no answers"));
        }

        match page.kind {
            PageKind::Matching => {
                warnings.push(ValidationWarning::page(
                    page.id,
                    "matching pages cannot be played and will reject submissions",
                ));
            }
            PageKind::Cloze => {
                let anchors = cloze::find_anchors(&page.contents);
                if anchors.len() != page.answers.len() {
                    warnings.push(ValidationWarning::page(
                        page.id,
                        format!(
                            "{} cloze gaps but {} answers",
                            anchors.len(),
                            page.answers.len()
                        ),
                    ));
                }
                for anchor in &anchors {
                    let resolvable = anchor
                        .answer_index()
                        .is_some_and(|i| i < page.answers.len());
                    if !resolvable {
                        warnings.push(ValidationWarning::page(
                            page.id,
                            format!("cloze gap {} has no answer", anchor.id),
                        ));
                    }
                }
            }
            PageKind::MultiChoice if page.options.multi_answer => {
                let any_correct = page
                    .answers
                    .iter()
                    .any(|a| evaluator.is_correct(page, a, lesson.settings.scoring));
                if !page.answers.is_empty() && !any_correct {
                    warnings.push(ValidationWarning::page(
                        page.id,
                        "multi-answer page has no correct answer",
                    ));
                }
            }
            PageKind::Essay if page.answers.len() > 1 => {
                warnings.push(ValidationWarning::page(
                    page.id,
                    format!(
                        "essay page has {} answers; only the first is used",
                        page.answers.len()
                    ),
                ));
            }
            _ => {}
        }
    }

    let mut open_cluster: Option<PageId> = None;
    for page in graph.iter() {
        match page.kind {
            PageKind::Cluster => {
                if let Some(outer) = open_cluster {
                    warnings.push(ValidationWarning::page(
                        page.id,
                        format!("cluster starts inside cluster {outer}"),
                    ));
                }
                open_cluster = Some(page.id);
            }
            PageKind::EndOfCluster => {
                if open_cluster.take().is_none() {
                    warnings.push(ValidationWarning::page(
                        page.id,
                        "end of cluster without a cluster",
                    ));
                }
            }
            _ => {}
        }
    }
    if let Some(cluster) = open_cluster {
        warnings.push(ValidationWarning::page(
            cluster,
            "cluster has no end of cluster page",
        ));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[lesson]
id = 4
name = "Cells"
description = "A short branching lesson"
scoring = "standard"
max_attempts = 2

[[pages]]
id = 10
kind = "truefalse"
title = "Cells are alive"

[[pages.answers]]
text = "True"
response = "Right."
jump = "next"

[[pages.answers]]
text = "False"
response = "Think again."
jump = 0

[[pages]]
id = 20
kind = "branch-table"
title = "Pick a topic"
layout = true

[[pages.answers]]
id = 201
text = "Membranes"
jump = 30

[[pages]]
id = 30
kind = 13
contents = 'The <a class="cloze" id="cloze-1"></a> keeps the cell together.'

[[pages.answers]]
text = "=membrane, wall"
score = 1
"#;

    #[test]
    fn parse_valid_toml() {
        let lesson = parse_lesson_str(VALID_TOML, &PathBuf::from("cells.toml")).unwrap();
        assert_eq!(lesson.id, LessonId(4));
        assert_eq!(lesson.name, "Cells");
        assert_eq!(lesson.settings.scoring, ScoringMode::Standard);
        assert_eq!(lesson.settings.max_attempts, 2);
        assert_eq!(lesson.graph.len(), 3);

        let tf = lesson.graph.head();
        assert_eq!(tf.id, PageId(10));
        assert_eq!(tf.next, Some(PageId(20)));
        assert_eq!(tf.answers[0].id, AnswerId(10001));
        assert_eq!(tf.answers[1].jump, Jump::ThisPage);

        let bt = lesson.graph.get(PageId(20)).unwrap();
        assert_eq!(bt.kind, PageKind::BranchTable);
        assert!(bt.options.layout);
        assert_eq!(bt.answers[0].id, AnswerId(201));
        assert_eq!(bt.answers[0].jump, Jump::Page(PageId(30)));

        let cz = lesson.graph.get(PageId(30)).unwrap();
        assert_eq!(cz.kind, PageKind::Cloze);
        assert_eq!(cz.answers[0].jump, Jump::NextPage);
        assert!(validate_lesson(&lesson).is_empty());
    }

    #[test]
    fn defaults_fill_unset_settings() {
        let toml = r#"
[lesson]
name = "Minimal"
partial_credit = true

[[pages]]
id = 1
kind = "essay"
"#;
        let defaults = LessonSettings {
            max_attempts: 5,
            min_questions: 3,
            ..LessonSettings::default()
        };
        let lesson = parse_lesson_str_with(toml, &PathBuf::from("m.toml"), &defaults).unwrap();
        assert_eq!(lesson.id, LessonId(1));
        assert_eq!(lesson.settings.max_attempts, 5);
        assert_eq!(lesson.settings.min_questions, 3);
        assert!(lesson.settings.partial_credit);
        assert_eq!(lesson.settings.scoring, ScoringMode::Custom);
    }

    #[test]
    fn explicit_links_are_validated() {
        let toml = r#"
[lesson]
name = "Linked"

[[pages]]
id = 2
kind = "essay"
prev = 1

[[pages]]
id = 1
kind = "essay"
next = 2
"#;
        let lesson = parse_lesson_str(toml, &PathBuf::from("l.toml")).unwrap();
        let order: Vec<u64> = lesson.graph.iter().map(|p| p.id.0).collect();
        assert_eq!(order, vec![1, 2]);

        let broken = toml.replace("prev = 1", "prev = 0");
        let err = parse_lesson_str(&broken, &PathBuf::from("l.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("invalid page chain"));
    }

    #[test]
    fn rejects_unknown_jumps_and_kinds() {
        let bad_jump = r#"
[lesson]
name = "Bad"

[[pages]]
id = 1
kind = "truefalse"

[[pages.answers]]
jump = -3
"#;
        let err = parse_lesson_str(bad_jump, &PathBuf::from("b.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("unknown jump code"));

        let bad_kind = bad_jump.replace("\"truefalse\"", "\"slider\"");
        assert!(parse_lesson_str(&bad_kind, &PathBuf::from("b.toml")).is_err());
    }

    #[test]
    fn huge_page_id_needs_explicit_answer_ids() {
        let lesson = r#"
[lesson]
name = "Huge"

[[pages]]
id = 9223372036854775807
kind = "truefalse"

[[pages.answers]]
text = "True"
"#;
        let err = parse_lesson_str(lesson, &PathBuf::from("h.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("too large to derive an answer id"));

        let explicit = lesson.replace("text = \"True\"", "id = 1\ntext = \"True\"");
        let parsed = parse_lesson_str(&explicit, &PathBuf::from("h.toml")).unwrap();
        assert_eq!(parsed.graph.head().answers[0].id, AnswerId(1));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_lesson_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn validation_finds_authoring_mistakes() {
        let toml = r#"
[lesson]
name = "Sloppy"

[[pages]]
id = 1
kind = "multichoice"
multi_answer = true

[[pages.answers]]
text = "a"
jump = 99

[[pages]]
id = 2
kind = "cloze"
contents = '<a class="cloze" id="cloze-1"></a> <a class="cloze" id="cloze-2"></a>'

[[pages.answers]]
text = "x"

[[pages]]
id = 3
kind = "essay"

[[pages.answers]]
text = "one"

[[pages.answers]]
text = "two"

[[pages]]
id = 4
kind = "end-of-cluster"

[[pages]]
id = 5
kind = "truefalse"
"#;
        let lesson = parse_lesson_str(toml, &PathBuf::from("s.toml")).unwrap();
        let warnings = validate_lesson(&lesson);
        let has = |page: u64, needle: &str| {
            warnings
                .iter()
                .any(|w| w.page == Some(PageId(page)) && w.message.contains(needle))
        };
        assert!(has(1, "missing page 99"));
        assert!(has(1, "no correct answer"));
        assert!(has(2, "2 cloze gaps but 1 answers"));
        assert!(has(2, "cloze gap 2 has no answer"));
        assert!(has(3, "only the first is used"));
        assert!(has(4, "without a cluster"));
        assert!(has(5, "no answers"));
    }

    #[test]
    fn load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("bad.toml"), "[lesson]\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let nested = dir.path().join("unit2");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("again.toml"), VALID_TOML).unwrap();

        let lessons = load_lesson_directory(dir.path()).unwrap();
        assert_eq!(lessons.len(), 2);
        assert!(lessons.iter().all(|l| l.name == "Cells"));
    }
}
