//! Cloze gaps: anchor detection in page contents and expected-answer
//! matching.
//!
//! A gap is marked in the page HTML as `<a class="cloze" id="cloze-N"></a>`,
//! where `N` counts from 1. Gap `N` is answered by the page's answer at index
//! `N - 1`; submitted values are taken in document order.
//!
//! An expected answer is a comma-separated list of choices such as
//! `red, blue, =green`. The `=`-prefixed entry is canonical, otherwise the
//! first entry is. A gap with several choices is rendered as a drop-down.

use std::ops::Range;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::model::{Answer, Page};

fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)<a\b[^>]*\bid\s*=\s*["']cloze-(\d+)["'][^>]*>\s*</a>"#)
            .expect("anchor pattern is valid")
    })
}

/// A gap found in page contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// The sequential id carried by the markup.
    pub id: usize,
    /// Byte range of the markup in the contents.
    pub span: Range<usize>,
}

impl Anchor {
    /// Index of the answer record for this gap.
    pub fn answer_index(&self) -> Option<usize> {
        self.id.checked_sub(1)
    }
}

/// All gaps of `contents` in document order.
pub fn find_anchors(contents: &str) -> Vec<Anchor> {
    anchor_pattern()
        .captures_iter(contents)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(1)?.as_str().parse().ok()?;
            Some(Anchor {
                id,
                span: whole.range(),
            })
        })
        .collect()
}

/// A parsed expected answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    choices: Vec<String>,
    canonical: usize,
}

impl Expected {
    pub fn parse(text: &str) -> Self {
        let mut choices = Vec::new();
        let mut canonical = None;
        for raw in text.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match raw.strip_prefix('=') {
                Some(marked) => {
                    if canonical.is_none() {
                        canonical = Some(choices.len());
                    }
                    choices.push(marked.trim().to_string());
                }
                None => choices.push(raw.to_string()),
            }
        }
        Self {
            choices,
            canonical: canonical.unwrap_or(0),
        }
    }

    pub fn canonical(&self) -> &str {
        self.choices
            .get(self.canonical)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn is_drop_down(&self) -> bool {
        self.choices.len() > 1
    }

    /// Compare a submitted value with the canonical choice. `*` in the
    /// canonical choice matches any run of characters.
    pub fn matches(&self, value: &str, case_sensitive: bool) -> bool {
        let value = value.trim();
        let canonical = self.canonical();
        if value.is_empty() || canonical.is_empty() {
            return false;
        }
        let pattern = format!(
            "^{}$",
            canonical
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*")
        );
        match RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(re) => re.is_match(value),
            Err(e) => {
                tracing::warn!("unusable cloze pattern {canonical:?}: {e}");
                if case_sensitive {
                    value == canonical
                } else {
                    value.to_lowercase() == canonical.to_lowercase()
                }
            }
        }
    }
}

/// Result for one gap.
#[derive(Debug, Clone)]
pub struct GapResult<'p> {
    pub anchor: Anchor,
    pub answer: Option<&'p Answer>,
    pub value: String,
    pub matched: bool,
}

/// Match submitted values against every gap of the page.
pub fn match_gaps<'p>(page: &'p Page, values: &[String]) -> Vec<GapResult<'p>> {
    find_anchors(&page.contents)
        .into_iter()
        .enumerate()
        .map(|(position, anchor)| {
            let answer = anchor.answer_index().and_then(|i| page.answers.get(i));
            let value = values.get(position).cloned().unwrap_or_default();
            let matched = answer.is_some_and(|a| {
                Expected::parse(&a.text).matches(&value, page.options.case_sensitive)
            });
            GapResult {
                anchor,
                answer,
                value,
                matched,
            }
        })
        .collect()
}
