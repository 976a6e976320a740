//! Core data model types for lessonflow.
//!
//! Pages, answers, jump codes, attempts and lesson settings. These are plain
//! value objects; the page chain itself lives in [`crate::graph`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::PageGraph;

/// Identifier of a page. `0` is reserved for "no page" in serialized links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub u64);

/// Identifier of an answer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerId(pub u64);

/// Identifier of a learner or grader.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Identifier of a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LessonId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AnswerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LessonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a page asks something of the learner or only shapes navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageClass {
    Question,
    Structure,
}

/// Page subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    TrueFalse,
    MultiChoice,
    Matching,
    Cloze,
    Essay,
    Description,
    Audio,
    BranchTable,
    EndOfBranch,
    Cluster,
    EndOfCluster,
}

/// The two kinds of scope a structural page can open or close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeFamily {
    Branch,
    Cluster,
}

impl ScopeFamily {
    /// Kinds that open a scope of this family.
    pub fn starts(self) -> Vec<PageKind> {
        self.kinds(|caps| caps.is_scope_start)
    }

    /// Kinds that close a scope of this family.
    pub fn ends(self) -> Vec<PageKind> {
        self.kinds(|caps| caps.is_scope_end)
    }

    /// Kinds that open or close a scope of this family.
    pub fn boundaries(self) -> Vec<PageKind> {
        self.kinds(|caps| caps.is_scope_start || caps.is_scope_end)
    }

    fn kinds(self, edge: impl Fn(&Capabilities) -> bool) -> Vec<PageKind> {
        PageKind::ALL
            .into_iter()
            .filter(|k| {
                let caps = k.capabilities();
                caps.scope == Some(self) && edge(&caps)
            })
            .collect()
    }
}

/// What a page kind can do. The evaluator picks structural or graded
/// handling from it, and the navigator derives scope boundaries and random
/// candidates from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Submissions on this page are stored as attempts.
    pub records_attempt: bool,
    /// Correctness is decided automatically.
    pub auto_graded: bool,
    /// A grader has to attach feedback before the score counts.
    pub manual_graded: bool,
    /// The learner picks one of the page's answers.
    pub takes_choice: bool,
    /// Opens a branch or cluster scope.
    pub is_scope_start: bool,
    /// Closes a branch or cluster scope.
    pub is_scope_end: bool,
    /// Scope family the page opens or closes.
    pub scope: Option<ScopeFamily>,
    /// Structural page that is never drawn as a random candidate.
    pub is_marker: bool,
}

impl PageKind {
    pub const ALL: [PageKind; 11] = [
        PageKind::TrueFalse,
        PageKind::MultiChoice,
        PageKind::Matching,
        PageKind::Cloze,
        PageKind::Essay,
        PageKind::Description,
        PageKind::Audio,
        PageKind::BranchTable,
        PageKind::EndOfBranch,
        PageKind::Cluster,
        PageKind::EndOfCluster,
    ];

    /// Numeric type code used in stored and exported lessons.
    pub fn type_code(self) -> u32 {
        match self {
            PageKind::TrueFalse => 2,
            PageKind::MultiChoice => 3,
            PageKind::Matching => 5,
            PageKind::Essay => 9,
            PageKind::Description => 11,
            PageKind::Audio => 12,
            PageKind::Cloze => 13,
            PageKind::BranchTable => 20,
            PageKind::EndOfBranch => 21,
            PageKind::Cluster => 30,
            PageKind::EndOfCluster => 31,
        }
    }

    pub fn from_type_code(code: u32) -> Option<Self> {
        PageKind::ALL.into_iter().find(|k| k.type_code() == code)
    }

    pub fn class(self) -> PageClass {
        if self.capabilities().is_marker {
            PageClass::Structure
        } else {
            PageClass::Question
        }
    }

    pub fn capabilities(self) -> Capabilities {
        let question = Capabilities {
            records_attempt: true,
            auto_graded: true,
            manual_graded: false,
            takes_choice: false,
            is_scope_start: false,
            is_scope_end: false,
            scope: None,
            is_marker: false,
        };
        let marker = Capabilities {
            records_attempt: false,
            auto_graded: false,
            manual_graded: false,
            takes_choice: false,
            is_scope_start: false,
            is_scope_end: false,
            scope: None,
            is_marker: true,
        };
        match self {
            PageKind::TrueFalse | PageKind::MultiChoice => Capabilities {
                takes_choice: true,
                ..question
            },
            PageKind::Matching | PageKind::Cloze => question,
            PageKind::Essay | PageKind::Description | PageKind::Audio => Capabilities {
                auto_graded: false,
                manual_graded: true,
                ..question
            },
            PageKind::BranchTable => Capabilities {
                takes_choice: true,
                is_scope_start: true,
                scope: Some(ScopeFamily::Branch),
                ..marker
            },
            PageKind::EndOfBranch => Capabilities {
                is_scope_end: true,
                scope: Some(ScopeFamily::Branch),
                ..marker
            },
            PageKind::Cluster => Capabilities {
                is_scope_start: true,
                scope: Some(ScopeFamily::Cluster),
                ..marker
            },
            PageKind::EndOfCluster => Capabilities {
                is_scope_end: true,
                scope: Some(ScopeFamily::Cluster),
                ..marker
            },
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageKind::TrueFalse => "truefalse",
            PageKind::MultiChoice => "multichoice",
            PageKind::Matching => "matching",
            PageKind::Cloze => "cloze",
            PageKind::Essay => "essay",
            PageKind::Description => "description",
            PageKind::Audio => "audio",
            PageKind::BranchTable => "branchtable",
            PageKind::EndOfBranch => "endofbranch",
            PageKind::Cluster => "cluster",
            PageKind::EndOfCluster => "endofcluster",
        };
        f.write_str(name)
    }
}

impl FromStr for PageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();
        PageKind::ALL
            .into_iter()
            .find(|k| k.to_string() == normalized)
            .ok_or_else(|| format!("unknown page kind: {s}"))
    }
}

/// Where an answer sends the learner: a literal page or a sentinel that is
/// resolved at runtime by the navigator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Jump {
    Page(PageId),
    ThisPage,
    NextPage,
    PreviousPage,
    EndOfLesson,
    UnseenPageInBranch,
    RandomPageInBranch,
    RandomBranch,
    ClusterJump,
}

impl Jump {
    pub const THIS_PAGE: i64 = 0;
    pub const NEXT_PAGE: i64 = -1;
    pub const END_OF_LESSON: i64 = -9;
    pub const PREVIOUS_PAGE: i64 = -40;
    pub const UNSEEN_PAGE_IN_BRANCH: i64 = -50;
    pub const RANDOM_PAGE_IN_BRANCH: i64 = -60;
    pub const RANDOM_BRANCH: i64 = -70;
    pub const CLUSTER_JUMP: i64 = -80;

    /// Stable integer encoding of this jump.
    pub fn code(self) -> i64 {
        match self {
            Jump::Page(id) => id.0 as i64,
            Jump::ThisPage => Self::THIS_PAGE,
            Jump::NextPage => Self::NEXT_PAGE,
            Jump::PreviousPage => Self::PREVIOUS_PAGE,
            Jump::EndOfLesson => Self::END_OF_LESSON,
            Jump::UnseenPageInBranch => Self::UNSEEN_PAGE_IN_BRANCH,
            Jump::RandomPageInBranch => Self::RANDOM_PAGE_IN_BRANCH,
            Jump::RandomBranch => Self::RANDOM_BRANCH,
            Jump::ClusterJump => Self::CLUSTER_JUMP,
        }
    }

    /// Returns `true` for sentinels whose target depends on randomness or on
    /// the learner's history.
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            Jump::UnseenPageInBranch
                | Jump::RandomPageInBranch
                | Jump::RandomBranch
                | Jump::ClusterJump
        )
    }
}

impl TryFrom<i64> for Jump {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            c if c > 0 => Ok(Jump::Page(PageId(c as u64))),
            Self::THIS_PAGE => Ok(Jump::ThisPage),
            Self::NEXT_PAGE => Ok(Jump::NextPage),
            Self::END_OF_LESSON => Ok(Jump::EndOfLesson),
            Self::PREVIOUS_PAGE => Ok(Jump::PreviousPage),
            Self::UNSEEN_PAGE_IN_BRANCH => Ok(Jump::UnseenPageInBranch),
            Self::RANDOM_PAGE_IN_BRANCH => Ok(Jump::RandomPageInBranch),
            Self::RANDOM_BRANCH => Ok(Jump::RandomBranch),
            Self::CLUSTER_JUMP => Ok(Jump::ClusterJump),
            other => Err(format!("unknown jump code: {other}")),
        }
    }
}

impl From<Jump> for i64 {
    fn from(jump: Jump) -> Self {
        jump.code()
    }
}

impl fmt::Display for Jump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Jump::Page(id) => write!(f, "page {id}"),
            Jump::ThisPage => write!(f, "this"),
            Jump::NextPage => write!(f, "next"),
            Jump::PreviousPage => write!(f, "previous"),
            Jump::EndOfLesson => write!(f, "end"),
            Jump::UnseenPageInBranch => write!(f, "unseen-in-branch"),
            Jump::RandomPageInBranch => write!(f, "random-in-branch"),
            Jump::RandomBranch => write!(f, "random-branch"),
            Jump::ClusterJump => write!(f, "cluster"),
        }
    }
}

impl FromStr for Jump {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return Jump::try_from(code);
        }
        match s.to_lowercase().as_str() {
            "this" | "this-page" => Ok(Jump::ThisPage),
            "next" | "next-page" => Ok(Jump::NextPage),
            "previous" | "prev" | "previous-page" => Ok(Jump::PreviousPage),
            "end" | "eol" | "end-of-lesson" => Ok(Jump::EndOfLesson),
            "unseen-in-branch" | "unseen-page-in-branch" => Ok(Jump::UnseenPageInBranch),
            "random-in-branch" | "random-page-in-branch" => Ok(Jump::RandomPageInBranch),
            "random-branch" => Ok(Jump::RandomBranch),
            "cluster" | "cluster-jump" => Ok(Jump::ClusterJump),
            other => match other.strip_prefix("page ") {
                Some(id) => id
                    .trim()
                    .parse::<u64>()
                    .map(|id| Jump::Page(PageId(id)))
                    .map_err(|_| format!("unknown jump: {s}")),
                None => Err(format!("unknown jump: {s}")),
            },
        }
    }
}

/// The concrete result of resolving a jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Page(PageId),
    EndOfLesson,
}

impl Destination {
    pub fn page(self) -> Option<PageId> {
        match self {
            Destination::Page(id) => Some(id),
            Destination::EndOfLesson => None,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Page(id) => write!(f, "page {id}"),
            Destination::EndOfLesson => write!(f, "end of lesson"),
        }
    }
}

/// Per-page layout flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOptions {
    /// Multichoice pages accept several answers at once.
    #[serde(default)]
    pub multi_answer: bool,
    /// Cloze gaps compare case-sensitively.
    #[serde(default)]
    pub case_sensitive: bool,
    /// Branch table buttons are laid out horizontally.
    #[serde(default)]
    pub layout: bool,
    /// Page is listed in the lesson menu.
    #[serde(default)]
    pub display_in_menu: bool,
}

/// One answer record of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    /// Answer text, or the expected-answer alternation for cloze gaps.
    #[serde(default)]
    pub text: String,
    /// Response shown after the answer is chosen.
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub score: f64,
    pub jump: Jump,
}

/// A lesson page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub kind: PageKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub contents: String,
    #[serde(default)]
    pub prev: Option<PageId>,
    #[serde(default)]
    pub next: Option<PageId>,
    #[serde(default)]
    pub options: PageOptions,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl Page {
    pub fn answer(&self, id: AnswerId) -> Option<&Answer> {
        self.answers.iter().find(|a| a.id == id)
    }
}

/// Manual grader annotation on an essay or audio attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub text: String,
    pub grader: UserId,
    pub score: f64,
    pub time_graded: DateTime<Utc>,
    #[serde(default)]
    pub file: Option<String>,
}

/// A learner's single submission on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub lesson: LessonId,
    pub page: PageId,
    pub user: UserId,
    /// The answer record that decided the outcome, if any.
    #[serde(default)]
    pub answer: Option<AnswerId>,
    /// Raw learner input kept for review and manual grading.
    #[serde(default)]
    pub user_answer: Option<String>,
    pub correct: bool,
    pub score: f64,
    pub retry: u32,
    pub time_seen: DateTime<Utc>,
    pub graded: bool,
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

/// How answers are scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Each answer carries its own score.
    #[default]
    Custom,
    /// Pass/fail: an answer is correct when its jump moves forward.
    Standard,
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "custom" => Ok(ScoringMode::Custom),
            "standard" => Ok(ScoringMode::Standard),
            other => Err(format!("unknown scoring mode: {other}")),
        }
    }
}

/// Lesson-wide behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSettings {
    #[serde(default)]
    pub scoring: ScoringMode,
    /// Attempts allowed per page and retry; `0` means unlimited.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Multi-answer pages earn the positive scores of a partially correct
    /// selection.
    #[serde(default)]
    pub partial_credit: bool,
    /// Minimum number of questions used as the grade denominator.
    #[serde(default)]
    pub min_questions: u32,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for LessonSettings {
    fn default() -> Self {
        Self {
            scoring: ScoringMode::Custom,
            max_attempts: default_max_attempts(),
            partial_credit: false,
            min_questions: 0,
        }
    }
}

/// A loaded, validated lesson.
#[derive(Debug, Clone)]
pub struct Lesson {
    pub id: LessonId,
    pub name: String,
    pub description: String,
    pub settings: LessonSettings,
    pub graph: PageGraph,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jump_codes_round_trip_through_i64() {
        for code in [0, -1, -9, -40, -50, -60, -70, -80, 42] {
            let jump = Jump::try_from(code).unwrap();
            assert_eq!(i64::from(jump), code);
        }
        assert!(Jump::try_from(-3).is_err());
    }

    #[test]
    fn jump_parses_names_and_codes() {
        assert_eq!("next".parse::<Jump>().unwrap(), Jump::NextPage);
        assert_eq!("EOL".parse::<Jump>().unwrap(), Jump::EndOfLesson);
        assert_eq!("-80".parse::<Jump>().unwrap(), Jump::ClusterJump);
        assert_eq!("12".parse::<Jump>().unwrap(), Jump::Page(PageId(12)));
        assert_eq!("page 7".parse::<Jump>().unwrap(), Jump::Page(PageId(7)));
        assert!("sideways".parse::<Jump>().is_err());
    }

    #[test]
    fn jump_serializes_as_integer() {
        let json = serde_json::to_string(&Jump::RandomBranch).unwrap();
        assert_eq!(json, "-70");
        let back: Jump = serde_json::from_str("-50").unwrap();
        assert_eq!(back, Jump::UnseenPageInBranch);
        assert!(serde_json::from_str::<Jump>("-2").is_err());
    }

    #[test]
    fn kind_display_and_parse() {
        assert_eq!(PageKind::BranchTable.to_string(), "branchtable");
        assert_eq!(
            "end-of-cluster".parse::<PageKind>().unwrap(),
            PageKind::EndOfCluster
        );
        assert_eq!("True_False".parse::<PageKind>().unwrap(), PageKind::TrueFalse);
        assert!("slider".parse::<PageKind>().is_err());
    }

    #[test]
    fn type_codes_are_unique() {
        for kind in PageKind::ALL {
            assert_eq!(PageKind::from_type_code(kind.type_code()), Some(kind));
        }
        assert_eq!(PageKind::from_type_code(10), None);
    }

    #[test]
    fn capability_table() {
        assert!(PageKind::Essay.capabilities().manual_graded);
        assert!(!PageKind::Essay.capabilities().auto_graded);
        assert!(PageKind::BranchTable.capabilities().is_scope_start);
        assert!(PageKind::EndOfCluster.capabilities().is_marker);
        assert!(!PageKind::Cloze.capabilities().is_marker);
        assert_eq!(PageKind::Cluster.class(), PageClass::Structure);
        assert_eq!(PageKind::Audio.class(), PageClass::Question);
    }

    #[test]
    fn scope_boundaries_come_from_capabilities() {
        assert_eq!(ScopeFamily::Branch.starts(), vec![PageKind::BranchTable]);
        assert_eq!(ScopeFamily::Branch.ends(), vec![PageKind::EndOfBranch]);
        assert_eq!(
            ScopeFamily::Branch.boundaries(),
            vec![PageKind::BranchTable, PageKind::EndOfBranch]
        );
        assert_eq!(ScopeFamily::Cluster.starts(), vec![PageKind::Cluster]);
        assert_eq!(ScopeFamily::Cluster.ends(), vec![PageKind::EndOfCluster]);
        for kind in PageKind::ALL {
            let caps = kind.capabilities();
            assert_eq!(caps.scope.is_some(), caps.is_marker, "{kind}");
            assert_eq!(kind.class() == PageClass::Structure, caps.is_marker, "{kind}");
        }
    }

    #[test]
    fn settings_defaults() {
        let settings = LessonSettings::default();
        assert_eq!(settings.scoring, ScoringMode::Custom);
        assert_eq!(settings.max_attempts, 1);
        assert!(!settings.partial_credit);
    }
}
