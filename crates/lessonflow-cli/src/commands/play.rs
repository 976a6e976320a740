//! The `lessonflow play` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use lessonflow_core::config::load_config_from;
use lessonflow_core::engine::{LessonEngine, Step};
use lessonflow_core::error::EngineError;
use lessonflow_core::evaluate::{Evaluation, Submission};
use lessonflow_core::model::{Page, UserId};
use lessonflow_core::parser;
use lessonflow_core::report::SessionReport;
use lessonflow_core::store::{AttemptStore, MemoryStore};

pub struct PlayArgs {
    pub lesson: PathBuf,
    pub script: PathBuf,
    pub user: u64,
    pub retry: u32,
    pub manager: bool,
    pub seed: Option<u64>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Deserialize)]
struct TomlScript {
    steps: Vec<Submission>,
}

/// Load submissions from a JSON array, or from the `steps` list of a TOML
/// file.
fn load_script(path: &Path) -> Result<Vec<Submission>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script: {}", path.display()))?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let steps = if is_toml {
        toml::from_str::<TomlScript>(&content)
            .with_context(|| format!("failed to parse TOML script: {}", path.display()))?
            .steps
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON script: {}", path.display()))?
    };
    Ok(steps)
}

pub fn execute(args: PlayArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    let lesson = parser::parse_lesson_with(&args.lesson, &config.lesson_settings())?;
    for w in parser::validate_lesson(&lesson) {
        tracing::warn!(page = ?w.page, "{}", w.message);
    }
    let steps = load_script(&args.script)?;

    let seed = args.seed.or(config.seed).unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    let engine = LessonEngine::new(&lesson);
    let mut session = engine.start(UserId(args.user), args.retry, args.manager);
    let mut store = MemoryStore::new();

    eprintln!(
        "lessonflow v{}: playing '{}' ({} pages, {} steps, seed {seed})",
        env!("CARGO_PKG_VERSION"),
        lesson.name,
        lesson.graph.len(),
        steps.len()
    );
    eprintln!();

    for (i, submission) in steps.iter().enumerate() {
        if session.is_finished() {
            eprintln!("  Lesson finished, {} step(s) left unplayed", steps.len() - i);
            break;
        }
        let page = engine.current_page(&session)?;
        match engine.submit(&mut session, submission, &mut store, &mut rng) {
            Ok(step) => eprintln!("  [{}] {}", i + 1, describe(page, &step)),
            Err(EngineError::Evaluation(e)) if e.is_recoverable() => {
                eprintln!("  [{}] {e}, page shown again", i + 1);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("step {} on page {}", i + 1, page.id));
            }
        }
    }
    if let Some(current) = session.current() {
        eprintln!("  Script ended on page {current}");
    }

    let report = SessionReport::from_session(&lesson, &session, store.all());
    print_summary(&report);

    let output = args.output.unwrap_or(config.output_dir);
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let path = output.join(format!("session-{timestamp}.json"));
    report.save_json(&path)?;
    eprintln!("Report saved to: {}", path.display());

    Ok(())
}

fn describe(page: &Page, step: &Step) -> String {
    let verdict = match &step.evaluation {
        Evaluation::MaxAttemptsReached { .. } => "max attempts reached".to_string(),
        Evaluation::Scored(_) if !page.kind.capabilities().records_attempt => page.kind.to_string(),
        Evaluation::Scored(outcome) if !outcome.graded => "awaiting grading".to_string(),
        Evaluation::Scored(outcome) => format!(
            "{} (score {})",
            if outcome.correct { "correct" } else { "wrong" },
            outcome.score
        ),
    };
    format!(
        "page {} '{}': {verdict} -> {}",
        page.id, page.title, step.destination
    )
}

fn print_summary(report: &SessionReport) {
    use comfy_table::{Cell, Table};

    let grade = &report.grade;
    let mut table = Table::new();
    table.set_header(vec![
        "Lesson",
        "Answered",
        "Correct",
        "Pending",
        "Score",
        "Grade",
        "Finished",
    ]);
    table.add_row(vec![
        Cell::new(&report.lesson.name),
        Cell::new(grade.questions_answered),
        Cell::new(grade.correct),
        Cell::new(grade.pending_manual),
        Cell::new(format!("{}/{}", grade.earned, grade.possible)),
        Cell::new(format!("{:.1}%", grade.percent)),
        Cell::new(if report.finished { "yes" } else { "no" }),
    ]);

    println!("{table}");
}
