//! The `lessonflow validate` command.

use std::path::PathBuf;

use anyhow::Result;

use lessonflow_core::config::load_config_from;
use lessonflow_core::parser;

pub fn execute(lesson_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let defaults = config.lesson_settings();

    let lessons = if lesson_path.is_dir() {
        parser::load_lesson_directory_with(&lesson_path, &defaults)?
    } else {
        vec![parser::parse_lesson_with(&lesson_path, &defaults)?]
    };

    let mut total_warnings = 0;

    for lesson in &lessons {
        println!("Lesson: {} ({} pages)", lesson.name, lesson.graph.len());

        let warnings = parser::validate_lesson(lesson);
        for w in &warnings {
            let prefix = w
                .page
                .map(|id| format!("  [page {id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All lessons valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
