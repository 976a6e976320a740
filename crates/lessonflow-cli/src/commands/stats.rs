//! The `lessonflow stats` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use lessonflow_core::report::SessionReport;

pub fn execute(report_path: PathBuf, format: String) -> Result<()> {
    let report = SessionReport::load_json(&report_path)?;

    if format == "json" {
        let summary = serde_json::json!({
            "lesson": report.lesson,
            "user": report.user,
            "retry": report.retry,
            "grade": report.grade,
            "pages": report.pages,
            "finished": report.finished,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let grade = &report.grade;
    println!(
        "Lesson: {} (user {}, retry {})",
        report.lesson.name, report.user, report.retry
    );
    println!(
        "Grade: {:.1}% ({}/{}), {} of {} answered correctly{}",
        grade.percent,
        grade.earned,
        grade.possible,
        grade.correct,
        grade.questions_answered,
        if report.finished { "" } else { ", unfinished" }
    );
    if grade.pending_manual > 0 {
        println!("{} answer(s) awaiting grading", grade.pending_manual);
    }
    let path: Vec<String> = report.path.iter().map(|p| p.to_string()).collect();
    println!("Path: {}", path.join(" -> "));

    let mut table = Table::new();
    table.set_header(vec![
        "Page",
        "Title",
        "Type",
        "Attempts",
        "Correct %",
        "Avg score",
        "Answers",
    ]);
    for stats in &report.pages {
        let answers: Vec<String> = stats
            .answer_counts
            .iter()
            .map(|(answer, count)| format!("{answer}:{count}"))
            .collect();
        table.add_row(vec![
            Cell::new(stats.page),
            Cell::new(&stats.title),
            Cell::new(stats.kind),
            Cell::new(stats.attempts),
            Cell::new(format!("{:.1}%", stats.correct_rate() * 100.0)),
            Cell::new(format!("{:.2}", stats.average_score)),
            Cell::new(answers.join(" ")),
        ]);
    }

    println!("\n{table}");
    Ok(())
}
