//! The `lessonflow convert` command.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

use lessonflow_backup::{convert_legacy, XmlTagWriter};

pub fn execute(input: PathBuf, output: PathBuf, report_path: Option<PathBuf>) -> Result<()> {
    let reader = BufReader::new(
        File::open(&input).with_context(|| format!("failed to open {}", input.display()))?,
    );
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file =
        File::create(&output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = XmlTagWriter::new(BufWriter::new(file));

    let report = convert_legacy(reader, &mut writer)
        .with_context(|| format!("failed to convert {}", input.display()))?;
    writer
        .into_inner()
        .flush()
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Converted '{}': {} pages, {} answers, {} attempts, {} feedback",
        report.lesson_name.as_deref().unwrap_or("unnamed lesson"),
        report.pages,
        report.answers,
        report.attempts,
        report.feedback
    );
    for anomaly in &report.anomalies {
        println!("  PATCHED: {anomaly}");
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        eprintln!("Conversion report: {}", path.display());
    }
    eprintln!("Output written to: {}", output.display());

    Ok(())
}
