use crate::wizard::SubmissionReport;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

fn slug(label: &str) -> String {
    let slug: String = crate::parser::fold_text(label)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

/// Write a CSV receipt of a submitted evaluation: one row per question and group,
/// then the comment and the computed grade.
pub fn export_receipt(
    report: &SubmissionReport,
    subject_label: &str,
    dir: &Path,
) -> Result<PathBuf> {
    let navigator = &report.answered;
    if navigator.answers().is_empty() {
        anyhow::bail!("No answers to export");
    }

    // Generate filename with timestamp
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let filename = format!("evaluacion_{}_{}.csv", slug(subject_label), timestamp);
    let filepath = dir.join(filename);

    let mut wtr = csv::Writer::from_path(&filepath).context("Failed to create CSV file")?;

    wtr.write_record(["question_id", "question", "aspect", "group", "score"])
        .context("Failed to write CSV headers")?;

    for question in navigator.questions().iter().filter(|q| !q.is_comment()) {
        for group in navigator.groups() {
            let score = navigator
                .answers()
                .get(&question.id)
                .and_then(|scores| scores.get(&group.id))
                .map(|s| s.to_string())
                .unwrap_or_default();
            wtr.write_record([
                question.id.as_str(),
                question.text.as_str(),
                question.aspect_name.as_deref().unwrap_or(""),
                group.name.as_str(),
                score.as_str(),
            ])
            .context("Failed to write CSV record")?;
        }
    }

    wtr.write_record(["coment", "Comentarios", "", "", navigator.comments()])
        .context("Failed to write CSV record")?;
    let grade = format!("{:.2}", report.grade);
    wtr.write_record(["calificacion", "Calificación", "", "", grade.as_str()])
        .context("Failed to write CSV record")?;

    wtr.flush().context("Failed to flush CSV writer")?;

    Ok(filepath)
}
