use std::fmt::Write;
use std::io;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{StudentRecord, SyncRun};
use crate::repository::mean_rating;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StatusFilter {
    All,
    Active,
    Inactive,
}

impl StatusFilter {
    pub fn matches(self, student: &StudentRecord) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !student.is_inactive,
            StatusFilter::Inactive => student.is_inactive,
        }
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Email")]
    email: &'a str,
    #[serde(rename = "Codeforces Handle")]
    handle: &'a str,
    #[serde(rename = "Current Rating")]
    current_rating: i32,
    #[serde(rename = "Max Rating")]
    max_rating: i32,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Last Sync")]
    last_sync: String,
}

pub fn export_csv<W: io::Write>(
    writer: W,
    students: &[StudentRecord],
    filter: StatusFilter,
) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut written = 0usize;

    for student in students.iter().filter(|s| filter.matches(s)) {
        csv_writer.serialize(CsvRow {
            name: &student.name,
            email: &student.email,
            handle: &student.handle,
            current_rating: student.current_rating,
            max_rating: student.max_rating,
            status: student.status_label(),
            last_sync: format_date(student.last_data_sync),
        })?;
        written += 1;
    }

    csv_writer.flush()?;
    Ok(written)
}

fn format_date(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "never".to_string())
}

pub fn build_report(
    students: &[StudentRecord],
    last_run: Option<&SyncRun>,
    inactive_only: bool,
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();
    let active = students.iter().filter(|s| !s.is_inactive).count();
    let inactive = students.len() - active;
    let average = mean_rating(students);

    let _ = writeln!(output, "# Student Progress Report");
    let _ = writeln!(output, "Generated {}", generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Roster");
    let _ = writeln!(
        output,
        "- {} students ({} active, {} inactive)",
        students.len(),
        active,
        inactive
    );
    let _ = writeln!(output, "- Average rating {}", average);

    match last_run {
        Some(run) => {
            let _ = writeln!(
                output,
                "- Last sync {}: {} of {} students updated, {} failed",
                run.finished_at.format("%Y-%m-%d %H:%M UTC"),
                run.succeeded,
                run.attempted,
                run.failed
            );
        }
        None => {
            let _ = writeln!(output, "- No sync has completed yet");
        }
    }

    if !inactive_only {
        let mut ranked: Vec<&StudentRecord> = students.iter().collect();
        ranked.sort_by(|a, b| b.current_rating.cmp(&a.current_rating));

        let _ = writeln!(output);
        let _ = writeln!(output, "## Top Rated");
        if ranked.is_empty() {
            let _ = writeln!(output, "No students enrolled.");
        } else {
            for student in ranked.iter().take(10) {
                let _ = writeln!(
                    output,
                    "- {} ({}) rating {} (max {})",
                    student.name, student.handle, student.current_rating, student.max_rating
                );
            }
        }
    }

    let mut idle: Vec<&StudentRecord> = students.iter().filter(|s| s.is_inactive).collect();
    idle.sort_by(|a, b| a.last_submission_at.cmp(&b.last_submission_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Inactive Students");

    if idle.is_empty() {
        let _ = writeln!(output, "Everyone submitted within the activity window.");
    } else {
        for student in idle {
            let _ = writeln!(
                output,
                "- {} ({}): last submission {}, flagged {}",
                student.name,
                student.handle,
                format_date(student.last_submission_at),
                format_date(student.inactivity_detected_at)
            );
        }
    }

    output
}
