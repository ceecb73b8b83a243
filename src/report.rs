use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::cohort::class_overview;
use crate::models::{MetricsSnapshot, StudentSummary, SubjectProgress};

/// Renders seconds as `1h 05m` or `12m`.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

/// Subjects ordered by the number of tracked items, busiest first.
pub fn ranked_subjects(metrics: &MetricsSnapshot) -> Vec<(&str, &SubjectProgress)> {
    let mut subjects: Vec<(&str, &SubjectProgress)> = metrics
        .subject_progress
        .iter()
        .map(|(name, progress)| (name.as_str(), progress))
        .collect();
    subjects.sort_by(|a, b| {
        (b.1.total + b.1.quiz_count)
            .cmp(&(a.1.total + a.1.quiz_count))
            .then_with(|| a.0.cmp(b.0))
    });
    subjects
}

fn write_metrics(output: &mut String, metrics: &MetricsSnapshot) {
    let _ = writeln!(output, "## Activity");
    let _ = writeln!(
        output,
        "- {} activities across {} sessions ({} activities and {} per session on average)",
        metrics.total_activities,
        metrics.sessions_count,
        metrics.average_activities_per_session,
        format_duration(metrics.avg_session_length.round() as u64)
    );
    let _ = writeln!(
        output,
        "- Active on {} of {} days ({:.0}%)",
        metrics.active_days, metrics.total_days, metrics.active_ratio
    );
    let _ = writeln!(
        output,
        "- Time spent: {} total, {} last week, {} last month",
        format_duration(metrics.total_time_spent),
        format_duration(metrics.time_spent_last_week),
        format_duration(metrics.time_spent_last_month)
    );
    let _ = writeln!(
        output,
        "- Streak: {} days, {} points",
        metrics.streak_days, metrics.points
    );
    match metrics.days_since_last_active {
        Some(days) => {
            let _ = writeln!(output, "- Last active {days} days ago");
        }
        None => {
            let _ = writeln!(output, "- Never active");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Learning");
    let _ = writeln!(
        output,
        "- Completion: {}/{} items ({:.0}%), {}/{} lessons, {}/{} flashcard sets mastered",
        metrics.completed_items,
        metrics.total_items,
        metrics.completion_rate,
        metrics.lessons_completed,
        metrics.lessons_total,
        metrics.flashcard_sets_mastered,
        metrics.flashcard_sets_total
    );
    let _ = writeln!(
        output,
        "- Quizzes: {} taken, {} completed, avg {:.1}, best {:.1}, trend {:+.1}",
        metrics.quizzes_taken,
        metrics.quizzes_completed,
        metrics.quiz_avg_score,
        metrics.quiz_high_score,
        metrics.quiz_improvement
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");
    let subjects = ranked_subjects(metrics);
    if subjects.is_empty() {
        let _ = writeln!(output, "No subject activity recorded for this window.");
    } else {
        for (name, subject) in subjects {
            let _ = writeln!(
                output,
                "- {}: {}/{} completed, {} quizzes (avg {:.1}), {}",
                name,
                subject.completed,
                subject.total,
                subject.quiz_count,
                subject.quiz_avg,
                format_duration(subject.time_spent)
            );
        }
    }

    if !metrics.activity_breakdown.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Activity Mix");
        let mut kinds: Vec<(&String, &u32)> = metrics.activity_breakdown.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (kind, count) in kinds {
            let _ = writeln!(output, "- {kind}: {count}");
        }
    }
}

pub fn build_student_report(summary: &StudentSummary, cutoff: DateTime<Utc>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Progress Report");
    let _ = writeln!(
        output,
        "{} ({}, class {}) since {}",
        summary.full_name,
        summary.email,
        summary.class_code,
        cutoff.date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Engagement score {} ({}), improvement {:+}%",
        summary.engagement_score, summary.engagement_level, summary.improvement_rate
    );
    if summary.needs_attention {
        let _ = writeln!(output, "Flagged for follow-up.");
    }
    let _ = writeln!(output);
    write_metrics(&mut output, &summary.metrics);

    output
}

pub fn build_class_report(
    class_code: Option<&str>,
    cutoff: DateTime<Utc>,
    summaries: &[StudentSummary],
) -> String {
    let overview = class_overview(summaries);
    let mut output = String::new();
    let class_label = class_code.unwrap_or("all classes");

    let _ = writeln!(output, "# Class Engagement Report");
    let _ = writeln!(
        output,
        "Generated for {} (activity since {})",
        class_label,
        cutoff.date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");

    if summaries.is_empty() {
        let _ = writeln!(output, "No students found for this class.");
        return output;
    }

    let _ = writeln!(
        output,
        "- {} students, {} active in this window",
        overview.student_count, overview.active_students
    );
    let _ = writeln!(
        output,
        "- Average engagement {:.1}, completion {:.0}%, quiz score {:.1}",
        overview.avg_engagement, overview.avg_completion_rate, overview.avg_quiz_score
    );
    let _ = writeln!(
        output,
        "- Total study time {}",
        format_duration(overview.total_time_spent)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Engaged Students");
    for summary in summaries.iter().take(10) {
        let _ = writeln!(
            output,
            "- {} ({}) score {} ({}), {} sessions, completion {:.0}%",
            summary.full_name,
            summary.email,
            summary.engagement_score,
            summary.engagement_level,
            summary.metrics.sessions_count,
            summary.metrics.completion_rate
        );
    }

    let flagged: Vec<&StudentSummary> = summaries.iter().filter(|s| s.needs_attention).collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");

    if flagged.is_empty() {
        let _ = writeln!(output, "Every student is active and engaged.");
    } else {
        for summary in flagged {
            let last_seen = match summary.metrics.days_since_last_active {
                Some(days) => format!("last active {days} days ago"),
                None => "never active".to_string(),
            };
            let _ = writeln!(
                output,
                "- {} ({}): score {}, {}",
                summary.full_name, summary.email, summary.engagement_score, last_seen
            );
        }
    }

    output
}
