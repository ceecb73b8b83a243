use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engagement::{engagement_level, engagement_score, improvement_rate};
use crate::metrics::compute_metrics;
use crate::models::{StudentRecord, StudentSummary};

pub const INACTIVE_AFTER_DAYS: i64 = 7;
pub const LOW_ENGAGEMENT_SCORE: u32 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverview {
    pub student_count: usize,
    pub active_students: usize,
    pub avg_engagement: f64,
    pub avg_completion_rate: f64,
    pub avg_quiz_score: f64,
    pub total_time_spent: u64,
    pub needs_attention: usize,
}

pub fn summarize_student(
    student: &StudentRecord,
    cutoff: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> StudentSummary {
    let metrics = compute_metrics(&student.progress, cutoff, now);
    let score = engagement_score(&metrics);
    let inactive = metrics
        .days_since_last_active
        .map_or(true, |days| days > INACTIVE_AFTER_DAYS);

    StudentSummary {
        student_id: student.student_id,
        full_name: student.full_name.clone(),
        email: student.email.clone(),
        class_code: student.class_code.clone(),
        engagement_score: score,
        engagement_level: engagement_level(score),
        improvement_rate: improvement_rate(&student.progress, now),
        needs_attention: inactive || score < LOW_ENGAGEMENT_SCORE,
        metrics,
    }
}

/// Summaries ranked by engagement, most engaged first.
pub fn summarize_students(
    students: &[StudentRecord],
    cutoff: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<StudentSummary> {
    let mut summaries: Vec<StudentSummary> = students
        .iter()
        .map(|student| summarize_student(student, cutoff, now))
        .collect();
    summaries.sort_by(|a, b| {
        b.engagement_score
            .cmp(&a.engagement_score)
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    summaries
}

fn mean_of(summaries: &[StudentSummary], value: impl Fn(&StudentSummary) -> f64) -> f64 {
    summaries.iter().map(value).sum::<f64>() / summaries.len() as f64
}

pub fn class_overview(summaries: &[StudentSummary]) -> ClassOverview {
    if summaries.is_empty() {
        return ClassOverview::default();
    }
    // Quiz average only over students who completed at least one quiz.
    let quiz_takers: Vec<f64> = summaries
        .iter()
        .filter(|s| s.metrics.quizzes_completed > 0)
        .map(|s| s.metrics.quiz_avg_score)
        .collect();

    ClassOverview {
        student_count: summaries.len(),
        active_students: summaries
            .iter()
            .filter(|s| s.metrics.total_activities > 0)
            .count(),
        avg_engagement: mean_of(summaries, |s| s.engagement_score as f64),
        avg_completion_rate: mean_of(summaries, |s| s.metrics.completion_rate),
        avg_quiz_score: if quiz_takers.is_empty() {
            0.0
        } else {
            quiz_takers.iter().sum::<f64>() / quiz_takers.len() as f64
        },
        total_time_spent: summaries
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.metrics.total_time_spent)),
        needs_attention: summaries.iter().filter(|s| s.needs_attention).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, ActivityKind, LessonProgress, ProgressRecord};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn student(name: &str, progress: ProgressRecord) -> StudentRecord {
        StudentRecord {
            student_id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            class_code: "BIO-101".to_string(),
            progress,
        }
    }

    fn busy_progress() -> ProgressRecord {
        let mut progress = ProgressRecord {
            streak_days: 10,
            ..Default::default()
        };
        for day in 0..20 {
            progress.activity.insert(
                format!("a{day}"),
                Activity {
                    kind: ActivityKind::FlashcardStudied,
                    timestamp: Some(now() - Duration::days(day)),
                    time_spent: 1800,
                },
            );
            progress.lessons.insert(
                format!("l{day}"),
                LessonProgress {
                    completed: true,
                    timestamp: Some(now() - Duration::days(day)),
                    ..Default::default()
                },
            );
        }
        progress
    }

    #[test]
    fn ranks_students_by_engagement() {
        let students = vec![
            student("Quiet", ProgressRecord::default()),
            student("Busy", busy_progress()),
        ];
        let summaries = summarize_students(&students, None, now());
        assert_eq!(summaries[0].full_name, "Busy");
        assert!(summaries[0].engagement_score > summaries[1].engagement_score);
        assert!(!summaries[0].needs_attention);
        assert!(summaries[1].needs_attention);
    }

    #[test]
    fn stale_students_need_attention() {
        let mut progress = busy_progress();
        progress.last_active = Some(now() - Duration::days(INACTIVE_AFTER_DAYS + 1));
        let summary = summarize_student(&student("Stale", progress), None, now());
        assert!(summary.needs_attention);
    }

    #[test]
    fn overview_averages_across_students() {
        let students = vec![
            student("Quiet", ProgressRecord::default()),
            student("Busy", busy_progress()),
        ];
        let summaries = summarize_students(&students, None, now());
        let overview = class_overview(&summaries);
        assert_eq!(overview.student_count, 2);
        assert_eq!(overview.active_students, 1);
        assert_eq!(overview.needs_attention, 1);
        assert_eq!(overview.avg_completion_rate, 50.0);
        assert_eq!(overview.avg_quiz_score, 0.0);
        assert_eq!(overview.total_time_spent, 20 * 1800);
    }

    #[test]
    fn overview_time_total_saturates_across_students() {
        let mut heavy = busy_progress();
        for entry in heavy.activity.values_mut() {
            entry.time_spent = u64::MAX;
        }
        let students = vec![student("Heavy", heavy.clone()), student("Heavier", heavy)];
        let summaries = summarize_students(&students, None, now());
        assert_eq!(summaries[0].metrics.total_time_spent, u64::MAX);
        assert_eq!(class_overview(&summaries).total_time_spent, u64::MAX);
    }

    #[test]
    fn empty_class_has_zero_overview() {
        assert_eq!(class_overview(&[]), ClassOverview::default());
    }
}
