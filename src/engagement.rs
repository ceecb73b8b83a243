use chrono::{DateTime, Utc};

use crate::metrics::{aggregate, Window, DEFAULT_WINDOW_DAYS};
use crate::models::{EngagementLevel, MetricsSnapshot, ProgressRecord};

const ACTIVE_TIME_CAP: f64 = 30.0;
const COMPLETION_CAP: f64 = 25.0;
const STREAK_CAP: f64 = 15.0;
const FREQUENCY_CAP: f64 = 15.0;
const PERFORMANCE_CAP: f64 = 15.0;

/// Percentage points contributed by a factor that moved by 100%.
const IMPROVEMENT_FACTOR_WEIGHT: f64 = 25.0;

/// Composite 0-100 score from time, completion, streak, frequency and quiz
/// performance. Each component is capped, so the sum never leaves 0-100.
pub fn engagement_score(metrics: &MetricsSnapshot) -> u32 {
    let active_time = (metrics.total_time_spent as f64 / 3600.0 * 5.0).min(ACTIVE_TIME_CAP);
    let completion = (metrics.completion_rate / 4.0).min(COMPLETION_CAP);
    let streak = (metrics.streak_days as f64 * 1.5).min(STREAK_CAP);
    let frequency = (metrics.active_ratio / 6.67).min(FREQUENCY_CAP);
    let performance = (metrics.quiz_avg_score / 6.67).min(PERFORMANCE_CAP);

    (active_time + completion + streak + frequency + performance)
        .max(0.0)
        .round() as u32
}

pub fn engagement_level(score: u32) -> EngagementLevel {
    match score {
        0..=39 => EngagementLevel::Low,
        40..=69 => EngagementLevel::Moderate,
        _ => EngagementLevel::High,
    }
}

fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous * IMPROVEMENT_FACTOR_WEIGHT
}

/// Compares two snapshots over sessions, time, completion and quiz average.
/// Factors without a previous baseline contribute nothing.
pub fn improvement_between(current: &MetricsSnapshot, previous: &MetricsSnapshot) -> i32 {
    let total = percent_change(current.sessions_count as f64, previous.sessions_count as f64)
        + percent_change(
            current.total_time_spent as f64,
            previous.total_time_spent as f64,
        )
        + percent_change(current.completion_rate, previous.completion_rate)
        + percent_change(current.quiz_avg_score, previous.quiz_avg_score);

    total.clamp(-100.0, 100.0).round() as i32
}

/// Trailing 30 days against the 30 days before them, in [-100, 100].
pub fn improvement_rate(progress: &ProgressRecord, now: DateTime<Utc>) -> i32 {
    let current_window = Window::trailing(now, DEFAULT_WINDOW_DAYS);
    let current = aggregate(progress, current_window, now);
    let previous = aggregate(progress, current_window.preceding(), now);
    improvement_between(&current, &previous)
}
