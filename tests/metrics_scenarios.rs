use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use engagement_metrics::clock::{Clock, FixedClock};
use engagement_metrics::engagement::{engagement_score, improvement_rate};
use engagement_metrics::metrics::compute_metrics;
use engagement_metrics::models::{MetricsSnapshot, ProgressRecord};

fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2026, 4, 15, 18, 30, 0).unwrap())
}

fn millis(at: DateTime<Utc>) -> Value {
    json!(at.timestamp_millis())
}

fn days_ago(days: i64) -> DateTime<Utc> {
    clock().now() - Duration::days(days)
}

#[test]
fn empty_document_yields_all_zero_snapshot() {
    let now = clock().now();
    let progress = ProgressRecord::from_json(&json!({}));
    let metrics = compute_metrics(&progress, None, now);

    assert_eq!(metrics.total_activities, 0);
    assert_eq!(metrics.sessions_count, 0);
    assert_eq!(metrics.average_activities_per_session, 0);
    assert_eq!(metrics.avg_session_length, 0.0);
    assert_eq!(metrics.total_time_spent, 0);
    assert_eq!(metrics.time_spent_last_week, 0);
    assert_eq!(metrics.time_spent_last_month, 0);
    assert_eq!(metrics.active_days, 0);
    assert_eq!(metrics.active_ratio, 0.0);
    assert_eq!(metrics.total_items, 0);
    assert_eq!(metrics.completed_items, 0);
    assert_eq!(metrics.completion_rate, 0.0);
    assert_eq!(metrics.quizzes_taken, 0);
    assert_eq!(metrics.quizzes_completed, 0);
    assert_eq!(metrics.quiz_avg_score, 0.0);
    assert_eq!(metrics.quiz_high_score, 0.0);
    assert_eq!(metrics.quiz_improvement, 0.0);
    assert_eq!(metrics.streak_days, 0);
    assert!(metrics.subject_progress.is_empty());
    assert_eq!(engagement_score(&metrics), 0);
    assert_eq!(improvement_rate(&progress, now), 0);
}

#[test]
fn single_activity_now_is_one_session_of_one() {
    let now = clock().now();
    let progress = ProgressRecord::from_json(&json!({
        "activity": {
            "-Nx1": { "type": "login", "timestamp": millis(now) }
        }
    }));
    let metrics = compute_metrics(&progress, None, now);

    assert_eq!(metrics.sessions_count, 1);
    assert_eq!(metrics.average_activities_per_session, 1);
    assert_eq!(metrics.active_days, 1);
}

#[test]
fn sessions_split_only_on_gaps_over_thirty_minutes() {
    let now = clock().now();
    let start = now - Duration::hours(5);
    let offsets_ms = [0i64, 1_800_000, 3_600_000, 5_400_001, 5_500_000];
    let activity: serde_json::Map<String, Value> = offsets_ms
        .iter()
        .enumerate()
        .map(|(idx, offset)| {
            (
                format!("a{idx}"),
                json!({
                    "type": "flashcard_studied",
                    "timestamp": millis(start + Duration::milliseconds(*offset)),
                    "details": { "timeSpent": 60 }
                }),
            )
        })
        .collect();
    let progress = ProgressRecord::from_json(&json!({ "activity": activity }));
    let metrics = compute_metrics(&progress, None, now);

    assert_eq!(metrics.total_activities, 5);
    assert_eq!(metrics.sessions_count, 2);
    assert_eq!(metrics.average_activities_per_session, 3);
    assert_eq!(metrics.total_time_spent, 300);
    assert_eq!(metrics.avg_session_length, 150.0);
}

#[test]
fn quiz_improvement_compares_chronological_halves() {
    let now = clock().now();
    let progress = ProgressRecord::from_json(&json!({
        "quizzes": {
            "q-late": { "completed": true, "score": 100, "completedAt": millis(days_ago(1)) },
            "q-early": { "completed": true, "score": 50, "completedAt": millis(days_ago(10)) },
            "q-third": { "completed": true, "score": 90, "completedAt": millis(days_ago(3)) },
            "q-second": { "completed": true, "score": 60, "completedAt": millis(days_ago(7)) }
        }
    }));
    let metrics = compute_metrics(&progress, None, now);

    assert_eq!(metrics.quizzes_completed, 4);
    assert_eq!(metrics.quiz_improvement, 40.0);
    assert_eq!(metrics.quiz_avg_score, 75.0);
    assert_eq!(metrics.quiz_high_score, 100.0);
}

#[test]
fn quiz_average_uses_only_completed_scored_quizzes_in_window() {
    let now = clock().now();
    let progress = ProgressRecord::from_json(&json!({
        "quizzes": {
            "in-window": { "completed": true, "score": 70, "timestamp": millis(days_ago(2)) },
            "also-in": { "completed": true, "score": 80, "timestamp": millis(days_ago(4)), "subject": "Physics" },
            "unfinished": { "completed": false, "score": 100, "timestamp": millis(days_ago(2)) },
            "unscored": { "completed": true, "timestamp": millis(days_ago(2)) },
            "stale": { "completed": true, "score": 10, "timestamp": millis(days_ago(45)) },
            "undated": { "completed": true, "score": 10 }
        }
    }));
    let metrics = compute_metrics(&progress, None, now);

    assert_eq!(metrics.quizzes_taken, 4);
    assert_eq!(metrics.quizzes_completed, 2);
    assert_eq!(metrics.quiz_avg_score, 75.0);
    assert_eq!(metrics.subject_progress["Physics"].quiz_avg, 80.0);
    assert_eq!(metrics.subject_progress["General"].quiz_avg, 70.0);
}

#[test]
fn completion_rate_stays_within_bounds() {
    let now = clock().now();
    for completed_lessons in 0..=3 {
        let mut lessons = serde_json::Map::new();
        for idx in 0..3 {
            lessons.insert(
                format!("l{idx}"),
                json!({ "completed": idx < completed_lessons, "lastAccessed": millis(days_ago(2)) }),
            );
        }
        let progress = ProgressRecord::from_json(&json!({
            "lessons": lessons,
            "flashcardSets": {
                "fs": { "mastered": true, "lastStudied": millis(days_ago(1)) }
            }
        }));
        let metrics = compute_metrics(&progress, None, now);
        assert!((0.0..=100.0).contains(&metrics.completion_rate));
        assert_eq!(metrics.total_items, 4);
        assert_eq!(metrics.completed_items, completed_lessons as u32 + 1);
    }
}

#[test]
fn engagement_score_for_perfect_ratios_with_little_time() {
    let now = clock().now();
    let mut metrics = MetricsSnapshot::empty(now - Duration::days(30), now);
    metrics.streak_days = 10;
    metrics.completion_rate = 100.0;
    metrics.active_ratio = 100.0;
    metrics.quiz_avg_score = 100.0;
    metrics.total_time_spent = 10;

    assert_eq!(engagement_score(&metrics), 70);
}

#[test]
fn improvement_rate_is_bounded_and_ignores_missing_baselines() {
    let now = clock().now();

    // Only current-period activity: every baseline is zero.
    let fresh = ProgressRecord::from_json(&json!({
        "activity": {
            "a1": { "type": "login", "timestamp": millis(days_ago(2)), "details": { "timeSpent": 900 } }
        }
    }));
    assert_eq!(improvement_rate(&fresh, now), 0);

    // Busy previous period, quiet current one.
    let mut activity = serde_json::Map::new();
    for day in 31..55 {
        activity.insert(
            format!("old{day}"),
            json!({ "type": "lesson_completed", "timestamp": millis(days_ago(day)), "details": { "timeSpent": 1800 } }),
        );
    }
    activity.insert(
        "recent".to_string(),
        json!({ "type": "login", "timestamp": millis(days_ago(1)), "details": { "timeSpent": 60 } }),
    );
    let declining = ProgressRecord::from_json(&json!({ "activity": activity }));
    let rate = improvement_rate(&declining, now);
    assert!((-100..=100).contains(&rate));
    assert!(rate < 0);

    // Quiet previous period, very busy current one.
    let mut activity = serde_json::Map::new();
    activity.insert(
        "old".to_string(),
        json!({ "type": "login", "timestamp": millis(days_ago(40)), "details": { "timeSpent": 60 } }),
    );
    for day in 0..25 {
        activity.insert(
            format!("new{day}"),
            json!({ "type": "lesson_completed", "timestamp": millis(days_ago(day)), "details": { "timeSpent": 3600 } }),
        );
    }
    let growing = ProgressRecord::from_json(&json!({ "activity": activity }));
    assert_eq!(improvement_rate(&growing, now), 100);
}

#[test]
fn snapshot_serializes_for_display_layer() {
    let now = clock().now();
    let progress = ProgressRecord::from_json(&json!({
        "streakDays": 3,
        "lessons": {
            "l1": { "completed": true, "completedAt": millis(days_ago(1)), "subject": "Art", "timeSpent": 120 }
        }
    }));
    let metrics = compute_metrics(&progress, None, now);
    let value = serde_json::to_value(&metrics).unwrap();

    assert_eq!(value["completionRate"], json!(100.0));
    assert_eq!(value["streakDays"], json!(3));
    assert_eq!(value["subjectProgress"]["Art"]["timeSpent"], json!(120));
    assert!(value["subjectProgress"]["Art"].get("quizScoreSum").is_none());
    assert!(value.get("daysSinceLastActive").is_none());
}

#[test]
fn extreme_time_spent_saturates_instead_of_overflowing() {
    let now = clock().now();
    let progress = ProgressRecord::from_json(&json!({
        "activity": {
            "a1": { "type": "login", "timestamp": millis(days_ago(1)), "details": { "timeSpent": 1e20 } },
            "a2": { "type": "login", "timestamp": millis(days_ago(2)), "details": { "timeSpent": 1e20 } },
            "a3": { "type": "login", "timestamp": millis(days_ago(3)), "details": { "timeSpent": -1e20 } }
        },
        "lessons": {
            "l1": { "completed": true, "completedAt": millis(days_ago(1)), "timeSpent": 1e20, "subject": "Art" },
            "l2": { "completed": true, "completedAt": millis(days_ago(2)), "timeSpent": 1e20, "subject": "Art" }
        },
        "quizzes": {
            "q1": { "completed": true, "score": 90, "completedAt": millis(days_ago(1)), "timeSpent": 1e20, "subject": "Art" }
        }
    }));
    let metrics = compute_metrics(&progress, None, now);

    assert_eq!(metrics.total_activities, 3);
    assert_eq!(metrics.total_time_spent, u64::MAX);
    assert_eq!(metrics.time_spent_last_week, u64::MAX);
    assert_eq!(metrics.time_spent_last_month, u64::MAX);
    assert_eq!(metrics.subject_progress["Art"].time_spent, u64::MAX);
    assert!(metrics.avg_session_length > 0.0);
    assert!(engagement_score(&metrics) <= 100);
    assert!((-100..=100).contains(&improvement_rate(&progress, now)));
}

#[test]
fn item_time_saturates_when_it_is_the_only_time_source() {
    let now = clock().now();
    let progress = ProgressRecord::from_json(&json!({
        "flashcardSets": {
            "fs1": { "mastered": true, "lastStudied": millis(days_ago(1)), "timeSpent": "1e300" },
            "fs2": { "mastered": false, "lastStudied": millis(days_ago(1)), "timeSpent": 1e300 }
        }
    }));
    let metrics = compute_metrics(&progress, None, now);

    assert_eq!(metrics.total_time_spent, u64::MAX);
    assert_eq!(metrics.subject_progress["General"].time_spent, u64::MAX);
    assert_eq!(metrics.completion_rate, 50.0);
}
