use std::collections::BTreeSet;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::models::{
    ActivityKind, MetricsSnapshot, ProgressRecord, SubjectProgress, DEFAULT_SUBJECT,
    UNKNOWN_ACTIVITY,
};
use crate::sessions::segment_sessions;

pub const DEFAULT_WINDOW_DAYS: i64 = 30;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
const MIN_QUIZZES_FOR_IMPROVEMENT: usize = 4;

/// Inclusive time range an aggregation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// The last `days` days up to `now`; starts at the earliest
    /// representable instant when `days` reaches past it.
    pub fn trailing(now: DateTime<Utc>, days: i64) -> Self {
        let start = Duration::try_days(days)
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: now }
    }

    /// The window of equal length ending just before this one starts.
    pub fn preceding(&self) -> Self {
        let span = self.end - self.start;
        Self {
            start: self
                .start
                .checked_sub_signed(span)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: self
                .start
                .checked_sub_signed(Duration::milliseconds(1))
                .unwrap_or(self.start),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    /// Whole days covered, rounded up, never below one.
    pub fn total_days(&self) -> u32 {
        let secs = (self.end - self.start).num_seconds().max(0);
        let days = (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
        days.max(1) as u32
    }
}

pub fn cutoff_date(since_days: i64, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let since_days = since_days.max(1);
    Duration::try_days(since_days)
        .and_then(|span| now.checked_sub_signed(span))
        .with_context(|| format!("a {since_days} day window reaches past the supported date range"))
}

/// Metrics for `[cutoff, now]`, or the trailing 30 days when no cutoff is given.
pub fn compute_metrics(
    progress: &ProgressRecord,
    cutoff: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> MetricsSnapshot {
    let window = match cutoff {
        Some(start) => Window { start, end: now },
        None => Window::trailing(now, DEFAULT_WINDOW_DAYS),
    };
    aggregate(progress, window, now)
}

/// Time spent, split into the full window plus the last week and month before `now`.
struct TimeTotals {
    total: u64,
    last_week: u64,
    last_month: u64,
    week_start: DateTime<Utc>,
    month_start: DateTime<Utc>,
    now: DateTime<Utc>,
}

impl TimeTotals {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            last_week: 0,
            last_month: 0,
            week_start: Window::trailing(now, 7).start,
            month_start: Window::trailing(now, DEFAULT_WINDOW_DAYS).start,
            now,
        }
    }

    fn add(&mut self, at: DateTime<Utc>, seconds: u64) {
        self.total = self.total.saturating_add(seconds);
        if at > self.now {
            return;
        }
        if at >= self.week_start {
            self.last_week = self.last_week.saturating_add(seconds);
        }
        if at >= self.month_start {
            self.last_month = self.last_month.saturating_add(seconds);
        }
    }
}

fn breakdown_label(kind: &ActivityKind) -> &str {
    match kind {
        ActivityKind::Other(label) if label == UNKNOWN_ACTIVITY => UNKNOWN_ACTIVITY,
        ActivityKind::Other(_) => "Other",
        known => known.as_str(),
    }
}

fn subject_bucket<'a>(
    snapshot: &'a mut MetricsSnapshot,
    subject: &Option<String>,
) -> &'a mut SubjectProgress {
    let name = subject.as_deref().unwrap_or(DEFAULT_SUBJECT);
    snapshot.subject_progress.entry(name.to_string()).or_default()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Second-half average minus first-half average of chronologically ordered
/// scores; 0 until enough quizzes exist to compare.
pub fn quiz_improvement(mut scored: Vec<(DateTime<Utc>, f64)>) -> f64 {
    if scored.len() < MIN_QUIZZES_FOR_IMPROVEMENT {
        return 0.0;
    }
    scored.sort_by_key(|(at, _)| *at);
    let scores: Vec<f64> = scored.into_iter().map(|(_, score)| score).collect();
    let (first, second) = scores.split_at(scores.len() / 2);
    mean(second) - mean(first)
}

pub fn aggregate(progress: &ProgressRecord, window: Window, now: DateTime<Utc>) -> MetricsSnapshot {
    let mut snapshot = MetricsSnapshot::empty(window.start, window.end);
    let mut time = TimeTotals::new(now);

    let mut timeline: Vec<(DateTime<Utc>, &ActivityKind, u64)> = progress
        .activity
        .values()
        .filter_map(|activity| {
            let at = activity.timestamp.filter(|at| window.contains(*at))?;
            Some((at, &activity.kind, activity.time_spent))
        })
        .collect();
    timeline.sort_by_key(|(at, _, _)| *at);

    let mut active_days: BTreeSet<NaiveDate> = BTreeSet::new();
    for (at, kind, seconds) in &timeline {
        time.add(*at, *seconds);
        active_days.insert(at.date_naive());
        *snapshot
            .activity_breakdown
            .entry(breakdown_label(kind).to_string())
            .or_insert(0) += 1;
    }

    let stamps: Vec<DateTime<Utc>> = timeline.iter().map(|(at, _, _)| *at).collect();
    let sessions = segment_sessions(&stamps);
    snapshot.total_activities = sessions.activity_count;
    snapshot.sessions_count = sessions.sessions_count();
    snapshot.average_activities_per_session = sessions.average_activities_per_session();

    snapshot.active_days = active_days.len() as u32;
    snapshot.total_days = window.total_days();
    snapshot.active_ratio =
        (snapshot.active_days as f64 / snapshot.total_days as f64 * 100.0).min(100.0);

    // Item time would double count what the activity log already recorded.
    let item_time_counts = progress.activity.is_empty();

    for lesson in progress.lessons.values() {
        let Some(at) = lesson.timestamp.filter(|at| window.contains(*at)) else {
            continue;
        };
        snapshot.total_items += 1;
        snapshot.lessons_total += 1;
        if lesson.completed {
            snapshot.completed_items += 1;
            snapshot.lessons_completed += 1;
        }
        if item_time_counts {
            time.add(at, lesson.time_spent);
        }
        let bucket = subject_bucket(&mut snapshot, &lesson.subject);
        bucket.total += 1;
        bucket.completed += u32::from(lesson.completed);
        bucket.time_spent = bucket.time_spent.saturating_add(lesson.time_spent);
    }

    for set in progress.flashcard_sets.values() {
        let Some(at) = set.timestamp.filter(|at| window.contains(*at)) else {
            continue;
        };
        snapshot.total_items += 1;
        snapshot.flashcard_sets_total += 1;
        if set.mastered {
            snapshot.completed_items += 1;
            snapshot.flashcard_sets_mastered += 1;
        }
        if item_time_counts {
            time.add(at, set.time_spent);
        }
        let bucket = subject_bucket(&mut snapshot, &set.subject);
        bucket.total += 1;
        bucket.completed += u32::from(set.mastered);
        bucket.time_spent = bucket.time_spent.saturating_add(set.time_spent);
    }

    let mut scored_quizzes: Vec<(DateTime<Utc>, f64)> = Vec::new();
    for quiz in progress.quizzes.values() {
        let Some(at) = quiz.timestamp.filter(|at| window.contains(*at)) else {
            continue;
        };
        snapshot.quizzes_taken += 1;
        if item_time_counts {
            time.add(at, quiz.time_spent);
        }
        let bucket = subject_bucket(&mut snapshot, &quiz.subject);
        bucket.time_spent = bucket.time_spent.saturating_add(quiz.time_spent);

        let Some(score) = quiz.score.filter(|_| quiz.completed) else {
            continue;
        };
        snapshot.quizzes_completed += 1;
        snapshot.total_quiz_points += score;
        snapshot.quiz_high_score = snapshot.quiz_high_score.max(score);
        scored_quizzes.push((at, score));

        let bucket = subject_bucket(&mut snapshot, &quiz.subject);
        bucket.quiz_score_sum += score;
        bucket.quiz_count += 1;
    }
    snapshot.quiz_improvement = quiz_improvement(scored_quizzes);

    snapshot.total_time_spent = time.total;
    snapshot.time_spent_last_week = time.last_week;
    snapshot.time_spent_last_month = time.last_month;

    if snapshot.quizzes_completed > 0 {
        snapshot.quiz_avg_score = snapshot.total_quiz_points / snapshot.quizzes_completed as f64;
    }
    if snapshot.total_items > 0 {
        snapshot.completion_rate =
            snapshot.completed_items as f64 / snapshot.total_items as f64 * 100.0;
    }
    if snapshot.sessions_count > 0 {
        snapshot.avg_session_length =
            snapshot.total_time_spent as f64 / snapshot.sessions_count as f64;
    }
    for bucket in snapshot.subject_progress.values_mut() {
        if bucket.quiz_count > 0 {
            bucket.quiz_avg = bucket.quiz_score_sum / bucket.quiz_count as f64;
        }
    }

    snapshot.streak_days = progress.streak_days;
    snapshot.points = progress.points;
    let last_seen = progress
        .last_active
        .or_else(|| progress.activity.values().filter_map(|a| a.timestamp).max());
    snapshot.days_since_last_active = last_seen.map(|at| (now - at).num_days().max(0));

    snapshot
}
