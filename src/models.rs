use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const DEFAULT_SUBJECT: &str = "General";
pub const UNKNOWN_ACTIVITY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityKind {
    LessonCompleted,
    FlashcardStudied,
    QuizCompleted,
    ResourceViewed,
    CommunityPost,
    Login,
    Other(String),
}

impl ActivityKind {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("lesson_completed") => ActivityKind::LessonCompleted,
            Some("flashcard_studied") => ActivityKind::FlashcardStudied,
            Some("quiz_completed") => ActivityKind::QuizCompleted,
            Some("resource_viewed") => ActivityKind::ResourceViewed,
            Some("community_post") => ActivityKind::CommunityPost,
            Some("login") => ActivityKind::Login,
            Some(other) if !other.is_empty() => ActivityKind::Other(other.to_string()),
            _ => ActivityKind::Other(UNKNOWN_ACTIVITY.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActivityKind::LessonCompleted => "lesson_completed",
            ActivityKind::FlashcardStudied => "flashcard_studied",
            ActivityKind::QuizCompleted => "quiz_completed",
            ActivityKind::ResourceViewed => "resource_viewed",
            ActivityKind::CommunityPost => "community_post",
            ActivityKind::Login => "login",
            ActivityKind::Other(label) => label,
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub kind: ActivityKind,
    pub timestamp: Option<DateTime<Utc>>,
    /// Seconds.
    pub time_spent: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LessonProgress {
    pub completed: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub time_spent: u64,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlashcardSetProgress {
    /// Mastered or explicitly completed.
    pub mastered: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub time_spent: u64,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuizProgress {
    pub completed: bool,
    pub score: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub time_spent: u64,
    pub subject: Option<String>,
}

/// A read-only snapshot of one student's progress document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressRecord {
    pub last_active: Option<DateTime<Utc>>,
    pub streak_days: u32,
    pub points: u64,
    pub activity: BTreeMap<String, Activity>,
    pub lessons: BTreeMap<String, LessonProgress>,
    pub flashcard_sets: BTreeMap<String, FlashcardSetProgress>,
    pub quizzes: BTreeMap<String, QuizProgress>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProgress {
    pub total: u32,
    pub completed: u32,
    pub quiz_avg: f64,
    pub quiz_count: u32,
    pub time_spent: u64,
    #[serde(skip)]
    pub(crate) quiz_score_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,

    pub total_activities: u32,
    pub sessions_count: u32,
    pub average_activities_per_session: u32,
    pub avg_session_length: f64,
    pub activity_breakdown: BTreeMap<String, u32>,

    pub total_time_spent: u64,
    pub time_spent_last_week: u64,
    pub time_spent_last_month: u64,

    pub active_days: u32,
    pub total_days: u32,
    pub active_ratio: f64,

    pub total_items: u32,
    pub completed_items: u32,
    pub completion_rate: f64,
    pub lessons_total: u32,
    pub lessons_completed: u32,
    pub flashcard_sets_total: u32,
    pub flashcard_sets_mastered: u32,

    pub quizzes_taken: u32,
    pub quizzes_completed: u32,
    pub total_quiz_points: f64,
    pub quiz_avg_score: f64,
    pub quiz_high_score: f64,
    pub quiz_improvement: f64,

    pub streak_days: u32,
    pub points: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_last_active: Option<i64>,

    pub subject_progress: BTreeMap<String, SubjectProgress>,
}

impl MetricsSnapshot {
    pub fn empty(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            window_start,
            window_end,
            total_activities: 0,
            sessions_count: 0,
            average_activities_per_session: 0,
            avg_session_length: 0.0,
            activity_breakdown: BTreeMap::new(),
            total_time_spent: 0,
            time_spent_last_week: 0,
            time_spent_last_month: 0,
            active_days: 0,
            total_days: 0,
            active_ratio: 0.0,
            total_items: 0,
            completed_items: 0,
            completion_rate: 0.0,
            lessons_total: 0,
            lessons_completed: 0,
            flashcard_sets_total: 0,
            flashcard_sets_mastered: 0,
            quizzes_taken: 0,
            quizzes_completed: 0,
            total_quiz_points: 0.0,
            quiz_avg_score: 0.0,
            quiz_high_score: 0.0,
            quiz_improvement: 0.0,
            streak_days: 0,
            points: 0,
            days_since_last_active: None,
            subject_progress: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Moderate,
    High,
}

impl std::fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngagementLevel::Low => write!(f, "low"),
            EngagementLevel::Moderate => write!(f, "moderate"),
            EngagementLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub student_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub class_code: String,
    pub progress: ProgressRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub class_code: String,
    pub engagement_score: u32,
    pub engagement_level: EngagementLevel,
    pub improvement_rate: i32,
    pub needs_attention: bool,
    pub metrics: MetricsSnapshot,
}
