use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::Deserialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    Activity, ActivityKind, FlashcardSetProgress, LessonProgress, ProgressRecord, QuizProgress,
    StudentRecord,
};

/// The four keyed collections of a progress document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Activity,
    Lessons,
    FlashcardSets,
    Quizzes,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Activity => "activity",
            Collection::Lessons => "lessons",
            Collection::FlashcardSets => "flashcardSets",
            Collection::Quizzes => "quizzes",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim() {
            "activity" => Ok(Collection::Activity),
            "lessons" => Ok(Collection::Lessons),
            "flashcardSets" | "flashcard_sets" => Ok(Collection::FlashcardSets),
            "quizzes" => Ok(Collection::Quizzes),
            other => anyhow::bail!("unknown progress collection `{other}`"),
        }
    }
}

/// One stored row of a student's progress document.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub collection: Collection,
    pub item_key: String,
    pub event_type: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub score: Option<f64>,
    pub time_spent: i64,
    pub subject: Option<String>,
}

/// Rebuilds a progress document from its stored rows. Later rows for the
/// same item replace earlier ones, so rows should arrive in time order.
pub fn assemble_progress(
    streak_days: i32,
    points: i64,
    last_active: Option<DateTime<Utc>>,
    events: &[ProgressEvent],
) -> ProgressRecord {
    let mut progress = ProgressRecord {
        last_active,
        streak_days: streak_days.max(0) as u32,
        points: points.max(0) as u64,
        ..Default::default()
    };

    for event in events {
        let key = event.item_key.clone();
        let time_spent = event.time_spent.max(0) as u64;
        match event.collection {
            Collection::Activity => {
                progress.activity.insert(
                    key,
                    Activity {
                        kind: ActivityKind::parse(event.event_type.as_deref()),
                        timestamp: event.occurred_at,
                        time_spent,
                    },
                );
            }
            Collection::Lessons => {
                progress.lessons.insert(
                    key,
                    LessonProgress {
                        completed: event.completed,
                        timestamp: event.occurred_at,
                        time_spent,
                        subject: event.subject.clone(),
                    },
                );
            }
            Collection::FlashcardSets => {
                progress.flashcard_sets.insert(
                    key,
                    FlashcardSetProgress {
                        mastered: event.completed,
                        timestamp: event.occurred_at,
                        time_spent,
                        subject: event.subject.clone(),
                    },
                );
            }
            Collection::Quizzes => {
                progress.quizzes.insert(
                    key,
                    QuizProgress {
                        completed: event.completed,
                        score: event.score,
                        timestamp: event.occurred_at,
                        time_spent,
                        subject: event.subject.clone(),
                    },
                );
            }
        }
    }

    progress
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_student(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    class_code: &str,
    streak_days: Option<i32>,
    points: Option<i64>,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO engagement_metrics.students
        (id, full_name, email, class_code, streak_days, points)
        VALUES ($1, $2, $3, $4, COALESCE($5, 0), COALESCE($6, 0))
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            class_code = EXCLUDED.class_code,
            streak_days = COALESCE($5, engagement_metrics.students.streak_days),
            points = COALESCE($6, engagement_metrics.students.points)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(class_code)
    .bind(streak_days)
    .bind(points)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert student {email}"))?
    .get("id");

    Ok(id)
}

async fn insert_event(
    pool: &PgPool,
    student_id: Uuid,
    event: &ProgressEvent,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO engagement_metrics.progress_events
        (id, student_id, collection, item_key, event_type, occurred_at,
         completed, score, time_spent, subject, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(event.collection.as_str())
    .bind(&event.item_key)
    .bind(&event.event_type)
    .bind(event.occurred_at)
    .bind(event.completed)
    .bind(event.score)
    .bind(event.time_spent.max(0))
    .bind(&event.subject)
    .bind(source_key)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    if let Some(occurred_at) = event.occurred_at {
        sqlx::query(
            r#"
            UPDATE engagement_metrics.students
            SET last_active = GREATEST(COALESCE(last_active, $2), $2)
            WHERE id = $1
            "#,
        )
        .bind(student_id)
        .bind(occurred_at)
        .execute(pool)
        .await?;
    }

    Ok(true)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("Avery Lee", "avery.lee@example.edu", "BIO-101", 12, 340),
        ("Jules Moreno", "jules.moreno@example.edu", "BIO-101", 2, 85),
        ("Kiara Patel", "kiara.patel@example.edu", "CHEM-201", 0, 15),
    ];

    let mut ids = HashMap::new();
    for (name, email, class_code, streak, points) in students {
        let id = upsert_student(pool, name, email, class_code, Some(streak), Some(points)).await?;
        ids.insert(email, id);
    }

    let events = vec![
        ("seed-001", "avery.lee@example.edu", Collection::Activity, "a1", Some("lesson_completed"), 1, 0, true, None, 900, "Biology"),
        ("seed-002", "avery.lee@example.edu", Collection::Activity, "a2", Some("quiz_completed"), 1, 15, true, Some(88.0), 600, "Biology"),
        ("seed-003", "avery.lee@example.edu", Collection::Activity, "a3", Some("flashcard_studied"), 3, 0, true, None, 1200, "Biology"),
        ("seed-004", "avery.lee@example.edu", Collection::Lessons, "cells-1", None, 1, 0, true, None, 900, "Biology"),
        ("seed-005", "avery.lee@example.edu", Collection::Quizzes, "cells-quiz", None, 1, 15, true, Some(88.0), 600, "Biology"),
        ("seed-006", "avery.lee@example.edu", Collection::FlashcardSets, "organelles", None, 3, 0, true, None, 1200, "Biology"),
        ("seed-007", "jules.moreno@example.edu", Collection::Activity, "a1", Some("resource_viewed"), 12, 0, false, None, 300, "Biology"),
        ("seed-008", "jules.moreno@example.edu", Collection::Lessons, "cells-1", None, 12, 0, false, None, 300, "Biology"),
        ("seed-009", "kiara.patel@example.edu", Collection::Quizzes, "bonds-quiz", None, 40, 0, true, Some(62.0), 500, "Chemistry"),
    ];

    let now = Utc::now();
    for (source_key, email, collection, item_key, event_type, days_ago, minutes, completed, score, time_spent, subject) in events {
        let student_id = ids
            .get(email)
            .copied()
            .with_context(|| format!("seed event {source_key} references unknown student"))?;
        let event = ProgressEvent {
            collection,
            item_key: item_key.to_string(),
            event_type: event_type.map(str::to_string),
            occurred_at: Some(now - Duration::days(days_ago) + Duration::minutes(minutes)),
            completed,
            score,
            time_spent,
            subject: Some(subject.to_string()),
        };
        insert_event(pool, student_id, &event, source_key).await?;
    }

    info!("seeded {} students", ids.len());
    Ok(())
}

pub async fn fetch_students(
    pool: &PgPool,
    class_code: Option<&str>,
    email: Option<&str>,
) -> anyhow::Result<Vec<StudentRecord>> {
    let mut query = String::from(
        "SELECT id, full_name, email, class_code, streak_days, points, last_active \
         FROM engagement_metrics.students",
    );

    if class_code.is_some() {
        query.push_str(" WHERE class_code = $1");
    } else if email.is_some() {
        query.push_str(" WHERE email = $1");
    }
    query.push_str(" ORDER BY full_name");

    let mut rows = sqlx::query(&query);

    if let Some(value) = class_code {
        rows = rows.bind(value);
    } else if let Some(value) = email {
        rows = rows.bind(value);
    }

    let student_rows = rows.fetch_all(pool).await?;
    let ids: Vec<Uuid> = student_rows.iter().map(|row| row.get("id")).collect();
    let mut events = fetch_events(pool, &ids).await?;

    let mut students = Vec::new();
    for row in student_rows {
        let student_id: Uuid = row.get("id");
        let student_events = events.remove(&student_id).unwrap_or_default();
        students.push(StudentRecord {
            student_id,
            full_name: row.get("full_name"),
            email: row.get("email"),
            class_code: row.get("class_code"),
            progress: assemble_progress(
                row.get("streak_days"),
                row.get("points"),
                row.get("last_active"),
                &student_events,
            ),
        });
    }

    debug!("loaded {} students", students.len());
    Ok(students)
}

async fn fetch_events(
    pool: &PgPool,
    student_ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, Vec<ProgressEvent>>> {
    let mut grouped: HashMap<Uuid, Vec<ProgressEvent>> = HashMap::new();
    if student_ids.is_empty() {
        return Ok(grouped);
    }

    let rows = sqlx::query(
        r#"
        SELECT student_id, collection, item_key, event_type, occurred_at,
               completed, score, time_spent, subject
        FROM engagement_metrics.progress_events
        WHERE student_id = ANY($1)
        ORDER BY occurred_at ASC NULLS FIRST, created_at ASC
        "#,
    )
    .bind(student_ids)
    .fetch_all(pool)
    .await?;

    for row in rows {
        let collection: String = row.get("collection");
        grouped
            .entry(row.get("student_id"))
            .or_default()
            .push(ProgressEvent {
                collection: Collection::parse(&collection)?,
                item_key: row.get("item_key"),
                event_type: row.get("event_type"),
                occurred_at: row.get("occurred_at"),
                completed: row.get("completed"),
                score: row.get("score"),
                time_spent: row.get("time_spent"),
                subject: row.get("subject"),
            });
    }

    Ok(grouped)
}

#[derive(Debug, Deserialize)]
pub struct CsvRow {
    pub full_name: String,
    pub email: String,
    pub class_code: String,
    pub collection: String,
    pub item_key: String,
    pub event_type: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
    pub score: Option<f64>,
    pub time_spent: Option<i64>,
    pub subject: Option<String>,
    pub streak_days: Option<i32>,
    pub points: Option<i64>,
    pub source_key: Option<String>,
}

impl CsvRow {
    pub fn to_event(&self) -> anyhow::Result<ProgressEvent> {
        Ok(ProgressEvent {
            collection: Collection::parse(&self.collection)?,
            item_key: self.item_key.clone(),
            event_type: self.event_type.clone().filter(|s| !s.trim().is_empty()),
            occurred_at: self.occurred_at,
            completed: self.completed.unwrap_or(false),
            score: self.score.filter(|s| s.is_finite()),
            time_spent: self.time_spent.unwrap_or(0).max(0),
            subject: self.subject.clone().filter(|s| !s.trim().is_empty()),
        })
    }
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV row {}", line + 1))?;
        let event = row
            .to_event()
            .with_context(|| format!("invalid CSV row {}", line + 1))?;
        let student_id = upsert_student(
            pool,
            &row.full_name,
            &row.email,
            &row.class_code,
            row.streak_days,
            row.points,
        )
        .await?;

        let source_key = row
            .source_key
            .clone()
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_event(pool, student_id, &event, &source_key).await? {
            inserted += 1;
        } else {
            debug!("skipping already imported event {source_key}");
        }
    }

    info!("imported {inserted} progress events from {}", csv_path.display());
    Ok(inserted)
}
