//! Decoding of a student's progress document as the remote store hands it out.
//!
//! The store is schemaless and a new student's document is mostly empty, so
//! decoding never fails: missing or malformed collections become empty maps,
//! malformed entries are skipped and bad scalars fall back to their defaults.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, warn};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::models::{
    Activity, ActivityKind, FlashcardSetProgress, LessonProgress, ProgressRecord, QuizProgress,
};

const TIMESTAMP_FIELDS: [&str; 4] = ["timestamp", "completedAt", "lastStudied", "lastAccessed"];

impl ProgressRecord {
    pub fn from_json(value: &Value) -> Self {
        let Some(root) = value.as_object() else {
            if !value.is_null() {
                warn!("progress document is not an object; treating it as empty");
            }
            return ProgressRecord::default();
        };

        ProgressRecord {
            last_active: root.get("lastActive").and_then(parse_timestamp),
            streak_days: non_negative_int(root.get("streakDays")) as u32,
            points: non_negative_int(root.get("points")),
            activity: decode_collection(root, "activity", decode_activity),
            lessons: decode_collection(root, "lessons", decode_lesson),
            flashcard_sets: decode_collection(root, "flashcardSets", decode_flashcard_set),
            quizzes: decode_collection(root, "quizzes", decode_quiz),
        }
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_json(&value))
    }
}

impl<'de> Deserialize<'de> for ProgressRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(ProgressRecord::from_json(&value))
    }
}

/// Accepts epoch milliseconds (number or numeric string) and RFC 3339 strings.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => number.as_f64().and_then(from_epoch_millis),
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(millis) = raw.parse::<f64>() {
                return from_epoch_millis(millis);
            }
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc))
        }
        _ => None,
    }
}

fn from_epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn entry_timestamp(entry: &Map<String, Value>) -> Option<DateTime<Utc>> {
    TIMESTAMP_FIELDS
        .iter()
        .find_map(|field| entry.get(*field).and_then(parse_timestamp))
}

fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn non_negative_int(value: Option<&Value>) -> u64 {
    number(value).map(|n| n.max(0.0) as u64).unwrap_or(0)
}

/// Seconds, clamped to zero so accumulators never shrink.
fn seconds(value: Option<&Value>) -> u64 {
    number(value).map(|n| n.max(0.0).round() as u64).unwrap_or(0)
}

fn flag(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn decode_collection<T>(
    root: &Map<String, Value>,
    field: &str,
    decode: fn(&Map<String, Value>) -> T,
) -> BTreeMap<String, T> {
    let mut decoded = BTreeMap::new();

    // The store turns maps with dense integer keys into arrays.
    let entries: Vec<(String, &Value)> = match root.get(field) {
        None | Some(Value::Null) => return decoded,
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx.to_string(), v))
            .collect(),
        Some(_) => {
            warn!("`{field}` is not a collection; treating it as empty");
            return decoded;
        }
    };

    for (key, value) in entries {
        match value.as_object() {
            Some(entry) => {
                decoded.insert(key, decode(entry));
            }
            None if value.is_null() => {}
            None => debug!("skipping malformed `{field}` entry {key}"),
        }
    }

    decoded
}

fn decode_activity(entry: &Map<String, Value>) -> Activity {
    let details = entry.get("details").and_then(Value::as_object);
    let detail = |name: &str| details.and_then(|d| d.get(name));

    Activity {
        kind: ActivityKind::parse(entry.get("type").and_then(Value::as_str)),
        timestamp: entry_timestamp(entry),
        time_spent: seconds(detail("timeSpent")),
    }
}

fn decode_lesson(entry: &Map<String, Value>) -> LessonProgress {
    LessonProgress {
        completed: flag(entry.get("completed")),
        timestamp: entry_timestamp(entry),
        time_spent: seconds(entry.get("timeSpent")),
        subject: text(entry.get("subject")),
    }
}

fn decode_flashcard_set(entry: &Map<String, Value>) -> FlashcardSetProgress {
    FlashcardSetProgress {
        mastered: flag(entry.get("mastered")) || flag(entry.get("completed")),
        timestamp: entry_timestamp(entry),
        time_spent: seconds(entry.get("timeSpent")),
        subject: text(entry.get("subject")),
    }
}

fn decode_quiz(entry: &Map<String, Value>) -> QuizProgress {
    QuizProgress {
        completed: flag(entry.get("completed")),
        score: number(entry.get("score")),
        timestamp: entry_timestamp(entry),
        time_spent: seconds(entry.get("timeSpent")),
        subject: text(entry.get("subject")),
    }
}
