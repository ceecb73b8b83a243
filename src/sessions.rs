use chrono::{DateTime, Duration, Utc};

/// Gap after which the next activity opens a new study session.
pub const SESSION_GAP_MS: i64 = 30 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Timestamp of the latest activity in the session.
    pub end: DateTime<Utc>,
    pub activity_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub sessions: Vec<Session>,
    pub activity_count: u32,
}

impl SessionSummary {
    pub fn sessions_count(&self) -> u32 {
        self.sessions.len() as u32
    }

    pub fn average_activities_per_session(&self) -> u32 {
        if self.sessions.is_empty() {
            return 0;
        }
        (self.activity_count as f64 / self.sessions.len() as f64).round() as u32
    }
}

/// Splits an ascending timeline into sessions in a single pass.
///
/// A session starts at the first activity and at every activity that follows
/// its predecessor by strictly more than [`SESSION_GAP_MS`].
pub fn segment_sessions(timeline: &[DateTime<Utc>]) -> SessionSummary {
    let gap = Duration::milliseconds(SESSION_GAP_MS);
    let mut sessions: Vec<Session> = Vec::new();

    for &at in timeline {
        match sessions.last_mut() {
            Some(current) if at - current.end <= gap => {
                current.end = at;
                current.activity_count += 1;
            }
            _ => sessions.push(Session {
                end: at,
                activity_count: 1,
            }),
        }
    }

    SessionSummary {
        activity_count: timeline.len() as u32,
        sessions,
    }
}
