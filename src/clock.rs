use chrono::{DateTime, NaiveDate, Utc};

/// Source of "now" for every windowed computation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant, used for `--as-of` runs and tests.
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }

    /// End of the given day (23:59:59 UTC), so that everything recorded on
    /// that day is inside the window.
    pub fn end_of_day(date: NaiveDate) -> Option<Self> {
        date.and_hms_opt(23, 59, 59)
            .map(|naive| Self::new(naive.and_utc()))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

pub fn clock_for(as_of: Option<NaiveDate>) -> anyhow::Result<Box<dyn Clock>> {
    match as_of {
        Some(date) => {
            let clock = FixedClock::end_of_day(date)
                .ok_or_else(|| anyhow::anyhow!("cannot build an end-of-day instant for {date}"))?;
            Ok(Box::new(clock))
        }
        None => Ok(Box::new(SystemClock)),
    }
}
