//! Daily trigger at a fixed local time.
//!
//! The report is published once a day, so the scheduler sleeps until the
//! next occurrence of a wall-clock time in a fixed timezone (10:00
//! America/Bogota by default), runs the pipeline under its execution budget,
//! logs the outcome and goes back to sleep. A failed run is logged and the
//! next day's run is still scheduled.

use crate::error::PipelineError;
use crate::output::RunResponse;
use crate::run::Pipeline;
use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Default local trigger time.
pub const DEFAULT_RUN_AT: &str = "10:00";

/// Default trigger timezone.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Bogota;

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, PipelineError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| PipelineError::InvalidConfig(format!("invalid time of day '{s}' (expected HH:MM)")))
}

/// Parse an IANA timezone name such as `America/Bogota`.
pub fn parse_timezone(s: &str) -> Result<Tz, PipelineError> {
    s.trim()
        .parse::<Tz>()
        .map_err(|_| PipelineError::InvalidConfig(format!("unknown timezone '{s}'")))
}

/// Next instant strictly after `now` at which the local clock in `tz` reads `at`.
///
/// A local time skipped by a DST transition falls through to the next day.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();
    (0..=2u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|day| tz.from_local_datetime(&day.and_time(at)).earliest())
        .map(|local| local.with_timezone(&Utc))
        .find(|candidate| *candidate > now)
        .unwrap_or(now + chrono::Duration::days(1))
}

/// Time to sleep until [`next_run_after`].
pub fn duration_until_next(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> Duration {
    (next_run_after(now, at, tz) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Runs the pipeline once a day.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    at: NaiveTime,
    tz: Tz,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, at: NaiveTime, tz: Tz) -> Self {
        Self { pipeline, at, tz }
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run_forever())
    }

    pub async fn run_forever(self) {
        info!("Daily scheduler started: {} {}", self.at.format("%H:%M"), self.tz);
        loop {
            let wait = duration_until_next(Utc::now(), self.at, self.tz);
            info!(
                "Next scheduled run in {} hours {} minutes",
                wait.as_secs() / 3600,
                (wait.as_secs() % 3600) / 60
            );
            tokio::time::sleep(wait).await;

            info!("Scheduled run starting");
            let result = self.pipeline.run_with_timeout().await;
            let response = RunResponse::from_result(&result);
            match result {
                Ok(_) => info!("Scheduled run completed: {}", response.message),
                Err(e) => error!("Scheduled run failed: {}", e),
            }
        }
    }
}
