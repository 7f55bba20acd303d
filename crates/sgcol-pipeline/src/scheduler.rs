//! Daily scheduler
//!
//! Polls the wall clock every `check_interval` and runs the pipeline once the
//! configured time of day has passed. The run happens inline, so a check can
//! never overlap a run. Missed triggers are not caught up.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::Sleeper;
use crate::config::ScheduleConfig;
use crate::orchestrator::Orchestrator;

/// A fixed wall-clock time every day, in a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    run_at: NaiveTime,
    offset: FixedOffset,
}

impl DailySchedule {
    pub fn new(run_at: NaiveTime, offset: FixedOffset) -> Self {
        Self { run_at, offset }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.run_at, config.utc_offset)
    }

    /// First trigger strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        let local = now.with_timezone(&self.offset).naive_local();
        let today = local.date().and_time(self.run_at);
        let next = if today > local {
            today
        } else {
            today + chrono::Duration::days(1)
        };

        let utc = next - chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, self.offset)
    }
}

impl std::fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "daily at {} ({})", self.run_at.format("%H:%M"), self.offset)
    }
}

pub struct Scheduler {
    orchestrator: Orchestrator,
    schedule: DailySchedule,
    check_interval: Duration,
    sleeper: Arc<dyn Sleeper>,
    next_run: Option<DateTime<FixedOffset>>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Orchestrator,
        schedule: DailySchedule,
        check_interval: Duration,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            orchestrator,
            schedule,
            check_interval,
            sleeper,
            next_run: None,
        }
    }

    pub fn next_run(&self) -> Option<DateTime<FixedOffset>> {
        self.next_run
    }

    /// Run the pipeline if it is due at `now`; returns whether it ran.
    ///
    /// The first check only arms the schedule. A failed run is logged and
    /// the next trigger is scheduled as usual.
    pub async fn run_pending(&mut self, now: DateTime<Utc>) -> bool {
        let Some(due) = self.next_run else {
            let next = self.schedule.next_after(now);
            info!("Scheduler started. Pipeline will run {}", self.schedule);
            info!("Next run at {}", next);
            self.next_run = Some(next);
            return false;
        };

        if now < due {
            debug!(next_run = %due, "Pipeline not due yet");
            return false;
        }

        info!(scheduled_for = %due, "Running scheduled pipeline");
        self.orchestrator.run_logged(now).await;

        let next = self.schedule.next_after(now);
        info!("Next run at {}", next);
        self.next_run = Some(next);

        true
    }

    /// Check forever, once per `check_interval`
    pub async fn run_forever(mut self) {
        loop {
            self.run_pending(Utc::now()).await;
            self.sleeper.sleep(self.check_interval).await;
        }
    }
}
