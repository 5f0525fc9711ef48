//! Scheduled restart.
//!
//! `bRestartTime` accepts either a local wall-clock time (`"04:30"`, next
//! occurrence) or a delay from startup (`"6h"`, `"30m"`, `"45s"`).

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RestartScheduleError {
    #[error("restart time is empty")]
    Empty,

    #[error("`{0}` is neither HH:MM nor a delay like 6h, 30m or 45s")]
    Unrecognised(String),

    #[error("restart delay must be greater than zero")]
    ZeroDelay,
}

/// When the restart fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartSchedule {
    /// Next occurrence of this local time.
    Daily(NaiveTime),
    /// Fixed delay after the scheduler starts.
    After(Duration),
}

impl RestartSchedule {
    pub fn parse(raw: &str) -> Result<Self, RestartScheduleError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RestartScheduleError::Empty);
        }

        if raw.contains(':') {
            return NaiveTime::parse_from_str(raw, "%H:%M")
                .map(RestartSchedule::Daily)
                .map_err(|_| RestartScheduleError::Unrecognised(raw.to_string()));
        }

        let split = raw.char_indices().last().map_or(0, |(i, _)| i);
        let (amount, unit) = raw.split_at(split);
        let amount: u64 = amount
            .parse()
            .map_err(|_| RestartScheduleError::Unrecognised(raw.to_string()))?;
        let seconds = match unit {
            "h" | "H" => amount.saturating_mul(3600),
            "m" | "M" => amount.saturating_mul(60),
            "s" | "S" => amount,
            _ => return Err(RestartScheduleError::Unrecognised(raw.to_string())),
        };
        if seconds == 0 {
            return Err(RestartScheduleError::ZeroDelay);
        }
        Ok(RestartSchedule::After(Duration::from_secs(seconds)))
    }

    /// Time left until the restart, measured from `now` (local wall clock).
    pub fn delay_from(&self, now: NaiveDateTime) -> Duration {
        match self {
            RestartSchedule::After(delay) => *delay,
            RestartSchedule::Daily(at) => {
                let mut target = now.date().and_time(*at);
                if target <= now {
                    target += TimeDelta::days(1);
                }
                (target - now).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

impl std::fmt::Display for RestartSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartSchedule::Daily(at) => write!(f, "daily at {}", at.format("%H:%M")),
            RestartSchedule::After(delay) => write!(f, "after {}s", delay.as_secs()),
        }
    }
}

/// What happens when the restart fires.
pub trait RestartHook: Send + Sync + 'static {
    fn restart(&self) -> BoxFuture<'static, ()>;
}

/// Asks the running service to shut down gracefully and exit with status 0,
/// leaving the actual restart to the process supervisor.
#[derive(Debug, Clone)]
pub struct SupervisedRestart {
    requests: mpsc::Sender<()>,
}

impl SupervisedRestart {
    pub fn new(requests: mpsc::Sender<()>) -> Self {
        Self { requests }
    }
}

impl RestartHook for SupervisedRestart {
    fn restart(&self) -> BoxFuture<'static, ()> {
        let requests = self.requests.clone();
        Box::pin(async move {
            if requests.send(()).await.is_err() {
                tracing::warn!(target: "backend", "Restart requested but nobody is listening");
            }
        })
    }
}

pub struct RestartTask {
    schedule: RestartSchedule,
    hook: Arc<dyn RestartHook>,
}

impl RestartTask {
    pub fn new(schedule: RestartSchedule, hook: Arc<dyn RestartHook>) -> Self {
        Self { schedule, hook }
    }

    pub fn schedule(&self) -> RestartSchedule {
        self.schedule
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let delay = self.schedule.delay_from(Local::now().naive_local());
        tracing::info!(
            target: "backend",
            schedule = %self.schedule,
            in_secs = delay.as_secs(),
            "Auto restart scheduled"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                tracing::info!(target: "backend", "Auto restart triggered");
                self.hook.restart().await;
            }
            _ = shutdown.recv() => {
                tracing::debug!("Restart task cancelled by shutdown");
            }
        }
    }
}
