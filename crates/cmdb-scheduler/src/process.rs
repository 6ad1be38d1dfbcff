#[cfg(any(test, feature = "test-util"))]
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};

use crate::{error::Result, trace::TraceLog};

/// Source of the current local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock. Only built for tests and with the `test-util`
/// feature.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug)]
pub struct FixedClock(Mutex<NaiveDateTime>);

#[cfg(any(test, feature = "test-util"))]
impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What a process gets for one run.
pub struct ProcessContext<'a> {
    /// Wall-clock time the run was triggered at.
    pub started_at: NaiveDateTime,
    /// The process should stop taking on new work past this instant.
    pub deadline: Instant,
    pub trace: &'a TraceLog,
}

impl ProcessContext<'_> {
    pub fn time_left(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Number of items handled.
    pub processed: usize,
    /// False when the deadline cut the run short; the rest is picked up at
    /// the next occurrence.
    pub complete: bool,
}

/// A background task run by the [`crate::engine::SchedulerEngine`] on the
/// weekdays and time configured under `[modules.<module_code>]`.
pub trait ScheduledProcess: Send {
    fn module_code(&self) -> &str;

    fn process(&mut self, ctx: &ProcessContext<'_>) -> Result<ProcessReport>;
}
