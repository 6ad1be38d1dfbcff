//! `cmdb-scheduler` — weekday/time-of-day recurrence for CMDB background tasks.
//!
//! # Overview
//!
//! A scheduled process is configured with a list of weekdays and a time of
//! day (`[modules.<code>]` in `cmdb.toml`). [`schedule::next_occurrence`]
//! turns that rule plus the current wall-clock time into the next run
//! timestamp; it is pure and never touches config, clock or I/O itself.
//!
//! The [`engine::SchedulerEngine`] is the host poller: it asks every
//! registered [`process::ScheduledProcess`] for its next occurrence, runs the
//! ones that are due and recomputes.
//!
//! | Setting     | Default                                                     |
//! |-------------|-------------------------------------------------------------|
//! | `enabled`   | `true` (disabled processes are parked at [`types::never`])  |
//! | `week_days` | `"monday, tuesday, wednesday, thursday, friday, saturday, sunday"` |
//! | `time`      | `"03:00"` (seconds are always forced to `59`)               |
//! | `debug`     | `false` (trace threshold `error`; `true` means `info`)      |

pub mod engine;
pub mod error;
pub mod process;
pub mod schedule;
pub mod trace;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use process::{Clock, ProcessContext, ProcessReport, ScheduledProcess, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use process::FixedClock;
pub use schedule::{next_occurrence, parse_time_of_day, parse_week_days};
pub use trace::{Severity, TraceLevel, TraceLog, TraceSink};
#[cfg(any(test, feature = "test-util"))]
pub use trace::MemorySink;
pub use types::{never, Occurrence, ScheduleRule, TimeOfDay, WeekdaySet};
