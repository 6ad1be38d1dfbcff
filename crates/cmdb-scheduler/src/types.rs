use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

use crate::error::{Result, SchedulerError};

/// A computed run timestamp, in local wall-clock time.
pub type Occurrence = NaiveDateTime;

/// Sentinel returned for disabled processes: 3000-01-01 00:00:00.
pub fn never() -> Occurrence {
    NaiveDate::from_ymd_opt(3000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MAX)
}

/// ISO weekdays (Monday = 1 … Sunday = 7) on which a process may run.
///
/// Never empty; iteration is ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekdaySet(BTreeSet<u8>);

impl WeekdaySet {
    pub fn from_days(days: impl IntoIterator<Item = u8>) -> Result<Self> {
        let mut set = BTreeSet::new();
        for day in days {
            if !(1..=7).contains(&day) {
                return Err(SchedulerError::InvalidConfiguration(format!(
                    "weekday out of range: {day}"
                )));
            }
            set.insert(day);
        }
        if set.is_empty() {
            return Err(SchedulerError::InvalidConfiguration(
                "missing weekday configuration".to_string(),
            ));
        }
        Ok(Self(set))
    }

    pub fn contains(&self, day: u8) -> bool {
        self.0.contains(&day)
    }

    /// Earliest configured weekday.
    pub fn first(&self) -> u8 {
        // Non-empty by construction.
        self.0.first().copied().unwrap_or(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Target time of day. The second is always 59.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, minute, 59)
            .map(Self)
            .ok_or_else(|| {
                SchedulerError::InvalidConfiguration(format!("bad time format: {hour}:{minute}"))
            })
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn second(&self) -> u32 {
        self.0.second()
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M:%S"))
    }
}

/// Recurrence configuration of one scheduled process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleRule {
    pub week_days: WeekdaySet,
    pub time: TimeOfDay,
    pub enabled: bool,
}
