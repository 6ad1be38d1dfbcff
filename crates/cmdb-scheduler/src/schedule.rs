use chrono::{Datelike, Duration, Timelike};
use cmdb_core::ModuleSettings;

use crate::{
    error::{Result, SchedulerError},
    types::{never, Occurrence, ScheduleRule, TimeOfDay, WeekdaySet},
};

const WEEKDAY_NAMES: [(&str, u8); 7] = [
    ("monday", 1),
    ("tuesday", 2),
    ("wednesday", 3),
    ("thursday", 4),
    ("friday", 5),
    ("saturday", 6),
    ("sunday", 7),
];

/// Parse a comma-separated list of English weekday names (case-insensitive,
/// whitespace around each name ignored) into ISO weekday numbers.
pub fn parse_week_days(raw: &str) -> Result<WeekdaySet> {
    let mut days = Vec::new();
    if !raw.is_empty() {
        for token in raw.split(',') {
            let name = token.trim().to_lowercase();
            let day = WEEKDAY_NAMES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, d)| *d)
                .ok_or_else(|| {
                    SchedulerError::InvalidConfiguration(format!("unrecognized weekday: {name}"))
                })?;
            days.push(day);
        }
    }
    WeekdaySet::from_days(days)
}

/// Parse `H:MM[:SS]` (hour 0-23, minute and second 0-59, one or two digits
/// each). Any seconds given are discarded: the result always has second 59.
pub fn parse_time_of_day(raw: &str) -> Result<TimeOfDay> {
    let bad = || SchedulerError::InvalidConfiguration(format!("bad time format: {raw}"));

    let fields: Vec<&str> = raw.split(':').collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(bad());
    }
    let mut values = [0u32; 3];
    for (slot, field) in values.iter_mut().zip(&fields) {
        if field.is_empty() || field.len() > 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        *slot = field.parse().map_err(|_| bad())?;
    }
    let [hour, minute, second] = values;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(bad());
    }
    TimeOfDay::new(hour, minute)
}

impl ScheduleRule {
    /// Build the rule for a process from its module settings.
    ///
    /// The weekday and time strings of a disabled process are not parsed, so
    /// a disabled process never fails to schedule.
    pub fn from_settings(settings: &ModuleSettings) -> Result<Self> {
        if !settings.enabled {
            return Ok(Self {
                week_days: WeekdaySet::from_days(1..=7)?,
                time: TimeOfDay::new(0, 0)?,
                enabled: false,
            });
        }
        Ok(Self {
            week_days: parse_week_days(&settings.week_days)?,
            time: parse_time_of_day(&settings.time)?,
            enabled: true,
        })
    }
}

/// Compute the next time `rule` fires, strictly after `now`.
///
/// Scans from today to Sunday for the first enabled weekday. Today only
/// qualifies while its `HH:MM` is still ahead of the current `HH:MM`;
/// otherwise the first enabled weekday of next week is used. The result
/// always carries the rule's time with second 59.
pub fn next_occurrence(rule: &ScheduleRule, now: Occurrence) -> Occurrence {
    if !rule.enabled {
        return never();
    }

    let today = now.weekday().number_from_monday() as u8;
    // Same ordering as comparing zero-padded "HH:MM" strings.
    let time_not_reached = (now.hour(), now.minute()) < (rule.time.hour(), rule.time.minute());

    let chosen = (today..=7)
        .find(|&day| rule.week_days.contains(day) && (day > today || time_not_reached));

    let date = match chosen {
        Some(day) => now.date() + Duration::days(i64::from(day - today)),
        None => {
            let back = i64::from(today) - i64::from(rule.week_days.first());
            now.date() - Duration::days(back) + Duration::days(7)
        }
    };

    date.and_time(rule.time.as_naive_time())
}
