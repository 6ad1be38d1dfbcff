use std::sync::Arc;
use std::time::{Duration, Instant};

use cmdb_core::CmdbConfig;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    error::Result,
    process::{Clock, ProcessContext, ScheduledProcess},
    schedule::next_occurrence,
    trace::{TraceLevel, TraceLog, TraceSink},
    types::{Occurrence, ScheduleRule},
};

struct Slot {
    process: Box<dyn ScheduledProcess>,
    trace: TraceLog,
    /// `None` until the first successful scheduling decision, and again
    /// whenever one fails.
    next_run: Option<Occurrence>,
    /// Last scheduling failure already traced, so a bad setting is reported
    /// once rather than on every poll.
    last_error: Option<String>,
}

/// Host poller: decides which registered processes are due and runs them.
pub struct SchedulerEngine {
    config: CmdbConfig,
    clock: Arc<dyn Clock>,
    sink: TraceSink,
    slots: Vec<Slot>,
}

impl SchedulerEngine {
    pub fn new(config: CmdbConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            sink: TraceSink::Stdout,
            slots: Vec::new(),
        }
    }

    /// Send trace lines of processes registered afterwards to `sink`.
    pub fn with_trace_sink(mut self, sink: TraceSink) -> Self {
        self.sink = sink;
        self
    }

    /// Register a process. Fails when its trace level setting is invalid.
    pub fn register(&mut self, process: Box<dyn ScheduledProcess>) -> Result<()> {
        let code = process.module_code().to_string();
        let settings = self.config.module(&code);
        let threshold = TraceLevel::for_settings(&settings)?;
        info!(module = %code, ?threshold, "scheduled process registered");
        self.slots.push(Slot {
            process,
            trace: TraceLog::new(&code, threshold, self.sink.clone()),
            next_run: None,
            last_error: None,
        });
        Ok(())
    }

    /// Next planned run of `code`, if one has been computed.
    pub fn next_run(&self, code: &str) -> Option<Occurrence> {
        self.slots
            .iter()
            .find(|s| s.process.module_code() == code)
            .and_then(|s| s.next_run)
    }

    /// Compute the next occurrence of `code` from its current settings.
    pub fn schedule_for(&self, code: &str, now: Occurrence) -> Result<Occurrence> {
        let rule = ScheduleRule::from_settings(&self.config.module(code))?;
        Ok(next_occurrence(&rule, now))
    }

    /// Run every due process once. Returns how many processes ran.
    pub fn tick(&mut self) -> usize {
        let max_execution = Duration::from_secs(self.config.cron.max_execution_secs);
        let mut fired = 0;

        for i in 0..self.slots.len() {
            let now = self.clock.now();
            let code = self.slots[i].process.module_code().to_string();

            let scheduled = self.slots[i].next_run;
            let Some(next) = scheduled.or_else(|| self.plan(i, &code, now)) else {
                continue;
            };
            if now < next {
                continue;
            }

            let slot = &mut self.slots[i];
            slot.trace.info(&format!("{code}: starting run scheduled for {next}"));
            let ctx = ProcessContext {
                started_at: now,
                deadline: Instant::now() + max_execution,
                trace: &slot.trace,
            };
            match slot.process.process(&ctx) {
                Ok(report) => {
                    info!(
                        module = %code,
                        processed = report.processed,
                        complete = report.complete,
                        "process finished"
                    );
                    if !report.complete {
                        warn!(module = %code, "process stopped at its time limit");
                    }
                    slot.trace.info(&format!(
                        "{code}: processed {} item(s){}",
                        report.processed,
                        if report.complete { "" } else { " (time limit reached)" }
                    ));
                }
                Err(e) => {
                    error!(module = %code, "process failed: {e}");
                    slot.trace.error(&format!("{code}: {e}"));
                }
            }
            fired += 1;

            let after = self.clock.now();
            self.plan(i, &code, after);
        }
        fired
    }

    /// Recompute the next run of slot `i` from `now`. A failure leaves the
    /// slot unscheduled and is traced unless it repeats the previous one.
    fn plan(&mut self, i: usize, code: &str, now: Occurrence) -> Option<Occurrence> {
        let planned = self.schedule_for(code, now);
        let slot = &mut self.slots[i];
        match planned {
            Ok(next) => {
                info!(module = %code, %next, "next run scheduled");
                slot.next_run = Some(next);
                slot.last_error = None;
            }
            Err(e) => {
                let message = format!("{code}: {e}");
                if slot.last_error.as_deref() != Some(message.as_str()) {
                    error!(module = %code, "cannot schedule: {e}");
                    slot.trace.error(&message);
                    slot.last_error = Some(message);
                }
                slot.next_run = None;
            }
        }
        slot.next_run
    }

    /// Main event loop. Polls every `cron.poll_interval_secs` until
    /// `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let every = Duration::from_secs(self.config.cron.poll_interval_secs.max(1));
        info!(
            processes = self.slots.len(),
            poll_secs = every.as_secs(),
            "scheduler engine started"
        );

        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    // A dropped sender also means shut down.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use cmdb_core::ModuleSettings;

    use super::*;
    use crate::{
        process::{FixedClock, ProcessReport},
        trace::MemorySink,
    };

    struct Noop;

    impl ScheduledProcess for Noop {
        fn module_code(&self) -> &str {
            "noop"
        }

        fn process(&mut self, _ctx: &ProcessContext<'_>) -> Result<ProcessReport> {
            Ok(ProcessReport {
                processed: 0,
                complete: true,
            })
        }
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 59)
            .unwrap()
    }

    #[test]
    fn failed_reschedule_after_a_run_is_traced() {
        let clock = Arc::new(FixedClock::new(at(1, 2, 0)));
        let sink = MemorySink::default();
        let mut engine = SchedulerEngine::new(CmdbConfig::default(), clock.clone())
            .with_trace_sink(TraceSink::Memory(sink.clone()));
        engine.register(Box::new(Noop)).unwrap();
        engine.tick();
        assert_eq!(engine.next_run("noop"), Some(at(1, 3, 0)));

        // Settings go bad while the process is waiting for its run.
        let broken = ModuleSettings {
            time: "3 o'clock".to_string(),
            ..ModuleSettings::default()
        };
        engine.config.modules.insert("noop".to_string(), broken);

        clock.set(at(1, 3, 0));
        assert_eq!(engine.tick(), 1);
        assert_eq!(engine.next_run("noop"), None);

        // Later polls retry quietly while the error stays the same.
        clock.set(at(1, 3, 5));
        assert_eq!(engine.tick(), 0);
        assert_eq!(
            sink.lines(),
            vec!["noop: Invalid configuration: bad time format: 3 o'clock".to_string()]
        );

        // Fixing the setting schedules again.
        engine.config.modules.remove("noop");
        engine.tick();
        assert_eq!(engine.next_run("noop"), Some(at(2, 3, 0)));
    }
}
