use std::sync::Arc;

use chrono::Duration;
use cmdb_core::ModuleSettings;
use cmdb_scheduler::{ProcessContext, ProcessReport, ScheduledProcess, SchedulerError};
use cmdb_store::{ChangeStore, StoreError};
use tracing::info;

pub const MODULE_CODE: &str = "cmdb-change-purge";
pub const DEFAULT_RETENTION_DAYS: u32 = 180;
/// Changes fetched per round; the deadline is checked between deletes.
const BATCH_SIZE: usize = 100;

/// Deletes audit changes (and their operations) older than the retention
/// window.
pub struct ChangePurgeProcess {
    store: Arc<ChangeStore>,
    retention_days: u32,
}

impl ChangePurgeProcess {
    pub fn new(store: Arc<ChangeStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    /// Read `retention_days` from the module settings.
    pub fn from_settings(
        store: Arc<ChangeStore>,
        settings: &ModuleSettings,
    ) -> cmdb_scheduler::Result<Self> {
        let retention_days = settings.get("retention_days", DEFAULT_RETENTION_DAYS)?;
        Ok(Self::new(store, retention_days))
    }

    fn failed(e: StoreError) -> SchedulerError {
        SchedulerError::Process {
            module: MODULE_CODE.to_string(),
            reason: e.to_string(),
        }
    }
}

impl ScheduledProcess for ChangePurgeProcess {
    fn module_code(&self) -> &str {
        MODULE_CODE
    }

    fn process(&mut self, ctx: &ProcessContext<'_>) -> cmdb_scheduler::Result<ProcessReport> {
        let cutoff = ctx.started_at - Duration::days(i64::from(self.retention_days));
        ctx.trace
            .info(&format!("{MODULE_CODE}: deleting changes older than {cutoff}"));

        let mut report = ProcessReport::default();
        loop {
            let ids = self
                .store
                .change_ids_before(cutoff, BATCH_SIZE)
                .map_err(Self::failed)?;
            if ids.is_empty() {
                break;
            }
            for id in ids {
                if ctx.is_expired() {
                    info!(deleted = report.processed, "purge stopped at time limit");
                    return Ok(report);
                }
                self.store.delete_change(id).map_err(Self::failed)?;
                report.processed += 1;
            }
        }

        report.complete = true;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use chrono::{NaiveDate, NaiveDateTime};
    use cmdb_scheduler::{MemorySink, TraceLevel, TraceLog, TraceSink};
    use cmdb_store::ChangeOpDetail;
    use rusqlite::Connection;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn seeded_store() -> Arc<ChangeStore> {
        let store = ChangeStore::new(Connection::open_in_memory().unwrap()).unwrap();
        for d in [date(2023, 1, 1), date(2023, 6, 1), date(2024, 5, 1)] {
            let change = store.record_change(d, "admin", "csv-import").unwrap();
            store
                .record_change_op(change, "Person", 1, &ChangeOpDetail::Create)
                .unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn deletes_changes_outside_retention() {
        let store = seeded_store();
        let mut process = ChangePurgeProcess::new(store.clone(), 180);
        let sink = MemorySink::default();
        let trace = TraceLog::new(MODULE_CODE, TraceLevel::Info, TraceSink::Memory(sink.clone()));
        let ctx = ProcessContext {
            started_at: date(2024, 6, 1),
            deadline: Instant::now() + std::time::Duration::from_secs(60),
            trace: &trace,
        };

        let report = process.process(&ctx).unwrap();
        assert_eq!(
            report,
            ProcessReport {
                processed: 2,
                complete: true
            }
        );
        let left = store.list_changes().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].date, date(2024, 5, 1));
        assert_eq!(
            sink.lines(),
            vec!["cmdb-change-purge: deleting changes older than 2023-12-04 12:00:00".to_string()]
        );
    }

    #[test]
    fn expired_deadline_stops_before_deleting() {
        let store = seeded_store();
        let mut process = ChangePurgeProcess::new(store.clone(), 1);
        let trace = TraceLog::new(MODULE_CODE, TraceLevel::None, TraceSink::default());
        let ctx = ProcessContext {
            started_at: date(2024, 6, 1),
            deadline: Instant::now(),
            trace: &trace,
        };

        let report = process.process(&ctx).unwrap();
        assert!(!report.complete);
        assert_eq!(report.processed, 0);
        assert_eq!(store.list_changes().unwrap().len(), 3);
    }

    #[test]
    fn retention_comes_from_settings() {
        let settings = ModuleSettings::default();
        let process = ChangePurgeProcess::from_settings(seeded_store(), &settings).unwrap();
        assert_eq!(process.retention_days, DEFAULT_RETENTION_DAYS);

        let mut settings = ModuleSettings::default();
        settings
            .extra
            .insert("retention_days".to_string(), serde_json::json!(30));
        let process = ChangePurgeProcess::from_settings(seeded_store(), &settings).unwrap();
        assert_eq!(process.retention_days, 30);

        settings
            .extra
            .insert("retention_days".to_string(), serde_json::json!(-5));
        assert!(matches!(
            ChangePurgeProcess::from_settings(seeded_store(), &settings),
            Err(SchedulerError::Config(_))
        ));
    }
}
