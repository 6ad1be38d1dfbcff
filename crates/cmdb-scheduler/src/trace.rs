//! Leveled trace output for scheduled processes (the cron log an operator
//! reads). Each line is also mirrored to `tracing`.

use std::io::{self, Write};
use std::str::FromStr;
#[cfg(any(test, feature = "test-util"))]
use std::sync::{Arc, Mutex, PoisonError};

use cmdb_core::ModuleSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SchedulerError};

/// Minimum severity a trace line needs to be printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    None,
    Info,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

impl TraceLevel {
    pub fn allows(self, severity: Severity) -> bool {
        match self {
            TraceLevel::None => false,
            TraceLevel::Info => true,
            TraceLevel::Error => severity == Severity::Error,
        }
    }

    /// Threshold for a module: `debug_level` when set, otherwise `info` with
    /// `debug = true` and `error` with `debug = false`.
    pub fn for_settings(settings: &ModuleSettings) -> Result<Self> {
        match settings.debug_level.as_deref() {
            Some(level) => level.parse(),
            None if settings.debug => Ok(TraceLevel::Info),
            None => Ok(TraceLevel::Error),
        }
    }
}

impl FromStr for TraceLevel {
    type Err = SchedulerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(TraceLevel::None),
            "info" => Ok(TraceLevel::Info),
            "error" => Ok(TraceLevel::Error),
            other => Err(SchedulerError::InvalidConfiguration(format!(
                "unexpected trace level: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Write `message` to `sink` as one line if `threshold` allows `severity`.
pub fn trace<W: Write>(
    sink: &mut W,
    message: &str,
    severity: Severity,
    threshold: TraceLevel,
) -> io::Result<()> {
    if threshold.allows(severity) {
        writeln!(sink, "{message}")?;
    }
    Ok(())
}

/// In-memory sink for capturing trace output; clones share the same buffer.
/// Only built for tests and with the `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

#[cfg(any(test, feature = "test-util"))]
impl MemorySink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(String::from).collect()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where trace lines go.
#[derive(Debug, Clone, Default)]
pub enum TraceSink {
    #[default]
    Stdout,
    #[cfg(any(test, feature = "test-util"))]
    Memory(MemorySink),
}

impl TraceSink {
    fn emit(&self, message: &str, severity: Severity, threshold: TraceLevel) -> io::Result<()> {
        match self {
            TraceSink::Stdout => trace(&mut io::stdout().lock(), message, severity, threshold),
            #[cfg(any(test, feature = "test-util"))]
            TraceSink::Memory(sink) => trace(&mut sink.clone(), message, severity, threshold),
        }
    }
}

/// Trace output of one scheduled process.
#[derive(Debug, Clone)]
pub struct TraceLog {
    module: String,
    threshold: TraceLevel,
    sink: TraceSink,
}

impl TraceLog {
    pub fn new(module: &str, threshold: TraceLevel, sink: TraceSink) -> Self {
        Self {
            module: module.to_string(),
            threshold,
            sink,
        }
    }

    pub fn threshold(&self) -> TraceLevel {
        self.threshold
    }

    pub fn info(&self, message: &str) {
        self.emit(message, Severity::Info);
    }

    pub fn error(&self, message: &str) {
        self.emit(message, Severity::Error);
    }

    pub fn emit(&self, message: &str, severity: Severity) {
        let module = self.module.as_str();
        if !self.threshold.allows(severity) {
            debug!(module, %severity, "{message}");
        } else if severity == Severity::Error {
            error!(module, "{message}");
        } else {
            info!(module, "{message}");
        }
        if let Err(e) = self.sink.emit(message, severity, self.threshold) {
            warn!(module, "trace write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printed(threshold: TraceLevel, severity: Severity) -> String {
        let mut out = Vec::new();
        trace(&mut out, "hello", severity, threshold).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn filtering_matrix() {
        assert_eq!(printed(TraceLevel::Info, Severity::Info), "hello\n");
        assert_eq!(printed(TraceLevel::Info, Severity::Error), "hello\n");
        assert_eq!(printed(TraceLevel::Error, Severity::Info), "");
        assert_eq!(printed(TraceLevel::Error, Severity::Error), "hello\n");
        assert_eq!(printed(TraceLevel::None, Severity::Info), "");
        assert_eq!(printed(TraceLevel::None, Severity::Error), "");
    }

    #[test]
    fn level_parsing() {
        assert_eq!("none".parse::<TraceLevel>().unwrap(), TraceLevel::None);
        assert_eq!("info".parse::<TraceLevel>().unwrap(), TraceLevel::Info);
        assert_eq!("error".parse::<TraceLevel>().unwrap(), TraceLevel::Error);
        let err = "verbose".parse::<TraceLevel>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: unexpected trace level: verbose"
        );
    }

    #[test]
    fn threshold_follows_debug_flag_unless_level_is_explicit() {
        let mut settings = ModuleSettings::default();
        assert_eq!(TraceLevel::for_settings(&settings).unwrap(), TraceLevel::Error);
        settings.debug = true;
        assert_eq!(TraceLevel::for_settings(&settings).unwrap(), TraceLevel::Info);
        settings.debug_level = Some("none".to_string());
        assert_eq!(TraceLevel::for_settings(&settings).unwrap(), TraceLevel::None);
        settings.debug_level = Some("loud".to_string());
        assert!(TraceLevel::for_settings(&settings).is_err());
    }

    #[test]
    fn trace_log_writes_to_memory_sink() {
        let sink = MemorySink::default();
        let log = TraceLog::new("purge", TraceLevel::Error, TraceSink::Memory(sink.clone()));
        log.info("starting");
        log.error("boom");
        assert_eq!(sink.lines(), vec!["boom".to_string()]);
    }
}
