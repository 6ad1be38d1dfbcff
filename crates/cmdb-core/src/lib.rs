//! Shared configuration and error types for the CMDB housekeeping crates.

pub mod config;
pub mod error;

pub use config::{CmdbConfig, CronConfig, DatabaseConfig, ModuleSettings};
pub use error::{CoreError, Result};
