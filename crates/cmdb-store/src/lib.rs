//! `cmdb-store` — SQLite-backed audit trail of CMDB changes.
//!
//! A change groups the change operations recorded by one edit. Each
//! operation has a base row in `change_ops` plus a detail row in the table
//! named by its `final_class` (see [`types::CHANGE_OP_TABLES`]). Nothing
//! cascades in SQL: [`ChangeStore::delete_change`] walks every registered
//! detail table itself.

pub mod db;
pub mod error;
pub mod flatten;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use flatten::flatten_record;
pub use store::ChangeStore;
pub use types::{Change, ChangeOpDetail, PurgeSummary, CHANGE_OP_TABLES};
