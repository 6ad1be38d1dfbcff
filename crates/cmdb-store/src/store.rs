use std::sync::Mutex;

use chrono::NaiveDateTime;
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    db::init_db,
    error::{Result, StoreError},
    flatten::flatten_record,
    types::{Change, ChangeOpDetail, PurgeSummary, CHANGE_OP_TABLES, DATE_FORMAT},
};

/// Change history store.
///
/// Deletes are best effort: each statement commits on its own and nothing
/// is rolled back if a later one fails.
pub struct ChangeStore {
    db: Mutex<Connection>,
}

impl ChangeStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Record a new change and return its id.
    pub fn record_change(
        &self,
        date: NaiveDateTime,
        user_info: &str,
        origin: &str,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO changes (date, user_info, origin) VALUES (?1, ?2, ?3)",
            params![date.format(DATE_FORMAT).to_string(), user_info, origin],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Record one operation under `change_id`: the base row, then its detail row.
    pub fn record_change_op(
        &self,
        change_id: i64,
        obj_class: &str,
        obj_key: i64,
        detail: &ChangeOpDetail,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let date: Option<String> = db
            .query_row(
                "SELECT date FROM changes WHERE id = ?1",
                [change_id],
                |row| row.get(0),
            )
            .optional()?;
        let date = date.ok_or(StoreError::ChangeNotFound { id: change_id })?;

        db.execute(
            "INSERT INTO change_ops (change_id, obj_class, obj_key, final_class, date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![change_id, obj_class, obj_key, detail.final_class(), date],
        )?;
        let id = db.last_insert_rowid();

        match detail {
            ChangeOpDetail::Create => {
                db.execute("INSERT INTO change_op_create (id) VALUES (?1)", [id])?;
            }
            ChangeOpDetail::Delete { friendly_name } => {
                db.execute(
                    "INSERT INTO change_op_delete (id, friendly_name) VALUES (?1, ?2)",
                    params![id, friendly_name],
                )?;
            }
            ChangeOpDetail::SetAttribute {
                att_code,
                old_value,
                new_value,
            } => {
                db.execute(
                    "INSERT INTO change_op_set_attribute (id, att_code, old_value, new_value)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, att_code, old_value, new_value],
                )?;
            }
            ChangeOpDetail::PlainText { text } => {
                db.execute(
                    "INSERT INTO change_op_plain_text (id, text) VALUES (?1, ?2)",
                    params![id, text],
                )?;
            }
        }
        Ok(id)
    }

    pub fn get_change(&self, id: i64) -> Result<Change> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, date, user_info, origin FROM changes WHERE id = ?1",
            [id],
            row_to_change,
        )
        .optional()?
        .ok_or(StoreError::ChangeNotFound { id })
    }

    /// All changes, oldest first.
    pub fn list_changes(&self) -> Result<Vec<Change>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT id, date, user_info, origin FROM changes ORDER BY date, id")?;
        let changes = stmt
            .query_map([], row_to_change)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(changes)
    }

    /// Ids of changes dated strictly before `cutoff`, oldest first.
    pub fn change_ids_before(&self, cutoff: NaiveDateTime, limit: usize) -> Result<Vec<i64>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT id FROM changes WHERE date < ?1 ORDER BY date, id LIMIT ?2")?;
        let ids = stmt
            .query_map(
                params![
                    cutoff.format(DATE_FORMAT).to_string(),
                    i64::try_from(limit).unwrap_or(i64::MAX)
                ],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Number of base operation rows recorded under `change_id`.
    pub fn count_operations(&self, change_id: i64) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM change_ops WHERE change_id = ?1",
            [change_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Delete every operation of `change_id`, one registered detail table at
    /// a time (detail rows first, then their base rows). Returns the number
    /// of operations deleted.
    pub fn delete_change_operations(&self, change_id: i64) -> Result<usize> {
        let db = self.db.lock().unwrap();
        delete_operations(&db, change_id)
    }

    /// Delete `change_id` together with all its operations. Returns the
    /// number of operations deleted.
    pub fn delete_change(&self, change_id: i64) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let exists: Option<i64> = db
            .query_row("SELECT id FROM changes WHERE id = ?1", [change_id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::ChangeNotFound { id: change_id });
        }

        let operations = delete_operations(&db, change_id)?;
        db.execute("DELETE FROM changes WHERE id = ?1", [change_id])?;
        info!(change_id, operations, "change deleted");
        Ok(operations)
    }

    /// Delete every change dated strictly before `cutoff`.
    pub fn delete_changes_before(&self, cutoff: NaiveDateTime) -> Result<PurgeSummary> {
        let mut summary = PurgeSummary::default();
        for id in self.change_ids_before(cutoff, usize::MAX)? {
            summary.operations += self.delete_change(id)?;
            summary.changes += 1;
        }
        info!(
            %cutoff,
            changes = summary.changes,
            operations = summary.operations,
            "old changes purged"
        );
        Ok(summary)
    }

    /// Flatten one row of `table`; see [`flatten_record`].
    pub fn flatten(
        &self,
        table: &str,
        id: i64,
        fields: Option<&[&str]>,
    ) -> Result<Map<String, Value>> {
        let db = self.db.lock().unwrap();
        flatten_record(&db, table, id, fields)
    }
}

fn delete_operations(db: &Connection, change_id: i64) -> Result<usize> {
    let mut deleted = 0;
    for &table in CHANGE_OP_TABLES {
        let details = db.execute(
            &format!(
                "DELETE FROM {table} WHERE id IN (
                    SELECT id FROM change_ops WHERE change_id = ?1 AND final_class = ?2
                 )"
            ),
            params![change_id, table],
        )?;
        let base = db.execute(
            "DELETE FROM change_ops WHERE change_id = ?1 AND final_class = ?2",
            params![change_id, table],
        )?;
        if base > 0 {
            debug!(change_id, %table, base, details, "change operations deleted");
        }
        deleted += base;
    }

    // Operations of a kind nobody registered are left alone.
    let leftover: i64 = db.query_row(
        "SELECT COUNT(*) FROM change_ops WHERE change_id = ?1",
        [change_id],
        |row| row.get(0),
    )?;
    if leftover > 0 {
        warn!(change_id, leftover, "change operations of unregistered kinds kept");
    }
    Ok(deleted)
}

fn row_to_change(row: &rusqlite::Row<'_>) -> rusqlite::Result<Change> {
    let date: String = row.get(1)?;
    let date = NaiveDateTime::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(Change {
        id: row.get(0)?,
        date,
        user_info: row.get(2)?,
        origin: row.get(3)?,
    })
}
