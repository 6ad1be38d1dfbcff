use rusqlite::{Connection, Result};

/// Initialise the change store schema. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_changes_table(conn)?;
    create_change_ops_table(conn)?;
    create_change_op_detail_tables(conn)?;
    Ok(())
}

/// One row per edit session. `date` is local time formatted as
/// `YYYY-MM-DD HH:MM:SS`, so text comparison orders chronologically.
fn create_changes_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS changes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            date        TEXT NOT NULL,
            user_info   TEXT NOT NULL DEFAULT '',
            origin      TEXT NOT NULL DEFAULT 'interactive'
        );
        CREATE INDEX IF NOT EXISTS idx_changes_date
            ON changes(date);",
    )
}

/// Base rows of change operations. `final_class` names the detail table.
/// No foreign keys: deletes are done explicitly, detail tables first.
fn create_change_ops_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS change_ops (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            change_id   INTEGER NOT NULL,
            obj_class   TEXT NOT NULL,
            obj_key     INTEGER NOT NULL,
            final_class TEXT NOT NULL,
            date        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_change_ops_change
            ON change_ops(change_id);",
    )
}

/// Detail rows share the id of their base row.
fn create_change_op_detail_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS change_op_create (
            id          INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS change_op_delete (
            id            INTEGER PRIMARY KEY,
            friendly_name TEXT NOT NULL DEFAULT ''
        );
        CREATE TABLE IF NOT EXISTS change_op_set_attribute (
            id          INTEGER PRIMARY KEY,
            att_code    TEXT NOT NULL,
            old_value   TEXT,
            new_value   TEXT
        );
        CREATE TABLE IF NOT EXISTS change_op_plain_text (
            id          INTEGER PRIMARY KEY,
            text        TEXT NOT NULL
        );",
    )
}
