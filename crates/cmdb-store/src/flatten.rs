use rusqlite::{types::ValueRef, Connection, OptionalExtension};
use serde_json::{Map, Number, Value};

use crate::error::{Result, StoreError};

/// Read row `id` of `table` into a plain field → value map.
///
/// With `fields = None` every column is included; otherwise only the listed
/// ones. `id` is always part of the result. Table and field names are checked
/// against the table's schema before any SQL is built from them.
pub fn flatten_record(
    conn: &Connection,
    table: &str,
    id: i64,
    fields: Option<&[&str]>,
) -> Result<Map<String, Value>> {
    let columns = table_columns(conn, table)?;
    if columns.is_empty() {
        return Err(StoreError::UnknownTable(table.to_string()));
    }

    let mut wanted: Vec<String> = match fields {
        None => columns.clone(),
        Some(list) => list.iter().map(|f| f.to_string()).collect(),
    };
    wanted.push("id".to_string());
    let mut unique = Vec::with_capacity(wanted.len());
    for field in wanted {
        if !columns.contains(&field) {
            return Err(StoreError::UnknownField {
                table: table.to_string(),
                field,
            });
        }
        if !unique.contains(&field) {
            unique.push(field);
        }
    }

    let select = unique
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {select} FROM {} WHERE id = ?1", quote_ident(table));

    let record = conn
        .query_row(&sql, [id], |row| {
            let mut map = Map::new();
            for (i, name) in unique.iter().enumerate() {
                map.insert(name.clone(), to_json(row.get_ref(i)?));
            }
            Ok(map)
        })
        .optional()?;

    record.ok_or_else(|| StoreError::RecordNotFound {
        table: table.to_string(),
        id,
    })
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(columns)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|&byte| Value::from(byte)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE server (id INTEGER PRIMARY KEY, name TEXT, cpu REAL, ram INTEGER, note TEXT);
             INSERT INTO server VALUES (7, 'db-01', 2.5, 64, NULL);
             CREATE TABLE nokey (name TEXT);
             INSERT INTO nokey VALUES ('x');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn all_columns_by_default() {
        let map = flatten_record(&conn(), "server", 7, None).unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map["id"], Value::from(7));
        assert_eq!(map["name"], Value::from("db-01"));
        assert_eq!(map["cpu"], Value::from(2.5));
        assert_eq!(map["ram"], Value::from(64));
        assert_eq!(map["note"], Value::Null);
    }

    #[test]
    fn field_list_always_gets_id() {
        let map = flatten_record(&conn(), "server", 7, Some(&["name"][..])).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["id"], Value::from(7));
        assert_eq!(map["name"], Value::from("db-01"));

        // Asking for id explicitly does not duplicate it.
        let map = flatten_record(&conn(), "server", 7, Some(&["id", "ram"][..])).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let conn = conn();
        assert!(matches!(
            flatten_record(&conn, "serverz", 7, None),
            Err(StoreError::UnknownTable(t)) if t == "serverz"
        ));
        assert!(matches!(
            flatten_record(&conn, "server", 7, Some(&["name; DROP TABLE server"][..])),
            Err(StoreError::UnknownField { .. })
        ));
        // A table without an id column cannot be flattened.
        assert!(matches!(
            flatten_record(&conn, "nokey", 1, None),
            Err(StoreError::UnknownField { field, .. }) if field == "id"
        ));
    }

    #[test]
    fn missing_row() {
        assert!(matches!(
            flatten_record(&conn(), "server", 8, None),
            Err(StoreError::RecordNotFound { id: 8, .. })
        ));
    }
}
