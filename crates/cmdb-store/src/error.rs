use thiserror::Error;

/// Errors that can occur in the change store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("change not found: {id}")]
    ChangeNotFound { id: i64 },

    #[error("record not found: {table}#{id}")]
    RecordNotFound { table: String, id: i64 },

    /// The table does not exist in the database.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown field {field} on {table}")]
    UnknownField { table: String, field: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
