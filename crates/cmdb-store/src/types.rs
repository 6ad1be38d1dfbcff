use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Storage format of every `date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Detail tables of change operations, one per concrete operation kind.
pub const CHANGE_OP_TABLES: &[&str] = &[
    "change_op_create",
    "change_op_delete",
    "change_op_set_attribute",
    "change_op_plain_text",
];

/// A recorded edit session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: i64,
    pub date: NaiveDateTime,
    pub user_info: String,
    pub origin: String,
}

/// Kind-specific part of a change operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeOpDetail {
    /// Object created.
    Create,
    /// Object deleted; its name is kept since the object is gone.
    Delete { friendly_name: String },
    /// One attribute changed value.
    SetAttribute {
        att_code: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
    /// Free-text note attached to the object's history.
    PlainText { text: String },
}

impl ChangeOpDetail {
    /// Detail table (and `final_class` value) for this kind.
    pub fn final_class(&self) -> &'static str {
        match self {
            ChangeOpDetail::Create => "change_op_create",
            ChangeOpDetail::Delete { .. } => "change_op_delete",
            ChangeOpDetail::SetAttribute { .. } => "change_op_set_attribute",
            ChangeOpDetail::PlainText { .. } => "change_op_plain_text",
        }
    }
}

/// Result of a bulk delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeSummary {
    pub changes: usize,
    pub operations: usize,
}
