use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid setting '{key}' for module {module}: {reason}")]
    InvalidSetting {
        module: String,
        key: String,
        reason: String,
    },
}

impl CoreError {
    /// Short error code, printed by the CLI next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::InvalidSetting { .. } => "INVALID_SETTING",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
