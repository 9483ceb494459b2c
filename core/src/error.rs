use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A tool unit could not be loaded. Non-fatal: the unit is skipped.
    #[error("failed to load tool '{unit}': {reason}")]
    RegistryLoad { unit: String, reason: String },

    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("tool '{tool}' is missing required parameter '{parameter}'")]
    MissingParameter { tool: String, parameter: String },

    #[error("tool '{tool}' received invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        tool: String,
        parameter: String,
        reason: String,
    },

    #[error("tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// Dispatch of a model-requested tool call failed inside a turn.
    #[error("tool execution failed: {0}")]
    ToolExecution(#[source] Box<Error>),

    #[error("model service error: {0}")]
    ModelService(String),

    #[error("memory storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn registry_load(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RegistryLoad {
            unit: unit.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ToolNotFound(_) => true,
            Self::ToolExecution(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    pub fn is_validation(&self) -> bool {
        match self {
            Self::MissingParameter { .. } | Self::InvalidParameter { .. } | Self::Validation(_) => {
                true
            }
            Self::ToolExecution(inner) => inner.is_validation(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}
