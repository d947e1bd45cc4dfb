use std::path::PathBuf;

/// Crate-wide result alias.
pub type MatflowResult<T> = Result<T, MatflowError>;

/// Errors produced while resolving, executing and caching cook/render jobs.
#[derive(thiserror::Error, Debug)]
pub enum MatflowError {
    /// A required external executable could not be located.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// A job input (source, archive, or image binding) does not exist.
    #[error("input not found: '{}'", .0.display())]
    InputNotFound(PathBuf),

    /// A parameter failed type or range validation.
    #[error("invalid parameter '{name}' = {value}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Offending value as rendered for display.
        value: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Output path falls outside the configured allow-list.
    #[error("permission error: {0}")]
    Permission(String),

    /// The external tool did not finish within its time budget.
    #[error("timeout error: tool did not finish within {secs}s")]
    Timeout {
        /// Budget that was exceeded, in seconds.
        secs: u64,
        /// Captured stdout/stderr up to the kill.
        log: String,
    },

    /// The external tool exited with a failure status.
    #[error("tool execution error: exit {}: {stderr}", display_code(.code))]
    ToolExecution {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Tail of the captured stderr.
        stderr: String,
        /// Full captured log.
        log: String,
    },

    /// Cache entry corrupt or cache I/O failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Malformed request or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unclassified I/O or internal failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}

impl MatflowError {
    /// Build [`MatflowError::ToolNotFound`].
    pub fn tool_not_found(msg: impl Into<String>) -> Self {
        Self::ToolNotFound(msg.into())
    }

    /// Build [`MatflowError::InputNotFound`].
    pub fn input_not_found(path: impl Into<PathBuf>) -> Self {
        Self::InputNotFound(path.into())
    }

    /// Build [`MatflowError::InvalidParameter`].
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Build [`MatflowError::Permission`].
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    /// Build [`MatflowError::Cache`].
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Build [`MatflowError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Short stable label for batch error lists and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolNotFound(_) => "tool_not_found",
            Self::InputNotFound(_) => "input_not_found",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::Permission(_) => "permission",
            Self::Timeout { .. } => "timeout",
            Self::ToolExecution { .. } => "tool_execution",
            Self::Cache(_) => "cache",
            Self::Validation(_) => "validation",
            Self::Other(_) => "other",
        }
    }

    /// Captured tool log, for errors raised after a process was spawned.
    pub fn log(&self) -> Option<&str> {
        match self {
            Self::Timeout { log, .. } | Self::ToolExecution { log, .. } => Some(log),
            _ => None,
        }
    }

    /// `true` for errors raised before any external process was started.
    pub fn is_pre_spawn(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. }
                | Self::InputNotFound(_)
                | Self::Permission(_)
                | Self::Validation(_)
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
