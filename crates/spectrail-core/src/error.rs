//! Error taxonomy shared across every crate in the workspace.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("rate limited")]
    RateLimited,

    #[error("provider error ({status}): {message}")]
    ProviderError { status: u16, message: String },

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid args: {0}")]
    InvalidArgs(String),

    #[error("path escape: {0}")]
    PathEscape(String),

    #[error("disallowed command: {0}")]
    DisallowedCommand(String),

    #[error("repo unavailable: {0}")]
    RepoUnavailable(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Kebab-case tag used in the `{code, message}` envelope the facade returns to the host.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::RateLimited => "rate_limited",
            Self::ProviderError { .. } => "provider_error",
            Self::NetworkError(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArgs(_) => "invalid_args",
            Self::PathEscape(_) => "path_escape",
            Self::DisallowedCommand(_) => "disallowed_command",
            Self::RepoUnavailable(_) => "repo_unavailable",
            Self::PersistenceError(_) => "persistence_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }

    /// Tool-local errors are recoverable: the loop wraps them as `{"error": ...}`
    /// tool output and keeps running. Everything else aborts the run.
    pub fn is_tool_local(&self) -> bool {
        matches!(
            self,
            Self::UnknownTool(_)
                | Self::InvalidArgs(_)
                | Self::PathEscape(_)
                | Self::DisallowedCommand(_)
        )
    }
}
