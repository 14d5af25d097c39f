use thiserror::Error;

/// Crate-wide error type. One variant per stable taxonomy code exposed
/// on the command-dispatch surface; see [`PlatformError::code`].
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Stable taxonomy code (spec §7) for the command-dispatch surface.
    pub fn code(&self) -> &'static str {
        match self {
            PlatformError::InvalidArgument(_) => "invalid_argument",
            PlatformError::NotFound(_) => "not_found",
            PlatformError::AlreadyExists(_) => "already_exists",
            PlatformError::QuotaExceeded(_) => "quota_exceeded",
            PlatformError::RateLimited(_) => "rate_limited",
            PlatformError::BackendUnavailable(_) => "backend_unavailable",
            PlatformError::InvalidValue(_) => "invalid_value",
            PlatformError::Unavailable(_) => "unavailable",
            PlatformError::Conflict(_) => "conflict",
            PlatformError::Timeout(_) => "timeout",
            PlatformError::UnknownCommand(_) => "unknown_command",
            PlatformError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

impl From<redis::RedisError> for PlatformError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() {
            PlatformError::Timeout(e.to_string())
        } else {
            PlatformError::BackendUnavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(e: serde_json::Error) -> Self {
        PlatformError::InvalidValue(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for PlatformError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        PlatformError::Timeout(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_taxonomy() {
        assert_eq!(PlatformError::NotFound("x".into()).code(), "not_found");
        assert_eq!(
            PlatformError::QuotaExceeded("x".into()).code(),
            "quota_exceeded"
        );
        assert_eq!(
            PlatformError::UnknownCommand("x".into()).code(),
            "unknown_command"
        );
    }
}
