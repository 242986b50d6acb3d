/// Custom error type for gogs_ci_hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid notification: {0}")]
    InvalidNotification(&'static str),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Definition fetch failed: {0}")]
    FetchError(String),

    #[error("Definition parse failed: {0}")]
    DefinitionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Dispatch queue is closed")]
    QueueClosed,
}
