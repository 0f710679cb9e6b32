use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log format '{0}' (expected text, json or journald)")]
    InvalidFormat(String),

    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("invalid timezone '{0}' (expected utc or local)")]
    InvalidTimeZone(String),

    #[error("journald is not available on this platform")]
    JournaldNotSupported,

    #[error("journald connection failed: {0}")]
    JournaldInitFailed(String),

    #[error("logger already initialized")]
    AlreadyInitialized,
}

pub type LoggerResult<T> = Result<T, LoggerError>;
