//! Logging setup for the runbox daemon.
//!
//! One call to [`init_logger`] installs a global `tracing` subscriber writing text,
//! JSON or journald records, filtered by an `EnvFilter` expression.
mod config;
pub use config::LoggerConfig;

mod error;
pub use error::{LoggerError, LoggerResult};

mod format;
pub use format::LoggerFormat;

mod level;
pub use level::LoggerLevel;

mod timezone;
pub use timezone::{LoggerTimeZone, init_local_offset};

mod timer;
pub use timer::LogTimer;

mod init;

/// Install the global subscriber described by `cfg`.
///
/// For [`LoggerTimeZone::Local`] call [`init_local_offset`] first, before any runtime
/// threads exist; otherwise timestamps fall back to UTC.
///
/// Fails with [`LoggerError::AlreadyInitialized`] on a second call.
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    match cfg.format {
        LoggerFormat::Text => init::text(cfg),
        LoggerFormat::Json => init::json(cfg),
        LoggerFormat::Journald => init::journald(cfg),
    }
}
