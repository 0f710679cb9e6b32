use std::{fmt, str::FromStr, sync::OnceLock};

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use crate::error::LoggerError;

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Offset of log timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LoggerTimeZone {
    #[default]
    Utc,
    /// Offset detected by [`init_local_offset`], UTC when detection failed.
    Local,
}

impl LoggerTimeZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggerTimeZone::Utc => "utc",
            LoggerTimeZone::Local => "local",
        }
    }

    /// Offset to render timestamps with.
    pub fn offset(&self) -> UtcOffset {
        match self {
            LoggerTimeZone::Utc => UtcOffset::UTC,
            LoggerTimeZone::Local => LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC),
        }
    }
}

/// Detect and cache the local offset.
///
/// Must run while the process is still single-threaded: most Unix platforms refuse
/// the detection once other threads exist. Later calls keep the first result.
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

impl FromStr for LoggerTimeZone {
    type Err = LoggerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            _ => Err(LoggerError::InvalidTimeZone(s.to_string())),
        }
    }
}

impl TryFrom<String> for LoggerTimeZone {
    type Error = LoggerError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LoggerTimeZone> for String {
    fn from(tz: LoggerTimeZone) -> Self {
        tz.as_str().to_string()
    }
}

impl fmt::Display for LoggerTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        assert_eq!("UTC".parse::<LoggerTimeZone>().unwrap(), LoggerTimeZone::Utc);
        assert_eq!("local".parse::<LoggerTimeZone>().unwrap(), LoggerTimeZone::Local);
        assert!("pst".parse::<LoggerTimeZone>().is_err());
    }

    #[test]
    fn utc_offset_is_zero() {
        assert_eq!(LoggerTimeZone::Utc.offset(), UtcOffset::UTC);
    }

    #[test]
    fn local_offset_is_cached() {
        let first = init_local_offset();
        assert_eq!(init_local_offset(), first);
        assert_eq!(LoggerTimeZone::Local.offset(), first);
        assert!(first.whole_hours().abs() <= 14);
    }
}
