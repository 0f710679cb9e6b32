use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::{format::LoggerFormat, level::LoggerLevel, timezone::LoggerTimeZone};

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` expression.
    pub level: LoggerLevel,
    pub tz: LoggerTimeZone,
    /// Print the target (module path) of each record.
    pub with_targets: bool,
    /// ANSI colors for text output; ignored when stdout is not a terminal.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::default(),
            level: LoggerLevel::default(),
            tz: LoggerTimeZone::default(),
            with_targets: true,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    pub fn should_use_color(&self) -> bool {
        self.use_color && std::io::stdout().is_terminal()
    }
}
