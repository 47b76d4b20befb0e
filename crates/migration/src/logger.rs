//! Logging capability handed to exporters and importers.
//!
//! Components never reach for a process-wide logger; they log through the
//! `Logger` they were built with. `Logger::silent()` satisfies the same
//! interface and drops every line.

use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

use tracing::Level;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Logger {
    /// Emits `tracing` events tagged with `scope`.
    Tracing { scope: String },
    /// Keeps lines in memory, for callers that render progress themselves.
    Memory(Arc<Mutex<Vec<LogLine>>>),
    Silent,
}

impl Default for Logger {
    fn default() -> Self {
        Self::tracing("chainmigrate")
    }
}

impl Logger {
    pub fn tracing(scope: impl Into<String>) -> Self {
        Self::Tracing {
            scope: scope.into(),
        }
    }

    pub fn silent() -> Self {
        Self::Silent
    }

    pub fn memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(Vec::new())))
    }

    /// Lines captured so far by a `Memory` logger.
    pub fn lines(&self) -> Vec<LogLine> {
        match self {
            Self::Memory(lines) => lines.lock().map(|lines| lines.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn debug(&self, message: impl Display) {
        self.log(Level::DEBUG, message);
    }

    pub fn info(&self, message: impl Display) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(Level::WARN, message);
    }

    fn log(&self, level: Level, message: impl Display) {
        match self {
            Self::Tracing { scope } => match level {
                Level::WARN => tracing::warn!(scope = %scope, "{message}"),
                Level::INFO => tracing::info!(scope = %scope, "{message}"),
                Level::DEBUG => tracing::debug!(scope = %scope, "{message}"),
                _ => tracing::trace!(scope = %scope, "{message}"),
            },
            Self::Memory(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(LogLine {
                        level,
                        message: message.to_string(),
                    });
                }
            }
            Self::Silent => {}
        }
    }
}
