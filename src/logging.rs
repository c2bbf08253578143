//! Diagnostic logging capability
//!
//! The player never formats a log line itself. It hands a closure to the
//! injected [`Logger`], which only runs it when the level is enabled, so a
//! disabled level costs one branch.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Side-channel log sink.
///
/// Implementors provide [`Logger::enabled`] and [`Logger::write`]; the
/// leveled helpers take care of evaluating the message lazily. A sink must
/// never panic: it is called from the player's control paths and its pump.
pub trait Logger: Send + Sync {
    fn enabled(&self, level: LogLevel) -> bool;

    fn write(&self, level: LogLevel, message: &str);

    fn log(&self, level: LogLevel, message: &dyn Fn() -> String) {
        if self.enabled(level) {
            self.write(level, &message());
        }
    }

    fn debug(&self, message: &dyn Fn() -> String) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &dyn Fn() -> String) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &dyn Fn() -> String) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &dyn Fn() -> String) {
        self.log(LogLevel::Error, message);
    }
}

/// Forwards to the `log` crate facade.
#[derive(Debug, Clone)]
pub struct LogFacade {
    target: &'static str,
}

impl LogFacade {
    pub fn new() -> Self {
        Self::with_target("petalplay::player")
    }

    pub fn with_target(target: &'static str) -> Self {
        Self { target }
    }
}

impl Default for LogFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for LogFacade {
    fn enabled(&self, level: LogLevel) -> bool {
        log::log_enabled!(target: self.target, log::Level::from(level))
    }

    fn write(&self, level: LogLevel, message: &str) {
        log::log!(target: self.target, log::Level::from(level), "{}", message);
    }
}

/// Discards everything without evaluating messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn enabled(&self, _level: LogLevel) -> bool {
        false
    }

    fn write(&self, _level: LogLevel, _message: &str) {}
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Keeps every line at or above `min_level` in memory.
    #[derive(Default)]
    pub(crate) struct RecordingLogger {
        pub min_level: Option<LogLevel>,
        pub lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl RecordingLogger {
        pub fn at(level: LogLevel) -> Self {
            Self {
                min_level: Some(level),
                lines: Mutex::new(Vec::new()),
            }
        }

        pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
            self.lines
                .lock()
                .iter()
                .any(|(l, line)| *l == level && line.contains(needle))
        }
    }

    impl Logger for RecordingLogger {
        fn enabled(&self, level: LogLevel) -> bool {
            self.min_level.is_some_and(|min| level >= min)
        }

        fn write(&self, level: LogLevel, message: &str) {
            self.lines.lock().push((level, message.to_string()));
        }
    }

    #[test]
    fn message_is_not_built_when_level_disabled() {
        let logger = RecordingLogger::at(LogLevel::Warn);
        let evaluated = AtomicUsize::new(0);
        let message = || {
            evaluated.fetch_add(1, Ordering::SeqCst);
            "expensive".to_string()
        };

        logger.debug(&message);
        logger.info(&message);
        assert_eq!(evaluated.load(Ordering::SeqCst), 0);

        logger.warn(&message);
        logger.error(&message);
        assert_eq!(evaluated.load(Ordering::SeqCst), 2);
        assert!(logger.contains(LogLevel::Error, "expensive"));
    }

    #[test]
    fn null_logger_never_evaluates() {
        let evaluated = AtomicUsize::new(0);
        NullLogger.error(&|| {
            evaluated.fetch_add(1, Ordering::SeqCst);
            String::new()
        });
        assert_eq!(evaluated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert_eq!(log::Level::from(LogLevel::Warn), log::Level::Warn);
        assert_eq!(LogLevel::Info.to_string(), "INFO");
    }
}
