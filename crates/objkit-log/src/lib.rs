//! Minimal, zero-dependency logging for the `objkit` runtime.
//!
//! Provides a process-wide leveled logger with automatic module path capture
//! and colored level tags. Messages are written to standard error so that
//! programs embedding the runtime keep their standard output untouched.
//!
//! # Configuration
//!
//! The level defaults to [`Level::Info`]. It can be changed at any time with
//! [`set_level`] / [`set_level_from_str`], or read once from the
//! [`ENV_VAR`] environment variable with [`init_from_env`].
//!
//! # Example
//!
//! ```
//! use objkit_log::{debug, error, info, warn, Level};
//!
//! objkit_log::set_level(Level::Debug);
//!
//! let classes = 4;
//! info!("registered {} classes", classes);
//! debug!("class table: {:?}", ["Object", "Lock"]);
//! warn!("capacity grew past {}", 64);
//! error!("unlock called on an unlocked lock");
//! ```

use std::fmt::{self, Arguments};
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted by [`init_from_env`].
pub const ENV_VAR: &str = "OBJKIT_LOG";

/// Severity of a log message.
///
/// Lower numeric values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Failures, including fatal defects about to abort.
    Error = 0,
    /// Suspicious but recoverable conditions.
    Warn = 1,
    /// High-level lifecycle events.
    Info = 2,
    /// Registration and construction details.
    Debug = 3,
    /// Per-instance events (deallocation, growth).
    Trace = 4,
}

impl Level {
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case name of this level.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Error,
            1 => Level::Warn,
            3 => Level::Debug,
            4 => Level::Trace,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`Level`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    input: String,
}

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid log level: {:?}", self.input)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name, ignoring case.
    ///
    /// ```
    /// use objkit_log::Level;
    ///
    /// assert_eq!("trace".parse::<Level>(), Ok(Level::Trace));
    /// assert_eq!("WARN".parse::<Level>(), Ok(Level::Warn));
    /// assert!("loud".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(ParseLevelError {
                input: s.to_string(),
            }),
        }
    }
}

/// The global logger.
///
/// Holds only the current level; accessed through [`get_logger`].
pub struct Logger {
    level: AtomicU8,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
        }
    }

    /// Sets the minimum level that will be emitted.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Returns `true` if a message at `level` would be emitted.
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, creating it at [`Level::Info`] on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Info))
}

/// Sets the minimum level of the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the minimum level of the global logger from a level name.
///
/// # Errors
///
/// Returns [`ParseLevelError`] if `s` is not a level name; the current level
/// is left unchanged.
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    set_level(s.parse()?);
    Ok(())
}

/// Applies the level named by the [`ENV_VAR`] environment variable.
///
/// Returns the level in effect afterwards. An unset variable keeps the
/// current level; an invalid value keeps it too and logs a warning.
pub fn init_from_env() -> Level {
    if let Ok(value) = std::env::var(ENV_VAR) {
        if let Err(err) = set_level_from_str(&value) {
            crate::warn!("ignoring {}: {}", ENV_VAR, err);
        }
    }
    get_logger().level()
}

#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    const RESET: &str = "\x1b[0m";

    if !get_logger().enabled(level) {
        return;
    }

    let color = level.color_code();
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{color}[{level}]{RESET} {target}: {args}");
}

/// Logs a message at an explicit level.
///
/// ```
/// use objkit_log::{log, Level};
///
/// log!(level: Level::Info, "chunk size is {}", 64);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            if $crate::get_logger().enabled($level) {
                $crate::__log_with_target(
                    $level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Logs a message at [`Level::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs a message at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs a message at [`Level::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs a message at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs a message at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}
