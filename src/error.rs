// Error types for the SPG200 core.
//
// The reference implementation reports unrecoverable conditions by aborting
// the host process (`die()` in common.h). A library cannot do that to its
// embedder, so every such site returns `Err(CoreError::Fatal { .. })` instead;
// callers are expected to treat it the way the spec treats a "die" abort — as
// a reason to stop `run_frame()` and surface the failure, not to keep
// stepping the machine.

use std::fmt;

/// A location-tagged fatal condition, mirroring the reference core's
/// `die(msg, location)` abort helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fatal {
    pub message: String,
    pub module: &'static str,
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.module, self.message)
    }
}

/// Errors produced by the core while the machine is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An unrecoverable condition the reference core would abort on:
    /// unknown opcode, illegal STORE addressing mode, unsupported ADC/timer
    /// configuration, or an empty joystick send-buffer pop.
    Fatal(Fatal),
    /// A ROM image did not match the size the loader expects.
    InvalidRom { expected_words: usize, found_words: usize, which: &'static str },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Fatal(fatal) => write!(f, "fatal: {}", fatal),
            CoreError::InvalidRom { expected_words, found_words, which } => write!(
                f,
                "invalid {which} ROM: expected {expected_words} words, found {found_words}"
            ),
        }
    }
}

impl std::error::Error for CoreError {}

pub(crate) fn fatal(module: &'static str, message: impl Into<String>) -> CoreError {
    CoreError::Fatal(Fatal { message: message.into(), module })
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors from loading or saving persisted machine configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    TomlSer(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {e}"),
            ConfigError::Toml(e) => write!(f, "config parse error: {e}"),
            ConfigError::TomlSer(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Toml(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::TomlSer(e)
    }
}
