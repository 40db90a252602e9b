// Persisted machine configuration: which video timing to emulate and how
// verbose the trace logger should be. Everything else about a session
// (ROM path, host wiring) is the embedder's business, not something saved
// to disk here.

use crate::debug::LogLevel;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_FILE: &str = "machine_config.toml";

/// Which video timing the PPU runs at. Affects scanline period and the
/// NTSC/PAL bit software can read back at `0x3d2b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    Ntsc,
    Pal,
}

impl Region {
    pub fn is_ntsc(self) -> bool {
        matches!(self, Region::Ntsc)
    }

    pub fn is_pal(self) -> bool {
        matches!(self, Region::Pal)
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::Ntsc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub region: Region,
    #[serde(with = "log_level_serde")]
    pub log_level: LogLevel,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig { region: Region::Ntsc, log_level: LogLevel::None }
    }
}

impl MachineConfig {
    pub fn load_or_default() -> Self {
        Self::load(CONFIG_FILE).unwrap_or_else(|_| {
            let config = Self::default();
            let _ = config.save(CONFIG_FILE);
            config
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

/// `LogLevel` has no `serde` derive of its own (it lives in `debug`, which
/// has no reason to know about config persistence); round-trip it through
/// its name instead.
mod log_level_serde {
    use crate::debug::LogLevel;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    enum Repr {
        None,
        Error,
        Warning,
        Info,
        Debug,
        Trace,
    }

    impl From<LogLevel> for Repr {
        fn from(level: LogLevel) -> Self {
            match level {
                LogLevel::None => Repr::None,
                LogLevel::Error => Repr::Error,
                LogLevel::Warning => Repr::Warning,
                LogLevel::Info => Repr::Info,
                LogLevel::Debug => Repr::Debug,
                LogLevel::Trace => Repr::Trace,
            }
        }
    }

    impl From<Repr> for LogLevel {
        fn from(repr: Repr) -> Self {
            match repr {
                Repr::None => LogLevel::None,
                Repr::Error => LogLevel::Error,
                Repr::Warning => LogLevel::Warning,
                Repr::Info => LogLevel::Info,
                Repr::Debug => LogLevel::Debug,
                Repr::Trace => LogLevel::Trace,
            }
        }
    }

    pub fn serialize<S: Serializer>(level: &LogLevel, serializer: S) -> Result<S::Ok, S::Error> {
        Repr::from(*level).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LogLevel, D::Error> {
        Ok(Repr::deserialize(deserializer)?.into())
    }
}
