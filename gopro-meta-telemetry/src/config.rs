use derive_more::{Display, Error};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Map center used when no GPS samples are loaded (Nantes)
pub const DEFAULT_CENTER: (f64, f64) = (47.21322, -1.559482);

/// Configurable log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Accepted spellings, in increasing verbosity.
    pub const NAMES: [&'static str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

    #[must_use]
    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

/// A log level name that is not one of [`LogLevel::NAMES`].
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("unknown log level \"{name}\", expected one of: off, error, warn, info, debug, trace")]
pub struct UnknownLogLevel {
    name: String,
}

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(UnknownLogLevel { name: s.to_owned() }),
        }
    }
}

/// Which stream's first timestamp serves as the reference time for the
/// luminance stream.
///
/// Luminance is recorded per frame like the hue stream, but older exports
/// were aligned against the accelerometer clock. `Acceleration` reproduces
/// that alignment; `Own` measures luminance against its own first sample
/// like every other stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStream {
    #[default]
    Own,
    Acceleration,
}

/// Telemetry store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// `(latitude, longitude)` returned by `center()` when there is no GPS data
    #[serde(default = "default_center")]
    pub default_center: (f64, f64),
    #[serde(default)]
    pub luminance_reference: ReferenceStream,
    #[serde(default)]
    pub log_level: LogLevel,
}

const fn default_center() -> (f64, f64) {
    DEFAULT_CENTER
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_center: default_center(),
            luminance_reference: ReferenceStream::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl StoreConfig {
    /// Reset values outside their valid ranges to defaults
    pub fn validate(&mut self) {
        let (lat, lng) = self.default_center;
        if !lat.is_finite() || !lng.is_finite() || lat.abs() > 90.0 || lng.abs() > 180.0 {
            warn!("Default center ({lat}, {lng}) is not a valid coordinate, resetting to default");
            self.default_center = default_center();
        }
    }
}
