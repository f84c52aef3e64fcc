//! Bus config file
//!
//! A BusConfig is created from a TOML file, and lists the values to be read from and written to
//! the members of an Elster bus.
//!
//! # An example TOML file
//!
//! ```toml
//! # The member this gateway sends as. Defaults to CLIENT.
//! sender = "CLIENT"
//! # Minimum time between two transmitted frames in milliseconds. Defaults to 50.
//! tx_interval_ms = 50
//!
//! # Sensors are polled periodically and report every value received
//! [[sensors]]
//! name = "Flow temperature"
//! elster_index = 0x000F
//! elster_type = "DEC"
//! target = "HK1"
//! update_interval = "60s"
//!
//! # Numbers are polled like sensors, and can also be written
//! [[numbers]]
//! name = "Comfort temperature"
//! elster_index = 0x0005
//! elster_type = "DEC"
//! target = "HK1"
//! min_value = 15.0
//! max_value = 25.0
//! ```
//!
//! # Intervals
//!
//! `update_interval` is either an integer number of milliseconds, or a human readable duration
//! string as accepted by `humantime`, e.g. `"500ms"`, `"5min"` or `"1h 30min"`. Sensors default to
//! 60 seconds, and numbers to 30 seconds.
use core::time::Duration;
use std::collections::HashSet;

use serde::{de::Error, Deserialize};
use snafu::{ResultExt as _, Snafu};

use crate::{can_member::CanMember, codec::ElsterType};

/// Error returned when loading a bus config fails
#[derive(Debug, Snafu)]
pub enum LoadError {
    /// An IO error occured while reading the file
    #[snafu(display("IO error: {source}"))]
    Io {
        /// The underlying IO error
        source: std::io::Error,
    },
    /// An error occured in the TOML parser
    #[snafu(display("Toml parse error: {source}"))]
    TomlParsing {
        /// The toml error which led to this error
        source: toml::de::Error,
    },
    /// A number has a minimum greater than its maximum
    #[snafu(display("Number '{name}' has min_value {min} greater than max_value {max}"))]
    InvalidRange {
        /// Name of the number
        name: String,
        /// Configured minimum
        min: f64,
        /// Configured maximum
        max: f64,
    },
    /// Multiple endpoints defined with the same name
    #[snafu(display("Multiple definitions for endpoint named '{name}'"))]
    DuplicateName {
        /// The repeated name
        name: String,
    },
}

fn default_sender() -> CanMember {
    CanMember::Client
}

fn default_tx_interval_ms() -> u64 {
    50
}

fn default_sensor_interval() -> Interval {
    Interval(Duration::from_secs(60))
}

fn default_number_interval() -> Interval {
    Interval(Duration::from_secs(30))
}

/// Bus configuration structure
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// The member frames are sent as
    #[serde(default = "default_sender")]
    pub sender: CanMember,

    /// Minimum time between transmitted frames in milliseconds
    #[serde(default = "default_tx_interval_ms")]
    pub tx_interval_ms: u64,

    /// Read only values
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    /// Read/write values
    #[serde(default)]
    pub numbers: Vec<NumberConfig>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            sender: default_sender(),
            tx_interval_ms: default_tx_interval_ms(),
            sensors: Vec::new(),
            numbers: Vec::new(),
        }
    }
}

/// A periodically polled, read only value
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    /// A unique name for the value
    pub name: String,
    /// The Elster index of the value on the target
    pub elster_index: u16,
    /// How the value is encoded
    #[serde(default)]
    pub elster_type: ElsterType,
    /// The member owning the value
    pub target: CanMember,
    /// The polling period
    #[serde(default = "default_sensor_interval")]
    pub update_interval: Interval,
}

/// A periodically polled value which can also be written
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct NumberConfig {
    /// A unique name for the value
    pub name: String,
    /// The Elster index of the value on the target
    pub elster_index: u16,
    /// How the value is encoded
    #[serde(default)]
    pub elster_type: ElsterType,
    /// The member owning the value
    pub target: CanMember,
    /// Smallest value which may be written
    pub min_value: f64,
    /// Largest value which may be written
    pub max_value: f64,
    /// The polling period
    #[serde(default = "default_number_interval")]
    pub update_interval: Interval,
}

impl BusConfig {
    /// Try to read a config from a file
    pub fn load(config_path: impl AsRef<std::path::Path>) -> Result<Self, LoadError> {
        let config_str = std::fs::read_to_string(&config_path).context(IoSnafu)?;
        Self::load_from_str(&config_str)
    }

    /// Try to read a config from a &str
    pub fn load_from_str(config_str: &str) -> Result<Self, LoadError> {
        let config: BusConfig = toml::from_str(config_str).context(TomlParsingSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// The minimum time between transmitted frames
    pub fn tx_interval(&self) -> Duration {
        Duration::from_millis(self.tx_interval_ms)
    }

    fn validate(&self) -> Result<(), LoadError> {
        let mut names = HashSet::new();
        let all_names = self
            .sensors
            .iter()
            .map(|s| &s.name)
            .chain(self.numbers.iter().map(|n| &n.name));
        for name in all_names {
            if !names.insert(name) {
                return DuplicateNameSnafu { name: name.clone() }.fail();
            }
        }

        for number in &self.numbers {
            // Also rejects NaN bounds
            if !(number.min_value <= number.max_value) {
                return InvalidRangeSnafu {
                    name: number.name.clone(),
                    min: number.min_value,
                    max: number.max_value,
                }
                .fail();
            }
        }
        Ok(())
    }
}

/// A polling interval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval(pub Duration);

impl From<Interval> for Duration {
    fn from(value: Interval) -> Self {
        value.0
    }
}

impl<'de> serde::Deserialize<'de> for Interval {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(
            untagged,
            expecting = "an interval in milliseconds, or a duration such as '500ms', '30s' or '5min'"
        )]
        enum RawInterval {
            Millis(u64),
            Text(#[serde(with = "humantime_serde")] Duration),
        }

        Ok(Interval(match RawInterval::deserialize(deserializer)? {
            RawInterval::Millis(ms) => Duration::from_millis(ms),
            RawInterval::Text(duration) => duration,
        }))
    }
}

impl<'de> serde::Deserialize<'de> for ElsterType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl<'de> serde::Deserialize<'de> for CanMember {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
