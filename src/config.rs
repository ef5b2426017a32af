//! Runtime configuration.
//!
//! Defaults match the deployed installation; an optional TOML file overrides
//! them. The serial endpoint itself is configuration, not discovery (see the
//! transport module), so everything the link needs is here.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_MAX_CURRENT, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT,
    DEFAULT_TIMEOUT_MS,
};
use crate::error::{Result, VescError};
use crate::transport::LinkConfig;

/// A named rider profile: current limits applied as a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Motor current limit in amps
    pub current: f32,
    /// Field-weakening current in amps
    pub fw: f32,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial device path
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Byte timeout in milliseconds
    pub timeout_ms: u64,
    /// Telemetry poll cadence in milliseconds
    pub poll_interval_ms: u64,
    /// HTTP/WebSocket listen address
    pub listen: SocketAddr,
    /// Directory of built UI assets served under `/app`
    pub static_dir: PathBuf,
    /// Maximum motor current in amps (throttle percentage reference)
    pub max_current: f32,
    /// Wheel circumference in meters (speed calculation)
    pub wheel_circumference_m: f32,
    /// Motor-to-wheel gear ratio (speed calculation)
    pub gear_ratio: f32,
    /// Rider profiles selectable from the UI
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert("eco".to_string(), Profile { current: 30.0, fw: 0.0 });
        profiles.insert(
            "street".to_string(),
            Profile {
                current: 60.0,
                fw: 30.0,
            },
        );
        profiles.insert(
            "boost".to_string(),
            Profile {
                current: 100.0,
                fw: 60.0,
            },
        );

        Config {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            listen: "0.0.0.0:5000".parse().expect("static default address"),
            static_dir: PathBuf::from("UI/dist"),
            max_current: DEFAULT_MAX_CURRENT,
            wheel_circumference_m: 1.5,
            gear_ratio: 1.0,
            profiles,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, or defaults when `path` is
    /// `None`. Unknown keys in the file are ignored.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    VescError::Config(format!("{}: {e}", path.display()))
                })?;
                toml::from_str(&raw)
                    .map_err(|e| VescError::Config(format!("{}: {e}", path.display())))
            }
            None => Ok(Config::default()),
        }
    }

    /// Serial connection parameters for the transport layer.
    pub fn link(&self) -> LinkConfig {
        LinkConfig {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Poll cadence as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_deployment() {
        let config = Config::default();
        assert_eq!(config.port, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.max_current, 60.0);
        assert_eq!(config.profiles["street"].current, 60.0);
        assert_eq!(config.profiles["boost"].fw, 60.0);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
port = "/dev/ttyUSB1"
poll_interval_ms = 250

[profiles.race]
current = 120.0
fw = 80.0
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.port, "/dev/ttyUSB1");
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        // defaults survive partial files
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.profiles["race"].current, 120.0);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Some(Path::new("/no/such/pivesc.toml"))).unwrap_err();
        assert!(matches!(err, VescError::Config(_)));
    }
}
