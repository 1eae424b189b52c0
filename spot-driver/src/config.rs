use std::{collections::HashMap, fs, path::Path, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Rate key of the lease keepalive in [`SpotDriverConfig::rates`].
pub const LEASE_RATE_KEY: &str = "lease";

const DEFAULT_LEASE_RATE: f64 = 1.0;

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SpotDriverConfig {
    // TOML format has a restriction that if a table itself contains tables,
    // all keys with non-table values must be emitted first.
    // Therefore, the rates table must be located at the end of the struct.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Client name stamped on the SDK session.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_estop_name")]
    pub estop_name: String,
    /// The robot halts if the e-stop endpoint misses check-ins for this
    /// long.
    #[serde(default = "default_estop_timeout_sec")]
    pub estop_timeout_sec: f64,
    #[serde(default = "default_lease_resource")]
    pub lease_resource: String,
    /// Refresh rates in Hz, keyed by consumer. Only the `"lease"` key is
    /// read today; the map shape is kept for the polling consumers.
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub rates: HashMap<String, f64>,
}

fn default_hostname() -> String {
    "192.168.50.3".to_owned()
}

fn default_client_name() -> String {
    "spot_driver".to_owned()
}

fn default_estop_name() -> String {
    "spot_driver".to_owned()
}

fn default_estop_timeout_sec() -> f64 {
    9.0
}

fn default_lease_resource() -> String {
    spot_sdk::BODY_RESOURCE.to_owned()
}

impl Default for SpotDriverConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            username: String::new(),
            password: String::new(),
            client_name: default_client_name(),
            rates: HashMap::new(),
            estop_name: default_estop_name(),
            estop_timeout_sec: default_estop_timeout_sec(),
            lease_resource: default_lease_resource(),
        }
    }
}

impl SpotDriverConfig {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let s =
            fs::read_to_string(path).map_err(|e| Error::NoFile(path.to_path_buf(), e))?;
        Self::from_str(&s, path)
    }

    pub fn from_str(s: &str, path: impl AsRef<Path>) -> Result<Self, Error> {
        toml::from_str(s).map_err(|e| Error::TomlParseFailure(path.as_ref().to_path_buf(), e))
    }

    pub fn lease_keep_alive_period(&self) -> Duration {
        let rate = self
            .rates
            .get(LEASE_RATE_KEY)
            .copied()
            .filter(|r| *r > 0.0)
            .unwrap_or(DEFAULT_LEASE_RATE);
        Duration::from_secs_f64(1.0 / rate)
    }

    pub fn estop_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.estop_timeout_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SpotDriverConfig::default();
        assert_eq!(config.hostname, "192.168.50.3");
        assert_eq!(config.client_name, "spot_driver");
        assert_eq!(config.lease_resource, "body");
        assert_eq!(config.estop_timeout(), Duration::from_secs(9));
        assert_eq!(config.lease_keep_alive_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_config() {
        let config = SpotDriverConfig::from_str(
            r#"
            hostname = "10.0.0.3"
            username = "user"
            password = "hunter2"
            estop_timeout_sec = 3.0

            [rates]
            lease = 2.0
            "#,
            "test.toml",
        )
        .unwrap();
        assert_eq!(config.hostname, "10.0.0.3");
        assert_eq!(config.username, "user");
        assert_eq!(config.lease_keep_alive_period(), Duration::from_millis(500));
        assert_eq!(config.estop_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(SpotDriverConfig::from_str("robot = \"spot\"", "test.toml").is_err());
    }

    #[test]
    fn test_zero_rate_falls_back_to_default() {
        let mut config = SpotDriverConfig::default();
        config.rates.insert(LEASE_RATE_KEY.to_owned(), 0.0);
        assert_eq!(config.lease_keep_alive_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_config_round_trips_as_toml() {
        let s = toml::to_string(&SpotDriverConfig::default()).unwrap();
        let config = SpotDriverConfig::from_str(&s, "default.toml").unwrap();
        assert_eq!(config.hostname, SpotDriverConfig::default().hostname);
    }
}
