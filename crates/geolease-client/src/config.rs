use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use geolease_ledger::AssetConfig;

use crate::error::{ClientError, ClientResult};

/// Cadence and limits of the reconciliation loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Wall-clock period of the position tick, in milliseconds.
    pub tick_interval_ms: u64,
    /// A status poll runs every this many position ticks.
    pub poll_every_ticks: u64,
    /// Seconds the local display timer advances per position tick.
    pub tick_secs: u64,
    /// Rental length assumed before the ledger has reported the booked end.
    pub rental_duration_secs: u64,
    /// Maximum events read per poll.
    pub event_batch_limit: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            poll_every_ticks: 3,
            tick_secs: 1,
            rental_duration_secs: 3_600,
            event_batch_limit: 256,
        }
    }
}

impl LoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.saturating_mul(self.poll_every_ticks))
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(ClientError::Config("tick_interval_ms must be positive".into()));
        }
        if self.poll_every_ticks == 0 {
            return Err(ClientError::Config("poll_every_ticks must be positive".into()));
        }
        if self.event_batch_limit == 0 {
            return Err(ClientError::Config("event_batch_limit must be positive".into()));
        }
        Ok(())
    }
}

/// Top-level configuration file: the asset served by the ledger and the
/// client loop settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoleaseConfig {
    pub asset: AssetConfig,
    pub client: LoopConfig,
}

impl GeoleaseConfig {
    pub fn from_toml_str(input: &str) -> ClientResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| ClientError::Config(e.to_string()))?;
        config.client.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ClientResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> ClientResult<String> {
        toml::to_string_pretty(self).map_err(|e| ClientError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolease_types::Amount;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = LoopConfig::default();
        assert_eq!(c.tick_interval(), Duration::from_secs(1));
        assert_eq!(c.poll_interval(), Duration::from_secs(3));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = GeoleaseConfig::from_toml_str(
            r#"
            [asset]
            equipment_name = "Crane"
            price_per_second = "0.0001"

            [asset.zone]
            radius_m = 250
            center = { lat = 48858370, lon = 2294481 }

            [client]
            poll_every_ticks = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.asset.equipment_name, "Crane");
        assert_eq!(config.asset.price_per_second, Amount::parse("0.0001").unwrap());
        assert_eq!(config.asset.min_deposit, AssetConfig::default().min_deposit);
        assert_eq!(config.asset.zone.radius_m, 250);
        assert_eq!(config.asset.zone.center.lat, 48_858_370);
        assert_eq!(config.client.poll_every_ticks, 5);
        assert_eq!(config.client.tick_interval_ms, 1_000);
    }

    #[test]
    fn rejects_zero_poll_cadence() {
        let err = GeoleaseConfig::from_toml_str("[client]\npoll_every_ticks = 0\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn rejects_malformed_amount() {
        let err = GeoleaseConfig::from_toml_str("[asset]\nmin_deposit = \"abc\"\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn loads_written_file() {
        let config = GeoleaseConfig::default();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes()).unwrap();

        let loaded = GeoleaseConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GeoleaseConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
