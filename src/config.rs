//! Configuration file
//!
//! JSON file with every field optional; missing fields take their defaults.

use crate::confirmation::Finality;
use crate::core::FeeSchedule;
use crate::ledger::LedgerSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings for the simulated ledger used by the CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Balance given to each simulated wallet, in base units
    pub starting_balance: u64,
    pub fee_per_signature: u64,
    pub confirmation_delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let ledger = LedgerSettings::default();
        Self {
            starting_balance: 2_000_000_000,
            fee_per_signature: ledger.fee_per_signature,
            confirmation_delay_ms: ledger.confirmation_delay.as_millis() as u64,
        }
    }
}

impl SimulationConfig {
    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            fee_per_signature: self.fee_per_signature,
            confirmation_delay: Duration::from_millis(self.confirmation_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// `env_logger` filter used when `RUST_LOG` is unset
    pub log_filter: String,
    pub finality: Finality,
    /// Fees applied when a command does not override them
    pub fees: FeeSchedule,
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            finality: Finality::default(),
            fees: FeeSchedule::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = fs::File::open(path)?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let temp_path = path.with_extension("tmp");
        let writer = BufWriter::new(fs::File::create(&temp_path)?);
        serde_json::to_writer_pretty(writer, self)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter is empty".to_string()));
        }
        if self.fees.percent_fee_bps > crate::core::BPS_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "percent_fee_bps {} exceeds 100%",
                self.fees.percent_fee_bps
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txflow.json");
        fs::write(&path, r#"{ "finality": "finalized", "fees": { "flat_fee": 10000 } }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.finality, Finality::Finalized);
        assert_eq!(config.fees.flat_fee, 10_000);
        assert_eq!(config.fees.network_fee, crate::core::DEFAULT_NETWORK_FEE);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txflow.json");
        let mut config = Config::default();
        config.simulation.confirmation_delay_ms = 5;

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
        assert_eq!(
            config.simulation.ledger_settings().confirmation_delay,
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "fees": { "percent_fee_bps": 20000 } }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            Config::load(&dir.path().join("missing.json")),
            Err(ConfigError::IoError(_))
        ));
    }
}
