use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{LedgerError, Result};
use crate::types::Frequency;

/// ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// cadence used when onboarding does not name one
    pub default_frequency: Frequency,
    pub sweep: SweepConfig,
    pub import: ImportConfig,
    pub amendment: AmendmentConfig,
}

/// reconciliation sweep cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub interval_secs: u64,
    pub min_interval_secs: u64,
}

/// bulk import defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub default_frequency: Frequency,
    pub require_phone: bool,
}

/// amendment retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmendmentConfig {
    /// attempts before a retryable failure is surfaced
    pub max_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_frequency: Frequency::Monthly,
            sweep: SweepConfig::daily(),
            import: ImportConfig {
                default_frequency: Frequency::Monthly,
                require_phone: false,
            },
            amendment: AmendmentConfig { max_attempts: 3 },
        }
    }
}

impl SweepConfig {
    /// once a day, the cadence of the reminder job this replaces
    pub fn daily() -> Self {
        Self {
            interval_secs: 86_400,
            min_interval_secs: 1,
        }
    }

    /// hourly sweep
    pub fn hourly() -> Self {
        Self {
            interval_secs: 3_600,
            min_interval_secs: 1,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl LedgerConfig {
    /// parse and validate a json configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LedgerConfig = serde_json::from_str(json).map_err(|e| {
            LedgerError::InvalidConfiguration {
                message: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep.interval_secs == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "sweep interval must be non-zero".to_string(),
            });
        }
        if self.sweep.interval_secs < self.sweep.min_interval_secs {
            return Err(LedgerError::InvalidConfiguration {
                message: format!(
                    "sweep interval {}s below minimum {}s",
                    self.sweep.interval_secs, self.sweep.min_interval_secs
                ),
            });
        }
        if self.amendment.max_attempts == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "amendment needs at least one attempt".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_default_frequency(mut self, frequency: Frequency) -> Self {
        self.default_frequency = frequency;
        self
    }

    pub fn with_sweep(mut self, sweep: SweepConfig) -> Self {
        self.sweep = sweep;
        self
    }

    pub fn with_max_amendment_attempts(mut self, attempts: u32) -> Self {
        self.amendment.max_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LedgerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sweep.interval(), Duration::from_secs(86_400));
        assert_eq!(config.import.default_frequency, Frequency::Monthly);
    }

    #[test]
    fn test_json_round_trip_with_bi_weekly_default() {
        let config = LedgerConfig::default()
            .with_default_frequency(Frequency::BiWeekly)
            .with_sweep(SweepConfig::hourly());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"Bi-Weekly\""));

        let parsed = LedgerConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let json = serde_json::to_string(&LedgerConfig::default().with_max_amendment_attempts(0)).unwrap();
        let err = LedgerConfig::from_json_str(&json).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(LedgerConfig::from_json_str("{\"default_frequency\":").is_err());
    }
}
