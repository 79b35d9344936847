//! Runtime configuration.
//!
//! Layered, lowest precedence first:
//! 1. defaults in code
//! 2. an optional `stockwise.toml` (or an explicit path)
//! 3. `STOCKWISE__SECTION__KEY` environment overrides

use std::time::Duration;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;

use stockwise_forecast::{EngineSettings, ForecastPeriod};
use stockwise_observability::LogConfig;

const DEFAULT_CONFIG_FILE: &str = "stockwise";
const ENV_PREFIX: &str = "STOCKWISE";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StockwiseConfig {
    pub ledger: LedgerConfig,
    pub forecast: ForecastConfig,
    pub predictor: PredictorConfig,
    pub sweep: SweepConfig,
    pub alerts: AlertConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerConfig {
    /// Attempts after the first optimistic-concurrency failure.
    pub max_conflict_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForecastConfig {
    /// Months of sales history fed to the predictor.
    pub history_months: u32,
    pub default_horizon: u32,
    pub default_period: ForecastPeriod,
    pub restock_target_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PredictorConfig {
    /// When false only the local model runs.
    pub enabled: bool,
    pub url: String,
    pub timeout_ms: u64,
    pub include_seasonality: bool,
    pub include_trends: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SweepConfig {
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertConfig {
    /// Identical alerts (same kind and product) inside this window are dropped.
    pub suppression_hours: u32,
}

impl StockwiseConfig {
    /// Load from `./stockwise.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from the named file (extension optional, may be absent) and the
    /// environment.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults overlaid with an inline TOML document; ignores the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("ledger.max_conflict_retries", 5)?
            .set_default("ledger.retry_backoff_ms", 5)?
            .set_default("forecast.history_months", 6)?
            .set_default("forecast.default_horizon", 14)?
            .set_default("forecast.default_period", "DAILY")?
            .set_default("forecast.restock_target_days", 30)?
            .set_default("predictor.enabled", false)?
            .set_default("predictor.url", "http://localhost:8000")?
            .set_default("predictor.timeout_ms", 5000)?
            .set_default("predictor.include_seasonality", true)?
            .set_default("predictor.include_trends", true)?
            .set_default("sweep.workers", 4)?
            .set_default("alerts.suppression_hours", 24)?
            .set_default("log.format", "json")?
            .set_default("log.filter", "info")
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            restock_target_days: self.forecast.restock_target_days,
            include_seasonality: self.predictor.include_seasonality,
            include_trends: self.predictor.include_trends,
            ..EngineSettings::default()
        }
    }
}

impl Default for StockwiseConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            forecast: ForecastConfig::default(),
            predictor: PredictorConfig::default(),
            sweep: SweepConfig::default(),
            alerts: AlertConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            retry_backoff_ms: 5,
        }
    }
}

impl LedgerConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            history_months: 6,
            default_horizon: 14,
            default_period: ForecastPeriod::Daily,
            restock_target_days: 30,
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:8000".to_string(),
            timeout_ms: 5000,
            include_seasonality: true,
            include_trends: true,
        }
    }
}

impl PredictorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            suppression_hours: 24,
        }
    }
}

impl AlertConfig {
    pub fn suppression_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.suppression_hours))
    }
}
