//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use svp_core::{AssetRole, MarketKey, MarketType, Venue};
use svp_detector::{DetectorConfig, DetectorError};
use svp_feed::ReadingsConfig;
use svp_gate::{GateConfig, GateError};
use svp_notify::NotifyConfig;
use svp_persistence::PersistenceConfig;

/// One trade stream to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub venue: Venue,
    pub market_type: MarketType,
    /// Venue-native symbol (e.g. `SOLUSDT`, `SOL-USDT-SWAP`, `SOL-USD`).
    pub symbol: String,
    #[serde(default)]
    pub role: AssetRole,
}

impl MarketConfig {
    pub fn new(venue: Venue, market_type: MarketType, symbol: &str) -> Self {
        Self {
            venue,
            market_type,
            symbol: symbol.to_string(),
            role: AssetRole::Primary,
        }
    }

    pub fn reference(venue: Venue, market_type: MarketType, symbol: &str) -> Self {
        Self {
            role: AssetRole::Reference,
            ..Self::new(venue, market_type, symbol)
        }
    }

    pub fn key(&self) -> MarketKey {
        MarketKey {
            venue: self.venue,
            market_type: self.market_type,
            role: self.role,
        }
    }
}

fn default_markets() -> Vec<MarketConfig> {
    vec![
        MarketConfig::new(Venue::Coinbase, MarketType::Spot, "SOL-USD"),
        MarketConfig::new(Venue::Binance, MarketType::Spot, "SOLUSDT"),
        MarketConfig::new(Venue::Binance, MarketType::Perp, "SOLUSDT"),
        MarketConfig::new(Venue::Bybit, MarketType::Perp, "SOLUSDT"),
        MarketConfig::new(Venue::Okx, MarketType::Perp, "SOL-USDT-SWAP"),
        MarketConfig::reference(Venue::Binance, MarketType::Spot, "BTCUSDT"),
        MarketConfig::reference(Venue::Binance, MarketType::Perp, "BTCUSDT"),
    ]
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Interval of the periodic counter summary in the log.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    3600
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Monitored asset, shown in alerts.
    #[serde(default = "default_asset")]
    pub asset: String,
    #[serde(default = "default_markets")]
    pub markets: Vec<MarketConfig>,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Wait after a failed tick, and before a trade stream reconnects.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub readings: ReadingsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_asset() -> String {
    "SOL".to_string()
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_error_backoff_secs() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            asset: default_asset(),
            markets: default_markets(),
            tick_interval_secs: default_tick_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            detector: DetectorConfig::default(),
            gate: GateConfig::default(),
            notify: NotifyConfig::default(),
            readings: ReadingsConfig::default(),
            persistence: PersistenceConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML content.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> AppResult<()> {
        self.validate_app().map_err(AppError::Config)?;
        self.detector
            .validate()
            .map_err(DetectorError::ConfigError)?;
        self.gate.validate().map_err(GateError::ConfigError)?;
        Ok(())
    }

    fn validate_app(&self) -> Result<(), String> {
        if self.asset.is_empty() {
            return Err("asset must not be empty".to_string());
        }
        if self.tick_interval_secs == 0 {
            return Err("tick_interval_secs must be > 0".to_string());
        }
        if self.telemetry.stats_interval_secs == 0 {
            return Err("telemetry.stats_interval_secs must be > 0".to_string());
        }
        if self.markets.is_empty() {
            return Err("at least one market is required".to_string());
        }

        let mut seen = BTreeSet::new();
        for market in &self.markets {
            if market.symbol.is_empty() {
                return Err(format!("market {} has an empty symbol", market.key()));
            }
            if !seen.insert(market.key()) {
                return Err(format!("market {} is configured twice", market.key()));
            }
        }

        self.notify.validate().map_err(|e| format!("notify: {e}"))?;
        self.readings.validate().map_err(|e| format!("readings: {e}"))?;
        self.persistence
            .validate()
            .map_err(|e| format!("persistence: {e}"))?;

        if !self
            .detector
            .horizons
            .iter()
            .any(|h| h.label == self.notify.breakdown_horizon)
        {
            return Err(format!(
                "notify.breakdown_horizon ({}) is not a detector horizon",
                self.notify.breakdown_horizon
            ));
        }
        Ok(())
    }

    pub fn market_keys(&self) -> Vec<MarketKey> {
        self.markets.iter().map(MarketConfig::key).collect()
    }
}
