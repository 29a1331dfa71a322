//! Application configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rekon_core::Amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::exchanges::ExchangeDriver;
use crate::strategy::StrategyKind;

/// Default config path when neither `--config` nor `REKON_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// A venue account. Its id doubles as the executor destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    /// Executor drain interval for this account (ms). Default: 1000.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    pub exchange: ExchangeDriver,
}

fn default_delay_ms() -> u64 {
    1_000
}

impl AccountConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// An account and market pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRef {
    pub account: String,
    pub market: String,
}

/// Ladder scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderConfig {
    /// Rungs per side.
    #[serde(default = "default_ladder_levels")]
    pub levels: usize,
    /// Relative distance between rung boundaries (e.g. 0.001 = 10 bps).
    pub step: Decimal,
    /// Largest amount a single create may carry.
    #[serde(default)]
    pub max_amount_per_order: Option<Amount>,
}

fn default_ladder_levels() -> usize {
    5
}

/// Scheduler selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SchedulerConfig {
    #[default]
    Simple,
    Ladder(LadderConfig),
}

/// One reconciliation loop: a strategy driving a target market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub strategy: StrategyKind,
    /// Tick period (ms). Default: 5000.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    pub target: MarketRef,
    #[serde(default)]
    pub sources: Vec<MarketRef>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_period_ms() -> u64 {
    5_000
}

impl StrategyConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Open-order snapshot refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrdersConfig {
    /// Interval between full `fetch_openorders` refreshes (ms). Default: 60000.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

fn default_refresh_interval_ms() -> u64 {
    60_000
}

impl Default for OpenOrdersConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl OpenOrdersConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    #[serde(default)]
    pub open_orders: OpenOrdersConfig,
}

impl AppConfig {
    /// Resolve the config path: explicit argument > `REKON_CONFIG` > default.
    pub fn resolve_path(explicit: Option<String>) -> String {
        explicit
            .or_else(|| std::env::var("REKON_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load and validate a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn account(&self, id: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.id == id)
    }

    /// Reject duplicate ids, unknown account references and degenerate
    /// intervals.
    pub fn validate(&self) -> AppResult<()> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate account id: {}",
                    account.id
                )));
            }
            if account.delay_ms == 0 {
                return Err(AppError::Config(format!(
                    "account {}: delay_ms must be positive",
                    account.id
                )));
            }
            account.exchange.validate(&account.id)?;
        }

        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            let id = &strategy.id;
            if !seen.insert(id.as_str()) {
                return Err(AppError::Config(format!("duplicate strategy id: {id}")));
            }
            if strategy.period_ms == 0 {
                return Err(AppError::Config(format!(
                    "strategy {id}: period_ms must be positive"
                )));
            }
            for market_ref in std::iter::once(&strategy.target).chain(&strategy.sources) {
                if self.account(&market_ref.account).is_none() {
                    return Err(AppError::Config(format!(
                        "strategy {id}: unknown account {}",
                        market_ref.account
                    )));
                }
            }
            let required = strategy.strategy.required_sources();
            if strategy.sources.len() < required {
                return Err(AppError::Config(format!(
                    "strategy {id}: {} needs at least {required} source(s)",
                    strategy.strategy.name()
                )));
            }
            if let SchedulerConfig::Ladder(ladder) = &strategy.scheduler {
                if ladder.levels == 0 || ladder.step.is_sign_negative() {
                    return Err(AppError::Config(format!(
                        "strategy {id}: ladder needs levels > 0 and a non-negative step"
                    )));
                }
                if let Some(max) = ladder.max_amount_per_order {
                    if !max.is_positive() {
                        return Err(AppError::Config(format!(
                            "strategy {id}: max_amount_per_order must be positive"
                        )));
                    }
                    let min_amount = self
                        .account(&strategy.target.account)
                        .and_then(|a| a.exchange.market(&strategy.target.market))
                        .map(|m| m.min_amount);
                    if min_amount.is_some_and(|min| max < min) {
                        return Err(AppError::Config(format!(
                            "strategy {id}: max_amount_per_order is below the market min_amount"
                        )));
                    }
                }
            }
        }

        if self.open_orders.refresh_interval_ms == 0 {
            return Err(AppError::Config(
                "open_orders.refresh_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
