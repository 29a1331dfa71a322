//! Main application orchestration.
//!
//! Builds one venue per account and one [`Runner`] per configured strategy,
//! each with its own [`ActionExecutor`], then drives every runner on its own
//! tick period until shutdown. Executors are never shared, so a push from
//! one strategy only ever replaces that strategy's queued batch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rekon_executor::{ActionExecutor, DynExchange};
use rekon_scheduler::DestinationId;
use rekon_telemetry::Metrics;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{AccountConfig, AppConfig, MarketRef, StrategyConfig};
use crate::error::{AppError, AppResult};
use crate::runner::{Runner, Source, TickOutcome};

/// Main application.
pub struct Application {
    config: AppConfig,
    accounts: HashMap<String, DynExchange>,
}

impl Application {
    /// Build every venue.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let mut accounts = HashMap::with_capacity(config.accounts.len());
        for account in &config.accounts {
            let exchange = account.exchange.build(&account.id)?;
            info!(
                account = %account.id,
                driver = account.exchange.name(),
                markets = ?account.exchange.markets(),
                "Account ready"
            );
            accounts.insert(account.id.clone(), exchange);
        }

        Ok(Self { config, accounts })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn exchange(&self, account: &str) -> Option<&DynExchange> {
        self.accounts.get(account)
    }

    fn source(&self, market_ref: &MarketRef) -> AppResult<Source> {
        let exchange = self
            .accounts
            .get(&market_ref.account)
            .ok_or_else(|| AppError::UnknownAccount(market_ref.account.clone()))?;
        Ok(Source {
            exchange: exchange.clone(),
            market: market_ref.market.clone(),
        })
    }

    /// Build a runner with a private executor whose single lane targets
    /// the strategy's account.
    async fn build_runner(&self, strategy: &StrategyConfig) -> AppResult<Runner> {
        let target = self.source(&strategy.target)?;
        let delay = self
            .config
            .account(&strategy.target.account)
            .map(AccountConfig::delay);
        let executor = Arc::new(ActionExecutor::new());
        executor.register(
            DestinationId::new(target.exchange.id()),
            target.exchange.clone(),
            delay,
        )?;

        let sources = strategy
            .sources
            .iter()
            .map(|market_ref| self.source(market_ref))
            .collect::<AppResult<Vec<_>>>()?;
        Runner::new(
            strategy.id.clone(),
            strategy.strategy.build(),
            target,
            sources,
            strategy.scheduler.clone(),
            executor,
        )
        .await
    }

    /// Build one runner per configured strategy, in configuration order.
    pub async fn build_runners(&self) -> AppResult<Vec<Runner>> {
        let mut runners = Vec::with_capacity(self.config.strategies.len());
        for strategy in &self.config.strategies {
            runners.push(self.build_runner(strategy).await?);
        }
        Ok(runners)
    }

    /// Run until `shutdown` resolves, then stop the runners and drain their
    /// executors.
    pub async fn run_until<F: Future>(&self, shutdown: F) -> AppResult<()> {
        let runners = self.build_runners().await?;
        let executors: Vec<Arc<ActionExecutor>> =
            runners.iter().map(|r| r.executor().clone()).collect();
        for executor in &executors {
            executor.start()?;
        }

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let refresh = self.config.open_orders.refresh_interval();
        for (runner, strategy) in runners.into_iter().zip(&self.config.strategies) {
            tracker.spawn(drive(runner, strategy.period(), refresh, token.clone()));
        }
        tracker.close();
        info!(strategies = tracker.len(), "Entering main loop");

        shutdown.await;
        info!("Shutdown signal received");

        token.cancel();
        tracker.wait().await;
        for executor in &executors {
            executor.shutdown().await;
        }

        match Metrics::render() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => warn!(error = %e, "Failed to render metrics"),
        }
        info!("Shutdown complete");
        Ok(())
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> AppResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await
    }
}

async fn drive(mut runner: Runner, period: Duration, refresh: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut refresher = tokio::time::interval_at(Instant::now() + refresh, refresh);
    refresher.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,

            _ = ticker.tick() => match runner.tick().await {
                Ok(TickOutcome::Scheduled(count)) => {
                    debug!(strategy = %runner.id(), actions = count, "Tick scheduled actions");
                }
                Ok(outcome) => {
                    debug!(strategy = %runner.id(), outcome = outcome.label(), "Tick");
                }
                Err(e) => {
                    error!(strategy = %runner.id(), error = %e, "Tick failed");
                }
            },

            _ = refresher.tick() => {
                if let Err(e) = runner.refresh_open_orders().await {
                    warn!(strategy = %runner.id(), error = %e, "Open-order refresh failed");
                }
            }
        }
    }
    debug!(strategy = %runner.id(), "Runner stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekon_executor::Exchange;

    const CONFIG: &str = r#"
        [[accounts]]
        id = "paper"
        delay_ms = 100

        [accounts.exchange]
        driver = "paper"

        [[accounts.exchange.markets]]
        id = "btcusd"
        base_unit = "btc"
        quote_unit = "usd"
        amount_precision = 4
        price_precision = 2

        [[strategies]]
        id = "fixed"
        period_ms = 1000
        target = { account = "paper", market = "btcusd" }

        [strategies.strategy]
        kind = "fixedprice"
        mid = "100"
        spread = "0.01"
        amount = "0.5"
    "#;

    #[test]
    fn test_new_builds_accounts() {
        let app = Application::new(AppConfig::from_toml(CONFIG).unwrap()).unwrap();
        assert!(app.exchange("paper").is_some());
        assert!(app.exchange("missing").is_none());
    }

    #[tokio::test]
    async fn test_each_runner_owns_its_executor() {
        let app = Application::new(AppConfig::from_toml(CONFIG).unwrap()).unwrap();
        let runners = app.build_runners().await.unwrap();
        assert_eq!(runners.len(), 1);
        assert_eq!(
            runners[0].executor().destinations(),
            vec![DestinationId::new("paper")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategies_sharing_an_account_keep_their_batches() {
        let text = CONFIG.replace(
            "[[strategies]]",
            r#"[[accounts.exchange.markets]]
        id = "ethusd"
        base_unit = "eth"
        quote_unit = "usd"
        amount_precision = 4
        price_precision = 2

        [[strategies]]
        id = "fixed-eth"
        period_ms = 1000
        target = { account = "paper", market = "ethusd" }

        [strategies.strategy]
        kind = "fixedprice"
        mid = "10"
        spread = "0.01"
        amount = "2"

        [[strategies]]"#,
        );
        let app = Application::new(AppConfig::from_toml(&text).unwrap()).unwrap();
        let exchange = app.exchange("paper").unwrap().clone();

        // Both first ticks land before the first drain.
        app.run_until(tokio::time::sleep(Duration::from_millis(500)))
            .await
            .unwrap();

        let btc = exchange.fetch_openorders("btcusd").await.unwrap().len();
        let eth = exchange.fetch_openorders("ethusd").await.unwrap().len();
        assert_eq!((btc, eth), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_places_orders() {
        let app = Application::new(AppConfig::from_toml(CONFIG).unwrap()).unwrap();
        let exchange = app.exchange("paper").unwrap().clone();

        app.run_until(tokio::time::sleep(Duration::from_millis(1_500)))
            .await
            .unwrap();

        let orders = exchange.fetch_openorders("btcusd").await.unwrap();
        assert_eq!(orders.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_market_fails_build() {
        let text = CONFIG.replace(
            r#"target = { account = "paper", market = "btcusd" }"#,
            r#"target = { account = "paper", market = "ethusd" }"#,
        );
        let app = Application::new(AppConfig::from_toml(&text).unwrap()).unwrap();
        assert!(matches!(
            app.build_runners().await,
            Err(AppError::Exchange(_))
        ));
    }
}
