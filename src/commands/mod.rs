//! CLI commands
//!
//! Each command loads the config, picks a gateway and drives one strategy on
//! its own tokio runtime.

pub mod grid;
pub mod order;
pub mod twap;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use execution_strategies::gateway::{BinanceFuturesGateway, OpenOrder, OrderGateway, PaperGateway};
use execution_strategies::journal::ExecutionJournal;
use execution_strategies::{Config, Money, Symbol};

/// Global flags shared by every subcommand
#[derive(Debug, Clone)]
pub struct Session {
    pub config_path: String,
    pub paper: bool,
    pub mainnet: bool,
}

impl Session {
    pub fn load_config(&self) -> Result<Config> {
        dotenv::dotenv().ok();
        let mut config = Config::load_or_default(&self.config_path)?;
        if self.mainnet {
            config.exchange.mainnet = true;
        }
        Ok(config)
    }
}

/// The exchange a command runs against
pub enum Venue {
    Paper(Arc<PaperGateway>),
    Binance(Arc<BinanceFuturesGateway>),
}

impl Venue {
    pub fn connect(session: &Session, config: &Config) -> Result<Self> {
        if session.paper {
            info!("Paper mode: orders go to an in-memory exchange");
            return Ok(Venue::Paper(Arc::new(PaperGateway::new())));
        }
        let gateway = BinanceFuturesGateway::from_config(&config.exchange)?;
        info!("Connected to {}", gateway.base_url());
        Ok(Venue::Binance(Arc::new(gateway)))
    }

    pub fn gateway(&self) -> Arc<dyn OrderGateway> {
        match self {
            Venue::Paper(paper) => paper.clone() as Arc<dyn OrderGateway>,
            Venue::Binance(binance) => binance.clone(),
        }
    }

    /// Current market price; the paper exchange only knows what it was told
    pub async fn market_price(&self, symbol: &Symbol) -> Result<Option<Money>> {
        match self {
            Venue::Paper(paper) => Ok(paper.mark_price()),
            Venue::Binance(binance) => {
                let price = binance
                    .ticker_price(symbol)
                    .await
                    .with_context(|| format!("Failed to fetch ticker price for {}", symbol))?;
                Ok(Some(price))
            }
        }
    }

    /// Live orders as the exchange lists them, optionally for one symbol
    pub async fn open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<OpenOrder>> {
        match self {
            Venue::Paper(paper) => Ok(paper.listed_orders(symbol)),
            Venue::Binance(binance) => binance
                .open_orders(symbol)
                .await
                .context("Failed to fetch open orders"),
        }
    }

    pub fn seed_mark_price(&self, price: Money) {
        if let Venue::Paper(paper) = self {
            paper.set_mark_price(price);
        }
    }
}

pub fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Cancel `token` on Ctrl+C. Must be called inside the runtime.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                token.cancel();
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });
}

pub fn open_journal(config: &Config) -> Result<ExecutionJournal> {
    match &config.journal.path {
        Some(path) => {
            info!("Journal: {}", path.display());
            ExecutionJournal::with_file(path)
        }
        None => Ok(ExecutionJournal::in_memory()),
    }
}

/// Give the operator a chance to abort before real orders go out
pub async fn mainnet_countdown(config: &Config, cancel: &CancellationToken) -> bool {
    if !config.exchange.mainnet {
        return true;
    }
    warn!("MAINNET MODE - REAL MONEY AT RISK!");
    warn!("Press Ctrl+C within 10 seconds to abort...");
    for i in (1..=10).rev() {
        info!("Starting in {} seconds...", i);
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
    true
}
