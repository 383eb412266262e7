//! Grid monitoring loop
//!
//! Places the ladder, then on every tick queries all resting orders
//! concurrently, folds the results into the [`GridPlan`] and submits the
//! mirrors it asks for, one at a time.

use futures_util::future::join_all;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::plan::{GridAction, GridParams, GridPlan, GridStats, Observation};
use crate::error::{ConfigurationError, GatewayError};
use crate::gateway::OrderGateway;
use crate::journal::{ExecutionJournal, JournalEvent};
use crate::{OrderId, OrderStatus, StrategyOrder};

/// Summary of a grid run
#[derive(Debug, Clone)]
pub struct GridReport {
    pub ticks: u64,
    pub stats: GridStats,
    /// Orders still live on the exchange when the loop stopped
    pub resting_orders: Vec<StrategyOrder>,
}

pub struct GridEngine<G> {
    gateway: G,
    plan: GridPlan,
    monitor_interval: Duration,
    journal: ExecutionJournal,
    ticks: u64,
}

impl<G: OrderGateway> GridEngine<G> {
    /// Fails before any order is sent when the parameters cannot form a grid
    pub fn new(
        gateway: G,
        params: GridParams,
        monitor_interval: Duration,
    ) -> Result<Self, ConfigurationError> {
        let plan = GridPlan::new(params)?;
        Ok(Self {
            gateway,
            plan,
            monitor_interval,
            journal: ExecutionJournal::in_memory(),
            ticks: 0,
        })
    }

    pub fn with_journal(mut self, journal: ExecutionJournal) -> Self {
        self.journal = journal;
        self
    }

    pub fn plan(&self) -> &GridPlan {
        &self.plan
    }

    pub fn journal(&self) -> &ExecutionJournal {
        &self.journal
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Place the ladder and monitor it until `cancel` fires.
    ///
    /// Resting orders are left on the exchange when this returns.
    pub async fn run(&mut self, cancel: &CancellationToken) -> GridReport {
        info!(
            symbol = %self.plan.symbol(),
            lower = %self.plan.lower_bound(),
            upper = %self.plan.upper_bound(),
            levels = self.plan.grid_count(),
            spacing = %self.plan.spacing(),
            reference_price = %self.plan.reference_price(),
            interval_secs = self.monitor_interval.as_secs_f64(),
            gateway = self.gateway.name(),
            "Grid started"
        );
        for level in self.plan.levels() {
            info!(
                "  Level {}: {} {} @ {}",
                level.index, level.side, level.quantity, level.price
            );
        }

        self.place_pending().await;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.monitor_interval) => {}
            }
            self.tick().await;
        }

        info!(ticks = self.ticks, "Grid monitoring stopped");
        self.report_orphans();
        self.report()
    }

    /// Initial placement: one limit order per level, ascending
    pub async fn place_pending(&mut self) {
        let actions = self.plan.observe(&[]);
        self.submit_all(actions).await;
    }

    /// One monitoring pass over every resting level
    pub async fn tick(&mut self) {
        self.ticks += 1;
        let resting = self.plan.resting_orders();
        let symbol = self.plan.symbol().clone();

        let queries = resting.iter().map(|&(level, order_id)| {
            let symbol = &symbol;
            let gateway = &self.gateway;
            async move {
                match gateway.query_order(symbol, order_id).await {
                    Ok(status) => Observation::Status {
                        level,
                        order_id,
                        status,
                    },
                    Err(error) => Observation::QueryFailed {
                        level,
                        order_id,
                        error,
                    },
                }
            }
        });
        let observations = join_all(queries).await;

        let actions = self.plan.observe(&observations);
        self.flush_journal();
        self.submit_all(actions).await;

        let stats = self.plan.stats();
        info!(
            tick = self.ticks,
            queried = resting.len(),
            resting = self.plan.resting_orders().len(),
            fills = stats.fills_buy + stats.fills_sell,
            replacements = stats.replacements,
            "Grid tick complete"
        );
    }

    async fn submit_all(&mut self, actions: Vec<GridAction>) {
        for action in actions {
            let ticket = action.ticket(self.plan.symbol());
            let result = self.gateway.submit_order(&ticket).await;
            if let Err(e) = &result {
                error!(
                    symbol = %ticket.symbol,
                    side = %ticket.side,
                    price = ?ticket.price.map(|p| p.to_string()),
                    quantity = %ticket.quantity,
                    level = action.level,
                    error = %e,
                    "Grid submission failed"
                );
            }
            self.plan.record_submission(&action, result);
            self.flush_journal();
        }
    }

    /// Cancel every resting order. Only called when the operator asks for it.
    pub async fn cancel_resting_orders(&mut self) -> Vec<(OrderId, Result<OrderStatus, GatewayError>)> {
        let symbol = self.plan.symbol().clone();
        let mut results = Vec::new();

        for (level, order_id) in self.plan.resting_orders() {
            let result = self.gateway.cancel_order(&symbol, order_id).await;
            match &result {
                Ok(status) => {
                    info!(level, order_id, status = %status, "Cancelled grid order");
                    self.plan.record_cancel(level);
                }
                Err(e) => warn!(level, order_id, error = %e, "Failed to cancel grid order"),
            }
            results.push((order_id, result));
        }

        self.flush_journal();
        results
    }

    pub fn report(&self) -> GridReport {
        GridReport {
            ticks: self.ticks,
            stats: self.plan.stats(),
            resting_orders: self.plan.live_orders(),
        }
    }

    fn report_orphans(&self) {
        let live = self.plan.live_orders();
        if live.is_empty() {
            return;
        }
        warn!(
            symbol = %self.plan.symbol(),
            count = live.len(),
            "Grid stopped with orders still resting on the exchange"
        );
        for order in &live {
            warn!(
                order_id = order.order_id,
                side = %order.side,
                quantity = %order.quantity,
                price = ?order.price.map(|p| p.to_string()),
                "Possible orphaned exposure"
            );
        }
    }

    fn flush_journal(&mut self) {
        for (level, order) in self.plan.take_terminal_orders() {
            self.journal.record(JournalEvent::GridTerminal, level, order);
        }
    }
}
