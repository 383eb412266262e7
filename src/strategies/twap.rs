//! TWAP (Time-Weighted Average Price) Scheduler
//!
//! Splits a large order into equal market-order chunks submitted at a fixed
//! interval, smoothing price impact over time.
//!
//! ## How it works:
//! 1. `base = floor(total / chunks)` at the quantity step; the remainder goes
//!    to the last chunk, so the chunks always sum to the total exactly
//! 2. Chunks are submitted strictly in index order, one at a time
//! 3. The scheduler waits `interval` between chunks (never after the last)
//! 4. A transient submission failure is retried once immediately; anything
//!    else aborts the run and reports the chunks executed so far

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ConfigurationError, GatewayError};
use crate::gateway::{OrderAck, OrderGateway, OrderTicket};
use crate::journal::{ExecutionJournal, JournalEvent};
use crate::{Money, OrderId, OrderStatus, Side, StrategyOrder, Symbol};

/// Submission attempts per chunk: the first try plus one retry
const MAX_ATTEMPTS: u32 = 2;

/// Pre-validated TWAP inputs
#[derive(Debug, Clone, PartialEq)]
pub struct TwapParams {
    pub symbol: Symbol,
    pub side: Side,
    pub total_quantity: Money,
    pub chunk_count: u32,
    pub interval: Duration,
    /// Decimal places of the exchange quantity step
    pub quantity_precision: u32,
}

#[derive(Debug, Clone)]
pub struct TwapPlan {
    symbol: Symbol,
    side: Side,
    total_quantity: Money,
    interval: Duration,
    chunk_quantities: Vec<Money>,
    chunks: Vec<StrategyOrder>,
}

impl TwapPlan {
    pub fn new(params: TwapParams) -> Result<Self, ConfigurationError> {
        if params.chunk_count == 0 {
            return Err(ConfigurationError::NoChunks);
        }

        // Never truncate below the precision the operator actually typed
        let precision = params
            .quantity_precision
            .max(params.total_quantity.scale());
        let base = params
            .total_quantity
            .div_floor(params.chunk_count, precision);
        if !base.is_positive() {
            return Err(ConfigurationError::ChunkBelowStep {
                total: params.total_quantity,
                chunks: params.chunk_count,
                precision,
                max_chunks: params.total_quantity.whole_steps(precision),
            });
        }

        let count = params.chunk_count as usize;
        let remainder = params.total_quantity - base.times(count);
        let mut chunk_quantities = vec![base; count];
        chunk_quantities[count - 1] = base + remainder;

        Ok(Self {
            symbol: params.symbol,
            side: params.side,
            total_quantity: params.total_quantity,
            interval: params.interval,
            chunk_quantities,
            chunks: Vec::with_capacity(count),
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn total_quantity(&self) -> Money {
        self.total_quantity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_quantities.len()
    }

    /// Planned quantity of every chunk, in submission order
    pub fn chunk_quantities(&self) -> &[Money] {
        &self.chunk_quantities
    }

    /// Chunks executed so far, in submission order
    pub fn chunks(&self) -> &[StrategyOrder] {
        &self.chunks
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.len() == self.chunk_quantities.len()
    }

    pub fn executed_quantity(&self) -> Money {
        self.chunks.iter().map(|c| c.quantity).sum()
    }

    /// Volume-weighted fill price over chunks whose fill price is known
    pub fn average_fill_price(&self) -> Option<Money> {
        let priced: Vec<(Money, Money)> = self
            .chunks
            .iter()
            .filter_map(|c| c.avg_fill_price.map(|p| (c.quantity, p)))
            .collect();
        let quantity: Money = priced.iter().map(|(q, _)| *q).sum();
        if !quantity.is_positive() {
            return None;
        }
        let notional: Money = priced.iter().map(|(q, p)| *q * *p).sum();
        Some(Money::new(notional.inner() / quantity.inner()))
    }

    fn ticket(&self, index: usize) -> OrderTicket {
        OrderTicket::market(self.symbol.clone(), self.side, self.chunk_quantities[index])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwapOutcome {
    /// Every chunk was executed
    Completed,
    /// The run stopped early; see [`TwapAbort`]
    Partial,
}

/// Why a TWAP run stopped before its last chunk
#[derive(Debug, Clone, PartialEq)]
pub enum TwapAbort {
    /// Submission failed for good after `attempts` tries
    Gateway {
        chunk: usize,
        attempts: u32,
        error: GatewayError,
    },
    /// The exchange acknowledged the chunk with status REJECTED
    RejectedAck { chunk: usize, order_id: OrderId },
    /// Cancelled before `chunk` was submitted
    Cancelled { chunk: usize },
}

impl TwapAbort {
    /// Index of the chunk that was not executed
    pub fn chunk(&self) -> usize {
        match self {
            TwapAbort::Gateway { chunk, .. }
            | TwapAbort::RejectedAck { chunk, .. }
            | TwapAbort::Cancelled { chunk } => *chunk,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TwapReport {
    pub plan: TwapPlan,
    pub outcome: TwapOutcome,
    pub abort: Option<TwapAbort>,
}

impl TwapReport {
    pub fn chunks(&self) -> &[StrategyOrder] {
        self.plan.chunks()
    }
}

pub struct TwapScheduler<G> {
    gateway: G,
    journal: ExecutionJournal,
}

impl<G: OrderGateway> TwapScheduler<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            journal: ExecutionJournal::in_memory(),
        }
    }

    pub fn with_journal(mut self, journal: ExecutionJournal) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> &ExecutionJournal {
        &self.journal
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Drive `plan` to completion or to its first unrecoverable failure.
    ///
    /// Cancellation is honoured before each chunk and during the wait between
    /// chunks; an in-flight submission is always allowed to finish.
    pub async fn execute(&mut self, mut plan: TwapPlan, cancel: &CancellationToken) -> TwapReport {
        let total = plan.chunk_count();
        info!(
            symbol = %plan.symbol,
            side = %plan.side,
            total_quantity = %plan.total_quantity,
            chunks = total,
            chunk_quantity = %plan.chunk_quantities[0],
            last_chunk_quantity = %plan.chunk_quantities[total - 1],
            interval_secs = plan.interval.as_secs_f64(),
            gateway = self.gateway.name(),
            "TWAP execution started"
        );

        let mut abort = None;

        for index in 0..total {
            if cancel.is_cancelled() {
                abort = Some(TwapAbort::Cancelled { chunk: index });
                break;
            }

            let ticket = plan.ticket(index);
            info!(
                symbol = %ticket.symbol,
                side = %ticket.side,
                quantity = %ticket.quantity,
                chunk = index + 1,
                chunks = total,
                "Placing TWAP chunk"
            );

            let ack = match self.submit_with_retry(index, &ticket).await {
                Ok(ack) => ack,
                Err((error, attempts)) => {
                    error!(
                        symbol = %ticket.symbol,
                        side = %ticket.side,
                        quantity = %ticket.quantity,
                        chunk = index + 1,
                        attempts,
                        kind = error.kind(),
                        error = %error,
                        "TWAP chunk failed, aborting plan"
                    );
                    abort = Some(TwapAbort::Gateway {
                        chunk: index,
                        attempts,
                        error,
                    });
                    break;
                }
            };

            if ack.status == OrderStatus::Rejected {
                error!(
                    symbol = %ticket.symbol,
                    side = %ticket.side,
                    quantity = %ticket.quantity,
                    chunk = index + 1,
                    order_id = ack.order_id,
                    "TWAP chunk acknowledged as REJECTED, aborting plan"
                );
                abort = Some(TwapAbort::RejectedAck {
                    chunk: index,
                    order_id: ack.order_id,
                });
                break;
            }

            let order = ack.into_order(&ticket);
            info!(
                symbol = %order.symbol,
                side = %order.side,
                quantity = %order.quantity,
                price = ?order.avg_fill_price.map(|p| p.to_string()),
                order_id = order.order_id,
                status = %order.status,
                chunk = index + 1,
                "TWAP chunk executed"
            );
            self.journal.record(JournalEvent::TwapChunk, index, order.clone());
            plan.chunks.push(order);

            if index + 1 < total && !plan.interval.is_zero() {
                info!(
                    "Waiting {:.1}s before chunk {}/{}",
                    plan.interval.as_secs_f64(),
                    index + 2,
                    total
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        abort = Some(TwapAbort::Cancelled { chunk: index + 1 });
                        break;
                    }
                    _ = tokio::time::sleep(plan.interval) => {}
                }
            }
        }

        let outcome = if abort.is_none() && plan.is_complete() {
            TwapOutcome::Completed
        } else {
            TwapOutcome::Partial
        };

        log_summary(&plan, outcome, abort.as_ref());

        TwapReport {
            plan,
            outcome,
            abort,
        }
    }

    async fn submit_with_retry(
        &self,
        index: usize,
        ticket: &OrderTicket,
    ) -> Result<OrderAck, (GatewayError, u32)> {
        let mut attempt = 1;
        loop {
            match self.gateway.submit_order(ticket).await {
                Ok(ack) => return Ok(ack),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        symbol = %ticket.symbol,
                        chunk = index + 1,
                        quantity = %ticket.quantity,
                        error = %e,
                        "Transient failure on TWAP chunk, retrying once"
                    );
                    attempt += 1;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

fn log_summary(plan: &TwapPlan, outcome: TwapOutcome, abort: Option<&TwapAbort>) {
    let executed = plan.chunks.len();
    let total = plan.chunk_count();
    let avg_price = plan
        .average_fill_price()
        .map(|p| p.round_dp(8).to_string())
        .unwrap_or_else(|| "n/a".to_string());

    match outcome {
        TwapOutcome::Completed => info!(
            symbol = %plan.symbol,
            executed_chunks = executed,
            executed_quantity = %plan.executed_quantity(),
            avg_fill_price = %avg_price,
            "TWAP execution completed"
        ),
        TwapOutcome::Partial => warn!(
            symbol = %plan.symbol,
            executed_chunks = executed,
            total_chunks = total,
            executed_quantity = %plan.executed_quantity(),
            target_quantity = %plan.total_quantity,
            avg_fill_price = %avg_price,
            stopped_at_chunk = ?abort.map(|a| a.chunk() + 1),
            "TWAP execution stopped early"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params(total: Money, chunks: u32, precision: u32) -> TwapParams {
        TwapParams {
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Buy,
            total_quantity: total,
            chunk_count: chunks,
            interval: Duration::from_secs(5),
            quantity_precision: precision,
        }
    }

    #[test]
    fn test_even_split() {
        let plan = TwapPlan::new(params(Money::new(dec!(0.005)), 5, 3)).unwrap();
        assert_eq!(plan.chunk_quantities(), &[Money::new(dec!(0.001)); 5]);
    }

    #[test]
    fn test_remainder_goes_to_last_chunk() {
        let plan = TwapPlan::new(params(Money::new(dec!(0.007)), 3, 3)).unwrap();
        assert_eq!(
            plan.chunk_quantities(),
            &[
                Money::new(dec!(0.002)),
                Money::new(dec!(0.002)),
                Money::new(dec!(0.003))
            ]
        );
    }

    #[test]
    fn test_chunks_always_sum_to_total() {
        let totals = [dec!(0.005), dec!(1), dec!(0.123), dec!(10.001), dec!(7.5), dec!(0.999)];
        for total in totals {
            for chunks in 1..=12u32 {
                let total = Money::new(total);
                match TwapPlan::new(params(total, chunks, 3)) {
                    Ok(plan) => {
                        assert_eq!(plan.chunk_count(), chunks as usize);
                        let sum: Money = plan.chunk_quantities().iter().sum();
                        assert_eq!(sum, total, "total {} chunks {}", total, chunks);
                        assert!(plan.chunk_quantities().iter().all(|q| q.is_positive()));
                    }
                    Err(ConfigurationError::ChunkBelowStep { .. }) => {
                        assert!(total.div_floor(chunks, 3).is_zero());
                    }
                    Err(e) => panic!("unexpected error {e}"),
                }
            }
        }
    }

    #[test]
    fn test_precision_follows_input_scale() {
        // 0.0005 has four decimals; a 3-decimal step must not truncate it to zero
        let plan = TwapPlan::new(params(Money::new(dec!(0.0005)), 5, 3)).unwrap();
        assert_eq!(plan.chunk_quantities()[0], Money::new(dec!(0.0001)));
    }

    #[test]
    fn test_single_chunk_is_whole_quantity() {
        let plan = TwapPlan::new(params(Money::new(dec!(2.5)), 1, 3)).unwrap();
        assert_eq!(plan.chunk_quantities(), &[Money::new(dec!(2.5))]);
    }

    #[test]
    fn test_configuration_errors() {
        assert_eq!(
            TwapPlan::new(params(Money::ONE, 0, 3)).unwrap_err(),
            ConfigurationError::NoChunks
        );
        assert!(matches!(
            TwapPlan::new(params(Money::new(dec!(0.002)), 5, 3)),
            Err(ConfigurationError::ChunkBelowStep { chunks: 5, precision: 3, .. })
        ));
    }

    #[test]
    fn test_chunk_below_step_suggests_chunk_count() {
        let err = TwapPlan::new(params(Money::new(dec!(0.002)), 5, 3)).unwrap_err();
        assert!(matches!(err, ConfigurationError::ChunkBelowStep { max_chunks: 2, .. }));
        assert!(err.to_string().contains("use at most 2 chunks"), "{err}");

        // The suggested count is accepted
        assert!(TwapPlan::new(params(Money::new(dec!(0.002)), 2, 3)).is_ok());
    }
}
