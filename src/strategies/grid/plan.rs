//! Grid ladder and per-level state machine
//!
//! Everything here is synchronous: the engine feeds in the order statuses it
//! observed and submits whatever [`GridAction`]s come back.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::{ConfigurationError, GatewayError};
use crate::gateway::{OrderAck, OrderTicket};
use crate::{Money, OrderId, OrderStatus, Side, StrategyOrder, Symbol};

/// Pre-validated grid inputs
#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    pub symbol: Symbol,
    pub lower_bound: Money,
    pub upper_bound: Money,
    /// Number of price levels, bounds included
    pub grid_count: usize,
    pub quantity_per_grid: Money,
    /// Levels strictly below this price start as BUY, the rest as SELL
    pub reference_price: Money,
    /// Decimal places of the exchange price tick
    pub price_precision: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LevelState {
    /// No order yet, or the initial placement failed
    Pending,
    /// One live limit order on the book
    Resting,
    /// The order executed and its mirror has not been placed yet
    Filled,
    /// The mirror was accepted; the level owns the new order
    Replaced,
    /// The level has no order and will not get one
    Idle,
}

impl LevelState {
    pub fn as_str(self) -> &'static str {
        match self {
            LevelState::Pending => "PENDING",
            LevelState::Resting => "RESTING",
            LevelState::Filled => "FILLED",
            LevelState::Replaced => "REPLACED",
            LevelState::Idle => "IDLE",
        }
    }
}

impl std::fmt::Display for LevelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLevel {
    pub index: usize,
    /// Ladder rung the current (or next) order sits on
    pub rung: usize,
    pub price: Money,
    pub side: Side,
    pub quantity: Money,
    pub state: LevelState,
    /// Current order; after a fill this is the executed order until replaced
    pub order: Option<StrategyOrder>,
}

impl GridLevel {
    pub fn order_id(&self) -> Option<OrderId> {
        self.order.as_ref().map(|o| o.order_id)
    }

    pub fn is_resting(&self) -> bool {
        self.state == LevelState::Resting && self.order.is_some()
    }
}

/// What the engine saw when it queried a resting level's order
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Status {
        level: usize,
        order_id: OrderId,
        status: OrderStatus,
    },
    QueryFailed {
        level: usize,
        order_id: OrderId,
        error: GatewayError,
    },
}

impl Observation {
    pub fn level(&self) -> usize {
        match self {
            Observation::Status { level, .. } | Observation::QueryFailed { level, .. } => *level,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            Observation::Status { order_id, .. } | Observation::QueryFailed { order_id, .. } => {
                *order_id
            }
        }
    }
}

/// A limit order the engine must submit on behalf of a level
#[derive(Debug, Clone, PartialEq)]
pub struct GridAction {
    pub level: usize,
    pub rung: usize,
    pub side: Side,
    pub price: Money,
    pub quantity: Money,
}

impl GridAction {
    pub fn ticket(&self, symbol: &Symbol) -> OrderTicket {
        OrderTicket::limit(symbol.clone(), self.side, self.quantity, self.price)
    }
}

/// Running counters over the life of a plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GridStats {
    pub placed_buy: usize,
    pub placed_sell: usize,
    pub fills_buy: usize,
    pub fills_sell: usize,
    pub replacements: usize,
}

#[derive(Debug, Clone)]
pub struct GridPlan {
    symbol: Symbol,
    lower_bound: Money,
    upper_bound: Money,
    spacing: Money,
    grid_count: usize,
    quantity_per_grid: Money,
    reference_price: Money,
    price_precision: u32,
    levels: Vec<GridLevel>,
    stats: GridStats,
    /// Orders that reached a terminal status, not yet collected by the engine
    terminal: Vec<(usize, StrategyOrder)>,
}

impl GridPlan {
    pub fn new(params: GridParams) -> Result<Self, ConfigurationError> {
        if params.grid_count < 2 {
            return Err(ConfigurationError::GridTooSmall(params.grid_count));
        }
        if params.lower_bound >= params.upper_bound {
            return Err(ConfigurationError::InvertedBounds {
                lower: params.lower_bound,
                upper: params.upper_bound,
            });
        }

        let steps = (params.grid_count - 1) as u32;
        let spacing = (params.upper_bound - params.lower_bound).div_exact(steps);

        let mut plan = Self {
            symbol: params.symbol,
            lower_bound: params.lower_bound,
            upper_bound: params.upper_bound,
            spacing,
            grid_count: params.grid_count,
            quantity_per_grid: params.quantity_per_grid,
            reference_price: params.reference_price,
            price_precision: params.price_precision,
            levels: Vec::with_capacity(params.grid_count),
            stats: GridStats::default(),
            terminal: Vec::new(),
        };

        plan.levels = (0..plan.grid_count)
            .map(|rung| {
                let price = plan.rung_price(rung);
                let side = if price < plan.reference_price {
                    Side::Buy
                } else {
                    Side::Sell
                };
                GridLevel {
                    index: rung,
                    rung,
                    price,
                    side,
                    quantity: plan.quantity_per_grid,
                    state: LevelState::Pending,
                    order: None,
                }
            })
            .collect();

        if !plan.levels[0].price.is_positive() {
            return Err(ConfigurationError::LowerBoundBelowTick {
                lower: plan.lower_bound,
                precision: plan.price_precision,
            });
        }
        // Rounding to the tick must not merge adjacent rungs
        if plan.levels.windows(2).any(|w| w[0].price >= w[1].price) {
            return Err(ConfigurationError::SpacingBelowTick {
                lower: plan.lower_bound,
                upper: plan.upper_bound,
                grid_count: plan.grid_count,
                precision: plan.price_precision,
            });
        }

        Ok(plan)
    }

    /// Exchange price of ladder rung `k`
    pub fn rung_price(&self, rung: usize) -> Money {
        (self.lower_bound + self.spacing.times(rung)).round_dp(self.price_precision)
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn lower_bound(&self) -> Money {
        self.lower_bound
    }

    pub fn upper_bound(&self) -> Money {
        self.upper_bound
    }

    /// Exact distance between adjacent rungs, before tick rounding
    pub fn spacing(&self) -> Money {
        self.spacing
    }

    pub fn grid_count(&self) -> usize {
        self.grid_count
    }

    pub fn reference_price(&self) -> Money {
        self.reference_price
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> Option<&GridLevel> {
        self.levels.get(index)
    }

    pub fn stats(&self) -> GridStats {
        self.stats
    }

    /// Levels to query this tick: (level index, order id), ascending
    pub fn resting_orders(&self) -> Vec<(usize, OrderId)> {
        self.levels
            .iter()
            .filter(|l| l.is_resting())
            .filter_map(|l| l.order_id().map(|id| (l.index, id)))
            .collect()
    }

    /// Orders still live on the exchange
    pub fn live_orders(&self) -> Vec<StrategyOrder> {
        self.levels
            .iter()
            .filter(|l| l.is_resting())
            .filter_map(|l| l.order.clone())
            .collect()
    }

    /// Terminal orders recorded since the last call
    pub fn take_terminal_orders(&mut self) -> Vec<(usize, StrategyOrder)> {
        std::mem::take(&mut self.terminal)
    }

    /// Fold one tick's observations into the levels and return the
    /// submissions owed, in ascending level order.
    ///
    /// PENDING levels owe their initial placement, FILLED levels owe their
    /// mirror. Observations naming an order the level no longer owns are
    /// dropped.
    pub fn observe(&mut self, observations: &[Observation]) -> Vec<GridAction> {
        let by_level: BTreeMap<usize, &Observation> =
            observations.iter().map(|o| (o.level(), o)).collect();

        let mut actions = Vec::new();
        for index in 0..self.levels.len() {
            if let Some(observation) = by_level.get(&index) {
                self.apply_observation(observation);
            }

            let action = match self.levels[index].state {
                LevelState::Pending => {
                    let level = &self.levels[index];
                    Some(GridAction {
                        level: index,
                        rung: level.rung,
                        side: level.side,
                        price: level.price,
                        quantity: level.quantity,
                    })
                }
                LevelState::Filled => self.mirror_action(index),
                _ => None,
            };
            actions.extend(action);
        }
        actions
    }

    fn apply_observation(&mut self, observation: &Observation) {
        let index = observation.level();
        let Some(level) = self.levels.get(index) else {
            return;
        };
        if level.state != LevelState::Resting || level.order_id() != Some(observation.order_id()) {
            debug!(
                level = index,
                order_id = observation.order_id(),
                "Ignoring stale observation"
            );
            return;
        }

        match observation {
            Observation::Status { status, .. } => match status {
                OrderStatus::New => {}
                OrderStatus::Filled => self.mark_filled(index),
                OrderStatus::Canceled | OrderStatus::Rejected => {
                    warn!(
                        symbol = %self.symbol,
                        level = index,
                        order_id = observation.order_id(),
                        status = %status,
                        "Grid order ended without a fill, level goes idle"
                    );
                    self.retire(index, Some(*status));
                }
            },
            Observation::QueryFailed { error, .. } => match error {
                GatewayError::NotFound(_) => {
                    warn!(
                        symbol = %self.symbol,
                        level = index,
                        order_id = observation.order_id(),
                        error = %error,
                        "Grid order unknown to the exchange, level goes idle"
                    );
                    self.retire(index, None);
                }
                GatewayError::Transient(_) => {
                    warn!(
                        level = index,
                        order_id = observation.order_id(),
                        error = %error,
                        "Status query failed, will retry next tick"
                    );
                }
                GatewayError::Rejected(_) => {
                    warn!(
                        level = index,
                        order_id = observation.order_id(),
                        error = %error,
                        "Status query refused, level stays resting"
                    );
                }
            },
        }
    }

    fn mark_filled(&mut self, index: usize) {
        let level = &mut self.levels[index];
        if let Some(order) = level.order.as_mut() {
            order.status = OrderStatus::Filled;
            if order.avg_fill_price.is_none() {
                order.avg_fill_price = order.price;
            }
        }
        match level.side {
            Side::Buy => self.stats.fills_buy += 1,
            Side::Sell => self.stats.fills_sell += 1,
        }
        info!(
            symbol = %self.symbol,
            level = index,
            side = %level.side,
            price = %level.price,
            quantity = %level.quantity,
            order_id = ?level.order_id(),
            "Grid order filled"
        );
        self.transition(index, LevelState::Filled);

        if let Some(order) = self.levels[index].order.clone() {
            self.terminal.push((index, order));
        }
    }

    /// Mirror of a FILLED level: BUY on rung k becomes SELL on k+1, SELL on
    /// k becomes BUY on k-1. Off the ladder the level goes idle.
    fn mirror_action(&mut self, index: usize) -> Option<GridAction> {
        let level = &self.levels[index];
        let rung = match level.side {
            Side::Buy => Some(level.rung + 1).filter(|r| *r < self.grid_count),
            Side::Sell => level.rung.checked_sub(1),
        };

        let Some(rung) = rung else {
            warn!(
                symbol = %self.symbol,
                level = index,
                side = %level.side,
                price = %level.price,
                "Mirror order would leave the grid range, level goes idle"
            );
            self.retire(index, None);
            return None;
        };

        Some(GridAction {
            level: index,
            rung,
            side: level.side.opposite(),
            price: self.rung_price(rung),
            quantity: level.quantity,
        })
    }

    /// Apply the outcome of submitting `action`. Failures leave the level as
    /// it was so the same action is produced again next tick.
    pub fn record_submission(
        &mut self,
        action: &GridAction,
        result: Result<OrderAck, GatewayError>,
    ) {
        let Some(level) = self.levels.get(action.level) else {
            return;
        };
        let previous = level.state;
        if !matches!(previous, LevelState::Pending | LevelState::Filled) {
            debug!(level = action.level, state = %previous, "Dropping submission result for settled level");
            return;
        }

        // A refused acknowledgement is a failed submission like any other
        let result = result.and_then(|ack| match ack.status {
            OrderStatus::Rejected | OrderStatus::Canceled => Err(GatewayError::Rejected(format!(
                "order {} acknowledged as {}",
                ack.order_id, ack.status
            ))),
            _ => Ok(ack),
        });
        let ack = match result {
            Ok(ack) => ack,
            Err(error) => {
                warn!(
                    symbol = %self.symbol,
                    level = action.level,
                    side = %action.side,
                    price = %action.price,
                    kind = error.kind(),
                    error = %error,
                    state = %previous,
                    "Grid order submission failed, will retry next tick"
                );
                return;
            }
        };

        let ticket = action.ticket(&self.symbol);
        let order = ack.into_order(&ticket);
        let (order_id, status) = (order.order_id, order.status);
        match action.side {
            Side::Buy => self.stats.placed_buy += 1,
            Side::Sell => self.stats.placed_sell += 1,
        }

        let level = &mut self.levels[action.level];
        let replaced_id = level.order_id();
        level.rung = action.rung;
        level.side = action.side;
        level.price = action.price;
        level.order = Some(order);

        info!(
            symbol = %self.symbol,
            level = action.level,
            side = %action.side,
            price = %action.price,
            quantity = %action.quantity,
            order_id,
            status = %status,
            "Grid order placed"
        );

        if previous == LevelState::Filled {
            self.stats.replacements += 1;
            info!(
                symbol = %self.symbol,
                level = action.level,
                side = %action.side,
                price = %action.price,
                quantity = %action.quantity,
                filled_order_id = ?replaced_id,
                order_id,
                "Grid order replaced"
            );
            self.transition(action.level, LevelState::Replaced);
        }

        self.transition(action.level, LevelState::Resting);
        if status == OrderStatus::Filled {
            // Marketable limit executed on arrival
            self.mark_filled(action.level);
        }
    }

    /// Mark a level's order cancelled by the engine and idle the level
    pub fn record_cancel(&mut self, index: usize) {
        if self.levels.get(index).is_some_and(|l| l.is_resting()) {
            self.retire(index, Some(OrderStatus::Canceled));
        }
    }

    fn retire(&mut self, index: usize, status: Option<OrderStatus>) {
        let level = &mut self.levels[index];
        let order = match status {
            Some(status) => level.order.as_mut().map(|o| {
                o.status = status;
                o.clone()
            }),
            None => None,
        };
        if let Some(order) = order {
            self.terminal.push((index, order));
        }
        self.transition(index, LevelState::Idle);
    }

    fn transition(&mut self, index: usize, to: LevelState) {
        let level = &mut self.levels[index];
        let from = level.state;
        level.state = to;
        debug!(
            level = index,
            from = %from,
            to = %to,
            side = %level.side,
            price = %level.price,
            "Grid level transition"
        );
    }
}
