//! Order gateways
//!
//! The strategies talk to an exchange only through [`OrderGateway`]: submit,
//! query and cancel. Implementations:
//!
//! - [`BinanceFuturesGateway`]: signed REST client for Binance USD-M futures
//! - [`PaperGateway`]: in-memory exchange for paper runs and tests
//!
//! Gateways are passed into each engine at construction, so the same engine
//! code runs against the testnet, production, or a scripted fake.

pub mod auth;
pub mod binance;
pub mod paper;
pub mod throttle;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::{Money, OrderId, OrderStatus, OrderType, Side, StrategyOrder, Symbol};

pub use binance::BinanceFuturesGateway;
pub use paper::PaperGateway;

/// An order to be submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTicket {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Money,
    /// Required for limit and stop-limit orders, ignored for market orders
    pub price: Option<Money>,
    /// Trigger price of a stop-limit order
    #[serde(default)]
    pub stop_price: Option<Money>,
}

impl OrderTicket {
    pub fn market(symbol: Symbol, side: Side, quantity: Money) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
        }
    }

    pub fn limit(symbol: Symbol, side: Side, quantity: Money, price: Money) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
        }
    }

    /// Limit order at `price` that only goes live once `stop_price` trades
    pub fn stop_limit(
        symbol: Symbol,
        side: Side,
        quantity: Money,
        price: Money,
        stop_price: Money,
    ) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::StopLimit,
            quantity,
            price: Some(price),
            stop_price: Some(stop_price),
        }
    }
}

/// A live order as listed by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    /// Exchange order type, e.g. `LIMIT` or `STOP`
    pub order_type: String,
    pub quantity: Money,
    pub executed_quantity: Money,
    pub price: Option<Money>,
    pub stop_price: Option<Money>,
    pub status: OrderStatus,
}

/// Exchange acknowledgement of a submitted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub status: OrderStatus,
    /// Average execution price, when the order executed immediately
    pub avg_price: Option<Money>,
}

impl OrderAck {
    /// The strategy-side record of the acknowledged ticket
    pub fn into_order(self, ticket: &OrderTicket) -> StrategyOrder {
        StrategyOrder {
            symbol: ticket.symbol.clone(),
            side: ticket.side,
            order_type: ticket.order_type,
            quantity: ticket.quantity,
            price: ticket.price,
            order_id: self.order_id,
            status: self.status,
            avg_fill_price: self.avg_price,
            submitted_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit_order(&self, ticket: &OrderTicket) -> Result<OrderAck, GatewayError>;

    async fn query_order(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
    ) -> Result<OrderStatus, GatewayError>;

    async fn cancel_order(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
    ) -> Result<OrderStatus, GatewayError>;

    /// Gateway name for logs
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<G: OrderGateway + ?Sized> OrderGateway for Arc<G> {
    async fn submit_order(&self, ticket: &OrderTicket) -> Result<OrderAck, GatewayError> {
        (**self).submit_order(ticket).await
    }

    async fn query_order(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
    ) -> Result<OrderStatus, GatewayError> {
        (**self).query_order(symbol, order_id).await
    }

    async fn cancel_order(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
    ) -> Result<OrderStatus, GatewayError> {
        (**self).cancel_order(symbol, order_id).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
