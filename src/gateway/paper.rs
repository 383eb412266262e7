//! In-memory paper exchange
//!
//! Market orders fill immediately at the mark price. Limit orders rest as
//! `NEW` until [`PaperGateway::set_mark_price`] crosses them (BUY fills when
//! mark <= price, SELL when mark >= price) or [`PaperGateway::fill`] executes
//! them directly. A stop-limit order is dormant until the mark reaches its
//! stop (BUY at or above, SELL at or below) and then behaves as a limit.
//! Failures can be scripted per call, which is how the retry and replacement
//! paths are exercised without a network.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{OpenOrder, OrderAck, OrderGateway, OrderTicket};
use crate::error::GatewayError;
use crate::{Money, OrderId, OrderStatus, OrderType, Side, Symbol};

/// An order held by the paper exchange
#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub order_id: OrderId,
    pub ticket: OrderTicket,
    pub status: OrderStatus,
    /// False while a stop-limit waits for its stop price
    pub triggered: bool,
}

impl PaperOrder {
    fn listing(&self) -> OpenOrder {
        OpenOrder {
            order_id: self.order_id,
            symbol: self.ticket.symbol.clone(),
            side: self.ticket.side,
            order_type: self.ticket.order_type.as_str().to_string(),
            quantity: self.ticket.quantity,
            executed_quantity: Money::ZERO,
            price: self.ticket.price,
            stop_price: self.ticket.stop_price,
            status: self.status,
        }
    }
}

#[derive(Debug, Default)]
struct PaperBook {
    next_order_id: OrderId,
    mark_price: Option<Money>,
    orders: BTreeMap<OrderId, PaperOrder>,
    submissions: Vec<OrderTicket>,
    submit_failures: VecDeque<GatewayError>,
    query_failures: VecDeque<GatewayError>,
    queries: usize,
    cancels: usize,
}

#[derive(Debug, Default)]
pub struct PaperGateway {
    book: Mutex<PaperBook>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mark_price(price: Money) -> Self {
        let gateway = Self::new();
        gateway.book().mark_price = Some(price);
        gateway
    }

    fn book(&self) -> MutexGuard<'_, PaperBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_price(&self) -> Option<Money> {
        self.book().mark_price
    }

    /// Move the market; stops the new price reaches are triggered and
    /// resting limits it crosses are filled. Returns the ids filled, ascending.
    pub fn set_mark_price(&self, price: Money) -> Vec<OrderId> {
        let mut book = self.book();
        book.mark_price = Some(price);

        let mut filled = Vec::new();
        for order in book.orders.values_mut() {
            if order.status != OrderStatus::New || order.ticket.order_type == OrderType::Market {
                continue;
            }
            if !order.triggered {
                let Some(stop) = order.ticket.stop_price else {
                    continue;
                };
                order.triggered = match order.ticket.side {
                    Side::Buy => price >= stop,
                    Side::Sell => price <= stop,
                };
                if !order.triggered {
                    continue;
                }
            }
            let Some(limit) = order.ticket.price else {
                continue;
            };
            let crossed = match order.ticket.side {
                Side::Buy => price <= limit,
                Side::Sell => price >= limit,
            };
            if crossed {
                order.status = OrderStatus::Filled;
                filled.push(order.order_id);
            }
        }
        filled
    }

    /// Execute a resting order; false if it is unknown or no longer live
    pub fn fill(&self, order_id: OrderId) -> bool {
        self.transition(order_id, OrderStatus::Filled)
    }

    /// Cancel a resting order behind the engine's back, as an operator would
    pub fn cancel_externally(&self, order_id: OrderId) -> bool {
        self.transition(order_id, OrderStatus::Canceled)
    }

    /// Drop an order entirely so queries answer NotFound
    pub fn forget(&self, order_id: OrderId) -> bool {
        self.book().orders.remove(&order_id).is_some()
    }

    fn transition(&self, order_id: OrderId, status: OrderStatus) -> bool {
        let mut book = self.book();
        match book.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::New => {
                order.status = status;
                true
            }
            _ => false,
        }
    }

    /// The next submission fails with `error` instead of reaching the book
    pub fn fail_next_submit(&self, error: GatewayError) {
        self.book().submit_failures.push_back(error);
    }

    /// The next status query fails with `error`
    pub fn fail_next_query(&self, error: GatewayError) {
        self.book().query_failures.push_back(error);
    }

    /// Every ticket that reached the book, in arrival order
    pub fn submissions(&self) -> Vec<OrderTicket> {
        self.book().submissions.clone()
    }

    pub fn order(&self, order_id: OrderId) -> Option<PaperOrder> {
        self.book().orders.get(&order_id).cloned()
    }

    /// Live orders, ascending by id
    pub fn open_orders(&self) -> Vec<PaperOrder> {
        self.book()
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::New)
            .cloned()
            .collect()
    }

    /// Live orders as the exchange would list them, optionally for one symbol
    pub fn listed_orders(&self, symbol: Option<&Symbol>) -> Vec<OpenOrder> {
        self.book()
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::New)
            .filter(|order| symbol.map_or(true, |s| &order.ticket.symbol == s))
            .map(PaperOrder::listing)
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.book().queries
    }

    pub fn cancel_count(&self) -> usize {
        self.book().cancels
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit_order(&self, ticket: &OrderTicket) -> Result<OrderAck, GatewayError> {
        let mut book = self.book();
        if let Some(error) = book.submit_failures.pop_front() {
            return Err(error);
        }
        if ticket.order_type != OrderType::Market && ticket.price.is_none() {
            return Err(GatewayError::Rejected(format!(
                "{} order for {} without a price",
                ticket.order_type, ticket.symbol
            )));
        }
        if ticket.order_type == OrderType::StopLimit && ticket.stop_price.is_none() {
            return Err(GatewayError::Rejected(format!(
                "stop-limit order for {} without a stop price",
                ticket.symbol
            )));
        }

        book.next_order_id += 1;
        let order_id = book.next_order_id;
        let (status, avg_price) = match ticket.order_type {
            OrderType::Market => (OrderStatus::Filled, book.mark_price),
            OrderType::Limit | OrderType::StopLimit => (OrderStatus::New, None),
        };

        book.submissions.push(ticket.clone());
        book.orders.insert(
            order_id,
            PaperOrder {
                order_id,
                ticket: ticket.clone(),
                status,
                triggered: ticket.order_type != OrderType::StopLimit,
            },
        );

        Ok(OrderAck {
            order_id,
            status,
            avg_price,
        })
    }

    async fn query_order(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
    ) -> Result<OrderStatus, GatewayError> {
        let mut book = self.book();
        book.queries += 1;
        if let Some(error) = book.query_failures.pop_front() {
            return Err(error);
        }
        match book.orders.get(&order_id) {
            Some(order) if &order.ticket.symbol == symbol => Ok(order.status),
            _ => Err(GatewayError::NotFound(format!("{} order {}", symbol, order_id))),
        }
    }

    async fn cancel_order(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
    ) -> Result<OrderStatus, GatewayError> {
        let mut book = self.book();
        book.cancels += 1;
        match book.orders.get_mut(&order_id) {
            Some(order) if &order.ticket.symbol == symbol => {
                if order.status == OrderStatus::New {
                    order.status = OrderStatus::Canceled;
                    Ok(OrderStatus::Canceled)
                } else {
                    Err(GatewayError::Rejected(format!(
                        "order {} is already {}",
                        order_id, order.status
                    )))
                }
            }
            _ => Err(GatewayError::NotFound(format!("{} order {}", symbol, order_id))),
        }
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}
