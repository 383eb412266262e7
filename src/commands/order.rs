//! Single-order commands: market, limit, stop-limit, status, cancel, and the
//! open order listing

use anyhow::Result;
use tracing::{info, warn};

use execution_strategies::gateway::OrderTicket;
use execution_strategies::validation::{
    limit_far_from_stop, validate_positive, validate_price, validate_quantity, validate_side,
    validate_symbol,
};
use execution_strategies::{Config, OrderId, Side, Symbol};

use super::{build_runtime, Session, Venue};

pub fn market(session: Session, symbol: String, side: String, quantity: String) -> Result<()> {
    let ticket = OrderTicket::market(
        validate_symbol(&symbol)?,
        validate_side(&side)?,
        validate_quantity(&quantity)?,
    );
    let config = session.load_config()?;
    build_runtime()?.block_on(submit(session, config, ticket))
}

pub fn limit(
    session: Session,
    symbol: String,
    side: String,
    quantity: String,
    price: String,
) -> Result<()> {
    let ticket = OrderTicket::limit(
        validate_symbol(&symbol)?,
        validate_side(&side)?,
        validate_quantity(&quantity)?,
        validate_price(&price)?,
    );
    let config = session.load_config()?;
    build_runtime()?.block_on(submit(session, config, ticket))
}

pub fn stop_limit(
    session: Session,
    symbol: String,
    side: String,
    quantity: String,
    price: String,
    stop_price: String,
) -> Result<()> {
    let ticket = OrderTicket::stop_limit(
        validate_symbol(&symbol)?,
        validate_side(&side)?,
        validate_quantity(&quantity)?,
        validate_price(&price)?,
        validate_positive("stop_price", &stop_price)?,
    );
    if let (Some(price), Some(stop)) = (ticket.price, ticket.stop_price) {
        if limit_far_from_stop(ticket.side, price, stop) {
            let direction = match ticket.side {
                Side::Buy => "higher",
                Side::Sell => "lower",
            };
            warn!(
                "{} stop-limit: limit price ({}) is significantly {} than stop price ({}); \
                 this may result in unexpected execution",
                ticket.side, price, direction, stop
            );
        }
    }
    let config = session.load_config()?;
    build_runtime()?.block_on(submit(session, config, ticket))
}

pub fn open_orders(session: Session, symbol: Option<String>) -> Result<()> {
    let symbol = symbol.as_deref().map(validate_symbol).transpose()?;
    let config = session.load_config()?;
    build_runtime()?.block_on(list_open_orders(session, config, symbol))
}

pub fn status(session: Session, symbol: String, order_id: OrderId) -> Result<()> {
    let symbol = validate_symbol(&symbol)?;
    let config = session.load_config()?;
    build_runtime()?.block_on(query(session, config, symbol, order_id))
}

pub fn cancel(session: Session, symbol: String, order_id: OrderId) -> Result<()> {
    let symbol = validate_symbol(&symbol)?;
    let config = session.load_config()?;
    build_runtime()?.block_on(cancel_async(session, config, symbol, order_id))
}

async fn submit(session: Session, config: Config, ticket: OrderTicket) -> Result<()> {
    let venue = Venue::connect(&session, &config)?;
    if let Some(price) = venue.market_price(&ticket.symbol).await? {
        venue.seed_mark_price(price);
    }

    info!(
        "Placing {} {} {} {}{}",
        ticket.order_type,
        ticket.side,
        ticket.quantity,
        ticket.symbol,
        ticket
            .price
            .map(|p| format!(" @ {}", p))
            .unwrap_or_default()
    );
    if let Some(stop) = ticket.stop_price {
        info!("Triggers when the market reaches {}", stop);
    }
    let ack = venue.gateway().submit_order(&ticket).await?;
    info!(
        order_id = ack.order_id,
        status = %ack.status,
        avg_price = ?ack.avg_price.map(|p| p.to_string()),
        "Order accepted"
    );
    Ok(())
}

async fn list_open_orders(session: Session, config: Config, symbol: Option<Symbol>) -> Result<()> {
    let venue = Venue::connect(&session, &config)?;
    let orders = venue.open_orders(symbol.as_ref()).await?;
    if orders.is_empty() {
        info!("No open orders found");
        return Ok(());
    }

    info!("Found {} open order(s)", orders.len());
    for order in &orders {
        info!(
            "  [{}] {} {} {} {} (filled {}) status {}{}{}",
            order.order_id,
            order.symbol,
            order.order_type,
            order.side,
            order.quantity,
            order.executed_quantity,
            order.status,
            order.price.map(|p| format!(" price {}", p)).unwrap_or_default(),
            order
                .stop_price
                .map(|p| format!(" stop {}", p))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn query(session: Session, config: Config, symbol: Symbol, order_id: OrderId) -> Result<()> {
    let venue = Venue::connect(&session, &config)?;
    let status = venue.gateway().query_order(&symbol, order_id).await?;
    info!("{} order {}: {}", symbol, order_id, status);
    Ok(())
}

async fn cancel_async(
    session: Session,
    config: Config,
    symbol: Symbol,
    order_id: OrderId,
) -> Result<()> {
    let venue = Venue::connect(&session, &config)?;
    let status = venue.gateway().cancel_order(&symbol, order_id).await?;
    info!("{} order {} cancelled: {}", symbol, order_id, status);
    Ok(())
}
