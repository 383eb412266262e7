//! Grid command

use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use execution_strategies::strategies::grid::{GridEngine, GridParams};
use execution_strategies::validation::{
    validate_at_least, validate_bounds, validate_price, validate_quantity, validate_symbol,
};
use execution_strategies::Config;

use super::{build_runtime, cancel_on_ctrl_c, mainnet_countdown, open_journal, Session, Venue};

/// Raw `grid` arguments as typed by the operator
#[derive(Debug, Clone)]
pub struct GridArgs {
    pub symbol: String,
    pub quantity: String,
    pub lower: String,
    pub upper: String,
    pub grids: u64,
    pub interval: Option<u64>,
    pub reference_price: Option<String>,
    pub cancel_on_exit: bool,
}

pub fn run(session: Session, args: GridArgs) -> Result<()> {
    let symbol = validate_symbol(&args.symbol)?;
    let quantity_per_grid = validate_quantity(&args.quantity)?;
    let lower_bound = validate_price(&args.lower)?;
    let upper_bound = validate_price(&args.upper)?;
    validate_bounds(lower_bound, upper_bound)?;
    let grid_count = validate_at_least("grids", args.grids, 2)? as usize;
    let reference_price = args
        .reference_price
        .as_deref()
        .map(validate_price)
        .transpose()?;

    let config = session.load_config()?;
    let monitor_interval =
        Duration::from_secs(args.interval.unwrap_or(config.grid.monitor_interval_secs));

    let params = GridParams {
        symbol,
        lower_bound,
        upper_bound,
        grid_count,
        quantity_per_grid,
        // Resolved once the venue is connected
        reference_price: reference_price.unwrap_or_default(),
        price_precision: config.grid.price_precision,
    };

    let runtime = build_runtime()?;
    runtime.block_on(run_async(
        session,
        config,
        params,
        reference_price.is_some(),
        monitor_interval,
        args.cancel_on_exit,
    ))
}

async fn run_async(
    session: Session,
    config: Config,
    mut params: GridParams,
    has_reference_price: bool,
    monitor_interval: Duration,
    cancel_on_exit: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let venue = Venue::connect(&session, &config)?;
    if !has_reference_price {
        params.reference_price = venue
            .market_price(&params.symbol)
            .await?
            .context("--reference-price is required in paper mode")?;
    }
    venue.seed_mark_price(params.reference_price);
    info!("Reference price: {}", params.reference_price);

    let mut engine = GridEngine::new(venue.gateway(), params, monitor_interval)?
        .with_journal(open_journal(&config)?);

    if !mainnet_countdown(&config, &cancel).await {
        info!("Aborted before placing the grid");
        return Ok(());
    }

    let report = engine.run(&cancel).await;

    if cancel_on_exit {
        info!("Cancelling {} resting orders", report.resting_orders.len());
        let failed = engine
            .cancel_resting_orders()
            .await
            .into_iter()
            .filter(|(_, result)| result.is_err())
            .count();
        if failed > 0 {
            warn!("{} grid orders could not be cancelled", failed);
        }
    }

    let report = engine.report();
    info!("Grid summary:");
    info!("  Ticks: {}", report.ticks);
    info!(
        "  Placed: {} buy / {} sell",
        report.stats.placed_buy, report.stats.placed_sell
    );
    info!(
        "  Fills: {} buy / {} sell",
        report.stats.fills_buy, report.stats.fills_sell
    );
    info!("  Replacements: {}", report.stats.replacements);
    info!("  Orders left resting: {}", report.resting_orders.len());

    // The exchange may hold orders this run does not know about
    match venue.open_orders(Some(engine.plan().symbol())).await {
        Ok(listed) if listed.len() != report.resting_orders.len() => warn!(
            "Exchange lists {} open {} orders, the grid tracked {}",
            listed.len(),
            engine.plan().symbol(),
            report.resting_orders.len()
        ),
        Ok(_) => {}
        Err(e) => warn!("Could not list open orders after the grid stopped: {:#}", e),
    }

    Ok(())
}
