//! TWAP command

use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use execution_strategies::strategies::twap::{TwapOutcome, TwapParams, TwapPlan, TwapScheduler};
use execution_strategies::validation::{
    validate_at_least, validate_quantity, validate_side, validate_symbol,
};
use execution_strategies::Config;

use super::{build_runtime, cancel_on_ctrl_c, mainnet_countdown, open_journal, Session, Venue};

pub fn run(
    session: Session,
    symbol: String,
    side: String,
    quantity: String,
    chunks: u64,
    interval_secs: u64,
) -> Result<()> {
    let symbol = validate_symbol(&symbol)?;
    let side = validate_side(&side)?;
    let total_quantity = validate_quantity(&quantity)?;
    let chunk_count = u32::try_from(validate_at_least("chunks", chunks, 1)?)?;

    let config = session.load_config()?;
    let plan = TwapPlan::new(TwapParams {
        symbol,
        side,
        total_quantity,
        chunk_count,
        interval: Duration::from_secs(interval_secs),
        quantity_precision: config.twap.quantity_precision,
    })?;

    let runtime = build_runtime()?;
    runtime.block_on(run_async(session, config, plan))
}

async fn run_async(session: Session, config: Config, plan: TwapPlan) -> Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let venue = Venue::connect(&session, &config)?;
    if let Some(price) = venue.market_price(plan.symbol()).await? {
        info!("{} market price: {}", plan.symbol(), price);
        venue.seed_mark_price(price);
    }
    if !mainnet_countdown(&config, &cancel).await {
        info!("Aborted before the first chunk");
        return Ok(());
    }

    let mut scheduler = TwapScheduler::new(venue.gateway()).with_journal(open_journal(&config)?);
    let report = scheduler.execute(plan, &cancel).await;

    for (i, chunk) in report.chunks().iter().enumerate() {
        info!(
            "  Chunk {}: order {} {} {} @ {}",
            i + 1,
            chunk.order_id,
            chunk.status,
            chunk.quantity,
            chunk
                .avg_fill_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        );
    }

    match report.outcome {
        TwapOutcome::Completed => Ok(()),
        TwapOutcome::Partial => anyhow::bail!(
            "TWAP stopped after {}/{} chunks: {:?}",
            report.chunks().len(),
            report.plan.chunk_count(),
            report.abort
        ),
    }
}
