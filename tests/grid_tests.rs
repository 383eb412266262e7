//! Grid engine against the paper exchange

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use execution_strategies::gateway::PaperGateway;
use execution_strategies::journal::JournalEvent;
use execution_strategies::strategies::grid::{GridEngine, GridParams, LevelState};
use execution_strategies::{ConfigurationError, GatewayError, Money, OrderStatus, Side, Symbol};

// =============================================================================
// Test Utilities
// =============================================================================

const MONITOR_INTERVAL: Duration = Duration::from_secs(60);

fn params(grid_count: usize) -> GridParams {
    GridParams {
        symbol: Symbol::new("BTCUSDT"),
        lower_bound: Money::from_i64(24000),
        upper_bound: Money::from_i64(26000),
        grid_count,
        quantity_per_grid: Money::new(dec!(0.001)),
        reference_price: Money::from_i64(25000),
        price_precision: 2,
    }
}

fn paper() -> Arc<PaperGateway> {
    Arc::new(PaperGateway::with_mark_price(Money::from_i64(25000)))
}

async fn placed_engine(gateway: &Arc<PaperGateway>) -> GridEngine<Arc<PaperGateway>> {
    let mut engine = GridEngine::new(gateway.clone(), params(4), MONITOR_INTERVAL).unwrap();
    engine.place_pending().await;
    engine
}

fn states(engine: &GridEngine<Arc<PaperGateway>>) -> Vec<LevelState> {
    engine.plan().levels().iter().map(|l| l.state).collect()
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_single_level_grid_is_rejected() {
    let gateway = paper();
    let result = GridEngine::new(gateway.clone(), params(1), MONITOR_INTERVAL);
    assert!(matches!(result, Err(ConfigurationError::GridTooSmall(1))));
    assert!(gateway.submissions().is_empty());
}

#[test]
fn test_inverted_bounds_are_rejected() {
    let mut inverted = params(4);
    inverted.lower_bound = Money::from_i64(27000);
    let result = GridEngine::new(paper(), inverted, MONITOR_INTERVAL);
    assert!(matches!(result, Err(ConfigurationError::InvertedBounds { .. })));
}

// =============================================================================
// Monitoring Loop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_run_replaces_fill_and_leaves_orders_open() {
    let gateway = paper();
    let mut engine = GridEngine::new(gateway.clone(), params(4), MONITOR_INTERVAL).unwrap();
    let cancel = CancellationToken::new();

    let market = async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        // Crosses the BUY at 24666.67 only
        let filled = gateway.set_mark_price(Money::new(dec!(24600)));
        assert_eq!(filled, vec![2]);
        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();
    };

    let (report, ()) = tokio::join!(engine.run(&cancel), market);

    assert_eq!(report.ticks, 1);
    assert_eq!(report.stats.fills_buy, 1);
    assert_eq!(report.stats.fills_sell, 0);
    assert_eq!(report.stats.replacements, 1);
    assert_eq!(report.stats.placed_buy, 2);
    assert_eq!(report.stats.placed_sell, 3);

    let submissions = gateway.submissions();
    assert_eq!(submissions.len(), 5);
    assert_eq!(submissions[4].side, Side::Sell);
    assert_eq!(submissions[4].price, Some(Money::new(dec!(25333.33))));
    assert_eq!(submissions[4].quantity, Money::new(dec!(0.001)));

    // Shutdown never cancels on its own
    assert_eq!(gateway.cancel_count(), 0);
    assert_eq!(gateway.open_orders().len(), 4);
    assert_eq!(report.resting_orders.len(), 4);

    let journal = engine.journal().entries();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].event, JournalEvent::GridTerminal);
    assert_eq!(journal[0].order.order_id, 2);
    assert_eq!(journal[0].order.status, OrderStatus::Filled);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_first_tick() {
    let gateway = paper();
    let mut engine = GridEngine::new(gateway.clone(), params(4), MONITOR_INTERVAL).unwrap();
    let cancel = CancellationToken::new();

    let stopper = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    };
    let (report, ()) = tokio::join!(engine.run(&cancel), stopper);

    assert_eq!(report.ticks, 0);
    assert_eq!(gateway.query_count(), 0);
    assert_eq!(report.resting_orders.len(), 4);
}

#[tokio::test]
async fn test_sell_fill_mirrors_down() {
    let gateway = paper();
    let mut engine = placed_engine(&gateway).await;

    assert!(gateway.fill(4));
    engine.tick().await;

    let last = gateway.submissions().pop().unwrap();
    assert_eq!(last.side, Side::Buy);
    assert_eq!(last.price, Some(Money::new(dec!(25333.33))));
    assert_eq!(engine.plan().levels()[3].side, Side::Buy);
    assert_eq!(engine.plan().levels()[3].rung, 2);
}

#[tokio::test]
async fn test_fill_is_replaced_exactly_once() {
    let gateway = paper();
    let mut engine = placed_engine(&gateway).await;

    assert!(gateway.fill(1));
    for _ in 0..5 {
        engine.tick().await;
    }

    assert_eq!(gateway.submissions().len(), 5);
    assert_eq!(engine.plan().stats().replacements, 1);
    assert_eq!(engine.ticks(), 5);
}

#[tokio::test]
async fn test_fills_in_one_tick_are_mirrored_in_level_order() {
    let gateway = paper();
    let mut engine = placed_engine(&gateway).await;
    let before: Vec<Option<u64>> = engine.plan().levels().iter().map(|l| l.order_id()).collect();

    // Top SELL, bottom BUY, then the SELL below the top
    assert!(gateway.fill(4));
    assert!(gateway.fill(1));
    assert!(gateway.fill(3));
    engine.tick().await;

    let mirrors: Vec<(Side, Option<Money>)> = gateway.submissions()[4..]
        .iter()
        .map(|t| (t.side, t.price))
        .collect();
    assert_eq!(
        mirrors,
        vec![
            (Side::Sell, Some(Money::new(dec!(24666.67)))),
            (Side::Buy, Some(Money::new(dec!(24666.67)))),
            (Side::Buy, Some(Money::new(dec!(25333.33)))),
        ]
    );
    assert_eq!(engine.plan().stats().fills_buy, 1);
    assert_eq!(engine.plan().stats().fills_sell, 2);

    engine.tick().await;
    assert_eq!(gateway.submissions().len(), 7);
    assert_eq!(engine.plan().stats().replacements, 3);

    let after: Vec<Option<u64>> = engine.plan().levels().iter().map(|l| l.order_id()).collect();
    assert_eq!(before, vec![Some(1), Some(2), Some(3), Some(4)]);
    assert_eq!(after, vec![Some(5), Some(2), Some(6), Some(7)]);
    assert!(states(&engine).iter().all(|s| *s == LevelState::Resting));
}

#[tokio::test]
async fn test_every_resting_level_is_queried_each_tick() {
    let gateway = paper();
    let mut engine = placed_engine(&gateway).await;

    engine.tick().await;
    assert_eq!(gateway.query_count(), 4);
    engine.tick().await;
    assert_eq!(gateway.query_count(), 8);
}

// =============================================================================
// Failure Handling
// =============================================================================

#[tokio::test]
async fn test_failed_replacement_retried_next_tick() {
    let gateway = paper();
    let mut engine = placed_engine(&gateway).await;

    assert!(gateway.fill(2));
    gateway.fail_next_submit(GatewayError::Transient("timeout".into()));
    engine.tick().await;

    assert_eq!(states(&engine)[1], LevelState::Filled);
    assert_eq!(gateway.submissions().len(), 4);

    engine.tick().await;
    assert_eq!(states(&engine)[1], LevelState::Resting);
    assert_eq!(gateway.submissions().len(), 5);
    assert_eq!(engine.plan().stats().replacements, 1);
    // A FILLED level has nothing to query
    assert_eq!(gateway.query_count(), 4 + 3);
}

#[tokio::test]
async fn test_failed_initial_placement_retried_next_tick() {
    let gateway = paper();
    gateway.fail_next_submit(GatewayError::Transient("timeout".into()));
    let mut engine = placed_engine(&gateway).await;

    assert_eq!(
        states(&engine),
        vec![
            LevelState::Pending,
            LevelState::Resting,
            LevelState::Resting,
            LevelState::Resting
        ]
    );

    engine.tick().await;
    assert!(states(&engine).iter().all(|s| *s == LevelState::Resting));
    assert_eq!(gateway.submissions()[3].price, Some(Money::from_i64(24000)));
}

#[tokio::test]
async fn test_transient_query_failure_keeps_level_resting() {
    let gateway = paper();
    let mut engine = placed_engine(&gateway).await;

    gateway.fail_next_query(GatewayError::Transient("timeout".into()));
    engine.tick().await;

    assert!(states(&engine).iter().all(|s| *s == LevelState::Resting));
    assert_eq!(gateway.submissions().len(), 4);
}

#[tokio::test]
async fn test_externally_cancelled_order_goes_idle() {
    let gateway = paper();
    let mut engine = placed_engine(&gateway).await;

    assert!(gateway.cancel_externally(3));
    assert!(gateway.forget(4));
    engine.tick().await;

    assert_eq!(
        states(&engine),
        vec![
            LevelState::Resting,
            LevelState::Resting,
            LevelState::Idle,
            LevelState::Idle
        ]
    );
    assert_eq!(gateway.submissions().len(), 4);

    engine.tick().await;
    assert_eq!(gateway.query_count(), 4 + 2);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_cancel_on_exit_is_explicit() {
    let gateway = paper();
    let mut engine = placed_engine(&gateway).await;

    assert!(gateway.fill(1));
    engine.tick().await;
    assert_eq!(gateway.open_orders().len(), 4);

    let results = engine.cancel_resting_orders().await;
    assert_eq!(results.len(), 4);
    assert!(results
        .iter()
        .all(|(_, r)| r.as_ref() == Ok(&OrderStatus::Canceled)));
    assert!(gateway.open_orders().is_empty());
    assert!(engine.report().resting_orders.is_empty());
    assert!(states(&engine).iter().all(|s| *s == LevelState::Idle));
}
