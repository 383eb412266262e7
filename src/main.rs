//! Execution strategies - main entry point
//!
//! This binary provides eight subcommands:
//! - twap: Slice a large order into timed market chunks
//! - grid: Run a grid of resting limit orders until Ctrl+C
//! - market / limit / stop-limit: Place a single order
//! - status / cancel: Inspect or cancel an order by id
//! - open-orders: List live orders on the exchange

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "execution-strategies")]
#[command(about = "TWAP and grid order execution for Binance USD-M futures", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(short, long, global = true, default_value = "configs/default.json")]
    config: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Paper trading against an in-memory exchange (no network)
    #[arg(long, global = true)]
    paper: bool,

    /// Trade on Binance production instead of the testnet (CAUTION - REAL MONEY!)
    #[arg(long, global = true)]
    mainnet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a TWAP order
    Twap {
        #[arg(short, long)]
        symbol: String,

        /// BUY or SELL
        #[arg(long)]
        side: String,

        /// Total quantity to execute
        #[arg(short, long)]
        quantity: String,

        /// Number of chunks
        #[arg(long, default_value = "5")]
        chunks: u64,

        /// Seconds between chunks
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },

    /// Run a grid trading loop until Ctrl+C
    Grid {
        #[arg(short, long)]
        symbol: String,

        /// Quantity per grid level
        #[arg(short, long)]
        quantity: String,

        /// Lower price bound
        #[arg(long)]
        lower: String,

        /// Upper price bound
        #[arg(long)]
        upper: String,

        /// Number of grid levels, bounds included
        #[arg(short, long, default_value = "10")]
        grids: u64,

        /// Monitor interval in seconds (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Reference price splitting BUY and SELL levels (default: ticker price)
        #[arg(long)]
        reference_price: Option<String>,

        /// Cancel resting grid orders on exit
        #[arg(long)]
        cancel_on_exit: bool,
    },

    /// Place a single market order
    Market {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        side: String,

        #[arg(short, long)]
        quantity: String,
    },

    /// Place a single GTC limit order
    Limit {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        side: String,

        #[arg(short, long)]
        quantity: String,

        #[arg(short, long)]
        price: String,
    },

    /// Place a stop-limit order: a GTC limit that activates at the stop price
    StopLimit {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        side: String,

        #[arg(short, long)]
        quantity: String,

        /// Limit price once triggered
        #[arg(short, long)]
        price: String,

        /// Trigger price
        #[arg(long)]
        stop_price: String,
    },

    /// List open orders, for one symbol or all
    OpenOrders {
        #[arg(short, long)]
        symbol: Option<String>,
    },

    /// Query an order's status
    Status {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        order_id: u64,
    },

    /// Cancel an open order
    Cancel {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        order_id: u64,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // Log file naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy HTTP crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Twap { .. } => "twap",
        Commands::Grid { .. } => "grid",
        Commands::Market { .. } => "market",
        Commands::Limit { .. } => "limit",
        Commands::StopLimit { .. } => "stop_limit",
        Commands::OpenOrders { .. } => "open_orders",
        Commands::Status { .. } => "status",
        Commands::Cancel { .. } => "cancel",
    };

    setup_logging(cli.verbose, command_name)?;

    let session = commands::Session {
        config_path: cli.config,
        paper: cli.paper,
        mainnet: cli.mainnet,
    };

    match cli.command {
        Commands::Twap {
            symbol,
            side,
            quantity,
            chunks,
            interval,
        } => commands::twap::run(session, symbol, side, quantity, chunks, interval),

        Commands::Grid {
            symbol,
            quantity,
            lower,
            upper,
            grids,
            interval,
            reference_price,
            cancel_on_exit,
        } => commands::grid::run(
            session,
            commands::grid::GridArgs {
                symbol,
                quantity,
                lower,
                upper,
                grids,
                interval,
                reference_price,
                cancel_on_exit,
            },
        ),

        Commands::Market {
            symbol,
            side,
            quantity,
        } => commands::order::market(session, symbol, side, quantity),

        Commands::Limit {
            symbol,
            side,
            quantity,
            price,
        } => commands::order::limit(session, symbol, side, quantity, price),

        Commands::StopLimit {
            symbol,
            side,
            quantity,
            price,
            stop_price,
        } => commands::order::stop_limit(session, symbol, side, quantity, price, stop_price),

        Commands::OpenOrders { symbol } => commands::order::open_orders(session, symbol),

        Commands::Status { symbol, order_id } => commands::order::status(session, symbol, order_id),

        Commands::Cancel { symbol, order_id } => commands::order::cancel(session, symbol, order_id),
    }
}
