//! Crossbot CLI: live trading loop, history export, config check.
//!
//! Commands:
//! - `run`: optionally backfill history, subscribe to klines, trade on crossovers
//! - `history`: fetch closed klines and write the historical CSV
//! - `check-config`: load and validate a config file, print the result

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use crossbot_binance::{BinanceRest, Credentials, KlineStream};
use crossbot_core::audit::{historical_file_name, write_historical_csv};
use crossbot_core::config::parse_history_start;
use crossbot_core::domain::Interval;
use crossbot_core::exchange::Exchange;
use crossbot_core::signal::SignalModel;
use crossbot_core::{
    load_history, AuditLog, BarSeries, BotConfig, ExecutionMode, StopHandle, StreamCoordinator,
    TradeExecutor,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "crossbot",
    about = "Crossbot: moving-average crossover trading bot for one Binance spot pair"
)]
struct Cli {
    /// Log filter (e.g. "debug", "crossbot_core=trace"). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that may override the config file.
#[derive(clap::Args)]
struct Overrides {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trading pair (e.g., BTCUSDT).
    #[arg(long)]
    symbol: Option<String>,

    /// Kline interval code (1m, 5m, 1h, 1d, ...).
    #[arg(long)]
    interval: Option<Interval>,

    /// Directory for the trade log and historical CSV.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill, subscribe to the kline stream and trade on every closed bar.
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Place real orders. Without this flag (or `execution_enabled` in the
        /// config) orders only go to the test endpoint.
        #[arg(long, default_value_t = false)]
        live: bool,

        /// Stop after this many processed bars.
        #[arg(long)]
        max_bars: Option<u64>,

        /// Stop after this many seconds.
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Fetch closed klines and write them as a historical CSV.
    History {
        #[command(flatten)]
        overrides: Overrides,

        /// Start of the window (RFC 3339 or "<n> <unit>s ago"). Defaults to
        /// the config's history_start.
        #[arg(long)]
        start: Option<String>,

        /// Output file. Defaults to <output_dir>/<SYMBOL>_historical_trade_data_<ts>.csv.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Load and validate a config file.
    CheckConfig {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Commands::Run {
            overrides,
            live,
            max_bars,
            duration_secs,
        } => run_bot(overrides, live, max_bars, duration_secs),
        Commands::History {
            overrides,
            start,
            output,
        } => run_history(overrides, start, output),
        Commands::CheckConfig { config } => run_check_config(&config),
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(overrides: &Overrides) -> Result<BotConfig> {
    let mut config = match &overrides.config {
        Some(path) => BotConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BotConfig::default(),
    };
    if let Some(symbol) = &overrides.symbol {
        config.symbol = symbol.to_uppercase();
    }
    if let Some(interval) = overrides.interval {
        config.interval = interval;
    }
    if let Some(dir) = &overrides.output_dir {
        config.output_dir = dir.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run_bot(
    overrides: Overrides,
    live: bool,
    max_bars: Option<u64>,
    duration_secs: Option<u64>,
) -> Result<()> {
    let mut config = load_config(&overrides)?;
    if live {
        config.execution_enabled = true;
    }
    let mode = config.mode();

    let Some(credentials) = Credentials::from_env() else {
        bail!(
            "set {} and {} (account balances and orders are signed requests)",
            crossbot_binance::auth::API_KEY_VAR,
            crossbot_binance::auth::API_SECRET_VAR
        );
    };
    let rest = BinanceRest::new(&config.exchange, Some(credentials))
        .context("failed to create Binance client")?;

    let instrument = rest
        .instrument(&config.symbol)
        .with_context(|| format!("failed to load symbol info for {}", config.symbol))?;
    info!(
        symbol = %instrument.symbol,
        base = %instrument.base_asset,
        quote = %instrument.quote_asset,
        step_size = %instrument.step_size,
        min_qty = %instrument.min_qty,
        "instrument"
    );
    if mode == ExecutionMode::Live {
        warn!("live execution enabled: real MARKET orders will be placed");
    }

    let started = Utc::now();
    let start = config
        .history_start_at(started)
        .context("invalid history_start")?;
    let series = match start {
        Some(start) => {
            let series = load_history(&rest, &config.symbol, config.interval, start, started)
                .context("historical backfill failed")?;
            let historical_path = config
                .output_dir
                .join(historical_file_name(&config.symbol, started));
            write_historical_csv(&historical_path, series.bars())
                .with_context(|| format!("failed to write {}", historical_path.display()))?;
            series
        }
        None => {
            info!("no history_start configured, starting without backfill");
            BarSeries::new(config.interval)
        }
    };

    let model = config.model.build().context("invalid model")?;
    info!(model = model.name(), "signal model");
    let executor = TradeExecutor::new(instrument, mode, config.execution.clone());
    let audit = AuditLog::create(&config.output_dir, &config.symbol, started)
        .context("failed to create audit log")?;
    info!(path = %audit.path().display(), "audit log");

    let mut coordinator =
        StreamCoordinator::new(series, model, executor, audit, rest).with_max_bars(max_bars);

    stop_on_interrupt(coordinator.stop_handle())?;
    if let Some(secs) = duration_secs {
        let stop = coordinator.stop_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            stop.stop();
        });
    }

    let mut transport = KlineStream::new(
        config.exchange.ws_url.clone(),
        Duration::from_millis(config.exchange.poll_timeout_ms),
    );
    let summary = coordinator
        .run(&mut transport)
        .context("kline stream failed")?;

    println!("Start:      {}", summary.started_at);
    println!("Stop:       {}", summary.stopped_at);
    println!("Duration:   {}s", summary.duration().num_seconds());
    println!("Iterations: {}", summary.iterations);
    println!("Bars:       {}", summary.bars_processed);
    println!("Trade log:  {}", coordinator.audit().path().display());
    Ok(())
}

/// Ctrl-C sets the stop flag; the cycle in flight finishes and is logged.
fn stop_on_interrupt(stop: StopHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    std::thread::spawn(move || {
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, stopping after the current cycle");
                    stop.stop();
                }
                Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
            }
        });
    });
    Ok(())
}

fn run_history(overrides: Overrides, start: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(&overrides)?;
    let rest = BinanceRest::new(&config.exchange, Credentials::from_env())
        .context("failed to create Binance client")?;

    let now = Utc::now();
    let start = match &start {
        Some(value) => Some(parse_history_start(value, now).context("invalid --start")?),
        None => config.history_start_at(now).context("invalid history_start")?,
    };
    let Some(start) = start else {
        bail!("no start given: pass --start or set history_start in the config");
    };
    let series = load_history(&rest, &config.symbol, config.interval, start, now)
        .with_context(|| format!("failed to fetch klines for {}", config.symbol))?;
    let bars = series.bars();

    let path = output.unwrap_or_else(|| {
        config
            .output_dir
            .join(historical_file_name(&config.symbol, now))
    });
    write_historical_csv(&path, bars)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {} bars to {}", bars.len(), path.display());
    Ok(())
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = BotConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    println!("Config OK: {}", path.display());
    println!("  symbol:        {}", config.symbol);
    println!("  interval:      {}", config.interval);
    println!("  output_dir:    {}", config.output_dir.display());
    println!("  execution:     {:?}", config.mode());
    println!(
        "  history_start: {}",
        config.history_start.as_deref().unwrap_or("none (no backfill)")
    );
    println!(
        "  model:         {:?} fast={} slow={}",
        config.model.kind, config.model.fast, config.model.slow
    );
    println!(
        "  retry:         max_attempts={} scale={} paper_quantity={}",
        config.execution.max_attempts, config.execution.scale, config.execution.paper_quantity
    );
    if Credentials::from_env().is_none() {
        println!("  credentials:   not set (required for `run`)");
    }
    Ok(())
}
