//! DAILYBUY — Scheduled daily DEX purchase agent
//!
//! Entry point. Loads and validates configuration, initialises
//! structured logging, connects to the node, and runs the daily
//! wait→purchase loop until interrupted. Any startup failure exits
//! non-zero before the loop is entered.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::{error, info, warn};

use dailybuy::chain::provider::EthersChainClient;
use dailybuy::chain::ChainClient;
use dailybuy::config::{self, Settings};
use dailybuy::contract::SwapRouter;
use dailybuy::engine::executor::{required_funds, PurchaseExecutor};
use dailybuy::engine::runner::PurchaseLoop;
use dailybuy::engine::schedule::{Clock, SystemClock};

const BANNER: &str = r#"
 ____    _    ___ _  __   ______  _   ___   __
|  _ \  / \  |_ _| | \ \ / / __ )| | | \ \ / /
| | | |/ _ \  | || |  \ V /|  _ \| | | |\ V /
| |_| / ___ \ | || |___| | | |_) | |_| | | |
|____/_/   \_\___|_____|_| |____/ \___/  |_|

  One swap a day, on schedule
  v0.1.0
"#;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("DAILYBUY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging(&cfg)?;

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        config = %config_path,
        target_hour_utc = cfg.agent.target_hour_utc,
        dry_run = cfg.agent.dry_run,
        "DAILYBUY starting up"
    );

    // -- Validate ----------------------------------------------------------

    let settings = match cfg.validate() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "Configuration invalid, refusing to start");
            return Err(e).context("Configuration validation failed");
        }
    };

    let router = SwapRouter::from_abi_file(settings.router_address, &settings.router_abi_path)
        .map_err(|e| {
            error!(error = %e, "Router ABI unavailable");
            e
        })
        .context("Failed to load swap router ABI")?;

    // -- Connect -----------------------------------------------------------

    let chain = connect(&settings).await?;
    log_startup_summary(&chain, &settings).await?;

    // -- Main loop ---------------------------------------------------------

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let chain: Arc<dyn ChainClient> = Arc::new(chain);
    let executor = PurchaseExecutor::new(chain, router, settings.clone(), clock.clone());
    let mut purchase_loop = PurchaseLoop::new(executor, clock);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        _ = purchase_loop.run() => {}
        _ = &mut shutdown => {
            info!("Shutdown signal received. DAILYBUY stopped.");
        }
    }

    Ok(())
}

/// Connect to the node and check it serves the expected chain.
async fn connect(settings: &Settings) -> Result<EthersChainClient> {
    let wallet = settings.wallet().context("Failed to build signing wallet")?;

    let chain = EthersChainClient::connect(
        &settings.rpc_url,
        wallet,
        settings.receipt_poll_interval,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Node connection failed");
        e
    })
    .context("Failed to connect to node")?;

    if let Some(expected) = settings.chain_id {
        if expected != chain.chain_id() {
            error!(expected, actual = chain.chain_id(), "Node serves a different chain");
            anyhow::bail!(
                "Configured chain id {expected} does not match node chain id {}",
                chain.chain_id()
            );
        }
    }

    chain
        .check_connection()
        .await
        .context("Node connectivity check failed")?;

    Ok(chain)
}

/// Log wallet and funding state before entering the loop.
async fn log_startup_summary(chain: &EthersChainClient, settings: &Settings) -> Result<()> {
    let balance = chain
        .get_balance(settings.wallet_address)
        .await
        .context("Failed to read wallet balance")?;
    let required = required_funds(settings.purchase_amount, settings.gas_limit, settings.gas_price);

    info!(
        client = chain.name(),
        chain_id = chain.chain_id(),
        wallet = ?settings.wallet_address,
        router = ?settings.router_address,
        token_in = ?settings.input_token,
        token_out = ?settings.target_token,
        pool_fee = settings.pool_fee,
        amount_wei = %settings.purchase_amount,
        balance_wei = %balance,
        required_wei = %required,
        "Wallet ready"
    );

    if balance < required {
        warn!(
            shortfall_wei = %(required - balance),
            "Wallet cannot currently fund a purchase; attempts will be skipped until topped up"
        );
    }
    Ok(())
}

/// Initialise the `tracing` subscriber: stdout plus an append-only log file.
fn init_logging(cfg: &config::AppConfig) -> Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dailybuy=info"));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cfg.agent.log_file)
        .with_context(|| format!("Failed to open log file: {}", cfg.agent.log_file))?;

    let json_logging = std::env::var("DAILYBUY_LOG_JSON").is_ok();

    let json_layer = json_logging.then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
    });
    let text_layer = (!json_logging).then(|| fmt::layer().with_target(true));
    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    Ok(())
}
