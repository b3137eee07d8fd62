//! End-to-end purchase loop scenarios on paused tokio time.

use chrono::{DateTime, TimeZone, Utc};
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

use dailybuy::config::{AppConfig, ConfigError, Settings};
use dailybuy::contract::{BindingError, SwapRouter};
use dailybuy::engine::executor::PurchaseExecutor;
use dailybuy::engine::runner::{CycleResult, LoopState, PurchaseLoop};
use dailybuy::types::{PurchaseError, PurchaseOutcome};

use crate::mock_chain::{MockChain, ReceiptBehavior, TokioClock};

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

const AMOUNT: u64 = 1_000_000_000_000_000;
const GAS_LIMIT: u64 = 300_000;
const GAS_PRICE: u64 = 1_000_000_000;

const CONFIG: &str = r#"
    [agent]
    name = "DAILYBUY-IT"
    target_hour_utc = 15
    receipt_timeout_secs = 300
    error_pause_secs = 300

    [chain]
    rpc_url_env = "RPC_URL"
    private_key_env = "PRIVATE_KEY"
    wallet_address_env = "WALLET_ADDRESS"

    [swap]
    router_address = "0xE592427A0AEce92De3Edee1F18E0157C05861564"
    router_abi_path = "abi/swap_router.json"
    input_token = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
    target_token_env = "TARGET_TOKEN"
    purchase_amount_wei = "1000000000000000"
    pool_fee = 3000
    deadline_buffer_secs = 600

    [gas]
    gas_limit = 300000
    gas_price_wei = 1000000000
"#;

fn env() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("RPC_URL", "http://localhost:8545"),
        ("PRIVATE_KEY", DEV_KEY),
        ("WALLET_ADDRESS", DEV_ADDRESS),
        ("TARGET_TOKEN", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
    ])
}

fn settings(dry_run: bool) -> Settings {
    let mut cfg: AppConfig = toml::from_str(CONFIG).unwrap();
    cfg.agent.dry_run = dry_run;
    let env = env();
    cfg.validate_with(|name| env.get(name).map(|v| v.to_string()))
        .unwrap()
}

fn required() -> U256 {
    U256::from(AMOUNT) + U256::from(GAS_LIMIT) * U256::from(GAS_PRICE)
}

fn utc(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, h, m, s).unwrap()
}

fn purchase_loop(chain: Arc<MockChain>, clock: Arc<TokioClock>, dry_run: bool) -> PurchaseLoop {
    let settings = Arc::new(settings(dry_run));
    let router =
        SwapRouter::from_abi_file(settings.router_address, &settings.router_abi_path).unwrap();
    let executor = PurchaseExecutor::new(chain, router, settings, clock.clone());
    PurchaseLoop::new(executor, clock)
}

fn outcome(result: &CycleResult) -> &PurchaseOutcome {
    match result {
        CycleResult::Completed(o) => o,
        CycleResult::Faulted(e) => panic!("unexpected fault: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_fires_one_second_after_start_at_target_hour() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 14, 59, 59)));
    let chain = Arc::new(MockChain::new(required() * U256::from(10u64)));
    let mut lp = purchase_loop(chain.clone(), clock, false);

    assert_eq!(lp.state(), LoopState::Waiting { until: utc(14, 15, 0, 0) });

    let report = lp.run_cycle().await;

    assert_eq!(report.cycle_number, 1);
    assert_eq!(report.slept, Duration::from_secs(1));
    assert_eq!(report.fire_at, utc(14, 15, 0, 0));
    assert!(report.is_success());

    let attempt = outcome(&report.result).attempt();
    assert!(attempt.started_at >= utc(14, 15, 0, 0));
    assert!(attempt.started_at < utc(14, 15, 0, 1));
    assert!(matches!(outcome(&report.result), PurchaseOutcome::Confirmed(_)));

    assert_eq!(report.next_fire_at, utc(15, 15, 0, 0));
    assert_eq!(lp.state(), LoopState::Waiting { until: utc(15, 15, 0, 0) });
    assert_eq!(
        chain.calls(),
        vec![
            "get_balance",
            "get_nonce",
            "sign_transaction",
            "send_raw_transaction",
            "wait_for_receipt"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_days_use_fresh_nonces() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 9, 0, 0)));
    let chain = Arc::new(MockChain::new(required() * U256::from(10u64)));
    let mut lp = purchase_loop(chain.clone(), clock, false);

    let first = lp.run_cycle().await;
    let second = lp.run_cycle().await;

    assert_eq!(first.fire_at, utc(14, 15, 0, 0));
    assert_eq!(second.fire_at, utc(15, 15, 0, 0));
    assert_eq!(lp.cycle_count(), 2);

    let sent = chain.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].nonce, U256::zero());
    assert_eq!(sent[1].nonce, U256::one());
    assert_eq!(sent[0].from, DEV_ADDRESS.parse::<Address>().unwrap());
    assert_eq!(sent[0].value, U256::from(AMOUNT));
}

#[tokio::test(start_paused = true)]
async fn test_fires_on_wall_clock_after_host_suspend() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 9, 0, 0)));
    let chain = Arc::new(MockChain::new(required() * U256::from(10u64)));
    let mut lp = purchase_loop(chain.clone(), clock.clone(), false);
    let start = tokio::time::Instant::now();

    // One hour in, five hours of wall time pass with the timer stopped.
    let suspended = clock.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3590)).await;
        suspended.jump(Duration::from_secs(5 * 3600));
    });

    let report = lp.run_cycle().await;

    assert_eq!(report.fire_at, utc(14, 15, 0, 0));
    let attempt = outcome(&report.result).attempt();
    assert!(attempt.started_at >= utc(14, 15, 0, 0));
    assert!(attempt.started_at < utc(14, 15, 1, 0));
    assert!(tokio::time::Instant::now() - start < Duration::from_secs(2 * 3600));
    assert_eq!(chain.count("send_raw_transaction"), 1);
}

// ---------------------------------------------------------------------------
// Funding
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_exact_balance_is_enough() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 14, 0, 0)));
    let chain = Arc::new(MockChain::new(required()));
    let mut lp = purchase_loop(chain.clone(), clock, false);

    let report = lp.run_cycle().await;

    assert!(report.is_success());
    assert_eq!(chain.count("send_raw_transaction"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_one_wei_short_stops_before_nonce() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 14, 0, 0)));
    let chain = Arc::new(MockChain::new(required() - U256::one()));
    let mut lp = purchase_loop(chain.clone(), clock, false);

    let report = lp.run_cycle().await;

    assert!(!report.is_success());
    assert!(matches!(
        outcome(&report.result).error(),
        Some(PurchaseError::InsufficientFunds { .. })
    ));
    assert_eq!(report.paused, None);
    assert_eq!(chain.calls(), vec!["get_balance"]);
    assert_eq!(report.next_fire_at, utc(15, 15, 0, 0));
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_receipt_timeout_waits_for_next_day() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 14, 59, 59)));
    let chain = Arc::new(MockChain::new(required() * U256::from(10u64)));
    chain.set_receipts(ReceiptBehavior::Timeout);
    let mut lp = purchase_loop(chain.clone(), clock, false);

    let report = lp.run_cycle().await;

    assert!(matches!(
        outcome(&report.result).error(),
        Some(PurchaseError::ConfirmationTimeout { timeout_secs: 300, .. })
    ));
    assert!(outcome(&report.result).attempt().tx_hash.is_some());
    assert_eq!(report.paused, None);
    assert_eq!(report.next_fire_at, utc(15, 15, 0, 0));
    assert_eq!(chain.count("send_raw_transaction"), 1);

    // No immediate retry: the next attempt sleeps until tomorrow.
    chain.set_receipts(ReceiptBehavior::Confirm);
    let next = lp.run_cycle().await;
    assert_eq!(next.fire_at, utc(15, 15, 0, 0));
    assert_eq!(next.slept, Duration::from_secs(24 * 3600 - 300));
    assert!(next.is_success());
    assert_eq!(chain.count("send_raw_transaction"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reverted_swap_is_failure() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 14, 0, 0)));
    let chain = Arc::new(MockChain::new(required() * U256::from(10u64)));
    chain.set_receipts(ReceiptBehavior::Revert);
    let mut lp = purchase_loop(chain.clone(), clock, false);

    let report = lp.run_cycle().await;

    assert!(matches!(
        outcome(&report.result).error(),
        Some(PurchaseError::Reverted { block: Some(19_000_000), .. })
    ));
    assert_eq!(report.paused, None);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_rejection_skips_receipt_wait() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 14, 0, 0)));
    let chain = Arc::new(MockChain::new(required() * U256::from(10u64)));
    chain.set_broadcast_error("replacement transaction underpriced");
    let mut lp = purchase_loop(chain.clone(), clock, false);

    let report = lp.run_cycle().await;

    assert_eq!(
        outcome(&report.result).error().map(|e| e.kind()),
        Some("broadcast")
    );
    assert_eq!(chain.count("wait_for_receipt"), 0);
    assert!(chain.sent().is_empty());
    assert_eq!(report.paused, None);
}

// ---------------------------------------------------------------------------
// Unexpected faults
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_read_fault_pauses_then_resumes_schedule() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 14, 0, 0)));
    let chain = Arc::new(MockChain::new(required() * U256::from(10u64)));
    chain.set_read_error("upstream 502");
    let mut lp = purchase_loop(chain.clone(), clock.clone(), false);

    let report = lp.run_cycle().await;

    assert!(matches!(report.result, CycleResult::Faulted(_)));
    assert_eq!(report.paused, Some(Duration::from_secs(300)));
    assert_eq!(chain.calls(), vec!["get_balance"]);
    // 15:00 fire + 5 minute pause.
    assert!(dailybuy::engine::schedule::Clock::now(&*clock) >= utc(14, 15, 5, 0));
    assert_eq!(report.next_fire_at, utc(15, 15, 0, 0));

    chain.clear_read_error();
    let next = lp.run_cycle().await;
    assert!(next.is_success());
    assert_eq!(next.fire_at, utc(15, 15, 0, 0));
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_dry_run_never_signs() {
    let clock = Arc::new(TokioClock::starting_at(utc(14, 14, 0, 0)));
    let chain = Arc::new(MockChain::new(required()));
    let mut lp = purchase_loop(chain.clone(), clock, true);

    let report = lp.run_cycle().await;

    assert!(matches!(
        outcome(&report.result),
        PurchaseOutcome::Simulated(_)
    ));
    assert_eq!(chain.calls(), vec!["get_balance", "get_nonce"]);
}

// ---------------------------------------------------------------------------
// Startup validation
// ---------------------------------------------------------------------------

#[test]
fn test_shipped_config_rejects_template_env() {
    let cfg = assert_ok!(AppConfig::load("config.toml"));
    let err = cfg
        .validate_with(|name| match name {
            "RPC_URL" => Some("YOUR_RPC_URL".to_string()),
            _ => None,
        })
        .unwrap_err();
    assert!(matches!(err, ConfigError::Placeholder { .. }));
}

#[test]
fn test_shipped_config_requires_env() {
    let cfg = assert_ok!(AppConfig::load("config.toml"));
    let err = cfg.validate_with(|_| None).unwrap_err();
    assert!(matches!(err, ConfigError::MissingEnv(_)));
}

#[test]
fn test_missing_abi_is_fatal() {
    let settings = settings(false);
    let err = SwapRouter::from_abi_file(settings.router_address, "abi/does_not_exist.json")
        .unwrap_err();
    assert!(matches!(err, BindingError::Read { .. }));
}
