//! The purchase loop: wait for the daily fire time, buy, repeat.
//!
//! Two states only. `Waiting` sleeps until the next fire time;
//! `Purchasing` runs one attempt and always returns to `Waiting`.
//! Anticipated failures go straight back to the schedule. Unexpected
//! faults are logged and the loop pauses for `error_pause` first.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::chain::ChainError;
use crate::engine::executor::PurchaseExecutor;
use crate::engine::schedule::{compute_next_fire_time, time_until, Clock};
use crate::types::PurchaseOutcome;

/// Longest single timer sleep while waiting. The wall clock is re-read
/// after each one, so time lost while the host is suspended is caught up.
const MAX_SLEEP_CHUNK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Waiting { until: DateTime<Utc> },
    Purchasing,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Waiting { until } => write!(f, "WAITING until {until}"),
            LoopState::Purchasing => write!(f, "PURCHASING"),
        }
    }
}

/// What one cycle produced.
#[derive(Debug)]
pub enum CycleResult {
    Completed(PurchaseOutcome),
    /// Fault outside the anticipated kinds; the loop paused afterwards.
    Faulted(ChainError),
}

/// Summary of one wait → purchase cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub fire_at: DateTime<Utc>,
    /// Wait until `fire_at`, as computed when the cycle started.
    pub slept: Duration,
    pub result: CycleResult,
    /// Pause taken after an unexpected fault.
    pub paused: Option<Duration>,
    pub next_fire_at: DateTime<Utc>,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        matches!(&self.result, CycleResult::Completed(o) if o.is_success())
    }
}

pub struct PurchaseLoop {
    executor: PurchaseExecutor,
    clock: Arc<dyn Clock>,
    target_hour: u32,
    error_pause: Duration,
    state: LoopState,
    cycle_count: u64,
    last_fire_at: Option<DateTime<Utc>>,
}

impl PurchaseLoop {
    pub fn new(executor: PurchaseExecutor, clock: Arc<dyn Clock>) -> Self {
        let target_hour = executor.settings().target_hour;
        let error_pause = executor.settings().error_pause;
        let until = compute_next_fire_time(clock.now(), target_hour);
        Self {
            executor,
            clock,
            target_hour,
            error_pause,
            state: LoopState::Waiting { until },
            cycle_count: 0,
            last_fire_at: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Next fire time, never at or before the last one that fired. Guards
    /// against waking a hair early by wall clock and buying twice.
    pub fn next_fire_time(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let from = match self.last_fire_at {
            Some(last) if last > now => last,
            _ => now,
        };
        compute_next_fire_time(from, self.target_hour)
    }

    /// Run forever. Returns only if the surrounding task is dropped.
    pub async fn run(&mut self) {
        info!(
            target_hour_utc = self.target_hour,
            next_fire_at = %self.next_fire_time(),
            "Entering purchase loop"
        );
        loop {
            let report = self.run_cycle().await;
            log_cycle_report(&report);
        }
    }

    /// Sleep until the wall clock reaches `fire_at`.
    async fn sleep_until(&self, fire_at: DateTime<Utc>) {
        loop {
            let remaining = time_until(self.clock.now(), fire_at);
            if remaining.is_zero() {
                return;
            }
            tokio::time::sleep(remaining.min(MAX_SLEEP_CHUNK)).await;
        }
    }

    /// Wait for the next fire time, run one attempt, and report.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let fire_at = self.next_fire_time();
        let slept = time_until(self.clock.now(), fire_at);

        self.state = LoopState::Waiting { until: fire_at };
        info!(
            fire_at = %fire_at,
            sleep_secs = slept.as_secs(),
            "Waiting for next purchase"
        );
        self.sleep_until(fire_at).await;

        self.state = LoopState::Purchasing;
        self.cycle_count += 1;
        self.last_fire_at = Some(fire_at);

        let (result, paused) = match self.executor.execute_purchase().await {
            Ok(outcome) => {
                log_outcome(&outcome);
                (CycleResult::Completed(outcome), None)
            }
            Err(e) => {
                error!(
                    cycle = self.cycle_count,
                    error = %e,
                    pause_secs = self.error_pause.as_secs(),
                    "Unexpected fault during purchase cycle, pausing before resuming"
                );
                tokio::time::sleep(self.error_pause).await;
                (CycleResult::Faulted(e), Some(self.error_pause))
            }
        };

        let next_fire_at = self.next_fire_time();
        self.state = LoopState::Waiting {
            until: next_fire_at,
        };

        CycleReport {
            cycle_number: self.cycle_count,
            fire_at,
            slept,
            result,
            paused,
            next_fire_at,
        }
    }
}

fn log_outcome(outcome: &PurchaseOutcome) {
    let attempt = outcome.attempt();
    match outcome {
        PurchaseOutcome::Confirmed(_) => info!(
            attempt = %attempt.id,
            tx = ?attempt.tx_hash,
            block = ?attempt.block_number(),
            "Purchase succeeded"
        ),
        PurchaseOutcome::Simulated(_) => info!(
            attempt = %attempt.id,
            nonce = ?attempt.nonce,
            "Purchase simulated (dry run)"
        ),
        PurchaseOutcome::Failed { error, .. } => warn!(
            attempt = %attempt.id,
            kind = error.kind(),
            error = %error,
            tx = ?attempt.tx_hash,
            "Purchase failed, skipping until next scheduled time"
        ),
    }
}

/// One-line cycle summary.
pub fn log_cycle_report(report: &CycleReport) {
    let outcome = match &report.result {
        CycleResult::Completed(o) => o.to_string(),
        CycleResult::Faulted(_) => "FAULTED".to_string(),
    };
    info!(
        cycle = report.cycle_number,
        fire_at = %report.fire_at,
        outcome = %outcome,
        paused = ?report.paused,
        next_fire_at = %report.next_fire_at,
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
