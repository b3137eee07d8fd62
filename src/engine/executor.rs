//! Purchase executor.
//!
//! Runs one purchase attempt: funding check → nonce → build → sign →
//! broadcast → confirm. Anticipated failures come back as
//! `PurchaseOutcome::Failed`; only faults outside those kinds (a failed
//! balance or nonce read) surface as `Err` for the loop to pause on.

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256, U64};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainClient, ChainError};
use crate::config::Settings;
use crate::contract::SwapRouter;
use crate::engine::schedule::Clock;
use crate::types::{
    PurchaseAttempt, PurchaseError, PurchaseOutcome, SwapParams, TransactionPayload, TxOptions,
};

// ---------------------------------------------------------------------------
// Funding
// ---------------------------------------------------------------------------

/// Balance required for one purchase: amount plus the full gas allowance.
pub fn required_funds(purchase_amount: U256, gas_limit: U256, gas_price: U256) -> U256 {
    purchase_amount.saturating_add(gas_limit.saturating_mul(gas_price))
}

/// Snapshot of one balance read against the requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Funding {
    pub balance: U256,
    pub required: U256,
}

impl Funding {
    /// Equality counts as sufficient.
    pub fn is_sufficient(&self) -> bool {
        self.balance >= self.required
    }

    pub fn shortfall(&self) -> U256 {
        self.required.saturating_sub(self.balance)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct PurchaseExecutor {
    chain: Arc<dyn ChainClient>,
    router: SwapRouter,
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
}

impl PurchaseExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        router: SwapRouter,
        settings: Arc<Settings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chain,
            router,
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Read the wallet balance and compare it to what one purchase needs.
    /// Logs the shortfall when the balance is too low.
    pub async fn funding(
        &self,
        wallet: Address,
        purchase_amount: U256,
        gas_limit: U256,
        gas_price: U256,
    ) -> Result<Funding, ChainError> {
        let balance = self.chain.get_balance(wallet).await?;
        let funding = Funding {
            balance,
            required: required_funds(purchase_amount, gas_limit, gas_price),
        };

        if funding.is_sufficient() {
            debug!(balance = %funding.balance, required = %funding.required, "Funding sufficient");
        } else {
            warn!(
                wallet = ?wallet,
                balance = %funding.balance,
                required = %funding.required,
                shortfall = %funding.shortfall(),
                "Insufficient funds for purchase"
            );
        }
        Ok(funding)
    }

    /// `true` when the wallet can cover amount plus worst-case gas.
    pub async fn check_funding(
        &self,
        wallet: Address,
        purchase_amount: U256,
        gas_limit: U256,
        gas_price: U256,
    ) -> Result<bool, ChainError> {
        Ok(self
            .funding(wallet, purchase_amount, gas_limit, gas_price)
            .await?
            .is_sufficient())
    }

    /// Swap arguments for a purchase submitted at `now`.
    pub fn swap_params(&self, now: DateTime<Utc>) -> SwapParams {
        let s = &self.settings;
        let deadline = u64::try_from(now.timestamp())
            .unwrap_or_default()
            .saturating_add(s.deadline_buffer.as_secs());

        SwapParams {
            token_in: s.input_token,
            token_out: s.target_token,
            fee: s.pool_fee,
            recipient: s.wallet_address,
            deadline: U256::from(deadline),
            amount_in: s.purchase_amount,
            amount_out_minimum: U256::zero(),
            sqrt_price_limit_x96: U256::zero(),
        }
    }

    /// Assemble the swap transaction for `nonce`. No retry on failure.
    pub fn build_transaction(&self, nonce: U256) -> Result<TransactionPayload, PurchaseError> {
        let s = &self.settings;
        let params = self.swap_params(self.clock.now());

        let call = self
            .router
            .exact_input_single(&params)
            .map_err(|e| PurchaseError::Build(e.to_string()))?;

        Ok(call.build_transaction(TxOptions {
            from: s.wallet_address,
            value: s.purchase_amount,
            gas: s.gas_limit,
            gas_price: s.gas_price,
            nonce,
        }))
    }

    /// Run one full purchase attempt.
    pub async fn execute_purchase(&self) -> Result<PurchaseOutcome, ChainError> {
        let s = &self.settings;
        let mut attempt = PurchaseAttempt::new(self.clock.now());

        info!(
            attempt = %attempt.id,
            amount = %s.purchase_amount,
            token = ?s.target_token,
            dry_run = s.dry_run,
            "Starting purchase attempt"
        );

        // 1. Funding
        let funding = self
            .funding(s.wallet_address, s.purchase_amount, s.gas_limit, s.gas_price)
            .await?;
        if !funding.is_sufficient() {
            return Ok(PurchaseOutcome::Failed {
                attempt,
                error: PurchaseError::InsufficientFunds {
                    required: funding.required,
                    available: funding.balance,
                },
            });
        }

        // 2. Nonce
        let nonce = self.chain.get_nonce(s.wallet_address).await?;
        attempt.nonce = Some(nonce);

        // 3. Build
        let payload = match self.build_transaction(nonce) {
            Ok(p) => p,
            Err(error) => return Ok(PurchaseOutcome::Failed { attempt, error }),
        };
        debug!(attempt = %attempt.id, payload = %payload, "Transaction built");
        attempt.payload = Some(payload.clone());

        if s.dry_run {
            info!(
                attempt = %attempt.id,
                nonce = %nonce,
                router = ?payload.to,
                value = %payload.value,
                calldata_bytes = payload.data.len(),
                "[DRY RUN] Would sign and broadcast swap"
            );
            return Ok(PurchaseOutcome::Simulated(attempt));
        }

        // 4. Sign
        let signed = match self.chain.sign_transaction(&payload).await {
            Ok(signed) => signed,
            Err(e) => {
                return Ok(PurchaseOutcome::Failed {
                    attempt,
                    error: PurchaseError::Sign(e.to_string()),
                })
            }
        };
        attempt.signed = Some(signed.clone());

        // 5. Broadcast
        let tx_hash = match self.chain.send_raw_transaction(&signed).await {
            Ok(hash) => hash,
            Err(e) => {
                return Ok(PurchaseOutcome::Failed {
                    attempt,
                    error: PurchaseError::Broadcast(e.to_string()),
                })
            }
        };
        attempt.tx_hash = Some(tx_hash);
        info!(attempt = %attempt.id, tx = ?tx_hash, nonce = %nonce, "Swap broadcast");

        // 6. Confirm
        let timeout = s.receipt_timeout;
        let receipt = match self.chain.wait_for_receipt(tx_hash, timeout).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                warn!(
                    tx = ?tx_hash,
                    timeout_secs = timeout.as_secs(),
                    "No receipt before timeout; transaction may still be mined, not resubmitting"
                );
                return Ok(PurchaseOutcome::Failed {
                    attempt,
                    error: PurchaseError::ConfirmationTimeout {
                        tx_hash,
                        timeout_secs: timeout.as_secs(),
                    },
                });
            }
            Err(e) => {
                error!(tx = ?tx_hash, error = %e, "Receipt lookup failed");
                return Ok(PurchaseOutcome::Failed {
                    attempt,
                    error: PurchaseError::Unconfirmed(e.to_string()),
                });
            }
        };

        let reverted = receipt.status != Some(U64::from(1));
        attempt.receipt = Some(receipt);

        if reverted {
            let block = attempt.block_number();
            return Ok(PurchaseOutcome::Failed {
                attempt,
                error: PurchaseError::Reverted { tx_hash, block },
            });
        }

        info!(
            attempt = %attempt.id,
            tx = ?tx_hash,
            block = ?attempt.block_number(),
            gas_used = ?attempt.gas_used(),
            "Swap confirmed"
        );
        Ok(PurchaseOutcome::Confirmed(attempt))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
