//! Shared types for the DAILYBUY agent.
//!
//! The purchase pipeline passes these between the swap binding, the
//! chain client and the engine. Nothing here is persisted: a
//! `PurchaseAttempt` lives for one cycle and is dropped after logging.

use chrono::{DateTime, Utc};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, TransactionRequest, TxHash, U256};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Swap parameters
// ---------------------------------------------------------------------------

/// Arguments of a single-pool exact-input swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    pub token_in: Address,
    pub token_out: Address,
    /// Pool fee tier in hundredths of a bip (500, 3000, 10000).
    pub fee: u32,
    pub recipient: Address,
    /// Unix timestamp after which the router rejects the swap.
    pub deadline: U256,
    pub amount_in: U256,
    /// Always zero: no slippage floor.
    pub amount_out_minimum: U256,
    /// Always zero: unconstrained price.
    pub sqrt_price_limit_x96: U256,
}

/// Transaction envelope fields supplied by the caller of a contract binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOptions {
    pub from: Address,
    pub value: U256,
    pub gas: U256,
    pub gas_price: U256,
    pub nonce: U256,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// A fully specified, unsigned legacy transaction ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPayload {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas: U256,
    pub gas_price: U256,
    pub nonce: U256,
    pub data: Bytes,
}

impl TransactionPayload {
    /// Convert into the ethers transaction type, bound to `chain_id`.
    pub fn to_typed_transaction(&self, chain_id: u64) -> TypedTransaction {
        TransactionRequest::new()
            .from(self.from)
            .to(self.to)
            .value(self.value)
            .gas(self.gas)
            .gas_price(self.gas_price)
            .nonce(self.nonce)
            .data(self.data.clone())
            .chain_id(chain_id)
            .into()
    }

    /// Worst-case cost of the transaction: value plus the full gas allowance.
    pub fn max_cost(&self) -> U256 {
        self.value
            .saturating_add(self.gas.saturating_mul(self.gas_price))
    }
}

impl fmt::Display for TransactionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "to={:?} value={} gas={} gas_price={} nonce={} data={} bytes",
            self.to,
            self.value,
            self.gas,
            self.gas_price,
            self.nonce,
            self.data.len(),
        )
    }
}

/// RLP-encoded signed transaction plus the hash it will be mined under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: TxHash,
}

// ---------------------------------------------------------------------------
// Purchase attempt
// ---------------------------------------------------------------------------

/// One in-memory purchase attempt. Fields fill in as the pipeline advances.
#[derive(Debug, Clone)]
pub struct PurchaseAttempt {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub nonce: Option<U256>,
    pub payload: Option<TransactionPayload>,
    pub signed: Option<SignedTransaction>,
    pub tx_hash: Option<TxHash>,
    pub receipt: Option<TransactionReceipt>,
}

impl PurchaseAttempt {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            nonce: None,
            payload: None,
            signed: None,
            tx_hash: None,
            receipt: None,
        }
    }

    /// Block the receipt was mined in, if confirmed.
    pub fn block_number(&self) -> Option<u64> {
        self.receipt
            .as_ref()
            .and_then(|r| r.block_number)
            .map(|b| b.as_u64())
    }

    /// Gas consumed by the confirmed transaction.
    pub fn gas_used(&self) -> Option<U256> {
        self.receipt.as_ref().and_then(|r| r.gas_used)
    }
}

/// Result of `execute_purchase`.
#[derive(Debug)]
pub enum PurchaseOutcome {
    /// Transaction mined with status 1.
    Confirmed(PurchaseAttempt),
    /// Dry-run: built but never signed or broadcast.
    Simulated(PurchaseAttempt),
    /// Attempt abandoned for an anticipated reason; retry next schedule.
    Failed {
        attempt: PurchaseAttempt,
        error: PurchaseError,
    },
}

impl PurchaseOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, PurchaseOutcome::Failed { .. })
    }

    pub fn attempt(&self) -> &PurchaseAttempt {
        match self {
            PurchaseOutcome::Confirmed(a) | PurchaseOutcome::Simulated(a) => a,
            PurchaseOutcome::Failed { attempt, .. } => attempt,
        }
    }

    pub fn error(&self) -> Option<&PurchaseError> {
        match self {
            PurchaseOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for PurchaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseOutcome::Confirmed(a) => match a.tx_hash {
                Some(hash) => write!(f, "CONFIRMED {hash:?}"),
                None => write!(f, "CONFIRMED"),
            },
            PurchaseOutcome::Simulated(_) => write!(f, "SIMULATED"),
            PurchaseOutcome::Failed { error, .. } => write!(f, "FAILED ({})", error.kind()),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Anticipated per-cycle failures. Each one skips the cycle; none pauses
/// the loop.
#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("Insufficient funds: need {required} wei, have {available} wei")]
    InsufficientFunds { required: U256, available: U256 },

    #[error("Transaction build failed: {0}")]
    Build(String),

    #[error("Signing failed: {0}")]
    Sign(String),

    #[error("Broadcast rejected: {0}")]
    Broadcast(String),

    #[error("No receipt for {tx_hash:?} within {timeout_secs}s")]
    ConfirmationTimeout { tx_hash: TxHash, timeout_secs: u64 },

    #[error("Confirmation lookup failed: {0}")]
    Unconfirmed(String),

    #[error("Transaction {tx_hash:?} reverted in block {block:?}")]
    Reverted { tx_hash: TxHash, block: Option<u64> },
}

impl PurchaseError {
    /// Short, stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PurchaseError::InsufficientFunds { .. } => "insufficient_funds",
            PurchaseError::Build(_) => "build",
            PurchaseError::Sign(_) => "sign",
            PurchaseError::Broadcast(_) => "broadcast",
            PurchaseError::ConfirmationTimeout { .. } => "timeout",
            PurchaseError::Unconfirmed(_) => "unconfirmed",
            PurchaseError::Reverted { .. } => "reverted",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
