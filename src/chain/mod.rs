//! Blockchain node access.
//!
//! Defines the `ChainClient` trait the purchase engine talks to and an
//! `ethers`-backed implementation in [`provider`]. The engine only ever
//! sees the trait, so tests substitute an in-memory client.

pub mod provider;

use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, TxHash, U256};
use std::time::Duration;

use crate::types::{SignedTransaction, TransactionPayload};

/// Faults raised by a chain client.
///
/// The engine maps `Signing` and `Rejected` onto recoverable purchase
/// failures; `Rpc` and `Connection` from a read are treated as
/// unexpected and pause the loop.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Node connection failed ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },

    #[error("RPC call {method} failed: {message}")]
    Rpc { method: &'static str, message: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transaction rejected by node: {0}")]
    Rejected(String),
}

impl ChainError {
    pub fn rpc(method: &'static str, err: impl std::fmt::Display) -> Self {
        ChainError::Rpc {
            method,
            message: err.to_string(),
        }
    }
}

/// Abstraction over a node connection plus the wallet that signs for it.
///
/// Calls are strictly sequential; implementors need no internal locking
/// beyond what their transport already does.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Verify the node answers. Returns the chain id it reports.
    async fn check_connection(&self) -> Result<u64, ChainError>;

    /// Native balance of `address` in wei at the latest block.
    async fn get_balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Next nonce for `address`, counting pending transactions.
    async fn get_nonce(&self, address: Address) -> Result<U256, ChainError>;

    /// Sign `payload` with the client's key.
    async fn sign_transaction(
        &self,
        payload: &TransactionPayload,
    ) -> Result<SignedTransaction, ChainError>;

    /// Broadcast a signed transaction. Returns the hash the node accepted.
    async fn send_raw_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<TxHash, ChainError>;

    /// Poll for a receipt until one appears or `timeout` elapses.
    /// `Ok(None)` means the timeout was hit.
    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, ChainError>;

    /// Human-readable identifier for logging.
    fn name(&self) -> &str;
}
