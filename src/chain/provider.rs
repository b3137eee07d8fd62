//! `ethers`-backed chain client over HTTP JSON-RPC.
//!
//! Holds the node connection and the local signing wallet. The chain id
//! is read from the node once at connect time and bound to the wallet so
//! every signature is EIP-155 replay protected.

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockNumber, TransactionReceipt, TxHash, H256, U256};
use ethers::utils::keccak256;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChainClient, ChainError};
use crate::types::{SignedTransaction, TransactionPayload};

const CLIENT_NAME: &str = "ethers-http";

pub struct EthersChainClient {
    provider: Provider<Http>,
    wallet: LocalWallet,
    /// Endpoint with any path/query stripped, safe to log.
    endpoint: String,
    chain_id: u64,
    poll_interval: Duration,
}

impl EthersChainClient {
    /// Connect to `endpoint` and bind `wallet` to the chain id the node
    /// reports. Fails if the node cannot be reached.
    pub async fn connect(
        endpoint: &str,
        wallet: LocalWallet,
        poll_interval: Duration,
    ) -> Result<Self, ChainError> {
        let safe_endpoint = redact_endpoint(endpoint);
        let provider = Provider::<Http>::try_from(endpoint).map_err(|e| ChainError::Connection {
            endpoint: safe_endpoint.clone(),
            message: e.to_string(),
        })?;

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| ChainError::Connection {
                endpoint: safe_endpoint.clone(),
                message: e.to_string(),
            })?
            .as_u64();

        info!(endpoint = %safe_endpoint, chain_id, "Connected to node");

        Ok(Self::with_chain_id(
            provider,
            wallet,
            chain_id,
            safe_endpoint,
            poll_interval,
        ))
    }

    /// Build a client for a known chain id without touching the network.
    pub fn with_chain_id(
        provider: Provider<Http>,
        wallet: LocalWallet,
        chain_id: u64,
        endpoint: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            provider,
            wallet: wallet.with_chain_id(chain_id),
            endpoint,
            chain_id,
            poll_interval,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn check_connection(&self) -> Result<u64, ChainError> {
        let connection_err = |e: ethers::providers::ProviderError| ChainError::Connection {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        };

        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(connection_err)?
            .as_u64();
        let block = self
            .provider
            .get_block_number()
            .await
            .map_err(connection_err)?;

        if chain_id != self.chain_id {
            return Err(ChainError::Connection {
                endpoint: self.endpoint.clone(),
                message: format!(
                    "node switched chains: expected {}, got {chain_id}",
                    self.chain_id
                ),
            });
        }

        debug!(chain_id, block = %block, "Node reachable");
        Ok(chain_id)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| ChainError::rpc("eth_getBalance", e))
    }

    async fn get_nonce(&self, address: Address) -> Result<U256, ChainError> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| ChainError::rpc("eth_getTransactionCount", e))
    }

    async fn sign_transaction(
        &self,
        payload: &TransactionPayload,
    ) -> Result<SignedTransaction, ChainError> {
        if payload.from != self.wallet.address() {
            return Err(ChainError::Signing(format!(
                "payload sender {:?} does not match signing key {:?}",
                payload.from,
                self.wallet.address()
            )));
        }

        let tx = payload.to_typed_transaction(self.chain_id);
        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));
        Ok(SignedTransaction { raw, hash })
    }

    async fn send_raw_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<TxHash, ChainError> {
        let pending = self
            .provider
            .send_raw_transaction(signed.raw.clone())
            .await
            .map_err(|e| ChainError::Rejected(e.to_string()))?;

        let tx_hash = pending.tx_hash();
        if tx_hash != signed.hash {
            warn!(
                expected = ?signed.hash,
                reported = ?tx_hash,
                "Node reported a different transaction hash"
            );
        }
        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let poll = async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => debug!(tx = ?tx_hash, "Receipt not yet available"),
                    Err(e) => warn!(tx = ?tx_hash, error = %e, "Receipt poll failed, retrying"),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(receipt) => Ok(Some(receipt)),
            Err(_) => Ok(None),
        }
    }

    fn name(&self) -> &str {
        CLIENT_NAME
    }
}

/// Strip path and query from an endpoint URL. Hosted nodes often carry
/// the API key in the path.
pub fn redact_endpoint(endpoint: &str) -> String {
    match endpoint.find("://") {
        Some(scheme_end) => {
            let rest = &endpoint[scheme_end + 3..];
            let host_end = rest.find(['/', '?']).unwrap_or(rest.len());
            format!("{}{}", &endpoint[..scheme_end + 3], &rest[..host_end])
        }
        None => endpoint.split(['/', '?']).next().unwrap_or_default().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
