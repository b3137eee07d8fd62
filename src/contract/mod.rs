//! Swap router contract binding.
//!
//! Loads the router ABI from a JSON file at startup and encodes the one
//! call the agent makes: `exactInputSingle((address,address,uint24,
//! address,uint256,uint256,uint256,uint160))`. The resulting
//! [`SwapCall`] turns into a submittable payload once the caller supplies
//! the transaction envelope.

use ethers::abi::{Abi, Function, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use std::path::Path;
use tracing::debug;

use crate::types::{SwapParams, TransactionPayload, TxOptions};

pub const EXACT_INPUT_SINGLE: &str = "exactInputSingle";

/// Largest value a `uint24` fee tier can hold.
const MAX_FEE: u32 = 0xFF_FFFF;

/// `(tokenIn, tokenOut, fee, recipient, deadline, amountIn,
/// amountOutMinimum, sqrtPriceLimitX96)`
fn exact_input_single_params() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Address,
        ParamType::Address,
        ParamType::Uint(24),
        ParamType::Address,
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(160),
    ])
}

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("Failed to read ABI file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse ABI file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("ABI does not declare function `{0}`")]
    MissingFunction(&'static str),

    #[error("ABI declares `{function}` with unsupported inputs: {found}")]
    Signature {
        function: &'static str,
        found: String,
    },

    #[error("ABI encoding failed: {0}")]
    Encode(String),
}

/// Binding to a single-pool swap router deployed at `address`.
#[derive(Debug, Clone)]
pub struct SwapRouter {
    address: Address,
    exact_input_single: Function,
}

impl SwapRouter {
    /// Build the binding from an ABI already in memory.
    pub fn new(address: Address, abi: &Abi) -> Result<Self, BindingError> {
        let exact_input_single = abi
            .function(EXACT_INPUT_SINGLE)
            .map_err(|_| BindingError::MissingFunction(EXACT_INPUT_SINGLE))?
            .clone();

        let inputs: Vec<ParamType> = exact_input_single
            .inputs
            .iter()
            .map(|p| p.kind.clone())
            .collect();
        if inputs != [exact_input_single_params()] {
            return Err(BindingError::Signature {
                function: EXACT_INPUT_SINGLE,
                found: format!("{inputs:?}"),
            });
        }

        Ok(Self {
            address,
            exact_input_single,
        })
    }

    /// Read and parse a JSON ABI file, then build the binding.
    pub fn from_abi_file(address: Address, path: impl AsRef<Path>) -> Result<Self, BindingError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let contents = std::fs::read_to_string(path).map_err(|e| BindingError::Read {
            path: path_str.clone(),
            message: e.to_string(),
        })?;
        let abi: Abi = serde_json::from_str(&contents).map_err(|e| BindingError::Parse {
            path: path_str.clone(),
            message: e.to_string(),
        })?;

        debug!(path = %path_str, functions = abi.functions.len(), "Router ABI loaded");
        Self::new(address, &abi)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Encode an `exactInputSingle` invocation.
    pub fn exact_input_single(&self, params: &SwapParams) -> Result<SwapCall, BindingError> {
        if params.fee > MAX_FEE {
            return Err(BindingError::Encode(format!(
                "fee {} does not fit uint24",
                params.fee
            )));
        }
        if params.sqrt_price_limit_x96.bits() > 160 {
            return Err(BindingError::Encode(
                "sqrtPriceLimitX96 does not fit uint160".into(),
            ));
        }

        let args = Token::Tuple(vec![
            Token::Address(params.token_in),
            Token::Address(params.token_out),
            Token::Uint(U256::from(params.fee)),
            Token::Address(params.recipient),
            Token::Uint(params.deadline),
            Token::Uint(params.amount_in),
            Token::Uint(params.amount_out_minimum),
            Token::Uint(params.sqrt_price_limit_x96),
        ]);

        let calldata = self
            .exact_input_single
            .encode_input(&[args])
            .map_err(|e| BindingError::Encode(e.to_string()))?;

        Ok(SwapCall {
            to: self.address,
            data: Bytes::from(calldata),
        })
    }
}

/// Encoded router call awaiting its transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapCall {
    pub to: Address,
    pub data: Bytes,
}

impl SwapCall {
    pub fn build_transaction(self, opts: TxOptions) -> TransactionPayload {
        TransactionPayload {
            from: opts.from,
            to: self.to,
            value: opts.value,
            gas: opts.gas,
            gas_price: opts.gas_price,
            nonce: opts.nonce,
            data: self.data,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
