//! Network collaborator.
//!
//! [`NetworkProvider`] is the seam between the pipeline and the chain. The pipeline only
//! needs balance and price queries, gas simulation, submission and receipt polling. The
//! JSON-RPC implementation lives in [`RpcProvider`].

mod http;
mod legacy_tx;

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use http::RpcProvider;
pub use legacy_tx::LegacyTransaction;

/// An unsigned transaction as seen by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub gas: Option<u64>,
    pub gas_price: Option<U256>,
    pub nonce: Option<u64>,
}

impl TransactionRequest {
    /// A contract creation request carrying `data` as init code.
    pub fn deployment(from: Address, data: Bytes) -> Self {
        Self {
            from,
            data,
            ..Default::default()
        }
    }
}

/// The subset of a transaction receipt the pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub block_number: u64,
    pub contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_status")]
    pub status: bool,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub gas_used: u64,
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_u64_from_hex(deserializer).map(|status| status == 1)
}

/// Read/write access to a chain under a single signing identity.
pub trait NetworkProvider: Send + Sync {
    /// The address transactions are signed with.
    fn signer_address(&self) -> Address;

    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    fn balance(&self, address: Address) -> impl Future<Output = Result<U256>> + Send;

    /// Current price per unit of gas.
    fn gas_price(&self) -> impl Future<Output = Result<U256>> + Send;

    /// Next nonce for `address`, counting pending transactions.
    fn nonce(&self, address: Address) -> impl Future<Output = Result<u64>> + Send;

    /// Simulate a transaction without submitting it.
    fn estimate_gas(&self, tx: &TransactionRequest) -> impl Future<Output = Result<u64>> + Send;

    /// Sign and submit a transaction. `nonce`, `gas` and `gas_price` must be set.
    fn send_transaction(&self, tx: TransactionRequest) -> impl Future<Output = Result<B256>> + Send;

    fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>>> + Send;

    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_from_rpc_json() {
        let json = serde_json::json!({
            "transactionHash": "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060",
            "blockNumber": "0x1b4",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "status": "0x1",
            "gasUsed": "0x1e8480",
            "logs": []
        });

        let receipt: TransactionReceipt = serde_json::from_value(json).unwrap();
        assert_eq!(receipt.block_number, 436);
        assert_eq!(receipt.gas_used, 2_000_000);
        assert!(receipt.status);
        assert!(receipt.contract_address.is_some());
    }

    #[test]
    fn test_reverted_receipt() {
        let json = serde_json::json!({
            "transactionHash": "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060",
            "blockNumber": "0x10",
            "contractAddress": null,
            "status": "0x0",
            "gasUsed": "0x5208"
        });

        let receipt: TransactionReceipt = serde_json::from_value(json).unwrap();
        assert!(!receipt.status);
        assert!(receipt.contract_address.is_none());
    }
}
