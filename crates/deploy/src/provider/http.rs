//! JSON-RPC backed [`NetworkProvider`].

use alloy_core::primitives::{Address, B256, Bytes, U256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use serde_json::{Value, json};

use super::{LegacyTransaction, NetworkProvider, TransactionReceipt, TransactionRequest};
use crate::{NetworkProfile, config::ConfigError, rpc};

/// Provider talking to a JSON-RPC endpoint and signing locally.
pub struct RpcProvider {
    client: reqwest::Client,
    url: String,
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl RpcProvider {
    /// Connect to the profile's RPC endpoint and check it serves the expected chain.
    pub async fn connect(profile: &NetworkProfile, signer: PrivateKeySigner) -> Result<Self> {
        let client = rpc::create_client(profile.rpc_timeout())?;
        let provider = Self {
            client,
            url: profile.rpc_url.to_string(),
            signer,
            chain_id: profile.chain_id,
        };

        let actual = provider
            .chain_id()
            .await
            .with_context(|| format!("Failed to reach RPC endpoint {}", profile.rpc_url))?;

        check_chain_id(profile.chain_id, actual)?;

        tracing::debug!(
            rpc_url = %profile.rpc_url,
            chain_id = actual,
            signer = %provider.signer.address(),
            "Connected to network"
        );

        Ok(provider)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        rpc::json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn quantity(&self, method: &str, params: Vec<Value>) -> Result<u64> {
        let value: String = self.call(method, params).await?;
        rpc::parse_quantity(&value)
    }
}

/// The endpoint must serve the chain the profile (and transaction signatures) target.
fn check_chain_id(expected: u64, actual: u64) -> Result<(), ConfigError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ConfigError::ChainIdMismatch { expected, actual })
    }
}

fn call_object(tx: &TransactionRequest) -> Value {
    let mut object = json!({
        "from": tx.from,
        "data": tx.data,
        "value": tx.value,
    });

    if let Some(to) = tx.to {
        object["to"] = json!(to);
    }
    if let Some(gas) = tx.gas {
        object["gas"] = json!(rpc::to_quantity(gas));
    }
    if let Some(gas_price) = tx.gas_price {
        object["gasPrice"] = json!(gas_price);
    }

    object
}

impl NetworkProvider for RpcProvider {
    fn signer_address(&self) -> Address {
        self.signer.address()
    }

    async fn chain_id(&self) -> Result<u64> {
        self.quantity("eth_chainId", vec![]).await
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.call("eth_getBalance", vec![json!(address), json!("latest")])
            .await
    }

    async fn gas_price(&self) -> Result<U256> {
        self.call("eth_gasPrice", vec![]).await
    }

    async fn nonce(&self, address: Address) -> Result<u64> {
        self.quantity(
            "eth_getTransactionCount",
            vec![json!(address), json!("pending")],
        )
        .await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        self.quantity("eth_estimateGas", vec![call_object(tx)]).await
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256> {
        if tx.from != self.signer.address() {
            anyhow::bail!(
                "Transaction sender {} does not match signer {}",
                tx.from,
                self.signer.address()
            );
        }

        let legacy = LegacyTransaction {
            chain_id: self.chain_id,
            nonce: tx.nonce.context("Transaction nonce must be set")?,
            gas_price: tx.gas_price.context("Transaction gas price must be set")?,
            gas_limit: tx.gas.context("Transaction gas limit must be set")?,
            to: tx.to,
            value: tx.value,
            input: tx.data,
        };

        let raw: Bytes = legacy.sign(&self.signer)?;

        self.call("eth_sendRawTransaction", vec![json!(raw)])
            .await
            .context("Failed to submit transaction")
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        self.call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await
    }

    async fn block_number(&self) -> Result<u64> {
        self.quantity("eth_blockNumber", vec![]).await
    }
}
