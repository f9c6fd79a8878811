//! EIP-155 legacy transaction encoding and signing.

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_core::rlp::{Encodable, Header};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};

/// A legacy (type 0) transaction with EIP-155 replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
}

impl LegacyTransaction {
    /// Keccak hash of the EIP-155 signing payload.
    pub fn signing_hash(&self) -> B256 {
        let zero = 0u8;
        let to = self.to_field();
        keccak256(encode_list(&[
            &self.nonce,
            &self.gas_price,
            &self.gas_limit,
            &to,
            &self.value,
            &self.input,
            &self.chain_id,
            &zero,
            &zero,
        ]))
    }

    /// Sign and return the raw transaction bytes for `eth_sendRawTransaction`.
    pub fn sign(&self, signer: &PrivateKeySigner) -> Result<Bytes> {
        let signature = signer
            .sign_hash_sync(&self.signing_hash())
            .context("Failed to sign transaction")?;

        let v = self.chain_id * 2 + 35 + u64::from(signature.v());
        let r = signature.r();
        let s = signature.s();
        let to = self.to_field();

        Ok(encode_list(&[
            &self.nonce,
            &self.gas_price,
            &self.gas_limit,
            &to,
            &self.value,
            &self.input,
            &v,
            &r,
            &s,
        ])
        .into())
    }

    // Contract creation encodes the recipient as the empty string.
    fn to_field(&self) -> Bytes {
        self.to
            .map(|to| Bytes::copy_from_slice(to.as_slice()))
            .unwrap_or_default()
    }
}

fn encode_list(fields: &[&dyn Encodable]) -> Vec<u8> {
    let payload_length = fields.iter().map(|field| field.length()).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    for field in fields {
        field.encode(&mut out);
    }
    out
}
