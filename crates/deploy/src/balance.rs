//! Deployer balance check.

use std::fmt;

use alloy_core::primitives::{Address, U256, utils::format_ether};
use anyhow::{Context, Result};
use serde::Serialize;

use crate::{NetworkProfile, provider::NetworkProvider};

/// Gas assumed for a typical contract deployment when no plan is simulated.
pub const ROUGH_DEPLOYMENT_GAS: u64 = 2_500_000;

/// Balances below this many wei (0.01 native units) trigger a warning.
pub const LOW_BALANCE_WEI: u64 = 10_000_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub network: String,
    pub address: Address,
    pub balance: U256,
    pub gas_price: U256,
    /// `ROUGH_DEPLOYMENT_GAS × gas_price`.
    pub rough_deployment_cost: U256,
    pub native_symbol: String,
}

impl BalanceReport {
    pub fn new(profile: &NetworkProfile, address: Address, balance: U256, gas_price: U256) -> Self {
        Self {
            network: profile.name.clone(),
            address,
            balance,
            gas_price,
            rough_deployment_cost: U256::from(ROUGH_DEPLOYMENT_GAS) * gas_price,
            native_symbol: profile.native_symbol.clone(),
        }
    }

    pub fn is_low(&self) -> bool {
        self.balance < U256::from(LOW_BALANCE_WEI)
    }

    pub fn covers_rough_deployment(&self) -> bool {
        self.balance >= self.rough_deployment_cost
    }
}

/// Query the signer's balance and the current gas price.
pub async fn check_balance<P: NetworkProvider>(
    provider: &P,
    profile: &NetworkProfile,
) -> Result<BalanceReport> {
    let address = provider.signer_address();
    let balance = provider
        .balance(address)
        .await
        .context("Failed to query deployer balance")?;
    let gas_price = provider
        .gas_price()
        .await
        .context("Failed to query gas price")?;

    let report = BalanceReport::new(profile, address, balance, gas_price);
    if report.is_low() {
        tracing::warn!(address = %address, balance = %format_ether(balance), "Deployer balance is low");
    }

    Ok(report)
}

impl fmt::Display for BalanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network:  {}", self.network)?;
        writeln!(f, "Address:  {}", self.address)?;
        writeln!(f, "Balance:  {} {}", format_ether(self.balance), self.native_symbol)?;
        writeln!(f, "Gas price: {} wei", self.gas_price)?;
        write!(
            f,
            "Rough deployment cost ({} gas): {} {}",
            ROUGH_DEPLOYMENT_GAS,
            format_ether(self.rough_deployment_cost),
            self.native_symbol
        )?;

        if self.is_low() {
            write!(f, "\nWARNING: balance is below 0.01 {}", self.native_symbol)?;
        }

        Ok(())
    }
}
