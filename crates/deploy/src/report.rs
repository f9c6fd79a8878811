//! Deployment report assembly and presentation.

use std::fmt;

use alloy_core::primitives::{
    Address, U256,
    utils::{format_ether, format_units},
};
use chrono::{DateTime, Utc};
use comfy_table::{Table, presets::UTF8_FULL};
use serde::Serialize;
use thiserror::Error;

use crate::{
    NetworkProfile,
    estimator::{CostEstimate, Verdict},
    executor::{DeployError, DeploymentResult},
};

/// Results handed to the reporter do not describe a single run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("results are not in step order: {previous} is followed by {next}")]
    OutOfOrder { previous: usize, next: usize },

    #[error("result for step #{0} is marked verified but carries a verification error")]
    InconsistentVerification(usize),
}

/// The final output of a run.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub network: String,
    pub chain_id: u64,
    pub deployer: Address,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<DeploymentResult>,
    pub estimate: Option<CostEstimate>,
    /// Why the run stopped early, if it did.
    pub failure: Option<String>,
    #[serde(skip)]
    profile: NetworkProfile,
    #[serde(skip)]
    usd_price: Option<f64>,
}

impl DeploymentReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn with_failure(mut self, failure: &DeployError) -> Self {
        self.failure = Some(failure.to_string());
        self
    }

    /// Show USD equivalents of native amounts at `price` per native unit.
    pub fn with_usd_price(mut self, price: Option<f64>) -> Self {
        self.usd_price = price;
        self
    }

    pub fn unverified(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results.iter().filter(|result| !result.verified)
    }
}

/// Aggregates results and the optional estimate into a [`DeploymentReport`].
#[derive(Debug, Clone)]
pub struct SummaryReporter {
    profile: NetworkProfile,
    deployer: Address,
    started_at: DateTime<Utc>,
}

impl SummaryReporter {
    /// Start a report for a run beginning now.
    pub fn new(profile: &NetworkProfile, deployer: Address) -> Self {
        Self {
            profile: profile.clone(),
            deployer,
            started_at: Utc::now(),
        }
    }

    pub fn summarize(
        &self,
        results: Vec<DeploymentResult>,
        estimate: Option<CostEstimate>,
    ) -> Result<DeploymentReport, ReportError> {
        for pair in results.windows(2) {
            if pair[1].index <= pair[0].index {
                return Err(ReportError::OutOfOrder {
                    previous: pair[0].index.0,
                    next: pair[1].index.0,
                });
            }
        }

        if let Some(result) = results
            .iter()
            .find(|r| r.verified && r.verification_error.is_some())
        {
            return Err(ReportError::InconsistentVerification(result.index.0));
        }

        Ok(DeploymentReport {
            network: self.profile.name.clone(),
            chain_id: self.profile.chain_id,
            deployer: self.deployer,
            started_at: self.started_at,
            finished_at: Utc::now(),
            results,
            estimate,
            failure: None,
            profile: self.profile.clone(),
            usd_price: None,
        })
    }
}

/// Cost estimate rendering with native and optional USD amounts.
pub struct EstimateSummary<'a> {
    pub estimate: &'a CostEstimate,
    pub native_symbol: &'a str,
    pub usd_price: Option<f64>,
}

impl EstimateSummary<'_> {
    fn amount(&self, wei: U256) -> String {
        let ether = format_ether(wei);
        match self.usd_price.and_then(|price| to_usd(&ether, price)) {
            Some(usd) => format!("{} {} (~${:.2})", ether, self.native_symbol, usd),
            None => format!("{} {}", ether, self.native_symbol),
        }
    }
}

fn to_usd(ether: &str, price: f64) -> Option<f64> {
    ether.parse::<f64>().ok().map(|amount| amount * price)
}

impl fmt::Display for EstimateSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let estimate = self.estimate;

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["#", "Contract", "Gas", "Cost"]);
        for step in &estimate.per_step_gas {
            table.add_row(vec![
                step.step.to_string(),
                step.kind.contract_name().to_string(),
                step.gas.to_string(),
                self.amount(step.cost),
            ]);
        }
        writeln!(f, "{table}")?;

        let gwei = format_units(estimate.unit_price, "gwei").unwrap_or_else(|_| estimate.unit_price.to_string());
        writeln!(f, "  Gas price:        {gwei} gwei")?;
        writeln!(f, "  Total gas:        {}", estimate.total_gas)?;
        writeln!(f, "  Total cost:       {}", self.amount(estimate.total_cost))?;
        writeln!(
            f,
            "  With buffer {}: {}",
            estimate.buffer_factor,
            self.amount(estimate.cost_with_buffer)
        )?;
        writeln!(f, "  Balance:          {}", self.amount(estimate.funded_balance))?;
        write!(f, "  Verdict:          {}", estimate.verdict)?;

        if let Some(shortfall) = estimate.shortfall() {
            write!(f, "\n  Shortfall:        {}", self.amount(shortfall))?;
        }
        if estimate.verdict == Verdict::Insufficient {
            write!(f, "\n  Fund the deployer before deploying.")?;
        }

        Ok(())
    }
}

impl fmt::Display for DeploymentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.failure {
            None => "COMPLETE".to_string(),
            Some(failure) => format!("ABORTED ({failure})"),
        };

        writeln!(f, "Deployment: {status}")?;
        writeln!(f, "  Network:  {} (chain {})", self.network, self.chain_id)?;
        writeln!(f, "  Deployer: {}", self.deployer)?;
        writeln!(
            f,
            "  Duration: {}s",
            (self.finished_at - self.started_at).num_seconds()
        )?;
        writeln!(f)?;

        if self.results.is_empty() {
            writeln!(f, "No contracts deployed.")?;
        } else {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec![
                "#",
                "Contract",
                "Address",
                "Confirmations",
                "Gas used",
                "Verified",
            ]);
            for result in &self.results {
                table.add_row(vec![
                    result.index.to_string(),
                    result.kind().contract_name().to_string(),
                    result.address.to_string(),
                    result.confirmations_observed.to_string(),
                    result.gas_used.to_string(),
                    if result.verified { "yes" } else { "no" }.to_string(),
                ]);
            }
            writeln!(f, "{table}")?;

            writeln!(f, "Explorer:")?;
            for result in &self.results {
                writeln!(
                    f,
                    "  {}: {}",
                    result.kind().contract_name(),
                    self.profile.address_url(result.address)
                )?;
                writeln!(f, "    tx: {}", self.profile.transaction_url(result.transaction_id))?;
            }
        }

        let unverified: Vec<_> = self.unverified().collect();
        if !unverified.is_empty() {
            writeln!(f)?;
            writeln!(f, "Unverified contracts (retry with `crypticorn verify`):")?;
            for result in unverified {
                writeln!(
                    f,
                    "  {} {}: {}",
                    result.kind().contract_name(),
                    result.address,
                    result
                        .verification_error
                        .as_deref()
                        .unwrap_or("verification not attempted")
                )?;
            }
        }

        if let Some(estimate) = &self.estimate {
            writeln!(f)?;
            writeln!(f, "Pre-flight estimate:")?;
            writeln!(
                f,
                "{}",
                EstimateSummary {
                    estimate,
                    native_symbol: &self.profile.native_symbol,
                    usd_price: self.usd_price,
                }
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::B256;

    use super::*;
    use crate::{
        Network,
        estimator::BufferFactor,
        plan::{ArtifactKind, DeploymentStep, StepRef},
    };

    fn result(index: usize, kind: ArtifactKind) -> DeploymentResult {
        DeploymentResult {
            index: StepRef(index),
            step: DeploymentStep::new(kind, vec![]),
            resolved_args: vec![],
            address: Address::repeat_byte(index as u8 + 1),
            transaction_id: B256::repeat_byte(index as u8 + 1),
            block_number: 100,
            gas_used: 1_000_000,
            confirmations_observed: 5,
            verified: false,
            verification_error: None,
        }
    }

    fn reporter() -> SummaryReporter {
        SummaryReporter::new(&Network::BscTestnet.to_profile(), Address::repeat_byte(0xde))
    }

    #[test]
    fn test_summarize_keeps_results_in_order() {
        let report = reporter()
            .summarize(
                vec![result(0, ArtifactKind::Token), result(1, ArtifactKind::Staking)],
                None,
            )
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.chain_id, 97);
        assert!(report.is_success());
        assert_eq!(report.unverified().count(), 2);
    }

    #[test]
    fn test_summarize_rejects_out_of_order_results() {
        let err = reporter()
            .summarize(
                vec![result(1, ArtifactKind::Staking), result(0, ArtifactKind::Token)],
                None,
            )
            .unwrap_err();
        assert_eq!(err, ReportError::OutOfOrder { previous: 1, next: 0 });
    }

    #[test]
    fn test_summarize_rejects_inconsistent_verification() {
        let mut bad = result(0, ArtifactKind::Token);
        bad.verified = true;
        bad.verification_error = Some("boom".to_string());

        assert_eq!(
            reporter().summarize(vec![bad], None).unwrap_err(),
            ReportError::InconsistentVerification(0)
        );
    }

    #[test]
    fn test_display_contains_links_and_failure() {
        let failure = DeployError::DependencyUnresolved {
            step: StepRef(1),
            depends_on: StepRef(0),
        };
        let report = reporter()
            .summarize(vec![result(0, ArtifactKind::Token)], None)
            .unwrap()
            .with_failure(&failure);

        let text = report.to_string();
        assert!(text.contains("ABORTED"), "missing status: {text}");
        assert!(text.contains("https://testnet.bscscan.com/address/0x0101010101010101010101010101010101010101"));
        assert!(text.contains("Unverified contracts"));
        assert!(!report.is_success());
    }

    #[test]
    fn test_estimate_summary_shows_shortfall_and_usd() {
        let estimate = CostEstimate::compute(
            vec![(StepRef(0), ArtifactKind::Token, 2_000_000)],
            U256::from(5_000_000_000u64),
            BufferFactor::default(),
            U256::ZERO,
        );
        let text = EstimateSummary {
            estimate: &estimate,
            native_symbol: "BNB",
            usd_price: Some(700.0),
        }
        .to_string();

        assert!(text.contains("INSUFFICIENT"), "missing verdict: {text}");
        assert!(text.contains("Shortfall"));
        assert!(text.contains("0.010000000000000000 BNB (~$7.00)"), "missing amount: {text}");
    }

    #[test]
    fn test_report_serializes_without_presentation_fields() {
        let report = reporter()
            .summarize(vec![result(0, ArtifactKind::Token)], None)
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["network"], "bsc-testnet");
        assert!(json.get("profile").is_none());
        assert_eq!(json["results"][0]["verified"], false);
    }
}
